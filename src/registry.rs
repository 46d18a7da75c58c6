//! The type registry: builds and memoizes every GraphQL type the compiled
//! schema needs.
//!
//! Per table there are two object types (`<T>Item` for mutation results,
//! `<T>SelectItem` for reads, the latter carrying relation fields), one
//! wrapper object per relation (`<Owner><Rel>Relation`, target columns
//! only), and four input types (`Filters`, `OrderBy`, `InsertInput`,
//! `UpdateInput`). Shared pieces (per-scalar filter inputs, custom scalars,
//! `OrderByArg`, the `OrderDirection` enum) are built once and reused.
//!
//! Registration is keyed by type name, so cyclic relations terminate: a
//! relation field only references its wrapper by name, and each type is
//! constructed exactly once no matter how often it is referenced.
//!
//! Columns whose logical type does not exist in the active dialect are
//! omitted everywhere, as are dialect-gated operators; nothing is stubbed
//! with a runtime error.

use async_graphql::Value;
use async_graphql::dynamic::{
    Enum, Field, FieldFuture, InputObject, InputValue, Object, Scalar, SchemaBuilder, TypeRef,
};
use indexmap::IndexMap;
use tracing::debug;

use crate::schema::{Cardinality, ColumnDef, Dialect, LogicalType, RelationDef, RelationalSchema, TableDef};
use crate::utils::{
    enum_type_name, filters_type_name, insert_input_type_name, item_type_name,
    order_by_type_name, relation_type_name, select_item_type_name, update_input_type_name,
};

/// Which of the two per-table object shapes to reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectVariant {
    /// Mutation return shape: columns only.
    Item,
    /// Read shape: columns plus relation fields.
    SelectItem,
}

pub struct TypeRegistry {
    dialect: Dialect,
    scalars: IndexMap<String, Scalar>,
    enums: IndexMap<String, Enum>,
    inputs: IndexMap<String, InputObject>,
    objects: IndexMap<String, Object>,
}

impl TypeRegistry {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            scalars: IndexMap::new(),
            enums: IndexMap::new(),
            inputs: IndexMap::new(),
            objects: IndexMap::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Builds (once) every type a table contributes to the schema.
    pub fn ensure_table_types(&mut self, schema: &RelationalSchema, table: &TableDef) {
        debug!(table = %table.name, "registering GraphQL types");

        self.ensure_object(schema, table, ObjectVariant::Item);
        self.ensure_object(schema, table, ObjectVariant::SelectItem);

        for relation in &table.relations {
            self.ensure_relation_wrapper(schema, table, relation);
        }

        self.ensure_filters_input(table);
        self.ensure_order_by_input(table);
        self.ensure_insert_input(table);
        self.ensure_update_input(table);

        if !self.dialect.supports_returning() {
            self.ensure_mutation_success();
        }
    }

    /// Name of the object type a variant resolves to, for field builders.
    pub fn object_type_name(table: &TableDef, variant: ObjectVariant) -> String {
        match variant {
            ObjectVariant::Item => item_type_name(&table.name),
            ObjectVariant::SelectItem => select_item_type_name(&table.name),
        }
    }

    /// Hands every memoized type to the schema builder.
    pub fn register_all(self, mut builder: SchemaBuilder) -> SchemaBuilder {
        for (_, scalar) in self.scalars {
            builder = builder.register(scalar);
        }
        for (_, item) in self.enums {
            builder = builder.register(item);
        }
        for (_, input) in self.inputs {
            builder = builder.register(input);
        }
        for (_, object) in self.objects {
            builder = builder.register(object);
        }
        builder
    }

    fn supported<'t>(&self, table: &'t TableDef) -> impl Iterator<Item = &'t ColumnDef> {
        let dialect = self.dialect;
        table
            .columns
            .iter()
            .filter(move |col| dialect.supports_type(&col.logical_type))
    }

    fn ensure_object(&mut self, schema: &RelationalSchema, table: &TableDef, variant: ObjectVariant) {
        let name = Self::object_type_name(table, variant);
        if self.objects.contains_key(&name) {
            return;
        }

        let mut object = Object::new(name.clone());
        if let Some(description) = &table.description {
            object = object.description(description.clone());
        }

        let columns = self.supported(table).cloned().collect::<Vec<_>>();
        for column in &columns {
            object = object.field(self.column_field(table, column));
        }

        if variant == ObjectVariant::SelectItem {
            for relation in &table.relations {
                if schema.get(&relation.target).is_some() {
                    object = object.field(self.relation_field(table, relation));
                }
            }
        }

        self.objects.insert(name, object);
    }

    /// Wrapper object for one relation hop. Mirrors the target table's
    /// columns but carries a name tied to the owning relation, so the same
    /// target reached through different relations keeps distinct, stable
    /// `__typename`s.
    fn ensure_relation_wrapper(
        &mut self,
        schema: &RelationalSchema,
        table: &TableDef,
        relation: &RelationDef,
    ) {
        let name = relation_type_name(&table.name, &relation.name);
        if self.objects.contains_key(&name) {
            return;
        }

        let Some(target) = schema.get(&relation.target) else {
            return;
        };

        let mut object = Object::new(name.clone());
        let columns = self.supported(target).cloned().collect::<Vec<_>>();
        for column in &columns {
            object = object.field(self.column_field(target, column));
        }

        self.objects.insert(name, object);
    }

    /// A column field reads its value out of the parent row object the
    /// resolver marshaled; no executor contact happens below the top level.
    fn column_field(&mut self, table: &TableDef, column: &ColumnDef) -> Field {
        let type_ref = self.column_type_ref(table, column, false);
        let lookup = column.name.clone();

        let mut field = Field::new(column.name.clone(), type_ref, move |ctx| {
            let value = ctx.parent_value.as_value().and_then(|parent| match parent {
                Value::Object(map) => map.get(lookup.as_str()).cloned(),
                _ => None,
            });
            FieldFuture::from_value(value)
        });

        if let Some(description) = &column.description {
            field = field.description(description.clone());
        }

        field
    }

    /// A relation field reads the rows the executor nested under this
    /// field's response key, so aliased duplicates resolve independently.
    fn relation_field(&mut self, table: &TableDef, relation: &RelationDef) -> Field {
        let wrapper = relation_type_name(&table.name, &relation.name);
        let type_ref = match relation.cardinality {
            Cardinality::Many => TypeRef::named_nn_list_nn(wrapper),
            Cardinality::One => TypeRef::named(wrapper),
        };

        let mut field = Field::new(relation.name.clone(), type_ref, move |ctx| {
            let key = ctx
                .item
                .node
                .alias
                .as_ref()
                .map(|alias| alias.node.to_string())
                .unwrap_or_else(|| ctx.item.node.name.node.to_string());
            let value = ctx.parent_value.as_value().and_then(|parent| match parent {
                Value::Object(map) => map.get(key.as_str()).cloned(),
                _ => None,
            });
            FieldFuture::from_value(value)
        });

        field = field
            .argument(InputValue::new(
                "where",
                TypeRef::named(filters_type_name(&relation.target)),
            ))
            .argument(InputValue::new(
                "orderBy",
                TypeRef::named(order_by_type_name(&relation.target)),
            ))
            .argument(InputValue::new("offset", TypeRef::named(TypeRef::INT)));

        if relation.cardinality == Cardinality::Many {
            field = field.argument(InputValue::new("limit", TypeRef::named(TypeRef::INT)));
        }

        field
    }

    fn column_type_ref(&mut self, table: &TableDef, column: &ColumnDef, force_nullable: bool) -> TypeRef {
        let scalar = self.scalar_type_name(table, column, &column.logical_type);
        let non_null = column.not_null && !force_nullable;

        match &column.logical_type {
            LogicalType::Array(_) => {
                if non_null {
                    TypeRef::named_list_nn(scalar)
                } else {
                    TypeRef::named_list(scalar)
                }
            }
            _ => {
                if non_null {
                    TypeRef::named_nn(scalar)
                } else {
                    TypeRef::named(scalar)
                }
            }
        }
    }

    /// Maps a logical type to its GraphQL scalar (or enum) name, minting
    /// custom scalars on first use.
    fn scalar_type_name(&mut self, table: &TableDef, column: &ColumnDef, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Int32 => TypeRef::INT.to_string(),
            LogicalType::Float => TypeRef::FLOAT.to_string(),
            LogicalType::Boolean => TypeRef::BOOLEAN.to_string(),
            LogicalType::String
            | LogicalType::Text
            | LogicalType::Char(_)
            | LogicalType::Varchar(_) => TypeRef::STRING.to_string(),
            LogicalType::Int64 | LogicalType::BigInt => self.ensure_scalar("BigInt"),
            LogicalType::Decimal => self.ensure_scalar("Decimal"),
            LogicalType::Date => self.ensure_scalar("Date"),
            LogicalType::Timestamp | LogicalType::TimestampMs => self.ensure_scalar("Timestamp"),
            LogicalType::Json => self.ensure_scalar("JSON"),
            LogicalType::Blob => self.ensure_scalar("Binary"),
            LogicalType::Vector(_) => self.ensure_scalar("Vector"),
            LogicalType::PointXy => self.ensure_scalar("Point"),
            LogicalType::PointTuple => self.ensure_scalar("PointTuple"),
            LogicalType::Enum(variants) => self.ensure_enum(table, column, variants),
            LogicalType::Array(inner) => self.scalar_type_name(table, column, inner),
        }
    }

    fn ensure_scalar(&mut self, name: &str) -> String {
        if !self.scalars.contains_key(name) {
            self.scalars.insert(name.to_string(), Scalar::new(name));
        }
        name.to_string()
    }

    fn ensure_enum(&mut self, table: &TableDef, column: &ColumnDef, variants: &[String]) -> String {
        let name = enum_type_name(&table.name, &column.name);
        if !self.enums.contains_key(&name) {
            let mut item = Enum::new(name.clone());
            for variant in variants {
                item = item.item(variant.as_str());
            }
            self.enums.insert(name.clone(), item);
        }
        name
    }

    fn ensure_filters_input(&mut self, table: &TableDef) {
        let name = filters_type_name(&table.name);
        if self.inputs.contains_key(&name) {
            return;
        }

        let mut input = InputObject::new(name.clone());
        let columns = self.supported(table).cloned().collect::<Vec<_>>();
        for column in &columns {
            let filter_type = self.ensure_column_filter_input(table, column);
            input = input.field(InputValue::new(
                column.name.clone(),
                TypeRef::named(filter_type),
            ));
        }

        // The recursive combinators; self-reference by name.
        input = input
            .field(InputValue::new("OR", TypeRef::named_nn_list(name.clone())))
            .field(InputValue::new("AND", TypeRef::named_nn_list(name.clone())));

        self.inputs.insert(name, input);
    }

    /// Per-scalar filter input shared across every column of that shape.
    fn ensure_column_filter_input(&mut self, table: &TableDef, column: &ColumnDef) -> String {
        let ty = &column.logical_type;
        let scalar = self.scalar_type_name(table, column, ty);
        let name = match ty {
            LogicalType::Enum(_) => format!("{scalar}Filters"),
            LogicalType::Array(_) => format!("{scalar}ArrayFilters"),
            LogicalType::Int32 => "IntFilters".to_string(),
            LogicalType::Int64 | LogicalType::BigInt => "BigIntFilters".to_string(),
            LogicalType::Float => "FloatFilters".to_string(),
            LogicalType::Decimal => "DecimalFilters".to_string(),
            LogicalType::Boolean => "BooleanFilters".to_string(),
            LogicalType::String
            | LogicalType::Text
            | LogicalType::Char(_)
            | LogicalType::Varchar(_) => "StringFilters".to_string(),
            LogicalType::Date => "DateFilters".to_string(),
            LogicalType::Timestamp | LogicalType::TimestampMs => "TimestampFilters".to_string(),
            LogicalType::Json => "JSONFilters".to_string(),
            LogicalType::Blob => "BinaryFilters".to_string(),
            LogicalType::Vector(_) => "VectorFilters".to_string(),
            LogicalType::PointXy => "PointFilters".to_string(),
            LogicalType::PointTuple => "PointTupleFilters".to_string(),
        };

        if self.inputs.contains_key(&name) {
            return name;
        }

        let is_array = matches!(ty, LogicalType::Array(_));
        let operand = |scalar: &str| {
            if is_array {
                TypeRef::named_nn_list(scalar)
            } else {
                TypeRef::named(scalar)
            }
        };

        let mut input = InputObject::new(name.clone())
            .field(InputValue::new("eq", operand(&scalar)))
            .field(InputValue::new("ne", operand(&scalar)))
            .field(InputValue::new(
                "isNull",
                TypeRef::named(TypeRef::BOOLEAN),
            ));

        if !is_array {
            input = input
                .field(InputValue::new(
                    "inArray",
                    TypeRef::named_nn_list(scalar.clone()),
                ))
                .field(InputValue::new(
                    "notInArray",
                    TypeRef::named_nn_list(scalar.clone()),
                ));
        }

        if ty.is_ordered() {
            input = input
                .field(InputValue::new("gt", TypeRef::named(scalar.clone())))
                .field(InputValue::new("gte", TypeRef::named(scalar.clone())))
                .field(InputValue::new("lt", TypeRef::named(scalar.clone())))
                .field(InputValue::new("lte", TypeRef::named(scalar.clone())));
        }

        if ty.is_stringy() {
            input = input
                .field(InputValue::new("like", TypeRef::named(TypeRef::STRING)))
                .field(InputValue::new("notLike", TypeRef::named(TypeRef::STRING)));
            if self.dialect.supports_ilike() {
                input = input
                    .field(InputValue::new("ilike", TypeRef::named(TypeRef::STRING)))
                    .field(InputValue::new(
                        "notIlike",
                        TypeRef::named(TypeRef::STRING),
                    ));
            }
        }

        if is_array {
            input = input
                .field(InputValue::new(
                    "arrayContains",
                    TypeRef::named_nn_list(scalar.clone()),
                ))
                .field(InputValue::new(
                    "arrayContained",
                    TypeRef::named_nn_list(scalar.clone()),
                ))
                .field(InputValue::new(
                    "arrayOverlaps",
                    TypeRef::named_nn_list(scalar.clone()),
                ));
        }

        self.inputs.insert(name.clone(), input);
        name
    }

    fn ensure_order_by_input(&mut self, table: &TableDef) {
        if !self.enums.contains_key("OrderDirection") {
            self.enums.insert(
                "OrderDirection".to_string(),
                Enum::new("OrderDirection").item("asc").item("desc"),
            );
        }

        if !self.inputs.contains_key("OrderByArg") {
            self.inputs.insert(
                "OrderByArg".to_string(),
                InputObject::new("OrderByArg")
                    .field(InputValue::new("priority", TypeRef::named_nn(TypeRef::INT)))
                    .field(InputValue::new(
                        "direction",
                        TypeRef::named_nn("OrderDirection"),
                    )),
            );
        }

        let name = order_by_type_name(&table.name);
        if self.inputs.contains_key(&name) {
            return;
        }

        let mut input = InputObject::new(name.clone());
        for column in self.supported(table) {
            input = input.field(InputValue::new(
                column.name.clone(),
                TypeRef::named("OrderByArg"),
            ));
        }

        self.inputs.insert(name, input);
    }

    fn ensure_insert_input(&mut self, table: &TableDef) {
        let name = insert_input_type_name(&table.name);
        if self.inputs.contains_key(&name) {
            return;
        }

        let mut input = InputObject::new(name.clone());
        let columns = self.supported(table).cloned().collect::<Vec<_>>();
        for column in &columns {
            let type_ref = self.column_type_ref(table, column, !column.insert_required());
            input = input.field(InputValue::new(column.name.clone(), type_ref));
        }

        self.inputs.insert(name, input);
    }

    fn ensure_update_input(&mut self, table: &TableDef) {
        let name = update_input_type_name(&table.name);
        if self.inputs.contains_key(&name) {
            return;
        }

        let mut input = InputObject::new(name.clone());
        let columns = self.supported(table).cloned().collect::<Vec<_>>();
        for column in &columns {
            let type_ref = self.column_type_ref(table, column, true);
            input = input.field(InputValue::new(column.name.clone(), type_ref));
        }

        self.inputs.insert(name, input);
    }

    /// Return shape for mutations in dialects without RETURNING support.
    fn ensure_mutation_success(&mut self) {
        if self.objects.contains_key("MutationSuccess") {
            return;
        }

        let object = Object::new("MutationSuccess").field(Field::new(
            "isSuccess",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            |ctx| {
                let value = ctx.parent_value.as_value().and_then(|parent| match parent {
                    Value::Object(map) => map.get("isSuccess").cloned(),
                    _ => None,
                });
                FieldFuture::from_value(value)
            },
        ));

        self.objects.insert("MutationSuccess".to_string(), object);
    }

    #[cfg(test)]
    fn has_object(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    #[cfg(test)]
    fn has_input(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    #[cfg(test)]
    fn has_enum(&self, name: &str) -> bool {
        self.enums.contains_key(name)
    }

    #[cfg(test)]
    fn has_scalar(&self, name: &str) -> bool {
        self.scalars.contains_key(name)
    }
}
