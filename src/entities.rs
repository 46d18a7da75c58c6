//! The entity generator: per-table operation fields and the entity bundle.
//!
//! For every table the generator produces six fields (collection and
//! single-row queries, bulk and single inserts, update, delete) bound to
//! the resolvers in [`crate::resolvers`]. The default names derive from the
//! table identity (`users`, `usersSingle`, `insertIntoUsers`,
//! `insertIntoUsersSingle`, `updateUsers`, `deleteFromUsers`), but every
//! constructor takes the field name as a parameter: a field stays valid
//! under any alias because its return type is named after the table, not
//! the field.

use std::sync::Arc;

use async_graphql::dynamic::{Field, InputValue, TypeRef};

use crate::executor::Executor;
use crate::resolvers;
use crate::schema::{Dialect, RelationalSchema, TableDef};
use crate::utils::{
    collection_field_name, delete_field_name, filters_type_name, insert_field_name,
    insert_input_type_name, insert_single_field_name, item_type_name, order_by_type_name,
    select_item_type_name, single_field_name, update_field_name, update_input_type_name,
};

/// Everything a resolver closure needs, captured at generation time. The
/// registry side of the schema is read-only after build, so clones are
/// cheap and lock-free.
#[derive(Clone)]
pub struct ResolverState {
    pub schema: Arc<RelationalSchema>,
    pub executor: Arc<dyn Executor>,
    pub dialect: Dialect,
}

/// The generated operations for one table. Field constructors can be called
/// any number of times, with any field name, to assemble custom roots.
#[derive(Clone)]
pub struct EntityBundle {
    state: ResolverState,
    table: Arc<TableDef>,
}

impl EntityBundle {
    pub(crate) fn new(state: ResolverState, table: Arc<TableDef>) -> Self {
        Self { state, table }
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    /// `<t>`: collection fetch, `[TSelectItem!]!`.
    pub fn collection_field(&self, name: impl Into<String>) -> Field {
        let state = self.state.clone();
        let table = self.table.clone();
        let field = Field::new(
            name,
            TypeRef::named_nn_list_nn(select_item_type_name(&self.table.name)),
            move |ctx| resolvers::select_many_resolver(state.clone(), table.clone(), ctx),
        );
        self.select_arguments(field, true)
    }

    /// `<t>Single`: single-row fetch, nullable `TSelectItem`. Absence is
    /// null, never an error.
    pub fn single_field(&self, name: impl Into<String>) -> Field {
        let state = self.state.clone();
        let table = self.table.clone();
        let field = Field::new(
            name,
            TypeRef::named(select_item_type_name(&self.table.name)),
            move |ctx| resolvers::select_first_resolver(state.clone(), table.clone(), ctx),
        );
        self.select_arguments(field, false)
    }

    /// `insertInto<T>Single`: one row in, nullable `TItem` (or the success
    /// object without RETURNING support).
    pub fn insert_single_field(&self, name: impl Into<String>) -> Field {
        let state = self.state.clone();
        let table = self.table.clone();
        Field::new(name, self.mutation_type_ref(MutationShape::SingleRow), move |ctx| {
            resolvers::insert_single_resolver(state.clone(), table.clone(), ctx)
        })
        .argument(InputValue::new(
            "values",
            TypeRef::named_nn(insert_input_type_name(&self.table.name)),
        ))
    }

    /// `insertInto<T>`: bulk insert, all-or-nothing.
    pub fn insert_field(&self, name: impl Into<String>) -> Field {
        let state = self.state.clone();
        let table = self.table.clone();
        Field::new(name, self.mutation_type_ref(MutationShape::RowList), move |ctx| {
            resolvers::insert_resolver(state.clone(), table.clone(), ctx)
        })
        .argument(InputValue::new(
            "values",
            TypeRef::named_nn_list_nn(insert_input_type_name(&self.table.name)),
        ))
    }

    /// `update<T>`: empty `where` updates every row; returns the post-image.
    pub fn update_field(&self, name: impl Into<String>) -> Field {
        let state = self.state.clone();
        let table = self.table.clone();
        Field::new(name, self.mutation_type_ref(MutationShape::RowList), move |ctx| {
            resolvers::update_resolver(state.clone(), table.clone(), ctx)
        })
        .argument(InputValue::new(
            "set",
            TypeRef::named_nn(update_input_type_name(&self.table.name)),
        ))
        .argument(InputValue::new(
            "where",
            TypeRef::named(filters_type_name(&self.table.name)),
        ))
    }

    /// `deleteFrom<T>`: empty `where` deletes every row; returns the
    /// pre-image.
    pub fn delete_field(&self, name: impl Into<String>) -> Field {
        let state = self.state.clone();
        let table = self.table.clone();
        Field::new(name, self.mutation_type_ref(MutationShape::RowList), move |ctx| {
            resolvers::delete_resolver(state.clone(), table.clone(), ctx)
        })
        .argument(InputValue::new(
            "where",
            TypeRef::named(filters_type_name(&self.table.name)),
        ))
    }

    /// The two query fields under their default names.
    pub fn query_fields(&self) -> Vec<Field> {
        vec![
            self.collection_field(collection_field_name(&self.table.name)),
            self.single_field(single_field_name(&self.table.name)),
        ]
    }

    /// The four mutation fields under their default names.
    pub fn mutation_fields(&self) -> Vec<Field> {
        vec![
            self.insert_single_field(insert_single_field_name(&self.table.name)),
            self.insert_field(insert_field_name(&self.table.name)),
            self.update_field(update_field_name(&self.table.name)),
            self.delete_field(delete_field_name(&self.table.name)),
        ]
    }

    fn select_arguments(&self, field: Field, with_limit: bool) -> Field {
        let mut field = field
            .argument(InputValue::new(
                "where",
                TypeRef::named(filters_type_name(&self.table.name)),
            ))
            .argument(InputValue::new(
                "orderBy",
                TypeRef::named(order_by_type_name(&self.table.name)),
            ))
            .argument(InputValue::new("offset", TypeRef::named(TypeRef::INT)));

        if with_limit {
            field = field.argument(InputValue::new("limit", TypeRef::named(TypeRef::INT)));
        }

        field
    }

    fn mutation_type_ref(&self, shape: MutationShape) -> TypeRef {
        if !self.state.dialect.supports_returning() {
            return TypeRef::named_nn("MutationSuccess");
        }

        let item = item_type_name(&self.table.name);
        match shape {
            MutationShape::SingleRow => TypeRef::named(item),
            MutationShape::RowList => TypeRef::named_nn_list_nn(item),
        }
    }
}

#[derive(Clone, Copy)]
enum MutationShape {
    SingleRow,
    RowList,
}
