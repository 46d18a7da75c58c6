//! Declarative relational schema descriptors.
//!
//! Callers describe their tables once, at build time: typed columns, primary
//! keys, and named relations with explicit join predicates. The compiler
//! never introspects a live database; everything it knows about the
//! relational side comes from these descriptors. Descriptors are immutable
//! after [`RelationalSchema::validate`] accepts them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::utils::is_valid_graphql_identifier;

/// The relational backend the schema is compiled for. Selects marshaling
/// rules, the available filter operators, and the set of supported column
/// types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    Postgres,
    Mysql,
    Sqlite,
}

impl Dialect {
    /// Whether columns of this logical type exist at all in this dialect.
    /// Unsupported columns are omitted from the generated schema rather
    /// than stubbed with runtime errors.
    pub fn supports_type(&self, ty: &LogicalType) -> bool {
        match ty {
            LogicalType::Array(_)
            | LogicalType::Vector(_)
            | LogicalType::PointXy
            | LogicalType::PointTuple => matches!(self, Self::Postgres),
            LogicalType::TimestampMs => matches!(self, Self::Sqlite),
            _ => true,
        }
    }

    /// Case-insensitive LIKE is a Postgres extension.
    pub fn supports_ilike(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Whether mutations can read their row images back atomically
    /// (RETURNING). Without it, insert/update/delete fields return a bare
    /// success object instead of row lists.
    pub fn supports_returning(&self) -> bool {
        matches!(self, Self::Postgres | Self::Sqlite)
    }

    /// Whether outgoing timestamps keep sub-second precision.
    pub fn timestamp_millis(&self, ty: &LogicalType) -> bool {
        match ty {
            LogicalType::TimestampMs => true,
            LogicalType::Timestamp => matches!(self, Self::Postgres),
            _ => false,
        }
    }
}

/// Dialect-independent column type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalType {
    Int32,
    Int64,
    BigInt,
    Float,
    Decimal,
    Boolean,
    String,
    Text,
    Char(u32),
    Varchar(u32),
    Date,
    Timestamp,
    TimestampMs,
    Json,
    Enum(Vec<String>),
    Array(Box<LogicalType>),
    Vector(u32),
    PointXy,
    PointTuple,
    Blob,
}

impl LogicalType {
    /// Types with a total order, eligible for `gt`/`gte`/`lt`/`lte`.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            Self::Int32
                | Self::Int64
                | Self::BigInt
                | Self::Float
                | Self::Decimal
                | Self::Date
                | Self::Timestamp
                | Self::TimestampMs
        )
    }

    /// Types eligible for the LIKE operator family.
    pub fn is_stringy(&self) -> bool {
        matches!(
            self,
            Self::String | Self::Text | Self::Char(_) | Self::Varchar(_)
        )
    }

    /// Whether two logical types may appear on the two sides of a join
    /// predicate. Integer widths are interchangeable; everything else must
    /// match exactly.
    pub fn join_compatible(&self, other: &LogicalType) -> bool {
        let family = |ty: &LogicalType| match ty {
            Self::Int32 | Self::Int64 | Self::BigInt => 0u8,
            Self::String | Self::Text | Self::Char(_) | Self::Varchar(_) => 1,
            _ => 2,
        };

        match (family(self), family(other)) {
            (0, 0) | (1, 1) => true,
            _ => self == other,
        }
    }
}

/// A single column: name, logical type, and the flags that drive GraphQL
/// nullability and insert requirements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub logical_type: LogicalType,
    pub not_null: bool,
    pub primary_key: bool,
    pub auto_generated: bool,
    pub has_default: bool,
    pub description: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            not_null: false,
            primary_key: false,
            auto_generated: false,
            has_default: false,
            description: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column as (part of) the primary key. Primary keys are
    /// implicitly non-null.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Marks the column as produced by the database (serial, identity).
    /// Auto-generated columns are never required at insert.
    pub fn auto_generated(mut self) -> Self {
        self.auto_generated = true;
        self
    }

    /// Marks the column as carrying a database-side default at insert.
    pub fn has_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether an insert without this column must be rejected.
    pub fn insert_required(&self) -> bool {
        self.not_null && !self.has_default && !self.auto_generated
    }
}

/// Relation cardinality as seen from the owning table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    One,
    Many,
}

/// One column pair of a join predicate: `owning` lives on the owning table,
/// `target` on the related table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPair {
    pub owning: String,
    pub target: String,
}

/// A named relation from one table to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    /// Name of the relation field under the owning table's `SelectItem`.
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub join: Vec<JoinPair>,
}

impl RelationDef {
    pub fn one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::One,
            join: vec![],
        }
    }

    pub fn many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::Many,
            join: vec![],
        }
    }

    pub fn join(mut self, owning: impl Into<String>, target: impl Into<String>) -> Self {
        self.join.push(JoinPair {
            owning: owning.into(),
            target: target.into(),
        });
        self
    }
}

/// A table: logical name, columns, and outgoing relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub relations: Vec<RelationDef>,
    pub description: Option<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: vec![],
            relations: vec![],
            description: None,
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn find_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|rel| rel.name == name)
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|col| col.primary_key)
    }
}

/// Replacement join predicate for a relation, applied through
/// [`CompileOptions`](crate::CompileOptions). A matching relation name on
/// the table is replaced; an unknown name is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationOverride {
    pub table: String,
    pub relation: RelationDef,
}

/// The full declared schema: an ordered set of tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationalSchema {
    tables: IndexMap<String, TableDef>,
}

impl RelationalSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub(crate) fn apply_override(&mut self, over: RelationOverride) {
        if let Some(table) = self.tables.get_mut(&over.table) {
            match table
                .relations
                .iter()
                .position(|rel| rel.name == over.relation.name)
            {
                Some(index) => table.relations[index] = over.relation,
                None => table.relations.push(over.relation),
            }
        }
    }

    /// Checks every build-time invariant: name hygiene, column/relation
    /// uniqueness, join predicates that reference existing columns of
    /// compatible types, and non-empty enum variant lists.
    pub fn validate(&self) -> Result<(), CompileError> {
        for table in self.tables.values() {
            if !is_valid_graphql_identifier(&table.name) {
                return Err(CompileError::InvalidName(table.name.clone()));
            }

            let mut seen_columns = Vec::new();
            for col in &table.columns {
                if !is_valid_graphql_identifier(&col.name) {
                    return Err(CompileError::InvalidName(col.name.clone()));
                }
                if seen_columns.contains(&&col.name) {
                    return Err(CompileError::DuplicateColumn {
                        table: table.name.clone(),
                        column: col.name.clone(),
                    });
                }
                seen_columns.push(&col.name);

                if let LogicalType::Enum(variants) = &col.logical_type {
                    if variants.is_empty() {
                        return Err(CompileError::EmptyEnum {
                            table: table.name.clone(),
                            column: col.name.clone(),
                        });
                    }
                }
            }

            let mut seen_relations = Vec::new();
            for rel in &table.relations {
                if !is_valid_graphql_identifier(&rel.name) {
                    return Err(CompileError::InvalidName(rel.name.clone()));
                }
                if seen_relations.contains(&&rel.name) {
                    return Err(CompileError::DuplicateRelation {
                        table: table.name.clone(),
                        relation: rel.name.clone(),
                    });
                }
                seen_relations.push(&rel.name);

                if table.find_column(&rel.name).is_some() {
                    return Err(CompileError::RelationColumnClash {
                        table: table.name.clone(),
                        relation: rel.name.clone(),
                    });
                }

                let target = self.tables.get(&rel.target).ok_or_else(|| {
                    CompileError::UnknownRelationTarget {
                        table: table.name.clone(),
                        relation: rel.name.clone(),
                        target: rel.target.clone(),
                    }
                })?;

                if rel.join.is_empty() {
                    return Err(CompileError::EmptyJoin {
                        table: table.name.clone(),
                        relation: rel.name.clone(),
                    });
                }

                for pair in &rel.join {
                    let owning = table.find_column(&pair.owning).ok_or_else(|| {
                        CompileError::UnknownJoinColumn {
                            table: table.name.clone(),
                            relation: rel.name.clone(),
                            column: pair.owning.clone(),
                        }
                    })?;
                    let related = target.find_column(&pair.target).ok_or_else(|| {
                        CompileError::UnknownJoinColumn {
                            table: table.name.clone(),
                            relation: rel.name.clone(),
                            column: pair.target.clone(),
                        }
                    })?;

                    if !owning.logical_type.join_compatible(&related.logical_type) {
                        return Err(CompileError::IncompatibleJoin {
                            table: table.name.clone(),
                            relation: rel.name.clone(),
                            owning: pair.owning.clone(),
                            target: pair.target.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}
