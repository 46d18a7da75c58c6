//! graph-tables compiles a declarative relational schema (tables with
//! typed columns, primary keys, and named relations) into a runtime
//! GraphQL schema with full CRUD and query coverage, built on
//! async-graphql's dynamic API.
//!
//! The compiler owns type derivation, operation generation, selection
//! planning, argument translation, and value marshaling. Everything
//! relational happens behind the [`Executor`] trait the caller supplies;
//! the compiler itself reads no environment, opens no sockets, and builds
//! no SQL.
//!
//! ```ignore
//! let schema = RelationalSchema::new()
//!     .table(
//!         TableDef::new("Users")
//!             .column(ColumnDef::new("id", LogicalType::Int32).primary_key())
//!             .column(ColumnDef::new("name", LogicalType::String).not_null())
//!             .relation(RelationDef::many("posts", "Posts").join("id", "authorId")),
//!     )
//!     .table(/* ... */);
//!
//! let compiler = SchemaCompiler::new(CompileOptions::new(Dialect::Postgres));
//! let compiled = compiler.compile(schema, executor)?;
//! // compiled.schema is a ready async_graphql::dynamic::Schema;
//! // compiled.entities lets callers assemble custom roots instead.
//! ```

use std::sync::Arc;

use async_graphql::dynamic::{Object, Schema, SchemaBuilder};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod args;
pub mod codec;
pub mod entities;
pub mod error;
pub mod executor;
pub mod planner;
pub mod registry;
pub mod resolvers;
pub mod schema;
pub mod utils;

pub use crate::entities::{EntityBundle, ResolverState};
pub use crate::error::{CompileError, ErrorCategory, ExecutorError, ResolveError};
pub use crate::executor::{
    DbValue, Executor, FilterCondition, FilterNode, FilterOp, OrderByPair, OrderDirection,
    RelationQuery, Row, SelectQuery,
};
pub use crate::planner::{RelationPlan, SelectionPlan};
pub use crate::schema::{
    Cardinality, ColumnDef, Dialect, JoinPair, LogicalType, RelationDef, RelationOverride,
    RelationalSchema, TableDef,
};

/// Compilation options. The dialect is the only required knob; relation
/// overrides replace (or add) join predicates without touching the
/// descriptors, and the limits pass straight through to the schema builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOptions {
    pub dialect: Dialect,
    #[serde(default)]
    pub relations: Vec<RelationOverride>,
    #[serde(default)]
    pub limit_depth: Option<usize>,
    #[serde(default)]
    pub limit_complexity: Option<usize>,
}

impl CompileOptions {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            relations: vec![],
            limit_depth: None,
            limit_complexity: None,
        }
    }

    pub fn relation_override(mut self, over: RelationOverride) -> Self {
        self.relations.push(over);
        self
    }

    pub fn limit_depth(mut self, depth: usize) -> Self {
        self.limit_depth = Some(depth);
        self
    }

    pub fn limit_complexity(mut self, complexity: usize) -> Self {
        self.limit_complexity = Some(complexity);
        self
    }
}

/// The compiler's full output: the ready schema plus the entity bundle for
/// callers who want to compose custom roots.
pub struct CompiledSchema {
    pub schema: Schema,
    pub entities: IndexMap<String, EntityBundle>,
}

/// The compiled types and entities before root assembly. Lets callers
/// cherry-pick fields, rename them, and build their own Query/Mutation
/// objects.
pub struct EntitySet {
    registry: registry::TypeRegistry,
    pub entities: IndexMap<String, EntityBundle>,
    limit_depth: Option<usize>,
    limit_complexity: Option<usize>,
}

impl EntitySet {
    /// Registers every compiled type behind the given roots. The caller
    /// finishes the builder (optionally wiring extra types first).
    pub fn schema_builder(self, query: Object, mutation: Option<Object>) -> SchemaBuilder {
        let query_name = query.type_name().to_string();
        let mutation_name = mutation.as_ref().map(|m| m.type_name().to_string());

        let mut builder = Schema::build(&query_name, mutation_name.as_deref(), None);
        builder = builder.register(query);
        if let Some(mutation) = mutation {
            builder = builder.register(mutation);
        }
        builder = self.registry.register_all(builder);

        if let Some(depth) = self.limit_depth {
            builder = builder.limit_depth(depth);
        }
        if let Some(complexity) = self.limit_complexity {
            builder = builder.limit_complexity(complexity);
        }

        builder
    }
}

/// Compiles a [`RelationalSchema`] into GraphQL.
pub struct SchemaCompiler {
    options: CompileOptions,
}

impl SchemaCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Full compile: standard `Query`/`Mutation` roots carrying every
    /// table's six operations under their default names.
    pub fn compile(
        &self,
        schema: RelationalSchema,
        executor: Arc<dyn Executor>,
    ) -> Result<CompiledSchema, CompileError> {
        let set = self.compile_entities(schema, executor)?;

        let mut query = Object::new("Query");
        let mut mutation = Object::new("Mutation");
        for bundle in set.entities.values() {
            debug!(table = bundle.table_name(), "mounting default fields");
            for field in bundle.query_fields() {
                query = query.field(field);
            }
            for field in bundle.mutation_fields() {
                mutation = mutation.field(field);
            }
        }

        let entities = set.entities.clone();
        let builder = set.schema_builder(query, Some(mutation));
        let schema = builder
            .finish()
            .map_err(|e| CompileError::Build(e.to_string()))?;

        info!("compiled GraphQL schema for {} tables", entities.len());

        Ok(CompiledSchema { schema, entities })
    }

    /// Compiles types and entities only, leaving root assembly to the
    /// caller.
    pub fn compile_entities(
        &self,
        mut schema: RelationalSchema,
        executor: Arc<dyn Executor>,
    ) -> Result<EntitySet, CompileError> {
        for over in &self.options.relations {
            schema.apply_override(over.clone());
        }
        schema.validate()?;

        info!(
            tables = schema.len(),
            dialect = ?self.options.dialect,
            "compiling relational schema"
        );

        let schema = Arc::new(schema);
        let mut registry = registry::TypeRegistry::new(self.options.dialect);
        let state = ResolverState {
            schema: schema.clone(),
            executor,
            dialect: self.options.dialect,
        };

        let mut entities = IndexMap::new();
        for table in schema.tables() {
            registry.ensure_table_types(&schema, table);
            entities.insert(
                table.name.clone(),
                EntityBundle::new(state.clone(), Arc::new(table.clone())),
            );
        }

        Ok(EntitySet {
            registry,
            entities,
            limit_depth: self.options.limit_depth,
            limit_complexity: self.options.limit_complexity,
        })
    }
}
