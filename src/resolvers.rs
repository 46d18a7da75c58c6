//! Resolver bodies for the generated fields.
//!
//! Every resolver follows the same pipeline: build a [`SelectionPlan`] from
//! the field's own AST, translate the arguments, dispatch one call to the
//! executor, and marshal the returned rows back out. Relation
//! sub-selections ride inside that single call; nothing below the top
//! level touches the executor again.

use std::sync::Arc;

use async_graphql::dynamic::{FieldFuture, ResolverContext};
use async_graphql::{ErrorExtensions, Name, Value};
use indexmap::IndexMap;
use tracing::debug;

use crate::args;
use crate::codec::marshal_out;
use crate::entities::ResolverState;
use crate::error::ResolveError;
use crate::executor::{DbValue, Row};
use crate::planner::{self, PlanContext, SelectionPlan};
use crate::schema::{Cardinality, TableDef};
use crate::utils::{item_type_name, select_item_type_name};

fn plan_context<'a>(state: &'a ResolverState, ctx: &'a ResolverContext<'_>) -> PlanContext<'a> {
    PlanContext {
        schema: &state.schema,
        dialect: state.dialect,
        fragments: &ctx.query_env.fragments,
        variables: &ctx.query_env.variables,
    }
}

pub(crate) fn select_many_resolver(
    state: ResolverState,
    table: Arc<TableDef>,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let field = &ctx.item.node;
        let object_type = select_item_type_name(&table.name);

        let plan = planner::plan_selection(
            &plan_context(&state, &ctx),
            &table,
            &object_type,
            &field.selection_set.node,
            true,
        )
        .map_err(|e| e.extend())?;

        let raw = args::const_arguments(field, &ctx.query_env.variables).map_err(|e| e.extend())?;
        let translated = args::translate_select_args(&raw, &table, state.dialect, false)
            .map_err(|e| e.extend())?;

        debug!(table = %table.name, "executing collection select");
        let query = plan
            .clone()
            .into_select_query(translated, &state.schema, &table);
        let rows = state
            .executor
            .select_many(&table.name, query)
            .await
            .map_err(|e| ResolveError::from(e).extend())?;

        let value = rows_to_value(&state, &table, &plan, rows).map_err(|e| e.extend())?;
        Ok(Some(value))
    })
}

pub(crate) fn select_first_resolver(
    state: ResolverState,
    table: Arc<TableDef>,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let field = &ctx.item.node;
        let object_type = select_item_type_name(&table.name);

        let plan = planner::plan_selection(
            &plan_context(&state, &ctx),
            &table,
            &object_type,
            &field.selection_set.node,
            true,
        )
        .map_err(|e| e.extend())?;

        let raw = args::const_arguments(field, &ctx.query_env.variables).map_err(|e| e.extend())?;
        let translated = args::translate_select_args(&raw, &table, state.dialect, true)
            .map_err(|e| e.extend())?;

        debug!(table = %table.name, "executing single-row select");
        let query = plan
            .clone()
            .into_select_query(translated, &state.schema, &table);
        let row = state
            .executor
            .select_first(&table.name, query)
            .await
            .map_err(|e| ResolveError::from(e).extend())?;

        // No match is null, not an error.
        match row {
            Some(row) => {
                let value = row_to_value(&state, &table, &plan, row).map_err(|e| e.extend())?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    })
}

pub(crate) fn insert_single_resolver(
    state: ResolverState,
    table: Arc<TableDef>,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let field = &ctx.item.node;
        let raw = args::const_arguments(field, &ctx.query_env.variables).map_err(|e| e.extend())?;
        let values = raw
            .get("values")
            .ok_or_else(|| ResolveError::validation("missing `values` argument").extend())?;
        let row = args::translate_insert_row(values, &table, state.dialect)
            .map_err(|e| e.extend())?;

        debug!(table = %table.name, "executing single insert");

        if !state.dialect.supports_returning() {
            state
                .executor
                .insert_one(&table.name, row)
                .await
                .map_err(|e| ResolveError::from(e).extend())?;
            return Ok(Some(success_value()));
        }

        let plan = item_plan(&state, &ctx, &table)?;
        let inserted = state
            .executor
            .insert_one(&table.name, row)
            .await
            .map_err(|e| ResolveError::from(e).extend())?;

        match inserted {
            Some(row) => {
                let value = row_to_value(&state, &table, &plan, row).map_err(|e| e.extend())?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    })
}

pub(crate) fn insert_resolver(
    state: ResolverState,
    table: Arc<TableDef>,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let field = &ctx.item.node;
        let raw = args::const_arguments(field, &ctx.query_env.variables).map_err(|e| e.extend())?;
        let values = raw
            .get("values")
            .ok_or_else(|| ResolveError::validation("missing `values` argument").extend())?;
        let rows = args::translate_insert_rows(values, &table, state.dialect)
            .map_err(|e| e.extend())?;

        debug!(table = %table.name, count = rows.len(), "executing bulk insert");

        if !state.dialect.supports_returning() {
            state
                .executor
                .insert(&table.name, rows)
                .await
                .map_err(|e| ResolveError::from(e).extend())?;
            return Ok(Some(success_value()));
        }

        let plan = item_plan(&state, &ctx, &table)?;
        let inserted = state
            .executor
            .insert(&table.name, rows)
            .await
            .map_err(|e| ResolveError::from(e).extend())?;

        let value = rows_to_value(&state, &table, &plan, inserted).map_err(|e| e.extend())?;
        Ok(Some(value))
    })
}

pub(crate) fn update_resolver(
    state: ResolverState,
    table: Arc<TableDef>,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let field = &ctx.item.node;
        let raw = args::const_arguments(field, &ctx.query_env.variables).map_err(|e| e.extend())?;
        let set = raw
            .get("set")
            .ok_or_else(|| ResolveError::validation("missing `set` argument").extend())?;
        let set_row =
            args::translate_update_set(set, &table, state.dialect).map_err(|e| e.extend())?;
        let filter = translate_optional_filter(&raw, &state, &table).map_err(|e| e.extend())?;

        debug!(table = %table.name, "executing update");

        if !state.dialect.supports_returning() {
            state
                .executor
                .update(&table.name, set_row, filter)
                .await
                .map_err(|e| ResolveError::from(e).extend())?;
            return Ok(Some(success_value()));
        }

        let plan = item_plan(&state, &ctx, &table)?;
        let updated = state
            .executor
            .update(&table.name, set_row, filter)
            .await
            .map_err(|e| ResolveError::from(e).extend())?;

        let value = rows_to_value(&state, &table, &plan, updated).map_err(|e| e.extend())?;
        Ok(Some(value))
    })
}

pub(crate) fn delete_resolver(
    state: ResolverState,
    table: Arc<TableDef>,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let field = &ctx.item.node;
        let raw = args::const_arguments(field, &ctx.query_env.variables).map_err(|e| e.extend())?;
        let filter = translate_optional_filter(&raw, &state, &table).map_err(|e| e.extend())?;

        debug!(table = %table.name, "executing delete");

        if !state.dialect.supports_returning() {
            state
                .executor
                .delete(&table.name, filter)
                .await
                .map_err(|e| ResolveError::from(e).extend())?;
            return Ok(Some(success_value()));
        }

        let plan = item_plan(&state, &ctx, &table)?;
        let deleted = state
            .executor
            .delete(&table.name, filter)
            .await
            .map_err(|e| ResolveError::from(e).extend())?;

        let value = rows_to_value(&state, &table, &plan, deleted).map_err(|e| e.extend())?;
        Ok(Some(value))
    })
}

fn item_plan(
    state: &ResolverState,
    ctx: &ResolverContext<'_>,
    table: &TableDef,
) -> Result<SelectionPlan, async_graphql::Error> {
    let object_type = item_type_name(&table.name);
    planner::plan_selection(
        &plan_context(state, ctx),
        table,
        &object_type,
        &ctx.item.node.selection_set.node,
        false,
    )
    .map_err(|e| e.extend())
}

fn translate_optional_filter(
    raw: &IndexMap<Name, Value>,
    state: &ResolverState,
    table: &TableDef,
) -> Result<Option<crate::executor::FilterNode>, ResolveError> {
    match raw.get("where") {
        Some(value) if !matches!(value, Value::Null) => {
            Ok(Some(args::translate_filters(value, table, state.dialect)?))
        }
        _ => Ok(None),
    }
}

fn success_value() -> Value {
    let mut map = IndexMap::new();
    map.insert(Name::new("isSuccess"), Value::Boolean(true));
    Value::Object(map)
}

/// Marshals executor rows into the GraphQL value tree the object fields
/// read from. Only explicitly requested columns survive, so primary keys
/// the planner added silently never show up in the response.
fn rows_to_value(
    state: &ResolverState,
    table: &TableDef,
    plan: &SelectionPlan,
    rows: Vec<Row>,
) -> Result<Value, ResolveError> {
    rows.into_iter()
        .map(|row| row_to_value(state, table, plan, row))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn row_to_value(
    state: &ResolverState,
    table: &TableDef,
    plan: &SelectionPlan,
    row: Row,
) -> Result<Value, ResolveError> {
    let mut map = IndexMap::new();

    for column_name in &plan.requested {
        let column = table.find_column(column_name).ok_or_else(|| {
            ResolveError::validation(format!(
                "unknown column `{column_name}` on `{}`",
                table.name
            ))
        })?;
        let db = row.get(column_name.as_str()).cloned().unwrap_or(DbValue::Null);
        map.insert(
            Name::new(column_name),
            marshal_out(state.dialect, &column.logical_type, !column.not_null, &db)?,
        );
    }

    for (key, relation_plan) in &plan.relations {
        let relation = table.find_relation(&relation_plan.relation).ok_or_else(|| {
            ResolveError::validation(format!(
                "unknown relation `{}` on `{}`",
                relation_plan.relation, table.name
            ))
        })?;
        let target = state.schema.get(&relation.target).ok_or_else(|| {
            ResolveError::validation(format!("unknown table `{}`", relation.target))
        })?;

        let nested = row.get(key.as_str()).cloned();
        let value = match (relation.cardinality, nested) {
            (Cardinality::Many, Some(DbValue::Rows(rows))) => Value::List(
                rows.into_iter()
                    .map(|r| row_to_value(state, target, &relation_plan.plan, r))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            (Cardinality::Many, _) => Value::List(vec![]),
            (Cardinality::One, Some(DbValue::Row(r))) => {
                row_to_value(state, target, &relation_plan.plan, *r)?
            }
            (Cardinality::One, _) => Value::Null,
        };

        map.insert(Name::new(key), value);
    }

    Ok(Value::Object(map))
}
