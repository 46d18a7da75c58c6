//! Selection planning.
//!
//! Flattens the selection set of an incoming field (including fragment
//! spreads and inline fragments) into a [`SelectionPlan`]: the columns to
//! fetch plus a nested plan per relation, keyed by response key. The plan is
//! what the executor receives, so relation expansion is pushed down in a
//! single relational request instead of resolving per-row.
//!
//! Planning works on the raw parsed operation (the resolver's `ctx.item`
//! plus the operation's fragment map and variables) because nested relation
//! arguments never reach a resolver of their own: they are translated here,
//! at plan time.

use std::collections::HashMap;

use async_graphql::parser::types::{FragmentDefinition, Selection, SelectionSet};
use async_graphql::{Name, Positioned, Variables};
use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::args::{self, TranslatedArgs};
use crate::error::ResolveError;
use crate::executor::{RelationQuery, SelectQuery};
use crate::schema::{Cardinality, Dialect, RelationalSchema, TableDef};
use crate::utils::relation_type_name;

/// Everything the planner needs besides the selection itself.
pub struct PlanContext<'a> {
    pub schema: &'a RelationalSchema,
    pub dialect: Dialect,
    pub fragments: &'a HashMap<Name, Positioned<FragmentDefinition>>,
    pub variables: &'a Variables,
}

/// The flattened plan for one object level.
///
/// `columns` always contains the table's primary-key columns; the ones the
/// client did not ask for are absent from `requested` and are stripped back
/// out when the rows are marshaled for output.
#[derive(Debug, Clone, Default)]
pub struct SelectionPlan {
    pub columns: IndexSet<String>,
    pub requested: IndexSet<String>,
    pub relations: IndexMap<String, RelationPlan>,
    pub requests_typename: bool,
}

/// A nested relation selection, keyed in [`SelectionPlan::relations`] by
/// response key so aliased duplicates fetch independently.
#[derive(Debug, Clone)]
pub struct RelationPlan {
    pub relation: String,
    pub args: TranslatedArgs,
    pub plan: SelectionPlan,
}

impl SelectionPlan {
    /// GraphQL merge semantics for duplicate response keys: selections
    /// union, the earliest argument set wins.
    fn merge_from(&mut self, other: SelectionPlan) {
        for column in other.columns {
            self.columns.insert(column);
        }
        for column in other.requested {
            self.requested.insert(column);
        }
        for (key, relation) in other.relations {
            match self.relations.entry(key) {
                Entry::Occupied(mut existing) => {
                    existing.get_mut().plan.merge_from(relation.plan)
                }
                Entry::Vacant(slot) => {
                    slot.insert(relation);
                }
            }
        }
        self.requests_typename |= other.requests_typename;
    }

    /// Lowers the plan into the executor's query shape, attaching join
    /// predicates so the executor never needs the relational schema.
    pub fn into_select_query(
        self,
        translated: TranslatedArgs,
        schema: &RelationalSchema,
        table: &TableDef,
    ) -> SelectQuery {
        let mut relations = IndexMap::new();
        for (key, relation_plan) in self.relations {
            let Some(relation) = table.find_relation(&relation_plan.relation) else {
                continue;
            };
            let Some(target) = schema.get(&relation.target) else {
                continue;
            };
            relations.insert(
                key,
                RelationQuery {
                    relation: relation.name.clone(),
                    target: relation.target.clone(),
                    cardinality: relation.cardinality,
                    join: relation.join.clone(),
                    query: relation_plan
                        .plan
                        .into_select_query(relation_plan.args, schema, target),
                },
            );
        }

        SelectQuery {
            columns: self.columns.into_iter().collect(),
            filter: translated.filter,
            order_by: translated.order_by,
            offset: translated.offset,
            limit: translated.limit,
            relations,
        }
    }
}

/// Plans a selection set against `table`, whose GraphQL object type is
/// `object_type` (used for fragment type conditions). Relation fields are
/// only admitted on `SelectItem` levels.
pub fn plan_selection(
    ctx: &PlanContext<'_>,
    table: &TableDef,
    object_type: &str,
    selection_set: &SelectionSet,
    allow_relations: bool,
) -> Result<SelectionPlan, ResolveError> {
    let mut plan = SelectionPlan::default();
    collect(ctx, table, object_type, selection_set, allow_relations, &mut plan)?;

    // Primary keys ride along to keep joins and ordering stable.
    for pk in table.primary_key_columns() {
        plan.columns.insert(pk.name.clone());
    }

    Ok(plan)
}

fn collect(
    ctx: &PlanContext<'_>,
    table: &TableDef,
    object_type: &str,
    selection_set: &SelectionSet,
    allow_relations: bool,
    plan: &mut SelectionPlan,
) -> Result<(), ResolveError> {
    for item in &selection_set.items {
        match &item.node {
            Selection::Field(field) => {
                let field = &field.node;
                let name = field.name.node.as_str();

                if name == "__typename" {
                    plan.requests_typename = true;
                    continue;
                }

                if let Some(column) = table.find_column(name) {
                    if !ctx.dialect.supports_type(&column.logical_type) {
                        return Err(ResolveError::validation(format!(
                            "unknown field `{name}` on `{object_type}`"
                        )));
                    }
                    plan.columns.insert(column.name.clone());
                    plan.requested.insert(column.name.clone());
                    continue;
                }

                let relation = if allow_relations {
                    table.find_relation(name)
                } else {
                    None
                };

                let Some(relation) = relation else {
                    return Err(ResolveError::validation(format!(
                        "unknown field `{name}` on `{object_type}`"
                    )));
                };

                let key = field
                    .alias
                    .as_ref()
                    .map(|alias| alias.node.to_string())
                    .unwrap_or_else(|| name.to_string());

                let target = ctx.schema.get(&relation.target).ok_or_else(|| {
                    ResolveError::validation(format!(
                        "relation `{name}` targets unknown table `{}`",
                        relation.target
                    ))
                })?;

                let wrapper = relation_type_name(&table.name, &relation.name);
                let sub = plan_selection(ctx, target, &wrapper, &field.selection_set.node, false)?;

                match plan.relations.entry(key) {
                    Entry::Occupied(mut existing) => existing.get_mut().plan.merge_from(sub),
                    Entry::Vacant(slot) => {
                        let raw = args::const_arguments(field, ctx.variables)?;
                        let translated = args::translate_select_args(
                            &raw,
                            target,
                            ctx.dialect,
                            relation.cardinality == Cardinality::One,
                        )?;
                        slot.insert(RelationPlan {
                            relation: relation.name.clone(),
                            args: translated,
                            plan: sub,
                        });
                    }
                }
            }
            Selection::FragmentSpread(spread) => {
                let name = &spread.node.fragment_name.node;
                let fragment = ctx.fragments.get(name).ok_or_else(|| {
                    ResolveError::validation(format!("unknown fragment `{name}`"))
                })?;

                let condition = fragment.node.type_condition.node.on.node.as_str();
                if condition != object_type {
                    debug!("skipping fragment `{name}` with type condition `{condition}`");
                    continue;
                }

                collect(
                    ctx,
                    table,
                    object_type,
                    &fragment.node.selection_set.node,
                    allow_relations,
                    plan,
                )?;
            }
            Selection::InlineFragment(inline) => {
                if let Some(condition) = &inline.node.type_condition {
                    if condition.node.on.node.as_str() != object_type {
                        continue;
                    }
                }

                collect(
                    ctx,
                    table,
                    object_type,
                    &inline.node.selection_set.node,
                    allow_relations,
                    plan,
                )?;
            }
        }
    }

    Ok(())
}
