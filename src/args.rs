//! Translation of GraphQL arguments into executor calls.
//!
//! `where` becomes a [`FilterNode`] tree, `orderBy` a prioritized list of
//! `(column, direction)` pairs, `offset`/`limit` validated pagination
//! bounds, and `values`/`set` codec-marshaled rows. Operand values pass
//! through the value codec on the way in, so executors only ever see
//! dialect-native values.
//!
//! Because relation sub-selections are pushed down to the executor, nested
//! relation arguments never reach a resolver of their own; everything here
//! works on resolved constant values, with [`const_arguments`] folding
//! operation variables into the field's raw argument list first.

use async_graphql::{Name, Value, Variables};
use indexmap::IndexMap;
use tracing::debug;

use crate::codec::marshal_in;
use crate::error::ResolveError;
use crate::executor::{
    FilterCondition, FilterNode, FilterOp, OrderByPair, OrderDirection, Row,
};
use crate::schema::{ColumnDef, Dialect, TableDef};

/// Translated select arguments, ready for a [`SelectQuery`](crate::executor::SelectQuery).
#[derive(Debug, Clone, Default)]
pub struct TranslatedArgs {
    pub filter: Option<FilterNode>,
    pub order_by: Vec<OrderByPair>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// Resolves a field's raw AST arguments against the operation variables.
pub fn const_arguments(
    field: &async_graphql::parser::types::Field,
    variables: &Variables,
) -> Result<IndexMap<Name, Value>, ResolveError> {
    field
        .arguments
        .iter()
        .map(|(name, value)| {
            let resolved = value.node.clone().into_const_with(|var_name| {
                Ok::<_, ResolveError>(variables.get(&var_name).cloned().unwrap_or(Value::Null))
            })?;
            Ok((name.node.clone(), resolved))
        })
        .collect()
}

/// Translates `where`/`orderBy`/`offset`/`limit` for a select. Single-row
/// fields carry no `limit` argument; their limit is implicitly one.
pub fn translate_select_args(
    args: &IndexMap<Name, Value>,
    table: &TableDef,
    dialect: Dialect,
    single: bool,
) -> Result<TranslatedArgs, ResolveError> {
    let mut translated = TranslatedArgs::default();

    if let Some(value) = args.get("where") {
        if !matches!(value, Value::Null) {
            translated.filter = Some(translate_filters(value, table, dialect)?);
        }
    }

    if let Some(value) = args.get("orderBy") {
        if !matches!(value, Value::Null) {
            translated.order_by = translate_order_by(value, table)?;
        }
    }

    if let Some(value) = args.get("offset") {
        if !matches!(value, Value::Null) {
            translated.offset = Some(non_negative_int(value, "offset")?);
        }
    }

    if !single {
        if let Some(value) = args.get("limit") {
            if !matches!(value, Value::Null) {
                let limit = non_negative_int(value, "limit")?;
                if limit == 0 {
                    return Err(ResolveError::argument("limit must be positive"));
                }
                translated.limit = Some(limit);
            }
        }
    }

    Ok(translated)
}

fn non_negative_int(value: &Value, name: &str) -> Result<u64, ResolveError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ResolveError::argument(format!("{name} must be non-negative"))),
        other => Err(ResolveError::argument(format!(
            "{name} must be an integer, got {other}"
        ))),
    }
}

/// Translates a `where` input object into a filter tree. Sibling entries of
/// a node combine with AND; an `OR` list combines its children with OR and
/// joins the siblings as one AND part. An empty object matches everything.
pub fn translate_filters(
    value: &Value,
    table: &TableDef,
    dialect: Dialect,
) -> Result<FilterNode, ResolveError> {
    let map = match value {
        Value::Object(map) => map,
        Value::Null => return Ok(FilterNode::match_all()),
        other => {
            return Err(ResolveError::argument(format!(
                "where must be an input object, got {other}"
            )));
        }
    };

    let mut parts = Vec::new();

    for (key, entry) in map {
        match key.as_str() {
            "OR" => parts.push(FilterNode::Or(filter_list(entry, table, dialect)?)),
            "AND" => parts.push(FilterNode::And(filter_list(entry, table, dialect)?)),
            name => {
                let column = table.find_column(name).ok_or_else(|| {
                    ResolveError::argument(format!("unknown column `{name}` in where"))
                })?;
                let ops = match entry {
                    Value::Object(ops) => ops,
                    other => {
                        return Err(ResolveError::argument(format!(
                            "filter for `{name}` must be an input object, got {other}"
                        )));
                    }
                };
                for (op, operand) in ops {
                    parts.push(FilterNode::Cond(FilterCondition {
                        column: name.to_string(),
                        op: translate_operator(column, op.as_str(), operand, dialect)?,
                    }));
                }
            }
        }
    }

    Ok(FilterNode::And(parts))
}

fn filter_list(
    value: &Value,
    table: &TableDef,
    dialect: Dialect,
) -> Result<Vec<FilterNode>, ResolveError> {
    match value {
        Value::List(items) => items
            .iter()
            .map(|item| translate_filters(item, table, dialect))
            .collect(),
        other => Err(ResolveError::argument(format!(
            "OR/AND must be a list of filter objects, got {other}"
        ))),
    }
}

fn translate_operator(
    column: &ColumnDef,
    op: &str,
    operand: &Value,
    dialect: Dialect,
) -> Result<FilterOp, ResolveError> {
    let ty = &column.logical_type;
    let scalar = |value: &Value| marshal_in(dialect, ty, false, value);
    let scalar_list = |value: &Value| match value {
        Value::List(items) => items
            .iter()
            .map(|item| marshal_in(dialect, ty, false, item))
            .collect::<Result<Vec<_>, _>>(),
        other => Err(ResolveError::argument(format!(
            "`{op}` expects a list, got {other}"
        ))),
    };
    let element_list = |value: &Value| {
        // Array operators take element values, not whole arrays.
        let inner = match ty {
            crate::schema::LogicalType::Array(inner) => inner.as_ref(),
            _ => ty,
        };
        match value {
            Value::List(items) => items
                .iter()
                .map(|item| marshal_in(dialect, inner, false, item))
                .collect::<Result<Vec<_>, _>>(),
            other => Err(ResolveError::argument(format!(
                "`{op}` expects a list, got {other}"
            ))),
        }
    };
    let pattern = |value: &Value| match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(ResolveError::argument(format!(
            "`{op}` expects a string pattern, got {other}"
        ))),
    };
    let ordered = |op: &str| {
        if ty.is_ordered() {
            Ok(())
        } else {
            Err(ResolveError::argument(format!(
                "operator `{op}` is not available for column `{}`",
                column.name
            )))
        }
    };
    let stringy = |op: &str, ilike: bool| {
        if !ty.is_stringy() {
            return Err(ResolveError::argument(format!(
                "operator `{op}` is not available for column `{}`",
                column.name
            )));
        }
        if ilike && !dialect.supports_ilike() {
            return Err(ResolveError::argument(format!(
                "operator `{op}` is not available in this dialect"
            )));
        }
        Ok(())
    };
    let array = |op: &str| match ty {
        crate::schema::LogicalType::Array(_) if dialect.supports_type(ty) => Ok(()),
        _ => Err(ResolveError::argument(format!(
            "operator `{op}` is not available for column `{}`",
            column.name
        ))),
    };

    let translated = match op {
        "eq" => FilterOp::Eq(scalar(operand)?),
        "ne" => FilterOp::Ne(scalar(operand)?),
        "isNull" => match operand {
            Value::Boolean(b) => FilterOp::IsNull(*b),
            other => {
                return Err(ResolveError::argument(format!(
                    "`isNull` expects a boolean, got {other}"
                )));
            }
        },
        "inArray" => FilterOp::InArray(scalar_list(operand)?),
        "notInArray" => FilterOp::NotInArray(scalar_list(operand)?),
        "gt" => {
            ordered(op)?;
            FilterOp::Gt(scalar(operand)?)
        }
        "gte" => {
            ordered(op)?;
            FilterOp::Gte(scalar(operand)?)
        }
        "lt" => {
            ordered(op)?;
            FilterOp::Lt(scalar(operand)?)
        }
        "lte" => {
            ordered(op)?;
            FilterOp::Lte(scalar(operand)?)
        }
        "like" => {
            stringy(op, false)?;
            FilterOp::Like(pattern(operand)?)
        }
        "notLike" => {
            stringy(op, false)?;
            FilterOp::NotLike(pattern(operand)?)
        }
        "ilike" => {
            stringy(op, true)?;
            FilterOp::ILike(pattern(operand)?)
        }
        "notIlike" => {
            stringy(op, true)?;
            FilterOp::NotILike(pattern(operand)?)
        }
        "arrayContains" => {
            array(op)?;
            FilterOp::ArrayContains(element_list(operand)?)
        }
        "arrayContained" => {
            array(op)?;
            FilterOp::ArrayContained(element_list(operand)?)
        }
        "arrayOverlaps" => {
            array(op)?;
            FilterOp::ArrayOverlaps(element_list(operand)?)
        }
        unknown => {
            debug!("rejecting unknown filter operator `{unknown}`");
            return Err(ResolveError::argument(format!(
                "unknown filter operator `{unknown}`"
            )));
        }
    };

    Ok(translated)
}

/// Translates `orderBy` into the executor's ordered pair list: entries
/// sorted by descending priority, ties broken by declared column order.
pub fn translate_order_by(
    value: &Value,
    table: &TableDef,
) -> Result<Vec<OrderByPair>, ResolveError> {
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(ResolveError::argument(format!(
                "orderBy must be an input object, got {other}"
            )));
        }
    };

    for key in map.keys() {
        if table.find_column(key.as_str()).is_none() {
            return Err(ResolveError::validation(format!(
                "unknown column `{key}` in orderBy"
            )));
        }
    }

    // Collect in declared column order so the stable sort keeps that order
    // for equal priorities.
    let mut entries = Vec::new();
    for column in &table.columns {
        if let Some(entry) = map.get(column.name.as_str()) {
            let arg = match entry {
                Value::Object(arg) => arg,
                other => {
                    return Err(ResolveError::argument(format!(
                        "orderBy entry for `{}` must be an input object, got {other}",
                        column.name
                    )));
                }
            };

            let priority = match arg.get("priority") {
                Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                    ResolveError::argument("orderBy priority must be an integer")
                })?,
                _ => {
                    return Err(ResolveError::argument(format!(
                        "orderBy entry for `{}` is missing an integer priority",
                        column.name
                    )));
                }
            };

            let direction = match arg.get("direction") {
                Some(Value::Enum(name)) => direction_from_str(name.as_str())?,
                Some(Value::String(s)) => direction_from_str(s)?,
                _ => {
                    return Err(ResolveError::argument(format!(
                        "orderBy entry for `{}` is missing a direction",
                        column.name
                    )));
                }
            };

            entries.push((
                priority,
                OrderByPair {
                    column: column.name.clone(),
                    direction,
                },
            ));
        }
    }

    entries.sort_by(|a, b| b.0.cmp(&a.0));

    Ok(entries.into_iter().map(|(_, pair)| pair).collect())
}

fn direction_from_str(raw: &str) -> Result<OrderDirection, ResolveError> {
    match raw {
        "asc" => Ok(OrderDirection::Asc),
        "desc" => Ok(OrderDirection::Desc),
        other => Err(ResolveError::argument(format!(
            "unknown order direction `{other}`"
        ))),
    }
}

/// Translates one `values` entry for insert. Unknown columns and omitted
/// required columns are rejected before any database contact.
pub fn translate_insert_row(
    value: &Value,
    table: &TableDef,
    dialect: Dialect,
) -> Result<Row, ResolveError> {
    let row = translate_row(value, table, dialect, "values")?;

    for column in &table.columns {
        if dialect.supports_type(&column.logical_type)
            && column.insert_required()
            && !row.contains_key(&column.name)
        {
            return Err(ResolveError::validation(format!(
                "missing required column `{}` for insert into `{}`",
                column.name, table.name
            )));
        }
    }

    Ok(row)
}

/// Translates the `values` list of a bulk insert.
pub fn translate_insert_rows(
    value: &Value,
    table: &TableDef,
    dialect: Dialect,
) -> Result<Vec<Row>, ResolveError> {
    match value {
        Value::List(items) => items
            .iter()
            .map(|item| translate_insert_row(item, table, dialect))
            .collect(),
        other => Err(ResolveError::validation(format!(
            "values must be a list of input objects, got {other}"
        ))),
    }
}

/// Translates the `set` object of an update. Omitted columns stay
/// unchanged; there is no required-column check.
pub fn translate_update_set(
    value: &Value,
    table: &TableDef,
    dialect: Dialect,
) -> Result<Row, ResolveError> {
    translate_row(value, table, dialect, "set")
}

fn translate_row(
    value: &Value,
    table: &TableDef,
    dialect: Dialect,
    arg_name: &str,
) -> Result<Row, ResolveError> {
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(ResolveError::validation(format!(
                "{arg_name} must be an input object, got {other}"
            )));
        }
    };

    let mut row = Row::new();
    for (key, entry) in map {
        let column = table.find_column(key.as_str()).ok_or_else(|| {
            ResolveError::validation(format!(
                "unknown column `{key}` in {arg_name} for `{}`",
                table.name
            ))
        })?;
        if !dialect.supports_type(&column.logical_type) {
            return Err(ResolveError::validation(format!(
                "unknown column `{key}` in {arg_name} for `{}`",
                table.name
            )));
        }
        row.insert(
            column.name.clone(),
            marshal_in(dialect, &column.logical_type, !column.not_null, entry)?,
        );
    }

    Ok(row)
}
