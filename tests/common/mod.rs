//! Shared test support: an in-memory reference [`Executor`] that honors the
//! full contract, including filter trees, prioritized ordering, pagination,
//! nested relation realization, primary-key generation, and atomic inserts.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use graph_tables::{
    Cardinality, CompileOptions, CompiledSchema, ColumnDef, DbValue, Dialect, Executor,
    ExecutorError, FilterCondition, FilterNode, FilterOp, LogicalType, OrderDirection,
    RelationDef, RelationalSchema, Row, SchemaCompiler, SelectQuery, TableDef,
};
use indexmap::IndexMap;

pub fn row(pairs: &[(&str, DbValue)]) -> Row {
    let mut row = Row::new();
    for (key, value) in pairs {
        row.insert((*key).to_string(), value.clone());
    }
    row
}

pub fn int(value: i64) -> DbValue {
    DbValue::Int(value)
}

pub fn text(value: &str) -> DbValue {
    DbValue::Text(value.to_string())
}

/// The Users/Posts/Customers schema the end-to-end scenarios run against.
pub fn blog_schema() -> RelationalSchema {
    RelationalSchema::new()
        .table(
            TableDef::new("Users")
                .column(ColumnDef::new("id", LogicalType::Int32).primary_key())
                .column(ColumnDef::new("name", LogicalType::String).not_null())
                .column(ColumnDef::new(
                    "role",
                    LogicalType::Enum(vec!["admin".into(), "user".into()]),
                ))
                .relation(RelationDef::many("posts", "Posts").join("id", "authorId")),
        )
        .table(
            TableDef::new("Posts")
                .column(ColumnDef::new("id", LogicalType::Int32).primary_key())
                .column(ColumnDef::new("authorId", LogicalType::Int32).not_null())
                .column(ColumnDef::new("content", LogicalType::String).not_null())
                .relation(RelationDef::one("author", "Users").join("authorId", "id")),
        )
        .table(
            TableDef::new("Customers")
                .column(ColumnDef::new("id", LogicalType::Int32).primary_key())
                .column(ColumnDef::new("name", LogicalType::String).not_null()),
        )
}

/// Seeds from the specification's end-to-end scenarios.
pub fn seed(executor: &MemoryExecutor) {
    executor.seed(
        "Users",
        vec![
            row(&[("id", int(1)), ("name", text("FirstUser")), ("role", text("admin"))]),
            row(&[("id", int(2)), ("name", text("SecondUser")), ("role", DbValue::Null)]),
            row(&[("id", int(5)), ("name", text("FifthUser")), ("role", DbValue::Null)]),
        ],
    );
    executor.seed(
        "Posts",
        vec![
            row(&[("id", int(1)), ("authorId", int(1)), ("content", text("1MESSAGE"))]),
            row(&[("id", int(2)), ("authorId", int(1)), ("content", text("2MESSAGE"))]),
            row(&[("id", int(3)), ("authorId", int(1)), ("content", text("3MESSAGE"))]),
            row(&[("id", int(4)), ("authorId", int(5)), ("content", text("1MESSAGE"))]),
            row(&[("id", int(5)), ("authorId", int(5)), ("content", text("2MESSAGE"))]),
            row(&[("id", int(6)), ("authorId", int(1)), ("content", text("4MESSAGE"))]),
        ],
    );
    executor.seed(
        "Customers",
        vec![
            row(&[("id", int(1)), ("name", text("FirstCustomer"))]),
            row(&[("id", int(2)), ("name", text("SecondCustomer"))]),
        ],
    );
}

/// Opt-in test logging via `RUST_LOG`.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Compiles the blog schema against a fresh seeded executor.
pub fn compiled(dialect: Dialect) -> (CompiledSchema, Arc<MemoryExecutor>) {
    init_tracing();
    let schema = blog_schema();
    let executor = Arc::new(MemoryExecutor::new(schema.clone()));
    seed(&executor);
    let compiled = SchemaCompiler::new(CompileOptions::new(dialect))
        .compile(schema, executor.clone())
        .unwrap();
    (compiled, executor)
}

pub struct MemoryExecutor {
    schema: RelationalSchema,
    tables: Mutex<IndexMap<String, Vec<Row>>>,
}

impl MemoryExecutor {
    pub fn new(schema: RelationalSchema) -> Self {
        let mut tables = IndexMap::new();
        for table in schema.tables() {
            tables.insert(table.name.clone(), Vec::new());
        }
        Self {
            schema,
            tables: Mutex::new(tables),
        }
    }

    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }

    fn snapshot(&self) -> IndexMap<String, Vec<Row>> {
        self.tables.lock().unwrap().clone()
    }

    fn pk_columns(&self, table: &str) -> Vec<String> {
        self.schema
            .get(table)
            .map(|t| t.primary_key_columns().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    fn natural_sort(&self, table: &str, rows: &mut [Row]) {
        let pks = self.pk_columns(table);
        rows.sort_by(|a, b| {
            for pk in &pks {
                let ord = cmp_db(
                    a.get(pk).unwrap_or(&DbValue::Null),
                    b.get(pk).unwrap_or(&DbValue::Null),
                )
                .unwrap_or(Ordering::Equal);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    fn apply(
        &self,
        snapshot: &IndexMap<String, Vec<Row>>,
        table: &str,
        mut rows: Vec<Row>,
        query: &SelectQuery,
    ) -> Vec<Row> {
        if let Some(filter) = &query.filter {
            rows.retain(|row| eval_filter(filter, row));
        }

        if query.order_by.is_empty() {
            self.natural_sort(table, &mut rows);
        } else {
            rows.sort_by(|a, b| {
                for pair in &query.order_by {
                    let mut ord = cmp_db(
                        a.get(&pair.column).unwrap_or(&DbValue::Null),
                        b.get(&pair.column).unwrap_or(&DbValue::Null),
                    )
                    .unwrap_or(Ordering::Equal);
                    if pair.direction == OrderDirection::Desc {
                        ord = ord.reverse();
                    }
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(offset) = query.offset {
            let offset = offset.min(rows.len() as u64) as usize;
            rows.drain(..offset);
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }

        for row_entry in rows.iter_mut() {
            for (key, relation) in &query.relations {
                let candidates = snapshot.get(&relation.target).cloned().unwrap_or_default();
                let matched = candidates
                    .into_iter()
                    .filter(|candidate| {
                        relation.join.iter().all(|pair| {
                            db_eq(
                                row_entry.get(&pair.owning).unwrap_or(&DbValue::Null),
                                candidate.get(&pair.target).unwrap_or(&DbValue::Null),
                            )
                        })
                    })
                    .collect::<Vec<_>>();
                let realized = self.apply(snapshot, &relation.target, matched, &relation.query);
                let value = match relation.cardinality {
                    Cardinality::Many => DbValue::Rows(realized),
                    Cardinality::One => match realized.into_iter().next() {
                        Some(first) => DbValue::Row(Box::new(first)),
                        None => DbValue::Null,
                    },
                };
                row_entry.insert(key.clone(), value);
            }
        }

        rows
    }

    fn complete_rows(
        &self,
        table: &str,
        stored: &[Row],
        incoming: Vec<Row>,
    ) -> Result<Vec<Row>, ExecutorError> {
        let table_def = self
            .schema
            .get(table)
            .ok_or_else(|| ExecutorError::other(format!("unknown table `{table}`")))?;

        let mut prepared: Vec<Row> = Vec::new();
        for incoming_row in incoming {
            let mut complete = Row::new();
            for column in &table_def.columns {
                let value = match incoming_row.get(&column.name) {
                    Some(value) => value.clone(),
                    None if column.auto_generated => {
                        let next = stored
                            .iter()
                            .chain(prepared.iter())
                            .filter_map(|r| match r.get(&column.name) {
                                Some(DbValue::Int(i)) => Some(*i),
                                _ => None,
                            })
                            .max()
                            .unwrap_or(0)
                            + 1;
                        DbValue::Int(next)
                    }
                    None => DbValue::Null,
                };
                complete.insert(column.name.clone(), value);
            }

            for pk in self.pk_columns(table) {
                let candidate = complete.get(&pk).cloned().unwrap_or(DbValue::Null);
                let collision = stored
                    .iter()
                    .chain(prepared.iter())
                    .any(|r| db_eq(r.get(&pk).unwrap_or(&DbValue::Null), &candidate));
                if collision {
                    return Err(ExecutorError::constraint(format!(
                        "UNIQUE constraint failed: {table}.{pk}"
                    )));
                }
            }

            prepared.push(complete);
        }

        Ok(prepared)
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn select_many(
        &self,
        table: &str,
        query: SelectQuery,
    ) -> Result<Vec<Row>, ExecutorError> {
        let snapshot = self.snapshot();
        let rows = snapshot
            .get(table)
            .cloned()
            .ok_or_else(|| ExecutorError::other(format!("unknown table `{table}`")))?;
        Ok(self.apply(&snapshot, table, rows, &query))
    }

    async fn select_first(
        &self,
        table: &str,
        query: SelectQuery,
    ) -> Result<Option<Row>, ExecutorError> {
        let mut rows = self.select_many(table, query).await?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.remove(0)))
        }
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, ExecutorError> {
        let mut tables = self.tables.lock().unwrap();
        let stored = tables
            .get(table)
            .ok_or_else(|| ExecutorError::other(format!("unknown table `{table}`")))?;

        // All-or-nothing: validate the whole batch before writing anything.
        let prepared = self.complete_rows(table, stored, rows)?;

        tables
            .get_mut(table)
            .expect("checked above")
            .extend(prepared.clone());
        Ok(prepared)
    }

    async fn insert_one(&self, table: &str, row: Row) -> Result<Option<Row>, ExecutorError> {
        let mut inserted = self.insert(table, vec![row]).await?;
        Ok(if inserted.is_empty() {
            None
        } else {
            Some(inserted.remove(0))
        })
    }

    async fn update(
        &self,
        table: &str,
        set: Row,
        filter: Option<FilterNode>,
    ) -> Result<Vec<Row>, ExecutorError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| ExecutorError::other(format!("unknown table `{table}`")))?;

        let mut post_image = Vec::new();
        for row_entry in rows.iter_mut() {
            let matches = filter
                .as_ref()
                .map(|f| eval_filter(f, row_entry))
                .unwrap_or(true);
            if matches {
                for (key, value) in &set {
                    row_entry.insert(key.clone(), value.clone());
                }
                post_image.push(row_entry.clone());
            }
        }

        drop(tables);
        self.natural_sort(table, &mut post_image);
        Ok(post_image)
    }

    async fn delete(
        &self,
        table: &str,
        filter: Option<FilterNode>,
    ) -> Result<Vec<Row>, ExecutorError> {
        let mut tables = self.tables.lock().unwrap();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| ExecutorError::other(format!("unknown table `{table}`")))?;

        let mut kept = Vec::new();
        let mut removed = Vec::new();
        for row_entry in rows.drain(..) {
            let matches = filter
                .as_ref()
                .map(|f| eval_filter(f, &row_entry))
                .unwrap_or(true);
            if matches {
                removed.push(row_entry);
            } else {
                kept.push(row_entry);
            }
        }
        *rows = kept;

        drop(tables);
        self.natural_sort(table, &mut removed);
        Ok(removed)
    }
}

fn eval_filter(filter: &FilterNode, row: &Row) -> bool {
    match filter {
        FilterNode::And(parts) => parts.iter().all(|part| eval_filter(part, row)),
        FilterNode::Or(parts) => parts.iter().any(|part| eval_filter(part, row)),
        FilterNode::Cond(cond) => eval_condition(cond, row),
    }
}

fn eval_condition(cond: &FilterCondition, row: &Row) -> bool {
    let value = row.get(&cond.column).unwrap_or(&DbValue::Null);
    let is_null = matches!(value, DbValue::Null);

    match &cond.op {
        FilterOp::Eq(operand) => db_eq(value, operand),
        FilterOp::Ne(operand) => !is_null && !db_eq(value, operand),
        FilterOp::IsNull(expected) => is_null == *expected,
        FilterOp::InArray(items) => items.iter().any(|item| db_eq(value, item)),
        FilterOp::NotInArray(items) => !is_null && !items.iter().any(|item| db_eq(value, item)),
        FilterOp::Gt(operand) => cmp_db(value, operand) == Some(Ordering::Greater),
        FilterOp::Gte(operand) => {
            matches!(cmp_db(value, operand), Some(Ordering::Greater | Ordering::Equal))
        }
        FilterOp::Lt(operand) => cmp_db(value, operand) == Some(Ordering::Less),
        FilterOp::Lte(operand) => {
            matches!(cmp_db(value, operand), Some(Ordering::Less | Ordering::Equal))
        }
        FilterOp::Like(pattern) => text_of(value).is_some_and(|s| like_match(&s, pattern, false)),
        FilterOp::NotLike(pattern) => {
            text_of(value).is_some_and(|s| !like_match(&s, pattern, false))
        }
        FilterOp::ILike(pattern) => text_of(value).is_some_and(|s| like_match(&s, pattern, true)),
        FilterOp::NotILike(pattern) => {
            text_of(value).is_some_and(|s| !like_match(&s, pattern, true))
        }
        FilterOp::ArrayContains(items) => match value {
            DbValue::Array(elements) => items
                .iter()
                .all(|item| elements.iter().any(|e| db_eq(e, item))),
            _ => false,
        },
        FilterOp::ArrayContained(items) => match value {
            DbValue::Array(elements) => elements
                .iter()
                .all(|e| items.iter().any(|item| db_eq(e, item))),
            _ => false,
        },
        FilterOp::ArrayOverlaps(items) => match value {
            DbValue::Array(elements) => elements
                .iter()
                .any(|e| items.iter().any(|item| db_eq(e, item))),
            _ => false,
        },
    }
}

fn text_of(value: &DbValue) -> Option<String> {
    match value {
        DbValue::Text(s) => Some(s.clone()),
        _ => None,
    }
}

fn db_eq(a: &DbValue, b: &DbValue) -> bool {
    match (a, b) {
        (DbValue::Int(x), DbValue::Float(y)) | (DbValue::Float(y), DbValue::Int(x)) => {
            *x as f64 == *y
        }
        _ => a == b,
    }
}

fn cmp_db(a: &DbValue, b: &DbValue) -> Option<Ordering> {
    match (a, b) {
        (DbValue::Null, DbValue::Null) => Some(Ordering::Equal),
        (DbValue::Null, _) => Some(Ordering::Less),
        (_, DbValue::Null) => Some(Ordering::Greater),
        (DbValue::Int(x), DbValue::Int(y)) => Some(x.cmp(y)),
        (DbValue::Float(x), DbValue::Float(y)) => x.partial_cmp(y),
        (DbValue::Int(x), DbValue::Float(y)) => (*x as f64).partial_cmp(y),
        (DbValue::Float(x), DbValue::Int(y)) => x.partial_cmp(&(*y as f64)),
        (DbValue::Text(x), DbValue::Text(y)) => Some(x.cmp(y)),
        (DbValue::Bool(x), DbValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// SQL LIKE with `%` and `_` wildcards.
fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (text, pattern) = if case_insensitive {
        (text.to_lowercase(), pattern.to_lowercase())
    } else {
        (text.to_string(), pattern.to_string())
    };
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_impl(&text, &pattern)
}

fn like_impl(text: &[char], pattern: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('%') => (0..=text.len()).any(|skip| like_impl(&text[skip..], &pattern[1..])),
        Some('_') => !text.is_empty() && like_impl(&text[1..], &pattern[1..]),
        Some(c) => text.first() == Some(c) && like_impl(&text[1..], &pattern[1..]),
    }
}
