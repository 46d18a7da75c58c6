//! The database executor contract.
//!
//! The compiler never builds SQL. Every resolver reduces its request to a
//! [`SelectQuery`] (or a set/filter pair for mutations) and hands it to the
//! [`Executor`] supplied at compile time. Executors exchange rows as keyed
//! maps of column name to dialect-native [`DbValue`]s; nested relation
//! results come back under the plan's response keys as [`DbValue::Row`] /
//! [`DbValue::Rows`].

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::ExecutorError;
use crate::schema::{Cardinality, JoinPair};

/// A row as exchanged with the executor.
pub type Row = IndexMap<String, DbValue>;

/// A dialect-native value. This is the representation the executor stores
/// and returns; the value codec translates between it and GraphQL values.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<DbValue>),
    /// Result of a `one` relation, realized by the executor.
    Row(Box<Row>),
    /// Result of a `many` relation, realized by the executor.
    Rows(Vec<Row>),
}

/// Sort direction. The lowercase names are part of the wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// One entry of the translated `orderBy`: the list the executor receives is
/// already sorted by descending priority with declared-column-order ties.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByPair {
    pub column: String,
    pub direction: OrderDirection,
}

/// One leaf of the filter tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub column: String,
    pub op: FilterOp,
}

/// Leaf operator, with operand values already marshaled to dialect-native
/// form.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(DbValue),
    Ne(DbValue),
    IsNull(bool),
    InArray(Vec<DbValue>),
    NotInArray(Vec<DbValue>),
    Gt(DbValue),
    Gte(DbValue),
    Lt(DbValue),
    Lte(DbValue),
    Like(String),
    NotLike(String),
    ILike(String),
    NotILike(String),
    ArrayContains(Vec<DbValue>),
    ArrayContained(Vec<DbValue>),
    ArrayOverlaps(Vec<DbValue>),
}

/// Recursive filter tree. `And([])` matches everything; `Or([])` matches
/// nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Cond(FilterCondition),
}

impl FilterNode {
    pub fn match_all() -> Self {
        Self::And(vec![])
    }
}

/// A nested relation to realize while answering a select. Carries the full
/// join predicate so executors never need the relational schema.
#[derive(Debug, Clone)]
pub struct RelationQuery {
    /// Declared relation name on the owning table.
    pub relation: String,
    /// Target table name.
    pub target: String,
    pub cardinality: Cardinality,
    pub join: Vec<JoinPair>,
    pub query: SelectQuery,
}

/// A fully translated select: columns, filter, prioritized ordering,
/// pagination, and the nested relation plans keyed by response key.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub columns: Vec<String>,
    pub filter: Option<FilterNode>,
    pub order_by: Vec<OrderByPair>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub relations: IndexMap<String, RelationQuery>,
}

/// The narrow seam to the relational backend.
///
/// Contract notes:
/// - When `order_by` is empty, rows come back in the executor's natural
///   order (primary-key ascending).
/// - `select_first` returns the first row of that order after `offset`.
/// - `insert` is atomic: either every row is written or none is.
/// - `update` returns the post-image of the matched rows, `delete` the
///   pre-image of the removed rows; both must read their images atomically
///   with the write (one transaction when the backend has them).
/// - `relations` entries are realized by the executor in the same request
///   (joins, batched IN-queries, or correlated subqueries), never by the
///   resolver per row.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn select_many(&self, table: &str, query: SelectQuery)
    -> Result<Vec<Row>, ExecutorError>;

    async fn select_first(
        &self,
        table: &str,
        query: SelectQuery,
    ) -> Result<Option<Row>, ExecutorError>;

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>, ExecutorError>;

    async fn insert_one(&self, table: &str, row: Row) -> Result<Option<Row>, ExecutorError>;

    async fn update(
        &self,
        table: &str,
        set: Row,
        filter: Option<FilterNode>,
    ) -> Result<Vec<Row>, ExecutorError>;

    async fn delete(
        &self,
        table: &str,
        filter: Option<FilterNode>,
    ) -> Result<Vec<Row>, ExecutorError>;
}
