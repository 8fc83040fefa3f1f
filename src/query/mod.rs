//! Query shaping: turning client arguments into backend query specifications.
//!
//! Everything in here is pure. A [`QuerySpec`] is built as an immutable value
//! from the resolver arguments and the requester's identity and then handed to
//! the database layer (`db::sql`) or, for subscriptions, evaluated in memory
//! against events (`Predicate::matches`).

use crate::db::types::Key;

mod predicate;
pub(crate) mod shape;


pub(crate) use self::predicate::{Field, Predicate, Record, Value};


/// Everything the backend needs to run a list query.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct QuerySpec {
    /// `None` means "all rows".
    pub(crate) filter: Option<Predicate>,
    pub(crate) pagination: Pagination,
    /// `None` means the default order: by `id` ascending.
    pub(crate) order_by: Option<OrderBy>,
}

/// Pagination arguments, passed through from the client verbatim. Ranges are
/// not validated here: the database layer clamps negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Pagination {
    /// Maximum number of rows.
    pub(crate) first: Option<i32>,
    /// Number of rows to skip (after applying `after`).
    pub(crate) skip: Option<i32>,
    /// Only rows strictly after the row with this ID in the chosen order.
    pub(crate) after: Option<Key>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OrderBy {
    pub(crate) field: Field,
    pub(crate) direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn to_sql(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

/// The arguments that all list fields (`users`, `posts`, ...) accept.
#[derive(Debug, Clone, Default)]
pub(crate) struct ListArgs {
    /// Free-text search. Empty strings are treated like `None`.
    pub(crate) query: Option<String>,
    pub(crate) pagination: Pagination,
    pub(crate) order_by: Option<OrderBy>,
}

impl ListArgs {
    /// The free-text query, if a non-empty one was given.
    pub(crate) fn query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.is_empty())
    }
}
