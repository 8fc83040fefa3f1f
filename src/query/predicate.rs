use crate::{auth::Identity, db::types::Key};


/// All fields a predicate or ordering can refer to. Which fields exist
/// depends on the table; the database layer maps them to columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Field {
    Id,
    Name,
    Email,
    Title,
    Body,
    Published,
    /// Foreign key to `users` (posts and comments).
    Author,
    /// Foreign key to `posts` (comments).
    Post,
    Text,
    CreatedAt,
    UpdatedAt,
}

/// A value a field can be compared to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    Key(Key),
    Bool(bool),
    Text(String),
}

impl From<Key> for Value {
    fn from(value: Key) -> Self {
        Self::Key(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A filter predicate tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Predicate {
    /// `field = value`
    Eq(Field, Value),

    /// The text field contains the given string (case-sensitive).
    Contains(Field, String),

    /// All of them. An empty list is always true.
    And(Vec<Predicate>),

    /// Any of them. An empty list is always false.
    Or(Vec<Predicate>),

    /// Matches nothing.
    Nothing,
}

impl Predicate {
    pub(crate) fn eq(field: Field, value: impl Into<Value>) -> Self {
        Self::Eq(field, value.into())
    }

    /// `field = identity` for authenticated requesters. Anonymous requesters
    /// own nothing, so for them this is [`Predicate::Nothing`] instead of a
    /// comparison with some "null" ID.
    pub(crate) fn owned_by(field: Field, identity: Identity) -> Self {
        match identity {
            Identity::User(id) => Self::eq(field, id),
            Identity::Anonymous => Self::Nothing,
        }
    }

    /// Evaluates this predicate against a single in-memory record. Fields the
    /// record does not have never match.
    pub(crate) fn matches(&self, record: &impl Record) -> bool {
        match self {
            Self::Eq(field, value) => record.value(*field).as_ref() == Some(value),
            Self::Contains(field, needle) => matches!(
                record.value(*field),
                Some(Value::Text(haystack)) if haystack.contains(needle.as_str())
            ),
            Self::And(children) => children.iter().all(|p| p.matches(record)),
            Self::Or(children) => children.iter().any(|p| p.matches(record)),
            Self::Nothing => false,
        }
    }
}

/// Something a [`Predicate`] can be evaluated against in memory.
pub(crate) trait Record {
    fn value(&self, field: Field) -> Option<Value>;
}
