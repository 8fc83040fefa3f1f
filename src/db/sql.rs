//! Rendering of [`QuerySpec`]s as parameterized SQL.

use std::fmt::Write;

use postgres_types::ToSql;
use tokio_postgres::Row;

use crate::query::{Direction, Field, OrderBy, Predicate, QuerySpec, Value};


/// A type that is loaded from one table.
pub(crate) trait Table: Sized {
    /// Name of the table.
    const TABLE: &'static str;

    /// Comma separated list of columns in the order `from_row` expects.
    const COLUMNS: &'static str;

    fn from_row(row: &Row) -> Self;
}

/// The column name of a field. All tables use the same names.
pub(crate) fn column(field: Field) -> &'static str {
    match field {
        Field::Id => "id",
        Field::Name => "name",
        Field::Email => "email",
        Field::Title => "title",
        Field::Body => "body",
        Field::Published => "published",
        Field::Author => "author",
        Field::Post => "post",
        Field::Text => "text",
        Field::CreatedAt => "created_at",
        Field::UpdatedAt => "updated_at",
    }
}

/// An SQL query with its owned parameters.
pub(crate) struct RenderedQuery {
    pub(crate) sql: String,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl RenderedQuery {
    pub(crate) fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| &**p as &(dyn ToSql + Sync)).collect()
    }

    /// Adds a parameter and returns its placeholder (`$n`).
    fn push_param(&mut self, param: Box<dyn ToSql + Sync + Send>) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }
}

/// Renders a `select` for the table of `T` that returns exactly the rows
/// `spec` describes, in the right order.
///
/// - The filter becomes the `where` clause.
/// - `after` selects the rows strictly after the cursor row in the chosen
///   order. Unknown cursors yield no rows.
/// - Rows are ordered by the requested field (default `id`), ties broken by
///   `id` in the same direction.
/// - Negative `first`/`skip` values are treated as 0.
pub(crate) fn render_select<T: Table>(spec: &QuerySpec) -> RenderedQuery {
    let mut out = RenderedQuery {
        sql: format!("select {} from {}", T::COLUMNS, T::TABLE),
        params: Vec::new(),
    };

    let order = spec.order_by.unwrap_or(OrderBy { field: Field::Id, direction: Direction::Asc });
    let order_col = column(order.field);
    let dir = order.direction.to_sql();

    let mut conditions = Vec::new();
    if let Some(filter) = &spec.filter {
        conditions.push(render_predicate(filter, &mut out));
    }
    if let Some(after) = spec.pagination.after {
        let cmp = match order.direction {
            Direction::Asc => ">",
            Direction::Desc => "<",
        };
        let placeholder = out.push_param(Box::new(after));
        conditions.push(if order.field == Field::Id {
            format!("id {cmp} (select id from {} where id = {placeholder})", T::TABLE)
        } else {
            format!(
                "({order_col}, id) {cmp} (select {order_col}, id from {} where id = {placeholder})",
                T::TABLE,
            )
        });
    }

    if !conditions.is_empty() {
        // Writing to a `String` never fails.
        let _ = write!(out.sql, " where {}", conditions.join(" and "));
    }

    if order.field == Field::Id {
        let _ = write!(out.sql, " order by id {dir}");
    } else {
        let _ = write!(out.sql, " order by {order_col} {dir}, id {dir}");
    }

    if let Some(first) = spec.pagination.first {
        let placeholder = out.push_param(Box::new(i64::from(first.max(0))));
        let _ = write!(out.sql, " limit {placeholder}");
    }
    if let Some(skip) = spec.pagination.skip {
        let placeholder = out.push_param(Box::new(i64::from(skip.max(0))));
        let _ = write!(out.sql, " offset {placeholder}");
    }

    out
}

fn render_predicate(predicate: &Predicate, out: &mut RenderedQuery) -> String {
    let join = |children: &[Predicate], op: &str, out: &mut RenderedQuery| {
        let parts = children.iter()
            .map(|child| render_predicate(child, out))
            .collect::<Vec<_>>();
        format!("({})", parts.join(op))
    };

    match predicate {
        Predicate::Eq(field, value) => {
            let param: Box<dyn ToSql + Sync + Send> = match value {
                Value::Key(key) => Box::new(*key),
                Value::Bool(b) => Box::new(*b),
                Value::Text(s) => Box::new(s.clone()),
            };
            format!("{} = {}", column(*field), out.push_param(param))
        }
        Predicate::Contains(field, needle) => {
            let placeholder = out.push_param(Box::new(needle.clone()));
            format!("strpos({}, {placeholder}) > 0", column(*field))
        }
        Predicate::And(children) if children.is_empty() => "true".into(),
        Predicate::And(children) => join(children, " and ", out),
        Predicate::Or(children) if children.is_empty() => "false".into(),
        Predicate::Or(children) => join(children, " or ", out),
        Predicate::Nothing => "false".into(),
    }
}


#[cfg(test)]
mod tests {
    use tokio_postgres::Row;

    use crate::{
        auth::Identity,
        db::types::Key,
        query::{shape, ListArgs, Pagination},
    };
    use super::*;

    struct Dummy;

    impl Table for Dummy {
        const TABLE: &'static str = "posts";
        const COLUMNS: &'static str = "id, title";
        fn from_row(_: &Row) -> Self {
            Dummy
        }
    }

    fn render(spec: &QuerySpec) -> (String, usize) {
        let q = render_select::<Dummy>(spec);
        let len = q.params().len();
        (q.sql, len)
    }

    #[test]
    fn no_filter() {
        assert_eq!(
            render(&QuerySpec::default()),
            ("select id, title from posts order by id asc".into(), 0),
        );
    }

    #[test]
    fn published_with_search() {
        let spec = shape::posts(ListArgs { query: Some("foo".into()), ..ListArgs::default() });
        assert_eq!(render(&spec), (
            "select id, title from posts \
                where (published = $1 and (strpos(title, $2) > 0 or strpos(body, $3) > 0)) \
                order by id asc".into(),
            3,
        ));
    }

    #[test]
    fn anonymous_post_lookup() {
        let spec = shape::post_by_id(Key(5), Identity::Anonymous);
        assert_eq!(render(&spec), (
            "select id, title from posts \
                where (id = $1 and (published = $2 or false)) \
                order by id asc".into(),
            2,
        ));
    }

    #[test]
    fn empty_groups() {
        let spec = QuerySpec { filter: Some(Predicate::And(vec![])), ..QuerySpec::default() };
        assert_eq!(render(&spec).0, "select id, title from posts where true order by id asc");

        let spec = QuerySpec { filter: Some(Predicate::Or(vec![])), ..QuerySpec::default() };
        assert_eq!(render(&spec).0, "select id, title from posts where false order by id asc");
    }

    #[test]
    fn pagination_and_order() {
        let spec = QuerySpec {
            filter: Some(Predicate::eq(Field::Published, true)),
            pagination: Pagination { first: Some(10), skip: Some(-4), after: Some(Key(3)) },
            order_by: Some(OrderBy { field: Field::Title, direction: Direction::Desc }),
        };
        assert_eq!(render(&spec), (
            "select id, title from posts \
                where published = $1 \
                and (title, id) < (select title, id from posts where id = $2) \
                order by title desc, id desc limit $3 offset $4".into(),
            4,
        ));
    }

    #[test]
    fn cursor_by_id() {
        let spec = QuerySpec {
            pagination: Pagination { first: None, skip: None, after: Some(Key(3)) },
            ..QuerySpec::default()
        };
        assert_eq!(render(&spec), (
            "select id, title from posts \
                where id > (select id from posts where id = $1) \
                order by id asc".into(),
            1,
        ));
    }
}
