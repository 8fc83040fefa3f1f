use juniper::ID;

use crate::{
    api::{err::{ApiResult, invalid_input}, id},
    query::{ListArgs, OrderBy, Pagination},
};


/// Collects the arguments of a list field. Fails if `after` is not a valid
/// ID.
pub(crate) fn list_args(
    query: Option<String>,
    first: Option<i32>,
    skip: Option<i32>,
    after: Option<ID>,
    order_by: Option<impl Into<OrderBy>>,
) -> ApiResult<ListArgs> {
    let after = after
        .map(|cursor| id::to_key(&cursor).ok_or_else(|| {
            invalid_input!(key = "cursor.invalid", "invalid cursor '{}'", &*cursor)
        }))
        .transpose()?;

    Ok(ListArgs {
        query,
        pagination: Pagination { first, skip, after },
        order_by: order_by.map(Into::into),
    })
}
