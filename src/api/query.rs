use juniper::{graphql_object, ID};

use super::{
    Context,
    err::ApiResult,
    model::{
        comment::Comment,
        order::{CommentOrderByInput, PostOrderByInput, UserOrderByInput},
        post::Post,
        user::User,
    },
    util::list_args,
};


/// The root query object.
pub(crate) struct Query;

#[graphql_object(Context = Context)]
impl Query {
    /// All users, optionally filtered by name.
    async fn users(
        query: Option<String>,
        first: Option<i32>,
        skip: Option<i32>,
        after: Option<ID>,
        order_by: Option<UserOrderByInput>,
        context: &Context,
    ) -> ApiResult<Vec<User>> {
        User::load(list_args(query, first, skip, after, order_by)?, context).await
    }

    /// All published posts. `query` matches title or body.
    async fn posts(
        query: Option<String>,
        first: Option<i32>,
        skip: Option<i32>,
        after: Option<ID>,
        order_by: Option<PostOrderByInput>,
        context: &Context,
    ) -> ApiResult<Vec<Post>> {
        Post::load(list_args(query, first, skip, after, order_by)?, context).await
    }

    /// All posts of the current user, including unpublished ones. Requires
    /// authentication.
    async fn my_posts(
        query: Option<String>,
        first: Option<i32>,
        skip: Option<i32>,
        after: Option<ID>,
        order_by: Option<PostOrderByInput>,
        context: &Context,
    ) -> ApiResult<Vec<Post>> {
        Post::load_mine(list_args(query, first, skip, after, order_by)?, context).await
    }

    /// All comments. Free-text search is not supported here: a non-empty
    /// `query` is rejected.
    async fn comments(
        query: Option<String>,
        first: Option<i32>,
        skip: Option<i32>,
        after: Option<ID>,
        order_by: Option<CommentOrderByInput>,
        context: &Context,
    ) -> ApiResult<Vec<Comment>> {
        Comment::load(list_args(query, first, skip, after, order_by)?, context).await
    }

    /// The current user. Requires authentication.
    async fn me(context: &Context) -> ApiResult<User> {
        User::load_me(context).await
    }

    /// A post that is either published or owned by the current user.
    async fn post(id: ID, context: &Context) -> ApiResult<Post> {
        Post::load_visible(id, context).await
    }
}
