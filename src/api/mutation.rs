use juniper::{graphql_object, ID};

use super::{
    Context,
    err::ApiResult,
    model::{
        comment::{Comment, CreateCommentInput, UpdateCommentInput},
        post::{CreatePostInput, Post, UpdatePostInput},
        user::{AuthPayload, CreateUserInput, LoginUserInput, UpdateUserInput, User},
    },
};


/// The root mutation object.
pub(crate) struct Mutation;

#[graphql_object(Context = Context)]
impl Mutation {
    /// Registers a new user and returns a token for them.
    async fn create_user(data: CreateUserInput, context: &Context) -> ApiResult<AuthPayload> {
        User::create(data, context).await
    }

    async fn login(data: LoginUserInput, context: &Context) -> ApiResult<AuthPayload> {
        User::login(data, context).await
    }

    /// Updates the current user.
    async fn update_user(data: UpdateUserInput, context: &Context) -> ApiResult<User> {
        User::update(data, context).await
    }

    /// Deletes the current user including all their posts and comments.
    async fn delete_user(context: &Context) -> ApiResult<User> {
        User::delete(context).await
    }

    async fn create_post(data: CreatePostInput, context: &Context) -> ApiResult<Post> {
        Post::create(data, context).await
    }

    /// Only the author can update a post.
    async fn update_post(id: ID, data: UpdatePostInput, context: &Context) -> ApiResult<Post> {
        Post::update(id, data, context).await
    }

    /// Only the author can delete a post.
    async fn delete_post(id: ID, context: &Context) -> ApiResult<Post> {
        Post::delete(id, context).await
    }

    /// Comments on a published post.
    async fn create_comment(data: CreateCommentInput, context: &Context) -> ApiResult<Comment> {
        Comment::create(data, context).await
    }

    async fn update_comment(
        id: ID,
        data: UpdateCommentInput,
        context: &Context,
    ) -> ApiResult<Comment> {
        Comment::update(id, data, context).await
    }

    async fn delete_comment(id: ID, context: &Context) -> ApiResult<Comment> {
        Comment::delete(id, context).await
    }
}
