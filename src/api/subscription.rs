use std::pin::Pin;

use futures::{Stream, StreamExt};
use juniper::{graphql_subscription, ID};

use crate::{
    events::{Change, Subject},
    query::{shape, Predicate},
};
use super::{
    Context,
    err::{ApiResult, invalid_input},
    id,
    model::{
        CommentSubscriptionPayload,
        PostSubscriptionPayload,
        comment::Comment,
        post::Post,
    },
};


type PayloadStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// The root subscription object.
pub(crate) struct Subscription;

#[graphql_subscription(Context = Context)]
impl Subscription {
    /// Changes of the comments on the given post.
    async fn comment(
        post_id: ID,
        context: &Context,
    ) -> ApiResult<PayloadStream<CommentSubscriptionPayload>> {
        let post = id::to_key(&post_id)
            .ok_or_else(|| invalid_input!(key = "post.invalid-id", "invalid post ID"))?;
        Ok(stream::<Comment, _>(context, shape::comment_events(post)))
    }

    /// Changes of published posts. Unpublishing a post is not reported here.
    async fn post(context: &Context) -> ApiResult<PayloadStream<PostSubscriptionPayload>> {
        Ok(stream::<Post, _>(context, shape::post_events()))
    }

    /// Changes of the current user's posts, published or not. Requires
    /// authentication.
    async fn my_post(context: &Context) -> ApiResult<PayloadStream<PostSubscriptionPayload>> {
        let user = context.require_user()?;
        Ok(stream::<Post, _>(context, shape::my_post_events(user)))
    }
}

fn stream<T, P>(context: &Context, filter: Predicate) -> PayloadStream<P>
where
    T: Subject,
    P: From<Change<T>> + Send + 'static,
{
    context.events.changes::<T>(filter).map(P::from).boxed()
}
