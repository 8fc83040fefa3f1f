//! This module and its children define most of the application logic of the
//! API.

use juniper::graphql_object;

use crate::events::{Change, MutationType};
use self::{
    comment::{Comment, CommentPreviousValues},
    post::{Post, PostPreviousValues},
};
use super::Context;

pub(crate) mod comment;
pub(crate) mod order;
pub(crate) mod post;
pub(crate) mod user;


/// Sent to `post` and `myPost` subscribers.
pub(crate) struct PostSubscriptionPayload {
    mutation: MutationType,
    node: Option<Post>,
    previous_values: Option<PostPreviousValues>,
}

#[graphql_object(Context = Context)]
impl PostSubscriptionPayload {
    fn mutation(&self) -> MutationType {
        self.mutation
    }

    /// The post after the mutation. `null` for deletions.
    fn node(&self) -> Option<&Post> {
        self.node.as_ref()
    }

    /// The post before the mutation. `null` for creations.
    fn previous_values(&self) -> Option<&PostPreviousValues> {
        self.previous_values.as_ref()
    }
}

impl From<Change<Post>> for PostSubscriptionPayload {
    fn from(change: Change<Post>) -> Self {
        Self {
            mutation: change.mutation,
            node: change.node,
            previous_values: change.previous.map(PostPreviousValues),
        }
    }
}

/// Sent to `comment` subscribers.
pub(crate) struct CommentSubscriptionPayload {
    mutation: MutationType,
    node: Option<Comment>,
    previous_values: Option<CommentPreviousValues>,
}

#[graphql_object(Context = Context)]
impl CommentSubscriptionPayload {
    fn mutation(&self) -> MutationType {
        self.mutation
    }

    fn node(&self) -> Option<&Comment> {
        self.node.as_ref()
    }

    fn previous_values(&self) -> Option<&CommentPreviousValues> {
        self.previous_values.as_ref()
    }
}

impl From<Change<Comment>> for CommentSubscriptionPayload {
    fn from(change: Change<Comment>) -> Self {
        Self {
            mutation: change.mutation,
            node: change.node,
            previous_values: change.previous.map(CommentPreviousValues),
        }
    }
}
