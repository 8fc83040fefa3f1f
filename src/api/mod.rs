//! Definition of the GraphQL API.

use self::{
    mutation::Mutation,
    query::Query,
    subscription::Subscription,
};

pub(crate) mod err;
pub(crate) mod util;
pub(crate) mod model;

mod context;
mod id;
mod mutation;
mod query;
mod subscription;

pub(crate) use self::context::Context;


/// Creates and returns the API root node.
pub(crate) fn root_node() -> RootNode {
    RootNode::new(Query, Mutation, Subscription)
}

/// Type of our API root node.
pub(crate) type RootNode = juniper::RootNode<'static, Query, Mutation, Subscription>;


#[cfg(test)]
mod tests {
    #[test]
    fn schema_has_all_root_fields() {
        let sdl = super::root_node().as_sdl();
        for field in [
            "users(", "posts(", "myPosts(", "comments(", "me:", "post(id:",
            "createUser(", "login(", "updateUser(", "deleteUser:",
            "createPost(", "updatePost(", "deletePost(",
            "createComment(", "updateComment(", "deleteComment(",
            "comment(postId:", "myPost:",
        ] {
            assert!(sdl.contains(field), "missing '{field}' in schema:\n{sdl}");
        }
    }

    #[test]
    fn order_enum_values() {
        let sdl = super::root_node().as_sdl();
        assert!(sdl.contains("createdAt_DESC"));
        assert!(sdl.contains("enum MutationType"));
    }
}
