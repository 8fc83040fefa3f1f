//! The visibility and search rules for each list and lookup field.

use crate::{
    auth::{Identity, UserId},
    db::types::Key,
};
use super::{Field, ListArgs, Predicate, QuerySpec};


/// `Or[name contains q]` if a query was given.
pub(crate) fn users(args: ListArgs) -> QuerySpec {
    let filter = args.query().map(|q| Predicate::Or(vec![
        Predicate::Contains(Field::Name, q.to_owned()),
    ]));

    with_filter(filter, args)
}

/// Only published posts, narrowed by the free-text query.
pub(crate) fn posts(args: ListArgs) -> QuerySpec {
    let filter = narrow_by_post_text(Predicate::eq(Field::Published, true), &args);
    with_filter(Some(filter), args)
}

/// All posts of `user` regardless of published status, narrowed by the
/// free-text query.
pub(crate) fn my_posts(args: ListArgs, user: UserId) -> QuerySpec {
    let filter = narrow_by_post_text(Predicate::eq(Field::Author, user), &args);
    with_filter(Some(filter), args)
}

/// All comments. There is no free-text search for comments; a `query` has
/// to be rejected before calling this.
pub(crate) fn comments(args: ListArgs) -> QuerySpec {
    with_filter(None, args)
}

/// A single post that is visible to `identity`: published or owned.
pub(crate) fn post_by_id(id: Key, identity: Identity) -> QuerySpec {
    let filter = Predicate::And(vec![
        Predicate::eq(Field::Id, id),
        Predicate::Or(vec![
            Predicate::eq(Field::Published, true),
            Predicate::owned_by(Field::Author, identity),
        ]),
    ]);

    QuerySpec { filter: Some(filter), ..QuerySpec::default() }
}

/// The record of the requesting user.
pub(crate) fn me(user: UserId) -> QuerySpec {
    by_key(user)
}

/// A single row by primary key without any visibility restriction. Used for
/// relations (`Post.author`, `Comment.post`, ...) and after mutations.
pub(crate) fn by_key(id: Key) -> QuerySpec {
    QuerySpec {
        filter: Some(Predicate::eq(Field::Id, id)),
        ..QuerySpec::default()
    }
}

/// The published posts of `user` (`User.posts`).
pub(crate) fn user_posts(user: Key) -> QuerySpec {
    QuerySpec {
        filter: Some(Predicate::And(vec![
            Predicate::eq(Field::Author, user),
            Predicate::eq(Field::Published, true),
        ])),
        ..QuerySpec::default()
    }
}

/// The comments written by `user` (`User.comments`).
pub(crate) fn user_comments(user: Key) -> QuerySpec {
    QuerySpec {
        filter: Some(Predicate::eq(Field::Author, user)),
        ..QuerySpec::default()
    }
}

/// The comments on `post` (`Post.comments`).
pub(crate) fn post_comments(post: Key) -> QuerySpec {
    QuerySpec {
        filter: Some(Predicate::eq(Field::Post, post)),
        ..QuerySpec::default()
    }
}


/// Subscription `comment(postId)`: comment events on that post.
pub(crate) fn comment_events(post: Key) -> Predicate {
    Predicate::eq(Field::Post, post)
}

/// Subscription `post`: events of published posts.
pub(crate) fn post_events() -> Predicate {
    Predicate::eq(Field::Published, true)
}

/// Subscription `myPost`: events of the posts of `user`.
pub(crate) fn my_post_events(user: UserId) -> Predicate {
    Predicate::eq(Field::Author, user)
}


/// `base AND Or[title contains q, body contains q]`, or just `base` without
/// query.
fn narrow_by_post_text(base: Predicate, args: &ListArgs) -> Predicate {
    match args.query() {
        None => base,
        Some(q) => Predicate::And(vec![
            base,
            Predicate::Or(vec![
                Predicate::Contains(Field::Title, q.to_owned()),
                Predicate::Contains(Field::Body, q.to_owned()),
            ]),
        ]),
    }
}

fn with_filter(filter: Option<Predicate>, args: ListArgs) -> QuerySpec {
    QuerySpec {
        filter,
        pagination: args.pagination,
        order_by: args.order_by,
    }
}
