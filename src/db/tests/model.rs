//! The resolver rules (authorization, visibility, error messages), run
//! against a real database with the identities of different requesters.

use juniper::ID;

use crate::{
    api::{
        err::{ApiErrorKind, ApiResult},
        model::{
            comment::{Comment, CreateCommentInput, UpdateCommentInput},
            post::{Post, UpdatePostInput},
            user::{CreateUserInput, LoginUserInput, User},
        },
    },
    auth::Identity,
    db::types::Key,
    prelude::*,
    query::ListArgs,
};
use super::util::TestDb;


// Lets the tests use `?` on `ApiResult` inside `anyhow::Result` test functions.
impl std::fmt::Display for crate::api::err::ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.msg)
    }
}

impl std::error::Error for crate::api::err::ApiError {}


fn id(key: Key) -> ID {
    ID::new(key.to_string())
}

#[track_caller]
fn assert_err<T: std::fmt::Debug>(result: ApiResult<T>, kind: ApiErrorKind, msg: &str) {
    match result {
        Ok(v) => panic!("expected error '{msg}', got {v:?}"),
        Err(e) => {
            assert_eq!(e.kind, kind, "wrong kind for '{}'", e.msg);
            assert_eq!(e.msg, msg);
        }
    }
}

fn create_user_input(name: &str, email: &str, password: &str) -> CreateUserInput {
    CreateUserInput {
        name: name.into(),
        email: email.into(),
        password: password.into(),
    }
}


#[tokio::test(flavor = "multi_thread")]
async fn short_password_is_rejected() -> Result<()> {
    let db = TestDb::new().await?;
    let ctx = db.context(Identity::Anonymous);

    let result = User::create(create_user_input("Alice", "alice@example.org", "1234567"), &ctx)
        .await;
    assert_err(result, ApiErrorKind::InvalidInput, "password must be 8 characters or greater");

    // Nothing was inserted.
    assert!(User::load(ListArgs::default(), &ctx).await?.is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_payload_shows_own_email() -> Result<()> {
    let db = TestDb::new().await?;
    let ctx = db.context(Identity::Anonymous);

    let created = User::create(create_user_input("Alice", "alice@example.org", "12345678"), &ctx)
        .await?;
    assert_eq!(created.user.visible_email(&ctx)?, Some("alice@example.org"));

    let login = LoginUserInput { email: "alice@example.org".into(), password: "12345678".into() };
    let logged_in = User::login(login, &ctx).await?;
    assert_eq!(logged_in.user.key, created.user.key);
    assert_eq!(logged_in.user.visible_email(&ctx)?, Some("alice@example.org"));

    // The token works for later requests.
    let later = crate::api::Context {
        request: crate::auth::RequestContext::Http({
            let mut headers = hyper::HeaderMap::new();
            headers.insert(
                hyper::header::AUTHORIZATION,
                format!("Bearer {}", logged_in.token).parse()?,
            );
            headers
        }),
        ..db.context(Identity::Anonymous)
    };
    assert_eq!(User::load_me(&later).await?.key, created.user.key);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn login_failures_look_the_same() -> Result<()> {
    let db = TestDb::new().await?;
    let ctx = db.context(Identity::Anonymous);
    User::create(create_user_input("Alice", "alice@example.org", "correct horse"), &ctx).await?;

    let unknown = LoginUserInput { email: "bob@example.org".into(), password: "correct horse".into() };
    assert_err(User::login(unknown, &ctx).await, ApiErrorKind::InvalidInput, "Unable to login");

    let wrong = LoginUserInput { email: "alice@example.org".into(), password: "battery staple".into() };
    assert_err(User::login(wrong, &ctx).await, ApiErrorKind::InvalidInput, "Unable to login");

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn email_hidden_from_others() -> Result<()> {
    let db = TestDb::new().await?;
    let alice = db.add_user("Alice", "alice@example.org").await?;
    let bob = db.add_user("Bob", "bob@example.org").await?;

    let user = User::load_by_key(alice, &db.context(Identity::Anonymous)).await?.unwrap();
    assert_eq!(user.visible_email(&db.context(Identity::User(alice)))?, Some("alice@example.org"));
    assert_eq!(user.visible_email(&db.context(Identity::User(bob)))?, None);
    assert_eq!(user.visible_email(&db.context(Identity::Anonymous))?, None);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn me_requires_existing_user() -> Result<()> {
    let db = TestDb::new().await?;
    let alice = db.add_user("Alice", "alice@example.org").await?;

    assert_eq!(User::load_me(&db.context(Identity::User(alice))).await?.key, alice);
    assert_err(
        User::load_me(&db.context(Identity::User(Key(alice.0 + 1000)))).await,
        ApiErrorKind::NotFound,
        "User not found",
    );
    assert_err(
        User::load_me(&db.context(Identity::Anonymous)).await,
        ApiErrorKind::NotAuthenticated,
        "Authentication required",
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unpublished_post_only_visible_to_author() -> Result<()> {
    let db = TestDb::new().await?;
    let owner = db.add_user("Owner", "owner@example.org").await?;
    let other = db.add_user("Other", "other@example.org").await?;
    let draft = db.add_post(owner, "Draft", "not yet", false).await?;
    let public = db.add_post(owner, "Public", "hello", true).await?;

    let post = Post::load_visible(id(draft), &db.context(Identity::User(owner))).await?;
    assert_eq!(post.key, draft);

    for identity in [Identity::User(other), Identity::Anonymous] {
        let ctx = db.context(identity);
        assert_err(
            Post::load_visible(id(draft), &ctx).await,
            ApiErrorKind::NotFound,
            "Post not found",
        );
        assert_eq!(Post::load_visible(id(public), &ctx).await?.key, public);
    }

    // IDs that cannot exist behave like missing rows.
    for bad in [ID::new("nope"), id(Key(public.0 + 1000))] {
        assert_err(
            Post::load_visible(bad, &db.context(Identity::User(owner))).await,
            ApiErrorKind::NotFound,
            "Post not found",
        );
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn foreign_posts_cannot_be_changed() -> Result<()> {
    let db = TestDb::new().await?;
    let owner = db.add_user("Owner", "owner@example.org").await?;
    let other = db.add_user("Other", "other@example.org").await?;
    let post = db.add_post(owner, "Mine", "hands off", true).await?;

    let ctx = db.context(Identity::User(other));
    let data = UpdatePostInput { title: Some("Stolen".into()), body: None, published: None };
    assert_err(
        Post::update(id(post), data, &ctx).await,
        ApiErrorKind::NotFound,
        "Unable to update post",
    );
    assert_err(Post::delete(id(post), &ctx).await, ApiErrorKind::NotFound, "Unable to delete post");

    // The owner can.
    let ctx = db.context(Identity::User(owner));
    let data = UpdatePostInput { title: Some("Renamed".into()), body: None, published: None };
    let updated = Post::update(id(post), data, &ctx).await?;
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.body, "hands off");
    assert_eq!(Post::delete(id(post), &ctx).await?.key, post);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn foreign_comments_cannot_be_changed() -> Result<()> {
    let db = TestDb::new().await?;
    let author = db.add_user("Author", "author@example.org").await?;
    let other = db.add_user("Other", "other@example.org").await?;
    let post = db.add_post(other, "Post", "body", true).await?;
    let comment = db.add_comment(author, post, "first").await?;

    // Owning the post does not help.
    let ctx = db.context(Identity::User(other));
    let data = UpdateCommentInput { text: Some("edited".into()) };
    assert_err(
        Comment::update(id(comment), data, &ctx).await,
        ApiErrorKind::NotFound,
        "Unable to update comment",
    );
    assert_err(
        Comment::delete(id(comment), &ctx).await,
        ApiErrorKind::NotFound,
        "Unable to delete comment",
    );

    let ctx = db.context(Identity::User(author));
    let data = UpdateCommentInput { text: Some("edited".into()) };
    assert_eq!(Comment::update(id(comment), data, &ctx).await?.key, comment);
    assert_eq!(Comment::delete(id(comment), &ctx).await?.key, comment);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn comments_only_on_published_posts() -> Result<()> {
    let db = TestDb::new().await?;
    let author = db.add_user("Author", "author@example.org").await?;
    let draft = db.add_post(author, "Draft", "", false).await?;
    let public = db.add_post(author, "Public", "", true).await?;

    // Not even the author can comment on the draft.
    let ctx = db.context(Identity::User(author));
    for post in [id(draft), ID::new("garbage")] {
        let data = CreateCommentInput { text: "hi".into(), post };
        assert_err(
            Comment::create(data, &ctx).await,
            ApiErrorKind::NotFound,
            "Unable to find post",
        );
    }

    let data = CreateCommentInput { text: "hi".into(), post: id(public) };
    let comment = Comment::create(data, &ctx).await?;
    assert_eq!((comment.author, comment.post), (author, public));

    // Anonymous requesters cannot comment at all.
    let data = CreateCommentInput { text: "hi".into(), post: id(public) };
    assert_err(
        Comment::create(data, &db.context(Identity::Anonymous)).await,
        ApiErrorKind::NotAuthenticated,
        "Authentication required",
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn comments_cannot_be_searched() -> Result<()> {
    let db = TestDb::new().await?;
    let author = db.add_user("Author", "author@example.org").await?;
    let post = db.add_post(author, "Post", "", true).await?;
    db.add_comment(author, post, "hello").await?;

    let ctx = db.context(Identity::Anonymous);
    let args = ListArgs { query: Some("hello".into()), ..ListArgs::default() };
    let result = Comment::load(args, &ctx).await;
    assert_eq!(result.map(|c| c.len()).map_err(|e| e.kind), Err(ApiErrorKind::InvalidInput));

    let args = ListArgs { query: Some(String::new()), ..ListArgs::default() };
    assert_eq!(Comment::load(args, &ctx).await?.len(), 1);

    Ok(())
}
