//! Tests against a real PostgreSQL. The database from the dev config has to
//! be running (see `util/dev-config/docker-compose.yml`).

use crate::{
    api::model::{comment::Comment, post::Post, user::User},
    auth::Identity,
    db::{types::Key, DbError},
    prelude::*,
    query::{shape, Direction, Field, ListArgs, OrderBy, Pagination, QuerySpec},
};
use self::util::TestDb;

mod model;
mod util;


fn keys_of_posts(posts: &[Post]) -> Vec<Key> {
    posts.iter().map(|p| p.key).collect()
}

async fn load_posts(db: &TestDb, spec: QuerySpec) -> Result<Vec<Key>> {
    Ok(keys_of_posts(&db.db().load::<Post>(&spec).await?))
}

fn args(query: Option<&str>, pagination: Pagination, order_by: Option<OrderBy>) -> ListArgs {
    ListArgs { query: query.map(Into::into), pagination, order_by }
}

#[tokio::test(flavor = "multi_thread")]
async fn migrations_create_all_tables() -> Result<()> {
    let db = TestDb::new().await?;
    let rows = db.db().query(
        "select table_name::text from information_schema.tables \
            where table_schema = 'public' order by table_name",
        &[],
    ).await?;
    let tables = rows.iter().map(|r| r.get::<_, String>(0)).collect::<Vec<_>>();
    assert_eq!(tables, ["__db_migrations", "comments", "posts", "users"]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn post_visibility() -> Result<()> {
    let db = TestDb::new().await?;
    let alice = db.add_user("Alice", "alice@example.org").await?;
    let bob = db.add_user("Bob", "bob@example.org").await?;
    let public = db.add_post(alice, "Hello", "world", true).await?;
    let draft = db.add_post(alice, "Draft", "secret", false).await?;
    let bobs = db.add_post(bob, "Bob's", "post", true).await?;

    let posts = db.db().load::<Post>(&shape::posts(ListArgs::default())).await?;
    assert_eq!(keys_of_posts(&posts), [public, bobs]);

    let mine = db.db().load::<Post>(&shape::my_posts(ListArgs::default(), alice)).await?;
    assert_eq!(keys_of_posts(&mine), [public, draft]);

    for (identity, expected) in [
        (Identity::User(alice), vec![draft]),
        (Identity::User(bob), vec![]),
        (Identity::Anonymous, vec![]),
    ] {
        let found = load_posts(&db, shape::post_by_id(draft, identity)).await?;
        assert_eq!(found, expected, "identity: {identity}");
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn post_search_is_case_sensitive() -> Result<()> {
    let db = TestDb::new().await?;
    let alice = db.add_user("Alice", "alice@example.org").await?;
    let in_title = db.add_post(alice, "Rust tips", "none", true).await?;
    let in_body = db.add_post(alice, "Other", "about Rust", true).await?;
    let _lowercase = db.add_post(alice, "rusty", "nails", true).await?;
    let _unpublished = db.add_post(alice, "Rust draft", "", false).await?;

    let spec = shape::posts(args(Some("Rust"), Pagination::default(), None));
    let posts = db.db().load::<Post>(&spec).await?;
    assert_eq!(keys_of_posts(&posts), [in_title, in_body]);

    // An empty query does not filter at all.
    let spec = shape::posts(args(Some(""), Pagination::default(), None));
    assert_eq!(db.db().load::<Post>(&spec).await?.len(), 3);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn user_search_and_order() -> Result<()> {
    let db = TestDb::new().await?;
    let carol = db.add_user("Carol", "carol@example.org").await?;
    let anna = db.add_user("Anna", "anna@example.org").await?;
    let _bob = db.add_user("Bob", "bob@example.org").await?;

    let by_name = OrderBy { field: Field::Name, direction: Direction::Asc };
    let spec = shape::users(args(Some("a"), Pagination::default(), Some(by_name)));
    let users = db.db().load::<User>(&spec).await?;
    assert_eq!(users.iter().map(|u| u.key).collect::<Vec<_>>(), [anna, carol]);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn pagination() -> Result<()> {
    let db = TestDb::new().await?;
    let alice = db.add_user("Alice", "alice@example.org").await?;
    let mut keys = Vec::new();
    for title in ["d", "b", "a", "c", "e"] {
        keys.push(db.add_post(alice, title, "", true).await?);
    }

    let load = |pagination, order_by| load_posts(&db, shape::posts(args(None, pagination, order_by)));

    // first & skip
    let page = load(Pagination { first: Some(2), skip: Some(1), after: None }, None).await?;
    assert_eq!(page, keys[1..3]);

    // Negative values are treated as 0.
    let page = load(Pagination { first: Some(-1), skip: None, after: None }, None).await?;
    assert!(page.is_empty());
    let page = load(Pagination { first: None, skip: Some(-3), after: None }, None).await?;
    assert_eq!(page, keys);

    // Cursor in default order
    let page = load(Pagination { first: Some(2), skip: None, after: Some(keys[2]) }, None).await?;
    assert_eq!(page, keys[3..5]);

    // Cursor with custom order: a, b, c, d, e by title descending is
    // e, d, c, b, a. After c: b, a.
    let by_title = OrderBy { field: Field::Title, direction: Direction::Desc };
    let page = load(
        Pagination { first: None, skip: None, after: Some(keys[3]) },
        Some(by_title),
    ).await?;
    assert_eq!(page, [keys[1], keys[2]]);

    // Unknown cursor
    let page = load(Pagination { first: None, skip: None, after: Some(Key(9999)) }, None).await?;
    assert!(page.is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn relations() -> Result<()> {
    let db = TestDb::new().await?;
    let alice = db.add_user("Alice", "alice@example.org").await?;
    let bob = db.add_user("Bob", "bob@example.org").await?;
    let post = db.add_post(alice, "Hello", "world", true).await?;
    let draft = db.add_post(alice, "Draft", "", false).await?;
    let c1 = db.add_comment(bob, post, "Nice").await?;
    let c2 = db.add_comment(alice, post, "Thanks").await?;

    let comments = db.db().load::<Comment>(&shape::post_comments(post)).await?;
    assert_eq!(comments.iter().map(|c| c.key).collect::<Vec<_>>(), [c1, c2]);

    let comments = db.db().load::<Comment>(&shape::user_comments(bob)).await?;
    assert_eq!(comments.iter().map(|c| c.key).collect::<Vec<_>>(), [c1]);

    let posts = db.db().load::<Post>(&shape::user_posts(alice)).await?;
    assert_eq!(keys_of_posts(&posts), [post]);
    assert_ne!(posts[0].key, draft);

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn deleting_user_cascades() -> Result<()> {
    let db = TestDb::new().await?;
    let alice = db.add_user("Alice", "alice@example.org").await?;
    let bob = db.add_user("Bob", "bob@example.org").await?;
    let alices_post = db.add_post(alice, "Hello", "world", true).await?;
    let bobs_post = db.add_post(bob, "Hi", "there", true).await?;
    db.add_comment(alice, bobs_post, "Alice was here").await?;
    db.add_comment(bob, alices_post, "Bob was here").await?;

    db.db().execute("delete from users where id = $1", &[&alice]).await?;

    let posts = db.db().load::<Post>(&shape::posts(ListArgs::default())).await?;
    assert_eq!(keys_of_posts(&posts), [bobs_post]);
    let comments = db.db().load::<Comment>(&shape::comments(ListArgs::default())).await?;
    assert!(comments.is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_email_violates_constraint() -> Result<()> {
    let db = TestDb::new().await?;
    db.add_user("Alice", "alice@example.org").await?;

    let err = db.db()
        .execute(
            "insert into users (name, email, password) values ('A', 'alice@example.org', 'x')",
            &[],
        )
        .await
        .unwrap_err();
    let DbError::Backend(e) = err else {
        panic!("expected backend error, got {err:?}");
    };
    assert_eq!(e.as_db_error().and_then(|e| e.constraint()), Some("unique_user_email"));

    Ok(())
}
