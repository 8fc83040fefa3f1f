use chrono::{DateTime, Utc};
use juniper::{graphql_object, GraphQLInputObject, ID};
use tokio_postgres::Row;

use crate::{
    api::{
        Context,
        err::{ApiResult, internal_server_error, not_found},
        id,
        model::{comment::Comment, user::User},
    },
    db::{types::Key, Table},
    events::{Change, Event, MutationType},
    prelude::*,
    query::{shape, Field, ListArgs, Record, Value},
};


#[derive(Debug, Clone)]
pub(crate) struct Post {
    pub(crate) key: Key,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) published: bool,
    pub(crate) author: Key,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Table for Post {
    const TABLE: &'static str = "posts";
    const COLUMNS: &'static str = "id, title, body, published, author, created_at, updated_at";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            title: row.get(1),
            body: row.get(2),
            published: row.get(3),
            author: row.get(4),
            created_at: row.get(5),
            updated_at: row.get(6),
        }
    }
}

impl Record for Post {
    fn value(&self, field: Field) -> Option<Value> {
        match field {
            Field::Id => Some(Value::Key(self.key)),
            Field::Title => Some(Value::Text(self.title.clone())),
            Field::Body => Some(Value::Text(self.body.clone())),
            Field::Published => Some(Value::Bool(self.published)),
            Field::Author => Some(Value::Key(self.author)),
            _ => None,
        }
    }
}

#[graphql_object(Context = Context)]
impl Post {
    fn id(&self) -> ID {
        id::from_key(self.key)
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn body(&self) -> &str {
        &self.body
    }

    fn published(&self) -> bool {
        self.published
    }

    async fn author(&self, context: &Context) -> ApiResult<User> {
        User::load_by_key(self.author, context)
            .await?
            .ok_or_else(|| not_found!("author of post {} not found", self.key))
    }

    async fn comments(&self, context: &Context) -> ApiResult<Vec<Comment>> {
        Ok(context.db.load(&shape::post_comments(self.key)).await?)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// The scalar fields of a post as they were before an update or deletion.
pub(crate) struct PostPreviousValues(pub(crate) Post);

#[graphql_object(Context = Context)]
impl PostPreviousValues {
    fn id(&self) -> ID {
        id::from_key(self.0.key)
    }

    fn title(&self) -> &str {
        &self.0.title
    }

    fn body(&self) -> &str {
        &self.0.body
    }

    fn published(&self) -> bool {
        self.0.published
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }
}

#[derive(GraphQLInputObject)]
pub(crate) struct CreatePostInput {
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) published: bool,
}

/// Fields that are not given are left unchanged.
#[derive(GraphQLInputObject)]
pub(crate) struct UpdatePostInput {
    pub(crate) title: Option<String>,
    pub(crate) body: Option<String>,
    pub(crate) published: Option<bool>,
}


impl Post {
    /// Published posts, optionally filtered by text.
    pub(crate) async fn load(args: ListArgs, context: &Context) -> ApiResult<Vec<Self>> {
        Ok(context.db.load(&shape::posts(args)).await?)
    }

    /// All posts of the requesting user, published or not.
    pub(crate) async fn load_mine(args: ListArgs, context: &Context) -> ApiResult<Vec<Self>> {
        let user = context.require_user()?;
        Ok(context.db.load(&shape::my_posts(args, user)).await?)
    }

    /// A single post that is published or owned by the requester.
    pub(crate) async fn load_visible(id: ID, context: &Context) -> ApiResult<Self> {
        let identity = context.identity(false)?;
        let not_found = || not_found!(key = "post.not-found", "Post not found");
        let key = id::to_key(&id).ok_or_else(not_found)?;

        context.db.load_first(&shape::post_by_id(key, identity))
            .await?
            .ok_or_else(not_found)
    }

    pub(crate) async fn load_by_key(key: Key, context: &Context) -> ApiResult<Option<Self>> {
        Ok(context.db.load_first(&shape::by_key(key)).await?)
    }

    pub(crate) async fn create(data: CreatePostInput, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let post = context.db
            .query_opt(
                &format!(
                    "insert into posts (title, body, published, author) values ($1, $2, $3, $4) \
                        returning {}",
                    Self::COLUMNS,
                ),
                &[&data.title, &data.body, &data.published, &user],
            )
            .await?
            .map(|row| Self::from_row(&row))
            .ok_or_else(|| internal_server_error!("insert did not return a row"))?;

        debug!(post = %post.key, author = %user, "Created post");
        context.events.publish(Event::Post(Change::created(post.clone())));
        Ok(post)
    }

    pub(crate) async fn update(id: ID, data: UpdatePostInput, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let previous = Self::load_owned(&id, user, context).await?
            .ok_or_else(|| not_found!(key = "post.update-failed", "Unable to update post"))?;

        let post = context.db
            .query_opt(
                &format!(
                    "update posts set \
                        title = coalesce($3, title), \
                        body = coalesce($4, body), \
                        published = coalesce($5, published), \
                        updated_at = now() \
                        where id = $1 and author = $2 \
                        returning {}",
                    Self::COLUMNS,
                ),
                &[&previous.key, &user, &data.title, &data.body, &data.published],
            )
            .await?
            .map(|row| Self::from_row(&row))
            .ok_or_else(|| not_found!(key = "post.update-failed", "Unable to update post"))?;

        debug!(post = %post.key, "Updated post");
        context.events.publish(Event::Post(Change {
            mutation: MutationType::Updated,
            node: Some(post.clone()),
            previous: Some(previous),
        }));
        Ok(post)
    }

    pub(crate) async fn delete(id: ID, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let not_found = || not_found!(key = "post.delete-failed", "Unable to delete post");
        let key = id::to_key(&id).ok_or_else(not_found)?;

        let post = context.db
            .query_opt(
                &format!(
                    "delete from posts where id = $1 and author = $2 returning {}",
                    Self::COLUMNS,
                ),
                &[&key, &user],
            )
            .await?
            .map(|row| Self::from_row(&row))
            .ok_or_else(not_found)?;

        debug!(post = %post.key, "Deleted post");
        context.events.publish(Event::Post(Change::deleted(post.clone())));
        Ok(post)
    }

    async fn load_owned(id: &ID, user: Key, context: &Context) -> ApiResult<Option<Self>> {
        let Some(key) = id::to_key(id) else {
            return Ok(None);
        };

        let post = Self::load_by_key(key, context).await?;
        Ok(post.filter(|p| p.author == user))
    }
}

#[cfg(test)]
impl Post {
    pub(crate) fn for_test(key: Key, author: Key, published: bool) -> Self {
        Self {
            key,
            title: format!("Post {key}"),
            body: String::new(),
            published,
            author,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
