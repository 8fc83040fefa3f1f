use chrono::{DateTime, Utc};
use juniper::{graphql_object, GraphQLInputObject, ID};
use tokio_postgres::Row;

use crate::{
    api::{
        Context,
        err::{ApiResult, internal_server_error, invalid_input, not_found},
        id,
        model::{post::Post, user::User},
    },
    auth::Identity,
    db::{types::Key, Table},
    events::{Change, Event, MutationType},
    prelude::*,
    query::{shape, Field, ListArgs, Record, Value},
};


#[derive(Debug, Clone)]
pub(crate) struct Comment {
    pub(crate) key: Key,
    text: String,
    pub(crate) author: Key,
    pub(crate) post: Key,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Table for Comment {
    const TABLE: &'static str = "comments";
    const COLUMNS: &'static str = "id, text, author, post, created_at, updated_at";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            text: row.get(1),
            author: row.get(2),
            post: row.get(3),
            created_at: row.get(4),
            updated_at: row.get(5),
        }
    }
}

impl Record for Comment {
    fn value(&self, field: Field) -> Option<Value> {
        match field {
            Field::Id => Some(Value::Key(self.key)),
            Field::Text => Some(Value::Text(self.text.clone())),
            Field::Author => Some(Value::Key(self.author)),
            Field::Post => Some(Value::Key(self.post)),
            _ => None,
        }
    }
}

#[graphql_object(Context = Context)]
impl Comment {
    fn id(&self) -> ID {
        id::from_key(self.key)
    }

    fn text(&self) -> &str {
        &self.text
    }

    async fn author(&self, context: &Context) -> ApiResult<User> {
        User::load_by_key(self.author, context)
            .await?
            .ok_or_else(|| not_found!("author of comment {} not found", self.key))
    }

    async fn post(&self, context: &Context) -> ApiResult<Post> {
        Post::load_by_key(self.post, context)
            .await?
            .ok_or_else(|| not_found!("post of comment {} not found", self.key))
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// The scalar fields of a comment as they were before an update or deletion.
pub(crate) struct CommentPreviousValues(pub(crate) Comment);

#[graphql_object(Context = Context)]
impl CommentPreviousValues {
    fn id(&self) -> ID {
        id::from_key(self.0.key)
    }

    fn text(&self) -> &str {
        &self.0.text
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.0.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.0.updated_at
    }
}

#[derive(GraphQLInputObject)]
pub(crate) struct CreateCommentInput {
    pub(crate) text: String,
    /// The post to comment on. Has to be published.
    pub(crate) post: ID,
}

#[derive(GraphQLInputObject)]
pub(crate) struct UpdateCommentInput {
    pub(crate) text: Option<String>,
}


impl Comment {
    /// All comments. There is no free-text search for comments.
    pub(crate) async fn load(args: ListArgs, context: &Context) -> ApiResult<Vec<Self>> {
        reject_search(&args)?;
        Ok(context.db.load(&shape::comments(args)).await?)
    }

    pub(crate) async fn create(data: CreateCommentInput, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let not_found = || not_found!(key = "comment.post-not-found", "Unable to find post");

        // Only published posts can be commented on, even by their author.
        let post = id::to_key(&data.post).ok_or_else(not_found)?;
        let spec = shape::post_by_id(post, Identity::Anonymous);
        if context.db.load_first::<Post>(&spec).await?.is_none() {
            return Err(not_found());
        }

        let comment = context.db
            .query_opt(
                &format!(
                    "insert into comments (text, author, post) values ($1, $2, $3) \
                        returning {}",
                    Self::COLUMNS,
                ),
                &[&data.text, &user, &post],
            )
            .await?
            .map(|row| Self::from_row(&row))
            .ok_or_else(|| internal_server_error!("insert did not return a row"))?;

        debug!(comment = %comment.key, post = %post, "Created comment");
        context.events.publish(Event::Comment(Change::created(comment.clone())));
        Ok(comment)
    }

    pub(crate) async fn update(
        id: ID,
        data: UpdateCommentInput,
        context: &Context,
    ) -> ApiResult<Self> {
        let user = context.require_user()?;
        let not_found = || not_found!(key = "comment.update-failed", "Unable to update comment");
        let key = id::to_key(&id).ok_or_else(not_found)?;

        let previous = context.db
            .query_opt(
                &format!("select {} from comments where id = $1 and author = $2", Self::COLUMNS),
                &[&key, &user],
            )
            .await?
            .map(|row| Self::from_row(&row))
            .ok_or_else(not_found)?;

        let comment = context.db
            .query_opt(
                &format!(
                    "update comments set text = coalesce($3, text), updated_at = now() \
                        where id = $1 and author = $2 \
                        returning {}",
                    Self::COLUMNS,
                ),
                &[&key, &user, &data.text],
            )
            .await?
            .map(|row| Self::from_row(&row))
            .ok_or_else(not_found)?;

        debug!(comment = %comment.key, "Updated comment");
        context.events.publish(Event::Comment(Change {
            mutation: MutationType::Updated,
            node: Some(comment.clone()),
            previous: Some(previous),
        }));
        Ok(comment)
    }

    pub(crate) async fn delete(id: ID, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let not_found = || not_found!(key = "comment.delete-failed", "Unable to delete comment");
        let key = id::to_key(&id).ok_or_else(not_found)?;

        let comment = context.db
            .query_opt(
                &format!(
                    "delete from comments where id = $1 and author = $2 returning {}",
                    Self::COLUMNS,
                ),
                &[&key, &user],
            )
            .await?
            .map(|row| Self::from_row(&row))
            .ok_or_else(not_found)?;

        debug!(comment = %comment.key, "Deleted comment");
        context.events.publish(Event::Comment(Change::deleted(comment.clone())));
        Ok(comment)
    }
}

fn reject_search(args: &ListArgs) -> ApiResult<()> {
    match args.query() {
        Some(_) => Err(invalid_input!(
            key = "comment.query-unsupported",
            "Comments cannot be searched",
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
impl Comment {
    pub(crate) fn for_test(key: Key, author: Key, post: Key) -> Self {
        Self {
            key,
            text: format!("Comment {key}"),
            author,
            post,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
