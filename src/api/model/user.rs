use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use juniper::{graphql_object, GraphQLInputObject, ID};
use tokio_postgres::Row;

use crate::{
    api::{
        Context,
        err::{ApiResult, internal_server_error, invalid_input, map_db_err, not_found},
        id,
        model::{comment::Comment, post::Post},
    },
    auth::{password, Identity},
    db::{types::Key, Table},
    prelude::*,
    query::{shape, ListArgs},
};


#[derive(Debug, Clone)]
pub(crate) struct User {
    pub(crate) key: Key,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Set when this user was just authenticated by `createUser` or `login`.
    /// The request itself carries no token in that case.
    viewer: Option<Identity>,
}

impl Table for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static str = "id, name, email, created_at, updated_at";

    fn from_row(row: &Row) -> Self {
        Self {
            key: row.get(0),
            name: row.get(1),
            email: row.get(2),
            created_at: row.get(3),
            updated_at: row.get(4),
            viewer: None,
        }
    }
}

#[graphql_object(Context = Context)]
impl User {
    fn id(&self) -> ID {
        id::from_key(self.key)
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// The email address. Only visible to the user themselves, `null` for
    /// everyone else.
    fn email(&self, context: &Context) -> ApiResult<Option<&str>> {
        self.visible_email(context)
    }

    /// The published posts of this user.
    async fn posts(&self, context: &Context) -> ApiResult<Vec<Post>> {
        Ok(context.db.load(&shape::user_posts(self.key)).await?)
    }

    async fn comments(&self, context: &Context) -> ApiResult<Vec<Comment>> {
        Ok(context.db.load(&shape::user_comments(self.key)).await?)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}


/// Returned by `createUser` and `login`.
#[derive(Debug)]
pub(crate) struct AuthPayload {
    pub(crate) token: String,
    pub(crate) user: User,
}

#[graphql_object(Context = Context)]
impl AuthPayload {
    /// Token to send as `Authorization: Bearer <token>` header (or as
    /// `Authorization` connection parameter for subscriptions).
    fn token(&self) -> &str {
        &self.token
    }

    fn user(&self) -> &User {
        &self.user
    }
}

#[derive(GraphQLInputObject)]
pub(crate) struct CreateUserInput {
    pub(crate) name: String,
    pub(crate) email: String,
    /// At least 8 characters.
    pub(crate) password: String,
}

#[derive(GraphQLInputObject)]
pub(crate) struct LoginUserInput {
    pub(crate) email: String,
    pub(crate) password: String,
}

/// Fields that are not given are left unchanged.
#[derive(GraphQLInputObject)]
pub(crate) struct UpdateUserInput {
    pub(crate) name: Option<String>,
    pub(crate) email: Option<String>,
    pub(crate) password: Option<String>,
}


impl User {
    /// The email is returned only if the viewer is this user.
    pub(crate) fn visible_email(&self, context: &Context) -> ApiResult<Option<&str>> {
        let viewer = match self.viewer {
            Some(identity) => identity,
            None => context.identity(false)?,
        };
        Ok(viewer.is(self.key).then_some(self.email.as_str()))
    }

    /// Wraps a freshly authenticated user with a new token for them.
    fn authenticated(mut self, context: &Context) -> ApiResult<AuthPayload> {
        let token = context.jwt.issue(self.key)?;
        self.viewer = Some(Identity::User(self.key));
        Ok(AuthPayload { token, user: self })
    }

    pub(crate) async fn load(args: ListArgs, context: &Context) -> ApiResult<Vec<Self>> {
        Ok(context.db.load(&shape::users(args)).await?)
    }

    pub(crate) async fn load_by_key(key: Key, context: &Context) -> ApiResult<Option<Self>> {
        Ok(context.db.load_first(&shape::by_key(key)).await?)
    }

    /// The record of the requesting user. Requires authentication.
    pub(crate) async fn load_me(context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        context.db.load_first(&shape::me(user))
            .await?
            .ok_or_else(|| not_found!(key = "user.not-found", "User not found"))
    }

    pub(crate) async fn create(data: CreateUserInput, context: &Context) -> ApiResult<AuthPayload> {
        let password = hash_password(data.password, context).await?;
        let row = context.db
            .query_opt(
                &format!(
                    "insert into users (name, email, password) values ($1, $2, $3) \
                        returning {}",
                    Self::COLUMNS,
                ),
                &[&data.name, &data.email, &password],
            )
            .await
            .pipe(|result| map_db_err!(result, {
                if constraint == "unique_user_email" => email_taken(),
            }))?
            .ok_or_else(|| internal_server_error!("insert did not return a row"))?;

        let user = Self::from_row(&row);
        info!(user = %user.key, "Created user");
        user.authenticated(context)
    }

    pub(crate) async fn login(data: LoginUserInput, context: &Context) -> ApiResult<AuthPayload> {
        let row = context.db
            .query_opt(
                &format!("select {}, password from users where email = $1", Self::COLUMNS),
                &[&data.email],
            )
            .await?;

        // Unknown email and wrong password result in the same error.
        let fail = || invalid_input!(key = "login.failed", "Unable to login");
        let row = row.ok_or_else(fail)?;
        let stored = row.get::<_, String>(5);
        let matches = tokio::task::spawn_blocking(move || password::verify(&data.password, &stored))
            .await
            .map_err(|e| internal_server_error!("password check failed: {e}"))?;
        if !matches {
            debug!("Failed login attempt");
            return Err(fail());
        }

        let user = Self::from_row(&row);
        debug!(user = %user.key, "User logged in");
        user.authenticated(context)
    }

    pub(crate) async fn update(data: UpdateUserInput, context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let password = match data.password {
            Some(password) => Some(hash_password(password, context).await?),
            None => None,
        };

        context.db
            .query_opt(
                &format!(
                    "update users set \
                        name = coalesce($2, name), \
                        email = coalesce($3, email), \
                        password = coalesce($4, password), \
                        updated_at = now() \
                        where id = $1 \
                        returning {}",
                    Self::COLUMNS,
                ),
                &[&user, &data.name, &data.email, &password],
            )
            .await
            .pipe(|result| map_db_err!(result, {
                if constraint == "unique_user_email" => email_taken(),
            }))?
            .map(|row| Self::from_row(&row))
            .ok_or_else(|| not_found!(key = "user.not-found", "User not found"))
    }

    /// Deletes the requesting user. Their posts and comments are deleted with
    /// them (by the database).
    pub(crate) async fn delete(context: &Context) -> ApiResult<Self> {
        let user = context.require_user()?;
        let deleted = context.db
            .query_opt(
                &format!("delete from users where id = $1 returning {}", Self::COLUMNS),
                &[&user],
            )
            .await?
            .map(|row| Self::from_row(&row))
            .ok_or_else(|| not_found!(key = "user.not-found", "User not found"))?;

        info!(user = %deleted.key, "Deleted user");
        Ok(deleted)
    }
}

fn email_taken() -> crate::api::err::ApiError {
    invalid_input!(key = "user.email-taken", "Email is already in use")
}

/// Checks the length requirement and hashes the password on the blocking
/// thread pool.
async fn hash_password(password: String, context: &Context) -> ApiResult<String> {
    if !password::is_long_enough(&password) {
        return Err(invalid_input!(
            key = "user.password-too-short",
            "password must be {} characters or greater",
            password::MIN_LENGTH,
        ));
    }

    let iterations = NonZeroU32::new(context.config.auth.pbkdf2_iterations)
        .unwrap_or(NonZeroU32::MIN);
    tokio::task::spawn_blocking(move || password::hash(&password, iterations))
        .await
        .map_err(|e| internal_server_error!("password hashing failed: {e}"))
}
