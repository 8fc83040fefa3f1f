//! API error handling.
//!
//! We define our own error to use for all resolvers. It has `From` impls to be
//! created from other common errors that occur (e.g. DB or auth errors). This
//! module also offers a couple macros to easily create an error.
//!
//! The error contains a coarse "error kind" that clients can branch on
//! (`extensions.kind` in the response) and an optional, more specific "key"
//! (`extensions.key`).

use juniper::{FieldError, IntoFieldError, ScalarValue, graphql_value};

use crate::{auth::AuthError, db::DbError, prelude::*};


pub(crate) type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) msg: String,
    pub(crate) kind: ApiErrorKind,
    pub(crate) key: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApiErrorKind {
    /// The arguments passed to an endpoint are invalid somehow.
    InvalidInput,

    /// No credential was supplied, but the field requires one.
    NotAuthenticated,

    /// A credential was supplied, but it failed verification.
    InvalidToken,

    /// The requested item does not exist or is not visible to the requester.
    NotFound,

    /// Some server error out of control of the API user.
    InternalServerError,
}

impl ApiErrorKind {
    fn kind_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::NotFound => "NOT_FOUND",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<DbError> for ApiError {
    fn from(src: DbError) -> Self {
        // Logging the error here is not ideal but probably totally fine for us.
        // At this point, it's very very likely that the error is sent back to
        // the user. And this is the last time we can get detailed information
        // about it.
        error!("DB Error when executing query: {src}");
        debug!("Detailed error: {src:#?}");

        // The details might contain parts of the data, so we don't send them
        // to the client.
        Self {
            msg: "database error".into(),
            kind: ApiErrorKind::InternalServerError,
            key: None,
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(src: tokio_postgres::Error) -> Self {
        DbError::Backend(src).into()
    }
}

impl From<AuthError> for ApiError {
    fn from(src: AuthError) -> Self {
        match src {
            AuthError::Unauthenticated => Self {
                msg: "Authentication required".into(),
                kind: ApiErrorKind::NotAuthenticated,
                key: None,
            },
            AuthError::InvalidToken(e) => Self {
                msg: format!("Invalid token: {e}"),
                kind: ApiErrorKind::InvalidToken,
                key: None,
            },
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(src: jsonwebtoken::errors::Error) -> Self {
        error!("Failed to sign token: {src}");
        Self {
            msg: "failed to issue token".into(),
            kind: ApiErrorKind::InternalServerError,
            key: None,
        }
    }
}

impl<S: ScalarValue> IntoFieldError<S> for ApiError {
    fn into_field_error(self) -> juniper::FieldError<S> {
        let ext = if let Some(key) = self.key {
            graphql_value!({
                "kind": (self.kind.kind_str()),
                "key": key,
            })
        } else {
            graphql_value!({
                "kind": (self.kind.kind_str()),
            })
        };

        FieldError::new(self.msg, ext)
    }
}


// ===== Helper macros to easily create errors ==================================================

/// Creates an `ApiError` with a `format!` like syntax.
macro_rules! api_err {
    ($kind:ident, key = $key:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::api::err::ApiError {
            msg: format!($fmt $(, $arg)*),
            kind: $crate::api::err::ApiErrorKind::$kind,
            key: Some($key),
        }
    };
    ($kind:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::api::err::ApiError {
            msg: format!($fmt $(, $arg)*),
            kind: $crate::api::err::ApiErrorKind::$kind,
            key: None,
        }
    };
}

macro_rules! invalid_input {
    ($($t:tt)+) => { $crate::api::err::api_err!(InvalidInput, $($t)*) };
}

macro_rules! not_authenticated {
    ($($t:tt)+) => { $crate::api::err::api_err!(NotAuthenticated, $($t)*) };
}

macro_rules! not_found {
    ($($t:tt)+) => { $crate::api::err::api_err!(NotFound, $($t)*) };
}

macro_rules! internal_server_error {
    ($($t:tt)+) => { $crate::api::err::api_err!(InternalServerError, $($t)*) };
}

pub(crate) use api_err;
pub(crate) use invalid_input;
pub(crate) use not_authenticated;
pub(crate) use not_found;
pub(crate) use internal_server_error;


// ===== Helper macro to inspect DbError ==================================================

/// Helps you map some special DB errors to specific API errors (instead of a
/// generic "internal server error"). Usage:
///
/// ```ignore
/// // `result` needs to be `Result<T, DbError>`.
/// map_db_err!(result, {
///     if constraint == "unique_user_email" => invalid_input!("email taken"),
///     if /* field */ == /* value */ => /* expression returning ApiError */,
///     // ...
/// })
/// ```
///
/// The macro returns `Result<T, ApiError>`.
macro_rules! map_db_err {
    ($result:expr, { $(
        if $field:ident == $value:expr => $then:expr
    ),* $(,)? }) => {
        match $result {
            Ok(v) => Ok(v),
            Err(e) => {
                let db_error = match &e {
                    $crate::db::DbError::Backend(e) => e.as_db_error(),
                    _ => None,
                };
                let mapped: Option<$crate::api::err::ApiError> = match db_error {
                    $(
                        Some(db_error) if db_error.$field()
                            == $crate::api::err::map_db_err!(@wrap $field $value)
                            => Some($then.into()),
                    )*
                    _ => None,
                };
                Err(mapped.unwrap_or_else(|| e.into()))
            }
        }
    };
    (@wrap constraint $value:expr) => { Some($value) };
    (@wrap code $value:expr) => { &$value };
}

pub(crate) use map_db_err;


#[cfg(test)]
mod tests {
    use juniper::{DefaultScalarValue, IntoFieldError, graphql_value};

    use crate::auth::{AuthError, VerifyError};
    use super::*;

    #[test]
    fn field_error_has_kind_and_literal_message() {
        let err: FieldError<DefaultScalarValue> = not_found!("Post not found").into_field_error();
        assert_eq!(err.message(), "Post not found");
        assert_eq!(err.extensions(), &graphql_value!({ "kind": "NOT_FOUND" }));
    }

    #[test]
    fn key_is_added_to_extensions() {
        let err = invalid_input!(key = "user.email-taken", "email '{}' is taken", "a@b.c");
        assert_eq!(err.msg, "email 'a@b.c' is taken");
        let err: FieldError<DefaultScalarValue> = err.into_field_error();
        assert_eq!(
            err.extensions(),
            &graphql_value!({ "kind": "INVALID_INPUT", "key": "user.email-taken" }),
        );
    }

    #[test]
    fn auth_errors() {
        let err = ApiError::from(AuthError::Unauthenticated);
        assert_eq!(err.kind, ApiErrorKind::NotAuthenticated);
        assert_eq!(err.msg, "Authentication required");

        let err = ApiError::from(AuthError::InvalidToken(VerifyError::Expired));
        assert_eq!(err.kind, ApiErrorKind::InvalidToken);
    }
}
