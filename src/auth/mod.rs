//! Authentication: who is talking to us?
//!
//! Requests carry a bearer token that is signed with a shared secret and
//! contains the ID of the user. Queries and mutations arrive via HTTP and
//! carry the token in the `Authorization` header. Subscriptions live on a
//! WebSocket connection and carry it in the `connection_init` payload. Both
//! are normalized into a [`RequestContext`] at the edge, and resolvers derive
//! an [`Identity`] from it whenever they need one.

use std::{borrow::Cow, collections::HashMap, fmt, time::Duration};

use hyper::HeaderMap;
use secrecy::{ExposeSecret, SecretString};

use crate::{db::types::Key, prelude::*};


mod jwt;
pub(crate) mod password;


pub(crate) use self::jwt::{JwtContext, VerifyError};


/// The literal prefix of the authorization value. Note the trailing space.
const BEARER_PREFIX: &str = "Bearer ";

/// The user identifier carried in tokens.
pub(crate) type UserId = Key;


/// Authentication and token configuration.
#[derive(Debug, Clone, confique::Config)]
pub(crate) struct AuthConfig {
    /// The shared secret used to sign and verify tokens (HS256). Every
    /// token signed with another secret is rejected. Should be long and
    /// random, e.g. the output of `openssl rand -base64 48`.
    pub(crate) jwt_secret: SecretString,

    /// How long a token issued by `login` or `createUser` is valid.
    #[config(default = "7d", deserialize_with = crate::config::deserialize_duration)]
    pub(crate) token_lifetime: Duration,

    /// Number of PBKDF2 iterations used when hashing new passwords. Existing
    /// password hashes store their own iteration count, so changing this
    /// only affects new passwords.
    #[config(default = 100_000)]
    pub(crate) pbkdf2_iterations: u32,
}

impl AuthConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        let secret_len = self.jwt_secret.expose_secret().len();
        if secret_len == 0 {
            bail!("'auth.jwt_secret' must not be empty");
        }
        if secret_len < 32 {
            warn!("'auth.jwt_secret' is shorter than 32 bytes. Consider using a longer secret.");
        }
        if self.pbkdf2_iterations == 0 {
            bail!("'auth.pbkdf2_iterations' must be at least 1");
        }

        Ok(())
    }
}


/// Where a resolver invocation came from. Resolved once at the edge (HTTP
/// handler or WebSocket `connection_init`).
pub(crate) enum RequestContext {
    /// A query or mutation sent via HTTP.
    Http(HeaderMap),

    /// An operation on a persistent WebSocket connection.
    Connection(ConnectionParams),
}

/// The parameters the client sent in the `connection_init` message of a
/// WebSocket connection. Only string values are kept.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionParams(HashMap<String, String>);

impl ConnectionParams {
    pub(crate) fn new(params: HashMap<String, String>) -> Self {
        Self(params)
    }

    /// Looks up a parameter, ignoring ASCII case of the key. If several keys
    /// only differ in case, an exact match is preferred.
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key)
            .or_else(|| {
                self.0.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(|v| v.as_str())
    }
}

impl RequestContext {
    /// Returns the raw authorization value, if any. Empty values count as
    /// absent. Header values that are not valid UTF-8 are converted lossily
    /// (and will then fail verification).
    pub(crate) fn authorization(&self) -> Option<Cow<'_, str>> {
        let value = match self {
            Self::Http(headers) => headers.get(hyper::header::AUTHORIZATION)
                .map(|v| String::from_utf8_lossy(v.as_bytes()))?,
            Self::Connection(params) => params.get("Authorization").map(Cow::Borrowed)?,
        };

        Some(value).filter(|v| !v.is_empty())
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Connection(_) => "connection",
        }
    }
}


/// The identity behind a resolver invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Identity {
    /// No credential was supplied (and none was required).
    Anonymous,

    /// The token verified and names this user.
    User(UserId),
}

impl Identity {
    pub(crate) fn user(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(id) => Some(*id),
        }
    }

    /// Returns `true` if this is the given user. Always `false` for anonymous.
    pub(crate) fn is(&self, user: UserId) -> bool {
        self.user() == Some(user)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::User(id) => write!(f, "user {id}"),
        }
    }
}


/// Why no identity could be derived.
#[derive(Debug)]
pub(crate) enum AuthError {
    /// No credential was supplied, but authentication is required.
    Unauthenticated,

    /// A credential was supplied, but it failed verification.
    InvalidToken(VerifyError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "Authentication required"),
            Self::InvalidToken(e) => write!(f, "invalid token: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}


/// Derives the identity of the requester from the authorization value in
/// `ctx`.
///
/// - No value: `Err(Unauthenticated)` if `require_auth`, otherwise
///   `Ok(Anonymous)`.
/// - A value: the `Bearer ` prefix is stripped if present and the rest is
///   verified. Failing verification is an error regardless of
///   `require_auth`.
///
/// Nothing is cached: every call verifies the token again.
pub(crate) fn extract_identity(
    ctx: &RequestContext,
    jwt: &JwtContext,
    require_auth: bool,
) -> Result<Identity, AuthError> {
    let Some(value) = ctx.authorization() else {
        return if require_auth {
            debug!(context = ctx.kind(), "Authentication required, but no credential supplied");
            Err(AuthError::Unauthenticated)
        } else {
            Ok(Identity::Anonymous)
        };
    };

    let token = value.strip_prefix(BEARER_PREFIX).unwrap_or(&value);
    match jwt.verify(token) {
        Ok(user) => {
            trace!(context = ctx.kind(), %user, "Authenticated request");
            Ok(Identity::User(user))
        }
        Err(e) => {
            debug!(context = ctx.kind(), "Rejecting token: {e}");
            Err(AuthError::InvalidToken(e))
        }
    }
}
