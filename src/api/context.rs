use std::sync::Arc;

use crate::{
    api::err::{ApiResult, not_authenticated},
    auth::{extract_identity, Identity, JwtContext, RequestContext, UserId},
    config::Config,
    db::Db,
    events::EventBus,
};


/// The context that is accessible to every resolver in our API.
///
/// For queries and mutations, one context is created per HTTP request. For
/// subscriptions, one context is created per WebSocket connection and shared
/// by all operations on it.
pub(crate) struct Context {
    pub(crate) db: Db,
    pub(crate) request: RequestContext,
    pub(crate) jwt: Arc<JwtContext>,
    pub(crate) events: EventBus,
    pub(crate) config: Arc<Config>,
}

impl juniper::Context for Context {}

impl Context {
    /// Derives the identity of the requester. This verifies the token every
    /// time it is called; nothing is cached.
    pub(crate) fn identity(&self, require_auth: bool) -> ApiResult<Identity> {
        Ok(extract_identity(&self.request, &self.jwt, require_auth)?)
    }

    /// Like `identity(true)`, but returns the user ID directly.
    pub(crate) fn require_user(&self) -> ApiResult<UserId> {
        match self.identity(true)? {
            Identity::User(id) => Ok(id),
            // Unreachable with `require_auth`.
            Identity::Anonymous => Err(not_authenticated!("Authentication required")),
        }
    }
}
