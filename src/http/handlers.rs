use http_body_util::{BodyExt, Limited};
use hyper::{header, Method, StatusCode};
use juniper::http::{GraphQLBatchRequest, GraphQLRequest};
use std::{sync::Arc, time::Instant};

use crate::{auth::RequestContext, prelude::*};
use super::{Context, Request, Response, log, response, ws};


/// Maximum size of a GraphQL request body.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// This is the main HTTP entry point, called for each incoming request.
pub(super) async fn handle(req: Request, ctx: Arc<Context>) -> Response {
    let before = Instant::now();
    log::req::log(&req);
    log::headers::log(&req, ctx.config.log.log_http_headers);

    let method = req.method().clone();
    let path = req.uri().path().trim_end_matches('/').to_owned();

    let response = match path.as_str() {
        // The GraphQL endpoint. Queries and mutations via POST, subscriptions
        // via WebSocket.
        "/graphql" if method == Method::POST => handle_api(req, &ctx).await,
        "/graphql" if method == Method::GET => {
            if ws::is_upgrade_request(&req) {
                ws::upgrade(req, Arc::clone(&ctx))
            } else {
                response::bad_request(Some(
                    "GET requests to /graphql must be WebSocket upgrade requests",
                ))
            }
        }
        "/graphql" => response::method_not_allowed(),

        // The interactive GraphQL API explorer/IDE. It does not expose any
        // information that isn't already exposed by the API itself.
        "/graphiql" if method == Method::GET => graphiql(&req),
        "/graphiql" => response::method_not_allowed(),

        _ => {
            debug!("Responding with 404 to {:?} '{}'", method, path);
            response::not_found()
        }
    };

    log::response::log(response.status(), before.elapsed());
    response
}

/// Handles a `POST` request to `/graphql`.
async fn handle_api(req: Request, ctx: &Context) -> Response {
    let before = Instant::now();
    let (parts, body) = req.into_parts();

    let body = match Limited::new(body, MAX_BODY_SIZE).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!("Failed to read body of API request: {e}");
            return response::bad_request(Some("failed to read request body"));
        }
    };

    // Besides JSON, we also accept the plain query with `application/graphql`.
    let is_graphql = parts.headers.get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/graphql"));
    let request = if is_graphql {
        match String::from_utf8(body.to_vec()) {
            Ok(query) => GraphQLBatchRequest::Single(GraphQLRequest::new(query, None, None)),
            Err(_) => return response::bad_request(Some("request body is not valid UTF-8")),
        }
    } else {
        match serde_json::from_slice::<GraphQLBatchRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                debug!("Invalid GraphQL request: {e}");
                return response::bad_request(Some(&format!("invalid GraphQL request: {e}")));
            }
        }
    };

    let api_context = ctx.api_context(RequestContext::Http(parts.headers));
    let out = request.execute(&ctx.api_root, &api_context).await;
    let status = if out.is_ok() { StatusCode::OK } else { StatusCode::BAD_REQUEST };

    let response = match serde_json::to_vec(&out) {
        Ok(json) => response::with_content_type(status, "application/json", json),
        Err(e) => {
            error!("Failed to serialize GraphQL response: {e}");
            response::internal_server_error()
        }
    };

    debug!(
        "Finished /graphql query in {:.2?} (with {} SQL queries)",
        before.elapsed(),
        api_context.db.num_queries(),
    );

    response
}

/// Serves GraphiQL, configured to use our API and subscription endpoint.
fn graphiql(req: &Request) -> Response {
    let host = req.headers().get(header::HOST).and_then(|v| v.to_str().ok());
    let subscriptions_url = host.map(|host| format!("ws://{host}/graphql"));
    let html = juniper::http::graphiql::graphiql_source("/graphql", subscriptions_url.as_deref());
    response::with_content_type(StatusCode::OK, "text/html; charset=UTF-8", html)
}
