//! The HTTP server, handler and routes.
//!
//! This file itself contains fairly little business logic and just sets up the
//! `hyper` server and catches errors. The main logic is in `handlers.rs` and
//! `ws.rs`.

use bytes::Bytes;
use deadpool_postgres::Pool;
use http_body_util::Full;
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use std::{
    convert::Infallible,
    future::Future,
    net::{IpAddr, SocketAddr},
    panic::AssertUnwindSafe,
    sync::Arc,
};
use tokio::net::TcpListener;

use crate::{
    api,
    auth::{JwtContext, RequestContext},
    config::Config,
    db::Db,
    events::EventBus,
    prelude::*,
};
use self::{handlers::handle, response::internal_server_error};


mod handlers;
mod log;
mod response;
mod ws;


/// HTTP server configuration.
#[derive(Debug, Clone, confique::Config)]
pub(crate) struct HttpConfig {
    /// The TCP port the HTTP server should listen on.
    #[config(default = 4000, env = "PORT")]
    pub(crate) port: u16,

    /// The bind address to listen on.
    #[config(default = "127.0.0.1")]
    pub(crate) address: IpAddr,
}


// Our responses always have a fully buffered body.
type Response<T = Full<Bytes>> = hyper::Response<T>;
type Request<T = Incoming> = hyper::Request<T>;


/// Context that the request handler has access to.
struct Context {
    api_root: Arc<api::RootNode>,
    db_pool: Pool,
    jwt: Arc<JwtContext>,
    events: EventBus,
    config: Arc<Config>,
}

impl Context {
    /// The API context for one request (or one WebSocket connection). Each
    /// gets its own `Db` handle so that queries are counted separately.
    fn api_context(&self, request: RequestContext) -> api::Context {
        api::Context {
            db: Db::new(self.db_pool.clone()),
            request,
            jwt: self.jwt.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }
}


/// Starts the HTTP server. The future returned by this function must be awaited
/// to actually run it. It only returns on error or when the process receives
/// Ctrl+C.
pub(crate) async fn serve(
    config: Config,
    api_root: api::RootNode,
    db: Pool,
    jwt: Arc<JwtContext>,
    events: EventBus,
) -> Result<()> {
    let addr = SocketAddr::new(config.http.address, config.http.port);
    let ctx = Arc::new(Context {
        api_root: Arc::new(api_root),
        db_pool: db,
        jwt,
        events,
        config: Arc::new(config),
    });

    let listener = TcpListener::bind(addr).await
        .context(format!("failed to bind to {addr}"))?;
    info!("Listening on http://{}", listener.local_addr()?);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(v) => v,
                Err(e) => {
                    warn!("Failed to accept TCP connection: {e}");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down HTTP server");
                return Ok(());
            }
        };

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                handle_internal_errors(handle(req, Arc::clone(&ctx)))
            });

            // `with_upgrades` is required for the WebSocket endpoint.
            let res = auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(stream), service)
                .await;
            if let Err(e) = res {
                debug!("Error serving connection from {peer}: {e}");
            }
        });
    }
}

/// This just wraps another future and catches all panics that might occur when
/// resolving/polling that given future. This ensures that we always answer with
/// `500` instead of just crashing the thread and closing the connection.
async fn handle_internal_errors(
    future: impl Future<Output = Response>,
) -> Result<Response, Infallible> {
    // The `AssertUnwindSafe` is unfortunately necessary. What we are saying
    // here is: "if the future panicks, the remaining application state is not
    // 'broken'."
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(response) => Ok(response),
        Err(panic) => {
            // For most panics (which use `panic!` like `println!`), the payload
            // is either `&str` or `String`.
            let msg = panic.downcast_ref::<String>()
                .map(|s| s.as_str())
                .or(panic.downcast_ref::<&str>().map(|s| *s));

            match msg {
                Some(msg) => error!("INTERNAL SERVER ERROR: HTTP handler panicked: '{msg}'"),
                None => error!("INTERNAL SERVER ERROR: HTTP handler panicked"),
            }

            Ok(internal_server_error())
        }
    }
}
