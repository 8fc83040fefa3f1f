//! GraphQL subscriptions over WebSocket.
//!
//! Both common sub-protocols are supported: `graphql-transport-ws` (the
//! modern one, preferred) and `graphql-ws` (the legacy
//! `subscriptions-transport-ws` protocol with the confusing name). The
//! protocol state machines themselves are implemented by
//! `juniper_graphql_ws`; this module only does the HTTP upgrade and shovels
//! messages between the socket and the protocol connection.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use futures::{future, SinkExt, Stream, StreamExt, TryStreamExt};
use hyper::{header::{self, HeaderMap, HeaderValue}, StatusCode};
use hyper_util::rt::TokioIo;
use juniper::{DefaultScalarValue, Variables};
use juniper_graphql_ws::{graphql_transport_ws, graphql_ws, ArcSchema, ConnectionConfig};
use serde::de::Error as _;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
    tungstenite::{
        handshake::derive_accept_key,
        protocol::{frame::coding::CloseCode, CloseFrame, Role},
        Message,
        Utf8Bytes,
    },
    WebSocketStream,
};

use crate::{auth::{ConnectionParams, RequestContext}, prelude::*};
use super::{Context, Request, Response, response};


const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";
const GRAPHQL_WS: &str = "graphql-ws";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    GraphqlTransportWs,
    GraphqlWs,
}

impl Protocol {
    fn name(self) -> &'static str {
        match self {
            Self::GraphqlTransportWs => GRAPHQL_TRANSPORT_WS,
            Self::GraphqlWs => GRAPHQL_WS,
        }
    }
}

/// Whether the request asks to be upgraded to a WebSocket connection.
pub(super) fn is_upgrade_request(req: &Request) -> bool {
    has_upgrade_headers(req.headers())
}

fn has_upgrade_headers(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers.get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    let upgrade_websocket = headers.get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));

    connection_upgrade && upgrade_websocket
}

/// Picks the sub-protocol from the ones the client offers. `Ok(None)` means
/// the client did not offer any, in which case we speak
/// `graphql-transport-ws` without confirming it in the response.
fn select_protocol(headers: &HeaderMap) -> Result<Option<Protocol>, ()> {
    let offered = headers.get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();

    if offered.is_empty() {
        Ok(None)
    } else if offered.contains(&GRAPHQL_TRANSPORT_WS) {
        Ok(Some(Protocol::GraphqlTransportWs))
    } else if offered.contains(&GRAPHQL_WS) {
        Ok(Some(Protocol::GraphqlWs))
    } else {
        Err(())
    }
}

/// Answers the upgrade request and spawns a task serving the WebSocket
/// connection once hyper has handed it over.
pub(super) fn upgrade(mut req: Request, ctx: Arc<Context>) -> Response {
    let headers = req.headers();
    if headers.get(header::SEC_WEBSOCKET_VERSION).is_none_or(|v| v != "13") {
        return response::bad_request(Some("unsupported WebSocket version, expected 13"));
    }
    let Some(key) = headers.get(header::SEC_WEBSOCKET_KEY) else {
        return response::bad_request(Some("missing 'Sec-WebSocket-Key' header"));
    };
    let accept = derive_accept_key(key.as_bytes());
    let Ok(offered_protocol) = select_protocol(headers) else {
        return response::bad_request(Some(
            "none of the offered WebSocket sub-protocols is supported, \
                use 'graphql-transport-ws' or 'graphql-ws'",
        ));
    };
    let protocol = offered_protocol.unwrap_or(Protocol::GraphqlTransportWs);

    let Ok(accept) = HeaderValue::from_str(&accept) else {
        return response::internal_server_error();
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let socket = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    None,
                ).await;
                debug!("Opened WebSocket connection ({})", protocol.name());
                serve(socket, protocol, ctx).await;
                debug!("Closed WebSocket connection");
            }
            Err(e) => warn!("WebSocket upgrade failed: {e}"),
        }
    });

    let mut response = response::with_status(StatusCode::SWITCHING_PROTOCOLS, "");
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    if let Some(protocol) = offered_protocol {
        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(protocol.name()));
    }
    response
}

/// Runs the protocol until either side closes the connection.
async fn serve<S>(socket: WebSocketStream<S>, protocol: Protocol, ctx: Arc<Context>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let schema = ArcSchema(Arc::clone(&ctx.api_root));

    // The API context is created once the client sent `connection_init`, as
    // that carries the credentials. It is shared by all operations on this
    // connection.
    let init = move |params: Variables| {
        let request = RequestContext::Connection(connection_params(params));
        let config = ConnectionConfig::new(ctx.api_context(request));
        future::ready(Ok::<_, Infallible>(config))
    };

    let (ws_tx, ws_rx) = socket.split();

    // Pings and pongs are answered by tungstenite itself.
    let ws_rx = ws_rx
        .try_filter(|msg| future::ready(!matches!(
            msg,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_),
        )))
        .map_ok(WsMessage);

    let result = match protocol {
        Protocol::GraphqlTransportWs => {
            let (s_tx, s_rx) = graphql_transport_ws::Connection::new(schema, init).split::<WsMessage>();
            let output = s_rx.map(|output| Ok(match output {
                graphql_transport_ws::Output::Message(msg) => to_text_message(&msg),
                graphql_transport_ws::Output::Close { code, message } => {
                    Message::Close(Some(CloseFrame {
                        code: CloseCode::from(code),
                        reason: message.into(),
                    }))
                }
            }));
            shovel(ws_rx, s_tx.sink_map_err(|e| match e {}), output, ws_tx).await
        }
        Protocol::GraphqlWs => {
            let (s_tx, s_rx) = graphql_ws::Connection::new(schema, init).split::<WsMessage>();
            let output = s_rx.map(|msg| Ok(to_text_message(&msg)));
            shovel(ws_rx, s_tx.sink_map_err(|e| match e {}), output, ws_tx).await
        }
    };

    if let Err(e) = result {
        debug!("WebSocket connection ended with error: {e}");
    }
}

/// Forwards client messages to the protocol connection and its replies back
/// to the client. Returns when one direction is done.
async fn shovel<In, ToConn, Out, ToClient>(
    input: In,
    to_connection: ToConn,
    output: Out,
    to_client: ToClient,
) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    In: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>,
    ToConn: futures::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>,
    Out: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ToClient: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error>,
{
    let input = input.forward(to_connection);
    let output = output.forward(to_client);
    futures::pin_mut!(input, output);

    match future::select(input, output).await {
        future::Either::Left((result, _)) => result,
        future::Either::Right((result, _)) => result,
    }
}

fn to_text_message<T: serde::Serialize>(msg: &T) -> Message {
    match serde_json::to_string(msg) {
        Ok(json) => Message::text(json),
        Err(e) => {
            error!("Failed to serialize WebSocket message: {e}");
            Message::Close(Some(CloseFrame {
                code: CloseCode::Error,
                reason: Utf8Bytes::from_static("internal server error"),
            }))
        }
    }
}

/// The string values of the `connection_init` payload. Other values cannot
/// carry credentials and are ignored.
fn connection_params(params: Variables) -> ConnectionParams {
    let map = params.into_iter()
        .filter_map(|(k, v)| v.as_string_value().map(|s| (k, s.to_owned())))
        .collect::<HashMap<_, _>>();
    ConnectionParams::new(map)
}


/// A message from the client, converted into the protocol's message type
/// by the protocol connection.
struct WsMessage(Message);

impl TryFrom<WsMessage> for graphql_transport_ws::Input<DefaultScalarValue> {
    type Error = serde_json::Error;

    fn try_from(msg: WsMessage) -> Result<Self, Self::Error> {
        match msg.0 {
            Message::Text(text) => serde_json::from_str(text.as_str()).map(Self::Message),
            Message::Binary(bytes) => serde_json::from_slice(&bytes).map(Self::Message),
            Message::Close(_) => Ok(Self::Close),
            other => Err(serde_json::Error::custom(format!("unexpected message: {other:?}"))),
        }
    }
}

impl TryFrom<WsMessage> for graphql_ws::ClientMessage<DefaultScalarValue> {
    type Error = serde_json::Error;

    fn try_from(msg: WsMessage) -> Result<Self, Self::Error> {
        match msg.0 {
            Message::Text(text) => serde_json::from_str(text.as_str()),
            Message::Binary(bytes) => serde_json::from_slice(&bytes),
            Message::Close(_) => Ok(Self::ConnectionTerminate),
            other => Err(serde_json::Error::custom(format!("unexpected message: {other:?}"))),
        }
    }
}


#[cfg(test)]
mod tests {
    use hyper::header::{self, HeaderMap, HeaderValue};
    use juniper::{InputValue, Variables};

    use super::{connection_params, has_upgrade_headers, select_protocol, Protocol};


    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        pairs.iter()
            .map(|(name, value)| (name.clone(), HeaderValue::from_static(value)))
            .collect()
    }

    #[test]
    fn upgrade_detection() {
        assert!(has_upgrade_headers(&headers(&[
            (header::CONNECTION, "Upgrade"),
            (header::UPGRADE, "websocket"),
        ])));
        assert!(has_upgrade_headers(&headers(&[
            (header::CONNECTION, "keep-alive, Upgrade"),
            (header::UPGRADE, "WebSocket"),
        ])));
        assert!(!has_upgrade_headers(&headers(&[(header::UPGRADE, "websocket")])));
        assert!(!has_upgrade_headers(&headers(&[(header::CONNECTION, "Upgrade")])));
        assert!(!has_upgrade_headers(&HeaderMap::new()));
    }

    #[test]
    fn protocol_selection() {
        let offer = |v| headers(&[(header::SEC_WEBSOCKET_PROTOCOL, v)]);

        assert_eq!(select_protocol(&HeaderMap::new()), Ok(None));
        assert_eq!(
            select_protocol(&offer("graphql-ws, graphql-transport-ws")),
            Ok(Some(Protocol::GraphqlTransportWs)),
        );
        assert_eq!(select_protocol(&offer("graphql-ws")), Ok(Some(Protocol::GraphqlWs)));
        assert_eq!(select_protocol(&offer("mqtt")), Err(()));
    }

    #[test]
    fn only_string_params_are_kept() {
        let mut params = Variables::new();
        params.insert("Authorization".into(), InputValue::scalar("Bearer abc".to_owned()));
        params.insert("retries".into(), InputValue::scalar(3));

        let params = connection_params(params);
        assert_eq!(params.get("authorization"), Some("Bearer abc"));
        assert_eq!(params.get("retries"), None);
    }
}
