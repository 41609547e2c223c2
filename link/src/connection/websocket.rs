//! Low-level WebSocket helpers: URL construction, the transport seam and the
//! default tokio-tungstenite connector.

use crate::{
    error::{PhoenixLinkError, Result},
    event_handlers::ConnectionError,
};
use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{error::Error as WsError, protocol::Message as WsMessage},
};
use url::Url;

/// Path segment every Phoenix socket endpoint is served under.
pub const TRANSPORT_SUFFIX: &str = "websocket";

/// A message-oriented, bidirectional frame transport.
///
/// Implemented for every tokio-tungstenite `WebSocketStream`, whatever the
/// underlying byte stream is.
pub trait Transport:
    Stream<Item = std::result::Result<WsMessage, WsError>>
    + Sink<WsMessage, Error = WsError>
    + Send
    + Unpin
{
}

impl<T> Transport for T where
    T: Stream<Item = std::result::Result<WsMessage, WsError>>
        + Sink<WsMessage, Error = WsError>
        + Send
        + Unpin
{
}

pub type BoxedTransport = Box<dyn Transport>;

pub type ConnectFuture = BoxFuture<'static, std::result::Result<BoxedTransport, ConnectionError>>;

/// Opens a transport for a fully built connection URL.
pub type Connector = Arc<dyn Fn(String) -> ConnectFuture + Send + Sync>;

/// Connector that dials the URL with `tokio_tungstenite::connect_async`.
pub fn tungstenite_connector() -> Connector {
    Arc::new(|url: String| -> ConnectFuture {
        Box::pin(async move {
            match connect_async(url.as_str()).await {
                Ok((stream, _response)) => Ok(Box::new(stream) as BoxedTransport),
                Err(e) => Err(describe_connect_error(e)),
            }
        })
    })
}

fn describe_connect_error(error: WsError) -> ConnectionError {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            let body_text = response
                .into_body()
                .as_ref()
                .and_then(|b| {
                    if b.is_empty() {
                        None
                    } else {
                        Some(String::from_utf8_lossy(b).into_owned())
                    }
                })
                .unwrap_or_default();
            let message = match status.as_u16() {
                401 => "Unauthorized: socket rejected the connection params".to_string(),
                403 => "Forbidden: access to the socket denied".to_string(),
                code if body_text.is_empty() => format!("WebSocket HTTP error: {}", code),
                code => format!("WebSocket HTTP error {}: {}", code, body_text),
            };
            ConnectionError::new(message, false)
        },
        WsError::Url(e) => ConnectionError::new(format!("Invalid socket URL: {}", e), false),
        other => ConnectionError::new(format!("Connection failed: {}", other), true),
    }
}

/// Build the connection URL for an endpoint.
///
/// Appends `/websocket` unless the path already ends with it, maps
/// `http(s)` to `ws(s)`, and serializes `params` as the query string.
pub fn build_socket_url(endpoint: &str, params: &BTreeMap<String, String>) -> Result<String> {
    let mut url = Url::parse(endpoint.trim()).map_err(|e| {
        PhoenixLinkError::ConfigurationError(format!("Invalid endpoint '{}': {}", endpoint, e))
    })?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(PhoenixLinkError::ConfigurationError(format!(
                "Unsupported endpoint scheme '{}'; expected ws(s) or http(s)",
                other
            )));
        },
    };
    url.set_scheme(ws_scheme).map_err(|_| {
        PhoenixLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;

    if url.host_str().is_none() {
        return Err(PhoenixLinkError::ConfigurationError(
            "endpoint must include a host".to_string(),
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(PhoenixLinkError::ConfigurationError(
            "endpoint must not include query parameters or fragments; use params instead"
                .to_string(),
        ));
    }

    let path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with(&format!("/{}", TRANSPORT_SUFFIX)) {
        url.set_path(&format!("{}/{}", path, TRANSPORT_SUFFIX));
    }

    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter());
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_appends_transport_suffix() {
        assert_eq!(
            build_socket_url("ws://localhost:4000/socket", &BTreeMap::new()).unwrap(),
            "ws://localhost:4000/socket/websocket"
        );
    }

    #[test]
    fn test_keeps_existing_suffix() {
        assert_eq!(
            build_socket_url("wss://example.com/socket/websocket", &BTreeMap::new()).unwrap(),
            "wss://example.com/socket/websocket"
        );
    }

    #[test]
    fn test_trailing_slash_and_bare_host() {
        assert_eq!(
            build_socket_url("ws://localhost:4000/socket/", &BTreeMap::new()).unwrap(),
            "ws://localhost:4000/socket/websocket"
        );
        assert_eq!(
            build_socket_url("ws://localhost:4000", &BTreeMap::new()).unwrap(),
            "ws://localhost:4000/websocket"
        );
    }

    #[test]
    fn test_http_schemes_are_mapped() {
        assert_eq!(
            build_socket_url("http://localhost:4000/socket", &BTreeMap::new()).unwrap(),
            "ws://localhost:4000/socket/websocket"
        );
        assert_eq!(
            build_socket_url("https://example.com/socket", &BTreeMap::new()).unwrap(),
            "wss://example.com/socket/websocket"
        );
    }

    #[test]
    fn test_params_are_url_encoded() {
        let url = build_socket_url(
            "ws://localhost:4000/socket",
            &params(&[("token", "a b&c"), ("vsn", "2.0.0")]),
        )
        .unwrap();
        assert_eq!(url, "ws://localhost:4000/socket/websocket?token=a+b%26c&vsn=2.0.0");
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(build_socket_url("not a url", &BTreeMap::new()).is_err());
        assert!(build_socket_url("ftp://example.com/socket", &BTreeMap::new()).is_err());
        assert!(build_socket_url("ws://example.com/socket?x=1", &BTreeMap::new()).is_err());
        assert!(build_socket_url("ws://example.com/socket#frag", &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_connect_error_classification() {
        let err = describe_connect_error(WsError::ConnectionClosed);
        assert!(err.recoverable);
        assert!(err.message.starts_with("Connection failed"));
    }
}
