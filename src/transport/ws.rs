use crate::error::{Error, Result};
use reqwest::header::HeaderValue;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

const API_VERSION: &str = "2025-05-01-preview";
const REALTIME_PATH: &str = "voice-live/realtime";

#[derive(Debug)]
pub struct WsStream(WebSocketStream<MaybeTlsStream<TcpStream>>);

impl WsStream {
    pub(crate) const fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self(stream)
    }
}

impl futures::Stream for WsStream {
    type Item = std::result::Result<
        tokio_tungstenite::tungstenite::Message,
        tokio_tungstenite::tungstenite::Error,
    >;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.0).poll_next(cx)
    }
}

impl futures::Sink<tokio_tungstenite::tungstenite::Message> for WsStream {
    type Error = tokio_tungstenite::tungstenite::Error;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_ready(cx)
    }

    fn start_send(
        mut self: std::pin::Pin<&mut Self>,
        item: tokio_tungstenite::tungstenite::Message,
    ) -> std::result::Result<(), Self::Error> {
        std::pin::Pin::new(&mut self.0).start_send(item)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_close(cx)
    }
}

/// Build the realtime WebSocket URL from the service's https endpoint.
///
/// # Errors
/// Returns an error if the endpoint does not parse or uses an unsupported scheme.
#[allow(clippy::result_large_err)]
pub fn realtime_url(endpoint: &str, model: &str) -> Result<Url> {
    let mut url = Url::parse(endpoint)?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(Error::Configuration(format!(
                "unsupported endpoint scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::Configuration(format!("cannot use {scheme} for {endpoint}")))?;

    let path = format!("{}/{REALTIME_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("api-version", API_VERSION)
        .append_pair("model", model);
    Ok(url)
}

/// Establish a WebSocket connection to the realtime service.
///
/// # Errors
/// Returns an error if the URL is invalid or the handshake fails.
pub async fn connect(endpoint: &str, api_key: &str, model: &str) -> Result<WsStream> {
    let url = realtime_url(endpoint, model)?;
    let key_header = HeaderValue::from_str(api_key)?;

    let mut req = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
        url.as_str(),
    )?;
    req.headers_mut().insert("api-key", key_header);
    let (ws_stream, _) = connect_async(req).await?;

    tracing::info!(host = url.host_str().unwrap_or_default(), model, "Connected to realtime service");

    Ok(WsStream::new(ws_stream))
}
