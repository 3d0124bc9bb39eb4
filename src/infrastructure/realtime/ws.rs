//! WebSocket connector for the realtime endpoint

use crate::infrastructure::realtime::session::{RealtimeError, SessionChannel, SessionConnector};
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;
use tracing::info;
use url::Url;

#[derive(Debug, Clone)]
pub struct WsConnector {
    url: Url,
    api_key: String,
}

impl WsConnector {
    /// `endpoint` is the realtime base URL; the model goes in the query string
    pub fn new(endpoint: &str, model: &str, api_key: impl Into<String>) -> Result<Self, RealtimeError> {
        let mut url =
            Url::parse(endpoint).map_err(|e| RealtimeError::InvalidEndpoint(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RealtimeError::InvalidEndpoint(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        url.query_pairs_mut().append_pair("model", model);
        Ok(Self {
            url,
            api_key: api_key.into(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

fn map_ws_error(err: WsError) -> RealtimeError {
    match err {
        WsError::Http(response) if response.status().is_client_error() => {
            RealtimeError::Rejected(format!("HTTP {}", response.status()))
        }
        WsError::ConnectionClosed | WsError::AlreadyClosed => RealtimeError::Closed,
        other => RealtimeError::Transport(other.to_string()),
    }
}

#[async_trait]
impl SessionConnector for WsConnector {
    async fn connect(&self) -> Result<SessionChannel, RealtimeError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::InvalidEndpoint(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| RealtimeError::InvalidEndpoint(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws_stream, _) = connect_async(request).await.map_err(map_ws_error)?;
        info!("Connected to realtime endpoint {}", self.url.host_str().unwrap_or_default());

        let (write, read) = ws_stream.split();
        let sink = write
            .sink_map_err(map_ws_error)
            .with(|text: String| future::ready(Ok::<_, RealtimeError>(Message::Text(text))));
        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(_)) => None,
                Ok(_) => None,
                Err(e) => Some(Err(map_ws_error(e))),
            })
        });

        Ok(SessionChannel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
