use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};
use url::Url;

/// Close code the server uses for a malformed project name.
pub const CLOSE_INVALID_PROJECT: u16 = 4000;
/// Close code the server uses for a project missing from its registry.
pub const CLOSE_PROJECT_NOT_FOUND: u16 = 4004;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self.code, Some(CLOSE_INVALID_PROJECT | CLOSE_PROJECT_NOT_FOUND))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    /// Terminal. Errors are reported here too, so a dropped connection has a
    /// single exit whatever caused it.
    Closed(CloseInfo),
}

#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Cancel-safe; after `Closed` it keeps returning `Closed`.
    async fn next_event(&mut self) -> TransportEvent;

    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError>;
}

/// Production connector over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        Ok(Box::new(WsTransport {
            stream,
            closed: None,
        }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: Option<CloseInfo>,
}

impl WsTransport {
    fn finish(&mut self, info: CloseInfo) -> TransportEvent {
        self.closed = Some(info.clone());
        TransportEvent::Closed(info)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed.is_some() {
            return Err(TransportError::Send("connection closed".to_string()));
        }
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }

    async fn next_event(&mut self) -> TransportEvent {
        if let Some(info) = &self.closed {
            return TransportEvent::Closed(info.clone());
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return TransportEvent::Text(text),
                    Err(err) => warn!("ws_binary_frame_not_utf8: {err}"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let info = frame
                        .map(|frame| CloseInfo::new(Some(u16::from(frame.code)), frame.reason.to_string()))
                        .unwrap_or_else(|| CloseInfo::new(Some(u16::from(CloseCode::Status)), ""));
                    debug!("ws_close_frame: code={:?} reason={}", info.code, info.reason);
                    return self.finish(info);
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("ws_transport_error: {err}");
                    return self.finish(CloseInfo::new(None, err.to_string()));
                }
                None => return self.finish(CloseInfo::new(None, "stream ended")),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed.is_none() {
            self.closed = Some(CloseInfo::new(Some(u16::from(CloseCode::Normal)), "client close"));
        }
        if let Err(err) = self.stream.close(None).await {
            debug!("ws_close_error: {err}");
        }
    }
}
