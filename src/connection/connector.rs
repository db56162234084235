//! Socket opening, kept behind a trait so the loop can be driven without a device

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub use tokio_tungstenite::tungstenite::Error as WsError;

/// Client WebSocket stream to the companion app
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens one WebSocket connection per call
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<WsStream, WsError>;
}

/// Plain `tokio-tungstenite` client connector
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<WsStream, WsError> {
        let (stream, _response) = connect_async(url).await?;
        Ok(stream)
    }
}
