// WebSocket sensor source
//
// Connects to the device and forwards each text frame verbatim to the
// reconciler. A server close or a socket error ends the run; there is no
// automatic reconnect, restarting the session is a user action.

use super::SensorSource;
use crate::types::{MonitorError, MonitorResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketSensorSource {
    url: String,
    stream: Option<WsStream>,
    is_connected: bool,
}

impl WebSocketSensorSource {
    pub fn new(url: String) -> Self {
        Self {
            url,
            stream: None,
            is_connected: false,
        }
    }
}

#[async_trait]
impl SensorSource for WebSocketSensorSource {
    async fn connect(&mut self) -> MonitorResult<()> {
        if self.is_connected {
            return Ok(());
        }

        log::info!("Connecting to sensor device: {}", self.url);

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| MonitorError::WebSocket(format!("Connection failed: {}", e)))?;

        log::info!("WebSocket connected");

        self.stream = Some(ws_stream);
        self.is_connected = true;

        Ok(())
    }

    async fn run(&mut self, sender: mpsc::Sender<String>) -> MonitorResult<()> {
        if self.stream.is_none() {
            self.connect().await?;
        }

        let ws_stream = self
            .stream
            .take()
            .ok_or_else(|| MonitorError::Connection("No active WebSocket stream".to_string()))?;

        let (_write, mut read) = ws_stream.split();

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if sender.send(text.to_string()).await.is_err() {
                        log::warn!("Payload receiver closed, stopping WebSocket source");
                        self.is_connected = false;
                        return Ok(());
                    }
                }
                Ok(Message::Binary(_)) => {
                    log::warn!("Ignoring binary WebSocket frame (device sends JSON text)");
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket closed by device");
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => {
                    log::error!("WebSocket error: {}", e);
                    self.is_connected = false;
                    return Err(MonitorError::WebSocket(e.to_string()));
                }
            }
        }

        self.is_connected = false;
        Ok(())
    }

    async fn stop(&mut self) -> MonitorResult<()> {
        log::info!("Closing WebSocket source");
        self.stream = None;
        self.is_connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn describe(&self) -> String {
        format!("websocket {}", self.url)
    }
}
