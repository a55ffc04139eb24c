use std::{fmt, time::Duration};

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpStream,
    spawn,
    sync::mpsc::{unbounded_channel, UnboundedReceiver},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{connect_async, tungstenite::protocol, MaybeTlsStream, WebSocketStream};

use crate::{
    helpers::{engine_io_path, engine_io_url, origin},
    prelude::*,
    req::HttpClient,
    ws::message_types::{EnginePacket, OpenHandshake},
    Error,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl TransportKind {
    pub fn query_name(&self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_name())
    }
}

/// One Engine.IO session over a concrete transport.
#[derive(Debug)]
pub(crate) enum Transport {
    WebSocket(WebSocketTransport),
    Polling(PollingTransport),
}

pub(crate) struct WebSocketTransport {
    writer: SplitSink<WsStream, protocol::Message>,
    reader: SplitStream<WsStream>,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport").finish_non_exhaustive()
    }
}

/// HTTP long-polling. A background task keeps one GET outstanding and
/// forwards decoded packets, so [`Transport::recv`] stays cancel-safe.
#[derive(Debug)]
pub(crate) struct PollingTransport {
    http: HttpClient,
    session_path: String,
    incoming: UnboundedReceiver<Result<EnginePacket>>,
    poller: JoinHandle<()>,
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

impl Transport {
    /// Opens an Engine.IO session and waits for the server's `open` packet.
    pub(crate) async fn open(
        kind: TransportKind,
        base_url: &str,
        path: &str,
        http: &reqwest::Client,
        timeout: Duration,
    ) -> Result<(Transport, OpenHandshake)> {
        let opening = async {
            match kind {
                TransportKind::WebSocket => Self::open_websocket(base_url, path).await,
                TransportKind::Polling => {
                    let http = HttpClient::new(http.clone(), origin(base_url, false));
                    Self::open_polling(http, path).await
                }
            }
        };
        time::timeout(timeout, opening).await.map_err(|_| {
            Error::ws_connection(format!(
                "{kind} handshake timed out after {}ms",
                timeout.as_millis()
            ))
        })?
    }

    async fn open_websocket(base_url: &str, path: &str) -> Result<(Transport, OpenHandshake)> {
        let url = engine_io_url(base_url, path, TransportKind::WebSocket.query_name(), None);
        debug!("Opening websocket transport {url}");
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::ws_connection(e.to_string()))?;
        let (writer, reader) = stream.split();
        let mut transport = Transport::WebSocket(WebSocketTransport { writer, reader });

        loop {
            match transport.recv().await {
                Some(Ok(EnginePacket::Open(handshake))) => return Ok((transport, handshake)),
                Some(Ok(other)) => debug!("Ignoring pre-open packet {other:?}"),
                Some(Err(err)) => return Err(err),
                None => return Err(Error::ws_connection("connection closed before open packet")),
            }
        }
    }

    async fn open_polling(http: HttpClient, path: &str) -> Result<(Transport, OpenHandshake)> {
        let handshake_path = engine_io_path(path, TransportKind::Polling.query_name(), None);
        debug!("Opening polling transport {}{handshake_path}", http.base_url);
        let body = http.get(&handshake_path).await?;

        let handshake = EnginePacket::decode_payload(&body)
            .into_iter()
            .find_map(|packet| match packet {
                Ok(EnginePacket::Open(handshake)) => Some(handshake),
                _ => None,
            })
            .ok_or_else(|| Error::ws_connection("polling handshake returned no open packet"))?;

        let session_path = engine_io_path(
            path,
            TransportKind::Polling.query_name(),
            Some(&handshake.sid),
        );
        let (sender, incoming) = unbounded_channel();
        let poller = {
            let http = http.clone();
            let session_path = session_path.clone();
            spawn(async move {
                loop {
                    match http.get(&session_path).await {
                        Ok(body) => {
                            let mut closed = false;
                            for packet in EnginePacket::decode_payload(&body) {
                                closed |= matches!(packet, Ok(EnginePacket::Close));
                                if sender.send(packet).is_err() {
                                    return;
                                }
                            }
                            if closed {
                                return;
                            }
                        }
                        Err(err) => {
                            let _ = sender.send(Err(Error::ws_connection(err.to_string())));
                            return;
                        }
                    }
                }
            })
        };

        Ok((
            Transport::Polling(PollingTransport {
                http,
                session_path,
                incoming,
                poller,
            }),
            handshake,
        ))
    }

    pub(crate) fn kind(&self) -> TransportKind {
        match self {
            Transport::WebSocket(_) => TransportKind::WebSocket,
            Transport::Polling(_) => TransportKind::Polling,
        }
    }

    pub(crate) async fn send(&mut self, packet: &EnginePacket) -> Result<()> {
        let text = packet.encode()?;
        match self {
            Transport::WebSocket(ws) => ws
                .writer
                .send(protocol::Message::Text(text))
                .await
                .map_err(|e| Error::ws_send(e.to_string())),
            Transport::Polling(polling) => polling
                .http
                .post(&polling.session_path, text)
                .await
                .map(|_| ())
                .map_err(|e| Error::ws_send(e.to_string())),
        }
    }

    /// Next packet, or `None` once the transport is closed.
    ///
    /// Connection failures surface as `Error::Ws`; an undecodable packet
    /// surfaces as a parse error and the transport remains usable.
    pub(crate) async fn recv(&mut self) -> Option<Result<EnginePacket>> {
        match self {
            Transport::WebSocket(ws) => loop {
                match ws.reader.next().await? {
                    Ok(protocol::Message::Text(text)) => return Some(EnginePacket::decode(&text)),
                    Ok(protocol::Message::Close(frame)) => {
                        debug!("Websocket closed by server: {frame:?}");
                        return None;
                    }
                    Ok(protocol::Message::Binary(_)) => {
                        warn!("Ignoring binary websocket frame");
                    }
                    Ok(_) => {}
                    Err(err) => return Some(Err(Error::ws_connection(err.to_string()))),
                }
            },
            Transport::Polling(polling) => polling.incoming.recv().await,
        }
    }

    /// Best-effort close; errors are logged, not returned.
    pub(crate) async fn close(&mut self) {
        if let Err(err) = self.send(&EnginePacket::Close).await {
            debug!("Error sending engine.io close: {err}");
        }
        if let Transport::WebSocket(ws) = self {
            if let Err(err) = ws.writer.send(protocol::Message::Close(None)).await {
                debug!("Error sending websocket close frame: {err}");
            }
        }
    }
}
