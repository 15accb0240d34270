//! Remote detector over a persistent WebSocket connection.
//!
//! Each request is one binary message holding a JPEG image; each reply is one text
//! message holding a JSON document:
//!
//! ```json
//! {"detections":[{"label":"cup","confidence":0.91,"x":0.4,"y":0.3,"width":0.1,"height":0.2}],
//!  "inference_time_ms":21.5}
//! ```
//!
//! Coordinates are normalized, origin top-left. Replies arrive in request order.
//!
//! Send failures, disconnects and malformed responses resolve to an empty detection
//! list; the caller never sees a transport error.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tungstenite::client::IntoClientRequest;
use tungstenite::{Message, WebSocket};

use crate::detect::backend::{ConnectionStatus, DetectorBackend};
use crate::detect::result::{normalize_detections, Detection};
use crate::frame::{Frame, DEFAULT_JPEG_QUALITY};
use crate::geometry::BoundingBox;

/// Upper bound on a single response body.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Port of the detection server when the address names none.
pub const DEFAULT_DETECTOR_PORT: u16 = 8765;

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Wire format
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoteResponse {
    #[serde(default)]
    pub detections: Vec<RemoteDetection>,
    #[serde(default)]
    pub inference_time_ms: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoteDetection {
    pub label: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<RemoteDetection> for Detection {
    fn from(d: RemoteDetection) -> Self {
        Detection::new(d.label, d.confidence, BoundingBox::new(d.x, d.y, d.width, d.height))
    }
}

/// Parse a response body from the detection server.
pub fn parse_response(payload: &[u8]) -> Result<RemoteResponse> {
    serde_json::from_slice(payload).map_err(|e| anyhow!("malformed detector response: {}", e))
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

/// Request/response transport to a detection server.
pub trait DetectionLink: Send {
    fn connect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Send one request and block for its response.
    fn round_trip(&mut self, payload: &[u8]) -> Result<Vec<u8>>;

    fn disconnect(&mut self);
}

/// Blocking WebSocket client link.
pub struct WsLink {
    url: String,
    io_timeout: Duration,
    socket: Option<WebSocket<TcpStream>>,
}

impl WsLink {
    /// `addr` is a `ws://host:port/path` URL or a bare `host[:port]`.
    pub fn new(addr: impl AsRef<str>) -> Self {
        Self {
            url: websocket_url(addr.as_ref()),
            io_timeout: DEFAULT_IO_TIMEOUT,
            socket: None,
        }
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// `host:port` -> `ws://host:port`; bare hosts get the detector port.
pub fn websocket_url(addr: &str) -> String {
    let addr = addr.trim();
    if addr.contains("://") {
        return addr.to_string();
    }
    let (host, rest) = match addr.split_once('/') {
        Some((host, path)) => (host, format!("/{}", path)),
        None => (addr, String::new()),
    };
    if host.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        format!("ws://{}{}", host, rest)
    } else {
        format!("ws://{}:{}{}", host, DEFAULT_DETECTOR_PORT, rest)
    }
}

impl DetectionLink for WsLink {
    fn connect(&mut self) -> Result<()> {
        let request = self
            .url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid detector url {}", self.url))?;
        let uri = request.uri();
        if uri.scheme_str() != Some("ws") {
            bail!("detector url {} must use ws://", self.url);
        }
        let host = uri
            .host()
            .ok_or_else(|| anyhow!("detector url {} has no host", self.url))?
            .to_string();
        let port = uri.port_u16().unwrap_or(DEFAULT_DETECTOR_PORT);
        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .with_context(|| format!("resolve detector address {}", self.url))?
            .next()
            .ok_or_else(|| anyhow!("detector address {} did not resolve", self.url))?;

        let stream = TcpStream::connect_timeout(&addr, self.io_timeout)
            .with_context(|| format!("connect to detector at {}", self.url))?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        stream.set_nodelay(true)?;
        let (socket, _response) = tungstenite::client(request, stream)
            .map_err(|e| anyhow!("websocket handshake with {} failed: {}", self.url, e))?;
        self.socket = Some(socket);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn round_trip(&mut self, payload: &[u8]) -> Result<Vec<u8>> {
        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| anyhow!("detector link is not connected"))?;
        socket.send(Message::Binary(payload.to_vec()))?;
        loop {
            let body = match socket.read()? {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(bytes) => bytes,
                Message::Close(_) => bail!("detector closed the connection"),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            if body.len() > MAX_RESPONSE_BYTES {
                bail!(
                    "detector response of {} bytes exceeds limit {}",
                    body.len(),
                    MAX_RESPONSE_BYTES
                );
            }
            return Ok(body);
        }
    }

    fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = socket.close(None);
            let _ = socket.flush();
        }
    }
}

// ----------------------------------------------------------------------------
// Backend
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct RemoteSettings {
    pub jpeg_quality: u8,
    /// Minimum spacing between reconnect attempts.
    pub reconnect_interval: Duration,
    pub min_confidence: f32,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            reconnect_interval: Duration::from_secs(2),
            min_confidence: 0.25,
        }
    }
}

pub struct RemoteBackend<L: DetectionLink> {
    link: L,
    settings: RemoteSettings,
    status: ConnectionStatus,
    last_attempt: Option<Instant>,
    last_server_ms: Option<f64>,
}

impl<L: DetectionLink> RemoteBackend<L> {
    pub fn new(link: L, settings: RemoteSettings) -> Self {
        Self {
            link,
            settings,
            status: ConnectionStatus::new(),
            last_attempt: None,
            last_server_ms: None,
        }
    }

    /// Server-side inference time reported with the last response.
    pub fn last_server_ms(&self) -> Option<f64> {
        self.last_server_ms
    }

    fn try_connect(&mut self) -> bool {
        if self.link.is_connected() {
            return true;
        }
        let due = self
            .last_attempt
            .map_or(true, |at| at.elapsed() >= self.settings.reconnect_interval);
        if !due {
            return false;
        }
        self.last_attempt = Some(Instant::now());
        match self.link.connect() {
            Ok(()) => {
                log::info!("remote detector connected");
                self.status.set_connected(true);
                true
            }
            Err(err) => {
                log::warn!("remote detector unavailable: {}", err);
                self.status.set_connected(false);
                false
            }
        }
    }

    fn drop_link(&mut self, reason: &anyhow::Error) {
        log::warn!("remote detector disconnected: {}", reason);
        self.link.disconnect();
        self.status.set_connected(false);
        self.last_attempt = Some(Instant::now());
    }
}

impl<L: DetectionLink> DetectorBackend for RemoteBackend<L> {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if !self.try_connect() {
            return Ok(Vec::new());
        }
        let payload = frame.encode_jpeg(self.settings.jpeg_quality)?;
        let body = match self.link.round_trip(&payload) {
            Ok(body) => body,
            Err(err) => {
                self.drop_link(&err);
                return Ok(Vec::new());
            }
        };
        let response = match parse_response(&body) {
            Ok(response) => response,
            Err(err) => {
                log::warn!("{}", err);
                return Ok(Vec::new());
            }
        };
        self.last_server_ms = response.inference_time_ms;
        let detections = response.detections.into_iter().map(Detection::from).collect();
        Ok(normalize_detections(detections, self.settings.min_confidence))
    }

    fn connection_status(&self) -> Option<ConnectionStatus> {
        Some(self.status.clone())
    }

    fn warm_up(&mut self) -> Result<()> {
        if self.try_connect() {
            Ok(())
        } else {
            Err(anyhow!("remote detector not reachable yet"))
        }
    }
}
