//! APRS-IS TCP client.
//!
//! A long-lived, single-connection client: connect, send the login line,
//! then read newline-delimited lines until EOF, error, or cancellation.
//! Lines are surfaced to one consumer as [`ClientEvent`]s; a supervising
//! component owns the reconnect policy.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::AppError;

const APP_NAME: &str = "aprshub";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Event emitted by the stream client to its single consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A non-`#` line: a raw TNC2 packet.
    Raw(String),
    /// The `# logresp` line was seen; true when the passcode verified.
    Validated(bool),
    /// The connection ended (EOF, read error, or `disconnect`).
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct AprsClientConfig {
    pub server: String,
    pub port: u16,
    pub callsign: String,
    /// APRS-IS passcode; `-1` requests a receive-only session.
    pub passcode: String,
    pub filter: Option<String>,
}

impl Default for AprsClientConfig {
    fn default() -> Self {
        Self {
            server: "rotate.aprs2.net".to_string(),
            port: 14580,
            callsign: "N0CALL".to_string(),
            passcode: "-1".to_string(),
            filter: None,
        }
    }
}

pub struct AprsClient {
    config: AprsClientConfig,
    connected: Arc<AtomicBool>,
    read_task: tokio::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl AprsClient {
    pub fn new(config: AprsClientConfig) -> Self {
        Self {
            config,
            connected: Arc::new(AtomicBool::new(false)),
            read_task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Open the connection, send the login line, and spawn the read task.
    ///
    /// Exactly one connection at a time: a second `connect` while connected
    /// fails with `InvalidState`.
    pub async fn connect(
        &self,
        events: flume::Sender<ClientEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(AppError::InvalidState("already connected to APRS-IS"));
        }
        match self.connect_inner(events, cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn connect_inner(
        &self,
        events: flume::Sender<ClientEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), AppError> {
        let address = format!("{}:{}", self.config.server, self.config.port);
        info!("Connecting to APRS-IS server {}", address);

        let stream = TcpStream::connect(&address)
            .await
            .with_context(|| format!("failed to connect to {address}"))?;
        let (reader, mut writer) = stream.into_split();

        let login = build_login_line(&self.config);
        writer
            .write_all(login.as_bytes())
            .await
            .context("failed to send login line")?;
        writer.flush().await.context("failed to flush login line")?;
        info!("Sent APRS-IS login for {}", self.config.callsign);

        let connection_cancel = cancel.child_token();
        let task_cancel = connection_cancel.clone();
        let connected = self.connected.clone();
        let handle = tokio::spawn(async move {
            read_loop(reader, events, task_cancel, connected).await;
        });
        *self.read_task.lock().await = Some((connection_cancel, handle));
        Ok(())
    }

    /// Tear down the connection. Idempotent; safe during shutdown.
    pub async fn disconnect(&self) {
        if let Some((cancel, handle)) = self.read_task.lock().await.take() {
            cancel.cancel();
            let _ = handle.await;
        }
        self.connected.store(false, Ordering::SeqCst);
    }
}

async fn read_loop(
    reader: OwnedReadHalf,
    events: flume::Sender<ClientEvent>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    let mut buf_reader = BufReader::new(reader);
    let mut line_buffer = Vec::new();

    loop {
        line_buffer.clear();
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("APRS-IS read loop cancelled");
                break;
            }
            read = buf_reader.read_until(b'\n', &mut line_buffer) => match read {
                Ok(0) => {
                    warn!("Connection closed by APRS-IS server");
                    break;
                }
                Ok(_) => {
                    let line = decode_line(&line_buffer);
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with('#') {
                        handle_server_line(trimmed, &events);
                    } else {
                        trace!("Received: {}", trimmed);
                        metrics::counter!("aprs.lines.received").increment(1);
                        if events.send(ClientEvent::Raw(trimmed.to_string())).is_err() {
                            debug!("event consumer gone, stopping read loop");
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("APRS-IS read error: {}", e);
                    break;
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = events.send(ClientEvent::Disconnected);
}

/// Decode one wire line. Mic-E information fields may carry bytes that are
/// not valid UTF-8; those lines are recovered with a Latin-1 byte-to-char
/// mapping instead of being dropped.
fn decode_line(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(line) => line.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn handle_server_line(line: &str, events: &flume::Sender<ClientEvent>) {
    debug!("Server message: {}", line);
    let lower = line.to_lowercase();
    if lower.contains("# logresp") {
        let validated = !lower.contains("unverified") && lower.contains("verified");
        if validated {
            info!("APRS-IS passcode verified");
        } else {
            warn!("APRS-IS passcode not verified; session is receive-only");
        }
        let _ = events.send(ClientEvent::Validated(validated));
    }
}

/// `user <CALL> pass <PASS> vers <NAME> <VER>[ filter <FILTER>]\r\n`
fn build_login_line(config: &AprsClientConfig) -> String {
    let mut login = format!(
        "user {} pass {} vers {} {}",
        config.callsign, config.passcode, APP_NAME, APP_VERSION
    );
    if let Some(filter) = &config.filter {
        login.push_str(" filter ");
        login.push_str(filter);
    }
    login.push_str("\r\n");
    login
}
