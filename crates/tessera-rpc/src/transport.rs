//! Transport layer for plugin communication.
//!
//! Plugins are child processes speaking Content-Length framed JSON over
//! stdin/stdout. A single connection carries any number of unary calls and
//! streams; a background reader task routes each inbound [`Frame`] to the
//! waiting call or the owning stream.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, RpcError};
use crate::protocol::{Frame, Message};
use crate::stream::ActionStream;

/// A connection to a plugin able to make unary calls and open streams.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Make a unary call and wait for its result.
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value>;

    /// Open a bidirectional stream for `method`.
    async fn open_stream(&self, method: &str) -> Result<Box<dyn ActionStream>>;
}

/// Write one frame with Content-Length framing.
pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(writer: &mut W, frame: &Frame) -> Result<()> {
    let json = serde_json::to_string(frame)?;
    writer
        .write_all(format!("Content-Length: {}\r\n\r\n", json.len()).as_bytes())
        .await?;
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;

    tracing::trace!(content_length = json.len(), json = %json, "sent frame");
    Ok(())
}

/// Read one frame. Returns `None` on a clean EOF between frames.
pub async fn read_frame<R: AsyncBufRead + Unpin + ?Sized>(reader: &mut R) -> Result<Option<Frame>> {
    let mut content_length: Option<usize> = None;
    let mut in_header = false;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            if in_header {
                return Err(RpcError::protocol("connection closed inside frame header"));
            }
            return Ok(None);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !in_header {
                continue;
            }
            break;
        }
        in_header = true;

        if let Some(len) = trimmed.strip_prefix("Content-Length:") {
            content_length = Some(
                len.trim()
                    .parse()
                    .map_err(|e| RpcError::protocol(format!("invalid Content-Length: {e}")))?,
            );
        }
    }

    let content_length =
        content_length.ok_or_else(|| RpcError::protocol("missing Content-Length header"))?;
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    tracing::trace!(content_length, "received frame");
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Configuration for spawning a plugin process.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Timeout applied to unary calls.
    pub request_timeout: Duration,
}

impl TransportConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;
type PendingCalls = HashMap<u64, oneshot::Sender<Result<serde_json::Value>>>;
type OpenStreams = HashMap<u64, mpsc::UnboundedSender<Result<Message>>>;

struct Shared {
    writer: tokio::sync::Mutex<Writer>,
    pending: Mutex<PendingCalls>,
    streams: Mutex<OpenStreams>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Shared {
    async fn write(&self, frame: &Frame) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::transport("connection closed"));
        }
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await
    }

    fn route(&self, frame: Frame) {
        match frame {
            Frame::Response { id, result, error } => {
                let Some(tx) = self.pending.lock().remove(&id) else {
                    tracing::debug!(id, "response for unknown call");
                    return;
                };
                let outcome = match error {
                    Some(message) => Err(RpcError::remote(message)),
                    None => Ok(result.unwrap_or(serde_json::Value::Null)),
                };
                let _ = tx.send(outcome);
            }
            Frame::Message { stream, message } => match self.streams.lock().get(&stream) {
                Some(tx) => {
                    let _ = tx.send(Ok(message));
                }
                None => tracing::debug!(stream, id = message.id, "message for unknown stream"),
            },
            Frame::CloseSend { stream } => {
                self.streams.lock().remove(&stream);
            }
            Frame::Close { stream, error } => {
                if let Some(tx) = self.streams.lock().remove(&stream)
                    && let Some(message) = error
                {
                    let _ = tx.send(Err(RpcError::remote(message)));
                }
            }
            Frame::Request { method, .. } | Frame::Open { method, .. } => {
                tracing::warn!(method = %method, "plugin-initiated calls are not supported");
            }
        }
    }

    /// Fail every waiter once the connection is gone.
    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.pending.lock().clear();
        self.streams.lock().clear();
    }
}

/// Transport over a child process's stdio.
pub struct StdioTransport {
    name: String,
    shared: Arc<Shared>,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn the plugin executable and start routing its output.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: TransportConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            RpcError::spawn_failed(format!("failed to spawn '{}': {}", config.command, e))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::spawn_failed("failed to capture stdout"))?;

        tracing::info!(
            plugin = %config.command,
            pid = child.id(),
            "spawned plugin process"
        );

        let mut transport =
            Self::connect(config.command.clone(), stdout, stdin, config.request_timeout);
        transport.child = Mutex::new(Some(child));
        Ok(transport)
    }

    /// Speak the protocol over an arbitrary reader/writer pair.
    pub fn connect<R, W>(name: impl Into<String>, reader: R, writer: W, request_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let name = name.into();
        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        });

        let reader = tokio::spawn(read_loop(name.clone(), BufReader::new(reader), shared.clone()));

        Self {
            name,
            shared,
            request_timeout,
            reader,
            child: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
    }

    /// Kill the plugin process and fail any outstanding calls.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!(plugin = %self.name, "shutting down plugin transport");
        self.reader.abort();
        self.shared.shutdown();
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        Ok(())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop<R>(name: String, mut reader: BufReader<R>, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => shared.route(frame),
            Ok(None) => {
                tracing::debug!(plugin = %name, "plugin closed its output");
                break;
            }
            Err(e) => {
                tracing::warn!(plugin = %name, error = %e, "plugin connection failed");
                break;
            }
        }
    }
    shared.shutdown();
}

#[async_trait]
impl Transport for StdioTransport {
    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);

        let frame = Frame::Request {
            id,
            method: method.to_string(),
            params,
        };
        if let Err(e) = self.shared.write(&frame).await {
            self.shared.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RpcError::transport("connection closed")),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                tracing::warn!(plugin = %self.name, method, "request timed out");
                Err(RpcError::Timeout)
            }
        }
    }

    async fn open_stream(&self, method: &str) -> Result<Box<dyn ActionStream>> {
        let stream = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.streams.lock().insert(stream, tx);

        let frame = Frame::Open {
            stream,
            method: method.to_string(),
        };
        if let Err(e) = self.shared.write(&frame).await {
            self.shared.streams.lock().remove(&stream);
            return Err(e);
        }

        tracing::debug!(plugin = %self.name, stream, method, "opened stream");
        Ok(Box::new(StdioStream {
            stream,
            shared: self.shared.clone(),
            rx,
        }))
    }
}

/// A stream multiplexed over a [`StdioTransport`].
///
/// Its routing entry lives until the stream is closed or dropped.
struct StdioStream {
    stream: u64,
    shared: Arc<Shared>,
    rx: mpsc::UnboundedReceiver<Result<Message>>,
}

impl Drop for StdioStream {
    fn drop(&mut self) {
        self.shared.streams.lock().remove(&self.stream);
    }
}

#[async_trait]
impl ActionStream for StdioStream {
    async fn send(&mut self, message: Message) -> Result<()> {
        self.shared
            .write(&Frame::Message {
                stream: self.stream,
                message,
            })
            .await
    }

    async fn recv(&mut self) -> Result<Option<Message>> {
        self.rx.recv().await.transpose()
    }

    async fn close_send(&mut self) -> Result<()> {
        self.shared
            .write(&Frame::CloseSend {
                stream: self.stream,
            })
            .await
    }

    async fn close(&mut self) {
        self.shared.streams.lock().remove(&self.stream);
        self.rx.close();
        let _ = self
            .shared
            .write(&Frame::Close {
                stream: self.stream,
                error: None,
            })
            .await;
    }
}
