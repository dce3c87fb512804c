//! # Wyoming Server
//!
//! Listens on TCP or a unix socket and runs one task per connection. Each
//! task owns a fresh session and dispatcher and processes that connection's
//! events strictly in order.
//!
//! ## Connection Lifecycle:
//! 1. **Accept**: New session with its own id, inside a `connection` span
//! 2. **Loop**: Read event → dispatch → write reply, until the client closes
//! 3. **Close**: On end of stream, a disconnect, or any dispatch error

use crate::error::{AppError, AppResult};
use crate::handler::EventHandler;
use crate::protocol::codec::{read_event, write_event};
use crate::session::{ConnectionSession, SessionConfig};
use crate::state::ServerStats;
use crate::transcription::SpeechEngine;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Where the Wyoming server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenUri {
    /// `tcp://host:port`
    Tcp(String),
    /// `unix://path`
    Unix(PathBuf),
}

impl std::str::FromStr for ListenUri {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            let port = addr
                .rsplit_once(':')
                .filter(|(host, _)| !host.is_empty())
                .and_then(|(_, port)| port.parse::<u16>().ok());
            return match port {
                Some(_) => Ok(ListenUri::Tcp(addr.to_string())),
                None => Err(AppError::Config(format!(
                    "invalid tcp address '{}' (expected tcp://host:port)",
                    s
                ))),
            };
        }

        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(AppError::Config("unix socket path cannot be empty".to_string()));
            }
            return Ok(ListenUri::Unix(PathBuf::from(path)));
        }

        Err(AppError::Config(format!(
            "unsupported URI '{}' (expected tcp:// or unix://)",
            s
        )))
    }
}

impl std::fmt::Display for ListenUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenUri::Tcp(addr) => write!(f, "tcp://{}", addr),
            ListenUri::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

pub struct WyomingServer {
    uri: ListenUri,
    session_config: SessionConfig,
    engine: Arc<dyn SpeechEngine>,
    stats: Arc<ServerStats>,
}

impl WyomingServer {
    pub fn new(
        uri: ListenUri,
        session_config: SessionConfig,
        engine: Arc<dyn SpeechEngine>,
        stats: Arc<ServerStats>,
    ) -> Self {
        Self {
            uri,
            session_config,
            engine,
            stats,
        }
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections already running are not awaited; they end with the process.
    pub async fn run<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        match &self.uri {
            ListenUri::Tcp(addr) => {
                let listener = TcpListener::bind(addr).await?;
                info!("Ready on tcp://{}", listener.local_addr()?);
                self.serve_tcp(listener, shutdown).await
            }
            ListenUri::Unix(path) => self.serve_unix(path.clone(), shutdown).await,
        }
    }

    async fn serve_tcp<F>(&self, listener: TcpListener, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopped accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer.to_string()),
                    Err(e) => warn!("Failed to accept connection: {}", e),
                }
            }
        }
    }

    #[cfg(unix)]
    async fn serve_unix<F>(&self, path: PathBuf, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        use tokio::net::UnixListener;

        remove_stale_socket(&path)?;
        let listener = UnixListener::bind(&path)?;
        info!("Ready on unix://{}", path.display());

        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopped accepting connections");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_connection(stream, path.display().to_string()),
                    Err(e) => warn!("Failed to accept connection: {}", e),
                }
            }
        };

        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to remove socket {}: {}", path.display(), e);
        }
        result
    }

    #[cfg(not(unix))]
    async fn serve_unix<F>(&self, path: PathBuf, _shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        Err(AppError::Config(format!(
            "unix sockets are not supported on this platform ({})",
            path.display()
        )))
    }

    fn spawn_connection<S>(&self, stream: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let session = ConnectionSession::new(self.session_config.clone());
        let span = info_span!("connection", id = %session.id, peer = %peer);
        let handler = EventHandler::new(session, Arc::clone(&self.engine));
        let stats = Arc::clone(&self.stats);

        tokio::spawn(
            async move {
                stats.connection_opened();
                match handle_connection(stream, handler, &stats).await {
                    Ok(()) => debug!("Connection closed"),
                    Err(e) if e.is_disconnect() => debug!("Client went away: {}", e),
                    Err(e) => {
                        stats.record_failure();
                        error!("Closing connection: {}", e);
                    }
                }
                stats.connection_closed();
            }
            .instrument(span),
        );
    }
}

/// Remove a socket left behind by a previous run. Any other kind of file at
/// the path is a configuration error and is left alone.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) -> AppResult<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(path)?;
            Ok(())
        }
        Ok(_) => Err(AppError::Config(format!(
            "{} exists and is not a unix socket",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Serve one connection until the client closes it or an error occurs.
///
/// A completed utterance does not end the connection; the next event starts
/// a new utterance on the same session.
pub async fn handle_connection<S>(
    stream: S,
    mut handler: EventHandler,
    stats: &ServerStats,
) -> AppResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    debug!("Client connected");

    while let Some(event) = read_event(&mut reader).await? {
        let outcome = handler.handle_event(event).await?;

        if let Some(reply) = &outcome.reply {
            write_event(&mut writer, reply).await?;
        }
        if !outcome.keep_open {
            stats.record_utterance();
        }
    }

    let session = handler.session();
    debug!(
        utterances = session.utterances,
        "Client disconnected after {}s",
        (chrono::Utc::now() - session.created_at).num_seconds()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFormat;
    use crate::protocol::event::{AUDIO_STOP_TYPE, DESCRIBE_TYPE, INFO_TYPE};
    use crate::protocol::{AudioChunk, Event, Info, Transcript};
    use crate::transcription::EngineOutput;

    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports how many samples it received.
    #[derive(Default)]
    struct SampleCounter {
        calls: AtomicUsize,
    }

    impl SpeechEngine for SampleCounter {
        fn transcribe(&self, samples: &[f32], model: &str) -> AppResult<EngineOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(EngineOutput {
                text: format!("{} samples", samples.len()),
                audio_duration: samples.len() as f64 / 16000.0,
                processing_time_ms: 0,
                model_name: model.to_string(),
            })
        }
    }

    fn handler_with(engine: Arc<SampleCounter>) -> EventHandler {
        let info = Info::for_model("tiny", "0.1.0").to_event().unwrap();
        let session = ConnectionSession::new(SessionConfig {
            model: Arc::from("tiny"),
            info: Arc::new(info),
        });
        EventHandler::new(session, engine)
    }

    fn handler() -> EventHandler {
        handler_with(Arc::new(SampleCounter::default()))
    }

    #[test]
    fn test_parse_listen_uri() {
        assert_eq!(
            "tcp://0.0.0.0:10300".parse::<ListenUri>().unwrap(),
            ListenUri::Tcp("0.0.0.0:10300".to_string())
        );
        assert_eq!(
            "tcp://[::1]:10300".parse::<ListenUri>().unwrap(),
            ListenUri::Tcp("[::1]:10300".to_string())
        );
        assert_eq!(
            "unix:///tmp/whisper.sock".parse::<ListenUri>().unwrap(),
            ListenUri::Unix(PathBuf::from("/tmp/whisper.sock"))
        );

        for bad in ["http://localhost:80", "tcp://localhost", "tcp://:10300", "unix://", "10300"] {
            assert!(
                matches!(bad.parse::<ListenUri>(), Err(AppError::Config(_))),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_listen_uri_display() {
        let uri: ListenUri = "tcp://127.0.0.1:10300".parse().unwrap();
        assert_eq!(uri.to_string(), "tcp://127.0.0.1:10300");
    }

    #[tokio::test]
    async fn test_two_utterances_on_one_connection() {
        let (mut client, server) = tokio::io::duplex(1 << 20);
        let stats = Arc::new(ServerStats::default());
        let server_stats = Arc::clone(&stats);
        let task = tokio::spawn(async move {
            handle_connection(server, handler(), &server_stats).await
        });

        let canonical = AudioFormat::CANONICAL;
        let events = vec![
            Event::new(DESCRIBE_TYPE),
            AudioChunk::new(canonical, vec![0u8; 3200]).into_event().unwrap(),
            Event::new(AUDIO_STOP_TYPE),
            AudioChunk::new(AudioFormat::new(8000, 2, 1), vec![0u8; 800])
                .into_event()
                .unwrap(),
            Event::new(AUDIO_STOP_TYPE),
        ];
        for event in &events {
            write_event(&mut client, event).await.unwrap();
        }

        let (reader, writer) = tokio::io::split(client);
        let mut reader = BufReader::new(reader);

        let info = read_event(&mut reader).await.unwrap().unwrap();
        assert!(info.is_type(INFO_TYPE));

        let first = read_event(&mut reader).await.unwrap().unwrap();
        assert_eq!(Transcript::from_event(&first).unwrap().text, "1600 samples");

        let second = read_event(&mut reader).await.unwrap().unwrap();
        assert_eq!(Transcript::from_event(&second).unwrap().text, "800 samples");

        drop(writer);
        drop(reader);
        task.await.unwrap().unwrap();
        assert_eq!(stats.snapshot().utterances, 2);
    }

    #[tokio::test]
    async fn test_bad_audio_closes_connection() {
        let (mut client, server) = tokio::io::duplex(1 << 16);
        let stats = ServerStats::default();

        let bad = AudioChunk::new(AudioFormat::new(16000, 7, 1), vec![0u8; 7])
            .into_event()
            .unwrap();
        write_event(&mut client, &bad).await.unwrap();

        let err = handle_connection(server, handler(), &stats).await.unwrap_err();
        assert!(matches!(err, AppError::Audio(_)));
    }

    #[tokio::test]
    async fn test_client_leaving_mid_utterance_discards_audio() {
        let (mut client, server) = tokio::io::duplex(1 << 16);
        let engine = Arc::new(SampleCounter::default());
        let stats = ServerStats::default();

        for _ in 0..3 {
            let chunk = AudioChunk::new(AudioFormat::CANONICAL, vec![0u8; 640])
                .into_event()
                .unwrap();
            write_event(&mut client, &chunk).await.unwrap();
        }
        drop(client);

        handle_connection(server, handler_with(Arc::clone(&engine)), &stats)
            .await
            .unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stats.snapshot().utterances, 0);
    }

    #[tokio::test]
    async fn test_client_leaving_mid_payload_is_disconnect() {
        use tokio::io::AsyncWriteExt;

        let (mut client, server) = tokio::io::duplex(1 << 16);
        let engine = Arc::new(SampleCounter::default());
        let stats = ServerStats::default();

        client
            .write_all(b"{\"type\":\"audio-chunk\",\"data\":{\"rate\":16000,\"width\":2,\"channels\":1},\"payload_length\":640}\n")
            .await
            .unwrap();
        client.write_all(&[0u8; 100]).await.unwrap();
        drop(client);

        let err = handle_connection(server, handler_with(Arc::clone(&engine)), &stats)
            .await
            .unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stats.snapshot().utterances, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_socket_handling() {
        let dir = std::env::temp_dir().join(format!("wyoming-whisper-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let missing = dir.join("missing.sock");
        assert!(remove_stale_socket(&missing).is_ok());

        let regular = dir.join("config.toml");
        std::fs::write(&regular, "keep me").unwrap();
        let err = remove_stale_socket(&regular).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(regular.exists());

        let socket = dir.join("whisper.sock");
        let listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();
        drop(listener);
        remove_stale_socket(&socket).unwrap();
        assert!(!socket.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
