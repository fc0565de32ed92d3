// Stream reconciler - owns the live session against a sensor source
//
// The reconciler manages:
// - Source lifecycle (connect, run, stop) with exactly one active session
// - Decoding raw payloads into validated readings
// - The bounded history buffer and the latest reading
// - Connection state transitions and event emission
// - Task cancellation via CancellationToken for deterministic teardown
//
// Inbound events are handled one at a time to completion; the presentation
// layer only reads snapshots and never mutates reconciler state.

use crate::config::MonitorConfig;
use crate::history::HistoryBuffer;
use crate::reading::{RawSensorMessage, SensorReading};
use crate::source::{create_source, SensorSource};
use crate::types::{ConnectionState, MonitorError, MonitorEvent, MonitorResult, MonitorStats};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::RwLock as TokioRwLock;
use tokio_util::sync::CancellationToken;

type EventCallback = Box<dyn Fn(MonitorEvent) + Send + Sync>;

/// Mutable session state, guarded as a unit so every transition is atomic
/// with respect to readers.
struct SessionState {
    connection: ConnectionState,
    latest: SensorReading,
    history: HistoryBuffer,
    last_error: Option<String>,
}

/// State shared between the reconciler and its background tasks
struct Inner {
    session_id: String,
    container_height_cm: f64,
    state: RwLock<SessionState>,
    readings_received: AtomicU64,
    decode_failures: AtomicU64,
    started_at: RwLock<Option<Instant>>,
    event_callback: RwLock<Option<EventCallback>>,
}

impl Inner {
    fn emit(&self, event: MonitorEvent) {
        if let Some(callback) = self.event_callback.read().as_ref() {
            callback(event);
        }
    }

    /// Decode one raw payload and fold it into the session state.
    ///
    /// Malformed payloads are dropped without touching any state.
    fn ingest(&self, raw: &str) -> MonitorResult<()> {
        let msg: RawSensorMessage = match serde_json::from_str(raw) {
            Ok(msg) => msg,
            Err(e) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Discarding malformed sensor payload: {}", e);
                self.emit(MonitorEvent::DecodeError {
                    session_id: self.session_id.clone(),
                    message: e.to_string(),
                });
                return Err(MonitorError::Parse(e.to_string()));
            }
        };

        let reading = SensorReading::from_raw(
            &msg,
            self.container_height_cm,
            chrono::Utc::now().timestamp_millis(),
        );

        {
            let mut state = self.state.write();
            state.latest = reading.clone();
            state.history.push(reading.clone());
        }
        self.readings_received.fetch_add(1, Ordering::Relaxed);

        self.emit(MonitorEvent::ReadingReceived {
            session_id: self.session_id.clone(),
            reading,
        });

        Ok(())
    }

    fn set_connected(&self) {
        {
            let mut state = self.state.write();
            state.connection = ConnectionState::Connected;
            state.last_error = None;
        }
        self.emit(MonitorEvent::ConnectionChanged {
            session_id: self.session_id.clone(),
            state: ConnectionState::Connected,
            reason: None,
        });
    }

    /// Transition to Disconnected. The history buffer is left intact so the
    /// dashboard keeps showing last-known values instead of blanking.
    fn set_disconnected(&self, reason: Option<String>) {
        {
            let mut state = self.state.write();
            if state.connection == ConnectionState::Disconnected {
                return;
            }
            state.connection = ConnectionState::Disconnected;
            if reason.is_some() {
                state.last_error = reason.clone();
            }
        }
        self.emit(MonitorEvent::ConnectionChanged {
            session_id: self.session_id.clone(),
            state: ConnectionState::Disconnected,
            reason,
        });
    }

    /// Reset per-session state at the start of a new session
    fn begin_session(&self) {
        {
            let mut state = self.state.write();
            state.history.clear();
            state.latest = SensorReading::zero();
            state.last_error = None;
        }
        self.readings_received.store(0, Ordering::Relaxed);
        self.decode_failures.store(0, Ordering::Relaxed);
        *self.started_at.write() = Some(Instant::now());
    }
}

/// The live sensor stream reconciler
pub struct Reconciler {
    config: MonitorConfig,
    inner: Arc<Inner>,
    source: Arc<TokioRwLock<Box<dyn SensorSource>>>,
    cancel_token: CancellationToken,
    is_running: Arc<AtomicBool>,
}

impl Reconciler {
    pub fn new(config: MonitorConfig) -> MonitorResult<Self> {
        config.validate()?;

        let source = create_source(&config.source, config.container_height_cm);

        let inner = Arc::new(Inner {
            session_id: config.session_id.clone(),
            container_height_cm: config.container_height_cm,
            state: RwLock::new(SessionState {
                connection: ConnectionState::Disconnected,
                latest: SensorReading::zero(),
                history: HistoryBuffer::new(config.history_capacity),
                last_error: None,
            }),
            readings_received: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            started_at: RwLock::new(None),
            event_callback: RwLock::new(None),
        });

        Ok(Self {
            config,
            inner,
            source: Arc::new(TokioRwLock::new(source)),
            cancel_token: CancellationToken::new(),
            is_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register a callback for session events
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(MonitorEvent) + Send + Sync + 'static,
    {
        *self.inner.event_callback.write() = Some(Box::new(callback));
    }

    /// Start a new session: reset the history, connect the source, and
    /// spawn the streaming tasks. Completion of connection establishment is
    /// awaited here, so a successful return means `Connected`.
    pub async fn start(&mut self) -> MonitorResult<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Err(MonitorError::AlreadyRunning);
        }

        self.cancel_token = CancellationToken::new();
        self.inner.begin_session();

        {
            let mut source = self.source.write().await;
            log::info!("Starting session {} on {}", self.config.session_id, source.describe());
            source.connect().await?;
        }

        self.inner.set_connected();

        let (tx, mut rx) = mpsc::channel::<String>(self.config.channel_capacity);

        // Mark running before spawning: the source task stores false when
        // its run ends, which can happen before start() returns if the
        // remote closes immediately after the handshake.
        self.is_running.store(true, Ordering::Relaxed);

        // Source task: runs the connection until it ends, then records the
        // disconnect. Cancellation drops the run future mid-await.
        let source = Arc::clone(&self.source);
        let inner = Arc::clone(&self.inner);
        let running = Arc::clone(&self.is_running);
        let cancel_source = self.cancel_token.clone();

        tokio::spawn(async move {
            let mut source = source.write().await;
            tokio::select! {
                result = source.run(tx) => {
                    match result {
                        Ok(()) => {
                            log::info!("Sensor source ended");
                            inner.set_disconnected(None);
                        }
                        Err(e) => {
                            log::error!("Sensor source failed: {}", e);
                            inner.set_disconnected(Some(e.to_string()));
                        }
                    }
                    running.store(false, Ordering::Relaxed);
                }
                _ = cancel_source.cancelled() => {
                    log::debug!("Source task cancelled");
                }
            }
        });

        // Ingest task: folds raw payloads into session state, one payload
        // fully handled before the next.
        let inner = Arc::clone(&self.inner);
        let cancel_ingest = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel_ingest.cancelled() => {
                        log::debug!("Ingest task cancelled");
                        break;
                    }

                    payload = rx.recv() => {
                        match payload {
                            // A malformed payload was already logged and
                            // counted; the session continues.
                            Some(raw) => { let _ = inner.ingest(&raw); }
                            None => {
                                log::debug!("Payload channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Tear down the active session. Calling stop with no session running
    /// is a no-op.
    pub async fn stop(&mut self) -> MonitorResult<()> {
        if !self.is_running.swap(false, Ordering::Relaxed) {
            return Ok(());
        }

        log::info!("Stopping session {}", self.config.session_id);

        // Cancel first so the source task releases its lock on the source
        self.cancel_token.cancel();

        {
            let mut source = self.source.write().await;
            source.stop().await?;
        }

        self.inner.set_disconnected(None);

        Ok(())
    }

    /// Manual reconnect: tear down whatever is left and begin a new session
    pub async fn restart(&mut self) -> MonitorResult<()> {
        self.stop().await?;
        self.start().await
    }

    /// Feed one raw payload through the decode path
    pub fn handle_message(&self, raw: &str) -> MonitorResult<()> {
        self.inner.ingest(raw)
    }

    /// Most recent reading, or the zero-value reading if none has arrived
    pub fn latest(&self) -> SensorReading {
        self.inner.state.read().latest.clone()
    }

    /// Ordered owned copy of the history buffer, oldest first
    pub fn history_snapshot(&self) -> Vec<SensorReading> {
        self.inner.state.read().history.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.read().connection
    }

    /// Message of the most recent transport failure, if any
    pub fn last_error(&self) -> Option<String> {
        self.inner.state.read().last_error.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn stats(&self) -> MonitorStats {
        let state = self.inner.state.read();
        MonitorStats {
            readings_received: self.inner.readings_received.load(Ordering::Relaxed),
            decode_failures: self.inner.decode_failures.load(Ordering::Relaxed),
            history_len: state.history.len(),
            history_capacity: state.history.capacity(),
            connected: state.connection == ConnectionState::Connected,
            uptime_seconds: self
                .inner
                .started_at
                .read()
                .as_ref()
                .map(|t| t.elapsed().as_secs_f64()),
            last_error: state.last_error.clone(),
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        // Cancel outstanding tasks so a dropped reconciler never leaks a
        // live connection
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceConfig;
    use futures_util::SinkExt;
    use parking_lot::Mutex;
    use tokio_tungstenite::tungstenite::Message;

    fn test_config(history_capacity: usize) -> MonitorConfig {
        MonitorConfig {
            source: SourceConfig::Synthetic { interval_ms: 1 },
            history_capacity,
            ..Default::default()
        }
    }

    fn payload(temperature: f64, distance: f64) -> String {
        format!(
            r#"{{"temperature": {}, "distance": {}}}"#,
            temperature, distance
        )
    }

    #[test]
    fn test_valid_message_updates_latest_and_history() {
        let reconciler = Reconciler::new(test_config(20)).unwrap();

        reconciler.handle_message(&payload(33.0, 10.0)).unwrap();

        let latest = reconciler.latest();
        assert_eq!(latest.temperature, 33.0);
        assert_eq!(latest.milk_level, 75.0);
        assert!(latest.timestamp_ms > 0);
        assert_eq!(reconciler.history_snapshot().len(), 1);
    }

    #[test]
    fn test_malformed_message_leaves_state_unchanged() {
        let reconciler = Reconciler::new(test_config(20)).unwrap();
        reconciler.handle_message(&payload(33.0, 10.0)).unwrap();

        let latest_before = reconciler.latest();
        let history_before = reconciler.history_snapshot();

        for raw in ["not json", r#"{"temperature": 33.0}"#, r#"{"distance": 1}"#, ""] {
            assert!(reconciler.handle_message(raw).is_err());
        }

        assert_eq!(reconciler.latest().timestamp_ms, latest_before.timestamp_ms);
        assert_eq!(reconciler.history_snapshot().len(), history_before.len());
        assert_eq!(reconciler.stats().decode_failures, 4);
        assert_eq!(reconciler.stats().readings_received, 1);
    }

    #[test]
    fn test_history_bounded_fifo_through_ingest() {
        let reconciler = Reconciler::new(test_config(3)).unwrap();

        for n in 0..10 {
            reconciler.handle_message(&payload(n as f64, 10.0)).unwrap();
            assert!(reconciler.history_snapshot().len() <= 3);
        }

        let temps: Vec<f64> = reconciler
            .history_snapshot()
            .iter()
            .map(|r| r.temperature)
            .collect();
        assert_eq!(temps, vec![7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_zero_reading_before_first_message() {
        let reconciler = Reconciler::new(test_config(20)).unwrap();
        let latest = reconciler.latest();
        assert_eq!(latest.timestamp_ms, 0);
        assert_eq!(latest.temperature, 0.0);
        assert_eq!(reconciler.connection_state(), ConnectionState::Disconnected);
        assert!(reconciler.history_snapshot().is_empty());
    }

    #[test]
    fn test_events_emitted() {
        let reconciler = Reconciler::new(test_config(20)).unwrap();
        let events: Arc<Mutex<Vec<MonitorEvent>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&events);
        reconciler.set_event_callback(move |event| sink.lock().push(event));

        reconciler.handle_message(&payload(33.0, 10.0)).unwrap();
        let _ = reconciler.handle_message("garbage");

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], MonitorEvent::ReadingReceived { .. }));
        assert!(matches!(events[1], MonitorEvent::DecodeError { .. }));
    }

    #[tokio::test]
    async fn test_session_lifecycle_with_synthetic_source() {
        let mut reconciler = Reconciler::new(test_config(20)).unwrap();

        reconciler.start().await.unwrap();
        assert_eq!(reconciler.connection_state(), ConnectionState::Connected);
        assert!(reconciler.is_running());

        // Starting again while running is an error
        assert!(matches!(
            reconciler.start().await,
            Err(MonitorError::AlreadyRunning)
        ));

        // Wait until some readings flow
        for _ in 0..100 {
            if reconciler.stats().readings_received >= 5 {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
        }
        assert!(reconciler.stats().readings_received >= 5);

        reconciler.stop().await.unwrap();
        assert_eq!(reconciler.connection_state(), ConnectionState::Disconnected);

        // History survives the disconnect and stays frozen
        let snapshot = reconciler.history_snapshot();
        assert!(!snapshot.is_empty());
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert_eq!(reconciler.history_snapshot().len(), snapshot.len());

        // stop is idempotent
        reconciler.stop().await.unwrap();
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_remote_close_keeps_history_and_allows_new_session() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Device that serves a short burst of readings per connection and
        // then closes from its side
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                for n in 0..3 {
                    let frame = payload(30.0 + n as f64, 10.0);
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                let _ = ws.close(None).await;
            }
        });

        let config = MonitorConfig {
            source: SourceConfig::WebSocket {
                url: format!("ws://{}", addr),
            },
            ..Default::default()
        };
        let mut reconciler = Reconciler::new(config).unwrap();
        reconciler.start().await.unwrap();

        wait_until(|| {
            reconciler.history_snapshot().len() == 3
                && reconciler.connection_state() == ConnectionState::Disconnected
        })
        .await;

        // The device-side close leaves last-known history intact
        assert_eq!(reconciler.connection_state(), ConnectionState::Disconnected);
        let snapshot = reconciler.history_snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].temperature, 30.0);
        assert_eq!(snapshot[2].temperature, 32.0);
        assert!(reconciler.last_error().is_none());

        // A session ended by the remote is no longer running, so a new
        // start must not be rejected as AlreadyRunning
        wait_until(|| !reconciler.is_running()).await;
        assert!(!reconciler.is_running());

        reconciler.start().await.unwrap();
        assert_eq!(reconciler.connection_state(), ConnectionState::Connected);

        reconciler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_failure_records_last_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Device that sends one reading and then drops the socket without a
        // close handshake
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.send(Message::Text(payload(31.0, 10.0).into())).await;
        });

        let config = MonitorConfig {
            source: SourceConfig::WebSocket {
                url: format!("ws://{}", addr),
            },
            ..Default::default()
        };
        let mut reconciler = Reconciler::new(config).unwrap();
        reconciler.start().await.unwrap();

        wait_until(|| {
            reconciler.history_snapshot().len() == 1
                && reconciler.connection_state() == ConnectionState::Disconnected
        })
        .await;

        assert_eq!(reconciler.connection_state(), ConnectionState::Disconnected);
        assert_eq!(reconciler.history_snapshot().len(), 1);
        assert!(reconciler.last_error().is_some());
    }

    #[tokio::test]
    async fn test_restart_resets_history_and_reconnects() {
        let mut reconciler = Reconciler::new(test_config(20)).unwrap();
        reconciler.start().await.unwrap();

        // Tag the first session with a marker reading the synthetic walk
        // cannot produce
        reconciler.handle_message(&payload(99.9, 5.0)).unwrap();
        assert!(reconciler
            .history_snapshot()
            .iter()
            .any(|r| r.temperature == 99.9));

        reconciler.restart().await.unwrap();

        assert_eq!(reconciler.connection_state(), ConnectionState::Connected);
        assert!(reconciler.is_running());
        assert!(reconciler
            .history_snapshot()
            .iter()
            .all(|r| r.temperature != 99.9));

        // Fresh readings flow in the new session
        wait_until(|| reconciler.stats().readings_received >= 1).await;
        assert!(reconciler.stats().readings_received >= 1);

        reconciler.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_resets_previous_session() {
        let config = MonitorConfig {
            source: SourceConfig::Synthetic { interval_ms: 60_000 },
            ..Default::default()
        };
        let mut reconciler = Reconciler::new(config).unwrap();

        // Populate history out of band with a marker value
        reconciler.handle_message(&payload(99.9, 5.0)).unwrap();
        assert_eq!(reconciler.history_snapshot().len(), 1);

        reconciler.start().await.unwrap();

        // The old session's readings are gone
        assert!(reconciler
            .history_snapshot()
            .iter()
            .all(|r| r.temperature != 99.9));

        reconciler.stop().await.unwrap();
    }
}
