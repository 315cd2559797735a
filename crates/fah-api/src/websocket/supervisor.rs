//! Connection supervisor: the outer retry loop.
//!
//! Owns the reconnection state and runs session attempts until one of the
//! two terminal conditions: the caller cancels (graceful, returned as
//! [`Error::Cancelled`]) or the reconnection budget is exhausted
//! (returned as [`Error::ReconnectLimit`]). At most one session is active
//! per supervisor at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::transport::GatewayConfig;
use crate::websocket::backoff::backoff_delay;
use crate::websocket::dispatch::DatapointUpdate;
use crate::websocket::session::{Dial, SessionContext, SysApDialer, run_session};
use crate::websocket::{ErrorHook, MessageHandledHook};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Reconnection counters and policy, guarded by one mutex for its entire
/// lifetime. Written by the supervisor on dial outcomes; read and written
/// concurrently by the owning application through the accessors on
/// [`EventStream`].
#[derive(Debug)]
struct ReconnectionState {
    /// Consecutive failed dials. Reset to 0 at supervisor start and
    /// immediately after every successful dial.
    attempts: u32,
    /// Dial budget before the supervisor gives up.
    max_attempts: u32,
    /// Whether failed dials back off exponentially before the retry.
    backoff_enabled: bool,
}

impl Default for ReconnectionState {
    fn default() -> Self {
        Self {
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_enabled: true,
        }
    }
}

/// The persistent event-stream session manager.
///
/// [`run`](Self::run) dials the gateway websocket, authenticates,
/// maintains liveness via keepalive pings, reconnects with bounded
/// exponential backoff on failure, and dispatches inbound frames into
/// [`DatapointUpdate`]s. Subscribe before (or while) running; the
/// accessors may be called concurrently with a running loop.
pub struct EventStream<D: Dial = SysApDialer> {
    config: GatewayConfig,
    dialer: D,
    state: Arc<Mutex<ReconnectionState>>,
    updates: broadcast::Sender<Arc<DatapointUpdate>>,
    on_error: Option<ErrorHook>,
    on_message_handled: Option<MessageHandledHook>,
}

impl EventStream<SysApDialer> {
    /// Create an event stream for the given gateway.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_dialer(config, SysApDialer)
    }
}

impl<D: Dial> EventStream<D> {
    pub(crate) fn with_dialer(config: GatewayConfig, dialer: D) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            config,
            dialer,
            state: Arc::new(Mutex::new(ReconnectionState::default())),
            updates,
            on_error: None,
            on_message_handled: None,
        }
    }

    /// Register a hook fired synchronously for every session-fatal or
    /// retryable failure (dial, read, keepalive write, payload decode).
    /// Must return quickly; it runs on the hot path.
    pub fn on_error(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Register a hook fired once per fully processed inbound payload.
    /// Intended for synchronization by callers and tests.
    pub fn on_message_handled(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_message_handled = Some(Arc::new(hook));
        self
    }

    /// Subscribe to datapoint updates.
    ///
    /// Multiple consumers can subscribe concurrently; a consumer that
    /// falls behind observes a lag error instead of blocking the stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DatapointUpdate>> {
        self.updates.subscribe()
    }

    // ── Reconnection state accessors ─────────────────────────────────

    /// Consecutive failed dial attempts of the current failure streak.
    pub fn attempts(&self) -> u32 {
        self.state().attempts
    }

    /// The dial budget before [`run`](Self::run) returns
    /// [`Error::ReconnectLimit`].
    pub fn max_reconnection_attempts(&self) -> u32 {
        self.state().max_attempts
    }

    /// Change the dial budget. Takes effect at the next loop iteration,
    /// even while the stream is running.
    pub fn set_max_reconnection_attempts(&self, max: u32) {
        self.state().max_attempts = max;
    }

    /// Whether failed dials back off exponentially.
    pub fn exponential_backoff_enabled(&self) -> bool {
        self.state().backoff_enabled
    }

    /// Enable or disable exponential backoff between failed dials.
    pub fn set_exponential_backoff_enabled(&self, enabled: bool) {
        self.state().backoff_enabled = enabled;
    }

    fn state(&self) -> MutexGuard<'_, ReconnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── The supervisor loop ──────────────────────────────────────────

    /// Run the event stream until a terminal condition.
    ///
    /// Returns [`Error::Cancelled`] when `cancel` fires (graceful
    /// shutdown, not an operational failure) or
    /// [`Error::ReconnectLimit`] once the dial budget is exhausted.
    /// Cancellation is observed at each loop iteration and at the
    /// reader's queue-send points; it does not interrupt an in-flight
    /// blocking read.
    pub async fn run(
        &self,
        keepalive_interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        self.state().attempts = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::info!("event stream cancelled, shutting down");
                return Err(Error::Cancelled);
            }

            let (attempts, max) = {
                let state = self.state();
                (state.attempts, state.max_attempts)
            };
            if attempts >= max {
                tracing::error!(attempts, max, "maximum reconnection attempts exceeded");
                return Err(Error::ReconnectLimit { attempts, max });
            }

            self.attempt_session(keepalive_interval, &cancel).await;
        }
    }

    /// One dial attempt and, on success, one full session.
    async fn attempt_session(&self, keepalive_interval: Duration, cancel: &CancellationToken) {
        match self.dialer.dial(&self.config).await {
            Ok(stream) => {
                self.state().attempts = 0;
                let ctx = SessionContext {
                    updates: self.updates.clone(),
                    on_error: self.on_error.clone(),
                    on_message_handled: self.on_message_handled.clone(),
                };
                // Session failures end the session but do not touch the
                // attempt counter; only failed dials consume the budget.
                if let Err(e) = run_session(stream, keepalive_interval, cancel, &ctx).await {
                    tracing::debug!(error = %e, "session ended, supervisor will re-dial");
                }
            }
            Err(e) => {
                let (attempts, max, delay) = {
                    let mut state = self.state();
                    state.attempts += 1;
                    let delay = (state.backoff_enabled && state.attempts < state.max_attempts)
                        .then(|| backoff_delay(state.attempts - 1));
                    (state.attempts, state.max_attempts, delay)
                };
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    max,
                    backoff = ?delay,
                    "websocket dial failed"
                );
                if let Some(hook) = &self.on_error {
                    hook(&e);
                }

                if let Some(delay) = delay {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use secrecy::SecretString;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;

    fn config() -> GatewayConfig {
        GatewayConfig::new("192.168.2.1", "installer", SecretString::from("secret"))
    }

    /// Dialer scripted by the test: the first `fail_first` calls return a
    /// dial error, later calls hand out an in-memory websocket whose
    /// server half is kept alive for the test's duration. Every call
    /// consumes a gate permit, letting tests freeze the supervisor
    /// between attempts.
    struct ScriptedDialer {
        fail_first: u32,
        calls: Arc<AtomicU32>,
        gate: Arc<tokio::sync::Semaphore>,
        server_halves: Arc<Mutex<Vec<WebSocketStream<tokio::io::DuplexStream>>>>,
    }

    impl ScriptedDialer {
        fn new(fail_first: u32, permits: usize) -> Self {
            Self {
                fail_first,
                calls: Arc::new(AtomicU32::new(0)),
                gate: Arc::new(tokio::sync::Semaphore::new(permits)),
                server_halves: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Dial for ScriptedDialer {
        type Transport = tokio::io::DuplexStream;

        async fn dial(
            &self,
            _config: &GatewayConfig,
        ) -> Result<WebSocketStream<Self::Transport>, Error> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| Error::Dial("gate closed".into()))?;
            permit.forget();

            if call <= self.fail_first {
                return Err(Error::Dial("connection refused".into()));
            }

            let (client_io, server_io) = tokio::io::duplex(1024);
            let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
            self.server_halves
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(server);
            Ok(WebSocketStream::from_raw_socket(client_io, Role::Client, None).await)
        }
    }

    async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_is_terminal() {
        let dialer = ScriptedDialer::new(u32::MAX, 100);
        let calls = Arc::clone(&dialer.calls);
        let stream = EventStream::with_dialer(config(), dialer);
        stream.set_max_reconnection_attempts(2);

        let result = stream
            .run(Duration::from_secs(30), CancellationToken::new())
            .await;

        match result {
            Err(Error::ReconnectLimit { attempts, max }) => {
                assert_eq!(attempts, 2);
                assert_eq!(max, 2);
            }
            other => panic!("expected ReconnectLimit, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2, "exactly two dials");
        assert_eq!(stream.attempts(), 2);
    }

    #[tokio::test]
    async fn attempts_reset_after_a_successful_dial() {
        // One permit: the first (failing) dial runs, the second blocks
        // until the test releases it.
        let dialer = ScriptedDialer::new(1, 1);
        let calls = Arc::clone(&dialer.calls);
        let gate = Arc::clone(&dialer.gate);
        let stream = Arc::new(EventStream::with_dialer(config(), dialer));
        stream.set_exponential_backoff_enabled(false);

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let stream = Arc::clone(&stream);
            let cancel = cancel.clone();
            async move { stream.run(Duration::from_secs(30), cancel).await }
        });

        // Second dial entered but gated: the failure has been accounted.
        wait_until("second dial attempt", || calls.load(Ordering::SeqCst) == 2).await;
        assert_eq!(stream.attempts(), 1, "one failed dial recorded");

        // Let the successful dial proceed; the counter resets.
        gate.add_permits(1);
        wait_until("attempt counter reset", || stream.attempts() == 0).await;

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("run returns after cancel")
            .expect("no panic");
        assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
    }

    #[tokio::test]
    async fn pre_cancelled_token_means_zero_dials() {
        let dialer = ScriptedDialer::new(0, 100);
        let calls = Arc::clone(&dialer.calls);
        let stream = EventStream::with_dialer(config(), dialer);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = stream.run(Duration::from_secs(30), cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)), "got {result:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no dial attempted");
    }

    #[tokio::test(start_paused = true)]
    async fn dial_failures_are_reported_through_the_hook() {
        let dialer = ScriptedDialer::new(u32::MAX, 100);
        let errors = Arc::new(AtomicU32::new(0));
        let stream = EventStream::with_dialer(config(), dialer).on_error({
            let errors = Arc::clone(&errors);
            move |e: &Error| {
                assert!(matches!(e, Error::Dial(_)), "unexpected {e}");
                errors.fetch_add(1, Ordering::SeqCst);
            }
        });
        stream.set_max_reconnection_attempts(3);

        let result = stream
            .run(Duration::from_secs(30), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::ReconnectLimit { .. })));
        assert_eq!(errors.load(Ordering::SeqCst), 3, "one report per failed dial");
    }

    #[tokio::test]
    async fn accessors_are_live() {
        let stream = EventStream::with_dialer(config(), ScriptedDialer::new(0, 0));

        assert_eq!(stream.max_reconnection_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert!(stream.exponential_backoff_enabled());

        stream.set_max_reconnection_attempts(4);
        stream.set_exponential_backoff_enabled(false);

        assert_eq!(stream.max_reconnection_attempts(), 4);
        assert!(!stream.exponential_backoff_enabled());
        assert_eq!(stream.attempts(), 0);
    }
}
