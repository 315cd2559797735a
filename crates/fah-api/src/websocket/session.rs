//! One websocket session: dial, spawn the keepalive monitor and the
//! dispatcher, then read frames until failure or cancellation.
//!
//! The session owns the two queues that wire the reader to its consumers
//! (the activity-signal queue and the raw-payload queue). They are created
//! here right after a successful dial and closed exactly once -- activity
//! first, then payload -- when the read loop returns. The consumers only
//! drain them. Before returning, the session joins both spawned tasks, so
//! no task ever outlives the session that created it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::transport::GatewayConfig;
use crate::websocket::dispatch::{DatapointUpdate, run_dispatcher};
use crate::websocket::keepalive::run_keepalive;
use crate::websocket::{ErrorHook, MessageHandledHook};

const ACTIVITY_QUEUE_CAPACITY: usize = 16;
const PAYLOAD_QUEUE_CAPACITY: usize = 64;

/// Deadline for writing the close frame during teardown. A wedged sink
/// (the reason a keepalive write just failed) must not hang the session.
const CLOSE_DEADLINE: Duration = Duration::from_secs(3);

/// Establishes one websocket connection to the gateway.
///
/// The seam that lets supervisor tests substitute an in-memory transport
/// for the real network dial.
pub trait Dial: Send + Sync + 'static {
    /// Transport the websocket runs over.
    type Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Dial the gateway and complete the websocket upgrade.
    fn dial(
        &self,
        config: &GatewayConfig,
    ) -> impl Future<Output = Result<WebSocketStream<Self::Transport>, Error>> + Send;
}

/// Production dialer: TCP (+ optional TLS) to the gateway's
/// `/fhapi/v1/api/ws` endpoint with Basic-Auth at upgrade time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysApDialer;

impl Dial for SysApDialer {
    type Transport = MaybeTlsStream<tokio::net::TcpStream>;

    async fn dial(
        &self,
        config: &GatewayConfig,
    ) -> Result<WebSocketStream<Self::Transport>, Error> {
        let url = config.ws_url()?;
        tracing::debug!(url = %url, "dialing gateway websocket");

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Dial(e.to_string()))?;
        let auth: tokio_tungstenite::tungstenite::http::HeaderValue = config
            .basic_auth_header()
            .parse()
            .map_err(|_| Error::Dial("authorization header contains invalid bytes".into()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let connector = if config.tls && config.insecure {
            tracing::warn!(
                host = %config.host,
                "TLS certificate verification disabled for websocket -- not recommended"
            );
            Some(Connector::Rustls(Arc::new(no_verify_tls_config()?)))
        } else {
            None
        };

        let (stream, _response) = connect_async_tls_with_config(request, None, false, connector)
            .await
            .map_err(|e| Error::Dial(e.to_string()))?;

        tracing::info!(host = %config.host, "websocket connected");
        Ok(stream)
    }
}

/// Rustls client config that accepts any server certificate.
fn no_verify_tls_config() -> Result<rustls::ClientConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerification { provider }))
        .with_no_client_auth();
    Ok(config)
}

/// Accepts every certificate; signatures are still checked against the
/// presented (unverified) certificate.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl rustls::client::danger::ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Everything one session shares with its supervisor.
pub(crate) struct SessionContext {
    pub updates: broadcast::Sender<Arc<DatapointUpdate>>,
    pub on_error: Option<ErrorHook>,
    pub on_message_handled: Option<MessageHandledHook>,
}

/// Run one session against an already-dialed websocket.
///
/// Spawns the keepalive monitor and the dispatcher, then reads frames
/// synchronously until cancellation (returns `Ok`), a read failure, or a
/// keepalive write failure (both reported via the error hook, returned as
/// `Err`). Either way the queues are closed in order, the socket is
/// closed, and both spawned tasks are joined before this returns.
pub(crate) async fn run_session<S>(
    stream: WebSocketStream<S>,
    keepalive_interval: Duration,
    cancel: &CancellationToken,
    ctx: &SessionContext,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut read) = stream.split();
    let sink = Arc::new(AsyncMutex::new(sink));

    // The session queues exist only while this reader is active. Created
    // here, closed below by dropping the senders -- never by the tasks
    // that drain them.
    let (activity_tx, activity_rx) = mpsc::channel::<()>(ACTIVITY_QUEUE_CAPACITY);
    let (payload_tx, payload_rx) = mpsc::channel::<String>(PAYLOAD_QUEUE_CAPACITY);

    // A keepalive write failure is session-fatal. The monitor sends it
    // here so the reader stops blocking on a half-open connection that
    // will never produce another frame.
    let (fatal_tx, mut fatal_rx) = oneshot::channel::<Error>();

    let monitor = tokio::spawn(run_keepalive(
        Arc::clone(&sink),
        activity_rx,
        keepalive_interval,
        ctx.on_error.clone(),
        fatal_tx,
    ));
    let dispatcher = tokio::spawn(run_dispatcher(
        payload_rx,
        ctx.updates.clone(),
        ctx.on_error.clone(),
        ctx.on_message_handled.clone(),
    ));

    let result =
        read_loop(&mut read, &activity_tx, &payload_tx, &mut fatal_rx, cancel, ctx).await;

    // Close order is part of the contract: activity queue first, then the
    // payload queue, then the socket.
    drop(activity_tx);
    drop(payload_tx);
    let close = async { sink.lock().await.close().await };
    match tokio::time::timeout(CLOSE_DEADLINE, close).await {
        Ok(Ok(())) => tracing::debug!("websocket closed"),
        Ok(Err(e)) => tracing::debug!(error = %e, "websocket close failed"),
        Err(_) => tracing::debug!("websocket close timed out"),
    }

    if let Err(e) = monitor.await {
        tracing::debug!(error = %e, "keepalive monitor join failed");
    }
    if let Err(e) = dispatcher.await {
        tracing::debug!(error = %e, "dispatcher join failed");
    }

    result
}

/// Read frames until cancellation, a read failure, or a fatal keepalive
/// write failure.
async fn read_loop<S>(
    read: &mut futures_util::stream::SplitStream<WebSocketStream<S>>,
    activity_tx: &mpsc::Sender<()>,
    payload_tx: &mpsc::Sender<String>,
    fatal_rx: &mut oneshot::Receiver<Error>,
    cancel: &CancellationToken,
    ctx: &SessionContext,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            fatal = &mut *fatal_rx => {
                // The hook already fired inside the monitor.
                let err = fatal.unwrap_or_else(|_| {
                    Error::KeepaliveWrite("keepalive monitor stopped unexpectedly".into())
                });
                tracing::warn!(error = %err, "keepalive failed, session ending");
                return Err(err);
            }
            frame = read.next() => frame,
        };

        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                let err = Error::Read(e.to_string());
                tracing::warn!(error = %err, "websocket read failed, session ending");
                if let Some(hook) = &ctx.on_error {
                    hook(&err);
                }
                return Err(err);
            }
            None => {
                let err = Error::Read("stream ended without a close frame".into());
                tracing::warn!(error = %err, "websocket read failed, session ending");
                if let Some(hook) = &ctx.on_error {
                    hook(&err);
                }
                return Err(err);
            }
        };

        // Every successfully read frame counts as liveness proof. The
        // send races cancellation; a closed receiver means the monitor
        // already died, which the fatal channel surfaces above.
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            result = activity_tx.send(()) => {
                if result.is_err() {
                    tracing::debug!("keepalive monitor gone, activity signal dropped");
                }
            }
        }

        match message {
            Message::Text(text) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(()),
                    result = payload_tx.send(text.to_string()) => {
                        if result.is_err() {
                            tracing::debug!("dispatcher gone, payload dropped");
                        }
                    }
                }
            }
            Message::Binary(payload) => {
                tracing::warn!(len = payload.len(), "ignoring binary frame");
            }
            Message::Close(frame) => {
                // The subsequent read error ends the session.
                tracing::warn!(frame = ?frame, "close frame received");
            }
            // tungstenite answers pings automatically.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                tracing::trace!("control frame received");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;
    use crate::SYSAP_ID;

    async fn ws_pair() -> (
        WebSocketStream<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (client, server)
    }

    fn context() -> (SessionContext, broadcast::Receiver<Arc<DatapointUpdate>>) {
        let (updates, rx) = broadcast::channel(64);
        (
            SessionContext {
                updates,
                on_error: None,
                on_message_handled: None,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn text_frames_flow_to_subscribers() {
        let (client, mut server) = ws_pair().await;
        let (ctx, mut rx) = context();
        let cancel = CancellationToken::new();

        let session = tokio::spawn({
            let cancel = cancel.clone();
            async move { run_session(client, Duration::from_secs(60), &cancel, &ctx).await }
        });

        let payload = serde_json::json!({
            SYSAP_ID: { "datapoints": { "ABB700000001/ch0000/odp0000": "1" } }
        })
        .to_string();
        server.send(Message::text(payload)).await.expect("send");

        let update = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("update delivered")
            .expect("channel open");
        assert_eq!(update.device, "ABB700000001");
        assert_eq!(update.value, "1");

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session exits on cancel")
            .expect("no panic");
        assert!(result.is_ok(), "cancellation is graceful: {result:?}");
    }

    #[tokio::test]
    async fn peer_disconnect_ends_the_session_with_a_read_error() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (client, server) = ws_pair().await;
        let errors = Arc::new(AtomicUsize::new(0));
        let (updates, _rx) = broadcast::channel(8);
        let ctx = SessionContext {
            updates,
            on_error: Some({
                let errors = Arc::clone(&errors);
                Arc::new(move |_e: &Error| {
                    errors.fetch_add(1, Ordering::SeqCst);
                })
            }),
            on_message_handled: None,
        };
        let cancel = CancellationToken::new();

        let session = tokio::spawn({
            let cancel = cancel.clone();
            async move { run_session(client, Duration::from_secs(60), &cancel, &ctx).await }
        });

        drop(server);

        let result = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session exits on peer loss")
            .expect("no panic");
        assert!(matches!(result, Err(Error::Read(_))), "got {result:?}");
        assert_eq!(errors.load(Ordering::SeqCst), 1, "read failure reported once");
    }

    #[tokio::test]
    async fn binary_frames_are_dropped_without_ending_the_session() {
        let (client, mut server) = ws_pair().await;
        let (ctx, mut rx) = context();
        let cancel = CancellationToken::new();

        let session = tokio::spawn({
            let cancel = cancel.clone();
            async move { run_session(client, Duration::from_secs(60), &cancel, &ctx).await }
        });

        server
            .send(Message::Binary(vec![1, 2, 3].into()))
            .await
            .expect("send");
        let payload = serde_json::json!({
            SYSAP_ID: { "datapoints": { "ABCDEF/ch0000/odp0000": "7" } }
        })
        .to_string();
        server.send(Message::text(payload)).await.expect("send");

        let update = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("text frame after binary still dispatched")
            .expect("channel open");
        assert_eq!(update.value, "7");

        cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(2), session).await;
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_write_failure_ends_the_session() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        // A one-byte pipe the peer never reads: the half-open case. The
        // reader stays blocked with no inbound frames while the ping
        // write cannot complete within its deadline.
        let (client_io, server_io) = tokio::io::duplex(1);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let _server_io = server_io;

        let errors = Arc::new(AtomicUsize::new(0));
        let (updates, _rx) = broadcast::channel(8);
        let ctx = SessionContext {
            updates,
            on_error: Some({
                let errors = Arc::clone(&errors);
                Arc::new(move |e: &Error| {
                    assert!(matches!(e, Error::KeepaliveWrite(_)), "unexpected {e}");
                    errors.fetch_add(1, Ordering::SeqCst);
                })
            }),
            on_message_handled: None,
        };
        let cancel = CancellationToken::new();

        let session = tokio::spawn({
            let cancel = cancel.clone();
            async move { run_session(client, Duration::from_secs(5), &cancel, &ctx).await }
        });

        let result = tokio::time::timeout(Duration::from_secs(60), session)
            .await
            .expect("session ends after the keepalive write failure")
            .expect("no panic");
        assert!(matches!(result, Err(Error::KeepaliveWrite(_))), "got {result:?}");
        assert_eq!(errors.load(Ordering::SeqCst), 1, "failure reported once");
    }

    #[tokio::test]
    async fn close_frame_ends_the_session_through_the_read_path() {
        let (client, mut server) = ws_pair().await;
        let (ctx, _rx) = context();
        let cancel = CancellationToken::new();

        let session = tokio::spawn({
            let cancel = cancel.clone();
            async move { run_session(client, Duration::from_secs(60), &cancel, &ctx).await }
        });

        server.close(None).await.expect("close handshake");

        let result = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session ends after the close handshake")
            .expect("no panic");
        assert!(matches!(result, Err(Error::Read(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn session_joins_its_tasks_before_returning() {
        let (client, _server) = ws_pair().await;
        let (updates, _rx) = broadcast::channel(8);

        // The hook counter lets us observe the dispatcher's exit: after
        // run_session returns, no further hook calls can happen because
        // both tasks have been joined.
        use std::sync::atomic::{AtomicUsize, Ordering};
        let handled = Arc::new(AtomicUsize::new(0));
        let ctx = SessionContext {
            updates,
            on_error: None,
            on_message_handled: Some({
                let handled = Arc::clone(&handled);
                Arc::new(move || {
                    handled.fetch_add(1, Ordering::SeqCst);
                })
            }),
        };

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run_session(client, Duration::from_secs(60), &cancel, &ctx).await;
        assert!(result.is_ok());

        let after_return = handled.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            handled.load(Ordering::SeqCst),
            after_return,
            "no task activity after the session returned"
        );
    }
}
