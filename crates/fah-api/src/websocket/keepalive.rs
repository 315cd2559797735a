//! Keepalive monitor.
//!
//! One task per session. Any inbound frame counts as liveness proof: the
//! reader pushes a signal onto the activity queue for every frame it
//! reads, and each signal restarts the inactivity timer. When the timer
//! expires, a PING control frame is written with a hard deadline; a write
//! failure is session-fatal: the monitor reports it through the error hook
//! and the fatal channel, and the session reader ends the session. When
//! the session closes the activity queue, the monitor exits cleanly.

use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Bytes, Message};

use crate::error::Error;
use crate::websocket::ErrorHook;

/// Deadline for writing one PING frame.
const PING_WRITE_DEADLINE: Duration = Duration::from_secs(3);

/// Run the keepalive monitor until the activity queue closes or a ping
/// write fails. A write failure is sent through `fatal` so the session
/// reader stops blocking on a dead connection.
pub(crate) async fn run_keepalive<S>(
    sink: Arc<Mutex<SplitSink<WebSocketStream<S>, Message>>>,
    mut activity: mpsc::Receiver<()>,
    interval: Duration,
    on_error: Option<ErrorHook>,
    fatal: oneshot::Sender<Error>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            signal = activity.recv() => match signal {
                // Inbound traffic observed: restart the inactivity timer.
                Some(()) => {}
                None => {
                    tracing::debug!("activity queue closed, keepalive monitor exiting");
                    return;
                }
            },
            () = tokio::time::sleep(interval) => {
                let ping = async {
                    sink.lock().await.send(Message::Ping(Bytes::new())).await
                };
                let result = tokio::time::timeout(PING_WRITE_DEADLINE, ping).await;
                let err = match result {
                    Ok(Ok(())) => {
                        tracing::trace!(interval_secs = interval.as_secs(), "keepalive ping sent");
                        continue;
                    }
                    Ok(Err(e)) => Error::KeepaliveWrite(e.to_string()),
                    Err(_) => Error::KeepaliveWrite(format!(
                        "ping not written within {}s",
                        PING_WRITE_DEADLINE.as_secs()
                    )),
                };

                tracing::warn!(error = %err, "keepalive write failed, session ending");
                if let Some(hook) = &on_error {
                    hook(&err);
                }
                let _ = fatal.send(err);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;

    /// In-memory websocket pair: a client-role stream wired to a
    /// server-role stream over a duplex pipe. No handshake needed.
    async fn ws_pair() -> (
        WebSocketStream<tokio::io::DuplexStream>,
        WebSocketStream<tokio::io::DuplexStream>,
    ) {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (client, server)
    }

    #[tokio::test]
    async fn ping_sent_after_an_idle_interval() {
        let (client, mut server) = ws_pair().await;
        let (sink, _read) = client.split();
        let sink = Arc::new(Mutex::new(sink));
        let (_activity_tx, activity_rx) = mpsc::channel(4);
        let (fatal_tx, _fatal_rx) = oneshot::channel();

        let monitor = tokio::spawn(run_keepalive(
            sink,
            activity_rx,
            Duration::from_millis(20),
            None,
            fatal_tx,
        ));

        let frame = tokio::time::timeout(Duration::from_secs(2), server.next())
            .await
            .expect("ping within the interval")
            .expect("stream open")
            .expect("frame ok");
        assert!(matches!(frame, Message::Ping(_)), "expected ping, got {frame:?}");

        monitor.abort();
    }

    #[tokio::test]
    async fn activity_postpones_the_ping() {
        let (client, mut server) = ws_pair().await;
        let (sink, _read) = client.split();
        let sink = Arc::new(Mutex::new(sink));
        let (activity_tx, activity_rx) = mpsc::channel(4);
        let (fatal_tx, _fatal_rx) = oneshot::channel();

        let monitor = tokio::spawn(run_keepalive(
            sink,
            activity_rx,
            Duration::from_millis(80),
            None,
            fatal_tx,
        ));

        // Keep signalling activity faster than the interval: no ping may
        // arrive while the signals flow.
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            activity_tx.send(()).await.expect("monitor alive");
        }
        let early = tokio::time::timeout(Duration::from_millis(40), server.next()).await;
        assert!(early.is_err(), "ping arrived despite activity: {early:?}");

        // Once activity stops, a ping follows within a fresh interval.
        let frame = tokio::time::timeout(Duration::from_secs(2), server.next())
            .await
            .expect("ping after activity stopped")
            .expect("stream open")
            .expect("frame ok");
        assert!(matches!(frame, Message::Ping(_)));

        monitor.abort();
    }

    #[tokio::test]
    async fn closed_activity_queue_ends_the_monitor() {
        let (client, _server) = ws_pair().await;
        let (sink, _read) = client.split();
        let sink = Arc::new(Mutex::new(sink));
        let (activity_tx, activity_rx) = mpsc::channel::<()>(4);
        let (fatal_tx, _fatal_rx) = oneshot::channel();

        let monitor = tokio::spawn(run_keepalive(
            sink,
            activity_rx,
            Duration::from_secs(60),
            None,
            fatal_tx,
        ));

        drop(activity_tx);
        tokio::time::timeout(Duration::from_secs(1), monitor)
            .await
            .expect("monitor exits on queue close")
            .expect("no panic");
    }

    #[tokio::test]
    async fn write_failure_reports_and_ends_the_monitor() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (client, server) = ws_pair().await;
        // Dropping the peer makes the next write fail.
        drop(server);
        let (sink, _read) = client.split();
        let sink = Arc::new(Mutex::new(sink));
        let (_activity_tx, activity_rx) = mpsc::channel(4);
        let (fatal_tx, fatal_rx) = oneshot::channel();

        let errors = Arc::new(AtomicUsize::new(0));
        let hook: ErrorHook = {
            let errors = Arc::clone(&errors);
            Arc::new(move |e: &Error| {
                assert!(matches!(e, Error::KeepaliveWrite(_)), "unexpected {e}");
                errors.fetch_add(1, Ordering::SeqCst);
            })
        };

        let monitor = tokio::spawn(run_keepalive(
            sink,
            activity_rx,
            Duration::from_millis(10),
            Some(hook),
            fatal_tx,
        ));

        tokio::time::timeout(Duration::from_secs(2), monitor)
            .await
            .expect("monitor exits after write failure")
            .expect("no panic");
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // The fatal channel carries the same error to the session reader.
        let fatal = fatal_rx.await.expect("fatal error delivered");
        assert!(matches!(fatal, Error::KeepaliveWrite(_)), "got {fatal}");
    }
}
