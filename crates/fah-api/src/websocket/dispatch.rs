//! Inbound payload dispatch.
//!
//! Drains the raw-payload queue of one session, decodes each text frame
//! into an [`InboundEnvelope`], and emits a [`DatapointUpdate`] for every
//! well-formed `serial/channel/datapoint` key. Decode failures and
//! malformed keys are message-local: logged (and reported via the error
//! hook for whole-payload failures), then skipped -- the session keeps
//! running.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::SYSAP_ID;
use crate::error::Error;
use crate::websocket::{ErrorHook, MessageHandledHook};

/// One decoded datapoint change from the event stream.
///
/// Ephemeral: emitted to subscribers and the log, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatapointUpdate {
    /// Device serial, e.g. `ABB700000001`.
    pub device: String,
    /// Channel identifier, e.g. `ch0000`.
    pub channel: String,
    /// Datapoint identifier, e.g. `odp0000`.
    pub datapoint: String,
    /// New value, verbatim from the gateway.
    pub value: String,
}

/// Per-sysap payload of one inbound websocket message.
///
/// Only `datapoints` drives dispatch; the remaining fields must decode
/// without error but are otherwise ignored here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SysApUpdate {
    #[serde(default)]
    pub datapoints: BTreeMap<String, String>,

    #[serde(default)]
    pub devices: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub devices_added: Vec<String>,

    #[serde(default)]
    pub devices_removed: Vec<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

/// A full inbound message: sysap identifier to its update payload.
pub type InboundEnvelope = std::collections::HashMap<String, SysApUpdate>;

/// Split a composite `serial/channel/datapoint` key into its three
/// segments. Returns `None` for any other shape.
pub(crate) fn parse_datapoint_key(key: &str) -> Option<(&str, &str, &str)> {
    let mut parts = key.split('/');
    let device = parts.next().filter(|s| !s.is_empty())?;
    let channel = parts.next().filter(|s| !s.is_empty())?;
    let datapoint = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some((device, channel, datapoint))
}

/// Dispatcher task: drain the payload queue until the session closes it.
///
/// Exits cleanly when the queue closes. The `on_message_handled` hook, if
/// configured, fires once per payload after it has been handled -- a
/// synchronization point for callers, not part of dispatch logic.
pub(crate) async fn run_dispatcher(
    mut payloads: mpsc::Receiver<String>,
    updates: broadcast::Sender<Arc<DatapointUpdate>>,
    on_error: Option<ErrorHook>,
    on_message_handled: Option<MessageHandledHook>,
) {
    while let Some(payload) = payloads.recv().await {
        handle_payload(&payload, &updates, on_error.as_deref());
        if let Some(hook) = &on_message_handled {
            hook();
        }
    }
    tracing::debug!("payload queue closed, dispatcher exiting");
}

/// Decode one payload and emit updates for its valid datapoint keys.
fn handle_payload(
    payload: &str,
    updates: &broadcast::Sender<Arc<DatapointUpdate>>,
    on_error: Option<&(dyn Fn(&Error) + Send + Sync)>,
) {
    let envelope: InboundEnvelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            let err = Error::Decode {
                message: e.to_string(),
                payload: payload.to_owned(),
            };
            tracing::warn!(error = %err, "failed to decode inbound payload");
            if let Some(hook) = on_error {
                hook(&err);
            }
            return;
        }
    };

    let Some(update) = envelope.get(SYSAP_ID) else {
        tracing::warn!("inbound payload carries no sysap entry, skipping");
        return;
    };
    if update.datapoints.is_empty() {
        tracing::warn!("inbound payload carries no datapoints, skipping");
        return;
    }

    for (key, value) in &update.datapoints {
        let Some((device, channel, datapoint)) = parse_datapoint_key(key) else {
            // A malformed key never affects its siblings in the same message.
            tracing::warn!(key, "dropping datapoint with malformed key");
            continue;
        };

        let update = DatapointUpdate {
            device: device.to_owned(),
            channel: channel.to_owned(),
            datapoint: datapoint.to_owned(),
            value: value.clone(),
        };
        tracing::info!(
            device = %update.device,
            channel = %update.channel,
            datapoint = %update.datapoint,
            value = %update.value,
            "datapoint update"
        );
        // A send error just means no active subscribers right now.
        let _ = updates.send(Arc::new(update));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn envelope(datapoints: &[(&str, &str)]) -> String {
        let pairs: serde_json::Map<String, serde_json::Value> = datapoints
            .iter()
            .map(|(k, v)| ((*k).to_owned(), serde_json::Value::from(*v)))
            .collect();
        serde_json::json!({ SYSAP_ID: { "datapoints": pairs } }).to_string()
    }

    #[test]
    fn parse_key_accepts_three_segments() {
        assert_eq!(
            parse_datapoint_key("ABCDEF/ch0000/odp0000"),
            Some(("ABCDEF", "ch0000", "odp0000"))
        );
    }

    #[test]
    fn parse_key_rejects_other_shapes() {
        assert_eq!(parse_datapoint_key("Test123"), None);
        assert_eq!(parse_datapoint_key("a/b"), None);
        assert_eq!(parse_datapoint_key("a/b/c/d"), None);
        assert_eq!(parse_datapoint_key("a//c"), None);
        assert_eq!(parse_datapoint_key(""), None);
    }

    #[test]
    fn valid_datapoint_emits_one_update() {
        let (tx, mut rx) = broadcast::channel(16);

        handle_payload(&envelope(&[("ABCDEF/ch0000/odp0000", "1")]), &tx, None);

        let update = rx.try_recv().expect("one update");
        assert_eq!(
            *update,
            DatapointUpdate {
                device: "ABCDEF".into(),
                channel: "ch0000".into(),
                datapoint: "odp0000".into(),
                value: "1".into(),
            }
        );
        assert!(rx.try_recv().is_err(), "exactly one update expected");
    }

    #[test]
    fn malformed_key_does_not_affect_siblings() {
        let (tx, mut rx) = broadcast::channel(16);

        handle_payload(
            &envelope(&[("Test123", "5"), ("ABCDEF/ch0000/odp0000", "1")]),
            &tx,
            None,
        );

        let update = rx.try_recv().expect("valid sibling still emitted");
        assert_eq!(update.device, "ABCDEF");
        assert_eq!(update.value, "1");
        assert!(rx.try_recv().is_err(), "malformed key must be dropped");
    }

    #[test]
    fn empty_datapoints_emit_nothing() {
        let (tx, mut rx) = broadcast::channel(16);

        handle_payload(&envelope(&[]), &tx, None);
        handle_payload(r#"{"some-other-id":{"datapoints":{"a/b/c":"1"}}}"#, &tx, None);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn other_envelope_fields_decode_without_error() {
        let payload = serde_json::json!({
            SYSAP_ID: {
                "datapoints": { "ABCDEF/ch0000/odp0000": "1" },
                "devices": { "ABCDEF": { "displayName": "Light" } },
                "devicesAdded": ["ABCDEF"],
                "devicesRemoved": [],
                "parameters": { "par0001": "30" }
            }
        })
        .to_string();
        let (tx, mut rx) = broadcast::channel(16);

        handle_payload(&payload, &tx, None);

        assert_eq!(rx.try_recv().expect("update").value, "1");
    }

    #[test]
    fn envelope_round_trips_through_serde() {
        let mut envelope = InboundEnvelope::new();
        envelope.insert(
            SYSAP_ID.to_owned(),
            SysApUpdate {
                datapoints: BTreeMap::from([
                    ("ABCDEF/ch0000/odp0000".to_owned(), "1".to_owned()),
                    ("ABCDEF/ch0001/idp0002".to_owned(), "22.5".to_owned()),
                ]),
                devices: serde_json::json!({ "ABCDEF": { "interface": "TP" } })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                devices_added: vec!["ABCDEF".to_owned()],
                devices_removed: Vec::new(),
                parameters: BTreeMap::from([(
                    "par0001".to_owned(),
                    serde_json::Value::from("30"),
                )]),
            },
        );

        let encoded = serde_json::to_string(&envelope).expect("encode");
        let decoded: InboundEnvelope = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, envelope);
    }

    #[tokio::test]
    async fn decode_failure_is_not_fatal() {
        let (payload_tx, payload_rx) = mpsc::channel(8);
        let (update_tx, mut update_rx) = broadcast::channel(16);

        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let on_error: ErrorHook = {
            let errors = Arc::clone(&errors);
            let seen = Arc::clone(&seen);
            Arc::new(move |e: &Error| {
                errors.fetch_add(1, Ordering::SeqCst);
                seen.lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(e.to_string());
            })
        };

        let handled = Arc::new(AtomicUsize::new(0));
        let on_handled: MessageHandledHook = {
            let handled = Arc::clone(&handled);
            Arc::new(move || {
                handled.fetch_add(1, Ordering::SeqCst);
            })
        };

        let task = tokio::spawn(run_dispatcher(
            payload_rx,
            update_tx,
            Some(on_error),
            Some(on_handled),
        ));

        payload_tx.send("{not valid json".to_owned()).await.expect("send");
        payload_tx
            .send(envelope(&[("ABCDEF/ch0000/odp0000", "1")]))
            .await
            .expect("send");
        drop(payload_tx);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("dispatcher exits when queue closes")
            .expect("no panic");

        assert_eq!(errors.load(Ordering::SeqCst), 1, "exactly one decode error");
        assert_eq!(handled.load(Ordering::SeqCst), 2, "hook fires per payload");
        let update = update_rx.try_recv().expect("later payload still processed");
        assert_eq!(update.device, "ABCDEF");
    }
}
