//! Data model for the gateway REST API.
//!
//! Every REST response is wrapped in an envelope keyed by the fixed
//! all-zero sysap identifier ([`crate::SYSAP_ID`]); the client strips the
//! envelope before callers see these types. Unknown fields are captured
//! with `#[serde(flatten)]` so nothing the gateway sends is silently
//! dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One device from the gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    /// Display name assigned in the configuration UI.
    #[serde(default, rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Room identifier, if the device is placed on the floorplan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,

    /// Floor identifier, if the device is placed on the floorplan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<String>,

    /// Bus interface the device is attached to (`TP`, `RF`, `hue`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// Channels keyed by channel identifier (`ch0000`, `ch0001`, ...).
    #[serde(default)]
    pub channels: BTreeMap<String, Channel>,

    /// All remaining fields the gateway sends.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One channel of a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Channel {
    #[serde(default, rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Function identifier describing what the channel does.
    #[serde(default, rename = "functionID", skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,

    /// Input datapoints keyed by datapoint identifier (`idp0000`, ...).
    #[serde(default)]
    pub inputs: BTreeMap<String, ChannelDatapoint>,

    /// Output datapoints keyed by datapoint identifier (`odp0000`, ...).
    #[serde(default)]
    pub outputs: BTreeMap<String, ChannelDatapoint>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single input or output datapoint of a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelDatapoint {
    #[serde(default, rename = "pairingID", skip_serializing_if = "Option::is_none")]
    pub pairing_id: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Gateway configuration payload: the device tree plus sysap metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SysApConfiguration {
    /// Devices keyed by serial.
    #[serde(default)]
    pub devices: BTreeMap<String, Device>,

    /// Human-readable sysap name, when configured.
    #[serde(default, rename = "sysapName", skip_serializing_if = "Option::is_none")]
    pub sysap_name: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Response payload of a datapoint read: the current value(s).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatapointValues {
    #[serde(default)]
    pub values: Vec<String>,
}

/// Request body for creating a virtual device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualDeviceRequest {
    /// Virtual device type, e.g. `"SwitchingActuator"`.
    #[serde(rename = "type")]
    pub device_type: String,

    #[serde(default)]
    pub properties: VirtualDeviceProperties,
}

/// Properties of a virtual device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualDeviceProperties {
    /// Time-to-live in seconds; `"-1"` keeps the device until removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Vec<u32>>,
}

/// Response payload of a virtual-device creation: the requested serial
/// mapped to the native serial the gateway assigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualDeviceMapping {
    #[serde(default)]
    pub devices: BTreeMap<String, VirtualDeviceSerial>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualDeviceSerial {
    pub serial: String,
}
