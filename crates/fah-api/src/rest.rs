// REST wrappers for the gateway control surface.
//
// Thin request + JSON decode with no retry or state: every response is
// unwrapped from the `{ "<sysap-id>": ... }` envelope before the caller
// sees it. The persistent event stream lives in `crate::websocket`.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::SYSAP_ID;
use crate::error::Error;
use crate::models::{
    DatapointValues, Device, SysApConfiguration, VirtualDeviceMapping, VirtualDeviceRequest,
};
use crate::transport::GatewayConfig;

/// HTTP client for the System Access Point REST API.
///
/// Carries the Basic-Auth header on every request. All methods return the
/// unwrapped sysap payload -- the envelope keyed by [`SYSAP_ID`] is
/// stripped here.
pub struct SysApClient {
    http: reqwest::Client,
    base_url: Url,
}

impl SysApClient {
    /// Build a client from a [`GatewayConfig`].
    pub fn new(config: &GatewayConfig) -> Result<Self, Error> {
        Ok(Self {
            http: config.build_http_client()?,
            base_url: config.rest_base_url()?,
        })
    }

    /// The gateway REST base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// List the serials of all devices known to the gateway.
    pub async fn device_list(&self) -> Result<Vec<String>, Error> {
        let url = self.url("devicelist")?;
        self.get_enveloped(url).await
    }

    /// Fetch the full gateway configuration (device tree + metadata).
    pub async fn configuration(&self) -> Result<SysApConfiguration, Error> {
        let url = self.url("configuration")?;
        self.get_enveloped(url).await
    }

    /// Fetch a single device by serial.
    pub async fn device(&self, serial: &str) -> Result<Device, Error> {
        let url = self.url(&format!("device/{SYSAP_ID}/{serial}"))?;
        let config: SysApConfiguration = self.get_enveloped(url).await?;
        config
            .devices
            .into_iter()
            .find_map(|(s, d)| (s == serial).then_some(d))
            .ok_or_else(|| Error::Api {
                status: 200,
                message: format!("device {serial} missing from response"),
            })
    }

    /// Read the current value of one datapoint.
    ///
    /// The gateway addresses datapoints as `{serial}.{channel}.{datapoint}`
    /// in REST paths (the event stream uses `/` separators instead).
    pub async fn get_datapoint(
        &self,
        serial: &str,
        channel: &str,
        datapoint: &str,
    ) -> Result<Vec<String>, Error> {
        let url = self.url(&format!("datapoint/{SYSAP_ID}/{serial}.{channel}.{datapoint}"))?;
        let values: DatapointValues = self.get_enveloped(url).await?;
        Ok(values.values)
    }

    /// Write a value to one datapoint.
    pub async fn set_datapoint(
        &self,
        serial: &str,
        channel: &str,
        datapoint: &str,
        value: &str,
    ) -> Result<(), Error> {
        let url = self.url(&format!("datapoint/{SYSAP_ID}/{serial}.{channel}.{datapoint}"))?;
        debug!("PUT {url}");

        let resp = self
            .http
            .put(url)
            .body(value.to_owned())
            .send()
            .await
            .map_err(Error::Transport)?;
        Self::check_status(&resp)?;
        Ok(())
    }

    /// Create (or refresh) a virtual device under the given serial.
    ///
    /// Returns the native serial the gateway assigned to it.
    pub async fn create_virtual_device(
        &self,
        serial: &str,
        request: &VirtualDeviceRequest,
    ) -> Result<String, Error> {
        let url = self.url(&format!("virtualdevice/{SYSAP_ID}/{serial}"))?;
        debug!("PUT {url}");

        let resp = self
            .http
            .put(url)
            .json(request)
            .send()
            .await
            .map_err(Error::Transport)?;
        let mapping: VirtualDeviceMapping = Self::parse_enveloped(resp).await?;
        mapping
            .devices
            .into_values()
            .next()
            .map(|d| d.serial)
            .ok_or_else(|| Error::Api {
                status: 200,
                message: "virtual device response contained no serial mapping".into(),
            })
    }

    /// Trigger a proxy-device action, e.g. `shortpress` on a `switch` class.
    pub async fn proxy_device_action(
        &self,
        class: &str,
        serial: &str,
        action: &str,
    ) -> Result<(), Error> {
        let url = self.url(&format!("proxydevice/{SYSAP_ID}/{class}/{serial}/action/{action}"))?;
        debug!("PUT {url}");

        let resp = self.http.put(url).send().await.map_err(Error::Transport)?;
        Self::check_status(&resp)?;
        Ok(())
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    /// Send a GET request and unwrap the sysap envelope.
    async fn get_enveloped<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {url}");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        Self::parse_enveloped(resp).await
    }

    /// Parse `{ "<sysap-id>": <payload> }`, returning the payload or an
    /// error if the envelope is malformed or the status is non-success.
    async fn parse_enveloped<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        Self::check_status(&resp)?;

        let body = resp.text().await.map_err(Error::Transport)?;
        let mut envelope: HashMap<String, T> =
            serde_json::from_str(&body).map_err(|e| Error::Deserialization {
                message: e.to_string(),
                body: body.clone(),
            })?;

        envelope.remove(SYSAP_ID).ok_or_else(|| Error::Deserialization {
            message: format!("response envelope missing sysap key {SYSAP_ID}"),
            body,
        })
    }

    fn check_status(resp: &reqwest::Response) -> Result<(), Error> {
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "gateway rejected credentials".into(),
            });
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected response")
                    .into(),
            });
        }
        Ok(())
    }
}
