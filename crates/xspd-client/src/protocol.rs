//! The variable protocol client.
//!
//! [`XspdApi`] owns the base URI, the negotiated version strings and the
//! resolved device id, and funnels every variable read/write through one
//! generic pair of operations, [`XspdApi::get_var`] / [`XspdApi::set_var`].
//! Centralizing marshalling here means every configuration field — trigger
//! mode, thresholds, bit depth — shares one failure and one round-trip
//! contract.

use std::sync::Arc;

use serde_json::Value;

use xspd_core::value::VarValue;
use xspd_core::XspdError;

use crate::topology::Detector;
use crate::transport::{RequestKind, Transport};

/// Default readback key for variable responses.
pub const VALUE_KEY: &str = "value";

/// Client for the XSPD REST control service.
pub struct XspdApi {
    transport: Arc<dyn Transport>,
    base_uri: String,
    api_version: Option<String>,
    xspd_version: Option<String>,
    libxsp_version: Option<String>,
    device_id: Option<String>,
}

impl XspdApi {
    /// Create an uninitialized client for `host:port`.
    ///
    /// A scheme is prepended when `host` does not carry one.
    pub fn new(host: &str, port: u16, transport: Arc<dyn Transport>) -> Self {
        let base_uri = if host.contains("://") {
            format!("{host}:{port}")
        } else {
            format!("http://{host}:{port}")
        };
        Self {
            transport,
            base_uri,
            api_version: None,
            xspd_version: None,
            libxsp_version: None,
            device_id: None,
        }
    }

    /// Negotiated API version; fails before [`XspdApi::initialize`].
    pub fn api_version(&self) -> Result<&str, XspdError> {
        self.api_version.as_deref().ok_or(XspdError::NotInitialized)
    }

    /// Reported XSPD service version; fails before [`XspdApi::initialize`].
    pub fn xspd_version(&self) -> Result<&str, XspdError> {
        self.xspd_version
            .as_deref()
            .ok_or(XspdError::NotInitialized)
    }

    /// Reported libxsp version; fails before [`XspdApi::initialize`].
    pub fn libxsp_version(&self) -> Result<&str, XspdError> {
        self.libxsp_version
            .as_deref()
            .ok_or(XspdError::NotInitialized)
    }

    /// Resolved device id; fails before [`XspdApi::initialize`].
    pub fn device_id(&self) -> Result<&str, XspdError> {
        self.device_id.as_deref().ok_or(XspdError::NotInitialized)
    }

    /// Submit a raw request for a fully-formed URI.
    pub async fn submit(&self, uri: &str, kind: RequestKind) -> Result<Value, XspdError> {
        self.transport.submit(uri, kind).await
    }

    /// GET a versioned endpoint (`<base>/api/v<ver>/<endpoint>`).
    pub async fn get(&self, endpoint: &str) -> Result<Value, XspdError> {
        let uri = format!("{}/api/v{}/{}", self.base_uri, self.api_version()?, endpoint);
        self.submit(&uri, RequestKind::Get).await
    }

    /// PUT a versioned endpoint (`<base>/api/v<ver>/<endpoint>`).
    pub async fn put(&self, endpoint: &str) -> Result<Value, XspdError> {
        let uri = format!("{}/api/v{}/{}", self.base_uri, self.api_version()?, endpoint);
        self.submit(&uri, RequestKind::Put).await
    }

    /// Read a variable under the default `"value"` key.
    pub async fn get_var<T: VarValue>(&self, path: &str) -> Result<T, XspdError> {
        self.get_var_with_key(path, VALUE_KEY).await
    }

    /// Read a variable, extracting `key` from the response envelope.
    pub async fn get_var_with_key<T: VarValue>(
        &self,
        path: &str,
        key: &str,
    ) -> Result<T, XspdError> {
        let endpoint = format!("devices/{}/variables?path={}", self.device_id()?, path);
        let response = self.get(&endpoint).await?;
        read_var_from_resp(&response, path, key)
    }

    /// Write a variable and return the readback under `"value"`.
    ///
    /// The readback may differ from the requested value when the device
    /// clamps it to a nearer legal value; comparing and surfacing that is
    /// the caller's job (see [`Detector::set_checked`]).
    pub async fn set_var<T: VarValue>(&self, path: &str, value: T) -> Result<T, XspdError> {
        self.set_var_with_key(path, value, VALUE_KEY).await
    }

    /// Write a variable with an explicit readback key, for variables with
    /// asymmetric set/readback shapes (thresholds go out as a CSV string
    /// and come back structured).
    pub async fn set_var_with_key<T: VarValue>(
        &self,
        path: &str,
        value: T,
        rb_key: &str,
    ) -> Result<T, XspdError> {
        let endpoint = format!(
            "devices/{}/variables?path={}&value={}",
            self.device_id()?,
            path,
            value.encode()
        );
        let response = self.put(&endpoint).await?;
        read_var_from_resp(&response, path, rb_key)
    }

    /// Execute a device command, validating it against the advertised
    /// command list first so a typo fails loudly instead of vanishing
    /// into a no-op PUT.
    pub async fn exec_command(&self, command: &str) -> Result<(), XspdError> {
        let device = self.device_id()?.to_string();
        let advertised = self.get(&format!("devices/{device}/commands")).await?;

        let found = advertised
            .as_array()
            .map(|cmds| {
                cmds.iter()
                    .any(|cmd| cmd.get("path").and_then(Value::as_str) == Some(command))
            })
            .unwrap_or(false);

        if !found {
            return Err(XspdError::UnknownCommand {
                command: command.to_string(),
                device,
            });
        }

        self.put(&format!("devices/{device}/commands?path={command}"))
            .await?;
        Ok(())
    }

    /// Whether `device_id` appears in the service's device list.
    pub async fn device_exists(&self, device_id: &str) -> Result<bool, XspdError> {
        let devices = self.device_list().await?;
        Ok(devices.iter().any(|id| id == device_id))
    }

    /// Device id at a zero-based index into the device list.
    pub async fn device_at_index(&self, index: usize) -> Result<String, XspdError> {
        let devices = self.device_list().await?;
        devices
            .get(index)
            .cloned()
            .ok_or(XspdError::IndexOutOfRange(index))
    }

    async fn device_list(&self) -> Result<Vec<String>, XspdError> {
        let response = self.get("devices").await?;
        let devices = response
            .get("devices")
            .and_then(Value::as_array)
            .ok_or_else(|| XspdError::ValueShape {
                path: "devices".to_string(),
                expected: "device array",
            })?;
        Ok(devices
            .iter()
            .filter_map(|d| d.get("id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Negotiate versions, resolve the target device and build the
    /// topology. Runs once per client lifetime; to reconnect, discard the
    /// client and create a new one.
    ///
    /// Device resolution: a single ASCII digit is a zero-based index into
    /// the device list; any other non-empty string must exist in the list;
    /// `None` defaults to index 0.
    pub async fn initialize(&mut self, device_id: Option<&str>) -> Result<Detector, XspdError> {
        let version_info = self
            .submit(&format!("{}/api", self.base_uri), RequestKind::Get)
            .await?;

        let api_version = version_info
            .get("api version")
            .and_then(Value::as_str)
            .ok_or_else(|| XspdError::ApiVersion("missing 'api version' field".to_string()))?;
        let xspd_version = version_info
            .get("xspd version")
            .and_then(Value::as_str)
            .ok_or_else(|| XspdError::ApiVersion("missing 'xspd version' field".to_string()))?;
        self.api_version = Some(api_version.to_string());
        self.xspd_version = Some(xspd_version.to_string());

        let resolved = match device_id {
            Some(id) if matches!(id.as_bytes(), [b] if b.is_ascii_digit()) => {
                let index = usize::from(id.as_bytes()[0] - b'0');
                self.device_at_index(index).await?
            }
            Some(id) if !id.is_empty() => {
                if !self.device_exists(id).await? {
                    return Err(XspdError::DeviceNotFound(id.to_string()));
                }
                id.to_string()
            }
            _ => self.device_at_index(0).await?,
        };
        tracing::info!(device = %resolved, "resolved target device");
        self.device_id = Some(resolved);

        self.build_topology().await
    }

    async fn build_topology(&mut self) -> Result<Detector, XspdError> {
        let device = self.device_id()?.to_string();

        let info: Value = self.get_var("info").await?;
        if let Some(libxsp) = info.get("libxsp version").and_then(Value::as_str) {
            self.libxsp_version = Some(libxsp.to_string());
        }

        let detectors = info
            .get("detectors")
            .and_then(Value::as_array)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| XspdError::NoDetector(device.clone()))?;

        // Single-detector scope: only the first entry is materialized.
        let entry = &detectors[0];
        let detector_id = entry.get("detector-id").and_then(Value::as_str);
        let modules = entry.get("modules").and_then(Value::as_array);
        let (detector_id, modules) = match (detector_id, modules) {
            (Some(id), Some(modules)) => (id, modules),
            _ => return Err(XspdError::MalformedDetector(device.clone())),
        };

        let mut detector = Detector::new(detector_id);
        for module in modules {
            let id = module
                .get("module")
                .and_then(Value::as_str)
                .ok_or_else(|| XspdError::MalformedDetector(device.clone()))?;
            let firmware = module
                .get("firmware")
                .and_then(Value::as_str)
                .ok_or_else(|| XspdError::MalformedDetector(device.clone()))?;
            let chip_ids = module
                .get("chip-ids")
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            detector.register_module(id, firmware, chip_ids);
        }

        let device_info = self.get(&format!("devices/{device}")).await?;
        let data_ports = device_info
            .get("system")
            .and_then(|s| s.get("data-ports"))
            .and_then(Value::as_array)
            .filter(|list| !list.is_empty())
            .ok_or_else(|| XspdError::NoDataPort(device.clone()))?;

        for port in data_ports {
            let id = port.get("id").and_then(Value::as_str);
            let ip = port.get("ip").and_then(Value::as_str);
            let port_num = port.get("port").and_then(Value::as_u64);
            match (id, ip, port_num) {
                (Some(id), Some(ip), Some(port_num)) => {
                    detector.register_data_port(id, ip, port_num as u16);
                }
                _ => return Err(XspdError::MalformedDataPort(device.clone())),
            }
        }

        tracing::info!(
            detector = %detector.id(),
            modules = detector.modules().len(),
            data_ports = detector.data_ports().len(),
            "topology built"
        );
        Ok(detector)
    }
}

/// Extract `key` from a response envelope and decode it as `T`.
pub fn read_var_from_resp<T: VarValue>(
    response: &Value,
    path: &str,
    key: &str,
) -> Result<T, XspdError> {
    let value = response.get(key).ok_or_else(|| XspdError::KeyNotFound {
        path: path.to_string(),
        key: key.to_string(),
    })?;
    T::decode(path, value)
}
