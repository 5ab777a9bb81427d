//! Device topology: detector, modules and data ports.
//!
//! These types are built by [`XspdApi::initialize`] from the device's
//! `info` variable and system descriptor. They carry no transport of
//! their own; every operation borrows the [`XspdApi`] so the topology can
//! be shared behind one lock while the client stays independently usable.

use xspd_core::value::VarValue;
use xspd_core::{
    Compressor, CounterMode, DetectorStatus, OnOff, PixelDepth, ShuffleMode, Threshold,
    TriggerMode, XspdError,
};

use crate::protocol::XspdApi;

/// One detector module (a sensor tile with its own readout chips).
#[derive(Debug, Clone)]
pub struct Module {
    id: String,
    firmware: String,
    chip_ids: Vec<String>,
    status: Option<ModuleStatus>,
}

/// Environmental readings for a module, refreshed by the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleStatus {
    pub sensor_current: f64,
    pub board_temp: f64,
    pub fpga_temp: f64,
    pub humidity_temp: f64,
    pub humidity: f64,
}

impl Module {
    pub(crate) fn new(id: &str, firmware: &str, chip_ids: Vec<String>) -> Self {
        Self {
            id: id.to_string(),
            firmware: firmware.to_string(),
            chip_ids,
            status: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    pub fn chip_ids(&self) -> &[String] {
        &self.chip_ids
    }

    /// Last readings collected by [`Module::read_status`], if any.
    pub fn status(&self) -> Option<&ModuleStatus> {
        self.status.as_ref()
    }

    /// Read a module variable (`<module-id>/<name>`).
    pub async fn get_var<T: VarValue>(&self, api: &XspdApi, name: &str) -> Result<T, XspdError> {
        api.get_var(&format!("{}/{}", self.id, name)).await
    }

    /// Write a module variable and return the readback.
    pub async fn set_var<T: VarValue>(
        &self,
        api: &XspdApi,
        name: &str,
        value: T,
    ) -> Result<T, XspdError> {
        api.set_var(&format!("{}/{}", self.id, name), value).await
    }

    /// Largest frame count this module can buffer at the current settings.
    pub async fn max_frames(&self, api: &XspdApi) -> Result<i64, XspdError> {
        self.get_var(api, "max_frames").await
    }

    /// Refresh sensor current and temperatures, caching the result.
    ///
    /// The temperature variable is a three-element vector: board, FPGA and
    /// humidity-sensor temperatures in that order.
    pub async fn read_status(&mut self, api: &XspdApi) -> Result<ModuleStatus, XspdError> {
        let sensor_current: f64 = self.get_var(api, "sensor_current").await?;
        let temps: Vec<f64> = self.get_var(api, "temperature").await?;
        if temps.len() < 3 {
            return Err(XspdError::ValueShape {
                path: format!("{}/temperature", self.id),
                expected: "three-element temperature vector",
            });
        }
        let humidity: f64 = self.get_var(api, "humidity").await?;
        let status = ModuleStatus {
            sensor_current,
            board_temp: temps[0],
            fpga_temp: temps[1],
            humidity_temp: temps[2],
            humidity,
        };
        self.status = Some(status);
        Ok(status)
    }
}

/// A ZMQ frame publisher endpoint advertised by the device.
#[derive(Debug, Clone)]
pub struct DataPort {
    id: String,
    ip: String,
    port: u16,
}

impl DataPort {
    pub(crate) fn new(id: &str, ip: &str, port: u16) -> Self {
        Self {
            id: id.to_string(),
            ip: ip.to_string(),
            port,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// ZMQ endpoint for this port.
    pub fn uri(&self) -> String {
        format!("tcp://{}:{}", self.ip, self.port)
    }

    /// Read a data-port variable (`<port-id>/<name>`).
    pub async fn get_var<T: VarValue>(&self, api: &XspdApi, name: &str) -> Result<T, XspdError> {
        api.get_var(&format!("{}/{}", self.id, name)).await
    }

    /// Write a data-port variable and return the readback.
    pub async fn set_var<T: VarValue>(
        &self,
        api: &XspdApi,
        name: &str,
        value: T,
    ) -> Result<T, XspdError> {
        api.set_var(&format!("{}/{}", self.id, name), value).await
    }

    /// Current frame geometry (width, height) in pixels.
    pub async fn frame_geometry(&self, api: &XspdApi) -> Result<(u32, u32), XspdError> {
        let width: u32 = self.get_var(api, "frame_width").await?;
        let height: u32 = self.get_var(api, "frame_height").await?;
        Ok((width, height))
    }
}

/// Acquisition-relevant settings read in one pass before arming.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    pub depth: PixelDepth,
    pub compressor: Compressor,
    pub counter_mode: CounterMode,
    pub n_frames: u32,
}

/// Full settings snapshot, typically read once after connecting.
///
/// `shutter_time_ms` is in milliseconds on the wire; `model` is the
/// device's `type` variable.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub config: DetectorConfig,
    pub shutter_time_ms: f64,
    pub summed_frames: i32,
    pub compression_level: i32,
    pub beam_energy: f64,
    pub trigger_mode: TriggerMode,
    pub shuffle_mode: ShuffleMode,
    pub gating_mode: OnOff,
    pub charge_summing: OnOff,
    pub flatfield_correction: OnOff,
    pub countrate_correction: OnOff,
    pub saturation_flag: OnOff,
    pub roi_rows: i32,
    pub model: String,
    /// Empty until the low threshold has been set at least once.
    pub thresholds: Vec<f64>,
}

/// The resolved detector with its modules and data ports.
///
/// The first registered data port is the active one; port selection is
/// fixed at topology-build time.
#[derive(Debug, Clone)]
pub struct Detector {
    id: String,
    status: Option<DetectorStatus>,
    modules: Vec<Module>,
    data_ports: Vec<DataPort>,
}

impl Detector {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: None,
            modules: Vec::new(),
            data_ports: Vec::new(),
        }
    }

    pub(crate) fn register_module(&mut self, id: &str, firmware: &str, chip_ids: Vec<String>) {
        self.modules.push(Module::new(id, firmware, chip_ids));
    }

    pub(crate) fn register_data_port(&mut self, id: &str, ip: &str, port: u16) {
        self.data_ports.push(DataPort::new(id, ip, port));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut [Module] {
        &mut self.modules
    }

    pub fn data_ports(&self) -> &[DataPort] {
        &self.data_ports
    }

    /// The data port frames are streamed from.
    pub fn active_data_port(&self) -> Result<&DataPort, XspdError> {
        self.data_ports
            .first()
            .ok_or_else(|| XspdError::NoDataPort(self.id.clone()))
    }

    /// Last status read by [`Detector::update_status`], if any.
    pub fn status(&self) -> Option<DetectorStatus> {
        self.status
    }

    /// Read the detector status and cache it.
    pub async fn update_status(&mut self, api: &XspdApi) -> Result<DetectorStatus, XspdError> {
        let status: DetectorStatus = self.get_var(api, "status").await?;
        self.status = Some(status);
        Ok(status)
    }

    /// Firmware version common to all modules, or `"Multiple versions"`
    /// when they disagree.
    pub fn firmware_version(&self) -> String {
        let mut versions = self.modules.iter().map(Module::firmware);
        match versions.next() {
            None => String::new(),
            Some(first) => {
                if versions.all(|fw| fw == first) {
                    first.to_string()
                } else {
                    "Multiple versions".to_string()
                }
            }
        }
    }

    /// Read a detector variable (`<detector-id>/<name>`).
    pub async fn get_var<T: VarValue>(&self, api: &XspdApi, name: &str) -> Result<T, XspdError> {
        api.get_var(&format!("{}/{}", self.id, name)).await
    }

    /// Write a detector variable and return the readback.
    pub async fn set_var<T: VarValue>(
        &self,
        api: &XspdApi,
        name: &str,
        value: T,
    ) -> Result<T, XspdError> {
        api.set_var(&format!("{}/{}", self.id, name), value).await
    }

    /// Write a detector variable with an explicit readback key.
    pub async fn set_var_with_key<T: VarValue>(
        &self,
        api: &XspdApi,
        name: &str,
        value: T,
        rb_key: &str,
    ) -> Result<T, XspdError> {
        api.set_var_with_key(&format!("{}/{}", self.id, name), value, rb_key)
            .await
    }

    /// Write a detector variable and warn when the device clamps it.
    ///
    /// Returns the readback, which is authoritative.
    pub async fn set_checked<T>(&self, api: &XspdApi, name: &str, value: T) -> Result<T, XspdError>
    where
        T: VarValue + PartialEq + std::fmt::Debug + Clone,
    {
        let readback = self.set_var(api, name, value.clone()).await?;
        if readback != value {
            tracing::warn!(
                variable = name,
                requested = ?value,
                actual = ?readback,
                "device adjusted requested value"
            );
        }
        Ok(readback)
    }

    /// Execute a detector command (`<detector-id>/<command>`).
    pub async fn exec_command(&self, api: &XspdApi, command: &str) -> Result<(), XspdError> {
        api.exec_command(&format!("{}/{}", self.id, command)).await
    }

    /// Set an energy threshold in keV and return the readback value.
    ///
    /// The device stores thresholds as a vector with the low threshold in
    /// slot 0 and the high threshold in slot 1, so the high threshold
    /// cannot be set while the vector is still empty.
    pub async fn set_threshold(
        &self,
        api: &XspdApi,
        threshold: Threshold,
        kev: f64,
    ) -> Result<f64, XspdError> {
        let mut thresholds: Vec<f64> = self.get_var(api, "thresholds").await?;
        if threshold == Threshold::High && thresholds.is_empty() {
            return Err(XspdError::ThresholdOrder);
        }
        let slot = threshold.slot();
        if thresholds.len() <= slot {
            thresholds.resize(slot + 1, 0.0);
        }
        thresholds[slot] = kev;

        let readback = self
            .set_var_with_key(api, "thresholds", thresholds, "thresholds")
            .await?;
        Ok(readback.get(slot).copied().unwrap_or(kev))
    }

    /// Snapshot the settings the acquisition path depends on.
    pub async fn read_config(&self, api: &XspdApi) -> Result<DetectorConfig, XspdError> {
        let (width, height) = self.active_data_port()?.frame_geometry(api).await?;
        let bit_depth: u32 = self.get_var(api, "bit_depth").await?;
        let depth = PixelDepth::from_bit_depth(bit_depth)?;
        let compressor: Compressor = self.get_var(api, "compressor").await?;
        let counter_mode: CounterMode = self.get_var(api, "counter_mode").await?;
        let n_frames: u32 = self.get_var(api, "n_frames").await?;
        Ok(DetectorConfig {
            width,
            height,
            bit_depth,
            depth,
            compressor,
            counter_mode,
            n_frames,
        })
    }

    /// Read the full initial state the way a control screen wants it.
    pub async fn read_settings(&self, api: &XspdApi) -> Result<DetectorSettings, XspdError> {
        let config = self.read_config(api).await?;
        Ok(DetectorSettings {
            config,
            shutter_time_ms: self.get_var(api, "shutter_time").await?,
            summed_frames: self.get_var(api, "summed_frames").await?,
            compression_level: self.get_var(api, "compression_level").await?,
            beam_energy: self.get_var(api, "beam_energy").await?,
            trigger_mode: self.get_var(api, "trigger_mode").await?,
            shuffle_mode: self.get_var(api, "shuffle_mode").await?,
            gating_mode: self.get_var(api, "gating_mode").await?,
            charge_summing: self.get_var(api, "charge_summing").await?,
            flatfield_correction: self.get_var(api, "flatfield_correction").await?,
            countrate_correction: self.get_var(api, "countrate_correction").await?,
            saturation_flag: self.get_var(api, "saturation_flag").await?,
            roi_rows: self.get_var(api, "roi_rows").await?,
            model: self.get_var(api, "type").await?,
            thresholds: self.get_var(api, "thresholds").await?,
        })
    }

    /// Refresh the cached status of every module.
    pub async fn refresh_modules(&mut self, api: &XspdApi) -> Result<(), XspdError> {
        for module in &mut self.modules {
            module.read_status(api).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector_with_modules(firmwares: &[&str]) -> Detector {
        let mut det = Detector::new("lambda");
        for (i, fw) in firmwares.iter().enumerate() {
            det.register_module(&format!("lambda/mod{i}"), fw, vec![]);
        }
        det
    }

    #[test]
    fn firmware_version_single() {
        let det = detector_with_modules(&["1.0.0"]);
        assert_eq!(det.firmware_version(), "1.0.0");
    }

    #[test]
    fn firmware_version_identical() {
        let det = detector_with_modules(&["2.1.0", "2.1.0", "2.1.0"]);
        assert_eq!(det.firmware_version(), "2.1.0");
    }

    #[test]
    fn firmware_version_mixed() {
        let det = detector_with_modules(&["2.1.0", "2.0.0"]);
        assert_eq!(det.firmware_version(), "Multiple versions");
    }

    #[test]
    fn firmware_version_no_modules() {
        let det = Detector::new("lambda");
        assert_eq!(det.firmware_version(), "");
    }

    #[test]
    fn active_port_is_first_registered() {
        let mut det = Detector::new("lambda");
        det.register_data_port("dp0", "10.0.0.5", 4300);
        det.register_data_port("dp1", "10.0.0.6", 4301);
        let active = det.active_data_port().unwrap();
        assert_eq!(active.id(), "dp0");
        assert_eq!(active.uri(), "tcp://10.0.0.5:4300");
    }

    #[test]
    fn active_port_missing() {
        let det = Detector::new("lambda");
        let err = det.active_data_port().unwrap_err();
        assert_eq!(err.to_string(), "No data ports found for device ID lambda");
    }
}
