//! Device profiles, constants and node-path layouts.
//!
//! Family-specific numbers live in named constants and travel inside
//! [`DeviceProfile`] values rather than module-level mutable state, so device
//! variants can differ per test.

use crate::error::ShfResult;
use crate::node::NodePath;
use crate::store::NodeStore;
use serde::{Deserialize, Serialize};

/// Sampling frequency of the QA signal path, in Hz.
pub const SHFQA_SAMPLING_FREQUENCY: f64 = 2e9;

/// Sampling frequency of the SG signal path, in Hz.
pub const SHFSG_SAMPLING_FREQUENCY: f64 = 2e9;

/// Maximum waveform length accepted by a QA generator slot, in samples.
pub const SHFQA_MAX_GENERATOR_WAVEFORM_LENGTH: usize = 4 * 1024;

/// Number of waveform/weight slots per QA generator.
pub const SHFQA_MAX_GENERATOR_CARRIER_COUNT: usize = 16;

/// Maximum waveform length accepted by an SG AWG core, in samples.
pub const SHFSG_MAX_GENERATOR_WAVEFORM_LENGTH: usize = 98304;

/// Number of waveform slots per SG AWG core.
pub const SHFSG_GENERATOR_WAVEFORM_SLOT_COUNT: usize = 16;

/// Bit depth of the scope ADC; full scale is `2^(ADC_BITS - 1)` LSBs.
pub const ADC_BITS: u32 = 14;

/// Which channel family a node path belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Quantum analyzer channel (`qachannels`).
    Qa,
    /// Signal generator channel (`sgchannels`).
    Sg,
}

impl ChannelKind {
    fn segment(self) -> &'static str {
        match self {
            ChannelKind::Qa => "qachannels",
            ChannelKind::Sg => "sgchannels",
        }
    }
}

/// Identity and fixed parameters of one connected device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Device identifier, e.g. `dev12004`.
    pub device_id: String,
    /// Sampling frequency of the signal path, in Hz.
    pub sampling_frequency: f64,
}

impl DeviceProfile {
    /// Profile for a QA-family device at the standard sampling rate.
    pub fn shfqa(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            sampling_frequency: SHFQA_SAMPLING_FREQUENCY,
        }
    }

    /// Profile for an SG-family device at the standard sampling rate.
    pub fn shfsg(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            sampling_frequency: SHFSG_SAMPLING_FREQUENCY,
        }
    }

    /// Root path of the device subtree.
    pub fn root(&self) -> NodePath {
        NodePath::new(format!("/{}", self.device_id))
    }

    /// Root path of channel `index` in the given family.
    pub fn channel(&self, kind: ChannelKind, index: usize) -> NodePath {
        self.root().join(kind.segment()).join(index.to_string())
    }

    /// Root path of scope `index`.
    pub fn scope(&self, index: usize) -> NodePath {
        self.root().join("scopes").join(index.to_string())
    }

    /// Path of software trigger `index`.
    pub fn sw_trigger(&self, index: usize) -> NodePath {
        self.root()
            .join("system/swtriggers")
            .join(index.to_string())
            .join("single")
    }

    /// Root path of the device feature nodes.
    pub fn features(&self) -> NodePath {
        self.root().join("features")
    }
}

/// Returns the maximum number of supported qubits per channel.
///
/// Derived from the device type and installed options: four-channel QA
/// devices and devices with the `16W` option support 16, all others 8.
pub async fn max_qubits_per_channel(
    store: &dyn NodeStore,
    profile: &DeviceProfile,
) -> ShfResult<usize> {
    let features = profile.features();
    let device_type = store.read_string(&features.join("devtype")).await?;
    let options = store.read_string(&features.join("options")).await?;

    if device_type == "SHFQA4" || options.contains("16W") {
        Ok(16)
    } else {
        Ok(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockNodeStore;

    #[test]
    fn test_profile_sampling_frequencies() {
        assert_eq!(
            DeviceProfile::shfqa("dev1").sampling_frequency,
            SHFQA_SAMPLING_FREQUENCY
        );
        assert_eq!(
            DeviceProfile::shfsg("dev1").sampling_frequency,
            SHFSG_SAMPLING_FREQUENCY
        );
    }

    #[test]
    fn test_profile_json_round_trip() {
        let profile = DeviceProfile::shfsg("dev12004");
        let json = serde_json::to_string(&profile).unwrap();
        let restored: DeviceProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, profile);
    }

    #[test]
    fn test_path_layout() {
        let profile = DeviceProfile::shfqa("dev12004");
        assert_eq!(
            profile.channel(ChannelKind::Qa, 2).as_str(),
            "/dev12004/qachannels/2"
        );
        assert_eq!(
            profile.channel(ChannelKind::Sg, 0).as_str(),
            "/dev12004/sgchannels/0"
        );
        assert_eq!(profile.scope(0).as_str(), "/dev12004/scopes/0");
        assert_eq!(
            profile.sw_trigger(0).as_str(),
            "/dev12004/system/swtriggers/0/single"
        );
    }

    #[tokio::test]
    async fn test_max_qubits_from_devtype() {
        let store = MockNodeStore::new();
        let profile = DeviceProfile::shfqa("dev1");
        store.set_scalar("/dev1/features/devtype", "SHFQA4");
        store.set_scalar("/dev1/features/options", "");
        assert_eq!(max_qubits_per_channel(&store, &profile).await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_max_qubits_from_options() {
        let store = MockNodeStore::new();
        let profile = DeviceProfile::shfqa("dev1");
        store.set_scalar("/dev1/features/devtype", "SHFQA2");
        store.set_scalar("/dev1/features/options", "AWG/16W");
        assert_eq!(max_qubits_per_channel(&store, &profile).await.unwrap(), 16);
    }

    #[tokio::test]
    async fn test_max_qubits_default() {
        let store = MockNodeStore::new();
        let profile = DeviceProfile::shfqa("dev1");
        store.set_scalar("/dev1/features/devtype", "SHFQA2");
        store.set_scalar("/dev1/features/options", "AWG");
        assert_eq!(max_qubits_per_channel(&store, &profile).await.unwrap(), 8);
    }
}
