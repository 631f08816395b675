//! Engine configuration
//!
//! Bundles the literal constants spec.md calls out by name (start-retry
//! count and delay, the desktop settle delay, the device-change debounce
//! window, the manual-mode format) behind the same
//! `Default` + named-preset-constructor + `validate()` shape
//! `StreamConfig`/`EngineConfig` used in the teacher crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use engine_graph::{AudioFormat, SampleKind};

/// Fixed format the manual-mode render pipeline always uses (§4.3): Int16,
/// 48kHz, mono.
pub const MANUAL_RENDER_FORMAT: AudioFormat = AudioFormat {
    sample_rate: 48_000,
    channels: 1,
    sample_kind: SampleKind::Int16,
};

/// Upper bound on frames requested per manual-mode render call (§4.3/§4.4).
pub const MANUAL_MAX_FRAMES: u32 = 3072;

/// Device-mode render loop's fixed chunk size (§4.2/§4.4): 10ms at 48kHz.
pub const RENDER_CHUNK_FRAMES: u32 = 480;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of times the device-mode applier retries a failed
    /// `AudioGraphEngine::start()` before giving up and surfacing the
    /// failure to the caller (§4.2 step 19).
    pub start_retry_attempts: u32,

    /// Delay between start retries.
    #[serde(with = "duration_millis")]
    pub start_retry_delay: Duration,

    /// Desktop-only settle delay observed necessary before `start()` when
    /// another process may be holding voice processing (§4.2 step 19).
    #[serde(with = "duration_millis")]
    pub desktop_prepare_settle: Duration,

    /// Debounce window for the default-device-change watcher (§4.5):
    /// rapid-fire OS notifications collapse into one re-evaluation after
    /// this much quiet.
    #[serde(with = "duration_millis")]
    pub device_change_debounce: Duration,

    /// Manual-mode render format; fixed by spec but kept here so tests can
    /// substitute a different format without touching call sites.
    pub manual_render_format: ManualFormat,

    /// Manual-mode max frames per render call.
    pub manual_max_frames: u32,
}

/// Serializable mirror of [`AudioFormat`] — `AudioFormat` itself is not
/// `Serialize` since it lives in `engine_graph` and carries no such
/// requirement there.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ManualFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl ManualFormat {
    pub fn to_audio_format(self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            sample_kind: SampleKind::Int16,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            start_retry_attempts: 10,
            start_retry_delay: Duration::from_millis(100),
            desktop_prepare_settle: Duration::from_millis(100),
            device_change_debounce: Duration::from_millis(500),
            manual_render_format: ManualFormat { sample_rate: 48_000, channels: 1 },
            manual_max_frames: MANUAL_MAX_FRAMES,
        }
    }
}

impl EngineConfig {
    /// Preset tolerating more start retries, for flaky virtualized/CI
    /// audio hosts where voice processing takes longer to free up.
    pub fn patient() -> Self {
        Self {
            start_retry_attempts: 30,
            start_retry_delay: Duration::from_millis(150),
            ..Self::default()
        }
    }

    /// Preset for tests that want the debounce/settle delays collapsed to
    /// near-zero so state-machine assertions don't need real sleeps.
    pub fn fast_for_tests() -> Self {
        Self {
            start_retry_attempts: 3,
            start_retry_delay: Duration::from_millis(1),
            desktop_prepare_settle: Duration::from_millis(0),
            device_change_debounce: Duration::from_millis(1),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.start_retry_attempts == 0 {
            return Err("start_retry_attempts must be at least 1".into());
        }
        if self.manual_max_frames == 0 {
            return Err("manual_max_frames must be nonzero".into());
        }
        if self.manual_render_format.sample_rate == 0 || self.manual_render_format.channels == 0 {
            return Err("manual_render_format must have nonzero rate and channels".into());
        }
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.start_retry_attempts, 10);
        assert_eq!(config.start_retry_delay, Duration::from_millis(100));
        assert_eq!(config.desktop_prepare_settle, Duration::from_millis(100));
        assert_eq!(config.device_change_debounce, Duration::from_millis(500));
        assert_eq!(config.manual_max_frames, 3072);
    }

    #[test]
    fn test_manual_format_matches_spec() {
        let format = EngineConfig::default().manual_render_format.to_audio_format();
        assert_eq!(format, MANUAL_RENDER_FORMAT);
    }

    #[test]
    fn test_validate() {
        assert!(EngineConfig::default().validate().is_ok());
        let invalid = EngineConfig { start_retry_attempts: 0, ..EngineConfig::default() };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = EngineConfig::patient();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.start_retry_attempts, deserialized.start_retry_attempts);
        assert_eq!(config.start_retry_delay, deserialized.start_retry_delay);
    }

    #[test]
    fn test_fast_for_tests_preset_is_fast() {
        let config = EngineConfig::fast_for_tests();
        assert!(config.start_retry_delay < Duration::from_millis(10));
        assert!(config.device_change_debounce < Duration::from_millis(10));
    }
}
