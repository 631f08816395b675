//! Graph/device/buffer collaborator error types

use thiserror::Error;

/// Errors surfaced by the host audio-graph, device-enumeration, and PCM
/// buffer collaborators. These are the "out of scope, interfaces only"
/// pieces the engine drives — errors here propagate up into
/// `engine_core::EngineError` and are folded into its integer error
/// taxonomy.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("no audio devices found")]
    NoDevicesFound,

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("playout device not available")]
    PlayoutDeviceUnavailable,

    #[error("recording device not available")]
    RecordingDeviceUnavailable,

    #[error("node already attached: {0}")]
    AlreadyAttached(&'static str),

    #[error("node not attached: {0}")]
    NotAttached(&'static str),

    #[error("failed to start engine after {attempts} attempts: {reason}")]
    StartFailed { attempts: u32, reason: String },

    #[error("failed to build format converter: {0}")]
    ConverterBuildFailed(String),

    #[error("manual rendering mode configuration failed: {0}")]
    ManualRenderingConfigFailed(String),

    #[error("platform capability not available: {0}")]
    CapabilityUnavailable(String),

    #[error("internal graph error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::DeviceNotFound("USB Mic".into());
        assert!(err.to_string().contains("USB Mic"));

        let err = GraphError::StartFailed {
            attempts: 10,
            reason: "voice processing busy".into(),
        };
        assert!(err.to_string().contains("10"));
    }
}
