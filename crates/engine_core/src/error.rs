//! Engine error types and the integer status-code taxonomy
//!
//! §7: failures cross the observer/host boundary as plain integers (0 =
//! success, nonzero triggers rollback), grouped by subsystem into
//! documented ranges. Internally the engine still propagates
//! `Result`/`EngineError` with `?` the way `gecko_core::error::EngineError`
//! does; `EngineError::code()` is the one place that collapses a variant
//! down to the integer a caller on the other side of the observer
//! boundary receives.

use thiserror::Error;

use engine_graph::GraphError;

/// Errors that can occur while the engine applies a state transition.
#[derive(Error, Debug)]
pub enum EngineError {
    // -- configuration / setup: -1000..-1999 --
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    // -- graph/device/buffer collaborator errors: -2000..-2999 --
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    // -- observer rollback: -3000..-3999 --
    #[error("observer '{hook}' rejected the transition with status {status}")]
    ObserverRejected { hook: &'static str, status: i32 },

    #[error("rollback action '{action}' failed: {reason}")]
    RollbackFailed { action: &'static str, reason: String },

    // -- concurrency / control thread: -4000..-4999 --
    #[error("engine control thread has shut down")]
    ControlThreadGone,

    #[error("channel send error: receiver dropped")]
    ChannelSendError,

    #[error("channel receive error: sender dropped")]
    ChannelRecvError,

    // -- manual-mode render: -5000..-5999 --
    #[error("manual render loop failed: {0}")]
    ManualRenderFailed(String),

    // -- device-change watcher: -6000..-6999 --
    #[error("device-change watcher could not re-resolve selection: {0}")]
    DeviceWatcherFailed(String),

    // -- engine state: -7000..-7999 --
    #[error("state transition rejected: {0}")]
    StateTransitionRejected(String),

    // -- generic: -9000 --
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Collapse this error to the integer status code an observer-side
    /// caller receives, per the subsystem ranges documented above.
    pub fn code(&self) -> i32 {
        match self {
            EngineError::InvalidConfig(_) => -1000,
            EngineError::Graph(inner) => -2000 - graph_error_offset(inner),
            EngineError::ObserverRejected { status, .. } => {
                if *status != 0 {
                    *status
                } else {
                    -3000
                }
            }
            EngineError::RollbackFailed { .. } => -3500,
            EngineError::ControlThreadGone => -4000,
            EngineError::ChannelSendError => -4001,
            EngineError::ChannelRecvError => -4002,
            EngineError::ManualRenderFailed(_) => -5000,
            EngineError::DeviceWatcherFailed(_) => -6000,
            EngineError::StateTransitionRejected(_) => -7000,
            EngineError::Internal(_) => -9000,
        }
    }
}

fn graph_error_offset(err: &GraphError) -> i32 {
    match err {
        GraphError::NoDevicesFound => 1,
        GraphError::DeviceNotFound(_) => 2,
        GraphError::PlayoutDeviceUnavailable => 3,
        GraphError::RecordingDeviceUnavailable => 4,
        GraphError::AlreadyAttached(_) => 5,
        GraphError::NotAttached(_) => 6,
        GraphError::StartFailed { .. } => 7,
        GraphError::ConverterBuildFailed(_) => 8,
        GraphError::ManualRenderingConfigFailed(_) => 9,
        GraphError::CapabilityUnavailable(_) => 10,
        GraphError::Internal(_) => 11,
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Graph(GraphError::NoDevicesFound);
        assert!(err.to_string().contains("no audio devices"));
    }

    #[test]
    fn test_error_from_graph() {
        let graph_err = GraphError::DeviceNotFound("USB Mic".into());
        let engine_err: EngineError = graph_err.into();
        assert!(matches!(engine_err, EngineError::Graph(_)));
    }

    #[test]
    fn test_codes_fall_in_documented_subsystem_ranges() {
        assert!(EngineError::InvalidConfig("x".into()).code() <= -1000);
        assert!(EngineError::Graph(GraphError::NoDevicesFound).code() <= -2000);
        assert!(EngineError::ControlThreadGone.code() <= -4000);
        assert!(EngineError::ManualRenderFailed("x".into()).code() <= -5000);
        assert!(EngineError::DeviceWatcherFailed("x".into()).code() <= -6000);
        assert!(EngineError::StateTransitionRejected("x".into()).code() <= -7000);
    }

    #[test]
    fn test_observer_rejected_propagates_nonzero_status() {
        let err = EngineError::ObserverRejected { hook: "OnEngineWillStart", status: -42 };
        assert_eq!(err.code(), -42);
    }
}
