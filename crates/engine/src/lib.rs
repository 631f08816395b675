//! audio_device_engine — public façade
//!
//! Thin re-export of `engine_core`'s public surface. This is the one
//! stable Rust API a language-binding adapter (FFI, WASM, a UI shell)
//! would wrap; no such binding is built here.

pub use engine_core::{
    spawn_with_default_capabilities, ConnectionContext, ControlTask, Engine, EngineConfig, EngineError,
    EngineObserver, EngineResult, EngineState, EngineStateUpdate, ManualFormat, MuteMode, NullObserver,
    RenderMode, StateTransform, MANUAL_MAX_FRAMES, MANUAL_RENDER_FORMAT, RENDER_CHUNK_FRAMES,
};

pub use engine_graph::{
    default_capabilities, AudioDeviceBuffer, AudioFormat, AudioGraphEngine, CpalDeviceEnumerator, DesktopCapabilities,
    DeviceDescriptor, DeviceEnumerator, DeviceKind, GraphError, GraphFactory, GraphSide, ManualCapabilities,
    ManualRenderingEngine, NoCapabilities, NodeId, PlatformCapabilities, RenderStatus, RingAudioDeviceBuffer,
    SampleKind, SharedAudioDeviceBuffer, SpeechActivityFn, DEFAULT_DEVICE_ID,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facade_reexports_are_usable() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        let _state = EngineState::default();
    }
}
