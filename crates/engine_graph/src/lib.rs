//! engine_graph — host audio-graph, PCM buffer, and device-enumeration
//! collaborators for the audio device engine.
//!
//! Everything `engine_core` treats as "out of scope, interfaces only"
//! lives here as a trait: the host node-graph engine, the manual-mode
//! render engine, the PCM device buffer, device enumeration, and the
//! platform-capability notifications (device hot-plug, session
//! interruption). [`mock`] supplies in-memory reference implementations
//! for `engine_core`'s own test suite; the only real OS integration this
//! crate performs is device enumeration via `cpal`.

pub mod buffer;
pub mod device;
pub mod error;
pub mod graph;
pub mod mock;
pub mod platform;

pub use buffer::{AudioDeviceBuffer, RingAudioDeviceBuffer, SharedAudioDeviceBuffer};
pub use device::{CpalDeviceEnumerator, DeviceDescriptor, DeviceEnumerator, DeviceKind, DEFAULT_DEVICE_ID};
pub use error::GraphError;
pub use graph::{
    AudioFormat, AudioGraphEngine, ConfigChangeFn, GraphFactory, GraphSide, ManualRenderingEngine,
    NodeId, RenderStatus, SampleKind, SinkReceiveFn, SourceRenderFn, SpeechActivityFn,
};
pub use platform::{
    DesktopCapabilities, InterruptionEvent, ListenerToken, ManualCapabilities, NoCapabilities,
    PlatformCapabilities,
};

/// Default platform capabilities for the current OS: a polling device
/// watcher on desktop targets, a no-op stand-in everywhere else (§9: "the
/// desktop-only device watcher ... non-capable platforms supply a no-op
/// implementation").
pub fn default_capabilities(poll_interval: std::time::Duration) -> std::sync::Arc<dyn PlatformCapabilities> {
    #[cfg(any(target_os = "linux", target_os = "windows", target_os = "macos"))]
    {
        std::sync::Arc::new(DesktopCapabilities::new(poll_interval))
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        let _ = poll_interval;
        std::sync::Arc::new(NoCapabilities)
    }
}
