//! Host audio-graph abstraction
//!
//! The engine's applier logic (`engine_core::device_applier` /
//! `manual_applier`) treats the host's native audio-graph object (an
//! `AVAudioEngine`-style node graph on Apple platforms, conceptually
//! identical to any platform's input/output/mixer/source/sink node graph)
//! as an external collaborator. This module defines that collaborator's
//! interface only — concrete platform graphs are not implemented here; see
//! [`crate::mock`] for the in-memory reference implementation used by the
//! engine's own tests.

use std::fmt;

use crate::error::GraphError;

/// A PCM stream format as negotiated with the host node graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_kind: SampleKind,
}

impl AudioFormat {
    pub fn is_valid(&self) -> bool {
        self.sample_rate != 0 && self.channels != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Float32,
    Int16,
}

/// Opaque handle to an attached node. Only meaningful to the graph that
/// issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Which side of the graph a device-selection or hardware-format query
/// applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSide {
    Input,
    Output,
}

/// Callback invoked on an arbitrary (host audio) thread each time the
/// source node is pulled for playout data. Implementations must not block
/// or allocate; they hand back exactly `frames` Int16 mono samples.
pub type SourceRenderFn = Box<dyn FnMut(u32) -> Vec<i16> + Send>;

/// Callback invoked on an arbitrary (host audio) thread each time the sink
/// node receives a buffer of captured Float32 samples, already converted to
/// Int16, alongside a capture timestamp in nanoseconds from a monotonic
/// clock.
pub type SinkReceiveFn = Box<dyn FnMut(&[i16], i64) + Send>;

/// Fired when the host engine stops spontaneously (a "configuration
/// change" in Apple's terms — e.g. a route change invalidated the graph).
/// Engine-initiated stops do not fire this.
pub type ConfigChangeFn = Box<dyn Fn() + Send>;

/// Fired by the voice-processing node's muted-talker detector: `true` when
/// speech activity starts, `false` when it ends (§4.2 step 7, §6
/// `OnSpeechActivityEvent`).
pub type SpeechActivityFn = Box<dyn Fn(bool) + Send>;

/// The device-mode host audio-graph engine: the thing §4.2 creates,
/// releases, and wires node-by-node.
///
/// Every method here corresponds directly to one guarded action in the
/// device-mode applier's ordered step list; the trait makes no attempt to
/// be a general-purpose audio graph API.
pub trait AudioGraphEngine: Send {
    /// Zero sample rate/channels means "format not available" — the
    /// applier turns that into `GraphError::PlayoutDeviceUnavailable` /
    /// `RecordingDeviceUnavailable`.
    fn output_hardware_format(&self) -> AudioFormat;
    fn input_hardware_format(&self) -> AudioFormat;

    /// Step 8: attach + connect a source node (render block pulls playout
    /// PCM) to the main mixer, and the main mixer to the output node.
    fn connect_output(&mut self, format: AudioFormat, render: SourceRenderFn) -> Result<NodeId, GraphError>;
    /// Step 9: detach the source node. Detaching an already-detached node
    /// is not an error (logged, not fatal, per §7).
    fn disconnect_output(&mut self, node: NodeId) -> Result<(), GraphError>;

    /// Step 10: attach an input mixer, default-connect the hardware input
    /// node to it (unless the caller already connected something via the
    /// `OnEngineWillConnectInput` observer hook — the applier tracks that,
    /// not the graph), then attach a sink node fed by the converter.
    fn attach_input_mixer(&mut self, format: AudioFormat) -> Result<NodeId, GraphError>;
    fn connect_default_input(&mut self, mixer: NodeId, format: AudioFormat) -> Result<(), GraphError>;
    fn attach_input_sink(&mut self, mixer: NodeId, format: AudioFormat, sink: SinkReceiveFn) -> Result<NodeId, GraphError>;
    /// Step 11: inverse of the above, each guarded against "not attached".
    fn disconnect_input(&mut self, mixer: NodeId, sink: NodeId) -> Result<(), GraphError>;

    /// Step 7/14/15: voice-processing toggles on the input node.
    fn voice_processing_enabled(&self) -> bool;
    fn set_voice_processing_enabled(&mut self, enabled: bool) -> Result<(), GraphError>;
    fn set_voice_processing_muted(&mut self, muted: bool) -> Result<(), GraphError>;
    fn set_voice_processing_bypassed(&mut self, bypassed: bool) -> Result<(), GraphError>;
    fn set_voice_processing_agc_enabled(&mut self, enabled: bool) -> Result<(), GraphError>;
    fn set_advanced_ducking(&mut self, enabled: bool, level: i32) -> Result<(), GraphError>;

    /// Step 7: attach the muted-speech-activity listener. Only meaningful
    /// while voice processing is enabled; a no-op default is provided since
    /// most graph implementations (and the mock) have nothing useful to
    /// report until voice processing is actually turned on.
    fn register_speech_activity_listener(&mut self, _callback: SpeechActivityFn) {}

    /// Step 13: input-mixer mute mechanism — zero-gain the mixer's output.
    fn set_input_mixer_volume(&mut self, mixer: NodeId, volume: f32) -> Result<(), GraphError>;

    /// Step 16: desktop-only device selection. `None` means "leave the
    /// system default in effect".
    fn set_device(&mut self, side: GraphSide, device_id: Option<u32>) -> Result<(), GraphError>;

    /// Step 19 desktop workaround: settle delay before starting, observed
    /// necessary when another process holds voice processing.
    fn prepare(&mut self) -> Result<(), GraphError>;
    fn start(&mut self) -> Result<(), GraphError>;
    fn stop(&mut self);
    fn is_running(&self) -> bool;

    fn register_configuration_change_listener(&mut self, callback: ConfigChangeFn);
    fn deregister_configuration_change_listener(&mut self);

    /// Diagnostic dump emitted after exhausting start retries.
    fn describe_graph(&self) -> String;
}

/// Outcome of one manual-mode render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Ok,
    Failed,
}

/// The manual-mode counterpart of [`AudioGraphEngine`]: a caller-driven
/// render loop instead of a device-clocked graph. §4.3/§4.4.
pub trait ManualRenderingEngine: Send {
    fn start(&mut self) -> Result<(), GraphError>;
    fn stop(&mut self);
    /// Render `frames` frames; on success, the recorded-side samples for
    /// this chunk are written into `captured_out` (Int16 mono).
    fn render(&mut self, frames: u32, captured_out: &mut [i16]) -> Result<RenderStatus, GraphError>;
}

/// Constructs fresh graph objects. §3.3: the engine object is created on
/// first enablement and destroyed/recreated per the diff predicates; the
/// factory is the seam that lets the engine not know how that
/// construction happens.
pub trait GraphFactory: Send + Sync {
    fn create_device_engine(&self) -> Result<Box<dyn AudioGraphEngine>, GraphError>;
    fn create_manual_engine(
        &self,
        format: AudioFormat,
        max_frames: u32,
    ) -> Result<Box<dyn ManualRenderingEngine>, GraphError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_validity() {
        let valid = AudioFormat { sample_rate: 48000, channels: 1, sample_kind: SampleKind::Float32 };
        assert!(valid.is_valid());

        let invalid = AudioFormat { sample_rate: 0, channels: 1, sample_kind: SampleKind::Float32 };
        assert!(!invalid.is_valid());
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(7).to_string(), "node#7");
    }
}
