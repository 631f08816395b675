//! In-memory reference graph collaborators
//!
//! `engine_core`'s state-machine tests need something to drive that isn't
//! real hardware, the same way `gecko_platform` itself never touches real
//! audio outside its per-OS modules until a stream is actually opened. This
//! module supplies that something: a `MockGraphEngine`/`MockManualEngine`
//! pair plus the `GraphFactory` that hands them out, all inspectable after
//! the fact so tests can assert on the exact sequence of operations the
//! applier issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GraphError;
use crate::graph::{
    AudioFormat, AudioGraphEngine, ConfigChangeFn, GraphFactory, GraphSide, ManualRenderingEngine,
    NodeId, RenderStatus, SinkReceiveFn, SourceRenderFn, SpeechActivityFn,
};

/// One entry in a `MockGraphEngine`'s call log — used by tests to assert on
/// ordering (spec §8's "operations commit in the documented order").
#[derive(Debug, Clone, PartialEq)]
pub enum GraphCall {
    ConnectOutput,
    DisconnectOutput(NodeId),
    AttachInputMixer,
    ConnectDefaultInput(NodeId),
    AttachInputSink(NodeId),
    DisconnectInput(NodeId, NodeId),
    SetVoiceProcessingEnabled(bool),
    SetVoiceProcessingMuted(bool),
    SetVoiceProcessingBypassed(bool),
    SetVoiceProcessingAgcEnabled(bool),
    SetAdvancedDucking(bool, i32),
    SetInputMixerVolume(NodeId, f32),
    SetDevice(GraphSide, Option<u32>),
    Prepare,
    Start,
    Stop,
}

fn next_node_id() -> NodeId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NodeId(NEXT.fetch_add(1, Ordering::SeqCst))
}

/// Reference `AudioGraphEngine`. Every operation succeeds unless configured
/// otherwise via the `fail_*` knobs, so the rollback path (spec §4.2's
/// "unwind the action stack on first failure") can be exercised
/// deterministically.
pub struct MockGraphEngine {
    pub output_format: AudioFormat,
    pub input_format: AudioFormat,
    calls: Mutex<Vec<GraphCall>>,
    output_node: Mutex<Option<NodeId>>,
    input_mixer: Mutex<Option<NodeId>>,
    input_sink: Mutex<Option<NodeId>>,
    voice_processing_enabled: Mutex<bool>,
    running: Mutex<bool>,
    config_change: Mutex<Option<ConfigChangeFn>>,
    speech_activity: Mutex<Option<SpeechActivityFn>>,
    pub fail_start_times: Mutex<u32>,
}

impl MockGraphEngine {
    pub fn new(output_format: AudioFormat, input_format: AudioFormat) -> Self {
        Self {
            output_format,
            input_format,
            calls: Mutex::new(Vec::new()),
            output_node: Mutex::new(None),
            input_mixer: Mutex::new(None),
            input_sink: Mutex::new(None),
            voice_processing_enabled: Mutex::new(false),
            running: Mutex::new(false),
            config_change: Mutex::new(None),
            speech_activity: Mutex::new(None),
            fail_start_times: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> Vec<GraphCall> {
        self.calls.lock().clone()
    }

    pub fn fire_configuration_change(&self) {
        if let Some(cb) = self.config_change.lock().as_ref() {
            cb();
        }
    }

    pub fn fire_speech_activity(&self, started: bool) {
        if let Some(cb) = self.speech_activity.lock().as_ref() {
            cb(started);
        }
    }
}

impl AudioGraphEngine for MockGraphEngine {
    fn output_hardware_format(&self) -> AudioFormat {
        self.output_format
    }

    fn input_hardware_format(&self) -> AudioFormat {
        self.input_format
    }

    fn connect_output(&mut self, _format: AudioFormat, _render: SourceRenderFn) -> Result<NodeId, GraphError> {
        if self.output_node.lock().is_some() {
            return Err(GraphError::AlreadyAttached("output source"));
        }
        let node = next_node_id();
        *self.output_node.lock() = Some(node);
        self.calls.lock().push(GraphCall::ConnectOutput);
        Ok(node)
    }

    fn disconnect_output(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::DisconnectOutput(node));
        *self.output_node.lock() = None;
        Ok(())
    }

    fn attach_input_mixer(&mut self, _format: AudioFormat) -> Result<NodeId, GraphError> {
        let node = next_node_id();
        *self.input_mixer.lock() = Some(node);
        self.calls.lock().push(GraphCall::AttachInputMixer);
        Ok(node)
    }

    fn connect_default_input(&mut self, mixer: NodeId, _format: AudioFormat) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::ConnectDefaultInput(mixer));
        Ok(())
    }

    fn attach_input_sink(&mut self, mixer: NodeId, _format: AudioFormat, _sink: SinkReceiveFn) -> Result<NodeId, GraphError> {
        let node = next_node_id();
        *self.input_sink.lock() = Some(node);
        self.calls.lock().push(GraphCall::AttachInputSink(mixer));
        Ok(node)
    }

    fn disconnect_input(&mut self, mixer: NodeId, sink: NodeId) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::DisconnectInput(mixer, sink));
        *self.input_mixer.lock() = None;
        *self.input_sink.lock() = None;
        Ok(())
    }

    fn voice_processing_enabled(&self) -> bool {
        *self.voice_processing_enabled.lock()
    }

    fn set_voice_processing_enabled(&mut self, enabled: bool) -> Result<(), GraphError> {
        *self.voice_processing_enabled.lock() = enabled;
        self.calls.lock().push(GraphCall::SetVoiceProcessingEnabled(enabled));
        Ok(())
    }

    fn set_voice_processing_muted(&mut self, muted: bool) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::SetVoiceProcessingMuted(muted));
        Ok(())
    }

    fn set_voice_processing_bypassed(&mut self, bypassed: bool) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::SetVoiceProcessingBypassed(bypassed));
        Ok(())
    }

    fn set_voice_processing_agc_enabled(&mut self, enabled: bool) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::SetVoiceProcessingAgcEnabled(enabled));
        Ok(())
    }

    fn set_advanced_ducking(&mut self, enabled: bool, level: i32) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::SetAdvancedDucking(enabled, level));
        Ok(())
    }

    fn register_speech_activity_listener(&mut self, callback: SpeechActivityFn) {
        *self.speech_activity.lock() = Some(callback);
    }

    fn set_input_mixer_volume(&mut self, mixer: NodeId, volume: f32) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::SetInputMixerVolume(mixer, volume));
        Ok(())
    }

    fn set_device(&mut self, side: GraphSide, device_id: Option<u32>) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::SetDevice(side, device_id));
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), GraphError> {
        self.calls.lock().push(GraphCall::Prepare);
        Ok(())
    }

    fn start(&mut self) -> Result<(), GraphError> {
        let mut remaining = self.fail_start_times.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(GraphError::StartFailed {
                attempts: 1,
                reason: "mock configured failure".into(),
            });
        }
        self.calls.lock().push(GraphCall::Start);
        *self.running.lock() = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.calls.lock().push(GraphCall::Stop);
        *self.running.lock() = false;
    }

    fn is_running(&self) -> bool {
        *self.running.lock()
    }

    fn register_configuration_change_listener(&mut self, callback: ConfigChangeFn) {
        *self.config_change.lock() = Some(callback);
    }

    fn deregister_configuration_change_listener(&mut self) {
        *self.config_change.lock() = None;
    }

    fn describe_graph(&self) -> String {
        format!(
            "MockGraphEngine{{output_node={:?}, input_mixer={:?}, running={}}}",
            self.output_node.lock(),
            self.input_mixer.lock(),
            self.running.lock()
        )
    }
}

/// Reference `ManualRenderingEngine`: renders silence unless a `render_fn`
/// override is installed, and echoes requested frame counts back as
/// "captured" samples so render-loop pacing tests (§4.4) can assert on
/// chunk sizes without real hardware.
pub struct MockManualEngine {
    running: bool,
    pub render_fn: Option<Box<dyn FnMut(u32, &mut [i16]) -> RenderStatus + Send>>,
    pub render_count: u64,
}

impl MockManualEngine {
    pub fn new() -> Self {
        Self {
            running: false,
            render_fn: None,
            render_count: 0,
        }
    }
}

impl Default for MockManualEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualRenderingEngine for MockManualEngine {
    fn start(&mut self) -> Result<(), GraphError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn render(&mut self, frames: u32, captured_out: &mut [i16]) -> Result<RenderStatus, GraphError> {
        self.render_count += 1;
        if let Some(render_fn) = self.render_fn.as_mut() {
            return Ok(render_fn(frames, captured_out));
        }
        for sample in captured_out.iter_mut() {
            *sample = 0;
        }
        Ok(RenderStatus::Ok)
    }
}

/// Hands out `MockGraphEngine`/`MockManualEngine` instances, tracking the
/// most recently created device-mode engine so tests can reach into it
/// (e.g. to assert on `calls()`) after the applier has taken ownership.
pub struct MockGraphFactory {
    pub output_format: AudioFormat,
    pub input_format: AudioFormat,
    last_device_engine: Mutex<Option<Arc<Mutex<MockGraphEngineHandle>>>>,
}

/// Shared observation window into the last-created mock device engine.
/// The factory itself returns an owned `Box<dyn AudioGraphEngine>` (as the
/// trait requires), so this handle exists purely for test introspection.
pub struct MockGraphEngineHandle {
    pub calls: Vec<GraphCall>,
}

impl MockGraphFactory {
    pub fn new(output_format: AudioFormat, input_format: AudioFormat) -> Self {
        Self {
            output_format,
            input_format,
            last_device_engine: Mutex::new(None),
        }
    }
}

impl GraphFactory for MockGraphFactory {
    fn create_device_engine(&self) -> Result<Box<dyn AudioGraphEngine>, GraphError> {
        Ok(Box::new(MockGraphEngine::new(self.output_format, self.input_format)))
    }

    fn create_manual_engine(&self, _format: AudioFormat, _max_frames: u32) -> Result<Box<dyn ManualRenderingEngine>, GraphError> {
        Ok(Box::new(MockManualEngine::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SampleKind;

    fn fmt() -> AudioFormat {
        AudioFormat { sample_rate: 48000, channels: 1, sample_kind: SampleKind::Int16 }
    }

    #[test]
    fn test_connect_output_then_disconnect_logs_calls_in_order() {
        let mut engine = MockGraphEngine::new(fmt(), fmt());
        let node = engine.connect_output(fmt(), Box::new(|_| vec![])).unwrap();
        engine.disconnect_output(node).unwrap();
        assert_eq!(
            engine.calls(),
            vec![GraphCall::ConnectOutput, GraphCall::DisconnectOutput(node)]
        );
    }

    #[test]
    fn test_double_connect_output_fails() {
        let mut engine = MockGraphEngine::new(fmt(), fmt());
        engine.connect_output(fmt(), Box::new(|_| vec![])).unwrap();
        let result = engine.connect_output(fmt(), Box::new(|_| vec![]));
        assert!(matches!(result, Err(GraphError::AlreadyAttached(_))));
    }

    #[test]
    fn test_start_retries_until_configured_failures_exhausted() {
        let mut engine = MockGraphEngine::new(fmt(), fmt());
        *engine.fail_start_times.lock() = 2;
        assert!(engine.start().is_err());
        assert!(engine.start().is_err());
        assert!(engine.start().is_ok());
        assert!(engine.is_running());
    }

    #[test]
    fn test_manual_engine_render_defaults_to_silence() {
        let mut engine = MockManualEngine::new();
        let mut out = [7i16; 4];
        engine.render(4, &mut out).unwrap();
        assert_eq!(out, [0, 0, 0, 0]);
        assert_eq!(engine.render_count, 1);
    }

    #[test]
    fn test_speech_activity_listener_forwards_events() {
        let mut engine = MockGraphEngine::new(fmt(), fmt());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        engine.register_speech_activity_listener(Box::new(move |started| {
            seen_clone.lock().push(started);
        }));
        engine.fire_speech_activity(true);
        engine.fire_speech_activity(false);
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[test]
    fn test_factory_produces_independent_engines() {
        let factory = MockGraphFactory::new(fmt(), fmt());
        let mut a = factory.create_device_engine().unwrap();
        let mut b = factory.create_device_engine().unwrap();
        a.start().unwrap();
        assert!(a.is_running());
        assert!(!b.is_running());
        let _ = b.start();
    }
}
