//! Device-mode applier (§4.2)
//!
//! Walks the fixed, documented 20-step sequence whenever the committed (or
//! about-to-be-committed) render mode is `Device`. Each step is a guarded
//! action; a rollback stack of compensating actions is built up as steps
//! succeed and unwound in reverse on the first failure, so a rejected
//! transition never leaves the graph or buffer half-reconfigured (§8
//! property 4).

use engine_graph::{AudioFormat, GraphSide, NodeId, SampleKind};
use tracing::{debug, warn};

use crate::core::EngineCore;
use crate::diff::EngineStateUpdate;
use crate::error::{EngineError, EngineResult};
use crate::observer::ConnectionContext;

/// Compensating action pushed as each step below succeeds; popped and
/// executed in reverse by [`EngineCore::unwind_device_rollback`] on
/// failure. Modeled as a closed enum rather than boxed closures so the
/// unwind path never needs to re-borrow `self` mutably from inside a
/// captured closure.
enum RollbackAction {
    DropDeviceEngine,
    DisconnectOutput(NodeId),
    DisconnectInput { mixer: NodeId, sink: NodeId },
    StopPlayoutBuffer,
    StopRecordingBuffer,
    StartPlayoutBuffer,
    StartRecordingBuffer,
}

fn connection_context(format: AudioFormat) -> ConnectionContext {
    ConnectionContext { sample_rate: format.sample_rate, channels: format.channels }
}

impl EngineCore {
    pub(crate) fn apply_device_diff(&mut self, diff: &EngineStateUpdate) -> EngineResult<()> {
        let mut rollback: Vec<RollbackAction> = Vec::new();
        match self.run_device_steps(diff, &mut rollback) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.unwind_device_rollback(rollback);
                Err(err)
            }
        }
    }

    fn run_device_steps(&mut self, diff: &EngineStateUpdate, rollback: &mut Vec<RollbackAction>) -> EngineResult<()> {
        let next = diff.next;
        let restart_required = diff.is_engine_restart_required();
        let recreate_required = diff.is_engine_recreate_required();
        let was_running_before = self.device.engine.as_ref().is_some_and(|e| e.is_running());

        // Step 1: stop engine.
        if was_running_before
            && (!next.is_any_running() || restart_required || diff.did_begin_interruption() || recreate_required)
        {
            if let Some(engine) = self.device.engine.as_mut() {
                engine.deregister_configuration_change_listener();
                engine.stop();
            }
            let status = self.observer.on_engine_did_stop(next.is_output_enabled(), next.is_input_enabled());
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineDidStop", status });
            }
        }

        // Step 2: release engine object if recreate required.
        if recreate_required && self.device.engine.is_some() {
            let status = self.observer.on_engine_will_release();
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillRelease", status });
            }
            self.device.engine = None;
            self.device.output_node = None;
            self.device.input_mixer = None;
            self.device.input_sink = None;
            self.device.input_connected_by_observer = false;
        }

        // Step 3: create engine object.
        if next.is_any_enabled() && (self.device.engine.is_none() || recreate_required) {
            let engine = self.graph_factory.create_device_engine()?;
            self.device.engine = Some(engine);
            rollback.push(RollbackAction::DropDeviceEngine);
            let status = self.observer.on_engine_did_create();
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineDidCreate", status });
            }
        }

        // Step 4/5: stop playout/recording buffers ahead of re-wiring.
        if !next.is_output_enabled() && self.buffer.is_playing() {
            self.buffer.stop_playout()?;
            rollback.push(RollbackAction::StartPlayoutBuffer);
        }
        if !next.is_input_enabled() && self.buffer.is_recording() {
            self.buffer.stop_recording()?;
            rollback.push(RollbackAction::StartRecordingBuffer);
        }

        // Step 6: OnEngineWillEnable.
        if diff.did_any_enable() {
            let status = self.observer.on_engine_will_enable(next.is_output_enabled(), next.is_input_enabled());
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillEnable", status });
            }
        }

        // Step 7: configure voice processing on the input node.
        if next.is_input_enabled() {
            if let Some(engine) = self.device.engine.as_mut() {
                if engine.voice_processing_enabled() != next.voice_processing_enabled {
                    engine.set_voice_processing_enabled(next.voice_processing_enabled)?;
                    if next.voice_processing_enabled {
                        if next.mute_mode == crate::state::MuteMode::RestartEngine {
                            engine.set_voice_processing_muted(false)?;
                        }
                        let observer = std::sync::Arc::clone(&self.observer);
                        engine.register_speech_activity_listener(Box::new(move |started| {
                            observer.on_speech_activity_event(started);
                        }));
                        debug!("voice processing enabled; speech-activity listener attached");
                    }
                }
            }
        }

        // Step 8: enable output side.
        let enabling_output = diff.did_enable_output() || (recreate_required && next.is_output_enabled());
        if enabling_output {
            let hw_format = self
                .device
                .engine
                .as_ref()
                .map(|e| e.output_hardware_format())
                .unwrap_or(AudioFormat { sample_rate: 0, channels: 0, sample_kind: SampleKind::Float32 });
            if hw_format.sample_rate == 0 || hw_format.channels == 0 {
                return Err(EngineError::Graph(engine_graph::GraphError::PlayoutDeviceUnavailable));
            }
            let engine_format = AudioFormat { sample_rate: hw_format.sample_rate, channels: 1, sample_kind: SampleKind::Float32 };
            self.buffer.set_playout_format(engine_format);
            self.buffer.reset_playout();

            let buffer = self.buffer.clone();
            let node = self
                .device
                .engine
                .as_mut()
                .expect("device engine present when enabling output")
                .connect_output(engine_format, Box::new(move |frames| buffer.get_playout_data(frames)))?;
            self.device.output_node = Some(node);
            rollback.push(RollbackAction::DisconnectOutput(node));

            let status = self.observer.on_engine_will_connect_output(connection_context(engine_format));
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillConnectOutput", status });
            }
        }

        // Step 9: disable output side.
        let disabling_output = diff.did_disable_output() || (recreate_required && !next.is_output_enabled());
        if disabling_output {
            if let (Some(engine), Some(node)) = (self.device.engine.as_mut(), self.device.output_node.take()) {
                if let Err(err) = engine.disconnect_output(node) {
                    warn!("disconnect_output on already-detached node: {err}");
                }
            }
        }

        // Step 10: enable input side.
        let enabling_input = diff.did_enable_input() || (recreate_required && next.is_input_enabled());
        if enabling_input {
            let hw_format = self
                .device
                .engine
                .as_ref()
                .map(|e| e.input_hardware_format())
                .unwrap_or(AudioFormat { sample_rate: 0, channels: 0, sample_kind: SampleKind::Float32 });
            if hw_format.sample_rate == 0 || hw_format.channels == 0 {
                return Err(EngineError::Graph(engine_graph::GraphError::RecordingDeviceUnavailable));
            }
            let engine_format = AudioFormat { sample_rate: hw_format.sample_rate, channels: 1, sample_kind: SampleKind::Float32 };

            let engine = self.device.engine.as_mut().expect("device engine present when enabling input");
            let mixer = engine.attach_input_mixer(engine_format)?;
            self.buffer.set_recording_format(engine_format);
            self.buffer.reset_recording();

            let status = self.observer.on_engine_will_connect_input(connection_context(engine_format));
            if status != 0 {
                self.device.input_mixer = Some(mixer);
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillConnectInput", status });
            }

            // The observer contract only reports veto/accept (§9: plain
            // function entries, no richer channel back to the applier), so
            // this implementation always default-connects the hardware
            // input; `input_connected_by_observer` is retained for
            // documentation parity with §4.2 step 10 but is never set true.
            if !self.device.input_connected_by_observer {
                engine.connect_default_input(mixer, engine_format)?;
            }

            let buffer = self.buffer.clone();
            let sink = engine.attach_input_sink(
                mixer,
                engine_format,
                Box::new(move |data, capture_timestamp_ns| {
                    let _ = buffer.deliver_recorded_data(data, capture_timestamp_ns);
                }),
            )?;
            self.device.input_mixer = Some(mixer);
            self.device.input_sink = Some(sink);
            rollback.push(RollbackAction::DisconnectInput { mixer, sink });
        }

        // Step 11: disable input side.
        let disabling_input = diff.did_disable_input() || (recreate_required && !next.is_input_enabled());
        if disabling_input {
            if let Some(engine) = self.device.engine.as_mut() {
                let _ = engine.set_voice_processing_muted(false);
            }
            if let (Some(engine), Some(mixer), Some(sink)) =
                (self.device.engine.as_mut(), self.device.input_mixer.take(), self.device.input_sink.take())
            {
                if let Err(err) = engine.disconnect_input(mixer, sink) {
                    warn!("disconnect_input on already-detached node: {err}");
                }
            }
        }

        // Step 12: OnEngineDidDisable.
        if diff.did_any_disable() {
            let status = self.observer.on_engine_did_disable(next.is_output_enabled(), next.is_input_enabled());
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineDidDisable", status });
            }
        }

        // Step 13: runtime mute updates (no graph rewire).
        if let Some(engine) = self.device.engine.as_mut() {
            match next.mute_mode {
                crate::state::MuteMode::VoiceProcessing => {
                    if next.is_input_enabled() {
                        engine.set_voice_processing_muted(next.input_muted)?;
                    }
                }
                crate::state::MuteMode::InputMixer => {
                    if let Some(mixer) = self.device.input_mixer {
                        let volume = if next.input_muted { 0.0 } else { 1.0 };
                        engine.set_input_mixer_volume(mixer, volume)?;
                    }
                }
                crate::state::MuteMode::RestartEngine => {
                    // Folded into the enable/disable predicates (§3.1): the
                    // engine's input side is physically torn down by steps
                    // 10/11 rather than muted in place.
                }
            }
        }

        // Step 14: advanced ducking.
        let ducking_changed = diff.prev.advanced_ducking != next.advanced_ducking || diff.prev.ducking_level != next.ducking_level;
        if next.is_input_enabled() && next.voice_processing_enabled && (enabling_input || ducking_changed) {
            if let Some(engine) = self.device.engine.as_mut() {
                engine.set_advanced_ducking(next.advanced_ducking, next.ducking_level)?;
            }
        }

        // Step 15: voice-processing bypass and AGC toggles.
        if let Some(engine) = self.device.engine.as_mut() {
            if diff.prev.voice_processing_bypassed != next.voice_processing_bypassed {
                engine.set_voice_processing_bypassed(next.voice_processing_bypassed)?;
            }
            if diff.prev.voice_processing_agc_enabled != next.voice_processing_agc_enabled {
                engine.set_voice_processing_agc_enabled(next.voice_processing_agc_enabled)?;
            }
        }

        // Step 16: device selection (desktop only).
        if let Some(engine) = self.device.engine.as_mut() {
            if enabling_output {
                let device_id = if next.is_output_default_device() { None } else { Some(next.output_device_id) };
                engine.set_device(GraphSide::Output, device_id)?;
            }
            if enabling_input {
                let device_id = if next.is_input_default_device() { None } else { Some(next.input_device_id) };
                engine.set_device(GraphSide::Input, device_id)?;
            }
        }

        // Step 17/18: start playout/recording buffers.
        if next.is_output_enabled() && !self.buffer.is_playing() {
            self.buffer.reset_playout();
            self.buffer.start_playout()?;
            rollback.push(RollbackAction::StopPlayoutBuffer);
        }
        if next.is_input_enabled() && !self.buffer.is_recording() {
            self.buffer.reset_recording();
            self.buffer.start_recording()?;
            rollback.push(RollbackAction::StopRecordingBuffer);
        }

        // Step 19: start engine.
        if next.is_any_running() && (!was_running_before || diff.did_end_interruption() || restart_required || recreate_required) {
            let status = self.observer.on_engine_will_start(next.is_output_enabled(), next.is_input_enabled());
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillStart", status });
            }

            let engine = self.device.engine.as_mut().expect("device engine present when starting");
            engine.prepare()?;
            std::thread::sleep(self.config.desktop_prepare_settle);

            let mut last_err = None;
            let mut started = false;
            for attempt in 0..self.config.start_retry_attempts {
                match engine.start() {
                    Ok(()) => {
                        started = true;
                        break;
                    }
                    Err(err) => {
                        last_err = Some(err);
                        if attempt + 1 < self.config.start_retry_attempts {
                            std::thread::sleep(self.config.start_retry_delay);
                        }
                    }
                }
            }
            if !started {
                warn!("engine failed to start after {} attempts: {}", self.config.start_retry_attempts, engine.describe_graph());
                return Err(EngineError::Graph(last_err.unwrap_or(engine_graph::GraphError::StartFailed {
                    attempts: self.config.start_retry_attempts,
                    reason: "unknown".into(),
                })));
            }

            if let Some(sender) = self.reconfigure_sender.clone() {
                engine.register_configuration_change_listener(Box::new(move || {
                    debug!("device engine reported a spontaneous configuration-change stop");
                    let _ = sender.send(crate::control::ControlTask::ReconfigureEngine);
                }));
            }
        }

        // Step 20: release engine object when no side enabled.
        if !next.is_any_enabled() && self.device.engine.is_some() {
            let status = self.observer.on_engine_will_release();
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillRelease", status });
            }
            self.device.engine = None;
            self.device.output_node = None;
            self.device.input_mixer = None;
            self.device.input_sink = None;
        }

        Ok(())
    }

    fn unwind_device_rollback(&mut self, rollback: Vec<RollbackAction>) {
        for action in rollback.into_iter().rev() {
            match action {
                RollbackAction::DropDeviceEngine => {
                    self.device.engine = None;
                    self.device.output_node = None;
                    self.device.input_mixer = None;
                    self.device.input_sink = None;
                }
                RollbackAction::DisconnectOutput(node) => {
                    if let Some(engine) = self.device.engine.as_mut() {
                        let _ = engine.disconnect_output(node);
                    }
                    self.device.output_node = None;
                }
                RollbackAction::DisconnectInput { mixer, sink } => {
                    if let Some(engine) = self.device.engine.as_mut() {
                        let _ = engine.disconnect_input(mixer, sink);
                    }
                    self.device.input_mixer = None;
                    self.device.input_sink = None;
                }
                RollbackAction::StopPlayoutBuffer => {
                    let _ = self.buffer.stop_playout();
                }
                RollbackAction::StopRecordingBuffer => {
                    let _ = self.buffer.stop_recording();
                }
                RollbackAction::StartPlayoutBuffer => {
                    let _ = self.buffer.start_playout();
                }
                RollbackAction::StartRecordingBuffer => {
                    let _ = self.buffer.start_recording();
                }
            }
        }
    }
}
