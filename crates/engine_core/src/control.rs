//! Control thread and public surface (§4.1, §5, §6)
//!
//! `Engine` owns an `EngineCore` on a single dedicated OS thread — the
//! "control thread" §5 requires all state reads/writes and all graph edits
//! to happen on. Everything else (OS device-change notifications,
//! interruption begin/end, a spontaneous engine stop) arrives on an
//! arbitrary thread and is turned into a `ControlTask` posted through a
//! `crossbeam_channel`, mirroring the command-channel shape
//! `gecko_core::engine::AudioEngine` uses to keep its audio thread free of
//! UI-thread calls.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, warn};

use engine_graph::{DeviceKind, GraphFactory, PlatformCapabilities, SharedAudioDeviceBuffer, DEFAULT_DEVICE_ID};

use crate::config::EngineConfig;
use crate::core::EngineCore;
use crate::device_watcher::DeviceChangeWatcher;
use crate::diff::EngineStateUpdate;
use crate::error::{EngineError, EngineResult};
use crate::interruption::InterruptionAdapter;
use crate::observer::EngineObserver;
use crate::state::EngineState;

/// A boxed state transform, the shape every public setter builds before
/// posting it to the control thread (§4.1: `ModifyEngineState(transform)`).
pub type StateTransform = Box<dyn FnOnce(EngineState) -> EngineState + Send>;

/// Work posted to the control thread. OS callbacks and render-thread
/// events never touch `EngineCore` directly — they construct one of these
/// and send it (§5: "must post a task to the control thread before
/// touching engine state").
pub enum ControlTask {
    Modify(StateTransform, Sender<i32>),
    GetState(Sender<EngineState>),
    DevicesChanged,
    DefaultOutputDeviceChanged,
    DefaultInputDeviceChanged,
    Interruption { began: bool },
    /// Posted by a device-mode engine's configuration-change listener when
    /// it stops spontaneously (§4.2 step 19): tear the committed state
    /// down to all-off, then re-apply it from scratch.
    ReconfigureEngine,
    Shutdown,
}

impl EngineCore {
    /// §4.1's state-transition driver. The sole place `self.state` is ever
    /// assigned.
    pub(crate) fn modify_engine_state<F>(&mut self, transform: F) -> EngineResult<()>
    where
        F: FnOnce(EngineState) -> EngineState,
    {
        let prev = self.state;
        let next = transform(prev);
        let diff = EngineStateUpdate::new(prev, next);

        if diff.has_no_changes() {
            return Ok(());
        }
        if !next.satisfies_running_implies_enabled() {
            return Err(EngineError::StateTransitionRejected(
                "running implies enabled violated".into(),
            ));
        }

        let result = if diff.did_enable_manual_rendering_mode() {
            // §4.1 step 4: shut the device side down cleanly first, then
            // start manual mode fresh, each applier seeing its own
            // from-default/to-default half of the transition.
            let default_state = EngineState::default();
            self.apply_device_diff(&EngineStateUpdate::new(prev, default_state))
                .and_then(|()| self.apply_manual_diff(&EngineStateUpdate::new(default_state, next)))
        } else if diff.did_enable_device_rendering_mode() {
            let default_state = EngineState::default();
            self.apply_manual_diff(&EngineStateUpdate::new(prev, default_state))
                .and_then(|()| self.apply_device_diff(&EngineStateUpdate::new(default_state, next)))
        } else {
            match next.render_mode {
                crate::state::RenderMode::Device => self.apply_device_diff(&diff),
                crate::state::RenderMode::Manual => self.apply_manual_diff(&diff),
            }
        };

        match result {
            Ok(()) => {
                self.state = next;
                self.assert_invariants();
                Ok(())
            }
            Err(err) => {
                // The applier's own rollback has already restored whatever
                // partial graph/buffer state it could; `self.state` stays
                // at `prev` since we never assigned `next`.
                Err(err)
            }
        }
    }

    /// §4.5: a device-list-changed event re-enumerates both sides and
    /// falls any now-missing selection back to "default".
    pub(crate) fn handle_devices_changed(&mut self) -> EngineResult<()> {
        let output_exists = self
            .device_enumerator
            .device_exists(DeviceKind::Output, self.state.output_device_id)
            .unwrap_or(true);
        let input_exists = self
            .device_enumerator
            .device_exists(DeviceKind::Input, self.state.input_device_id)
            .unwrap_or(true);

        if !output_exists || !input_exists {
            self.modify_engine_state(|prev| EngineState {
                output_device_id: if output_exists { prev.output_device_id } else { DEFAULT_DEVICE_ID },
                input_device_id: if input_exists { prev.input_device_id } else { DEFAULT_DEVICE_ID },
                ..prev
            })?;
        }
        self.observer.on_devices_updated();
        Ok(())
    }

    /// §4.2 step 19 / §5: the device engine stopped spontaneously. Snapshot
    /// the committed state, tear down to all-off, then re-apply it.
    pub(crate) fn handle_reconfigure(&mut self) -> EngineResult<()> {
        let committed = self.state;
        self.modify_engine_state(|_| EngineState::default())?;
        self.modify_engine_state(|_| committed)
    }
}

/// Public façade: owns the control thread, the device-change watcher, and
/// the interruption adapter. Every method posts a task and blocks on a
/// reply channel, matching §7's "every public setter returns an integer:
/// 0 = success, negative = error" contract.
pub struct Engine {
    sender: Sender<ControlTask>,
    thread: Option<std::thread::JoinHandle<()>>,
    /// Device enumeration (§6) is a read-only query against the host OS, not
    /// an `engine_state_` mutation, so it doesn't need to be serialized
    /// through the control thread the way every state change must be (§5).
    device_enumerator: Arc<dyn engine_graph::DeviceEnumerator>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        observer: Arc<dyn EngineObserver>,
        graph_factory: Arc<dyn GraphFactory>,
        buffer: SharedAudioDeviceBuffer,
        device_enumerator: Arc<dyn engine_graph::DeviceEnumerator>,
        capabilities: Arc<dyn PlatformCapabilities>,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let debounce = config.device_change_debounce;
        let device_enumerator_for_facade = Arc::clone(&device_enumerator);

        let mut core = EngineCore::new(config, observer, graph_factory, buffer, device_enumerator);
        core.reconfigure_sender = Some(sender.clone());

        let watcher_sender = sender.clone();
        let interruption_sender = sender.clone();
        let capabilities_for_watcher = Arc::clone(&capabilities);

        let thread = std::thread::Builder::new()
            .name("engine-control".into())
            .spawn(move || {
                // The watcher/adapter are constructed on the control thread
                // so their lifetime — and thus the platform listener
                // registrations they hold — matches the control thread's.
                let _watcher = DeviceChangeWatcher::new(capabilities_for_watcher, watcher_sender, debounce);
                let _interruption = InterruptionAdapter::new(capabilities, interruption_sender);
                run_control_loop(core, receiver);
            })
            .expect("failed to spawn control thread");

        Self { sender, thread: Some(thread), device_enumerator: device_enumerator_for_facade }
    }

    /// §4.1's `ModifyEngineState(transform)` itself, exposed publicly: every
    /// other setter on this type is a thin wrapper that builds its own
    /// transform and calls this. Lets a caller compose a multi-field update
    /// atomically (one diff, one applier pass) instead of round-tripping
    /// through several single-field setters.
    pub fn modify_engine_state<F>(&self, transform: F) -> i32
    where
        F: FnOnce(EngineState) -> EngineState + Send + 'static,
    {
        self.modify(transform)
    }

    fn modify<F>(&self, transform: F) -> i32
    where
        F: FnOnce(EngineState) -> EngineState + Send + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        if self.sender.send(ControlTask::Modify(Box::new(transform), reply_tx)).is_err() {
            return EngineError::ControlThreadGone.code();
        }
        match reply_rx.recv() {
            Ok(status) => status,
            Err(_) => EngineError::ChannelRecvError.code(),
        }
    }

    pub fn get_engine_state(&self) -> Option<EngineState> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.sender.send(ControlTask::GetState(reply_tx)).ok()?;
        reply_rx.recv().ok()
    }

    pub fn set_engine_state(&self, state: EngineState) -> i32 {
        self.modify(move |_| state)
    }

    pub fn init(&self) -> i32 {
        self.modify(|prev| prev)
    }

    pub fn terminate(&self) -> i32 {
        self.modify(|_| EngineState::default())
    }

    /// Initialises the output graph without starting it — distinct from
    /// `start_playout` (§6: `InitPlayout` vs `StartPlayout`). Under this
    /// state model "enabled" means the graph is initialised, so this sets
    /// `output_enabled` and leaves `output_running` false.
    pub fn init_playout(&self) -> i32 {
        self.modify(|prev| EngineState { output_enabled: true, ..prev })
    }

    pub fn start_playout(&self) -> i32 {
        self.modify(|prev| EngineState { output_enabled: true, output_running: true, ..prev })
    }

    pub fn stop_playout(&self) -> i32 {
        self.modify(|prev| EngineState { output_running: false, ..prev })
    }

    /// Initialises the input graph without starting it — distinct from
    /// `start_recording` (§6: `InitRecording` vs `StartRecording`). Sets
    /// `input_enabled` and leaves `input_running` false.
    pub fn init_recording(&self) -> i32 {
        self.modify(|prev| EngineState { input_enabled: true, ..prev })
    }

    pub fn start_recording(&self) -> i32 {
        self.modify(|prev| EngineState { input_enabled: true, input_running: true, ..prev })
    }

    pub fn stop_recording(&self) -> i32 {
        self.modify(|prev| EngineState { input_running: false, ..prev })
    }

    pub fn init_and_start_recording(&self) -> i32 {
        self.start_recording()
    }

    pub fn set_microphone_mute(&self, muted: bool) -> i32 {
        self.modify(move |prev| EngineState { input_muted: muted, ..prev })
    }

    pub fn set_manual_rendering_mode(&self, enabled: bool) -> i32 {
        self.modify(move |prev| EngineState {
            render_mode: if enabled { crate::state::RenderMode::Manual } else { crate::state::RenderMode::Device },
            ..prev
        })
    }

    pub fn set_voice_processing_enabled(&self, enabled: bool) -> i32 {
        self.modify(move |prev| EngineState { voice_processing_enabled: enabled, ..prev })
    }

    pub fn set_recording_device(&self, device_id: u32) -> i32 {
        self.modify(move |prev| EngineState { input_device_id: device_id, ..prev })
    }

    pub fn set_playout_device(&self, device_id: u32) -> i32 {
        self.modify(move |prev| EngineState { output_device_id: device_id, ..prev })
    }

    pub fn set_mute_mode(&self, mode: crate::state::MuteMode) -> i32 {
        self.modify(move |prev| EngineState { mute_mode: mode, ..prev })
    }

    pub fn set_input_follow_mode(&self, enabled: bool) -> i32 {
        self.modify(move |prev| EngineState { input_follow_mode: enabled, ..prev })
    }

    pub fn set_input_enabled_persistent_mode(&self, enabled: bool) -> i32 {
        self.modify(move |prev| EngineState { input_enabled_persistent_mode: enabled, ..prev })
    }

    pub fn set_advanced_ducking(&self, enabled: bool, level: i32) -> i32 {
        self.modify(move |prev| EngineState { advanced_ducking: enabled, ducking_level: level, ..prev })
    }

    pub fn set_voice_processing_bypassed(&self, bypassed: bool) -> i32 {
        self.modify(move |prev| EngineState { voice_processing_bypassed: bypassed, ..prev })
    }

    pub fn set_voice_processing_agc_enabled(&self, enabled: bool) -> i32 {
        self.modify(move |prev| EngineState { voice_processing_agc_enabled: enabled, ..prev })
    }

    pub fn set_is_interrupted(&self, interrupted: bool) -> i32 {
        self.modify(move |prev| EngineState { is_interrupted: interrupted, ..prev })
    }

    pub fn is_engine_running(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.is_any_running())
    }

    // One getter per §3.1 field, on top of `get_engine_state`'s full
    // snapshot — matches §6's "one setter and getter per state field
    // documented in §3.1".
    pub fn is_input_enabled(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.input_enabled)
    }

    pub fn is_output_enabled(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.output_enabled)
    }

    pub fn is_input_muted(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.input_muted)
    }

    pub fn is_interrupted(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.is_interrupted)
    }

    pub fn render_mode(&self) -> Option<crate::state::RenderMode> {
        self.get_engine_state().map(|s| s.render_mode)
    }

    pub fn mute_mode(&self) -> Option<crate::state::MuteMode> {
        self.get_engine_state().map(|s| s.mute_mode)
    }

    pub fn voice_processing_enabled(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.voice_processing_enabled)
    }

    pub fn voice_processing_bypassed(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.voice_processing_bypassed)
    }

    pub fn voice_processing_agc_enabled(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.voice_processing_agc_enabled)
    }

    pub fn advanced_ducking(&self) -> bool {
        self.get_engine_state().is_some_and(|s| s.advanced_ducking)
    }

    pub fn ducking_level(&self) -> i32 {
        self.get_engine_state().map(|s| s.ducking_level).unwrap_or(0)
    }

    pub fn output_device_id(&self) -> u32 {
        self.get_engine_state().map(|s| s.output_device_id).unwrap_or(DEFAULT_DEVICE_ID)
    }

    pub fn input_device_id(&self) -> u32 {
        self.get_engine_state().map(|s| s.input_device_id).unwrap_or(DEFAULT_DEVICE_ID)
    }

    /// §6: "device enumeration calls that return a leading 'default' slot
    /// followed by concrete devices."
    pub fn list_output_devices(&self) -> Result<Vec<engine_graph::DeviceDescriptor>, engine_graph::GraphError> {
        self.device_enumerator.enumerate_with_default_slot(DeviceKind::Output)
    }

    pub fn list_input_devices(&self) -> Result<Vec<engine_graph::DeviceDescriptor>, engine_graph::GraphError> {
        self.device_enumerator.enumerate_with_default_slot(DeviceKind::Input)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.sender.send(ControlTask::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_control_loop(mut core: EngineCore, receiver: Receiver<ControlTask>) {
    for task in receiver.iter() {
        match task {
            ControlTask::Modify(transform, reply) => {
                let status = match core.modify_engine_state(transform) {
                    Ok(()) => 0,
                    Err(err) => {
                        warn!("state transition rejected: {err}");
                        err.code()
                    }
                };
                let _ = reply.send(status);
            }
            ControlTask::GetState(reply) => {
                let _ = reply.send(core.state());
            }
            ControlTask::DevicesChanged => {
                if let Err(err) = core.handle_devices_changed() {
                    error!("device-list-changed handling failed: {err}");
                }
            }
            ControlTask::DefaultOutputDeviceChanged => {
                let result = core.modify_engine_state(|prev| EngineState {
                    default_output_device_update_count: prev.default_output_device_update_count + 1,
                    ..prev
                });
                if let Err(err) = result {
                    error!("default output device change handling failed: {err}");
                }
            }
            ControlTask::DefaultInputDeviceChanged => {
                let result = core.modify_engine_state(|prev| EngineState {
                    default_input_device_update_count: prev.default_input_device_update_count + 1,
                    ..prev
                });
                if let Err(err) = result {
                    error!("default input device change handling failed: {err}");
                }
            }
            ControlTask::Interruption { began } => {
                let result = core.modify_engine_state(|prev| EngineState { is_interrupted: began, ..prev });
                if let Err(err) = result {
                    error!("interruption handling failed: {err}");
                }
            }
            ControlTask::ReconfigureEngine => {
                debug!("reconfiguring engine after spontaneous stop");
                if let Err(err) = core.handle_reconfigure() {
                    error!("engine reconfiguration failed: {err}");
                }
            }
            ControlTask::Shutdown => break,
        }
    }
}

/// Convenience constructor using the process-default platform capabilities
/// (§9: desktop poll-based watcher, no-op elsewhere) and a 500 ms poll
/// interval — matches `EngineConfig::default().device_change_debounce`'s
/// own magnitude.
pub fn spawn_with_default_capabilities(
    config: EngineConfig,
    observer: Arc<dyn EngineObserver>,
    graph_factory: Arc<dyn GraphFactory>,
    buffer: SharedAudioDeviceBuffer,
    device_enumerator: Arc<dyn engine_graph::DeviceEnumerator>,
) -> Engine {
    let capabilities = engine_graph::default_capabilities(Duration::from_millis(500));
    Engine::new(config, observer, graph_factory, buffer, device_enumerator, capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_graph::mock::MockGraphFactory;
    use engine_graph::{AudioFormat, ManualCapabilities, RingAudioDeviceBuffer, SampleKind};

    fn hardware_format() -> AudioFormat {
        AudioFormat { sample_rate: 48_000, channels: 1, sample_kind: SampleKind::Float32 }
    }

    struct EmptyEnumerator;
    impl engine_graph::DeviceEnumerator for EmptyEnumerator {
        fn enumerate(&self, _kind: DeviceKind) -> Result<Vec<engine_graph::DeviceDescriptor>, engine_graph::GraphError> {
            Ok(Vec::new())
        }
    }

    fn test_engine() -> (Engine, Arc<ManualCapabilities>) {
        let manual_capabilities = Arc::new(ManualCapabilities::new());
        let capabilities: Arc<dyn PlatformCapabilities> = manual_capabilities.clone();
        let engine = Engine::new(
            EngineConfig::fast_for_tests(),
            Arc::new(crate::observer::NullObserver),
            Arc::new(MockGraphFactory::new(hardware_format(), hardware_format())),
            Arc::new(RingAudioDeviceBuffer::new()),
            Arc::new(EmptyEnumerator),
            capabilities,
        );
        (engine, manual_capabilities)
    }

    #[test]
    fn test_start_playout_reports_success_and_running() {
        let (engine, _caps) = test_engine();
        assert_eq!(engine.start_playout(), 0);
        assert!(engine.is_engine_running());
    }

    #[test]
    fn test_stop_playout_then_terminate_is_idempotent() {
        let (engine, _caps) = test_engine();
        assert_eq!(engine.start_playout(), 0);
        assert_eq!(engine.stop_playout(), 0);
        assert!(!engine.is_engine_running());
        assert_eq!(engine.terminate(), 0);
    }

    #[test]
    fn test_init_playout_enables_without_running() {
        let (engine, _caps) = test_engine();
        assert_eq!(engine.init_playout(), 0);
        let state = engine.get_engine_state().unwrap();
        assert!(state.is_output_enabled());
        assert!(!state.is_output_running());
        assert!(!engine.is_engine_running());
    }

    #[test]
    fn test_init_recording_enables_without_running() {
        let (engine, _caps) = test_engine();
        assert_eq!(engine.init_recording(), 0);
        let state = engine.get_engine_state().unwrap();
        assert!(state.is_input_enabled());
        assert!(!state.is_input_running());
        assert!(!engine.is_engine_running());
    }

    #[test]
    fn test_manual_rendering_mode_switch_round_trips() {
        let (engine, _caps) = test_engine();
        assert_eq!(engine.start_recording(), 0);
        assert_eq!(engine.set_manual_rendering_mode(true), 0);
        let state = engine.get_engine_state().unwrap();
        assert_eq!(state.render_mode, crate::state::RenderMode::Manual);
        assert!(state.is_input_running());

        assert_eq!(engine.set_manual_rendering_mode(false), 0);
        let state = engine.get_engine_state().unwrap();
        assert_eq!(state.render_mode, crate::state::RenderMode::Device);
        assert!(state.is_input_running());
    }

    #[test]
    fn test_interruption_begin_stops_engine_without_disabling() {
        let (engine, caps) = test_engine();
        assert_eq!(engine.start_playout(), 0);

        caps.trigger_interruption(true);
        std::thread::sleep(Duration::from_millis(30));
        let state = engine.get_engine_state().unwrap();
        assert!(state.is_interrupted);
        assert!(state.output_enabled);

        caps.trigger_interruption(false);
        std::thread::sleep(Duration::from_millis(30));
        let state = engine.get_engine_state().unwrap();
        assert!(!state.is_interrupted);
    }

    #[test]
    fn test_set_microphone_mute_round_trips_status() {
        let (engine, _caps) = test_engine();
        assert_eq!(engine.start_recording(), 0);
        assert_eq!(engine.set_microphone_mute(true), 0);
        assert!(engine.get_engine_state().unwrap().input_muted);
    }

    #[test]
    fn test_per_field_getters_reflect_committed_state() {
        let (engine, _caps) = test_engine();
        assert_eq!(engine.set_advanced_ducking(true, 2), 0);
        assert_eq!(engine.set_voice_processing_bypassed(true), 0);
        assert_eq!(engine.set_voice_processing_agc_enabled(true), 0);
        assert_eq!(engine.set_mute_mode(crate::state::MuteMode::InputMixer), 0);

        assert!(engine.advanced_ducking());
        assert_eq!(engine.ducking_level(), 2);
        assert!(engine.voice_processing_bypassed());
        assert!(engine.voice_processing_agc_enabled());
        assert_eq!(engine.mute_mode(), Some(crate::state::MuteMode::InputMixer));
        assert_eq!(engine.output_device_id(), DEFAULT_DEVICE_ID);
        assert_eq!(engine.input_device_id(), DEFAULT_DEVICE_ID);
        assert!(!engine.is_input_enabled());
        assert!(!engine.is_output_enabled());
    }

    #[test]
    fn test_generic_modify_engine_state_composes_fields_atomically() {
        let (engine, _caps) = test_engine();
        let status = engine.modify_engine_state(|prev| EngineState {
            output_enabled: true,
            output_running: true,
            input_enabled: true,
            input_running: true,
            ..prev
        });
        assert_eq!(status, 0);
        let state = engine.get_engine_state().unwrap();
        assert!(state.is_all_enabled());
        assert!(state.is_all_running());
    }

    #[test]
    fn test_list_devices_prepends_default_slot() {
        let (engine, _caps) = test_engine();
        let outputs = engine.list_output_devices().unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].id, DEFAULT_DEVICE_ID);
        let inputs = engine.list_input_devices().unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].id, DEFAULT_DEVICE_ID);
    }
}
