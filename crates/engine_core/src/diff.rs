//! State diff and its classifying predicates (§3.2)

use crate::state::{EngineState, RenderMode};

/// A pair `{prev, next}` exposing the predicates the appliers dispatch on.
/// Recomputed fresh from the two states; never cached, never mutated.
#[derive(Debug, Clone, Copy)]
pub struct EngineStateUpdate {
    pub prev: EngineState,
    pub next: EngineState,
}

impl EngineStateUpdate {
    pub fn new(prev: EngineState, next: EngineState) -> Self {
        Self { prev, next }
    }

    pub fn has_no_changes(&self) -> bool {
        self.prev == self.next
    }

    pub fn did_enable_output(&self) -> bool {
        !self.prev.is_output_enabled() && self.next.is_output_enabled()
    }

    pub fn did_enable_input(&self) -> bool {
        !self.prev.is_input_enabled() && self.next.is_input_enabled()
    }

    pub fn did_disable_output(&self) -> bool {
        self.prev.is_output_enabled() && !self.next.is_output_enabled()
    }

    pub fn did_disable_input(&self) -> bool {
        self.prev.is_input_enabled() && !self.next.is_input_enabled()
    }

    pub fn did_any_enable(&self) -> bool {
        self.did_enable_output() || self.did_enable_input()
    }

    pub fn did_any_disable(&self) -> bool {
        self.did_disable_output() || self.did_disable_input()
    }

    pub fn did_begin_interruption(&self) -> bool {
        !self.prev.is_interrupted && self.next.is_interrupted
    }

    pub fn did_end_interruption(&self) -> bool {
        self.prev.is_interrupted && !self.next.is_interrupted
    }

    /// Any change whose effect requires re-wiring the node graph: device
    /// selection or voice-processing on/off.
    pub fn did_update_audio_graph(&self) -> bool {
        self.did_update_output_device() || self.did_update_input_device() || self.did_update_voice_processing_enabled()
    }

    pub fn did_update_voice_processing_enabled(&self) -> bool {
        self.prev.voice_processing_enabled != self.next.voice_processing_enabled
    }

    pub fn did_update_output_device(&self) -> bool {
        self.prev.output_device_id != self.next.output_device_id
    }

    pub fn did_update_input_device(&self) -> bool {
        self.prev.input_device_id != self.next.input_device_id
    }

    pub fn did_update_default_output_device(&self) -> bool {
        self.prev.default_output_device_update_count != self.next.default_output_device_update_count
    }

    pub fn did_update_default_input_device(&self) -> bool {
        self.prev.default_input_device_update_count != self.next.default_input_device_update_count
    }

    pub fn did_update_mute_mode(&self) -> bool {
        self.prev.mute_mode != self.next.mute_mode
    }

    /// §3.2: engine must be stopped, graph re-wired, engine restarted, same
    /// engine object.
    pub fn is_engine_restart_required(&self) -> bool {
        self.did_update_audio_graph()
    }

    /// §3.2: engine object must be discarded and rebuilt. Triggered by any
    /// of: device changed, *default* device changed while the selected
    /// device is the default, or "output+input enabled" → "output only"
    /// (the platform node graph cannot reliably drop input-side nodes
    /// in-place).
    pub fn is_engine_recreate_required(&self) -> bool {
        if self.did_update_output_device() || self.did_update_input_device() {
            return true;
        }
        if self.next.is_output_default_device() && self.did_update_default_output_device() {
            return true;
        }
        if self.next.is_input_default_device() && self.did_update_default_input_device() {
            return true;
        }
        let prev_all = self.prev.is_all_enabled();
        let next_output_only = self.next.is_output_enabled() && !self.next.is_input_enabled();
        if prev_all && next_output_only {
            return true;
        }
        false
    }

    pub fn did_enable_manual_rendering_mode(&self) -> bool {
        self.prev.render_mode != RenderMode::Manual && self.next.render_mode == RenderMode::Manual
    }

    pub fn did_enable_device_rendering_mode(&self) -> bool {
        self.prev.render_mode != RenderMode::Device && self.next.render_mode == RenderMode::Device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MuteMode;

    #[test]
    fn test_no_changes_detected() {
        let state = EngineState::default();
        let diff = EngineStateUpdate::new(state, state);
        assert!(diff.has_no_changes());
        assert!(!diff.did_any_enable());
    }

    #[test]
    fn test_enable_input_detected() {
        let prev = EngineState::default();
        let next = EngineState { input_enabled: true, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        assert!(diff.did_enable_input());
        assert!(diff.did_any_enable());
        assert!(!diff.did_enable_output());
    }

    #[test]
    fn test_interruption_predicates() {
        let prev = EngineState::default();
        let next = EngineState { is_interrupted: true, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        assert!(diff.did_begin_interruption());
        assert!(!diff.did_end_interruption());

        let back = EngineStateUpdate::new(next, prev);
        assert!(back.did_end_interruption());
    }

    #[test]
    fn test_voice_processing_change_requires_restart_not_recreate() {
        let prev = EngineState { input_enabled: true, ..EngineState::default() };
        let next = EngineState { voice_processing_enabled: true, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        assert!(diff.is_engine_restart_required());
        assert!(!diff.is_engine_recreate_required());
    }

    #[test]
    fn test_device_change_requires_recreate() {
        let prev = EngineState { input_enabled: true, ..EngineState::default() };
        let next = EngineState { input_device_id: 7, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        assert!(diff.is_engine_recreate_required());
    }

    #[test]
    fn test_default_device_counter_bump_recreates_only_when_selection_is_default() {
        let prev = EngineState { input_enabled: true, output_enabled: true, ..EngineState::default() };
        let next = EngineState { default_output_device_update_count: 1, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        assert!(diff.is_engine_recreate_required());

        let prev_explicit = EngineState { output_device_id: 3, ..prev };
        let next_explicit = EngineState { default_output_device_update_count: 1, ..prev_explicit };
        let diff_explicit = EngineStateUpdate::new(prev_explicit, next_explicit);
        assert!(!diff_explicit.is_engine_recreate_required());
    }

    #[test]
    fn test_all_enabled_to_output_only_requires_recreate() {
        let prev = EngineState { input_enabled: true, output_enabled: true, ..EngineState::default() };
        let next = EngineState { input_enabled: false, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        assert!(diff.is_engine_recreate_required());
    }

    #[test]
    fn test_render_mode_switch_predicates() {
        let prev = EngineState::default();
        let next = EngineState { render_mode: crate::state::RenderMode::Manual, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        assert!(diff.did_enable_manual_rendering_mode());
        assert!(!diff.did_enable_device_rendering_mode());
    }

    #[test]
    fn test_mute_mode_update_detected() {
        let prev = EngineState::default();
        let next = EngineState { mute_mode: MuteMode::RestartEngine, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        assert!(diff.did_update_mute_mode());
    }
}
