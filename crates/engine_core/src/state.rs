//! Engine state value type and derived predicates (§3.1)
//!
//! `EngineState` is a plain, copyable, equality-comparable record of every
//! externally settable knob. Derived predicates are computed fresh from
//! the fields on every call — never cached — so that a predicate can never
//! drift out of sync with the fields it's derived from.

use engine_graph::DEFAULT_DEVICE_ID;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderMode {
    Device,
    Manual,
}

impl Default for RenderMode {
    fn default() -> Self {
        RenderMode::Device
    }
}

/// The mechanism by which `input_muted` takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MuteMode {
    /// Flag on the voice-processing node; engine keeps running.
    VoiceProcessing,
    /// Full engine teardown/rebuild of the input side while muted.
    RestartEngine,
    /// Zero-gain on the input mixer; engine keeps running.
    InputMixer,
}

impl Default for MuteMode {
    fn default() -> Self {
        MuteMode::VoiceProcessing
    }
}

/// Plain-data record of every externally settable knob (§3.1). Compared for
/// equality to detect no-op updates (§4.1 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineState {
    pub input_enabled: bool,
    pub input_running: bool,
    pub output_enabled: bool,
    pub output_running: bool,

    /// When true and voice processing is on, enabling input implicitly
    /// forces the output-enabled predicate on too (the platform ties
    /// them).
    pub input_follow_mode: bool,

    /// Keep the input graph initialised across stop/start cycles.
    pub input_enabled_persistent_mode: bool,

    pub input_muted: bool,
    pub is_interrupted: bool,

    pub render_mode: RenderMode,
    pub mute_mode: MuteMode,

    pub voice_processing_enabled: bool,
    pub voice_processing_bypassed: bool,
    pub voice_processing_agc_enabled: bool,

    pub advanced_ducking: bool,
    pub ducking_level: i32,

    /// Opaque integer; sentinel `DEFAULT_DEVICE_ID` means "default device".
    pub output_device_id: u32,
    pub input_device_id: u32,

    /// Monotonically increasing; bumped whenever the OS reports the
    /// system-default output device has changed.
    pub default_output_device_update_count: u64,
    pub default_input_device_update_count: u64,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            input_enabled: false,
            input_running: false,
            output_enabled: false,
            output_running: false,
            input_follow_mode: true,
            input_enabled_persistent_mode: false,
            input_muted: false,
            is_interrupted: false,
            render_mode: RenderMode::default(),
            mute_mode: MuteMode::default(),
            voice_processing_enabled: false,
            voice_processing_bypassed: false,
            voice_processing_agc_enabled: false,
            advanced_ducking: false,
            ducking_level: 0,
            output_device_id: DEFAULT_DEVICE_ID,
            input_device_id: DEFAULT_DEVICE_ID,
            default_output_device_update_count: 0,
            default_input_device_update_count: 0,
        }
    }
}

impl EngineState {
    pub fn is_output_input_linked(&self) -> bool {
        self.input_follow_mode && self.voice_processing_enabled
    }

    pub fn is_output_enabled(&self) -> bool {
        if self.is_output_input_linked() {
            self.is_input_enabled() || self.output_enabled
        } else {
            self.output_enabled
        }
    }

    /// `mute_mode = RestartEngine` with `input_muted` folds input-enabled
    /// to false: the engine is physically torn down by the applier rather
    /// than muted in place (§4.2 step 13).
    pub fn is_input_enabled(&self) -> bool {
        !(self.mute_mode == MuteMode::RestartEngine && self.input_muted)
            && (self.input_enabled || self.input_enabled_persistent_mode)
    }

    pub fn is_input_running(&self) -> bool {
        !(self.mute_mode == MuteMode::RestartEngine && self.input_muted) && self.input_running
    }

    pub fn is_output_running(&self) -> bool {
        if self.is_output_input_linked() {
            self.is_input_running() || self.output_running
        } else {
            self.output_running
        }
    }

    pub fn is_any_enabled(&self) -> bool {
        self.is_output_enabled() || self.is_input_enabled()
    }

    pub fn is_any_running(&self) -> bool {
        self.is_output_running() || self.is_input_running()
    }

    pub fn is_all_enabled(&self) -> bool {
        self.is_output_enabled() && self.is_input_enabled()
    }

    pub fn is_all_running(&self) -> bool {
        self.is_output_running() && self.is_input_running()
    }

    pub fn is_output_default_device(&self) -> bool {
        self.output_device_id == DEFAULT_DEVICE_ID
    }

    pub fn is_input_default_device(&self) -> bool {
        self.input_device_id == DEFAULT_DEVICE_ID
    }

    /// §3.1 invariant: `input_running ⇒ input_enabled` (and symmetrically
    /// for output). Violations must be rejected before mutation.
    pub fn satisfies_running_implies_enabled(&self) -> bool {
        (!self.input_running || self.input_enabled) && (!self.output_running || self.output_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_has_nothing_enabled() {
        let state = EngineState::default();
        assert!(!state.is_any_enabled());
        assert!(!state.is_any_running());
        assert!(state.is_output_default_device());
        assert!(state.is_input_default_device());
    }

    #[test]
    fn test_input_follow_mode_links_output_when_vp_on() {
        let state = EngineState {
            input_enabled: true,
            voice_processing_enabled: true,
            input_follow_mode: true,
            ..EngineState::default()
        };
        assert!(state.is_output_input_linked());
        assert!(state.is_output_enabled());
        // output_enabled itself remains false per §4.2 tie-break notes.
        assert!(!state.output_enabled);
    }

    #[test]
    fn test_follow_mode_does_not_link_without_vp() {
        let state = EngineState {
            input_enabled: true,
            voice_processing_enabled: false,
            input_follow_mode: true,
            ..EngineState::default()
        };
        assert!(!state.is_output_input_linked());
        assert!(!state.is_output_enabled());
    }

    #[test]
    fn test_restart_engine_mute_folds_input_enabled_false() {
        let state = EngineState {
            input_enabled: true,
            input_running: true,
            mute_mode: MuteMode::RestartEngine,
            input_muted: true,
            ..EngineState::default()
        };
        assert!(!state.is_input_enabled());
        assert!(!state.is_input_running());
    }

    #[test]
    fn test_voice_processing_mute_mode_does_not_fold_enabled() {
        let state = EngineState {
            input_enabled: true,
            input_running: true,
            mute_mode: MuteMode::VoiceProcessing,
            input_muted: true,
            ..EngineState::default()
        };
        assert!(state.is_input_enabled());
        assert!(state.is_input_running());
    }

    #[test]
    fn test_running_implies_enabled_invariant() {
        let valid = EngineState { input_enabled: true, input_running: true, ..EngineState::default() };
        assert!(valid.satisfies_running_implies_enabled());

        let invalid = EngineState { input_enabled: false, input_running: true, ..EngineState::default() };
        assert!(!invalid.satisfies_running_implies_enabled());
    }

    #[test]
    fn test_all_enabled_all_running() {
        let state = EngineState {
            input_enabled: true,
            input_running: true,
            output_enabled: true,
            output_running: true,
            ..EngineState::default()
        };
        assert!(state.is_all_enabled());
        assert!(state.is_all_running());
    }

    #[test]
    fn test_equality_detects_nochange() {
        let a = EngineState::default();
        let b = EngineState::default();
        assert_eq!(a, b);
    }
}
