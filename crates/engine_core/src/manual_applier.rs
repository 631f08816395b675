//! Manual-mode applier (§4.3)
//!
//! Simpler than the device-mode applier: there is no hardware device to
//! negotiate with, so the whole pipeline runs against the fixed Int16,
//! 48kHz, mono format from [`crate::config`]. Like the device applier, a
//! rollback stack of compensating actions is built up as steps succeed and
//! unwound in reverse on the first failure, so a rejected transition never
//! leaves a buffer started without a matching stop or vice versa (§8
//! property 4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::core::EngineCore;
use crate::diff::EngineStateUpdate;
use crate::error::{EngineError, EngineResult};
use crate::render_loop;

/// Compensating action pushed as each step below succeeds; popped and
/// executed in reverse by [`EngineCore::unwind_manual_rollback`] on
/// failure. Mirrors `device_applier::RollbackAction`.
enum RollbackAction {
    DropManualEngine,
    StopPlayoutBuffer,
    StopRecordingBuffer,
    StartPlayoutBuffer,
    StartRecordingBuffer,
    StopRenderLoop,
}

impl EngineCore {
    pub(crate) fn apply_manual_diff(&mut self, diff: &EngineStateUpdate) -> EngineResult<()> {
        let mut rollback: Vec<RollbackAction> = Vec::new();
        match self.run_manual_steps(diff, &mut rollback) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.unwind_manual_rollback(rollback);
                Err(err)
            }
        }
    }

    fn run_manual_steps(&mut self, diff: &EngineStateUpdate, rollback: &mut Vec<RollbackAction>) -> EngineResult<()> {
        let next = diff.next;
        let was_any_running = self.manual.render_quit.is_some();

        // Step 1: any-running -> none-running teardown.
        if was_any_running && !next.is_any_running() {
            self.stop_render_loop();
            if let Some(engine) = self.manual.engine.as_ref() {
                engine.lock().stop();
            }
            let status = self.observer.on_engine_did_stop(next.is_output_enabled(), next.is_input_enabled());
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineDidStop", status });
            }
        }

        // Step 2: none-enabled -> any-enabled creates the manual engine.
        if next.is_any_enabled() && self.manual.engine.is_none() {
            let format = self.config.manual_render_format.to_audio_format();
            let engine = self.graph_factory.create_manual_engine(format, self.config.manual_max_frames)?;
            self.manual.engine = Some(Arc::new(parking_lot::Mutex::new(engine)));
            rollback.push(RollbackAction::DropManualEngine);
            let status = self.observer.on_engine_did_create();
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineDidCreate", status });
            }
        }

        // Step 3: stop buffers if sides disabled.
        if !next.is_output_enabled() && self.buffer.is_playing() {
            self.buffer.stop_playout()?;
            rollback.push(RollbackAction::StartPlayoutBuffer);
        }
        if !next.is_input_enabled() && self.buffer.is_recording() {
            self.buffer.stop_recording()?;
            rollback.push(RollbackAction::StartRecordingBuffer);
        }

        // Step 4: OnEngineWillEnable.
        if diff.did_any_enable() {
            let status = self.observer.on_engine_will_enable(next.is_output_enabled(), next.is_input_enabled());
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillEnable", status });
            }
        }

        // Step 5: enable output — configure buffer formats, reset chunker.
        if diff.did_enable_output() {
            let format = self.config.manual_render_format.to_audio_format();
            self.buffer.set_playout_format(format);
            self.buffer.reset_playout();
        }

        // Step 6: enable input — configure buffer formats, reset chunker,
        // fire OnEngineWillConnectInput with the fixed format (no real
        // source/mixer nodes exist in manual mode).
        if diff.did_enable_input() {
            let format = self.config.manual_render_format.to_audio_format();
            self.buffer.set_recording_format(format);
            self.buffer.reset_recording();
            let status = self.observer.on_engine_will_connect_input(crate::observer::ConnectionContext {
                sample_rate: format.sample_rate,
                channels: format.channels,
            });
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillConnectInput", status });
            }
        }

        // Step 7: OnEngineDidDisable for any side newly disabled.
        if diff.did_any_disable() {
            let status = self.observer.on_engine_did_disable(next.is_output_enabled(), next.is_input_enabled());
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineDidDisable", status });
            }
        }

        // Step 8: start buffers.
        if next.is_output_enabled() && !self.buffer.is_playing() {
            self.buffer.start_playout()?;
            rollback.push(RollbackAction::StopPlayoutBuffer);
        }
        if next.is_input_enabled() && !self.buffer.is_recording() {
            self.buffer.start_recording()?;
            rollback.push(RollbackAction::StopRecordingBuffer);
        }

        // Step 9: none-running -> any-running starts the engine and spawns
        // the render thread.
        if !was_any_running && next.is_any_running() {
            let status = self.observer.on_engine_will_start(next.is_output_enabled(), next.is_input_enabled());
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillStart", status });
            }
            if let Some(engine) = self.manual.engine.as_ref() {
                engine.lock().start()?;
            }
            self.spawn_render_loop();
            rollback.push(RollbackAction::StopRenderLoop);
        }

        // Step 10: release engine object if no side enabled.
        if !next.is_any_enabled() && self.manual.engine.is_some() {
            let status = self.observer.on_engine_will_release();
            if status != 0 {
                return Err(EngineError::ObserverRejected { hook: "OnEngineWillRelease", status });
            }
            self.manual.engine = None;
        }

        Ok(())
    }

    fn unwind_manual_rollback(&mut self, rollback: Vec<RollbackAction>) {
        for action in rollback.into_iter().rev() {
            match action {
                RollbackAction::DropManualEngine => {
                    self.manual.engine = None;
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
                RollbackAction::StopRenderLoop => {
                    self.stop_render_loop();
                }
            }
        }
    }

    fn spawn_render_loop(&mut self) {
        let quit = Arc::new(AtomicBool::new(false));
        let Some(engine) = self.manual.engine.clone() else { return };
        let buffer = self.buffer.clone();
        let format = self.config.manual_render_format.to_audio_format();
        let quit_clone = Arc::clone(&quit);

        let handle = render_loop::spawn(engine, buffer, format, quit_clone);
        self.manual.render_quit = Some(quit);
        self.manual.render_thread = Some(handle);
    }

    fn stop_render_loop(&mut self) {
        if let Some(quit) = self.manual.render_quit.take() {
            quit.store(true, Ordering::SeqCst);
        }
        if let Some(handle) = self.manual.render_thread.take() {
            let _ = handle.join();
        }
        debug!("manual render loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_support::new_test_core;
    use crate::state::EngineState;

    #[test]
    fn test_enable_input_creates_engine_and_starts_recording() {
        let mut core = new_test_core();
        let prev = EngineState { render_mode: crate::state::RenderMode::Manual, ..EngineState::default() };
        let next = EngineState { input_enabled: true, input_running: true, ..prev };
        let diff = EngineStateUpdate::new(prev, next);
        core.apply_manual_diff(&diff).unwrap();
        assert!(core.manual.engine.is_some());
        assert!(core.buffer.is_recording());
        assert!(core.manual.render_quit.is_some());
    }

    #[test]
    fn test_enable_then_disable_releases_engine_and_stops_render_loop() {
        let mut core = new_test_core();
        let off = EngineState { render_mode: crate::state::RenderMode::Manual, ..EngineState::default() };
        let on = EngineState { input_enabled: true, input_running: true, ..off };
        core.apply_manual_diff(&EngineStateUpdate::new(off, on)).unwrap();
        core.apply_manual_diff(&EngineStateUpdate::new(on, off)).unwrap();
        assert!(core.manual.engine.is_none());
        assert!(!core.buffer.is_recording());
        assert!(core.manual.render_quit.is_none());
    }

    #[test]
    fn test_rollback_on_will_start_rejection_stops_recording_buffer() {
        use crate::observer::EngineObserver;
        struct RejectingObserver;
        impl EngineObserver for RejectingObserver {
            fn on_engine_will_start(&self, _po: bool, _ro: bool) -> i32 {
                -42
            }
        }

        let mut core = new_test_core();
        core.observer = std::sync::Arc::new(RejectingObserver);
        let prev = EngineState { render_mode: crate::state::RenderMode::Manual, ..EngineState::default() };
        let next = EngineState { input_enabled: true, input_running: true, ..prev };
        let diff = EngineStateUpdate::new(prev, next);

        let result = core.apply_manual_diff(&diff);
        assert!(result.is_err());
        // §8 property 4 / §3.1 invariant: the rejected `OnEngineWillStart`
        // must not leave the recording buffer started while the committed
        // state (still `prev` at the `control::modify_engine_state` level)
        // has input disabled.
        assert!(!core.buffer.is_recording());
        assert!(core.manual.render_quit.is_none());
        // The engine object itself was created in this same transition
        // (step 2), so it rolls back too.
        assert!(core.manual.engine.is_none());
    }

    #[test]
    fn test_rollback_on_will_enable_rejection_leaves_buffers_untouched() {
        use crate::observer::EngineObserver;
        struct RejectingObserver;
        impl EngineObserver for RejectingObserver {
            fn on_engine_will_enable(&self, _po: bool, _ro: bool) -> i32 {
                -7
            }
        }

        let mut core = new_test_core();
        core.observer = std::sync::Arc::new(RejectingObserver);
        let prev = EngineState { render_mode: crate::state::RenderMode::Manual, ..EngineState::default() };
        let next = EngineState { output_enabled: true, output_running: true, ..prev };
        let diff = EngineStateUpdate::new(prev, next);

        let result = core.apply_manual_diff(&diff);
        assert!(result.is_err());
        assert!(!core.buffer.is_playing());
        // The manual engine was created before the rejected hook fires
        // (step 2 precedes step 4); rollback must still drop it.
        assert!(core.manual.engine.is_none());
    }
}
