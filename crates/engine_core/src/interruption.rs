//! Interruption adapter (§4.6)
//!
//! Receives begin/end events from the OS audio session and posts a
//! `ModifyEngineState` toggling `is_interrupted`. The diff predicates
//! `DidBeginInterruption`/`DidEndInterruption` drive the engine stop/start
//! steps in the device-mode applier.

use std::sync::Arc;

use engine_graph::PlatformCapabilities;

use crate::control::ControlTask;

pub struct InterruptionAdapter {
    _capabilities: Arc<dyn PlatformCapabilities>,
}

impl InterruptionAdapter {
    pub fn new(capabilities: Arc<dyn PlatformCapabilities>, sender: crossbeam_channel::Sender<ControlTask>) -> Self {
        if capabilities.supports_interruptions() {
            capabilities.listen_interruptions(Box::new(move |began| {
                // §9 open question: the source reads a `should_resume`
                // argument on the end event and ignores it. There is no
                // richer payload at this boundary than begin/end, so that
                // behaviour is preserved by construction: only `began` is
                // ever observed here.
                let _ = sender.send(ControlTask::Interruption { began });
            }));
        }
        Self { _capabilities: capabilities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_graph::ManualCapabilities;
    use std::time::Duration;

    #[test]
    fn test_interruption_begin_and_end_post_tasks() {
        let manual = Arc::new(ManualCapabilities::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let capabilities: Arc<dyn PlatformCapabilities> = manual.clone();
        let _adapter = InterruptionAdapter::new(capabilities, tx);

        manual.trigger_interruption(true);
        manual.trigger_interruption(false);

        let first = rx.recv_timeout(Duration::from_millis(50)).unwrap();
        assert!(matches!(first, ControlTask::Interruption { began: true }));
        let second = rx.recv_timeout(Duration::from_millis(50)).unwrap();
        assert!(matches!(second, ControlTask::Interruption { began: false }));
    }
}
