//! Device-change watcher (desktop only, §4.5)
//!
//! Subscribes to the platform's device-list/default-device notifications
//! and turns them into posted control-thread tasks. Default-device events
//! are debounced: each new event bumps an epoch counter and schedules a
//! task after the configured debounce window; if another event arrives
//! before that window elapses, the stale task's epoch no longer matches
//! and it no-ops (§9's "SetNotAlive + replace" pattern, reworked around a
//! plain atomic epoch since there's no exceptions-based cancellation here).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use engine_graph::PlatformCapabilities;

use crate::control::ControlTask;

pub struct DeviceChangeWatcher {
    _capabilities: Arc<dyn PlatformCapabilities>,
}

impl DeviceChangeWatcher {
    /// Registers the three listeners described in §4.5. Returns a watcher
    /// whose drop has no special behavior — listener lifetime is tied to
    /// `capabilities` itself, which the caller keeps alive for the engine's
    /// lifetime per §3.3 ("registered for the process lifetime of the
    /// engine object on desktop platforms only").
    pub fn new(
        capabilities: Arc<dyn PlatformCapabilities>,
        sender: crossbeam_channel::Sender<ControlTask>,
        debounce: Duration,
    ) -> Self {
        if !capabilities.supports_device_watch() {
            return Self { _capabilities: capabilities };
        }

        let device_list_sender = sender.clone();
        capabilities.listen_device_list_changed(Box::new(move || {
            let _ = device_list_sender.send(ControlTask::DevicesChanged);
        }));

        let output_epoch = Arc::new(AtomicU64::new(0));
        let output_sender = sender.clone();
        let output_epoch_listen = Arc::clone(&output_epoch);
        capabilities.listen_default_output_changed(Box::new(move || {
            schedule_debounced(
                Arc::clone(&output_epoch_listen),
                output_sender.clone(),
                debounce,
                ControlTask::DefaultOutputDeviceChanged,
            );
        }));

        let input_epoch = Arc::new(AtomicU64::new(0));
        let input_sender = sender.clone();
        let input_epoch_listen = Arc::clone(&input_epoch);
        capabilities.listen_default_input_changed(Box::new(move || {
            schedule_debounced(
                Arc::clone(&input_epoch_listen),
                input_sender.clone(),
                debounce,
                ControlTask::DefaultInputDeviceChanged,
            );
        }));

        Self { _capabilities: capabilities }
    }
}

fn schedule_debounced(epoch: Arc<AtomicU64>, sender: crossbeam_channel::Sender<ControlTask>, debounce: Duration, task: ControlTask) {
    let my_epoch = epoch.fetch_add(1, Ordering::SeqCst) + 1;
    std::thread::spawn(move || {
        std::thread::sleep(debounce);
        if epoch.load(Ordering::SeqCst) == my_epoch {
            let _ = sender.send(task);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_graph::ManualCapabilities;
    use std::time::Duration;

    #[test]
    fn test_debounce_collapses_rapid_events_to_one_task() {
        let manual = Arc::new(ManualCapabilities::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let capabilities: Arc<dyn PlatformCapabilities> = manual.clone();
        let _watcher = DeviceChangeWatcher::new(capabilities, tx, Duration::from_millis(30));

        // Three events within the debounce window (§8 property 8).
        manual.trigger_default_output_changed();
        manual.trigger_default_output_changed();
        manual.trigger_default_output_changed();

        let first = rx.recv_timeout(Duration::from_millis(200));
        assert!(matches!(first, Ok(ControlTask::DefaultOutputDeviceChanged)));
        let second = rx.recv_timeout(Duration::from_millis(50));
        assert!(second.is_err(), "expected exactly one debounced task, got a second");
    }

    #[test]
    fn test_device_list_changed_is_not_debounced() {
        let manual = Arc::new(ManualCapabilities::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let capabilities: Arc<dyn PlatformCapabilities> = manual.clone();
        let _watcher = DeviceChangeWatcher::new(capabilities, tx, Duration::from_millis(30));

        manual.trigger_device_list_changed();
        manual.trigger_device_list_changed();

        let first = rx.recv_timeout(Duration::from_millis(50));
        assert!(matches!(first, Ok(ControlTask::DevicesChanged)));
        let second = rx.recv_timeout(Duration::from_millis(50));
        assert!(matches!(second, Ok(ControlTask::DevicesChanged)));
    }
}
