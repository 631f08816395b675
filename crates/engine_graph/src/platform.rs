//! Platform capability seam
//!
//! §9: "the desktop-only device watcher and the mobile-only audio-session
//! adapter are cleanly separable behind a 'platform capabilities'
//! interface ... non-capable platforms supply a no-op implementation."
//! Grounded in `gecko_platform`'s `PlatformBackend` trait + per-OS module
//! split, generalized here to the two notification families the engine
//! actually needs: device-list/default-device changes (§4.5) and
//! interruption begin/end (§4.6).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::device::{CpalDeviceEnumerator, DeviceEnumerator, DeviceKind};

/// Handle returned by a `listen_*` call; pass to `unlisten` to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

/// `true` for begin, `false` for end.
pub type InterruptionEvent = bool;

type VoidCallback = Box<dyn Fn() + Send + Sync>;
type InterruptionCallback = Box<dyn Fn(InterruptionEvent) + Send + Sync>;

/// What the engine asks of the host platform beyond the graph/device/buffer
/// collaborators already modeled: notifications it cannot poll for itself.
pub trait PlatformCapabilities: Send + Sync {
    fn supports_device_watch(&self) -> bool;
    fn supports_interruptions(&self) -> bool;

    fn listen_device_list_changed(&self, callback: VoidCallback) -> ListenerToken;
    fn listen_default_output_changed(&self, callback: VoidCallback) -> ListenerToken;
    fn listen_default_input_changed(&self, callback: VoidCallback) -> ListenerToken;
    fn listen_interruptions(&self, callback: InterruptionCallback) -> ListenerToken;

    fn unlisten(&self, token: ListenerToken);
}

fn next_token() -> ListenerToken {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    ListenerToken(NEXT.fetch_add(1, Ordering::SeqCst))
}

/// No-op capabilities for platforms with neither device hot-plug
/// notifications nor an interruptible audio session (§9: "non-capable
/// platforms supply a no-op implementation").
pub struct NoCapabilities;

impl PlatformCapabilities for NoCapabilities {
    fn supports_device_watch(&self) -> bool {
        false
    }
    fn supports_interruptions(&self) -> bool {
        false
    }
    fn listen_device_list_changed(&self, _callback: VoidCallback) -> ListenerToken {
        next_token()
    }
    fn listen_default_output_changed(&self, _callback: VoidCallback) -> ListenerToken {
        next_token()
    }
    fn listen_default_input_changed(&self, _callback: VoidCallback) -> ListenerToken {
        next_token()
    }
    fn listen_interruptions(&self, _callback: InterruptionCallback) -> ListenerToken {
        next_token()
    }
    fn unlisten(&self, _token: ListenerToken) {}
}

struct Listeners {
    device_list: Vec<(ListenerToken, VoidCallback)>,
    default_output: Vec<(ListenerToken, VoidCallback)>,
    default_input: Vec<(ListenerToken, VoidCallback)>,
    interruptions: Vec<(ListenerToken, InterruptionCallback)>,
}

impl Listeners {
    fn new() -> Self {
        Self {
            device_list: Vec::new(),
            default_output: Vec::new(),
            default_input: Vec::new(),
            interruptions: Vec::new(),
        }
    }
}

/// Desktop device watcher: polls the cpal device list on a background
/// thread every `poll_interval` and diffs against the previous snapshot,
/// mirroring `gecko_platform::linux`'s 500ms default-sink poll (no native
/// hot-plug callback is assumed to exist, matching that teacher module's
/// own approach). No interruption support — desktop has no audio session
/// to interrupt.
pub struct DesktopCapabilities {
    listeners: Arc<Mutex<Listeners>>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    _thread: Option<std::thread::JoinHandle<()>>,
}

impl DesktopCapabilities {
    pub fn new(poll_interval: Duration) -> Self {
        let listeners = Arc::new(Mutex::new(Listeners::new()));
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let listeners_clone = Arc::clone(&listeners);
        let shutdown_clone = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("engine-device-watch".into())
            .spawn(move || {
                Self::poll_loop(listeners_clone, shutdown_clone, poll_interval);
            })
            .expect("failed to spawn device watcher thread");

        Self {
            listeners,
            shutdown,
            _thread: Some(thread),
        }
    }

    fn poll_loop(
        listeners: Arc<Mutex<Listeners>>,
        shutdown: Arc<std::sync::atomic::AtomicBool>,
        poll_interval: Duration,
    ) {
        let enumerator = CpalDeviceEnumerator::new();
        let mut last_output_default: Option<u32> = None;
        let mut last_input_default: Option<u32> = None;
        let mut last_device_count = (0usize, 0usize);

        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(poll_interval);
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            let outputs = enumerator.enumerate(DeviceKind::Output).unwrap_or_default();
            let inputs = enumerator.enumerate(DeviceKind::Input).unwrap_or_default();

            let output_default = outputs.iter().find(|d| d.is_default).map(|d| d.id);
            let input_default = inputs.iter().find(|d| d.is_default).map(|d| d.id);

            if (outputs.len(), inputs.len()) != last_device_count {
                last_device_count = (outputs.len(), inputs.len());
                debug!("device list changed: {} outputs, {} inputs", outputs.len(), inputs.len());
                for (_, cb) in listeners.lock().device_list.iter() {
                    cb();
                }
            }

            if output_default != last_output_default {
                last_output_default = output_default;
                for (_, cb) in listeners.lock().default_output.iter() {
                    cb();
                }
            }

            if input_default != last_input_default {
                last_input_default = input_default;
                for (_, cb) in listeners.lock().default_input.iter() {
                    cb();
                }
            }
        }
    }
}

impl Drop for DesktopCapabilities {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self._thread.take() {
            let _ = handle.join();
        }
    }
}

impl PlatformCapabilities for DesktopCapabilities {
    fn supports_device_watch(&self) -> bool {
        true
    }
    fn supports_interruptions(&self) -> bool {
        false
    }
    fn listen_device_list_changed(&self, callback: VoidCallback) -> ListenerToken {
        let token = next_token();
        self.listeners.lock().device_list.push((token, callback));
        token
    }
    fn listen_default_output_changed(&self, callback: VoidCallback) -> ListenerToken {
        let token = next_token();
        self.listeners.lock().default_output.push((token, callback));
        token
    }
    fn listen_default_input_changed(&self, callback: VoidCallback) -> ListenerToken {
        let token = next_token();
        self.listeners.lock().default_input.push((token, callback));
        token
    }
    fn listen_interruptions(&self, _callback: InterruptionCallback) -> ListenerToken {
        next_token()
    }
    fn unlisten(&self, token: ListenerToken) {
        let mut listeners = self.listeners.lock();
        listeners.device_list.retain(|(t, _)| *t != token);
        listeners.default_output.retain(|(t, _)| *t != token);
        listeners.default_input.retain(|(t, _)| *t != token);
        listeners.interruptions.retain(|(t, _)| *t != token);
    }
}

/// Test/reference capabilities whose notifications fire only when a test
/// explicitly calls `trigger_*` — used to exercise §4.5/§4.6's dispatch
/// logic deterministically instead of waiting on real hot-plug or session
/// events.
pub struct ManualCapabilities {
    listeners: Mutex<Listeners>,
}

impl ManualCapabilities {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Listeners::new()),
        }
    }

    pub fn trigger_device_list_changed(&self) {
        for (_, cb) in self.listeners.lock().device_list.iter() {
            cb();
        }
    }

    pub fn trigger_default_output_changed(&self) {
        for (_, cb) in self.listeners.lock().default_output.iter() {
            cb();
        }
    }

    pub fn trigger_default_input_changed(&self) {
        for (_, cb) in self.listeners.lock().default_input.iter() {
            cb();
        }
    }

    pub fn trigger_interruption(&self, begin: bool) {
        for (_, cb) in self.listeners.lock().interruptions.iter() {
            cb(begin);
        }
    }
}

impl Default for ManualCapabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformCapabilities for ManualCapabilities {
    fn supports_device_watch(&self) -> bool {
        true
    }
    fn supports_interruptions(&self) -> bool {
        true
    }
    fn listen_device_list_changed(&self, callback: VoidCallback) -> ListenerToken {
        let token = next_token();
        self.listeners.lock().device_list.push((token, callback));
        token
    }
    fn listen_default_output_changed(&self, callback: VoidCallback) -> ListenerToken {
        let token = next_token();
        self.listeners.lock().default_output.push((token, callback));
        token
    }
    fn listen_default_input_changed(&self, callback: VoidCallback) -> ListenerToken {
        let token = next_token();
        self.listeners.lock().default_input.push((token, callback));
        token
    }
    fn listen_interruptions(&self, callback: InterruptionCallback) -> ListenerToken {
        let token = next_token();
        self.listeners.lock().interruptions.push((token, callback));
        token
    }
    fn unlisten(&self, token: ListenerToken) {
        let mut listeners = self.listeners.lock();
        listeners.device_list.retain(|(t, _)| *t != token);
        listeners.default_output.retain(|(t, _)| *t != token);
        listeners.default_input.retain(|(t, _)| *t != token);
        listeners.interruptions.retain(|(t, _)| *t != token);
    }
}
