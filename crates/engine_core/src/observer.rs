//! Observer contract (§6)
//!
//! Represented as plain call-site hooks on a trait — not a subclass
//! hierarchy (§9: "dynamic dispatch across language boundary ... represent
//! it as an interface with plain function entries"). Most hooks return an
//! `i32` status: `0` means proceed, anything else aborts the in-flight
//! applier and triggers rollback (§4.2, §8 property 4).

/// Context passed to `on_engine_will_connect_input`/`_output` so the
/// observer may insert nodes between the documented source/sink and
/// destination, per §6's table.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionContext {
    pub sample_rate: u32,
    pub channels: u16,
}

pub trait EngineObserver: Send + Sync {
    /// Desktop device set changed. Void — cannot reject.
    fn on_devices_updated(&self) {}

    /// Voice-processing muted-talker detection. Void — cannot reject.
    fn on_speech_activity_event(&self, _started: bool) {}

    fn on_engine_did_create(&self) -> i32 {
        0
    }

    fn on_engine_will_enable(&self, _playout_enabled: bool, _recording_enabled: bool) -> i32 {
        0
    }

    fn on_engine_will_start(&self, _playout_enabled: bool, _recording_enabled: bool) -> i32 {
        0
    }

    fn on_engine_did_stop(&self, _playout_enabled: bool, _recording_enabled: bool) -> i32 {
        0
    }

    fn on_engine_did_disable(&self, _playout_enabled: bool, _recording_enabled: bool) -> i32 {
        0
    }

    fn on_engine_will_release(&self) -> i32 {
        0
    }

    fn on_engine_will_connect_input(&self, _context: ConnectionContext) -> i32 {
        0
    }

    fn on_engine_will_connect_output(&self, _context: ConnectionContext) -> i32 {
        0
    }
}

/// Observer that accepts everything and records nothing — the default for
/// callers that don't need to veto or react to lifecycle events.
pub struct NullObserver;

impl EngineObserver for NullObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_observer_always_accepts() {
        let observer = NullObserver;
        assert_eq!(observer.on_engine_did_create(), 0);
        assert_eq!(observer.on_engine_will_start(true, false), 0);
        assert_eq!(
            observer.on_engine_will_connect_input(ConnectionContext { sample_rate: 48000, channels: 1 }),
            0
        );
    }
}
