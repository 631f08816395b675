//! engine_core — real-time audio device engine state machine
//!
//! Owns the state-transition driver (§4.1), the device-mode and
//! manual-mode appliers (§4.2/§4.3), the manual-mode render loop (§4.4),
//! the desktop device-change watcher (§4.5), the interruption adapter
//! (§4.6), and the public control-thread façade (§6) that ties all of it
//! together. Everything this crate treats as an external collaborator —
//! the host node graph, the PCM ring buffer, device enumeration, platform
//! notifications — lives in `engine_graph` as a trait plus a reference
//! implementation.

mod config;
mod control;
mod core;
mod device_applier;
mod device_watcher;
mod diff;
mod error;
mod interruption;
mod manual_applier;
mod observer;
mod render_loop;
mod state;

pub use config::{EngineConfig, ManualFormat, MANUAL_MAX_FRAMES, MANUAL_RENDER_FORMAT, RENDER_CHUNK_FRAMES};
pub use control::{spawn_with_default_capabilities, ControlTask, Engine, StateTransform};
pub use diff::EngineStateUpdate;
pub use error::{EngineError, EngineResult};
pub use observer::{ConnectionContext, EngineObserver, NullObserver};
pub use state::{EngineState, MuteMode, RenderMode};
