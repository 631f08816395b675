//! Control-thread-owned engine core
//!
//! `EngineCore` bundles the committed [`EngineState`](crate::state::EngineState)
//! together with the live graph/buffer collaborators and the handles the
//! appliers need across calls (node ids, the manual render-loop quit flag).
//! It is mutated from exactly one thread — the control thread — per §5;
//! nothing here is `Sync` by accident, `control::Engine` is what makes it
//! safely reachable from other threads.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use engine_graph::{AudioGraphEngine, DeviceEnumerator, GraphFactory, ManualRenderingEngine, NodeId, SharedAudioDeviceBuffer};

use crate::config::EngineConfig;
use crate::observer::EngineObserver;
use crate::state::EngineState;

/// Handles to the live device-mode node graph, present only while a device
/// engine object exists (§3.1 invariant: exactly one of `{engine_device,
/// engine_manual}` is non-null whenever any side is enabled).
#[derive(Default)]
pub(crate) struct DeviceGraphHandles {
    pub engine: Option<Box<dyn AudioGraphEngine>>,
    pub output_node: Option<NodeId>,
    pub input_mixer: Option<NodeId>,
    pub input_sink: Option<NodeId>,
    /// Set by `OnEngineWillConnectInput` bookkeeping: if the observer
    /// already wired something into the mixer, the applier must not
    /// default-connect the hardware input node (§4.2 step 10).
    pub input_connected_by_observer: bool,
}

/// The manual engine is shared (not moved) with the render-loop thread via
/// a mutex: the control thread calls `start()`/`stop()` on it, the render
/// thread calls `render()` on it, and `parking_lot::Mutex` keeps both sides
/// from needing an ownership hand-off.
pub(crate) type SharedManualEngine = Arc<parking_lot::Mutex<Box<dyn ManualRenderingEngine>>>;

#[derive(Default)]
pub(crate) struct ManualGraphHandles {
    pub engine: Option<SharedManualEngine>,
    pub render_quit: Option<Arc<AtomicBool>>,
    pub render_thread: Option<std::thread::JoinHandle<()>>,
}

pub struct EngineCore {
    pub(crate) state: EngineState,
    pub(crate) config: EngineConfig,
    pub(crate) observer: Arc<dyn EngineObserver>,
    pub(crate) graph_factory: Arc<dyn GraphFactory>,
    pub(crate) buffer: SharedAudioDeviceBuffer,
    pub(crate) device_enumerator: Arc<dyn DeviceEnumerator>,

    pub(crate) device: DeviceGraphHandles,
    pub(crate) manual: ManualGraphHandles,

    /// Lets a graph-engine configuration-change callback (arbitrary thread)
    /// post a `ReconfigureEngine` task back to the control thread (§4.2
    /// step 19, §5: "OS callbacks ... must post a task to the control
    /// thread before touching engine state"). `None` until the control
    /// thread wires itself up in `control::Engine::spawn`.
    pub(crate) reconfigure_sender: Option<crossbeam_channel::Sender<crate::control::ControlTask>>,
}

impl EngineCore {
    pub fn new(
        config: EngineConfig,
        observer: Arc<dyn EngineObserver>,
        graph_factory: Arc<dyn GraphFactory>,
        buffer: SharedAudioDeviceBuffer,
        device_enumerator: Arc<dyn DeviceEnumerator>,
    ) -> Self {
        Self {
            state: EngineState::default(),
            config,
            observer,
            graph_factory,
            buffer,
            device_enumerator,
            device: DeviceGraphHandles::default(),
            manual: ManualGraphHandles::default(),
            reconfigure_sender: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_engine_running(&self) -> bool {
        match self.state.render_mode {
            crate::state::RenderMode::Device => self.device.engine.as_ref().is_some_and(|e| e.is_running()),
            crate::state::RenderMode::Manual => self.manual.engine.is_some(),
        }
    }

    /// §3.1 invariants, asserted at the end of every successful applier
    /// call (debug-time sanity check; violating this is a programming
    /// error in the applier, not a caller error).
    #[cfg(debug_assertions)]
    pub(crate) fn assert_invariants(&self) {
        assert_eq!(self.buffer.is_playing(), self.state.is_output_enabled());
        assert_eq!(self.buffer.is_recording(), self.state.is_input_enabled());
        match self.state.render_mode {
            crate::state::RenderMode::Device => {
                assert_eq!(self.device.engine.is_some(), self.state.is_any_enabled());
                assert!(self.manual.engine.is_none());
            }
            crate::state::RenderMode::Manual => {
                assert_eq!(self.manual.engine.is_some(), self.state.is_any_enabled());
                assert!(self.device.engine.is_none());
            }
        }
    }

    #[cfg(not(debug_assertions))]
    pub(crate) fn assert_invariants(&self) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use engine_graph::mock::MockGraphFactory;
    use engine_graph::{AudioFormat, DeviceDescriptor, RingAudioDeviceBuffer, SampleKind};

    use crate::observer::NullObserver;

    pub fn hardware_format() -> AudioFormat {
        AudioFormat { sample_rate: 48_000, channels: 1, sample_kind: SampleKind::Float32 }
    }

    pub struct EmptyEnumerator;
    impl DeviceEnumerator for EmptyEnumerator {
        fn enumerate(&self, _kind: engine_graph::DeviceKind) -> Result<Vec<DeviceDescriptor>, engine_graph::GraphError> {
            Ok(Vec::new())
        }
    }

    pub fn new_test_core() -> EngineCore {
        EngineCore::new(
            EngineConfig::fast_for_tests(),
            Arc::new(NullObserver),
            Arc::new(MockGraphFactory::new(hardware_format(), hardware_format())),
            Arc::new(RingAudioDeviceBuffer::new()),
            Arc::new(EmptyEnumerator),
        )
    }
}
