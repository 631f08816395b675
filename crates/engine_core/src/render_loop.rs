//! Manual-mode render loop (§4.4)
//!
//! Runs on a dedicated OS thread, paced against an absolute deadline (not
//! incremental sleeps, so a slow iteration doesn't compound drift across
//! the run). Keeps the WebRTC-style playout pipeline ticking even when no
//! audio hardware is present by always pulling `frames_per_chunk` of
//! playout PCM, and feeds whatever the manual engine renders back to the
//! buffer as captured audio.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use engine_graph::{AudioFormat, RenderStatus};

use crate::core::SharedManualEngine;

pub(crate) fn spawn(
    engine: SharedManualEngine,
    buffer: engine_graph::SharedAudioDeviceBuffer,
    format: AudioFormat,
    quit: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("engine-render-loop".into())
        .spawn(move || run(engine, buffer, format, quit))
        .expect("failed to spawn render loop thread")
}

fn run(
    engine: SharedManualEngine,
    buffer: engine_graph::SharedAudioDeviceBuffer,
    format: AudioFormat,
    quit: Arc<AtomicBool>,
) {
    let frames_per_chunk = (format.sample_rate / 100).max(1);
    let chunk_ms = ((1000.0 * frames_per_chunk as f64 / format.sample_rate as f64).round()) as u64;
    let chunk_duration = Duration::from_millis(chunk_ms.max(1));

    let start = Instant::now();
    let mut iteration: u64 = 0;
    let mut captured = vec![0i16; frames_per_chunk as usize];

    while !quit.load(Ordering::SeqCst) {
        // Pull playout PCM to keep the processing pipeline ticking even
        // though no hardware consumes it.
        let _ = buffer.get_playout_data(frames_per_chunk);

        let render_status = engine.lock().render(frames_per_chunk, &mut captured);
        match render_status {
            Ok(RenderStatus::Ok) => {
                let capture_timestamp_ns = start.elapsed().as_nanos() as i64;
                if let Err(err) = buffer.deliver_recorded_data(&captured, capture_timestamp_ns) {
                    warn!("render loop: deliver_recorded_data failed: {err}");
                }
            }
            Ok(RenderStatus::Failed) => {
                trace!("render loop: render() reported failure this iteration");
            }
            Err(err) => {
                warn!("render loop: render() error: {err}");
            }
        }

        iteration += 1;
        let next_wakeup = start + chunk_duration * iteration as u32;
        let now = Instant::now();
        if next_wakeup > now {
            std::thread::sleep(next_wakeup - now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_graph::mock::MockManualEngine;
    use engine_graph::{RingAudioDeviceBuffer, SampleKind};
    use std::sync::Arc;

    #[test]
    fn test_render_loop_delivers_frames_and_stops_on_quit() {
        // 1000Hz => 10 frames/chunk => 10ms chunks; run ~50ms so several
        // iterations land before quitting.
        let format = AudioFormat { sample_rate: 1000, channels: 1, sample_kind: SampleKind::Int16 };
        let engine: SharedManualEngine = Arc::new(parking_lot::Mutex::new(Box::new(MockManualEngine::new())));
        let buffer = Arc::new(RingAudioDeviceBuffer::new());
        let quit = Arc::new(AtomicBool::new(false));

        let shared_buffer: engine_graph::SharedAudioDeviceBuffer = buffer.clone();
        let handle = spawn(engine, shared_buffer, format, Arc::clone(&quit));

        std::thread::sleep(Duration::from_millis(50));
        quit.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(buffer.delivered_chunk_count() >= 2);
        assert_eq!(buffer.delivered_frame_count() % 10, 0);
    }

    #[test]
    fn test_frames_per_chunk_is_ten_milliseconds_worth() {
        let format = AudioFormat { sample_rate: 48_000, channels: 1, sample_kind: SampleKind::Int16 };
        let frames_per_chunk = (format.sample_rate / 100).max(1);
        assert_eq!(frames_per_chunk, 480);
    }
}
