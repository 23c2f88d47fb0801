//! Audio output engine using cpal
//!
//! Each `play` runs on its own output thread, which decodes the file packet
//! by packet into a ring buffer drained by the device callback. The thread
//! lingers until the track drains or is stopped. cpal streams are not
//! `Send`, so the stream is created and dropped on that thread.

use crate::audio::decoder::{self, TrackReader};
use crate::error::{Error, Result};
use crate::playback::engine::{BusySignal, PlaybackEngine};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub struct CpalEngine {
    loaded: Mutex<Option<PathBuf>>,
    busy: Arc<BusySignal>,
}

impl CpalEngine {
    pub fn new() -> Self {
        Self {
            loaded: Mutex::new(None),
            busy: Arc::new(BusySignal::new()),
        }
    }
}

impl Default for CpalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for CpalEngine {
    fn load(&self, path: &Path) -> Result<()> {
        // Probing rejects corrupt media up front; decoding happens on the output thread
        decoder::probe_duration(path)?;
        *self.loaded.lock().unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let path = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Playback("No track loaded".to_string()))?;

        let generation = self.busy.start();
        let busy = Arc::clone(&self.busy);

        std::thread::Builder::new()
            .name("rockola-output".to_string())
            .spawn(move || {
                if let Err(e) = render(&path, generation, &busy) {
                    error!("Output failed for {}: {}", path.display(), e);
                    busy.finish(generation);
                }
            })
            .map_err(|e| {
                self.busy.cancel();
                Error::Playback(format!("Failed to spawn output thread: {}", e))
            })?;

        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    fn stop(&self) {
        if self.busy.is_busy() {
            info!("Stopping audio output");
        }
        self.busy.cancel();
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }
}

/// Seconds of decoded audio held ahead of the device
const BUFFER_SECONDS: usize = 2;

/// Back-off while the ring buffer is full
const FILL_WAIT: Duration = Duration::from_millis(10);

/// Stream `path` to the default device until it drains or `generation` is
/// cancelled.
fn render(path: &Path, generation: u64, busy: &Arc<BusySignal>) -> Result<()> {
    let mut reader = TrackReader::open(path)?;

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

    let sample_format = supported.sample_format();
    let config = supported.config();
    debug!(
        "Output {} on {}: {} Hz, {} channels, {:?}",
        path.display(),
        device.name().unwrap_or_else(|_| "Unknown".to_string()),
        config.sample_rate.0,
        config.channels,
        sample_format
    );

    let capacity = reader.sample_rate() as usize * BUFFER_SECONDS;
    let (mut producer, consumer) = HeapRb::<[f32; 2]>::new(capacity.max(1)).split();
    let feed = Feed {
        consumer,
        step: reader.sample_rate() as f64 / config.sample_rate.0 as f64,
        input_done: Arc::new(AtomicBool::new(false)),
    };
    let input_done = Arc::clone(&feed.input_done);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, feed, generation, busy)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, feed, generation, busy)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, feed, generation, busy)?,
        other => {
            return Err(Error::AudioOutput(format!("Unsupported sample format: {:?}", other)));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

    let mut frames = Vec::new();
    let mut offset = 0;
    let mut total = 0usize;
    loop {
        if !busy.is_current(generation) {
            debug!("Stopped while streaming {}", path.display());
            return Ok(());
        }

        if offset == frames.len() {
            frames.clear();
            offset = 0;
            if !reader.read_frames(&mut frames)? {
                break;
            }
            total += frames.len();
            continue;
        }

        offset += producer.push_slice(&frames[offset..]);
        if offset < frames.len() {
            std::thread::sleep(FILL_WAIT);
        }
    }

    if total == 0 {
        return Err(Error::Decode(format!("No audio decoded from {}", path.display())));
    }
    debug!("Decoded {} frames from {}", total, path.display());
    input_done.store(true, Ordering::Release);

    busy.wait_while_playing(generation, None);
    drop(stream);
    Ok(())
}

/// Consumer side of the ring buffer, owned by the device callback
struct Feed {
    consumer: HeapCons<[f32; 2]>,
    /// Source frames per device frame
    step: f64,
    /// Set once the decoder has pushed its last frame
    input_done: Arc<AtomicBool>,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut feed: Feed,
    generation: u64,
    busy: &Arc<BusySignal>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut current = [0.0f32; 2];
    // Start due for a new frame so the first callback pops one
    let mut phase = 1.0f64;

    let mut drained = false;
    let data_busy = Arc::clone(busy);
    let error_busy = Arc::clone(busy);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut starved = false;

                for frame in data.chunks_mut(channels) {
                    while phase >= 1.0 {
                        match feed.consumer.try_pop() {
                            Some(next) => {
                                current = next;
                                phase -= 1.0;
                            }
                            None => break,
                        }
                    }

                    let [left, right] = if phase >= 1.0 {
                        starved = true;
                        [0.0, 0.0]
                    } else {
                        phase += feed.step;
                        current
                    };

                    for (channel, sample) in frame.iter_mut().enumerate() {
                        let value = match channel {
                            0 => left,
                            1 => right,
                            _ => 0.0,
                        };
                        *sample = T::from_sample(value.clamp(-1.0, 1.0));
                    }
                }

                if starved
                    && feed.input_done.load(Ordering::Acquire)
                    && feed.consumer.is_empty()
                    && !drained
                {
                    drained = true;
                    data_busy.finish(generation);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_busy.finish(generation);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
