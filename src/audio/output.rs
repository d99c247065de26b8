// Audio output using cpal
// The device callback reads straight from a prepared sample buffer; the
// narration is fully decoded before playback starts, so there is no stream feed

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::decoder::PcmBuffer;
use crate::audio::sink::{AudioSink, CompletionFn, DeviceClock};
use crate::error::DeviceError;

/// A narration buffer resampled to the device's native rate.
pub struct DeviceTrack {
    samples: Arc<Vec<f32>>,
}

struct ActiveSource {
    samples: Arc<Vec<f32>>,
    cursor: usize,
    on_ended: Option<CompletionFn>,
}

impl ActiveSource {
    fn next_sample(&mut self) -> Option<f32> {
        let value = self.samples.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(value)
    }

    fn finished(&self) -> bool {
        self.cursor >= self.samples.len()
    }
}

/// State shared with the real-time output callback.
struct SharedOutput {
    active: Mutex<Option<ActiveSource>>,
    frames_rendered: AtomicU64,
    volume: Mutex<f32>,
    sample_rate: u32,
}

impl DeviceClock for SharedOutput {
    /// Seconds of audio the device has rendered since the stream opened.
    /// Advances only while the device runs, never with wall-clock time.
    fn now(&self) -> f64 {
        self.frames_rendered.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }
}

/// Audio output device backed by cpal's default host.
pub struct CpalSink {
    stream: Stream,
    shared: Arc<SharedOutput>,
    sample_rate: u32,
}

impl CpalSink {
    /// Open the default output device and start its stream.
    pub fn open() -> Result<Self, DeviceError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or(DeviceError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| DeviceError::Config(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let shared = Arc::new(SharedOutput {
            active: Mutex::new(None),
            frames_rendered: AtomicU64::new(0),
            volume: Mutex::new(1.0),
            sample_rate,
        });

        // Build the output stream based on sample format
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), shared.clone())?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), shared.clone())?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), shared.clone())?
            }
            format => return Err(DeviceError::UnsupportedFormat(format!("{:?}", format))),
        };

        stream
            .play()
            .map_err(|e| DeviceError::Start(e.to_string()))?;

        Ok(Self {
            stream,
            shared,
            sample_rate,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        shared: Arc<SharedOutput>,
    ) -> Result<Stream, DeviceError> {
        let channels = config.channels as usize;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut active = shared.active.lock();
                    let volume = *shared.volume.lock();

                    // Mono narration fans out to every output channel
                    let mut frames = 0u64;
                    for frame in data.chunks_mut(channels) {
                        let value = match active.as_mut() {
                            Some(source) => source.next_sample().unwrap_or(0.0) * volume,
                            None => 0.0,
                        };
                        for out in frame.iter_mut() {
                            *out = T::from_sample(value);
                        }
                        frames += 1;
                    }
                    shared.frames_rendered.fetch_add(frames, Ordering::Relaxed);

                    let ended = active
                        .as_ref()
                        .map(|source| source.finished())
                        .unwrap_or(false);
                    if ended {
                        // Completion runs on its own thread: dropping the
                        // stream must never wait on this callback
                        let on_ended = active.as_mut().and_then(|s| s.on_ended.take());
                        *active = None;
                        drop(active);
                        if let Some(callback) = on_ended {
                            std::thread::spawn(callback);
                        }
                    }
                },
                move |err| {
                    log::error!("Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        Ok(stream)
    }

    /// Convert narration samples to the device rate.
    ///
    /// Devices rarely open at 24 kHz, so the whole buffer is converted once
    /// at load time instead of per callback.
    fn resample(&self, samples: &[f32], from_rate: u32) -> Result<Vec<f32>, DeviceError> {
        if from_rate == self.sample_rate {
            return Ok(samples.to_vec());
        }

        use rubato::{FftFixedIn, Resampler};

        const CHUNK: usize = 1024;
        const SUB_CHUNKS: usize = 2;

        let mut resampler = FftFixedIn::<f32>::new(
            from_rate as usize,
            self.sample_rate as usize,
            CHUNK,
            SUB_CHUNKS,
            1,
        )
        .map_err(|e| DeviceError::Resample(e.to_string()))?;

        let expected_len =
            (samples.len() as f64 * self.sample_rate as f64 / from_rate as f64).ceil() as usize;
        let mut out = Vec::with_capacity(expected_len + CHUNK);

        let mut pos = 0;
        while pos < samples.len() {
            let end = (pos + CHUNK).min(samples.len());
            let chunk_len = end - pos;

            let mut input_chunk = vec![0.0; CHUNK];
            input_chunk[..chunk_len].copy_from_slice(&samples[pos..end]);

            let block = vec![input_chunk];
            let frames = resampler
                .process(&block, None)
                .map_err(|e| DeviceError::Resample(e.to_string()))?;
            out.extend_from_slice(&frames[0]);

            pos += chunk_len;

            if chunk_len < CHUNK {
                break;
            }
        }

        Ok(out)
    }
}

impl AudioSink for CpalSink {
    type Track = DeviceTrack;

    fn prepare(&mut self, buffer: &PcmBuffer) -> Result<DeviceTrack, DeviceError> {
        let samples = self.resample(buffer.samples(), buffer.sample_rate())?;
        Ok(DeviceTrack {
            samples: Arc::new(samples),
        })
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.stream
            .play()
            .map_err(|e| DeviceError::Start(e.to_string()))
    }

    fn start(
        &mut self,
        track: &DeviceTrack,
        offset_secs: f64,
        on_ended: CompletionFn,
    ) -> Result<(), DeviceError> {
        let cursor = ((offset_secs * self.sample_rate as f64) as usize).min(track.samples.len());

        *self.shared.active.lock() = Some(ActiveSource {
            samples: track.samples.clone(),
            cursor,
            on_ended: Some(on_ended),
        });

        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the source also drops its unfired completion callback
        *self.shared.active.lock() = None;
    }

    fn clock(&self) -> Arc<dyn DeviceClock> {
        self.shared.clone()
    }

    fn set_volume(&mut self, volume: f32) {
        *self.shared.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn close(&mut self) {
        self.stop();
        if let Err(e) = self.stream.pause() {
            log::debug!("Output stream pause on close failed: {}", e);
        }
    }
}
