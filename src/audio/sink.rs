// Output device capability
// Abstracts the audio output subsystem so the playback controller can be
// driven by a real cpal device or by a deterministic fake in tests

use std::sync::Arc;

use crate::audio::decoder::PcmBuffer;
use crate::error::DeviceError;

/// Callback invoked when a started source reaches its natural end.
///
/// Delivered off the device's real-time thread; never invoked after
/// [`AudioSink::stop`] for the same source.
pub type CompletionFn = Box<dyn FnOnce() + Send + 'static>;

/// The output device's own monotonic time reference.
///
/// Advances with rendered audio frames, independent of how often the logic
/// thread gets scheduled. Elapsed playback time is always derived from
/// deltas of this clock, never from counting timer callbacks.
pub trait DeviceClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Common interface to an audio output device.
///
/// One sink drives at most one source at a time. All methods are commands
/// issued from the logic thread; completion is observed via `on_ended`.
pub trait AudioSink {
    /// Device-ready form of a sample buffer (resampled, rate-matched).
    type Track;

    /// Build a device-ready buffer from decoded narration samples.
    fn prepare(&mut self, buffer: &PcmBuffer) -> Result<Self::Track, DeviceError>;

    /// Make sure the device context is producing audio. Idempotent.
    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Begin producing samples from `offset_secs` into the track.
    ///
    /// Replaces any source already playing. `on_ended` fires once if the
    /// track runs to its natural end; it is dropped unfired if the source
    /// is stopped or replaced first.
    fn start(
        &mut self,
        track: &Self::Track,
        offset_secs: f64,
        on_ended: CompletionFn,
    ) -> Result<(), DeviceError>;

    /// Stop the active source, if any. Its completion callback never fires.
    fn stop(&mut self);

    /// Shareable handle to the device clock.
    fn clock(&self) -> Arc<dyn DeviceClock>;

    /// Output volume, clamped to [0.0, 1.0].
    fn set_volume(&mut self, volume: f32);

    /// Release the device context. The sink is unusable afterwards.
    fn close(&mut self);
}
