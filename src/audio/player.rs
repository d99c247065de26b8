// Playback controller
// Drives an AudioSink through play/pause/resume with drift-free elapsed-time
// accounting and a cancelable progress ticker. All transitions run on the
// caller's thread; device callbacks only touch the shared session under lock.

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::decoder::PcmBuffer;
use crate::audio::sink::{AudioSink, CompletionFn, DeviceClock};
use crate::error::DeviceError;

/// A completion is only honored when the position is this close to the end;
/// anything earlier is a leftover callback from a superseded source.
pub const END_TOLERANCE_SECS: f64 = 0.1;

const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Transport state of the active narration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No buffer bound.
    Idle,
    /// Buffer bound and device buffer built, not yet started.
    Ready,
    Playing,
    Paused,
    /// Playback reached the end of the buffer; `play` restarts from zero.
    Ended,
}

/// Observer receiving progress values in [0, 1].
///
/// Invoked on the ticker thread while playing. Keep it lightweight and do
/// not call back into the controller from inside it.
pub type ProgressFn = Box<dyn Fn(f32) + Send + 'static>;

/// Session bookkeeping shared with the ticker and completion callbacks.
///
/// `epoch` identifies the loaded buffer generation; callbacks captured under
/// an older epoch are recognized as stale and dropped.
struct Session {
    state: PlaybackState,
    duration: f64,
    /// Seconds accumulated across play/pause cycles up to the last transition.
    elapsed: f64,
    /// Device clock value captured at the most recent play/resume.
    started_at: f64,
    epoch: u64,
    /// Bumped whenever the current ticker must die; ticks with a stale
    /// generation exit without emitting.
    ticker_gen: u64,
    observer: Option<ProgressFn>,
}

impl Session {
    /// Elapsed seconds at this instant, clamped to [0, duration].
    fn live_elapsed(&self, clock: &dyn DeviceClock) -> f64 {
        let raw = match self.state {
            PlaybackState::Playing => self.elapsed + (clock.now() - self.started_at),
            _ => self.elapsed,
        };
        raw.clamp(0.0, self.duration)
    }
}

/// State machine driving one narration buffer through an [`AudioSink`].
pub struct PlaybackController<S: AudioSink> {
    sink: S,
    track: Option<S::Track>,
    session: Arc<Mutex<Session>>,
    clock: Arc<dyn DeviceClock>,
    tick: Duration,
}

impl<S: AudioSink> PlaybackController<S> {
    pub fn new(sink: S) -> Self {
        Self::with_tick(sink, DEFAULT_TICK)
    }

    pub fn with_tick(sink: S, tick: Duration) -> Self {
        let clock = sink.clock();
        Self {
            sink,
            track: None,
            session: Arc::new(Mutex::new(Session {
                state: PlaybackState::Idle,
                duration: 0.0,
                elapsed: 0.0,
                started_at: 0.0,
                epoch: 0,
                ticker_gen: 0,
                observer: None,
            })),
            clock,
            tick,
        }
    }

    /// Bind a decoded buffer, tearing down any prior session first.
    pub fn load(&mut self, buffer: &PcmBuffer) -> Result<(), DeviceError> {
        self.teardown();

        let track = self.sink.prepare(buffer)?;
        self.track = Some(track);

        let mut session = self.session.lock();
        session.duration = buffer.duration();
        session.elapsed = 0.0;
        session.state = PlaybackState::Ready;

        Ok(())
    }

    /// Start or resume playback.
    ///
    /// From `Ready` or `Ended` the source starts at offset zero; from
    /// `Paused` it resumes where it left off. No-op in any other state.
    pub fn play(&mut self) -> Result<(), DeviceError> {
        let (offset, epoch) = {
            let session = self.session.lock();
            match session.state {
                PlaybackState::Ready | PlaybackState::Ended => (0.0, session.epoch),
                PlaybackState::Paused => {
                    let offset = if session.duration > 0.0 {
                        session.elapsed % session.duration
                    } else {
                        0.0
                    };
                    (offset, session.epoch)
                }
                PlaybackState::Idle | PlaybackState::Playing => return Ok(()),
            }
        };

        let Some(track) = self.track.as_ref() else {
            return Ok(());
        };

        self.sink.resume()?;

        let session_handle = Arc::downgrade(&self.session);
        let clock = self.clock.clone();
        let on_ended: CompletionFn = Box::new(move || {
            if let Some(session) = session_handle.upgrade() {
                handle_completion(&session, &*clock, epoch);
            }
        });

        self.sink.start(track, offset, on_ended)?;

        let gen = {
            let mut session = self.session.lock();
            if offset == 0.0 {
                session.elapsed = 0.0;
            }
            session.started_at = self.clock.now();
            session.state = PlaybackState::Playing;
            session.ticker_gen += 1;
            session.ticker_gen
        };
        self.spawn_ticker(gen);

        Ok(())
    }

    /// Pause playback, folding the running interval into the elapsed total.
    /// Valid from `Playing` only; the progress ticker is cancelled before
    /// this returns.
    pub fn pause(&mut self) {
        {
            let mut session = self.session.lock();
            if session.state != PlaybackState::Playing {
                return;
            }
            session.elapsed = session.live_elapsed(&*self.clock);
            session.state = PlaybackState::Paused;
            session.ticker_gen += 1;
        }
        self.sink.stop();
    }

    /// Unconditional teardown back to `Idle`.
    pub fn reset(&mut self) {
        self.teardown();
    }

    /// Register the progress observer, replacing any previous one.
    pub fn on_progress(&mut self, observer: ProgressFn) {
        self.session.lock().observer = Some(observer);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    pub fn state(&self) -> PlaybackState {
        self.session.lock().state
    }

    /// Fraction of the buffer played so far, in [0, 1].
    pub fn progress(&self) -> f32 {
        let session = self.session.lock();
        if session.duration <= 0.0 {
            return 0.0;
        }
        (session.live_elapsed(&*self.clock) / session.duration).clamp(0.0, 1.0) as f32
    }

    /// Elapsed seconds at this instant.
    pub fn elapsed(&self) -> f64 {
        self.session.lock().live_elapsed(&*self.clock)
    }

    /// Duration of the bound buffer in seconds, 0 when idle.
    pub fn duration(&self) -> f64 {
        self.session.lock().duration
    }

    /// Transport readout, e.g. `0:42 / 3:05`.
    pub fn position_display(&self) -> String {
        let (elapsed, duration) = {
            let session = self.session.lock();
            (session.live_elapsed(&*self.clock), session.duration)
        };
        format!(
            "{} / {}",
            format_timestamp(elapsed),
            format_timestamp(duration)
        )
    }

    /// Invalidate the session identity, cancel the ticker, stop the source,
    /// and drop the device buffer. Safe from every state.
    fn teardown(&mut self) {
        {
            let mut session = self.session.lock();
            session.epoch += 1;
            session.ticker_gen += 1;
            session.state = PlaybackState::Idle;
            session.elapsed = 0.0;
            session.duration = 0.0;
        }
        self.sink.stop();
        self.track = None;
    }

    fn spawn_ticker(&self, gen: u64) {
        let session_handle = Arc::downgrade(&self.session);
        let clock = self.clock.clone();
        let tick = self.tick;

        thread::spawn(move || loop {
            thread::sleep(tick);

            let Some(session) = session_handle.upgrade() else {
                break;
            };
            let session = session.lock();
            if session.ticker_gen != gen || session.state != PlaybackState::Playing {
                break;
            }

            let elapsed = session.live_elapsed(&*clock);
            let progress = (elapsed / session.duration).clamp(0.0, 1.0) as f32;
            if let Some(observer) = session.observer.as_ref() {
                observer(progress);
            }

            if elapsed >= session.duration {
                break;
            }
        });
    }
}

impl<S: AudioSink> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.teardown();
        self.sink.close();
    }
}

/// Natural-completion transition, guarded by session identity.
///
/// A callback from a superseded buffer, or one arriving while the position
/// is nowhere near the end, is an expected race and is dropped silently.
fn handle_completion(session: &Mutex<Session>, clock: &dyn DeviceClock, epoch: u64) {
    let mut session = session.lock();
    if session.epoch != epoch {
        return;
    }

    let elapsed = session.live_elapsed(clock);
    if (session.duration - elapsed).abs() <= END_TOLERANCE_SECS {
        session.elapsed = 0.0;
        session.state = PlaybackState::Ended;
        session.ticker_gen += 1;
    }
}

/// Format seconds as `M:SS` with zero-padded seconds.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::audio::decoder::NARRATION_SAMPLE_RATE;

    fn controller() -> (
        PlaybackController<FakeSink>,
        Arc<FakeClock>,
        Arc<Mutex<FakeState>>,
    ) {
        let (sink, clock, state) = FakeSink::new();
        (
            PlaybackController::with_tick(sink, Duration::from_millis(5)),
            clock,
            state,
        )
    }

    fn seconds_buffer(secs: usize) -> PcmBuffer {
        PcmBuffer::new(
            vec![0.0; secs * NARRATION_SAMPLE_RATE as usize],
            NARRATION_SAMPLE_RATE,
        )
    }

    #[test]
    fn test_load_enters_ready() {
        let (mut player, _clock, _state) = controller();
        player.load(&seconds_buffer(3)).unwrap();

        assert_eq!(player.state(), PlaybackState::Ready);
        assert_eq!(player.duration(), 3.0);
        assert_eq!(player.progress(), 0.0);
    }

    #[test]
    fn test_elapsed_additivity_across_pause_resume() {
        let (mut player, clock, state) = controller();
        player.load(&seconds_buffer(10)).unwrap();

        player.play().unwrap();
        clock.advance(1.0);
        player.pause();
        assert!((player.elapsed() - 1.0).abs() < 1e-9);

        player.play().unwrap();
        clock.advance(2.0);
        player.pause();
        assert!((player.elapsed() - 3.0).abs() < 1e-9);

        // Resume picked up where the pause left off
        assert_eq!(state.lock().starts, vec![0.0, 1.0]);

        // Identical to one uninterrupted stretch of the same length
        let (mut uninterrupted, clock2, _state2) = controller();
        uninterrupted.load(&seconds_buffer(10)).unwrap();
        uninterrupted.play().unwrap();
        clock2.advance(3.0);
        uninterrupted.pause();
        assert!((uninterrupted.elapsed() - player.elapsed()).abs() < 1e-9);
    }

    #[test]
    fn test_elapsed_clamped_to_duration() {
        let (mut player, clock, _state) = controller();
        player.load(&seconds_buffer(2)).unwrap();

        player.play().unwrap();
        clock.advance(60.0);

        assert_eq!(player.elapsed(), 2.0);
        assert_eq!(player.progress(), 1.0);
    }

    #[test]
    fn test_progress_monotonic_and_bounded() {
        let (mut player, clock, _state) = controller();
        player.load(&seconds_buffer(10)).unwrap();

        let samples: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_samples = samples.clone();
        player.on_progress(Box::new(move |p| sink_samples.lock().push(p)));

        player.play().unwrap();
        for _ in 0..5 {
            clock.advance(0.5);
            thread::sleep(Duration::from_millis(25));
        }
        player.pause();

        let samples = samples.lock();
        assert!(!samples.is_empty(), "ticker emitted no progress");
        for pair in samples.windows(2) {
            assert!(pair[1] >= pair[0], "progress went backwards: {:?}", pair);
        }
        for &p in samples.iter() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn test_pause_cancels_ticker_synchronously() {
        let (mut player, clock, _state) = controller();
        player.load(&seconds_buffer(10)).unwrap();

        let samples: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_samples = samples.clone();
        player.on_progress(Box::new(move |p| sink_samples.lock().push(p)));

        player.play().unwrap();
        clock.advance(1.0);
        thread::sleep(Duration::from_millis(25));
        player.pause();

        let emitted = samples.lock().len();
        clock.advance(5.0);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(samples.lock().len(), emitted, "tick emitted after pause");
    }

    #[test]
    fn test_natural_end_resets_and_replays_from_zero() {
        let (mut player, clock, state) = controller();
        player.load(&seconds_buffer(2)).unwrap();

        player.play().unwrap();
        clock.advance(2.0);
        fire_completion(&state);

        assert_eq!(player.state(), PlaybackState::Ended);
        assert_eq!(player.elapsed(), 0.0);
        assert_eq!(player.progress(), 0.0);

        player.play().unwrap();
        assert_eq!(player.state(), PlaybackState::Playing);
        assert_eq!(*state.lock().starts.last().unwrap(), 0.0);
    }

    #[test]
    fn test_early_completion_ignored() {
        let (mut player, clock, state) = controller();
        player.load(&seconds_buffer(10)).unwrap();

        player.play().unwrap();
        clock.advance(1.0);
        // A completion nowhere near the end is a leftover from a replaced
        // source, not a real end of stream
        fire_completion(&state);

        assert_eq!(player.state(), PlaybackState::Playing);
        assert!((player.elapsed() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_completion_from_previous_session_ignored() {
        let (mut player, clock, state) = controller();
        player.load(&seconds_buffer(2)).unwrap();
        player.play().unwrap();
        clock.advance(2.0);

        // Completion from the first session arrives late, after a new
        // buffer was loaded and started
        let stale = state.lock().pending_completion.take().unwrap();

        player.load(&seconds_buffer(5)).unwrap();
        player.play().unwrap();
        clock.advance(0.5);
        stale();

        assert_eq!(player.state(), PlaybackState::Playing);
        assert!((player.elapsed() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_load_while_playing_leaves_one_source() {
        let (mut player, _clock, state) = controller();
        player.load(&seconds_buffer(2)).unwrap();
        player.play().unwrap();

        player.load(&seconds_buffer(5)).unwrap();

        let state = state.lock();
        assert_eq!(state.starts.len(), 1);
        assert!(state.stops >= 1, "previous source was not stopped");
        assert!(state.pending_completion.is_none());
        drop(state);

        assert_eq!(player.state(), PlaybackState::Ready);
        assert_eq!(player.duration(), 5.0);
        assert_eq!(player.elapsed(), 0.0);
    }

    #[test]
    fn test_pause_outside_playing_is_noop() {
        let (mut player, _clock, state) = controller();
        player.load(&seconds_buffer(2)).unwrap();

        let stops_before = state.lock().stops;
        player.pause();

        assert_eq!(player.state(), PlaybackState::Ready);
        assert_eq!(state.lock().stops, stops_before);
    }

    #[test]
    fn test_play_without_buffer_is_noop() {
        let (mut player, _clock, state) = controller();
        player.play().unwrap();

        assert_eq!(player.state(), PlaybackState::Idle);
        assert!(state.lock().starts.is_empty());
    }

    #[test]
    fn test_play_resumes_device_context_each_time() {
        let (mut player, clock, state) = controller();
        player.load(&seconds_buffer(5)).unwrap();

        player.play().unwrap();
        clock.advance(1.0);
        player.pause();
        player.play().unwrap();

        assert_eq!(state.lock().resumes, 2);
    }

    #[test]
    fn test_volume_forwarded_to_sink() {
        let (mut player, _clock, state) = controller();
        player.set_volume(0.3);
        assert_eq!(state.lock().volume, 0.3);
    }

    #[test]
    fn test_reset_tears_down() {
        let (mut player, clock, state) = controller();
        player.load(&seconds_buffer(2)).unwrap();
        player.play().unwrap();
        clock.advance(1.0);

        player.reset();

        assert_eq!(player.state(), PlaybackState::Idle);
        assert_eq!(player.duration(), 0.0);
        assert_eq!(player.elapsed(), 0.0);
        assert!(state.lock().pending_completion.is_none());
    }

    #[test]
    fn test_close_on_drop() {
        let (player, _clock, state) = controller();
        drop(player);
        assert!(state.lock().closed);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(5.4), "0:05");
        assert_eq!(format_timestamp(65.0), "1:05");
        assert_eq!(format_timestamp(600.0), "10:00");
        assert_eq!(format_timestamp(-3.0), "0:00");
    }

    #[test]
    fn test_position_display() {
        let (mut player, clock, _state) = controller();
        player.load(&seconds_buffer(125)).unwrap();
        player.play().unwrap();
        clock.advance(65.0);

        assert_eq!(player.position_display(), "1:05 / 2:05");
    }
}
