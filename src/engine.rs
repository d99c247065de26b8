// Engine facade wiring decode -> WAV artifact -> playback
// This is the surface the surrounding application talks to

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::audio::decoder::decode_base64_pcm;
use crate::audio::output::CpalSink;
use crate::audio::player::{PlaybackController, PlaybackState, ProgressFn};
use crate::audio::sink::AudioSink;
use crate::audio::wav::encode_wav;
use crate::download::DownloadArtifact;
use crate::error::AudioError;
use crate::settings::EngineSettings;
use std::time::Duration;

/// One narration session end to end: decodes the synthesis payload, builds
/// the download artifact, and drives playback.
///
/// A failed audio device disables playback only; decoding and the download
/// artifact keep working so the rest of the view stays usable.
pub struct AudioEngine<S: AudioSink> {
    controller: Option<PlaybackController<S>>,
    artifact: Option<DownloadArtifact>,
    export_dir: Option<PathBuf>,
}

impl AudioEngine<CpalSink> {
    /// Open the default output device and apply persisted settings.
    pub fn open_default(settings: &EngineSettings) -> Self {
        let controller = match CpalSink::open() {
            Ok(sink) => {
                let tick = Duration::from_millis(settings.playback.progress_tick_ms);
                let mut controller = PlaybackController::with_tick(sink, tick);
                controller.set_volume(settings.playback.volume);
                Some(controller)
            }
            Err(e) => {
                log::error!("Audio device unavailable, playback disabled: {}", e);
                None
            }
        };

        Self {
            controller,
            artifact: None,
            export_dir: settings.download.export_dir.clone(),
        }
    }
}

impl<S: AudioSink> AudioEngine<S> {
    /// Build an engine around an already-open sink.
    pub fn with_sink(sink: S) -> Self {
        Self {
            controller: Some(PlaybackController::new(sink)),
            artifact: None,
            export_dir: None,
        }
    }

    /// Whether an output device is available for playback.
    pub fn can_play(&self) -> bool {
        self.controller.is_some()
    }

    /// Take a synthesis payload and make it playable and downloadable.
    ///
    /// Replaces the previous narration: the old session is torn down and the
    /// old artifact dropped before the new one is exposed. Decode failures
    /// surface to the caller; a device failure while binding the buffer is
    /// logged and leaves the download artifact usable with playback dead.
    pub fn load_narration(&mut self, payload: &str, title: &str) -> Result<(), AudioError> {
        let buffer = decode_base64_pcm(payload)?;

        self.artifact = None;
        let bytes = encode_wav(&buffer)?;
        self.artifact = Some(DownloadArtifact::new(title, bytes));

        if let Some(controller) = self.controller.as_mut() {
            if let Err(e) = controller.load(&buffer) {
                log::error!("Binding narration to the audio device failed: {}", e);
                controller.reset();
            }
        }

        Ok(())
    }

    pub fn play(&mut self) -> Result<(), AudioError> {
        if let Some(controller) = self.controller.as_mut() {
            controller.play()?;
        }
        Ok(())
    }

    pub fn pause(&mut self) {
        if let Some(controller) = self.controller.as_mut() {
            controller.pause();
        }
    }

    /// Drop the current narration entirely.
    pub fn reset(&mut self) {
        if let Some(controller) = self.controller.as_mut() {
            controller.reset();
        }
        self.artifact = None;
    }

    pub fn set_volume(&mut self, volume: f32) {
        if let Some(controller) = self.controller.as_mut() {
            controller.set_volume(volume);
        }
    }

    /// Register the observer fed by the progress ticker while playing.
    pub fn on_progress(&mut self, observer: ProgressFn) {
        if let Some(controller) = self.controller.as_mut() {
            controller.on_progress(observer);
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.controller
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(PlaybackState::Idle)
    }

    /// Playback progress in [0, 1].
    pub fn progress(&self) -> f32 {
        self.controller.as_ref().map(|c| c.progress()).unwrap_or(0.0)
    }

    /// Duration of the loaded narration in seconds.
    pub fn duration(&self) -> f64 {
        self.controller.as_ref().map(|c| c.duration()).unwrap_or(0.0)
    }

    /// Transport readout, e.g. `0:42 / 3:05`.
    pub fn position_display(&self) -> String {
        self.controller
            .as_ref()
            .map(|c| c.position_display())
            .unwrap_or_else(|| "0:00 / 0:00".to_string())
    }

    /// The downloadable WAV for the current narration, if one is loaded.
    pub fn artifact(&self) -> Option<&DownloadArtifact> {
        self.artifact.as_ref()
    }

    /// Save the current narration to the configured export directory.
    pub fn export(&self) -> Result<PathBuf> {
        let artifact = self
            .artifact
            .as_ref()
            .ok_or_else(|| anyhow!("no narration loaded"))?;

        let dir = self
            .export_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        artifact.save_to(&dir)
    }

    /// Override the export directory from settings.
    pub fn set_export_dir(&mut self, dir: Option<&Path>) {
        self.export_dir = dir.map(Path::to_path_buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::test_support::FakeSink;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use crate::error::DecodeError;

    fn payload_of(samples: &[i16]) -> String {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    fn engine() -> AudioEngine<FakeSink> {
        let (sink, _clock, _state) = FakeSink::new();
        AudioEngine::with_sink(sink)
    }

    #[test]
    fn test_load_produces_artifact_and_ready_state() {
        let mut engine = engine();
        engine
            .load_narration(&payload_of(&[0, 100, -100, 200]), "My Document")
            .unwrap();

        assert_eq!(engine.state(), PlaybackState::Ready);
        let artifact = engine.artifact().unwrap();
        assert_eq!(artifact.file_name(), "My Document.wav");
        assert_eq!(artifact.mime_type(), "audio/wav");
        // 44-byte header plus 2 bytes per sample
        assert_eq!(artifact.bytes().len(), 44 + 8);
    }

    #[test]
    fn test_decode_failure_surfaces_and_withholds_artifact() {
        let mut engine = engine();
        let result = engine.load_narration("###", "Broken");

        assert!(matches!(
            result,
            Err(AudioError::Decode(DecodeError::Base64(_)))
        ));
        assert!(engine.artifact().is_none());
        assert_eq!(engine.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_reload_replaces_artifact() {
        let mut engine = engine();
        engine.load_narration(&payload_of(&[1, 2]), "First").unwrap();
        engine.load_narration(&payload_of(&[3, 4]), "Second").unwrap();

        assert_eq!(engine.artifact().unwrap().file_name(), "Second.wav");
    }

    #[test]
    fn test_transport_round_trip() {
        let mut engine = engine();
        engine
            .load_narration(&payload_of(&vec![0i16; 24000]), "One Second")
            .unwrap();

        engine.play().unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        engine.pause();
        assert_eq!(engine.state(), PlaybackState::Paused);

        engine.reset();
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(engine.artifact().is_none());
    }

    #[test]
    fn test_export_without_narration_fails() {
        let engine = engine();
        assert!(engine.export().is_err());
    }

    #[test]
    fn test_position_display_idle() {
        let engine = engine();
        assert_eq!(engine.position_display(), "0:00 / 0:00");
    }
}
