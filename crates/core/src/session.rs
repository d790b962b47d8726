//! The control-thread facade over the whole workstation.
//!
//! A [`Session`] owns the project store, the (lazily started) playback
//! engine and any in-flight input captures. Structural edits rebuild and
//! swap the render graph when playing; parameter edits mirror through
//! live commands without a rebuild.

use std::collections::HashMap;
use std::path::Path;

use basedrop::Owned;
use loft_audio::AudioArc;
use loft_decode::{DecodeError, decode_bytes, decode_file};
use loft_effects::{EffectKind, ParamKey};
use loft_engine::{Command, EngineHandle, build_graph};
use loft_model::{ClipId, EffectId, Project, ProjectStore, StoreError, TrackId, TrackKind};
use loft_record::{Capture, CaptureError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No audio output could be opened; playback actions are no-ops.
    #[error("audio engine is not available")]
    EngineNotReady,

    #[error("cannot seek while the transport is playing")]
    TransportBusy,

    #[error("no record-armed audio track")]
    NoArmedTracks,

    #[error("no input could be opened for any armed track")]
    NoInputOpened,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

struct ActiveCapture {
    capture: Capture,
    started_at_secs: f64,
}

pub struct Session {
    store: ProjectStore,
    engine: Option<EngineHandle>,
    captures: HashMap<TrackId, ActiveCapture>,
    playback_state: PlaybackState,
}

impl Session {
    pub fn new() -> Self {
        Self {
            store: ProjectStore::new(),
            engine: None,
            captures: HashMap::new(),
            playback_state: PlaybackState::Stopped,
        }
    }

    pub fn project(&self) -> &Project {
        self.store.project()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback_state
    }

    pub fn is_playing(&self) -> bool {
        self.playback_state.is_playing()
    }

    pub fn is_recording(&self) -> bool {
        !self.captures.is_empty()
    }

    // ----- transport -----

    /// Start (or resume) playback from the stored `current_time`.
    pub fn play(&mut self) -> Result<(), SessionError> {
        self.ensure_engine()?;
        self.install_graph();

        let project = self.store.project();
        let bpm = project.bpm;
        let beats_per_bar = project.meter.beats_per_bar;
        let metronome = project.metronome_enabled;
        let master_gain = project.master_gain;
        let current = project.transport.current_time_secs;

        if let Some(engine) = &mut self.engine {
            let frame = engine.secs_to_frames(current);
            send(engine, Command::SetTempo(bpm));
            send(engine, Command::SetBeatsPerBar(beats_per_bar));
            send(engine, Command::SetMetronome(metronome));
            send(engine, Command::SetMasterGain(master_gain));
            send(engine, Command::Seek { frame });
            send(engine, Command::Play);
        }

        self.store.set_playing(true);
        self.playback_state = PlaybackState::Playing;
        Ok(())
    }

    /// Pause in place; `current_time` snaps to the engine's clock so a
    /// following `play()` resumes exactly where audio stopped.
    pub fn pause(&mut self) {
        if let Some(engine) = &mut self.engine {
            send(engine, Command::Pause);
            let secs = engine.position_secs();
            self.store.set_current_time(secs);
        }
        self.store.set_playing(false);
        if self.playback_state == PlaybackState::Playing {
            self.playback_state = PlaybackState::Paused;
        }
    }

    /// Stop playback and rewind to zero. Any in-flight recording is
    /// committed first; the created clips are returned.
    pub fn stop(&mut self) -> Result<Vec<ClipId>, SessionError> {
        let created = if self.is_recording() {
            self.stop_recording()?
        } else {
            Vec::new()
        };

        if let Some(engine) = &mut self.engine {
            send(engine, Command::Stop);
            // dispose all players; a fresh graph is built on the next play
            let empty = Owned::new(&engine.handle, loft_engine::RenderGraph::empty());
            if engine.graphs.push(empty).is_err() {
                tracing::warn!("graph ring full, keeping previous graph");
            }
            engine.collector.collect();
        }

        self.store.set_playing(false);
        self.store.set_recording(false);
        self.store.set_current_time(0.0);
        self.playback_state = PlaybackState::Stopped;
        Ok(created)
    }

    /// Move the playhead. Only valid while the transport is not playing.
    pub fn seek(&mut self, secs: f64) -> Result<(), SessionError> {
        if self.store.project().transport.is_playing {
            return Err(SessionError::TransportBusy);
        }
        let secs = secs.max(0.0);
        self.store.set_current_time(secs);
        if let Some(engine) = &mut self.engine {
            let frame = engine.secs_to_frames(secs);
            send(engine, Command::Seek { frame });
        }
        Ok(())
    }

    /// Refresh `current_time` from the engine clock. Call at UI cadence.
    pub fn poll(&mut self) -> f64 {
        if self.store.project().transport.is_playing {
            if let Some(engine) = &self.engine {
                let secs = engine.position_secs();
                self.store.set_current_time(secs);
            }
        }
        self.store.project().transport.current_time_secs
    }

    // ----- project-wide parameters -----

    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        let bpm = self.store.set_bpm(bpm);
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetTempo(bpm));
        }
        bpm
    }

    pub fn set_beats_per_bar(&mut self, beats: u32) -> u32 {
        let beats = self.store.set_beats_per_bar(beats);
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetBeatsPerBar(beats));
        }
        beats
    }

    pub fn set_beat_unit(&mut self, unit: u32) -> u32 {
        self.store.set_beat_unit(unit)
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.store.set_metronome_enabled(enabled);
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetMetronome(enabled));
        }
    }

    pub fn set_master_gain(&mut self, gain: f32) -> f32 {
        let gain = self.store.set_master_gain(gain);
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetMasterGain(gain));
        }
        gain
    }

    pub fn set_zoom(&mut self, px_per_second: f64) -> f64 {
        self.store.set_zoom(px_per_second)
    }

    pub fn set_project_name(&mut self, name: String) {
        self.store.set_project_name(name);
    }

    // ----- tracks -----

    pub fn add_track(&mut self, kind: TrackKind) -> TrackId {
        let id = self.store.add_track(kind);
        self.resync_if_playing();
        id
    }

    /// Remove a track. An in-flight capture on it is aborted and discarded.
    pub fn remove_track(&mut self, track: TrackId) -> Result<(), SessionError> {
        if self.captures.remove(&track).is_some() {
            tracing::warn!(track = track.0, "aborting capture on removed track");
            self.store.set_recording(!self.captures.is_empty());
        }
        self.store.remove_track(track)?;
        self.resync_if_playing();
        Ok(())
    }

    pub fn set_track_name(&mut self, track: TrackId, name: String) -> Result<(), SessionError> {
        self.store.set_track_name(track, name)?;
        Ok(())
    }

    pub fn set_track_volume(&mut self, track: TrackId, volume: f32) -> Result<f32, SessionError> {
        let volume = self.store.set_track_volume(track, volume)?;
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetTrackVolume { track, value: volume });
        }
        Ok(volume)
    }

    pub fn set_track_pan(&mut self, track: TrackId, pan: f32) -> Result<f32, SessionError> {
        let pan = self.store.set_track_pan(track, pan)?;
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetTrackPan { track, value: pan });
        }
        Ok(pan)
    }

    pub fn set_track_muted(&mut self, track: TrackId, muted: bool) -> Result<(), SessionError> {
        self.store.set_track_muted(track, muted)?;
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetTrackMuted { track, muted });
        }
        Ok(())
    }

    pub fn set_track_solo(&mut self, track: TrackId, solo: bool) -> Result<(), SessionError> {
        self.store.set_track_solo(track, solo)?;
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetTrackSolo { track, solo });
        }
        Ok(())
    }

    pub fn set_track_input_device(
        &mut self,
        track: TrackId,
        device: Option<String>,
    ) -> Result<(), SessionError> {
        self.store.set_track_input_device(track, device)?;
        Ok(())
    }

    pub fn set_track_output_device(
        &mut self,
        track: TrackId,
        device: Option<String>,
    ) -> Result<(), SessionError> {
        self.store.set_track_output_device(track, device)?;
        Ok(())
    }

    // ----- clips -----

    /// Decode a file from disk and place it on the timeline.
    pub fn add_clip_from_file(
        &mut self,
        track: TrackId,
        path: &Path,
        start_secs: f64,
    ) -> Result<ClipId, SessionError> {
        let decoded = decode_file(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("clip")
            .to_string();
        let id = self.store.add_clip(track, name, decoded.audio, start_secs)?;
        self.resync_if_playing();
        Ok(id)
    }

    pub fn add_clip(
        &mut self,
        track: TrackId,
        name: String,
        source: AudioArc,
        start_secs: f64,
    ) -> Result<ClipId, SessionError> {
        let id = self.store.add_clip(track, name, source, start_secs)?;
        self.resync_if_playing();
        Ok(id)
    }

    pub fn move_clip(
        &mut self,
        track: TrackId,
        clip: ClipId,
        start_secs: f64,
    ) -> Result<(), SessionError> {
        self.store.move_clip(track, clip, start_secs)?;
        self.resync_if_playing();
        Ok(())
    }

    pub fn remove_clip(&mut self, track: TrackId, clip: ClipId) -> Result<(), SessionError> {
        self.store.remove_clip(track, clip)?;
        self.resync_if_playing();
        Ok(())
    }

    // ----- effects -----

    pub fn add_effect(
        &mut self,
        track: TrackId,
        kind: EffectKind,
    ) -> Result<EffectId, SessionError> {
        let id = self.store.add_effect(track, kind)?;
        self.resync_if_playing();
        Ok(id)
    }

    pub fn remove_effect(&mut self, track: TrackId, effect: EffectId) -> Result<(), SessionError> {
        self.store.remove_effect(track, effect)?;
        self.resync_if_playing();
        Ok(())
    }

    pub fn toggle_effect(&mut self, track: TrackId, effect: EffectId) -> Result<bool, SessionError> {
        let enabled = self.store.toggle_effect(track, effect)?;
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetEffectEnabled { track, effect, enabled });
        }
        Ok(enabled)
    }

    pub fn set_effect_param(
        &mut self,
        track: TrackId,
        effect: EffectId,
        key: ParamKey,
        value: f32,
    ) -> Result<f32, SessionError> {
        let value = self.store.set_effect_param(track, effect, key, value)?;
        if let Some(engine) = &mut self.engine {
            send(engine, Command::SetEffectParam { track, effect, key, value });
        }
        Ok(value)
    }

    // ----- recording -----

    pub fn arm_track(&mut self, track: TrackId, armed: bool) -> Result<(), SessionError> {
        self.store.set_track_armed(track, armed)?;
        Ok(())
    }

    /// Open an input capture for every armed audio track. Starts playback
    /// if the transport is stopped, so takes are positioned by the clock.
    /// Per-track open failures are isolated; failing every open is an error.
    pub fn start_recording(&mut self) -> Result<(), SessionError> {
        let armed: Vec<(TrackId, Option<String>)> = self
            .store
            .project()
            .tracks
            .iter()
            .filter(|t| t.record_armed && t.kind == TrackKind::Audio)
            .map(|t| (t.id, t.input_device_id.clone()))
            .collect();

        if armed.is_empty() {
            return Err(SessionError::NoArmedTracks);
        }

        let was_playing = self.store.project().transport.is_playing;
        if !was_playing {
            self.play()?;
        }
        // A running engine's clock is fresher than the store copy, which
        // only moves on poll(). Right after a cold play() the engine has
        // not processed the seek yet, so the store value is the start.
        let started_at_secs = if was_playing {
            self.record_start_secs()
        } else {
            self.store.project().transport.current_time_secs
        };

        for (track, device) in armed {
            match Capture::open(device.as_deref()) {
                Ok(capture) => {
                    self.captures.insert(
                        track,
                        ActiveCapture {
                            capture,
                            started_at_secs,
                        },
                    );
                }
                Err(err) => {
                    tracing::warn!(track = track.0, %err, "could not open input for armed track");
                }
            }
        }

        if self.captures.is_empty() {
            return Err(SessionError::NoInputOpened);
        }

        self.store.set_recording(true);
        Ok(())
    }

    /// Finish all captures and commit each take as a clip at its record
    /// start. A take that fails to finalize or decode is discarded alone.
    pub fn stop_recording(&mut self) -> Result<Vec<ClipId>, SessionError> {
        let mut created = Vec::new();
        let finished: Vec<(TrackId, ActiveCapture)> = self.captures.drain().collect();

        for (track, active) in finished {
            let started_at_secs = active.started_at_secs;
            let captured = match active.capture.finish() {
                Ok(captured) => captured,
                Err(err) => {
                    tracing::warn!(track = track.0, %err, "discarding failed take");
                    continue;
                }
            };
            if captured.frames == 0 {
                continue;
            }
            match commit_take(&mut self.store, track, &captured.wav_bytes, started_at_secs) {
                Ok(id) => created.push(id),
                Err(err) => {
                    tracing::warn!(track = track.0, %err, "discarding undecodable take");
                }
            }
        }

        self.store.set_recording(false);
        if !created.is_empty() {
            self.resync_if_playing();
        }
        Ok(created)
    }

    /// Where the playhead is right now: the engine's frame clock while it
    /// runs, the stored transport time otherwise.
    fn record_start_secs(&self) -> f64 {
        match &self.engine {
            Some(engine) => engine.position_secs(),
            None => self.store.project().transport.current_time_secs,
        }
    }

    // ----- engine plumbing -----

    fn ensure_engine(&mut self) -> Result<(), SessionError> {
        if self.engine.is_none() {
            match loft_engine::start(self.store.project()) {
                Ok(engine) => self.engine = Some(engine),
                Err(err) => {
                    tracing::warn!(%err, "audio engine unavailable");
                    return Err(SessionError::EngineNotReady);
                }
            }
        }
        Ok(())
    }

    /// Build a graph from the current project and swap it into the
    /// callback. The retired graph is freed here via the collector.
    fn install_graph(&mut self) {
        let Some(engine) = &mut self.engine else {
            return;
        };
        let graph = build_graph(self.store.project(), engine.sample_rate, engine.channels);
        let owned = Owned::new(&engine.handle, graph);
        if engine.graphs.push(owned).is_err() {
            tracing::warn!("graph ring full, dropping rebuild");
        }
        engine.collector.collect();
    }

    fn resync_if_playing(&mut self) {
        if self.store.project().transport.is_playing {
            self.install_graph();
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn send(engine: &mut EngineHandle, cmd: Command) {
    if engine.commands.push(cmd).is_err() {
        tracing::warn!("command ring full, dropping command");
    }
}

/// Decode a finalized take and commit it as a clip at the record start.
fn commit_take(
    store: &mut ProjectStore,
    track: TrackId,
    wav_bytes: &[u8],
    start_secs: f64,
) -> Result<ClipId, SessionError> {
    let decoded = decode_bytes(wav_bytes)?;
    let take_number = store
        .project()
        .track(track)
        .map(|t| t.clips.len() + 1)
        .unwrap_or(1);
    let id = store.add_clip(track, format!("Take {take_number}"), decoded.audio, start_secs)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames * channels as usize {
                writer.write_sample((i as f32 * 0.001).sin() * 0.25).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_new_session_has_a_default_track() {
        let session = Session::new();
        assert_eq!(session.project().tracks.len(), 1);
        assert_eq!(session.playback_state(), PlaybackState::Stopped);
        assert!(!session.is_recording());
    }

    #[test]
    fn test_store_edits_work_without_an_engine() {
        let mut session = Session::new();
        let track = session.add_track(TrackKind::Audio);
        session.set_track_volume(track, 0.25).unwrap();
        session.set_track_pan(track, -0.5).unwrap();
        let fx = session.add_effect(track, EffectKind::Reverb).unwrap();
        let wet = session
            .set_effect_param(track, fx, ParamKey::Wet, 2.0)
            .unwrap();
        assert_eq!(wet, 1.0); // clamped

        let t = session.project().track(track).unwrap();
        assert_eq!(t.volume, 0.25);
        assert_eq!(t.effects.len(), 1);
    }

    #[test]
    fn test_seek_while_stopped_moves_the_playhead() {
        let mut session = Session::new();
        session.seek(3.25).unwrap();
        assert_eq!(session.project().transport.current_time_secs, 3.25);
        session.seek(-2.0).unwrap();
        assert_eq!(session.project().transport.current_time_secs, 0.0);
    }

    #[test]
    fn test_start_recording_requires_an_armed_track() {
        let mut session = Session::new();
        let err = session.start_recording().unwrap_err();
        assert!(matches!(err, SessionError::NoArmedTracks));
    }

    #[test]
    fn test_midi_tracks_do_not_count_as_armed() {
        let mut session = Session::new();
        let midi = session.add_track(TrackKind::Midi);
        session.arm_track(midi, true).unwrap();
        let err = session.start_recording().unwrap_err();
        assert!(matches!(err, SessionError::NoArmedTracks));
    }

    #[test]
    fn test_commit_take_places_clip_at_record_start() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        let bytes = wav_bytes(44100, 1, 44100);

        let clip = commit_take(&mut store, track, &bytes, 2.0).unwrap();

        let c = store.project().track(track).unwrap().clip(clip).unwrap();
        assert_eq!(c.start_secs, 2.0);
        assert!((c.duration_secs - 1.0).abs() < 1e-6);
        assert_eq!(c.name, "Take 1");
    }

    #[test]
    fn test_commit_take_numbers_successive_takes() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        let bytes = wav_bytes(44100, 1, 4410);

        commit_take(&mut store, track, &bytes, 0.0).unwrap();
        let second = commit_take(&mut store, track, &bytes, 1.0).unwrap();

        let c = store.project().track(track).unwrap().clip(second).unwrap();
        assert_eq!(c.name, "Take 2");
    }

    #[test]
    fn test_commit_take_rejects_corrupt_bytes_without_touching_track() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        let garbage = vec![0x42u8; 256];

        assert!(commit_take(&mut store, track, &garbage, 0.0).is_err());
        assert!(store.project().track(track).unwrap().clips.is_empty());
    }

    #[test]
    fn test_commit_take_to_removed_track_fails_cleanly() {
        let mut store = ProjectStore::new();
        let track = store.add_track(TrackKind::Audio);
        store.remove_track(track).unwrap();
        let bytes = wav_bytes(44100, 1, 4410);

        let err = commit_take(&mut store, track, &bytes, 0.0).unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::UnknownTrack(_))));
    }

    #[test]
    fn test_add_clip_from_file_names_clip_after_file() {
        let mut session = Session::new();
        let track = session.project().tracks[0].id;
        let bytes = wav_bytes(48000, 2, 4800);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guitar_take.wav");
        std::fs::write(&path, bytes).unwrap();

        let clip = session.add_clip_from_file(track, &path, 0.5).unwrap();
        let c = session.project().track(track).unwrap().clip(clip).unwrap();
        assert_eq!(c.name, "guitar_take");
        assert_eq!(c.start_secs, 0.5);
    }

    #[test]
    fn test_parameter_setters_report_clamped_values() {
        let mut session = Session::new();
        assert_eq!(session.set_bpm(1000.0), 300.0);
        assert_eq!(session.set_bpm(1.0), 30.0);
        assert_eq!(session.set_master_gain(5.0), 2.0);
        let track = session.project().tracks[0].id;
        assert_eq!(session.set_track_volume(track, 7.0).unwrap(), 1.0);
        assert_eq!(session.set_track_pan(track, -9.0).unwrap(), -1.0);
    }

    #[test]
    fn test_record_start_uses_stored_time_without_an_engine() {
        let mut session = Session::new();
        session.store.set_current_time(1.5);
        session.store.set_playing(true);
        assert_eq!(session.record_start_secs(), 1.5);
    }

    #[test]
    fn test_remove_track_with_unknown_id_errors() {
        let mut session = Session::new();
        let err = session.remove_track(TrackId(999)).unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::UnknownTrack(_))));
    }
}
