//! The project store: fine-grained, clamping mutators over the model.
//!
//! Mutators are synchronous and never touch audio hardware. Out-of-range
//! numeric inputs clamp to their documented range instead of failing;
//! referencing an id that does not exist is an error.

use std::collections::BTreeMap;

use loft_audio::AudioArc;
use loft_effects::{EffectError, EffectKind, ParamKey, clamp_param};

use crate::{
    Clip, ClipId, EffectId, EffectInstance, Meter, Project, Track, TrackId, TrackKind,
    TransportState,
};

pub const BPM_MIN: f64 = 30.0;
pub const BPM_MAX: f64 = 300.0;
pub const BEATS_PER_BAR_MAX: u32 = 16;
pub const ZOOM_MIN: f64 = 10.0;
pub const ZOOM_MAX: f64 = 800.0;

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("unknown track {0:?}")]
    UnknownTrack(TrackId),

    #[error("unknown clip {0:?}")]
    UnknownClip(ClipId),

    #[error("unknown effect {0:?}")]
    UnknownEffect(EffectId),

    #[error("clip source is empty")]
    EmptyClipSource,

    #[error(transparent)]
    Effect(#[from] EffectError),
}

/// Single owner of the canonical [`Project`].
pub struct ProjectStore {
    project: Project,
    next_track_id: u64,
    next_clip_id: u64,
    next_effect_id: u64,
}

impl ProjectStore {
    /// A fresh project with one default audio track.
    pub fn new() -> Self {
        let mut store = Self {
            project: Project {
                name: "Untitled".to_string(),
                bpm: 120.0,
                meter: Meter::default(),
                metronome_enabled: false,
                master_gain: 0.8,
                tracks: Vec::new(),
                transport: TransportState::default(),
                zoom_px_per_second: 100.0,
            },
            next_track_id: 1,
            next_clip_id: 1,
            next_effect_id: 1,
        };
        store.add_track(TrackKind::Audio);
        store
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    // -- tracks ------------------------------------------------------------

    pub fn add_track(&mut self, kind: TrackKind) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;
        let name = format!("Track {}", self.project.tracks.len() + 1);
        self.project.tracks.push(Track::new(id, name, kind));
        id
    }

    pub fn remove_track(&mut self, id: TrackId) -> Result<Track, StoreError> {
        let idx = self
            .project
            .tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(StoreError::UnknownTrack(id))?;
        Ok(self.project.tracks.remove(idx))
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut Track, StoreError> {
        self.project
            .track_mut(id)
            .ok_or(StoreError::UnknownTrack(id))
    }

    pub fn set_track_name(&mut self, id: TrackId, name: String) -> Result<(), StoreError> {
        self.track_mut(id)?.name = name;
        Ok(())
    }

    /// Returns the clamped value actually stored.
    pub fn set_track_volume(&mut self, id: TrackId, volume: f32) -> Result<f32, StoreError> {
        let clamped = volume.clamp(0.0, 1.0);
        self.track_mut(id)?.volume = clamped;
        Ok(clamped)
    }

    /// Returns the clamped value actually stored.
    pub fn set_track_pan(&mut self, id: TrackId, pan: f32) -> Result<f32, StoreError> {
        let clamped = pan.clamp(-1.0, 1.0);
        self.track_mut(id)?.pan = clamped;
        Ok(clamped)
    }

    pub fn set_track_muted(&mut self, id: TrackId, muted: bool) -> Result<(), StoreError> {
        self.track_mut(id)?.muted = muted;
        Ok(())
    }

    pub fn set_track_solo(&mut self, id: TrackId, solo: bool) -> Result<(), StoreError> {
        self.track_mut(id)?.solo = solo;
        Ok(())
    }

    pub fn set_track_armed(&mut self, id: TrackId, armed: bool) -> Result<(), StoreError> {
        self.track_mut(id)?.record_armed = armed;
        Ok(())
    }

    pub fn set_track_input_device(
        &mut self,
        id: TrackId,
        device: Option<String>,
    ) -> Result<(), StoreError> {
        self.track_mut(id)?.input_device_id = device;
        Ok(())
    }

    pub fn set_track_output_device(
        &mut self,
        id: TrackId,
        device: Option<String>,
    ) -> Result<(), StoreError> {
        self.track_mut(id)?.output_device_id = device;
        Ok(())
    }

    // -- clips -------------------------------------------------------------

    /// Add a clip at `start_secs` (clamped to >= 0). Duration comes from
    /// the decoded source.
    pub fn add_clip(
        &mut self,
        track: TrackId,
        name: String,
        source: AudioArc,
        start_secs: f64,
    ) -> Result<ClipId, StoreError> {
        if source.is_empty() {
            return Err(StoreError::EmptyClipSource);
        }
        if self.project.track(track).is_none() {
            return Err(StoreError::UnknownTrack(track));
        }
        let id = ClipId(self.next_clip_id);
        self.next_clip_id += 1;
        let duration_secs = source.duration_secs();
        let track = self.track_mut(track)?;
        track.clips.push(Clip {
            id,
            name,
            start_secs: start_secs.max(0.0),
            duration_secs,
            source,
        });
        Ok(id)
    }

    pub fn move_clip(
        &mut self,
        track: TrackId,
        clip: ClipId,
        new_start_secs: f64,
    ) -> Result<(), StoreError> {
        let track = self.track_mut(track)?;
        let clip = track
            .clips
            .iter_mut()
            .find(|c| c.id == clip)
            .ok_or(StoreError::UnknownClip(clip))?;
        clip.start_secs = new_start_secs.max(0.0);
        Ok(())
    }

    pub fn remove_clip(&mut self, track: TrackId, clip: ClipId) -> Result<Clip, StoreError> {
        let track = self.track_mut(track)?;
        let idx = track
            .clips
            .iter()
            .position(|c| c.id == clip)
            .ok_or(StoreError::UnknownClip(clip))?;
        Ok(track.clips.remove(idx))
    }

    // -- effects -----------------------------------------------------------

    /// Append an effect with its documented default parameters to the end
    /// of the track's chain.
    pub fn add_effect(&mut self, track: TrackId, kind: EffectKind) -> Result<EffectId, StoreError> {
        if self.project.track(track).is_none() {
            return Err(StoreError::UnknownTrack(track));
        }
        let id = EffectId(self.next_effect_id);
        self.next_effect_id += 1;
        let track = self.track_mut(track)?;
        track.effects.push(EffectInstance::new(id, kind));
        Ok(id)
    }

    pub fn remove_effect(
        &mut self,
        track: TrackId,
        effect: EffectId,
    ) -> Result<EffectInstance, StoreError> {
        let track = self.track_mut(track)?;
        let idx = track
            .effects
            .iter()
            .position(|e| e.id == effect)
            .ok_or(StoreError::UnknownEffect(effect))?;
        Ok(track.effects.remove(idx))
    }

    /// Flip `enabled`; returns the new state.
    pub fn toggle_effect(&mut self, track: TrackId, effect: EffectId) -> Result<bool, StoreError> {
        let track = self.track_mut(track)?;
        let fx = track
            .effects
            .iter_mut()
            .find(|e| e.id == effect)
            .ok_or(StoreError::UnknownEffect(effect))?;
        fx.enabled = !fx.enabled;
        Ok(fx.enabled)
    }

    /// Set one effect parameter, clamped to its documented range. A key
    /// the effect kind does not have is rejected. Returns the stored value.
    pub fn set_effect_param(
        &mut self,
        track: TrackId,
        effect: EffectId,
        key: ParamKey,
        value: f32,
    ) -> Result<f32, StoreError> {
        let track = self.track_mut(track)?;
        let fx = track
            .effects
            .iter_mut()
            .find(|e| e.id == effect)
            .ok_or(StoreError::UnknownEffect(effect))?;
        let clamped = clamp_param(fx.kind, key, value)?;
        fx.params.insert(key, clamped);
        Ok(clamped)
    }

    pub fn effect_params(
        &self,
        track: TrackId,
        effect: EffectId,
    ) -> Option<&BTreeMap<ParamKey, f32>> {
        self.project.track(track)?.effect(effect).map(|e| &e.params)
    }

    // -- tempo / meter / globals -------------------------------------------

    /// Returns the clamped bpm actually stored.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        self.project.bpm = bpm.clamp(BPM_MIN, BPM_MAX);
        self.project.bpm
    }

    pub fn set_beats_per_bar(&mut self, beats: u32) -> u32 {
        self.project.meter.beats_per_bar = beats.clamp(1, BEATS_PER_BAR_MAX);
        self.project.meter.beats_per_bar
    }

    pub fn set_beat_unit(&mut self, unit: u32) -> u32 {
        self.project.meter.beat_unit = unit.clamp(1, BEATS_PER_BAR_MAX);
        self.project.meter.beat_unit
    }

    pub fn set_zoom(&mut self, px_per_second: f64) -> f64 {
        self.project.zoom_px_per_second = px_per_second.clamp(ZOOM_MIN, ZOOM_MAX);
        self.project.zoom_px_per_second
    }

    pub fn set_metronome_enabled(&mut self, enabled: bool) {
        self.project.metronome_enabled = enabled;
    }

    pub fn set_master_gain(&mut self, gain: f32) -> f32 {
        self.project.master_gain = gain.clamp(0.0, 2.0);
        self.project.master_gain
    }

    pub fn set_project_name(&mut self, name: String) {
        self.project.name = name;
    }

    // -- transport mirror --------------------------------------------------

    pub fn set_current_time(&mut self, secs: f64) {
        self.project.transport.current_time_secs = secs.max(0.0);
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.project.transport.is_playing = playing;
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.project.transport.is_recording = recording;
    }
}

impl Default for ProjectStore {
    fn default() -> Self {
        Self::new()
    }
}
