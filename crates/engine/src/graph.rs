//! The render graph: an immutable-shape snapshot of the project that the
//! audio callback plays, plus the per-callback render state.
//!
//! Structural edits (clips added, tracks removed, effects inserted) build a
//! fresh graph on the control thread and swap it in over a ring buffer.
//! Continuous parameters (volume, pan, effect params, tempo) are patched in
//! place through [`Command`]s so a fader drag never rebuilds anything.

use loft_audio::AudioArc;
use loft_effects::{EffectNode, ParamKey, build_effect};
use loft_model::{EffectId, Project, TrackId, TrackKind};

/// Control messages applied inside the audio callback.
#[derive(Debug, Clone, Copy)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Seek { frame: u64 },
    SetTempo(f64),
    SetBeatsPerBar(u32),
    SetMetronome(bool),
    SetMasterGain(f32),
    SetTrackVolume { track: TrackId, value: f32 },
    SetTrackPan { track: TrackId, value: f32 },
    SetTrackMuted { track: TrackId, muted: bool },
    SetTrackSolo { track: TrackId, solo: bool },
    SetEffectEnabled { track: TrackId, effect: EffectId, enabled: bool },
    SetEffectParam { track: TrackId, effect: EffectId, key: ParamKey, value: f32 },
}

/// A clip ready to play: audio resampled to the engine rate, placement
/// fixed in engine frames.
pub struct ClipPlayer {
    pub start_frame: u64,
    pub frames: u64,
    pub audio: AudioArc,
}

impl ClipPlayer {
    /// Add this clip's contribution to an interleaved block that starts at
    /// absolute frame `block_start`. Indexing is absolute, so starting
    /// playback mid-clip picks up at the right offset.
    fn mix_into(&self, out: &mut [f32], channels: usize, block_start: u64) {
        let block_frames = (out.len() / channels) as u64;
        let block_end = block_start + block_frames;
        let clip_end = self.start_frame + self.frames;
        if block_end <= self.start_frame || block_start >= clip_end {
            return;
        }

        let from = block_start.max(self.start_frame);
        let to = block_end.min(clip_end);
        let samples = self.audio.samples();
        let clip_channels = self.audio.channels() as usize;

        for pos in from..to {
            let src_frame = (pos - self.start_frame) as usize;
            let dst_frame = (pos - block_start) as usize;
            for ch in 0..channels {
                let idx = src_frame * clip_channels + ch % clip_channels;
                out[dst_frame * channels + ch] += samples[idx];
            }
        }
    }
}

pub struct ChainSlot {
    pub id: EffectId,
    pub enabled: bool,
    pub node: Box<dyn EffectNode>,
}

pub struct TrackGraph {
    pub id: TrackId,
    pub volume: f32,
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub players: Vec<ClipPlayer>,
    pub chain: Vec<ChainSlot>,
}

pub struct RenderGraph {
    pub tracks: Vec<TrackGraph>,
}

impl RenderGraph {
    pub fn empty() -> Self {
        Self { tracks: Vec::new() }
    }

    fn track_mut(&mut self, id: TrackId) -> Option<&mut TrackGraph> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }
}

/// Snapshot `project` into a playable graph at the engine's rate and
/// channel count. Clips that fail to resample are skipped with a warning
/// rather than failing the whole graph.
pub fn build_graph(project: &Project, sample_rate: u32, channels: usize) -> RenderGraph {
    let mut tracks = Vec::with_capacity(project.tracks.len());

    for track in &project.tracks {
        let mut players = Vec::new();
        if track.kind == TrackKind::Audio {
            for clip in &track.clips {
                if clip.source.is_empty() {
                    continue;
                }
                let audio = match clip.source.resample(sample_rate) {
                    Ok(audio) => audio,
                    Err(err) => {
                        tracing::warn!(clip = clip.id.0, %err, "skipping clip: resample failed");
                        continue;
                    }
                };
                players.push(ClipPlayer {
                    start_frame: (clip.start_secs * sample_rate as f64).round() as u64,
                    frames: audio.frames() as u64,
                    audio,
                });
            }
        }

        let chain = track
            .effects
            .iter()
            .map(|fx| ChainSlot {
                id: fx.id,
                enabled: fx.enabled,
                node: build_effect(fx.kind, &fx.params, sample_rate, channels),
            })
            .collect();

        tracks.push(TrackGraph {
            id: track.id,
            volume: track.volume,
            pan: track.pan,
            muted: track.muted,
            solo: track.solo,
            players,
            chain,
        });
    }

    RenderGraph { tracks }
}

/// Constant-power pan gains for a stereo pair.
fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * 0.25 * std::f32::consts::PI;
    (angle.cos(), angle.sin())
}

/// Mutable playback state owned by the audio callback.
pub struct RenderState {
    pub playing: bool,
    pub position: u64,
    pub master_gain: f32,
    pub metronome: crate::Metronome,
    scratch: Vec<f32>,
}

impl RenderState {
    pub fn new(sample_rate: u32, project: &Project) -> Self {
        Self {
            playing: false,
            position: 0,
            master_gain: project.master_gain,
            metronome: crate::Metronome::new(
                sample_rate,
                project.bpm,
                project.meter.beats_per_bar,
                project.metronome_enabled,
            ),
            scratch: Vec::new(),
        }
    }

    pub fn apply(&mut self, graph: &mut RenderGraph, cmd: Command) {
        match cmd {
            Command::Play => {
                self.playing = true;
                self.metronome.sync(self.position);
            }
            Command::Pause => self.playing = false,
            Command::Stop => {
                self.playing = false;
                self.position = 0;
                self.metronome.sync(0);
                for track in &mut graph.tracks {
                    for slot in &mut track.chain {
                        slot.node.reset();
                    }
                }
            }
            Command::Seek { frame } => {
                self.position = frame;
                self.metronome.sync(frame);
            }
            Command::SetTempo(bpm) => self.metronome.set_tempo(bpm, self.position),
            Command::SetBeatsPerBar(n) => self.metronome.set_beats_per_bar(n),
            Command::SetMetronome(enabled) => self.metronome.set_enabled(enabled),
            Command::SetMasterGain(gain) => self.master_gain = gain,
            Command::SetTrackVolume { track, value } => {
                if let Some(t) = graph.track_mut(track) {
                    t.volume = value;
                }
            }
            Command::SetTrackPan { track, value } => {
                if let Some(t) = graph.track_mut(track) {
                    t.pan = value;
                }
            }
            Command::SetTrackMuted { track, muted } => {
                if let Some(t) = graph.track_mut(track) {
                    t.muted = muted;
                }
            }
            Command::SetTrackSolo { track, solo } => {
                if let Some(t) = graph.track_mut(track) {
                    t.solo = solo;
                }
            }
            Command::SetEffectEnabled { track, effect, enabled } => {
                if let Some(t) = graph.track_mut(track) {
                    if let Some(slot) = t.chain.iter_mut().find(|s| s.id == effect) {
                        slot.enabled = enabled;
                        if !enabled {
                            slot.node.reset();
                        }
                    }
                }
            }
            Command::SetEffectParam { track, effect, key, value } => {
                if let Some(t) = graph.track_mut(track) {
                    if let Some(slot) = t.chain.iter_mut().find(|s| s.id == effect) {
                        slot.node.set_param(key, value);
                    }
                }
            }
        }
    }

    /// Render one interleaved block into `out`.
    ///
    /// Per track: sum overlapping clips, apply gain and pan, run the effect
    /// chain, then sum audible tracks to the master bus. Chains run even on
    /// muted tracks so reverb and delay tails stay warm across mute toggles.
    pub fn render(&mut self, graph: &mut RenderGraph, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if !self.playing {
            return;
        }

        let frames = out.len() / channels;
        if self.scratch.len() < out.len() {
            self.scratch.resize(out.len(), 0.0);
        }

        let any_solo = graph.tracks.iter().any(|t| t.solo);

        for track in &mut graph.tracks {
            let scratch = &mut self.scratch[..out.len()];
            scratch.fill(0.0);

            for player in &track.players {
                player.mix_into(scratch, channels, self.position);
            }

            let (left, right) = pan_gains(track.pan);
            for frame in scratch.chunks_mut(channels) {
                for (ch, sample) in frame.iter_mut().enumerate() {
                    let pan_gain = if channels >= 2 {
                        match ch {
                            0 => left,
                            1 => right,
                            _ => 1.0,
                        }
                    } else {
                        1.0
                    };
                    *sample *= track.volume * pan_gain;
                }
            }

            for slot in &mut track.chain {
                if slot.enabled {
                    slot.node.process(scratch, channels);
                }
            }

            let audible = !track.muted && (!any_solo || track.solo);
            if audible {
                for (o, s) in out.iter_mut().zip(scratch.iter()) {
                    *o += *s;
                }
            }
        }

        // the click joins the bus ahead of the master stage, so master
        // gain scales it like everything else
        self.metronome.render(out, channels, self.position);

        for sample in out.iter_mut() {
            *sample *= self.master_gain;
        }

        self.position += frames as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loft_effects::EffectKind;
    use loft_model::{ProjectStore, TrackKind};

    const SR: u32 = 48000;

    fn audio(frames: usize, value: f32) -> AudioArc {
        AudioArc::new(vec![value; frames * 2], SR, 2)
    }

    fn render(
        graph: &mut RenderGraph,
        state: &mut RenderState,
        frames: usize,
    ) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * 2];
        state.render(graph, &mut out, 2);
        out
    }

    fn playing_state(store: &ProjectStore) -> RenderState {
        let mut state = RenderState::new(SR, store.project());
        state.playing = true;
        state.metronome.set_enabled(false);
        state
    }

    #[test]
    fn test_graph_has_one_player_per_clip() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        store.add_clip(track, "a".into(), audio(100, 0.1), 0.0).unwrap();
        store.add_clip(track, "b".into(), audio(100, 0.1), 1.0).unwrap();

        let graph = build_graph(store.project(), SR, 2);
        assert_eq!(graph.tracks.len(), 1);
        assert_eq!(graph.tracks[0].players.len(), 2);
    }

    #[test]
    fn test_midi_tracks_get_no_players() {
        let mut store = ProjectStore::new();
        let midi = store.add_track(TrackKind::Midi);
        store.add_clip(midi, "notes".into(), audio(100, 0.1), 0.0).unwrap();

        let graph = build_graph(store.project(), SR, 2);
        let tg = graph.tracks.iter().find(|t| t.id == midi).unwrap();
        assert!(tg.players.is_empty());
    }

    #[test]
    fn test_rebuild_reflects_removed_clip() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        let clip = store.add_clip(track, "a".into(), audio(100, 0.1), 0.0).unwrap();
        let graph = build_graph(store.project(), SR, 2);
        assert_eq!(graph.tracks[0].players.len(), 1);

        store.remove_clip(track, clip).unwrap();
        let graph = build_graph(store.project(), SR, 2);
        assert!(graph.tracks[0].players.is_empty());
    }

    #[test]
    fn test_playback_from_mid_clip_uses_absolute_offset() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        // two-second clip at t=0: first second 0.5, second second -0.25
        let mut samples = vec![0.5f32; SR as usize];
        samples.extend(vec![-0.25f32; SR as usize]);
        let clip = AudioArc::new(samples, SR, 1);
        store.add_clip(track, "take".into(), clip, 0.0).unwrap();
        store.set_track_volume(track, 1.0).unwrap();
        store.set_master_gain(1.0);

        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        state.master_gain = 1.0;
        state.position = SR as u64 * 3 / 2; // 1.5s, inside the second half
        let out = render(&mut graph, &mut state, 16);
        // mono clip mirrored to both channels, pan center = cos(45deg)
        let expected = -0.25 * (0.5f32).sqrt();
        assert!((out[0] - expected).abs() < 1e-4, "got {}", out[0]);
        assert!((out[1] - expected).abs() < 1e-4);
    }

    #[test]
    fn test_overlapping_clips_sum() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        store.add_clip(track, "a".into(), audio(SR as usize, 0.2), 0.0).unwrap();
        store.add_clip(track, "b".into(), audio(SR as usize, 0.3), 0.0).unwrap();
        store.set_track_volume(track, 1.0).unwrap();
        store.set_track_pan(track, -1.0).unwrap(); // full left: left gain 1

        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        state.master_gain = 1.0;
        let out = render(&mut graph, &mut state, 8);
        assert!((out[0] - 0.5).abs() < 1e-5, "left: {}", out[0]);
        assert!(out[1].abs() < 1e-5, "right: {}", out[1]);
    }

    #[test]
    fn test_before_clip_start_is_silent() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        store.add_clip(track, "a".into(), audio(100, 0.5), 1.0).unwrap();

        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        let out = render(&mut graph, &mut state, 64);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_muted_track_is_silent() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        store.add_clip(track, "a".into(), audio(SR as usize, 0.5), 0.0).unwrap();
        store.set_track_muted(track, true).unwrap();

        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        let out = render(&mut graph, &mut state, 64);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_solo_excludes_other_tracks() {
        let mut store = ProjectStore::new();
        let a = store.project().tracks[0].id;
        let b = store.add_track(TrackKind::Audio);
        store.add_clip(a, "a".into(), audio(SR as usize, 0.5), 0.0).unwrap();
        store.add_clip(b, "b".into(), audio(SR as usize, 0.5), 0.0).unwrap();
        store.set_track_solo(b, true).unwrap();
        store.set_track_volume(a, 1.0).unwrap();
        store.set_track_volume(b, 1.0).unwrap();
        store.set_track_pan(b, -1.0).unwrap();
        store.set_track_pan(a, -1.0).unwrap();
        store.set_master_gain(1.0);

        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        state.master_gain = 1.0;
        let out = render(&mut graph, &mut state, 8);
        // only track b contributes
        assert!((out[0] - 0.5).abs() < 1e-5, "left: {}", out[0]);
    }

    #[test]
    fn test_volume_command_applies_live() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        store.add_clip(track, "a".into(), audio(SR as usize, 0.5), 0.0).unwrap();
        store.set_track_pan(track, -1.0).unwrap();
        store.set_master_gain(1.0);

        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        state.master_gain = 1.0;
        state.apply(&mut graph, Command::SetTrackVolume { track, value: 0.5 });
        let out = render(&mut graph, &mut state, 8);
        assert!((out[0] - 0.25).abs() < 1e-5, "left: {}", out[0]);
    }

    #[test]
    fn test_stop_resets_position_to_zero() {
        let store = ProjectStore::new();
        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        state.position = 12345;
        state.apply(&mut graph, Command::Stop);
        assert!(!state.playing);
        assert_eq!(state.position, 0);
    }

    #[test]
    fn test_pause_keeps_position() {
        let store = ProjectStore::new();
        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        state.position = 777;
        state.apply(&mut graph, Command::Pause);
        assert!(!state.playing);
        assert_eq!(state.position, 777);
    }

    #[test]
    fn test_effect_chain_runs_in_order() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        store.add_clip(track, "a".into(), audio(SR as usize, 0.5), 0.0).unwrap();
        let fx = store.add_effect(track, EffectKind::Bitcrusher).unwrap();
        store.set_effect_param(track, fx, ParamKey::Wet, 1.0).unwrap();

        let mut graph = build_graph(store.project(), SR, 2);
        assert_eq!(graph.tracks[0].chain.len(), 1);
        assert_eq!(graph.tracks[0].chain[0].id, fx);

        let mut state = playing_state(&store);
        let with_fx = render(&mut graph, &mut state, 8);

        state.position = 0;
        state.apply(&mut graph, Command::SetEffectEnabled { track, effect: fx, enabled: false });
        let bypassed = render(&mut graph, &mut state, 8);
        assert_ne!(with_fx[0], bypassed[0]);
    }

    #[test]
    fn test_disabled_state_not_playing_renders_silence() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        store.add_clip(track, "a".into(), audio(SR as usize, 0.5), 0.0).unwrap();

        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = RenderState::new(SR, store.project());
        let out = render(&mut graph, &mut state, 32);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_master_gain_scales_the_metronome() {
        let mut store = ProjectStore::new();
        store.set_metronome_enabled(true);
        let mut graph = build_graph(store.project(), SR, 2);

        let mut state = RenderState::new(SR, store.project());
        state.playing = true;
        state.master_gain = 0.0;
        let muted = render(&mut graph, &mut state, 256);
        assert!(muted.iter().all(|s| *s == 0.0));

        let mut state = RenderState::new(SR, store.project());
        state.playing = true;
        state.master_gain = 1.0;
        let audible = render(&mut graph, &mut state, 256);
        assert!(audible.iter().any(|s| s.abs() > 0.0));
    }

    #[test]
    fn test_render_advances_position_by_block() {
        let store = ProjectStore::new();
        let mut graph = build_graph(store.project(), SR, 2);
        let mut state = playing_state(&store);
        render(&mut graph, &mut state, 256);
        assert_eq!(state.position, 256);
    }
}
