//! Real-time playback engine.
//!
//! A cpal output stream owns a [`RenderGraph`] and a [`RenderState`]. The
//! control thread talks to it over two lock-free rings: one for
//! [`Command`]s and one for whole-graph swaps. Retired graphs are freed on
//! the control thread through a basedrop collector, never in the callback.

mod devices;
mod graph;
mod metronome;

pub use devices::{DeviceInfo, list_input_devices, list_output_devices};
pub use graph::{
    ChainSlot, ClipPlayer, Command, RenderGraph, RenderState, TrackGraph, build_graph,
};
pub use metronome::Metronome;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use basedrop::{Collector, Handle, Owned};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use loft_model::Project;

pub struct EngineHandle {
    pub commands: rtrb::Producer<Command>,
    pub graphs: rtrb::Producer<Owned<RenderGraph>>,
    /// Playhead in engine frames, written by the callback every block.
    pub position: Arc<AtomicU64>,
    pub sample_rate: u32,
    pub channels: usize,
    pub collector: Collector,
    pub handle: Handle,
    _stream: cpal::Stream,
}

impl EngineHandle {
    pub fn position_frames(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    pub fn position_secs(&self) -> f64 {
        self.position_frames() as f64 / self.sample_rate as f64
    }

    pub fn secs_to_frames(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

/// Open the default output device and start the callback with a graph built
/// from `project`. Playback starts paused.
pub fn start(project: &Project) -> anyhow::Result<EngineHandle> {
    let collector = Collector::new();
    let handle = collector.handle();

    let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(256);
    let (graph_tx, graph_rx) = rtrb::RingBuffer::<Owned<RenderGraph>>::new(4);
    let position = Arc::new(AtomicU64::new(0));

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;

    let initial_graph = Owned::new(&handle, build_graph(project, sample_rate, channels));
    let state = RenderState::new(sample_rate, project);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(
            &device,
            &config.into(),
            initial_graph,
            state,
            command_rx,
            graph_rx,
            Arc::clone(&position),
        )?,
        cpal::SampleFormat::I16 => build_stream::<i16>(
            &device,
            &config.into(),
            initial_graph,
            state,
            command_rx,
            graph_rx,
            Arc::clone(&position),
        )?,
        cpal::SampleFormat::U16 => build_stream::<u16>(
            &device,
            &config.into(),
            initial_graph,
            state,
            command_rx,
            graph_rx,
            Arc::clone(&position),
        )?,
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };

    stream.play()?;
    tracing::info!(sample_rate, channels, "audio engine started");

    Ok(EngineHandle {
        commands: command_tx,
        graphs: graph_tx,
        position,
        sample_rate,
        channels,
        collector,
        handle,
        _stream: stream,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    initial_graph: Owned<RenderGraph>,
    mut state: RenderState,
    mut command_rx: rtrb::Consumer<Command>,
    mut graph_rx: rtrb::Consumer<Owned<RenderGraph>>,
    position: Arc<AtomicU64>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;

    let mut current_graph = initial_graph;
    let mut block: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // Swap in a rebuilt graph if one is waiting (lock-free; the old
            // graph is queued for the collector, not dropped here)
            while let Ok(new_graph) = graph_rx.pop() {
                current_graph = new_graph;
            }

            while let Ok(cmd) = command_rx.pop() {
                state.apply(&mut current_graph, cmd);
            }

            if block.len() < data.len() {
                block.resize(data.len(), 0.0);
            }
            let block = &mut block[..data.len()];

            state.render(&mut current_graph, block, channels);
            position.store(state.position, Ordering::Relaxed);

            for (out, mixed) in data.iter_mut().zip(block.iter()) {
                *out = T::from_sample(*mixed);
            }
        },
        |err| tracing::error!(%err, "output stream error"),
        None,
    )?;

    Ok(stream)
}
