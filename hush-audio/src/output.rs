//! Output backends
//!
//! An `AudioOutput` pulls rendered blocks from the shared graph. The cpal
//! backend drives a real device; `NullOutput` renders nothing and lets tests
//! call `MixGraph::render` themselves.

use crate::error::OutputError;
use crate::graph::{RenderEvent, SharedGraph};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

/// What a started backend is running at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    pub backend: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Device seam between the engine and the platform
pub trait AudioOutput {
    /// Start pulling audio from the graph
    fn start(&mut self, graph: SharedGraph) -> Result<OutputInfo, OutputError>;

    /// Stop pulling audio. Safe to call when not started.
    fn stop(&mut self);

    fn name(&self) -> &'static str;
}

/// Output that never renders
#[derive(Default)]
pub struct NullOutput {
    graph: Option<SharedGraph>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.graph.is_some()
    }
}

impl AudioOutput for NullOutput {
    fn start(&mut self, graph: SharedGraph) -> Result<OutputInfo, OutputError> {
        let info = {
            let g = graph.lock();
            OutputInfo {
                backend: self.name(),
                sample_rate: g.sample_rate(),
                channels: g.output_channels() as u16,
            }
        };
        self.graph = Some(graph);
        Ok(info)
    }

    fn stop(&mut self) {
        self.graph = None;
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Default output device through cpal (f32 streams only)
#[derive(Default)]
pub struct CpalOutput {
    stream: Option<cpal::Stream>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self::default()
    }

    fn device() -> Result<cpal::Device, OutputError> {
        cpal::default_host()
            .default_output_device()
            .ok_or(OutputError::NoDevice)
    }

    /// Sample rate and channel count the default device prefers
    pub fn default_config() -> Result<(u32, u16), OutputError> {
        let config = Self::device()?
            .default_output_config()
            .map_err(|e| OutputError::Stream(e.to_string()))?;
        Ok((config.sample_rate().0, config.channels()))
    }
}

impl AudioOutput for CpalOutput {
    fn start(&mut self, graph: SharedGraph) -> Result<OutputInfo, OutputError> {
        let device = Self::device()?;
        let default = device
            .default_output_config()
            .map_err(|e| OutputError::Stream(e.to_string()))?;
        if default.sample_format() != cpal::SampleFormat::F32 {
            return Err(OutputError::UnsupportedFormat(default.sample_format().to_string()));
        }

        let (sample_rate, channels) = {
            let g = graph.lock();
            (g.sample_rate(), g.output_channels() as u16)
        };
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let render_graph = graph.clone();
        let errors = graph.lock().event_sender();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // Never block the device thread; a missed lock is one silent block
                    match render_graph.try_lock() {
                        Some(mut g) => g.render(data),
                        None => data.fill(0.0),
                    }
                },
                move |err| {
                    error!(%err, "audio stream error");
                    let _ = errors.try_send(RenderEvent::StreamError(err.to_string()));
                },
                None,
            )
            .map_err(|e| OutputError::Stream(e.to_string()))?;
        stream.play().map_err(|e| OutputError::Stream(e.to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".into());
        info!(
            device = %device_name,
            sample_rate,
            channels,
            "output started"
        );
        self.stream = Some(stream);
        Ok(OutputInfo {
            backend: self.name(),
            sample_rate,
            channels,
        })
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                error!(%err, "failed to pause output stream");
            }
            info!("output stopped");
        }
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}
