//! Audio playback via rodio.
//!
//! Plays decoded speech through a named or default output device. Each
//! submitted buffer gets a fresh `Sink`; a watcher thread polls the sink and
//! fires the completion slot once it drains, unless the slot was detached
//! first.

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};
use tracing::{debug, info, warn};

use super::output::{AudioBackend, CompletionSlot};
use super::pcm::DecodedBuffer;
use crate::error::{NarrationError, Result};

/// How often the watcher checks whether the sink has drained.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// rodio-backed output.
pub struct RodioBackend {
    device_name: Option<String>,
    volume: f32,
    stream: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Arc<Sink>>,
    suspended: bool,
}

impl RodioBackend {
    /// `device_name` selects a cpal output device; `None` uses the default.
    pub fn new(device_name: Option<String>, volume: f32) -> Self {
        Self {
            device_name,
            volume: volume.clamp(0.0, 2.0),
            stream: None,
            sink: None,
            suspended: false,
        }
    }

    fn stream_handle(&self) -> Result<&OutputStreamHandle> {
        self.stream
            .as_ref()
            .map(|(_, handle)| handle)
            .ok_or_else(|| NarrationError::DeviceUnavailable("output stream not open".into()))
    }
}

impl AudioBackend for RodioBackend {
    fn open(&mut self, sample_rate: u32) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = open_output_stream(self.device_name.as_deref())
            .map_err(NarrationError::DeviceUnavailable)?;
        info!(sample_rate, device = ?self.device_name, "Output stream opened");
        self.stream = Some(stream);
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Err(NarrationError::DeviceSuspended("output stream not open".into()));
        }
        if let Some(sink) = &self.sink {
            sink.play();
        }
        self.suspended = false;
        Ok(())
    }

    fn suspend(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.suspended = true;
    }

    fn start(&mut self, buffer: &DecodedBuffer, completion: CompletionSlot) -> Result<()> {
        let sink = Sink::try_new(self.stream_handle()?)
            .map_err(|e| NarrationError::Playback(format!("Failed to create audio sink: {}", e)))?;
        sink.set_volume(self.volume);
        if self.suspended {
            sink.pause();
        }

        let source = SamplesBuffer::new(1, buffer.sample_rate, buffer.samples.clone());
        sink.append(source);

        let sink = Arc::new(sink);
        let watched = Arc::clone(&sink);
        std::thread::Builder::new()
            .name(format!("playback-{}", completion.id()))
            .spawn(move || watch_completion(&watched, &completion))
            .map_err(|e| NarrationError::Playback(format!("Failed to spawn watcher: {}", e)))?;

        self.sink = Some(sink);
        Ok(())
    }

    fn halt(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn close(&mut self) {
        self.halt();
        self.stream = None;
        debug!("Output stream closed");
    }
}

/// Poll until the sink drains or the slot is detached.
fn watch_completion(sink: &Sink, completion: &CompletionSlot) {
    loop {
        if !completion.is_attached() {
            debug!(playback = completion.id(), "Playback watcher detached");
            return;
        }
        if sink.empty() {
            if completion.fire() {
                debug!(playback = completion.id(), "Playback complete");
            }
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Open the audio output stream for a named or default device.
fn open_output_stream(
    output_device_name: Option<&str>,
) -> std::result::Result<(OutputStream, OutputStreamHandle), String> {
    if let Some(name) = output_device_name {
        let host = cpal::default_host();
        let device = host
            .output_devices()
            .map_err(|e| format!("Failed to enumerate output devices: {}", e))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false));

        match device {
            Some(dev) => {
                info!(device = %name, "Using configured output device");
                OutputStream::try_from_device(&dev)
                    .map_err(|e| format!("Failed to open output device '{}': {}", name, e))
            }
            None => {
                warn!(
                    device = %name,
                    "Configured output device not found, falling back to default"
                );
                OutputStream::try_default()
                    .map_err(|e| format!("No audio output device available: {}", e))
            }
        }
    } else {
        OutputStream::try_default().map_err(|e| format!("No audio output device available: {}", e))
    }
}

/// Names of the available output devices.
pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    match host.output_devices() {
        Ok(outputs) => outputs.filter_map(|dev| dev.name().ok()).collect(),
        Err(e) => {
            warn!("Failed to enumerate output devices: {}", e);
            Vec::new()
        }
    }
}
