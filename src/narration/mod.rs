//! Narration controller: sequences speech playback across a lesson.
//!
//! The controller is a single-owner state machine driven cooperatively:
//!
//! - public operations (`start`, `stop`, `seek`, `point_read`, ...) run
//!   synchronously and never await;
//! - speech requests run on spawned tasks and post [`Signal::SpeechReady`]
//!   back over a channel, tagged with a request id;
//! - playback completion arrives through the single playback slot.
//!
//! Hosts loop on [`NarrationController::next_signal`] and feed the result to
//! [`NarrationController::handle_signal`]. Responses for superseded requests
//! are discarded by id, and the playback slot is always cleared before the
//! device is halted, so stale work can never re-enter the state machine.

pub mod state;

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::output::{AudioOutputDevice, DeviceHandle, PlaybackHandle, PlaybackId};
use crate::audio::pcm;
use crate::error::NarrationError;
use crate::lesson::Lesson;
use crate::speech::{SpeechError, SpeechSource};

pub use state::{Mode, NarrationState, PlaybackSnapshot, Status};

/// Default pause before skipping a unit whose generation failed.
pub const DEFAULT_SKIP_DELAY: Duration = Duration::from_millis(1200);

pub type RequestId = u64;

/// Asynchronous inputs to the state machine.
#[derive(Debug)]
pub enum Signal {
    SpeechReady {
        request: RequestId,
        result: Result<Vec<u8>, SpeechError>,
    },
    SkipElapsed {
        request: RequestId,
    },
    PlaybackFinished {
        playback: PlaybackId,
    },
}

#[derive(Debug, Clone)]
struct PendingRequest {
    id: RequestId,
    index: usize,
    mode: Mode,
    unit_id: Option<String>,
}

struct ActivePlayback {
    handle: PlaybackHandle,
    mode: Mode,
}

pub struct NarrationController {
    lesson: Lesson,
    source: Arc<dyn SpeechSource>,
    device: AudioOutputDevice,
    device_handle: Option<DeviceHandle>,
    skip_delay: Duration,

    state: NarrationState,
    current_index: usize,
    is_playing: bool,
    is_looping: bool,
    active_unit_id: Option<String>,
    status: Option<Status>,
    finished: bool,

    pending: Option<PendingRequest>,
    skipping: Option<RequestId>,
    playback: Option<ActivePlayback>,
    next_request: RequestId,

    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
}

impl NarrationController {
    pub fn new(
        lesson: Lesson,
        source: Arc<dyn SpeechSource>,
        device: AudioOutputDevice,
        skip_delay: Duration,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            lesson,
            source,
            device,
            device_handle: None,
            skip_delay,
            state: NarrationState::Idle,
            current_index: 0,
            is_playing: false,
            is_looping: false,
            active_unit_id: None,
            status: None,
            finished: false,
            pending: None,
            skipping: None,
            playback: None,
            next_request: 1,
            signal_tx,
            signal_rx,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    pub fn state(&self) -> &NarrationState {
        &self.state
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    pub fn active_unit_id(&self) -> Option<&str> {
        self.active_unit_id.as_deref()
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            state: self.state.clone(),
            current_index: self.current_index,
            unit_count: self.lesson.len(),
            is_playing: self.is_playing,
            is_looping: self.is_looping,
            active_unit_id: self.active_unit_id.clone(),
            status: self.status.as_ref().map(|s| s.to_string()),
            finished: self.finished,
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Replace the session lesson. Stops all playback and rewinds.
    pub fn load_lesson(&mut self, lesson: Lesson) {
        self.stop();
        info!(title = %lesson.title, units = lesson.len(), "Lesson loaded");
        self.lesson = lesson;
        self.current_index = 0;
        self.finished = false;
        self.status = None;
    }

    /// Begin auto-narration at the current index.
    pub fn start(&mut self) {
        if self.is_playing {
            debug!("start() ignored, already narrating");
            return;
        }
        if self.lesson.is_empty() {
            info!("Lesson has no units, nothing to narrate");
            self.active_unit_id = None;
            self.finish();
            return;
        }
        if let Err(e) = self.ensure_device() {
            self.fail_device(e);
            return;
        }
        if self.active_unit_id.is_some() {
            self.cancel_point_read();
        }

        info!(index = self.current_index, "Auto-narration started");
        self.is_playing = true;
        self.finished = false;
        self.request_unit(self.current_index);
    }

    /// Halt everything and return to idle. Idempotent.
    pub fn stop(&mut self) {
        let was_active = self.state.is_active();
        self.cancel_inflight();
        self.is_playing = false;
        self.active_unit_id = None;
        self.state = NarrationState::Idle;
        if was_active {
            info!("Narration stopped");
            self.status = Some(Status::Stopped);
        }
    }

    /// Move to `index`, clamped. Restarts the pipeline only while narrating.
    pub fn seek(&mut self, index: usize) {
        let target = index.min(self.lesson.len().saturating_sub(1));
        if !self.is_playing {
            self.current_index = target;
            return;
        }

        debug!(from = self.current_index, to = target, "Seeking during narration");
        self.cancel_inflight();
        self.current_index = target;
        self.finished = false;
        self.request_unit(target);
    }

    pub fn next(&mut self) {
        self.seek(self.current_index + 1);
    }

    pub fn previous(&mut self) {
        self.seek(self.current_index.saturating_sub(1));
    }

    /// Flip looping. Applies from the next completion.
    pub fn toggle_loop(&mut self) {
        self.is_looping = !self.is_looping;
        debug!(looping = self.is_looping, "Loop toggled");
    }

    /// Read a single unit aloud, cancelling narration and other point-reads.
    pub fn point_read(&mut self, unit_id: &str, text: &str) {
        if let Err(e) = self.ensure_device() {
            self.fail_device(e);
            return;
        }
        self.cancel_inflight();
        self.is_playing = false;
        self.active_unit_id = Some(unit_id.to_string());

        let index = self.lesson.position(unit_id).unwrap_or(self.current_index);
        info!(unit = unit_id, "Point-read requested");
        self.request(index, Mode::PointRead, Some(unit_id.to_string()), text.to_string());
    }

    /// Point-read a unit of the current lesson by id. Returns `false` if unknown.
    pub fn point_read_unit(&mut self, unit_id: &str) -> bool {
        let Some(text) = self
            .lesson
            .position(unit_id)
            .and_then(|i| self.lesson.unit(i))
            .map(|u| u.original.clone())
        else {
            warn!(unit = unit_id, "Point-read for unknown unit");
            return false;
        };
        self.point_read(unit_id, &text);
        true
    }

    /// Combined play/stop control for user gestures.
    pub fn toggle_auto_play(&mut self) {
        if let Err(e) = self.ensure_device() {
            self.fail_device(e);
            return;
        }
        if self.active_unit_id.is_some() {
            self.cancel_point_read();
        }
        if self.is_playing {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Put the output device into its suspended state.
    pub fn suspend_output(&mut self) {
        self.device.suspend();
    }

    /// Stop and release the output device.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(handle) = self.device_handle.take() {
            self.device.release(handle);
        }
    }

    // ── Event loop ──────────────────────────────────────────────────

    /// Wait for the next speech response, skip timer or playback completion.
    pub async fn next_signal(&mut self) -> Option<Signal> {
        tokio::select! {
            signal = self.signal_rx.recv() => signal,
            playback = wait_playback(&mut self.playback) => Some(Signal::PlaybackFinished { playback }),
        }
    }

    /// Wait for one signal and apply it.
    pub async fn pump(&mut self) {
        if let Some(signal) = self.next_signal().await {
            self.handle_signal(signal);
        }
    }

    pub fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::SpeechReady { request, result } => self.on_speech(request, result),
            Signal::SkipElapsed { request } => {
                if self.skipping != Some(request) {
                    debug!(request, "Discarding stale skip timer");
                    return;
                }
                self.skipping = None;
                self.advance_or_finish();
            }
            Signal::PlaybackFinished { playback } => self.on_playback_finished(playback),
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn ensure_device(&mut self) -> Result<DeviceHandle, NarrationError> {
        let handle = self.device.acquire()?;
        self.device_handle = Some(handle);
        self.device.ensure_active(handle)?;
        Ok(handle)
    }

    fn fail_device(&mut self, error: NarrationError) {
        warn!(error = %error, "Audio output failed");
        self.cancel_inflight();
        self.is_playing = false;
        self.active_unit_id = None;
        self.state = NarrationState::Error;
        self.status = Some(Status::Device {
            reason: error.to_string(),
        });
    }

    /// Clear the playback slot and in-flight requests, then halt the device.
    fn cancel_inflight(&mut self) {
        self.pending = None;
        self.skipping = None;
        if let Some(active) = self.playback.take() {
            self.device.stop(Some(&active.handle));
        }
    }

    fn cancel_point_read(&mut self) {
        debug!("Cancelling point-read");
        self.cancel_inflight();
        self.active_unit_id = None;
        self.state = NarrationState::Idle;
    }

    fn request_unit(&mut self, index: usize) {
        match self.lesson.unit(index) {
            Some(unit) => {
                let text = unit.original.clone();
                self.request(index, Mode::AutoNarrate, None, text);
            }
            None => self.finish(),
        }
    }

    fn request(&mut self, index: usize, mode: Mode, unit_id: Option<String>, text: String) {
        let id = self.next_request;
        self.next_request += 1;

        self.pending = Some(PendingRequest {
            id,
            index,
            mode,
            unit_id,
        });
        self.state = NarrationState::RequestingSpeech { index, mode };
        self.status = Some(Status::Generating { index });

        let source = Arc::clone(&self.source);
        let tx = self.signal_tx.clone();
        tokio::spawn(async move {
            let result = source.generate(&text).await;
            // Receiver gone means the controller was dropped.
            let _ = tx.send(Signal::SpeechReady {
                request: id,
                result,
            });
        });
    }

    fn on_speech(&mut self, request: RequestId, result: Result<Vec<u8>, SpeechError>) {
        let Some(pending) = self.pending.take_if(|p| p.id == request) else {
            debug!(request, "Discarding superseded speech response");
            return;
        };

        let buffer = match result {
            Ok(bytes) => pcm::decode(&bytes, self.device.sample_rate()),
            Err(e) => return self.on_generation_failed(pending, e),
        };
        if buffer.is_empty() {
            return self.on_generation_failed(pending, SpeechError::Empty);
        }

        // Suspension can recur while the request was in flight.
        let handle = match self.ensure_device() {
            Ok(handle) => handle,
            Err(e) => return self.fail_device(e),
        };
        let playback = match self.device.submit(handle, &buffer) {
            Ok(playback) => playback,
            Err(e) => return self.fail_device(e),
        };

        self.state = match pending.mode {
            Mode::AutoNarrate => NarrationState::Playing {
                index: pending.index,
            },
            Mode::PointRead => NarrationState::PointReading {
                unit_id: pending.unit_id.clone().unwrap_or_default(),
            },
        };
        self.status = Some(Status::Playing {
            index: pending.index,
        });
        self.playback = Some(ActivePlayback {
            handle: playback,
            mode: pending.mode,
        });
    }

    fn on_generation_failed(&mut self, pending: PendingRequest, error: SpeechError) {
        warn!(index = pending.index, mode = %pending.mode, error = %error, "Speech generation failed");
        match pending.mode {
            Mode::AutoNarrate => {
                self.status = Some(Status::GenerationFailed {
                    index: pending.index,
                    reason: error.to_string(),
                });
                self.skipping = Some(pending.id);

                let tx = self.signal_tx.clone();
                let delay = self.skip_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Signal::SkipElapsed {
                        request: pending.id,
                    });
                });
            }
            Mode::PointRead => {
                self.active_unit_id = None;
                self.state = NarrationState::Idle;
                self.status = Some(Status::PointReadFailed {
                    reason: error.to_string(),
                });
            }
        }
    }

    fn on_playback_finished(&mut self, playback: PlaybackId) {
        let Some(active) = self.playback.take_if(|a| a.handle.id() == playback) else {
            debug!(playback, "Discarding completion for superseded playback");
            return;
        };
        self.device.stop(Some(&active.handle));

        match active.mode {
            Mode::AutoNarrate if self.is_looping => {
                debug!(index = self.current_index, "Looping unit");
                self.request_unit(self.current_index);
            }
            Mode::AutoNarrate => self.advance_or_finish(),
            Mode::PointRead => {
                self.active_unit_id = None;
                self.state = NarrationState::Idle;
                self.status = None;
            }
        }
    }

    fn advance_or_finish(&mut self) {
        if self.current_index + 1 < self.lesson.len() {
            self.current_index += 1;
            self.request_unit(self.current_index);
        } else {
            self.finish();
        }
    }

    fn finish(&mut self) {
        info!("Narration finished");
        self.cancel_inflight();
        self.is_playing = false;
        self.finished = true;
        self.state = NarrationState::Idle;
        self.status = Some(Status::Finished);
    }
}

async fn wait_playback(slot: &mut Option<ActivePlayback>) -> PlaybackId {
    match slot.as_mut() {
        Some(active) => match active.handle.finished().await {
            Some(id) => id,
            None => pending().await,
        },
        None => pending().await,
    }
}
