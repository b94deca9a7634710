//! The single audio output sink, as a scoped resource.
//!
//! `AudioOutputDevice` owns an [`AudioBackend`] and guarantees that at most
//! one buffer is sounding at a time: every submission detaches and halts the
//! previous playback before the new one starts.
//!
//! Completion is reported through a [`CompletionSlot`], a single-fire
//! continuation shared between the playback handle and the backend. Detaching
//! the slot before halting means an intentionally stopped playback can never
//! report completion afterwards.

use std::future::pending;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::pcm::DecodedBuffer;
use crate::error::{NarrationError, Result};

pub type PlaybackId = u64;

/// Platform seam for the output sink.
///
/// Implementations play exactly one buffer at a time and call
/// [`CompletionSlot::fire`] when the buffer has been fully played.
pub trait AudioBackend {
    /// Open the output at the given mono sample rate.
    fn open(&mut self, sample_rate: u32) -> Result<()>;

    /// Whether the output is in a suspended / low-power state.
    fn is_suspended(&self) -> bool;

    /// Leave the suspended state.
    fn resume(&mut self) -> Result<()>;

    /// Enter the suspended state (platform power events, host request).
    fn suspend(&mut self);

    /// Start playing `buffer`; fire `completion` once it has played out.
    fn start(&mut self, buffer: &DecodedBuffer, completion: CompletionSlot) -> Result<()>;

    /// Halt whatever is playing. Must be a no-op when idle.
    fn halt(&mut self);

    /// Release the platform output.
    fn close(&mut self);
}

/// Revocable single-fire completion continuation.
#[derive(Debug, Clone)]
pub struct CompletionSlot {
    id: PlaybackId,
    sender: Arc<Mutex<Option<oneshot::Sender<PlaybackId>>>>,
}

impl CompletionSlot {
    pub fn new(id: PlaybackId) -> (Self, oneshot::Receiver<PlaybackId>) {
        let (tx, rx) = oneshot::channel();
        let slot = Self {
            id,
            sender: Arc::new(Mutex::new(Some(tx))),
        };
        (slot, rx)
    }

    pub fn id(&self) -> PlaybackId {
        self.id
    }

    /// Report completion. Returns `false` if the slot was already fired or detached.
    pub fn fire(&self) -> bool {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => {
                warn!("Completion slot lock poisoned: {}", e);
                None
            }
        };
        match sender {
            Some(tx) => tx.send(self.id).is_ok(),
            None => false,
        }
    }

    /// Drop the continuation without firing it.
    pub fn detach(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sender.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

/// Token returned by [`AudioOutputDevice::acquire`]; invalidated by `release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    generation: u64,
}

/// A submitted buffer. Await [`PlaybackHandle::finished`] to observe completion.
#[derive(Debug)]
pub struct PlaybackHandle {
    id: PlaybackId,
    slot: CompletionSlot,
    completion: Option<oneshot::Receiver<PlaybackId>>,
}

impl PlaybackHandle {
    pub fn id(&self) -> PlaybackId {
        self.id
    }

    /// Resolves once when the buffer has played out.
    ///
    /// Returns `None` if the playback was halted without completing; pends
    /// forever once the completion has been consumed.
    pub async fn finished(&mut self) -> Option<PlaybackId> {
        match self.completion.as_mut() {
            Some(rx) => {
                let result = rx.await.ok();
                self.completion = None;
                result
            }
            None => pending().await,
        }
    }
}

/// The output device. Fixed format: mono at `sample_rate`.
pub struct AudioOutputDevice {
    backend: Box<dyn AudioBackend>,
    sample_rate: u32,
    generation: u64,
    open: bool,
    current: Option<CompletionSlot>,
    next_playback: PlaybackId,
}

impl AudioOutputDevice {
    pub fn new(backend: Box<dyn AudioBackend>, sample_rate: u32) -> Self {
        Self {
            backend,
            sample_rate,
            generation: 0,
            open: false,
            current: None,
            next_playback: 1,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Lazily open the output. Repeated calls return the same handle.
    pub fn acquire(&mut self) -> Result<DeviceHandle> {
        if !self.open {
            self.backend.open(self.sample_rate)?;
            self.open = true;
            self.generation += 1;
            info!(sample_rate = self.sample_rate, "Audio output acquired");
        }
        Ok(DeviceHandle {
            generation: self.generation,
        })
    }

    fn check(&self, handle: DeviceHandle) -> Result<()> {
        if self.open && handle.generation == self.generation {
            Ok(())
        } else {
            Err(NarrationError::StaleHandle)
        }
    }

    /// Resume the output if it is suspended.
    ///
    /// Hosts must call this synchronously from user-gesture code paths on
    /// platforms that gate audio on user activation.
    pub fn ensure_active(&mut self, handle: DeviceHandle) -> Result<()> {
        self.check(handle)?;
        if self.backend.is_suspended() {
            debug!("Audio output suspended, resuming");
            self.backend
                .resume()
                .map_err(|e| NarrationError::DeviceSuspended(e.to_string()))?;
        }
        Ok(())
    }

    /// Put the output into the suspended state.
    pub fn suspend(&mut self) {
        if self.open {
            self.backend.suspend();
        }
    }

    /// Start `buffer`, stopping any current playback first.
    pub fn submit(&mut self, handle: DeviceHandle, buffer: &DecodedBuffer) -> Result<PlaybackHandle> {
        self.check(handle)?;
        self.halt_current();

        let id = self.next_playback;
        self.next_playback += 1;
        let (slot, completion) = CompletionSlot::new(id);

        self.backend.start(buffer, slot.clone())?;
        self.current = Some(slot.clone());
        debug!(
            playback = id,
            samples = buffer.len(),
            duration_secs = buffer.duration().as_secs_f64(),
            "Buffer submitted"
        );

        Ok(PlaybackHandle {
            id,
            slot,
            completion: Some(completion),
        })
    }

    /// Detach the completion observer, then halt. Safe on `None` and stale handles.
    pub fn stop(&mut self, playback: Option<&PlaybackHandle>) {
        let Some(playback) = playback else {
            return;
        };
        playback.slot.detach();

        if self.current.as_ref().map(|s| s.id()) == Some(playback.id) {
            self.current = None;
            self.backend.halt();
            debug!(playback = playback.id, "Playback stopped");
        }
    }

    /// Id of the playback currently owned by the device, if any.
    pub fn active_playback(&self) -> Option<PlaybackId> {
        self.current
            .as_ref()
            .filter(|slot| slot.is_attached())
            .map(|slot| slot.id())
    }

    /// Release the output. The handle and any later use of it become invalid.
    pub fn release(&mut self, handle: DeviceHandle) {
        if self.check(handle).is_err() {
            return;
        }
        self.close();
    }

    fn halt_current(&mut self) {
        if let Some(slot) = self.current.take() {
            slot.detach();
            self.backend.halt();
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.halt_current();
        self.backend.close();
        self.open = false;
        info!("Audio output released");
    }
}

impl Drop for AudioOutputDevice {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::{decode, SPEECH_SAMPLE_RATE};
    use crate::test_support::ScriptedBackend;

    fn buffer() -> DecodedBuffer {
        decode(&[0, 1, 0, 2], SPEECH_SAMPLE_RATE)
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let (backend, probe) = ScriptedBackend::new();
        let mut device = AudioOutputDevice::new(Box::new(backend), SPEECH_SAMPLE_RATE);

        let a = device.acquire().unwrap();
        let b = device.acquire().unwrap();
        assert_eq!(a, b);
        assert_eq!(probe.opened(), 1);
    }

    #[test]
    fn test_submit_halts_previous_playback() {
        let (backend, probe) = ScriptedBackend::new();
        let mut device = AudioOutputDevice::new(Box::new(backend), SPEECH_SAMPLE_RATE);
        let handle = device.acquire().unwrap();

        let first = device.submit(handle, &buffer()).unwrap();
        let second = device.submit(handle, &buffer()).unwrap();

        assert_eq!(probe.overlaps(), 0);
        assert_eq!(probe.started(), 2);
        assert_eq!(device.active_playback(), Some(second.id()));
        assert!(!first.slot.is_attached());
    }

    #[tokio::test]
    async fn test_completion_fires_once() {
        let (backend, probe) = ScriptedBackend::new();
        let mut device = AudioOutputDevice::new(Box::new(backend), SPEECH_SAMPLE_RATE);
        let handle = device.acquire().unwrap();

        let mut playback = device.submit(handle, &buffer()).unwrap();
        assert!(probe.finish());
        assert!(!probe.finish());
        assert_eq!(playback.finished().await, Some(playback.id()));
    }

    #[tokio::test]
    async fn test_stop_detaches_before_halt() {
        let (backend, probe) = ScriptedBackend::new();
        let mut device = AudioOutputDevice::new(Box::new(backend), SPEECH_SAMPLE_RATE);
        let handle = device.acquire().unwrap();

        let mut playback = device.submit(handle, &buffer()).unwrap();
        device.stop(Some(&playback));
        device.stop(Some(&playback));
        device.stop(None);

        assert!(!probe.finish());
        assert_eq!(playback.finished().await, None);
        assert_eq!(device.active_playback(), None);
    }

    #[test]
    fn test_stale_stop_does_not_halt_newer_playback() {
        let (backend, probe) = ScriptedBackend::new();
        let mut device = AudioOutputDevice::new(Box::new(backend), SPEECH_SAMPLE_RATE);
        let handle = device.acquire().unwrap();

        let old = device.submit(handle, &buffer()).unwrap();
        let new = device.submit(handle, &buffer()).unwrap();
        device.stop(Some(&old));

        assert_eq!(device.active_playback(), Some(new.id()));
        assert!(probe.is_sounding());
    }

    #[test]
    fn test_ensure_active_resumes() {
        let (backend, probe) = ScriptedBackend::new();
        let mut device = AudioOutputDevice::new(Box::new(backend), SPEECH_SAMPLE_RATE);
        let handle = device.acquire().unwrap();

        device.suspend();
        assert!(probe.is_suspended());
        device.ensure_active(handle).unwrap();
        assert!(!probe.is_suspended());

        device.suspend();
        probe.refuse_resume(true);
        assert!(matches!(
            device.ensure_active(handle),
            Err(NarrationError::DeviceSuspended(_))
        ));
    }

    #[test]
    fn test_release_invalidates_handle() {
        let (backend, probe) = ScriptedBackend::new();
        let mut device = AudioOutputDevice::new(Box::new(backend), SPEECH_SAMPLE_RATE);
        let handle = device.acquire().unwrap();

        device.release(handle);
        assert_eq!(probe.closed(), 1);
        assert_eq!(
            device.submit(handle, &buffer()).unwrap_err(),
            NarrationError::StaleHandle
        );

        let reacquired = device.acquire().unwrap();
        assert_ne!(reacquired, handle);
        drop(device);
        assert_eq!(probe.closed(), 2);
    }
}
