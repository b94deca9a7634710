//! In-memory backend and speech source for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::audio::output::{AudioBackend, CompletionSlot};
use crate::audio::pcm::DecodedBuffer;
use crate::error::{NarrationError, Result};
use crate::speech::{SpeechError, SpeechFuture, SpeechSource};

#[derive(Default)]
struct BackendState {
    opened: u32,
    closed: u32,
    started: u32,
    overlaps: u32,
    sounding: Option<CompletionSlot>,
    suspended: bool,
    refuse_resume: bool,
    refuse_open: bool,
}

/// Output backend that plays nothing; tests finish buffers via [`BackendProbe`].
pub struct ScriptedBackend {
    state: Arc<Mutex<BackendState>>,
}

#[derive(Clone)]
pub struct BackendProbe {
    state: Arc<Mutex<BackendState>>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, BackendProbe) {
        let state = Arc::new(Mutex::new(BackendState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            BackendProbe { state },
        )
    }
}

impl AudioBackend for ScriptedBackend {
    fn open(&mut self, _sample_rate: u32) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.refuse_open {
            return Err(NarrationError::DeviceUnavailable("no output device".into()));
        }
        st.opened += 1;
        Ok(())
    }

    fn is_suspended(&self) -> bool {
        self.state.lock().unwrap().suspended
    }

    fn resume(&mut self) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.refuse_resume {
            return Err(NarrationError::DeviceSuspended("resume refused".into()));
        }
        st.suspended = false;
        Ok(())
    }

    fn suspend(&mut self) {
        self.state.lock().unwrap().suspended = true;
    }

    fn start(&mut self, _buffer: &DecodedBuffer, completion: CompletionSlot) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.sounding.is_some() {
            st.overlaps += 1;
        }
        st.sounding = Some(completion);
        st.started += 1;
        Ok(())
    }

    fn halt(&mut self) {
        self.state.lock().unwrap().sounding = None;
    }

    fn close(&mut self) {
        let mut st = self.state.lock().unwrap();
        st.sounding = None;
        st.closed += 1;
    }
}

impl BackendProbe {
    /// Play out the sounding buffer. Returns whether a completion was delivered.
    pub fn finish(&self) -> bool {
        let slot = self.state.lock().unwrap().sounding.take();
        slot.map(|s| s.fire()).unwrap_or(false)
    }

    pub fn is_sounding(&self) -> bool {
        self.state.lock().unwrap().sounding.is_some()
    }

    pub fn opened(&self) -> u32 {
        self.state.lock().unwrap().opened
    }

    pub fn closed(&self) -> u32 {
        self.state.lock().unwrap().closed
    }

    pub fn started(&self) -> u32 {
        self.state.lock().unwrap().started
    }

    /// Number of times a buffer started while another was still sounding.
    pub fn overlaps(&self) -> u32 {
        self.state.lock().unwrap().overlaps
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().unwrap().suspended
    }

    pub fn set_suspended(&self, suspended: bool) {
        self.state.lock().unwrap().suspended = suspended;
    }

    pub fn refuse_resume(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_resume = refuse;
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.state.lock().unwrap().refuse_open = refuse;
    }
}

#[derive(Default)]
struct SpeechScript {
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Vec<String>,
}

/// Speech source returning a short PCM clip, with per-text failures and delays.
#[derive(Clone, Default)]
pub struct ScriptedSpeech {
    script: Arc<Mutex<SpeechScript>>,
}

impl ScriptedSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, text: &str) {
        self.script.lock().unwrap().failing.insert(text.to_string());
    }

    pub fn delay(&self, text: &str, delay: Duration) {
        self.script
            .lock()
            .unwrap()
            .delays
            .insert(text.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }
}

impl SpeechSource for ScriptedSpeech {
    fn generate(&self, text: &str) -> SpeechFuture<'_> {
        let (fail, delay) = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(text.to_string());
            (
                script.failing.contains(text),
                script.delays.get(text).copied(),
            )
        };
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                Err(SpeechError::Network("scripted failure".into()))
            } else {
                Ok(vec![0x00, 0x10, 0x00, 0x20, 0x00, 0x30])
            }
        })
    }

    fn name(&self) -> String {
        "Scripted".to_string()
    }
}
