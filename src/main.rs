//! Lesson narrator: headless narration core.
//!
//! Communicates with the UI process via JSON-line IPC on stdin/stdout.
//! Initializes logging, configuration, persisted state, the speech source and
//! the output device, then runs the main event loop.

use anyhow::Context;
use tracing::{error, info, warn};

use narrator_core::audio::{list_output_devices, AudioOutputDevice, RodioBackend, SPEECH_SAMPLE_RATE};
use narrator_core::config::paths::get_log_dir;
use narrator_core::config::{get_state_path, read_config, NarratorConfig};
use narrator_core::ipc::bridge::{emit_error, emit_event, spawn_stdin_reader};
use narrator_core::ipc::{LessonSummary, NarrationCommand, NarrationEvent};
use narrator_core::lesson::{load_lesson_file, Lesson};
use narrator_core::logging;
use narrator_core::narration::NarrationController;
use narrator_core::persistence::{AppState, StateStore, View};
use narrator_core::schedule::{ScheduleEntry, ScheduleTrigger, SystemClock};
use narrator_core::speech::create_speech_source;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = logging::init(&get_log_dir()) {
        eprintln!("Logging disabled: {}", e);
    }

    // Emit starting event immediately so the UI knows we're alive.
    emit_event(&NarrationEvent::Starting {});

    emit_event(&NarrationEvent::Loading {
        step: "Reading configuration...".to_string(),
    });
    let config = read_config();
    info!(
        adapter = %config.speech_adapter,
        device = ?config.output_device,
        skip_delay_ms = config.skip_delay_ms,
        "Configuration loaded"
    );

    let store = StateStore::new(get_state_path());
    let state = store.load();

    emit_event(&NarrationEvent::Loading {
        step: "Loading speech engine...".to_string(),
    });
    let source = match create_speech_source(
        &config.speech_adapter,
        config.speech_api_key.as_deref(),
        config.speech_voice.as_deref(),
    ) {
        Ok(source) => source,
        Err(e) => {
            emit_error(&format!("Speech engine unavailable: {}", e));
            return Err(e).context("Failed to create speech source");
        }
    };
    info!(source = %source.name(), "Speech source ready");

    emit_event(&NarrationEvent::Loading {
        step: "Initializing audio...".to_string(),
    });
    let device = AudioOutputDevice::new(
        Box::new(RodioBackend::new(config.output_device.clone(), config.volume)),
        SPEECH_SAMPLE_RATE,
    );
    let lesson = state.current_lesson.clone().unwrap_or_default();
    let controller = NarrationController::new(lesson, source, device, config.skip_delay());
    let trigger = ScheduleTrigger::new(SystemClock, state.schedules.clone());

    let mut cmd_rx = spawn_stdin_reader();
    let mut host = Host {
        config,
        store,
        state,
        controller,
        trigger,
    };

    emit_event(&NarrationEvent::Ready {});
    host.emit_snapshot();
    info!("Narrator core ready");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(command) => {
                        if !host.handle_command(command) {
                            break;
                        }
                    }
                    None => {
                        info!("stdin closed, shutting down");
                        break;
                    }
                }
            }
            signal = host.controller.next_signal() => {
                if let Some(signal) = signal {
                    host.controller.handle_signal(signal);
                    host.emit_snapshot();
                }
            }
            _ = host.trigger.tick() => {
                host.check_schedule();
            }
        }
    }

    host.controller.shutdown();
    host.save();
    emit_event(&NarrationEvent::Stopping {});
    info!("Narrator core shutting down");
    Ok(())
}

struct Host {
    config: NarratorConfig,
    store: StateStore,
    state: AppState,
    controller: NarrationController,
    trigger: ScheduleTrigger,
}

impl Host {
    /// Handle a single command. Returns `false` if the main loop should exit.
    fn handle_command(&mut self, cmd: NarrationCommand) -> bool {
        match cmd {
            NarrationCommand::Ping {} => {
                emit_event(&NarrationEvent::Pong {});
            }

            NarrationCommand::Quit {} => {
                return false;
            }

            NarrationCommand::Status {} => self.emit_snapshot(),

            NarrationCommand::LoadLesson { path } => match load_lesson_file(&path) {
                Ok(lesson) => self.load_lesson(lesson),
                Err(e) => {
                    warn!(path = %path.display(), "Lesson load failed: {:#}", e);
                    emit_error(&format!("Could not load lesson: {:#}", e));
                }
            },

            NarrationCommand::Start {} => self.with_snapshot(NarrationController::start),
            NarrationCommand::Stop {} => self.with_snapshot(NarrationController::stop),
            NarrationCommand::Next {} => self.with_snapshot(NarrationController::next),
            NarrationCommand::Previous {} => self.with_snapshot(NarrationController::previous),
            NarrationCommand::ToggleLoop {} => self.with_snapshot(NarrationController::toggle_loop),
            NarrationCommand::ToggleAutoPlay {} => {
                self.with_snapshot(NarrationController::toggle_auto_play)
            }
            NarrationCommand::Seek { index } => self.with_snapshot(|c| c.seek(index)),

            NarrationCommand::PointRead { unit_id } => {
                if !self.controller.point_read_unit(&unit_id) {
                    emit_error(&format!("Unknown unit: {}", unit_id));
                }
                self.emit_snapshot();
            }

            NarrationCommand::ShowView { view } => self.show_view(view),

            NarrationCommand::Arm {} => {
                self.state.is_armed = true;
                let fired = self.trigger.arm(&mut self.state);
                self.save();
                emit_event(&NarrationEvent::Armed { armed: true });
                if let Some(entry) = fired {
                    self.on_schedule_fired(entry);
                }
            }

            NarrationCommand::Disarm {} => {
                self.trigger.disarm();
                self.state.is_armed = false;
                self.save();
                emit_event(&NarrationEvent::Armed { armed: false });
            }

            NarrationCommand::SetSchedules { schedules } => {
                if let Some(e) = schedules.iter().find_map(|s| s.validate().err()) {
                    emit_error(&format!("Invalid schedule: {}", e));
                    return true;
                }
                info!(count = schedules.len(), "Schedules updated");
                self.trigger.set_entries(schedules.clone());
                self.state.schedules = schedules;
                self.save();
            }

            NarrationCommand::ListAudioDevices {} => {
                emit_event(&NarrationEvent::AudioDevices {
                    output: list_output_devices(),
                });
            }
        }

        true
    }

    fn with_snapshot(&mut self, op: impl FnOnce(&mut NarrationController)) {
        op(&mut self.controller);
        self.emit_snapshot();
    }

    fn load_lesson(&mut self, lesson: Lesson) {
        info!(lesson = %lesson.id, title = %lesson.title, units = lesson.len(), "Lesson loaded");
        emit_event(&NarrationEvent::LessonLoaded(LessonSummary {
            id: lesson.id.clone(),
            title: lesson.title.clone(),
            unit_count: lesson.len(),
        }));
        self.state.current_lesson = Some(lesson.clone());
        self.controller.load_lesson(lesson);
        self.save();
        self.emit_snapshot();
    }

    fn show_view(&mut self, view: View) {
        if self.state.view == view {
            return;
        }
        // Leaving the player ends its session.
        if self.state.view == View::Player {
            self.controller.stop();
            self.emit_snapshot();
        }
        self.state.view = view;
        self.save();
        emit_event(&NarrationEvent::ViewChanged { view });
    }

    fn check_schedule(&mut self) {
        if let Some(entry) = self.trigger.check(&mut self.state) {
            self.on_schedule_fired(entry);
        }
    }

    /// The trigger has already switched `state.view` to the player.
    fn on_schedule_fired(&mut self, entry: ScheduleEntry) {
        self.save();
        emit_event(&NarrationEvent::ScheduleFired {
            id: entry.id,
            name: entry.name,
        });
        emit_event(&NarrationEvent::ViewChanged { view: View::Player });

        if self.config.autoplay_on_schedule && !self.controller.lesson().is_empty() {
            self.controller.start();
            self.emit_snapshot();
        }
    }

    fn emit_snapshot(&self) {
        emit_event(&NarrationEvent::NarrationState(self.controller.snapshot()));
    }

    fn save(&self) {
        if let Err(e) = self.store.save(&self.state) {
            error!("Failed to save state: {:#}", e);
        }
    }
}
