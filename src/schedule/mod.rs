//! Wall-clock auto-trigger for the player view.
//!
//! While armed, the trigger checks the schedule list once immediately and then
//! every 60 seconds. An entry matches when it is enabled, today is one of its
//! repeat days, and the current minute equals its start time exactly. The
//! first match in list order wins; `end_time` is informational only.
//!
//! On a match the host is switched to the player view. The trigger never
//! starts audio itself.
//!
//! Known limitation: matching is exact-minute and checks run once per minute,
//! so a process that is suspended (or whose timer is delayed) across the start
//! minute misses that trigger. There is no catch-up.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

/// Period between checks while armed.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub name: String,
    /// 24-hour `HH:MM`.
    pub start_time: String,
    /// 24-hour `HH:MM`; display only.
    pub end_time: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub repeat_days: BTreeSet<u8>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid time '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("invalid weekday {0}, expected 0-6")]
    InvalidWeekday(u8),
}

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

impl ScheduleEntry {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        for time in [&self.start_time, &self.end_time] {
            if parse_hhmm(time).is_none() {
                return Err(ScheduleError::InvalidTime(time.clone()));
            }
        }
        if let Some(day) = self.repeat_days.iter().find(|d| **d > 6) {
            return Err(ScheduleError::InvalidWeekday(*day));
        }
        Ok(())
    }

    /// Whether `now` falls exactly on this entry's start minute.
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        if !self.enabled {
            return false;
        }
        let weekday = now.weekday().num_days_from_sunday() as u8;
        if !self.repeat_days.contains(&weekday) {
            return false;
        }
        match parse_hhmm(&self.start_time) {
            Some(start) => start.hour() == now.hour() && start.minute() == now.minute(),
            None => false,
        }
    }
}

pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// The view the trigger switches.
pub trait HostView {
    fn is_showing_player(&self) -> bool;
    fn show_player(&mut self);
}

pub struct ScheduleTrigger<C: Clock = SystemClock> {
    clock: C,
    entries: Vec<ScheduleEntry>,
    interval: Option<Interval>,
    /// Entry id and minute of the last activation.
    last_fired: Option<(String, NaiveDateTime)>,
}

impl<C: Clock> ScheduleTrigger<C> {
    pub fn new(clock: C, entries: Vec<ScheduleEntry>) -> Self {
        Self {
            clock,
            entries,
            interval: None,
            last_fired: None,
        }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn set_entries(&mut self, entries: Vec<ScheduleEntry>) {
        self.entries = entries;
    }

    pub fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Arm and run the immediate check. Re-arming restarts the cadence.
    pub fn arm(&mut self, host: &mut dyn HostView) -> Option<ScheduleEntry> {
        let mut interval = tokio::time::interval_at(Instant::now() + CHECK_INTERVAL, CHECK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        info!(entries = self.entries.len(), "Schedule trigger armed");
        self.check(host)
    }

    pub fn disarm(&mut self) {
        if self.interval.take().is_some() {
            info!("Schedule trigger disarmed");
        }
    }

    /// Wait for the next periodic check. Pends forever while disarmed.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }

    /// Check the schedule against the clock.
    ///
    /// Returns the entry that switched the host to the player view, if any.
    pub fn check(&mut self, host: &mut dyn HostView) -> Option<ScheduleEntry> {
        if !self.is_armed() {
            return None;
        }
        let now = self.clock.now();
        let minute = now.with_second(0)?.with_nanosecond(0)?;

        let entry = self.entries.iter().find(|e| e.matches(now))?;
        if self
            .last_fired
            .as_ref()
            .is_some_and(|(id, at)| *id == entry.id && *at == minute)
        {
            debug!(entry = %entry.id, "Schedule already fired this minute");
            return None;
        }
        self.last_fired = Some((entry.id.clone(), minute));

        if host.is_showing_player() {
            debug!(entry = %entry.id, "Schedule matched, player already showing");
            return None;
        }
        info!(entry = %entry.id, name = %entry.name, "Schedule window opened, showing player");
        host.show_player();
        Some(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct FixedClock(Arc<Mutex<NaiveDateTime>>);

    impl FixedClock {
        fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Self {
            Self(Arc::new(Mutex::new(datetime(y, m, d, h, min, s))))
        }

        fn set(&self, at: NaiveDateTime) {
            *self.0.lock().unwrap() = at;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }

    #[derive(Default)]
    struct TestHost {
        player: bool,
        switches: u32,
    }

    impl HostView for TestHost {
        fn is_showing_player(&self) -> bool {
            self.player
        }

        fn show_player(&mut self) {
            self.player = true;
            self.switches += 1;
        }
    }

    fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn entry(id: &str, start: &str, days: &[u8]) -> ScheduleEntry {
        ScheduleEntry {
            id: id.into(),
            name: format!("{} reading", id),
            start_time: start.into(),
            end_time: "23:59".into(),
            enabled: true,
            repeat_days: days.iter().copied().collect(),
        }
    }

    #[tokio::test]
    async fn test_weekday_morning_fires_once() {
        // 2024-01-01 is a Monday.
        let clock = FixedClock::at(2024, 1, 1, 7, 0, 0);
        let mut trigger =
            ScheduleTrigger::new(clock.clone(), vec![entry("morning", "07:00", &[1, 2, 3, 4, 5])]);
        let mut host = TestHost::default();

        assert!(trigger.arm(&mut host).is_some());
        assert_eq!(host.switches, 1);

        // User leaves the player within the same minute; no second activation.
        host.player = false;
        clock.set(datetime(2024, 1, 1, 7, 0, 30));
        assert!(trigger.check(&mut host).is_none());

        clock.set(datetime(2024, 1, 1, 7, 1, 0));
        assert!(trigger.check(&mut host).is_none());
        assert_eq!(host.switches, 1);
    }

    #[tokio::test]
    async fn test_weekday_and_enabled_filters() {
        // 2024-01-06 is a Saturday.
        let clock = FixedClock::at(2024, 1, 6, 7, 0, 0);
        let mut disabled = entry("off", "07:00", &[6]);
        disabled.enabled = false;
        let mut trigger = ScheduleTrigger::new(
            clock,
            vec![entry("weekdays", "07:00", &[1, 2, 3, 4, 5]), disabled],
        );
        let mut host = TestHost::default();

        assert!(trigger.arm(&mut host).is_none());
        assert_eq!(host.switches, 0);
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let clock = FixedClock::at(2024, 1, 7, 20, 15, 0); // Sunday
        let mut trigger = ScheduleTrigger::new(
            clock,
            vec![entry("a", "20:15", &[0]), entry("b", "20:15", &[0])],
        );
        let mut host = TestHost::default();
        assert_eq!(trigger.arm(&mut host).map(|e| e.id), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_player_already_showing() {
        let clock = FixedClock::at(2024, 1, 1, 7, 0, 0);
        let mut trigger = ScheduleTrigger::new(clock, vec![entry("m", "07:00", &[1])]);
        let mut host = TestHost {
            player: true,
            switches: 0,
        };
        assert!(trigger.arm(&mut host).is_none());
        assert_eq!(host.switches, 0);
    }

    #[tokio::test]
    async fn test_disarm_and_rearm() {
        let clock = FixedClock::at(2024, 1, 1, 7, 0, 0);
        let mut trigger = ScheduleTrigger::new(clock.clone(), vec![entry("m", "07:00", &[1, 2])]);
        let mut host = TestHost::default();

        assert!(!trigger.is_armed());
        assert!(trigger.check(&mut host).is_none());

        trigger.arm(&mut host);
        trigger.disarm();
        assert!(!trigger.is_armed());

        // Next day, same minute: re-arming checks immediately.
        host.player = false;
        clock.set(datetime(2024, 1, 2, 7, 0, 10));
        assert!(trigger.arm(&mut host).is_some());
        assert_eq!(host.switches, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_cadence() {
        let clock = FixedClock::at(2024, 1, 1, 6, 0, 0);
        let mut trigger = ScheduleTrigger::new(clock, vec![]);
        let mut host = TestHost::default();
        trigger.arm(&mut host);

        let started = Instant::now();
        trigger.tick().await;
        assert_eq!(started.elapsed(), CHECK_INTERVAL);
        trigger.tick().await;
        assert_eq!(started.elapsed(), CHECK_INTERVAL * 2);
    }

    #[test]
    fn test_validate() {
        assert!(entry("ok", "07:00", &[0, 6]).validate().is_ok());
        assert_eq!(
            entry("t", "7am", &[1]).validate(),
            Err(ScheduleError::InvalidTime("7am".into()))
        );
        assert_eq!(
            entry("d", "07:00", &[7]).validate(),
            Err(ScheduleError::InvalidWeekday(7))
        );
    }

    #[test]
    fn test_serde_shape() {
        let json = r#"{"id":"1","name":"Morning","startTime":"07:00","endTime":"07:30","repeatDays":[1,3,5]}"#;
        let parsed: ScheduleEntry = serde_json::from_str(json).unwrap();
        assert!(parsed.enabled);
        assert!(parsed.repeat_days.contains(&3));
        assert_eq!(parsed.end_time, "07:30");
    }
}
