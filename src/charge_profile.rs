//! Charge profile model
//!
//! The vehicle's weekly charging planner: climate preconditioning, three
//! departure timers, an override timer and a preferred charging window,
//! plus the charging preference and mode. The wire JSON is kept as-is
//! (unknown fields survive a parse/serialize cycle) and accessed through
//! `ProfileKey`.

pub mod channels;

use crate::error::{DriveLinkError, Result};
use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const PREFERENCE_NO_PRESELECTION: &str = "NO_PRESELECTION";
pub const PREFERENCE_CHARGING_WINDOW: &str = "CHARGING_WINDOW";
pub const MODE_IMMEDIATE: &str = "IMMEDIATE_CHARGING";
pub const MODE_DELAYED: &str = "DELAYED_CHARGING";

const PREFERENCES: [&str; 2] = [PREFERENCE_NO_PRESELECTION, PREFERENCE_CHARGING_WINDOW];
const MODES: [&str; 2] = [MODE_IMMEDIATE, MODE_DELAYED];

/// Addressable part of the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ProfileKey {
    Climate,
    Timer1,
    Timer2,
    Timer3,
    Override,
    WindowStart,
    WindowEnd,
}

impl ProfileKey {
    pub const ALL: [ProfileKey; 7] = [
        ProfileKey::Climate,
        ProfileKey::Timer1,
        ProfileKey::Timer2,
        ProfileKey::Timer3,
        ProfileKey::Override,
        ProfileKey::WindowStart,
        ProfileKey::WindowEnd,
    ];

    pub fn is_timer(&self) -> bool {
        matches!(self, Self::Timer1 | Self::Timer2 | Self::Timer3)
    }

    /// Keys carrying a time of day
    pub fn has_time(&self) -> bool {
        !matches!(self, Self::Climate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Climate => "climate",
            Self::Timer1 => "timer1",
            Self::Timer2 => "timer2",
            Self::Timer3 => "timer3",
            Self::Override => "override",
            Self::WindowStart => "window-start",
            Self::WindowEnd => "window-end",
        }
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of weekdays as a Monday-first bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DaySet(u8);

impl DaySet {
    pub const EMPTY: DaySet = DaySet(0);

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn set(&mut self, day: Weekday, on: bool) {
        let bit = 1 << day.num_days_from_monday();
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    pub fn days(&self) -> Vec<Weekday> {
        WEEK.iter().copied().filter(|d| self.contains(*d)).collect()
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Weekday> for DaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = DaySet::EMPTY;
        for day in iter {
            set.set(day, true);
        }
        set
    }
}

/// Monday-first week
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MONDAY",
        Weekday::Tue => "TUESDAY",
        Weekday::Wed => "WEDNESDAY",
        Weekday::Thu => "THURSDAY",
        Weekday::Fri => "FRIDAY",
        Weekday::Sat => "SATURDAY",
        Weekday::Sun => "SUNDAY",
    }
}

fn parse_day(name: &str) -> Option<Weekday> {
    WEEK.iter()
        .copied()
        .find(|d| day_name(*d).eq_ignore_ascii_case(name.trim()))
}

/// Flat view of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProfileRecord {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
    #[serde(skip)]
    pub days: DaySet,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimerWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    departure_time: Option<String>,
    #[serde(default)]
    timer_enabled: bool,
    #[serde(default)]
    weekdays: Vec<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WindowWire {
    #[serde(default)]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WeeklyPlanner {
    #[serde(default)]
    climatization_enabled: bool,
    #[serde(default = "default_mode")]
    charging_mode: String,
    #[serde(default = "default_preference")]
    charging_preferences: String,
    #[serde(default)]
    timer1: TimerWire,
    #[serde(default)]
    timer2: TimerWire,
    #[serde(default)]
    timer3: TimerWire,
    #[serde(default)]
    override_timer: TimerWire,
    #[serde(default)]
    preferred_charging_window: WindowWire,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

fn default_mode() -> String {
    MODE_IMMEDIATE.to_string()
}

fn default_preference() -> String {
    PREFERENCE_NO_PRESELECTION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileContainer {
    weekly_planner: WeeklyPlanner,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Parsed, editable charge profile
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeProfile {
    inner: ProfileContainer,
}

fn parse_time(s: Option<&str>) -> NaiveTime {
    s.and_then(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M").ok())
        .unwrap_or(NaiveTime::MIN)
}

fn format_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

fn normalize_choice(value: &str) -> String {
    value.trim().to_uppercase().replace([' ', '-'], "_")
}

impl ChargeProfile {
    /// Parse the cached wire JSON
    pub fn from_json(content: &str) -> Result<Self> {
        let inner: ProfileContainer = serde_json::from_str(content)
            .map_err(|e| DriveLinkError::parse(format!("charge profile: {}", e)))?;
        Ok(Self { inner })
    }

    /// Wire JSON as submitted to the charging-control command
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.inner)?)
    }

    fn timer(&self, key: ProfileKey) -> Option<&TimerWire> {
        let p = &self.inner.weekly_planner;
        match key {
            ProfileKey::Timer1 => Some(&p.timer1),
            ProfileKey::Timer2 => Some(&p.timer2),
            ProfileKey::Timer3 => Some(&p.timer3),
            ProfileKey::Override => Some(&p.override_timer),
            _ => None,
        }
    }

    fn timer_mut(&mut self, key: ProfileKey) -> Option<&mut TimerWire> {
        let p = &mut self.inner.weekly_planner;
        match key {
            ProfileKey::Timer1 => Some(&mut p.timer1),
            ProfileKey::Timer2 => Some(&mut p.timer2),
            ProfileKey::Timer3 => Some(&mut p.timer3),
            ProfileKey::Override => Some(&mut p.override_timer),
            _ => None,
        }
    }

    pub fn is_enabled(&self, key: ProfileKey) -> bool {
        let p = &self.inner.weekly_planner;
        match key {
            ProfileKey::Climate => p.climatization_enabled,
            ProfileKey::WindowStart | ProfileKey::WindowEnd => p.preferred_charging_window.enabled,
            _ => self.timer(key).is_some_and(|t| t.timer_enabled),
        }
    }

    pub fn set_enabled(&mut self, key: ProfileKey, enabled: bool) {
        match key {
            ProfileKey::Climate => self.inner.weekly_planner.climatization_enabled = enabled,
            ProfileKey::WindowStart | ProfileKey::WindowEnd => {
                self.inner.weekly_planner.preferred_charging_window.enabled = enabled
            }
            _ => {
                if let Some(t) = self.timer_mut(key) {
                    t.timer_enabled = enabled;
                }
            }
        }
    }

    /// Time of day of a key; `None` for keys without one
    pub fn time(&self, key: ProfileKey) -> Option<NaiveTime> {
        let window = &self.inner.weekly_planner.preferred_charging_window;
        match key {
            ProfileKey::Climate => None,
            ProfileKey::WindowStart => Some(parse_time(window.start_time.as_deref())),
            ProfileKey::WindowEnd => Some(parse_time(window.end_time.as_deref())),
            _ => self
                .timer(key)
                .map(|t| parse_time(t.departure_time.as_deref())),
        }
    }

    fn set_time(&mut self, key: ProfileKey, time: NaiveTime) -> Result<()> {
        let formatted = Some(format_time(time));
        match key {
            ProfileKey::Climate => {
                return Err(DriveLinkError::validation(
                    key.as_str(),
                    "climate has no time of day",
                ));
            }
            ProfileKey::WindowStart => {
                self.inner.weekly_planner.preferred_charging_window.start_time = formatted
            }
            ProfileKey::WindowEnd => {
                self.inner.weekly_planner.preferred_charging_window.end_time = formatted
            }
            _ => {
                if let Some(t) = self.timer_mut(key) {
                    t.departure_time = formatted;
                }
            }
        }
        Ok(())
    }

    pub fn set_hour(&mut self, key: ProfileKey, hour: i64) -> Result<()> {
        let current = self.time(key).unwrap_or(NaiveTime::MIN);
        let time = u32::try_from(hour)
            .ok()
            .and_then(|h| current.with_hour(h))
            .ok_or_else(|| {
                DriveLinkError::validation(key.as_str(), format!("hour {} outside 0-23", hour))
            })?;
        self.set_time(key, time)
    }

    pub fn set_minute(&mut self, key: ProfileKey, minute: i64) -> Result<()> {
        let current = self.time(key).unwrap_or(NaiveTime::MIN);
        let time = u32::try_from(minute)
            .ok()
            .and_then(|m| current.with_minute(m))
            .ok_or_else(|| {
                DriveLinkError::validation(key.as_str(), format!("minute {} outside 0-59", minute))
            })?;
        self.set_time(key, time)
    }

    /// Weekdays of a timer key
    pub fn days(&self, key: ProfileKey) -> Option<DaySet> {
        if !key.is_timer() {
            return None;
        }
        self.timer(key)
            .map(|t| t.weekdays.iter().filter_map(|d| parse_day(d)).collect())
    }

    pub fn set_day(&mut self, key: ProfileKey, day: Weekday, on: bool) -> Result<()> {
        let mut days = self.days(key).ok_or_else(|| {
            DriveLinkError::validation(key.as_str(), "only departure timers have weekdays")
        })?;
        days.set(day, on);
        if let Some(t) = self.timer_mut(key) {
            t.weekdays = days.days().into_iter().map(|d| day_name(d).to_string()).collect();
        }
        Ok(())
    }

    pub fn preference(&self) -> &str {
        &self.inner.weekly_planner.charging_preferences
    }

    pub fn set_preference(&mut self, value: &str) -> Result<()> {
        let normalized = normalize_choice(value);
        if !PREFERENCES.contains(&normalized.as_str()) {
            return Err(DriveLinkError::validation(
                "preference",
                format!("unsupported charging preference {}", value),
            ));
        }
        self.inner.weekly_planner.charging_preferences = normalized;
        Ok(())
    }

    pub fn mode(&self) -> &str {
        &self.inner.weekly_planner.charging_mode
    }

    pub fn set_mode(&mut self, value: &str) -> Result<()> {
        let normalized = normalize_choice(value);
        if !MODES.contains(&normalized.as_str()) {
            return Err(DriveLinkError::validation(
                "mode",
                format!("unsupported charging mode {}", value),
            ));
        }
        self.inner.weekly_planner.charging_mode = normalized;
        Ok(())
    }

    /// Flat record of one key
    pub fn record(&self, key: ProfileKey) -> ProfileRecord {
        let time = self.time(key).unwrap_or(NaiveTime::MIN);
        ProfileRecord {
            enabled: self.is_enabled(key),
            hour: time.hour(),
            minute: time.minute(),
            days: self.days(key).unwrap_or_default(),
        }
    }
}
