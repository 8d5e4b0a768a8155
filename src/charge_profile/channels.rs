//! Charge profile channel table
//!
//! Channel identifiers are joined to profile fields through one immutable
//! table built on first use.

use super::{ChargeProfile, ProfileKey, WEEK};
use crate::error::{DriveLinkError, Result};
use crate::sink::{ChannelCommand, ChannelValue, title_case};
use chrono::Weekday;
use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const CHARGE_PROFILE_CLIMATE: &str = "charge-profile-climate";
pub const CHARGE_PROFILE_PREFERENCE: &str = "charge-profile-preference";
pub const CHARGE_PROFILE_MODE: &str = "charge-profile-mode";

/// Channel group prefix of every charge profile channel
pub const CHARGE_GROUP: &str = "charge-";

/// Profile field addressed by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeField {
    Enable(ProfileKey),
    Time { key: ProfileKey, is_hour: bool },
    Day(ProfileKey, Weekday),
    Preference,
    Mode,
}

impl ChargeField {
    /// Key whose channels need re-rendering after an edit
    pub fn key(&self) -> Option<ProfileKey> {
        match self {
            ChargeField::Enable(k) | ChargeField::Time { key: k, .. } | ChargeField::Day(k, _) => {
                Some(*k)
            }
            ChargeField::Preference | ChargeField::Mode => None,
        }
    }
}

fn key_prefix(key: ProfileKey) -> String {
    format!("charge-{}", key.as_str())
}

/// Base id of the time-of-day channels of a key
fn time_base(key: ProfileKey) -> String {
    match key {
        ProfileKey::WindowStart | ProfileKey::WindowEnd => key_prefix(key),
        _ => format!("{}-departure", key_prefix(key)),
    }
}

fn enable_channel(key: ProfileKey) -> Option<String> {
    match key {
        ProfileKey::Climate => Some(CHARGE_PROFILE_CLIMATE.to_string()),
        ProfileKey::WindowStart | ProfileKey::WindowEnd => None,
        _ => Some(format!("{}-enabled", key_prefix(key))),
    }
}

fn day_suffix(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn day_channel(key: ProfileKey, day: Weekday) -> String {
    format!("{}-day-{}", key_prefix(key), day_suffix(day))
}

static CHARGE_FIELDS: Lazy<HashMap<String, ChargeField>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(CHARGE_PROFILE_PREFERENCE.to_string(), ChargeField::Preference);
    table.insert(CHARGE_PROFILE_MODE.to_string(), ChargeField::Mode);
    for key in ProfileKey::ALL {
        if let Some(id) = enable_channel(key) {
            table.insert(id, ChargeField::Enable(key));
        }
        if key.has_time() {
            let base = time_base(key);
            table.insert(
                format!("{}-hour", base),
                ChargeField::Time { key, is_hour: true },
            );
            table.insert(
                format!("{}-minute", base),
                ChargeField::Time {
                    key,
                    is_hour: false,
                },
            );
        }
        if key.is_timer() {
            for day in WEEK {
                table.insert(day_channel(key, day), ChargeField::Day(key, day));
            }
        }
    }
    table
});

/// Resolve a channel id to its profile field
pub fn lookup(channel: &str) -> Option<ChargeField> {
    CHARGE_FIELDS.get(channel).copied()
}

pub fn is_charge_channel(channel: &str) -> bool {
    channel.starts_with(CHARGE_GROUP)
}

fn whole_number(channel: &str, value: f64) -> Result<i64> {
    if value.fract() != 0.0 || !value.is_finite() {
        return Err(DriveLinkError::validation(
            channel,
            format!("{} is not a whole number", value),
        ));
    }
    Ok(value as i64)
}

fn mismatch(channel: &str, command: &ChannelCommand) -> DriveLinkError {
    DriveLinkError::validation(channel, format!("unsupported command {:?}", command))
}

/// Apply one channel command to a profile
pub fn apply(
    profile: &mut ChargeProfile,
    channel: &str,
    field: ChargeField,
    command: &ChannelCommand,
) -> Result<()> {
    match (field, command) {
        (ChargeField::Enable(key), ChannelCommand::OnOff(on)) => {
            profile.set_enabled(key, *on);
            Ok(())
        }
        (ChargeField::Day(key, day), ChannelCommand::OnOff(on)) => profile.set_day(key, day, *on),
        (ChargeField::Time { key, is_hour }, ChannelCommand::Number(n)) => {
            let n = whole_number(channel, *n)?;
            if is_hour {
                profile.set_hour(key, n)
            } else {
                profile.set_minute(key, n)
            }
        }
        (ChargeField::Preference, ChannelCommand::Text(s)) => profile.set_preference(s),
        (ChargeField::Mode, ChannelCommand::Text(s)) => profile.set_mode(s),
        _ => Err(mismatch(channel, command)),
    }
}

/// Channel values of one key
pub fn render_key(profile: &ChargeProfile, key: ProfileKey) -> Vec<(String, ChannelValue)> {
    let record = profile.record(key);
    let mut out = Vec::new();
    if let Some(id) = enable_channel(key) {
        out.push((id, ChannelValue::Switch(record.enabled)));
    }
    if key.has_time() {
        let base = time_base(key);
        out.push((
            format!("{}-hour", base),
            ChannelValue::Number(record.hour as f64),
        ));
        out.push((
            format!("{}-minute", base),
            ChannelValue::Number(record.minute as f64),
        ));
        out.push((
            base,
            ChannelValue::text(format!("{:02}:{:02}", record.hour, record.minute)),
        ));
    }
    if key.is_timer() {
        for day in WEEK {
            out.push((
                day_channel(key, day),
                ChannelValue::Switch(record.days.contains(day)),
            ));
        }
    }
    out
}

/// Every charge profile channel
pub fn render(profile: &ChargeProfile) -> Vec<(String, ChannelValue)> {
    let mut out = vec![
        (
            CHARGE_PROFILE_PREFERENCE.to_string(),
            ChannelValue::text(title_case(profile.preference())),
        ),
        (
            CHARGE_PROFILE_MODE.to_string(),
            ChannelValue::text(title_case(profile.mode())),
        ),
    ];
    for key in ProfileKey::ALL {
        out.extend(render_key(profile, key));
    }
    out
}

/// Channels published after applying `field`
pub fn render_field(profile: &ChargeProfile, field: ChargeField) -> Vec<(String, ChannelValue)> {
    match field {
        ChargeField::Preference => vec![(
            CHARGE_PROFILE_PREFERENCE.to_string(),
            ChannelValue::text(title_case(profile.preference())),
        )],
        ChargeField::Mode => vec![(
            CHARGE_PROFILE_MODE.to_string(),
            ChannelValue::text(title_case(profile.mode())),
        )],
        _ => field
            .key()
            .map(|k| render_key(profile, k))
            .unwrap_or_default(),
    }
}

/// Undefined values for every charge channel, used when no profile is known
pub fn render_empty() -> Vec<(String, ChannelValue)> {
    let mut ids: Vec<String> = CHARGE_FIELDS.keys().cloned().collect();
    ids.sort();
    ids.into_iter().map(|id| (id, ChannelValue::Undef)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{"weeklyPlanner":{"chargingMode":"DELAYED_CHARGING",
        "chargingPreferences":"CHARGING_WINDOW",
        "timer1":{"departureTime":"07:30","timerEnabled":true,"weekdays":["MONDAY"]},
        "preferredChargingWindow":{"enabled":true,"startTime":"22:00","endTime":"05:30"}}}"#;

    #[test]
    fn table_covers_all_fields() {
        assert_eq!(
            lookup("charge-timer1-enabled"),
            Some(ChargeField::Enable(ProfileKey::Timer1))
        );
        assert_eq!(
            lookup("charge-timer3-departure-minute"),
            Some(ChargeField::Time {
                key: ProfileKey::Timer3,
                is_hour: false
            })
        );
        assert_eq!(
            lookup("charge-timer2-day-sat"),
            Some(ChargeField::Day(ProfileKey::Timer2, Weekday::Sat))
        );
        assert_eq!(
            lookup("charge-window-end-hour"),
            Some(ChargeField::Time {
                key: ProfileKey::WindowEnd,
                is_hour: true
            })
        );
        assert_eq!(
            lookup(CHARGE_PROFILE_CLIMATE),
            Some(ChargeField::Enable(ProfileKey::Climate))
        );
        assert_eq!(lookup("charge-override-day-mon"), None);
        assert_eq!(lookup("charge-profile-turbo"), None);
    }

    #[test]
    fn wrong_command_type_is_rejected() {
        let mut p = ChargeProfile::from_json(PROFILE).unwrap();
        let field = lookup("charge-timer1-departure-hour").unwrap();
        let err = apply(
            &mut p,
            "charge-timer1-departure-hour",
            field,
            &ChannelCommand::OnOff(true),
        )
        .unwrap_err();
        assert!(err.is_validation());
        let err = apply(
            &mut p,
            "charge-timer1-departure-hour",
            field,
            &ChannelCommand::Number(7.5),
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn rendering_uses_display_names() {
        let p = ChargeProfile::from_json(PROFILE).unwrap();
        let values: HashMap<String, ChannelValue> = render(&p).into_iter().collect();
        assert_eq!(
            values[CHARGE_PROFILE_MODE].as_text(),
            Some("Delayed Charging")
        );
        assert_eq!(
            values["charge-timer1-departure"].as_text(),
            Some("07:30")
        );
        assert_eq!(values["charge-timer1-day-mon"].as_switch(), Some(true));
        assert_eq!(values["charge-timer1-day-tue"].as_switch(), Some(false));
        assert_eq!(values["charge-window-start-hour"].as_number(), Some(22.0));
    }

    #[test]
    fn empty_render_matches_table() {
        let empty = render_empty();
        assert!(empty.iter().all(|(_, v)| *v == ChannelValue::Undef));
        assert!(empty.iter().any(|(id, _)| id == "charge-timer2-day-sun"));
    }
}
