//! Reminder model and scheduler
//!
//! A reminder binds a wall-clock time-of-day to a notification style and a
//! recurrence flag. The scheduler in [`scheduler`] owns one timer-driven
//! state machine per reminder and polices the taken/snoozed/missed lifecycle.

pub mod messages;
pub mod scheduler;

pub use scheduler::ReminderScheduler;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque reminder identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderId(String);

impl ReminderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReminderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the reminder is prompting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Pill,
    Cycle,
    Mood,
    Wellness,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::Pill => "pill",
            ReminderKind::Cycle => "cycle",
            ReminderKind::Mood => "mood",
            ReminderKind::Wellness => "wellness",
        }
    }
}

/// Notification tone tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStyle {
    Cute,
    Gentle,
    Urgent,
}

impl Default for ReminderStyle {
    fn default() -> Self {
        ReminderStyle::Cute
    }
}

impl ReminderStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStyle::Cute => "cute",
            ReminderStyle::Gentle => "gentle",
            ReminderStyle::Urgent => "urgent",
        }
    }
}

/// Lifecycle phase of a single fire-cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderPhase {
    /// Waiting for the fire timer
    Scheduled,
    /// Due notification dispatched; missed-check pending
    Fired,
    /// Deferred; waiting for the snooze fire timer
    Snoozed,
    /// Missed notification dispatched (terminal for this cycle)
    Missed,
    /// Acknowledged (terminal for this cycle)
    Taken,
}

/// A scheduled prompt bound to a wall-clock time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub user_id: String,
    pub kind: ReminderKind,

    /// Next (or most recent) fire instant
    pub scheduled_time: DateTime<Utc>,

    /// User-configured style; escalation overrides this at dispatch time
    pub style: ReminderStyle,

    /// Deferrals within the current fire-cycle; monotonic until the cycle resets
    pub snooze_count: u32,

    pub last_snoozed_at: Option<DateTime<Utc>>,
    pub recurring: bool,
    pub active: bool,
    pub phase: ReminderPhase,
}

impl Reminder {
    /// Effective dispatch style: escalates to Urgent once the snooze count
    /// reaches the threshold, until the cycle resets.
    pub fn effective_style(&self, escalation_threshold: u32) -> ReminderStyle {
        if self.snooze_count >= escalation_threshold {
            ReminderStyle::Urgent
        } else {
            self.style
        }
    }
}

/// Request to schedule a new reminder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderSpec {
    pub user_id: String,
    pub kind: ReminderKind,

    /// Wall-clock time of day the reminder should fire
    pub time_of_day: NaiveTime,

    #[serde(default)]
    pub style: ReminderStyle,

    #[serde(default)]
    pub recurring: bool,
}

/// Events published on the scheduler's in-app channel
#[derive(Debug, Clone)]
pub enum ReminderEvent {
    /// A reminder was scheduled (or re-armed for its next occurrence)
    Scheduled {
        id: ReminderId,
        fire_at: DateTime<Utc>,
    },

    /// Due notification dispatched
    Fired { id: ReminderId, style: ReminderStyle },

    /// Reminder deferred
    Snoozed {
        id: ReminderId,
        snooze_count: u32,
        next_fire_at: DateTime<Utc>,
    },

    /// Reminder acknowledged
    MarkedTaken { id: ReminderId },

    /// Grace window elapsed without acknowledgment
    Missed { id: ReminderId, style: ReminderStyle },

    /// Reminder removed
    Cancelled { id: ReminderId },
}

/// Compute the next fire instant for a time-of-day: today if still ahead,
/// otherwise the same time tomorrow. An instant equal to `now` fires now.
pub fn next_occurrence(now: DateTime<Utc>, time_of_day: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(time_of_day).and_utc();
    if today >= now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_next_occurrence_later_today() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let fire = next_occurrence(now, at(9, 0));
        assert_eq!(fire, Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap();
        let fire = next_occurrence(now, at(9, 0));
        assert_eq!(fire, Utc.with_ymd_and_hms(2026, 3, 11, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_exactly_now_fires_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        assert_eq!(next_occurrence(now, at(9, 0)), now);
    }

    #[test]
    fn test_effective_style_escalates_at_threshold() {
        let mut reminder = Reminder {
            id: ReminderId::new("r-1"),
            user_id: "u-1".into(),
            kind: ReminderKind::Pill,
            scheduled_time: Utc::now(),
            style: ReminderStyle::Cute,
            snooze_count: 2,
            last_snoozed_at: None,
            recurring: false,
            active: true,
            phase: ReminderPhase::Scheduled,
        };
        assert_eq!(reminder.effective_style(3), ReminderStyle::Cute);

        reminder.snooze_count = 3;
        assert_eq!(reminder.effective_style(3), ReminderStyle::Urgent);
    }
}
