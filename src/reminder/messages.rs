//! Style-tier message templates
//!
//! Three style tiers, each carrying two independent template sets: "due" and
//! "missed". Selection is purely by (possibly escalated) style; no other
//! business logic governs wording.

use super::ReminderStyle;

/// Title + body pair handed to the notification channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSet {
    pub title: &'static str,
    pub body: &'static str,
}

const DUE_CUTE: &[MessageSet] = &[
    MessageSet {
        title: "Pill time! 💊",
        body: "Your little daily ritual is here. You've got this!",
    },
    MessageSet {
        title: "Hey you! 🌸",
        body: "A tiny pill, a big dose of self-care.",
    },
    MessageSet {
        title: "Ding ding! ✨",
        body: "Time for your pill, superstar.",
    },
];

const DUE_GENTLE: &[MessageSet] = &[
    MessageSet {
        title: "Gentle reminder",
        body: "It's time to take your pill when you're ready.",
    },
    MessageSet {
        title: "A soft nudge",
        body: "Your scheduled dose is due. No rush, just don't forget.",
    },
];

const DUE_URGENT: &[MessageSet] = &[
    MessageSet {
        title: "Don't skip your pill!",
        body: "Your dose is due now. Please take it as soon as possible.",
    },
    MessageSet {
        title: "Important: pill due",
        body: "This reminder has been waiting. Take your pill now.",
    },
];

const MISSED_CUTE: &[MessageSet] = &[
    MessageSet {
        title: "Oops, missed one? 🥺",
        body: "Looks like your pill is still waiting for you.",
    },
    MessageSet {
        title: "Your pill misses you 💭",
        body: "It's been a while since the reminder. Everything okay?",
    },
];

const MISSED_GENTLE: &[MessageSet] = &[
    MessageSet {
        title: "Gentle check-in",
        body: "We noticed you haven't logged your pill yet. When you get a moment.",
    },
    MessageSet {
        title: "Checking in",
        body: "Your scheduled dose hasn't been marked as taken.",
    },
];

const MISSED_URGENT: &[MessageSet] = &[
    MessageSet {
        title: "Missed dose",
        body: "Your pill was not taken within the grace window. Please take it now or consult your plan.",
    },
    MessageSet {
        title: "Action needed: missed pill",
        body: "A scheduled dose was missed. Log it once handled.",
    },
];

/// Pick a "due" message for the given style
pub fn due_message(style: ReminderStyle) -> &'static MessageSet {
    pick(match style {
        ReminderStyle::Cute => DUE_CUTE,
        ReminderStyle::Gentle => DUE_GENTLE,
        ReminderStyle::Urgent => DUE_URGENT,
    })
}

/// Pick a "missed" message for the given style
pub fn missed_message(style: ReminderStyle) -> &'static MessageSet {
    pick(match style {
        ReminderStyle::Cute => MISSED_CUTE,
        ReminderStyle::Gentle => MISSED_GENTLE,
        ReminderStyle::Urgent => MISSED_URGENT,
    })
}

/// Nanos-based pick to vary wording without a rand dependency
fn pick(set: &'static [MessageSet]) -> &'static MessageSet {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as usize)
        .unwrap_or(0);
    &set[nanos % set.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_and_missed_sets_are_distinct_per_style() {
        for style in [
            ReminderStyle::Cute,
            ReminderStyle::Gentle,
            ReminderStyle::Urgent,
        ] {
            let due = due_message(style);
            let missed = missed_message(style);
            assert_ne!(due, missed);
        }
    }

    #[test]
    fn test_urgent_missed_wording_mentions_missed() {
        let msg = missed_message(ReminderStyle::Urgent);
        assert!(msg.title.to_lowercase().contains("missed") || msg.body.to_lowercase().contains("missed"));
    }
}
