//! Honor-board badges.
//!
//! Each badge is an independent predicate over one student's aggregates. The
//! rules are additive: a student can hold any subset, and some rules overlap
//! on purpose (`PerfectAttendance` and `DigitalCitizen` both require zero
//! warnings).

use serde::Serialize;
use std::collections::HashSet;

pub const LANGUAGE_EXPERT_MIN_COMPLETED: usize = 10;
pub const DIGITAL_RESEARCHER_MIN_POINTS: i64 = 15;
pub const COMMUNICATOR_MIN_PRAISE: usize = 3;
pub const CIVILITY_AMBASSADOR_MIN_PRAISE: usize = 5;
/// Size of the global points podium feeding `VocabWarrior`.
pub const PODIUM_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    LanguageExpert,
    DigitalResearcher,
    VocabWarrior,
    Communicator,
    PerfectAttendance,
    CivilityAmbassador,
    DigitalCitizen,
}

impl Badge {
    pub fn label(self) -> &'static str {
        match self {
            Badge::LanguageExpert => "Language Expert",
            Badge::DigitalResearcher => "Digital Researcher",
            Badge::VocabWarrior => "Vocabulary Warrior",
            Badge::Communicator => "Great Communicator",
            Badge::PerfectAttendance => "Like Clockwork",
            Badge::CivilityAmbassador => "Civility Ambassador",
            Badge::DigitalCitizen => "Model Digital Citizen",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Badge::LanguageExpert => "Completes language assignments consistently",
            Badge::DigitalResearcher => "Actively studies the digital library",
            Badge::VocabWarrior => "Among the top point earners",
            Badge::Communicator => "Inspires classmates through speaking and interaction",
            Badge::PerfectAttendance => "Spotless conduct record",
            Badge::CivilityAmbassador => "Exemplary behavior and discipline",
            Badge::DigitalCitizen => "Polite, respectful and engaged online",
        }
    }
}

/// Per-student quantities the rules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeInputs<'a> {
    pub student_id: &'a str,
    pub points: i64,
    pub completed_tasks: usize,
    pub praise_count: usize,
    pub warn_count: usize,
}

pub struct BadgeRule {
    pub badge: Badge,
    pub earned: fn(&BadgeInputs<'_>, &HashSet<&str>) -> bool,
}

/// Rule table in honor-board display order.
pub const BADGE_RULES: [BadgeRule; 7] = [
    BadgeRule {
        badge: Badge::LanguageExpert,
        earned: language_expert,
    },
    BadgeRule {
        badge: Badge::DigitalResearcher,
        earned: digital_researcher,
    },
    BadgeRule {
        badge: Badge::VocabWarrior,
        earned: vocab_warrior,
    },
    BadgeRule {
        badge: Badge::Communicator,
        earned: communicator,
    },
    BadgeRule {
        badge: Badge::PerfectAttendance,
        earned: perfect_attendance,
    },
    BadgeRule {
        badge: Badge::CivilityAmbassador,
        earned: civility_ambassador,
    },
    BadgeRule {
        badge: Badge::DigitalCitizen,
        earned: digital_citizen,
    },
];

fn language_expert(i: &BadgeInputs<'_>, _: &HashSet<&str>) -> bool {
    i.completed_tasks >= LANGUAGE_EXPERT_MIN_COMPLETED
}

fn digital_researcher(i: &BadgeInputs<'_>, _: &HashSet<&str>) -> bool {
    i.points > DIGITAL_RESEARCHER_MIN_POINTS
}

fn vocab_warrior(i: &BadgeInputs<'_>, podium: &HashSet<&str>) -> bool {
    podium.contains(i.student_id)
}

fn communicator(i: &BadgeInputs<'_>, _: &HashSet<&str>) -> bool {
    i.praise_count >= COMMUNICATOR_MIN_PRAISE
}

fn perfect_attendance(i: &BadgeInputs<'_>, _: &HashSet<&str>) -> bool {
    i.warn_count == 0
}

fn civility_ambassador(i: &BadgeInputs<'_>, _: &HashSet<&str>) -> bool {
    i.praise_count >= CIVILITY_AMBASSADOR_MIN_PRAISE
}

fn digital_citizen(i: &BadgeInputs<'_>, _: &HashSet<&str>) -> bool {
    i.warn_count == 0 && i.completed_tasks > 0
}

/// Badges earned by one student. `podium` holds the ids of the global top
/// point earners, computed once per refresh.
pub fn evaluate_badges(inputs: &BadgeInputs<'_>, podium: &HashSet<&str>) -> Vec<Badge> {
    BADGE_RULES
        .iter()
        .filter(|rule| (rule.earned)(inputs, podium))
        .map(|rule| rule.badge)
        .collect()
}
