//! Retirement (DNF) categories for result status text.
//!
//! Status strings in the dataset are free text ("Engine", "Collision
//! damage", "+1 Lap", ...). They are bucketed by keyword: crash keywords
//! win over mechanical ones, which win over generic retirements. Anything
//! else counts as a classified finish.
//!
//! Constructor reliability uses a narrower pair of keyword lists, see
//! [`ReliabilityCause`]. Those two flags are independent of each other and
//! of [`DnfCategory`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Why a car did or did not finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnfCategory {
    /// Accident, collision or contact.
    Crash,
    /// Technical or mechanical failure.
    Mechanical,
    /// Retired, withdrawn, disqualified and similar.
    OtherDnf,
    /// Not a retirement.
    NoDnf,
}

const CRASH_KEYWORDS: &[&str] = &[
    "accident",
    "collision",
    "crash",
    "contact",
    "spun off",
    "damage",
];

const MECHANICAL_KEYWORDS: &[&str] = &[
    "engine",
    "gearbox",
    "hydraulics",
    "brakes",
    "suspension",
    "exhaust",
    "clutch",
    "power",
    "fuel",
    "overheating",
    "oil",
    "radiator",
    "turbo",
    "driveshaft",
    "mechanical",
    "transmission",
    "electrical",
    "differential",
    "puncture",
    "front wing",
    "water",
    "wheel",
    "steering",
    "electronics",
    "rear wing",
    "vibrations",
    "undertray",
    "cooling system",
    "throttle",
    "technical",
    "handling",
];

const OTHER_KEYWORDS: &[&str] = &[
    "retired",
    "withdrew",
    "disqualified",
    "illness",
    "debris",
    "underweight",
];

const RELIABILITY_MECHANICAL_KEYWORDS: &[&str] = &[
    "engine",
    "gearbox",
    "hydraulic",
    "electrical",
    "suspension",
    "transmission",
    "brake",
    "fuel",
    "oil",
    "turbo",
    "mechanical",
    "power unit",
    "overheat",
];

const RELIABILITY_CRASH_KEYWORDS: &[&str] = &["accident", "collision", "crash", "damage", "spun"];

/// Case-insensitive alternation of escaped keywords.
///
/// # Panics
///
/// Panics if the resulting pattern is invalid, which escaped literals
/// cannot produce.
fn keyword_regex(keywords: &[&str]) -> Regex {
    let alternation = keywords
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){alternation}")).expect("Invalid keyword pattern")
}

fn patterns() -> &'static [(DnfCategory, Regex); 3] {
    static PATTERNS: OnceLock<[(DnfCategory, Regex); 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (DnfCategory::Crash, keyword_regex(CRASH_KEYWORDS)),
            (DnfCategory::Mechanical, keyword_regex(MECHANICAL_KEYWORDS)),
            (DnfCategory::OtherDnf, keyword_regex(OTHER_KEYWORDS)),
        ]
    })
}

fn reliability_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        (
            keyword_regex(RELIABILITY_MECHANICAL_KEYWORDS),
            keyword_regex(RELIABILITY_CRASH_KEYWORDS),
        )
    })
}

/// Retirement causes counted in constructor reliability.
///
/// Unlike [`DnfCategory`], both flags may be set: "Collision damage" is a
/// crash, and so is anything mentioning "spun", while "Puncture" or
/// "Contact" are neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReliabilityCause {
    /// Status mentions a technical failure.
    pub mechanical: bool,
    /// Status mentions an accident.
    pub crash: bool,
}

impl ReliabilityCause {
    /// Flags for a status string.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        let (mechanical, crash) = reliability_patterns();
        Self {
            mechanical: mechanical.is_match(status),
            crash: crash.is_match(status),
        }
    }
}

impl DnfCategory {
    /// Categorise a status string.
    #[must_use]
    pub fn classify(status: &str) -> Self {
        patterns()
            .iter()
            .find(|(_, re)| re.is_match(status))
            .map_or(Self::NoDnf, |(category, _)| *category)
    }

    /// Label written to CSV.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crash => "crash",
            Self::Mechanical => "mechanical",
            Self::OtherDnf => "other_dnf",
            Self::NoDnf => "no_dnf",
        }
    }

    /// Parse a CSV label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "crash" => Some(Self::Crash),
            "mechanical" => Some(Self::Mechanical),
            "other_dnf" => Some(Self::OtherDnf),
            "no_dnf" => Some(Self::NoDnf),
            _ => None,
        }
    }

    /// Whether this category is a retirement.
    #[must_use]
    pub fn is_dnf(self) -> bool {
        !matches!(self, Self::NoDnf)
    }
}

impl std::fmt::Display for DnfCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
