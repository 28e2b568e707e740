//! Built-in circuit catalog.
//!
//! Lap length, night-race flag and a coarse track type for every circuit
//! used since 2020, keyed by the dataset's `circuitId`.

use serde::{Deserialize, Serialize};

/// Coarse character of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    /// Slow, twisty, braking-heavy.
    Technical,
    /// Long straights, low downforce.
    HighSpeed,
    /// Neither extreme.
    Balanced,
}

impl TrackType {
    /// Label written to CSV.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::HighSpeed => "high_speed",
            Self::Balanced => "balanced",
        }
    }
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static facts about one circuit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitInfo {
    /// Dataset circuit id.
    pub circuit_id: i64,
    /// Lap length in kilometres.
    pub length_km: f64,
    /// Whether the Grand Prix is usually run at night.
    pub is_night_race: bool,
    /// Track character.
    pub track_type: TrackType,
}

const fn info(circuit_id: i64, length_km: f64, is_night_race: bool, track_type: TrackType) -> CircuitInfo {
    CircuitInfo {
        circuit_id,
        length_km,
        is_night_race,
        track_type,
    }
}

use TrackType::{Balanced, HighSpeed, Technical};

/// Every catalogued circuit.
pub const CATALOG: &[CircuitInfo] = &[
    info(1, 5.278, false, Balanced),   // Albert Park
    info(3, 5.412, true, Balanced),    // Bahrain
    info(4, 4.657, false, Balanced),   // Catalunya
    info(5, 5.338, false, Balanced),   // Istanbul Park
    info(6, 3.337, false, Technical),  // Monaco
    info(7, 4.361, false, Balanced),   // Montreal
    info(9, 5.891, false, HighSpeed),  // Silverstone
    info(11, 4.381, false, Technical), // Hungaroring
    info(13, 7.004, false, HighSpeed), // Spa
    info(14, 5.793, false, HighSpeed), // Monza
    info(15, 4.927, true, Technical),  // Marina Bay
    info(17, 5.451, false, Balanced),  // Shanghai
    info(18, 4.309, false, Technical), // Interlagos
    info(20, 5.148, false, Balanced),  // Nürburgring
    info(21, 4.909, false, Technical), // Imola
    info(22, 5.807, false, Technical), // Suzuka
    info(24, 5.281, true, Technical),  // Yas Marina
    info(32, 4.304, false, Balanced),  // Mexico City
    info(34, 5.842, false, Balanced),  // Paul Ricard
    info(39, 4.259, false, Balanced),  // Zandvoort
    info(69, 5.513, false, Balanced),  // Austin
    info(70, 4.326, false, HighSpeed), // Red Bull Ring
    info(71, 5.848, false, Balanced),  // Sochi
    info(73, 6.003, false, HighSpeed), // Baku
    info(75, 4.653, false, Balanced),  // Portimão
    info(76, 5.245, false, HighSpeed), // Mugello
    info(77, 6.174, true, HighSpeed),  // Jeddah
    info(78, 5.419, true, Balanced),   // Losail
    info(79, 5.412, false, Technical), // Miami
    info(80, 6.201, true, HighSpeed),  // Las Vegas
];

/// Look up a circuit by id.
#[must_use]
pub fn lookup(circuit_id: i64) -> Option<&'static CircuitInfo> {
    CATALOG.iter().find(|c| c.circuit_id == circuit_id)
}
