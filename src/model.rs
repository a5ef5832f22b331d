use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AircraftDescriptor {
    pub id: Option<String>,
    pub name: String,
    pub registration: String,
    #[serde(rename = "type")]
    pub aircraft_type: Option<String>,
    pub capacity: Option<u32>,
    pub fuel_type: Option<String>,
    pub emission_factor: Option<f64>,
}

/// One completed flight as read from the club's records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlightRecord {
    pub id: String,
    pub date: String,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    pub destination: Option<String>,
    pub pilot_id: Option<String>,
    pub pilot_name: String,
    pub landings: Option<u32>,
    #[serde(skip)]
    pub fuel_used: Option<f64>,
    pub aircraft: AircraftDescriptor,
}

/// Where the liters of fuel for a flight come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FuelSource<'a> {
    Known(f64),
    Estimate {
        duration_minutes: u32,
        capacity: Option<u32>,
        aircraft_type: Option<&'a str>,
    },
}

impl FlightRecord {
    pub fn fuel_source(&self) -> FuelSource<'_> {
        match self.fuel_used {
            Some(liters) => FuelSource::Known(liters),
            None => FuelSource::Estimate {
                duration_minutes: self.duration_minutes,
                capacity: self.aircraft.capacity,
                aircraft_type: self.aircraft.aircraft_type.as_deref(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionLevel {
    Low,
    Medium,
    High,
}

impl EmissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Faible",
            Self::Medium => "Moyen",
            Self::High => "Élevé",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Low => "#4CAF50",
            Self::Medium => "#ff9800",
            Self::High => "#f44336",
        }
    }
}

impl std::fmt::Display for EmissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EmissionLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("EmissionLevel", 3)?;
        s.serialize_field("level", self.as_str())?;
        s.serialize_field("label", self.label())?;
        s.serialize_field("color", self.color())?;
        s.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedFlight {
    #[serde(flatten)]
    pub flight: FlightRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_estimated: Option<f64>,
    pub co2_kg: f64,
    pub offset_cost: f64,
    pub emission_level: EmissionLevel,
}

impl AnalyzedFlight {
    pub fn fuel_liters(&self) -> f64 {
        self.fuel_used.or(self.fuel_estimated).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total_flights: usize,
    pub total_co2: f64,
    pub avg_co2: f64,
    pub offset_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CarbonAnalysis {
    pub stats: AggregateStats,
    pub flights: Vec<AnalyzedFlight>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformUser {
    pub id: String,
    pub email: Option<String>,
}

/// Tenant boundary of one authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClubScope {
    pub user_id: String,
    pub club_id: String,
}
