//! Carbon estimation for club flights.
//!
//! Every function here is pure: the same flights and settings always give the
//! same analysis, so flights may be processed in any order or in parallel.

use crate::error::EcoError;
use crate::model::{
    AggregateStats, AnalyzedFlight, CarbonAnalysis, EmissionLevel, FlightRecord, FuelSource,
};

/// kg of CO2 per liter of aviation fuel when the fuel type gives none.
pub const DEFAULT_EMISSION_FACTOR: f64 = 2.31;
pub const DEFAULT_PRICE_PER_TONNE: f64 = 25.0;
pub const DEFAULT_DISPLAY_LIMIT: usize = 20;

/// Four-seat class (100LL), liters per hour.
pub const HIGH_BURN_RATE: f64 = 33.0;
/// Ultralight and two-seat class (SP98), liters per hour.
pub const LOW_BURN_RATE: f64 = 15.0;

const HIGH_THRESHOLD_KG: f64 = 50.0;
const MEDIUM_THRESHOLD_KG: f64 = 20.0;

const EFFICIENCY_THRESHOLD_KG: f64 = 30.0;
const OFFSET_THRESHOLD_KG: f64 = 10.0;

pub const SHORTER_FLIGHTS: &str = "Considérez des vols plus courts pour réduire la consommation";
pub const OPTIMIZE_FLIGHT_PLAN: &str = "Optimisez votre plan de vol pour économiser du carburant";
pub const BUY_OFFSETS: &str = "Compensez vos émissions avec des crédits carbone certifiés";
pub const SHARE_FLIGHTS: &str = "Partagez vos vols pour répartir les émissions";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarbonSettings {
    pub price_per_tonne: f64,
    /// How many analyzed flights are returned; stats always cover the batch.
    pub display_limit: usize,
}

impl Default for CarbonSettings {
    fn default() -> Self {
        Self {
            price_per_tonne: DEFAULT_PRICE_PER_TONNE,
            display_limit: DEFAULT_DISPLAY_LIMIT,
        }
    }
}

impl CarbonSettings {
    pub fn validate(&self) -> Result<(), EcoError> {
        if !self.price_per_tonne.is_finite() || self.price_per_tonne < 0.0 {
            return Err(EcoError::Validation(format!(
                "price per tonne must be a non-negative number, got {}",
                self.price_per_tonne
            )));
        }
        if self.display_limit == 0 {
            return Err(EcoError::Validation(
                "display limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn is_ultralight(aircraft_type: Option<&str>) -> bool {
    aircraft_type.is_some_and(|t| t.trim().eq_ignore_ascii_case("ULM"))
}

/// Liters per hour assumed for an aircraft.
///
/// A capacity of 0 counts as unknown. Three-seat aircraft match neither class
/// and fall through to the four-seat rate.
pub fn burn_rate(capacity: Option<u32>, aircraft_type: Option<&str>) -> f64 {
    let seats = capacity.filter(|&c| c > 0);
    if seats.is_some_and(|c| c >= 4) {
        HIGH_BURN_RATE
    } else if is_ultralight(aircraft_type) || seats.is_some_and(|c| c <= 2) {
        LOW_BURN_RATE
    } else {
        HIGH_BURN_RATE
    }
}

pub fn estimate_fuel(duration_minutes: u32, capacity: Option<u32>, aircraft_type: Option<&str>) -> f64 {
    burn_rate(capacity, aircraft_type) * (f64::from(duration_minutes) / 60.0)
}

impl FuelSource<'_> {
    pub fn liters(&self) -> f64 {
        match *self {
            Self::Known(liters) => liters,
            Self::Estimate {
                duration_minutes,
                capacity,
                aircraft_type,
            } => estimate_fuel(duration_minutes, capacity, aircraft_type),
        }
    }
}

/// Checks a fuel amount given by hand. Zero liters means nothing was
/// recorded, so the flight gets estimated instead.
pub fn recorded_fuel(liters: Option<f64>) -> Result<Option<f64>, EcoError> {
    match liters {
        Some(l) if !l.is_finite() || l < 0.0 => Err(EcoError::Validation(format!(
            "fuel used must be a non-negative number of liters, got {l}"
        ))),
        other => Ok(other.filter(|&l| l > 0.0)),
    }
}

/// Falls back to [`DEFAULT_EMISSION_FACTOR`] for missing or non-physical values.
pub fn effective_emission_factor(factor: Option<f64>) -> f64 {
    factor
        .filter(|f| f.is_finite() && *f > 0.0)
        .unwrap_or(DEFAULT_EMISSION_FACTOR)
}

pub fn co2_kg(fuel_liters: f64, emission_factor: Option<f64>) -> f64 {
    fuel_liters * effective_emission_factor(emission_factor)
}

pub fn offset_cost(co2_kg: f64, price_per_tonne: f64) -> f64 {
    (co2_kg / 1000.0) * price_per_tonne
}

pub fn classify(co2_kg: f64) -> EmissionLevel {
    if co2_kg > HIGH_THRESHOLD_KG {
        EmissionLevel::High
    } else if co2_kg > MEDIUM_THRESHOLD_KG {
        EmissionLevel::Medium
    } else {
        EmissionLevel::Low
    }
}

/// Every tier the average crosses contributes its advice; sharing is always last.
pub fn recommendations(avg_co2: f64) -> Vec<String> {
    let mut out = Vec::with_capacity(4);
    if avg_co2 > EFFICIENCY_THRESHOLD_KG {
        out.push(SHORTER_FLIGHTS.to_string());
        out.push(OPTIMIZE_FLIGHT_PLAN.to_string());
    }
    if avg_co2 > OFFSET_THRESHOLD_KG {
        out.push(BUY_OFFSETS.to_string());
    }
    out.push(SHARE_FLIGHTS.to_string());
    out
}

pub fn analyze_flight(flight: &FlightRecord, settings: &CarbonSettings) -> AnalyzedFlight {
    let source = flight.fuel_source();
    let fuel = source.liters();
    let co2 = co2_kg(fuel, flight.aircraft.emission_factor);
    let (fuel_used, fuel_estimated) = match source {
        FuelSource::Known(_) => (Some(fuel), None),
        FuelSource::Estimate { .. } => (None, Some(fuel)),
    };

    AnalyzedFlight {
        flight: flight.clone(),
        fuel_used,
        fuel_estimated,
        co2_kg: co2,
        offset_cost: offset_cost(co2, settings.price_per_tonne),
        emission_level: classify(co2),
    }
}

pub fn aggregate(flights: &[AnalyzedFlight]) -> AggregateStats {
    let total_co2: f64 = flights.iter().map(|f| f.co2_kg).sum();
    AggregateStats {
        total_flights: flights.len(),
        total_co2,
        avg_co2: total_co2 / flights.len().max(1) as f64,
        offset_cost: flights.iter().map(|f| f.offset_cost).sum(),
    }
}

/// Analyzes a whole batch. Statistics and advice cover every flight given,
/// while only the first `display_limit` analyzed flights are returned.
pub fn analyze(flights: &[FlightRecord], settings: &CarbonSettings) -> CarbonAnalysis {
    let mut analyzed: Vec<AnalyzedFlight> = flights
        .iter()
        .map(|f| analyze_flight(f, settings))
        .collect();

    let stats = aggregate(&analyzed);
    let recommendations = recommendations(stats.avg_co2);
    analyzed.truncate(settings.display_limit);

    CarbonAnalysis {
        stats,
        flights: analyzed,
        recommendations,
    }
}
