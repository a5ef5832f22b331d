use crate::error::EcoError;
use crate::model::ClubScope;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 1000;

/// Columns and embedded relations requested for every flight row.
pub const FLIGHT_SELECT: &str = "id,date,duration,userId,aircraftId,destination,\
fuel_added_before,fuel_added_after,landings,\
aircraft:aircraftId(id,name,registration,type,capacity,fuel_types!fuel_type_id(name,emission_factor)),\
users:userId(first_name,last_name)";

pub const AIRCRAFT_SELECT: &str =
    "id,name,registration,type,capacity,fuel_types!fuel_type_id(name,emission_factor)";

/// One page of a club's flights, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightQuery {
    pub limit: usize,
    pub offset: usize,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl Default for FlightQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            start_date: None,
            end_date: None,
        }
    }
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if (year.is_multiple_of(4) && !year.is_multiple_of(100)) || year.is_multiple_of(400) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

pub fn validate_date(date: &str) -> Result<(), EcoError> {
    let invalid = || EcoError::InvalidDate(date.to_string());
    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() != 3 || parts[0].len() != 4 || parts[1].len() != 2 || parts[2].len() != 2 {
        return Err(invalid());
    }
    let year: u32 = parts[0].parse().map_err(|_| invalid())?;
    let month: u32 = parts[1].parse().map_err(|_| invalid())?;
    let day: u32 = parts[2].parse().map_err(|_| invalid())?;

    if year < 1900 || !(1..=12).contains(&month) {
        return Err(invalid());
    }

    if day < 1 || day > days_in_month(year, month) {
        return Err(invalid());
    }

    Ok(())
}

impl FlightQuery {
    pub fn validate(&self) -> Result<(), EcoError> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(EcoError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {}",
                self.limit
            )));
        }

        if let Some(ref start) = self.start_date {
            validate_date(start)?;
        }
        if let Some(ref end) = self.end_date {
            validate_date(end)?;
        }

        // Zero-padded ISO dates order lexically.
        if let (Some(start), Some(end)) = (&self.start_date, &self.end_date) {
            if start > end {
                return Err(EcoError::Validation(format!(
                    "start date {start} is after end date {end}"
                )));
            }
        }

        Ok(())
    }

    /// PostgREST parameters for this page of the given club's flights.
    pub fn to_url_params(&self, scope: &ClubScope) -> Vec<(String, String)> {
        let mut params = vec![
            ("select".to_string(), FLIGHT_SELECT.to_string()),
            ("club_id".to_string(), format!("eq.{}", scope.club_id)),
            ("order".to_string(), "date.desc".to_string()),
            ("offset".to_string(), self.offset.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];

        if let Some(ref start) = self.start_date {
            params.push(("date".to_string(), format!("gte.{start}")));
        }
        if let Some(ref end) = self.end_date {
            params.push(("date".to_string(), format!("lte.{end}")));
        }

        params
    }
}
