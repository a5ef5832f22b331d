use serde_json::Value;

use crate::error::EcoError;
use crate::model::*;

fn get_val<'a>(val: &'a Value, key: &str) -> Option<&'a Value> {
    val.get(key).filter(|v| !v.is_null())
}

/// PostgREST embeds a to-one relation as an object, but older views return a
/// one-element array.
fn get_embedded<'a>(val: &'a Value, key: &str) -> Option<&'a Value> {
    match get_val(val, key)? {
        Value::Array(items) => items.first(),
        other => Some(other),
    }
}

fn get_str(val: &Value, key: &str) -> Option<String> {
    match get_val(val, key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers come back as JSON numbers, but Postgres `numeric` columns may be
/// serialized as strings.
fn get_f64(val: &Value, key: &str) -> Option<f64> {
    match get_val(val, key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn get_u32(val: &Value, key: &str) -> Option<u32> {
    get_val(val, key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

fn parse_json(body: &str) -> Result<Value, EcoError> {
    serde_json::from_str(body).map_err(|e| EcoError::Decode(e.to_string()))
}

fn parse_duration(row: &Value, id: &str) -> Result<u32, EcoError> {
    let Some(raw) = get_val(row, "duration") else {
        return Ok(0);
    };
    let minutes = get_f64(row, "duration")
        .filter(|m| m.is_finite() && *m >= 0.0 && m.fract() == 0.0 && *m <= f64::from(u32::MAX))
        .ok_or_else(|| {
            EcoError::MalformedFlight(format!(
                "flight {id}: duration must be a non-negative whole number of minutes, got {raw}"
            ))
        })?;
    Ok(minutes as u32)
}

fn parse_fuel_part(row: &Value, key: &str, id: &str) -> Result<Option<f64>, EcoError> {
    let Some(raw) = get_val(row, key) else {
        return Ok(None);
    };
    match get_f64(row, key) {
        Some(liters) if liters.is_finite() && liters >= 0.0 => Ok(Some(liters)),
        _ => Err(EcoError::MalformedFlight(format!(
            "flight {id}: {key} must be a non-negative number of liters, got {raw}"
        ))),
    }
}

/// Sum of the fuel added before and after the flight. A total of zero means
/// nothing was recorded and the flight falls back to estimation.
fn parse_fuel_used(row: &Value, id: &str) -> Result<Option<f64>, EcoError> {
    let before = parse_fuel_part(row, "fuel_added_before", id)?;
    let after = parse_fuel_part(row, "fuel_added_after", id)?;
    if before.is_none() && after.is_none() {
        return Ok(None);
    }
    let total = before.unwrap_or(0.0) + after.unwrap_or(0.0);
    Ok((total > 0.0).then_some(total))
}

pub fn parse_aircraft(row: &Value) -> AircraftDescriptor {
    let fuel_type = get_embedded(row, "fuel_types");
    AircraftDescriptor {
        id: get_str(row, "id"),
        name: get_str(row, "name").unwrap_or_else(|| "Avion".to_string()),
        registration: get_str(row, "registration").unwrap_or_default(),
        aircraft_type: get_str(row, "type"),
        capacity: get_u32(row, "capacity")
            .or_else(|| get_u32(row, "seats"))
            .filter(|&c| c > 0),
        fuel_type: fuel_type.and_then(|ft| get_str(ft, "name")),
        emission_factor: fuel_type.and_then(|ft| get_f64(ft, "emission_factor")),
    }
}

fn pilot_name(row: &Value) -> String {
    let Some(user) = get_embedded(row, "users") else {
        return "N/A".to_string();
    };
    let first = get_str(user, "first_name").unwrap_or_default();
    let last = get_str(user, "last_name").unwrap_or_default();
    let name = format!("{first} {last}");
    let name = name.trim();
    if name.is_empty() {
        "N/A".to_string()
    } else {
        name.to_string()
    }
}

pub fn parse_flight(row: &Value) -> Result<FlightRecord, EcoError> {
    if !row.is_object() {
        return Err(EcoError::MalformedFlight(format!(
            "expected a flight object, got {row}"
        )));
    }
    let id = get_str(row, "id")
        .ok_or_else(|| EcoError::MalformedFlight("flight row without an id".into()))?;

    let aircraft = match get_embedded(row, "aircraft") {
        Some(a) => parse_aircraft(a),
        None => AircraftDescriptor {
            id: get_str(row, "aircraftId"),
            name: "Avion".to_string(),
            ..Default::default()
        },
    };

    Ok(FlightRecord {
        date: get_str(row, "date").unwrap_or_default(),
        duration_minutes: parse_duration(row, &id)?,
        destination: get_str(row, "destination"),
        pilot_id: get_str(row, "userId"),
        pilot_name: pilot_name(row),
        landings: get_u32(row, "landings"),
        fuel_used: parse_fuel_used(row, &id)?,
        aircraft,
        id,
    })
}

pub fn parse_flights(body: &str) -> Result<Vec<FlightRecord>, EcoError> {
    let payload = parse_json(body)?;
    let rows = payload
        .as_array()
        .ok_or_else(|| EcoError::Decode("expected an array of flights".into()))?;
    rows.iter().map(parse_flight).collect()
}

pub fn parse_aircraft_list(body: &str) -> Result<Vec<AircraftDescriptor>, EcoError> {
    let payload = parse_json(body)?;
    let rows = payload
        .as_array()
        .ok_or_else(|| EcoError::Decode("expected an array of aircraft".into()))?;
    Ok(rows.iter().map(parse_aircraft).collect())
}

fn user_from(val: &Value) -> Result<PlatformUser, EcoError> {
    let id = get_str(val, "id").ok_or_else(|| EcoError::Decode("user without an id".into()))?;
    Ok(PlatformUser {
        id,
        email: get_str(val, "email"),
    })
}

pub fn parse_user(body: &str) -> Result<PlatformUser, EcoError> {
    user_from(&parse_json(body)?)
}

/// Access token and user from a password grant.
pub fn parse_sign_in(body: &str) -> Result<(String, PlatformUser), EcoError> {
    let payload = parse_json(body)?;
    let token = get_str(&payload, "access_token")
        .ok_or_else(|| EcoError::Decode("sign-in response without access_token".into()))?;
    let user = get_val(&payload, "user")
        .ok_or_else(|| EcoError::Decode("sign-in response without user".into()))?;
    Ok((token, user_from(user)?))
}

/// The single active club of a user, mirroring a `.single()` select.
pub fn parse_club_membership(body: &str) -> Result<String, EcoError> {
    let payload = parse_json(body)?;
    let rows = payload
        .as_array()
        .ok_or_else(|| EcoError::Decode("expected an array of memberships".into()))?;
    match rows.as_slice() {
        [row] => get_str(row, "club_id").ok_or(EcoError::NoClub),
        _ => Err(EcoError::NoClub),
    }
}

pub fn parse_row_count(body: &str) -> Result<usize, EcoError> {
    parse_json(body)?
        .as_array()
        .map(Vec::len)
        .ok_or_else(|| EcoError::Decode("expected an array".into()))
}
