use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::carbon;
use crate::model::{AircraftDescriptor, AnalyzedFlight, CarbonAnalysis, EmissionLevel};

pub fn format_cost(cost: f64, currency: &str) -> String {
    match currency {
        "EUR" => format!("{cost:.2} €"),
        "USD" => format!("${cost:.2}"),
        "GBP" => format!("£{cost:.2}"),
        "CHF" => format!("CHF {cost:.2}"),
        _ => format!("{cost:.2} {currency}"),
    }
}

pub fn format_kg(kg: f64) -> String {
    format!("{kg:.1} kg")
}

pub fn format_duration(minutes: u32) -> String {
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

fn level_color(level: EmissionLevel) -> Color {
    match level {
        EmissionLevel::Low => Color::Green,
        EmissionLevel::Medium => Color::Yellow,
        EmissionLevel::High => Color::Red,
    }
}

fn fuel_cell(flight: &AnalyzedFlight) -> String {
    match (flight.fuel_used, flight.fuel_estimated) {
        (Some(used), _) => format!("{used:.1} L"),
        (None, Some(estimated)) => format!("~{estimated:.1} L"),
        (None, None) => "—".to_string(),
    }
}

fn aircraft_label(aircraft: &AircraftDescriptor) -> String {
    if aircraft.registration.is_empty() {
        aircraft.name.clone()
    } else {
        format!("{} ({})", aircraft.name, aircraft.registration)
    }
}

pub fn render_flights(flights: &[AnalyzedFlight], currency: &str) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Date", "Aircraft", "Pilot", "Destination", "Duration", "Fuel", "CO₂", "Offset", "Level",
        ]);

    for flight in flights {
        let record = &flight.flight;
        table.add_row(vec![
            Cell::new(&record.date),
            Cell::new(aircraft_label(&record.aircraft)),
            Cell::new(&record.pilot_name),
            Cell::new(record.destination.as_deref().unwrap_or("—")),
            Cell::new(format_duration(record.duration_minutes)),
            Cell::new(fuel_cell(flight)),
            Cell::new(format_kg(flight.co2_kg)),
            Cell::new(format_cost(flight.offset_cost, currency)),
            Cell::new(flight.emission_level.label()).fg(level_color(flight.emission_level)),
        ]);
    }

    table.to_string()
}

pub fn render_summary(analysis: &CarbonAnalysis, currency: &str) -> String {
    let stats = &analysis.stats;
    let mut out = format!(
        "Flights: {} | Total CO₂: {} | Average: {} ({}) | Offset: {}",
        stats.total_flights,
        format_kg(stats.total_co2),
        format_kg(stats.avg_co2),
        carbon::classify(stats.avg_co2).label(),
        format_cost(stats.offset_cost, currency),
    );
    if analysis.flights.len() < stats.total_flights {
        out.push_str(&format!(
            "\nShowing the {} most recent of {} analyzed flights",
            analysis.flights.len(),
            stats.total_flights
        ));
    }
    out
}

pub fn render(analysis: &CarbonAnalysis, currency: &str) -> String {
    let mut out = render_summary(analysis, currency);
    if !analysis.flights.is_empty() {
        out.push('\n');
        out.push_str(&render_flights(&analysis.flights, currency));
    }
    out.push_str("\nRecommendations:");
    for rec in &analysis.recommendations {
        out.push_str(&format!("\n  • {rec}"));
    }
    out
}

pub fn render_fleet(aircraft: &[AircraftDescriptor]) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Aircraft", "Type", "Seats", "Fuel", "Factor (kg/L)", "Burn rate",
        ]);

    for a in aircraft {
        let rate = carbon::burn_rate(a.capacity, a.aircraft_type.as_deref());
        table.add_row(vec![
            aircraft_label(a),
            a.aircraft_type.clone().unwrap_or_else(|| "—".to_string()),
            a.capacity.map_or_else(|| "?".to_string(), |c| c.to_string()),
            a.fuel_type.clone().unwrap_or_else(|| "—".to_string()),
            format!("{:.2}", carbon::effective_emission_factor(a.emission_factor)),
            format!("{rate:.0} L/h"),
        ]);
    }

    table.to_string()
}
