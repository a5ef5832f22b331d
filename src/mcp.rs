use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use serde::Deserialize;
use tracing::error;

use crate::carbon::{self, CarbonSettings};
use crate::error::EcoError;
use crate::fetch::PlatformClient;
use crate::model::{AircraftDescriptor, FlightRecord};
use crate::query::{FlightQuery, DEFAULT_LIMIT};

const TOKEN_ENV: &str = "ECOFLIGHT_TOKEN";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AnalyzeArgs {
    #[schemars(
        description = "4Fly user JWT. Optional when the ECOFLIGHT_TOKEN environment variable is set"
    )]
    token: Option<String>,
    #[schemars(description = "Number of most recent flights to analyze (1-1000). Default: 50")]
    limit: Option<usize>,
    #[schemars(description = "Number of most recent flights to skip. Default: 0")]
    offset: Option<usize>,
    #[schemars(description = "Only flights on or after this date, YYYY-MM-DD")]
    start_date: Option<String>,
    #[schemars(description = "Only flights on or before this date, YYYY-MM-DD")]
    end_date: Option<String>,
    #[schemars(description = "Offset price per tonne of CO2. Default: configured price (25)")]
    price_per_tonne: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct EstimateArgs {
    #[schemars(description = "Flight duration in minutes. Default: 0")]
    duration_minutes: Option<u32>,
    #[schemars(description = "Aircraft seat count. 4+ seats burn 33 L/h, 1-2 seats burn 15 L/h")]
    capacity: Option<u32>,
    #[schemars(description = "Aircraft type label. ULM burns 15 L/h")]
    aircraft_type: Option<String>,
    #[schemars(description = "kg of CO2 per liter of fuel. Default: 2.31")]
    emission_factor: Option<f64>,
    #[schemars(description = "Liters of fuel actually used, if known. Skips the duration estimate")]
    fuel_used: Option<f64>,
    #[schemars(description = "Offset price per tonne of CO2. Default: configured price (25)")]
    price_per_tonne: Option<f64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AircraftArgs {
    #[schemars(
        description = "4Fly user JWT. Optional when the ECOFLIGHT_TOKEN environment variable is set"
    )]
    token: Option<String>,
}

fn tool_error(msg: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.into())]))
}

fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string_pretty(value) {
        Ok(json) => Ok(CallToolResult::success(vec![Content::text(json)])),
        Err(e) => tool_error(format!("failed to serialize result: {e}")),
    }
}

fn resolve_token(arg: Option<String>) -> Option<String> {
    arg.or_else(|| std::env::var(TOKEN_ENV).ok())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn estimate_record(args: &EstimateArgs) -> Result<FlightRecord, EcoError> {
    Ok(FlightRecord {
        id: "estimate".into(),
        duration_minutes: args.duration_minutes.unwrap_or(0),
        pilot_name: "N/A".into(),
        fuel_used: carbon::recorded_fuel(args.fuel_used)?,
        aircraft: AircraftDescriptor {
            aircraft_type: args.aircraft_type.clone(),
            capacity: args.capacity,
            emission_factor: args.emission_factor,
            ..Default::default()
        },
        ..Default::default()
    })
}

#[derive(Debug, Clone)]
struct EcoFlightMcp {
    client: Option<PlatformClient>,
    settings: CarbonSettings,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl EcoFlightMcp {
    fn new(client: Option<PlatformClient>, settings: CarbonSettings) -> Self {
        Self {
            client,
            settings,
            tool_router: Self::tool_router(),
        }
    }

    fn settings_with_price(&self, price: Option<f64>) -> CarbonSettings {
        CarbonSettings {
            price_per_tonne: price.unwrap_or(self.settings.price_per_tonne),
            ..self.settings
        }
    }

    #[tool(
        description = "Analyze the carbon footprint of the signed-in user's club flights. Returns aggregate stats (total_flights, total_co2, avg_co2, offset_cost) over every fetched flight, the most recent analyzed flights with fuel, co2_kg, offset_cost and emission_level, and recommendations."
    )]
    async fn ecoflight_analyze(
        &self,
        Parameters(args): Parameters<AnalyzeArgs>,
    ) -> Result<CallToolResult, McpError> {
        let Some(client) = self.client.as_ref() else {
            return tool_error("platform not configured: set SUPABASE_URL and SUPABASE_ANON_KEY");
        };
        let Some(token) = resolve_token(args.token) else {
            return tool_error(format!("token required (argument or {TOKEN_ENV})"));
        };

        let settings = self.settings_with_price(args.price_per_tonne);
        let query = FlightQuery {
            limit: args.limit.unwrap_or(DEFAULT_LIMIT),
            offset: args.offset.unwrap_or(0),
            start_date: args.start_date,
            end_date: args.end_date,
        };

        let session = match client.authenticate(&token).await {
            Ok(s) => s,
            Err(e) => return tool_error(e.to_string()),
        };

        match crate::analyze_club(client, &session, &query, &settings).await {
            Ok(analysis) => json_result(&analysis),
            Err(e) => tool_error(e.to_string()),
        }
    }

    #[tool(
        description = "Estimate fuel, CO2, offset cost and emission level for a single flight without contacting the platform. Give fuel_used when known, otherwise duration_minutes with capacity and/or aircraft_type."
    )]
    async fn ecoflight_estimate(
        &self,
        Parameters(args): Parameters<EstimateArgs>,
    ) -> Result<CallToolResult, McpError> {
        let settings = self.settings_with_price(args.price_per_tonne);
        if let Err(e) = settings.validate() {
            return tool_error(e.to_string());
        }
        match estimate_record(&args) {
            Ok(record) => json_result(&carbon::analyze_flight(&record, &settings)),
            Err(e) => tool_error(e.to_string()),
        }
    }

    #[tool(
        description = "List the club's aircraft with type, seat count, fuel type and emission factor."
    )]
    async fn ecoflight_aircraft(
        &self,
        Parameters(args): Parameters<AircraftArgs>,
    ) -> Result<CallToolResult, McpError> {
        let Some(client) = self.client.as_ref() else {
            return tool_error("platform not configured: set SUPABASE_URL and SUPABASE_ANON_KEY");
        };
        let Some(token) = resolve_token(args.token) else {
            return tool_error(format!("token required (argument or {TOKEN_ENV})"));
        };

        let session = match client.authenticate(&token).await {
            Ok(s) => s,
            Err(e) => return tool_error(e.to_string()),
        };
        match client.fetch_aircraft(&session).await {
            Ok(fleet) => json_result(&fleet),
            Err(e) => tool_error(e.to_string()),
        }
    }
}

#[tool_handler]
impl ServerHandler for EcoFlightMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "ecoflight".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "Carbon footprint of flight-club flights. Use ecoflight_analyze for the club's recorded flights, ecoflight_estimate for a hypothetical flight, ecoflight_aircraft to see which burn rate each aircraft gets.".into(),
            ),
        }
    }
}

pub async fn run(client: Option<PlatformClient>, settings: CarbonSettings) {
    let service = match EcoFlightMcp::new(client, settings)
        .serve(rmcp::transport::stdio())
        .await
    {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "failed to start MCP server");
            return;
        }
    };
    if let Err(e) = service.waiting().await {
        error!(error = %e, "MCP server error");
    }
}
