pub mod carbon;
pub mod error;
pub mod fetch;
pub mod mcp;
pub mod model;
pub mod parse;
pub mod query;
pub mod server;
pub mod session;
pub mod table;

use carbon::CarbonSettings;
use error::EcoError;
use fetch::PlatformClient;
use model::CarbonAnalysis;
use query::FlightQuery;
use session::Session;

/// Identifier of this application in the platform's installation registry.
pub const APP_ID: &str = "ecoflight";

pub async fn analyze_club(
    client: &PlatformClient,
    session: &Session,
    query: &FlightQuery,
    settings: &CarbonSettings,
) -> Result<CarbonAnalysis, EcoError> {
    settings.validate()?;
    let flights = client.fetch_flights(session, query).await?;
    Ok(carbon::analyze(&flights, settings))
}
