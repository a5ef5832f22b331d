use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ecoflight::carbon::{self, CarbonSettings, DEFAULT_DISPLAY_LIMIT, DEFAULT_PRICE_PER_TONNE};
use ecoflight::error::EcoError;
use ecoflight::fetch::{FetchOptions, PlatformClient, PlatformConfig};
use ecoflight::model::{AircraftDescriptor, AnalyzedFlight, CarbonAnalysis, FlightRecord};
use ecoflight::query::{FlightQuery, DEFAULT_LIMIT};
use ecoflight::session::Session;
use ecoflight::{server, table};

#[derive(Parser)]
#[command(
    name = "ecoflight",
    about = "Carbon footprint of your flight club's flights",
    version,
    after_help = "\
Examples:
  ecoflight analyze --token $JWT
  ecoflight analyze --email pilot@club.fr --password ... --from 2026-01-01 --json --pretty
  ecoflight estimate --duration 90 --capacity 4
  ecoflight serve --port 3000

Platform settings are read from SUPABASE_URL and SUPABASE_ANON_KEY when not given as flags."
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "SUPABASE_URL",
        value_name = "URL",
        help = "4Fly platform (Supabase) URL"
    )]
    supabase_url: Option<String>,

    #[arg(
        long,
        global = true,
        env = "SUPABASE_ANON_KEY",
        value_name = "KEY",
        hide_env_values = true,
        help = "4Fly platform anonymous API key"
    )]
    supabase_anon_key: Option<String>,

    #[arg(long, global = true, value_name = "URL", help = "HTTP or SOCKS5 proxy")]
    proxy: Option<String>,

    #[arg(
        long,
        global = true,
        default_value = "30",
        value_name = "SECS",
        help = "Platform request timeout"
    )]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    #[command(
        about = "Analyze the carbon footprint of your club's flights",
        long_about = "Fetch the most recent flights of your club and compute fuel, CO₂, \
            offset cost and emission level for each one, plus totals and recommendations.\n\
            Stats cover every fetched flight; only the first --display-limit flights are listed.",
        after_help = "\
Examples:
  Token:        ecoflight analyze --token $JWT
  Password:     ecoflight analyze --email pilot@club.fr --password secret
  Date range:   ecoflight analyze --token $JWT --from 2026-01-01 --to 2026-06-30
  JSON output:  ecoflight analyze --token $JWT --json --pretty
  One-liners:   ecoflight analyze --token $JWT --compact"
    )]
    Analyze(AnalyzeArgs),
    #[command(about = "Estimate the footprint of a single flight (offline)")]
    Estimate(EstimateArgs),
    #[command(about = "List your club's aircraft and the burn rate each one gets")]
    Aircraft(AircraftArgs),
    #[command(about = "Sign in with email and password and print an access token")]
    Login(LoginArgs),
    #[command(about = "Start the HTTP API server")]
    Serve(ServeArgs),
    #[command(about = "Start MCP server for AI agents (stdio transport)")]
    Mcp(PricingArgs),
}

#[derive(clap::Args)]
struct CredentialArgs {
    #[arg(
        long,
        env = "ECOFLIGHT_TOKEN",
        value_name = "JWT",
        hide_env_values = true,
        help = "4Fly user access token"
    )]
    token: Option<String>,

    #[arg(long, value_name = "EMAIL", help = "Sign in with this email instead of a token")]
    email: Option<String>,

    #[arg(long, value_name = "PASSWORD", help = "Password for --email")]
    password: Option<String>,
}

#[derive(clap::Args)]
struct PricingArgs {
    #[arg(
        long,
        env = "ECOFLIGHT_PRICE_PER_TONNE",
        default_value_t = DEFAULT_PRICE_PER_TONNE,
        value_name = "PRICE",
        help = "Offset price per tonne of CO₂"
    )]
    price_per_tonne: f64,

    #[arg(
        long,
        default_value_t = DEFAULT_DISPLAY_LIMIT,
        value_name = "N",
        help = "Number of analyzed flights listed (stats cover all fetched flights)"
    )]
    display_limit: usize,
}

impl PricingArgs {
    fn settings(&self) -> CarbonSettings {
        CarbonSettings {
            price_per_tonne: self.price_per_tonne,
            display_limit: self.display_limit,
        }
    }
}

#[derive(clap::Args)]
struct AnalyzeArgs {
    #[command(flatten)]
    credentials: CredentialArgs,

    #[command(flatten)]
    pricing: PricingArgs,

    #[arg(long, default_value_t = DEFAULT_LIMIT, value_name = "N", help = "Number of most recent flights to fetch")]
    limit: usize,

    #[arg(long, default_value = "0", value_name = "N", help = "Skip the N most recent flights")]
    offset: usize,

    #[arg(long = "from", value_name = "YYYY-MM-DD", help = "Only flights on or after this date")]
    start_date: Option<String>,

    #[arg(long = "to", value_name = "YYYY-MM-DD", help = "Only flights on or before this date")]
    end_date: Option<String>,

    #[arg(long, default_value = "EUR", value_name = "CODE", help = "Currency shown for offset costs")]
    currency: String,

    #[arg(long, help = "One-line-per-flight output (recommended for scripts)")]
    compact: bool,

    #[arg(long, help = "Output as JSON")]
    json: bool,

    #[arg(long, help = "Output as pretty-printed JSON")]
    pretty: bool,
}

#[derive(clap::Args)]
struct EstimateArgs {
    #[arg(long, default_value = "0", value_name = "MINUTES", help = "Flight duration in minutes")]
    duration: u32,

    #[arg(long, value_name = "SEATS", help = "Aircraft seat count")]
    capacity: Option<u32>,

    #[arg(long = "type", value_name = "TYPE", help = "Aircraft type label (e.g. ULM)")]
    aircraft_type: Option<String>,

    #[arg(long, value_name = "KG_PER_L", help = "kg of CO₂ per liter of fuel [default: 2.31]")]
    emission_factor: Option<f64>,

    #[arg(long, value_name = "LITERS", help = "Fuel actually used; skips the duration estimate")]
    fuel_used: Option<f64>,

    #[command(flatten)]
    pricing: PricingArgs,

    #[arg(long, default_value = "EUR", value_name = "CODE", help = "Currency shown for the offset cost")]
    currency: String,

    #[arg(long, help = "Output as JSON")]
    json: bool,

    #[arg(long, help = "Output as pretty-printed JSON")]
    pretty: bool,
}

#[derive(clap::Args)]
struct AircraftArgs {
    #[command(flatten)]
    credentials: CredentialArgs,

    #[arg(long, help = "Output as JSON")]
    json: bool,

    #[arg(long, help = "Output as pretty-printed JSON")]
    pretty: bool,
}

#[derive(clap::Args)]
struct LoginArgs {
    #[arg(long, value_name = "EMAIL", help = "Account email")]
    email: String,

    #[arg(long, env = "ECOFLIGHT_PASSWORD", hide_env_values = true, value_name = "PASSWORD", help = "Account password")]
    password: String,

    #[arg(long, help = "Output as JSON")]
    json: bool,
}

#[derive(clap::Args)]
struct ServeArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0", value_name = "ADDR", help = "Bind address")]
    host: String,

    #[arg(long, env = "PORT", default_value = "3000", value_name = "PORT", help = "Bind port")]
    port: u16,

    #[arg(long, env = "FRONTEND_URL", value_name = "URL", help = "Extra allowed CORS origin")]
    frontend_url: Option<String>,

    #[command(flatten)]
    pricing: PricingArgs,
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn error_code(err: &EcoError) -> i32 {
    match err {
        EcoError::InvalidDate(_) | EcoError::Validation(_) | EcoError::Config(_) => 2,
        EcoError::Timeout
        | EcoError::ConnectionFailed(_)
        | EcoError::DnsResolution(_)
        | EcoError::TlsError(_)
        | EcoError::ProxyError(_) => 3,
        EcoError::Unauthorized(_)
        | EcoError::InvalidToken(_)
        | EcoError::Forbidden(_)
        | EcoError::NoClub
        | EcoError::AppNotInstalled => 4,
        EcoError::RateLimited | EcoError::HttpStatus(..) => 5,
        EcoError::Decode(_) | EcoError::MalformedFlight(_) => 6,
    }
}

fn error_kind(err: &EcoError) -> &'static str {
    match err {
        EcoError::InvalidDate(_) => "invalid_date",
        EcoError::Validation(_) => "validation_error",
        EcoError::Config(_) => "config_error",
        EcoError::Timeout => "timeout",
        EcoError::ConnectionFailed(_) => "connection_failed",
        EcoError::DnsResolution(_) => "dns_error",
        EcoError::TlsError(_) => "tls_error",
        EcoError::ProxyError(_) => "proxy_error",
        EcoError::Unauthorized(_) => "unauthorized",
        EcoError::InvalidToken(_) => "invalid_token",
        EcoError::Forbidden(_) => "forbidden",
        EcoError::NoClub => "no_club",
        EcoError::AppNotInstalled => "app_not_installed",
        EcoError::RateLimited => "rate_limited",
        EcoError::HttpStatus(..) => "http_error",
        EcoError::Decode(_) => "decode_error",
        EcoError::MalformedFlight(_) => "malformed_flight",
    }
}

fn die(err: &EcoError, json_mode: bool) -> ! {
    if json_mode {
        let json = serde_json::json!({
            "error": {
                "kind": error_kind(err),
                "message": err.to_string(),
            }
        });
        println!("{json}");
    } else {
        eprintln!("error: {err}");
    }
    process::exit(error_code(err));
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) {
    let output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match output {
        Ok(s) => println!("{s}"),
        Err(e) => die(&EcoError::Validation(format!("failed to serialize output: {e}")), true),
    }
}

fn platform_client(cli: &Cli) -> Result<PlatformClient, EcoError> {
    let config = PlatformConfig::new(
        cli.supabase_url.as_deref().unwrap_or_default(),
        cli.supabase_anon_key.as_deref().unwrap_or_default(),
    )?;
    let options = FetchOptions {
        proxy: cli.proxy.clone(),
        timeout: cli.timeout,
    };
    PlatformClient::new(config, &options)
}

async fn open_session(client: &PlatformClient, creds: &CredentialArgs) -> Result<Session, EcoError> {
    let token = match (&creds.email, &creds.password, &creds.token) {
        (Some(email), Some(password), _) => client.sign_in(email, password).await?.0,
        (Some(_), None, _) => {
            return Err(EcoError::Validation("--password is required with --email".into()))
        }
        (None, _, Some(token)) => token.trim().to_string(),
        (None, _, None) => {
            return Err(EcoError::Validation(
                "--token (or ECOFLIGHT_TOKEN) or --email/--password is required".into(),
            ))
        }
    };
    client.authenticate(&token).await
}

fn print_compact(analysis: &CarbonAnalysis, currency: &str) {
    for flight in &analysis.flights {
        let record = &flight.flight;
        println!(
            "{} | {} | {} | {:.1} L | {} | {} | {}",
            record.date,
            record.aircraft.name,
            table::format_duration(record.duration_minutes),
            flight.fuel_liters(),
            table::format_kg(flight.co2_kg),
            table::format_cost(flight.offset_cost, currency),
            flight.emission_level,
        );
    }
    let stats = &analysis.stats;
    println!(
        "total | {} flights | {} | avg {} | {}",
        stats.total_flights,
        table::format_kg(stats.total_co2),
        table::format_kg(stats.avg_co2),
        table::format_cost(stats.offset_cost, currency),
    );
}

fn print_analysis(analysis: &CarbonAnalysis, args: &AnalyzeArgs) {
    if args.json || args.pretty {
        print_json(analysis, args.pretty);
    } else if args.compact {
        print_compact(analysis, &args.currency);
    } else {
        if analysis.stats.total_flights == 0 {
            println!("No flights found for this club.");
        }
        println!("{}", table::render(analysis, &args.currency));
    }
}

fn print_estimate(flight: &AnalyzedFlight, args: &EstimateArgs) {
    if args.json || args.pretty {
        print_json(flight, args.pretty);
        return;
    }
    let origin = if flight.fuel_used.is_some() { "measured" } else { "estimated" };
    println!("Fuel:   {:.1} L ({origin})", flight.fuel_liters());
    println!("CO₂:    {}", table::format_kg(flight.co2_kg));
    println!("Offset: {}", table::format_cost(flight.offset_cost, &args.currency));
    println!("Level:  {} ({})", flight.emission_level.label(), flight.emission_level);
}

fn estimate(args: &EstimateArgs) -> Result<AnalyzedFlight, EcoError> {
    let settings = args.pricing.settings();
    settings.validate()?;
    let fuel_used = carbon::recorded_fuel(args.fuel_used)?;
    let record = FlightRecord {
        id: "estimate".into(),
        duration_minutes: args.duration,
        pilot_name: "N/A".into(),
        fuel_used,
        aircraft: AircraftDescriptor {
            aircraft_type: args.aircraft_type.clone(),
            capacity: args.capacity,
            emission_factor: args.emission_factor,
            ..Default::default()
        },
        ..Default::default()
    };
    Ok(carbon::analyze_flight(&record, &settings))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve(_) => init_logging("ecoflight=info,tower_http=info"),
        _ => init_logging("warn"),
    }

    match &cli.command {
        Commands::Estimate(args) => {
            let json_mode = args.json || args.pretty;
            match estimate(args) {
                Ok(flight) => print_estimate(&flight, args),
                Err(e) => die(&e, json_mode),
            }
        }
        Commands::Analyze(args) => {
            let json_mode = args.json || args.pretty;
            let settings = args.pricing.settings();
            let query = FlightQuery {
                limit: args.limit,
                offset: args.offset,
                start_date: args.start_date.clone(),
                end_date: args.end_date.clone(),
            };
            if let Err(e) = settings.validate().and_then(|()| query.validate()) {
                die(&e, json_mode);
            }

            let client = platform_client(&cli).unwrap_or_else(|e| die(&e, json_mode));
            let session = open_session(&client, &args.credentials)
                .await
                .unwrap_or_else(|e| die(&e, json_mode));

            match ecoflight::analyze_club(&client, &session, &query, &settings).await {
                Ok(analysis) => {
                    client
                        .log_app_usage(&session, ecoflight::APP_ID, "cli-analysis")
                        .await;
                    print_analysis(&analysis, args);
                }
                Err(e) => die(&e, json_mode),
            }
        }
        Commands::Aircraft(args) => {
            let json_mode = args.json || args.pretty;
            let client = platform_client(&cli).unwrap_or_else(|e| die(&e, json_mode));
            let session = open_session(&client, &args.credentials)
                .await
                .unwrap_or_else(|e| die(&e, json_mode));
            match client.fetch_aircraft(&session).await {
                Ok(fleet) if json_mode => print_json(&fleet, args.pretty),
                Ok(fleet) if fleet.is_empty() => println!("No aircraft found for this club."),
                Ok(fleet) => println!("{}", table::render_fleet(&fleet)),
                Err(e) => die(&e, json_mode),
            }
        }
        Commands::Login(args) => {
            let client = platform_client(&cli).unwrap_or_else(|e| die(&e, args.json));
            match client.sign_in(&args.email, &args.password).await {
                Ok((token, user)) if args.json => {
                    print_json(&serde_json::json!({ "token": token, "user": user }), false)
                }
                Ok((token, _)) => println!("{token}"),
                Err(e) => die(&e, args.json),
            }
        }
        Commands::Serve(args) => {
            let settings = args.pricing.settings();
            if let Err(e) = settings.validate() {
                die(&e, false);
            }
            let client = platform_client(&cli).unwrap_or_else(|e| die(&e, false));
            let addr = server::resolve_bind(&args.host, args.port)
                .await
                .unwrap_or_else(|e| die(&e, false));

            let state = server::AppState::new(client, settings);
            let router = server::create_router(state, args.frontend_url.as_deref())
                .unwrap_or_else(|e| die(&e, false));
            if let Err(e) = server::run(addr, router).await {
                die(&e, false);
            }
        }
        Commands::Mcp(pricing) => {
            let settings = pricing.settings();
            if let Err(e) = settings.validate() {
                die(&e, false);
            }
            // Tools that only compute stay usable without platform settings.
            let client = match platform_client(&cli) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!(error = %e, "platform tools disabled");
                    None
                }
            };
            ecoflight::mcp::run(client, settings).await;
        }
    }
}
