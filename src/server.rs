//! JSON HTTP API.
//!
//! Every request authenticates on its own: the bearer token is turned into a
//! [`Session`] for the duration of the handler and nothing about the user is
//! kept in [`AppState`].

use std::net::SocketAddr;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::carbon::CarbonSettings;
use crate::error::EcoError;
use crate::fetch::PlatformClient;
use crate::query::{FlightQuery, DEFAULT_LIMIT};
use crate::session::{self, Session};

const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:5173", "https://app.4fly.io"];

#[derive(Clone)]
pub struct AppState {
    pub client: PlatformClient,
    pub settings: CarbonSettings,
}

impl AppState {
    pub fn new(client: PlatformClient, settings: CarbonSettings) -> Self {
        Self { client, settings }
    }
}

/// Error response: `{"success": false, "error": "..."}` with a matching status.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

fn status_for(err: &EcoError) -> StatusCode {
    match err {
        EcoError::Unauthorized(_) | EcoError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        EcoError::Forbidden(_) | EcoError::NoClub | EcoError::AppNotInstalled => {
            StatusCode::FORBIDDEN
        }
        EcoError::InvalidDate(_) | EcoError::Validation(_) => StatusCode::BAD_REQUEST,
        EcoError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        EcoError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        EcoError::ConnectionFailed(_)
        | EcoError::DnsResolution(_)
        | EcoError::ProxyError(_)
        | EcoError::TlsError(_)
        | EcoError::HttpStatus(..)
        | EcoError::Decode(_)
        | EcoError::MalformedFlight(_) => StatusCode::BAD_GATEWAY,
        EcoError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EcoError> for AppError {
    fn from(err: EcoError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(error = %err, "request failed");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

fn cors_layer(frontend_url: Option<&str>) -> Result<CorsLayer, EcoError> {
    let mut origins = Vec::new();
    for origin in DEFAULT_ORIGINS.iter().copied().chain(frontend_url) {
        let value = HeaderValue::from_str(origin.trim_end_matches('/'))
            .map_err(|_| EcoError::Config(format!("invalid CORS origin \"{origin}\"")))?;
        origins.push(value);
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true))
}

pub fn create_router(state: AppState, frontend_url: Option<&str>) -> Result<Router, EcoError> {
    Ok(Router::new()
        .route("/health", get(health))
        .route("/auth/4fly-login", post(fourfly_login))
        .route("/auth/login", post(login))
        .route("/api/carbon-analysis", get(carbon_analysis))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(frontend_url)?)
        .with_state(state))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": crate::APP_ID,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct FourFlyLogin {
    token: Option<String>,
    club_id: Option<String>,
    reason: Option<String>,
}

/// Receives the JWT a 4Fly frontend hands over after its own sign-in.
async fn fourfly_login(
    State(state): State<AppState>,
    body: Result<Json<FourFlyLogin>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    // A missing or unreadable body counts as an empty one.
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let token = body
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "token requis"))?;
    let reason = body.reason.unwrap_or_else(|| "login".to_string());

    info!(
        reason = %reason,
        club = body.club_id.as_deref().unwrap_or("N/A"),
        token = %session::preview(token),
        "token received"
    );

    let wants_club = body.club_id.is_some();
    match state.client.authenticate(token).await {
        Ok(session) => {
            if wants_club && !state.client.is_app_installed(&session, crate::APP_ID).await? {
                return Err(AppError::from(EcoError::AppNotInstalled));
            }
        }
        // The token is valid but the user belongs to no club, so nothing can
        // have the app installed.
        Err(EcoError::NoClub) if wants_club => {
            return Err(AppError::from(EcoError::AppNotInstalled));
        }
        Err(EcoError::NoClub) => {}
        Err(e) if e.is_auth() => {
            return Err(AppError::new(StatusCode::UNAUTHORIZED, "JWT invalide"));
        }
        Err(e) => return Err(AppError::from(e)),
    }

    Ok(Json(json!({ "success": true, "reason": reason })))
}

#[derive(Debug, Default, Deserialize)]
struct PasswordLogin {
    email: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<PasswordLogin>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let (Some(email), Some(password)) = (
        body.email.filter(|e| !e.trim().is_empty()),
        body.password.filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Email et mot de passe requis",
        ));
    };

    match state.client.sign_in(email.trim(), &password).await {
        Ok((token, user)) => Ok(Json(json!({ "success": true, "token": token, "user": user }))),
        Err(e) => {
            warn!(error = %e, "sign-in failed");
            // The platform answers bad credentials with 400 invalid_grant.
            let status = match e {
                EcoError::HttpStatus(400, _) => StatusCode::UNAUTHORIZED,
                ref other => status_for(other),
            };
            Err(AppError::new(status, e.to_string()))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisParams {
    limit: Option<usize>,
    offset: Option<usize>,
    start_date: Option<String>,
    end_date: Option<String>,
}

impl From<AnalysisParams> for FlightQuery {
    fn from(p: AnalysisParams) -> Self {
        Self {
            limit: p.limit.unwrap_or(DEFAULT_LIMIT),
            offset: p.offset.unwrap_or(0),
            start_date: p.start_date.filter(|d| !d.is_empty()),
            end_date: p.end_date.filter(|d| !d.is_empty()),
        }
    }
}

async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<Session, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(session::bearer_token)
        .ok_or_else(|| {
            AppError::new(StatusCode::UNAUTHORIZED, "Token d'authentification requis")
        })?;

    state.client.authenticate(token).await.map_err(|e| {
        if e.is_auth() {
            AppError::new(StatusCode::UNAUTHORIZED, "Token invalide")
        } else {
            AppError::from(e)
        }
    })
}

async fn carbon_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<AnalysisParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = require_session(&state, &headers).await?;
    let Query(params) =
        params.map_err(|e| AppError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let query = FlightQuery::from(params);

    let analysis = crate::analyze_club(&state.client, &session, &query, &state.settings).await?;
    state
        .client
        .log_app_usage(&session, crate::APP_ID, "carbon-analysis")
        .await;

    Ok(Json(json!({
        "success": true,
        "user": session.user,
        "stats": analysis.stats,
        "flights": analysis.flights,
        "recommendations": analysis.recommendations,
    })))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    warn!("shutdown signal received, stopping");
}

/// Resolves a bind host, either an IP literal or a name such as `localhost`.
pub async fn resolve_bind(host: &str, port: u16) -> Result<SocketAddr, EcoError> {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| EcoError::Config(format!("cannot resolve bind address {host}: {e}")))?
        .next()
        .ok_or_else(|| EcoError::Config(format!("no address found for {host}")))
}

pub async fn run(addr: SocketAddr, router: Router) -> Result<(), EcoError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| EcoError::Config(format!("cannot bind {addr}: {e}")))?;
    info!("EcoFlight listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| EcoError::Config(format!("server error: {e}")))
}
