use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use wreq::{Client, RequestBuilder};

use crate::error::{self, EcoError};
use crate::model::{AircraftDescriptor, ClubScope, FlightRecord, PlatformUser};
use crate::parse;
use crate::query::{FlightQuery, AIRCRAFT_SELECT};
use crate::session::{self, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub url: String,
    pub anon_key: String,
}

impl PlatformConfig {
    pub fn new(url: &str, anon_key: &str) -> Result<Self, EcoError> {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(EcoError::Config("SUPABASE_URL is missing".into()));
        }
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(EcoError::Config(format!(
                "SUPABASE_URL must start with http:// or https://, got \"{url}\""
            )));
        }
        let anon_key = anon_key.trim();
        if anon_key.is_empty() {
            return Err(EcoError::Config("SUPABASE_ANON_KEY is missing".into()));
        }
        Ok(Self {
            url: url.to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.url)
    }

    fn auth(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.url)
    }
}

#[derive(Clone)]
pub struct FetchOptions {
    pub proxy: Option<String>,
    pub timeout: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: 30,
        }
    }
}

/// Handle to the 4Fly platform. Holds no user state; every call that needs
/// permissions takes the caller's [`Session`].
#[derive(Clone)]
pub struct PlatformClient {
    http: Client,
    config: Arc<PlatformConfig>,
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

impl PlatformClient {
    pub fn new(config: PlatformConfig, options: &FetchOptions) -> Result<Self, EcoError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(options.timeout));

        if let Some(ref proxy) = options.proxy {
            builder = builder.proxy(wreq::Proxy::all(proxy).map_err(error::from_http_error)?);
        }

        let http = builder.build().map_err(error::from_http_error)?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    fn authorize(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let bearer = token.unwrap_or(&self.config.anon_key);
        request
            .header("apikey", self.config.anon_key.as_str())
            .header("Authorization", format!("Bearer {bearer}"))
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, EcoError> {
        let response = request.send().await.map_err(error::from_http_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(error::from_http_error)?;
        if status >= 400 {
            return Err(error::from_status(status, &body));
        }
        Ok(body)
    }

    async fn get_rows(
        &self,
        table: &str,
        params: &[(String, String)],
        token: &str,
    ) -> Result<String, EcoError> {
        let request = self
            .http
            .get(self.config.rest(table))
            .query(params)
            .header("Accept", "application/json");
        self.send(self.authorize(request, Some(token))).await
    }

    async fn post_json(&self, url: String, body: &Value, token: Option<&str>) -> Result<String, EcoError> {
        let request = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string());
        self.send(self.authorize(request, token)).await
    }

    /// Email/password sign-in. Returns the access token and the user.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(String, PlatformUser), EcoError> {
        let body = json!({ "email": email, "password": password });
        let url = format!("{}?grant_type=password", self.config.auth("token"));
        let response = self.post_json(url, &body, None).await?;
        let (token, user) = parse::parse_sign_in(&response)?;
        info!(user = user.email.as_deref().unwrap_or(&user.id), "sign-in succeeded");
        Ok((token, user))
    }

    pub async fn get_user(&self, token: &str) -> Result<PlatformUser, EcoError> {
        let request = self.http.get(self.config.auth("user"));
        let body = self.send(self.authorize(request, Some(token))).await?;
        parse::parse_user(&body)
    }

    async fn load_club(&self, token: &str, user_id: &str) -> Result<String, EcoError> {
        let params = [
            ("select".to_string(), "club_id".to_string()),
            ("user_id".to_string(), format!("eq.{user_id}")),
            ("is_active".to_string(), "eq.true".to_string()),
        ];
        let body = self.get_rows("club_members", &params, token).await?;
        parse::parse_club_membership(&body)
    }

    /// Validates a user JWT and resolves the user's active club.
    pub async fn authenticate(&self, token: &str) -> Result<Session, EcoError> {
        let claims = session::check_token(token)?;
        let user = self.get_user(token).await?;
        if claims.sub.as_deref().is_some_and(|sub| sub != user.id) {
            return Err(EcoError::InvalidToken(
                "token subject does not match the platform user".into(),
            ));
        }
        let club_id = self.load_club(token, &user.id).await?;
        info!(
            user = user.email.as_deref().unwrap_or(&user.id),
            club = %club_id,
            token = %session::preview(token),
            "authenticated"
        );
        Ok(Session {
            token: token.to_string(),
            scope: ClubScope {
                user_id: user.id.clone(),
                club_id,
            },
            user,
        })
    }

    pub async fn is_app_installed(&self, session: &Session, app_id: &str) -> Result<bool, EcoError> {
        let params = [
            ("select".to_string(), "id".to_string()),
            ("app_id".to_string(), format!("eq.{app_id}")),
            ("club_id".to_string(), format!("eq.{}", session.scope.club_id)),
            ("is_active".to_string(), "eq.true".to_string()),
        ];
        let body = self
            .get_rows("external_app_installations", &params, &session.token)
            .await?;
        Ok(parse::parse_row_count(&body)? > 0)
    }

    /// Records an app usage event. Failures are logged and otherwise ignored.
    pub async fn log_app_usage(&self, session: &Session, app_id: &str, action: &str) {
        let body = json!({
            "p_app_id": app_id,
            "p_club_id": session.scope.club_id,
            "p_action": action,
        });
        let url = self.config.rest("rpc/log_app_usage");
        if let Err(e) = self.post_json(url, &body, Some(&session.token)).await {
            warn!(error = %e, app = app_id, action, "failed to log app usage");
        }
    }

    pub async fn fetch_flights(
        &self,
        session: &Session,
        query: &FlightQuery,
    ) -> Result<Vec<FlightRecord>, EcoError> {
        query.validate()?;
        let params = query.to_url_params(&session.scope);
        let body = self.get_rows("flights", &params, &session.token).await?;
        let flights = parse::parse_flights(&body)?;
        debug!(
            club = %session.scope.club_id,
            count = flights.len(),
            offset = query.offset,
            limit = query.limit,
            "fetched flights"
        );
        Ok(flights)
    }

    pub async fn fetch_aircraft(&self, session: &Session) -> Result<Vec<AircraftDescriptor>, EcoError> {
        let params = [
            ("select".to_string(), AIRCRAFT_SELECT.to_string()),
            ("club_id".to_string(), format!("eq.{}", session.scope.club_id)),
        ];
        let body = self.get_rows("aircraft", &params, &session.token).await?;
        parse::parse_aircraft_list(&body)
    }
}
