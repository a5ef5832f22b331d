//! Runs the client and the HTTP API against a local stand-in for the 4Fly
//! platform that answers the same REST and auth routes.

use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

use ecoflight::carbon::{CarbonSettings, SHARE_FLIGHTS};
use ecoflight::error::EcoError;
use ecoflight::fetch::{FetchOptions, PlatformClient, PlatformConfig};
use ecoflight::model::ClubScope;
use ecoflight::query::FlightQuery;
use ecoflight::server::{create_router, AppState};

const USER_ID: &str = "u-1";
const CLUB_ID: &str = "club-1";
const ANON_KEY: &str = "anon-key";
const REVOKED: &str = "revoked";

fn jwt(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": sub, "exp": 4_000_000_000i64 }).to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

fn flight_rows(count: usize) -> Value {
    let rows: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "id": format!("f-{i}"),
                "date": format!("2026-05-{:02}", 28 - i),
                "duration": 60,
                "userId": USER_ID,
                "aircraftId": "a-1",
                "fuel_added_before": null,
                "fuel_added_after": null,
                "aircraft": {
                    "id": "a-1",
                    "name": "DR400",
                    "registration": "F-GABC",
                    "type": "Avion",
                    "capacity": 4,
                    "fuel_types": { "name": "100LL", "emission_factor": 2.31 }
                },
                "users": { "first_name": "Jeanne", "last_name": "Martin" }
            })
        })
        .collect();
    Value::Array(rows)
}

#[derive(Default)]
struct Seen {
    flight_queries: Vec<String>,
    flight_api_keys: Vec<String>,
    usage: Vec<Value>,
}

#[derive(Clone)]
struct FakePlatform {
    memberships: Value,
    installations: Value,
    flights: (StatusCode, Value),
    usage_status: StatusCode,
    seen: Arc<Mutex<Seen>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            memberships: json!([{ "club_id": CLUB_ID }]),
            installations: json!([{ "id": 1 }]),
            flights: (StatusCode::OK, flight_rows(3)),
            usage_status: StatusCode::NO_CONTENT,
            seen: Arc::default(),
        }
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

async fn user(headers: HeaderMap) -> Response {
    let token = bearer(&headers);
    if token == jwt(REVOKED) || token.is_empty() {
        let body = json!({ "code": 401, "message": "invalid JWT" });
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }
    Json(json!({ "id": USER_ID, "email": "pilot@club.fr", "aud": "authenticated" })).into_response()
}

async fn password_grant(Json(body): Json<Value>) -> Response {
    if body["password"] == "secret" {
        let user = json!({ "id": USER_ID, "email": body["email"] });
        return Json(json!({ "access_token": jwt(USER_ID), "token_type": "bearer", "user": user }))
            .into_response();
    }
    let body = json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

async fn club_members(State(fake): State<FakePlatform>) -> Json<Value> {
    Json(fake.memberships)
}

async fn installations(State(fake): State<FakePlatform>) -> Json<Value> {
    Json(fake.installations)
}

async fn flights(
    State(fake): State<FakePlatform>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    {
        let mut seen = fake.seen.lock().unwrap();
        seen.flight_queries.push(query.unwrap_or_default());
        let key = headers.get("apikey").and_then(|v| v.to_str().ok()).unwrap_or_default();
        seen.flight_api_keys.push(key.to_string());
    }
    let (status, body) = fake.flights;
    (status, Json(body)).into_response()
}

async fn aircraft() -> Json<Value> {
    Json(json!([
        { "id": "a-1", "name": "DR400", "registration": "F-GABC", "type": "Avion", "capacity": 4,
          "fuel_types": { "name": "100LL", "emission_factor": 2.31 } },
        { "id": "a-2", "name": "Savannah", "registration": "F-JXYZ", "type": "ULM", "capacity": 2 }
    ]))
}

async fn log_usage(State(fake): State<FakePlatform>, Json(body): Json<Value>) -> StatusCode {
    fake.seen.lock().unwrap().usage.push(body);
    fake.usage_status
}

async fn start(fake: FakePlatform) -> PlatformClient {
    let app = Router::new()
        .route("/auth/v1/user", get(user))
        .route("/auth/v1/token", post(password_grant))
        .route("/rest/v1/club_members", get(club_members))
        .route("/rest/v1/external_app_installations", get(installations))
        .route("/rest/v1/flights", get(flights))
        .route("/rest/v1/aircraft", get(aircraft))
        .route("/rest/v1/rpc/log_app_usage", post(log_usage))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = PlatformConfig::new(&format!("http://{addr}"), ANON_KEY).unwrap();
    PlatformClient::new(config, &FetchOptions::default()).unwrap()
}

fn api(client: PlatformClient) -> Router {
    create_router(AppState::new(client, CarbonSettings::default()), None).unwrap()
}

async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn analysis_request(query: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/api/carbon-analysis{query}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn authenticate_resolves_the_active_club() {
    let client = start(FakePlatform::default()).await;
    let session = client.authenticate(&jwt(USER_ID)).await.unwrap();
    assert_eq!(
        session.scope,
        ClubScope {
            user_id: USER_ID.into(),
            club_id: CLUB_ID.into(),
        }
    );
    assert_eq!(session.user.email.as_deref(), Some("pilot@club.fr"));
}

#[tokio::test]
async fn authenticate_rejects_token_for_another_subject() {
    let client = start(FakePlatform::default()).await;
    let err = client.authenticate(&jwt("someone-else")).await.unwrap_err();
    assert!(matches!(err, EcoError::InvalidToken(_)));
}

#[tokio::test]
async fn authenticate_surfaces_platform_rejection() {
    let client = start(FakePlatform::default()).await;
    let err = client.authenticate(&jwt(REVOKED)).await.unwrap_err();
    assert!(matches!(err, EcoError::Unauthorized(ref m) if m == "invalid JWT"));
}

#[tokio::test]
async fn user_without_club_cannot_open_a_session() {
    let fake = FakePlatform {
        memberships: json!([]),
        ..Default::default()
    };
    let client = start(fake).await;
    let err = client.authenticate(&jwt(USER_ID)).await.unwrap_err();
    assert!(matches!(err, EcoError::NoClub));
}

#[tokio::test]
async fn analysis_covers_whole_page_but_lists_twenty() {
    let fake = FakePlatform {
        flights: (StatusCode::OK, flight_rows(25)),
        ..Default::default()
    };
    let seen = fake.seen.clone();
    let router = api(start(fake).await);

    let (status, json) = call(router, analysis_request("", &jwt(USER_ID))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["id"], USER_ID);
    assert_eq!(json["stats"]["total_flights"], 25);
    assert_eq!(json["flights"].as_array().unwrap().len(), 20);
    assert_eq!(json["flights"][0]["id"], "f-0");
    assert_eq!(json["flights"][0]["emission_level"]["level"], "high");
    let total = json["stats"]["total_co2"].as_f64().unwrap();
    assert!((total - 25.0 * 76.23).abs() < 1e-6);
    let recommendations = json["recommendations"].as_array().unwrap();
    assert_eq!(recommendations.len(), 4);
    assert_eq!(recommendations[3], SHARE_FLIGHTS);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.flight_queries.len(), 1);
    let query = &seen.flight_queries[0];
    assert!(query.contains(&format!("club_id=eq.{CLUB_ID}")), "{query}");
    assert!(query.contains("order=date.desc"), "{query}");
    assert!(query.contains("limit=50"), "{query}");
    assert_eq!(seen.flight_api_keys, vec![ANON_KEY.to_string()]);
    assert_eq!(seen.usage.len(), 1);
    assert_eq!(seen.usage[0]["p_app_id"], "ecoflight");
    assert_eq!(seen.usage[0]["p_club_id"], CLUB_ID);
    assert_eq!(seen.usage[0]["p_action"], "carbon-analysis");
}

#[tokio::test]
async fn analysis_forwards_paging_and_date_range() {
    let fake = FakePlatform::default();
    let seen = fake.seen.clone();
    let router = api(start(fake).await);

    let query = "?limit=10&offset=30&start_date=2026-01-01&end_date=2026-03-31";
    let (status, _) = call(router, analysis_request(query, &jwt(USER_ID))).await;
    assert_eq!(status, StatusCode::OK);

    let seen = seen.lock().unwrap();
    let query = &seen.flight_queries[0];
    assert!(query.contains("limit=10"), "{query}");
    assert!(query.contains("offset=30"), "{query}");
    assert!(query.contains("date=gte.2026-01-01"), "{query}");
    assert!(query.contains("date=lte.2026-03-31"), "{query}");
}

#[tokio::test]
async fn analysis_with_unreadable_query_is_json_error() {
    let fake = FakePlatform::default();
    let seen = fake.seen.clone();
    let router = api(start(fake).await);

    let (status, json) = call(router, analysis_request("?limit=abc", &jwt(USER_ID))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert!(seen.lock().unwrap().flight_queries.is_empty());
}

#[tokio::test]
async fn analysis_rejects_limit_out_of_range() {
    let fake = FakePlatform::default();
    let seen = fake.seen.clone();
    let router = api(start(fake).await);

    let (status, json) = call(router, analysis_request("?limit=5000", &jwt(USER_ID))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert!(seen.lock().unwrap().flight_queries.is_empty());
}

#[tokio::test]
async fn denied_flight_read_is_an_error_not_an_empty_list() {
    let fake = FakePlatform {
        flights: (StatusCode::UNAUTHORIZED, json!({ "message": "JWT expired" })),
        ..Default::default()
    };
    let client = start(fake).await;
    let session = client.authenticate(&jwt(USER_ID)).await.unwrap();

    let err = ecoflight::analyze_club(
        &client,
        &session,
        &FlightQuery::default(),
        &CarbonSettings::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EcoError::Unauthorized(ref m) if m == "JWT expired"));

    let (status, json) = call(api(client), analysis_request("", &jwt(USER_ID))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert!(json.get("flights").is_none());
}

#[tokio::test]
async fn failed_usage_logging_does_not_fail_analysis() {
    let fake = FakePlatform {
        usage_status: StatusCode::INTERNAL_SERVER_ERROR,
        ..Default::default()
    };
    let seen = fake.seen.clone();
    let router = api(start(fake).await);

    let (status, json) = call(router, analysis_request("", &jwt(USER_ID))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["stats"]["total_flights"], 3);
    assert_eq!(seen.lock().unwrap().usage.len(), 1);
}

#[tokio::test]
async fn fourfly_login_without_club_succeeds() {
    let fake = FakePlatform {
        memberships: json!([]),
        ..Default::default()
    };
    let router = api(start(fake).await);

    let body = json!({ "token": jwt(USER_ID) });
    let (status, json) = call(router, post_json("/auth/4fly-login", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["reason"], "login");
}

#[tokio::test]
async fn fourfly_login_for_club_without_membership_is_forbidden() {
    let fake = FakePlatform {
        memberships: json!([]),
        ..Default::default()
    };
    let router = api(start(fake).await);

    let body = json!({ "token": jwt(USER_ID), "club_id": CLUB_ID });
    let (status, json) = call(router, post_json("/auth/4fly-login", body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "App non installée pour ce club");
}

#[tokio::test]
async fn fourfly_login_when_app_not_installed_is_forbidden() {
    let fake = FakePlatform {
        installations: json!([]),
        ..Default::default()
    };
    let router = api(start(fake).await);

    let body = json!({ "token": jwt(USER_ID), "club_id": CLUB_ID });
    let (status, json) = call(router, post_json("/auth/4fly-login", body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "App non installée pour ce club");
}

#[tokio::test]
async fn fourfly_login_with_installed_app() {
    let router = api(start(FakePlatform::default()).await);

    let body = json!({ "token": jwt(USER_ID), "club_id": CLUB_ID, "reason": "dashboard" });
    let (status, json) = call(router, post_json("/auth/4fly-login", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["reason"], "dashboard");
}

#[tokio::test]
async fn fourfly_login_with_revoked_token() {
    let router = api(start(FakePlatform::default()).await);

    let body = json!({ "token": jwt(REVOKED) });
    let (status, json) = call(router, post_json("/auth/4fly-login", body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "JWT invalide");
}

#[tokio::test]
async fn password_login_returns_token() {
    let router = api(start(FakePlatform::default()).await);

    let body = json!({ "email": "pilot@club.fr", "password": "secret" });
    let (status, json) = call(router, post_json("/auth/login", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["token"], jwt(USER_ID));
    assert_eq!(json["user"]["id"], USER_ID);
}

#[tokio::test]
async fn password_login_with_wrong_password_is_unauthorized() {
    let router = api(start(FakePlatform::default()).await);

    let body = json!({ "email": "pilot@club.fr", "password": "nope" });
    let (status, json) = call(router, post_json("/auth/login", body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert!(json["error"]
        .as_str()
        .is_some_and(|e| e.contains("Invalid login credentials")));
}

#[tokio::test]
async fn app_installation_check() {
    let client = start(FakePlatform::default()).await;
    let session = client.authenticate(&jwt(USER_ID)).await.unwrap();
    assert!(client.is_app_installed(&session, "ecoflight").await.unwrap());

    let fake = FakePlatform {
        installations: json!([]),
        ..Default::default()
    };
    let client = start(fake).await;
    let session = client.authenticate(&jwt(USER_ID)).await.unwrap();
    assert!(!client.is_app_installed(&session, "ecoflight").await.unwrap());
}

#[tokio::test]
async fn fleet_listing() {
    let client = start(FakePlatform::default()).await;
    let session = client.authenticate(&jwt(USER_ID)).await.unwrap();
    let fleet = client.fetch_aircraft(&session).await.unwrap();
    assert_eq!(fleet.len(), 2);
    assert_eq!(fleet[0].registration, "F-GABC");
    assert_eq!(fleet[1].aircraft_type.as_deref(), Some("ULM"));
    assert_eq!(fleet[1].emission_factor, None);
}
