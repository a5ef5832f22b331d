use std::fmt;

#[derive(Debug)]
pub enum EcoError {
    Timeout,
    ConnectionFailed(String),
    DnsResolution(String),
    ProxyError(String),
    TlsError(String),
    RateLimited,
    Unauthorized(String),
    Forbidden(String),
    HttpStatus(u16, String),
    Decode(String),
    NoClub,
    AppNotInstalled,
    InvalidToken(String),
    MalformedFlight(String),
    InvalidDate(String),
    Validation(String),
    Config(String),
}

impl fmt::Display for EcoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(
                f,
                "request to the 4Fly platform timed out. \
                 Try increasing --timeout or check your connection"
            ),
            Self::ConnectionFailed(detail) => write!(
                f,
                "connection to the 4Fly platform failed, check your internet connection ({detail})"
            ),
            Self::DnsResolution(host) => write!(
                f,
                "DNS resolution failed for {host}, check SUPABASE_URL and your connection"
            ),
            Self::ProxyError(detail) => {
                write!(f, "proxy error, check your --proxy URL is correct ({detail})")
            }
            Self::TlsError(detail) => write!(f, "TLS/SSL error talking to the platform ({detail})"),
            Self::RateLimited => write!(
                f,
                "rate limited by the platform (HTTP 429), wait a moment before retrying"
            ),
            Self::Unauthorized(detail) => write!(f, "authentication rejected: {detail}"),
            Self::Forbidden(detail) => write!(f, "access denied by the platform: {detail}"),
            Self::HttpStatus(status, detail) if detail.is_empty() => {
                write!(f, "unexpected HTTP status {status} from the platform")
            }
            Self::HttpStatus(status, detail) => {
                write!(f, "unexpected HTTP status {status} from the platform: {detail}")
            }
            Self::Decode(detail) => write!(
                f,
                "failed to decode the platform response ({detail}). \
                 The 4Fly schema may have changed"
            ),
            Self::NoClub => write!(f, "user is not signed in or has no active club"),
            Self::AppNotInstalled => write!(f, "App non installée pour ce club"),
            Self::InvalidToken(detail) => write!(f, "invalid JWT: {detail}"),
            Self::MalformedFlight(detail) => write!(f, "malformed flight record: {detail}"),
            Self::InvalidDate(date) => write!(
                f,
                "invalid date \"{date}\", must be YYYY-MM-DD format (e.g. 2026-03-01)"
            ),
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for EcoError {}

impl EcoError {
    /// True for failures caused by the caller's credentials rather than the
    /// platform or the network.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::InvalidToken(_) | Self::NoClub
        )
    }
}

pub fn from_http_error(err: wreq::Error) -> EcoError {
    let msg = err.to_string();
    let lower = msg.to_lowercase();

    if err.is_timeout() {
        return EcoError::Timeout;
    }

    if err.is_connect() {
        if lower.contains("dns") || lower.contains("resolve") || lower.contains("getaddrinfo") {
            return EcoError::DnsResolution(msg);
        }
        return EcoError::ConnectionFailed(msg);
    }

    if lower.contains("proxy") || lower.contains("socks") {
        return EcoError::ProxyError(msg);
    }

    if lower.contains("tls") || lower.contains("ssl") || lower.contains("certificate") {
        return EcoError::TlsError(msg);
    }

    if lower.contains("builder error") && lower.contains("uri") {
        return EcoError::Config(format!("invalid platform URL ({msg})"));
    }

    EcoError::ConnectionFailed(msg)
}

/// Maps a non-success status from the platform to an error, carrying the
/// message Supabase puts in the body when there is one.
pub fn from_status(status: u16, body: &str) -> EcoError {
    let detail = platform_message(body);
    match status {
        401 => EcoError::Unauthorized(if detail.is_empty() {
            "JWT invalide".to_string()
        } else {
            detail
        }),
        403 => EcoError::Forbidden(detail),
        429 => EcoError::RateLimited,
        _ => EcoError::HttpStatus(status, detail),
    }
}

fn platform_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return String::new();
    };
    ["message", "error_description", "msg", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .unwrap_or_default()
        .to_string()
}
