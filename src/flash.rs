//! One-shot flash messages carried on a short-lived cookie.
//!
//! The payload is hex-encoded; raw message characters are invalid in cookie
//! values per RFC 6265.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::state::AppState;

const FLASH_COOKIE: &str = "studyabroad_flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    /// "success" or "error"
    pub kind: String,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Flash {
            kind: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Flash {
            kind: "error".to_string(),
            message: message.into(),
        }
    }

    fn encode(&self) -> String {
        hex::encode(format!("{}|{}", self.kind, self.message))
    }

    fn decode(value: &str) -> Option<Flash> {
        let bytes = hex::decode(value).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        let (kind, message) = text.split_once('|')?;
        Some(Flash {
            kind: kind.to_string(),
            message: message.to_string(),
        })
    }
}

fn flash_cookie(flash: &Flash) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age=60",
        FLASH_COOKIE,
        flash.encode()
    )
}

fn clear_flash_cookie() -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", FLASH_COOKIE)
}

/// 303 redirect carrying a flash message for the next page load.
pub fn redirect(location: &str, flash: Flash) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, location.to_string()),
            (header::SET_COOKIE, flash_cookie(&flash)),
        ],
        "",
    )
        .into_response()
}

/// Plain 303 redirect.
pub fn see_other(location: &str) -> Response {
    (
        StatusCode::SEE_OTHER,
        [(header::LOCATION, location.to_string())],
        "",
    )
        .into_response()
}

/// Attach the clear-cookie header so a displayed flash is not shown twice.
pub fn consume(response: Response) -> Response {
    let mut response = response;
    if let Ok(value) = clear_flash_cookie().parse() {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

/// Extractor for the pending flash message, if any.
pub struct IncomingFlash(pub Option<Flash>);

impl FromRequestParts<AppState> for IncomingFlash {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let flash = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|s| s.split(';'))
            .map(|s| s.trim())
            .find_map(|cookie| {
                let mut split = cookie.splitn(2, '=');
                let key = split.next()?.trim();
                let val = split.next()?.trim();
                if key == FLASH_COOKIE {
                    Flash::decode(val)
                } else {
                    None
                }
            });
        Ok(IncomingFlash(flash))
    }
}
