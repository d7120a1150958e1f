//! Double-submit CSRF protection.
//!
//! Safe requests get a fresh (or renewed) token in the `X-CSRF-Token`
//! response header together with a cookie binding that token to the
//! server key. State-changing requests must echo the token in the header
//! and present the cookie; the cookie's MAC proves the token was issued
//! here.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::RngCore;
use tracing::{debug, warn};

use crate::config::{CsrfConfig, CSRF_KEY_LEN};
use crate::error::{ServerError, ServerResult};

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_COOKIE: &str = "bkt_csrf";

const TOKEN_LEN: usize = 32;

pub struct CsrfGuard {
    key: [u8; CSRF_KEY_LEN],
    secure: bool,
}

impl CsrfGuard {
    pub fn new(key: [u8; CSRF_KEY_LEN], secure: bool) -> Self {
        Self { key, secure }
    }

    pub fn from_config(config: &CsrfConfig) -> ServerResult<Self> {
        config.validate()?;
        Ok(Self::new(config.key_bytes()?, config.secure))
    }

    fn mac(&self, token: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(&self.key, token)
    }

    /// A new random token, hex encoded.
    pub fn issue(&self) -> String {
        let mut token = [0u8; TOKEN_LEN];
        rand::thread_rng().fill_bytes(&mut token);
        hex::encode(token)
    }

    /// Cookie value for `token`: `<token>.<mac>`.
    pub fn seal(&self, token: &str) -> String {
        format!("{token}.{}", self.mac(token.as_bytes()).to_hex())
    }

    /// The token inside `cookie` if its MAC checks out.
    pub fn open<'c>(&self, cookie: &'c str) -> Option<&'c str> {
        let (token, mac) = cookie.split_once('.')?;
        let mac: [u8; 32] = hex::decode(mac).ok()?.try_into().ok()?;
        // blake3::Hash equality is constant time.
        (self.mac(token.as_bytes()) == blake3::Hash::from(mac)).then_some(token)
    }

    /// `true` if the sealed cookie is genuine and `header` carries its token.
    pub fn verify(&self, cookie: &str, header: &str) -> bool {
        self.open(cookie)
            .is_some_and(|token| self.mac(token.as_bytes()) == self.mac(header.as_bytes()))
    }

    fn cookie_header(&self, sealed: &str) -> String {
        let mut cookie = format!("{CSRF_COOKIE}={sealed}; Path=/; HttpOnly; SameSite=Strict");
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Value of the `bkt_csrf` cookie, searching every `Cookie` header.
fn request_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == CSRF_COOKIE)
        .map(|(_, value)| value)
}

pub async fn csrf_middleware(
    State(guard): State<Arc<CsrfGuard>>,
    request: Request,
    next: Next,
) -> Response {
    let cookie = request_cookie(request.headers()).map(str::to_owned);

    if !is_safe(request.method()) {
        let header = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok());
        let accepted = match (cookie.as_deref(), header) {
            (Some(cookie), Some(header)) => guard.verify(cookie, header),
            _ => false,
        };
        if !accepted {
            debug!(method = %request.method(), path = request.uri().path(), "CSRF check failed");
            return ServerError::CsrfRejected.into_response();
        }
        return next.run(request).await;
    }

    let token = cookie
        .as_deref()
        .and_then(|c| guard.open(c))
        .map(str::to_owned)
        .unwrap_or_else(|| guard.issue());
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    match (
        HeaderValue::from_str(&token),
        HeaderValue::from_str(&guard.cookie_header(&guard.seal(&token))),
    ) {
        (Ok(token), Ok(cookie)) => {
            headers.insert(CSRF_HEADER, token);
            headers.append(SET_COOKIE, cookie);
        }
        _ => warn!("CSRF token not representable as a header"),
    }
    response
}
