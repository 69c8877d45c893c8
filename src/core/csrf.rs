//! Double-submit-cookie CSRF protection.
//!
//! A random token is issued as an `HttpOnly; Secure; SameSite=Strict` cookie
//! and must be echoed in a request header on every mutating request. Both
//! values are hashed with SHA-256 and the digests compared in constant time,
//! so comparison time does not depend on where the tokens differ.

use std::fmt;

use axum::http::{header, HeaderMap, HeaderValue, Method};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::CsrfConfig;
use crate::utils::{AdmissionError, AdmissionResult};

/// Opaque token shared between the cookie and the header.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Generate `len` random bytes from the OS RNG and base64 encode them.
    pub fn generate(len: usize) -> Self {
        let mut bytes = vec![0u8; len];
        OsRng.fill_bytes(&mut bytes);
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are secrets; keep them out of logs.
impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(..)")
    }
}

/// Why a mutating request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfFailure {
    MissingCookie,
    MissingHeader,
    Mismatch,
}

impl CsrfFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCookie => "missing_cookie",
            Self::MissingHeader => "missing_header",
            Self::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for CsrfFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfVerdict {
    Valid,
    /// Safe method, no token required
    Exempt,
    Invalid(CsrfFailure),
}

impl CsrfVerdict {
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

/// A freshly issued token and the `Set-Cookie` value carrying it.
#[derive(Debug, Clone)]
pub struct IssuedCsrfToken {
    pub token: CsrfToken,
    pub set_cookie: HeaderValue,
}

/// GET, HEAD and OPTIONS never change state and skip the check.
pub fn is_mutating(method: &Method) -> bool {
    !(*method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS)
}

/// Compare two tokens through their SHA-256 digests in constant time.
pub fn tokens_match(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.as_slice().ct_eq(b.as_slice()).into()
}

/// Find a cookie by name across all `Cookie` headers.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| k.trim() == name)
        .map(|(_, v)| v.trim().trim_matches('"'))
        .filter(|v| !v.is_empty())
}

pub struct CsrfGuard {
    config: CsrfConfig,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CsrfConfig {
        &self.config
    }

    /// Validate a request. The cookie is checked before the header is read.
    pub fn validate(&self, method: &Method, headers: &HeaderMap) -> CsrfVerdict {
        if !is_mutating(method) {
            return CsrfVerdict::Exempt;
        }

        let Some(cookie) = cookie_value(headers, &self.config.cookie_name) else {
            return CsrfVerdict::Invalid(CsrfFailure::MissingCookie);
        };

        let header = headers
            .get(self.config.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let Some(header) = header else {
            return CsrfVerdict::Invalid(CsrfFailure::MissingHeader);
        };

        if tokens_match(header, cookie) {
            CsrfVerdict::Valid
        } else {
            CsrfVerdict::Invalid(CsrfFailure::Mismatch)
        }
    }

    /// Issue a new token and the cookie that carries it.
    pub fn issue(&self) -> AdmissionResult<IssuedCsrfToken> {
        let token = CsrfToken::generate(self.config.token_bytes);
        let set_cookie = self.set_cookie_header(&token)?;
        Ok(IssuedCsrfToken { token, set_cookie })
    }

    fn set_cookie_header(&self, token: &CsrfToken) -> AdmissionResult<HeaderValue> {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
            self.config.cookie_name,
            token.as_str(),
            self.config.max_age_seconds
        );
        if self.config.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).map_err(|e| AdmissionError::Internal(format!("csrf cookie: {e}")))
    }
}
