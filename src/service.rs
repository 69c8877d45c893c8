use axum::http::{HeaderMap, Method};

use crate::core::{
    ClientIdentity, CsrfGuard, CsrfVerdict, DecisionSource, IssuedCsrfToken, RateLimitDecision,
    RateLimitTier, RateLimiter,
};
use crate::error::Rejection;
use crate::utils::{log_csrf_rejection, record_csrf_rejection, AdmissionResult};

/// Admission requirements of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Rate limit tier applied to every request
    pub tier: RateLimitTier,
    /// Whether mutating requests must carry a valid CSRF token
    pub csrf: bool,
}

impl RoutePolicy {
    pub fn new(tier: RateLimitTier) -> Self {
        Self { tier, csrf: true }
    }

    pub fn without_csrf(mut self) -> Self {
        self.csrf = false;
        self
    }
}

/// The parts of a request the admission checks look at
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    pub identity: &'a ClientIdentity,
}

/// A request that passed every check
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    /// Rate limit decision whose headers belong on the response
    pub decision: RateLimitDecision,
    pub csrf: CsrfVerdict,
}

/// Chains the rate limit and CSRF checks ahead of business handlers.
///
/// The two checks share nothing except the request being admitted.
pub struct AdmissionService {
    rate_limiter: RateLimiter,
    csrf: CsrfGuard,
}

impl AdmissionService {
    /// Creates a new admission service
    ///
    /// # Arguments
    ///
    /// * `rate_limiter` - Limiter built over the configured counter store
    /// * `csrf` - Guard holding the cookie and header names
    pub fn new(rate_limiter: RateLimiter, csrf: CsrfGuard) -> Self {
        Self { rate_limiter, csrf }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn csrf_guard(&self) -> &CsrfGuard {
        &self.csrf
    }

    /// Checks the rate limit for this request under `tier`
    ///
    /// # Returns
    ///
    /// * `Ok(decision)` - The request is within quota (or admitted by fail-open)
    /// * `Err(Rejection)` - 429 when over quota, 503 when the store is down and fail-closed applies
    pub async fn check_rate_limit(
        &self,
        identity: &ClientIdentity,
        tier: RateLimitTier,
    ) -> Result<RateLimitDecision, Rejection> {
        let decision = self.rate_limiter.check_rate_limit(identity, tier).await;
        if decision.allowed {
            return Ok(decision);
        }

        let retry_after_secs = decision.retry_after_secs(self.rate_limiter.now_ms());
        Err(match decision.source {
            DecisionSource::FailClosed => Rejection::StoreUnavailable {
                decision,
                retry_after_secs,
            },
            _ => Rejection::RateLimited {
                decision,
                retry_after_secs,
            },
        })
    }

    /// Validates CSRF for this request; safe methods pass as exempt
    pub fn validate_csrf(&self, method: &Method, path: &str, headers: &HeaderMap) -> Result<CsrfVerdict, Rejection> {
        match self.csrf.validate(method, headers) {
            CsrfVerdict::Invalid(failure) => {
                log_csrf_rejection(method.as_str(), path, failure);
                record_csrf_rejection(failure);
                Err(Rejection::CsrfRejected(failure))
            }
            verdict => Ok(verdict),
        }
    }

    /// Runs the rate limit, then CSRF; the first failure ends admission
    pub async fn process_request(
        &self,
        request: RequestContext<'_>,
        policy: RoutePolicy,
    ) -> Result<Admission, Rejection> {
        let decision = self.check_rate_limit(request.identity, policy.tier).await?;

        let csrf = if policy.csrf {
            self.validate_csrf(request.method, request.path, request.headers)?
        } else {
            CsrfVerdict::Exempt
        };

        Ok(Admission { decision, csrf })
    }

    /// Issues a fresh CSRF token and its cookie
    pub fn issue_csrf_token(&self) -> AdmissionResult<IssuedCsrfToken> {
        self.csrf.issue()
    }
}
