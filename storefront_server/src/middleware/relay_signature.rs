//! Authenticates deliveries from the SMS relay agent.
//!
//! The relay agent on the merchant's phone signs every message it forwards. It computes the HMAC-SHA256 of
//! `"{timestamp}.{body}"`, keyed with `SPS_SMS_HMAC_SECRET`, and sends
//!
//! ```text
//! X-Relay-Signature: t=1714563000,v1=<base64 signature>
//! ```
//!
//! where `t` is the unix time at which the message was signed. A delivery is refused when
//! * the header is missing or malformed,
//! * `t` is further than the configured tolerance from the server's clock,
//! * the signature does not match, or
//! * the same signature has already been accepted within the tolerance window.
//!
//! Only deliveries that the handler answered successfully are remembered, so a relay that retries after a server
//! error is not locked out. Disabling the checks lets every request through.

use std::{
    collections::HashMap,
    fmt::Display,
    future::{ready, Ready},
    rc::Rc,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    web,
};
use chrono::Utc;
use futures::future::LocalBoxFuture;
use log::{debug, trace, warn};
use storefront_common::Secret;
use thiserror::Error;

use crate::{
    config::SmsRelayConfig,
    errors::ServerError,
    helpers::{calculate_hmac, verify_hmac},
};

pub const RELAY_SIGNATURE_HEADER: &str = "X-Relay-Signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RelayRejection {
    #[error("Relay signing is not configured on this server.")]
    NotConfigured,
    #[error("No relay signature found.")]
    MissingSignature,
    #[error("Malformed relay signature. Expected t=<unix time>,v1=<signature>.")]
    MalformedSignature,
    #[error("The relay signature has expired.")]
    Stale,
    #[error("Invalid relay signature.")]
    InvalidSignature,
    #[error("This relay delivery has already been processed.")]
    Replayed,
    #[error("Could not read the relay payload.")]
    UnreadableBody,
}

/// The parsed contents of the [`RELAY_SIGNATURE_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySignature {
    pub timestamp: i64,
    pub signature: String,
}

impl RelaySignature {
    /// Signs `body` as the relay agent does.
    pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Self {
        let signature = calculate_hmac(secret, &signed_payload(timestamp, body));
        Self { timestamp, signature }
    }

    pub fn verify(&self, secret: &str, body: &[u8]) -> bool {
        verify_hmac(secret, &signed_payload(self.timestamp, body), &self.signature)
    }

    /// Whether the signing time is within `tolerance` of `now`, in either direction.
    pub fn is_fresh(&self, now: i64, tolerance: Duration) -> bool {
        self.timestamp.abs_diff(now) <= tolerance.as_secs()
    }
}

fn signed_payload(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let prefix = format!("{timestamp}.");
    let mut payload = Vec::with_capacity(prefix.len() + body.len());
    payload.extend_from_slice(prefix.as_bytes());
    payload.extend_from_slice(body);
    payload
}

impl FromStr for RelaySignature {
    type Err = RelayRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut timestamp = None;
        let mut signature = None;
        for part in s.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
                // base64 padding contains '=', so only the first one separates the key
                Some(("v1", v)) if !v.is_empty() => signature = Some(v.to_string()),
                _ => {},
            }
        }
        match (timestamp, signature) {
            (Some(timestamp), Some(signature)) => Ok(Self { timestamp, signature }),
            _ => Err(RelayRejection::MalformedSignature),
        }
    }
}

impl Display for RelaySignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={},v1={}", self.timestamp, self.signature)
    }
}

/// Signatures accepted within the tolerance window. Shared by every worker.
#[derive(Debug, Clone, Default)]
pub struct ReplayGuard {
    seen: Arc<Mutex<HashMap<String, i64>>>,
}

impl ReplayGuard {
    pub fn has_seen(&self, signature: &RelaySignature) -> bool {
        self.seen.lock().map(|seen| seen.contains_key(&signature.signature)).unwrap_or(false)
    }

    /// Records an accepted signature, and forgets those signed before `oldest`.
    pub fn remember(&self, signature: &RelaySignature, oldest: i64) {
        match self.seen.lock() {
            Ok(mut seen) => {
                seen.retain(|_, t| *t >= oldest);
                seen.insert(signature.signature.clone(), signature.timestamp);
            },
            Err(e) => warn!("🔐️ Relay replay cache is unavailable. {e}"),
        }
    }
}

pub struct RelaySignatureMiddlewareFactory {
    secret: Secret<String>,
    enabled: bool,
    tolerance: Duration,
    guard: ReplayGuard,
}

impl RelaySignatureMiddlewareFactory {
    pub fn new(config: &SmsRelayConfig, guard: ReplayGuard) -> Self {
        Self {
            secret: config.hmac_secret.clone(),
            enabled: config.hmac_checks,
            tolerance: config.signature_tolerance,
            guard,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RelaySignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = actix_web::Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = RelaySignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RelaySignatureMiddlewareService {
            secret: self.secret.clone(),
            enabled: self.enabled,
            tolerance: self.tolerance,
            guard: self.guard.clone(),
            service: Rc::new(service),
        }))
    }
}

pub struct RelaySignatureMiddlewareService<S> {
    secret: Secret<String>,
    enabled: bool,
    tolerance: Duration,
    guard: ReplayGuard,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RelaySignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.secret.reveal().clone();
        let enabled = self.enabled;
        let tolerance = self.tolerance;
        let guard = self.guard.clone();
        Box::pin(async move {
            if !enabled {
                trace!("🔐️ Relay signature checks are disabled. Letting {} through", req.path());
                return service.call(req).await;
            }
            let reject = |reason: RelayRejection, path: &str| {
                warn!("🔐️ Refusing relay delivery to {path}. {reason}");
                actix_web::Error::from(ServerError::RelayRejected(reason))
            };
            if secret.is_empty() {
                return Err(reject(RelayRejection::NotConfigured, req.path()));
            }
            let signature = match req.headers().get(RELAY_SIGNATURE_HEADER).map(|h| h.to_str()) {
                None => return Err(reject(RelayRejection::MissingSignature, req.path())),
                Some(Err(_)) => return Err(reject(RelayRejection::MalformedSignature, req.path())),
                Some(Ok(h)) => h.parse::<RelaySignature>().map_err(|r| reject(r, req.path()))?,
            };
            let now = Utc::now().timestamp();
            if !signature.is_fresh(now, tolerance) {
                debug!("🔐️ Relay signature made at {} is more than {tolerance:?} from {now}", signature.timestamp);
                return Err(reject(RelayRejection::Stale, req.path()));
            }
            let body = req.extract::<web::Bytes>().await.map_err(|e| {
                debug!("🔐️ Could not read relay body. {e}");
                reject(RelayRejection::UnreadableBody, req.path())
            })?;
            if !signature.verify(&secret, &body) {
                return Err(reject(RelayRejection::InvalidSignature, req.path()));
            }
            if guard.has_seen(&signature) {
                return Err(reject(RelayRejection::Replayed, req.path()));
            }
            trace!("🔐️ Relay delivery to {} is authentic", req.path());
            req.set_payload(restore_payload(body));
            let res = service.call(req).await?;
            if res.status().is_success() {
                let oldest = now.saturating_sub(i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX));
                guard.remember(&signature, oldest);
            }
            Ok(res)
        })
    }
}

/// The body has been consumed to check the signature, so it is put back for the handler.
fn restore_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
