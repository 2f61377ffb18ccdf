//! Caller identity.
//!
//! The server sits behind an authenticating proxy, which sets two headers on every request it forwards:
//! * `X-User-Id`: the id of the signed-in user. Requests without it are anonymous.
//! * `X-User-Roles`: an optional comma-separated list of roles. `admin` grants access to the admin routes.
//!
//! Handlers receive the caller as an [`AuthenticatedUser`] extractor, which rejects anonymous requests with a 401.
use std::{
    fmt::Display,
    future::{ready, Ready},
    str::FromStr,
};

use actix_web::{dev::Payload, http::header::HeaderMap, FromRequest, HttpRequest};
use log::*;
use serde::{Deserialize, Serialize};
use storefront_common::helpers::split_list;

use crate::errors::{AuthError, ServerError};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLES_HEADER: &str = "X-User-Roles";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            s => Err(format!("Unknown role: {s}")),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    /// Every identified caller has [`Role::User`]. Further roles come from the roles header.
    pub roles: Vec<Role>,
}

impl AuthenticatedUser {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())?
            .to_string();
        let mut roles = vec![Role::User];
        let declared = headers.get(USER_ROLES_HEADER).and_then(|v| v.to_str().ok()).map(split_list).unwrap_or_default();
        for name in declared {
            match name.parse::<Role>() {
                Ok(role) if !roles.contains(&role) => roles.push(role),
                Ok(_) => {},
                Err(e) => debug!("🔐️ Ignoring role for {user_id}. {e}"),
            }
        }
        Some(Self { user_id, roles })
    }

    pub fn has_roles(&self, required: &[Role]) -> bool {
        required.iter().all(|r| self.roles.contains(r))
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = Self::from_headers(req.headers()).ok_or_else(|| {
            debug!("🔐️ Request to {} carries no user id", req.path());
            ServerError::AuthenticationError(AuthError::MissingIdentity)
        });
        ready(result)
    }
}
