use std::fmt;
use std::str::FromStr;

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Developer,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Developer => "developer",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "developer" => Ok(Role::Developer),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("unknown role '{}' (expected admin, developer or viewer)", other)),
        }
    }
}

/// The identity a bearer token acts as.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn require(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "role '{}' may not perform this action",
                self.role
            )))
        }
    }
}

/// Extracts the caller from an `Authorization: Bearer <token>` header.
pub struct AuthUser(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        state
            .settings
            .tokens
            .iter()
            .find(|t| t.token == token)
            .map(|t| AuthUser(t.principal.clone()))
            .ok_or_else(|| {
                tracing::warn!("Rejected request with unknown bearer token");
                ApiError::Unauthorized("invalid bearer token".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" viewer ".parse::<Role>().unwrap(), Role::Viewer);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn principal_role_gate() {
        let dev = Principal { user_id: "d".into(), role: Role::Developer };
        assert!(dev.require(&[Role::Admin, Role::Developer]).is_ok());
        assert!(matches!(dev.require(&[Role::Admin]), Err(ApiError::Forbidden(_))));
    }
}
