use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Student,
    Partner,
    Admin,
}

/// Bearer token claims. Tokens are minted by the identity service; the engine only verifies them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Set for partner accounts.
    #[serde(default)]
    pub company_id: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn encode(&self, secret: &str) -> Result<String, AppError> {
        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| AppError::Anyhow(anyhow::anyhow!("Token encoding failed: {}", e)))
    }

    pub fn require(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::AuthorizationError(format!("{:?} accounts cannot do this", self.role)))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Company a partner acts for. Admins may name one explicitly.
    pub fn company_scope(&self, requested: Option<&str>) -> Result<String, AppError> {
        match (self.role, self.company_id.as_deref(), requested) {
            (Role::Admin, _, Some(company)) => Ok(company.to_string()),
            (Role::Admin, Some(own), None) => Ok(own.to_string()),
            (Role::Partner, Some(own), Some(company)) if own != company => Err(
                AppError::AuthorizationError(format!("not a member of company {}", company)),
            ),
            (Role::Partner, Some(own), _) => Ok(own.to_string()),
            (Role::Partner, None, _) => Err(AppError::AuthorizationError(
                "partner token carries no company".to_string(),
            )),
            (Role::Admin, None, None) => Err(AppError::ValidationError("company_id is required".to_string())),
            (Role::Student, _, _) => Err(AppError::AuthorizationError(
                "Student accounts cannot do this".to_string(),
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::AuthenticationError(err.to_string())
    }
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())?;
    Ok(data.claims)
}

/// Verifies the bearer token and stores its `Claims` in the request extensions.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let claims = match req.headers().typed_get::<Authorization<Bearer>>() {
        Some(Authorization(bearer)) => decode_token(bearer.token(), &state.auth.secret),
        None => Err(AuthError::MissingToken),
    };

    match claims {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected request");
            AppError::from(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, company_id: Option<&str>) -> Claims {
        Claims {
            sub: "user-1".to_string(),
            email: "ada@uni.edu.ng".to_string(),
            role,
            company_id: company_id.map(str::to_string),
            exp: (chrono::Utc::now().timestamp() + 600) as usize,
        }
    }

    #[test]
    fn test_token_roundtrip_and_wrong_secret() {
        let token = claims(Role::Partner, Some("cmp-1")).encode("secret").unwrap();

        let decoded = decode_token(&token, "secret").unwrap();
        assert_eq!(decoded.role, Role::Partner);
        assert_eq!(decoded.company_id.as_deref(), Some("cmp-1"));

        assert!(matches!(decode_token(&token, "other"), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_company_scope() {
        let partner = claims(Role::Partner, Some("cmp-1"));
        assert_eq!(partner.company_scope(None).unwrap(), "cmp-1");
        assert!(partner.company_scope(Some("cmp-2")).is_err());

        let admin = claims(Role::Admin, None);
        assert_eq!(admin.company_scope(Some("cmp-2")).unwrap(), "cmp-2");
        assert!(admin.company_scope(None).is_err());

        assert!(claims(Role::Student, None).company_scope(None).is_err());
    }
}
