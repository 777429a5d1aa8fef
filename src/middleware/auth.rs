// middleware/auth.rs
use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Extension,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::models::user::Claims;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

fn decode_claims(token: &str) -> Option<Claims> {
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string());
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
        .map(|data| data.claims)
        .ok()
}

/// Verifies the bearer token issued by the identity service and stashes the
/// caller's claims in request extensions for the handlers.
pub async fn auth_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = bearer_token(&headers)
        .and_then(decode_claims)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Gate for staff-only routes; expects auth_middleware to have run first.
pub async fn staff_middleware(
    Extension(claims): Extension<Claims>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if !claims.is_staff() {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(request).await)
}
