use crate::error::AppResult;
use crate::models::Claims;
use jsonwebtoken::{decode, DecodingKey, Validation};

/// Verify an HS256 token signed with `secret` and return its claims
pub fn verify_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
pub fn create_jwt(subject: &str, secret: &str, expires_in: chrono::Duration) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        exp: Some((now + expires_in).timestamp()),
        iat: Some(now.timestamp()),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
