use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::Error};

/// Decodes an access token. Refresh tokens are rejected; they are only good for minting
/// new access tokens at the identity provider.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e: Error| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("Access token required".to_string());
    }
    Ok(claims)
}
