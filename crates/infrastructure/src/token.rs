//! HS256 JWT 令牌编解码
//!
//! 令牌只携带邮箱、jti 和签发时间，不带过期时间。

use application::{TokenClaims, TokenCodec, TokenError};
use domain::UserEmail;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

#[derive(Clone)]
pub struct JwtTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenCodec for JwtTokenCodec {
    fn issue(&self, email: &UserEmail) -> Result<String, TokenError> {
        let claims = TokenClaims {
            email: email.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: chrono::Utc::now().timestamp(),
        };

        tracing::debug!(user = %email, jti = %claims.jti, "generating token");

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| TokenError::Malformed(err.to_string()))
    }
}
