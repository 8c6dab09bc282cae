use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
    reset_audience: String,
    reset_expiry: Duration,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
            reset_audience: config.reset_token_audience.clone(),
            reset_expiry: Duration::minutes(config.reset_token_expiry_minutes),
        })
    }

    pub fn generate_token(&self, user_id: Uuid, email: &str, user_type: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user_id,
            email: email.to_owned(),
            user_type: user_type.to_owned(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Short-lived single-purpose token mailed out for password resets. A
    /// separate audience keeps it unusable as an access token.
    pub fn generate_reset_token(&self, user_id: Uuid, email: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.reset_expiry;
        let claims = ResetClaims {
            user_id,
            email: email.to_owned(),
            iss: self.issuer.clone(),
            aud: self.reset_audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_reset_token(&self, token: &str) -> Result<ResetClaims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.reset_audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<ResetClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub user_type: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    pub user_id: Uuid,
    pub email: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService {
            encoding: EncodingKey::from_secret(b"test-secret"),
            decoding: DecodingKey::from_secret(b"test-secret"),
            issuer: "attesta".to_string(),
            audience: "attesta-clients".to_string(),
            expiry: Duration::minutes(60),
            reset_audience: "attesta-reset".to_string(),
            reset_expiry: Duration::minutes(15),
        }
    }

    #[test]
    fn access_token_round_trips() {
        let jwt = service();
        let user_id = Uuid::new_v4();
        let token = jwt.generate_token(user_id, "a@b.se", "standard").unwrap();
        let claims = jwt.verify_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@b.se");
        assert_eq!(claims.user_type, "standard");
    }

    #[test]
    fn reset_token_is_not_an_access_token() {
        let jwt = service();
        let reset = jwt.generate_reset_token(Uuid::new_v4(), "a@b.se").unwrap();
        assert!(jwt.verify_token(&reset).is_err());
        assert!(jwt.verify_reset_token(&reset).is_ok());
    }

    #[test]
    fn access_token_is_not_a_reset_token() {
        let jwt = service();
        let token = jwt
            .generate_token(Uuid::new_v4(), "a@b.se", "standard")
            .unwrap();
        assert!(jwt.verify_reset_token(&token).is_err());
    }
}
