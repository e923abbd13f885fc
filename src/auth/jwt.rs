//! JWT token management
//!
//! HS256 签发与校验

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};

use crate::auth::types::{JwtClaims, UserRole};
use crate::config::SecurityConfig;
use crate::error::{HubError, Result};

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    expires_in: i64,
}

impl JwtManager {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        if config.jwt_secret.is_empty() {
            return Err(HubError::config("JWT签名密钥不能为空"));
        }
        if config.jwt_expires_in <= 0 {
            return Err(HubError::config("JWT有效期必须大于0"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.jwt_issuer.as_str()]);
        validation.set_audience(&[config.jwt_audience.as_str()]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 30; // 30 seconds tolerance

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expires_in: config.jwt_expires_in,
        })
    }

    /// Generate access token
    pub fn generate_token(&self, user_id: i32, username: &str, role: UserRole) -> Result<String> {
        let claims = JwtClaims::new(
            user_id,
            username,
            role,
            self.expires_in,
            self.issuer.as_str(),
            self.audience.as_str(),
        );

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| HubError::internal_with_source("生成认证令牌失败", e))
    }

    /// Validate and parse token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        let token_data: TokenData<JwtClaims> = decode(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    HubError::auth("认证令牌已过期")
                }
                _ => HubError::auth_with_source("认证令牌无效", e),
            })?;

        let claims = token_data.claims;
        if claims.is_expired() {
            return Err(HubError::auth("认证令牌已过期"));
        }
        Ok(claims)
    }

    pub const fn expires_in(&self) -> i64 {
        self.expires_in
    }
}
