//! Browser session carried in a signed cookie.
//!
//! The whole session lives client-side as an HS256 JWT keyed by the auth
//! server's secret. A cookie that fails verification reads as an empty
//! session.

use crate::{error::Result, model::AgentConfig};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const SESSION_COOKIE: &str = "session";
const SESSION_LIFETIME_DAYS: i64 = 31;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentConfig>,
}

impl SessionData {
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() && self.agent_id.is_some() && self.username.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    data: SessionData,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn encode(&self, data: &SessionData) -> Result<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            data: data.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::days(SESSION_LIFETIME_DAYS)).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    pub fn decode(&self, token: &str) -> Option<SessionData> {
        match decode::<SessionClaims>(token, &self.decoding_key, &self.validation) {
            Ok(token_data) => Some(token_data.claims.data),
            Err(e) => {
                tracing::debug!("discarding unverifiable session cookie: {}", e);
                None
            }
        }
    }

    pub fn read(&self, jar: &CookieJar) -> SessionData {
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| self.decode(cookie.value()))
            .unwrap_or_default()
    }

    pub fn write(&self, jar: CookieJar, data: &SessionData) -> Result<CookieJar> {
        let token = self.encode(data)?;
        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        Ok(jar.add(cookie))
    }

    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        clear_session_cookie(jar)
    }
}

// Removal cookie for `session`, usable by any server on the same host.
pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionData {
        SessionData {
            email: Some("bugsbunny@gmail.com".to_string()),
            username: Some("shopper".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_encode_decode() {
        let codec = SessionCodec::new("secret");
        let token = codec.encode(&sample()).unwrap();
        assert_eq!(codec.decode(&token), Some(sample()));
    }

    #[test]
    fn test_foreign_secret_is_rejected() {
        let token = SessionCodec::new("secret").encode(&sample()).unwrap();
        assert!(SessionCodec::new("other-secret").decode(&token).is_none());
        assert!(SessionCodec::new("secret").decode("not-a-token").is_none());
    }

    #[test]
    fn test_authenticated_requires_all_ids() {
        let mut data = sample();
        assert!(!data.is_authenticated());
        data.user_id = Some("u-1".to_string());
        assert!(!data.is_authenticated());
        data.agent_id = Some("BuyWhenReady-gemini-shopper".to_string());
        assert!(data.is_authenticated());
    }

    #[test]
    fn test_cookie_jar_round_trip() {
        let codec = SessionCodec::new("secret");
        let jar = codec.write(CookieJar::new(), &sample()).unwrap();
        assert_eq!(codec.read(&jar), sample());
        assert_eq!(codec.read(&codec.clear(jar)), SessionData::default());
    }
}
