use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey,
                   Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

const TTL_SECS: i64 = 86_400;

/// `sub` is the chat nick.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims { pub sub:String, pub exp:i64 }

pub fn sign(nick:&str, secret:&str) -> AppResult<String> {
    let c = Claims { sub: nick.into(), exp: Utc::now().timestamp()+TTL_SECS };
    Ok(encode(&Header::default(), &c, &EncodingKey::from_secret(secret.as_bytes()))?)
}

pub fn verify(token:&str, secret:&str) -> Option<String> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()),
                     &Validation::new(Algorithm::HS256))
        .map(|d| d.claims.sub).ok()
        .filter(|nick| !nick.trim().is_empty())
}
