use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Claims carried by every issued credential. `sub` is the single canonical
/// subject field: the account id as a decimal string.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claim {
    pub sub: String,
    pub exp: i64,
}

pub trait Tokener {
    fn gen_token(&self, claim: &Claim) -> Result<String, Error>;
    fn verify_token(&self, token: &str) -> Result<Claim, Error>;
}

#[derive(Clone)]
pub struct Jwt {
    secret: Vec<u8>,
}

impl Jwt {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

impl Tokener for Jwt {
    fn gen_token(&self, claim: &Claim) -> Result<String, Error> {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(&self.secret);
        let token = encode(&header, claim, &key)?;
        Ok(token)
    }

    fn verify_token(&self, token: &str) -> Result<Claim, Error> {
        let key = DecodingKey::from_secret(&self.secret);
        let validation = Validation::new(Algorithm::HS256);
        let payload = decode(token, &key, &validation)?;
        Ok(payload.claims)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    fn tokener() -> Jwt {
        Jwt::new(b"test secret".to_vec())
    }

    fn claim_expiring_in(seconds: i64) -> Claim {
        Claim {
            sub: "42".into(),
            exp: chrono::Utc::now().timestamp() + seconds,
        }
    }

    #[test]
    fn gen_and_verify_roundtrip() {
        let jwt = tokener();
        let token = jwt.gen_token(&claim_expiring_in(3600)).unwrap();
        let claim = jwt.verify_token(&token).unwrap();
        assert_eq!(claim.sub, "42");
    }

    #[test]
    fn expired_credential_is_rejected_as_expired() {
        let jwt = tokener();
        let token = jwt.gen_token(&claim_expiring_in(-3600)).unwrap();
        match jwt.verify_token(&token) {
            Err(Error::Token(e)) => assert!(matches!(e.kind(), ErrorKind::ExpiredSignature)),
            other => panic!("expected expired-token error, got {:?}", other.map(|c| c.sub)),
        }
    }

    #[test]
    fn garbage_credential_is_rejected() {
        let jwt = tokener();
        assert!(jwt.verify_token("not.a.token").is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = tokener().gen_token(&claim_expiring_in(3600)).unwrap();
        let other = Jwt::new(b"another secret".to_vec());
        assert!(other.verify_token(&token).is_err());
    }
}
