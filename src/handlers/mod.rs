pub mod application;
pub mod job;
pub mod upload;

use actix_web::web::{Data, Json};
use actix_web::HttpResponse;
use hex::ToHex;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{query, query_as, query_scalar, PgPool};

use crate::error::Error;
use crate::models::user::{Profile, Role, User};
use crate::response::Ack;
use crate::tokener::{Claim, Jwt, Tokener};

pub(crate) fn hash_password(pass: &str, slt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pass);
    hasher.update(slt);
    hasher.finalize().encode_hex()
}

pub(crate) fn random_salt() -> String {
    let chars = vec![
        '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'A', 'B',
        'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
    ];
    let mut slt = String::new();
    let mut rng = thread_rng();
    for _ in 0..32 {
        let i = rng.gen_range(0..chars.len());
        slt.push(chars[i]);
    }
    slt
}

#[derive(Debug, Clone, Deserialize)]
pub struct Signup {
    nickname: String,
    email: String,
    password: String,
    role: Role,
}

pub async fn signup(
    Json(Signup {
        nickname,
        email,
        password,
        role,
    }): Json<Signup>,
    db: Data<PgPool>,
) -> Result<HttpResponse, Error> {
    if matches!(role, Role::Admin) {
        return Err(Error::BadRequest("admin accounts cannot be self-registered".into()));
    }
    if nickname.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(Error::BadRequest("nickname, email and password are required".into()));
    }
    let mut conn = db.acquire().await?;
    let taken: bool = query_scalar("SELECT EXISTS(SELECT id FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&mut conn)
        .await?;
    if taken {
        return Err(Error::BadRequest("email already registered".into()));
    }
    let slt = random_salt();
    query("INSERT INTO users (nickname, email, password, salt, role) VALUES ($1, $2, $3, $4, $5)")
        .bind(&nickname)
        .bind(&email)
        .bind(hash_password(&password, &slt))
        .bind(&slt)
        .bind(role)
        .execute(&mut conn)
        .await?;
    Ok(HttpResponse::Created().json(Ack::ok("account created")))
}

#[derive(Debug, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginPayload {
    pub success: bool,
    pub token: String,
    pub user: Profile,
}

pub async fn login(Json(Login { email, password }): Json<Login>, db: Data<PgPool>, tokener: Data<Jwt>) -> Result<Json<LoginPayload>, Error> {
    let mut conn = db.acquire().await?;
    let user = query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::Unauthorized("invalid email or password".into()))?;
    if hash_password(&password, &user.salt) != user.password {
        return Err(Error::Unauthorized("invalid email or password".into()));
    }
    let claim = Claim {
        sub: user.id.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp(),
    };
    let token = tokener.gen_token(&claim)?;
    Ok(Json(LoginPayload {
        success: true,
        token,
        user: Profile {
            id: user.id,
            nickname: user.nickname,
            email: user.email,
            role: user.role,
        },
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hashing_is_deterministic_per_salt() {
        assert_eq!(hash_password("hunter2", "salt"), hash_password("hunter2", "salt"));
        assert_ne!(hash_password("hunter2", "salt"), hash_password("hunter2", "other"));
        assert_ne!(hash_password("hunter2", "salt"), hash_password("hunter3", "salt"));
    }

    #[test]
    fn salts_are_long_and_alphanumeric() {
        let slt = random_salt();
        assert_eq!(slt.len(), 32);
        assert!(slt.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(random_salt(), random_salt());
    }
}
