use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Seeker,
    Employer,
    Admin,
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i32,
    pub nickname: String,
    pub email: String,
    pub password: String,
    pub salt: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Account fields safe to hand back to clients.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub id: i32,
    pub nickname: String,
    pub email: String,
    pub role: Role,
}
