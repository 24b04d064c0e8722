use sqlx::{query, query_scalar, PgPool};

use crate::error::Error;
use crate::handlers::{hash_password, random_salt};
use crate::models::user::Role;

/// Reconciles the seeded admin account before the server starts accepting
/// traffic. Idempotent: an existing account with the configured email wins.
pub async fn ensure_admin(db: &PgPool) -> Result<(), Error> {
    let (email, password) = match (dotenv::var("ADMIN_EMAIL"), dotenv::var("ADMIN_PASSWORD")) {
        (Ok(email), Ok(password)) => (email, password),
        _ => {
            log::warn!("ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping admin bootstrap");
            return Ok(());
        }
    };
    let mut conn = db.acquire().await?;
    let exists: bool = query_scalar("SELECT EXISTS(SELECT id FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&mut conn)
        .await?;
    if exists {
        return Ok(());
    }
    let slt = random_salt();
    query("INSERT INTO users (nickname, email, password, salt, role) VALUES ('admin', $1, $2, $3, $4)")
        .bind(&email)
        .bind(hash_password(&password, &slt))
        .bind(&slt)
        .bind(Role::Admin)
        .execute(&mut conn)
        .await?;
    log::info!("seeded admin account {}", email);
    Ok(())
}
