use actix_web::web::{Data, Json, Path, Query};
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::{query_as, query_scalar, PgPool, Postgres};

use crate::context::UserInfo;
use crate::error::Error;
use crate::models::job::{Job, JobCreation, JobStatus};
use crate::models::user::Role;
use crate::request::Pagination;

#[derive(Debug, Serialize)]
pub struct JobPayload {
    pub success: bool,
    pub job: Job,
}

#[derive(Debug, Serialize)]
pub struct JobsPayload {
    pub success: bool,
    pub jobs: Vec<Job>,
    pub total: i64,
}

async fn role_of(conn: &mut PoolConnection<Postgres>, user_id: i32) -> Result<Option<Role>, Error> {
    let role = query_scalar("SELECT role FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(role)
}

pub async fn create(user_info: UserInfo, Json(data): Json<JobCreation>, db: Data<PgPool>) -> Result<HttpResponse, Error> {
    if data.title.trim().is_empty() || data.company.trim().is_empty() {
        return Err(Error::BadRequest("title and company are required".into()));
    }
    let mut conn = db.acquire().await?;
    match role_of(&mut conn, user_info.id).await? {
        Some(Role::Employer) | Some(Role::Admin) => {}
        _ => return Err(Error::Forbidden("only employer accounts can post jobs".into())),
    }
    let job: Job = query_as(
        "INSERT INTO jobs (title, company, location, description, salary, owner_id, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *",
    )
    .bind(&data.title)
    .bind(&data.company)
    .bind(&data.location)
    .bind(&data.description)
    .bind(&data.salary)
    .bind(user_info.id)
    .bind(JobStatus::Pending)
    .fetch_one(&mut conn)
    .await?;
    Ok(HttpResponse::Created().json(JobPayload { success: true, job }))
}

#[derive(Debug, Deserialize)]
pub struct JobFilter {
    pub search: Option<String>,
}

pub async fn list_open(
    Query(JobFilter { search }): Query<JobFilter>,
    Query(Pagination { page, size }): Query<Pagination>,
    db: Data<PgPool>,
) -> Result<Json<JobsPayload>, Error> {
    let mut conn = db.acquire().await?;
    let pattern = search.map(|s| format!("%{}%", s));
    let total: i64 = query_scalar(
        "SELECT COUNT(*)
        FROM jobs
        WHERE status = $1
        AND ($2 IS NULL OR title ILIKE $2 OR company ILIKE $2)",
    )
    .bind(JobStatus::Accepted)
    .bind(&pattern)
    .fetch_one(&mut conn)
    .await?;
    let jobs: Vec<Job> = query_as(
        "SELECT *
        FROM jobs
        WHERE status = $1
        AND ($2 IS NULL OR title ILIKE $2 OR company ILIKE $2)
        ORDER BY posted_at DESC, id DESC
        LIMIT $3
        OFFSET $4",
    )
    .bind(JobStatus::Accepted)
    .bind(&pattern)
    .bind(size)
    .bind((page - 1) * size)
    .fetch_all(&mut conn)
    .await?;
    Ok(Json(JobsPayload { success: true, jobs, total }))
}

pub async fn list_mine(user_info: UserInfo, db: Data<PgPool>) -> Result<Json<JobsPayload>, Error> {
    let mut conn = db.acquire().await?;
    let jobs: Vec<Job> = query_as("SELECT * FROM jobs WHERE owner_id = $1 ORDER BY posted_at DESC, id DESC")
        .bind(user_info.id)
        .fetch_all(&mut conn)
        .await?;
    let total = jobs.len() as i64;
    Ok(Json(JobsPayload { success: true, jobs, total }))
}

pub async fn detail(job_id: Path<(i32,)>, db: Data<PgPool>) -> Result<Json<JobPayload>, Error> {
    let job_id = job_id.into_inner().0;
    let mut conn = db.acquire().await?;
    let job: Job = query_as("SELECT * FROM jobs WHERE id = $1 AND status = $2")
        .bind(job_id)
        .bind(JobStatus::Accepted)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::NotFound("job not found".into()))?;
    Ok(Json(JobPayload { success: true, job }))
}

#[derive(Debug, Deserialize)]
pub struct Review {
    pub status: JobStatus,
}

pub async fn review(user_info: UserInfo, job_id: Path<(i32,)>, Json(Review { status }): Json<Review>, db: Data<PgPool>) -> Result<Json<JobPayload>, Error> {
    let job_id = job_id.into_inner().0;
    if !matches!(status, JobStatus::Accepted | JobStatus::Rejected) {
        return Err(Error::BadRequest("review status must be accepted or rejected".into()));
    }
    let mut conn = db.acquire().await?;
    match role_of(&mut conn, user_info.id).await? {
        Some(Role::Admin) => {}
        _ => return Err(Error::Forbidden("only admins can review postings".into())),
    }
    let job: Job = query_as("UPDATE jobs SET status = $1 WHERE id = $2 RETURNING *")
        .bind(status)
        .bind(job_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::NotFound("job not found".into()))?;
    Ok(Json(JobPayload { success: true, job }))
}
