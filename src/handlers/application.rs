use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::web::{Data, Json, Path, Query};
use actix_web::{HttpRequest, HttpResponse};
use bytes::Bytes;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::{query, query_as, query_scalar, PgPool, Postgres};

use crate::context::UserInfo;
use crate::error::Error;
use crate::middlewares::jwt::resolve_identity;
use crate::models::application::{plan_status_change, Application, ApplicationStatus, ResponseEntry, Sender, StatusChange};
use crate::models::job::Job;
use crate::models::user::Profile;
use crate::storer::FileStorer;
use crate::tokener::Jwt;

/// An application record expanded for display: the job posting and applicant
/// account are attached when they still exist, the cache fields on the record
/// itself stay as snapshotted at submission time.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationView {
    #[serde(flatten)]
    pub record: Application,
    pub job: Option<Job>,
    pub applicant: Option<Profile>,
    pub responses: Vec<ResponseEntry>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationPayload {
    pub success: bool,
    pub message: String,
    pub application: ApplicationView,
}

#[derive(Debug, Serialize)]
pub struct ApplicationsPayload {
    pub success: bool,
    pub applications: Vec<ApplicationView>,
}

async fn expand(conn: &mut PoolConnection<Postgres>, records: Vec<Application>) -> Result<Vec<ApplicationView>, Error> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let record_ids: Vec<i32> = records.iter().map(|r| r.id).collect();
    let job_ids: Vec<i32> = records.iter().map(|r| r.job_id).collect();
    let applicant_ids: Vec<i32> = records.iter().filter_map(|r| r.applicant_id).collect();
    let jobs: HashMap<i32, Job> = query_as::<_, Job>("SELECT * FROM jobs WHERE id = ANY($1)")
        .bind(&job_ids)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(|j| (j.id, j))
        .collect();
    let applicants: HashMap<i32, Profile> = if applicant_ids.is_empty() {
        HashMap::new()
    } else {
        query_as::<_, Profile>("SELECT id, nickname, email, role FROM users WHERE id = ANY($1)")
            .bind(&applicant_ids)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };
    let entries: Vec<ResponseEntry> = query_as(
        "SELECT *
        FROM application_responses
        WHERE application_id = ANY($1)
        ORDER BY created_at, id",
    )
    .bind(&record_ids)
    .fetch_all(&mut *conn)
    .await?;
    let mut threads: HashMap<i32, Vec<ResponseEntry>> = HashMap::new();
    for entry in entries {
        threads.entry(entry.application_id).or_default().push(entry);
    }
    Ok(records
        .into_iter()
        .map(|record| ApplicationView {
            job: jobs.get(&record.job_id).cloned(),
            applicant: record.applicant_id.and_then(|id| applicants.get(&id).cloned()),
            responses: threads.remove(&record.id).unwrap_or_default(),
            record,
        })
        .collect())
}

async fn expand_one(conn: &mut PoolConnection<Postgres>, record: Application) -> Result<ApplicationView, Error> {
    let mut views = expand(conn, vec![record]).await?;
    Ok(views.remove(0))
}

#[derive(Debug, Default)]
pub struct SubmitForm {
    pub job_id: Option<i32>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub message: Option<String>,
    pub resume_path: Option<String>,
}

#[derive(Debug)]
pub struct Submission {
    pub job_id: i32,
    pub name: String,
    pub email: String,
    pub message: Option<String>,
    pub resume_path: Option<String>,
}

impl SubmitForm {
    pub fn validated(self) -> Result<Submission, Error> {
        let job_id = self.job_id.ok_or_else(|| Error::BadRequest("jobId is required".into()))?;
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(Error::BadRequest("name is required".into())),
        };
        let email = match self.email {
            Some(email) if !email.trim().is_empty() => email,
            _ => return Err(Error::BadRequest("email is required".into())),
        };
        Ok(Submission {
            job_id,
            name,
            email,
            message: self.message,
            resume_path: self.resume_path,
        })
    }
}

fn text(content: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(content).map_err(|_| Error::BadRequest("form fields must be utf-8".into()))
}

async fn read_form<S>(mut payload: Multipart, storer: &S) -> Result<SubmitForm, Error>
where
    S: FileStorer,
{
    let mut form = SubmitForm::default();
    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().to_owned();
        let mut content = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            content.extend_from_slice(&chunk);
        }
        match name.as_str() {
            "jobId" => {
                let raw = text(content)?;
                form.job_id = Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| Error::BadRequest("jobId must be a posting id".into()))?,
                );
            }
            "name" => form.name = Some(text(content)?),
            "email" => form.email = Some(text(content)?),
            "message" => form.message = Some(text(content)?),
            "resume" => {
                if !content.is_empty() {
                    form.resume_path = Some(storer.write(Bytes::from(content))?);
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

pub async fn submit<S>(
    req: HttpRequest,
    payload: Multipart,
    db: Data<PgPool>,
    tokener: Data<Jwt>,
    storer: Data<S>,
) -> Result<HttpResponse, Error>
where
    S: FileStorer + 'static,
{
    let submission = read_form(payload, storer.get_ref()).await?.validated()?;
    let mut conn = db.acquire().await?;
    // a missing or unverifiable credential degrades to a guest submission
    let applicant: Option<Profile> = match resolve_identity(req.headers(), tokener.get_ref()) {
        Some(user) => query_as("SELECT id, nickname, email, role FROM users WHERE id = $1")
            .bind(user.id)
            .fetch_optional(&mut conn)
            .await
            .unwrap_or_else(|e| {
                log::warn!("applicant lookup failed, treating submission as guest: {}", e);
                None
            }),
        None => None,
    };
    // snapshot the posting caches, a failed side lookup must not block creation
    let job: Option<Job> = query_as("SELECT * FROM jobs WHERE id = $1")
        .bind(submission.job_id)
        .fetch_optional(&mut conn)
        .await
        .unwrap_or_else(|e| {
            log::warn!("job lookup for caches failed: {}", e);
            None
        });
    let record: Application = query_as(
        "INSERT INTO applications
            (job_id, job_title_cache, company_name_cache, submitter_name, submitter_email,
            message, resume_path, applicant_id, applicant_id_cache, submitter_nickname_cache, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *",
    )
    .bind(submission.job_id)
    .bind(job.as_ref().map(|j| j.title.clone()).unwrap_or_default())
    .bind(job.as_ref().map(|j| j.company.clone()).unwrap_or_default())
    .bind(&submission.name)
    .bind(&submission.email)
    .bind(&submission.message)
    .bind(&submission.resume_path)
    .bind(applicant.as_ref().map(|a| a.id))
    .bind(applicant.as_ref().map(|a| a.id.to_string()))
    .bind(applicant.as_ref().map(|a| a.nickname.clone()))
    .bind(ApplicationStatus::Pending)
    .fetch_one(&mut conn)
    .await?;
    let application = expand_one(&mut conn, record).await?;
    Ok(HttpResponse::Created().json(ApplicationPayload {
        success: true,
        message: "application submitted".into(),
        application,
    }))
}

pub async fn list_for_employer(user_info: UserInfo, db: Data<PgPool>) -> Result<Json<ApplicationsPayload>, Error> {
    let mut conn = db.acquire().await?;
    let records: Vec<Application> = query_as(
        "SELECT *
        FROM applications
        WHERE job_id IN (SELECT id FROM jobs WHERE owner_id = $1)
        ORDER BY created_at DESC, id DESC",
    )
    .bind(user_info.id)
    .fetch_all(&mut conn)
    .await?;
    let applications = expand(&mut conn, records).await?;
    Ok(Json(ApplicationsPayload { success: true, applications }))
}

#[derive(Debug, Deserialize)]
pub struct MineFilter {
    #[serde(rename = "jobId")]
    pub job_id: Option<i32>,
}

pub async fn list_mine(user_info: UserInfo, Query(MineFilter { job_id }): Query<MineFilter>, db: Data<PgPool>) -> Result<Json<ApplicationsPayload>, Error> {
    let mut conn = db.acquire().await?;
    let records: Vec<Application> = query_as(
        "SELECT *
        FROM applications
        WHERE applicant_id = $1
        AND ($2 IS NULL OR job_id = $2)
        ORDER BY created_at DESC, id DESC",
    )
    .bind(user_info.id)
    .bind(job_id)
    .fetch_all(&mut conn)
    .await?;
    let applications = expand(&mut conn, records).await?;
    Ok(Json(ApplicationsPayload { success: true, applications }))
}

#[derive(Debug, Deserialize)]
pub struct PublicFilter {
    pub applicant: Option<String>,
    pub email: Option<String>,
}

impl PublicFilter {
    /// At least one criterion must be present, an unfiltered query would
    /// return the whole table.
    fn ensure_filtered(&self) -> Result<(), Error> {
        let no_applicant = self.applicant.as_deref().map_or(true, |s| s.trim().is_empty());
        let no_email = self.email.as_deref().map_or(true, |s| s.trim().is_empty());
        if no_applicant && no_email {
            return Err(Error::BadRequest("applicant or email filter is required".into()));
        }
        Ok(())
    }
}

pub async fn public_lookup(Query(filter): Query<PublicFilter>, db: Data<PgPool>) -> Result<Json<ApplicationsPayload>, Error> {
    filter.ensure_filtered()?;
    let mut conn = db.acquire().await?;
    let records: Vec<Application> = query_as(
        "SELECT *
        FROM applications
        WHERE ($1 IS NOT NULL AND (applicant_id_cache = $1 OR applicant_id::TEXT = $1))
        OR ($2 IS NOT NULL AND submitter_email = $2)
        ORDER BY created_at DESC, id DESC",
    )
    .bind(&filter.applicant)
    .bind(&filter.email)
    .fetch_all(&mut conn)
    .await?;
    let applications = expand(&mut conn, records).await?;
    Ok(Json(ApplicationsPayload { success: true, applications }))
}

#[derive(Debug, Deserialize)]
pub struct Respond {
    pub message: Option<String>,
    pub status: Option<ApplicationStatus>,
}

pub async fn respond(
    user_info: UserInfo,
    application_id: Path<(i32,)>,
    Json(Respond { message, status }): Json<Respond>,
    db: Data<PgPool>,
) -> Result<Json<ApplicationPayload>, Error> {
    let application_id = application_id.into_inner().0;
    let mut conn = db.acquire().await?;
    let record: Application = query_as("SELECT * FROM applications WHERE id = $1")
        .bind(application_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::NotFound("application not found".into()))?;
    let owner_id: i32 = query_scalar("SELECT owner_id FROM jobs WHERE id = $1")
        .bind(record.job_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::NotFound("job posting for this application no longer exists".into()))?;
    if owner_id != user_info.id {
        return Err(Error::Forbidden("only the posting owner can respond".into()));
    }
    if let Some(requested) = status {
        match plan_status_change(record.status, requested)? {
            StatusChange::Noop => {}
            StatusChange::Set(next) => {
                // conditional write keeps the terminal lock under concurrent responders
                let changed = query(
                    "UPDATE applications
                    SET status = $1
                    WHERE id = $2
                    AND status NOT IN ('accepted', 'rejected')",
                )
                .bind(next)
                .bind(application_id)
                .execute(&mut conn)
                .await?
                .rows_affected();
                if changed == 0 {
                    let current: ApplicationStatus = query_scalar("SELECT status FROM applications WHERE id = $1")
                        .bind(application_id)
                        .fetch_one(&mut conn)
                        .await?;
                    if current != requested {
                        return Err(Error::BadRequest(format!(
                            "application already {}, status can no longer change",
                            current.as_str()
                        )));
                    }
                }
            }
        }
    }
    // the response thread stays open in every status
    if let Some(message) = message.as_deref() {
        if !message.trim().is_empty() {
            query("INSERT INTO application_responses (application_id, sender, message) VALUES ($1, $2, $3)")
                .bind(application_id)
                .bind(Sender::Employer)
                .bind(message.trim())
                .execute(&mut conn)
                .await?;
        }
    }
    let record: Application = query_as("SELECT * FROM applications WHERE id = $1")
        .bind(application_id)
        .fetch_one(&mut conn)
        .await?;
    let application = expand_one(&mut conn, record).await?;
    Ok(Json(ApplicationPayload {
        success: true,
        message: "application updated".into(),
        application,
    }))
}

#[derive(Debug, Deserialize)]
pub struct Reply {
    pub message: String,
}

pub async fn reply(
    user_info: UserInfo,
    application_id: Path<(i32,)>,
    Json(Reply { message }): Json<Reply>,
    db: Data<PgPool>,
) -> Result<Json<ApplicationPayload>, Error> {
    let application_id = application_id.into_inner().0;
    if message.trim().is_empty() {
        return Err(Error::BadRequest("message is required".into()));
    }
    let mut conn = db.acquire().await?;
    let record: Application = query_as("SELECT * FROM applications WHERE id = $1")
        .bind(application_id)
        .fetch_optional(&mut conn)
        .await?
        .ok_or_else(|| Error::NotFound("application not found".into()))?;
    if record.applicant_id != Some(user_info.id) {
        return Err(Error::Forbidden("only the linked applicant can reply".into()));
    }
    query("INSERT INTO application_responses (application_id, sender, message) VALUES ($1, $2, $3)")
        .bind(application_id)
        .bind(Sender::Applicant)
        .bind(message.trim())
        .execute(&mut conn)
        .await?;
    let record: Application = query_as("SELECT * FROM applications WHERE id = $1")
        .bind(application_id)
        .fetch_one(&mut conn)
        .await?;
    let application = expand_one(&mut conn, record).await?;
    Ok(Json(ApplicationPayload {
        success: true,
        message: "reply added".into(),
        application,
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    fn full_form() -> SubmitForm {
        SubmitForm {
            job_id: Some(1),
            name: Some("A".into()),
            email: Some("a@x.com".into()),
            message: None,
            resume_path: None,
        }
    }

    #[test]
    fn submission_requires_job_name_and_email() {
        assert!(full_form().validated().is_ok());
        for strip in ["jobId", "name", "email"] {
            let mut form = full_form();
            match strip {
                "jobId" => form.job_id = None,
                "name" => form.name = None,
                _ => form.email = None,
            }
            assert!(matches!(form.validated(), Err(Error::BadRequest(_))), "missing {} must be rejected", strip);
        }
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        let mut form = full_form();
        form.name = Some("   ".into());
        assert!(matches!(form.validated(), Err(Error::BadRequest(_))));
        let mut form = full_form();
        form.email = Some(String::new());
        assert!(matches!(form.validated(), Err(Error::BadRequest(_))));
    }

    #[test]
    fn public_lookup_needs_at_least_one_criterion() {
        let none = PublicFilter { applicant: None, email: None };
        assert!(matches!(none.ensure_filtered(), Err(Error::BadRequest(_))));
        let blank = PublicFilter {
            applicant: Some("  ".into()),
            email: Some(String::new()),
        };
        assert!(matches!(blank.ensure_filtered(), Err(Error::BadRequest(_))));
        let by_applicant = PublicFilter {
            applicant: Some("12".into()),
            email: None,
        };
        assert!(by_applicant.ensure_filtered().is_ok());
        let by_email = PublicFilter {
            applicant: None,
            email: Some("a@x.com".into()),
        };
        assert!(by_email.ensure_filtered().is_ok());
    }

    #[test]
    fn view_serializes_record_fields_alongside_expansions() {
        let view = ApplicationView {
            record: Application {
                id: 3,
                job_id: 9,
                job_title_cache: "Welder".into(),
                company_name_cache: "Forge".into(),
                submitter_name: "B".into(),
                submitter_email: "b@x.com".into(),
                message: Some("hi".into()),
                resume_path: None,
                applicant_id: None,
                applicant_id_cache: None,
                submitter_nickname_cache: None,
                status: ApplicationStatus::Pending,
                created_at: chrono::Utc::now(),
            },
            job: None,
            applicant: None,
            responses: Vec::new(),
        };
        let body = serde_json::to_value(&view).unwrap();
        assert_eq!(body["jobId"], 9);
        assert_eq!(body["jobTitleCache"], "Welder");
        assert!(body["job"].is_null());
        assert!(body["applicant"].is_null());
        assert_eq!(body["responses"], serde_json::json!([]));
    }
}
