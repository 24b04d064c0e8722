use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "application_status")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Reviewed,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Reviewed => "reviewed",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Accepted and rejected are final, the employer endpoint never moves an
    /// application out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Accepted | ApplicationStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "response_sender")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Employer,
    Applicant,
}

#[derive(Debug, PartialEq, Eq)]
pub enum StatusChange {
    Set(ApplicationStatus),
    Noop,
}

/// Decides what an employer request to move `current` to `requested` means.
/// Any non-terminal status may move to any status. A terminal status accepts
/// an idempotent repeat of itself and nothing else.
pub fn plan_status_change(current: ApplicationStatus, requested: ApplicationStatus) -> Result<StatusChange, Error> {
    if current.is_terminal() {
        if requested == current {
            return Ok(StatusChange::Noop);
        }
        return Err(Error::BadRequest(format!(
            "application already {}, status can no longer change",
            current.as_str()
        )));
    }
    Ok(StatusChange::Set(requested))
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i32,
    pub job_id: i32,
    pub job_title_cache: String,
    pub company_name_cache: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub message: Option<String>,
    pub resume_path: Option<String>,
    pub applicant_id: Option<i32>,
    pub applicant_id_cache: Option<String>,
    pub submitter_nickname_cache: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

/// One entry of an application's response thread.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    #[serde(skip_serializing)]
    pub id: i32,
    #[serde(skip_serializing)]
    pub application_id: i32,
    pub sender: Sender,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::ApplicationStatus::*;
    use super::*;

    #[test]
    fn non_terminal_moves_anywhere() {
        for from in [Pending, Reviewed] {
            for to in [Pending, Reviewed, Accepted, Rejected] {
                assert_eq!(plan_status_change(from, to).unwrap(), StatusChange::Set(to));
            }
        }
    }

    #[test]
    fn terminal_repeat_is_a_noop() {
        assert_eq!(plan_status_change(Accepted, Accepted).unwrap(), StatusChange::Noop);
        assert_eq!(plan_status_change(Rejected, Rejected).unwrap(), StatusChange::Noop);
    }

    #[test]
    fn terminal_cannot_change() {
        for from in [Accepted, Rejected] {
            for to in [Pending, Reviewed, Accepted, Rejected] {
                if to == from {
                    continue;
                }
                assert!(matches!(plan_status_change(from, to), Err(Error::BadRequest(_))));
            }
        }
    }

    #[test]
    fn record_serializes_with_tagged_cache_fields() {
        let record = Application {
            id: 1,
            job_id: 7,
            job_title_cache: "Backend Engineer".into(),
            company_name_cache: "Acme".into(),
            submitter_name: "A".into(),
            submitter_email: "a@x.com".into(),
            message: None,
            resume_path: None,
            applicant_id: None,
            applicant_id_cache: None,
            submitter_nickname_cache: None,
            status: Pending,
            created_at: chrono::Utc::now(),
        };
        let body = serde_json::to_value(&record).unwrap();
        assert_eq!(body["jobId"], 7);
        assert_eq!(body["jobTitleCache"], "Backend Engineer");
        assert_eq!(body["companyNameCache"], "Acme");
        assert_eq!(body["status"], "pending");
        assert!(body["applicantId"].is_null());
    }
}
