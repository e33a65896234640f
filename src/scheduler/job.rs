use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{RelayError, Result};

/// Opaque job identifier.
///
/// Freshly minted ids are random v4 UUIDs, so two submissions landing in the
/// same clock tick never collide. Ids arriving from the worker are accepted
/// verbatim; the relay never parses them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Login credentials validated from a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub school_name: String,
    pub username: String,
    pub password: String,
}

/// Body of `POST /jobs`. Fields are optional so that a missing field and an
/// empty one are both reported as validation failures rather than as a JSON
/// rejection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub school_name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn new(
        school_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            school_name: Some(school_name.into()),
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Read the credential fields out of an arbitrary JSON body.
    ///
    /// Fields that are absent or not strings are left unset, so they surface
    /// as missing in [`LoginRequest::validate`].
    pub fn from_json(body: &Value) -> Self {
        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_owned);
        Self {
            school_name: field("schoolName"),
            username: field("username"),
            password: field("password"),
        }
    }

    /// Check that every field is present and non-empty.
    pub fn validate(self) -> Result<Credentials> {
        fn present(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.is_empty())
        }

        let school_name = present(self.school_name);
        let username = present(self.username);
        let password = present(self.password);

        match (school_name, username, password) {
            (Some(school_name), Some(username), Some(password)) => Ok(Credentials {
                school_name,
                username,
                password,
            }),
            (school_name, username, password) => {
                let missing: Vec<&str> = [
                    ("schoolName", school_name.is_none()),
                    ("username", username.is_none()),
                    ("password", password.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(RelayError::Validation(missing.join(", ")))
            }
        }
    }
}

/// A login job waiting for the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub school_name: String,
    pub username: String,
    pub password: String,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_id(JobId::generate(), credentials)
    }

    pub fn with_id(id: JobId, credentials: Credentials) -> Self {
        Self {
            id,
            school_name: credentials.school_name,
            username: credentials.username,
            password: credentials.password,
            submitted_at: Utc::now(),
        }
    }
}

/// Outcome of a job as reported by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub error: Option<String>,
    pub homeworks: Vec<Value>,
    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    /// Human-readable summary returned to the submitting caller.
    pub fn message(&self) -> &'static str {
        if self.success {
            "Login completed successfully"
        } else {
            "Login failed"
        }
    }
}

/// Body of `POST /jobs/result`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReport {
    pub job_id: JobId,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub homeworks: Vec<Value>,
}

impl ResultReport {
    pub fn into_result(self) -> (JobId, JobResult) {
        let result = JobResult {
            success: self.success,
            error: self.error,
            homeworks: self.homeworks,
            completed_at: Utc::now(),
        };
        (self.job_id, result)
    }
}

/// Observable phase of a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Waiting in the queue for the worker to pull it.
    Queued,
    /// The worker reported a result that has not expired.
    Completed(JobResult),
    /// Neither queued nor completed. Covers jobs the worker is still
    /// running as well as unknown, consumed or expired ids.
    Processing,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Completed(_) => write!(f, "completed"),
            JobStatus::Processing => write!(f, "processing"),
        }
    }
}
