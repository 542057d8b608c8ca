//! Remote session validation — a bounded check that a stored credential
//! still maps to a live, active subject at the session authority.

use async_trait::async_trait;
use chrono::Utc;
use console_core::config::AuthorityConfig;
use console_core::error::{ConsoleError, ConsoleResult};
use console_core::types::{Credential, IdentityClass, IdentitySnapshot, SubjectRecord, SubjectStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Why a stored credential could not be validated. Every kind means the same
/// thing to the coordinator — credential unusable — and none is retried
/// inside this subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("validation unsettled after {0:?}")]
    TimedOut(Duration),

    #[error("authority rejected the token")]
    Rejected,

    #[error("subject record missing or disabled")]
    SubjectMissing,

    #[error("subject status {0:?} forbids access")]
    SubjectInactive(SubjectStatus),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Remote check that a stored credential is still valid, resolving the
/// current subject record into an [`IdentitySnapshot`].
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self, credential: &Credential)
        -> Result<IdentitySnapshot, ValidationError>;
}

/// Race a validation call against `timeout`. On the deadline the in-flight
/// future is dropped, so a completion arriving later is never applied.
pub async fn validate_with_timeout(
    validator: &dyn SessionValidator,
    credential: &Credential,
    timeout: Duration,
) -> Result<IdentitySnapshot, ValidationError> {
    match tokio::time::timeout(timeout, validator.validate(credential)).await {
        Ok(result) => result,
        Err(_) => {
            metrics::counter!("session.validation_timeouts").increment(1);
            Err(ValidationError::TimedOut(timeout))
        }
    }
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
    class: IdentityClass,
    subject_id: Uuid,
}

/// Success payload returned by the authority's validate endpoint.
#[derive(Debug, Deserialize)]
pub struct ValidatePayload {
    pub subject: Option<SubjectRecord>,
}

/// Classify an authority success payload against the stored credential.
/// A subject that is absent or carries `enabled == false` reads as missing;
/// a present-but-non-active status reads as inactive.
pub fn resolve_snapshot(
    credential: &Credential,
    payload: ValidatePayload,
) -> Result<IdentitySnapshot, ValidationError> {
    let subject = payload.subject.ok_or(ValidationError::SubjectMissing)?;
    if !subject.enabled {
        return Err(ValidationError::SubjectMissing);
    }
    if subject.status != SubjectStatus::Active {
        return Err(ValidationError::SubjectInactive(subject.status));
    }
    Ok(IdentitySnapshot {
        class: credential.class,
        subject_id: subject.subject_id,
        subject,
        resolved_at: Utc::now(),
    })
}

/// Production validator: HTTP/JSON call to the remote session authority.
pub struct HttpSessionValidator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionValidator {
    pub fn new(config: &AuthorityConfig) -> ConsoleResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| ConsoleError::Authority(e.to_string()))?;
        info!(base_url = %config.base_url, "Session authority client ready");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SessionValidator for HttpSessionValidator {
    async fn validate(
        &self,
        credential: &Credential,
    ) -> Result<IdentitySnapshot, ValidationError> {
        let url = format!("{}/v1/sessions/validate", self.base_url);
        debug!(class = %credential.class, subject_id = %credential.subject_id, "Validating session");

        let response = self
            .client
            .post(&url)
            .json(&ValidateRequest {
                token: &credential.token,
                class: credential.class,
                subject_id: credential.subject_id,
            })
            .send()
            .await
            .map_err(|e| ValidationError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let payload: ValidatePayload = response
                .json()
                .await
                .map_err(|e| ValidationError::Transport(e.to_string()))?;
            resolve_snapshot(credential, payload)
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            Err(ValidationError::Rejected)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(ValidationError::SubjectMissing)
        } else {
            Err(ValidationError::Transport(format!(
                "authority returned {status}"
            )))
        }
    }
}
