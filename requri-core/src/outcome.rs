//! Task outcome: what the host receives for every invocation, success or not.
//!
//! Every outcome carries `changed` and `failed`. A completed exchange always
//! carries the full response record, even when the status code marks the
//! task as failed, so the host can inspect it.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::builder::build;
use crate::client::HttpClient;
use crate::error::TaskError;
use crate::mapper::{execute, is_changed};
use crate::record::ResponseRecord;

/// Result of one task invocation, serialized as a single flat mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(flatten)]
    pub detail: OutcomeDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutcomeDetail {
    /// The exchange completed.
    Response(ResponseRecord),
    /// Validation or transport failed before a record could be produced.
    Error {
        changed: bool,
        stage: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },
}

impl TaskOutcome {
    /// Wrap a completed exchange. Statuses outside `[200, 400)` fail the task.
    pub fn from_record(record: ResponseRecord) -> Self {
        let msg = (!record.ok).then(|| {
            format!(
                "request failed with HTTP status code {} and error message {}",
                record.status_code, record.text
            )
        });
        Self {
            failed: !record.ok,
            msg,
            detail: OutcomeDetail::Response(record),
        }
    }

    /// Wrap a failure. `changed` reflects the intended method when the
    /// request got as far as the transport.
    pub fn from_error(error: &TaskError, changed: bool) -> Self {
        let status_code = match error {
            TaskError::Transport(e) => e.status_code(),
            TaskError::Validation(_) => None,
        };
        Self {
            failed: true,
            msg: Some(error.to_string()),
            detail: OutcomeDetail::Error {
                changed,
                stage: error.stage(),
                status_code,
            },
        }
    }

    pub fn changed(&self) -> bool {
        match &self.detail {
            OutcomeDetail::Response(record) => record.changed,
            OutcomeDetail::Error { changed, .. } => *changed,
        }
    }

    pub fn record(&self) -> Option<&ResponseRecord> {
        match &self.detail {
            OutcomeDetail::Response(record) => Some(record),
            OutcomeDetail::Error { .. } => None,
        }
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Build, execute and map one task. Never panics; every failure becomes a
/// failed outcome.
pub fn run<C: HttpClient>(client: &C, raw: &Value) -> TaskOutcome {
    let config = match build(raw) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "invalid task parameters");
            return TaskOutcome::from_error(&TaskError::from(e), false);
        }
    };

    match execute(client, &config) {
        Ok(record) => TaskOutcome::from_record(record),
        Err(e) => {
            warn!(error = %e, url = %config.url, "request failed");
            TaskOutcome::from_error(&TaskError::from(e), is_changed(config.method))
        }
    }
}
