use std::path::Path;
use std::sync::Arc;

use fastpull_verify::FinalData;
use tempfile::TempPath;

use super::request::FetchRequest;

/// How a download ended.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success {
        /// Shared by every waiter; the file is deleted when the last clone
        /// of the response is dropped.
        temp:       Arc<TempPath>,
        final_data: FinalData,
    },
    Failure {
        reason: String,
    },
}

/// Result of [`WebSpider::download`](crate::WebSpider::download).
///
/// Every caller attached to the same download receives a clone of the same
/// response, including the request of the caller that started it.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    request:  Arc<FetchRequest>,
    outcome:  FetchOutcome,
    attempts: u32,
}

impl FetchResponse {
    pub(crate) fn succeeded(
        request: Arc<FetchRequest>,
        temp: TempPath,
        final_data: FinalData,
        attempts: u32,
    ) -> Self {
        Self {
            request,
            outcome: FetchOutcome::Success {
                temp: Arc::new(temp),
                final_data,
            },
            attempts,
        }
    }

    pub(crate) fn failure(request: Arc<FetchRequest>, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            request,
            outcome: FetchOutcome::Failure {
                reason: reason.into(),
            },
            attempts,
        }
    }

    pub fn request(&self) -> &FetchRequest { &self.request }

    pub fn outcome(&self) -> &FetchOutcome { &self.outcome }

    pub fn success(&self) -> bool { matches!(self.outcome, FetchOutcome::Success { .. }) }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            FetchOutcome::Failure { reason } => Some(reason),
            FetchOutcome::Success { .. } => None,
        }
    }

    pub fn temp_path(&self) -> Option<&Path> {
        match &self.outcome {
            FetchOutcome::Success { temp, .. } => {
                let path: &Path = temp;
                Some(path)
            }
            FetchOutcome::Failure { .. } => None,
        }
    }

    pub fn final_data(&self) -> Option<&FinalData> {
        match &self.outcome {
            FetchOutcome::Success { final_data, .. } => Some(final_data),
            FetchOutcome::Failure { .. } => None,
        }
    }

    /// Network attempts made by the underlying download.
    pub fn attempts(&self) -> u32 { self.attempts }
}
