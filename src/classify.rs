use crate::constants::BUDGET_ERROR_KEYWORDS;
use crate::db::DatabaseError;
use crate::facebook::{FacebookApiError, GraphErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Insufficient ad budget: {detail}")]
    BudgetInsufficient { detail: String },
    #[error("{message}")]
    ExternalFailure {
        message: String,
        code: Option<i64>,
        kind: GraphErrorKind,
    },
    #[error("Ad campaign {0} is already being provisioned")]
    InProgress(i32),
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl ProvisionError {
    /// Stable identifier for callers that should not depend on message text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::BudgetInsufficient { .. } => "budget_insufficient",
            Self::ExternalFailure { kind, .. } => match kind {
                GraphErrorKind::RateLimited => "rate_limited",
                GraphErrorKind::AuthExpired => "auth_expired",
                GraphErrorKind::PermissionDenied => "permission_denied",
                GraphErrorKind::InvalidParameter => "invalid_parameter",
                GraphErrorKind::Other => "external_failure",
            },
            Self::InProgress(_) => "provisioning_in_progress",
            Self::Storage(_) => "storage_error",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::BudgetInsufficient { detail } => format!(
                "Your ad account does not have enough budget to run this campaign ({detail}). \
                 Add funds or raise the account spending limit, then publish again."
            ),
            Self::ExternalFailure { message, .. } => message.clone(),
            Self::Storage(_) => "Something went wrong while saving the campaign.".to_string(),
            other => other.to_string(),
        }
    }
}

pub fn is_budget_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    BUDGET_ERROR_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Sorts a gateway failure into budget-insufficient or generic.
pub fn classify(error: &FacebookApiError) -> ProvisionError {
    let message = error.message();
    let budget_hint = is_budget_message(&message)
        || error.user_detail().map_or(false, is_budget_message);

    if budget_hint {
        ProvisionError::BudgetInsufficient {
            detail: error
                .user_detail()
                .map(str::to_string)
                .unwrap_or_else(|| message.clone()),
        }
    } else {
        ProvisionError::ExternalFailure {
            message,
            code: error.code(),
            kind: error.kind(),
        }
    }
}
