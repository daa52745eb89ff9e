//! # Customer Notifications
//!
//! Email is a side effect of a decision, never part of it. The engine hands
//! an [`EmailRequest`] to an [`EmailNotifier`] after everything else is
//! committed and only logs what comes back.
//!
//! ```text
//!   ChangeRequestProcessor
//!        │  EmailRequest { to, action, cost_change, estimate_link, .. }
//!        ▼
//!   dyn EmailNotifier ──► EmailResponse { success, error }
//!        │
//!        └── failure: warn! and carry on
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use catering_core::Money;

/// What the customer is being told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailAction {
    Approved,
    Rejected,
    RequestMoreInfo,
}

impl EmailAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EmailAction::Approved => "approved",
            EmailAction::Rejected => "rejected",
            EmailAction::RequestMoreInfo => "request_more_info",
        }
    }
}

/// One outbound message about a change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: String,
    pub customer_name: String,
    pub event_name: String,
    pub action: EmailAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_change: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate_link: Option<String>,
}

/// Delivery outcome reported by a notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmailResponse {
    pub fn sent() -> Self {
        EmailResponse {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        EmailResponse {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Outbound email transport.
///
/// Implementations report failure in the response instead of erroring; the
/// caller has already committed its decision.
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn send(&self, request: &EmailRequest) -> EmailResponse;
}

/// Notifier that only writes the message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl EmailNotifier for TracingNotifier {
    async fn send(&self, request: &EmailRequest) -> EmailResponse {
        info!(
            to = %request.to,
            action = request.action.as_str(),
            event = %request.event_name,
            link = ?request.estimate_link,
            "Customer notification"
        );
        EmailResponse::sent()
    }
}

/// Sends and logs the outcome. Never fails.
pub async fn notify_best_effort(
    notifier: &dyn EmailNotifier,
    request: Option<EmailRequest>,
) -> EmailResponse {
    let Some(request) = request else {
        warn!("Customer has no email address; notification skipped");
        return EmailResponse::failed("no recipient address");
    };

    let response = notifier.send(&request).await;
    if !response.success {
        warn!(
            to = %request.to,
            action = request.action.as_str(),
            error = ?response.error,
            "Customer notification failed"
        );
    }
    response
}

// =============================================================================
// Test Doubles
// =============================================================================
