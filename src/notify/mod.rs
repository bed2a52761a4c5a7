//! Notification boundary.
//!
//! The reconciler hands each missed dose to a [`NotificationDispatcher`]
//! and only logs the outcome.  Delivery mechanics (push service, retries)
//! live behind the trait.

use std::fmt;

use tracing::info;

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }

    /// Short status word stored in the notification log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => f.write_str("sent"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Sends one message to one recipient token.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, recipient_token: &str, title: &str, body: &str) -> DeliveryOutcome;
}

/// Writes each notification to the log and reports it as sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, recipient_token: &str, title: &str, body: &str) -> DeliveryOutcome {
        info!(recipient = %mask_token(recipient_token), %title, %body, "notification dispatched");
        DeliveryOutcome::Sent
    }
}

/// Used when `notifications_enabled = false`: every attempt fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledDispatcher;

impl NotificationDispatcher for DisabledDispatcher {
    fn dispatch(&self, _recipient_token: &str, _title: &str, _body: &str) -> DeliveryOutcome {
        DeliveryOutcome::Failed("notifications disabled".into())
    }
}

/// Title of the missed-dose alert sent to a caregiver.
pub fn missed_title(medication: &str, patient_name: &str) -> String {
    format!("Missed Medication Alert: {medication} for {patient_name}")
}

/// Body of the missed-dose alert sent to a caregiver.
pub fn missed_body(medication: &str, patient_name: &str, patient_id: &str) -> String {
    format!(
        "{patient_name} (Patient ID: {patient_id}) has missed their scheduled medication: \
         {medication}. Please follow up accordingly."
    )
}

/// Keep only the last four characters of a push token for logs.
fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("…{tail}")
}
