use thiserror::Error;
use tracing::{info, warn};

use crate::models::participant::{Participant, Role};

#[derive(Debug, Error)]
#[error("mail dispatch failed: {0}")]
pub struct MailError(pub String);

/// Outbound mail boundary. The real transport lives outside this service;
/// the default sink just records the dispatch in the log stream.
pub trait Mailer: Send + Sync {
    fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), MailError> {
        info!(to, subject, "email dispatched");
        Ok(())
    }
}

pub fn send_welcome(mailer: &dyn Mailer, participant: &Participant) {
    let subject = format!("Welcome to MealBridge, {}!", participant.name);
    let next_step = match participant.role {
        Role::Requester => "Submit your verification documents to start raising requests.",
        Role::Donor => "Browse open requests and accept one to donate surplus food.",
        Role::Volunteer => "You will be matched to deliveries near you automatically.",
        Role::Coordinator => "Review pending requester verifications from your dashboard.",
    };
    let body = format!(
        "Hi {},\n\nThank you for joining MealBridge as a {:?}.\n{}\n",
        participant.name, participant.role, next_step
    );

    if let Err(err) = mailer.send(&participant.email, &subject, &body) {
        warn!(error = %err, participant_id = %participant.id, "welcome email failed");
    }
}

pub fn send_verification_approved(mailer: &dyn Mailer, participant: &Participant) {
    let organization = participant.organization.as_deref().unwrap_or("your organization");
    let subject = "Your MealBridge verification was approved".to_string();
    let body = format!(
        "Hi {},\n\n{} is now verified and can raise food requests.\n",
        participant.name, organization
    );

    if let Err(err) = mailer.send(&participant.email, &subject, &body) {
        warn!(error = %err, participant_id = %participant.id, "verification email failed");
    }
}
