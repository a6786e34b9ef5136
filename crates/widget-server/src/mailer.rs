//! Outgoing Mail

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Template plus the data it renders
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "template", content = "data", rename_all = "kebab-case")]
pub enum Template {
    PasswordReset { link: String },
}

impl Template {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PasswordReset { .. } => "password-reset",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub from: String,
    pub to: String,
    pub subject: String,
    #[serde(flatten)]
    pub template: Template,
}

#[derive(Error, Debug)]
#[error("Mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Delivery sink for rendered mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// Records mail in the log instead of delivering it
///
/// Template data may hold capability links, so only the envelope is logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        tracing::info!(
            from = %mail.from,
            to = %mail.to,
            subject = %mail.subject,
            template = mail.template.name(),
            "Mail queued"
        );
        Ok(())
    }
}
