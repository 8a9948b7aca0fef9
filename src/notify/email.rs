use std::time::Duration;

use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message as Email};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{alert_text, Notifier};
use crate::config::SmtpCfg;
use crate::domain::{ClassificationResult, Message};

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSender {
    pub fn from_cfg(cfg: &SmtpCfg, timeout: Duration) -> Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .timeout(Some(timeout))
            .build();

        let from = cfg.from.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = cfg.to.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Self { mailer, from, to })
    }
}

pub fn subject_for(verdict: &ClassificationResult) -> String {
    format!(
        "{} detected: {} ({:.2})",
        verdict.classification.as_str(),
        verdict.token,
        verdict.confidence
    )
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    async fn notify(&self, msg: &Message, verdict: &ClassificationResult) -> Result<()> {
        let email = Email::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject_for(verdict))
            .header(header::ContentType::TEXT_PLAIN)
            .body(alert_text(msg, verdict))
            .context("build email")?;

        self.mailer.send(email).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
