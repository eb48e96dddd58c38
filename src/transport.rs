use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, Mailboxes, header},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        response::Code,
    },
};

use crate::config::SmtpConfig;

/// A reply ready for submission. Recipients are kept exactly as the caller
/// sent them; resolving them is the transport's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub from: Mailbox,
    pub to: Option<String>,
    pub subject: String,
    pub text: String,
    pub in_reply_to: String,
    pub references: String,
    pub message_id: String,
}

#[derive(Debug, thiserror::Error)]
#[error("{details}")]
pub struct TransportError {
    pub details: String,
    /// Raw SMTP server reply, when the server answered at all
    pub smtp_response: Option<String>,
}

impl TransportError {
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            details: details.into(),
            smtp_response: None,
        }
    }

    /// Failure reported by the relay. The server reply (code and text) is
    /// kept verbatim when a status code came back.
    fn from_smtp(details: String, status: Option<Code>) -> Self {
        Self {
            smtp_response: status.map(|_| details.clone()),
            details,
        }
    }
}

impl From<lettre::transport::smtp::Error> for TransportError {
    fn from(e: lettre::transport::smtp::Error) -> Self {
        Self::from_smtp(e.to_string(), e.status())
    }
}

impl From<lettre::error::Error> for TransportError {
    fn from(e: lettre::error::Error) -> Self {
        Self::new(format!("Failed to build email message: {e}"))
    }
}

impl From<lettre::address::AddressError> for TransportError {
    fn from(e: lettre::address::AddressError) -> Self {
        Self::new(format!("Invalid recipient address: {e}"))
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, reply: &ReplyMessage) -> Result<(), TransportError>;
}

pub trait TransportFactory: Send + Sync {
    fn build(&self, config: &SmtpConfig) -> Result<Box<dyn MailTransport>, TransportError>;
}

/// Builds lettre SMTP transports for the configured relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpTransportFactory;

impl TransportFactory for SmtpTransportFactory {
    fn build(&self, config: &SmtpConfig) -> Result<Box<dyn MailTransport>, TransportError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let builder = if config.implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            let tls = TlsParameters::new(config.host.clone())?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .tls(Tls::Opportunistic(tls))
        };

        let mailer = builder
            .port(config.port)
            .credentials(creds)
            .timeout(Some(config.timeout))
            .build();

        tracing::debug!(
            "Built SMTP transport for {}:{} (implicit TLS: {})",
            config.host,
            config.port,
            config.implicit_tls()
        );

        Ok(Box::new(SmtpMailer { mailer }))
    }
}

struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, reply: &ReplyMessage) -> Result<(), TransportError> {
        let email = to_message(reply)?;
        let response = self.mailer.send(email).await?;

        tracing::debug!("SMTP relay accepted {} ({})", reply.message_id, response.code());
        Ok(())
    }
}

/// Assembles the wire message. A reply without recipients fails here, the
/// same way the relay would refuse it.
pub fn to_message(reply: &ReplyMessage) -> Result<Message, TransportError> {
    let mut builder = Message::builder()
        .from(reply.from.clone())
        .subject(reply.subject.clone())
        .in_reply_to(reply.in_reply_to.clone())
        .references(reply.references.clone())
        .message_id(Some(reply.message_id.clone()))
        .header(header::ContentType::TEXT_PLAIN);

    if let Some(to) = reply.to.as_deref().filter(|to| !to.trim().is_empty()) {
        let recipients: Mailboxes = to.parse()?;
        for recipient in recipients {
            builder = builder.to(recipient);
        }
    }

    Ok(builder.body(reply.text.clone())?)
}

#[cfg(test)]
pub mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Transport double that keeps every reply it is handed.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingFactory {
        pub sent: Arc<Mutex<Vec<ReplyMessage>>>,
        pub builds: Arc<Mutex<usize>>,
        pub fail_build: Option<String>,
        pub fail_send: Option<(String, Option<String>)>,
    }

    impl RecordingFactory {
        pub fn failing_build(details: &str) -> Self {
            Self {
                fail_build: Some(details.to_string()),
                ..Self::default()
            }
        }

        pub fn failing_send(details: &str, smtp_response: Option<&str>) -> Self {
            Self {
                fail_send: Some((details.to_string(), smtp_response.map(str::to_string))),
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<ReplyMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn build_count(&self) -> usize {
            *self.builds.lock().unwrap()
        }
    }

    struct RecordingTransport {
        sent: Arc<Mutex<Vec<ReplyMessage>>>,
        fail_send: Option<(String, Option<String>)>,
    }

    impl TransportFactory for RecordingFactory {
        fn build(&self, _config: &SmtpConfig) -> Result<Box<dyn MailTransport>, TransportError> {
            *self.builds.lock().unwrap() += 1;
            if let Some(details) = &self.fail_build {
                return Err(TransportError::new(details.clone()));
            }
            Ok(Box::new(RecordingTransport {
                sent: self.sent.clone(),
                fail_send: self.fail_send.clone(),
            }))
        }
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, reply: &ReplyMessage) -> Result<(), TransportError> {
            if let Some((details, smtp_response)) = &self.fail_send {
                return Err(TransportError {
                    details: details.clone(),
                    smtp_response: smtp_response.clone(),
                });
            }
            self.sent.lock().unwrap().push(reply.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lettre::transport::smtp::response::{Category, Detail, Severity};

    use super::*;

    fn smtp_config(port: u16) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".to_string(),
            port,
            username: "bot".to_string(),
            password: "hunter2".to_string(),
            from_name: "Support".to_string(),
            from_email: "support@example.com".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    fn reply(to: Option<&str>) -> ReplyMessage {
        ReplyMessage {
            from: "\"Support\" <support@example.com>".parse().unwrap(),
            to: to.map(str::to_string),
            subject: "Re: Hello".to_string(),
            text: "Hi".to_string(),
            in_reply_to: "<123@x.com>".to_string(),
            references: "<123@x.com>".to_string(),
            message_id: "<abc@example.com>".to_string(),
        }
    }

    #[test]
    fn message_carries_threading_headers() {
        let email = to_message(&reply(Some("a@x.com"))).unwrap();
        let formatted = String::from_utf8(email.formatted()).unwrap();

        assert!(formatted.contains("Subject: Re: Hello\r\n"));
        assert!(formatted.contains("In-Reply-To: <123@x.com>\r\n"));
        assert!(formatted.contains("References: <123@x.com>\r\n"));
        assert!(formatted.contains("Message-ID: <abc@example.com>\r\n"));
        assert!(formatted.contains("To: a@x.com\r\n"));
        assert!(formatted.contains("\r\n\r\nHi"));
    }

    #[test]
    fn message_accepts_recipient_list() {
        let email = to_message(&reply(Some("a@x.com, b@y.com"))).unwrap();

        assert_eq!(email.envelope().to().len(), 2);
    }

    #[test]
    fn message_without_recipient_is_refused() {
        assert!(to_message(&reply(None)).is_err());
        assert!(to_message(&reply(Some(""))).is_err());
    }

    #[test]
    fn malformed_recipient_is_refused() {
        let err = to_message(&reply(Some("not an address"))).unwrap_err();

        assert!(err.details.starts_with("Invalid recipient address"));
        assert!(err.smtp_response.is_none());
    }

    #[test]
    fn relay_rejection_keeps_server_reply() {
        let code = Code::new(
            Severity::PermanentNegativeCompletion,
            Category::MailSystem,
            Detail::Zero,
        );
        let details = "permanent error (550): mailbox unavailable".to_string();

        let err = TransportError::from_smtp(details.clone(), Some(code));

        assert_eq!(err.details, details);
        assert_eq!(err.smtp_response.as_deref(), Some(details.as_str()));
    }

    #[test]
    fn connection_failure_has_no_server_reply() {
        let err = TransportError::from_smtp("Connection error: refused".to_string(), None);

        assert!(err.smtp_response.is_none());
    }

    #[tokio::test]
    async fn builds_transport_for_implicit_and_negotiated_tls() {
        let factory = SmtpTransportFactory;

        assert!(factory.build(&smtp_config(465)).is_ok());
        assert!(factory.build(&smtp_config(587)).is_ok());
    }
}
