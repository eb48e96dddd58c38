use axum::http::Method;
use lettre::message::Mailbox;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use std::sync::Arc;

use crate::{
    config::{Config, SmtpConfig},
    dto::{ReplyRequest, ReplyResponse},
    transport::{ReplyMessage, TransportError, TransportFactory},
};

pub const DEFAULT_REPLY_BODY: &str = "Merci pour votre message. Nous traitons votre demande.";
pub const REQUIRED_FIELDS: [&str; 3] = ["from", "subject", "messageId"];

#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("Method {0} is not allowed")]
    MethodNotAllowed(Method),

    #[error("Invalid or missing API secret")]
    Unauthorized,

    #[error("Missing required fields")]
    BadRequest,

    #[error("SMTP configuration error: {0}")]
    Configuration(String),

    #[error("Failed to deliver reply: {0}")]
    Delivery(#[from] TransportError),
}

/// Request fields after validation.
#[derive(Debug)]
struct Reply {
    to: Option<String>,
    from: String,
    subject: String,
    message_id: String,
    body: Option<String>,
}

impl TryFrom<ReplyRequest> for Reply {
    type Error = ReplyError;

    fn try_from(request: ReplyRequest) -> Result<Self, Self::Error> {
        fn present(field: Option<String>) -> Option<String> {
            field.filter(|value| !value.is_empty())
        }

        match (
            present(request.from),
            present(request.subject),
            present(request.message_id),
        ) {
            (Some(from), Some(subject), Some(message_id)) => Ok(Self {
                to: request.to,
                from,
                subject,
                message_id,
                body: present(request.body),
            }),
            _ => Err(ReplyError::BadRequest),
        }
    }
}

pub struct ReplyService {
    api_secret: String,
    smtp: SmtpConfig,
    transports: Arc<dyn TransportFactory>,
}

impl ReplyService {
    pub fn new(config: Config, transports: Arc<dyn TransportFactory>) -> Self {
        Self {
            api_secret: config.api_secret,
            smtp: config.smtp,
            transports,
        }
    }

    pub fn authorize(&self, provided: Option<&str>) -> Result<(), ReplyError> {
        let matches = provided
            .is_some_and(|secret| bool::from(secret.as_bytes().ct_eq(self.api_secret.as_bytes())));

        if matches {
            Ok(())
        } else {
            Err(ReplyError::Unauthorized)
        }
    }

    pub async fn send_reply(&self, request: ReplyRequest) -> Result<ReplyResponse, ReplyError> {
        let reply = Reply::try_from(request)?;

        let transport = self
            .transports
            .build(&self.smtp)
            .map_err(|e| ReplyError::Configuration(e.details))?;
        let sender: Mailbox = self
            .smtp
            .sender()
            .parse()
            .map_err(|e| ReplyError::Configuration(format!("Invalid sender identity: {e}")))?;

        let message = ReplyMessage {
            message_id: format!("<{}@{}>", Uuid::new_v4(), sender.email.domain()),
            from: sender,
            to: reply.to,
            subject: format!("Re: {}", reply.subject),
            text: reply.body.unwrap_or_else(|| DEFAULT_REPLY_BODY.to_string()),
            in_reply_to: reply.message_id.clone(),
            references: reply.message_id,
        };

        tracing::info!(
            "Sending reply to '{}' about '{}'",
            reply.from,
            message.subject
        );

        transport.send(&message).await?;

        tracing::info!("Reply sent successfully: {}", message.message_id);

        Ok(ReplyResponse {
            success: true,
            message_id: message.message_id,
        })
    }
}
