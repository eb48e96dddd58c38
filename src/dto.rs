use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Inbound reply request. Every field is optional at the wire level so that
/// missing ones surface as a validation error instead of a JSON rejection.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    /// Recipient(s) of the reply, passed to the transport as-is
    pub to: Option<String>,
    /// Sender of the original message
    pub from: Option<String>,
    /// Subject of the original message
    pub subject: Option<String>,
    /// `Message-ID` of the original message, used for threading
    pub message_id: Option<String>,
    /// Reply text
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub success: bool,
    /// `Message-ID` of the sent reply
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ErrorResponse {
    Message {
        error: String,
    },
    MissingFields {
        error: String,
        required: Vec<String>,
    },
    Configuration {
        error: String,
        details: String,
    },
    Delivery {
        error: String,
        details: String,
        /// Raw SMTP server reply, `null` when the relay never answered
        #[serde(rename = "smtpError")]
        smtp_error: Option<String>,
    },
}
