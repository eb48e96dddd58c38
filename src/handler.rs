use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use axum_macros::debug_handler;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use utoipa::OpenApi;

use std::sync::Arc;

use crate::{
    dto::{ErrorResponse, ReplyRequest, ReplyResponse},
    service::{REQUIRED_FIELDS, ReplyError, ReplyService},
};

pub const REPLY_PATH: &str = "/api/auto-reply-jak";
pub const SECRET_HEADER: &str = "x-api-secret";

#[derive(OpenApi)]
#[openapi(
    paths(auto_reply),
    components(schemas(ReplyRequest, ReplyResponse, ErrorResponse)),
    tags(
        (name = "auto-reply", description = "Automatic email replies")
    )
)]
pub struct ApiDoc;

pub fn router(service: Arc<ReplyService>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route(REPLY_PATH, any(auto_reply))
        .route("/api-doc/openapi.json", get(openapi))
        .with_state(service)
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, x-api-secret"),
        ))
        .layer(TraceLayer::new_for_http())
}

#[utoipa::path(
    post,
    path = "/api/auto-reply-jak",
    request_body = ReplyRequest,
    params(
        ("x-api-secret" = String, Header, description = "Shared API secret")
    ),
    responses(
        (status = 200, description = "Reply sent", body = ReplyResponse),
        (status = 400, description = "Missing required fields", body = ErrorResponse),
        (status = 403, description = "Invalid API secret", body = ErrorResponse),
        (status = 405, description = "Method not allowed", body = ErrorResponse),
        (status = 500, description = "SMTP configuration or delivery failure", body = ErrorResponse)
    ),
    tag = "auto-reply"
)]
#[debug_handler]
pub async fn auto_reply(
    State(service): State<Arc<ReplyService>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match dispatch(&service, method, &headers, &body).await {
        Ok(r) => (StatusCode::OK, Json(r)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn dispatch(
    service: &ReplyService,
    method: Method,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<ReplyResponse, ReplyError> {
    if method != Method::POST {
        return Err(ReplyError::MethodNotAllowed(method));
    }

    let secret = headers
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    service.authorize(secret)?;

    // Anything that is not a JSON object of strings counts as missing fields
    let request = if is_json(headers) {
        serde_json::from_slice::<ReplyRequest>(body).unwrap_or_else(|e| {
            tracing::warn!("Unreadable reply request body: {e}");
            ReplyRequest::default()
        })
    } else {
        tracing::warn!("Reply request body is not declared as JSON, ignoring it");
        ReplyRequest::default()
    };

    service.send_reply(request).await
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

impl IntoResponse for ReplyError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::MethodNotAllowed(method) => {
                tracing::warn!("Method not allowed: {method}");
                (
                    StatusCode::METHOD_NOT_ALLOWED,
                    ErrorResponse::Message {
                        error: "Méthode non autorisée".to_string(),
                    },
                )
            }
            Self::Unauthorized => {
                tracing::error!("Authentication failed: invalid API secret");
                (
                    StatusCode::FORBIDDEN,
                    ErrorResponse::Message {
                        error: "Non autorisé".to_string(),
                    },
                )
            }
            Self::BadRequest => {
                tracing::error!("Missing fields in reply request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::MissingFields {
                        error: "Champs obligatoires manquants".to_string(),
                        required: REQUIRED_FIELDS.iter().map(ToString::to_string).collect(),
                    },
                )
            }
            Self::Configuration(details) => {
                tracing::error!("SMTP configuration error: {details}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::Configuration {
                        error: "Erreur de configuration du serveur mail".to_string(),
                        details,
                    },
                )
            }
            Self::Delivery(e) => {
                tracing::error!("Failed to send reply: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::Delivery {
                        error: "Échec de l'envoi du email".to_string(),
                        details: e.details,
                        smtp_error: e.smtp_response,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[debug_handler]
pub async fn health_check() -> Response {
    (StatusCode::OK, "Hello from auto-reply service!").into_response()
}

#[debug_handler]
pub async fn openapi() -> Response {
    (StatusCode::OK, Json(ApiDoc::openapi())).into_response()
}
