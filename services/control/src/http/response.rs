use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use playback_protocol::HttpErrorEnvelope;
use std::fmt::Display;

pub type HttpResponse = Response;

pub(crate) fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> HttpResponse {
    (
        status,
        Json(HttpErrorEnvelope {
            code: code.into(),
            message: message.into(),
            details: None,
        }),
    )
        .into_response()
}

pub fn internal_error(err: impl Display) -> HttpResponse {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

pub fn not_found(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::SERVICE_UNAVAILABLE, code, message)
}
