use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    soulxbot_common::Error,
    tracing::error,
};

/// [`Error`] at the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let message = match &self.0 {
            Error::CredentialExpired { .. } => {
                "credentials expired, re-authorize via /oauth/authorize".to_string()
            },
            _ if status.is_server_error() && status != StatusCode::BAD_GATEWAY => {
                error!(error = %self.0, "request failed");
                "internal error".to_string()
            },
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status() {
        let cases = [
            (Error::Unauthorized, StatusCode::UNAUTHORIZED),
            (Error::conflict("open"), StatusCode::CONFLICT),
            (Error::not_found("q"), StatusCode::NOT_FOUND),
            (Error::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (Error::CredentialExpired { user_id: 1 }, StatusCode::UNAUTHORIZED),
            (Error::upstream("503"), StatusCode::BAD_GATEWAY),
            (Error::AuthenticationFailed, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }
}
