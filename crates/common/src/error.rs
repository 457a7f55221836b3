use http::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure taxonomy shared by the vault, the platform client, persistence and
/// the session/command core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown capability token or bad operator credentials.
    #[error("unauthorized")]
    Unauthorized,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The stored refresh token is missing or was rejected. The owner has to
    /// re-authorize out of band.
    #[error("credentials expired for user {user_id}, re-authorization required")]
    CredentialExpired { user_id: i64 },

    /// Ciphertext failed its integrity check (tampered data or wrong passphrase).
    #[error("credential decryption failed")]
    AuthenticationFailed,

    /// Network failure or 5xx from the platform. Callers may retry later.
    #[error("upstream error: {0}")]
    TransientUpstream(String),

    #[error("persistence error: {0}")]
    Persistence(#[source] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn upstream(what: impl Into<String>) -> Self {
        Self::TransientUpstream(what.into())
    }

    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientUpstream(_))
    }

    /// HTTP status used when this error crosses the gateway boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::CredentialExpired { .. } => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::TransientUpstream(_) => StatusCode::BAD_GATEWAY,
            Self::AuthenticationFailed | Self::Persistence(_) | Self::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error()
            && db.is_unique_violation()
        {
            return Self::Conflict(db.message().to_string());
        }
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row".into()),
            other => Self::Persistence(other),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::TransientUpstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::conflict("live").status_code(), StatusCode::CONFLICT);
        assert_eq!(Error::not_found("q").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::CredentialExpired { user_id: 1 }.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::upstream("503").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::AuthenticationFailed.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn only_upstream_is_transient() {
        assert!(Error::upstream("timeout").is_transient());
        assert!(!Error::Unauthorized.is_transient());
        assert!(!Error::CredentialExpired { user_id: 3 }.is_transient());
    }
}
