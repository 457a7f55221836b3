use {
    axum::http::{HeaderMap, header},
    base64::{Engine, engine::general_purpose::STANDARD},
    secrecy::{ExposeSecret, Secret},
    soulxbot_common::{Error, Result},
    subtle::ConstantTimeEq,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
fn safe_equal(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Fresh capability token for the go-live trigger.
pub fn generate_api_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Basic auth ───────────────────────────────────────────────────────────────

/// `user:password` pair from an `Authorization: Basic` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub user: String,
    pub password: String,
}

impl BasicCredentials {
    /// Parse a raw header value. Anything that is not well-formed Basic auth
    /// is a [`Error::BadRequest`].
    pub fn parse(value: &str) -> Result<Self> {
        let malformed = || Error::BadRequest("malformed basic authorization header".into());
        let (scheme, encoded) = value.trim().split_once(' ').ok_or_else(malformed)?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(malformed());
        }
        let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
        let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
        let (user, password) = decoded.split_once(':').ok_or_else(malformed)?;
        Ok(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    fn matches(&self, expected: &str) -> bool {
        safe_equal(&format!("{}:{}", self.user, self.password), expected)
    }
}

/// Check the operator credentials on an admin request.
///
/// No configured operator means every request is refused.
pub fn authorize_operator(headers: &HeaderMap, expected: Option<&Secret<String>>) -> Result<()> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(Error::Unauthorized);
    };
    let value = value
        .to_str()
        .map_err(|_| Error::BadRequest("authorization header is not ascii".into()))?;
    let credentials = BasicCredentials::parse(value)?;

    match expected {
        Some(expected) if credentials.matches(expected.expose_secret()) => Ok(()),
        _ => Err(Error::Unauthorized),
    }
}
