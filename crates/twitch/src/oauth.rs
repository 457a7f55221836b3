use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::RngCore,
    soulxbot_common::{Error, Result},
    url::Url,
};

/// Generate a random `state` parameter for the authorization redirect.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the URL a broadcaster is sent to in order to grant the bot access.
pub fn authorize_url(
    oauth_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/authorize", oauth_url.trim_end_matches('/')))
        .map_err(|e| Error::Config(format!("invalid oauth url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &scopes.join(" "))
        .append_pair("state", state);
    Ok(url)
}
