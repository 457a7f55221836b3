use {
    anyhow::{Context, Result},
    clap::Subcommand,
    soulxbot_common::Error,
    soulxbot_config::BotConfig,
};

use crate::runtime::Runtime;

#[derive(Subcommand)]
pub enum AuthAction {
    /// Check a broadcaster's stored credentials, refreshing them if needed.
    Check {
        /// Channel login.
        #[arg(long)]
        username: String,
    },
}

pub async fn handle_auth(action: AuthAction, config: BotConfig) -> Result<()> {
    match action {
        AuthAction::Check { username } => check(config, &username).await,
    }
}

async fn check(config: BotConfig, username: &str) -> Result<()> {
    let rt = Runtime::new(config).await?;
    let login = username.trim_start_matches('@').to_lowercase();
    let owner = rt
        .store
        .find_stream_user_by_username(&login)
        .await?
        .with_context(|| format!("{login} is not a registered channel"))?;

    let token = match rt.custodian.access_token(owner.id()).await {
        Ok(token) => token,
        Err(Error::CredentialExpired { .. }) => {
            println!("{login}: credentials expired, re-authorize via /oauth/authorize");
            return Ok(());
        },
        Err(e) => return Err(e.into()),
    };

    match rt.api.validate_token(&token).await? {
        Some(info) => {
            let hours = info.expires_in / 3600;
            let mins = (info.expires_in % 3600) / 60;
            println!(
                "{login}: valid ({hours}h {mins}m remaining), scopes: {}",
                info.scopes.join(" ")
            );
        },
        None => println!("{login}: token was revoked right after validation"),
    }
    Ok(())
}
