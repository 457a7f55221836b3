use {
    anyhow::{Context, Result},
    soulxbot_common::time::now_ms,
    soulxbot_store::{FeatureFlags, Store, StreamUser},
};

async fn registered(store: &Store, username: &str) -> Result<StreamUser> {
    let login = username.trim_start_matches('@').to_lowercase();
    store
        .find_stream_user_by_username(&login)
        .await?
        .with_context(|| format!("{login} is not a registered channel"))
}

/// Bar `username` from the first race in `owner`'s channel, or everywhere.
pub async fn exclude(store: &Store, username: &str, owner: Option<&str>) -> Result<String> {
    let owner = match owner {
        Some(owner) => Some(registered(store, owner).await?),
        None => None,
    };
    let scope = owner
        .as_ref()
        .map_or_else(|| "every channel".to_string(), |o| o.username().to_string());
    let added = store
        .add_exclusion(owner.as_ref().map(StreamUser::id), username)
        .await?;
    let username = username.to_lowercase();
    Ok(if added {
        format!("{username} excluded from first in {scope}")
    } else {
        format!("{username} was already excluded in {scope}")
    })
}

/// Exclusion entries of one channel, or the global ones.
pub async fn exclusions(store: &Store, owner: Option<&str>) -> Result<Vec<String>> {
    let owner_id = match owner {
        Some(owner) => Some(registered(store, owner).await?.id()),
        None => None,
    };
    Ok(store
        .list_exclusions(owner_id)
        .await?
        .into_iter()
        .map(|e| e.username)
        .collect())
}

/// Flag changes requested on the command line; `None` keeps the current
/// value.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlagUpdate {
    pub first: Option<bool>,
    pub qotd: Option<bool>,
    pub bot_disabled: Option<bool>,
}

pub async fn set_flags(store: &Store, username: &str, update: FlagUpdate) -> Result<FeatureFlags> {
    let owner = registered(store, username).await?;
    let current = owner.config.flags;
    let flags = FeatureFlags {
        first_enabled: update.first.unwrap_or(current.first_enabled),
        qotd_enabled: update.qotd.unwrap_or(current.qotd_enabled),
        bot_disabled: update.bot_disabled.unwrap_or(current.bot_disabled),
    };
    store.set_flags(owner.id(), flags, now_ms()).await?;
    Ok(flags)
}
