use {anyhow::Result, async_trait::async_trait};

/// Send messages to a chat channel.
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    /// Post `text` to `channel` (login of the channel owner, no `#`).
    async fn say(&self, channel: &str, text: &str) -> Result<()>;
}

/// An inbound chat message with the sender's platform identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Channel login, lowercase, without `#`.
    pub channel: String,
    pub user_id: i64,
    /// Sender login, lowercase.
    pub username: String,
    pub display_name: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(channel: &str, user_id: i64, display_name: &str, text: &str) -> Self {
        Self {
            channel: normalize_channel(channel),
            user_id,
            username: display_name.to_lowercase(),
            display_name: display_name.into(),
            text: text.into(),
        }
    }
}

/// Lowercase a channel name and drop a leading `#`.
pub fn normalize_channel(channel: &str) -> String {
    channel.trim().trim_start_matches('#').to_lowercase()
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    /// Keeps every `say` for later inspection.
    #[derive(Default)]
    pub struct RecordingOutbound {
        said: Mutex<Vec<(String, String)>>,
    }

    impl RecordingOutbound {
        /// All `(channel, text)` pairs sent so far.
        pub fn said(&self) -> Vec<(String, String)> {
            self.said
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Texts sent so far, in order.
        pub fn texts(&self) -> Vec<String> {
            self.said().into_iter().map(|(_, text)| text).collect()
        }
    }

    #[async_trait]
    impl ChatOutbound for RecordingOutbound {
        async fn say(&self, channel: &str, text: &str) -> Result<()> {
            self.said
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }
}
