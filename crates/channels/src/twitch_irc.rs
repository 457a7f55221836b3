//! Twitch chat over IRC-on-WebSocket.
//!
//! A background task owns the socket. It logs in, joins every channel the
//! handle knows about, answers `PING`, forwards parsed chat messages and
//! writes queued outbound lines. On disconnect it reconnects with backoff and
//! joins the same channels again. Lines queued while disconnected are dropped
//! on reconnect rather than replayed late.

use std::{
    collections::{BTreeSet, HashSet},
    ops::ControlFlow,
    sync::Arc,
    time::Duration,
};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    secrecy::{ExposeSecret, Secret},
    tokio::{
        net::TcpStream,
        sync::{
            RwLock,
            mpsc::{
                self,
                error::{TryRecvError, TrySendError},
            },
        },
        task::JoinHandle,
    },
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::{
    irc::IrcMessage,
    outbound::{ChatMessage, ChatOutbound, normalize_channel},
};

type ChatSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
/// Outbound lines buffered for the connection task.
const OUTGOING_CAPACITY: usize = 256;

/// Connection settings for [`TwitchChat::spawn`].
#[derive(Debug, Clone)]
pub struct TwitchChatConfig {
    /// `wss://irc-ws.chat.twitch.tv:443` in production.
    pub url: String,
    /// Login the bot chats as.
    pub login: String,
    /// Chat token, with or without the `oauth:` prefix.
    pub token: Secret<String>,
}

/// Cloneable handle to the chat connection task.
#[derive(Clone)]
pub struct TwitchChat {
    outgoing: mpsc::Sender<String>,
    channels: Arc<RwLock<BTreeSet<String>>>,
}

impl TwitchChat {
    /// Start the connection task. Inbound chat messages are delivered on the
    /// returned receiver.
    pub fn spawn(
        config: TwitchChatConfig,
        channels: impl IntoIterator<Item = String>,
    ) -> (Self, mpsc::UnboundedReceiver<ChatMessage>, JoinHandle<()>) {
        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let channels: BTreeSet<String> = channels.into_iter().map(|c| normalize_channel(&c)).collect();
        let channels = Arc::new(RwLock::new(channels));

        let task = tokio::spawn(run(config, channels.clone(), outgoing_rx, inbound_tx));
        (Self { outgoing, channels }, inbound_rx, task)
    }

    /// Join `channel` now and after every reconnect.
    pub async fn join(&self, channel: &str) -> Result<()> {
        let channel = normalize_channel(channel);
        if self.channels.write().await.insert(channel.clone()) {
            self.send_line(format!("JOIN #{channel}"))?;
        }
        Ok(())
    }

    pub async fn channels(&self) -> Vec<String> {
        self.channels.read().await.iter().cloned().collect()
    }

    fn send_line(&self, line: String) -> Result<()> {
        self.outgoing.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => anyhow::anyhow!("chat outbound queue is full"),
            TrySendError::Closed(_) => anyhow::anyhow!("chat connection task has stopped"),
        })
    }
}

#[async_trait]
impl ChatOutbound for TwitchChat {
    async fn say(&self, channel: &str, text: &str) -> Result<()> {
        // A newline would end the IRC line early.
        let text = text.replace(['\r', '\n'], " ");
        self.send_line(format!("PRIVMSG #{} :{text}", normalize_channel(channel)))
    }
}

async fn run(
    config: TwitchChatConfig,
    channels: Arc<RwLock<BTreeSet<String>>>,
    mut outgoing: mpsc::Receiver<String>,
    inbound: mpsc::UnboundedSender<ChatMessage>,
) {
    let mut backoff = MIN_BACKOFF;
    loop {
        match connect(&config, &channels, &mut outgoing).await {
            Ok((ws, joined)) => {
                backoff = MIN_BACKOFF;
                match pump(ws, joined, &mut outgoing, &inbound).await {
                    Ok(SessionEnd::Shutdown) => {
                        info!("chat connection closed");
                        return;
                    },
                    Ok(SessionEnd::Disconnected) => {
                        warn!(retry_in = ?backoff, "chat connection dropped, reconnecting");
                    },
                    Err(e) => {
                        warn!(error = %e, retry_in = ?backoff, "chat connection lost");
                    },
                }
            },
            Err(e) => {
                warn!(error = %e, retry_in = ?backoff, "chat connection failed");
            },
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

enum SessionEnd {
    /// Every handle and the inbound receiver are gone.
    Shutdown,
    Disconnected,
}

/// Open a socket, log in and join every known channel. Returns the socket
/// and the channels joined on it.
async fn connect(
    config: &TwitchChatConfig,
    channels: &RwLock<BTreeSet<String>>,
    outgoing: &mut mpsc::Receiver<String>,
) -> Result<(ChatSocket, HashSet<String>)> {
    let (mut ws, _) = connect_async(config.url.as_str())
        .await
        .with_context(|| format!("connect to {}", config.url))?;

    let token = config.token.expose_secret();
    let pass = if token.starts_with("oauth:") {
        format!("PASS {token}")
    } else {
        format!("PASS oauth:{token}")
    };
    ws.send(Message::text(pass)).await?;
    ws.send(Message::text(format!("NICK {}", config.login.to_lowercase())))
        .await?;
    ws.send(Message::text("CAP REQ :twitch.tv/tags twitch.tv/commands"))
        .await?;

    // Joins queued meanwhile are already in the channel set.
    let mut stale = 0usize;
    loop {
        match outgoing.try_recv() {
            Ok(_) => stale += 1,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
    if stale > 0 {
        debug!(count = stale, "dropped lines queued while disconnected");
    }

    let mut joined = HashSet::new();
    for channel in channels.read().await.iter() {
        ws.send(Message::text(format!("JOIN #{channel}"))).await?;
        joined.insert(channel.clone());
    }
    info!(login = %config.login, channels = joined.len(), "connected to chat");
    Ok((ws, joined))
}

async fn pump(
    mut ws: ChatSocket,
    mut joined: HashSet<String>,
    outgoing: &mut mpsc::Receiver<String>,
    inbound: &mpsc::UnboundedSender<ChatMessage>,
) -> Result<SessionEnd> {
    loop {
        tokio::select! {
            line = outgoing.recv() => {
                let Some(line) = line else {
                    let _ = ws.close(None).await;
                    return Ok(SessionEnd::Shutdown);
                };
                if let Some(channel) = line.strip_prefix("JOIN #")
                    && !joined.insert(channel.to_string())
                {
                    continue;
                }
                ws.send(Message::text(line)).await?;
            }
            frame = ws.next() => {
                let Some(frame) = frame else {
                    return Ok(SessionEnd::Disconnected);
                };
                match frame? {
                    Message::Text(text) => {
                        for line in text.as_str().split("\r\n").filter(|l| !l.is_empty()) {
                            if handle_line(line, &mut ws, inbound).await?.is_break() {
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                    },
                    Message::Ping(payload) => ws.send(Message::Pong(payload)).await?,
                    Message::Close(frame) => {
                        debug!(?frame, "chat server closed the socket");
                        return Ok(SessionEnd::Disconnected);
                    },
                    _ => {},
                }
            }
        }
    }
}

async fn handle_line(
    line: &str,
    ws: &mut ChatSocket,
    inbound: &mpsc::UnboundedSender<ChatMessage>,
) -> Result<ControlFlow<()>> {
    let Some(msg) = IrcMessage::parse(line) else {
        return Ok(ControlFlow::Continue(()));
    };
    match msg.command.as_str() {
        "PING" => {
            let server = msg.params.first().cloned().unwrap_or_default();
            ws.send(Message::text(format!("PONG :{server}"))).await?;
        },
        "RECONNECT" => anyhow::bail!("server requested reconnect"),
        "NOTICE" => {
            let text = msg.params.last().map(String::as_str).unwrap_or_default();
            if text.contains("Login authentication failed") {
                anyhow::bail!("chat login rejected");
            }
            debug!(notice = text, "chat notice");
        },
        "PRIVMSG" => {
            if let Some(chat) = msg.into_chat_message()
                && inbound.send(chat).is_err()
            {
                return Ok(ControlFlow::Break(()));
            }
        },
        _ => {},
    }
    Ok(ControlFlow::Continue(()))
}
