//! IRC line parsing with IRCv3 message tags.

use std::collections::HashMap;

use crate::outbound::{ChatMessage, normalize_channel};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse one line. Returns `None` for blank or command-less input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut msg = Self::default();

        if let Some(tagged) = rest.strip_prefix('@') {
            let (tags, tail) = tagged.split_once(' ')?;
            msg.tags = tags
                .split(';')
                .filter(|t| !t.is_empty())
                .map(|t| match t.split_once('=') {
                    Some((k, v)) => (k.to_string(), unescape_tag(v)),
                    None => (t.to_string(), String::new()),
                })
                .collect();
            rest = tail;
        }

        rest = rest.trim_start();
        if let Some(prefixed) = rest.strip_prefix(':') {
            let (prefix, tail) = prefixed.split_once(' ')?;
            msg.prefix = Some(prefix.to_string());
            rest = tail.trim_start();
        }

        let (command, mut params) = match rest.split_once(' ') {
            Some((command, params)) => (command, params),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }
        msg.command = command.to_ascii_uppercase();

        loop {
            params = params.trim_start_matches(' ');
            if params.is_empty() {
                break;
            }
            if let Some(trailing) = params.strip_prefix(':') {
                msg.params.push(trailing.to_string());
                break;
            }
            match params.split_once(' ') {
                Some((param, tail)) => {
                    msg.params.push(param.to_string());
                    params = tail;
                },
                None => {
                    msg.params.push(params.to_string());
                    break;
                },
            }
        }

        Some(msg)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Nick part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .map(|p| p.split_once('!').map_or(p, |(nick, _)| nick))
    }

    /// Convert a tagged `PRIVMSG` into a [`ChatMessage`]. Anything else, or a
    /// message without a numeric `user-id` tag, yields `None`.
    pub fn into_chat_message(self) -> Option<ChatMessage> {
        if self.command != "PRIVMSG" || self.params.len() < 2 {
            return None;
        }
        let user_id = self.tag("user-id")?.parse().ok()?;
        let username = self.nick()?.to_lowercase();
        let display_name = match self.tag("display-name") {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => username.clone(),
        };
        Some(ChatMessage {
            channel: normalize_channel(&self.params[0]),
            user_id,
            username,
            display_name,
            text: self.params[1].clone(),
        })
    }
}

fn unescape_tag(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {},
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVMSG: &str = "@badge-info=;badges=broadcaster/1;color=#1E90FF;display-name=SoulxBurn;\
        emotes=;id=b34ccfc7;mod=0;room-id=1337;tmi-sent-ts=1507246572675;user-id=1337;user-type= \
        :soulxburn!soulxburn@soulxburn.tmi.twitch.tv PRIVMSG #soulxburn :!first  is mine\r\n";

    #[test]
    fn parses_tagged_privmsg() {
        let msg = IrcMessage::parse(PRIVMSG).unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.tag("display-name"), Some("SoulxBurn"));
        assert_eq!(msg.tag("user-type"), Some(""));
        assert_eq!(msg.nick(), Some("soulxburn"));
        assert_eq!(msg.params, ["#soulxburn", "!first  is mine"]);

        let chat = msg.into_chat_message().unwrap();
        assert_eq!(chat.channel, "soulxburn");
        assert_eq!(chat.user_id, 1337);
        assert_eq!(chat.username, "soulxburn");
        assert_eq!(chat.display_name, "SoulxBurn");
        assert_eq!(chat.text, "!first  is mine");
    }

    #[test]
    fn parses_ping_and_numeric_replies() {
        let ping = IrcMessage::parse("PING :tmi.twitch.tv").unwrap();
        assert_eq!(ping.command, "PING");
        assert_eq!(ping.params, ["tmi.twitch.tv"]);
        assert!(ping.prefix.is_none());

        let welcome = IrcMessage::parse(":tmi.twitch.tv 001 soulxbot :Welcome, GLHF!").unwrap();
        assert_eq!(welcome.command, "001");
        assert_eq!(welcome.params, ["soulxbot", "Welcome, GLHF!"]);
    }

    #[test]
    fn unescapes_tag_values() {
        let msg =
            IrcMessage::parse(r"@system-msg=5\sraiders\:\shi\\ :tmi.twitch.tv USERNOTICE #c").unwrap();
        assert_eq!(msg.tag("system-msg"), Some(r"5 raiders; hi\"));
    }

    #[test]
    fn empty_display_name_falls_back_to_login() {
        let msg = IrcMessage::parse(
            "@display-name=;user-id=42 :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #chan :hi",
        )
        .unwrap();
        let chat = msg.into_chat_message().unwrap();
        assert_eq!(chat.display_name, "viewer");
    }

    #[test]
    fn untagged_or_non_privmsg_is_not_chat() {
        let untagged =
            IrcMessage::parse(":viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #chan :hi").unwrap();
        assert!(untagged.into_chat_message().is_none());

        let join = IrcMessage::parse(":viewer!viewer@viewer.tmi.twitch.tv JOIN #chan").unwrap();
        assert!(join.into_chat_message().is_none());
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert!(IrcMessage::parse("").is_none());
        assert!(IrcMessage::parse("\r\n").is_none());
        assert!(IrcMessage::parse("@a=b").is_none());
    }
}
