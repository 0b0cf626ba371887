use std::fmt;

use thiserror::Error;

use crate::args::{self, ParsedArgs};

/// Upper bound on one wire message. Longer payloads are truncated by the
/// sender and never observed past this many bytes by the server.
pub const MAX_MESSAGE_BYTES: usize = 256;

pub const MSG_SHOW: &str = "-show";
pub const MSG_HIDE: &str = "-hide";
pub const MSG_STOP: &str = "-stop";
pub const MSG_PAUSE: &str = "-pause";
pub const MSG_CONTINUE: &str = "-continue";
pub const MSG_COMMAND_PREFIX: &str = "-command";

/// One control message as it travels over the channel: a single unterminated
/// UTF-8 string per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Show,
    Hide,
    Stop,
    Pause,
    Continue,
    Command(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("unrecognized message: {raw:?}")]
    Unrecognized { raw: String },
}

impl ControlMessage {
    pub fn encode(&self) -> String {
        match self {
            ControlMessage::Show => MSG_SHOW.to_owned(),
            ControlMessage::Hide => MSG_HIDE.to_owned(),
            ControlMessage::Stop => MSG_STOP.to_owned(),
            ControlMessage::Pause => MSG_PAUSE.to_owned(),
            ControlMessage::Continue => MSG_CONTINUE.to_owned(),
            ControlMessage::Command(text) => format!("{MSG_COMMAND_PREFIX} {text}"),
        }
    }

    /// Decodes one received message. Command payloads lose one surrounding
    /// layer of matching quotes when present; anything else about them is
    /// kept verbatim.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        match raw {
            "" => Err(ParseError::Empty),
            MSG_SHOW => Ok(ControlMessage::Show),
            MSG_HIDE => Ok(ControlMessage::Hide),
            MSG_STOP => Ok(ControlMessage::Stop),
            MSG_PAUSE => Ok(ControlMessage::Pause),
            MSG_CONTINUE => Ok(ControlMessage::Continue),
            other => match other
                .strip_prefix(MSG_COMMAND_PREFIX)
                .and_then(|rest| rest.strip_prefix(' '))
            {
                Some(text) => Ok(ControlMessage::Command(strip_quote_layer(text).to_owned())),
                None => Err(ParseError::Unrecognized {
                    raw: other.to_owned(),
                }),
            },
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn strip_quote_layer(text: &str) -> &str {
    let mut chars = text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first @ ('"' | '\'')), Some(last)) if first == last => &text[1..text.len() - 1],
        _ => text,
    }
}

/// A decoded message as the serving side reports it. Command payloads are
/// re-tokenized so consumers get both the raw text and the option mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    Show,
    Hidden,
    Stop,
    Continue,
    Pause,
    Command { text: String, args: ParsedArgs },
}

impl ServerEvent {
    pub fn from_message(message: ControlMessage) -> Self {
        match message {
            ControlMessage::Show => ServerEvent::Show,
            ControlMessage::Hide => ServerEvent::Hidden,
            ControlMessage::Stop => ServerEvent::Stop,
            ControlMessage::Continue => ServerEvent::Continue,
            ControlMessage::Pause => ServerEvent::Pause,
            ControlMessage::Command(text) => {
                let args = args::tokenize_line(&text);
                ServerEvent::Command { text, args }
            }
        }
    }
}
