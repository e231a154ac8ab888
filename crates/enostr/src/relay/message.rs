use crate::{Error, Note, Result};
use serde_json::Value;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CommandResult {
    pub event_id: String,
    pub status: bool,
    pub message: String,
}

/// Messages sent by relays, received by clients
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RelayMessage {
    OK(CommandResult),
    Eose(String),
    Event(String, Note),
    Notice(String),
    Closed(String, String),
}

fn str_at(arr: &[Value], i: usize, what: &str) -> Result<String> {
    arr.get(i)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| Error::DecodeFailed(format!("missing {what}")))
}

impl RelayMessage {
    pub fn eose(subid: impl Into<String>) -> Self {
        RelayMessage::Eose(subid.into())
    }

    pub fn notice(msg: impl Into<String>) -> Self {
        RelayMessage::Notice(msg.into())
    }

    pub fn closed(subid: impl Into<String>, reason: impl Into<String>) -> Self {
        RelayMessage::Closed(subid.into(), reason.into())
    }

    pub fn ok(event_id: impl Into<String>, status: bool, message: impl Into<String>) -> Self {
        RelayMessage::OK(CommandResult {
            event_id: event_id.into(),
            status,
            message: message.into(),
        })
    }

    pub fn event(sub_id: impl Into<String>, note: Note) -> Self {
        RelayMessage::Event(sub_id.into(), note)
    }

    /// The subscription id this message refers to, if any
    pub fn sub_id(&self) -> Option<&str> {
        match self {
            RelayMessage::Eose(s) | RelayMessage::Event(s, _) | RelayMessage::Closed(s, _) => {
                Some(s)
            }
            RelayMessage::OK(_) | RelayMessage::Notice(_) => None,
        }
    }

    #[profiling::function]
    pub fn from_json(msg: &str) -> Result<RelayMessage> {
        if msg.is_empty() {
            return Err(Error::Empty);
        }

        let arr: Vec<Value> = serde_json::from_str(msg)
            .map_err(|_| Error::DecodeFailed(format!("not a json array: '{msg}'")))?;

        let Some(tag) = arr.first().and_then(|v| v.as_str()) else {
            return Err(Error::DecodeFailed("missing message type".into()));
        };

        match tag {
            // ["NOTICE", <message>]
            "NOTICE" => Ok(Self::notice(str_at(&arr, 1, "notice")?)),

            // ["EVENT", <subscription id>, <event JSON>]
            "EVENT" => {
                let sub_id = str_at(&arr, 1, "subscription id")?;
                let Some(ev) = arr.get(2) else {
                    return Err(Error::DecodeFailed("Invalid EVENT format".into()));
                };
                let note: Note = serde_json::from_value(ev.clone())
                    .map_err(|e| Error::DecodeFailed(format!("bad event: {e}")))?;
                Ok(Self::event(sub_id, note))
            }

            // ["EOSE", <subscription_id>]
            "EOSE" => Ok(Self::eose(str_at(&arr, 1, "subscription id")?)),

            // ["CLOSED", <subscription_id>, <message>]
            "CLOSED" => {
                let sub_id = str_at(&arr, 1, "subscription id")?;
                let reason = arr
                    .get(2)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned();
                Ok(Self::closed(sub_id, reason))
            }

            // ["OK", <event_id>, <true|false>, <message>]
            "OK" => {
                let event_id = str_at(&arr, 1, "event id")?;
                let Some(status) = arr.get(2).and_then(|v| v.as_bool()) else {
                    return Err(Error::DecodeFailed("bad boolean value".into()));
                };
                let message = arr
                    .get(3)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_owned();
                Ok(Self::ok(event_id, status, message))
            }

            other => Err(Error::DecodeFailed(format!(
                "unrecognized message type: '{other}'"
            ))),
        }
    }
}
