use crate::{Error, Filter, Note};
use serde_json::json;

/// Messages sent by clients, received by relays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Event(Note),
    Req {
        sub_id: String,
        filters: Vec<Filter>,
    },
    Close {
        sub_id: String,
    },
}

impl ClientMessage {
    pub fn event(note: Note) -> Self {
        ClientMessage::Event(note)
    }

    pub fn req(sub_id: String, filters: Vec<Filter>) -> Self {
        ClientMessage::Req { sub_id, filters }
    }

    pub fn close(sub_id: String) -> Self {
        ClientMessage::Close { sub_id }
    }

    /// The subscription this message opens or closes, if any
    pub fn sub_id(&self) -> Option<&str> {
        match self {
            Self::Req { sub_id, .. } | Self::Close { sub_id } => Some(sub_id),
            Self::Event(_) => None,
        }
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(match self {
            Self::Event(note) => format!("[\"EVENT\",{}]", note.json()?),
            Self::Req { sub_id, filters } => {
                if filters.is_empty() {
                    format!("[\"REQ\",\"{}\",{{}}]", sub_id)
                } else {
                    let filters_json_str: Result<Vec<String>, Error> =
                        filters.iter().map(|f| f.json()).collect();
                    format!("[\"REQ\",\"{}\",{}]", sub_id, filters_json_str?.join(","))
                }
            }
            Self::Close { sub_id } => json!(["CLOSE", sub_id]).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn req_json() {
        let msg = ClientMessage::req(
            "sub".to_string(),
            vec![Filter::new().kinds([1]).limit(11), Filter::new().kinds([0])],
        );
        assert_eq!(
            msg.to_json().expect("json"),
            r#"["REQ","sub",{"kinds":[1],"limit":11},{"kinds":[0]}]"#
        );
        assert_eq!(msg.sub_id(), Some("sub"));
    }

    #[test]
    fn close_json() {
        let msg = ClientMessage::close("abc".to_string());
        assert_eq!(msg.to_json().expect("json"), r#"["CLOSE","abc"]"#);
    }
}
