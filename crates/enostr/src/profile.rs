use serde_json::{Map, Value};

/// The raw kind-0 metadata object. Unknown keys are kept so nothing is lost
/// when a newer client writes fields we don't know about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState(Map<String, Value>);

impl ProfileState {
    pub fn new(value: Map<String, Value>) -> Self {
        Self(value)
    }

    /// Parse note contents. Anything that isn't a JSON object is `None`.
    pub fn from_note_contents(contents: &str) -> Option<Self> {
        match serde_json::from_str(contents) {
            Ok(Value::Object(data)) => Some(Self::new(data)),
            _ => None,
        }
    }

    /// Empty strings count as missing
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_json(&self) -> Result<String, crate::Error> {
        serde_json::to_string(&self.0).map_err(Into::into)
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    #[inline]
    pub fn display_name(&self) -> Option<&str> {
        self.get_str("display_name")
    }

    #[inline]
    pub fn nip05(&self) -> Option<&str> {
        self.get_str("nip05")
    }

    #[inline]
    pub fn about(&self) -> Option<&str> {
        self.get_str("about")
    }

    #[inline]
    pub fn picture(&self) -> Option<&str> {
        self.get_str("picture")
    }
}
