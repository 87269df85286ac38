use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::CodecError;

/// The outer shape of every channel frame.
///
/// `data` defaults to an empty object so frames such as `{"event":"stop_macro"}`
/// still parse.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub event: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Envelope {
    pub fn parse(frame: &str) -> Result<Self, CodecError> {
        serde_json::from_str(frame).map_err(CodecError::Envelope)
    }

    /// Decodes `data` into a tagged message enum whose variants are named by
    /// `event`.
    pub(crate) fn into_tagged<T>(self) -> Result<T, CodecError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut tagged = serde_json::Map::with_capacity(2);
        tagged.insert("event".into(), Value::String(self.event.clone()));
        tagged.insert("data".into(), self.data);
        serde_json::from_value(Value::Object(tagged)).map_err(|source| CodecError::Payload {
            event: self.event,
            source,
        })
    }
}
