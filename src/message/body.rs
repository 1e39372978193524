use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Opaque payload plus its declared content type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(with = "bytes_serde")]
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl MessageBody {
    pub const JSON: &'static str = "application/json";
    pub const BITCODE: &'static str = "application/x-bitcode";
    pub const TEXT: &'static str = "text/plain";

    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(value.into().into_bytes(), Self::TEXT)
    }

    /// Serialize a value as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(value)?, Self::JSON))
    }

    /// Serialize a value with bitcode (fast binary).
    pub fn bitcode<T: Serialize>(value: &T) -> Result<Self, bitcode::Error> {
        Ok(Self::new(bitcode::serialize(value)?, Self::BITCODE))
    }

    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.bytes)
    }

    pub fn decode_bitcode<T: DeserializeOwned>(&self) -> Result<T, bitcode::Error> {
        bitcode::deserialize(&self.bytes)
    }

    /// The payload as a string, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Body bytes are stored as base64 text when a message is serialized.
mod bytes_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
