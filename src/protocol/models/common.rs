use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const DEFAULT_MODEL: &str = "gpt-4o-realtime";
pub const DEFAULT_VOICE: &str = "pt-BR-FranciscaNeural";

/// JSON Schema / tool parameter definitions are intentionally untyped.
pub type JsonSchema = Value;

/// Free-form JSON payloads where the protocol is open-ended.
pub type ArbitraryJson = Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    InProgress,
    Completed,
    Incomplete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    #[default]
    Audio,
    Text,
}

/// Voice selection.
///
/// Azure neural voice names (`pt-BR-FranciscaNeural`) travel as an
/// `azure-standard` object; short names (`alloy`) travel as plain strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Voice {
    Id(String),
    AzureStandard { name: String },
}

impl From<String> for Voice {
    fn from(name: String) -> Self {
        if name.contains('-') {
            Self::AzureStandard { name }
        } else {
            Self::Id(name)
        }
    }
}

impl From<&str> for Voice {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(name) | Self::AzureStandard { name } => write!(f, "{name}"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum VoiceObject {
    #[serde(rename = "azure-standard")]
    AzureStandard { name: String },
}

impl Serialize for Voice {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Id(id) => serializer.serialize_str(id),
            Self::AzureStandard { name } => {
                VoiceObject::AzureStandard { name: name.clone() }.serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Voice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        if let Value::String(id) = value {
            return Ok(Self::Id(id));
        }
        let VoiceObject::AzureStandard { name } =
            VoiceObject::deserialize(value).map_err(serde::de::Error::custom)?;
        Ok(Self::AzureStandard { name })
    }
}
