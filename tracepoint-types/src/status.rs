use std::fmt;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Status code shared by network protection and every ASR rule.
///
/// The agent reports `0`, `1`, `2` or `6`; anything else is carried through as `Other`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ProtectionStatus {
    Disabled,
    Block,
    Audit,
    Off,
    Other(i64),
}

impl ProtectionStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Disabled,
            1 => Self::Block,
            2 => Self::Audit,
            6 => Self::Off,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Disabled => 0,
            Self::Block => 1,
            Self::Audit => 2,
            Self::Off => 6,
            Self::Other(code) => code,
        }
    }

    /// Dashboard wording for the code.
    pub fn label(self) -> &'static str {
        match self {
            Self::Disabled => "N/A",
            Self::Block => "Block",
            Self::Audit => "Audit",
            Self::Off => "Off",
            Self::Other(_) => "Unknown",
        }
    }
}

impl fmt::Display for ProtectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

impl Serialize for ProtectionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCode {
    Int(i64),
    Float(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for ProtectionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawCode::deserialize(deserializer)? {
            RawCode::Int(code) => Ok(Self::from_code(code)),
            RawCode::Float(code) if code.fract() == 0.0 => Ok(Self::from_code(code as i64)),
            RawCode::Float(code) => Err(D::Error::custom(format!(
                "status code {code} is not an integer"
            ))),
            RawCode::Text(text) => text
                .trim()
                .parse::<i64>()
                .map(Self::from_code)
                .map_err(|e| D::Error::custom(format!("status code {text:?}: {e}"))),
        }
    }
}

/// Per-device ASR rule states keyed by rule GUID, in the order the agent wrote them.
///
/// The table column holds a JSON-encoded string; both the encoded form and a plain
/// object are accepted. A rule whose value is `null` is kept as `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AsrRules(IndexMap<String, Option<ProtectionStatus>>);

impl AsrRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule_id: impl Into<String>, status: Option<ProtectionStatus>) {
        self.0.insert(rule_id.into(), status);
    }

    /// Status reported for `rule_id`; `None` when the rule is missing or null.
    pub fn status(&self, rule_id: &str) -> Option<ProtectionStatus> {
        self.0.get(rule_id).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<ProtectionStatus>)> {
        self.0.iter().map(|(id, status)| (id.as_str(), *status))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Option<ProtectionStatus>)> for AsrRules {
    fn from_iter<I: IntoIterator<Item = (String, Option<ProtectionStatus>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRules {
    Encoded(String),
    Map(IndexMap<String, Option<ProtectionStatus>>),
}

impl<'de> Deserialize<'de> for AsrRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawRules::deserialize(deserializer)? {
            RawRules::Map(rules) => Ok(Self(rules)),
            RawRules::Encoded(text) if text.trim().is_empty() => Ok(Self::default()),
            RawRules::Encoded(text) => serde_json::from_str(&text)
                .map(Self)
                .map_err(|e| D::Error::custom(format!("malformed ASRRules: {e}"))),
        }
    }
}
