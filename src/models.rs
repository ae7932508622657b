use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Numeric body metrics tracked per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKey {
    Weight,
    BodyFat,
    Waist,
    Chest,
    Hips,
    Calories,
    Protein,
    Steps,
    Sleep,
}

impl MetricKey {
    pub const ALL: [MetricKey; 9] = [
        MetricKey::Weight,
        MetricKey::BodyFat,
        MetricKey::Waist,
        MetricKey::Chest,
        MetricKey::Hips,
        MetricKey::Calories,
        MetricKey::Protein,
        MetricKey::Steps,
        MetricKey::Sleep,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKey::Weight => "weight",
            MetricKey::BodyFat => "bodyFat",
            MetricKey::Waist => "waist",
            MetricKey::Chest => "chest",
            MetricKey::Hips => "hips",
            MetricKey::Calories => "calories",
            MetricKey::Protein => "protein",
            MetricKey::Steps => "steps",
            MetricKey::Sleep => "sleep",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

/// Daily adherence flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlagKey {
    Workout,
    Cardio,
    Diet,
}

impl FlagKey {
    pub const ALL: [FlagKey; 3] = [FlagKey::Workout, FlagKey::Cardio, FlagKey::Diet];

    pub fn as_str(self) -> &'static str {
        match self {
            FlagKey::Workout => "workout",
            FlagKey::Cardio => "cardio",
            FlagKey::Diet => "diet",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

/// One day's log. Values are kept as the strings the user typed; keys are the
/// camelCase metric and flag names. Unknown keys are carried through untouched
/// so a document written by a newer client survives a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEntry {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, bool>,
}

impl MetricEntry {
    pub fn with_value(mut self, key: MetricKey, value: impl Into<String>) -> Self {
        self.values.insert(key.as_str().to_string(), value.into());
        self
    }

    pub fn with_flag(mut self, key: FlagKey, value: bool) -> Self {
        self.flags.insert(key.as_str().to_string(), value);
        self
    }

    pub fn value(&self, key: MetricKey) -> Option<&str> {
        self.values.get(key.as_str()).map(String::as_str)
    }

    /// The metric parsed as a finite number, if it is one.
    pub fn numeric(&self, key: MetricKey) -> Option<f64> {
        self.value(key).and_then(parse_numeric)
    }

    /// Absent flags read as `false`.
    pub fn flag(&self, key: FlagKey) -> bool {
        self.flags.get(key.as_str()).copied().unwrap_or(false)
    }

    /// Drops blank values; whitespace-only input is the same as no input.
    pub fn normalized(mut self) -> Self {
        self.values.retain(|_, value| !value.trim().is_empty());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|value| value.trim().is_empty()) && self.flags.is_empty()
    }
}

pub fn parse_numeric(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

/// A named training/diet block. `end` is empty while the phase is ongoing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub id: i64,
    pub name: String,
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub goals: BTreeMap<String, String>,
}

impl Phase {
    pub fn is_open(&self) -> bool {
        self.end.is_empty()
    }

    pub fn goal(&self, key: MetricKey) -> Option<f64> {
        self.goals.get(key.as_str()).and_then(|raw| parse_numeric(raw))
    }

    /// Inclusive range check on `YYYY-MM-DD` keys.
    pub fn contains(&self, date: &str) -> bool {
        self.start.as_str() <= date && (self.end.is_empty() || date <= self.end.as_str())
    }
}

/// The replicated document: every entry plus the ordered phase list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub entries: BTreeMap<String, MetricEntry>,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

/// Remote snapshot together with the store's version token.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub snapshot: Snapshot,
    pub version: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub token: String,
    pub owner: String,
    pub repo: String,
    #[serde(default)]
    pub connected: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("connected", &self.connected)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Epoch millis of the last confirmed remote write.
    #[serde(default)]
    pub last_sync: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NewPhaseRequest {
    pub name: String,
    pub start: String,
    #[serde(default)]
    pub goals: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct EndPhaseRequest {
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub hidden: bool,
}

#[derive(Debug, Serialize)]
pub struct EntryResponse {
    pub date: String,
    pub entry: MetricEntry,
}

#[derive(Debug, Serialize)]
pub struct CommitCountResponse {
    pub since: String,
    pub count: u64,
}
