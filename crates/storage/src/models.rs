//! Record types shared by every storage backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Failure to parse an enumeration from its textual or numeric form
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: impl ToString) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Lower-cases and strips separators so "CpuLoad", "cpu_load" and "cpu-load" compare equal.
fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Generates `id`, `from_id`, `as_str`, `Display` and a separator-insensitive `FromStr`
/// for a fieldless enum whose persisted ids are stable.
macro_rules! stable_enum {
    ($ty:ident, $kind:literal, { $($variant:ident = $id:literal => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Stable numeric id, used by the API and as the persisted column value
            pub fn id(self) -> i64 {
                match self {
                    $($ty::$variant => $id),+
                }
            }

            pub fn from_id(id: i64) -> Result<Self, ParseEnumError> {
                match id {
                    $($id => Ok($ty::$variant),)+
                    other => Err(ParseEnumError::new($kind, other)),
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let folded = fold(s);
                $(
                    if folded == fold($name) {
                        return Ok($ty::$variant);
                    }
                )+
                // Numeric ids are accepted too ("1" == first variant)
                s.trim()
                    .parse::<i64>()
                    .map_err(|_| ParseEnumError::new($kind, s))
                    .and_then($ty::from_id)
            }
        }
    };
}

/// Kind of telemetry a metric stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    CpuLoad,
    UserAction,
    Compilation,
    Log,
    Ping,
    Health,
}

stable_enum!(MetricType, "metric type", {
    CpuLoad = 1 => "cpuload",
    UserAction = 2 => "useraction",
    Compilation = 3 => "compilation",
    Log = 4 => "log",
    Ping = 5 => "ping",
    Health = 6 => "health",
});

impl MetricType {
    /// Human readable title stored alongside the metric
    pub fn title(self) -> &'static str {
        match self {
            MetricType::CpuLoad => "CPU load",
            MetricType::UserAction => "User actions",
            MetricType::Compilation => "Compilation",
            MetricType::Log => "Log statistics",
            MetricType::Ping => "Ping",
            MetricType::Health => "System health",
        }
    }
}

/// System-computed health label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoLabel {
    Normal,
    Warning,
    Critical,
}

stable_enum!(AutoLabel, "auto label", {
    Normal = 1 => "normal",
    Warning = 2 => "warning",
    Critical = 3 => "critical",
});

/// Operator-set label. `None` means no override is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualLabel {
    #[default]
    None,
    Investigating,
}

stable_enum!(ManualLabel, "manual label", {
    None = 1 => "none",
    Investigating = 2 => "investigating",
});

impl ManualLabel {
    pub fn is_set(self) -> bool {
        self != ManualLabel::None
    }
}

/// Log severities, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Debug,
    Detail,
    User,
    Info,
    Warn,
    Error,
    Fatal,
}

stable_enum!(LogSeverity, "log severity", {
    Debug = 1 => "debug",
    Detail = 2 => "detail",
    User = 3 => "user",
    Info = 4 => "info",
    Warn = 5 => "warn",
    Error = 6 => "error",
    Fatal = 7 => "fatal",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilationStage {
    M4,
    SandPiper,
    Simulation,
}

stable_enum!(CompilationStage, "compilation stage", {
    M4 = 1 => "m4",
    SandPiper = 2 => "sandpiper",
    Simulation = 3 => "simulation",
});

/// Urgency tier of an outbound notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationSeverity {
    Low,
    Medium,
    High,
}

stable_enum!(NotificationSeverity, "notification severity", {
    Low = 1 => "low",
    Medium = 2 => "medium",
    High = 3 => "high",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyType {
    DataGap,
    LoadSpike,
    RepeatedFailure,
    LowHealth,
}

stable_enum!(DiscrepancyType, "discrepancy type", {
    DataGap = 1 => "data_gap",
    LoadSpike = 2 => "load_spike",
    RepeatedFailure = 3 => "repeated_failure",
    LowHealth = 4 => "low_health",
});

/// Identity of a metric stream: at most one metric exists per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub metric_type: MetricType,
    pub source: String,
}

impl MetricKey {
    pub fn new(metric_type: MetricType, source: impl Into<String>) -> Self {
        Self {
            metric_type,
            source: source.into(),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.metric_type, self.source)
    }
}

/// A tracked (type, source) stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_type: MetricType,
    pub source: String,
    pub title: String,
    pub auto_label: AutoLabel,
    pub manual_label: ManualLabel,
    pub public: bool,
    pub last_updated: DateTime<Utc>,
}

impl Metric {
    /// A freshly discovered metric: Normal, no override, publicly visible
    pub fn new(key: &MetricKey, now: DateTime<Utc>) -> Self {
        Self {
            metric_type: key.metric_type,
            source: key.source.clone(),
            title: key.metric_type.title().to_string(),
            auto_label: AutoLabel::Normal,
            manual_label: ManualLabel::None,
            public: true,
            last_updated: now,
        }
    }

    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.metric_type, self.source.clone())
    }
}

/// Variant-specific content of a data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Numeric {
        value: f64,
    },
    Log {
        severity: LogSeverity,
        count: u32,
    },
    Compilation {
        stage: CompilationStage,
        source_size: u64,
        compile_time_ms: u64,
    },
    Ping {
        latency_ms: u64,
        success: bool,
        message: Option<String>,
    },
    UserAction {
        action: String,
        count: u32,
    },
    /// Periodic snapshot of overall system health (0..=100)
    Health {
        health: u8,
    },
}

impl Payload {
    /// Metric type a payload belongs to
    pub fn metric_type(&self) -> MetricType {
        match self {
            Payload::Numeric { .. } => MetricType::CpuLoad,
            Payload::Log { .. } => MetricType::Log,
            Payload::Compilation { .. } => MetricType::Compilation,
            Payload::Ping { .. } => MetricType::Ping,
            Payload::UserAction { .. } => MetricType::UserAction,
            Payload::Health { .. } => MetricType::Health,
        }
    }

    /// Single numeric reading used for summaries. Failed pings have no value.
    pub fn normalized_value(&self) -> Option<f64> {
        match self {
            Payload::Numeric { value } => Some(*value),
            Payload::Log { count, .. } => Some(f64::from(*count)),
            Payload::Compilation {
                compile_time_ms, ..
            } => Some(*compile_time_ms as f64),
            Payload::Ping {
                latency_ms,
                success: true,
                ..
            } => Some(*latency_ms as f64),
            Payload::Ping { success: false, .. } => None,
            Payload::UserAction { count, .. } => Some(f64::from(*count)),
            Payload::Health { health } => Some(f64::from(*health)),
        }
    }
}

/// Immutable sample belonging to a metric stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

impl DataPoint {
    pub fn new(timestamp: DateTime<Utc>, payload: Payload) -> Self {
        Self { timestamp, payload }
    }

    pub fn numeric(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self::new(timestamp, Payload::Numeric { value })
    }

    pub fn ping(timestamp: DateTime<Utc>, latency_ms: u64, success: bool) -> Self {
        Self::new(
            timestamp,
            Payload::Ping {
                latency_ms,
                success,
                message: None,
            },
        )
    }

    pub fn value(&self) -> Option<f64> {
        self.payload.normalized_value()
    }

    /// True for a ping that did not succeed; false for every other variant
    pub fn is_failure(&self) -> bool {
        matches!(self.payload, Payload::Ping { success: false, .. })
    }
}

/// Stored log message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub source: String,
    pub category: i32,
    pub severity: LogSeverity,
    pub message: String,
    pub auxiliary_data: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Log message before it has been assigned an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub source: String,
    pub category: i32,
    pub severity: LogSeverity,
    pub message: String,
    pub auxiliary_data: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewLogEntry {
    pub fn with_id(self, id: i64) -> LogEntry {
        LogEntry {
            id,
            source: self.source,
            category: self.category,
            severity: self.severity,
            message: self.message,
            auxiliary_data: self.auxiliary_data,
            timestamp: self.timestamp,
        }
    }
}

/// Log query. Empty lists match everything; keywords match if any keyword
/// occurs in the message or auxiliary data.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub sources: Vec<String>,
    pub categories: Vec<i32>,
    pub severities: Vec<LogSeverity>,
    pub keywords: Vec<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        (self.sources.is_empty() || self.sources.contains(&entry.source))
            && (self.categories.is_empty() || self.categories.contains(&entry.category))
            && (self.severities.is_empty() || self.severities.contains(&entry.severity))
            && self.start.map_or(true, |start| entry.timestamp >= start)
            && self.end.map_or(true, |end| entry.timestamp <= end)
            && (self.keywords.is_empty()
                || self.keywords.iter().any(|k| {
                    entry.message.contains(k.as_str())
                        || entry
                            .auxiliary_data
                            .as_deref()
                            .map_or(false, |aux| aux.contains(k.as_str()))
                }))
    }
}

/// Metric listing filter
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    pub metric_type: Option<MetricType>,
    pub source: Option<String>,
    pub public_only: bool,
}

impl MetricFilter {
    pub fn matches(&self, metric: &Metric) -> bool {
        self.metric_type.map_or(true, |t| metric.metric_type == t)
            && self.source.as_deref().map_or(true, |s| metric.source == s)
            && (!self.public_only || metric.public)
    }
}

/// Outbound notification, kept forever as an audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub severity: NotificationSeverity,
    pub message: String,
    pub is_sent: bool,
    pub attempts: u32,
    pub date_created: DateTime<Utc>,
    pub date_sent: Option<DateTime<Utc>>,
}

/// Result of one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent { at: DateTime<Utc> },
    Failed,
}

/// Natural key of a discrepancy record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscrepancyKey {
    pub discrepancy_type: DiscrepancyType,
    pub metric_type: MetricType,
    pub metric_source: String,
    pub date_first_offense: DateTime<Utc>,
}

/// Persisted anomaly. Resolved records are retained as history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub id: i64,
    pub discrepancy_type: DiscrepancyType,
    pub metric_type: MetricType,
    pub metric_source: String,
    pub date_first_offense: DateTime<Utc>,
    pub resolved: bool,
    pub date_resolved: Option<DateTime<Utc>>,
}

impl Discrepancy {
    pub fn key(&self) -> DiscrepancyKey {
        DiscrepancyKey {
            discrepancy_type: self.discrepancy_type,
            metric_type: self.metric_type,
            metric_source: self.metric_source.clone(),
            date_first_offense: self.date_first_offense,
        }
    }

    pub fn metric_key(&self) -> MetricKey {
        MetricKey::new(self.metric_type, self.metric_source.clone())
    }
}
