use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Chat destination the result is sent to (a channel or DM id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeliveryTarget(pub u64);

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Subscription level. Drives queue position and the default daily limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Tier {
    #[default]
    Standard,
    Gold,
    Diamond,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Standard, Tier::Gold, Tier::Diamond];

    /// Default downloads per day, `None` means unlimited.
    pub fn daily_limit(self) -> Option<u32> {
        match self {
            Tier::Standard => Some(4),
            Tier::Gold => Some(10),
            Tier::Diamond => None,
        }
    }

    /// Priority jobs jump to the head of the queue.
    pub fn is_priority(self) -> bool {
        self == Tier::Diamond
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Gold => "gold",
            Tier::Diamond => "diamond",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(Tier::Standard),
            "gold" => Ok(Tier::Gold),
            "diamond" => Ok(Tier::Diamond),
            other => Err(format!(
                "unknown tier '{other}', expected one of: standard, gold, diamond"
            )),
        }
    }
}

/// A pending download request. Immutable once created.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    requester: UserId,
    target: DeliveryTarget,
    url: String,
    tier: Tier,
    submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(requester: UserId, target: DeliveryTarget, url: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: JobId::new(),
            requester,
            target,
            url: url.into(),
            tier,
            submitted_at: Utc::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn requester(&self) -> UserId {
        self.requester
    }

    pub fn target(&self) -> DeliveryTarget {
        self.target
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}
