use serde::{Deserialize, Serialize};

/// Priority tiers for job scheduling (lower value = higher urgency)
///
/// The tier selects the runner execution group (lane) a job lands in and the
/// rate-governor bucket consulted at dispatch time. Priority is fixed at
/// schedule time; a retry keeps the original tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    /// Payment confirmations, order state transitions
    Critical = 1,

    /// Customer-facing replies that should land within seconds
    Urgent = 2,

    /// Default tier for most background work
    Normal = 3,

    /// Catalog syncs, broadcast campaigns
    Bulk = 4,

    /// Cleanup and housekeeping jobs
    Maintenance = 5,
}

// Derived Ord follows the numeric urgency value: Critical sorts first.
// Draining most-urgent-first means ascending order, no Reverse needed.

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    /// Get all priority tiers in urgency order (most urgent first)
    pub fn all() -> &'static [Priority] {
        &[
            Self::Critical,
            Self::Urgent,
            Self::Normal,
            Self::Bulk,
            Self::Maintenance,
        ]
    }

    /// Get the numeric wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create from the numeric wire value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Critical),
            2 => Some(Self::Urgent),
            3 => Some(Self::Normal),
            4 => Some(Self::Bulk),
            5 => Some(Self::Maintenance),
            _ => None,
        }
    }

    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Urgent => "urgent",
            Self::Normal => "normal",
            Self::Bulk => "bulk",
            Self::Maintenance => "maintenance",
        }
    }

    /// Name of the runner execution group for this tier
    pub fn lane(self) -> &'static str {
        match self {
            Self::Critical => "lane-critical",
            Self::Urgent => "lane-urgent",
            Self::Normal => "lane-normal",
            Self::Bulk => "lane-bulk",
            Self::Maintenance => "lane-maintenance",
        }
    }

    /// Advisory dispatch ceiling for this tier, per one-minute window
    pub fn rate_limit(self) -> u32 {
        match self {
            Self::Critical => 1000,
            Self::Urgent => 100,
            Self::Normal => 50,
            Self::Bulk => 20,
            Self::Maintenance => 10,
        }
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.as_u8()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or_else(|| format!("invalid priority value: {}", value))
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "urgent" => Ok(Self::Urgent),
            "normal" => Ok(Self::Normal),
            "bulk" => Ok(Self::Bulk),
            "maintenance" => Ok(Self::Maintenance),
            _ => Err(format!("invalid priority: {}", s)),
        }
    }
}
