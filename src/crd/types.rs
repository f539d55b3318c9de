//! Status types shared by the ResilientCluster CRD

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Availability of a spoke as observed through its addon
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Availability {
    /// The addon reports the spoke as available
    Available,
    /// The addon reports the spoke as unavailable, or reports nothing usable
    #[default]
    NotAvailable,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "Available"),
            Self::NotAvailable => write!(f, "NotAvailable"),
        }
    }
}

/// A single availability observation
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterStatus {
    /// Observed availability
    pub availability: Availability,

    /// When the observation was made
    pub time: DateTime<Utc>,
}

impl ClusterStatus {
    /// Observation of `availability` made now
    pub fn observed_now(availability: Availability) -> Self {
        Self {
            availability,
            time: Utc::now(),
        }
    }
}
