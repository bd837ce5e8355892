//! Membership plan catalog.
//!
//! Plans are a fixed catalog: three tiers, each priced in minor currency
//! units and granting a fixed membership duration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// A purchasable membership plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Entry tier: high-quality processing, multi-format support.
    Basic,

    /// Professional tier: unlimited processing, batch mode, API access.
    Professional,

    /// Flagship tier: everything in Professional plus dedicated support.
    Flagship,
}

impl Plan {
    /// All plans, in catalog order.
    pub const ALL: [Plan; 3] = [Plan::Basic, Plan::Professional, Plan::Flagship];

    /// Price in minor currency units.
    pub fn price_minor(&self) -> u64 {
        match self {
            Plan::Basic => 1900,
            Plan::Professional => 9900,
            Plan::Flagship => 29900,
        }
    }

    /// Membership duration granted by one purchase of this plan.
    pub fn duration(&self) -> Duration {
        Duration::days(self.duration_days())
    }

    /// Membership duration in days.
    pub fn duration_days(&self) -> i64 {
        match self {
            Plan::Basic | Plan::Professional | Plan::Flagship => 30,
        }
    }

    /// Human-readable plan name for order descriptions and receipts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Basic => "Basic",
            Plan::Professional => "Professional",
            Plan::Flagship => "Flagship",
        }
    }

    /// Stable identifier used in API payloads.
    pub fn id(&self) -> &'static str {
        match self {
            Plan::Basic => "basic",
            Plan::Professional => "professional",
            Plan::Flagship => "flagship",
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = super::PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Plan::Basic),
            "professional" => Ok(Plan::Professional),
            "flagship" => Ok(Plan::Flagship),
            other => Err(super::PaymentError::UnknownPlan(other.to_string())),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}
