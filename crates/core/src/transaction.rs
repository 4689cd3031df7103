use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::Money;

/// Which household member a transaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    User1,
    User2,
    Shared,
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::User1 => write!(f, "user1"),
            Owner::User2 => write!(f, "user2"),
            Owner::Shared => write!(f, "shared"),
        }
    }
}

impl std::str::FromStr for Owner {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user1" => Ok(Owner::User1),
            "user2" => Ok(Owner::User2),
            "shared" => Ok(Owner::Shared),
            other => Err(format!("Unknown owner: '{other}'")),
        }
    }
}

/// How a transaction entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Manual,
    Statement,
    Csv,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Manual => write!(f, "manual"),
            Source::Statement => write!(f, "statement"),
            Source::Csv => write!(f, "csv"),
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Source::Manual),
            "statement" => Ok(Source::Statement),
            "csv" => Ok(Source::Csv),
            other => Err(format!("Unknown source: '{other}'")),
        }
    }
}

/// Canonical transaction record. Amounts follow the internal sign convention
/// (expenses negative); `category` is always a registry name or `"Other"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub date: NaiveDate,
    pub amount: Money,
    pub category: String,
    pub description: String,
    pub owner: Owner,
    pub source: Source,
    pub card: String,
    pub shared: bool,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        date: NaiveDate,
        amount: Money,
        description: impl Into<String>,
        owner: Owner,
        source: Source,
        card: impl Into<String>,
    ) -> Self {
        Transaction {
            id: short_id(),
            date,
            amount,
            category: "Other".to_string(),
            description: description.into(),
            owner,
            source,
            card: card.into(),
            shared: owner == Owner::Shared,
            created_at: Utc::now(),
        }
    }
}

/// Short unique ID — first 8 hex chars of a v4 UUID.
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
