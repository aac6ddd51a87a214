//! Login history and lock records
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, id::AccountId};

/// How a recorded login attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failure,
    /// Refused because the account was locked; the password was not checked.
    Locked,
}

impl LoginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginStatus::Success => "success",
            LoginStatus::Failure => "failure",
            LoginStatus::Locked => "locked",
        }
    }
}

impl fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LoginStatus::Success),
            "failure" => Ok(LoginStatus::Failure),
            "locked" => Ok(LoginStatus::Locked),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

/// One row of `login_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub id: i64,
    pub user_id: AccountId,
    pub login_time: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub status: LoginStatus,
}

/// One row of `login_locks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginLock {
    pub id: i64,
    pub user_id: AccountId,
    pub lock_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl LoginLock {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.released_at.is_none() && now < self.lock_until
    }
}
