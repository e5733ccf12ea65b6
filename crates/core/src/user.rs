//! Signed-up users. Business records: never deleted or anonymized.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, Result, ValidationErrorCode};

/// Plan picked at signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectedPlan {
    Free,
    Monthly,
    Annual,
}

impl SelectedPlan {
    pub const ALL: [SelectedPlan; 3] = [Self::Free, Self::Monthly, Self::Annual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }
}

impl fmt::Display for SelectedPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectedPlan {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "monthly" => Ok(Self::Monthly),
            "annual" => Ok(Self::Annual),
            other => Err(Error::validation(format!("unknown plan: {}", other))),
        }
    }
}

/// A completed signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub city: String,
    pub selected_plan: SelectedPlan,
    pub signup_source: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Signup form submission (camelCase, as posted).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(email, length(max = 320))]
    pub email: String,

    #[validate(length(min = 1, max = 120))]
    pub city: String,

    pub selected_plan: SelectedPlan,

    #[validate(length(max = 120))]
    #[serde(default)]
    pub signup_source: Option<String>,
}

impl NewUser {
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::validation_code(ValidationErrorCode::InvalidFormat, e.to_string()))
    }

    /// Materialize the stored record.
    pub fn into_user(self, created_at: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            city: self.city.trim().to_string(),
            selected_plan: self.selected_plan,
            signup_source: self.signup_source,
            created_at,
        }
    }
}

/// User fields shown next to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub selected_plan: SelectedPlan,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            selected_plan: user.selected_plan,
            created_at: user.created_at,
        }
    }
}
