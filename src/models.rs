use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRow {
  pub id: i64,
  pub platform_id: i64, // tg id
  pub username: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecializationRow {
  pub id: i64,
  pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CityRow {
  pub id: i64,
  pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClinicRow {
  pub id: i64,
  pub city_id: i64,
  pub city_name: String,
  pub name: String,
  pub address: Option<String>,
  pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VetRow {
  pub id: i64,
  pub full_name: String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleRow {
  pub clinic_id: i64,
  pub clinic_name: String,
  pub weekday: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VetCard {
  pub vet: VetRow,
  pub specializations: Vec<String>,
  pub schedule: Vec<ScheduleRow>,
  pub average_rating: Option<f64>,
  pub approved_reviews: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
  Pending,
  Approved,
  Rejected,
}

impl ReviewStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Approved => "approved",
      Self::Rejected => "rejected",
    }
  }
}

impl fmt::Display for ReviewStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown review status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ReviewStatus {
  type Err = UnknownStatus;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value {
      "pending" => Ok(Self::Pending),
      "approved" => Ok(Self::Approved),
      "rejected" => Ok(Self::Rejected),
      other => Err(UnknownStatus(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewRow {
  pub id: i64,
  pub vet_id: i64,
  pub vet_name: String,
  pub user_id: i64,
  pub author: Option<String>,
  pub rating: i16,
  pub comment: String,
  pub status: ReviewStatus,
  pub created_at: DateTime<Utc>,
  pub moderated_by: Option<i64>,
  pub moderated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
  pub vet_id: i64,
  pub user_id: i64,
  pub rating: i16,
  pub comment: String,
  pub status: ReviewStatus,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsRow {
  pub users: i64,
  pub vets: i64,
  pub clinics: i64,
  pub pending_reviews: i64,
  pub approved_reviews: i64,
  pub rejected_reviews: i64,
}

#[cfg(test)]
mod tests {
  use super::ReviewStatus;

  #[test]
  fn status_round_trips_through_text() {
    for status in [ReviewStatus::Pending, ReviewStatus::Approved, ReviewStatus::Rejected] {
      assert_eq!(status.as_str().parse::<ReviewStatus>(), Ok(status));
    }
  }

  #[test]
  fn unknown_status_is_rejected() {
    assert!("archived".parse::<ReviewStatus>().is_err());
  }
}
