use std::fmt;

use teloxide::types::ChatId;
use teloxide::types::MessageId;

use crate::bot::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
  pub platform_id: i64,
  pub chat: ChatId,
  pub username: Option<String>,
  pub first_name: Option<String>,
  pub last_name: Option<String>,
}

impl Sender {
  pub fn new(platform_id: i64, chat: ChatId) -> Self {
    Self {
      platform_id,
      chat,
      username: None,
      first_name: None,
      last_name: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
  Command {
    sender: Sender,
    command: Command,
  },
  Text {
    sender: Sender,
    text: String,
  },
  Callback {
    sender: Sender,
    query_id: String,
    message_id: Option<MessageId>,
    data: String,
  },
  Document {
    sender: Sender,
    file_id: String,
    file_name: Option<String>,
    size: u32,
  },
}

impl IncomingEvent {
  pub fn sender(&self) -> &Sender {
    match self {
      Self::Command { sender, .. }
      | Self::Text { sender, .. }
      | Self::Callback { sender, .. }
      | Self::Document { sender, .. } => sender,
    }
  }
}

// Button payloads, encoded as `prefix:arg[:arg]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
  MenuSearch,
  SearchBySpecialization,
  SearchByCity,
  SearchByClinic,
  SearchByDay,
  Specialization(i64),
  City(i64),
  Clinic(i64),
  Weekday(i16),
  Vet(i64),
  VetReviews(i64),
  AddReview(i64),
  // Range is checked by the review driver, not here.
  Rate(i64),
  CancelReview,
  ModerationList,
  Approve(i64),
  Reject(i64),
}

impl CallbackAction {
  pub fn parse(data: &str) -> Option<Self> {
    let (prefix, value) = data.split_once(':')?;
    let action = match prefix {
      "menu" if value == "search" => Self::MenuSearch,
      "search" => match value {
        "spec" => Self::SearchBySpecialization,
        "city" => Self::SearchByCity,
        "clinic" => Self::SearchByClinic,
        "day" => Self::SearchByDay,
        _ => return None,
      },
      "spec" => Self::Specialization(value.parse().ok()?),
      "city" => Self::City(value.parse().ok()?),
      "clinic" => Self::Clinic(value.parse().ok()?),
      "day" => {
        let weekday = value.parse::<i16>().ok()?;
        if !(1 ..= 7).contains(&weekday) {
          return None;
        }
        Self::Weekday(weekday)
      },
      "vet" => Self::Vet(value.parse().ok()?),
      "reviews" => Self::VetReviews(value.parse().ok()?),
      "rate" => Self::Rate(value.parse().ok()?),
      "review" => match value.split_once(':') {
        Some(("add", vet_id)) => Self::AddReview(vet_id.parse().ok()?),
        None if value == "cancel" => Self::CancelReview,
        _ => return None,
      },
      "mod" => match value.split_once(':') {
        Some(("approve", review_id)) => Self::Approve(review_id.parse().ok()?),
        Some(("reject", review_id)) => Self::Reject(review_id.parse().ok()?),
        None if value == "list" => Self::ModerationList,
        _ => return None,
      },
      _ => return None,
    };
    Some(action)
  }
}

impl fmt::Display for CallbackAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MenuSearch => f.write_str("menu:search"),
      Self::SearchBySpecialization => f.write_str("search:spec"),
      Self::SearchByCity => f.write_str("search:city"),
      Self::SearchByClinic => f.write_str("search:clinic"),
      Self::SearchByDay => f.write_str("search:day"),
      Self::Specialization(id) => write!(f, "spec:{id}"),
      Self::City(id) => write!(f, "city:{id}"),
      Self::Clinic(id) => write!(f, "clinic:{id}"),
      Self::Weekday(day) => write!(f, "day:{day}"),
      Self::Vet(id) => write!(f, "vet:{id}"),
      Self::VetReviews(id) => write!(f, "reviews:{id}"),
      Self::AddReview(id) => write!(f, "review:add:{id}"),
      Self::Rate(value) => write!(f, "rate:{value}"),
      Self::CancelReview => f.write_str("review:cancel"),
      Self::ModerationList => f.write_str("mod:list"),
      Self::Approve(id) => write!(f, "mod:approve:{id}"),
      Self::Reject(id) => write!(f, "mod:reject:{id}"),
    }
  }
}
