use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::models::ReviewRow;

const LOCK_SHARDS: usize = 64;

pub mod keys {
  pub const REVIEW_VET_ID: &str = "review_vet_id";
  pub const REVIEW_RATING: &str = "review_rating";
  pub const MODERATION_QUEUE: &str = "moderation_queue";
  pub const MODERATION_REVIEW: &str = "moderation_review";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StateTag {
  #[default]
  Idle,
  AwaitingRating,
  AwaitingComment,
  ModerationListing,
  ModerationItemSelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
  Review,
  Moderation,
}

impl StateTag {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Idle => "idle",
      Self::AwaitingRating => "awaiting_rating",
      Self::AwaitingComment => "awaiting_comment",
      Self::ModerationListing => "moderation_listing",
      Self::ModerationItemSelected => "moderation_item_selected",
    }
  }

  pub fn flow(self) -> Option<Flow> {
    match self {
      Self::Idle => None,
      Self::AwaitingRating | Self::AwaitingComment => Some(Flow::Review),
      Self::ModerationListing | Self::ModerationItemSelected => Some(Flow::Moderation),
    }
  }
}

impl fmt::Display for StateTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScratchValue {
  Int(i64),
  UInt(u64),
  Text(String),
  Review(Box<ReviewRow>),
  Reviews(Vec<ReviewRow>),
}

impl ScratchValue {
  pub fn as_int(&self) -> Option<i64> {
    match self {
      Self::Int(value) => Some(*value),
      Self::UInt(value) => i64::try_from(*value).ok(),
      _ => None,
    }
  }
}

impl From<i16> for ScratchValue {
  fn from(value: i16) -> Self {
    Self::Int(value.into())
  }
}

impl From<i32> for ScratchValue {
  fn from(value: i32) -> Self {
    Self::Int(value.into())
  }
}

impl From<i64> for ScratchValue {
  fn from(value: i64) -> Self {
    Self::Int(value)
  }
}

impl From<u32> for ScratchValue {
  fn from(value: u32) -> Self {
    Self::UInt(value.into())
  }
}

impl From<u64> for ScratchValue {
  fn from(value: u64) -> Self {
    Self::UInt(value)
  }
}

impl From<String> for ScratchValue {
  fn from(value: String) -> Self {
    Self::Text(value)
  }
}

impl From<&str> for ScratchValue {
  fn from(value: &str) -> Self {
    Self::Text(value.to_string())
  }
}

impl From<ReviewRow> for ScratchValue {
  fn from(value: ReviewRow) -> Self {
    Self::Review(Box::new(value))
  }
}

impl From<Vec<ReviewRow>> for ScratchValue {
  fn from(value: Vec<ReviewRow>) -> Self {
    Self::Reviews(value)
  }
}

#[derive(Debug)]
struct Entry {
  tag: StateTag,
  scratch: HashMap<String, ScratchValue>,
  touched: Instant,
}

impl Entry {
  fn new() -> Self {
    Self {
      tag: StateTag::Idle,
      scratch: HashMap::new(),
      touched: Instant::now(),
    }
  }

  fn is_empty(&self) -> bool {
    self.tag == StateTag::Idle && self.scratch.is_empty()
  }
}

// Callers that read, decide and write across several calls hold `lock_user` for the duration.
pub struct StateStore {
  entries: RwLock<HashMap<i64, Entry>>,
  locks: Vec<Arc<Mutex<()>>>,
  ttl: Option<Duration>,
}

impl StateStore {
  pub fn new(ttl: Option<Duration>) -> Self {
    Self {
      entries: RwLock::new(HashMap::new()),
      locks: (0 .. LOCK_SHARDS).map(|_| Arc::new(Mutex::new(()))).collect(),
      ttl,
    }
  }

  pub async fn lock_user(&self, user_id: i64) -> OwnedMutexGuard<()> {
    let shard = user_id.rem_euclid(LOCK_SHARDS as i64) as usize;
    self.locks[shard].clone().lock_owned().await
  }

  pub async fn set_state(&self, user_id: i64, tag: StateTag) {
    let mut entries = self.entries.write().await;
    // Going idle ends the flow, so its scratch goes with it.
    if tag == StateTag::Idle {
      entries.remove(&user_id);
      return;
    }
    let entry = self.live_entry_mut(&mut entries, user_id);
    entry.tag = tag;
    entry.touched = Instant::now();
  }

  pub async fn get_state(&self, user_id: i64) -> StateTag {
    let entries = self.entries.read().await;
    entries
      .get(&user_id)
      .filter(|entry| !self.is_expired(entry))
      .map(|entry| entry.tag)
      .unwrap_or_default()
  }

  pub async fn has_state(&self, user_id: i64) -> bool {
    self.get_state(user_id).await != StateTag::Idle
  }

  pub async fn clear_state(&self, user_id: i64) {
    self.entries.write().await.remove(&user_id);
  }

  pub async fn set_data(&self, user_id: i64, key: &str, value: impl Into<ScratchValue>) {
    let mut entries = self.entries.write().await;
    let entry = self.live_entry_mut(&mut entries, user_id);
    entry.scratch.insert(key.to_string(), value.into());
    entry.touched = Instant::now();
  }

  pub async fn get_data(&self, user_id: i64, key: &str) -> Option<ScratchValue> {
    let entries = self.entries.read().await;
    entries
      .get(&user_id)
      .filter(|entry| !self.is_expired(entry))
      .and_then(|entry| entry.scratch.get(key).cloned())
  }

  pub async fn get_data_as_int(&self, user_id: i64, key: &str) -> Option<i64> {
    self.get_data(user_id, key).await.and_then(|value| value.as_int())
  }

  pub async fn remove_data(&self, user_id: i64, key: &str) {
    let mut entries = self.entries.write().await;
    if let Some(entry) = entries.get_mut(&user_id) {
      entry.scratch.remove(key);
      if entry.is_empty() {
        entries.remove(&user_id);
      }
    }
  }

  pub async fn clear_data(&self, user_id: i64) {
    let mut entries = self.entries.write().await;
    if let Some(entry) = entries.get_mut(&user_id) {
      entry.scratch.clear();
      if entry.is_empty() {
        entries.remove(&user_id);
      }
    }
  }

  pub async fn purge_expired(&self) -> usize {
    if self.ttl.is_none() {
      return 0;
    }
    let mut entries = self.entries.write().await;
    let before = entries.len();
    entries.retain(|_, entry| !self.is_expired(entry));
    before - entries.len()
  }

  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }

  fn is_expired(&self, entry: &Entry) -> bool {
    self.ttl.is_some_and(|ttl| entry.touched.elapsed() > ttl)
  }

  fn live_entry_mut<'a>(&self, entries: &'a mut HashMap<i64, Entry>, user_id: i64) -> &'a mut Entry {
    let entry = entries.entry(user_id).or_insert_with(Entry::new);
    if self.is_expired(entry) {
      *entry = Entry::new();
    }
    entry
  }
}
