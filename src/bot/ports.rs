use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::MessageId;
use teloxide::types::ReplyMarkup;

use crate::models::CityRow;
use crate::models::ClinicRow;
use crate::models::NewReview;
use crate::models::ReviewRow;
use crate::models::ReviewStatus;
use crate::models::SpecializationRow;
use crate::models::StatsRow;
use crate::models::UserRow;
use crate::models::VetCard;
use crate::models::VetRow;
use crate::reference::ReferenceData;
use crate::reference::ReferenceRows;

#[async_trait]
pub trait Storage: Send + Sync {
  async fn upsert_user(
    &self,
    platform_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
  ) -> Result<()>;

  async fn find_user_by_platform_id(&self, platform_id: i64) -> Result<Option<UserRow>>;

  async fn list_specializations(&self) -> Result<Vec<SpecializationRow>>;

  async fn list_cities(&self) -> Result<Vec<CityRow>>;

  async fn list_clinics(&self, city_id: Option<i64>) -> Result<Vec<ClinicRow>>;

  async fn get_clinic(&self, clinic_id: i64) -> Result<Option<ClinicRow>>;

  async fn list_vets_by_specialization(&self, specialization_id: i64) -> Result<Vec<VetRow>>;

  async fn list_vets_by_clinic(&self, clinic_id: i64) -> Result<Vec<VetRow>>;

  async fn list_vets_by_weekday(&self, weekday: i16) -> Result<Vec<VetRow>>;

  async fn get_vet_card(&self, vet_id: i64) -> Result<Option<VetCard>>;

  async fn list_approved_reviews(&self, vet_id: i64, limit: i64) -> Result<Vec<ReviewRow>>;

  async fn has_existing_review(&self, user_id: i64, vet_id: i64) -> Result<bool>;

  async fn create_review(&self, review: NewReview) -> Result<i64>;

  async fn get_review_by_id(&self, review_id: i64) -> Result<Option<ReviewRow>>;

  async fn list_pending_reviews(&self) -> Result<Vec<ReviewRow>>;

  /// Only a pending review is updated; returns `false` when there was none to update.
  async fn update_review_status(&self, review_id: i64, status: ReviewStatus, moderator_id: i64) -> Result<bool>;

  async fn stats(&self) -> Result<StatsRow>;

  async fn export_reference_data(&self) -> Result<ReferenceData>;

  async fn import_reference_rows(&self, rows: ReferenceRows) -> Result<usize>;
}

#[async_trait]
pub trait Messenger: Send + Sync {
  async fn send_message(&self, chat: ChatId, text: String, markup: Option<ReplyMarkup>) -> Result<()>;

  async fn answer_callback(&self, query_id: String, toast: Option<String>) -> Result<()>;

  async fn edit_message(
    &self,
    chat: ChatId,
    message_id: MessageId,
    text: String,
    markup: Option<InlineKeyboardMarkup>,
  ) -> Result<()>;

  async fn send_document(&self, chat: ChatId, file_name: String, content: Vec<u8>, caption: Option<String>) -> Result<()>;

  async fn download_file(&self, file_id: String) -> Result<Vec<u8>>;
}

pub trait AdminPolicy: Send + Sync {
  fn is_admin(&self, platform_id: i64) -> bool;

  fn moderators(&self) -> Vec<i64>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticAdmins {
  ids: HashSet<i64>,
}

impl StaticAdmins {
  pub fn new(admins: Vec<i64>) -> Self {
    Self {
      ids: admins.into_iter().collect(),
    }
  }
}

impl AdminPolicy for StaticAdmins {
  fn is_admin(&self, platform_id: i64) -> bool {
    self.ids.contains(&platform_id)
  }

  fn moderators(&self) -> Vec<i64> {
    let mut ids: Vec<i64> = self.ids.iter().copied().collect();
    ids.sort_unstable();
    ids
  }
}
