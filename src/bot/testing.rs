use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::MessageId;
use teloxide::types::ReplyMarkup;

use crate::bot::Command;
use crate::bot::context::AppContext;
use crate::bot::events::IncomingEvent;
use crate::bot::events::Sender;
use crate::bot::ports::Messenger;
use crate::bot::ports::StaticAdmins;
use crate::bot::ports::Storage;
use crate::bot::state::StateStore;
use crate::models::CityRow;
use crate::models::ClinicRow;
use crate::models::NewReview;
use crate::models::ReviewRow;
use crate::models::ReviewStatus;
use crate::models::ScheduleRow;
use crate::models::SpecializationRow;
use crate::models::StatsRow;
use crate::models::UserRow;
use crate::models::VetCard;
use crate::models::VetRow;
use crate::reference::CityRecord;
use crate::reference::ClinicRecord;
use crate::reference::ReferenceData;
use crate::reference::ReferenceRows;
use crate::reference::ScheduleRecord;
use crate::reference::SpecializationRecord;
use crate::reference::VetRecord;

#[derive(Default)]
struct Tables {
  users: Vec<UserRow>,
  cities: Vec<CityRecord>,
  specializations: Vec<SpecializationRecord>,
  clinics: Vec<ClinicRecord>,
  vets: Vec<VetRow>,
  vet_specializations: Vec<(i64, i64)>,
  schedules: Vec<ScheduleRecord>,
  reviews: Vec<ReviewRow>,
  reviewed: HashSet<(i64, i64)>,
  created: Vec<NewReview>,
  status_updates: Vec<(i64, ReviewStatus, i64)>,
}

#[derive(Default)]
pub struct MemoryStorage {
  tables: Mutex<Tables>,
  create_calls: AtomicUsize,
  list_pending_calls: AtomicUsize,
  fail_writes: Mutex<bool>,
  fail_reads: Mutex<bool>,
}

impl Tables {
  fn clinic_row(&self, clinic: &ClinicRecord) -> ClinicRow {
    let city_name = self
      .cities
      .iter()
      .find(|city| city.id == clinic.city_id)
      .map(|city| city.name.clone())
      .unwrap_or_default();
    ClinicRow {
      id: clinic.id,
      city_id: clinic.city_id,
      city_name,
      name: clinic.name.clone(),
      address: clinic.address.clone(),
      phone: clinic.phone.clone(),
    }
  }

  fn vets_where(&self, keep: impl Fn(i64) -> bool) -> Vec<VetRow> {
    let mut vets: Vec<VetRow> = self.vets.iter().filter(|vet| keep(vet.id)).cloned().collect();
    vets.sort_by(|a, b| a.full_name.cmp(&b.full_name));
    vets
  }

  fn specialization_ids(&self, vet_id: i64) -> Vec<i64> {
    let mut ids: Vec<i64> = self
      .vet_specializations
      .iter()
      .filter(|(vet, _)| *vet == vet_id)
      .map(|(_, spec)| *spec)
      .collect();
    ids.sort_unstable();
    ids
  }

  fn check_reference(&self, rows: &ReferenceRows) -> Result<()> {
    match rows {
      ReferenceRows::Cities(_) | ReferenceRows::Specializations(_) => {},
      ReferenceRows::Clinics(records) => {
        for clinic in records {
          if !self.cities.iter().any(|city| city.id == clinic.city_id) {
            bail!("clinic {} references unknown city {}", clinic.id, clinic.city_id);
          }
        }
      },
      ReferenceRows::Vets(records) => {
        for vet in records {
          for spec_id in vet.specialization_ids().map_err(anyhow::Error::msg)? {
            if !self.specializations.iter().any(|spec| spec.id == spec_id) {
              bail!("vet {} references unknown specialization {spec_id}", vet.id);
            }
          }
        }
      },
      ReferenceRows::Schedules(records) => {
        for slot in records {
          if !self.vets.iter().any(|vet| vet.id == slot.vet_id) {
            bail!("schedule references unknown vet {}", slot.vet_id);
          }
          if !self.clinics.iter().any(|clinic| clinic.id == slot.clinic_id) {
            bail!("schedule references unknown clinic {}", slot.clinic_id);
          }
        }
      },
    }
    Ok(())
  }
}

fn upsert_by_id<T: Clone>(table: &mut Vec<T>, rows: &[T], id: impl Fn(&T) -> i64) {
  for row in rows {
    match table.iter_mut().find(|existing| id(existing) == id(row)) {
      Some(existing) => *existing = row.clone(),
      None => table.push(row.clone()),
    }
  }
}

fn epoch() -> DateTime<Utc> {
  DateTime::<Utc>::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
}

impl MemoryStorage {
  fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
    self.tables.lock().expect("tables lock")
  }

  fn check_reads(&self) -> Result<()> {
    if *self.fail_reads.lock().expect("flag lock") {
      return Err(anyhow!("storage unavailable"));
    }
    Ok(())
  }

  fn check_writes(&self) -> Result<()> {
    if *self.fail_writes.lock().expect("flag lock") {
      return Err(anyhow!("storage unavailable"));
    }
    Ok(())
  }

  pub fn fail_reads(&self, fail: bool) {
    *self.fail_reads.lock().expect("flag lock") = fail;
  }

  pub fn fail_writes(&self, fail: bool) {
    *self.fail_writes.lock().expect("flag lock") = fail;
  }

  pub fn add_user(&self, platform_id: i64, username: &str) {
    let mut tables = self.tables();
    let id = tables.users.len() as i64 + 100;
    tables.users.push(UserRow {
      id,
      platform_id,
      username: Some(username.to_string()),
      first_name: None,
      last_name: None,
      created_at: epoch(),
    });
  }

  pub fn remove_user(&self, platform_id: i64) {
    self.tables().users.retain(|user| user.platform_id != platform_id);
  }

  pub fn user_id(&self, platform_id: i64) -> Option<i64> {
    self
      .tables()
      .users
      .iter()
      .find(|user| user.platform_id == platform_id)
      .map(|user| user.id)
  }

  pub fn add_vet(&self, id: i64, name: &str) {
    self.tables().vets.push(VetRow {
      id,
      full_name: name.to_string(),
      description: None,
    });
  }

  pub fn add_city(&self, id: i64, name: &str) {
    self.tables().cities.push(CityRecord {
      id,
      name: name.to_string(),
    });
  }

  pub fn add_specialization(&self, id: i64, name: &str) {
    self.tables().specializations.push(SpecializationRecord {
      id,
      name: name.to_string(),
    });
  }

  pub fn add_clinic(&self, id: i64, city_id: i64, name: &str) {
    self.tables().clinics.push(ClinicRecord {
      id,
      city_id,
      name: name.to_string(),
      address: None,
      phone: None,
    });
  }

  pub fn mark_reviewed(&self, platform_id: i64, vet_id: i64) {
    let user_id = self.user_id(platform_id).expect("user registered");
    self.tables().reviewed.insert((user_id, vet_id));
  }

  pub fn add_pending_review(&self, id: i64, vet_id: i64, platform_id: i64, comment: &str) {
    let user_id = self.user_id(platform_id).expect("user registered");
    let mut tables = self.tables();
    let vet_name = tables
      .vets
      .iter()
      .find(|vet| vet.id == vet_id)
      .map(|vet| vet.full_name.clone())
      .unwrap_or_default();
    tables.reviews.push(ReviewRow {
      id,
      vet_id,
      vet_name,
      user_id,
      author: None,
      rating: 4,
      comment: comment.to_string(),
      status: ReviewStatus::Pending,
      created_at: epoch() + Duration::seconds(id),
      moderated_by: None,
      moderated_at: None,
    });
  }

  pub fn set_status(&self, review_id: i64, status: ReviewStatus) {
    if let Some(review) = self.tables().reviews.iter_mut().find(|review| review.id == review_id) {
      review.status = status;
    }
  }

  pub fn created_reviews(&self) -> Vec<NewReview> {
    self.tables().created.clone()
  }

  pub fn create_calls(&self) -> usize {
    self.create_calls.load(Ordering::SeqCst)
  }

  pub fn list_pending_calls(&self) -> usize {
    self.list_pending_calls.load(Ordering::SeqCst)
  }

  pub fn status_updates(&self) -> Vec<(i64, ReviewStatus, i64)> {
    self.tables().status_updates.clone()
  }
}

#[async_trait]
impl Storage for MemoryStorage {
  async fn upsert_user(
    &self,
    platform_id: i64,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
  ) -> Result<()> {
    self.check_writes()?;
    let mut tables = self.tables();
    if let Some(user) = tables.users.iter_mut().find(|user| user.platform_id == platform_id) {
      user.username = username;
      user.first_name = first_name;
      user.last_name = last_name;
      return Ok(());
    }
    let id = tables.users.len() as i64 + 100;
    tables.users.push(UserRow {
      id,
      platform_id,
      username,
      first_name,
      last_name,
      created_at: epoch(),
    });
    Ok(())
  }

  async fn find_user_by_platform_id(&self, platform_id: i64) -> Result<Option<UserRow>> {
    self.check_reads()?;
    Ok(self.tables().users.iter().find(|user| user.platform_id == platform_id).cloned())
  }

  async fn list_specializations(&self) -> Result<Vec<SpecializationRow>> {
    self.check_reads()?;
    let mut specializations: Vec<SpecializationRow> = self
      .tables()
      .specializations
      .iter()
      .map(|spec| SpecializationRow {
        id: spec.id,
        name: spec.name.clone(),
      })
      .collect();
    specializations.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(specializations)
  }

  async fn list_cities(&self) -> Result<Vec<CityRow>> {
    self.check_reads()?;
    let mut cities: Vec<CityRow> = self
      .tables()
      .cities
      .iter()
      .map(|city| CityRow {
        id: city.id,
        name: city.name.clone(),
      })
      .collect();
    cities.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(cities)
  }

  async fn list_clinics(&self, city_id: Option<i64>) -> Result<Vec<ClinicRow>> {
    self.check_reads()?;
    let tables = self.tables();
    let mut clinics: Vec<ClinicRow> = tables
      .clinics
      .iter()
      .filter(|clinic| city_id.is_none_or(|city_id| clinic.city_id == city_id))
      .map(|clinic| tables.clinic_row(clinic))
      .collect();
    clinics.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(clinics)
  }

  async fn get_clinic(&self, clinic_id: i64) -> Result<Option<ClinicRow>> {
    self.check_reads()?;
    let tables = self.tables();
    Ok(
      tables
        .clinics
        .iter()
        .find(|clinic| clinic.id == clinic_id)
        .map(|clinic| tables.clinic_row(clinic)),
    )
  }

  async fn list_vets_by_specialization(&self, specialization_id: i64) -> Result<Vec<VetRow>> {
    self.check_reads()?;
    let tables = self.tables();
    Ok(tables.vets_where(|vet_id| tables.vet_specializations.contains(&(vet_id, specialization_id))))
  }

  async fn list_vets_by_clinic(&self, clinic_id: i64) -> Result<Vec<VetRow>> {
    self.check_reads()?;
    let tables = self.tables();
    Ok(tables.vets_where(|vet_id| {
      tables
        .schedules
        .iter()
        .any(|slot| slot.vet_id == vet_id && slot.clinic_id == clinic_id)
    }))
  }

  async fn list_vets_by_weekday(&self, weekday: i16) -> Result<Vec<VetRow>> {
    self.check_reads()?;
    let tables = self.tables();
    Ok(tables.vets_where(|vet_id| {
      tables
        .schedules
        .iter()
        .any(|slot| slot.vet_id == vet_id && slot.weekday == weekday)
    }))
  }

  async fn get_vet_card(&self, vet_id: i64) -> Result<Option<VetCard>> {
    self.check_reads()?;
    let tables = self.tables();
    let Some(vet) = tables.vets.iter().find(|vet| vet.id == vet_id) else {
      return Ok(None);
    };
    let specializations = tables
      .specialization_ids(vet_id)
      .into_iter()
      .filter_map(|id| tables.specializations.iter().find(|spec| spec.id == id))
      .map(|spec| spec.name.clone())
      .collect();
    let mut schedule: Vec<ScheduleRow> = tables
      .schedules
      .iter()
      .filter(|slot| slot.vet_id == vet_id)
      .map(|slot| ScheduleRow {
        clinic_id: slot.clinic_id,
        clinic_name: tables
          .clinics
          .iter()
          .find(|clinic| clinic.id == slot.clinic_id)
          .map(|clinic| clinic.name.clone())
          .unwrap_or_default(),
        weekday: slot.weekday,
      })
      .collect();
    schedule.sort_by_key(|slot| slot.weekday);
    Ok(Some(VetCard {
      vet: vet.clone(),
      specializations,
      schedule,
      average_rating: None,
      approved_reviews: 0,
    }))
  }

  async fn list_approved_reviews(&self, vet_id: i64, limit: i64) -> Result<Vec<ReviewRow>> {
    self.check_reads()?;
    let mut reviews: Vec<ReviewRow> = self
      .tables()
      .reviews
      .iter()
      .filter(|review| review.vet_id == vet_id && review.status == ReviewStatus::Approved)
      .cloned()
      .collect();
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    reviews.truncate(limit as usize);
    Ok(reviews)
  }

  async fn has_existing_review(&self, user_id: i64, vet_id: i64) -> Result<bool> {
    self.check_reads()?;
    let tables = self.tables();
    Ok(
      tables.reviewed.contains(&(user_id, vet_id))
        || tables
          .reviews
          .iter()
          .any(|review| review.user_id == user_id && review.vet_id == vet_id),
    )
  }

  async fn create_review(&self, review: NewReview) -> Result<i64> {
    self.create_calls.fetch_add(1, Ordering::SeqCst);
    self.check_writes()?;
    let mut tables = self.tables();
    let id = tables.reviews.len() as i64 + 1000;
    tables.created.push(review);
    Ok(id)
  }

  async fn get_review_by_id(&self, review_id: i64) -> Result<Option<ReviewRow>> {
    self.check_reads()?;
    Ok(self.tables().reviews.iter().find(|review| review.id == review_id).cloned())
  }

  async fn list_pending_reviews(&self) -> Result<Vec<ReviewRow>> {
    self.list_pending_calls.fetch_add(1, Ordering::SeqCst);
    self.check_reads()?;
    let mut pending: Vec<ReviewRow> = self
      .tables()
      .reviews
      .iter()
      .filter(|review| review.status == ReviewStatus::Pending)
      .cloned()
      .collect();
    pending.sort_by_key(|review| review.created_at);
    Ok(pending)
  }

  async fn update_review_status(&self, review_id: i64, status: ReviewStatus, moderator_id: i64) -> Result<bool> {
    self.check_writes()?;
    let mut tables = self.tables();
    let Some(review) = tables
      .reviews
      .iter_mut()
      .find(|review| review.id == review_id && review.status == ReviewStatus::Pending)
    else {
      return Ok(false);
    };
    review.status = status;
    review.moderated_by = Some(moderator_id);
    review.moderated_at = Some(Utc::now());
    tables.status_updates.push((review_id, status, moderator_id));
    Ok(true)
  }

  async fn stats(&self) -> Result<StatsRow> {
    self.check_reads()?;
    let tables = self.tables();
    let count = |status: ReviewStatus| tables.reviews.iter().filter(|review| review.status == status).count() as i64;
    Ok(StatsRow {
      users: tables.users.len() as i64,
      vets: tables.vets.len() as i64,
      clinics: tables.clinics.len() as i64,
      pending_reviews: count(ReviewStatus::Pending),
      approved_reviews: count(ReviewStatus::Approved),
      rejected_reviews: count(ReviewStatus::Rejected),
    })
  }

  async fn export_reference_data(&self) -> Result<ReferenceData> {
    self.check_reads()?;
    let tables = self.tables();
    let vets = tables
      .vets
      .iter()
      .map(|vet| VetRecord {
        id: vet.id,
        full_name: vet.full_name.clone(),
        description: vet.description.clone(),
        specializations: tables
          .specialization_ids(vet.id)
          .iter()
          .map(i64::to_string)
          .collect::<Vec<_>>()
          .join(";"),
      })
      .collect();
    Ok(ReferenceData {
      cities: tables.cities.clone(),
      specializations: tables.specializations.clone(),
      clinics: tables.clinics.clone(),
      vets,
      schedules: tables.schedules.clone(),
    })
  }

  async fn import_reference_rows(&self, rows: ReferenceRows) -> Result<usize> {
    self.check_writes()?;
    let mut tables = self.tables();
    tables.check_reference(&rows)?;
    match &rows {
      ReferenceRows::Cities(records) => upsert_by_id(&mut tables.cities, records, |city| city.id),
      ReferenceRows::Specializations(records) => upsert_by_id(&mut tables.specializations, records, |spec| spec.id),
      ReferenceRows::Clinics(records) => upsert_by_id(&mut tables.clinics, records, |clinic| clinic.id),
      ReferenceRows::Vets(records) => {
        let vets: Vec<VetRow> = records
          .iter()
          .map(|record| VetRow {
            id: record.id,
            full_name: record.full_name.clone(),
            description: record.description.clone(),
          })
          .collect();
        upsert_by_id(&mut tables.vets, &vets, |vet| vet.id);
        for record in records {
          tables.vet_specializations.retain(|(vet_id, _)| *vet_id != record.id);
          for spec_id in record.specialization_ids().map_err(anyhow::Error::msg)? {
            tables.vet_specializations.push((record.id, spec_id));
          }
        }
      },
      ReferenceRows::Schedules(records) => {
        tables
          .schedules
          .retain(|slot| !records.iter().any(|record| record.vet_id == slot.vet_id));
        for record in records {
          if !tables.schedules.contains(record) {
            tables.schedules.push(record.clone());
          }
        }
      },
    }
    Ok(rows.len())
  }
}

#[derive(Debug, Clone)]
pub struct SentMessage {
  pub chat: ChatId,
  pub text: String,
  pub markup: Option<ReplyMarkup>,
}

#[derive(Debug, Clone)]
pub struct SentDocument {
  pub chat: ChatId,
  pub file_name: String,
  pub content: Vec<u8>,
}

#[derive(Default)]
pub struct RecordingMessenger {
  sent: Mutex<Vec<SentMessage>>,
  edits: Mutex<Vec<(ChatId, MessageId, String)>>,
  acks: Mutex<Vec<(String, Option<String>)>>,
  documents: Mutex<Vec<SentDocument>>,
  files: Mutex<HashMap<String, Vec<u8>>>,
  failing: Mutex<HashSet<i64>>,
}

impl RecordingMessenger {
  pub fn fail_chat(&self, chat: i64) {
    self.failing.lock().expect("failing lock").insert(chat);
  }

  pub fn texts_to(&self, chat: i64) -> Vec<String> {
    self
      .sent
      .lock()
      .expect("sent lock")
      .iter()
      .filter(|message| message.chat == ChatId(chat))
      .map(|message| message.text.clone())
      .collect()
  }

  pub fn last_text_to(&self, chat: i64) -> Option<String> {
    self.texts_to(chat).pop()
  }

  pub fn edits_to(&self, chat: i64) -> usize {
    self
      .edits
      .lock()
      .expect("edits lock")
      .iter()
      .filter(|(edit_chat, _, _)| *edit_chat == ChatId(chat))
      .count()
  }

  pub fn ack_count(&self) -> usize {
    self.acks.lock().expect("acks lock").len()
  }

  pub fn last_ack(&self) -> Option<Option<String>> {
    self.acks.lock().expect("acks lock").last().map(|(_, toast)| toast.clone())
  }

  pub fn documents_to(&self, chat: i64) -> Vec<SentDocument> {
    self
      .documents
      .lock()
      .expect("documents lock")
      .iter()
      .filter(|document| document.chat == ChatId(chat))
      .cloned()
      .collect()
  }

  pub fn add_file(&self, file_id: &str, content: &[u8]) {
    self
      .files
      .lock()
      .expect("files lock")
      .insert(file_id.to_string(), content.to_vec());
  }
}

#[async_trait]
impl Messenger for RecordingMessenger {
  async fn send_message(&self, chat: ChatId, text: String, markup: Option<ReplyMarkup>) -> Result<()> {
    if self.failing.lock().expect("failing lock").contains(&chat.0) {
      return Err(anyhow!("chat {chat} unreachable"));
    }
    self.sent.lock().expect("sent lock").push(SentMessage { chat, text, markup });
    Ok(())
  }

  async fn answer_callback(&self, query_id: String, toast: Option<String>) -> Result<()> {
    self.acks.lock().expect("acks lock").push((query_id, toast));
    Ok(())
  }

  async fn edit_message(
    &self,
    chat: ChatId,
    message_id: MessageId,
    text: String,
    _markup: Option<InlineKeyboardMarkup>,
  ) -> Result<()> {
    self.edits.lock().expect("edits lock").push((chat, message_id, text));
    Ok(())
  }

  async fn send_document(&self, chat: ChatId, file_name: String, content: Vec<u8>, _caption: Option<String>) -> Result<()> {
    self.documents.lock().expect("documents lock").push(SentDocument {
      chat,
      file_name,
      content,
    });
    Ok(())
  }

  async fn download_file(&self, file_id: String) -> Result<Vec<u8>> {
    self
      .files
      .lock()
      .expect("files lock")
      .get(&file_id)
      .cloned()
      .ok_or_else(|| anyhow!("file {file_id} not found"))
  }
}

pub struct Harness {
  pub ctx: AppContext,
  pub storage: Arc<MemoryStorage>,
  pub messenger: Arc<RecordingMessenger>,
  next_query: AtomicUsize,
}

impl Harness {
  pub fn new(admins: Vec<i64>) -> Self {
    let storage = Arc::new(MemoryStorage::default());
    let messenger = Arc::new(RecordingMessenger::default());
    let ctx = AppContext::new(
      storage.clone(),
      messenger.clone(),
      Arc::new(StaticAdmins::new(admins)),
      Arc::new(StateStore::new(None)),
    );
    Self {
      ctx,
      storage,
      messenger,
      next_query: AtomicUsize::new(0),
    }
  }

  fn sender(user: i64) -> Sender {
    Sender::new(user, ChatId(user))
  }

  pub fn text(&self, user: i64, text: &str) -> IncomingEvent {
    IncomingEvent::Text {
      sender: Self::sender(user),
      text: text.to_string(),
    }
  }

  pub fn command(&self, user: i64, command: Command) -> IncomingEvent {
    IncomingEvent::Command {
      sender: Self::sender(user),
      command,
    }
  }

  pub fn document(&self, user: i64, file_id: &str, file_name: &str, size: u32) -> IncomingEvent {
    IncomingEvent::Document {
      sender: Self::sender(user),
      file_id: file_id.to_string(),
      file_name: Some(file_name.to_string()),
      size,
    }
  }

  pub fn callback(&self, user: i64, data: &str) -> IncomingEvent {
    let query = self.next_query.fetch_add(1, Ordering::SeqCst);
    IncomingEvent::Callback {
      sender: Self::sender(user),
      query_id: format!("query-{query}"),
      message_id: Some(MessageId(100)),
      data: data.to_string(),
    }
  }
}
