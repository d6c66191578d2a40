use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::KeyboardButton;
use teloxide::types::KeyboardMarkup;

use crate::bot::events::CallbackAction;
use crate::models::CityRow;
use crate::models::ClinicRow;
use crate::models::ReviewRow;
use crate::models::SpecializationRow;
use crate::models::StatsRow;
use crate::models::VetCard;
use crate::models::VetRow;
use crate::util::MAX_COMMENT_CHARS;
use crate::util::rating_stars;
use crate::util::truncate_text;
use crate::util::weekday_name;

pub const MENU_FIND_VET: &str = "🔍 Find a vet";
pub const MENU_CLINICS: &str = "🏥 Clinics";
pub const MENU_HELP: &str = "ℹ️ Help";
pub const MENU_MODERATION: &str = "🛡️ Moderation";
pub const MENU_STATS: &str = "📊 Statistics";

pub const WELCOME_TEXT: &str = "🐾 Welcome! I help you find a veterinarian by specialization, city, clinic or working day.";
pub const SEARCH_MODE_TEXT: &str = "🔍 How would you like to search?";
pub const UNKNOWN_COMMAND_TEXT: &str = "I did not understand that. Use the menu buttons or /help.";
pub const ADMIN_ONLY_TEXT: &str = "⛔ This action is available to administrators only.";
pub const GENERIC_FAILURE_TEXT: &str = "⚠️ Something went wrong. Please try again later.";
pub const NOT_REGISTERED_TEXT: &str = "⚠️ I could not find your profile. Send /start and try again.";
pub const FINISH_FLOW_TEXT: &str = "✋ Finish the current step first, or send /cancel.";
pub const NOTHING_TO_CANCEL_TEXT: &str = "Nothing to cancel.";
pub const STALE_BUTTON_TOAST: &str = "This button is no longer active.";
pub const IMPORT_HINT_TEXT: &str = "📎 Send an edited file from /export back as a document to import it. Rows are matched by id; a vets file replaces the listed vets' specializations and a schedules file replaces the listed vets' working days.";

pub const MODERATION_PAGE_SIZE: usize = 5;
pub const REVIEWS_PAGE_SIZE: i64 = 10;
const BUTTON_TEXT_LIMIT: usize = 48;

pub fn main_menu_keyboard(is_admin: bool) -> KeyboardMarkup {
  let mut rows = vec![
    vec![KeyboardButton::new(MENU_FIND_VET), KeyboardButton::new(MENU_CLINICS)],
    vec![KeyboardButton::new(MENU_HELP)],
  ];
  if is_admin {
    rows.push(vec![KeyboardButton::new(MENU_MODERATION), KeyboardButton::new(MENU_STATS)]);
  }
  KeyboardMarkup::new(rows)
}

fn button(label: impl Into<String>, action: CallbackAction) -> InlineKeyboardButton {
  InlineKeyboardButton::callback(truncate_text(&label.into(), BUTTON_TEXT_LIMIT), action.to_string())
}

fn back_to_search_row() -> Vec<InlineKeyboardButton> {
  vec![button("⬅️ Search", CallbackAction::MenuSearch)]
}

pub fn search_mode_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![
      button("🩺 Specialization", CallbackAction::SearchBySpecialization),
      button("🏙️ City", CallbackAction::SearchByCity),
    ],
    vec![
      button("🏥 Clinic", CallbackAction::SearchByClinic),
      button("📅 Day of week", CallbackAction::SearchByDay),
    ],
  ])
}

fn two_column<T>(entries: &[T], to_button: impl Fn(&T) -> InlineKeyboardButton) -> Vec<Vec<InlineKeyboardButton>> {
  entries
    .chunks(2)
    .map(|row| row.iter().map(&to_button).collect::<Vec<_>>())
    .collect()
}

pub fn specializations_keyboard(specializations: &[SpecializationRow]) -> InlineKeyboardMarkup {
  let mut rows = two_column(specializations, |s| button(s.name.clone(), CallbackAction::Specialization(s.id)));
  rows.push(back_to_search_row());
  InlineKeyboardMarkup::new(rows)
}

pub fn cities_keyboard(cities: &[CityRow]) -> InlineKeyboardMarkup {
  let mut rows = two_column(cities, |c| button(c.name.clone(), CallbackAction::City(c.id)));
  rows.push(back_to_search_row());
  InlineKeyboardMarkup::new(rows)
}

pub fn clinics_keyboard(clinics: &[ClinicRow]) -> InlineKeyboardMarkup {
  let mut rows: Vec<Vec<InlineKeyboardButton>> = clinics
    .iter()
    .map(|clinic| {
      vec![button(
        format!("{} ({})", clinic.name, clinic.city_name),
        CallbackAction::Clinic(clinic.id),
      )]
    })
    .collect();
  rows.push(back_to_search_row());
  InlineKeyboardMarkup::new(rows)
}

pub fn weekdays_keyboard() -> InlineKeyboardMarkup {
  let days: Vec<i16> = (1 ..= 7).collect();
  let mut rows = two_column(&days, |day| button(weekday_name(*day), CallbackAction::Weekday(*day)));
  rows.push(back_to_search_row());
  InlineKeyboardMarkup::new(rows)
}

pub fn vets_keyboard(vets: &[VetRow]) -> InlineKeyboardMarkup {
  let mut rows: Vec<Vec<InlineKeyboardButton>> = vets
    .iter()
    .map(|vet| vec![button(format!("👩‍⚕️ {}", vet.full_name), CallbackAction::Vet(vet.id))])
    .collect();
  rows.push(back_to_search_row());
  InlineKeyboardMarkup::new(rows)
}

pub fn render_clinic(clinic: &ClinicRow) -> String {
  let mut text = format!("🏥 {}\n🏙️ {}", clinic.name, clinic.city_name);
  if let Some(address) = clinic.address.as_deref()
    && !address.trim().is_empty()
  {
    text.push_str(&format!("\n📍 {address}"));
  }
  if let Some(phone) = clinic.phone.as_deref()
    && !phone.trim().is_empty()
  {
    text.push_str(&format!("\n📞 {phone}"));
  }
  text
}

pub fn render_vet_card(card: &VetCard) -> String {
  let mut text = format!("👩‍⚕️ {}", card.vet.full_name);

  if let Some(description) = card.vet.description.as_deref()
    && !description.trim().is_empty()
  {
    text.push_str(&format!("\n\n{description}"));
  }

  if !card.specializations.is_empty() {
    text.push_str(&format!("\n\n🩺 {}", card.specializations.join(", ")));
  }

  if !card.schedule.is_empty() {
    text.push_str("\n\n📅 Schedule:");
    let mut clinics: Vec<(&str, Vec<&str>)> = Vec::new();
    for slot in &card.schedule {
      match clinics.iter_mut().find(|(name, _)| *name == slot.clinic_name) {
        Some((_, days)) => days.push(weekday_name(slot.weekday)),
        None => clinics.push((slot.clinic_name.as_str(), vec![weekday_name(slot.weekday)])),
      }
    }
    for (clinic, days) in clinics {
      text.push_str(&format!("\n• {clinic}: {}", days.join(", ")));
    }
  }

  match card.average_rating {
    Some(average) if card.approved_reviews > 0 => {
      text.push_str(&format!(
        "\n\n⭐ {average:.1} / 5 ({} review(s))",
        card.approved_reviews
      ));
    },
    _ => text.push_str("\n\n⭐ No reviews yet"),
  }
  text
}

pub fn vet_card_keyboard(vet_id: i64) -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![
      button("💬 Reviews", CallbackAction::VetReviews(vet_id)),
      button("✍️ Leave a review", CallbackAction::AddReview(vet_id)),
    ],
    back_to_search_row(),
  ])
}

pub fn render_public_review(review: &ReviewRow) -> String {
  format!(
    "{} — {}\n{}\n🗓 {}",
    rating_stars(review.rating),
    review.author.as_deref().unwrap_or("anonymous"),
    review.comment,
    review.created_at.format("%Y-%m-%d"),
  )
}

pub fn render_review_detail(review: &ReviewRow) -> String {
  format!(
    "📝 Review #{}\n👩‍⚕️ Vet: {} (#{})\n👤 Author: {}\n⭐ Rating: {} ({}/5)\n🗓 Submitted: {}\n📌 Status: {}\n\n{}",
    review.id,
    review.vet_name,
    review.vet_id,
    review.author.as_deref().unwrap_or("unknown"),
    rating_stars(review.rating),
    review.rating,
    review.created_at.format("%Y-%m-%d %H:%M UTC"),
    review.status,
    review.comment,
  )
}

pub fn rating_keyboard() -> InlineKeyboardMarkup {
  let ratings = (1 ..= 5)
    .map(|value| button(format!("{value} ⭐"), CallbackAction::Rate(value)))
    .collect::<Vec<_>>();
  InlineKeyboardMarkup::new(vec![ratings, vec![button("❌ Cancel", CallbackAction::CancelReview)]])
}

pub fn cancel_review_keyboard() -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![vec![button("❌ Cancel", CallbackAction::CancelReview)]])
}

pub fn rating_prompt(vet_name: &str) -> String {
  format!("⭐ How would you rate {vet_name}? Pick 1 to 5.")
}

pub fn comment_prompt(rating: i16) -> String {
  format!(
    "{}\n✍️ Now write a short comment (up to {MAX_COMMENT_CHARS} characters).",
    rating_stars(rating)
  )
}

pub fn render_moderation_queue(pending: &[ReviewRow]) -> String {
  let mut text = format!("🛡️ Reviews awaiting moderation: {}\n", pending.len());
  for review in pending.iter().take(MODERATION_PAGE_SIZE) {
    text.push_str(&format!(
      "\n#{} · {} (vet #{}) · {} {}/5 · {} · {}\n{}\n",
      review.id,
      review.vet_name,
      review.vet_id,
      rating_stars(review.rating),
      review.rating,
      review.author.as_deref().unwrap_or("unknown"),
      review.created_at.format("%Y-%m-%d %H:%M UTC"),
      review.comment,
    ));
  }
  if pending.len() > MODERATION_PAGE_SIZE {
    text.push_str(&format!("\n…and {} more.\n", pending.len() - MODERATION_PAGE_SIZE));
  }
  text.push_str("\nSend a review ID to moderate it, or /cancel to stop.");
  text
}

pub fn moderation_decision_keyboard(review_id: i64) -> InlineKeyboardMarkup {
  InlineKeyboardMarkup::new(vec![
    vec![
      button("✅ Approve", CallbackAction::Approve(review_id)),
      button("🚫 Reject", CallbackAction::Reject(review_id)),
    ],
    vec![button("⬅️ Back to queue", CallbackAction::ModerationList)],
  ])
}

pub fn render_stats(stats: &StatsRow) -> String {
  format!(
    "📊 Statistics\n\n👤 Users: {}\n👩‍⚕️ Vets: {}\n🏥 Clinics: {}\n\n📝 Reviews\n• pending: {}\n• approved: {}\n• rejected: {}",
    stats.users, stats.vets, stats.clinics, stats.pending_reviews, stats.approved_reviews, stats.rejected_reviews,
  )
}
