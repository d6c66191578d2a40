use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::MessageId;
use teloxide::utils::command::BotCommands;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::Command;
use crate::bot::HandlerResult;
use crate::bot::context::AppContext;
use crate::bot::events::Sender;
use crate::bot::render;
use crate::models::VetRow;
use crate::util::weekday_name;

type Toast = anyhow::Result<Option<String>>;

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn start(ctx: &AppContext, sender: &Sender) -> HandlerResult {
  if ctx.states().has_state(sender.platform_id).await {
    info!("abandoning unfinished flow");
    ctx.states().clear_state(sender.platform_id).await;
  }
  if let Err(err) = ctx
    .storage()
    .upsert_user(
      sender.platform_id,
      sender.username.clone(),
      sender.first_name.clone(),
      sender.last_name.clone(),
    )
    .await
  {
    warn!(error = %err, "failed to upsert user record");
  }
  let username = sender.username.as_deref().unwrap_or("-");
  info!(chat_id = %sender.chat, username, "received /start command");
  ctx
    .send_with(
      sender.chat,
      render::WELCOME_TEXT,
      render::main_menu_keyboard(ctx.is_admin(sender.platform_id)),
    )
    .await
}

pub async fn help(ctx: &AppContext, sender: &Sender) -> HandlerResult {
  let mut text = Command::descriptions().to_string();
  text.push_str("\n\nSearch from the menu buttons, open a vet card and tap \"Leave a review\" to share your experience.");
  if ctx.is_admin(sender.platform_id) {
    text.push_str("\n\n");
    text.push_str(render::IMPORT_HINT_TEXT);
  }
  ctx.send(sender.chat, text).await
}

pub async fn search_menu(ctx: &AppContext, sender: &Sender, message_id: Option<MessageId>) -> HandlerResult {
  show(ctx, sender, message_id, render::SEARCH_MODE_TEXT.to_string(), render::search_mode_keyboard()).await
}

async fn show(
  ctx: &AppContext,
  sender: &Sender,
  message_id: Option<MessageId>,
  text: String,
  keyboard: InlineKeyboardMarkup,
) -> HandlerResult {
  match message_id {
    Some(message_id) => {
      ctx
        .messenger()
        .edit_message(sender.chat, message_id, text, Some(keyboard))
        .await
    },
    None => ctx.send_with(sender.chat, text, keyboard).await,
  }
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn list_specializations(ctx: &AppContext, sender: &Sender, message_id: Option<MessageId>) -> Toast {
  let specializations = ctx.storage().list_specializations().await?;
  if specializations.is_empty() {
    return Ok(Some("🩺 No specializations yet".to_string()));
  }
  info!(count = specializations.len(), "rendering specializations");
  show(
    ctx,
    sender,
    message_id,
    "🩺 Choose a specialization:".to_string(),
    render::specializations_keyboard(&specializations),
  )
  .await?;
  Ok(None)
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn list_cities(ctx: &AppContext, sender: &Sender, message_id: Option<MessageId>) -> Toast {
  let cities = ctx.storage().list_cities().await?;
  if cities.is_empty() {
    return Ok(Some("🏙️ No cities yet".to_string()));
  }
  show(
    ctx,
    sender,
    message_id,
    "🏙️ Choose a city:".to_string(),
    render::cities_keyboard(&cities),
  )
  .await?;
  Ok(None)
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn list_clinics(
  ctx: &AppContext,
  sender: &Sender,
  city_id: Option<i64>,
  message_id: Option<MessageId>,
) -> Toast {
  let clinics = ctx.storage().list_clinics(city_id).await?;
  if clinics.is_empty() {
    return match message_id {
      Some(_) => Ok(Some("🏥 No clinics found".to_string())),
      None => {
        ctx.send(sender.chat, "🏥 No clinics found.").await?;
        Ok(None)
      },
    };
  }
  info!(count = clinics.len(), city_id, "rendering clinics");
  show(
    ctx,
    sender,
    message_id,
    "🏥 Choose a clinic:".to_string(),
    render::clinics_keyboard(&clinics),
  )
  .await?;
  Ok(None)
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn show_clinic(ctx: &AppContext, sender: &Sender, clinic_id: i64, message_id: Option<MessageId>) -> Toast {
  let Some(clinic) = ctx.storage().get_clinic(clinic_id).await? else {
    return Ok(Some("❓ Clinic not found".to_string()));
  };
  let vets = ctx.storage().list_vets_by_clinic(clinic_id).await?;
  let mut text = render::render_clinic(&clinic);
  text.push_str(if vets.is_empty() {
    "\n\n📭 No vets listed for this clinic yet."
  } else {
    "\n\n👩‍⚕️ Vets:"
  });
  show(ctx, sender, message_id, text, render::vets_keyboard(&vets)).await?;
  Ok(None)
}

pub async fn vets_by_specialization(
  ctx: &AppContext,
  sender: &Sender,
  specialization_id: i64,
  message_id: Option<MessageId>,
) -> Toast {
  let vets = ctx.storage().list_vets_by_specialization(specialization_id).await?;
  show_vet_list(ctx, sender, message_id, "🩺 Vets with this specialization:".to_string(), vets).await
}

pub async fn vets_by_weekday(ctx: &AppContext, sender: &Sender, weekday: i16, message_id: Option<MessageId>) -> Toast {
  let vets = ctx.storage().list_vets_by_weekday(weekday).await?;
  show_vet_list(
    ctx,
    sender,
    message_id,
    format!("📅 Vets working on {}:", weekday_name(weekday)),
    vets,
  )
  .await
}

pub async fn choose_weekday(ctx: &AppContext, sender: &Sender, message_id: Option<MessageId>) -> Toast {
  show(
    ctx,
    sender,
    message_id,
    "📅 Choose a day of the week:".to_string(),
    render::weekdays_keyboard(),
  )
  .await?;
  Ok(None)
}

async fn show_vet_list(
  ctx: &AppContext,
  sender: &Sender,
  message_id: Option<MessageId>,
  title: String,
  vets: Vec<VetRow>,
) -> Toast {
  if vets.is_empty() {
    return Ok(Some("📭 No vets found".to_string()));
  }
  info!(count = vets.len(), "rendering vet list");
  show(ctx, sender, message_id, title, render::vets_keyboard(&vets)).await?;
  Ok(None)
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn show_vet(ctx: &AppContext, sender: &Sender, vet_id: i64) -> Toast {
  let Some(card) = ctx.storage().get_vet_card(vet_id).await? else {
    return Ok(Some("❓ Vet not found".to_string()));
  };
  ctx
    .send_with(sender.chat, render::render_vet_card(&card), render::vet_card_keyboard(vet_id))
    .await?;
  Ok(None)
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn show_reviews(ctx: &AppContext, sender: &Sender, vet_id: i64) -> Toast {
  let reviews = ctx
    .storage()
    .list_approved_reviews(vet_id, render::REVIEWS_PAGE_SIZE)
    .await?;
  if reviews.is_empty() {
    return Ok(Some("💬 No reviews yet".to_string()));
  }
  let mut text = format!("💬 Latest reviews for {}:", reviews[0].vet_name);
  for review in &reviews {
    text.push_str("\n\n");
    text.push_str(&render::render_public_review(review));
  }
  ctx.send(sender.chat, text).await?;
  Ok(None)
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn stats(ctx: &AppContext, sender: &Sender) -> HandlerResult {
  if !ctx.is_admin(sender.platform_id) {
    info!("non-admin asked for statistics");
    return ctx.send(sender.chat, render::ADMIN_ONLY_TEXT).await;
  }
  let stats = ctx.storage().stats().await?;
  ctx.send(sender.chat, render::render_stats(&stats)).await
}
