use anyhow::Context;
use chrono::Utc;
use futures::future::join_all;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::MessageId;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::HandlerResult;
use crate::bot::context::AppContext;
use crate::bot::events::CallbackAction;
use crate::bot::events::Sender;
use crate::bot::render;
use crate::bot::state::StateTag;
use crate::bot::state::keys;
use crate::models::NewReview;
use crate::models::ReviewStatus;
use crate::models::UserRow;
use crate::util::CommentError;
use crate::util::rating_stars;
use crate::util::validate_comment;

const RATING_RANGE: std::ops::RangeInclusive<i64> = 1 ..= 5;

#[derive(Debug, Error)]
enum ReviewError {
  #[error(transparent)]
  Storage(#[from] anyhow::Error),
  #[error("user is not registered")]
  NotRegistered,
  #[error("draft is missing {0}")]
  MissingDraft(&'static str),
}

impl ReviewError {
  fn user_message(&self) -> &'static str {
    match self {
      Self::Storage(_) => "⚠️ Could not save your review. Please try again later.",
      Self::NotRegistered => render::NOT_REGISTERED_TEXT,
      Self::MissingDraft(_) => "⚠️ Your review draft was lost. Please start again from the vet card.",
    }
  }
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn start_review(ctx: &AppContext, sender: &Sender, vet_id: i64) -> anyhow::Result<Option<String>> {
  let user = match ensure_user(ctx, sender).await {
    Ok(user) => user,
    Err(err) => {
      warn!(error = %err, "could not resolve user before review");
      ctx.send(sender.chat, err.user_message()).await?;
      return Ok(None);
    },
  };

  let Some(card) = ctx.storage().get_vet_card(vet_id).await? else {
    return Ok(Some("❓ Vet not found".to_string()));
  };

  if ctx.storage().has_existing_review(user.id, vet_id).await? {
    info!(vet_id, "user already reviewed this vet");
    ctx
      .send(
        sender.chat,
        format!("ℹ️ You have already reviewed {}.", card.vet.full_name),
      )
      .await?;
    return Ok(None);
  }

  let states = ctx.states();
  states.clear_data(sender.platform_id).await;
  states.set_state(sender.platform_id, StateTag::AwaitingRating).await;
  states.set_data(sender.platform_id, keys::REVIEW_VET_ID, vet_id).await;
  info!(vet_id, state = %StateTag::AwaitingRating, "review flow started");

  ctx
    .send_with(
      sender.chat,
      render::rating_prompt(&card.vet.full_name),
      render::rating_keyboard(),
    )
    .await?;
  Ok(Some("✍️ Starting your review".to_string()))
}

// Ratings outside 1-5 and presses outside the rating step change nothing.
#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn apply_rating(
  ctx: &AppContext,
  sender: &Sender,
  rating: i64,
  message_id: Option<MessageId>,
) -> anyhow::Result<Option<String>> {
  let states = ctx.states();
  let tag = states.get_state(sender.platform_id).await;
  if tag != StateTag::AwaitingRating {
    info!(state = %tag, "rating outside rating step ignored");
    return Ok(Some(render::STALE_BUTTON_TOAST.to_string()));
  }
  if !RATING_RANGE.contains(&rating) {
    warn!(rating, "rating out of range ignored");
    return Ok(None);
  }
  if states
    .get_data_as_int(sender.platform_id, keys::REVIEW_VET_ID)
    .await
    .is_none()
  {
    fail_flow(ctx, sender, ReviewError::MissingDraft(keys::REVIEW_VET_ID)).await?;
    return Ok(None);
  }

  let rating = rating as i16;
  states.set_data(sender.platform_id, keys::REVIEW_RATING, rating).await;
  states.set_state(sender.platform_id, StateTag::AwaitingComment).await;
  info!(rating, state = %StateTag::AwaitingComment, "rating stored");

  if let Some(message_id) = message_id
    && let Err(err) = ctx
      .messenger()
      .edit_message(
        sender.chat,
        message_id,
        format!("Your rating: {}", rating_stars(rating)),
        None,
      )
      .await
  {
    warn!(error = %err, "failed to collapse rating keyboard");
  }

  ctx
    .send_with(sender.chat, render::comment_prompt(rating), render::cancel_review_keyboard())
    .await?;
  Ok(Some("⭐ Rating saved".to_string()))
}

#[instrument(skip(ctx, sender, text), fields(user_id = sender.platform_id))]
pub async fn handle_message(ctx: &AppContext, sender: &Sender, tag: StateTag, text: &str) -> HandlerResult {
  match tag {
    StateTag::AwaitingRating => match text.trim().parse::<i64>() {
      Ok(rating) if RATING_RANGE.contains(&rating) => {
        apply_rating(ctx, sender, rating, None).await?;
        Ok(())
      },
      _ => {
        ctx
          .send_with(
            sender.chat,
            "⭐ Please choose a rating from 1 to 5 with the buttons.",
            render::rating_keyboard(),
          )
          .await
      },
    },
    StateTag::AwaitingComment => submit_comment(ctx, sender, text).await,
    other => {
      warn!(state = %other, "review driver received foreign state");
      Ok(())
    },
  }
}

async fn submit_comment(ctx: &AppContext, sender: &Sender, text: &str) -> HandlerResult {
  let comment = match validate_comment(text) {
    Ok(comment) => comment,
    Err(CommentError::TooLong(length)) => {
      info!(length, "comment rejected as too long");
      return ctx
        .send(
          sender.chat,
          format!(
            "✂️ Your comment is {length} characters long. Please keep it within {} characters and send it again.",
            crate::util::MAX_COMMENT_CHARS
          ),
        )
        .await;
    },
    Err(CommentError::Empty) => {
      return ctx.send(sender.chat, "✍️ The comment cannot be empty. Please write a few words.").await;
    },
  };

  match persist_review(ctx, sender, comment).await {
    Ok((review_id, vet_id)) => {
      ctx.states().clear_state(sender.platform_id).await;
      info!(review_id, vet_id, "review submitted for moderation");
      ctx
        .send(
          sender.chat,
          format!("✅ Thank you! Your review #{review_id} was sent for moderation."),
        )
        .await?;
      notify_moderators(ctx, review_id, vet_id).await;
      Ok(())
    },
    Err(err) => fail_flow(ctx, sender, err).await,
  }
}

async fn persist_review(ctx: &AppContext, sender: &Sender, comment: String) -> Result<(i64, i64), ReviewError> {
  let states = ctx.states();
  let vet_id = states
    .get_data_as_int(sender.platform_id, keys::REVIEW_VET_ID)
    .await
    .ok_or(ReviewError::MissingDraft(keys::REVIEW_VET_ID))?;
  let rating = states
    .get_data_as_int(sender.platform_id, keys::REVIEW_RATING)
    .await
    .and_then(|value| i16::try_from(value).ok())
    .ok_or(ReviewError::MissingDraft(keys::REVIEW_RATING))?;

  let user = ctx
    .storage()
    .find_user_by_platform_id(sender.platform_id)
    .await?
    .ok_or(ReviewError::NotRegistered)?;

  let review = NewReview {
    vet_id,
    user_id: user.id,
    rating,
    comment,
    status: ReviewStatus::Pending,
    created_at: Utc::now(),
  };
  let review_id = ctx
    .storage()
    .create_review(review)
    .await
    .context("failed to create review")?;
  Ok((review_id, vet_id))
}

async fn fail_flow(ctx: &AppContext, sender: &Sender, err: ReviewError) -> HandlerResult {
  match &err {
    ReviewError::MissingDraft(key) => error!(key = *key, "review draft incomplete, resetting flow"),
    ReviewError::NotRegistered => warn!("review author not registered"),
    ReviewError::Storage(cause) => warn!(error = %cause, "review storage failure"),
  }
  ctx.states().clear_state(sender.platform_id).await;
  ctx.send(sender.chat, err.user_message()).await
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn cancel(ctx: &AppContext, sender: &Sender) -> anyhow::Result<Option<String>> {
  ctx.states().clear_state(sender.platform_id).await;
  info!("review flow cancelled");
  ctx.send(sender.chat, "❌ Review cancelled.").await?;
  Ok(Some("Cancelled".to_string()))
}

async fn ensure_user(ctx: &AppContext, sender: &Sender) -> Result<UserRow, ReviewError> {
  if let Some(user) = ctx.storage().find_user_by_platform_id(sender.platform_id).await? {
    return Ok(user);
  }
  ctx
    .storage()
    .upsert_user(
      sender.platform_id,
      sender.username.clone(),
      sender.first_name.clone(),
      sender.last_name.clone(),
    )
    .await?;
  ctx
    .storage()
    .find_user_by_platform_id(sender.platform_id)
    .await?
    .ok_or(ReviewError::NotRegistered)
}

async fn notify_moderators(ctx: &AppContext, review_id: i64, vet_id: i64) {
  let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
    "🛡️ Open queue",
    CallbackAction::ModerationList.to_string(),
  )]]);
  let text = format!("🆕 Review #{review_id} for vet #{vet_id} is awaiting moderation.");
  let moderators = ctx.moderators();
  let deliveries = join_all(
    moderators
      .iter()
      .map(|admin_id| ctx.send_with(ChatId(*admin_id), text.clone(), keyboard.clone())),
  )
  .await;
  for (admin_id, delivery) in moderators.iter().zip(deliveries) {
    if let Err(err) = delivery {
      warn!(error = %err, admin_id, review_id, "failed to notify moderator");
    }
  }
}
