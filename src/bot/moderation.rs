use teloxide::types::MessageId;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::HandlerResult;
use crate::bot::context::AppContext;
use crate::bot::events::Sender;
use crate::bot::render;
use crate::bot::state::ScratchValue;
use crate::bot::state::StateTag;
use crate::bot::state::keys;
use crate::models::ReviewStatus;
use crate::util::parse_id;

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn open_queue(ctx: &AppContext, sender: &Sender) -> HandlerResult {
  if !ctx.is_admin(sender.platform_id) {
    info!("non-admin asked for the moderation queue");
    return ctx.send(sender.chat, render::ADMIN_ONLY_TEXT).await;
  }
  show_queue(ctx, sender, None).await
}

async fn show_queue(ctx: &AppContext, sender: &Sender, notice: Option<String>) -> HandlerResult {
  let states = ctx.states();
  let prefix = notice.map(|line| format!("{line}\n\n")).unwrap_or_default();

  let pending = match ctx.storage().list_pending_reviews().await {
    Ok(pending) => pending,
    Err(err) => {
      warn!(error = %err, "failed to load moderation queue");
      states.clear_state(sender.platform_id).await;
      return ctx
        .send(sender.chat, format!("{prefix}{}", render::GENERIC_FAILURE_TEXT))
        .await;
    },
  };

  if pending.is_empty() {
    states.clear_state(sender.platform_id).await;
    info!("moderation queue empty");
    return ctx
      .send(sender.chat, format!("{prefix}🎉 No reviews are awaiting moderation."))
      .await;
  }

  let text = format!("{prefix}{}", render::render_moderation_queue(&pending));
  let count = pending.len();
  states.clear_state(sender.platform_id).await;
  states.set_state(sender.platform_id, StateTag::ModerationListing).await;
  states
    .set_data(sender.platform_id, keys::MODERATION_QUEUE, pending)
    .await;
  info!(count, state = %StateTag::ModerationListing, "moderation queue shown");
  ctx.send(sender.chat, text).await
}

#[instrument(skip(ctx, sender, text), fields(user_id = sender.platform_id))]
pub async fn handle_message(ctx: &AppContext, sender: &Sender, tag: StateTag, text: &str) -> HandlerResult {
  if !ctx.is_admin(sender.platform_id) {
    info!(state = %tag, "non-admin message in moderation state");
    return ctx.send(sender.chat, render::ADMIN_ONLY_TEXT).await;
  }

  let Ok(review_id) = parse_id(text) else {
    return ctx
      .send(sender.chat, "🔢 Please send the numeric ID of a review from the list, or /cancel.")
      .await;
  };

  let review = match ctx.storage().get_review_by_id(review_id).await {
    Ok(review) => review,
    Err(err) => {
      warn!(error = %err, review_id, "failed to load review");
      ctx.states().clear_state(sender.platform_id).await;
      return ctx.send(sender.chat, render::GENERIC_FAILURE_TEXT).await;
    },
  };

  let Some(review) = review else {
    return ctx
      .send(sender.chat, format!("❓ Review #{review_id} not found. Send another ID."))
      .await;
  };
  // The listing is a snapshot; another admin may have resolved this one since.
  if review.status != ReviewStatus::Pending {
    return ctx
      .send(
        sender.chat,
        format!("ℹ️ Review #{review_id} is already {}. Send another ID.", review.status),
      )
      .await;
  }

  let text = render::render_review_detail(&review);
  let states = ctx.states();
  states
    .set_data(sender.platform_id, keys::MODERATION_REVIEW, review)
    .await;
  states
    .set_state(sender.platform_id, StateTag::ModerationItemSelected)
    .await;
  info!(review_id, state = %StateTag::ModerationItemSelected, "review selected for moderation");
  ctx
    .send_with(sender.chat, text, render::moderation_decision_keyboard(review_id))
    .await
}

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn decide(
  ctx: &AppContext,
  sender: &Sender,
  review_id: i64,
  status: ReviewStatus,
  message_id: Option<MessageId>,
) -> anyhow::Result<Option<String>> {
  if !ctx.is_admin(sender.platform_id) {
    info!(review_id, "non-admin moderation decision refused");
    return Ok(Some(render::ADMIN_ONLY_TEXT.to_string()));
  }

  let states = ctx.states();
  let tag = states.get_state(sender.platform_id).await;
  let selected = match states.get_data(sender.platform_id, keys::MODERATION_REVIEW).await {
    Some(ScratchValue::Review(review)) => Some(review),
    _ => None,
  };
  let Some(selected) = selected.filter(|review| tag == StateTag::ModerationItemSelected && review.id == review_id)
  else {
    info!(review_id, state = %tag, "stale moderation button");
    return Ok(Some(render::STALE_BUTTON_TOAST.to_string()));
  };

  let moderator = match ctx.storage().find_user_by_platform_id(sender.platform_id).await {
    Ok(Some(moderator)) => moderator,
    Ok(None) => {
      warn!(review_id, "moderator has no user record");
      ctx.send(sender.chat, render::NOT_REGISTERED_TEXT).await?;
      return Ok(None);
    },
    Err(err) => {
      warn!(error = %err, review_id, "failed to resolve moderator");
      ctx.send(sender.chat, render::GENERIC_FAILURE_TEXT).await?;
      return Ok(None);
    },
  };

  match ctx
    .storage()
    .update_review_status(review_id, status, moderator.id)
    .await
  {
    Ok(true) => {},
    Ok(false) => {
      info!(review_id, "review was moderated by someone else");
      show_queue(
        ctx,
        sender,
        Some(format!("ℹ️ Review #{review_id} was already moderated by another admin.")),
      )
      .await?;
      return Ok(Some(format!("Review #{review_id} already moderated")));
    },
    Err(err) => {
      warn!(error = %err, review_id, "failed to update review status");
      states.clear_state(sender.platform_id).await;
      ctx.send(sender.chat, render::GENERIC_FAILURE_TEXT).await?;
      return Ok(None);
    },
  }
  info!(review_id, status = %status, moderator_id = moderator.id, "review moderated");

  states
    .remove_data(sender.platform_id, keys::MODERATION_REVIEW)
    .await;

  if let Some(message_id) = message_id
    && let Err(err) = ctx
      .messenger()
      .edit_message(
        sender.chat,
        message_id,
        format!("{}\n\nDecision: {status}", render::render_review_detail(&selected)),
        None,
      )
      .await
  {
    warn!(error = %err, review_id, "failed to collapse decision keyboard");
  }

  let verdict = match status {
    ReviewStatus::Approved => "✅ approved",
    ReviewStatus::Rejected => "🚫 rejected",
    ReviewStatus::Pending => "left pending",
  };
  show_queue(ctx, sender, Some(format!("Review #{review_id} {verdict}."))).await?;
  Ok(Some(format!("Review #{review_id} {verdict}")))
}
