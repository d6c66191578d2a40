use teloxide::types::MessageId;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::bot::Command;
use crate::bot::HandlerResult;
use crate::bot::catalog;
use crate::bot::context::AppContext;
use crate::bot::events::CallbackAction;
use crate::bot::events::IncomingEvent;
use crate::bot::events::Sender;
use crate::bot::moderation;
use crate::bot::reference_io;
use crate::bot::render;
use crate::bot::review_flow;
use crate::bot::state::Flow;
use crate::models::ReviewStatus;

// Never fails: errors are logged and the user gets a generic failure message.
pub async fn handle_incoming_event(ctx: &AppContext, event: IncomingEvent) {
  let sender = event.sender().clone();
  let _guard = ctx.states().lock_user(sender.platform_id).await;

  if let Err(err) = dispatch(ctx, event).await {
    warn!(user_id = sender.platform_id, chat_id = %sender.chat, error = %err, "event handling failed");
    if let Err(send_err) = ctx.send(sender.chat, render::GENERIC_FAILURE_TEXT).await {
      warn!(user_id = sender.platform_id, error = %send_err, "failed to report handler failure");
    }
  }
}

async fn dispatch(ctx: &AppContext, event: IncomingEvent) -> HandlerResult {
  match event {
    IncomingEvent::Command { sender, command } => handle_command(ctx, &sender, command).await,
    IncomingEvent::Text { sender, text } => handle_text(ctx, &sender, &text).await,
    IncomingEvent::Callback {
      sender,
      query_id,
      message_id,
      data,
    } => {
      info!(user_id = sender.platform_id, chat_id = %sender.chat, callback = %data, "handling callback query");
      let outcome = handle_callback(ctx, &sender, message_id, &data).await;
      let toast = outcome.as_ref().ok().cloned().flatten();
      ctx.messenger().answer_callback(query_id, toast).await?;
      outcome.map(|_| ())
    },
    IncomingEvent::Document {
      sender,
      file_id,
      file_name,
      size,
    } => {
      let tag = ctx.states().get_state(sender.platform_id).await;
      if tag.flow().is_some() {
        info!(user_id = sender.platform_id, state = %tag, "document during active flow");
        return ctx.send(sender.chat, render::FINISH_FLOW_TEXT).await;
      }
      reference_io::import(ctx, &sender, file_id, file_name, size).await
    },
  }
}

async fn handle_command(ctx: &AppContext, sender: &Sender, command: Command) -> HandlerResult {
  let tag = ctx.states().get_state(sender.platform_id).await;
  if let Some(flow) = tag.flow() {
    info!(user_id = sender.platform_id, state = %tag, ?command, "command during active flow");
    return match command {
      Command::Cancel => cancel_flow(ctx, sender, flow).await,
      Command::Start => catalog::start(ctx, sender).await,
      Command::Moderate if flow == Flow::Moderation => moderation::open_queue(ctx, sender).await,
      _ => ctx.send(sender.chat, render::FINISH_FLOW_TEXT).await,
    };
  }

  match command {
    Command::Start => catalog::start(ctx, sender).await,
    Command::Help => catalog::help(ctx, sender).await,
    Command::Search => catalog::search_menu(ctx, sender, None).await,
    Command::Cancel => ctx.send(sender.chat, render::NOTHING_TO_CANCEL_TEXT).await,
    Command::Moderate => moderation::open_queue(ctx, sender).await,
    Command::Stats => catalog::stats(ctx, sender).await,
    Command::Export => reference_io::export(ctx, sender).await,
  }
}

async fn handle_text(ctx: &AppContext, sender: &Sender, text: &str) -> HandlerResult {
  let tag = ctx.states().get_state(sender.platform_id).await;
  if let Some(flow) = tag.flow() {
    if text.trim().eq_ignore_ascii_case("cancel") {
      return cancel_flow(ctx, sender, flow).await;
    }
    return match flow {
      Flow::Review => review_flow::handle_message(ctx, sender, tag, text).await,
      Flow::Moderation => moderation::handle_message(ctx, sender, tag, text).await,
    };
  }

  match text.trim() {
    render::MENU_FIND_VET => catalog::search_menu(ctx, sender, None).await,
    render::MENU_CLINICS => catalog::list_clinics(ctx, sender, None, None).await.map(|_| ()),
    render::MENU_HELP => catalog::help(ctx, sender).await,
    render::MENU_MODERATION => moderation::open_queue(ctx, sender).await,
    render::MENU_STATS => catalog::stats(ctx, sender).await,
    _ => {
      info!(user_id = sender.platform_id, chat_id = %sender.chat, "idle state received unrecognized message");
      ctx.send(sender.chat, render::UNKNOWN_COMMAND_TEXT).await
    },
  }
}

// Button presses are routed by payload alone; the drivers check the stored state.
async fn handle_callback(
  ctx: &AppContext,
  sender: &Sender,
  message_id: Option<MessageId>,
  data: &str,
) -> anyhow::Result<Option<String>> {
  let Some(action) = CallbackAction::parse(data) else {
    debug!(callback = data, "ignoring unknown callback payload");
    return Ok(None);
  };

  match action {
    CallbackAction::MenuSearch => {
      catalog::search_menu(ctx, sender, message_id).await?;
      Ok(None)
    },
    CallbackAction::SearchBySpecialization => catalog::list_specializations(ctx, sender, message_id).await,
    CallbackAction::SearchByCity => catalog::list_cities(ctx, sender, message_id).await,
    CallbackAction::SearchByClinic => catalog::list_clinics(ctx, sender, None, message_id).await,
    CallbackAction::SearchByDay => catalog::choose_weekday(ctx, sender, message_id).await,
    CallbackAction::Specialization(id) => catalog::vets_by_specialization(ctx, sender, id, message_id).await,
    CallbackAction::City(id) => catalog::list_clinics(ctx, sender, Some(id), message_id).await,
    CallbackAction::Clinic(id) => catalog::show_clinic(ctx, sender, id, message_id).await,
    CallbackAction::Weekday(day) => catalog::vets_by_weekday(ctx, sender, day, message_id).await,
    CallbackAction::Vet(id) => catalog::show_vet(ctx, sender, id).await,
    CallbackAction::VetReviews(id) => catalog::show_reviews(ctx, sender, id).await,
    CallbackAction::AddReview(vet_id) => review_flow::start_review(ctx, sender, vet_id).await,
    CallbackAction::Rate(rating) => review_flow::apply_rating(ctx, sender, rating, message_id).await,
    CallbackAction::CancelReview => review_flow::cancel(ctx, sender).await,
    CallbackAction::ModerationList => {
      moderation::open_queue(ctx, sender).await?;
      Ok(None)
    },
    CallbackAction::Approve(id) => moderation::decide(ctx, sender, id, ReviewStatus::Approved, message_id).await,
    CallbackAction::Reject(id) => moderation::decide(ctx, sender, id, ReviewStatus::Rejected, message_id).await,
  }
}

async fn cancel_flow(ctx: &AppContext, sender: &Sender, flow: Flow) -> HandlerResult {
  match flow {
    Flow::Review => review_flow::cancel(ctx, sender).await.map(|_| ()),
    Flow::Moderation => {
      ctx.states().clear_state(sender.platform_id).await;
      info!(user_id = sender.platform_id, "moderation closed");
      ctx.send(sender.chat, "🛡️ Moderation closed.").await
    },
  }
}
