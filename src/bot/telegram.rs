use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::types::CallbackQueryId;
use teloxide::types::ChatId;
use teloxide::types::FileId;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::InputFile;
use teloxide::types::Message;
use teloxide::types::MessageId;
use teloxide::types::ReplyMarkup;
use teloxide::types::User;
use tracing::debug;
use tracing::info;

use crate::bot::Command;
use crate::bot::HandlerResult;
use crate::bot::context::AppContext;
use crate::bot::events::IncomingEvent;
use crate::bot::events::Sender;
use crate::bot::ports::Messenger;
use crate::bot::router::handle_incoming_event;

type SharedContext = Arc<AppContext>;

pub struct TelegramMessenger {
  bot: Bot,
}

impl TelegramMessenger {
  pub fn new(bot: Bot) -> Self {
    Self { bot }
  }
}

#[async_trait]
impl Messenger for TelegramMessenger {
  async fn send_message(&self, chat: ChatId, text: String, markup: Option<ReplyMarkup>) -> Result<()> {
    let request = self.bot.send_message(chat, text);
    match markup {
      Some(markup) => request.reply_markup(markup).await?,
      None => request.await?,
    };
    Ok(())
  }

  async fn answer_callback(&self, query_id: String, toast: Option<String>) -> Result<()> {
    let request = self.bot.answer_callback_query(CallbackQueryId(query_id));
    match toast {
      Some(text) => request.text(text).await?,
      None => request.await?,
    };
    Ok(())
  }

  async fn edit_message(
    &self,
    chat: ChatId,
    message_id: MessageId,
    text: String,
    markup: Option<InlineKeyboardMarkup>,
  ) -> Result<()> {
    let request = self.bot.edit_message_text(chat, message_id, text);
    let result = match markup {
      Some(markup) => request.reply_markup(markup).await,
      None => request.await,
    };
    match result {
      Ok(_) => Ok(()),
      Err(RequestError::Api(ApiError::MessageNotModified)) => {
        debug!(chat_id = %chat, message_id = %message_id, "message already current");
        Ok(())
      },
      Err(err) => Err(err.into()),
    }
  }

  async fn send_document(&self, chat: ChatId, file_name: String, content: Vec<u8>, caption: Option<String>) -> Result<()> {
    let request = self.bot.send_document(chat, InputFile::memory(content).file_name(file_name));
    match caption {
      Some(caption) => request.caption(caption).await?,
      None => request.await?,
    };
    Ok(())
  }

  async fn download_file(&self, file_id: String) -> Result<Vec<u8>> {
    let file = self.bot.get_file(FileId(file_id)).await?;
    let mut content: Vec<u8> = Vec::with_capacity(file.size as usize);
    self.bot.download_file(&file.path, &mut content).await?;
    Ok(content)
  }
}

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  let message_handler = Update::filter_message()
    .branch(dptree::entry().filter_command::<Command>().endpoint(on_command))
    .branch(dptree::endpoint(on_message));

  let callback_handler = Update::filter_callback_query().endpoint(on_callback);

  dptree::entry().branch(message_handler).branch(callback_handler)
}

fn sender_from(user: &User, chat: ChatId) -> Sender {
  Sender {
    platform_id: user.id.0 as i64,
    chat,
    username: user.username.clone(),
    first_name: Some(user.first_name.clone()),
    last_name: user.last_name.clone(),
  }
}

async fn on_command(ctx: SharedContext, msg: Message, command: Command) -> HandlerResult {
  let Some(user) = msg.from.as_ref() else {
    debug!(chat_id = %msg.chat.id, "ignoring command without sender");
    return Ok(());
  };
  let sender = sender_from(user, msg.chat.id);
  handle_incoming_event(&ctx, IncomingEvent::Command { sender, command }).await;
  Ok(())
}

async fn on_message(ctx: SharedContext, msg: Message) -> HandlerResult {
  let Some(user) = msg.from.as_ref() else {
    debug!(chat_id = %msg.chat.id, "ignoring message without sender");
    return Ok(());
  };
  let sender = sender_from(user, msg.chat.id);
  let event = if let Some(document) = msg.document() {
    IncomingEvent::Document {
      sender,
      file_id: document.file.id.0.clone(),
      file_name: document.file_name.clone(),
      size: document.file.size,
    }
  } else if let Some(text) = msg.text() {
    IncomingEvent::Text {
      sender,
      text: text.to_string(),
    }
  } else {
    debug!(chat_id = %msg.chat.id, "ignoring unsupported message");
    return Ok(());
  };
  handle_incoming_event(&ctx, event).await;
  Ok(())
}

async fn on_callback(ctx: SharedContext, query: CallbackQuery) -> HandlerResult {
  let message_ctx = query.message.as_ref().map(|message| (message.chat().id, message.id()));
  let chat = message_ctx.map_or(ChatId(query.from.id.0 as i64), |(chat, _)| chat);
  let sender = sender_from(&query.from, chat);
  let Some(data) = query.data.clone() else {
    info!(user_id = sender.platform_id, "callback without payload");
    ctx.messenger().answer_callback(query.id.to_string(), None).await?;
    return Ok(());
  };
  handle_incoming_event(
    &ctx,
    IncomingEvent::Callback {
      sender,
      query_id: query.id.to_string(),
      message_id: message_ctx.map(|(_, message_id)| message_id),
      data,
    },
  )
  .await;
  Ok(())
}
