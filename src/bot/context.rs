use std::sync::Arc;

use anyhow::Result;
use teloxide::types::ChatId;
use teloxide::types::ReplyMarkup;

use crate::bot::ports::AdminPolicy;
use crate::bot::ports::Messenger;
use crate::bot::ports::Storage;
use crate::bot::state::StateStore;

#[derive(Clone)]
pub struct AppContext {
  storage: Arc<dyn Storage>,
  messenger: Arc<dyn Messenger>,
  admins: Arc<dyn AdminPolicy>,
  states: Arc<StateStore>,
}

impl AppContext {
  pub fn new(
    storage: Arc<dyn Storage>,
    messenger: Arc<dyn Messenger>,
    admins: Arc<dyn AdminPolicy>,
    states: Arc<StateStore>,
  ) -> Self {
    Self {
      storage,
      messenger,
      admins,
      states,
    }
  }

  pub fn storage(&self) -> &dyn Storage {
    self.storage.as_ref()
  }

  pub fn messenger(&self) -> &dyn Messenger {
    self.messenger.as_ref()
  }

  pub fn states(&self) -> &StateStore {
    &self.states
  }

  pub fn is_admin(&self, platform_id: i64) -> bool {
    self.admins.is_admin(platform_id)
  }

  pub fn moderators(&self) -> Vec<i64> {
    self.admins.moderators()
  }

  pub async fn send(&self, chat: ChatId, text: impl Into<String> + Send) -> Result<()> {
    self.messenger.send_message(chat, text.into(), None).await
  }

  pub async fn send_with(
    &self,
    chat: ChatId,
    text: impl Into<String> + Send,
    markup: impl Into<ReplyMarkup> + Send,
  ) -> Result<()> {
    self
      .messenger
      .send_message(chat, text.into(), Some(markup.into()))
      .await
  }
}
