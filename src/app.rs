use std::sync::Arc;
use std::time::Duration;

use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use tracing::debug;

use crate::bot;
use crate::bot::AppContext;
use crate::bot::ports::StaticAdmins;
use crate::bot::state::StateStore;
use crate::bot::telegram::TelegramMessenger;
use crate::config::Config;
use crate::db::Db;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub struct App {
  bot: Bot,
  context: Arc<AppContext>,
  states: Arc<StateStore>,
  handler: UpdateHandler<anyhow::Error>,
}

impl App {
  pub fn new(bot: Bot, db: Db, config: Config) -> Self {
    let states = Arc::new(StateStore::new(config.flow_timeout));
    let context = Arc::new(AppContext::new(
      Arc::new(db),
      Arc::new(TelegramMessenger::new(bot.clone())),
      Arc::new(StaticAdmins::new(config.admins)),
      states.clone(),
    ));
    let handler = bot::build_schema();
    Self {
      bot,
      context,
      states,
      handler,
    }
  }

  pub async fn run(self) -> anyhow::Result<()> {
    let me = self.bot.get_me().await?;

    let states = self.states.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(PURGE_INTERVAL);
      loop {
        ticker.tick().await;
        let purged = states.purge_expired().await;
        if purged > 0 {
          let remaining = states.len().await;
          debug!(purged, remaining, "dropped expired conversation states");
        }
      }
    });

    Dispatcher::builder(self.bot.clone(), self.handler)
      .dependencies(dptree::deps![self.context.clone(), me])
      .enable_ctrlc_handler()
      .build()
      .dispatch()
      .await;

    Ok(())
  }
}
