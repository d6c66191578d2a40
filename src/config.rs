use std::env;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;

const DEFAULT_FLOW_TIMEOUT_MINUTES: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub database_url: String,
  pub admins: Vec<i64>,
  pub flow_timeout: Option<Duration>, // None keeps unfinished flows forever
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let admins_raw = env::var("ADMIN_IDS").unwrap_or_default();
    let admins = parse_admins(&admins_raw);
    let flow_timeout = match env::var("FLOW_TIMEOUT_MINUTES") {
      Ok(raw) => parse_flow_timeout(&raw)?,
      Err(_) => Some(Duration::from_secs(DEFAULT_FLOW_TIMEOUT_MINUTES * 60)),
    };
    Ok(Self {
      bot_token,
      database_url,
      admins,
      flow_timeout,
    })
  }
}

fn parse_admins(raw: &str) -> Vec<i64> {
  raw
    .split(',')
    .filter_map(|id| {
      let trimmed = id.trim();
      if trimmed.is_empty() {
        return None;
      }
      match trimmed.parse::<i64>() {
        Ok(value) => Some(value),
        Err(err) => {
          tracing::warn!(value = trimmed, error = %err, "invalid ADMIN_IDS entry");
          None
        },
      }
    })
    .collect()
}

fn parse_flow_timeout(raw: &str) -> Result<Option<Duration>> {
  let minutes: u64 = raw
    .trim()
    .parse()
    .with_context(|| format!("FLOW_TIMEOUT_MINUTES must be a whole number of minutes, got {raw:?}"))?;
  Ok((minutes > 0).then(|| Duration::from_secs(minutes * 60)))
}
