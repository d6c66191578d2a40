use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::bot::HandlerResult;
use crate::bot::context::AppContext;
use crate::bot::events::Sender;
use crate::bot::render;
use crate::reference::ImportError;
use crate::reference::MAX_UPLOAD_BYTES;
use crate::reference::ReferenceTable;
use crate::reference::export_table;
use crate::reference::parse_upload;

#[instrument(skip(ctx, sender), fields(user_id = sender.platform_id))]
pub async fn export(ctx: &AppContext, sender: &Sender) -> HandlerResult {
  if !ctx.is_admin(sender.platform_id) {
    info!("non-admin asked for a reference export");
    return ctx.send(sender.chat, render::ADMIN_ONLY_TEXT).await;
  }

  let data = ctx.storage().export_reference_data().await?;
  for table in ReferenceTable::ALL {
    let content = export_table(table, &data)?;
    ctx
      .messenger()
      .send_document(sender.chat, table.file_name().to_string(), content, None)
      .await?;
  }
  info!(
    cities = data.cities.len(),
    clinics = data.clinics.len(),
    vets = data.vets.len(),
    "reference data exported"
  );
  ctx.send(sender.chat, render::IMPORT_HINT_TEXT).await
}

#[instrument(skip(ctx, sender, file_id), fields(user_id = sender.platform_id))]
pub async fn import(
  ctx: &AppContext,
  sender: &Sender,
  file_id: String,
  file_name: Option<String>,
  size: u32,
) -> HandlerResult {
  if !ctx.is_admin(sender.platform_id) {
    info!("non-admin sent a document");
    return ctx.send(sender.chat, render::UNKNOWN_COMMAND_TEXT).await;
  }

  let file_name = file_name.unwrap_or_default();
  if ReferenceTable::from_file_name(&file_name).is_none() {
    return ctx
      .send(sender.chat, ImportError::UnknownFile(file_name).user_message())
      .await;
  }
  if size > MAX_UPLOAD_BYTES {
    return ctx.send(sender.chat, ImportError::TooLarge.user_message()).await;
  }

  let content = ctx.messenger().download_file(file_id).await?;
  let rows = match parse_upload(&file_name, &content) {
    Ok(rows) => rows,
    Err(err) => {
      info!(error = %err, %file_name, "reference upload rejected");
      return ctx.send(sender.chat, err.user_message()).await;
    },
  };

  let table = rows.table();
  match ctx.storage().import_reference_rows(rows).await {
    Ok(count) => {
      info!(%table, count, "reference upload imported");
      ctx
        .send(sender.chat, format!("✅ Imported {count} rows into {table}."))
        .await
    },
    Err(err) => {
      warn!(%table, error = %err, "reference import failed");
      ctx
        .send(
          sender.chat,
          format!("❌ Import into {table} failed, nothing was changed. Check that every referenced id exists."),
        )
        .await
    },
  }
}
