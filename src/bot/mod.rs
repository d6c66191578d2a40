pub mod catalog;
pub mod commands;
pub mod context;
pub mod events;
pub mod moderation;
pub mod ports;
pub mod reference_io;
pub mod render;
pub mod review_flow;
pub mod router;
pub mod state;
pub mod telegram;

#[cfg(test)]
pub mod testing;

pub type HandlerResult = anyhow::Result<()>;

pub use commands::Command;
pub use context::AppContext;
pub use telegram::build_schema;
