use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
  /// Open the main menu
  Start,
  /// Show the help text
  Help,
  /// Find a vet by specialization, city, clinic or day
  Search,
  /// Cancel the current step
  Cancel,
  /// Review the moderation queue (admins)
  Moderate,
  /// Show bot statistics (admins)
  Stats,
  /// Download the reference tables as CSV files (admins)
  Export,
}
