use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

pub const MAX_COMMENT_CHARS: usize = 500;

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#?(\d{1,18})$").expect("valid regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommentError {
  #[error("comment is empty")]
  Empty,
  #[error("comment is {0} characters long, limit is {limit}", limit = MAX_COMMENT_CHARS)]
  TooLong(usize),
}

// The limit counts what the user sees: grapheme clusters of the text as sent.
pub fn validate_comment(input: &str) -> Result<String, CommentError> {
  let length = input.graphemes(true).count();
  if length > MAX_COMMENT_CHARS {
    return Err(CommentError::TooLong(length));
  }
  let trimmed = input.trim();
  if trimmed.is_empty() {
    return Err(CommentError::Empty);
  }
  Ok(trimmed.to_string())
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("expected a numeric id")]
pub struct InvalidId;

pub fn parse_id(input: &str) -> Result<i64, InvalidId> {
  let captures = ID_PATTERN.captures(input.trim()).ok_or(InvalidId)?;
  let value = captures[1].parse::<i64>().map_err(|_| InvalidId)?;
  if value == 0 {
    return Err(InvalidId);
  }
  Ok(value)
}

pub fn truncate_text(text: &str, max_chars: usize) -> String {
  if text.chars().count() <= max_chars {
    return text.to_string();
  }

  let guarded = max_chars.saturating_sub(3);
  if guarded == 0 {
    return "...".to_string();
  }

  let truncated: String = text.chars().take(guarded).collect();
  format!("{truncated}...")
}

pub fn weekday_name(weekday: i16) -> &'static str {
  match weekday {
    1 => "Monday",
    2 => "Tuesday",
    3 => "Wednesday",
    4 => "Thursday",
    5 => "Friday",
    6 => "Saturday",
    7 => "Sunday",
    _ => "Unknown day",
  }
}

pub fn rating_stars(rating: i16) -> String {
  let filled = rating.clamp(0, 5) as usize;
  format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

#[cfg(test)]
mod tests {
  use super::CommentError;
  use super::InvalidId;
  use super::MAX_COMMENT_CHARS;
  use super::parse_id;
  use super::rating_stars;
  use super::truncate_text;
  use super::validate_comment;

  #[test]
  fn accepts_comment_at_limit() {
    let text = "a".repeat(MAX_COMMENT_CHARS);
    assert_eq!(validate_comment(&text), Ok(text.clone()));
  }

  #[test]
  fn rejects_comment_over_limit() {
    let text = "a".repeat(MAX_COMMENT_CHARS + 1);
    assert_eq!(validate_comment(&text), Err(CommentError::TooLong(501)));
  }

  #[test]
  fn counts_characters_not_bytes() {
    let text = "ё".repeat(MAX_COMMENT_CHARS);
    assert!(text.len() > MAX_COMMENT_CHARS);
    assert!(validate_comment(&text).is_ok());
  }

  #[test]
  fn counts_emoji_and_accents_as_displayed() {
    let family = "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}";
    assert!(validate_comment(&family.repeat(MAX_COMMENT_CHARS)).is_ok());
    assert_eq!(
      validate_comment(&family.repeat(MAX_COMMENT_CHARS + 1)),
      Err(CommentError::TooLong(501))
    );

    let accented = "e\u{301}".repeat(MAX_COMMENT_CHARS);
    assert!(validate_comment(&accented).is_ok());
  }

  #[test]
  fn trims_and_rejects_blank_comments() {
    assert_eq!(validate_comment("  Great vet!  "), Ok("Great vet!".to_string()));
    assert_eq!(validate_comment("   "), Err(CommentError::Empty));
  }

  #[test]
  fn parses_ids() {
    assert_eq!(parse_id("42"), Ok(42));
    assert_eq!(parse_id(" #9 "), Ok(9));
    assert_eq!(parse_id("0"), Err(InvalidId));
    assert_eq!(parse_id("abc"), Err(InvalidId));
    assert_eq!(parse_id("-3"), Err(InvalidId));
  }

  #[test]
  fn truncates_long_text() {
    assert_eq!(truncate_text("short", 10), "short");
    assert_eq!(truncate_text("a very long label", 10), "a very ...");
  }

  #[test]
  fn renders_stars() {
    assert_eq!(rating_stars(4), "★★★★☆");
  }
}
