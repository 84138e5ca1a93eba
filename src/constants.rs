//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!`, so nothing is read from disk
//! at runtime. Parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable client constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  pub default_server_url: String,

  // Paging
  pub default_page_size: u32,
  pub channel_page_size: u32,

  // Tag autocompletion
  pub suggestion_quiet_ms: u64,

  // HTTP
  pub request_timeout_secs: u64,
  pub connect_timeout_secs: u64,

  // Listing output
  pub title_column_width: usize,
}

impl Constants {
  pub fn suggestion_quiet_period(&self) -> Duration {
    Duration::from_millis(self.suggestion_quiet_ms)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed client constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn embedded_constants_parse() {
    let c = constants();
    assert_eq!(c.default_page_size, 10);
    assert!(c.channel_page_size > 0);
    assert_eq!(c.suggestion_quiet_period(), Duration::from_millis(100));
  }
}
