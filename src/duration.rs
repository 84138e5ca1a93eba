//! Conversion between clock-style durations typed by a person (`HH:MM:SS`)
//! and the ISO-8601 durations the backend stores (`PT1H2M3S`).

use std::fmt;

use crate::error::FormatError;

/// A duration in whole seconds, rendered in ISO-8601 form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalDuration {
  secs: u64,
}

impl CanonicalDuration {
  pub fn from_secs(secs: u64) -> Self {
    Self { secs }
  }

  pub fn as_secs(self) -> u64 {
    self.secs
  }

  /// Parse an ISO-8601 duration such as `PT1H2M3S`, `P1DT4M` or `PT3.5S`.
  /// Fractional seconds are truncated. Years, months and weeks are rejected.
  pub fn parse_iso(s: &str) -> Option<Self> {
    let rest = s.trim().strip_prefix('P')?;
    if rest.is_empty() {
      return None;
    }
    let (date_part, time_part) = match rest.split_once('T') {
      Some((_, "")) => return None,
      Some((d, t)) => (d, Some(t)),
      None => (rest, None),
    };

    let mut secs: u64 = 0;
    match components(date_part)?.as_slice() {
      [] => {}
      [(value, 'D')] => secs = whole(value)?.checked_mul(86_400)?,
      _ => return None,
    }
    if let Some(time_part) = time_part {
      // Units must appear in H, M, S order, each at most once.
      let mut next_rank = 0;
      for (value, unit) in components(time_part)? {
        let (rank, factor) = match unit {
          'H' => (0, 3600),
          'M' => (1, 60),
          'S' => (2, 1),
          _ => return None,
        };
        if rank < next_rank {
          return None;
        }
        next_rank = rank + 1;
        let amount = if unit == 'S' { seconds(value)? } else { whole(value)? };
        secs = secs.checked_add(amount.checked_mul(factor)?)?;
      }
    }
    Some(Self { secs })
  }
}

/// Split `1H2M3S` into `[("1", 'H'), ("2", 'M'), ("3", 'S')]`.
fn components(s: &str) -> Option<Vec<(&str, char)>> {
  let mut out = Vec::new();
  let mut start = 0;
  for (i, c) in s.char_indices() {
    if c.is_ascii_alphabetic() {
      if i == start {
        return None;
      }
      out.push((&s[start..i], c));
      start = i + 1;
    }
  }
  if start != s.len() {
    return None;
  }
  Some(out)
}

fn whole(value: &str) -> Option<u64> {
  if !value.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  value.parse().ok()
}

fn seconds(value: &str) -> Option<u64> {
  match value.split_once(['.', ',']) {
    Some((int, frac)) if !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()) => whole(int),
    Some(_) => None,
    None => whole(value),
  }
}

impl fmt::Display for CanonicalDuration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (h, m, s) = (self.secs / 3600, self.secs % 3600 / 60, self.secs % 60);
    if self.secs == 0 {
      return f.write_str("PT0S");
    }
    f.write_str("PT")?;
    if h > 0 {
      write!(f, "{h}H")?;
    }
    if m > 0 {
      write!(f, "{m}M")?;
    }
    if s > 0 {
      write!(f, "{s}S")?;
    }
    Ok(())
  }
}

/// Validate a `HH:MM:SS` entry and convert it to its canonical form.
///
/// Each field must be exactly two digits. Out-of-range minutes or seconds
/// (e.g. `00:75:00`) are accepted and carried into the next unit.
pub fn parse_entered(s: &str) -> Result<CanonicalDuration, FormatError> {
  let reject = || FormatError::Duration(s.to_string());
  let b = s.as_bytes();
  if b.len() != 8 || b[2] != b':' || b[5] != b':' {
    return Err(reject());
  }
  let field = |i: usize| -> Option<u64> {
    let (hi, lo) = (b[i], b[i + 1]);
    (hi.is_ascii_digit() && lo.is_ascii_digit()).then(|| u64::from(hi - b'0') * 10 + u64::from(lo - b'0'))
  };
  let (Some(h), Some(m), Some(sec)) = (field(0), field(3), field(6)) else {
    return Err(reject());
  };
  Ok(CanonicalDuration::from_secs(h * 3600 + m * 60 + sec))
}

/// Render an ISO-8601 duration as `HH:MM:SS`, or `MM:SS` when under an hour.
/// Returns an empty string for anything unparseable.
pub fn format_for_display(iso: &str) -> String {
  let Some(d) = CanonicalDuration::parse_iso(iso) else {
    return String::new();
  };
  let secs = d.as_secs();
  let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
  if h == 0 { format!("{:02}:{:02}", m, s) } else { format!("{:02}:{:02}:{:02}", h, m, s) }
}
