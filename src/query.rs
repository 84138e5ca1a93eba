//! Search filters and their flat URL query-parameter form.
//!
//! The same parameters appear in the browser's address bar and in the
//! `/api/search` request, so `encode_at` and `decode_at` must round-trip:
//! `decode_at(&encode_at(f, now), now)` yields `f` back for every valid
//! filter. Missing date bounds are written as sentinels (the Unix epoch and
//! midnight UTC tomorrow) and read back as missing.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};

use crate::constants::constants;
use crate::error::FormatError;

pub const TIME_RANGE: &str = "timeRange";
pub const TALENTS: &str = "talents";
pub const STREAM_TYPES: &str = "tags";
pub const SEARCH_KEYS: &str = "searchKeys";
pub const TIME_DESCENDING: &str = "timeDescending";
pub const PAGE_SIZE: &str = "pageSize";
pub const PAGE: &str = "page";

/// Filter behind the search view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
  pub start_date: Option<DateTime<Utc>>,
  pub end_date: Option<DateTime<Utc>>,
  pub talents: Vec<String>,
  pub stream_types: Vec<String>,
  pub keywords: String,
  pub sort_descending_by_upload_date: bool,
  pub page_size: u32,
}

impl Default for SearchFilter {
  fn default() -> Self {
    Self {
      start_date: None,
      end_date: None,
      talents: Vec::new(),
      stream_types: Vec::new(),
      keywords: String::new(),
      sort_descending_by_upload_date: false,
      page_size: constants().default_page_size,
    }
  }
}

impl SearchFilter {
  /// True when nothing narrows the search: no dates, no tags, no keywords.
  ///
  /// This is different from a filter spanning the full date range
  /// explicitly, which has both bounds set.
  pub fn is_empty(&self) -> bool {
    self.start_date.is_none()
      && self.end_date.is_none()
      && self.talents.is_empty()
      && self.stream_types.is_empty()
      && self.keywords.is_empty()
  }

  /// Add a talent tag, ignoring blanks and duplicates.
  pub fn add_talent(&mut self, tag: &str) {
    push_tag(&mut self.talents, tag);
  }

  /// Add a stream-type tag, ignoring blanks and duplicates.
  pub fn add_stream_type(&mut self, tag: &str) {
    push_tag(&mut self.stream_types, tag);
  }

  /// One-line description of the active filter, e.g.
  /// `Showing result from 2023-01-01 to 2023-02-01 on Alice, Singing`.
  pub fn summary(&self) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(start) = self.start_date {
      parts.push(format!("from {}", start.format("%Y-%m-%d")));
    }
    if let Some(end) = self.end_date {
      parts.push(format!("to {}", end.format("%Y-%m-%d")));
    }
    let tags: Vec<&str> = self.talents.iter().chain(&self.stream_types).map(String::as_str).collect();
    if !tags.is_empty() {
      parts.push(format!("on {}", tags.join(", ")));
    }
    if !self.keywords.is_empty() {
      parts.push(format!("matching \"{}\"", self.keywords));
    }
    if parts.is_empty() { None } else { Some(format!("Showing result {}", parts.join(" "))) }
  }
}

fn push_tag(tags: &mut Vec<String>, tag: &str) {
  let tag = tag.trim();
  if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
    tags.push(tag.to_string());
  }
}

// --- Date helpers ---

/// `1970-01-01T00:00:00Z`, written when the filter has no start date.
pub fn unix_epoch() -> DateTime<Utc> {
  DateTime::<Utc>::UNIX_EPOCH
}

/// Midnight UTC of the day after `now`, written when the filter has no end date.
pub fn tomorrow(now: DateTime<Utc>) -> DateTime<Utc> {
  let date = now.date_naive().checked_add_days(Days::new(1)).unwrap_or(now.date_naive());
  Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// RFC 3339 with whole seconds and a `Z` suffix, as the backend expects.
pub fn to_iso(t: DateTime<Utc>) -> String {
  t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Read a user-supplied date: `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date_input(s: &str) -> Result<DateTime<Utc>, FormatError> {
  let s = s.trim();
  if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
    return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
  }
  DateTime::parse_from_rfc3339(s).map(|t| t.with_timezone(&Utc)).map_err(|_| FormatError::Date(s.to_string()))
}

// --- Query parameters ---

/// Ordered key/value pairs of a URL query string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }

  /// Set `key`, replacing an existing value in place.
  pub fn insert(&mut self, key: &str, value: impl Into<String>) {
    let value = value.into();
    match self.0.iter_mut().find(|(k, _)| k == key) {
      Some(slot) => slot.1 = value,
      None => self.0.push((key.to_string(), value)),
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// `key=value&...`, leaving `;`, `:` and the other separators the browser
  /// client keeps readable unescaped.
  pub fn to_query_string(&self) -> String {
    self.0.iter().map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v))).collect::<Vec<_>>().join("&")
  }

  /// Parse `a=1&b=2`, with or without a leading `?`. Later duplicates are ignored.
  pub fn parse(query: &str) -> Self {
    let mut params = Self::new();
    for pair in query.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
      let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
      let key = decode_component(k);
      if params.get(&key).is_none() {
        params.0.push((key, decode_component(v)));
      }
    }
    params
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut params = Self::new();
    for (k, v) in iter {
      params.insert(&k.into(), v);
    }
    params
  }
}

const KEEP_LITERAL: [(&str, &str); 8] =
  [("%40", "@"), ("%3A", ":"), ("%24", "$"), ("%2C", ","), ("%3B", ";"), ("%3D", "="), ("%3F", "?"), ("%2F", "/")];

fn encode_component(s: &str) -> String {
  let mut out = urlencoding::encode(s).into_owned();
  for (escaped, literal) in KEEP_LITERAL {
    out = out.replace(escaped, literal);
  }
  out
}

fn decode_component(s: &str) -> String {
  let spaced = s.replace('+', " ");
  match urlencoding::decode(&spaced) {
    Ok(decoded) => decoded.into_owned(),
    Err(_) => spaced,
  }
}

// --- Codec ---

/// Encode `filter` using the current clock for the "tomorrow" sentinel.
pub fn encode(filter: &SearchFilter) -> QueryParams {
  encode_at(filter, Utc::now())
}

pub fn encode_at(filter: &SearchFilter, now: DateTime<Utc>) -> QueryParams {
  let start = filter.start_date.unwrap_or_else(unix_epoch);
  let end = filter.end_date.unwrap_or_else(|| tomorrow(now));

  let mut params = QueryParams::new();
  params.insert(TIME_RANGE, format!("{};{}", to_iso(start), to_iso(end)));
  let talents = join_tags(&filter.talents);
  if !talents.is_empty() {
    params.insert(TALENTS, talents);
  }
  let stream_types = join_tags(&filter.stream_types);
  if !stream_types.is_empty() {
    params.insert(STREAM_TYPES, stream_types);
  }
  if !filter.keywords.is_empty() {
    params.insert(SEARCH_KEYS, filter.keywords.clone());
  }
  params.insert(TIME_DESCENDING, if filter.sort_descending_by_upload_date { "true" } else { "false" });
  params.insert(PAGE_SIZE, filter.page_size.to_string());
  params
}

fn join_tags(tags: &[String]) -> String {
  tags.iter().map(|t| t.as_str()).filter(|t| !t.is_empty()).collect::<Vec<_>>().join(";")
}

fn split_tags(value: Option<&str>) -> Vec<String> {
  let mut tags = Vec::new();
  for tag in value.unwrap_or_default().split(';') {
    push_tag(&mut tags, tag);
  }
  tags
}

/// Decode using the current clock for the "tomorrow" sentinel.
pub fn decode(params: &QueryParams) -> SearchFilter {
  decode_at(params, Utc::now())
}

/// Never fails: missing or malformed fields fall back to their defaults.
pub fn decode_at(params: &QueryParams, now: DateTime<Utc>) -> SearchFilter {
  let (start_date, end_date) = match params.get(TIME_RANGE).and_then(|r| r.split_once(';')) {
    Some((start, end)) => (
      parse_bound(start).filter(|t| *t != unix_epoch()),
      parse_bound(end).filter(|t| *t != tomorrow(now)),
    ),
    None => (None, None),
  };
  let page_size =
    params.get(PAGE_SIZE).and_then(|v| v.trim().parse::<u32>().ok()).filter(|n| *n > 0).unwrap_or(constants().default_page_size);

  SearchFilter {
    start_date,
    end_date,
    talents: split_tags(params.get(TALENTS)),
    stream_types: split_tags(params.get(STREAM_TYPES)),
    keywords: params.get(SEARCH_KEYS).unwrap_or_default().to_string(),
    sort_descending_by_upload_date: params.get(TIME_DESCENDING) == Some("true"),
    page_size,
  }
}

fn parse_bound(s: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s.trim()).ok().map(|t| t.with_timezone(&Utc))
}
