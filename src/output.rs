use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthChar;

use crate::constants::constants;
use crate::duration::{CanonicalDuration, format_for_display};
use crate::models::{ChannelOverview, ChannelStats, Settings, VideoDetail, VideoList, VideoSummary};
use crate::query::SearchFilter;

// --- Helpers ---

/// Terminal column width of the first `n` chars of `s`.
pub fn display_width(s: &str, n: usize) -> usize {
  s.chars().take(n).map(|c| c.width().unwrap_or(0)).sum()
}

/// Cut `s` to at most `max_width` terminal columns, appending "…" if truncated.
fn truncate_str(s: &str, max_width: usize) -> String {
  if display_width(s, usize::MAX) <= max_width {
    return s.to_string();
  }
  let mut out = String::new();
  let mut used = 0;
  for c in s.chars() {
    let w = c.width().unwrap_or(0);
    if used + w + 1 > max_width {
      break;
    }
    used += w;
    out.push(c);
  }
  out.push('…');
  out
}

/// Right-pad to `width` columns.
fn pad(s: &str, width: usize) -> String {
  let w = display_width(s, usize::MAX);
  format!("{}{}", s, " ".repeat(width.saturating_sub(w)))
}

/// `YYYY-MM-DD` for an ISO timestamp, or the raw text when it doesn't parse.
pub fn format_date(iso: &str) -> String {
  match DateTime::parse_from_rfc3339(iso) {
    Ok(t) => t.with_timezone(&Utc).format("%Y-%m-%d").to_string(),
    Err(_) => iso.to_string(),
  }
}

// --- Listings ---

fn video_row(v: &VideoSummary, title_width: usize) -> String {
  let marker = if v.is_downloaded() { "*" } else { " " };
  format!(
    "{} {}  {:>8}  {:<10}  {}",
    marker,
    pad(&truncate_str(&v.title, title_width), title_width),
    format_for_display(&v.duration),
    format_date(&v.upload_date),
    v.video_id
  )
}

/// One line per video, then a `page X / Y` footer.
pub fn render_video_page(list: &VideoList, page: u32, page_size: u32) -> String {
  if list.video_list.is_empty() {
    return "No videos found.\n".to_string();
  }
  let title_width = constants().title_column_width;
  let mut out = String::new();
  for v in &list.video_list {
    out.push_str(&video_row(v, title_width));
    out.push('\n');
  }
  out.push_str(&format!(
    "page {} / {}  ({} videos, * = downloaded)\n",
    page,
    list.total_page_count(page_size),
    list.video_num
  ));
  out
}

pub fn render_filter(filter: &SearchFilter) -> String {
  filter.summary().unwrap_or_else(|| "Showing all results".to_string())
}

pub fn render_video(v: &VideoDetail) -> String {
  let s = &v.summary;
  let mut lines = vec![
    format!("title:        {}", s.title),
    format!("id:           {}", s.video_id),
    format!("channel:      {} ({})", v.channel_name, v.channel_id),
    format!("uploaded:     {}", format_date(&s.upload_date)),
    format!("duration:     {}", format_for_display(&s.duration)),
    format!("talents:      {}", v.talent_names.join(", ")),
    format!("stream types: {}", v.stream_types.join(", ")),
  ];
  if s.is_downloaded() {
    lines.push(format!("local file:   {}", s.local_path));
  }
  lines.join("\n") + "\n"
}

pub fn render_channels(channels: &[ChannelOverview]) -> String {
  let name_width = channels.iter().map(|c| display_width(&c.channel_name, usize::MAX)).max().unwrap_or(0);
  channels.iter().map(|c| format!("{}  {:>5}  {}\n", pad(&c.channel_name, name_width), c.video_num, c.channel_id)).collect()
}

pub fn render_settings(s: &Settings) -> String {
  format!(
    "slow_mode:     {}\nsleep_time:    {}s\ncookie_path:   {}\ndownload_path: {}\nscan_path:     {}\n",
    s.slow_mode, s.sleep_time, s.cookie_path, s.download_path, s.scan_path
  )
}

// --- Channel stats ---

/// `label  value` rows under a heading, labels padded to the widest one.
fn render_series(out: &mut String, heading: &str, labels: &[String], values: &[String]) {
  out.push_str(heading);
  out.push('\n');
  if labels.is_empty() {
    out.push_str("  (none)\n");
    return;
  }
  let width = labels.iter().map(|l| display_width(l, usize::MAX)).max().unwrap_or(0);
  for (label, value) in labels.iter().zip(values) {
    out.push_str(&format!("  {}  {}\n", pad(label, width), value));
  }
}

fn counts(nums: &[u64]) -> Vec<String> {
  nums.iter().map(u64::to_string).collect()
}

pub fn render_channel_stats(stats: &ChannelStats) -> String {
  let mut out = String::new();
  render_series(&mut out, "talents", &stats.talent_stats.talent_name, &counts(&stats.talent_stats.num));
  render_series(&mut out, "stream types", &stats.tag_stats.stream_type, &counts(&stats.tag_stats.num));
  render_series(&mut out, "videos per week", &stats.video_num_stats.week, &counts(&stats.video_num_stats.num));
  // Negative or NaN totals saturate to zero in the cast.
  let weekly: Vec<String> = stats
    .duration_stats
    .duration
    .iter()
    .map(|secs| format_for_display(&CanonicalDuration::from_secs(*secs as u64).to_string()))
    .collect();
  render_series(&mut out, "stream time per week", &stats.duration_stats.week, &weekly);
  render_series(&mut out, "length distribution", &stats.duration_distr.duration, &counts(&stats.duration_distr.num));
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn width_counts_wide_chars() {
    assert_eq!(display_width("abc", usize::MAX), 3);
    assert_eq!(display_width("歌枠", usize::MAX), 4);
    assert_eq!(display_width("歌枠", 1), 2);
  }

  #[test]
  fn truncate_respects_columns() {
    assert_eq!(truncate_str("short", 10), "short");
    assert_eq!(truncate_str("abcdefgh", 5), "abcd…");
    let cut = truncate_str("歌枠歌枠歌枠", 6);
    assert_eq!(cut, "歌枠…");
    assert!(display_width(&cut, usize::MAX) <= 6);
  }

  #[test]
  fn pad_aligns_wide_titles() {
    assert_eq!(display_width(&pad("歌", 4), usize::MAX), 4);
    assert_eq!(pad("toolong", 3), "toolong");
  }

  #[test]
  fn date_formats() {
    assert_eq!(format_date("2022-01-02T03:04:05Z"), "2022-01-02");
    assert_eq!(format_date("2022-01-02T23:00:00-02:00"), "2022-01-03");
    assert_eq!(format_date("someday"), "someday");
  }

  #[test]
  fn page_has_rows_and_footer() {
    let video = VideoSummary {
      video_id: "abc".to_string(),
      title: "Karaoke".to_string(),
      duration: "PT1H2M3S".to_string(),
      local_path: "/v/abc.mp4".to_string(),
      ..Default::default()
    };
    let list = VideoList { video_num: 21, video_list: vec![video] };
    let out = render_video_page(&list, 2, 10);
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].starts_with("* Karaoke"));
    assert!(lines[0].contains("01:02:03"));
    assert!(lines[0].ends_with("abc"));
    assert_eq!(lines[1], "page 2 / 3  (21 videos, * = downloaded)");
  }

  #[test]
  fn empty_page() {
    assert_eq!(render_video_page(&VideoList::default(), 1, 10), "No videos found.\n");
  }

  #[test]
  fn stats_rows_align() {
    let mut stats = ChannelStats::default();
    stats.talent_stats.talent_name = vec!["Alice".to_string(), "歌".to_string()];
    stats.talent_stats.num = vec![4, 12];
    stats.duration_stats.week = vec!["2022-01-03".to_string()];
    stats.duration_stats.duration = vec![5400.0];
    let out = render_channel_stats(&stats);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "talents");
    assert_eq!(lines[1], "  Alice  4");
    assert_eq!(lines[2], "  歌     12");
    assert_eq!(lines[3], "stream types");
    assert_eq!(lines[4], "  (none)");
    assert!(out.contains("  2022-01-03  01:30:00\n"));
  }

  #[test]
  fn settings_lines() {
    let s = Settings { slow_mode: true, sleep_time: 30, scan_path: "/v".to_string(), ..Default::default() };
    let out = render_settings(&s);
    assert!(out.starts_with("slow_mode:     true\n"));
    assert!(out.contains("sleep_time:    30s\n"));
    assert!(out.ends_with("scan_path:     /v\n"));
  }

  #[test]
  fn filter_summary_fallback() {
    assert_eq!(render_filter(&SearchFilter::default()), "Showing all results");
    let mut filter = SearchFilter::default();
    filter.add_talent("Alice");
    assert_eq!(render_filter(&filter), "Showing result on Alice");
  }
}
