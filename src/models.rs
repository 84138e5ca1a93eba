use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of a video listing, as the backend sends it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoSummary {
  pub video_id: String,
  pub title: String,
  /// ISO-8601 UTC timestamp.
  pub upload_date: String,
  /// ISO-8601 duration.
  pub duration: String,
  pub upload_index: i64,
  pub thumb_url: String,
  /// Empty when the video has not been downloaded.
  pub local_path: String,
}

impl VideoSummary {
  pub fn is_downloaded(&self) -> bool {
    !self.local_path.is_empty()
  }
}

/// A video with its channel and tags.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoDetail {
  #[serde(flatten)]
  pub summary: VideoSummary,
  pub channel_id: String,
  pub channel_name: String,
  pub talent_names: Vec<String>,
  pub stream_types: Vec<String>,
}

/// One page of a listing plus the total number of matching videos.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoList {
  pub video_num: u64,
  pub video_list: Vec<VideoSummary>,
}

impl VideoList {
  /// `ceil(video_num / page_size)`; zero when nothing matched.
  pub fn total_page_count(&self, page_size: u32) -> u32 {
    if page_size == 0 {
      return 0;
    }
    let pages = self.video_num.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelOverview {
  pub channel_id: String,
  pub channel_name: String,
  pub thumb_url: String,
  pub video_num: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Downloading {
  pub downloading: bool,
}

/// Downloader settings stored on the server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
  pub slow_mode: bool,
  /// Seconds between downloads in slow mode.
  pub sleep_time: u64,
  pub cookie_path: String,
  pub download_path: String,
  /// Directory searched by `/api/scan-local`.
  pub scan_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Scanned {
  pub scanned: bool,
}

// --- Channel stats ---
//
// Each series is a pair of parallel arrays, labels first.

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TalentStats {
  pub talent_name: Vec<String>,
  pub num: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamTypeStats {
  pub stream_type: Vec<String>,
  pub num: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct WeeklyDuration {
  pub week: Vec<String>,
  /// Total streamed seconds per week.
  pub duration: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct DurationDistribution {
  /// Bucket labels such as `<30min`.
  pub duration: Vec<String>,
  pub num: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct WeeklyVideoCount {
  pub week: Vec<String>,
  pub num: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelStats {
  #[serde(alias = "talent_stats")]
  pub talent_stats: TalentStats,
  #[serde(alias = "tag_stats")]
  pub tag_stats: StreamTypeStats,
  #[serde(alias = "duration_stats")]
  pub duration_stats: WeeklyDuration,
  #[serde(alias = "duration_distr")]
  pub duration_distr: DurationDistribution,
  #[serde(alias = "video_num_stats")]
  pub video_num_stats: WeeklyVideoCount,
}

/// Fields for `/api/manually-add-video`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideo {
  pub video_id: String,
  pub unarchived_content: bool,
  pub title: String,
  pub upload_date: String,
  pub duration: String,
  pub thumb_url: String,
  pub channel_id: String,
  pub talent_names: Vec<String>,
  #[serde(rename = "stream_types")]
  pub stream_types: Vec<String>,
}

/// Partial update for `/api/manually-update-video/{id}`. Empty fields are left unchanged server-side.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUpdate {
  pub title: String,
  pub upload_date: String,
  pub duration: String,
  pub channel_id: String,
  pub thumb_url: String,
}

/// The two kinds of tag a video can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum TagKind {
  Talent,
  StreamType,
}

impl TagKind {
  /// Value of the `tagType` query parameter.
  pub fn wire_name(self) -> &'static str {
    match self {
      TagKind::Talent => "talents",
      TagKind::StreamType => "tags",
    }
  }
}

impl fmt::Display for TagKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      TagKind::Talent => "talent",
      TagKind::StreamType => "stream type",
    })
  }
}

/// Placeholder ids for content without a known source id look like `__0x00002a__`.
pub fn is_unarchived(video_id: &str) -> bool {
  video_id.len() > 4 && video_id.starts_with("__") && video_id.ends_with("__")
}
