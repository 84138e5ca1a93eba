use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::constants;
use crate::error::ApiError;
use crate::models::{
  ChannelOverview, ChannelStats, Downloading, NewVideo, Scanned, Settings, TagKind, VideoDetail, VideoList, VideoUpdate,
};
use crate::pager::{PageRequest, QueryType};
use crate::query::{self, PAGE};

/// Anything that can serve one page of a video listing.
pub trait VideoSource: Send + Sync + 'static {
  fn fetch_page(&self, request: &PageRequest) -> impl Future<Output = Result<VideoList, ApiError>> + Send;
}

/// Anything that can complete a partially typed tag.
pub trait SuggestionSource: Send + Sync + 'static {
  fn tag_suggestions(&self, kind: TagKind, query: &str) -> impl Future<Output = Result<Vec<String>, ApiError>> + Send;
}

/// HTTP client for the archive backend's `/api` routes.
#[derive(Clone)]
pub struct ArchiveClient {
  http: Client,
  base_url: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuggestionBody {
  Plain(Vec<String>),
  Wrapped { suggestions: Vec<String> },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddChannelBody<'a> {
  channel_id: &'a str,
}

/// Optional narrowing of `/api/channel-stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsWindow {
  /// Only the last `n` weeks; zero means all time.
  pub weeks: u32,
  pub lower: Option<String>,
  pub upper: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HexIdBody {
  Plain(String),
  Wrapped { new_hex_vid: String },
}

impl ArchiveClient {
  pub fn new(base_url: &str) -> Result<Self> {
    let c = constants();
    let http = Client::builder()
      .connect_timeout(Duration::from_secs(c.connect_timeout_secs))
      .timeout(Duration::from_secs(c.request_timeout_secs))
      .build()
      .context("Failed to build HTTP client")?;
    Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self.http.request(method, format!("{}{}", self.base_url, path))
  }

  pub async fn all_videos(&self, page: u32, page_entry_num: u32) -> Result<VideoList, ApiError> {
    let req = self.request(Method::GET, "/api/videos").query(&[("page", page), ("pageEntryNum", page_entry_num)]);
    send(req).await
  }

  pub async fn channel_videos(&self, channel_id: &str, page: u32, page_entry_num: u32) -> Result<VideoList, ApiError> {
    let path = format!("/api/channel-videos/{}", urlencoding::encode(channel_id));
    let req = self.request(Method::GET, &path).query(&[("page", page), ("pageEntryNum", page_entry_num)]);
    send(req).await
  }

  /// `/api/search` with the encoded filter plus the page number.
  pub async fn search(&self, filter: &query::SearchFilter, page: u32) -> Result<VideoList, ApiError> {
    let mut params = query::encode(filter);
    params.insert(PAGE, page.to_string());
    let path = format!("/api/search?{}", params.to_query_string());
    send(self.request(Method::GET, &path)).await
  }

  pub async fn video(&self, video_id: &str) -> Result<VideoDetail, ApiError> {
    send(self.request(Method::GET, &format!("/api/video/{}", urlencoding::encode(video_id)))).await
  }

  pub async fn suggestions(&self, kind: TagKind, query: &str) -> Result<Vec<String>, ApiError> {
    let req =
      self.request(Method::GET, "/api/get-tag-suggestion").query(&[("tagType", kind.wire_name()), ("queryStr", query)]);
    Ok(match send::<SuggestionBody>(req).await? {
      SuggestionBody::Plain(list) | SuggestionBody::Wrapped { suggestions: list } => list,
    })
  }

  /// Fresh placeholder id for unarchived content.
  pub async fn new_hex_id(&self) -> Result<String, ApiError> {
    Ok(match send::<HexIdBody>(self.request(Method::GET, "/api/get-new-hex-vid")).await? {
      HexIdBody::Plain(id) | HexIdBody::Wrapped { new_hex_vid: id } => id,
    })
  }

  pub async fn add_video(&self, video: &NewVideo) -> Result<VideoDetail, ApiError> {
    send(self.request(Method::POST, "/api/manually-add-video").json(video)).await
  }

  pub async fn update_video(&self, video_id: &str, update: &VideoUpdate) -> Result<VideoDetail, ApiError> {
    let path = format!("/api/manually-update-video/{}", urlencoding::encode(video_id));
    send(self.request(Method::POST, &path).json(update)).await
  }

  pub async fn add_tags(&self, video_id: &str, kind: TagKind, tags: &[String]) -> Result<VideoDetail, ApiError> {
    let route = match kind {
      TagKind::Talent => "add-talent",
      TagKind::StreamType => "add-stream-type",
    };
    let path = format!("/api/{}/{}", route, urlencoding::encode(video_id));
    send(self.request(Method::POST, &path).json(tags)).await
  }

  pub async fn delete_video(&self, video_id: &str) -> Result<(), ApiError> {
    let path = format!("/api/delete-video/{}", urlencoding::encode(video_id));
    send::<serde_json::Value>(self.request(Method::DELETE, &path)).await.map(|_| ())
  }

  pub async fn downloading(&self) -> Result<Downloading, ApiError> {
    send(self.request(Method::GET, "/api/downloading")).await
  }

  pub async fn trigger_download(&self) -> Result<Downloading, ApiError> {
    send(self.request(Method::GET, "/api/trigger-download")).await
  }

  pub async fn stop_tasks(&self) -> Result<Downloading, ApiError> {
    send(self.request(Method::GET, "/api/stop-tasks")).await
  }

  pub async fn download_video(&self, video_id: &str) -> Result<Downloading, ApiError> {
    send(self.request(Method::GET, &format!("/api/download/{}", urlencoding::encode(video_id)))).await
  }

  pub async fn channels(&self) -> Result<Vec<ChannelOverview>, ApiError> {
    send(self.request(Method::GET, "/api/channels")).await
  }

  pub async fn add_channel(&self, channel_id: &str) -> Result<ChannelOverview, ApiError> {
    send(self.request(Method::POST, "/api/add-channel").json(&AddChannelBody { channel_id })).await
  }

  /// Ask the server to re-check every channel for new uploads.
  pub async fn fetch_channels(&self) -> Result<Vec<ChannelOverview>, ApiError> {
    send(self.request(Method::GET, "/api/fetch-channels")).await
  }

  pub async fn channel_stats(&self, channel_id: &str, window: &StatsWindow) -> Result<ChannelStats, ApiError> {
    let req = self.request(Method::GET, "/api/channel-stats").query(&[
      ("channelId", channel_id.to_string()),
      ("timeDelta", window.weeks.to_string()),
      ("lowerDateStamp", window.lower.clone().unwrap_or_default()),
      ("upperDateStamp", window.upper.clone().unwrap_or_default()),
    ]);
    send(req).await
  }

  pub async fn settings(&self) -> Result<Settings, ApiError> {
    send(self.request(Method::GET, "/api/settings")).await
  }

  /// Store `settings` and return what the server kept.
  pub async fn put_settings(&self, settings: &Settings) -> Result<Settings, ApiError> {
    send(self.request(Method::PUT, "/api/settings").json(settings)).await
  }

  /// Match files under the server's scan path to archived videos.
  pub async fn scan_local(&self) -> Result<Scanned, ApiError> {
    send(self.request(Method::GET, "/api/scan-local")).await
  }
}

impl VideoSource for ArchiveClient {
  async fn fetch_page(&self, request: &PageRequest) -> Result<VideoList, ApiError> {
    debug!(page = request.page, page_size = request.page_size, "api: fetching page");
    match &request.query {
      QueryType::All => self.all_videos(request.page, request.page_size).await,
      QueryType::Channel(id) => self.channel_videos(id, request.page, request.page_size).await,
      QueryType::Search(filter) => {
        let filter = query::SearchFilter { page_size: request.page_size, ..filter.clone() };
        self.search(&filter, request.page).await
      }
    }
  }
}

impl SuggestionSource for ArchiveClient {
  async fn tag_suggestions(&self, kind: TagKind, query: &str) -> Result<Vec<String>, ApiError> {
    self.suggestions(kind, query).await
  }
}

async fn send<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ApiError> {
  let response = req.send().await.map_err(|e| {
    warn!(err = %e, "api: request failed");
    ApiError::from(e)
  })?;
  read_body(response).await
}

async fn read_body<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
  let status = response.status();
  let text = response.text().await?;
  parse_body(status.as_u16(), &text)
}

/// Turn a status code and body into a value or the error the backend meant.
///
/// The backend reports business failures either with a non-2xx status or
/// as a 200 with an `{"error": "..."}` body.
fn parse_body<T: DeserializeOwned>(status: u16, text: &str) -> Result<T, ApiError> {
  let value: Option<serde_json::Value> = serde_json::from_str(text).ok();
  let message = value.as_ref().and_then(|v| {
    ["error", "message"].iter().find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
  });

  if !(200..300).contains(&status) {
    let message = message.unwrap_or_else(|| "Oops, something went wrong.".to_string());
    return Err(ApiError::Status { status, message });
  }
  if let Some(message) = value.as_ref().and_then(|v| v.get("error")).and_then(|m| m.as_str()) {
    return Err(ApiError::Backend(message.to_string()));
  }
  let value = value.ok_or_else(|| ApiError::Decode(format!("body is not JSON: {:.80}", text)))?;
  serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
}
