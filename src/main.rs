mod api;
mod config;
mod constants;
mod duration;
mod error;
mod models;
mod output;
mod pager;
mod query;
mod suggest;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use api::{ArchiveClient, StatsWindow};
use config::Config;
use constants::constants;
use error::FormatError;
use models::{NewVideo, TagKind, VideoUpdate};
use pager::{PageController, PageState, QueryType};
use query::SearchFilter;
use suggest::TagSuggestionDebouncer;

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Browse and curate a VTuber video archive", long_about = None)]
struct Args {
  /// Archive server base URL (overrides prefs.toml)
  #[arg(long, global = true)]
  server: Option<String>,

  /// Videos per page (overrides prefs.toml)
  #[arg(long, global = true)]
  page_size: Option<u32>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List all archived videos
  Videos {
    #[arg(short, long, default_value_t = 1)]
    page: u32,
  },
  /// List one channel's videos
  Channel {
    channel_id: String,
    #[arg(short, long, default_value_t = 1)]
    page: u32,
  },
  /// Search by date range, tags and keywords
  Search {
    #[command(flatten)]
    filter: FilterArgs,
    #[arg(short, long, default_value_t = 1)]
    page: u32,
    /// Print the encoded query string before the results
    #[arg(long)]
    show_query: bool,
  },
  /// Decode a search query string and print the filter it describes
  Query { query: String },
  /// Show one video
  Video { video_id: String },
  /// Autocomplete a tag; each TEXT is fed as one keystroke
  Suggest {
    #[arg(value_enum)]
    kind: TagKind,
    #[arg(required = true)]
    texts: Vec<String>,
  },
  /// Manually add a video
  Add {
    #[arg(long, required_unless_present = "unarchived", conflicts_with = "unarchived")]
    id: Option<String>,
    /// Content with no source id; the server hands out a placeholder
    #[arg(long)]
    unarchived: bool,
    #[arg(long)]
    title: String,
    /// YYYY-MM-DD or RFC 3339
    #[arg(long)]
    date: String,
    /// HH:MM:SS
    #[arg(long)]
    duration: String,
    #[arg(long)]
    channel: String,
    #[arg(long, default_value = "")]
    thumb: String,
    #[arg(long = "talent")]
    talents: Vec<String>,
    #[arg(long = "stream-type")]
    stream_types: Vec<String>,
  },
  /// Update fields of an existing video; omitted fields are unchanged
  Update {
    video_id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    duration: Option<String>,
    #[arg(long)]
    channel: Option<String>,
    #[arg(long)]
    thumb: Option<String>,
  },
  /// Delete a video
  Delete { video_id: String },
  /// Attach talents or stream types to a video
  Tag {
    video_id: String,
    #[arg(value_enum)]
    kind: TagKind,
    #[arg(required = true)]
    tags: Vec<String>,
  },
  /// Queue one video for download
  Download { video_id: String },
  /// Control the server's background downloader
  Downloader {
    #[command(subcommand)]
    action: DownloaderAction,
  },
  /// List channels, or ask the server to re-check them all
  Channels {
    #[command(subcommand)]
    action: Option<ChannelsAction>,
  },
  /// Start archiving a YouTube channel
  ChannelAdd { channel_id: String },
  /// Talent, stream-type and upload statistics for one channel
  ChannelStats {
    channel_id: String,
    /// Only the last N weeks (0 = all time)
    #[arg(long, default_value_t = 0)]
    weeks: u32,
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,
  },
  /// Show or change the server's downloader settings
  Settings {
    #[arg(long)]
    slow_mode: Option<bool>,
    /// Seconds between downloads in slow mode
    #[arg(long)]
    sleep_time: Option<u64>,
    #[arg(long)]
    cookie_path: Option<String>,
    #[arg(long)]
    download_path: Option<String>,
    #[arg(long)]
    scan_path: Option<String>,
  },
  /// Match files under the server's scan path to archived videos
  Scan,
  /// Convert durations between entry and ISO-8601 forms
  Duration {
    #[command(subcommand)]
    action: DurationAction,
  },
  /// Show or save preferences (uses the global --server / --page-size)
  Config,
  /// Print shell completions
  Completions {
    #[arg(value_enum)]
    shell: clap_complete::Shell,
  },
}

#[derive(Subcommand, Debug)]
enum DownloaderAction {
  Status,
  Start,
  Stop,
}

#[derive(Subcommand, Debug)]
enum ChannelsAction {
  List,
  /// Re-check every channel for new uploads
  Fetch,
}

#[derive(Subcommand, Debug)]
enum DurationAction {
  /// HH:MM:SS to ISO-8601
  Parse { entered: String },
  /// ISO-8601 to HH:MM:SS
  Format { iso: String },
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
  /// Earliest upload date
  #[arg(long)]
  from: Option<String>,
  /// Latest upload date
  #[arg(long)]
  to: Option<String>,
  #[arg(long = "talent")]
  talents: Vec<String>,
  #[arg(long = "stream-type")]
  stream_types: Vec<String>,
  #[arg(short, long, default_value = "")]
  keywords: String,
  /// Newest uploads first
  #[arg(long)]
  newest_first: bool,
}

impl FilterArgs {
  fn to_filter(&self, page_size: u32) -> Result<SearchFilter> {
    let mut filter = SearchFilter {
      start_date: self.from.as_deref().map(query::parse_date_input).transpose()?,
      end_date: self.to.as_deref().map(query::parse_date_input).transpose()?,
      keywords: self.keywords.trim().to_string(),
      sort_descending_by_upload_date: self.newest_first,
      page_size,
      ..Default::default()
    };
    for t in &self.talents {
      filter.add_talent(t);
    }
    for t in &self.stream_types {
      filter.add_stream_type(t);
    }
    Ok(filter)
  }
}

// --- Logging ---

/// File logging under the data dir, plus stderr with `--verbose`. Filter from `VTBA_LOG`.
fn init_logging(verbose: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
  let filter = EnvFilter::try_from_env("VTBA_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  let (file_layer, guard) = match config::log_dir().filter(|dir| std::fs::create_dir_all(dir).is_ok()) {
    Some(dir) => {
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "vtba.log"));
      (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
    }
    None => (None, None),
  };
  let stderr_layer = verbose.then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

  let _ = tracing_subscriber::registry().with(filter).with(file_layer).with(stderr_layer).try_init();
  guard
}

// --- Commands ---

/// Load `page` of a listing through the pager and print it.
async fn show_listing(client: Arc<ArchiveClient>, query: QueryType, page_size: u32, page: u32) -> Result<()> {
  let mut pager = PageController::new(client, query, page_size);
  pager.request_page(page);
  pager.settle().await;

  // Past the end: once the total is known, clamp and fetch again.
  let total = pager.total_page_count();
  if pager.state() == PageState::Loaded && total > 0 && pager.page() > total {
    pager.jump_to_page(i64::from(page));
    pager.settle().await;
  }

  if pager.state() == PageState::Failed {
    bail!("{}", pager.last_error().unwrap_or("request failed"));
  }
  if let Some(list) = pager.result() {
    print!("{}", output::render_video_page(list, pager.page(), pager.page_size()));
  }
  Ok(())
}

async fn suggest(client: Arc<ArchiveClient>, kind: TagKind, texts: &[String]) -> Result<()> {
  let c = constants();
  let debouncer = TagSuggestionDebouncer::spawn(client, kind, c.suggestion_quiet_period());
  info!(kind = %debouncer.kind(), keystrokes = texts.len(), "suggest: feeding input");
  let mut updates = debouncer.subscribe();
  for text in texts {
    debouncer.push(text.as_str());
  }

  let wait = c.suggestion_quiet_period() + Duration::from_secs(c.request_timeout_secs);
  match tokio::time::timeout(wait, updates.changed()).await {
    Ok(Ok(())) => {
      for value in &updates.borrow().values {
        println!("{}", value);
      }
      Ok(())
    }
    Ok(Err(_)) => bail!("suggestion worker stopped"),
    Err(_) => bail!("no {} suggestions arrived (see the log for details)", kind),
  }
}

/// Validated ISO upload date from user input.
fn entered_date(s: &str) -> Result<String> {
  Ok(query::to_iso(query::parse_date_input(s)?))
}

/// Validated ISO duration from `HH:MM:SS` input.
fn entered_duration(s: &str) -> Result<String> {
  Ok(duration::parse_entered(s)?.to_string())
}

fn print_downloading(state: models::Downloading) {
  println!("downloader: {}", if state.downloading { "running" } else { "idle" });
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _log_guard = init_logging(args.verbose);

  let mut config = Config::load();
  let server = args.server.clone().unwrap_or_else(|| config.server_url());
  let page_size = args.page_size.filter(|n| *n > 0).unwrap_or_else(|| config.page_size());

  // Offline commands first.
  match &args.command {
    Command::Completions { shell } => {
      clap_complete::generate(*shell, &mut Args::command(), "vtba", &mut std::io::stdout());
      return Ok(());
    }
    Command::Duration { action } => {
      match action {
        DurationAction::Parse { entered } => println!("{}", entered_duration(entered)?),
        DurationAction::Format { iso } => {
          let shown = duration::format_for_display(iso);
          if shown.is_empty() {
            bail!("not an ISO-8601 duration: {}", iso);
          }
          println!("{}", shown);
        }
      }
      return Ok(());
    }
    Command::Query { query } => {
      let filter = query::decode(&query::QueryParams::parse(query));
      println!("{}", output::render_filter(&filter));
      println!("{}", query::encode(&filter).to_query_string());
      return Ok(());
    }
    Command::Config => {
      if args.server.is_some() || args.page_size.is_some() {
        config.server_url = args.server.clone().or(config.server_url);
        config.page_size = args.page_size.or(config.page_size);
        let path = config.save().context("Failed to save preferences")?;
        info!(path = %path.display(), "config: saved preferences");
        println!("saved {}", path.display());
      }
      println!("server_url = {}", config.server_url());
      println!("page_size = {}", config.page_size());
      return Ok(());
    }
    _ => {}
  }

  let client = Arc::new(ArchiveClient::new(&server)?);
  info!(server = client.base_url(), "vtba: starting");

  match args.command {
    Command::Videos { page } => show_listing(client, QueryType::All, page_size, page).await?,
    Command::Channel { channel_id, page } => {
      let size = args.page_size.filter(|n| *n > 0).unwrap_or(constants().channel_page_size);
      show_listing(client, QueryType::Channel(channel_id), size, page).await?
    }
    Command::Search { filter, page, show_query } => {
      let filter = filter.to_filter(page_size)?;
      if filter.is_empty() {
        bail!("give at least one of --from, --to, --talent, --stream-type or --keywords");
      }
      println!("{}", output::render_filter(&filter));
      if show_query {
        println!("?{}", query::encode(&filter).to_query_string());
      }
      show_listing(client, QueryType::Search(filter), page_size, page).await?
    }
    Command::Video { video_id } => print!("{}", output::render_video(&client.video(&video_id).await?)),
    Command::Suggest { kind, texts } => suggest(client, kind, &texts).await?,
    Command::Add { id, unarchived, title, date, duration, channel, thumb, talents, stream_types } => {
      if title.trim().is_empty() {
        return Err(FormatError::Empty("title").into());
      }
      let upload_date = entered_date(&date)?;
      let duration = entered_duration(&duration)?;
      let video_id = match id {
        Some(id) => id,
        None => client.new_hex_id().await?,
      };
      if unarchived && !models::is_unarchived(&video_id) {
        warn!(video_id = %video_id, "add: server returned an unexpected placeholder id");
      }
      let video = NewVideo {
        video_id,
        unarchived_content: unarchived,
        title,
        upload_date,
        duration,
        thumb_url: thumb,
        channel_id: channel,
        talent_names: talents,
        stream_types,
      };
      let added = client.add_video(&video).await?;
      info!(video_id = %added.summary.video_id, "add: video added");
      print!("{}", output::render_video(&added));
    }
    Command::Update { video_id, title, date, duration, channel, thumb } => {
      let update = VideoUpdate {
        title: title.unwrap_or_default(),
        upload_date: date.as_deref().map(entered_date).transpose()?.unwrap_or_default(),
        duration: duration.as_deref().map(entered_duration).transpose()?.unwrap_or_default(),
        channel_id: channel.unwrap_or_default(),
        thumb_url: thumb.unwrap_or_default(),
      };
      print!("{}", output::render_video(&client.update_video(&video_id, &update).await?));
    }
    Command::Delete { video_id } => {
      client.delete_video(&video_id).await?;
      info!(video_id = %video_id, "delete: video deleted");
      println!("deleted {}", video_id);
    }
    Command::Tag { video_id, kind, tags } => {
      let tags: Vec<String> = tags.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
      if tags.is_empty() {
        return Err(FormatError::Empty("tag list").into());
      }
      print!("{}", output::render_video(&client.add_tags(&video_id, kind, &tags).await?));
    }
    Command::Download { video_id } => print_downloading(client.download_video(&video_id).await?),
    Command::Downloader { action } => {
      let state = match action {
        DownloaderAction::Status => client.downloading().await?,
        DownloaderAction::Start => client.trigger_download().await?,
        DownloaderAction::Stop => client.stop_tasks().await?,
      };
      print_downloading(state);
    }
    Command::Channels { action } => {
      let channels = match action.unwrap_or(ChannelsAction::List) {
        ChannelsAction::List => client.channels().await?,
        ChannelsAction::Fetch => {
          let fetched = client.fetch_channels().await?;
          info!(channels = fetched.len(), "channels: re-check started");
          fetched
        }
      };
      print!("{}", output::render_channels(&channels));
    }
    Command::ChannelAdd { channel_id } => {
      let channel_id = channel_id.trim();
      if channel_id.is_empty() {
        return Err(FormatError::Empty("channel id").into());
      }
      let added = client.add_channel(channel_id).await?;
      info!(channel_id = %added.channel_id, "channels: channel added");
      print!("{}", output::render_channels(std::slice::from_ref(&added)));
    }
    Command::ChannelStats { channel_id, weeks, from, to } => {
      let window = StatsWindow {
        weeks,
        lower: from.as_deref().map(entered_date).transpose()?,
        upper: to.as_deref().map(entered_date).transpose()?,
      };
      print!("{}", output::render_channel_stats(&client.channel_stats(&channel_id, &window).await?));
    }
    Command::Settings { slow_mode, sleep_time, cookie_path, download_path, scan_path } => {
      let mut settings = client.settings().await?;
      let current = settings.clone();
      if let Some(v) = slow_mode {
        settings.slow_mode = v;
      }
      if let Some(v) = sleep_time {
        settings.sleep_time = v;
      }
      if let Some(v) = cookie_path {
        settings.cookie_path = v;
      }
      if let Some(v) = download_path {
        settings.download_path = v;
      }
      if let Some(v) = scan_path {
        settings.scan_path = v;
      }
      if settings != current {
        settings = client.put_settings(&settings).await?;
        info!("settings: saved on server");
      }
      print!("{}", output::render_settings(&settings));
    }
    Command::Scan => {
      let result = client.scan_local().await?;
      println!("{}", if result.scanned { "scan finished" } else { "nothing scanned" });
    }
    Command::Completions { .. } | Command::Duration { .. } | Command::Query { .. } | Command::Config => {}
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cli_definition_is_valid() {
    Args::command().debug_assert();
  }

  #[test]
  fn search_flags_build_filter() {
    let args = Args::parse_from([
      "vtba", "search", "--from", "2021-01-01", "--talent", "Alice", "--talent", " Alice ", "--stream-type", "Singing",
      "-k", " karaoke ",
    ]);
    let Command::Search { filter, page, show_query } = args.command else { panic!("expected search") };
    assert_eq!(page, 1);
    assert!(!show_query);
    let filter = filter.to_filter(10).unwrap();
    assert_eq!(filter.talents, vec!["Alice"]);
    assert_eq!(filter.stream_types, vec!["Singing"]);
    assert_eq!(filter.keywords, "karaoke");
    assert_eq!(filter.start_date, Some(query::parse_date_input("2021-01-01").unwrap()));
    assert_eq!(filter.end_date, None);
  }

  #[test]
  fn bad_search_date_is_rejected() {
    let args = Args::parse_from(["vtba", "search", "--to", "yesterday"]);
    let Command::Search { filter, .. } = args.command else { panic!("expected search") };
    assert!(filter.to_filter(10).is_err());
  }

  #[test]
  fn add_requires_id_or_unarchived() {
    let base = ["vtba", "add", "--title", "t", "--date", "2022-01-01", "--duration", "01:00:00", "--channel", "UC1"];
    assert!(Args::try_parse_from(base).is_err());
    assert!(Args::try_parse_from(base.iter().copied().chain(["--unarchived"])).is_ok());
    assert!(Args::try_parse_from(base.iter().copied().chain(["--id", "abc", "--unarchived"])).is_err());
  }

  #[test]
  fn entered_values_are_validated() {
    assert_eq!(entered_duration("01:02:03").unwrap(), "PT1H2M3S");
    assert!(entered_duration("1:02").is_err());
    assert_eq!(entered_date("2022-03-04").unwrap(), "2022-03-04T00:00:00Z");
    assert!(entered_date("04/03/2022").is_err());
  }

  #[test]
  fn channels_defaults_to_list() {
    let args = Args::parse_from(["vtba", "channels"]);
    assert!(matches!(args.command, Command::Channels { action: None }));
    let args = Args::parse_from(["vtba", "channels", "fetch"]);
    assert!(matches!(args.command, Command::Channels { action: Some(ChannelsAction::Fetch) }));
  }

  #[test]
  fn settings_flags_are_optional() {
    let args = Args::parse_from(["vtba", "settings", "--slow-mode", "false", "--sleep-time", "20"]);
    let Command::Settings { slow_mode, sleep_time, scan_path, .. } = args.command else { panic!("expected settings") };
    assert_eq!(slow_mode, Some(false));
    assert_eq!(sleep_time, Some(20));
    assert_eq!(scan_path, None);
  }

  #[test]
  fn channel_stats_window() {
    let args = Args::parse_from(["vtba", "channel-stats", "UC1", "--weeks", "4"]);
    assert!(matches!(args.command, Command::ChannelStats { weeks: 4, from: None, .. }));
  }

  #[test]
  fn global_flags_after_subcommand() {
    let args = Args::parse_from(["vtba", "videos", "--page", "3", "--page-size", "25", "--server", "http://h:1"]);
    assert_eq!(args.page_size, Some(25));
    assert_eq!(args.server.as_deref(), Some("http://h:1"));
    assert!(matches!(args.command, Command::Videos { page: 3 }));
  }
}
