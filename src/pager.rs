use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::VideoSource;
use crate::error::ApiError;
use crate::models::VideoList;
use crate::query::SearchFilter;

/// Which listing a page belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryType {
  All,
  Channel(String),
  Search(SearchFilter),
}

/// One page of one listing. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
  pub query: QueryType,
  pub page: u32,
  pub page_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
  Idle,
  Loading,
  Loaded,
  Failed,
}

/// A finished fetch, tagged with the sequence number of the request that spawned it.
struct PageResponse {
  seq: u64,
  page: u32,
  result: Result<VideoList, ApiError>,
}

struct InFlight {
  seq: u64,
  page: u32,
  handle: JoinHandle<()>,
}

/// Owns the pagination state of one listing.
///
/// Every fetch reports back over a single channel with the sequence number
/// it was issued under. Only the response for the most recent request is
/// applied, so the visible page always matches the last page asked for,
/// whatever order the network answers in.
pub struct PageController<S: VideoSource> {
  source: Arc<S>,
  query: QueryType,
  page_size: u32,
  state: PageState,
  page: u32,
  result: Option<VideoList>,
  /// Page number `result` belongs to.
  shown_page: Option<u32>,
  total_page_count: u32,
  last_error: Option<String>,
  next_seq: u64,
  in_flight: Option<InFlight>,
  tx: mpsc::UnboundedSender<PageResponse>,
  rx: mpsc::UnboundedReceiver<PageResponse>,
}

impl<S: VideoSource> PageController<S> {
  pub fn new(source: Arc<S>, query: QueryType, page_size: u32) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      source,
      query,
      page_size: page_size.max(1),
      state: PageState::Idle,
      page: 1,
      result: None,
      shown_page: None,
      total_page_count: 0,
      last_error: None,
      next_seq: 0,
      in_flight: None,
      tx,
      rx,
    }
  }

  pub fn state(&self) -> PageState {
    self.state
  }

  /// The page being loaded while `Loading`, otherwise the page on screen.
  ///
  /// After a failed fetch this falls back to the page of the kept result,
  /// so `next_page`/`prev_page` step from what is actually shown. With
  /// nothing shown yet it stays on the page that failed.
  pub fn page(&self) -> u32 {
    self.page
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  pub fn total_page_count(&self) -> u32 {
    self.total_page_count
  }

  /// Last successfully loaded page; kept when a later fetch fails.
  pub fn result(&self) -> Option<&VideoList> {
    self.result.as_ref()
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn query(&self) -> &QueryType {
    &self.query
  }

  /// Fetch page `page` (at least 1), superseding any fetch still in flight.
  pub fn request_page(&mut self, page: u32) {
    let page = page.max(1);
    if let Some(old) = self.in_flight.take() {
      debug!(seq = old.seq, page = old.page, "pager: superseding in-flight request");
      old.handle.abort();
    }

    self.next_seq += 1;
    let seq = self.next_seq;
    let request = PageRequest { query: self.query.clone(), page, page_size: self.page_size };
    info!(seq, page, page_size = self.page_size, "pager: requesting page");

    let source = Arc::clone(&self.source);
    let tx = self.tx.clone();
    let handle = tokio::spawn(async move {
      let result = source.fetch_page(&request).await;
      let _ = tx.send(PageResponse { seq, page, result });
    });

    self.in_flight = Some(InFlight { seq, page, handle });
    self.page = page;
    self.state = PageState::Loading;
  }

  /// Clamp `page` into `[1, max(total_page_count, 1)]` and request it.
  pub fn jump_to_page(&mut self, page: i64) {
    let last = i64::from(self.total_page_count.max(1));
    let target = page.clamp(1, last);
    // Safety: clamped into 1..=u32::MAX above.
    self.request_page(target as u32);
  }

  pub fn next_page(&mut self) {
    self.jump_to_page(i64::from(self.page) + 1);
  }

  pub fn prev_page(&mut self) {
    self.jump_to_page(i64::from(self.page) - 1);
  }

  /// Apply any responses that have arrived, without waiting.
  /// Returns true if the visible state changed.
  pub fn poll_pending(&mut self) -> bool {
    let mut changed = false;
    while let Ok(response) = self.rx.try_recv() {
      changed |= self.apply(response);
    }
    changed
  }

  /// Wait until the most recent request has resolved. Returns immediately when nothing is in flight.
  pub async fn settle(&mut self) {
    while self.in_flight.is_some() {
      match self.rx.recv().await {
        Some(response) => {
          self.apply(response);
        }
        None => break,
      }
    }
  }

  fn apply(&mut self, response: PageResponse) -> bool {
    let current = self.in_flight.as_ref().map(|f| f.seq);
    if current != Some(response.seq) {
      debug!(seq = response.seq, page = response.page, ?current, "pager: discarding stale response");
      return false;
    }
    self.in_flight = None;

    match response.result {
      Ok(list) => {
        self.total_page_count = list.total_page_count(self.page_size);
        info!(page = response.page, videos = list.video_num, pages = self.total_page_count, "pager: page loaded");
        self.result = Some(list);
        self.shown_page = Some(response.page);
        self.last_error = None;
        self.state = PageState::Loaded;
      }
      Err(e) => {
        warn!(page = response.page, err = %e, "pager: page fetch failed");
        self.last_error = Some(e.to_string());
        self.state = PageState::Failed;
        if let Some(shown) = self.shown_page {
          self.page = shown;
        }
      }
    }
    true
  }
}

impl<S: VideoSource> Drop for PageController<S> {
  fn drop(&mut self) {
    if let Some(f) = self.in_flight.take() {
      f.handle.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::VideoSummary;
  use std::collections::HashMap;
  use std::sync::Mutex as StdMutex;
  use tokio::sync::oneshot;

  /// Serves pages whose only video is titled after the page number.
  /// Pages listed in `gated` wait for the test to release them.
  #[derive(Default)]
  struct FakeSource {
    video_num: u64,
    fail: bool,
    gated: StdMutex<HashMap<u32, oneshot::Receiver<()>>>,
    calls: StdMutex<Vec<u32>>,
  }

  impl FakeSource {
    fn with_videos(video_num: u64) -> Self {
      Self { video_num, ..Default::default() }
    }

    fn gate(&self, page: u32) -> oneshot::Sender<()> {
      let (tx, rx) = oneshot::channel();
      self.gated.lock().unwrap().insert(page, rx);
      tx
    }
  }

  impl VideoSource for FakeSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<VideoList, ApiError> {
      self.calls.lock().unwrap().push(request.page);
      let gate = self.gated.lock().unwrap().remove(&request.page);
      if let Some(gate) = gate {
        let _ = gate.await;
      }
      if self.fail {
        return Err(ApiError::Transport("connection refused".to_string()));
      }
      let video = VideoSummary { title: format!("page {}", request.page), ..Default::default() };
      Ok(VideoList { video_num: self.video_num, video_list: vec![video] })
    }
  }

  fn shown_title<S: VideoSource>(pager: &PageController<S>) -> Option<String> {
    pager.result().and_then(|r| r.video_list.first()).map(|v| v.title.clone())
  }

  // --- state machine ---

  #[tokio::test]
  async fn idle_then_loaded() {
    let mut pager = PageController::new(Arc::new(FakeSource::with_videos(70)), QueryType::All, 10);
    assert_eq!(pager.state(), PageState::Idle);

    pager.request_page(1);
    assert_eq!(pager.state(), PageState::Loading);
    pager.settle().await;

    assert_eq!(pager.state(), PageState::Loaded);
    assert_eq!(pager.total_page_count(), 7);
    assert_eq!(shown_title(&pager).as_deref(), Some("page 1"));
  }

  #[tokio::test]
  async fn exactly_one_fetch_per_request() {
    let source = Arc::new(FakeSource::with_videos(30));
    let mut pager = PageController::new(Arc::clone(&source), QueryType::Channel("UC1".to_string()), 5);
    pager.request_page(2);
    pager.settle().await;
    pager.request_page(3);
    pager.settle().await;
    assert_eq!(*source.calls.lock().unwrap(), vec![2, 3]);
  }

  #[tokio::test]
  async fn failure_keeps_previous_page() {
    let mut pager = PageController::new(Arc::new(FakeSource::with_videos(20)), QueryType::All, 10);
    pager.request_page(1);
    pager.settle().await;

    pager.source = Arc::new(FakeSource { video_num: 20, fail: true, ..Default::default() });
    pager.request_page(2);
    pager.settle().await;

    assert_eq!(pager.state(), PageState::Failed);
    assert_eq!(shown_title(&pager).as_deref(), Some("page 1"));
    assert!(pager.last_error().unwrap().contains("connection refused"));
    assert_eq!(pager.total_page_count(), 2);
  }

  #[tokio::test]
  async fn failure_steps_from_shown_page() {
    let mut pager = PageController::new(Arc::new(FakeSource::with_videos(50)), QueryType::All, 10);
    pager.request_page(2);
    pager.settle().await;

    let failing = Arc::new(FakeSource { video_num: 50, fail: true, ..Default::default() });
    pager.source = Arc::clone(&failing);
    pager.request_page(4);
    assert_eq!(pager.page(), 4);
    pager.settle().await;
    assert_eq!(pager.state(), PageState::Failed);
    assert_eq!(pager.page(), 2);

    pager.next_page();
    assert_eq!(pager.page(), 3);
    pager.settle().await;
    assert_eq!(*failing.calls.lock().unwrap(), vec![4, 3]);
  }

  #[tokio::test]
  async fn failure_with_nothing_shown_keeps_requested_page() {
    let mut pager =
      PageController::new(Arc::new(FakeSource { fail: true, ..Default::default() }), QueryType::All, 10);
    pager.request_page(3);
    pager.settle().await;
    assert_eq!(pager.state(), PageState::Failed);
    assert_eq!(pager.page(), 3);
  }

  #[tokio::test]
  async fn success_clears_error() {
    let mut pager =
      PageController::new(Arc::new(FakeSource { fail: true, ..Default::default() }), QueryType::All, 10);
    pager.request_page(1);
    pager.settle().await;
    assert_eq!(pager.state(), PageState::Failed);
    assert!(pager.result().is_none());

    pager.source = Arc::new(FakeSource::with_videos(3));
    pager.request_page(1);
    pager.settle().await;
    assert_eq!(pager.state(), PageState::Loaded);
    assert_eq!(pager.last_error(), None);
  }

  // --- ordering ---

  #[tokio::test]
  async fn superseded_fetch_is_aborted() {
    let source = Arc::new(FakeSource::with_videos(100));
    let release_2 = source.gate(2);
    let release_5 = source.gate(5);
    let mut pager = PageController::new(Arc::clone(&source), QueryType::All, 10);

    pager.request_page(2);
    tokio::task::yield_now().await;
    pager.request_page(5);

    assert!(release_5.send(()).is_ok());
    pager.settle().await;
    tokio::task::yield_now().await;
    // The page-2 fetch was dropped mid-flight, taking its gate with it.
    assert!(release_2.send(()).is_err());
    assert!(!pager.poll_pending());

    assert_eq!(pager.page(), 5);
    assert_eq!(shown_title(&pager).as_deref(), Some("page 5"));
  }

  #[tokio::test]
  async fn latest_request_wins_when_older_resolves_last() {
    let source = Arc::new(FakeSource::with_videos(100));
    let release_5 = source.gate(5);
    let mut pager = PageController::new(Arc::clone(&source), QueryType::All, 10);

    // Page 2 finishes and queues its response before the pager looks.
    pager.request_page(2);
    while source.calls.lock().unwrap().is_empty() {
      tokio::task::yield_now().await;
    }
    pager.request_page(5);

    assert!(release_5.send(()).is_ok());
    pager.settle().await;

    assert_eq!(*source.calls.lock().unwrap(), vec![2, 5]);
    assert_eq!(pager.page(), 5);
    assert_eq!(shown_title(&pager).as_deref(), Some("page 5"));
  }

  #[tokio::test]
  async fn latest_request_wins_when_older_resolves_first() {
    let source = Arc::new(FakeSource::with_videos(100));
    let release_2 = source.gate(2);
    let release_5 = source.gate(5);
    let mut pager = PageController::new(Arc::clone(&source), QueryType::All, 10);

    pager.request_page(2);
    tokio::task::yield_now().await;
    pager.request_page(5);

    let _ = release_2.send(());
    tokio::task::yield_now().await;
    assert!(!pager.poll_pending());
    assert_eq!(pager.state(), PageState::Loading);
    let _ = release_5.send(());
    pager.settle().await;

    assert_eq!(shown_title(&pager).as_deref(), Some("page 5"));
  }

  #[tokio::test]
  async fn stale_response_is_discarded() {
    let source = Arc::new(FakeSource::with_videos(100));
    let release = source.gate(5);
    let mut pager = PageController::new(Arc::clone(&source), QueryType::All, 10);
    pager.request_page(5);
    let stale_seq = pager.next_seq - 1;

    let video = VideoSummary { title: "page 2".to_string(), ..Default::default() };
    let stale = VideoList { video_num: 1, video_list: vec![video] };
    pager.tx.send(PageResponse { seq: stale_seq, page: 2, result: Ok(stale) }).unwrap();
    assert!(!pager.poll_pending());
    assert_eq!(pager.state(), PageState::Loading);

    let _ = release.send(());
    pager.settle().await;
    assert_eq!(shown_title(&pager).as_deref(), Some("page 5"));
    assert_eq!(pager.total_page_count(), 10);
  }

  // --- jump_to_page ---

  #[tokio::test]
  async fn jump_clamps_low() {
    let mut pager = PageController::new(Arc::new(FakeSource::with_videos(70)), QueryType::All, 10);
    pager.jump_to_page(0);
    assert_eq!(pager.page(), 1);
    pager.jump_to_page(-4);
    assert_eq!(pager.page(), 1);
  }

  #[tokio::test]
  async fn jump_clamps_to_last_page() {
    let mut pager = PageController::new(Arc::new(FakeSource::with_videos(70)), QueryType::All, 10);
    pager.request_page(1);
    pager.settle().await;
    assert_eq!(pager.total_page_count(), 7);

    pager.jump_to_page(999);
    assert_eq!(pager.page(), 7);
    pager.settle().await;
    assert_eq!(shown_title(&pager).as_deref(), Some("page 7"));
  }

  #[tokio::test]
  async fn jump_without_pages_goes_to_first() {
    let mut pager = PageController::new(Arc::new(FakeSource::with_videos(0)), QueryType::All, 10);
    pager.jump_to_page(3);
    assert_eq!(pager.page(), 1);
    pager.settle().await;
    assert_eq!(pager.total_page_count(), 0);
    pager.next_page();
    assert_eq!(pager.page(), 1);
  }

  #[tokio::test]
  async fn next_and_prev() {
    let mut pager = PageController::new(Arc::new(FakeSource::with_videos(30)), QueryType::All, 10);
    pager.request_page(1);
    pager.settle().await;
    pager.next_page();
    pager.settle().await;
    assert_eq!(pager.page(), 2);
    pager.next_page();
    pager.next_page();
    pager.settle().await;
    assert_eq!(pager.page(), 3);
    pager.prev_page();
    assert_eq!(pager.page(), 2);
  }

  #[tokio::test]
  async fn settle_without_request_returns() {
    let mut pager = PageController::new(Arc::new(FakeSource::default()), QueryType::All, 10);
    pager.settle().await;
    assert_eq!(pager.state(), PageState::Idle);
  }
}
