use futures::future::OptionFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::api::SuggestionSource;
use crate::error::ApiError;
use crate::models::TagKind;

/// Latest suggestion list, with the text it answers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Suggestions {
  pub query: String,
  pub values: Vec<String>,
}

/// Debounced tag autocompletion for one tag kind.
///
/// Keystrokes go in through [`push`](Self::push). After `quiet` with no new
/// input the latest text becomes one request; a request still in flight is
/// aborted first. Stream-type lookups also skip a text equal to the one
/// previously sent. Only the newest request's answer is ever published.
///
/// Dropping the debouncer closes its input. The worker then aborts the
/// lookup in flight, if any, and exits.
pub struct TagSuggestionDebouncer {
  kind: TagKind,
  input: mpsc::UnboundedSender<String>,
  output: watch::Receiver<Suggestions>,
}

impl TagSuggestionDebouncer {
  pub fn spawn<S: SuggestionSource>(source: Arc<S>, kind: TagKind, quiet: Duration) -> Self {
    let (input, input_rx) = mpsc::unbounded_channel();
    let (output_tx, output) = watch::channel(Suggestions::default());
    let worker = Worker { source, kind, quiet, input: input_rx, output: output_tx };
    tokio::spawn(worker.run());
    Self { kind, input, output }
  }

  pub fn kind(&self) -> TagKind {
    self.kind
  }

  /// Feed the current contents of the tag input.
  pub fn push(&self, text: impl Into<String>) {
    let _ = self.input.send(text.into());
  }

  /// Receiver that changes whenever a fresh answer is applied.
  pub fn subscribe(&self) -> watch::Receiver<Suggestions> {
    self.output.clone()
  }

  pub fn current(&self) -> Suggestions {
    self.output.borrow().clone()
  }
}

struct Request {
  seq: u64,
  query: String,
  handle: JoinHandle<Result<Vec<String>, ApiError>>,
}

struct Worker<S> {
  source: Arc<S>,
  kind: TagKind,
  quiet: Duration,
  input: mpsc::UnboundedReceiver<String>,
  output: watch::Sender<Suggestions>,
}

impl<S: SuggestionSource> Worker<S> {
  async fn run(mut self) {
    let mut pending: Option<(String, Instant)> = None;
    let mut in_flight: Option<Request> = None;
    let mut last_sent: Option<String> = None;
    let mut seq: u64 = 0;

    loop {
      let deadline = pending.as_ref().map(|(_, at)| *at);
      let waiting = in_flight.is_some();
      let in_flight_done: OptionFuture<_> = in_flight.as_mut().map(|r| &mut r.handle).into();

      tokio::select! {
        text = self.input.recv() => match text {
          Some(text) => {
            if let Some((dropped, _)) = &pending {
              debug!(kind = %self.kind, dropped = %dropped, "suggest: timer reset");
            }
            pending = Some((text, Instant::now() + self.quiet));
          }
          None => break,
        },
        _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
          let Some((text, _)) = pending.take() else { continue };
          if self.kind == TagKind::StreamType && last_sent.as_deref() == Some(text.as_str()) {
            debug!(kind = %self.kind, query = %text, "suggest: unchanged, not sending");
            continue;
          }
          if let Some(old) = in_flight.take() {
            debug!(kind = %self.kind, query = %old.query, "suggest: aborting in-flight request");
            old.handle.abort();
          }
          seq += 1;
          in_flight = Some(self.issue(seq, text.clone()));
          last_sent = Some(text);
        },
        Some(joined) = in_flight_done, if waiting => {
          // Superseded requests were aborted and dropped, so this is always the newest one.
          let Some(request) = in_flight.take() else { continue };
          match joined {
            Ok(Ok(values)) => {
              debug!(kind = %self.kind, seq = request.seq, count = values.len(), "suggest: applied");
              self.output.send_replace(Suggestions { query: request.query, values });
            }
            Ok(Err(e)) => {
              warn!(kind = %self.kind, query = %request.query, err = %e, "suggest: lookup failed");
            }
            Err(e) => {
              debug!(kind = %self.kind, seq = request.seq, err = %e, "suggest: request task ended early");
            }
          }
        },
      }
    }

    if let Some(request) = in_flight.take() {
      debug!(kind = %self.kind, query = %request.query, "suggest: input closed, aborting in-flight request");
      request.handle.abort();
    }
  }

  fn issue(&self, seq: u64, query: String) -> Request {
    debug!(kind = %self.kind, seq, query = %query, "suggest: sending request");
    let source = Arc::clone(&self.source);
    let kind = self.kind;
    let text = query.clone();
    let handle = tokio::spawn(async move { source.tag_suggestions(kind, &text).await });
    Request { seq, query, handle }
  }
}
