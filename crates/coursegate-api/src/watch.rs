//! Interval-driven fetch-and-diff watcher.
//!
//! Every tick the watcher calls a fetch function and forwards the result only
//! when it differs from the last value it forwarded. The first successful
//! fetch is always forwarded. Fetch errors are logged and skipped. The task
//! ends when its [`CancellationToken`] is cancelled or the receiver is dropped.

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use coursegate_core::{progress::CourseProgress, store::LearningStore};
use tokio::{
  sync::mpsc,
  time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Spawn a watcher task and return the receiving end of its change feed.
pub fn watch<T, E, F, Fut>(
  every: Duration,
  cancel: CancellationToken,
  mut fetch: F,
) -> mpsc::Receiver<T>
where
  T: PartialEq + Clone + Send + 'static,
  E: Display + Send + 'static,
  F: FnMut() -> Fut + Send + 'static,
  Fut: Future<Output = Result<T, E>> + Send + 'static,
{
  let (tx, rx) = mpsc::channel(8);

  tokio::spawn(async move {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<T> = None;

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tx.closed() => break,
        _ = ticker.tick() => {}
      }

      let current = match fetch().await {
        Ok(value) => value,
        Err(e) => {
          tracing::warn!(error = %e, "watcher fetch failed");
          continue;
        }
      };
      if last.as_ref() == Some(&current) {
        tracing::debug!("watcher tick: unchanged");
        continue;
      }
      if tx.send(current.clone()).await.is_err() {
        break;
      }
      last = Some(current);
    }
    tracing::debug!("watcher stopped");
  });

  rx
}

/// Watch one user's progress through one course.
pub fn watch_progress<S: LearningStore + 'static>(
  store: Arc<S>,
  user_id: Uuid,
  course_id: Uuid,
  every: Duration,
  cancel: CancellationToken,
) -> mpsc::Receiver<CourseProgress> {
  watch(every, cancel, move || {
    let store = store.clone();
    async move { store.course_progress(user_id, course_id).await }
  })
}
