//! Progress bar for chapter downloads, fed by the progress event channel.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use mangas_core::download::{ProgressEvent, ProgressStatus};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Spawns a task rendering `events` until every sender is dropped.
///
/// When `enabled` is false the receiver is dropped immediately; reporters
/// then count their events as dropped and carry on.
pub(crate) fn spawn_progress_ui(
    enabled: bool,
    events: mpsc::Receiver<ProgressEvent>,
    total: usize,
) -> Option<JoinHandle<()>> {
    if !enabled {
        return None;
    }
    Some(tokio::spawn(render(events, total)))
}

/// Waits for the UI task to end. A task that panicked or was cancelled is
/// logged and reported as `false`.
pub(crate) async fn finish_progress_ui(ui: Option<JoinHandle<()>>) -> bool {
    let Some(handle) = ui else {
        return true;
    };
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "progress display task failed");
            false
        }
    }
}

async fn render(mut events: mpsc::Receiver<ProgressEvent>, total: usize) {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    while let Some(event) = events.recv().await {
        match event.status {
            ProgressStatus::Complete => {
                bar.inc(1);
                bar.set_message(format!("chapter {} done", event.chapter_number));
            }
            ProgressStatus::Error => {
                bar.inc(1);
                bar.println(format!(
                    "chapter {} failed: {}",
                    event.chapter_number,
                    event.error.as_deref().unwrap_or("unknown error")
                ));
            }
            _ => bar.set_message(describe(&event)),
        }
    }

    bar.finish_and_clear();
}

fn describe(event: &ProgressEvent) -> String {
    if event.total > 0 {
        format!(
            "chapter {}: {} {}/{}",
            event.chapter_number, event.status, event.current, event.total
        )
    } else {
        format!("chapter {}: {}", event.chapter_number, event.status)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mangas_core::download::progress_channel;
    use mangas_core::{ChapterUnit, Series};

    #[test]
    fn test_describe_includes_counts_when_known() {
        let series = Series {
            id: "s1".to_string(),
            ..Series::default()
        };
        let chapter = ChapterUnit {
            id: "c1".to_string(),
            number: "4".to_string(),
            ..ChapterUnit::default()
        };
        let event =
            ProgressEvent::new(&series, &chapter, ProgressStatus::Fetching).with_counts(2, 9);
        assert_eq!(describe(&event), "chapter 4: fetching 2/9");

        let queued = ProgressEvent::new(&series, &chapter, ProgressStatus::Queued);
        assert_eq!(describe(&queued), "chapter 4: queued");
    }

    #[tokio::test]
    async fn test_disabled_ui_returns_none() {
        let (_reporter, events) = progress_channel(4);
        assert!(spawn_progress_ui(false, events, 3).is_none());
    }

    #[tokio::test]
    async fn test_ui_task_ends_when_senders_drop() {
        let (reporter, events) = progress_channel(4);
        let handle = spawn_progress_ui(true, events, 1).unwrap();
        drop(reporter);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_finish_reports_panicked_ui_task() {
        let handle = tokio::spawn(async { panic!("render blew up") });
        assert!(!finish_progress_ui(Some(handle)).await);
    }

    #[tokio::test]
    async fn test_finish_waits_for_clean_ui_task() {
        assert!(finish_progress_ui(None).await);

        let (reporter, events) = progress_channel(4);
        let handle = spawn_progress_ui(true, events, 1);
        drop(reporter);
        assert!(finish_progress_ui(handle).await);
    }
}
