use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::stats::Stats;

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";

/// One outbound notification, optionally with the face photo attached.
#[derive(Debug, Clone)]
pub struct Alert {
    pub message: String,
    pub photo: Option<AlertPhoto>,
}

#[derive(Debug, Clone)]
pub struct AlertPhoto {
    pub file_name: String,
    pub jpeg: Vec<u8>,
}

/// External notification channel. Called from the blocking pool.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Sink used when no push credentials are configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl AlertSink for LogNotifier {
    fn notify(&self, alert: &Alert) -> Result<()> {
        info!(message = %alert.message, photo = ?alert.photo.as_ref().map(|p| &p.file_name), "alert");
        Ok(())
    }
}

/// Pushover message API with the photo as `attachment`.
pub struct PushoverNotifier {
    client: reqwest::blocking::Client,
    token: String,
    user: String,
    url: String,
}

impl PushoverNotifier {
    /// Build on a blocking-capable thread; the blocking client owns its own runtime.
    pub fn new(token: String, user: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, token, user, url: PUSHOVER_URL.to_string() })
    }
}

impl AlertSink for PushoverNotifier {
    fn notify(&self, alert: &Alert) -> Result<()> {
        let mut form = reqwest::blocking::multipart::Form::new()
            .text("token", self.token.clone())
            .text("user", self.user.clone())
            .text("message", alert.message.clone());
        if let Some(photo) = &alert.photo {
            let part = reqwest::blocking::multipart::Part::bytes(photo.jpeg.clone())
                .file_name(photo.file_name.clone())
                .mime_str("image/jpeg")?;
            form = form.part("attachment", part);
        }
        let resp = self.client.post(&self.url).multipart(form).send().context("pushover request")?;
        if !resp.status().is_success() {
            anyhow::bail!("pushover returned {}", resp.status());
        }
        Ok(())
    }
}

/// Fire-and-forget handle. Enqueueing never waits; a full queue drops the alert.
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<Alert>,
    stats: Arc<Stats>,
}

impl AlertDispatcher {
    /// Dispatcher plus the receiving end, for callers that drain it themselves.
    pub fn channel(queue: usize, stats: Arc<Stats>) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(queue.max(1));
        (Self { tx, stats }, rx)
    }

    pub fn dispatch(&self, alert: Alert) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(alert)) => {
                self.stats.inc_alerts_dropped();
                warn!(message = %alert.message, "alert queue full; dropping alert");
            }
            Err(mpsc::error::TrySendError::Closed(alert)) => {
                self.stats.inc_alerts_dropped();
                warn!(message = %alert.message, "alert workers stopped; dropping alert");
            }
        }
    }
}

/// Start `n` alert workers draining a queue of `queue` alerts.
///
/// At most `n` notifications are in flight at once. Must be called inside a
/// tokio runtime.
pub fn start_alert_workers(n: usize, queue: usize, sink: Arc<dyn AlertSink>, stats: Arc<Stats>) -> AlertDispatcher {
    let (dispatcher, mut rx) = AlertDispatcher::channel(queue, stats.clone());
    let n = n.max(1);

    // Round-robin distributor; each worker holds at most one pending alert
    let mut worker_txs = Vec::with_capacity(n);
    let mut worker_rxs = Vec::with_capacity(n);
    for _ in 0..n {
        let (wt, wr) = mpsc::channel::<Alert>(1);
        worker_txs.push(wt);
        worker_rxs.push(wr);
    }

    tokio::spawn(async move {
        let mut idx = 0;
        while let Some(alert) = rx.recv().await {
            let target = idx % worker_txs.len();
            if worker_txs[target].send(alert).await.is_err() {
                break;
            }
            idx += 1;
        }
    });

    for (worker, mut worker_rx) in worker_rxs.into_iter().enumerate() {
        let sink = sink.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            while let Some(alert) = worker_rx.recv().await {
                let sink = sink.clone();
                let result = tokio::task::spawn_blocking(move || sink.notify(&alert)).await;
                match result {
                    Ok(Ok(())) => {
                        stats.inc_alerts_sent();
                        debug!(worker, "alert delivered");
                    }
                    Ok(Err(e)) => {
                        stats.inc_alerts_failed();
                        warn!(worker, error = %e, "alert delivery failed");
                    }
                    Err(e) => {
                        stats.inc_alerts_failed();
                        error!(worker, error = %e, "alert task panicked");
                    }
                }
            }
        });
    }

    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn alert(msg: &str) -> Alert {
        Alert { message: msg.into(), photo: None }
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let stats = Arc::new(Stats::new());
        let (dispatcher, mut rx) = AlertDispatcher::channel(2, stats.clone());
        dispatcher.dispatch(alert("a"));
        dispatcher.dispatch(alert("b"));
        dispatcher.dispatch(alert("c"));
        assert_eq!(stats.alerts_dropped(), 1);
        assert_eq!(rx.try_recv().unwrap().message, "a");
        assert_eq!(rx.try_recv().unwrap().message, "b");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue_counts_drop() {
        let stats = Arc::new(Stats::new());
        let (dispatcher, rx) = AlertDispatcher::channel(4, stats.clone());
        drop(rx);
        dispatcher.dispatch(alert("late"));
        assert_eq!(stats.alerts_dropped(), 1);
    }

    struct Recording(Mutex<Vec<String>>);

    impl AlertSink for Recording {
        fn notify(&self, alert: &Alert) -> Result<()> {
            self.0.lock().push(alert.message.clone());
            if alert.message == "fail" {
                anyhow::bail!("sink down");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_workers_deliver_and_swallow_failures() {
        let stats = Arc::new(Stats::new());
        let sink = Arc::new(Recording(Mutex::new(Vec::new())));
        let dispatcher = start_alert_workers(2, 16, sink.clone(), stats.clone());
        dispatcher.dispatch(alert("one"));
        dispatcher.dispatch(alert("fail"));
        dispatcher.dispatch(alert("two"));
        for _ in 0..50 {
            let s = stats.snapshot();
            if s.alerts_sent + s.alerts_failed == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let s = stats.snapshot();
        assert_eq!(s.alerts_sent, 2);
        assert_eq!(s.alerts_failed, 1);
        assert_eq!(sink.0.lock().len(), 3);
    }
}
