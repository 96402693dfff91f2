//! Sample acquisition: connect to the telemetry source, request due
//! categories, map what arrives and hand it to the category queues.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::queue::{run_consumer, work_queue, QueueSender, QueueStats};
use crate::reconnect::ReconnectState;
use crate::session::Tracker;
use crate::types::raw::{schema, snapshot_from_raw};
use crate::types::{Category, ChangeEvent, Snapshot};

/// Longest sleep while disconnected, so a freshly bound flight gets the
/// shorter retry without waiting out the idle backoff
const DISCONNECTED_POLL: Duration = Duration::from_secs(1);

pub type SampleQueue = QueueSender<ChangeEvent<Snapshot>>;

/// Producer half of the pipeline: one queue per category
pub struct Acquisition {
    tracker: Arc<Tracker>,
    queues: BTreeMap<Category, SampleQueue>,
    reconnect: ReconnectState,
    bound: bool,
}

impl Acquisition {
    pub fn new(tracker: Arc<Tracker>, queues: BTreeMap<Category, SampleQueue>) -> Self {
        let reconnect = ReconnectState::new(tracker.config());
        Acquisition { tracker, queues, reconnect, bound: false }
    }

    pub fn reconnect_state(&self) -> &ReconnectState {
        &self.reconnect
    }

    pub fn queue_stats(&self) -> BTreeMap<Category, Arc<QueueStats>> {
        self.queues.iter().map(|(c, q)| (*c, q.stats())).collect()
    }

    /// One acquisition cycle; returns how long to sleep before the next
    pub async fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let bound = self.tracker.has_flight();
        if bound && !self.bound {
            self.reconnect.tighten(now);
        }
        self.bound = bound;

        if !self.reconnect.connected {
            if !self.reconnect.can_retry(now) {
                return self.reconnect.next_attempt.saturating_duration_since(now).min(DISCONNECTED_POLL);
            }
            if let Err(e) = self.connect() {
                log::debug!("Telemetry source not available: {}", e);
                self.reconnect.record_failed_attempt(now, bound);
                return DISCONNECTED_POLL;
            }
        }

        if let Err(e) = self.poll(now) {
            log::warn!("Telemetry source lost: {}", e);
            self.reconnect.record_lost(Instant::now());
            self.tracker.handle_connection_lost().await;
            return DISCONNECTED_POLL;
        }

        let freshness = self.tracker.freshness();
        freshness
            .interval(Category::Primary)
            .min(freshness.interval(Category::LandingAnalysis))
    }

    fn connect(&mut self) -> Result<(), crate::error::SourceError> {
        let source = self.tracker.source();
        source.connect()?;
        for category in Category::ALL {
            source.register_schema(category, &schema(category))?;
        }
        self.reconnect.record_success();
        self.tracker.freshness().reset();
        self.tracker.set_connected(true);
        Ok(())
    }

    /// Request due categories and forward whatever arrived
    fn poll(&mut self, now: Instant) -> Result<(), crate::error::SourceError> {
        let source = self.tracker.source();
        let freshness = self.tracker.freshness();
        for category in freshness.due_categories(now) {
            source.request_sample(category)?;
            freshness.mark_requested(category, now);
        }

        for sample in source.receive()? {
            let snapshot = match snapshot_from_raw(&sample) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    log::warn!("Dropping {} sample: {}", sample.category.name(), e);
                    continue;
                }
            };
            let category = snapshot.category();
            let change = self.tracker.record_sample(snapshot, Utc::now());
            freshness.mark_received(category, Instant::now());
            match self.queues.get(&category) {
                Some(queue) => {
                    if !queue.push(change) {
                        log::warn!("{} queue closed, sample dropped", category.name());
                    }
                }
                None => log::debug!("No queue for {} samples", category.name()),
            }
        }
        Ok(())
    }
}

pub async fn run_acquisition_loop(mut acquisition: Acquisition) {
    log::info!("Acquisition loop started");
    let tracker = acquisition.tracker.clone();
    while !tracker.is_closing() {
        let wait = acquisition.tick().await;
        tokio::time::sleep(wait).await;
    }
    tracker.source().disconnect();
    log::info!("Acquisition loop stopped");
}

/// Wire queues, consumers and background loops around `tracker` and
/// start them all
pub fn spawn_pipeline(tracker: Arc<Tracker>) -> Vec<JoinHandle<()>> {
    let mut queues = BTreeMap::new();
    let mut handles = Vec::new();
    let idle = tracker.config().processor_idle();

    for category in Category::ALL {
        let (tx, rx) = work_queue::<ChangeEvent<Snapshot>>(category.name());
        queues.insert(category, tx);
        let consumer_tracker = tracker.clone();
        handles.push(tokio::spawn(run_consumer(
            rx,
            tracker.closing_flag(),
            idle,
            move |change| {
                let tracker = consumer_tracker.clone();
                async move { tracker.handle_change(change).await }
            },
        )));
    }

    handles.push(tokio::spawn(run_acquisition_loop(Acquisition::new(tracker.clone(), queues))));
    handles.push(tokio::spawn(crate::persistence::run_schedule_loop(tracker.clone())));
    handles.push(tokio::spawn(tracker.run_ground_handling_loop()));
    handles
}
