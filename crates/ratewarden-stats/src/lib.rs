//! Per-rule allow/deny stats aggregator (spec.md §4.7): a single-consumer
//! task over a bounded channel, bucketed by day, flushed on rollover.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use ratewarden_core::time::{date_bucket, now_unix};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// A decision outcome for one rule evaluation, tagged for the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The rule's keys matched and its counter allowed the request.
    Allow,
    /// The rule's keys matched and its counter (or `direct`) denied it.
    Deny,
}

/// One message produced per rule evaluation (spec.md §3 "Counter message").
#[derive(Debug, Clone, Copy)]
pub struct CounterMessage {
    /// The rule's unique `returnCode`.
    pub rule_return_code: i32,
    /// The evaluation's outcome.
    pub decision: Decision,
}

/// Producer handle: cloned into every request handler.
#[derive(Clone)]
pub struct StatsSender {
    tx: mpsc::Sender<CounterMessage>,
}

impl StatsSender {
    /// Record one rule evaluation. Blocks (applying back-pressure onto the
    /// handler) if the channel is full, per spec.md §5.
    pub async fn record(&self, rule_return_code: i32, decision: Decision) {
        let _ = self
            .tx
            .send(CounterMessage {
                rule_return_code,
                decision,
            })
            .await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    allow: u64,
    deny: u64,
}

/// The single-consumer aggregator: owns the bounded channel's receiver and
/// the day-bucketed counter map.
pub struct Aggregator {
    rx: mpsc::Receiver<CounterMessage>,
    day_offset_minutes: i32,
    buckets: HashMap<String, HashMap<i32, Counters>>,
}

impl Aggregator {
    /// Build a new aggregator and its paired sender, with the given
    /// channel capacity (spec.md §6 `stats_channel_capacity`, default
    /// 1024).
    #[must_use]
    pub fn new(capacity: usize, day_offset_minutes: i32) -> (Self, StatsSender) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                rx,
                day_offset_minutes,
                buckets: HashMap::new(),
            },
            StatsSender { tx },
        )
    }

    /// Run the consumer loop until the channel is closed (all senders
    /// dropped), flushing rollover buckets as they're encountered. Returns
    /// the flushed lines so the caller can decide how to persist them
    /// (in production, `tracing::warn!` under the `stats_log` target).
    pub async fn run(mut self, mut on_flush: impl FnMut(&str, Vec<String>)) {
        while let Some(msg) = self.rx.recv().await {
            self.ingest(msg, &mut on_flush);
        }
        self.flush_all(&mut on_flush);
    }

    fn ingest(&mut self, msg: CounterMessage, on_flush: &mut impl FnMut(&str, Vec<String>)) {
        let today = date_bucket(self.day_offset_minutes, now_unix());
        let stale: Vec<String> = self
            .buckets
            .keys()
            .filter(|b| **b != today)
            .cloned()
            .collect();
        for bucket in stale {
            if let Some(counters) = self.buckets.remove(&bucket) {
                let lines = render_lines(&counters);
                on_flush(&bucket, lines);
            }
        }
        let entry = self
            .buckets
            .entry(today)
            .or_default()
            .entry(msg.rule_return_code)
            .or_default();
        match msg.decision {
            Decision::Allow => entry.allow += 1,
            Decision::Deny => entry.deny += 1,
        }
    }

    fn flush_all(&mut self, on_flush: &mut impl FnMut(&str, Vec<String>)) {
        for (bucket, counters) in self.buckets.drain() {
            let lines = render_lines(&counters);
            on_flush(&bucket, lines);
        }
    }
}

fn render_lines(counters: &HashMap<i32, Counters>) -> Vec<String> {
    let mut rule_nos: Vec<&i32> = counters.keys().collect();
    rule_nos.sort_unstable();
    rule_nos
        .into_iter()
        .map(|rule_no| {
            let c = counters[rule_no];
            format!("rule_no:{rule_no}  allow:{}  deny:{}", c.allow, c.deny)
        })
        .collect()
}
