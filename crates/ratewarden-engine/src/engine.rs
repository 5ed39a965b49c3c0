//! Rule evaluation flows: browse, browse-complete, update (spec.md §4.3).

use crate::cache_key::cache_key;
use ratewarden_core::time::now_unix;
use ratewarden_core::Attributes;
use ratewarden_policy::{Method, Policy, Rule};
use ratewarden_stats::{Decision, StatsSender};
use ratewarden_store::{
    base_browse, base_update, count_browse, count_update, leak_browse, leak_trim, leak_update,
    CounterBackend,
};
use std::sync::Arc;

/// Ties together a counter-store backend and the stats channel; the unit
/// request handlers evaluate rules against.
pub struct Engine<B: CounterBackend + 'static> {
    backend: Arc<B>,
    stats: StatsSender,
    day_offset_minutes: i32,
}

impl<B: CounterBackend + 'static> Clone for Engine<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            stats: self.stats.clone(),
            day_offset_minutes: self.day_offset_minutes,
        }
    }
}

impl<B: CounterBackend + 'static> Engine<B> {
    /// Build an engine over a shared backend and stats sender.
    pub fn new(backend: Arc<B>, stats: StatsSender, day_offset_minutes: i32) -> Self {
        Self {
            backend,
            stats,
            day_offset_minutes,
        }
    }

    /// The underlying counter-store backend.
    pub(crate) fn backend(&self) -> &B {
        self.backend.as_ref()
    }

    /// The stats-channel sender.
    pub(crate) fn stats(&self) -> &StatsSender {
        &self.stats
    }

    /// One `MGET` across `keys`, fail-open (all-absent) on a store error.
    pub(crate) async fn mget(&self, keys: &[String]) -> Vec<Option<i64>> {
        self.backend.mget(keys).await.unwrap_or_else(|e| {
            tracing::error!(error = %e, "multi-browse mget failed, failing open");
            vec![None; keys.len()]
        })
    }

    /// Evaluate one rule's counter algorithm, given its keys already
    /// matched. Returns `true` if the rule denies. Store failures fail
    /// open (spec.md §7): logged, treated as non-denying.
    async fn decide(&self, rule: &Rule, attrs: &Attributes) -> bool {
        match rule.method {
            Method::Direct => true,
            Method::Count => {
                let key = cache_key(rule, attrs);
                count_browse(self.backend.as_ref(), &key, rule.count)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::error!(error = %e, rule = rule.return_code, "count browse failed, failing open");
                        false
                    })
            }
            Method::Base => {
                let key = cache_key(rule, attrs);
                base_browse(self.backend.as_ref(), &key, rule.base, rule.count)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::error!(error = %e, rule = rule.return_code, "base browse failed, failing open");
                        false
                    })
            }
            Method::Leak => {
                let key = cache_key(rule, attrs);
                let now = now_unix();
                let deny = leak_browse(self.backend.as_ref(), &key, rule.count, rule.time, now)
                    .await
                    .unwrap_or_else(|e| {
                        tracing::error!(error = %e, rule = rule.return_code, "leak browse failed, failing open");
                        false
                    });
                if deny {
                    let backend = Arc::clone(&self.backend);
                    let key = key.clone();
                    let count = rule.count;
                    tokio::spawn(async move {
                        if let Err(e) = leak_trim(backend.as_ref(), &key, count).await {
                            tracing::warn!(error = %e, "leak queue trim failed");
                        }
                    });
                }
                deny
            }
        }
    }

    /// Apply one rule's counter update. Store failures are logged and
    /// dropped (spec.md §7) — the caller never sees them.
    async fn apply_update(&self, rule: &Rule, attrs: &Attributes) {
        let result = match rule.method {
            Method::Direct => Ok(()),
            Method::Count => {
                let key = cache_key(rule, attrs);
                count_update(self.backend.as_ref(), &key, rule.time, self.day_offset_minutes).await
            }
            Method::Base => {
                let key = cache_key(rule, attrs);
                base_update(self.backend.as_ref(), &key, rule.base, rule.time).await
            }
            Method::Leak => {
                let key = cache_key(rule, attrs);
                leak_update(self.backend.as_ref(), &key, rule.time, now_unix()).await
            }
        };
        if let Err(e) = result {
            tracing::error!(error = %e, rule = rule.return_code, "counter update failed, dropped");
        }
    }

    /// Fire-and-forget update, for the `_writeThrough=yes` browse flag
    /// (spec.md §4.8).
    fn schedule_update(&self, rule: Rule, attrs: Attributes) {
        let engine = self.clone();
        tokio::spawn(async move {
            engine.apply_update(&rule, &attrs).await;
        });
    }

    /// `rule/browse`: first-hit verdict. Stops at the first deny.
    pub async fn browse(
        &self,
        policy: &Policy,
        attrs: &Attributes,
        write_through: bool,
    ) -> ratewarden_policy::ResultEntry {
        for rule in policy.rules() {
            if !rule.matches(attrs) {
                continue;
            }
            if write_through {
                self.schedule_update(rule.clone(), attrs.clone());
            }
            let deny = self.decide(rule, attrs).await;
            self.stats
                .record(
                    rule.return_code,
                    if deny { Decision::Deny } else { Decision::Allow },
                )
                .await;
            if deny {
                return policy
                    .result(rule.result)
                    .cloned()
                    .unwrap_or_else(|| default_allow(policy));
            }
        }
        default_allow(policy)
    }

    /// `rule/browse_complete`: collects every denying rule's verdict.
    pub async fn browse_complete(
        &self,
        policy: &Policy,
        attrs: &Attributes,
    ) -> Vec<ratewarden_policy::ResultEntry> {
        let mut denies = Vec::new();
        for rule in policy.rules() {
            if !rule.matches(attrs) {
                continue;
            }
            let deny = self.decide(rule, attrs).await;
            self.stats
                .record(
                    rule.return_code,
                    if deny { Decision::Deny } else { Decision::Allow },
                )
                .await;
            if deny {
                denies.push(
                    policy
                        .result(rule.result)
                        .cloned()
                        .unwrap_or_else(|| default_allow(policy)),
                );
            }
        }
        denies
    }

    /// `rule/update`: fire-and-forget counter update for every matching
    /// rule.
    pub async fn update(&self, policy: &Policy, attrs: &Attributes) {
        for rule in policy.rules() {
            if rule.matches(attrs) {
                self.apply_update(rule, attrs).await;
            }
        }
    }
}

fn default_allow(policy: &Policy) -> ratewarden_policy::ResultEntry {
    policy
        .result(1)
        .cloned()
        .unwrap_or_else(|| ratewarden_policy::ResultEntry::default_allow(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratewarden_stats::Aggregator;
    use ratewarden_store::MemoryBackend;
    use std::collections::HashMap;
    use std::path::Path;

    fn build(content: &str) -> Policy {
        Policy::parse(content, Path::new(".")).unwrap().0
    }

    fn engine(backend: Arc<MemoryBackend>) -> (Engine<MemoryBackend>, Aggregator) {
        let (agg, sender) = Aggregator::new(64, 0);
        (Engine::new(backend, sender, 480), agg)
    }

    #[tokio::test]
    async fn count_threshold_denies_at_three_and_stays_denied_scenario_1() {
        let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n2 : {\"retType\":1,\"retCode\":201,\"errNo\":1,\"errMsg\":\"denied\",\"strReason\":\"limit\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [count] [a=1] [time=60; count=3;] [result=2; return=201]\n";
        let policy = build(content);
        let backend = Arc::new(MemoryBackend::new());
        let (engine, agg) = engine(backend);
        let mut attrs = HashMap::new();
        attrs.insert("a".to_string(), "1".to_string());

        for _ in 0..3 {
            engine.update(&policy, &attrs).await;
        }
        let verdict = engine.browse(&policy, &attrs, false).await;
        assert_eq!(verdict.ret_code, 201);

        engine.update(&policy, &attrs).await;
        let verdict = engine.browse(&policy, &attrs, false).await;
        assert_eq!(verdict.ret_code, 201);
        drop(agg);
    }

    #[tokio::test]
    async fn first_deny_wins_and_write_through_schedules_update() {
        let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n2 : {\"retType\":1,\"retCode\":9,\"errNo\":1,\"errMsg\":\"blocked\",\"strReason\":\"direct\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [direct] [a=1] [] [result=2; return=401]\n";
        let policy = build(content);
        let backend = Arc::new(MemoryBackend::new());
        let (engine, agg) = engine(backend);
        let mut attrs = HashMap::new();
        attrs.insert("a".to_string(), "1".to_string());

        let verdict = engine.browse(&policy, &attrs, true).await;
        assert_eq!(verdict.ret_code, 9);
        drop(agg);
    }

    #[tokio::test]
    async fn browse_complete_collects_every_denying_rule() {
        let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n2 : {\"retType\":1,\"retCode\":2,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n3 : {\"retType\":1,\"retCode\":3,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [direct] [a=1] [] [result=2; return=501]\nrule : [direct] [b=2] [] [result=3; return=502]\n";
        let policy = build(content);
        let backend = Arc::new(MemoryBackend::new());
        let (engine, agg) = engine(backend);
        let mut attrs = HashMap::new();
        attrs.insert("a".to_string(), "1".to_string());
        attrs.insert("b".to_string(), "2".to_string());

        let verdicts = engine.browse_complete(&policy, &attrs).await;
        assert_eq!(verdicts.len(), 2);
        drop(agg);
    }

    #[tokio::test]
    async fn missing_attribute_never_matches_and_falls_through_to_allow() {
        let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n2 : {\"retType\":1,\"retCode\":1,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [direct] [a=1] [] [result=2; return=601]\n";
        let policy = build(content);
        let backend = Arc::new(MemoryBackend::new());
        let (engine, agg) = engine(backend);
        let verdict = engine.browse(&policy, &HashMap::new(), false).await;
        assert_eq!(verdict.ret_code, 0);
        drop(agg);
    }
}
