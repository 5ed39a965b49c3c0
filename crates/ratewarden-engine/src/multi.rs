//! Multi-browse batching (spec.md §4.9): per rule, one `MGET` covering
//! every still-open job; first-match-wins per job, observably equivalent
//! to N serial single-browse evaluations. `multiDirectBrowse` and
//! `multiBaseBrowse` mirror single-call semantics rather than the
//! original's no-op stubs (spec.md §9, treated as a bug fix).

use crate::cache_key::cache_key;
use crate::engine::Engine;
use ratewarden_core::time::now_unix;
use ratewarden_core::Attributes;
use ratewarden_policy::{Method, Policy, ResultEntry};
use ratewarden_stats::Decision;
use ratewarden_store::{leak_browse, CounterBackend};
use std::collections::{HashMap, HashSet};

/// One batched job: a caller-supplied ID paired with its request
/// attributes.
#[derive(Debug, Clone)]
pub struct Job {
    /// Caller-assigned identifier, echoed back in the result.
    pub id: String,
    /// The job's request attributes.
    pub attrs: Attributes,
}

/// One job's verdict.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Echoes [`Job::id`].
    pub id: String,
    /// The verdict: a deny from the first matching rule that denied, or
    /// the default allow.
    pub result: ResultEntry,
}

impl<B: CounterBackend + 'static> Engine<B> {
    /// Evaluate `jobs` against every rule in `policy`, batching store
    /// reads per rule where the store supports it (`count`).
    pub async fn multi_browse(&self, policy: &Policy, jobs: &[Job]) -> Vec<JobResult> {
        let mut still_open: HashSet<String> = jobs.iter().map(|j| j.id.clone()).collect();
        let mut denied: HashMap<String, ResultEntry> = HashMap::new();

        for rule in policy.rules() {
            if still_open.is_empty() {
                break;
            }
            let matching: Vec<&Job> = jobs
                .iter()
                .filter(|j| still_open.contains(&j.id) && rule.matches(&j.attrs))
                .collect();
            if matching.is_empty() {
                continue;
            }

            match rule.method {
                Method::Direct => {
                    for job in &matching {
                        self.record_and_maybe_deny(
                            policy,
                            rule.return_code,
                            rule.result,
                            true,
                            job,
                            &mut denied,
                            &mut still_open,
                        )
                        .await;
                    }
                }
                Method::Count => {
                    let keys: Vec<String> =
                        matching.iter().map(|j| cache_key(rule, &j.attrs)).collect();
                    let values = self.mget(&keys).await;
                    for (job, value) in matching.iter().zip(values) {
                        let deny = value.unwrap_or(0) >= i64::from(rule.count);
                        self.record_and_maybe_deny(
                            policy,
                            rule.return_code,
                            rule.result,
                            deny,
                            job,
                            &mut denied,
                            &mut still_open,
                        )
                        .await;
                    }
                }
                Method::Base => {
                    let primary_keys: Vec<String> =
                        matching.iter().map(|j| cache_key(rule, &j.attrs)).collect();
                    let primary_values = self.mget(&primary_keys).await;

                    let mut over_base: Vec<(&&Job, String)> = Vec::new();
                    let mut verdicts: HashMap<&str, bool> = HashMap::new();
                    for ((job, primary_key), primary) in
                        matching.iter().zip(primary_keys).zip(primary_values)
                    {
                        if primary.unwrap_or(0) < i64::from(rule.base) {
                            verdicts.insert(job.id.as_str(), false);
                        } else {
                            over_base.push((job, format!("{primary_key}_B")));
                        }
                    }

                    if !over_base.is_empty() {
                        let secondary_keys: Vec<String> =
                            over_base.iter().map(|(_, k)| k.clone()).collect();
                        let secondary_values = self.mget(&secondary_keys).await;
                        for ((job, _), secondary) in over_base.iter().zip(secondary_values) {
                            let deny = secondary.unwrap_or(0) >= i64::from(rule.count);
                            verdicts.insert(job.id.as_str(), deny);
                        }
                    }

                    for job in &matching {
                        let deny = verdicts.get(job.id.as_str()).copied().unwrap_or(false);
                        self.record_and_maybe_deny(
                            policy,
                            rule.return_code,
                            rule.result,
                            deny,
                            job,
                            &mut denied,
                            &mut still_open,
                        )
                        .await;
                    }
                }
                Method::Leak => {
                    let now = now_unix();
                    for job in &matching {
                        let key = cache_key(rule, &job.attrs);
                        let deny = leak_browse(self.backend(), &key, rule.count, rule.time, now)
                            .await
                            .unwrap_or_else(|e| {
                                tracing::error!(error = %e, "multi leak browse failed, failing open");
                                false
                            });
                        self.record_and_maybe_deny(
                            policy,
                            rule.return_code,
                            rule.result,
                            deny,
                            job,
                            &mut denied,
                            &mut still_open,
                        )
                        .await;
                    }
                }
            }
        }

        jobs.iter()
            .map(|job| JobResult {
                id: job.id.clone(),
                result: denied
                    .remove(&job.id)
                    .unwrap_or_else(|| default_allow(policy)),
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_and_maybe_deny(
        &self,
        policy: &Policy,
        return_code: i32,
        result_index: i32,
        deny: bool,
        job: &Job,
        denied: &mut HashMap<String, ResultEntry>,
        still_open: &mut HashSet<String>,
    ) {
        self.stats()
            .record(
                return_code,
                if deny { Decision::Deny } else { Decision::Allow },
            )
            .await;
        if deny {
            denied.insert(
                job.id.clone(),
                policy
                    .result(result_index)
                    .cloned()
                    .unwrap_or_else(|| default_allow(policy)),
            );
            still_open.remove(&job.id);
        }
    }
}

fn default_allow(policy: &Policy) -> ResultEntry {
    policy
        .result(1)
        .cloned()
        .unwrap_or_else(|| ResultEntry::default_allow(1))
}
