//! Hot-swap policy loader (spec.md §4.6): parse the rule file and every
//! referenced dictionary file, fingerprint their concatenated bytes with
//! MD5, and atomically swap the active policy when the fingerprint
//! changes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use md5::{Digest, Md5};
use ratewarden_policy::{Policy, PolicyError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// MD5 over the concatenated bytes of every watched file (spec.md §4.6).
/// Returns an I/O error if any watched file has since disappeared.
fn compute_fingerprint(paths: &[PathBuf]) -> std::io::Result<String> {
    let mut hasher = Md5::new();
    for path in paths {
        let bytes = std::fs::read(path)?;
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Owns the active-policy pointer and the rule-file path; readers call
/// [`Loader::active`] to snapshot the current policy at request entry.
pub struct Loader {
    rule_path: PathBuf,
    active: Arc<RwLock<Arc<Policy>>>,
    watched: Vec<PathBuf>,
    fingerprint: String,
}

impl Loader {
    /// Parse the rule file (and its referenced dictionaries) and become
    /// the initial active policy. Fails the same way [`Policy::parse_file`]
    /// does; there is no "previous policy" to fall back to at startup.
    pub fn bootstrap(rule_path: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let rule_path = rule_path.into();
        let (policy, watched) = Policy::parse_file(&rule_path)?;
        let fingerprint = compute_fingerprint(&watched)
            .map_err(|source| PolicyError::Io { path: rule_path.clone(), source })?;
        Ok(Self {
            rule_path,
            active: Arc::new(RwLock::new(Arc::new(policy))),
            watched,
            fingerprint,
        })
    }

    /// A cloneable handle to the active-policy pointer, for wiring into
    /// request handlers before the loader is consumed by [`Loader::spawn`].
    #[must_use]
    pub fn active_handle(&self) -> Arc<RwLock<Arc<Policy>>> {
        Arc::clone(&self.active)
    }

    /// Snapshot the currently active policy.
    #[must_use]
    pub fn active(&self) -> Arc<Policy> {
        self.active.read().unwrap().clone()
    }

    /// Spawn the background reload task. Sleeps `interval` between checks;
    /// on a fingerprint change, reparses and swaps on success, or logs and
    /// keeps the current policy on failure. The watched-files list is
    /// reset on every successful parse so removed dictionaries drop off.
    pub fn spawn(mut self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let unchanged = match compute_fingerprint(&self.watched) {
                    Ok(fp) => fp == self.fingerprint,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not fingerprint watched files, attempting reload");
                        false
                    }
                };
                if unchanged {
                    continue;
                }

                match Policy::parse_file(&self.rule_path) {
                    Ok((policy, new_watched)) => match compute_fingerprint(&new_watched) {
                        Ok(new_fp) => {
                            *self.active.write().unwrap() = Arc::new(policy);
                            self.watched = new_watched;
                            self.fingerprint = new_fp;
                            tracing::info!(path = %self.rule_path.display(), "policy reloaded");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to fingerprint reloaded policy, keeping active policy");
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "policy reload failed, keeping active policy");
                    }
                }
            }
        })
    }
}
