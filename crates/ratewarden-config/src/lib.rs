//! Line-oriented `key = value` configuration file reader (spec.md §6).
//!
//! The format is intentionally not TOML/YAML: `key = value` pairs, `#`
//! comments, blank lines skipped, and an `include <relative-path>` directive
//! that chains in another file resolved relative to the including file's
//! directory. This mirrors the engine's own bespoke rule-policy grammar —
//! both are hand-parsed rather than driven by a generic format.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum `include` chain depth, guarding against accidental self-inclusion.
const MAX_INCLUDE_DEPTH: u32 = 16;

/// Errors produced while loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file (or an included file) could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A line was neither `key = value` nor `include <path>`.
    #[error("invalid config syntax at {path}:{line}: {text}")]
    Syntax {
        /// File containing the offending line.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// The offending line text.
        text: String,
    },
    /// `include` directives nested more than [`MAX_INCLUDE_DEPTH`] deep.
    #[error("include depth exceeded {MAX_INCLUDE_DEPTH} at {0}")]
    IncludeTooDeep(PathBuf),
}

/// A loaded configuration: a flat `key -> value` map, possibly assembled
/// from multiple `include`d files.
#[derive(Debug, Clone, Default)]
pub struct Config {
    data: HashMap<String, String>,
}

impl Config {
    /// Load a configuration file, following any `include` directives.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.load_into(path.as_ref(), 0)?;
        Ok(cfg)
    }

    fn load_into(&mut self, path: &Path, depth: u32) -> Result<(), ConfigError> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(ConfigError::IncludeTooDeep(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        for (idx, raw_line) in raw.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.data
                    .insert(key.trim().to_string(), value.trim().to_string());
                continue;
            }
            if let Some(rest) = line.strip_prefix("include ") {
                let target = rest.trim();
                let dir = path.parent().unwrap_or_else(|| Path::new("."));
                self.load_into(&dir.join(target), depth + 1)?;
                continue;
            }
            return Err(ConfigError::Syntax {
                path: path.to_path_buf(),
                line: idx + 1,
                text: line.to_string(),
            });
        }
        Ok(())
    }

    /// Raw string lookup; `None` if the key was never set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// String lookup with a default.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Integer lookup with a default, ignoring unparsable values.
    #[must_use]
    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// Integer lookup with a default, ignoring unparsable values.
    #[must_use]
    pub fn get_u32_or(&self, key: &str, default: u32) -> u32 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// The socket address the HTTP front should listen on.
    #[must_use]
    pub fn listen(&self) -> &str {
        self.get_or("listen", "127.0.0.1:9090")
    }

    /// Path to write the process pid file to.
    #[must_use]
    pub fn pid_file(&self) -> &str {
        self.get_or("pid_file", "ratewarden.pid")
    }

    /// Path to the rule policy file.
    #[must_use]
    pub fn rule_file(&self) -> &str {
        self.get_or("rule_file", "etc/rule.conf")
    }

    /// Redis (or Redis-protocol-compatible) server address.
    #[must_use]
    pub fn redis_server(&self) -> &str {
        self.get_or("redis_server", "127.0.0.1:6379")
    }

    /// Redis `AUTH` password, if configured.
    #[must_use]
    pub fn redis_auth(&self) -> Option<&str> {
        self.get("redis_auth").filter(|s| !s.is_empty())
    }

    /// Redis connection-pool max idle connections.
    #[must_use]
    pub fn redis_pool_max_idle(&self) -> u32 {
        self.get_u32_or("redis_pool_maxIdle", 8)
    }

    /// Redis connection idle timeout, milliseconds.
    #[must_use]
    pub fn redis_pool_idle_timeout_ms(&self) -> i64 {
        self.get_i64_or("redis_pool_idleTimeout", 60_000)
    }

    /// Store connect timeout, milliseconds.
    #[must_use]
    pub fn external_conn_timeout_ms(&self) -> i64 {
        self.get_i64_or("externalConnTimeout", 1_000)
    }

    /// Store read timeout, milliseconds.
    #[must_use]
    pub fn external_read_timeout_ms(&self) -> i64 {
        self.get_i64_or("externalReadTimeout", 1_000)
    }

    /// Store write timeout, milliseconds.
    #[must_use]
    pub fn external_write_timeout_ms(&self) -> i64 {
        self.get_i64_or("externalWriteTimeout", 1_000)
    }

    /// Seconds between hot-swap loader fingerprint checks.
    #[must_use]
    pub fn policy_loader_frequency_secs(&self) -> u64 {
        self.get_i64_or("policy_loader_frequency", 300).max(1) as u64
    }

    /// Fixed UTC offset (minutes, east-positive) used for day-boundary TTL
    /// calculations in the `count`/`base` counter algorithms.
    #[must_use]
    pub fn counter_day_offset_minutes(&self) -> i32 {
        self.get_i64_or("counter_day_offset_minutes", 480) as i32
    }

    /// Directory the access/stats logs are written under.
    #[must_use]
    pub fn log_dir(&self) -> &str {
        self.get_or("log_dir", "log")
    }

    /// Bounded channel capacity for the stats aggregator.
    #[must_use]
    pub fn stats_channel_capacity(&self) -> usize {
        self.get_i64_or("stats_channel_capacity", 1024).max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_key_value_and_comments() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "# a comment\nlisten = 0.0.0.0:9090\n\nrule_file=etc/rule.conf").unwrap();
        let cfg = Config::load(f.path()).unwrap();
        assert_eq!(cfg.listen(), "0.0.0.0:9090");
        assert_eq!(cfg.rule_file(), "etc/rule.conf");
    }

    #[test]
    fn follows_include_relative_to_including_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("included.conf"), "redis_server = 10.0.0.1:6379\n").unwrap();
        std::fs::write(dir.path().join("main.conf"), "listen = 1.2.3.4:80\ninclude included.conf\n")
            .unwrap();
        let cfg = Config::load(dir.path().join("main.conf")).unwrap();
        assert_eq!(cfg.listen(), "1.2.3.4:80");
        assert_eq!(cfg.redis_server(), "10.0.0.1:6379");
    }

    #[test]
    fn rejects_malformed_lines() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "not a valid line").unwrap();
        assert!(Config::load(f.path()).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::load("/no/such/path.conf").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::default();
        assert_eq!(cfg.listen(), "127.0.0.1:9090");
        assert_eq!(cfg.policy_loader_frequency_secs(), 300);
        assert_eq!(cfg.counter_day_offset_minutes(), 480);
    }
}
