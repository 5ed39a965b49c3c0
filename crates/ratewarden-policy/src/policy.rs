//! The top-level `Policy`: dictionaries + rule list + result table, and the
//! `[dicts]` / `[rules]` / `[result]` section parser (spec.md §3 / §4.1).

use crate::error::PolicyError;
use crate::result::ResultEntry;
use crate::rule::Rule;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// The fully built, immutable policy active at a moment in time.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    dictionaries: HashMap<String, HashSet<String>>,
    rules: Vec<Rule>,
    result_table: HashMap<i32, ResultEntry>,
}

impl Policy {
    /// The rule list, in declaration order (match order, spec.md §4.3).
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a result-table entry by index.
    #[must_use]
    pub fn result(&self, index: i32) -> Option<&ResultEntry> {
        self.result_table.get(&index)
    }

    /// Parse policy text already read into memory. `base_dir` anchors
    /// relative dictionary paths (the process working directory in
    /// production, per spec.md §4.1). Returns the built policy and the
    /// list of dictionary file paths read, which the caller should merge
    /// with the rule file's own path to form the loader's watched-files
    /// list (spec.md §4.6).
    pub fn parse(content: &str, base_dir: &Path) -> Result<(Self, Vec<PathBuf>), PolicyError> {
        let lines: Vec<&str> = content.lines().collect();
        let header_at = |header: &str| -> Option<usize> {
            lines
                .iter()
                .position(|l| l.trim() == header)
        };

        let dicts_at = header_at("[dicts]");
        let rules_at = header_at("[rules]");
        let result_at = header_at("[result]");

        let mut headers: Vec<(usize, &str)> = Vec::new();
        if let Some(i) = dicts_at {
            headers.push((i, "dicts"));
        }
        if let Some(i) = rules_at {
            headers.push((i, "rules"));
        }
        if let Some(i) = result_at {
            headers.push((i, "result"));
        }
        headers.sort_by_key(|(i, _)| *i);

        let section_body = |start_idx: usize| -> &[&str] {
            let body_start = start_idx + 1;
            let body_end = headers
                .iter()
                .map(|(i, _)| *i)
                .find(|i| *i > start_idx)
                .unwrap_or(lines.len());
            &lines[body_start.min(lines.len())..body_end.min(lines.len())]
        };

        let mut dictionaries = HashMap::new();
        let mut watched = Vec::new();
        if let Some(i) = dicts_at {
            for (offset, raw) in section_body(i).iter().enumerate() {
                let line_no = i + 2 + offset;
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let (name, path_str) = trimmed.split_once(':').ok_or_else(|| {
                    PolicyError::syntax(line_no, "expected 'name : path'", *raw)
                })?;
                let name = name.trim().to_string();
                let path_str = path_str.trim();
                let full_path = base_dir.join(path_str);
                let body = fs::read_to_string(&full_path).map_err(|source| PolicyError::Io {
                    path: full_path.clone(),
                    source,
                })?;
                let set: HashSet<String> = body
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string)
                    .collect();
                dictionaries.insert(name, set);
                watched.push(full_path);
            }
        }

        let mut rules = Vec::new();
        if let Some(i) = rules_at {
            for (offset, raw) in section_body(i).iter().enumerate() {
                let line_no = i + 2 + offset;
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                rules.push(Rule::parse(trimmed, line_no, &dictionaries)?);
            }
        }

        let mut result_table = HashMap::new();
        if let Some(i) = result_at {
            for (offset, raw) in section_body(i).iter().enumerate() {
                let line_no = i + 2 + offset;
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let (idx_str, json_str) = trimmed.split_once(':').ok_or_else(|| {
                    PolicyError::syntax(line_no, "expected 'index : {json}'", *raw)
                })?;
                let index: i32 = idx_str.trim().parse().map_err(|_| {
                    PolicyError::syntax(line_no, format!("'{}' is not an integer", idx_str.trim()), *raw)
                })?;
                let mut entry: ResultEntryDe = serde_json::from_str(json_str.trim())
                    .map_err(|e| PolicyError::syntax(line_no, format!("bad result JSON: {e}"), *raw))?;
                entry.0.index = index;
                result_table.insert(index, entry.0);
            }
        }

        let policy = Policy {
            dictionaries,
            rules,
            result_table,
        };
        policy.check_invariants()?;
        Ok((policy, watched))
    }

    /// Read and parse a rule file from disk. The returned watched-files
    /// list is prefixed with `path` itself.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<PathBuf>), PolicyError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let (policy, mut watched) = Self::parse(&content, base_dir)?;
        watched.insert(0, path.to_path_buf());
        Ok((policy, watched))
    }

    fn check_invariants(&self) -> Result<(), PolicyError> {
        let mut seen_codes = HashSet::new();
        for rule in &self.rules {
            if !self.result_table.contains_key(&rule.result) {
                return Err(PolicyError::Semantic(format!(
                    "rule at line {} references missing result index {}",
                    rule.line, rule.result
                )));
            }
            if !seen_codes.insert(rule.return_code) {
                return Err(PolicyError::Semantic(format!(
                    "duplicate return code {} (rule at line {})",
                    rule.return_code, rule.line
                )));
            }
            match rule.method {
                crate::rule::Method::Count => {
                    if !(rule.count > 0 && rule.time > 0) {
                        return Err(PolicyError::Semantic(format!(
                            "rule at line {} (count): count and time must be > 0",
                            rule.line
                        )));
                    }
                }
                crate::rule::Method::Base => {
                    if !(rule.base > 0 && rule.count > 0 && rule.time > 0) {
                        return Err(PolicyError::Semantic(format!(
                            "rule at line {} (base): base, count and time must be > 0",
                            rule.line
                        )));
                    }
                }
                crate::rule::Method::Direct | crate::rule::Method::Leak => {}
            }
        }
        Ok(())
    }
}

/// Wrapper so `ResultEntry::index` (marked `#[serde(skip)]` for output) can
/// still be deserialized structurally; the index is filled in by the
/// caller from the `[result]` line's key, not from the JSON body.
struct ResultEntryDe(ResultEntry);

impl<'de> serde::Deserialize<'de> for ResultEntryDe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Raw {
            #[serde(rename = "retType", default)]
            ret_type: i32,
            #[serde(rename = "retCode", default)]
            ret_code: i32,
            #[serde(rename = "errNo", default)]
            err_no: i32,
            #[serde(rename = "errMsg", default)]
            err_msg: String,
            #[serde(rename = "strReason", default)]
            str_reason: String,
            #[serde(rename = "needVcode", default)]
            need_vcode: i32,
            #[serde(rename = "vcodeLen", default)]
            vcode_len: i32,
            #[serde(rename = "vcodeType", default)]
            vcode_type: i32,
            #[serde(default)]
            other: String,
            #[serde(default)]
            version: i32,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(ResultEntryDe(ResultEntry {
            index: 0,
            ret_type: raw.ret_type,
            ret_code: raw.ret_code,
            err_no: raw.err_no,
            err_msg: raw.err_msg,
            str_reason: raw.str_reason,
            need_vcode: raw.need_vcode,
            vcode_len: raw.vcode_len,
            vcode_type: raw.vcode_type,
            other: raw.other,
            version: raw.version,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_policy_with_sections_in_any_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("whitelist.txt"), "good_user\n# comment\n\nother_user\n").unwrap();

        let content = format!(
            "[result]\n1 : {{\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}}\n2 : {{\"retType\":1,\"retCode\":1,\"errNo\":1,\"errMsg\":\"denied\",\"strReason\":\"limit\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}}\n\n[dicts]\nwhitelist : whitelist.txt\n\n[rules]\nrule : [count] [uid! @ whitelist] [time=60; count=3;] [result=2; return=201]\n"
        );

        let (policy, watched) = Policy::parse(&content, dir.path()).unwrap();
        assert_eq!(policy.rules().len(), 1);
        assert_eq!(watched.len(), 1);
        assert!(policy.result(1).is_some());
        assert!(policy.result(2).is_some());

        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "unused").unwrap();
    }

    #[test]
    fn missing_result_index_is_semantic_error() {
        let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [direct] [a=1,2] [] [result=9; return=301]\n";
        let err = Policy::parse(content, Path::new(".")).unwrap_err();
        assert!(matches!(err, PolicyError::Semantic(_)));
    }

    #[test]
    fn duplicate_return_code_is_semantic_error() {
        let content = "[result]\n1 : {\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}\n[rules]\nrule : [direct] [a=1] [] [result=1; return=400]\nrule : [direct] [b=2] [] [result=1; return=400]\n";
        let err = Policy::parse(content, Path::new(".")).unwrap_err();
        assert!(matches!(err, PolicyError::Semantic(_)));
    }
}
