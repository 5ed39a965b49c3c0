//! The rule line grammar: `rule : [method] [keys] [values] [verdict]`
//! (spec.md §4.1).

use crate::error::PolicyError;
use crate::key::{GroupKey, Key, RangeKey};
use std::collections::{HashMap, HashSet};

/// The throttling method a rule uses once its keys match (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Unconditional deny; no store interaction.
    Direct,
    /// Fixed-window counter.
    Count,
    /// Two-level ramp-then-throttle counter.
    Base,
    /// Sliding-window (leaky bucket) queue.
    Leak,
}

impl Method {
    fn parse(s: &str, line: usize, raw: &str) -> Result<Self, PolicyError> {
        match s.trim() {
            "direct" => Ok(Method::Direct),
            "count" => Ok(Method::Count),
            "base" => Ok(Method::Base),
            "leak" => Ok(Method::Leak),
            other => Err(PolicyError::syntax(
                line,
                format!("unknown method '{other}'"),
                raw,
            )),
        }
    }
}

/// A single rule: a method, a conjunction of named key predicates, numeric
/// parameters, and a verdict (spec.md §3).
#[derive(Debug, Clone)]
pub struct Rule {
    /// 1-based line number within the policy file, for diagnostics.
    pub line: usize,
    /// The throttling method.
    pub method: Method,
    /// Attribute-name to key-predicate conjunction. All must match.
    pub keys: HashMap<String, Key>,
    /// `base` method ramp threshold.
    pub base: i32,
    /// Window length in seconds (`count`/`base`/`leak`).
    pub time: i32,
    /// Threshold hit count (`count`/`base`/`leak`).
    pub count: i32,
    /// First feedback refund amount (`leak`, optional).
    pub erase1: i32,
    /// Second feedback refund amount (`leak`, optional).
    pub erase2: i32,
    /// Index into the result table this rule's verdict points to.
    pub result: i32,
    /// Caller-facing return code; unique across the policy.
    pub return_code: i32,
}

impl Rule {
    /// Parse one `rule : [method] [keys] [values] [verdict]` line.
    pub fn parse(
        raw_line: &str,
        line_no: usize,
        dictionaries: &HashMap<String, HashSet<String>>,
    ) -> Result<Self, PolicyError> {
        let line = raw_line.trim();
        let (label, rest) = line
            .split_once(':')
            .ok_or_else(|| PolicyError::syntax(line_no, "expected 'rule : ...'", raw_line))?;
        if label.trim() != "rule" {
            return Err(PolicyError::syntax(
                line_no,
                format!("expected 'rule', found '{}'", label.trim()),
                raw_line,
            ));
        }
        let rest = rest.trim();
        if !rest.starts_with('[') || !rest.ends_with(']') {
            return Err(PolicyError::syntax(
                line_no,
                "expected four bracketed sections",
                raw_line,
            ));
        }
        let inner = &rest[1..rest.len() - 1];
        let sections: Vec<&str> = inner.split("] [").collect();
        if sections.len() != 4 {
            return Err(PolicyError::syntax(
                line_no,
                format!("expected 4 bracketed sections, found {}", sections.len()),
                raw_line,
            ));
        }

        let method = Method::parse(sections[0], line_no, raw_line)?;
        let keys = parse_keys_section(sections[1], line_no, raw_line, dictionaries)?;
        let values = parse_name_int_section(
            sections[2],
            line_no,
            raw_line,
            &["base", "time", "count", "erase1", "erase2"],
        )?;
        let verdict =
            parse_name_int_section(sections[3], line_no, raw_line, &["result", "return"])?;

        Ok(Rule {
            line: line_no,
            method,
            keys,
            base: values.get("base").copied().unwrap_or(0),
            time: values.get("time").copied().unwrap_or(0),
            count: values.get("count").copied().unwrap_or(0),
            erase1: values.get("erase1").copied().unwrap_or(0),
            erase2: values.get("erase2").copied().unwrap_or(0),
            result: verdict.get("result").copied().unwrap_or(0),
            return_code: verdict.get("return").copied().unwrap_or(0),
        })
    }

    /// Key attribute names, sorted lexicographically (cache-key fingerprint
    /// input order, spec.md §4.4).
    #[must_use]
    pub fn sorted_key_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate this rule's keys against a request's attributes. Returns
    /// `true` only if every key's attribute is present, non-empty, and the
    /// predicate matches (spec.md §4.2).
    #[must_use]
    pub fn matches(&self, attrs: &HashMap<String, String>) -> bool {
        self.keys.iter().all(|(name, key)| {
            attrs
                .get(name)
                .is_some_and(|v| !v.is_empty() && key.matches(v))
        })
    }
}

fn parse_keys_section(
    section: &str,
    line_no: usize,
    raw_line: &str,
    dictionaries: &HashMap<String, HashSet<String>>,
) -> Result<HashMap<String, Key>, PolicyError> {
    let mut keys = HashMap::new();
    for entry in section.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, key) = parse_key_entry(entry, line_no, raw_line, dictionaries)?;
        keys.insert(name, key);
    }
    Ok(keys)
}

fn parse_key_entry(
    entry: &str,
    line_no: usize,
    raw_line: &str,
    dictionaries: &HashMap<String, HashSet<String>>,
) -> Result<(String, Key), PolicyError> {
    // Operator precedence for splitting one entry: '@' first, then '<',
    // then '>', then '='.
    let op_pos = ['@', '<', '>', '=']
        .iter()
        .find_map(|op| entry.find(*op).map(|idx| (*op, idx)));
    let Some((op, idx)) = op_pos else {
        return Err(PolicyError::syntax(
            line_no,
            format!("key entry has no recognized operator: '{entry}'"),
            raw_line,
        ));
    };
    let (left, right) = entry.split_at(idx);
    let right = &right[1..];

    let name_raw = left.trim();
    let inverse = name_raw.ends_with('!');
    let name = name_raw.trim_end_matches('!').trim().to_string();
    if name.is_empty() {
        return Err(PolicyError::syntax(
            line_no,
            format!("key entry missing attribute name: '{entry}'"),
            raw_line,
        ));
    }

    let key = match op {
        '@' => {
            let dict_name = right.trim();
            let set = dictionaries.get(dict_name).ok_or_else(|| {
                PolicyError::Semantic(format!("unknown dictionary '{dict_name}' for key '{name}'"))
            })?;
            Key::Group(GroupKey::from_dict(set.clone(), inverse))
        }
        '<' => {
            let n = right.trim().parse::<i64>().map_err(|_| {
                PolicyError::syntax(line_no, format!("'{}' is not an integer", right.trim()), raw_line)
            })?;
            Key::Range(RangeKey::less_than(n, inverse))
        }
        '>' => {
            let n = right.trim().parse::<i64>().map_err(|_| {
                PolicyError::syntax(line_no, format!("'{}' is not an integer", right.trim()), raw_line)
            })?;
            Key::Range(RangeKey::greater_than(n, inverse))
        }
        '=' => {
            let rhs = right.trim();
            if rhs.contains('+') || rhs.contains('-') || rhs.contains('*') {
                Key::Range(
                    RangeKey::from_scope_list(rhs, inverse)
                        .map_err(|_| PolicyError::syntax(line_no, "bad scope list", raw_line))?,
                )
            } else {
                Key::Group(GroupKey::from_values(rhs, inverse))
            }
        }
        _ => unreachable!(),
    };
    Ok((name, key))
}

fn parse_name_int_section(
    section: &str,
    line_no: usize,
    raw_line: &str,
    allowed: &[&str],
) -> Result<HashMap<String, i32>, PolicyError> {
    let mut out = HashMap::new();
    for entry in section.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (name, value) = entry.split_once('=').ok_or_else(|| {
            PolicyError::syntax(line_no, format!("expected 'name=integer': '{entry}'"), raw_line)
        })?;
        let name = name.trim();
        if !allowed.contains(&name) {
            return Err(PolicyError::syntax(
                line_no,
                format!("unrecognized field '{name}'"),
                raw_line,
            ));
        }
        let value: i32 = value.trim().parse().map_err(|_| {
            PolicyError::syntax(line_no, format!("'{}' is not an integer", value.trim()), raw_line)
        })?;
        out.insert(name.to_string(), value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dicts() -> HashMap<String, HashSet<String>> {
        let mut d = HashMap::new();
        let mut whitelist = HashSet::new();
        whitelist.insert("good_user".to_string());
        d.insert("whitelist".to_string(), whitelist);
        d
    }

    #[test]
    fn parses_count_rule() {
        let rule = Rule::parse(
            "rule : [count] [a=1;] [time=60; count=3;] [result=2; return=201]",
            1,
            &dicts(),
        )
        .unwrap();
        assert_eq!(rule.method, Method::Count);
        assert_eq!(rule.time, 60);
        assert_eq!(rule.count, 3);
        assert_eq!(rule.result, 2);
        assert_eq!(rule.return_code, 201);
        assert!(rule.keys.contains_key("a"));
    }

    #[test]
    fn dict_miss_with_inverse_matches_scenario_4() {
        let rule = Rule::parse(
            "rule : [direct] [qid! @ whitelist] [] [result=2; return=205]",
            1,
            &dicts(),
        )
        .unwrap();
        let mut attrs = HashMap::new();
        attrs.insert("qid".to_string(), "stranger".to_string());
        assert!(rule.matches(&attrs));
    }

    #[test]
    fn combine_key_is_parsed_from_equals_values() {
        let rule = Rule::parse(
            "rule : [base] [act=ask; uid=u1,u2,u3{~}] [base=2; time=10; count=2;] [result=2; return=203]",
            1,
            &dicts(),
        )
        .unwrap();
        assert!(rule.keys.get("uid").unwrap().is_combine());
    }

    #[test]
    fn range_scope_from_equals_with_dash() {
        let rule = Rule::parse(
            "rule : [direct] [ip=10.0.0.*] [] [result=2; return=206]",
            1,
            &dicts(),
        )
        .unwrap();
        let mut attrs = HashMap::new();
        attrs.insert("ip".to_string(), "10.0.0.100".to_string());
        assert!(rule.matches(&attrs));
    }

    #[test]
    fn missing_attribute_fails_the_whole_rule() {
        let rule = Rule::parse(
            "rule : [direct] [a=1,2,3] [] [result=2; return=207]",
            1,
            &dicts(),
        )
        .unwrap();
        assert!(!rule.matches(&HashMap::new()));
    }

    #[test]
    fn unknown_field_in_values_section_is_syntax_error() {
        let err = Rule::parse(
            "rule : [count] [a=1;] [bogus=1;] [result=2; return=208]",
            1,
            &dicts(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::Syntax { .. }));
    }

    #[test]
    fn unresolved_dictionary_is_semantic_error() {
        let err = Rule::parse(
            "rule : [direct] [qid @ no_such_dict] [] [result=2; return=209]",
            1,
            &dicts(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::Semantic(_)));
    }
}
