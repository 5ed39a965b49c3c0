//! Cache-key fingerprint (spec.md §4.4): deterministic across calls,
//! independent of attribute insertion order.

use ratewarden_core::Attributes;
use ratewarden_policy::Rule;

/// Build the counter-store key for `rule` given a request's attributes.
///
/// `"r" + returnCode`, then each non-combine key name (sorted
/// lexicographically) contributes `"|" + request[name]` (raw value, even
/// empty), with the trailing `|` trimmed.
#[must_use]
pub fn cache_key(rule: &Rule, attrs: &Attributes) -> String {
    let mut key = format!("r{}", rule.return_code);
    for name in rule.sorted_key_names() {
        if rule.keys[name].is_combine() {
            continue;
        }
        key.push('|');
        key.push_str(attrs.get(name).map(String::as_str).unwrap_or(""));
    }
    key.trim_end_matches('|').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratewarden_policy::Policy;
    use std::collections::HashMap;
    use std::path::Path;

    fn one_rule(text: &str) -> Rule {
        let content = format!(
            "[result]\n1 : {{\"retType\":0,\"retCode\":0,\"errNo\":0,\"errMsg\":\"\",\"strReason\":\"\",\"needVcode\":0,\"vcodeLen\":0,\"vcodeType\":0,\"other\":\"\",\"version\":1}}\n[rules]\n{text}\n"
        );
        let (policy, _) = Policy::parse(&content, Path::new(".")).unwrap();
        policy.rules()[0].clone()
    }

    #[test]
    fn deterministic_regardless_of_attribute_order() {
        let rule = one_rule("rule : [direct] [act=ask; uid=u1,u2] [] [result=1; return=301]");
        let mut a = HashMap::new();
        a.insert("act".to_string(), "ask".to_string());
        a.insert("uid".to_string(), "u1".to_string());
        let mut b = HashMap::new();
        b.insert("uid".to_string(), "u1".to_string());
        b.insert("act".to_string(), "ask".to_string());
        assert_eq!(cache_key(&rule, &a), cache_key(&rule, &b));
    }

    #[test]
    fn combine_key_excluded_from_fingerprint_scenario_6() {
        let rule = one_rule("rule : [direct] [act=ask; uid=u1,u2,u3{~}] [] [result=1; return=302]");
        let mut a = HashMap::new();
        a.insert("act".to_string(), "ask".to_string());
        a.insert("uid".to_string(), "u1".to_string());
        let mut b = a.clone();
        b.insert("uid".to_string(), "u2".to_string());
        assert_eq!(cache_key(&rule, &a), cache_key(&rule, &b));
    }
}
