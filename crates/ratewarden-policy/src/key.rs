//! Key predicates: `GroupKey` (set membership) and `RangeKey` (numeric
//! scopes), per spec.md §3 / §4.2.

use crate::error::PolicyError;
use ratewarden_core::numeric;
use std::collections::HashSet;

/// One bound within a [`RangeKey`]. Multiple scopes within one `RangeKey`
/// are combined with logical OR before `inverse` is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// `+` — matches any numeric value.
    Any,
    /// `<n` — matches `v < n`.
    Lt(i64),
    /// `>n` — matches `v > n`.
    Gt(i64),
    /// `a-b` (inclusive) or an expanded IP wildcard — matches `a <= v <= b`.
    Between(i64, i64),
}

impl Scope {
    fn matches(&self, v: i64) -> bool {
        match self {
            Scope::Any => true,
            Scope::Lt(n) => v < *n,
            Scope::Gt(n) => v > *n,
            Scope::Between(lo, hi) => v >= *lo && v <= *hi,
        }
    }

    /// Parse one comma-separated scope piece: `+`, `a-b`, or an IP wildcard
    /// like `10.0.0.*`.
    fn parse_piece(piece: &str) -> Result<Self, PolicyError> {
        let piece = piece.trim();
        if piece == "+" {
            return Ok(Scope::Any);
        }
        if let Some((a, b)) = piece.split_once('-') {
            let lo = numeric::parse_value(a.trim())
                .map_err(|e| PolicyError::Semantic(format!("scope error: {e}")))?;
            let hi = numeric::parse_value(b.trim())
                .map_err(|e| PolicyError::Semantic(format!("scope error: {e}")))?;
            return Ok(Scope::Between(lo, hi));
        }
        if piece.contains('*') && numeric::looks_like_ip(piece) {
            let lo_str = piece.replace('*', "0");
            let hi_str = piece.replace('*', "255");
            let lo = numeric::parse_dotted_quad(&lo_str)
                .map_err(|e| PolicyError::Semantic(format!("scope error: {e}")))?;
            let hi = numeric::parse_dotted_quad(&hi_str)
                .map_err(|e| PolicyError::Semantic(format!("scope error: {e}")))?;
            return Ok(Scope::Between(lo, hi));
        }
        Err(PolicyError::Semantic(format!("scope error: '{piece}'")))
    }
}

/// A set-membership predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKey {
    set: HashSet<String>,
    /// Match when the attribute is *not* in the set.
    pub inverse: bool,
    /// When true, this key participates in matching but is excluded from
    /// the cache-key fingerprint (shared-quota counting, spec.md §4.4).
    pub combine: bool,
}

impl GroupKey {
    /// Build from an explicit `@dict`-resolved set.
    #[must_use]
    pub fn from_dict(set: HashSet<String>, inverse: bool) -> Self {
        Self {
            set,
            inverse,
            combine: false,
        }
    }

    /// Build from an inline comma-separated value list, honoring a
    /// trailing `{~}` combine marker.
    #[must_use]
    pub fn from_values(raw: &str, inverse: bool) -> Self {
        let combine = raw.trim_end().ends_with("{~}");
        let trimmed = raw.trim().trim_end_matches("{~}");
        let set = trimmed
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            set,
            inverse,
            combine,
        }
    }

    /// `(s in set) XOR inverse`, after trimming whitespace from `s`.
    #[must_use]
    pub fn matches(&self, s: &str) -> bool {
        let s = s.trim();
        self.set.contains(s) != self.inverse
    }
}

/// A numeric-range predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeKey {
    scopes: Vec<Scope>,
    /// Inverts the final (disjoined) match result.
    pub inverse: bool,
}

impl RangeKey {
    /// A single `<n` scope.
    #[must_use]
    pub fn less_than(n: i64, inverse: bool) -> Self {
        Self {
            scopes: vec![Scope::Lt(n)],
            inverse,
        }
    }

    /// A single `>n` scope.
    #[must_use]
    pub fn greater_than(n: i64, inverse: bool) -> Self {
        Self {
            scopes: vec![Scope::Gt(n)],
            inverse,
        }
    }

    /// A single `+` (match-anything) scope.
    #[must_use]
    pub fn any(inverse: bool) -> Self {
        Self {
            scopes: vec![Scope::Any],
            inverse,
        }
    }

    /// Parse a comma-separated scope list (`a-b`, `+`, IP wildcards).
    pub fn from_scope_list(raw: &str, inverse: bool) -> Result<Self, PolicyError> {
        let scopes = raw
            .split(',')
            .map(Scope::parse_piece)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { scopes, inverse })
    }

    /// `(any scope matches v) XOR inverse`; if `s` fails to parse to an
    /// integer, the predicate never matches regardless of `inverse`
    /// (spec.md §4.2), *unless* any scope is the match-anything `+`, which
    /// short-circuits before parsing is attempted.
    #[must_use]
    pub fn matches(&self, s: &str) -> bool {
        if self.scopes.iter().any(|sc| matches!(sc, Scope::Any)) {
            return true ^ self.inverse;
        }
        let Ok(v) = numeric::parse_value(s) else {
            return false;
        };
        let any_match = self.scopes.iter().any(|sc| sc.matches(v));
        any_match != self.inverse
    }
}

/// A polymorphic key predicate: either set-membership or numeric-range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// Set-membership predicate.
    Group(GroupKey),
    /// Numeric-range predicate.
    Range(RangeKey),
}

impl Key {
    /// Dispatch to the underlying predicate's `matches`.
    #[must_use]
    pub fn matches(&self, s: &str) -> bool {
        match self {
            Key::Group(g) => g.matches(s),
            Key::Range(r) => r.matches(s),
        }
    }

    /// True if this key is a `GroupKey` with `combine` set — excluded from
    /// the cache-key fingerprint (spec.md §4.4).
    #[must_use]
    pub fn is_combine(&self) -> bool {
        matches!(self, Key::Group(g) if g.combine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_key_inverse_involution() {
        let mut set = HashSet::new();
        set.insert("a".to_string());
        let k = GroupKey::from_dict(set.clone(), false);
        let k_inv = GroupKey::from_dict(set.clone(), true);
        let k_inv_inv = GroupKey { inverse: false, ..k_inv.clone() };
        assert_eq!(k.matches("a"), k_inv_inv.matches("a"));
        assert_ne!(k.matches("a"), k_inv.matches("a"));
    }

    #[test]
    fn range_disjunction_is_union_of_scopes() {
        let rk = RangeKey::from_scope_list("1-5,10-20", false).unwrap();
        assert!(rk.matches("3"));
        assert!(rk.matches("15"));
        assert!(!rk.matches("7"));
    }

    #[test]
    fn range_any_scope_matches_everything() {
        let rk = RangeKey::any(false);
        assert!(rk.matches("whatever"));
        assert!(rk.matches("12345"));
    }

    #[test]
    fn range_unparsable_value_never_matches_even_inverted() {
        let rk = RangeKey::from_scope_list("1-5", true).unwrap();
        assert!(!rk.matches("not-a-number"));
    }

    #[test]
    fn ip_wildcard_scope_expands_to_range() {
        let rk = RangeKey::from_scope_list("10.0.0.*", false).unwrap();
        assert!(rk.matches("10.0.0.100"));
        assert!(!rk.matches("10.0.1.0"));
    }

    #[test]
    fn combine_flag_parsed_from_trailing_marker() {
        let g = GroupKey::from_values("u1,u2,u3{~}", false);
        assert!(g.combine);
        assert!(g.matches("u1"));
        assert!(g.matches("u2"));
        assert!(!g.matches("u4"));
    }
}
