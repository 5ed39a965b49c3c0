//! The `[result]` table: named return payloads a matched rule points to
//! (spec.md §3).

use serde::Serialize;

/// A response payload returned to the caller when a rule fires (or as the
/// default allow/deny fallback, spec.md §4.8).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    /// 1-based index this entry is registered under in the `[result]` table.
    #[serde(skip)]
    pub index: i32,
    /// High-level verdict category (e.g. allow/deny/verify), passed through
    /// verbatim from the policy file.
    #[serde(rename = "retType")]
    pub ret_type: i32,
    /// Caller-facing return code.
    #[serde(rename = "retCode")]
    pub ret_code: i32,
    /// Internal error number, `0` when there is no error.
    #[serde(rename = "errNo")]
    pub err_no: i32,
    /// Human-readable error message.
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    /// Short machine-readable reason string.
    #[serde(rename = "strReason")]
    pub str_reason: String,
    /// Whether the caller should challenge with a verification code
    /// (nonzero means yes), passed through verbatim as an integer to match
    /// the policy file's wire format.
    #[serde(rename = "needVcode")]
    pub need_vcode: i32,
    /// Verification code length, when `need_vcode` is set.
    #[serde(rename = "vcodeLen")]
    pub vcode_len: i32,
    /// Verification code type/category, when `need_vcode` is set.
    #[serde(rename = "vcodeType")]
    pub vcode_type: i32,
    /// Free-form extra payload, passed through verbatim.
    pub other: String,
    /// Policy schema version this entry was authored against.
    pub version: i32,
}

impl ResultEntry {
    /// Build the built-in fallback entry used when no rule matched and no
    /// explicit default is configured: allow with no side payload.
    #[must_use]
    pub fn default_allow(index: i32) -> Self {
        Self {
            index,
            ret_type: 0,
            ret_code: 0,
            err_no: 0,
            err_msg: String::new(),
            str_reason: String::new(),
            need_vcode: 0,
            vcode_len: 0,
            vcode_type: 0,
            other: String::new(),
            version: 1,
        }
    }
}
