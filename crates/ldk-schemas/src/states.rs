//! State codes, ordered state lists and per-state thresholds.
//!
//! Orders carry their eligible states and thresholds as delimited strings on
//! the wire and in storage (`"FL, tx,GA"` and `"FL=250,TX=100"`). They are
//! parsed exactly once into the types below; nothing downstream re-parses.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Cap applied to any listed state that has no explicit threshold.
///
/// Note this is a real cap, not "unlimited": an unthresholded state can supply
/// at most 999 leads to a single order.
pub const DEFAULT_STATE_CAP: i64 = 999;

// ---------------------------------------------------------------------------
// StateCode
// ---------------------------------------------------------------------------

/// A 2-character, upper-cased state code (e.g. `FL`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateCode(String);

impl StateCode {
    /// Trim + upper-case, then accept only tokens of exactly two characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim().to_uppercase();
        if token.chars().count() == 2 {
            Some(Self(token))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<StateCode> for String {
    fn from(s: StateCode) -> Self {
        s.0
    }
}

impl TryFrom<String> for StateCode {
    type Error = InvalidStateCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StateCode::parse(&value).ok_or(InvalidStateCode(value))
    }
}

/// Raised when a string is not a 2-character state code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStateCode(pub String);

impl fmt::Display for InvalidStateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state code: {:?}", self.0)
    }
}

impl std::error::Error for InvalidStateCode {}

// ---------------------------------------------------------------------------
// StateList
// ---------------------------------------------------------------------------

/// Split on comma, trim, upper-case, keep only 2-character tokens, and
/// de-duplicate preserving first occurrence.
pub fn parse_states(input: &str) -> Vec<StateCode> {
    let mut out: Vec<StateCode> = Vec::new();
    for token in input.split(',') {
        if let Some(code) = StateCode::parse(token) {
            if !out.contains(&code) {
                out.push(code);
            }
        }
    }
    out
}

/// Non-empty, de-duplicated, ordered list of eligible states.
///
/// Order is significant: earlier states get first claim on an order's
/// remaining quantity during allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StateList(Vec<StateCode>);

impl StateList {
    /// Build from codes; duplicates are dropped (first wins). `None` if empty.
    pub fn new(codes: Vec<StateCode>) -> Option<Self> {
        let mut out: Vec<StateCode> = Vec::with_capacity(codes.len());
        for c in codes {
            if !out.contains(&c) {
                out.push(c);
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(Self(out))
        }
    }

    /// Parse the comma-separated wire/storage form. `None` if no valid state remains.
    pub fn parse(input: &str) -> Option<Self> {
        Self::new(parse_states(input))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StateCode> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Storage form: codes joined by `,` with no spaces.
    pub fn to_storage(&self) -> String {
        self.0
            .iter()
            .map(StateCode::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<'a> IntoIterator for &'a StateList {
    type Item = &'a StateCode;
    type IntoIter = std::slice::Iter<'a, StateCode>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Explicit per-state caps. States without an entry fall back to a default cap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Thresholds(BTreeMap<StateCode, i64>);

impl Thresholds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `"STATE=N,STATE=N"`.
    ///
    /// Each comma item is split on `=` and only the first two parts are read.
    /// The value is read like a leading integer: optional sign, then digits,
    /// with anything after the digits ignored (`3.5` is 3, `10abc` is 10).
    ///
    /// - no digits, or zero: no entry, so the state keeps the default cap
    /// - negative: cap 0, the state contributes nothing
    /// - missing key or value, or a key that is not a state code: skipped
    ///
    /// A later item for the same state overrides an earlier one.
    pub fn parse(input: Option<&str>) -> Self {
        let mut map = BTreeMap::new();
        let Some(input) = input else {
            return Self(map);
        };

        for item in input.split(',') {
            let mut parts = item.split('=');
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            let Some(state) = StateCode::parse(key) else {
                continue;
            };
            match leading_int(value) {
                Some(n) if n > 0 => {
                    map.insert(state, n);
                }
                Some(n) if n < 0 => {
                    map.insert(state, 0);
                }
                _ => {
                    map.remove(&state);
                }
            }
        }

        Self(map)
    }

    pub fn get(&self, state: &StateCode) -> Option<i64> {
        self.0.get(state).copied()
    }

    /// Explicit cap for `state`, or `default_cap` when none was given.
    pub fn cap_for(&self, state: &StateCode, default_cap: i64) -> i64 {
        self.get(state).unwrap_or(default_cap)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Leading integer of `raw`: whitespace, optional sign, then digits. `None`
/// when no digit follows. Saturates instead of overflowing.
fn leading_int(raw: &str) -> Option<i64> {
    let t = raw.trim_start();
    let (negative, rest) = match t.as_bytes().first() {
        Some(b'-') => (true, &t[1..]),
        Some(b'+') => (false, &t[1..]),
        _ => (false, t),
    };
    let digits: &str = &rest[..rest.bytes().take_while(u8::is_ascii_digit).count()];
    if digits.is_empty() {
        return None;
    }
    let magnitude = digits
        .bytes()
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    Some(if negative { -magnitude } else { magnitude })
}
