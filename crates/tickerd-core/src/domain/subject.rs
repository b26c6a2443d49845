//! Analysis subjects: ticker symbols and the market-review designator.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

/// Fixed designator for the market-review task kind.
pub const MARKET_REVIEW: &str = "market";

static A_SHARE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").unwrap());
static OTC_FUND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^01\d{4}$").unwrap());
static HK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^hk\d{5}$").unwrap());
static US_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{1,5}(\.[A-Z])?$").unwrap());

/// What a task analyzes: one ticker, or the whole market.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    Ticker(String),
    MarketReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("unsupported OTC fund code: {0} (use an exchange-traded code instead)")]
    OtcFund(String),

    #[error(
        "invalid ticker format: {0} (A-share 6 digits / HK hk+5 digits / US 1-5 letters)"
    )]
    BadShape(String),
}

impl Subject {
    /// Parse and normalize one ticker symbol.
    ///
    /// Accepted shapes (from the upstream market-data contract):
    /// - A-share: 6 digits, except `01xxxx` OTC fund codes
    /// - Hong Kong: `hk` + 5 digits (stored lowercase)
    /// - US: 1-5 letters with an optional `.X` class suffix (stored uppercase)
    pub fn parse_ticker(raw: &str) -> Result<Self, SubjectError> {
        let lowered = raw.trim().to_ascii_lowercase();
        if A_SHARE_RE.is_match(&lowered) {
            if OTC_FUND_RE.is_match(&lowered) {
                return Err(SubjectError::OtcFund(lowered));
            }
            return Ok(Subject::Ticker(lowered));
        }
        if HK_RE.is_match(&lowered) {
            return Ok(Subject::Ticker(lowered));
        }
        let uppered = raw.trim().to_ascii_uppercase();
        if US_RE.is_match(&uppered) {
            return Ok(Subject::Ticker(uppered));
        }
        Err(SubjectError::BadShape(raw.trim().to_string()))
    }

    /// The string form handed to the analysis collaborator.
    pub fn designator(&self) -> &str {
        match self {
            Subject::Ticker(code) => code,
            Subject::MarketReview => MARKET_REVIEW,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.designator())
    }
}

// Serialize MarketReview as the fixed designator string.
impl Serialize for Subject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.designator())
    }
}

impl<'de> Deserialize<'de> for Subject {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == MARKET_REVIEW {
            Ok(Subject::MarketReview)
        } else {
            Ok(Subject::Ticker(s))
        }
    }
}
