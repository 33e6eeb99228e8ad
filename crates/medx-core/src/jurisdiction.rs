//! # Jurisdictions and Retention Policy
//!
//! A [`JurisdictionCode`] names the legal region whose retention law governs
//! a directive record. The [`RetentionPolicyTable`] maps each code to the
//! maximum time a record may be kept.
//!
//! The table is configuration. The engine only compares ages against it; it
//! never encodes a legal number itself. [`RetentionPolicyTable::standard()`]
//! ships illustrative defaults for development.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::temporal::RetentionPeriod;

/// A validated jurisdiction code such as `US`, `EU` or `US-CA`.
///
/// Two to eight characters from `A-Z`, `0-9` and `-`. Lowercase input is
/// upper-cased on construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JurisdictionCode(String);

impl JurisdictionCode {
    /// Validate and normalize a jurisdiction code.
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into().trim().to_ascii_uppercase();
        let valid_len = (2..=8).contains(&code.len());
        let valid_chars = code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-');
        if !valid_len || !valid_chars || code.starts_with('-') || code.ends_with('-') {
            return Err(ValidationError::InvalidJurisdiction { code });
        }
        Ok(Self(code))
    }

    /// Borrow the code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JurisdictionCode {
    type Error = ValidationError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JurisdictionCode> for String {
    fn from(code: JurisdictionCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for JurisdictionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Jurisdiction → maximum retention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicyTable {
    bounds: BTreeMap<JurisdictionCode, RetentionPeriod>,
}

impl RetentionPolicyTable {
    /// An empty table. Every jurisdiction is unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Illustrative defaults: US 50 years, EU 10, UK 8, CA 10, AU 7.
    pub fn standard() -> Self {
        let defaults: [(&str, u64); 5] = [("US", 50), ("EU", 10), ("UK", 8), ("CA", 10), ("AU", 7)];
        let mut table = Self::new();
        for (code, years) in defaults {
            if let Ok(code) = JurisdictionCode::new(code) {
                table.bounds.insert(code, RetentionPeriod::from_years(years));
            }
        }
        table
    }

    /// Build from `code → days` pairs as they appear in configuration files.
    pub fn from_days<I, S>(entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for (code, days) in entries {
            let code = JurisdictionCode::new(code)?;
            table.insert(code, RetentionPeriod::from_days(days))?;
        }
        Ok(table)
    }

    /// Set the bound for one jurisdiction. Zero-length bounds are rejected.
    pub fn insert(
        &mut self,
        code: JurisdictionCode,
        max: RetentionPeriod,
    ) -> Result<(), ValidationError> {
        if max.as_secs() == 0 {
            return Err(ValidationError::ZeroRetention {
                jurisdiction: code.to_string(),
            });
        }
        self.bounds.insert(code, max);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, code: JurisdictionCode, max: RetentionPeriod) -> Result<Self, ValidationError> {
        self.insert(code, max)?;
        Ok(self)
    }

    /// The maximum retention for `code`, if the jurisdiction is configured.
    pub fn max_retention(&self, code: &JurisdictionCode) -> Option<RetentionPeriod> {
        self.bounds.get(code).copied()
    }

    /// The shortest configured bound. Sweeps must run at least this often.
    pub fn smallest_bound(&self) -> Option<RetentionPeriod> {
        self.bounds.values().copied().min()
    }

    /// Iterate configured jurisdictions in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&JurisdictionCode, &RetentionPeriod)> {
        self.bounds.iter()
    }

    /// Number of configured jurisdictions.
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Whether no jurisdiction is configured.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_normalizes_case() {
        assert_eq!(JurisdictionCode::new("us").unwrap().as_str(), "US");
        assert_eq!(JurisdictionCode::new(" us-ca ").unwrap().as_str(), "US-CA");
    }

    #[test]
    fn code_rejects_bad_shapes() {
        for bad in ["", "U", "TOOLONGCODE", "U S", "US_", "-US", "US-", "é"] {
            assert!(JurisdictionCode::new(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn standard_table_has_us_fifty_years() {
        let table = RetentionPolicyTable::standard();
        let us = JurisdictionCode::new("US").unwrap();
        assert_eq!(table.max_retention(&us), Some(RetentionPeriod::from_years(50)));
        assert_eq!(table.smallest_bound(), Some(RetentionPeriod::from_years(7)));
    }

    #[test]
    fn from_days_validates_codes_and_zero() {
        let table = RetentionPolicyTable::from_days([("US", 30u64), ("eu", 10)]).unwrap();
        assert_eq!(table.len(), 2);
        assert!(RetentionPolicyTable::from_days([("US", 0u64)]).is_err());
        assert!(RetentionPolicyTable::from_days([("!!", 5u64)]).is_err());
    }

    #[test]
    fn unknown_jurisdiction_has_no_bound() {
        let table = RetentionPolicyTable::standard();
        assert!(table.max_retention(&JurisdictionCode::new("ZZ").unwrap()).is_none());
    }

    #[test]
    fn table_deserializes_from_json_map() {
        let json = r#"{"bounds":{"US":86400,"EU":172800}}"#;
        let table: RetentionPolicyTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.smallest_bound(), Some(RetentionPeriod::from_days(1)));
    }
}
