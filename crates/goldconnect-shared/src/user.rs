use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{UNKNOWN_COUNTRY, UNKNOWN_COUNTRY_CODE};
use crate::error::ValidationError;

/// A roster entry. The display name is the identity key and is trusted as
/// supplied by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub pseudo: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connection_time: Option<DateTime<Utc>>,
}

impl User {
    /// Whether this record lacks usable country metadata.
    pub fn missing_geo(&self) -> bool {
        self.country_code.is_empty() || self.country_code == UNKNOWN_COUNTRY_CODE
    }
}

/// Best-effort location of the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    pub country: String,
    /// ISO 3166-1 alpha-2, upper case.
    pub country_code: String,
}

impl GeoInfo {
    /// Validate and normalise a provider answer.
    pub fn new(country: &str, country_code: &str) -> Result<Self, ValidationError> {
        let country = country.trim();
        let code = country_code.trim();
        if country.is_empty() {
            return Err(ValidationError::MissingField("country"));
        }
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidCountryCode(code.to_string()));
        }
        Ok(Self {
            country: country.to_string(),
            country_code: code.to_ascii_uppercase(),
        })
    }

    /// Sentinel returned once every lookup provider has failed.
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN_COUNTRY.to_string(),
            country_code: UNKNOWN_COUNTRY_CODE.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.country_code == UNKNOWN_COUNTRY_CODE
    }
}

/// Trim a display name and reject blanks.
pub fn normalize_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_validation() {
        assert_eq!(
            GeoInfo::new(" France ", "fr").unwrap(),
            GeoInfo {
                country: "France".into(),
                country_code: "FR".into()
            }
        );
        assert!(GeoInfo::new("France", "FRA").is_err());
        assert!(GeoInfo::new("", "FR").is_err());
        assert!(GeoInfo::new("France", "F1").is_err());
    }

    #[test]
    fn unknown_sentinel() {
        let geo = GeoInfo::unknown();
        assert!(geo.is_unknown());
        assert_eq!(geo.country_code, "XX");
    }

    #[test]
    fn names_are_trimmed() {
        assert_eq!(normalize_name("  alice ").unwrap(), "alice");
        assert_eq!(normalize_name("   "), Err(ValidationError::EmptyName));
    }

    #[test]
    fn missing_geo_includes_sentinel() {
        let mut user: User = serde_json::from_value(serde_json::json!({
            "pseudo": "alice"
        }))
        .unwrap();
        assert!(user.missing_geo());
        user.country_code = "XX".into();
        assert!(user.missing_geo());
        user.country_code = "FR".into();
        assert!(!user.missing_geo());
    }
}
