use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A stored verification entry. Unrelated to messaging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for a new verification entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewVerifyRecord {
    pub name: String,
    pub country: String,
    pub phone_number: String,
}

impl NewVerifyRecord {
    /// Trim every field; all three are required.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let name = self.name.trim();
        let country = self.country.trim();
        let phone = self.phone_number.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if country.is_empty() {
            return Err(ValidationError::MissingField("country"));
        }
        if phone.is_empty() {
            return Err(ValidationError::MissingField("phoneNumber"));
        }
        Ok(Self {
            name: name.to_string(),
            country: country.to_string(),
            phone_number: phone.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_fields_required() {
        let mut input = NewVerifyRecord {
            name: " Ana ".into(),
            country: "Peru".into(),
            phone_number: " +51 1 ".into(),
        };
        let ok = input.normalized().unwrap();
        assert_eq!(ok.name, "Ana");
        assert_eq!(ok.phone_number, "+51 1");

        input.phone_number = "  ".into();
        assert_eq!(
            input.normalized(),
            Err(ValidationError::MissingField("phoneNumber"))
        );
    }
}
