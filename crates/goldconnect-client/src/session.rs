//! Login gate and user records.

use std::sync::Arc;

use goldconnect_shared::constants::USERS_COLLECTION;
use goldconnect_shared::user::normalize_name;
use goldconnect_shared::{GeoInfo, User};
use goldconnect_store::{server_timestamp, DocumentStore, Fields, StoreError};
use tracing::info;

use crate::error::Result;
use crate::records::{decode_user, encode_new_user};

/// Editable profile fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub geo: Option<GeoInfo>,
}

#[derive(Clone)]
pub struct SessionGate {
    store: Arc<dyn DocumentStore>,
}

impl SessionGate {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create the user record on first login, refresh it afterwards.
    ///
    /// Geo data is only written when the record has none yet; an existing
    /// country is never overwritten, and the unknown sentinel never replaces
    /// a missing value on refresh.
    pub async fn login_or_refresh(&self, name: &str, geo: &GeoInfo) -> Result<User> {
        let pseudo = normalize_name(name)?;

        match self.store.get(USERS_COLLECTION, &pseudo).await? {
            None => {
                self.store
                    .set(USERS_COLLECTION, &pseudo, encode_new_user(&pseudo, geo))
                    .await?;
                info!(user = %pseudo, country = %geo.country_code, "user created");
            }
            Some(doc) => {
                let existing = decode_user(&doc);
                let mut updates = Fields::new();
                updates.insert("lastSeen".into(), server_timestamp());
                updates.insert("connectionTime".into(), server_timestamp());
                let backfill = existing.missing_geo() && !geo.is_unknown();
                if backfill {
                    updates.insert("country".into(), geo.country.as_str().into());
                    updates.insert("countryCode".into(), geo.country_code.as_str().into());
                }
                self.store.update(USERS_COLLECTION, &pseudo, updates).await?;
                info!(user = %pseudo, backfill, "user refreshed");
            }
        }

        self.get_user(&pseudo)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{USERS_COLLECTION}/{pseudo}")).into())
    }

    pub async fn get_user(&self, name: &str) -> Result<Option<User>> {
        let pseudo = normalize_name(name)?;
        Ok(self
            .store
            .get(USERS_COLLECTION, &pseudo)
            .await?
            .map(|doc| decode_user(&doc)))
    }

    /// Merge profile fields into an existing record and bump `lastSeen`.
    pub async fn update_profile(&self, name: &str, update: ProfileUpdate) -> Result<()> {
        let pseudo = normalize_name(name)?;
        let mut fields = Fields::new();
        if let Some(display) = update.name {
            fields.insert("name".into(), display.trim().into());
        }
        if let Some(phone) = update.phone {
            fields.insert("phone".into(), phone.trim().into());
        }
        if let Some(geo) = update.geo {
            fields.insert("country".into(), geo.country.into());
            fields.insert("countryCode".into(), geo.country_code.into());
        }
        fields.insert("lastSeen".into(), server_timestamp());
        self.store.update(USERS_COLLECTION, &pseudo, fields).await?;
        Ok(())
    }
}
