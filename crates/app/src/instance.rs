//! Instance profile.

use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;

use crate::store::{Store, StoreError, data::FindUser, records::Role};

/// Static facts about the running instance.
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    pub version: String,
    pub mode: String,
    pub allow_signup: bool,
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: "prod".to_string(),
            allow_signup: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceProfile {
    pub version: String,
    pub schema_version: Option<String>,
    pub mode: String,
    pub allow_signup: bool,
    pub has_admin: bool,
}

#[derive(Debug, Clone)]
pub struct StoreInstanceService {
    store: Arc<Store>,
    settings: InstanceSettings,
}

impl StoreInstanceService {
    #[must_use]
    pub fn new(store: Arc<Store>, settings: InstanceSettings) -> Self {
        Self { store, settings }
    }
}

#[async_trait]
impl InstanceService for StoreInstanceService {
    async fn profile(&self) -> Result<InstanceProfile, StoreError> {
        let schema_version = self.store.schema_version().await?;
        let admins = self
            .store
            .list_users(FindUser {
                role: Some(Role::Admin),
                limit: Some(1),
                ..FindUser::default()
            })
            .await?;

        Ok(InstanceProfile {
            version: self.settings.version.clone(),
            schema_version,
            mode: self.settings.mode.clone(),
            allow_signup: self.settings.allow_signup,
            has_admin: !admins.is_empty(),
        })
    }
}

#[automock]
#[async_trait]
pub trait InstanceService: Send + Sync {
    async fn profile(&self) -> Result<InstanceProfile, StoreError>;
}
