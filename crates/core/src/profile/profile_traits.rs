use async_trait::async_trait;

use super::profile_model::{Profile, ProfileUpdate};
use crate::errors::Result;

#[async_trait]
pub trait ProfileRepositoryTrait: Send + Sync {
    fn get_profile(&self) -> Result<Option<Profile>>;

    /// Inserts the profile on first save, updates it afterwards.
    async fn save_profile(&self, update: ProfileUpdate) -> Result<Profile>;
}
