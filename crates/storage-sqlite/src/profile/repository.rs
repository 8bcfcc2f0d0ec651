use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;

use ledgerline_core::profile::{Profile, ProfileRepositoryTrait, ProfileUpdate};
use ledgerline_core::sync::{SyncOperation, SyncTable};
use ledgerline_core::Result;

use super::model::ProfileDB;
use crate::db::{get_connection, now_timestamp, WriteHandle};
use crate::errors::StorageError;
use crate::schema::profiles;
use crate::schema::profiles::dsl::*;
use crate::sync::{write_outbox_event, OutboxWriteRequest};

pub struct ProfileRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl ProfileRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        ProfileRepository { pool, writer }
    }
}

#[async_trait]
impl ProfileRepositoryTrait for ProfileRepository {
    /// The profile row of this install, if one was saved or pulled.
    fn get_profile(&self) -> Result<Option<Profile>> {
        let mut conn = get_connection(&self.pool)?;
        profiles
            .order(created_at.asc())
            .first::<ProfileDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(Profile::try_from)
            .transpose()
    }

    async fn save_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        update.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Profile> {
                let now = now_timestamp();
                let existing = profiles
                    .find(&update.id)
                    .first::<ProfileDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                match existing {
                    None => {
                        let profile_db = ProfileDB {
                            id: update.id,
                            display_name: update.display_name,
                            base_currency: update.base_currency,
                            locale: update.locale,
                            created_at: now.clone(),
                            updated_at: now,
                        };
                        diesel::insert_into(profiles::table)
                            .values(&profile_db)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        write_outbox_event(
                            conn,
                            OutboxWriteRequest::new(
                                SyncTable::Profiles,
                                profile_db.id.clone(),
                                SyncOperation::Insert,
                                serde_json::to_value(&profile_db)?,
                            ),
                        )?;
                        Profile::try_from(profile_db)
                    }
                    Some(existing) => {
                        let updated = ProfileDB {
                            display_name: update.display_name,
                            base_currency: update.base_currency,
                            locale: update.locale,
                            updated_at: now,
                            ..existing.clone()
                        };
                        diesel::update(profiles.find(&existing.id))
                            .set(&updated)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        write_outbox_event(
                            conn,
                            OutboxWriteRequest::update(
                                SyncTable::Profiles,
                                existing.id.clone(),
                                &serde_json::to_value(&existing)?,
                                &serde_json::to_value(&updated)?,
                            ),
                        )?;
                        Profile::try_from(updated)
                    }
                }
            })
            .await
    }
}
