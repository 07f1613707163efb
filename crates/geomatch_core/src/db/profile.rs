//! Profile repository on `user_profile` and `profile_photo` tables

use crate::db::Db;
use crate::profile::{Gender, NewUser, ProfilePhoto, ProfileUpdate, UserProfile};
use crate::{CoreError, ProfileRepository, Result, UserHandle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PROFILE_TABLE: &str = "user_profile";
const PHOTO_TABLE: &str = "profile_photo";

/// Stored shape of a profile; ids are kept as strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileRecord {
    profile_id: String,
    handle: UserHandle,
    username: String,
    first_name: String,
    last_name: String,
    #[serde(default)]
    title_name: Option<String>,
    #[serde(default)]
    gender: Option<Gender>,
    #[serde(default)]
    age: Option<u8>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    profile_complete: bool,
    created_at: DateTime<Utc>,
}

impl From<&UserProfile> for ProfileRecord {
    fn from(profile: &UserProfile) -> Self {
        Self {
            profile_id: profile.profile_id.to_string(),
            handle: profile.handle,
            username: profile.username.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            title_name: profile.title_name.clone(),
            gender: profile.gender,
            age: profile.age,
            bio: profile.bio.clone(),
            profile_complete: profile.profile_complete,
            created_at: profile.created_at,
        }
    }
}

impl TryFrom<ProfileRecord> for UserProfile {
    type Error = CoreError;

    fn try_from(record: ProfileRecord) -> Result<Self> {
        let profile_id = Uuid::parse_str(&record.profile_id)
            .map_err(|e| CoreError::profile_operation("decode profile", record.handle, e))?;
        Ok(UserProfile {
            profile_id,
            handle: record.handle,
            username: record.username,
            first_name: record.first_name,
            last_name: record.last_name,
            title_name: record.title_name,
            gender: record.gender,
            age: record.age,
            bio: record.bio,
            profile_complete: record.profile_complete,
            created_at: record.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhotoRecord {
    profile_id: String,
    handle: UserHandle,
    file_ref: String,
    #[serde(default)]
    is_verified: bool,
    created_at: DateTime<Utc>,
    /// Microsecond timestamp used for ordering.
    seq: i64,
}

impl TryFrom<PhotoRecord> for ProfilePhoto {
    type Error = CoreError;

    fn try_from(record: PhotoRecord) -> Result<Self> {
        let profile_id = Uuid::parse_str(&record.profile_id)
            .map_err(|e| CoreError::profile_operation("decode photo", record.handle, e))?;
        Ok(ProfilePhoto {
            profile_id,
            handle: record.handle,
            file_ref: record.file_ref,
            is_verified: record.is_verified,
            created_at: record.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SurrealProfileRepository {
    db: Db,
}

impl SurrealProfileRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn save(&self, profile: &UserProfile) -> Result<()> {
        let _: Option<ProfileRecord> = self
            .db
            .upsert((PROFILE_TABLE, profile.handle.get()))
            .content(ProfileRecord::from(profile))
            .await
            .map_err(|e| CoreError::profile_operation("save profile", profile.handle, e))?;
        Ok(())
    }

    async fn latest_photo(
        &self,
        query: &'static str,
        field: &'static str,
        value: serde_json::Value,
        user: String,
    ) -> Result<Option<ProfilePhoto>> {
        let mut response = self
            .db
            .query(query)
            .bind((field, value))
            .await
            .map_err(|e| CoreError::profile_operation("get photo", &user, e))?;
        let records: Vec<PhotoRecord> = response
            .take(0)
            .map_err(|e| CoreError::profile_operation("get photo", &user, e))?;
        records.into_iter().next().map(ProfilePhoto::try_from).transpose()
    }
}

#[async_trait]
impl ProfileRepository for SurrealProfileRepository {
    async fn get_user_by_handle(&self, handle: UserHandle) -> Result<Option<UserProfile>> {
        let record: Option<ProfileRecord> = self
            .db
            .select((PROFILE_TABLE, handle.get()))
            .await
            .map_err(|e| CoreError::profile_operation("get user", handle, e))?;
        record.map(UserProfile::try_from).transpose()
    }

    async fn get_user_by_id(&self, profile_id: Uuid) -> Result<Option<UserProfile>> {
        let mut response = self
            .db
            .query("SELECT * FROM user_profile WHERE profile_id = $profile_id LIMIT 1")
            .bind(("profile_id", profile_id.to_string()))
            .await
            .map_err(|e| CoreError::profile_operation("get user by id", profile_id, e))?;
        let records: Vec<ProfileRecord> = response
            .take(0)
            .map_err(|e| CoreError::profile_operation("get user by id", profile_id, e))?;
        records.into_iter().next().map(UserProfile::try_from).transpose()
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserProfile> {
        let profile = UserProfile::new(new_user);
        self.save(&profile).await?;
        tracing::info!("Created profile {} for {}", profile.profile_id, profile.handle);
        Ok(profile)
    }

    async fn update(&self, handle: UserHandle, update: ProfileUpdate) -> Result<()> {
        let mut profile = self
            .get_user_by_handle(handle)
            .await?
            .ok_or_else(|| CoreError::profile_not_found(handle))?;
        tracing::debug!("Updating {} for {}", update.field(), handle);
        update.apply(&mut profile);
        self.save(&profile).await
    }

    async fn add_photo_for_user(
        &self,
        handle: UserHandle,
        file_ref: &str,
    ) -> Result<ProfilePhoto> {
        let profile = self
            .get_user_by_handle(handle)
            .await?
            .ok_or_else(|| CoreError::profile_not_found(handle))?;
        let now = Utc::now();
        let record = PhotoRecord {
            profile_id: profile.profile_id.to_string(),
            handle,
            file_ref: file_ref.to_string(),
            is_verified: false,
            created_at: now,
            seq: now.timestamp_micros(),
        };
        let created: Option<PhotoRecord> = self
            .db
            .create(PHOTO_TABLE)
            .content(record.clone())
            .await
            .map_err(|e| CoreError::profile_operation("add photo", handle, e))?;
        ProfilePhoto::try_from(created.unwrap_or(record))
    }

    async fn get_user_photo(&self, handle: UserHandle) -> Result<Option<ProfilePhoto>> {
        self.latest_photo(
            "SELECT * FROM profile_photo WHERE handle = $handle ORDER BY seq DESC LIMIT 1",
            "handle",
            serde_json::json!(handle.get()),
            handle.to_string(),
        )
        .await
    }

    async fn get_user_photo_by_id(&self, profile_id: Uuid) -> Result<Option<ProfilePhoto>> {
        self.latest_photo(
            "SELECT * FROM profile_photo WHERE profile_id = $profile_id ORDER BY seq DESC LIMIT 1",
            "profile_id",
            serde_json::json!(profile_id.to_string()),
            profile_id.to_string(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::client::create_test_db;
    use pretty_assertions::assert_eq;

    fn new_user(handle: i64) -> NewUser {
        NewUser {
            handle: UserHandle(handle),
            username: format!("user{handle}"),
            first_name: "Maria".to_string(),
            last_name: String::new(),
        }
    }

    #[tokio::test]
    async fn create_update_and_lookup() {
        let repo = SurrealProfileRepository::new(create_test_db().await.unwrap());
        let created = repo.create_user(new_user(7)).await.unwrap();

        repo.update_title_name(UserHandle(7), "Masha").await.unwrap();
        repo.update_gender(UserHandle(7), Gender::Female).await.unwrap();
        repo.update_age(UserHandle(7), 31).await.unwrap();
        repo.update_bio(UserHandle(7), "Runs marathons").await.unwrap();
        repo.mark_profile_complete(UserHandle(7)).await.unwrap();

        let profile = repo
            .get_user_by_handle(UserHandle(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.profile_id, created.profile_id);
        assert_eq!(profile.title_name.as_deref(), Some("Masha"));
        assert_eq!(profile.gender, Some(Gender::Female));
        assert_eq!(profile.age, Some(31));
        assert!(profile.profile_complete);

        let by_id = repo
            .get_user_by_id(created.profile_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.handle, UserHandle(7));
        assert_eq!(repo.get_user_by_id(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_missing_profile_is_not_found() {
        let repo = SurrealProfileRepository::new(create_test_db().await.unwrap());
        assert!(matches!(
            repo.update_bio(UserHandle(404), "hi").await,
            Err(CoreError::ProfileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn photos_are_returned_newest_first() {
        let repo = SurrealProfileRepository::new(create_test_db().await.unwrap());
        let profile = repo.create_user(new_user(8)).await.unwrap();
        assert_eq!(repo.get_user_photo(UserHandle(8)).await.unwrap(), None);

        repo.add_photo_for_user(UserHandle(8), "https://cdn.example/one.jpg")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        repo.add_photo_for_user(UserHandle(8), "https://cdn.example/two.jpg")
            .await
            .unwrap();

        let latest = repo.get_user_photo(UserHandle(8)).await.unwrap().unwrap();
        assert_eq!(latest.file_ref, "https://cdn.example/two.jpg");
        assert!(!latest.is_verified);

        let by_id = repo
            .get_user_photo_by_id(profile.profile_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_id.file_ref, latest.file_ref);
    }
}
