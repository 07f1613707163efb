//! User profiles and the repository they live in

use crate::{CoreError, Result, UserHandle, validation::ValidationError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Accepts `м`/`ж` as well as `m`/`f` and the full English words,
    /// ignoring case and surrounding whitespace.
    pub fn parse(input: &str) -> std::result::Result<Gender, ValidationError> {
        match input.trim().to_lowercase().as_str() {
            "м" | "m" | "male" => Ok(Gender::Male),
            "ж" | "f" | "female" => Ok(Gender::Female),
            _ => Err(ValidationError::InvalidGender {
                input: input.trim().to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub profile_id: Uuid,
    pub handle: UserHandle,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub title_name: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(new_user: NewUser) -> Self {
        Self {
            profile_id: Uuid::new_v4(),
            handle: new_user.handle,
            username: new_user.username,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            title_name: None,
            gender: None,
            age: None,
            bio: None,
            profile_complete: false,
            created_at: Utc::now(),
        }
    }

    /// Name shown to other users, falling back to platform names.
    pub fn display_name(&self) -> &str {
        self.title_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| Some(self.first_name.as_str()).filter(|name| !name.is_empty()))
            .unwrap_or(self.username.as_str())
    }
}

/// Fields known when a profile is first created.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewUser {
    pub handle: UserHandle,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePhoto {
    pub profile_id: Uuid,
    pub handle: UserHandle,
    pub file_ref: String,
    #[serde(default)]
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileUpdate {
    TitleName(String),
    Gender(Gender),
    Age(u8),
    Bio(String),
    Complete,
}

impl ProfileUpdate {
    pub fn field(&self) -> &'static str {
        match self {
            ProfileUpdate::TitleName(_) => "title_name",
            ProfileUpdate::Gender(_) => "gender",
            ProfileUpdate::Age(_) => "age",
            ProfileUpdate::Bio(_) => "bio",
            ProfileUpdate::Complete => "profile_complete",
        }
    }

    pub fn apply(self, profile: &mut UserProfile) {
        match self {
            ProfileUpdate::TitleName(name) => profile.title_name = Some(name),
            ProfileUpdate::Gender(gender) => profile.gender = Some(gender),
            ProfileUpdate::Age(age) => profile.age = Some(age),
            ProfileUpdate::Bio(bio) => profile.bio = Some(bio),
            ProfileUpdate::Complete => profile.profile_complete = true,
        }
    }
}

/// Persistent profile storage.
///
/// The `update_*` helpers all funnel into [`ProfileRepository::update`];
/// implementors only provide that one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileRepository: Send + Sync + fmt::Debug {
    async fn get_user_by_handle(&self, handle: UserHandle) -> Result<Option<UserProfile>>;

    async fn get_user_by_id(&self, profile_id: Uuid) -> Result<Option<UserProfile>>;

    async fn create_user(&self, new_user: NewUser) -> Result<UserProfile>;

    /// Fails with [`CoreError::ProfileNotFound`] when no profile exists.
    async fn update(&self, handle: UserHandle, update: ProfileUpdate) -> Result<()>;

    async fn add_photo_for_user(&self, handle: UserHandle, file_ref: &str)
    -> Result<ProfilePhoto>;

    /// Most recent photo for the user.
    async fn get_user_photo(&self, handle: UserHandle) -> Result<Option<ProfilePhoto>>;

    async fn get_user_photo_by_id(&self, profile_id: Uuid) -> Result<Option<ProfilePhoto>>;

    async fn update_title_name(&self, handle: UserHandle, title_name: &str) -> Result<()> {
        self.update(handle, ProfileUpdate::TitleName(title_name.to_string()))
            .await
    }

    async fn update_gender(&self, handle: UserHandle, gender: Gender) -> Result<()> {
        self.update(handle, ProfileUpdate::Gender(gender)).await
    }

    async fn update_age(&self, handle: UserHandle, age: u8) -> Result<()> {
        self.update(handle, ProfileUpdate::Age(age)).await
    }

    async fn update_bio(&self, handle: UserHandle, bio: &str) -> Result<()> {
        self.update(handle, ProfileUpdate::Bio(bio.to_string())).await
    }

    async fn mark_profile_complete(&self, handle: UserHandle) -> Result<()> {
        self.update(handle, ProfileUpdate::Complete).await
    }
}

#[derive(Debug, Default)]
pub struct MemoryProfileRepository {
    profiles: RwLock<HashMap<UserHandle, UserProfile>>,
    photos: RwLock<Vec<ProfilePhoto>>,
}

impl MemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileRepository for MemoryProfileRepository {
    async fn get_user_by_handle(&self, handle: UserHandle) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().get(&handle).cloned())
    }

    async fn get_user_by_id(&self, profile_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self
            .profiles
            .read()
            .values()
            .find(|p| p.profile_id == profile_id)
            .cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserProfile> {
        let profile = UserProfile::new(new_user);
        self.profiles.write().insert(profile.handle, profile.clone());
        Ok(profile)
    }

    async fn update(&self, handle: UserHandle, update: ProfileUpdate) -> Result<()> {
        let mut profiles = self.profiles.write();
        let profile = profiles
            .get_mut(&handle)
            .ok_or_else(|| CoreError::profile_not_found(handle))?;
        update.apply(profile);
        Ok(())
    }

    async fn add_photo_for_user(
        &self,
        handle: UserHandle,
        file_ref: &str,
    ) -> Result<ProfilePhoto> {
        let profile_id = self
            .profiles
            .read()
            .get(&handle)
            .map(|p| p.profile_id)
            .ok_or_else(|| CoreError::profile_not_found(handle))?;
        let photo = ProfilePhoto {
            profile_id,
            handle,
            file_ref: file_ref.to_string(),
            is_verified: false,
            created_at: Utc::now(),
        };
        self.photos.write().push(photo.clone());
        Ok(photo)
    }

    async fn get_user_photo(&self, handle: UserHandle) -> Result<Option<ProfilePhoto>> {
        Ok(self
            .photos
            .read()
            .iter()
            .rev()
            .find(|p| p.handle == handle)
            .cloned())
    }

    async fn get_user_photo_by_id(&self, profile_id: Uuid) -> Result<Option<ProfilePhoto>> {
        Ok(self
            .photos
            .read()
            .iter()
            .rev()
            .find(|p| p.profile_id == profile_id)
            .cloned())
    }
}
