use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Custom serde module for DateTime to ensure RFC3339 string format
mod datetime_format {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = date.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<DateTime<Utc>>().map_err(serde::de::Error::custom)
    }
}

// An absent field stays `None`; an explicit `null` becomes `Some(None)`
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A registered person.
///
/// The credential secret is never serialized; it only travels inward as an
/// already-hashed value inside [`NewAccount`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub bio: Option<String>,
    pub is_private: bool,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    pub email: String,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "datetime_format")]
    pub updated_at: DateTime<Utc>,
}

/// A content item authored by exactly one [`Account`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub content: String,
    /// Ordered media references (images, video)
    #[serde(default)]
    pub media_urls: Option<Vec<String>>,
    pub user_id: Uuid,
    pub is_public: bool,
    pub allow_comments: bool,
    pub like_count: i32,
    pub comment_count: i32,
    pub share_count: i32,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "datetime_format")]
    pub updated_at: DateTime<Utc>,
}

/// A post joined with the account that authored it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithAuthor {
    #[serde(flatten)]
    pub post: Post,
    pub author_name: String,
    pub author_username: String,
}

/// One account's endorsement of one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub post_id: Option<Uuid>,
}

// Insert and update payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub username: String,
    /// Pre-hashed credential secret supplied by the identity provider
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_private: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    /// `Some(None)` clears the column
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
    pub is_private: Option<bool>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.email.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
            && self.is_private.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub user_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub media_urls: Option<Vec<String>>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub allow_comments: Option<bool>,
}

/// Partial post update. Counters are written by the like, comment and share
/// collaborators; the store does not derive them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostUpdate {
    pub content: Option<String>,
    /// `Some(None)` clears the column
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Option::is_none")]
    pub media_urls: Option<Option<Vec<String>>>,
    pub is_public: Option<bool>,
    pub allow_comments: Option<bool>,
    pub like_count: Option<i32>,
    pub comment_count: Option<i32>,
    pub share_count: Option<i32>,
}

impl PostUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.media_urls.is_none()
            && self.is_public.is_none()
            && self.allow_comments.is_none()
            && self.like_count.is_none()
            && self.comment_count.is_none()
            && self.share_count.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLike {
    pub user_id: Uuid,
    #[serde(default)]
    pub post_id: Option<Uuid>,
}

/// Body returned by the seed trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<Account>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SeedResponse {
    pub fn seeded(users: Vec<Account>) -> Self {
        Self {
            success: true,
            message: Some(format!("Successfully seeded {} users", users.len())),
            users: Some(users),
            error: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            message: None,
            users: None,
            error: Some("Failed to seed data".to_string()),
        }
    }
}
