use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const NAME_MAX_CHARS: usize = 30;
pub const TEXT_MAX_CHARS: usize = 500;

/// The closed set of persisted entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Post,
    Media,
}

impl EntityKind {
    /// Human-facing noun used in error messages
    pub fn readable_name(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Post => "post",
            EntityKind::Media => "media",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Post => "posts",
            EntityKind::Media => "media",
        }
    }

    /// Relations that can be eager-loaded alongside this kind
    pub fn relations(&self) -> &'static [Relation] {
        match self {
            EntityKind::User => &[Relation::Following, Relation::Followers],
            EntityKind::Post => &[Relation::Author, Relation::Likes],
            EntityKind::Media => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Following,
    Followers,
    Author,
    Likes,
}

/// User is an account identified by an API key.
/// Relations are only populated when requested from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub following: Vec<User>,
    #[serde(default)]
    pub followers: Vec<User>,
}

impl User {
    pub fn new(name: impl Into<String>, key_hash: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            key_hash: key_hash.into(),
            created_at: Utc::now(),
            following: Vec::new(),
            followers: Vec::new(),
        }
    }
}

/// Post is a short text published by one author, optionally referencing media.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub media_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub likes: Vec<User>,
    #[serde(default)]
    pub like_count: i64,
}

impl Post {
    pub fn new(author_id: impl Into<String>, text: impl Into<String>, media_ids: Vec<String>) -> Self {
        Self {
            id: String::new(),
            author_id: author_id.into(),
            text: text.into(),
            media_ids,
            created_at: Utc::now(),
            author: None,
            likes: Vec::new(),
            like_count: 0,
        }
    }

    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.author_id == user_id
    }
}

/// Media records a stored file; the bytes live in media storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: String,
    pub filename: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

// ==================== Requests ====================

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub key: String,
}

impl SignUpRequest {
    /// Collects one message per invalid field
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let len = self.name.chars().count();
        if len == 0 || len > NAME_MAX_CHARS {
            errors.push(format!("name must be between 1 and {} characters", NAME_MAX_CHARS));
        }
        if Uuid::parse_str(&self.key).is_err() {
            errors.push("key must be a valid UUID".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub text: String,
    #[serde(default)]
    pub medias: Vec<Uuid>,
}

impl PublishRequest {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let len = self.text.chars().count();
        if len == 0 || len > TEXT_MAX_CHARS {
            return Err(vec![format!(
                "text must be between 1 and {} characters",
                TEXT_MAX_CHARS
            )]);
        }
        Ok(())
    }
}

// ==================== Responses ====================

/// Public projection of a user, never carrying the key hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub followers: Vec<UserSummary>,
    pub following: Vec<UserSummary>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            followers: user.followers.iter().map(UserSummary::from).collect(),
            following: user.following.iter().map(UserSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub text: String,
    pub medias: Vec<String>,
    pub author: Option<UserSummary>,
    pub likes: Vec<UserSummary>,
    pub like_count: i64,
}

impl From<&Post> for PostView {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            text: post.text.clone(),
            medias: post.media_ids.clone(),
            author: post.author.as_ref().map(UserSummary::from),
            likes: post.likes.iter().map(UserSummary::from).collect(),
            like_count: post.like_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostId {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaId {
    pub id: String,
}

/// Error body; validation failures are returned as a list of these
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub msg: String,
}
