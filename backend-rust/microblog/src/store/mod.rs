use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Transaction};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::models::{EntityKind, Post, Relation};

mod edge;
mod entity;

pub use edge::Edge;
pub use entity::Entity;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{kind} has no relation {relation:?}")]
    InvalidRelation {
        kind: &'static str,
        relation: Relation,
    },
    #[error("Store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn not_found(kind: EntityKind) -> Self {
        StoreError::NotFound(format!("Requested {} not found.", kind.readable_name()))
    }

    pub fn already_exists(kind: EntityKind) -> Self {
        let name = kind.readable_name();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        StoreError::AlreadyExists(format!("{} already exists.", capitalized))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Thread-safe SQLite store. All reads and writes go through [`Store::transaction`].
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database described by `config`
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(&config.path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        log::debug!("Store opened at {}", config.path);
        Ok(store)
    }

    /// Create an in-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                key_hash TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS follows (
                follower_id TEXT NOT NULL,
                followed_id TEXT NOT NULL,
                PRIMARY KEY (follower_id, followed_id),
                FOREIGN KEY (follower_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (followed_id) REFERENCES users(id) ON DELETE CASCADE,
                CHECK (follower_id <> followed_id)
            );

            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                text TEXT NOT NULL,
                media_ids TEXT DEFAULT '[]',
                created_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS likes (
                post_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (post_id, user_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS media (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                size INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_follows_followed_id ON follows(followed_id);
            CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id);
            CREATE INDEX IF NOT EXISTS idx_likes_user_id ON likes(user_id);
            "#,
        )?;
        Ok(())
    }

    /// Run `work` as one unit: commit when it returns `Ok`, roll back on any `Err`.
    pub fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Session<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let session = Session { tx };

        match work(&session) {
            Ok(value) => {
                session.tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(e) => {
                log::debug!("Rolling back transaction");
                session.tx.rollback().map_err(StoreError::from)?;
                Err(e)
            }
        }
    }
}

/// One open transaction over the store
pub struct Session<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> Session<'conn> {
    // ==================== Entity Operations ====================

    pub fn get_by_id<E: Entity>(&self, id: &str, relations: &[Relation]) -> StoreResult<E> {
        let sql = format!("SELECT * FROM {} WHERE id = ?1", E::KIND.table());
        let mut entity = self
            .tx
            .query_row(&sql, params![id], |row| E::from_row(row))
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::not_found(E::KIND),
                _ => StoreError::Database(e),
            })?;
        self.eager_load(&mut entity, relations)?;
        Ok(entity)
    }

    /// Look up a single entity by a unique column
    pub fn find_one<E: Entity>(
        &self,
        column: &'static str,
        value: &str,
        relations: &[Relation],
    ) -> StoreResult<E> {
        let sql = format!("SELECT * FROM {} WHERE {} = ?1", E::KIND.table(), column);
        let mut entity = self
            .tx
            .query_row(&sql, params![value], |row| E::from_row(row))
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::not_found(E::KIND),
                _ => StoreError::Database(e),
            })?;
        self.eager_load(&mut entity, relations)?;
        Ok(entity)
    }

    pub fn get_all<E: Entity>(&self, relations: &[Relation]) -> StoreResult<Vec<E>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY created_at ASC, id ASC",
            E::KIND.table()
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let mut entities = stmt
            .query_map([], |row| E::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;

        for entity in &mut entities {
            self.eager_load(entity, relations)?;
        }
        Ok(entities)
    }

    /// Insert `entity`, assigning a fresh id when it has none.
    /// Unique-constraint violations surface as `AlreadyExists`.
    pub fn create<E: Entity>(&self, entity: &mut E) -> StoreResult<()> {
        if entity.id().is_empty() {
            entity.set_id(Uuid::new_v4().to_string());
        }

        entity.insert(&self.tx).map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StoreError::already_exists(E::KIND)
            }
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                StoreError::NotFound(format!(
                    "Record referenced by {} not found.",
                    E::KIND.readable_name()
                ))
            }
            _ => StoreError::Database(e),
        })?;
        Ok(())
    }

    /// Deleting a record that does not exist is a no-op
    pub fn delete<E: Entity>(&self, entity: &E) -> StoreResult<()> {
        self.delete_by_id::<E>(entity.id())
    }

    pub fn delete_by_id<E: Entity>(&self, id: &str) -> StoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", E::KIND.table());
        let rows = self.tx.execute(&sql, params![id])?;
        if rows == 0 {
            log::debug!("Delete of absent {} {} ignored", E::KIND.readable_name(), id);
        }
        Ok(())
    }

    pub fn exists(&self, kind: EntityKind, id: &str) -> StoreResult<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", kind.table());
        let found: bool = self.tx.query_row(&sql, params![id], |row| row.get(0))?;
        Ok(found)
    }

    fn eager_load<E: Entity>(&self, entity: &mut E, relations: &[Relation]) -> StoreResult<()> {
        for relation in relations {
            if !E::KIND.relations().contains(relation) {
                return Err(StoreError::InvalidRelation {
                    kind: E::KIND.readable_name(),
                    relation: *relation,
                });
            }
            entity.load_relation(self, *relation)?;
        }
        Ok(())
    }

    // ==================== Feed ====================

    /// Posts authored by anyone `viewer_id` follows, most liked first.
    /// Ties fall back to newest first, then id, so the order is reproducible.
    pub fn feed(&self, viewer_id: &str) -> StoreResult<Vec<Post>> {
        let mut stmt = self.tx.prepare(
            r#"SELECT p.*, COUNT(l.user_id) AS like_count
               FROM posts p
               JOIN follows f ON f.followed_id = p.author_id
               LEFT JOIN likes l ON l.post_id = p.id
               WHERE f.follower_id = ?1
               GROUP BY p.id
               ORDER BY like_count DESC, p.created_at DESC, p.id ASC"#,
        )?;
        let mut posts = stmt
            .query_map(params![viewer_id], |row| {
                let mut post = Post::from_row(row)?;
                post.like_count = row.get("like_count")?;
                Ok(post)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for post in &mut posts {
            self.eager_load(post, &[Relation::Author, Relation::Likes])?;
        }
        Ok(posts)
    }
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Media, User};

    fn create_user(store: &Store, name: &str) -> User {
        let mut user = User::new(name, format!("hash-{}", name));
        store
            .transaction(|s| s.create(&mut user))
            .map(|_| user)
            .unwrap()
    }

    fn create_post(store: &Store, author: &User, text: &str) -> Post {
        let mut post = Post::new(author.id.clone(), text, vec![]);
        store.transaction(|s| s.create(&mut post)).unwrap();
        post
    }

    #[test]
    fn test_create_and_get_user() {
        let store = Store::in_memory().unwrap();
        let user = create_user(&store, "alice");
        assert!(!user.id.is_empty());

        let retrieved: User = store.transaction(|s| s.get_by_id(&user.id, &[])).unwrap();
        assert_eq!(retrieved.name, "alice");
        assert_eq!(retrieved.key_hash, "hash-alice");
    }

    #[test]
    fn test_duplicate_name_is_already_exists() {
        let store = Store::in_memory().unwrap();
        create_user(&store, "alice");

        let mut dup = User::new("alice", "other-hash");
        let err = store.transaction(|s| s.create(&mut dup)).unwrap_err();
        match err {
            StoreError::AlreadyExists(msg) => assert_eq!(msg, "User already exists."),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_entity_is_not_found() {
        let store = Store::in_memory().unwrap();
        let err = store
            .transaction(|s| s.get_by_id::<Post>("missing", &[]))
            .unwrap_err();
        match err {
            StoreError::NotFound(msg) => assert_eq!(msg, "Requested post not found."),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let store = Store::in_memory().unwrap();
        store
            .transaction(|s| s.delete_by_id::<Post>("missing"))
            .unwrap();
    }

    #[test]
    fn test_get_all_with_relations() {
        let store = Store::in_memory().unwrap();
        let alice = create_user(&store, "alice");
        let bob = create_user(&store, "bob");
        store
            .transaction(|s| s.append_related(Edge::Following, &alice.id, &bob.id))
            .unwrap();

        let users: Vec<User> = store
            .transaction(|s| s.get_all(&[Relation::Following, Relation::Followers]))
            .unwrap();
        assert_eq!(users.len(), 2);
        let a = users.iter().find(|u| u.name == "alice").unwrap();
        let b = users.iter().find(|u| u.name == "bob").unwrap();
        assert_eq!(a.following.len(), 1);
        assert_eq!(a.following[0].name, "bob");
        assert_eq!(b.followers.len(), 1);
        assert_eq!(b.followers[0].name, "alice");
    }

    #[test]
    fn test_unsupported_relation_is_rejected() {
        let store = Store::in_memory().unwrap();
        let alice = create_user(&store, "alice");
        let err = store
            .transaction(|s| s.get_by_id::<User>(&alice.id, &[Relation::Likes]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRelation { .. }));
    }

    #[test]
    fn test_error_rolls_back_earlier_writes() {
        let store = Store::in_memory().unwrap();
        let result: StoreResult<()> = store.transaction(|s| {
            let mut user = User::new("ghost", "hash-ghost");
            s.create(&mut user)?;
            s.get_by_id::<Post>("missing", &[])?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::NotFound(_))));

        let users: Vec<User> = store.transaction(|s| s.get_all(&[])).unwrap();
        assert!(users.is_empty());
    }

    #[test]
    fn test_deleting_post_cascades_likes() {
        let store = Store::in_memory().unwrap();
        let alice = create_user(&store, "alice");
        let bob = create_user(&store, "bob");
        let post = create_post(&store, &bob, "hello");

        store
            .transaction(|s| s.append_related(Edge::Likes, &post.id, &alice.id))
            .unwrap();
        store.transaction(|s| s.delete(&post)).unwrap();

        let remaining: i64 = store
            .transaction(|s| s.count_related(Edge::Likes, &post.id))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_post_media_ids_round_trip() {
        let store = Store::in_memory().unwrap();
        let bob = create_user(&store, "bob");
        let mut post = Post::new(
            bob.id.clone(),
            "with media",
            vec!["m1".to_string(), "m2".to_string()],
        );
        store.transaction(|s| s.create(&mut post)).unwrap();

        let loaded: Post = store
            .transaction(|s| s.get_by_id(&post.id, &[Relation::Author]))
            .unwrap();
        assert_eq!(loaded.media_ids, vec!["m1", "m2"]);
        assert_eq!(loaded.author.unwrap().name, "bob");
    }

    #[test]
    fn test_post_for_missing_author_fails() {
        let store = Store::in_memory().unwrap();
        let mut post = Post::new("nobody", "orphan", vec![]);
        let err = store.transaction(|s| s.create(&mut post)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_media_record_keeps_given_id() {
        let store = Store::in_memory().unwrap();
        let mut media = Media {
            id: "fixed-id".to_string(),
            filename: "fixed-id.png".to_string(),
            size: 3,
            created_at: Utc::now(),
        };
        store.transaction(|s| s.create(&mut media)).unwrap();

        let loaded: Media = store.transaction(|s| s.get_by_id("fixed-id", &[])).unwrap();
        assert_eq!(loaded.filename, "fixed-id.png");
    }

    #[test]
    fn test_feed_orders_by_likes_and_skips_unfollowed() {
        let store = Store::in_memory().unwrap();
        let viewer = create_user(&store, "viewer");
        let bob = create_user(&store, "bob");
        let carol = create_user(&store, "carol");
        let stranger = create_user(&store, "stranger");

        let quiet = create_post(&store, &bob, "quiet");
        let popular = create_post(&store, &carol, "popular");
        create_post(&store, &stranger, "unseen");
        create_post(&store, &viewer, "mine");

        store
            .transaction(|s| {
                s.append_related(Edge::Following, &viewer.id, &bob.id)?;
                s.append_related(Edge::Following, &viewer.id, &carol.id)?;
                s.append_related(Edge::Likes, &popular.id, &bob.id)?;
                s.append_related(Edge::Likes, &popular.id, &stranger.id)?;
                s.append_related(Edge::Likes, &quiet.id, &carol.id)
            })
            .unwrap();

        let feed = store.transaction(|s| s.feed(&viewer.id)).unwrap();
        let texts: Vec<&str> = feed.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["popular", "quiet"]);
        assert_eq!(feed[0].like_count, 2);
        assert_eq!(feed[0].likes.len(), 2);
        assert_eq!(feed[0].author.as_ref().unwrap().name, "carol");
    }
}
