use rusqlite::{params, Connection, Row};

use super::{format_datetime, parse_datetime, Edge, Session, StoreError, StoreResult};
use crate::models::{EntityKind, Media, Post, Relation, User};

/// A persisted record the store can read, insert and eager-load generically.
pub trait Entity: Sized {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize>;

    /// Populate one relation. Only called with relations listed by `KIND.relations()`.
    fn load_relation(&mut self, session: &Session<'_>, relation: Relation) -> StoreResult<()>;
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get("id")?,
            name: row.get("name")?,
            key_hash: row.get("key_hash")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            following: Vec::new(),
            followers: Vec::new(),
        })
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO users (id, name, key_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                &self.id,
                &self.name,
                &self.key_hash,
                format_datetime(&self.created_at),
            ],
        )
    }

    fn load_relation(&mut self, session: &Session<'_>, relation: Relation) -> StoreResult<()> {
        match relation {
            Relation::Following => self.following = session.load_related(Edge::Following, &self.id)?,
            Relation::Followers => self.followers = session.load_related(Edge::Followers, &self.id)?,
            other => {
                return Err(StoreError::InvalidRelation {
                    kind: Self::KIND.readable_name(),
                    relation: other,
                })
            }
        }
        Ok(())
    }
}

impl Entity for Post {
    const KIND: EntityKind = EntityKind::Post;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let media_json: String = row.get("media_ids")?;
        let media_ids: Vec<String> = serde_json::from_str(&media_json).unwrap_or_default();

        Ok(Post {
            id: row.get("id")?,
            author_id: row.get("author_id")?,
            text: row.get("text")?,
            media_ids,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
            author: None,
            likes: Vec::new(),
            like_count: 0,
        })
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let media_json = serde_json::to_string(&self.media_ids)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        conn.execute(
            r#"INSERT INTO posts (id, author_id, text, media_ids, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                &self.id,
                &self.author_id,
                &self.text,
                &media_json,
                format_datetime(&self.created_at),
            ],
        )
    }

    fn load_relation(&mut self, session: &Session<'_>, relation: Relation) -> StoreResult<()> {
        match relation {
            Relation::Author => {
                self.author = Some(session.get_by_id::<User>(&self.author_id, &[])?);
            }
            Relation::Likes => {
                self.likes = session.load_related(Edge::Likes, &self.id)?;
                self.like_count = self.likes.len() as i64;
            }
            other => {
                return Err(StoreError::InvalidRelation {
                    kind: Self::KIND.readable_name(),
                    relation: other,
                })
            }
        }
        Ok(())
    }
}

impl Entity for Media {
    const KIND: EntityKind = EntityKind::Media;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Media {
            id: row.get("id")?,
            filename: row.get("filename")?,
            size: row.get("size")?,
            created_at: parse_datetime(row.get::<_, String>("created_at")?),
        })
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO media (id, filename, size, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                &self.id,
                &self.filename,
                self.size,
                format_datetime(&self.created_at),
            ],
        )
    }

    fn load_relation(&mut self, _session: &Session<'_>, relation: Relation) -> StoreResult<()> {
        Err(StoreError::InvalidRelation {
            kind: Self::KIND.readable_name(),
            relation,
        })
    }
}
