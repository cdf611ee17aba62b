use rusqlite::params;

use super::{Entity, Session, StoreError, StoreResult};
use crate::models::{EntityKind, User};

/// Many-to-many join tables. Every edge has users on its member side.
///
/// `Following` and `Followers` are two views of the same `follows` table:
/// owner `a` following member `b` is the same row as owner `b` followed by member `a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Following,
    Followers,
    Likes,
}

impl Edge {
    fn table(&self) -> &'static str {
        match self {
            Edge::Following | Edge::Followers => "follows",
            Edge::Likes => "likes",
        }
    }

    fn owner_column(&self) -> &'static str {
        match self {
            Edge::Following => "follower_id",
            Edge::Followers => "followed_id",
            Edge::Likes => "post_id",
        }
    }

    fn member_column(&self) -> &'static str {
        match self {
            Edge::Following => "followed_id",
            Edge::Followers => "follower_id",
            Edge::Likes => "user_id",
        }
    }

    pub fn owner_kind(&self) -> EntityKind {
        match self {
            Edge::Following | Edge::Followers => EntityKind::User,
            Edge::Likes => EntityKind::Post,
        }
    }
}

impl<'conn> Session<'conn> {
    /// Members on the far side of `edge` for `owner_id`, ordered by name
    pub fn load_related(&self, edge: Edge, owner_id: &str) -> StoreResult<Vec<User>> {
        let sql = format!(
            r#"SELECT u.* FROM users u
               JOIN {table} e ON e.{member} = u.id
               WHERE e.{owner} = ?1
               ORDER BY u.name ASC"#,
            table = edge.table(),
            member = edge.member_column(),
            owner = edge.owner_column(),
        );
        let mut stmt = self.tx.prepare(&sql)?;
        let users = stmt
            .query_map(params![owner_id], |row| User::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn count_related(&self, edge: Edge, owner_id: &str) -> StoreResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            edge.table(),
            edge.owner_column()
        );
        let count: i64 = self.tx.query_row(&sql, params![owner_id], |row| row.get(0))?;
        Ok(count)
    }

    /// Add `member_id` to the owner's set. Both ends must exist;
    /// adding a member that is already present changes nothing.
    pub fn append_related(&self, edge: Edge, owner_id: &str, member_id: &str) -> StoreResult<()> {
        self.ensure_ends(edge, owner_id, member_id)?;

        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?1, ?2)",
            edge.table(),
            edge.owner_column(),
            edge.member_column()
        );
        let rows = self.tx.execute(&sql, params![owner_id, member_id])?;
        if rows == 0 {
            log::debug!("{:?} edge {} -> {} already present", edge, owner_id, member_id);
        }
        Ok(())
    }

    /// Remove `member_id` from the owner's set. The member must exist;
    /// removing an absent member changes nothing.
    pub fn remove_related(&self, edge: Edge, owner_id: &str, member_id: &str) -> StoreResult<()> {
        self.ensure_ends(edge, owner_id, member_id)?;

        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
            edge.table(),
            edge.owner_column(),
            edge.member_column()
        );
        let rows = self.tx.execute(&sql, params![owner_id, member_id])?;
        if rows == 0 {
            log::debug!("{:?} edge {} -> {} already absent", edge, owner_id, member_id);
        }
        Ok(())
    }

    fn ensure_ends(&self, edge: Edge, owner_id: &str, member_id: &str) -> StoreResult<()> {
        if !self.exists(edge.owner_kind(), owner_id)? {
            return Err(StoreError::not_found(edge.owner_kind()));
        }
        if !self.exists(EntityKind::User, member_id)? {
            return Err(StoreError::not_found(EntityKind::User));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Post;
    use crate::store::Store;

    fn setup() -> (Store, User, User) {
        let store = Store::in_memory().unwrap();
        let mut alice = User::new("alice", "hash-a");
        let mut bob = User::new("bob", "hash-b");
        store
            .transaction(|s| {
                s.create(&mut alice)?;
                s.create(&mut bob)
            })
            .unwrap();
        (store, alice, bob)
    }

    #[test]
    fn test_append_is_idempotent() {
        let (store, alice, bob) = setup();
        for _ in 0..2 {
            store
                .transaction(|s| s.append_related(Edge::Following, &alice.id, &bob.id))
                .unwrap();
        }
        let count = store
            .transaction(|s| s.count_related(Edge::Following, &alice.id))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_followers_is_inverse_of_following() {
        let (store, alice, bob) = setup();
        store
            .transaction(|s| s.append_related(Edge::Followers, &bob.id, &alice.id))
            .unwrap();

        let following = store
            .transaction(|s| s.load_related(Edge::Following, &alice.id))
            .unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].id, bob.id);

        let followers_of_alice = store
            .transaction(|s| s.load_related(Edge::Followers, &alice.id))
            .unwrap();
        assert!(followers_of_alice.is_empty());
    }

    #[test]
    fn test_remove_absent_member_is_noop() {
        let (store, alice, bob) = setup();
        store
            .transaction(|s| s.remove_related(Edge::Following, &alice.id, &bob.id))
            .unwrap();
    }

    #[test]
    fn test_missing_member_is_not_found() {
        let (store, alice, _) = setup();
        let err = store
            .transaction(|s| s.append_related(Edge::Following, &alice.id, "ghost"))
            .unwrap_err();
        match err {
            StoreError::NotFound(msg) => assert_eq!(msg, "Requested user not found."),
            other => panic!("unexpected error: {:?}", other),
        }

        let err = store
            .transaction(|s| s.remove_related(Edge::Following, &alice.id, "ghost"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_likes_missing_post_is_not_found() {
        let (store, alice, _) = setup();
        let err = store
            .transaction(|s| s.append_related(Edge::Likes, "no-post", &alice.id))
            .unwrap_err();
        match err {
            StoreError::NotFound(msg) => assert_eq!(msg, "Requested post not found."),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_like_edges_load_users() {
        let (store, alice, bob) = setup();
        let mut post = Post::new(bob.id.clone(), "hi", vec![]);
        store
            .transaction(|s| {
                s.create(&mut post)?;
                s.append_related(Edge::Likes, &post.id, &alice.id)
            })
            .unwrap();

        let likers = store
            .transaction(|s| s.load_related(Edge::Likes, &post.id))
            .unwrap();
        assert_eq!(likers.len(), 1);
        assert_eq!(likers[0].name, "alice");
    }
}
