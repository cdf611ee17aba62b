//! Profiles and the follow graph.

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{Relation, User, UserProfile};
use crate::store::{Edge, Store, StoreError};

pub struct UserService {
    store: Arc<Store>,
}

impl UserService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The caller's own profile; `user` was loaded with its relations at authentication
    pub fn get_profile(&self, user: &User) -> UserProfile {
        UserProfile::from(user)
    }

    pub fn get_user_by_id(&self, id: &str) -> AppResult<UserProfile> {
        self.store.transaction(|s| -> AppResult<UserProfile> {
            let user: User = s.get_by_id(id, &[Relation::Following, Relation::Followers])?;
            Ok(UserProfile::from(&user))
        })
    }

    /// Make `follower_id` follow `following_id`. Following twice changes nothing.
    pub fn follow(&self, following_id: &str, follower_id: &str) -> AppResult<()> {
        if following_id == follower_id {
            return Err(AppError::SelfAction("Unable to follow yourself.".to_string()));
        }

        self.store.transaction(|s| -> AppResult<()> {
            s.append_related(Edge::Followers, following_id, follower_id)?;
            Ok(())
        })?;

        log::info!("User {} follows {}", follower_id, following_id);
        Ok(())
    }

    /// Never fails on a missing edge or a missing target; there is nothing to undo.
    pub fn unfollow(&self, following_id: &str, follower_id: &str) -> AppResult<()> {
        self.store.transaction(|s| -> AppResult<()> {
            match s.remove_related(Edge::Followers, following_id, follower_id) {
                Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })?;

        log::info!("User {} unfollowed {}", follower_id, following_id);
        Ok(())
    }
}
