//! Publishing, the personalized feed, and likes.

use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{Post, PostId, PostView, PublishRequest};
use crate::store::{Edge, Store, StoreError};

pub struct PostService {
    store: Arc<Store>,
}

impl PostService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Posts by everyone `viewer_id` follows, most liked first.
    /// The viewer's own posts are never included.
    pub fn list_feed(&self, viewer_id: &str) -> AppResult<Vec<PostView>> {
        let posts = self.store.transaction(|s| -> AppResult<Vec<Post>> {
            Ok(s.feed(viewer_id)?)
        })?;
        Ok(posts.iter().map(PostView::from).collect())
    }

    /// Media ids are stored as given; they are not checked against saved media.
    pub fn publish(&self, author_id: &str, request: &PublishRequest) -> AppResult<PostId> {
        request.validate().map_err(AppError::Validation)?;

        let media_ids = request.medias.iter().map(|id| id.to_string()).collect();
        let mut post = Post::new(author_id, request.text.clone(), media_ids);
        self.store.transaction(|s| -> AppResult<()> {
            s.create(&mut post)?;
            Ok(())
        })?;

        log::info!("User {} published post {}", author_id, post.id);
        Ok(PostId { id: post.id })
    }

    /// Delete a post owned by `requester_id`. A missing post counts as already deleted;
    /// that is decided before ownership, so non-owners learn nothing about absent posts.
    pub fn remove(&self, post_id: &str, requester_id: &str) -> AppResult<()> {
        self.store.transaction(|s| -> AppResult<()> {
            let post: Post = match s.get_by_id(post_id, &[]) {
                Ok(post) => post,
                Err(StoreError::NotFound(_)) => {
                    log::debug!("Post {} already absent", post_id);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            if !post.is_authored_by(requester_id) {
                return Err(AppError::Unauthorized("It's not your post.".to_string()));
            }

            s.delete(&post)?;
            log::info!("User {} deleted post {}", requester_id, post_id);
            Ok(())
        })
    }

    pub fn like(&self, post_id: &str, user_id: &str) -> AppResult<()> {
        self.store.transaction(|s| -> AppResult<()> {
            let post: Post = s.get_by_id(post_id, &[])?;
            if post.is_authored_by(user_id) {
                return Err(AppError::SelfAction("It's your own post.".to_string()));
            }
            s.append_related(Edge::Likes, &post.id, user_id)?;
            Ok(())
        })?;

        log::debug!("User {} likes post {}", user_id, post_id);
        Ok(())
    }

    /// Unlike propagates NotFound for a missing post; removing an absent like is a no-op.
    pub fn unlike(&self, post_id: &str, user_id: &str) -> AppResult<()> {
        self.store.transaction(|s| -> AppResult<()> {
            let post: Post = s.get_by_id(post_id, &[])?;
            s.remove_related(Edge::Likes, &post.id, user_id)?;
            Ok(())
        })?;

        log::debug!("User {} unliked post {}", user_id, post_id);
        Ok(())
    }
}
