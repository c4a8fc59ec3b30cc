use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use plaza_api::FeedApi;
use plaza_gateway::{EventBus, Subscription};
use plaza_types::{Comment, EventKind, Post, PostId, PushEvent, ReactionId, Topic};

use crate::collection::{LiveCollection, load_page};
use crate::cursor::{PageCursor, PageOutcome};
use crate::generation::ViewGeneration;
use crate::notice::NoticeSink;
use crate::optimistic::{BusyClaim, MutationError, Optimistic};

/// The post opened in the details view, with its comment thread.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// Keeps the home feed and the open post consistent with likes and comments,
/// whether they originate locally or from the `reactions` / `comments` topics.
#[derive(Clone)]
pub struct FeedReconciler {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    api: Arc<dyn FeedApi>,
    notices: NoticeSink,
    state: Mutex<FeedState>,
    likes: Optimistic<PostId>,
    detail_view: ViewGeneration,
    submitting: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
}

#[derive(Default)]
struct FeedState {
    posts: LiveCollection<Post>,
    detail: Option<PostDetail>,
}

impl FeedState {
    fn posts(&mut self) -> &mut LiveCollection<Post> {
        &mut self.posts
    }
}

/// Undo record for an unlike.
struct Unliked {
    reaction_id: ReactionId,
    decremented: bool,
}

impl FeedReconciler {
    pub fn new(api: Arc<dyn FeedApi>, notices: NoticeSink) -> Self {
        Self {
            inner: Arc::new(FeedInner {
                api,
                notices,
                state: Mutex::new(FeedState::default()),
                likes: Optimistic::default(),
                detail_view: ViewGeneration::default(),
                submitting: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscribes to the public `reactions` and `comments` topics.
    pub fn attach(&self, bus: &EventBus) {
        let subs = [
            (Topic::reactions(), EventKind::ReactionCreated),
            (Topic::reactions(), EventKind::ReactionRemoved),
            (Topic::comments(), EventKind::CommentCreated),
        ]
        .into_iter()
        .map(|(topic, kind)| {
            let weak: Weak<FeedInner> = Arc::downgrade(&self.inner);
            bus.subscribe(topic, kind, move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_event(event);
                }
            })
        })
        .collect::<Vec<_>>();

        *self.inner.subscriptions.lock() = subs;
        debug!("Feed attached");
    }

    /// Releases the topic subscriptions and invalidates outstanding fetches.
    pub fn detach(&self) {
        let released = std::mem::take(&mut *self.inner.subscriptions.lock());
        drop(released);
        self.inner.detail_view.advance();
        let mut state = self.inner.state.lock();
        state.posts.reset_cursor();
        state.detail = None;
    }

    pub fn apply_event(&self, event: &PushEvent) {
        self.inner.apply_event(event);
    }

    // -- Pagination --

    pub async fn refresh(&self) -> PageOutcome {
        self.request_page(1).await
    }

    /// Drops any outstanding page request and refetches page 1. Used after this
    /// client created or shared a post.
    pub async fn reload(&self) -> PageOutcome {
        self.inner.state.lock().posts.reset_cursor();
        self.request_page(1).await
    }

    /// Infinite-scroll continuation. `None` once the last page is in.
    pub async fn load_more(&self) -> Option<PageOutcome> {
        let next = self.inner.state.lock().posts.cursor().next_page()?;
        Some(self.request_page(next).await)
    }

    pub async fn request_page(&self, page: u32) -> PageOutcome {
        let api = self.inner.api.clone();
        load_page(
            &self.inner.state,
            FeedState::posts,
            page,
            |n| async move { api.fetch_posts(n).await.map(|p| p.map(Post::normalized)) },
            &self.inner.notices,
            "Failed to fetch posts.",
        )
        .await
    }

    // -- Likes --

    pub async fn toggle_like(&self, post_id: PostId) -> Result<(), MutationError> {
        let liked = self
            .inner
            .state
            .lock()
            .posts
            .get(post_id)
            .map(Post::is_liked)
            .ok_or(MutationError::Missing)?;
        if liked { self.unlike(post_id).await } else { self.like(post_id).await }
    }

    pub async fn like(&self, post_id: PostId) -> Result<(), MutationError> {
        let inner = &self.inner;
        let result = inner
            .likes
            .run(
                post_id,
                || {
                    inner
                        .state
                        .lock()
                        .posts
                        .patch(post_id, |post| {
                            if post.liked_by_user {
                                return Err(MutationError::Invalid("post is already liked"));
                            }
                            post.liked_by_user = true;
                            post.like_count += 1;
                            Ok(())
                        })
                        .unwrap_or(Err(MutationError::Missing))
                },
                inner.api.react(post_id),
                |reaction| {
                    inner.state.lock().posts.patch(post_id, |post| {
                        post.user_reaction_id = Some(reaction.id);
                    });
                },
                |()| {
                    inner.state.lock().posts.patch(post_id, |post| {
                        post.liked_by_user = false;
                        post.like_count = post.like_count.saturating_sub(1);
                        post.user_reaction_id = None;
                    });
                },
            )
            .await;

        inner.report(result.map(drop), "Failed to like post.")
    }

    pub async fn unlike(&self, post_id: PostId) -> Result<(), MutationError> {
        let inner = &self.inner;
        if inner.likes.is_pending(post_id) {
            return Err(MutationError::Busy);
        }
        let reaction_id = {
            let state = inner.state.lock();
            let post = state.posts.get(post_id).ok_or(MutationError::Missing)?;
            match (post.liked_by_user, post.user_reaction_id) {
                (true, Some(id)) => id,
                (false, _) => return Err(MutationError::Invalid("post is not liked")),
                (true, None) => {
                    warn!("Post {} is liked but carries no reaction id", post_id);
                    return Err(MutationError::Invalid("reaction id is unknown"));
                }
            }
        };

        let result = inner
            .likes
            .run(
                post_id,
                || {
                    inner
                        .state
                        .lock()
                        .posts
                        .patch(post_id, |post| {
                            if !post.liked_by_user || post.user_reaction_id != Some(reaction_id) {
                                return Err(MutationError::Invalid("post is not liked"));
                            }
                            let decremented = post.like_count > 0;
                            post.like_count = post.like_count.saturating_sub(1);
                            post.liked_by_user = false;
                            post.user_reaction_id = None;
                            Ok(Unliked { reaction_id, decremented })
                        })
                        .unwrap_or(Err(MutationError::Missing))
                },
                inner.api.unreact(reaction_id),
                |_| {},
                |undo| {
                    inner.state.lock().posts.patch(post_id, |post| {
                        post.liked_by_user = true;
                        post.user_reaction_id = Some(undo.reaction_id);
                        if undo.decremented {
                            post.like_count += 1;
                        }
                    });
                },
            )
            .await;

        inner.report(result, "Failed to unlike post.")
    }

    // -- Details view --

    /// Opens the details view for `post_id`. The comment thread is fetched
    /// separately when the post arrives without one.
    pub async fn open_post(&self, post_id: PostId) -> bool {
        let inner = &self.inner;
        let token = inner.detail_view.advance();

        let post = match inner.api.fetch_post(post_id).await {
            Ok(post) => post.normalized(),
            Err(e) => {
                if inner.detail_view.is_current(token) {
                    inner.notices.error(e.user_message("Failed to fetch post details."));
                }
                return false;
            }
        };
        if !inner.detail_view.is_current(token) {
            debug!("Post {} details superseded", post_id);
            return false;
        }

        let comments = match post.comments.clone() {
            Some(comments) => comments,
            None => match inner.api.fetch_comments(post_id, 1).await {
                Ok(page) => page.records,
                Err(e) => {
                    warn!("Comments for post {} unavailable: {}", post_id, e);
                    Vec::new()
                }
            },
        };
        if !inner.detail_view.is_current(token) {
            return false;
        }

        inner.state.lock().detail = Some(PostDetail { post, comments });
        true
    }

    pub fn close_post(&self) {
        self.inner.detail_view.advance();
        self.inner.state.lock().detail = None;
    }

    pub async fn submit_comment(&self, body: &str) -> Result<(), MutationError> {
        let inner = &self.inner;
        let body = body.trim();
        if body.is_empty() {
            return Err(MutationError::Invalid("comment is empty"));
        }
        let post_id = inner
            .state
            .lock()
            .detail
            .as_ref()
            .map(|d| d.post.id)
            .ok_or(MutationError::Missing)?;
        let token = inner.detail_view.current();

        if let Err(e) = inner.api.add_comment(post_id, body).await {
            inner.notices.error(e.user_message("Failed to add comment."));
            return Err(e.into());
        }

        match inner.api.fetch_comments(post_id, 1).await {
            Ok(page) if inner.detail_view.is_current(token) => {
                let mut state = inner.state.lock();
                if let Some(detail) = state.detail.as_mut().filter(|d| d.post.id == post_id) {
                    detail.comments = page.records;
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Refetching comments for post {} failed: {}", post_id, e),
        }
        Ok(())
    }

    // -- Posting --

    pub async fn create_post(&self, body: &str) -> Result<(), MutationError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(MutationError::Invalid("post is empty"));
        }
        let api = self.inner.api.clone();
        self.submit(api.create_post(body), "Post created successfully.", "Failed to create post.")
            .await
    }

    pub async fn share_post(&self, post_id: PostId, caption: &str) -> Result<(), MutationError> {
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(MutationError::Invalid("caption is empty"));
        }
        let api = self.inner.api.clone();
        self.submit(api.share_post(post_id, caption), "Post shared successfully.", "Failed to share post.")
            .await
    }

    pub async fn delete_post(&self, post_id: PostId) -> Result<(), MutationError> {
        let inner = &self.inner;
        if let Err(e) = inner.api.delete_post(post_id).await {
            inner.notices.error(e.user_message("Failed to delete post."));
            return Err(e.into());
        }
        let mut state = inner.state.lock();
        state.posts.remove(post_id);
        if state.detail.as_ref().is_some_and(|d| d.post.id == post_id) {
            inner.detail_view.advance();
            state.detail = None;
        }
        info!("Post {} deleted", post_id);
        Ok(())
    }

    async fn submit<F>(&self, call: F, success: &str, failure: &str) -> Result<(), MutationError>
    where
        F: std::future::Future<Output = Result<(), plaza_api::ApiError>>,
    {
        let inner = &self.inner;
        let result = {
            let _claim = BusyClaim::try_claim(&inner.submitting).ok_or(MutationError::Busy)?;
            call.await
        };

        match result {
            Ok(()) => {
                inner.notices.success(success);
                self.reload().await;
                Ok(())
            }
            Err(e) => {
                inner.notices.error(e.user_message(failure));
                Err(e.into())
            }
        }
    }

    // -- Snapshots --

    pub fn posts(&self) -> Vec<Post> {
        self.inner.state.lock().posts.items().to_vec()
    }

    pub fn post(&self, post_id: PostId) -> Option<Post> {
        self.inner.state.lock().posts.get(post_id).cloned()
    }

    pub fn detail(&self) -> Option<PostDetail> {
        self.inner.state.lock().detail.clone()
    }

    pub fn cursor(&self) -> PageCursor {
        *self.inner.state.lock().posts.cursor()
    }

    pub fn is_like_pending(&self, post_id: PostId) -> bool {
        self.inner.likes.is_pending(post_id)
    }
}

impl FeedInner {
    fn apply_event(&self, event: &PushEvent) {
        let mut state = self.state.lock();
        match event {
            PushEvent::ReactionCreated { post_id, like_count }
            | PushEvent::ReactionRemoved { post_id, like_count } => {
                let found = state.posts.patch(*post_id, |post| post.like_count = *like_count);
                if let Some(detail) = state.detail.as_mut().filter(|d| d.post.id == *post_id) {
                    detail.post.like_count = *like_count;
                }
                if found.is_none() {
                    debug!("Reaction for unlisted post {}", post_id);
                }
            }
            PushEvent::CommentCreated { comment, comment_count } => {
                let post_id = comment.post_id;
                state.posts.patch(post_id, |post| {
                    post.comment_count = comment_count.unwrap_or(post.comment_count + 1);
                });
                if let Some(detail) = state.detail.as_mut().filter(|d| d.post.id == post_id) {
                    if !detail.comments.iter().any(|c| c.id == comment.id) {
                        detail.comments.push(comment.clone());
                        detail.post.comment_count =
                            comment_count.unwrap_or(detail.post.comment_count + 1);
                    } else if let Some(count) = comment_count {
                        detail.post.comment_count = *count;
                    }
                }
            }
            other => debug!("Feed ignores {}", other.kind()),
        }
    }

    /// Turns a failed mutation into a notice. Local validation failures stay quiet.
    fn report(&self, result: Result<(), MutationError>, failure: &str) -> Result<(), MutationError> {
        if let Err(MutationError::Api(e)) = &result {
            self.notices.error(e.user_message(failure));
        }
        result
    }
}
