use async_trait::async_trait;
use reqwest::Method;

use plaza_types::api::{NewComment, NewPost, PageQuery, SharePost};
use plaza_types::{Comment, CommentId, Page, Post, PostId, Reaction, ReactionId};

use crate::client::RestClient;
use crate::error::ApiError;

/// Posts, comments, reactions and shares.
#[async_trait]
pub trait FeedApi: Send + Sync {
    async fn fetch_posts(&self, page_index: u32) -> Result<Page<Post>, ApiError>;

    async fn fetch_post(&self, post_id: PostId) -> Result<Post, ApiError>;

    async fn create_post(&self, body: &str) -> Result<(), ApiError>;

    async fn delete_post(&self, post_id: PostId) -> Result<(), ApiError>;

    async fn share_post(&self, post_id: PostId, caption: &str) -> Result<(), ApiError>;

    async fn fetch_comments(&self, post_id: PostId, page_index: u32) -> Result<Page<Comment>, ApiError>;

    async fn add_comment(&self, post_id: PostId, body: &str) -> Result<(), ApiError>;

    async fn delete_comment(&self, comment_id: CommentId) -> Result<(), ApiError>;

    /// Likes a post. The returned reaction id is what a later unlike sends back.
    async fn react(&self, post_id: PostId) -> Result<Reaction, ApiError>;

    async fn unreact(&self, reaction_id: ReactionId) -> Result<(), ApiError>;

    async fn fetch_reactions(&self, post_id: PostId, page_index: u32) -> Result<Page<Reaction>, ApiError>;
}

#[async_trait]
impl FeedApi for RestClient {
    async fn fetch_posts(&self, page_index: u32) -> Result<Page<Post>, ApiError> {
        let req = self.request(Method::GET, "/posts").query(&PageQuery { page_index });
        self.fetch(req).await
    }

    async fn fetch_post(&self, post_id: PostId) -> Result<Post, ApiError> {
        self.fetch(self.request(Method::GET, &format!("/posts/{}", post_id))).await
    }

    async fn create_post(&self, body: &str) -> Result<(), ApiError> {
        let req = self
            .request(Method::POST, "/posts")
            .json(&NewPost { post_content: body.to_string() });
        self.execute(req).await
    }

    async fn delete_post(&self, post_id: PostId) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, &format!("/posts/{}", post_id))).await
    }

    async fn share_post(&self, post_id: PostId, caption: &str) -> Result<(), ApiError> {
        let req = self
            .request(Method::POST, &format!("/shares/{}", post_id))
            .json(&SharePost { share_caption: caption.to_string() });
        self.execute(req).await
    }

    async fn fetch_comments(&self, post_id: PostId, page_index: u32) -> Result<Page<Comment>, ApiError> {
        let req = self
            .request(Method::GET, &format!("/comments/{}", post_id))
            .query(&PageQuery { page_index });
        self.fetch(req).await
    }

    async fn add_comment(&self, post_id: PostId, body: &str) -> Result<(), ApiError> {
        let req = self
            .request(Method::POST, &format!("/comments/{}", post_id))
            .json(&NewComment { comment_content: body.to_string() });
        self.execute(req).await
    }

    async fn delete_comment(&self, comment_id: CommentId) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, &format!("/comments/{}", comment_id))).await
    }

    async fn react(&self, post_id: PostId) -> Result<Reaction, ApiError> {
        self.fetch(self.request(Method::POST, &format!("/reactions/{}", post_id))).await
    }

    async fn unreact(&self, reaction_id: ReactionId) -> Result<(), ApiError> {
        self.execute(self.request(Method::DELETE, &format!("/reactions/{}", reaction_id))).await
    }

    async fn fetch_reactions(&self, post_id: PostId, page_index: u32) -> Result<Page<Reaction>, ApiError> {
        let req = self
            .request(Method::GET, &format!("/reactions/post/{}", post_id))
            .query(&PageQuery { page_index });
        self.fetch(req).await
    }
}
