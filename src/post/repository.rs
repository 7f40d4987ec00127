//! Handle database requests for posts and comments.

use sqlx::{Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::post::{Comment, Post, PostVisibility};

const POST_FIELDS: &str = r#"SELECT id, user_id, title, content, visibility,
    created_at, updated_at FROM posts"#;

const COMMENT_FIELDS: &str = r#"SELECT id, post_id, user_id, parent_id,
    content, is_deleted, created_at FROM comments"#;

#[derive(Clone)]
pub struct PostRepository {
    pool: Pool<Postgres>,
}

impl PostRepository {
    /// Create a new [`PostRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a new post.
    pub async fn insert(
        &self,
        user_id: i64,
        title: &str,
        content: &str,
        visibility: PostVisibility,
    ) -> Result<Post> {
        Ok(sqlx::query_as::<_, Post>(
            r#"INSERT INTO posts (user_id, title, content, visibility)
                VALUES ($1, $2, $3, $4)
                RETURNING id, user_id, title, content, visibility,
                    created_at, updated_at"#,
        )
        .bind(user_id)
        .bind(title)
        .bind(content)
        .bind(visibility)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Find a post using the `id` field.
    pub async fn find_by_id(&self, post_id: i64) -> Result<Post> {
        sqlx::query_as::<_, Post>(&format!("{POST_FIELDS} WHERE id = $1"))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("post"))
    }

    /// Public feed, newest first.
    pub async fn list_public(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Post>> {
        Ok(sqlx::query_as::<_, Post>(&format!(
            r#"{POST_FIELDS} WHERE visibility = 'public'
                ORDER BY created_at DESC LIMIT $1 OFFSET $2"#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Update a post's content fields.
    pub async fn update(
        &self,
        post_id: i64,
        title: &str,
        content: &str,
        visibility: PostVisibility,
    ) -> Result<Post> {
        sqlx::query_as::<_, Post>(
            r#"UPDATE posts
                SET title = $1, content = $2, visibility = $3,
                    updated_at = NOW()
                WHERE id = $4
                RETURNING id, user_id, title, content, visibility,
                    created_at, updated_at"#,
        )
        .bind(title)
        .bind(content)
        .bind(visibility)
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("post"))
    }

    /// Delete a post. Comments go with it (`ON DELETE CASCADE`).
    pub async fn delete(&self, post_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct CommentRepository {
    pool: Pool<Postgres>,
}

impl CommentRepository {
    /// Create a new [`CommentRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a comment, optionally as a reply to `parent_id`.
    pub async fn insert(
        &self,
        post_id: i64,
        user_id: i64,
        parent_id: Option<i64>,
        content: &str,
    ) -> Result<Comment> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"INSERT INTO comments (post_id, user_id, parent_id, content)
                VALUES ($1, $2, $3, $4)
                RETURNING id, post_id, user_id, parent_id, content,
                    is_deleted, created_at"#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(parent_id)
        .bind(content)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Find a comment using the `id` field.
    pub async fn find_by_id(&self, comment_id: i64) -> Result<Comment> {
        sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_FIELDS} WHERE id = $1"
        ))
        .bind(comment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("comment"))
    }

    /// Comments of a post, oldest first, replies included.
    pub async fn list_for_post(
        &self,
        post_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(&format!(
            r#"{COMMENT_FIELDS} WHERE post_id = $1
                ORDER BY created_at ASC LIMIT $2 OFFSET $3"#
        ))
        .bind(post_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Soft-delete: blank the content, keep the row for attached replies.
    pub async fn soft_delete(&self, comment_id: i64) -> Result<()> {
        sqlx::query(
            r#"UPDATE comments SET is_deleted = TRUE, content = ''
                WHERE id = $1"#,
        )
        .bind(comment_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
