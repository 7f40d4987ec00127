//! Comment endpoints. Deletion is author-only and soft.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use validator::Validate;

use crate::middleware::AuthContext;
use crate::post::{Comment, CommentRepository, PostRepository};
use crate::response::Envelope;
use crate::router::{Pagination, Valid};
use crate::{AppState, ServerError};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Content must be between 1 and 1000 characters."
    ))]
    content: String,
    parent_id: Option<i64>,
}

/// `POST /api/posts/{post_id}/comments`: comment, or reply to one.
pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(post_id): Path<i64>,
    Valid(body): Valid<CommentBody>,
) -> Result<(StatusCode, Json<Envelope<Comment>>), ServerError> {
    let comments = CommentRepository::new(state.db.postgres.clone());

    // The post must exist; 404 beats a dangling foreign key error.
    PostRepository::new(state.db.postgres.clone())
        .find_by_id(post_id)
        .await?;

    if let Some(parent_id) = body.parent_id {
        let parent = comments.find_by_id(parent_id).await?;
        if parent.post_id != post_id {
            return Err(ServerError::Invalid(
                "parent comment belongs to another post",
            ));
        }
    }

    let comment = comments
        .insert(post_id, ctx.user_id, body.parent_id, &body.content)
        .await?;

    tracing::info!(
        comment_id = comment.id,
        post_id,
        user_id = ctx.user_id,
        "comment created"
    );
    Ok((StatusCode::CREATED, Envelope::success(comment, "comment created")))
}

/// `GET /api/posts/{post_id}/comments`: oldest first.
pub async fn list(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Path(post_id): Path<i64>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Envelope<Vec<Comment>>>, ServerError> {
    PostRepository::new(state.db.postgres.clone())
        .find_by_id(post_id)
        .await?;

    let comments = CommentRepository::new(state.db.postgres.clone())
        .list_for_post(post_id, pagination.limit(), pagination.offset())
        .await?;

    Ok(Envelope::success(comments, "comments"))
}

/// `DELETE /api/comments/{comment_id}`. Author only; soft delete.
pub async fn remove(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(comment_id): Path<i64>,
) -> Result<Json<Envelope<()>>, ServerError> {
    let comments = CommentRepository::new(state.db.postgres.clone());

    let comment = comments.find_by_id(comment_id).await?;
    if comment.user_id != ctx.user_id {
        return Err(ServerError::Forbidden);
    }
    if comment.is_deleted {
        return Err(ServerError::Invalid("comment already deleted"));
    }

    comments.soft_delete(comment_id).await?;
    tracing::info!(comment_id, user_id = ctx.user_id, "comment deleted");
    Ok(Envelope::success((), "comment deleted"))
}

#[cfg(test)]
pub(super) mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    use crate::post::Comment;
    use crate::response::Envelope;
    use crate::router::auth::tests::body_of;
    use crate::*;

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/posts.sql"))]
    async fn test_comment_and_reply(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(&state),
            app.clone(),
            Method::POST,
            "/api/posts/1/comments",
            json!({"content": "Agreed!", "parentId": 1}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let envelope: Envelope<Comment> = body_of(response).await;
        assert_eq!(envelope.data.unwrap().parent_id, Some(1));

        // A parent from another post is refused.
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::POST,
            "/api/posts/2/comments",
            json!({"content": "Wrong thread", "parentId": 1}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = make_request(
            Some(&state),
            app,
            Method::GET,
            "/api/posts/1/comments",
            String::default(),
        )
        .await;
        let envelope: Envelope<Vec<Comment>> = body_of(response).await;
        assert_eq!(envelope.data.unwrap().len(), 2);
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/posts.sql"))]
    async fn test_delete_is_author_only(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        // Comment 1 was written by Bob (user 2); Alice may not delete it.
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::DELETE,
            "/api/comments/1",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Still readable, untouched.
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::GET,
            "/api/posts/1/comments",
            String::default(),
        )
        .await;
        let envelope: Envelope<Vec<Comment>> = body_of(response).await;
        let comments = envelope.data.unwrap();
        assert_eq!(comments.len(), 1);
        assert!(!comments[0].is_deleted);
        assert_eq!(comments[0].content, "Great writeup!");

        // The author soft-deletes: the row stays, blanked.
        let response = make_request_as(
            Some(&state),
            app.clone(),
            Method::DELETE,
            "/api/comments/1",
            String::default(),
            2,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request(
            Some(&state),
            app,
            Method::GET,
            "/api/posts/1/comments",
            String::default(),
        )
        .await;
        let envelope: Envelope<Vec<Comment>> = body_of(response).await;
        let comments = envelope.data.unwrap();
        assert_eq!(comments.len(), 1);
        assert!(comments[0].is_deleted);
        assert_eq!(comments[0].content, "");
    }
}
