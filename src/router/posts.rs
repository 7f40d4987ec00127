//! Post endpoints. Mutations are owner-only.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use validator::Validate;

use crate::middleware::AuthContext;
use crate::post::{Post, PostRepository, PostVisibility};
use crate::response::Envelope;
use crate::router::{Pagination, Valid};
use crate::{AppState, ServerError};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PostBody {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters."
    ))]
    title: String,
    #[validate(length(
        min = 1,
        max = 10000,
        message = "Content must be between 1 and 10000 characters."
    ))]
    content: String,
    visibility: Option<PostVisibility>,
}

/// `POST /api/posts`.
pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Valid(body): Valid<PostBody>,
) -> Result<(StatusCode, Json<Envelope<Post>>), ServerError> {
    let post = PostRepository::new(state.db.postgres.clone())
        .insert(
            ctx.user_id,
            &body.title,
            &body.content,
            body.visibility.unwrap_or(PostVisibility::Public),
        )
        .await?;

    tracing::info!(post_id = post.id, user_id = ctx.user_id, "post created");
    Ok((StatusCode::CREATED, Envelope::success(post, "post created")))
}

/// `GET /api/posts`: public feed, newest first.
pub async fn list(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Envelope<Vec<Post>>>, ServerError> {
    let posts = PostRepository::new(state.db.postgres.clone())
        .list_public(pagination.limit(), pagination.offset())
        .await?;

    Ok(Envelope::success(posts, "posts"))
}

/// `GET /api/posts/{post_id}`. Private posts are visible to their owner only.
pub async fn get_one(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(post_id): Path<i64>,
) -> Result<Json<Envelope<Post>>, ServerError> {
    let post = PostRepository::new(state.db.postgres.clone())
        .find_by_id(post_id)
        .await?;

    if post.visibility == PostVisibility::Private
        && post.user_id != ctx.user_id
    {
        return Err(ServerError::Forbidden);
    }

    Ok(Envelope::success(post, "post"))
}

/// `PUT /api/posts/{post_id}`. Owner only.
pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(post_id): Path<i64>,
    Valid(body): Valid<PostBody>,
) -> Result<Json<Envelope<Post>>, ServerError> {
    let posts = PostRepository::new(state.db.postgres.clone());

    let post = posts.find_by_id(post_id).await?;
    if post.user_id != ctx.user_id {
        return Err(ServerError::Forbidden);
    }

    let post = posts
        .update(
            post_id,
            &body.title,
            &body.content,
            body.visibility.unwrap_or(post.visibility),
        )
        .await?;

    Ok(Envelope::success(post, "post updated"))
}

/// `DELETE /api/posts/{post_id}`. Owner only.
pub async fn remove(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(post_id): Path<i64>,
) -> Result<Json<Envelope<()>>, ServerError> {
    let posts = PostRepository::new(state.db.postgres.clone());

    let post = posts.find_by_id(post_id).await?;
    if post.user_id != ctx.user_id {
        return Err(ServerError::Forbidden);
    }

    posts.delete(post_id).await?;
    tracing::info!(post_id, user_id = ctx.user_id, "post deleted");
    Ok(Envelope::success((), "post deleted"))
}
