//! Monthly book selection. One pick per group and calendar month.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use validator::Validate;

use crate::group::{
    GroupRepository, MemberRepository, MonthlyBook, MonthlyBookRepository,
};
use crate::middleware::AuthContext;
use crate::response::Envelope;
use crate::router::Valid;
use crate::router::groups::{require_admin, require_member};
use crate::{AppState, ServerError};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelectionBody {
    #[validate(range(min = 2000, max = 2200))]
    year: i32,
    #[validate(range(min = 1, max = 12, message = "Month must be between 1 and 12."))]
    month: i32,
    #[validate(length(
        min = 1,
        max = 200,
        message = "Book title must be between 1 and 200 characters."
    ))]
    book_title: String,
    #[validate(length(max = 100))]
    book_author: Option<String>,
    #[validate(length(max = 2000))]
    reason: Option<String>,
}

/// `GET /api/reading-groups/{group_id}/monthly-books`. Members only.
pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
) -> Result<Json<Envelope<Vec<MonthlyBook>>>, ServerError> {
    let members = MemberRepository::new(state.db.postgres.clone());

    GroupRepository::new(state.db.postgres.clone())
        .find_by_id(group_id)
        .await?;
    require_member(&members, group_id, ctx.user_id).await?;

    let books = MonthlyBookRepository::new(state.db.postgres.clone())
        .list_for_group(group_id)
        .await?;

    Ok(Envelope::success(books, "monthly books"))
}

/// `POST /api/reading-groups/{group_id}/monthly-books`: pick or replace
/// the book of one month. Admins only.
pub async fn select(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
    Valid(body): Valid<SelectionBody>,
) -> Result<Json<Envelope<MonthlyBook>>, ServerError> {
    let members = MemberRepository::new(state.db.postgres.clone());

    GroupRepository::new(state.db.postgres.clone())
        .find_by_id(group_id)
        .await?;
    require_admin(&members, group_id, ctx.user_id).await?;

    let book = MonthlyBookRepository::new(state.db.postgres.clone())
        .select(
            group_id,
            body.year,
            body.month,
            &body.book_title,
            body.book_author.as_deref(),
            body.reason.as_deref(),
            ctx.user_id,
        )
        .await?;

    tracing::info!(
        group_id,
        year = body.year,
        month = body.month,
        user_id = ctx.user_id,
        "monthly book selected"
    );
    Ok(Envelope::success(book, "monthly book selected"))
}

#[cfg(test)]
pub(super) mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    use crate::group::MonthlyBook;
    use crate::response::Envelope;
    use crate::router::auth::tests::body_of;
    use crate::*;

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/groups.sql"))]
    async fn test_selection_is_admin_only_and_replaces(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let body = json!({
            "year": 2026, "month": 4,
            "bookTitle": "Piranesi", "bookAuthor": "Susanna Clarke"
        })
        .to_string();

        // Bob is a plain member.
        let response = make_request_as(
            Some(&state),
            app.clone(),
            Method::POST,
            "/api/reading-groups/1/monthly-books",
            body.clone(),
            2,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = make_request(
            Some(&state),
            app.clone(),
            Method::POST,
            "/api/reading-groups/1/monthly-books",
            body,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        // Re-selecting the same month replaces the pick.
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::POST,
            "/api/reading-groups/1/monthly-books",
            json!({"year": 2026, "month": 4, "bookTitle": "The Dispossessed"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = make_request_as(
            Some(&state),
            app,
            Method::GET,
            "/api/reading-groups/1/monthly-books",
            String::default(),
            2,
        )
        .await;
        let envelope: Envelope<Vec<MonthlyBook>> = body_of(response).await;
        let books = envelope.data.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].book_title, "The Dispossessed");
    }
}
