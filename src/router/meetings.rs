//! Group-meeting endpoints. Scheduling is for group admins.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::group::{GroupMeeting, GroupRepository, MeetingRepository, MemberRepository};
use crate::middleware::AuthContext;
use crate::response::Envelope;
use crate::router::Valid;
use crate::router::groups::{require_admin, require_member};
use crate::{AppState, ServerError};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MeetingBody {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title must be between 1 and 200 characters."
    ))]
    title: String,
    #[validate(length(max = 2000))]
    description: Option<String>,
    meeting_at: DateTime<Utc>,
    #[validate(length(max = 500))]
    location: Option<String>,
}

/// `GET /api/reading-groups/{group_id}/meetings`. Members only.
pub async fn list(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
) -> Result<Json<Envelope<Vec<GroupMeeting>>>, ServerError> {
    let members = MemberRepository::new(state.db.postgres.clone());

    GroupRepository::new(state.db.postgres.clone())
        .find_by_id(group_id)
        .await?;
    require_member(&members, group_id, ctx.user_id).await?;

    let meetings = MeetingRepository::new(state.db.postgres.clone())
        .list_for_group(group_id)
        .await?;

    Ok(Envelope::success(meetings, "meetings"))
}

/// `POST /api/reading-groups/{group_id}/meetings`. Admins only.
pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
    Valid(body): Valid<MeetingBody>,
) -> Result<(StatusCode, Json<Envelope<GroupMeeting>>), ServerError> {
    let members = MemberRepository::new(state.db.postgres.clone());

    GroupRepository::new(state.db.postgres.clone())
        .find_by_id(group_id)
        .await?;
    require_admin(&members, group_id, ctx.user_id).await?;

    let meeting = MeetingRepository::new(state.db.postgres.clone())
        .insert(
            group_id,
            ctx.user_id,
            &body.title,
            body.description.as_deref(),
            body.meeting_at,
            body.location.as_deref(),
        )
        .await?;

    tracing::info!(
        meeting_id = meeting.id,
        group_id,
        user_id = ctx.user_id,
        "meeting scheduled"
    );
    Ok((StatusCode::CREATED, Envelope::success(meeting, "meeting created")))
}

/// `PUT /api/meetings/{meeting_id}`. Admins of the owning group only.
pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(meeting_id): Path<i64>,
    Valid(body): Valid<MeetingBody>,
) -> Result<Json<Envelope<GroupMeeting>>, ServerError> {
    let meetings = MeetingRepository::new(state.db.postgres.clone());
    let members = MemberRepository::new(state.db.postgres.clone());

    let meeting = meetings.find_by_id(meeting_id).await?;
    require_admin(&members, meeting.group_id, ctx.user_id).await?;

    let meeting = meetings
        .update(
            meeting_id,
            &body.title,
            body.description.as_deref(),
            body.meeting_at,
            body.location.as_deref(),
        )
        .await?;

    Ok(Envelope::success(meeting, "meeting updated"))
}

/// `DELETE /api/meetings/{meeting_id}`. Admins of the owning group only.
pub async fn remove(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(meeting_id): Path<i64>,
) -> Result<Json<Envelope<()>>, ServerError> {
    let meetings = MeetingRepository::new(state.db.postgres.clone());
    let members = MemberRepository::new(state.db.postgres.clone());

    let meeting = meetings.find_by_id(meeting_id).await?;
    require_admin(&members, meeting.group_id, ctx.user_id).await?;

    meetings.delete(meeting_id).await?;
    tracing::info!(meeting_id, user_id = ctx.user_id, "meeting deleted");
    Ok(Envelope::success((), "meeting deleted"))
}

#[cfg(test)]
pub(super) mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    use crate::group::GroupMeeting;
    use crate::response::Envelope;
    use crate::router::auth::tests::body_of;
    use crate::*;

    fn meeting_body() -> String {
        json!({
            "title": "April wrap-up",
            "meetingAt": "2026-04-28T19:00:00Z",
            "location": "Riverside library, room 2"
        })
        .to_string()
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/groups.sql"))]
    async fn test_scheduling_is_admin_only(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        // Bob is a plain member of group 1.
        let response = make_request_as(
            Some(&state),
            app.clone(),
            Method::POST,
            "/api/reading-groups/1/meetings",
            meeting_body(),
            2,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // The creator schedules fine.
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::POST,
            "/api/reading-groups/1/meetings",
            meeting_body(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        // Members can read the schedule, outsiders cannot.
        let response = make_request_as(
            Some(&state),
            app.clone(),
            Method::GET,
            "/api/reading-groups/1/meetings",
            String::default(),
            2,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let envelope: Envelope<Vec<GroupMeeting>> = body_of(response).await;
        assert_eq!(envelope.data.unwrap().len(), 1);

        let response = make_request_as(
            Some(&state),
            app,
            Method::GET,
            "/api/reading-groups/1/meetings",
            String::default(),
            3,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql", "../../fixtures/groups.sql"))]
    async fn test_update_and_delete(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(&state),
            app.clone(),
            Method::POST,
            "/api/reading-groups/1/meetings",
            meeting_body(),
        )
        .await;
        let envelope: Envelope<GroupMeeting> = body_of(response).await;
        let meeting = envelope.data.unwrap();

        let path = format!("/api/meetings/{}", meeting.id);
        let response = make_request(
            Some(&state),
            app.clone(),
            Method::PUT,
            &path,
            json!({
                "title": "April wrap-up (moved)",
                "meetingAt": "2026-04-29T19:00:00Z"
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let envelope: Envelope<GroupMeeting> = body_of(response).await;
        assert_eq!(envelope.data.unwrap().title, "April wrap-up (moved)");

        // A plain member may not delete it.
        let response = make_request_as(
            Some(&state),
            app.clone(),
            Method::DELETE,
            &path,
            String::default(),
            2,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response =
            make_request(Some(&state), app, Method::DELETE, &path, String::default())
                .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
