//! Reading-group endpoints.
//!
//! Group-scoped operations check the caller's membership role instead of
//! plain ownership: creators and admins manage, members read.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use validator::Validate;

use crate::group::{
    GroupMember, GroupRepository, GroupStatus, MemberRepository, MemberRole,
    MemberStatus, ReadingGroup,
};
use crate::middleware::AuthContext;
use crate::response::Envelope;
use crate::router::{Pagination, Valid};
use crate::{AppState, ServerError};

const DEFAULT_MAX_MEMBERS: i32 = 20;

/// Caller must be an active member of the group.
pub(super) async fn require_member(
    members: &MemberRepository,
    group_id: i64,
    user_id: i64,
) -> Result<GroupMember, ServerError> {
    members
        .find_active(group_id, user_id)
        .await?
        .ok_or(ServerError::Forbidden)
}

/// Caller must be an active creator or admin of the group.
pub(super) async fn require_admin(
    members: &MemberRepository,
    group_id: i64,
    user_id: i64,
) -> Result<GroupMember, ServerError> {
    let member = require_member(members, group_id, user_id).await?;
    if !member.role.is_admin() {
        return Err(ServerError::Forbidden);
    }
    Ok(member)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GroupBody {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters."
    ))]
    name: String,
    #[validate(length(max = 2000))]
    description: Option<String>,
    #[validate(range(min = 2, max = 100, message = "maxMembers must be between 2 and 100."))]
    max_members: Option<i32>,
    is_public: Option<bool>,
}

/// `POST /api/reading-groups`: create a group; the creator becomes its
/// first member.
pub async fn create(
    State(state): State<AppState>,
    ctx: AuthContext,
    Valid(body): Valid<GroupBody>,
) -> Result<(StatusCode, Json<Envelope<ReadingGroup>>), ServerError> {
    let groups = GroupRepository::new(state.db.postgres.clone());
    let members = MemberRepository::new(state.db.postgres.clone());

    let group = groups
        .insert(
            ctx.user_id,
            &body.name,
            body.description.as_deref(),
            body.max_members.unwrap_or(DEFAULT_MAX_MEMBERS),
            body.is_public.unwrap_or(true),
        )
        .await?;

    members
        .insert(group.id, ctx.user_id, MemberRole::Creator)
        .await?;

    tracing::info!(group_id = group.id, user_id = ctx.user_id, "group created");
    Ok((StatusCode::CREATED, Envelope::success(group, "group created")))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    page: Option<i64>,
    size: Option<i64>,
    search: Option<String>,
}

/// `GET /api/reading-groups`: public groups, searchable.
pub async fn list(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<Vec<ReadingGroup>>>, ServerError> {
    let pagination = Pagination {
        page: query.page,
        size: query.size,
    };
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let groups = GroupRepository::new(state.db.postgres.clone())
        .list_public(search, pagination.limit(), pagination.offset())
        .await?;

    Ok(Envelope::success(groups, "reading groups"))
}

/// `GET /api/reading-groups/mine`: groups the caller belongs to.
pub async fn mine(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Envelope<Vec<ReadingGroup>>>, ServerError> {
    let groups = GroupRepository::new(state.db.postgres.clone())
        .list_for_user(ctx.user_id)
        .await?;

    Ok(Envelope::success(groups, "reading groups"))
}

/// `GET /api/reading-groups/{group_id}`. Private groups are members-only.
pub async fn get_one(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
) -> Result<Json<Envelope<ReadingGroup>>, ServerError> {
    let group = GroupRepository::new(state.db.postgres.clone())
        .find_by_id(group_id)
        .await?;

    if !group.is_public {
        let members = MemberRepository::new(state.db.postgres.clone());
        require_member(&members, group_id, ctx.user_id).await?;
    }

    Ok(Envelope::success(group, "reading group"))
}

/// `PUT /api/reading-groups/{group_id}`. Admins only.
pub async fn update(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
    Valid(body): Valid<GroupBody>,
) -> Result<Json<Envelope<ReadingGroup>>, ServerError> {
    let groups = GroupRepository::new(state.db.postgres.clone());
    let members = MemberRepository::new(state.db.postgres.clone());

    let group = groups.find_by_id(group_id).await?;
    require_admin(&members, group_id, ctx.user_id).await?;

    let group = groups
        .update(
            group_id,
            &body.name,
            body.description.as_deref(),
            body.max_members.unwrap_or(group.max_members),
            body.is_public.unwrap_or(group.is_public),
        )
        .await?;

    Ok(Envelope::success(group, "group updated"))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinBody {
    #[validate(length(equal = 8, message = "Invite codes are 8 characters."))]
    invite_code: String,
}

/// `POST /api/reading-groups/join`: join by invite code.
pub async fn join(
    State(state): State<AppState>,
    ctx: AuthContext,
    Valid(body): Valid<JoinBody>,
) -> Result<Json<Envelope<ReadingGroup>>, ServerError> {
    let groups = GroupRepository::new(state.db.postgres.clone());
    let members = MemberRepository::new(state.db.postgres.clone());

    let group = groups
        .find_by_invite_code(&body.invite_code)
        .await?
        .ok_or(ServerError::Invalid("invalid invite code"))?;

    let existing = members.find(group.id, ctx.user_id).await?;
    if existing
        .as_ref()
        .is_some_and(|member| member.status == MemberStatus::Active)
    {
        return Err(ServerError::Invalid("already a member of this group"));
    }

    if members.count_active(group.id).await? >= i64::from(group.max_members) {
        return Err(ServerError::Invalid("group is full"));
    }

    match existing {
        Some(member) => {
            members.reactivate(member.id).await?;
        },
        None => {
            members
                .insert(group.id, ctx.user_id, MemberRole::Member)
                .await?;
        },
    }

    tracing::info!(group_id = group.id, user_id = ctx.user_id, "member joined");
    Ok(Envelope::success(group, "joined the group"))
}

/// `GET /api/reading-groups/{group_id}/members`. Members only.
pub async fn members(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
) -> Result<Json<Envelope<Vec<GroupMember>>>, ServerError> {
    let members = MemberRepository::new(state.db.postgres.clone());

    GroupRepository::new(state.db.postgres.clone())
        .find_by_id(group_id)
        .await?;
    require_member(&members, group_id, ctx.user_id).await?;

    let members = members.list_for_group(group_id).await?;
    Ok(Envelope::success(members, "group members"))
}

/// `POST /api/reading-groups/{group_id}/leave`. The creator cannot leave.
pub async fn leave(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
) -> Result<Json<Envelope<()>>, ServerError> {
    let members = MemberRepository::new(state.db.postgres.clone());

    let member = members
        .find_active(group_id, ctx.user_id)
        .await?
        .ok_or(ServerError::Invalid("not a member of this group"))?;

    if member.role == MemberRole::Creator {
        return Err(ServerError::Invalid(
            "the creator cannot leave the group",
        ));
    }

    members.set_status(member.id, MemberStatus::Inactive).await?;
    tracing::info!(group_id, user_id = ctx.user_id, "member left");
    Ok(Envelope::success((), "left the group"))
}

/// `DELETE /api/reading-groups/{group_id}`: archive. Creator only.
pub async fn remove(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
) -> Result<Json<Envelope<()>>, ServerError> {
    let groups = GroupRepository::new(state.db.postgres.clone());

    let group = groups.find_by_id(group_id).await?;
    if group.creator_id != ctx.user_id {
        return Err(ServerError::Forbidden);
    }

    groups.set_status(group_id, GroupStatus::Archived).await?;
    tracing::info!(group_id, user_id = ctx.user_id, "group archived");
    Ok(Envelope::success((), "group deleted"))
}

/// `POST /api/reading-groups/{group_id}/invite-code`: regenerate.
/// Admins only.
pub async fn regenerate_invite_code(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(group_id): Path<i64>,
) -> Result<Json<Envelope<String>>, ServerError> {
    let groups = GroupRepository::new(state.db.postgres.clone());
    let members = MemberRepository::new(state.db.postgres.clone());

    groups.find_by_id(group_id).await?;
    require_admin(&members, group_id, ctx.user_id).await?;

    let invite_code = groups.regenerate_invite_code(group_id).await?;
    Ok(Envelope::success(invite_code, "invite code regenerated"))
}
