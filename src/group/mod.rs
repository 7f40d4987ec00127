//! Reading groups: membership, meetings and monthly book selection.

mod repository;

pub use repository::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a reading group. Deleting a group archives it.
#[derive(
    Clone, Copy, Debug, PartialEq, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "group_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Active,
    Archived,
}

/// Role of a member inside one group.
#[derive(
    Clone, Copy, Debug, PartialEq, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "member_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Creator,
    Admin,
    Member,
}

impl MemberRole {
    /// Group-management permission: creators and admins.
    pub fn is_admin(self) -> bool {
        matches!(self, MemberRole::Creator | MemberRole::Admin)
    }
}

/// Whether a membership is currently in force. Leaving a group keeps the
/// row but marks it inactive.
#[derive(
    Clone, Copy, Debug, PartialEq, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "member_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
}

/// Reading group as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReadingGroup {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub creator_id: i64,
    pub max_members: i32,
    pub is_public: bool,
    pub invite_code: String,
    pub status: GroupStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Membership of one user in one group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: i64,
    pub group_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub status: MemberStatus,
    pub created_at: DateTime<Utc>,
}

/// Scheduled gathering of a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupMeeting {
    pub id: i64,
    pub group_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub meeting_at: DateTime<Utc>,
    pub location: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The book a group reads in one calendar month. One row per
/// (group, year, month); re-selecting replaces it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBook {
    pub id: i64,
    pub group_id: i64,
    pub year: i32,
    pub month: i32,
    pub book_title: String,
    pub book_author: Option<String>,
    pub reason: Option<String>,
    pub selected_by: i64,
    pub created_at: DateTime<Utc>,
}
