//! Handle database requests for groups, members, meetings and monthly books.

use rand::Rng;
use sqlx::postgres::PgDatabaseError;
use sqlx::{Error as SQLxError, Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::group::{
    GroupMeeting, GroupMember, GroupStatus, MemberRole, MemberStatus,
    MonthlyBook, ReadingGroup,
};

const INVITE_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const INVITE_CODE_LENGTH: usize = 8;
const INVITE_CODE_UNIQUE_CONSTRAINT: &str = "reading_groups_invite_code_key";

const GROUP_FIELDS: &str = r#"SELECT id, name, description, creator_id,
    max_members, is_public, invite_code, status, created_at, updated_at
    FROM reading_groups"#;

const MEMBER_FIELDS: &str = r#"SELECT id, group_id, user_id, role, status,
    created_at FROM group_members"#;

const MEETING_FIELDS: &str = r#"SELECT id, group_id, title, description,
    meeting_at, location, created_by, created_at, updated_at
    FROM group_meetings"#;

/// Random invite code over A-Z0-9.
fn generate_invite_code() -> String {
    let mut rng = rand::rngs::OsRng;
    (0..INVITE_CODE_LENGTH)
        .map(|_| {
            INVITE_CODE_CHARS[rng.gen_range(0..INVITE_CODE_CHARS.len())]
                as char
        })
        .collect()
}

fn is_invite_code_conflict(err: &SQLxError) -> bool {
    err.as_database_error()
        .and_then(|e| e.try_downcast_ref::<PgDatabaseError>())
        .and_then(|e| e.constraint())
        == Some(INVITE_CODE_UNIQUE_CONSTRAINT)
}

#[derive(Clone)]
pub struct GroupRepository {
    pool: Pool<Postgres>,
}

impl GroupRepository {
    /// Create a new [`GroupRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a new group with a fresh invite code. The code's unique
    /// constraint backstops the generator; collisions retry with a new one.
    pub async fn insert(
        &self,
        creator_id: i64,
        name: &str,
        description: Option<&str>,
        max_members: i32,
        is_public: bool,
    ) -> Result<ReadingGroup> {
        loop {
            let invite_code = generate_invite_code();

            match sqlx::query_as::<_, ReadingGroup>(
                r#"INSERT INTO reading_groups
                    (name, description, creator_id, max_members, is_public,
                        invite_code)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING id, name, description, creator_id, max_members,
                        is_public, invite_code, status, created_at,
                        updated_at"#,
            )
            .bind(name)
            .bind(description)
            .bind(creator_id)
            .bind(max_members)
            .bind(is_public)
            .bind(&invite_code)
            .fetch_one(&self.pool)
            .await
            {
                Ok(group) => return Ok(group),
                Err(err) if is_invite_code_conflict(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Find a group using the `id` field.
    pub async fn find_by_id(&self, group_id: i64) -> Result<ReadingGroup> {
        sqlx::query_as::<_, ReadingGroup>(&format!(
            "{GROUP_FIELDS} WHERE id = $1"
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("reading group"))
    }

    /// Find an active group by its invite code.
    pub async fn find_by_invite_code(
        &self,
        invite_code: &str,
    ) -> Result<Option<ReadingGroup>> {
        Ok(sqlx::query_as::<_, ReadingGroup>(&format!(
            "{GROUP_FIELDS} WHERE invite_code = $1 AND status = 'active'"
        ))
        .bind(invite_code)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Active public groups, newest first, optionally filtered by name.
    pub async fn list_public(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReadingGroup>> {
        Ok(sqlx::query_as::<_, ReadingGroup>(&format!(
            r#"{GROUP_FIELDS}
                WHERE is_public = TRUE AND status = 'active'
                    AND ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%')
                ORDER BY created_at DESC LIMIT $2 OFFSET $3"#
        ))
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Active groups a user belongs to.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<ReadingGroup>> {
        Ok(sqlx::query_as::<_, ReadingGroup>(
            r#"SELECT g.id, g.name, g.description, g.creator_id,
                    g.max_members, g.is_public, g.invite_code, g.status,
                    g.created_at, g.updated_at
                FROM reading_groups g
                JOIN group_members m ON m.group_id = g.id
                WHERE m.user_id = $1 AND m.status = 'active'
                    AND g.status = 'active'
                ORDER BY g.created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Update a group's presentation fields.
    pub async fn update(
        &self,
        group_id: i64,
        name: &str,
        description: Option<&str>,
        max_members: i32,
        is_public: bool,
    ) -> Result<ReadingGroup> {
        sqlx::query_as::<_, ReadingGroup>(
            r#"UPDATE reading_groups
                SET name = $1, description = $2, max_members = $3,
                    is_public = $4, updated_at = NOW()
                WHERE id = $5
                RETURNING id, name, description, creator_id, max_members,
                    is_public, invite_code, status, created_at, updated_at"#,
        )
        .bind(name)
        .bind(description)
        .bind(max_members)
        .bind(is_public)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("reading group"))
    }

    /// Move a group to another lifecycle status.
    pub async fn set_status(
        &self,
        group_id: i64,
        status: GroupStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE reading_groups SET status = $1, updated_at = NOW()
                WHERE id = $2"#,
        )
        .bind(status)
        .bind(group_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Replace the invite code with a fresh one and return it.
    pub async fn regenerate_invite_code(&self, group_id: i64) -> Result<String> {
        loop {
            let invite_code = generate_invite_code();

            match sqlx::query(
                r#"UPDATE reading_groups
                    SET invite_code = $1, updated_at = NOW() WHERE id = $2"#,
            )
            .bind(&invite_code)
            .bind(group_id)
            .execute(&self.pool)
            .await
            {
                Ok(_) => return Ok(invite_code),
                Err(err) if is_invite_code_conflict(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[derive(Clone)]
pub struct MemberRepository {
    pool: Pool<Postgres>,
}

impl MemberRepository {
    /// Create a new [`MemberRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a membership. A `(group, user)` pair exists at most once.
    pub async fn insert(
        &self,
        group_id: i64,
        user_id: i64,
        role: MemberRole,
    ) -> Result<GroupMember> {
        sqlx::query_as::<_, GroupMember>(
            r#"INSERT INTO group_members (group_id, user_id, role)
                VALUES ($1, $2, $3)
                RETURNING id, group_id, user_id, role, status, created_at"#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            let duplicate = err
                .as_database_error()
                .and_then(|e| e.try_downcast_ref::<PgDatabaseError>())
                .and_then(|e| e.constraint())
                == Some("group_members_group_id_user_id_key");
            if duplicate {
                ServerError::Invalid("already a member of this group")
            } else {
                err.into()
            }
        })
    }

    /// Membership row of a user in a group, whatever its status.
    pub async fn find(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>> {
        Ok(sqlx::query_as::<_, GroupMember>(&format!(
            "{MEMBER_FIELDS} WHERE group_id = $1 AND user_id = $2"
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Membership row of a user in a group, only while in force.
    pub async fn find_active(
        &self,
        group_id: i64,
        user_id: i64,
    ) -> Result<Option<GroupMember>> {
        Ok(sqlx::query_as::<_, GroupMember>(&format!(
            r#"{MEMBER_FIELDS} WHERE group_id = $1 AND user_id = $2
                AND status = 'active'"#
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Active members of a group, creator first.
    pub async fn list_for_group(&self, group_id: i64) -> Result<Vec<GroupMember>> {
        Ok(sqlx::query_as::<_, GroupMember>(&format!(
            r#"{MEMBER_FIELDS} WHERE group_id = $1 AND status = 'active'
                ORDER BY role ASC, created_at ASC"#
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Number of active members of a group.
    pub async fn count_active(&self, group_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM group_members
                WHERE group_id = $1 AND status = 'active'"#,
        )
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Move a membership to another status.
    pub async fn set_status(
        &self,
        member_id: i64,
        status: MemberStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE group_members SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(member_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Re-activate a membership row left behind by a leave.
    pub async fn reactivate(&self, member_id: i64) -> Result<GroupMember> {
        sqlx::query_as::<_, GroupMember>(
            r#"UPDATE group_members SET status = 'active', role = 'member'
                WHERE id = $1
                RETURNING id, group_id, user_id, role, status, created_at"#,
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("group member"))
    }
}

#[derive(Clone)]
pub struct MeetingRepository {
    pool: Pool<Postgres>,
}

impl MeetingRepository {
    /// Create a new [`MeetingRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a scheduled meeting.
    pub async fn insert(
        &self,
        group_id: i64,
        created_by: i64,
        title: &str,
        description: Option<&str>,
        meeting_at: chrono::DateTime<chrono::Utc>,
        location: Option<&str>,
    ) -> Result<GroupMeeting> {
        Ok(sqlx::query_as::<_, GroupMeeting>(
            r#"INSERT INTO group_meetings
                (group_id, title, description, meeting_at, location,
                    created_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, group_id, title, description, meeting_at,
                    location, created_by, created_at, updated_at"#,
        )
        .bind(group_id)
        .bind(title)
        .bind(description)
        .bind(meeting_at)
        .bind(location)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Find a meeting using the `id` field.
    pub async fn find_by_id(&self, meeting_id: i64) -> Result<GroupMeeting> {
        sqlx::query_as::<_, GroupMeeting>(&format!(
            "{MEETING_FIELDS} WHERE id = $1"
        ))
        .bind(meeting_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("meeting"))
    }

    /// Meetings of a group, soonest first.
    pub async fn list_for_group(
        &self,
        group_id: i64,
    ) -> Result<Vec<GroupMeeting>> {
        Ok(sqlx::query_as::<_, GroupMeeting>(&format!(
            "{MEETING_FIELDS} WHERE group_id = $1 ORDER BY meeting_at ASC"
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Update a meeting's schedule fields.
    pub async fn update(
        &self,
        meeting_id: i64,
        title: &str,
        description: Option<&str>,
        meeting_at: chrono::DateTime<chrono::Utc>,
        location: Option<&str>,
    ) -> Result<GroupMeeting> {
        sqlx::query_as::<_, GroupMeeting>(
            r#"UPDATE group_meetings
                SET title = $1, description = $2, meeting_at = $3,
                    location = $4, updated_at = NOW()
                WHERE id = $5
                RETURNING id, group_id, title, description, meeting_at,
                    location, created_by, created_at, updated_at"#,
        )
        .bind(title)
        .bind(description)
        .bind(meeting_at)
        .bind(location)
        .bind(meeting_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::NotFound("meeting"))
    }

    /// Delete a meeting.
    pub async fn delete(&self, meeting_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM group_meetings WHERE id = $1")
            .bind(meeting_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct MonthlyBookRepository {
    pool: Pool<Postgres>,
}

impl MonthlyBookRepository {
    /// Create a new [`MonthlyBookRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Select the book of one (group, year, month); replaces a previous
    /// selection for the same month.
    pub async fn select(
        &self,
        group_id: i64,
        year: i32,
        month: i32,
        book_title: &str,
        book_author: Option<&str>,
        reason: Option<&str>,
        selected_by: i64,
    ) -> Result<MonthlyBook> {
        Ok(sqlx::query_as::<_, MonthlyBook>(
            r#"INSERT INTO monthly_books
                (group_id, year, month, book_title, book_author, reason,
                    selected_by)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (group_id, year, month) DO UPDATE
                    SET book_title = EXCLUDED.book_title,
                        book_author = EXCLUDED.book_author,
                        reason = EXCLUDED.reason,
                        selected_by = EXCLUDED.selected_by
                RETURNING id, group_id, year, month, book_title, book_author,
                    reason, selected_by, created_at"#,
        )
        .bind(group_id)
        .bind(year)
        .bind(month)
        .bind(book_title)
        .bind(book_author)
        .bind(reason)
        .bind(selected_by)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Selections of a group, most recent month first.
    pub async fn list_for_group(
        &self,
        group_id: i64,
    ) -> Result<Vec<MonthlyBook>> {
        Ok(sqlx::query_as::<_, MonthlyBook>(
            r#"SELECT id, group_id, year, month, book_title, book_author,
                    reason, selected_by, created_at
                FROM monthly_books WHERE group_id = $1
                ORDER BY year DESC, month DESC"#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
