use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::auth::{AuthUser, DbAuthUser, DbUserSession, Role, UserSession};
use crate::error::AppError;
use crate::models::{
    Center, DbEnrollment, Enrollment, EnrollmentStatus, InstructorLink, RecurringSchedule,
    TrainingSession, WeeklySlot,
};

static TAX_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{14}$").unwrap());

/// A weekday/time-range rule supplied when creating or replacing a
/// schedule's slots.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SlotSpec {
    pub weekday: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

// ---------------------------------------------------------------------------
// Accounts and profiles

#[instrument(skip_all, fields(username, role = %role))]
pub async fn create_account(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: Role,
    display_name: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating new account");

    let existing = sqlx::query("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::validation(
            "username",
            format!("Username '{}' already exists", username),
        ));
    }

    let hashed_password = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

    let mut tx = pool.begin().await?;

    let res = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
        .bind(username)
        .bind(&hashed_password)
        .execute(&mut *tx)
        .await?;
    let user_id = res.last_insert_rowid();

    sqlx::query("INSERT INTO profiles (user_id, role, display_name) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(role.as_str())
        .bind(display_name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(user_id)
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<AuthUser>, AppError> {
    info!("Authenticating user");

    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

    match row {
        Some((id, hashed)) => match bcrypt::verify(password, &hashed) {
            Ok(true) => Ok(Some(get_auth_user(pool, id).await?)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[instrument]
pub async fn get_auth_user(pool: &Pool<Sqlite>, id: i64) -> Result<AuthUser, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbAuthUser>(
        "SELECT u.id, u.username, u.is_superuser,
                p.id AS profile_id, p.role, p.display_name,
                p.phone, p.skill_level, p.certifications
         FROM users u
         LEFT JOIN profiles p ON p.user_id = u.id
         WHERE u.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(AuthUser::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

/// Update the mutable profile fields. The role is never touched here; it is
/// fixed at signup.
#[instrument]
pub async fn update_profile(
    pool: &Pool<Sqlite>,
    user_id: i64,
    display_name: &str,
    phone: &str,
    skill_level: &str,
    certifications: &str,
) -> Result<(), AppError> {
    info!("Updating profile");
    let res = sqlx::query(
        "UPDATE profiles
         SET display_name = ?, phone = ?, skill_level = ?, certifications = ?
         WHERE user_id = ?",
    )
    .bind(display_name)
    .bind(phone)
    .bind(skill_level)
    .bind(certifications)
    .bind(user_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "No profile for user {}",
            user_id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn count_profiles_with_role(pool: &Pool<Sqlite>, role: Role) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM profiles WHERE role = ?")
        .bind(role.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument]
pub async fn count_centers(pool: &Pool<Sqlite>) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM centers")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument]
pub async fn count_sessions_from(pool: &Pool<Sqlite>, date: NaiveDate) -> Result<i64, AppError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM training_sessions WHERE date >= ?")
            .bind(date)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// User sessions (auth tokens)

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ---------------------------------------------------------------------------
// Centers

/// Strip formatting from a tax id and require exactly 14 digits.
pub fn normalize_tax_id(raw: &str) -> Result<String, AppError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if !TAX_ID_RE.is_match(&digits) {
        return Err(AppError::validation(
            "tax_id",
            "Tax id must contain exactly 14 digits",
        ));
    }
    Ok(digits)
}

#[instrument(skip(pool))]
#[allow(clippy::too_many_arguments)]
pub async fn create_center(
    pool: &Pool<Sqlite>,
    manager_id: i64,
    name: &str,
    address: &str,
    contact: &str,
    activities: &str,
    tax_id: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<i64, AppError> {
    info!("Creating center");

    let tax_id = normalize_tax_id(tax_id)?;

    let existing = sqlx::query("SELECT id FROM centers WHERE tax_id = ?")
        .bind(&tax_id)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::validation(
            "tax_id",
            "A center with this tax id already exists",
        ));
    }

    let res = sqlx::query(
        "INSERT INTO centers (name, address, contact, activities, tax_id, manager_id, latitude, longitude)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(address)
    .bind(contact)
    .bind(activities)
    .bind(&tax_id)
    .bind(manager_id)
    .bind(latitude)
    .bind(longitude)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_center(pool: &Pool<Sqlite>, id: i64) -> Result<Center, AppError> {
    info!("Fetching center");
    let row = sqlx::query_as::<_, Center>(
        "SELECT id, name, address, contact, activities, tax_id, manager_id, latitude, longitude
         FROM centers WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(center) => Ok(center),
        _ => Err(AppError::NotFound(format!("Center {} not found", id))),
    }
}

#[instrument]
pub async fn list_centers(pool: &Pool<Sqlite>) -> Result<Vec<Center>, AppError> {
    info!("Listing centers");
    let rows = sqlx::query_as::<_, Center>(
        "SELECT id, name, address, contact, activities, tax_id, manager_id, latitude, longitude
         FROM centers ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument]
pub async fn list_centers_by_manager(
    pool: &Pool<Sqlite>,
    manager_id: i64,
) -> Result<Vec<Center>, AppError> {
    info!("Listing centers by manager");
    let rows = sqlx::query_as::<_, Center>(
        "SELECT id, name, address, contact, activities, tax_id, manager_id, latitude, longitude
         FROM centers WHERE manager_id = ? ORDER BY name",
    )
    .bind(manager_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
#[allow(clippy::too_many_arguments)]
pub async fn update_center(
    pool: &Pool<Sqlite>,
    id: i64,
    name: &str,
    address: &str,
    contact: &str,
    activities: &str,
    tax_id: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> Result<(), AppError> {
    info!("Updating center");

    let tax_id = normalize_tax_id(tax_id)?;

    let existing = sqlx::query("SELECT id FROM centers WHERE tax_id = ? AND id != ?")
        .bind(&tax_id)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::validation(
            "tax_id",
            "A center with this tax id already exists",
        ));
    }

    sqlx::query(
        "UPDATE centers
         SET name = ?, address = ?, contact = ?, activities = ?, tax_id = ?,
             latitude = ?, longitude = ?
         WHERE id = ?",
    )
    .bind(name)
    .bind(address)
    .bind(contact)
    .bind(activities)
    .bind(&tax_id)
    .bind(latitude)
    .bind(longitude)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument]
pub async fn delete_center(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting center");
    sqlx::query("DELETE FROM centers WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Instructor links

/// Link an instructor to a center. Idempotent: an existing link is returned
/// untouched. New links start with no delegated rights.
#[instrument]
pub async fn add_instructor(
    pool: &Pool<Sqlite>,
    center_id: i64,
    instructor_id: i64,
) -> Result<i64, AppError> {
    info!("Linking instructor to center");

    let role: Option<String> =
        sqlx::query_scalar("SELECT role FROM profiles WHERE user_id = ?")
            .bind(instructor_id)
            .fetch_optional(pool)
            .await?;

    match role.as_deref() {
        Some("instructor") => {}
        Some(_) | None => {
            return Err(AppError::validation(
                "instructor",
                "User is not an instructor",
            ));
        }
    }

    if let Some(link) = find_instructor_link(pool, center_id, instructor_id).await? {
        return Ok(link.id);
    }

    let res = sqlx::query(
        "INSERT INTO instructor_links (center_id, instructor_id) VALUES (?, ?)",
    )
    .bind(center_id)
    .bind(instructor_id)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

/// Unlink an instructor from a center. Their recurring schedules there lose
/// their validity with the link, so each one is removed along with its
/// future generated occurrences; past sessions stay.
#[instrument]
pub async fn remove_instructor(
    pool: &Pool<Sqlite>,
    center_id: i64,
    instructor_id: i64,
    today: NaiveDate,
) -> Result<(), AppError> {
    info!("Unlinking instructor from center");

    let schedule_ids = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM recurring_schedules WHERE center_id = ? AND instructor_id = ?",
    )
    .bind(center_id)
    .bind(instructor_id)
    .fetch_all(pool)
    .await?;

    for schedule_id in schedule_ids {
        delete_schedule(pool, schedule_id, today).await?;
    }

    sqlx::query("DELETE FROM instructor_links WHERE center_id = ? AND instructor_id = ?")
        .bind(center_id)
        .bind(instructor_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument]
pub async fn find_instructor_link(
    pool: &Pool<Sqlite>,
    center_id: i64,
    instructor_id: i64,
) -> Result<Option<InstructorLink>, AppError> {
    let row = sqlx::query_as::<_, InstructorLink>(
        "SELECT id, center_id, instructor_id, can_create_session, can_cancel_session
         FROM instructor_links WHERE center_id = ? AND instructor_id = ?",
    )
    .bind(center_id)
    .bind(instructor_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument]
pub async fn get_instructor_link(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<InstructorLink, AppError> {
    let row = sqlx::query_as::<_, InstructorLink>(
        "SELECT id, center_id, instructor_id, can_create_session, can_cancel_session
         FROM instructor_links WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(link) => Ok(link),
        _ => Err(AppError::NotFound(format!(
            "Instructor link {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn update_link_flags(
    pool: &Pool<Sqlite>,
    id: i64,
    can_create_session: bool,
    can_cancel_session: bool,
) -> Result<InstructorLink, AppError> {
    info!("Updating instructor link flags");
    sqlx::query(
        "UPDATE instructor_links SET can_create_session = ?, can_cancel_session = ? WHERE id = ?",
    )
    .bind(can_create_session)
    .bind(can_cancel_session)
    .bind(id)
    .execute(pool)
    .await?;

    get_instructor_link(pool, id).await
}

#[instrument(skip(pool, actor), fields(username = %actor.username))]
pub async fn list_instructor_links(
    pool: &Pool<Sqlite>,
    actor: &AuthUser,
) -> Result<Vec<InstructorLink>, AppError> {
    info!("Listing instructor links");

    const COLS: &str =
        "SELECT id, center_id, instructor_id, can_create_session, can_cancel_session
         FROM instructor_links";

    let rows = if actor.is_superuser {
        sqlx::query_as::<_, InstructorLink>(&format!("{} ORDER BY id", COLS))
            .fetch_all(pool)
            .await?
    } else {
        match actor.role() {
            Some(Role::Manager) => {
                sqlx::query_as::<_, InstructorLink>(&format!(
                    "{} WHERE center_id IN (SELECT id FROM centers WHERE manager_id = ?) ORDER BY id",
                    COLS
                ))
                .bind(actor.id)
                .fetch_all(pool)
                .await?
            }
            Some(Role::Instructor) => {
                sqlx::query_as::<_, InstructorLink>(&format!(
                    "{} WHERE instructor_id = ? ORDER BY id",
                    COLS
                ))
                .bind(actor.id)
                .fetch_all(pool)
                .await?
            }
            _ => Vec::new(),
        }
    };

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Recurring schedules and weekly slots

fn validate_slot(slot: &SlotSpec) -> Result<(), AppError> {
    if !(0..=6).contains(&slot.weekday) {
        return Err(AppError::validation(
            "weekday",
            "Weekday must be between 0 (Monday) and 6 (Sunday)",
        ));
    }
    if slot.end_time <= slot.start_time {
        return Err(AppError::validation(
            "end_time",
            "End time must be after start time",
        ));
    }
    Ok(())
}

async fn insert_slots(
    conn: &mut SqliteConnection,
    schedule_id: i64,
    slots: &[SlotSpec],
) -> Result<(), AppError> {
    for slot in slots {
        validate_slot(slot)?;
        sqlx::query(
            "INSERT INTO weekly_slots (schedule_id, weekday, start_time, end_time)
             VALUES (?, ?, ?, ?)",
        )
        .bind(schedule_id)
        .bind(slot.weekday)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if crate::error::is_unique_violation(&e) {
                AppError::validation("slots", "Duplicate weekday/time slot")
            } else {
                AppError::from(e)
            }
        })?;
    }
    Ok(())
}

#[instrument(skip(pool, slots))]
#[allow(clippy::too_many_arguments)]
pub async fn create_schedule(
    pool: &Pool<Sqlite>,
    center_id: i64,
    instructor_id: i64,
    activity: &str,
    capacity: i64,
    skill_level: &str,
    notes: &str,
    slots: &[SlotSpec],
) -> Result<i64, AppError> {
    info!("Creating recurring schedule");

    if slots.is_empty() {
        return Err(AppError::validation(
            "slots",
            "At least one weekday/time slot is required",
        ));
    }
    if capacity <= 0 {
        return Err(AppError::validation("capacity", "Capacity must be positive"));
    }

    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO recurring_schedules (center_id, instructor_id, activity, capacity, skill_level, notes)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(center_id)
    .bind(instructor_id)
    .bind(activity)
    .bind(capacity)
    .bind(skill_level)
    .bind(notes)
    .execute(&mut *tx)
    .await?;
    let schedule_id = res.last_insert_rowid();

    insert_slots(&mut *tx, schedule_id, slots).await?;

    tx.commit().await?;

    Ok(schedule_id)
}

#[instrument]
pub async fn get_schedule(pool: &Pool<Sqlite>, id: i64) -> Result<RecurringSchedule, AppError> {
    let row = sqlx::query_as::<_, RecurringSchedule>(
        "SELECT id, center_id, instructor_id, activity, capacity, skill_level, notes,
                created_at, updated_at
         FROM recurring_schedules WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(schedule) => Ok(schedule),
        _ => Err(AppError::NotFound(format!("Schedule {} not found", id))),
    }
}

#[instrument(skip(pool, actor), fields(username = %actor.username))]
pub async fn list_schedules(
    pool: &Pool<Sqlite>,
    actor: &AuthUser,
) -> Result<Vec<RecurringSchedule>, AppError> {
    info!("Listing recurring schedules");

    const COLS: &str =
        "SELECT id, center_id, instructor_id, activity, capacity, skill_level, notes,
                created_at, updated_at
         FROM recurring_schedules";

    let rows = if actor.is_superuser {
        sqlx::query_as::<_, RecurringSchedule>(&format!("{} ORDER BY id", COLS))
            .fetch_all(pool)
            .await?
    } else {
        match actor.role() {
            Some(Role::Manager) => {
                sqlx::query_as::<_, RecurringSchedule>(&format!(
                    "{} WHERE center_id IN (SELECT id FROM centers WHERE manager_id = ?) ORDER BY id",
                    COLS
                ))
                .bind(actor.id)
                .fetch_all(pool)
                .await?
            }
            Some(Role::Instructor) => {
                sqlx::query_as::<_, RecurringSchedule>(&format!(
                    "{} WHERE instructor_id = ? ORDER BY id",
                    COLS
                ))
                .bind(actor.id)
                .fetch_all(pool)
                .await?
            }
            _ => Vec::new(),
        }
    };

    Ok(rows)
}

#[instrument]
pub async fn list_all_schedule_ids(pool: &Pool<Sqlite>) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM recurring_schedules ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Update a schedule's template fields, replacing its slot set when a new
/// one is supplied. The caller is responsible for triggering regeneration.
#[instrument(skip(pool, slots))]
#[allow(clippy::too_many_arguments)]
pub async fn update_schedule(
    pool: &Pool<Sqlite>,
    id: i64,
    instructor_id: i64,
    activity: &str,
    capacity: i64,
    skill_level: &str,
    notes: &str,
    slots: Option<&[SlotSpec]>,
) -> Result<(), AppError> {
    info!("Updating recurring schedule");

    if capacity <= 0 {
        return Err(AppError::validation("capacity", "Capacity must be positive"));
    }
    if let Some(slots) = slots {
        if slots.is_empty() {
            return Err(AppError::validation(
                "slots",
                "At least one weekday/time slot is required",
            ));
        }
    }

    let now = Utc::now().naive_utc();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE recurring_schedules
         SET instructor_id = ?, activity = ?, capacity = ?, skill_level = ?, notes = ?,
             updated_at = ?
         WHERE id = ?",
    )
    .bind(instructor_id)
    .bind(activity)
    .bind(capacity)
    .bind(skill_level)
    .bind(notes)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if let Some(slots) = slots {
        sqlx::query("DELETE FROM weekly_slots WHERE schedule_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_slots(&mut *tx, id, slots).await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Delete a schedule together with its future generated occurrences. Past
/// occurrences are kept; the FK nulls their source reference.
#[instrument]
pub async fn delete_schedule(
    pool: &Pool<Sqlite>,
    id: i64,
    today: NaiveDate,
) -> Result<(), AppError> {
    info!("Deleting recurring schedule");

    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM training_sessions WHERE source_schedule_id = ? AND date >= ?",
    )
    .bind(id)
    .bind(today)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM recurring_schedules WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

#[instrument]
pub async fn get_weekly_slots(
    pool: &Pool<Sqlite>,
    schedule_id: i64,
) -> Result<Vec<WeeklySlot>, AppError> {
    let rows = sqlx::query_as::<_, WeeklySlot>(
        "SELECT id, schedule_id, weekday, start_time, end_time
         FROM weekly_slots WHERE schedule_id = ?
         ORDER BY weekday, start_time",
    )
    .bind(schedule_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Training sessions

const SESSION_COLS: &str =
    "SELECT id, center_id, instructor_id, activity, date, start_time, end_time,
            capacity, skill_level, notes, is_generated, source_schedule_id
     FROM training_sessions";

#[instrument(skip(pool))]
#[allow(clippy::too_many_arguments)]
pub async fn create_training_session(
    pool: &Pool<Sqlite>,
    center_id: i64,
    instructor_id: i64,
    activity: &str,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    capacity: i64,
    skill_level: &str,
    notes: &str,
) -> Result<i64, AppError> {
    info!("Creating training session");

    if end_time <= start_time {
        return Err(AppError::validation(
            "end_time",
            "End time must be after start time",
        ));
    }
    if capacity <= 0 {
        return Err(AppError::validation("capacity", "Capacity must be positive"));
    }

    let res = sqlx::query(
        "INSERT INTO training_sessions
             (center_id, instructor_id, activity, date, start_time, end_time,
              capacity, skill_level, notes, is_generated, source_schedule_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE, NULL)",
    )
    .bind(center_id)
    .bind(instructor_id)
    .bind(activity)
    .bind(date)
    .bind(start_time)
    .bind(end_time)
    .bind(capacity)
    .bind(skill_level)
    .bind(notes)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_training_session(
    pool: &Pool<Sqlite>,
    id: i64,
) -> Result<TrainingSession, AppError> {
    let row = sqlx::query_as::<_, TrainingSession>(&format!("{} WHERE id = ?", SESSION_COLS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(session) => Ok(session),
        _ => Err(AppError::NotFound(format!("Session {} not found", id))),
    }
}

#[derive(Debug, Default, Clone)]
pub struct SessionFilter {
    pub center: Option<i64>,
    pub date_max: Option<NaiveDate>,
}

/// Scoped session listing. Only future sessions (relative to `today`) are
/// visible through this path; students browse the whole future catalog,
/// managers and instructors see their own, profile-less users see nothing.
#[instrument(skip(pool, actor), fields(username = %actor.username))]
pub async fn list_training_sessions(
    pool: &Pool<Sqlite>,
    actor: &AuthUser,
    filter: &SessionFilter,
    today: NaiveDate,
) -> Result<Vec<TrainingSession>, AppError> {
    info!("Listing training sessions");

    if !actor.is_superuser && actor.profile.is_none() {
        return Ok(Vec::new());
    }

    let mut sql = format!("{} WHERE date >= ?", SESSION_COLS);
    if filter.center.is_some() {
        sql.push_str(" AND center_id = ?");
    }
    if filter.date_max.is_some() {
        sql.push_str(" AND date <= ?");
    }
    if !actor.is_superuser {
        match actor.role() {
            Some(Role::Manager) => {
                sql.push_str(" AND center_id IN (SELECT id FROM centers WHERE manager_id = ?)");
            }
            Some(Role::Instructor) => sql.push_str(" AND instructor_id = ?"),
            _ => {}
        }
    }
    sql.push_str(" ORDER BY date, start_time");

    let mut query = sqlx::query_as::<_, TrainingSession>(&sql).bind(today);
    if let Some(center) = filter.center {
        query = query.bind(center);
    }
    if let Some(date_max) = filter.date_max {
        query = query.bind(date_max);
    }
    if !actor.is_superuser {
        match actor.role() {
            Some(Role::Manager) | Some(Role::Instructor) => {
                query = query.bind(actor.id);
            }
            _ => {}
        }
    }

    Ok(query.fetch_all(pool).await?)
}

/// Public catalog of a center's upcoming sessions.
#[instrument]
pub async fn list_center_sessions(
    pool: &Pool<Sqlite>,
    center_id: i64,
    today: NaiveDate,
) -> Result<Vec<TrainingSession>, AppError> {
    info!("Listing center sessions");
    let rows = sqlx::query_as::<_, TrainingSession>(&format!(
        "{} WHERE center_id = ? AND date >= ? ORDER BY date, start_time",
        SESSION_COLS
    ))
    .bind(center_id)
    .bind(today)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip(pool))]
#[allow(clippy::too_many_arguments)]
pub async fn update_training_session(
    pool: &Pool<Sqlite>,
    id: i64,
    activity: &str,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    capacity: i64,
    skill_level: &str,
    notes: &str,
) -> Result<(), AppError> {
    info!("Updating training session");

    if end_time <= start_time {
        return Err(AppError::validation(
            "end_time",
            "End time must be after start time",
        ));
    }
    if capacity <= 0 {
        return Err(AppError::validation("capacity", "Capacity must be positive"));
    }

    sqlx::query(
        "UPDATE training_sessions
         SET activity = ?, date = ?, start_time = ?, end_time = ?,
             capacity = ?, skill_level = ?, notes = ?
         WHERE id = ?",
    )
    .bind(activity)
    .bind(date)
    .bind(start_time)
    .bind(end_time)
    .bind(capacity)
    .bind(skill_level)
    .bind(notes)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument]
pub async fn delete_training_session(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting training session");
    sqlx::query("DELETE FROM training_sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Enrollments

const ENROLLMENT_COLS: &str =
    "SELECT id, session_id, student_id, status, created_at FROM enrollments";

/// Capacity of a session, read on a connection so enrollment checks stay in
/// their transaction.
pub async fn session_capacity(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> Result<i64, AppError> {
    let capacity: Option<i64> =
        sqlx::query_scalar("SELECT capacity FROM training_sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(conn)
            .await?;

    capacity.ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))
}

/// Count of seat-holding enrollments. Runs on a connection so callers can
/// keep the read inside the same transaction as the subsequent write.
pub async fn count_active_enrollments(
    conn: &mut SqliteConnection,
    session_id: i64,
) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM enrollments
         WHERE session_id = ? AND status IN ('CONFIRMED', 'PENDING')",
    )
    .bind(session_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

#[instrument]
pub async fn seats_taken(pool: &Pool<Sqlite>, session_id: i64) -> Result<i64, AppError> {
    let mut conn = pool.acquire().await?;
    count_active_enrollments(&mut *conn, session_id).await
}

#[instrument]
pub async fn get_enrollment(pool: &Pool<Sqlite>, id: i64) -> Result<Enrollment, AppError> {
    let row = sqlx::query_as::<_, DbEnrollment>(&format!("{} WHERE id = ?", ENROLLMENT_COLS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(enrollment) => Ok(Enrollment::from(enrollment)),
        _ => Err(AppError::NotFound(format!("Enrollment {} not found", id))),
    }
}

pub async fn find_enrollment(
    conn: &mut SqliteConnection,
    session_id: i64,
    student_id: i64,
) -> Result<Option<Enrollment>, AppError> {
    let row = sqlx::query_as::<_, DbEnrollment>(&format!(
        "{} WHERE session_id = ? AND student_id = ?",
        ENROLLMENT_COLS
    ))
    .bind(session_id)
    .bind(student_id)
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Enrollment::from))
}

pub async fn insert_enrollment(
    conn: &mut SqliteConnection,
    session_id: i64,
    student_id: i64,
    status: EnrollmentStatus,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO enrollments (session_id, student_id, status) VALUES (?, ?, ?)",
    )
    .bind(session_id)
    .bind(student_id)
    .bind(status.as_str())
    .execute(conn)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn set_enrollment_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: EnrollmentStatus,
) -> Result<(), AppError> {
    sqlx::query("UPDATE enrollments SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct EnrollmentFilter {
    pub session: Option<i64>,
    pub status: Option<EnrollmentStatus>,
}

#[instrument(skip(pool, actor), fields(username = %actor.username))]
pub async fn list_enrollments(
    pool: &Pool<Sqlite>,
    actor: &AuthUser,
    filter: &EnrollmentFilter,
) -> Result<Vec<Enrollment>, AppError> {
    info!("Listing enrollments");

    if !actor.is_superuser && actor.profile.is_none() {
        return Ok(Vec::new());
    }

    let mut sql = format!("{} WHERE 1 = 1", ENROLLMENT_COLS);
    if filter.session.is_some() {
        sql.push_str(" AND session_id = ?");
    }
    if filter.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if !actor.is_superuser {
        match actor.role() {
            Some(Role::Student) => sql.push_str(" AND student_id = ?"),
            Some(Role::Instructor) => {
                sql.push_str(
                    " AND session_id IN (SELECT id FROM training_sessions WHERE instructor_id = ?)",
                );
            }
            Some(Role::Manager) => {
                sql.push_str(
                    " AND session_id IN (SELECT s.id FROM training_sessions s
                       JOIN centers c ON c.id = s.center_id WHERE c.manager_id = ?)",
                );
            }
            None => return Ok(Vec::new()),
        }
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut query = sqlx::query_as::<_, DbEnrollment>(&sql);
    if let Some(session) = filter.session {
        query = query.bind(session);
    }
    if let Some(status) = filter.status {
        query = query.bind(status.as_str());
    }
    if !actor.is_superuser {
        query = query.bind(actor.id);
    }

    let rows = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(Enrollment::from).collect())
}

#[instrument]
pub async fn list_session_enrollments(
    pool: &Pool<Sqlite>,
    session_id: i64,
) -> Result<Vec<Enrollment>, AppError> {
    info!("Listing session enrollments");
    let rows = sqlx::query_as::<_, DbEnrollment>(&format!(
        "{} WHERE session_id = ? ORDER BY created_at DESC",
        ENROLLMENT_COLS
    ))
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Enrollment::from).collect())
}

#[instrument]
pub async fn delete_enrollment(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting enrollment");
    sqlx::query("DELETE FROM enrollments WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
