use anyhow::Error;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use std::fmt;

/// A training-center tenant. Owns sessions and recurring schedules; the
/// owning manager is nullable so a center can outlive its manager account.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Center {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub contact: String,
    pub activities: String,
    pub tax_id: String,
    pub manager_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Delegation record granting an instructor rights scoped to one center.
/// Both flags start false; only the center's manager may flip them.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InstructorLink {
    pub id: i64,
    pub center_id: i64,
    pub instructor_id: i64,
    pub can_create_session: bool,
    pub can_cancel_session: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecurringSchedule {
    pub id: i64,
    pub center_id: i64,
    pub instructor_id: i64,
    pub activity: String,
    pub capacity: i64,
    pub skill_level: String,
    pub notes: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One weekday + time-range rule of a recurring schedule. Weekday is
/// Monday-based (0 = Monday .. 6 = Sunday).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WeeklySlot {
    pub id: i64,
    pub schedule_id: i64,
    pub weekday: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// One concrete dated occurrence students enroll in. When `is_generated` is
/// set the session belongs to its source schedule and direct mutation is
/// rejected.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TrainingSession {
    pub id: i64,
    pub center_id: i64,
    pub instructor_id: i64,
    pub activity: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i64,
    pub skill_level: String,
    pub notes: String,
    pub is_generated: bool,
    pub source_schedule_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Pending,
    Confirmed,
    Canceled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "PENDING",
            EnrollmentStatus::Confirmed => "CONFIRMED",
            EnrollmentStatus::Canceled => "CANCELED",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "PENDING" => Ok(EnrollmentStatus::Pending),
            "CONFIRMED" => Ok(EnrollmentStatus::Confirmed),
            "CANCELED" => Ok(EnrollmentStatus::Canceled),
            _ => Err(Error::msg(format!("Unknown enrollment status: {}", s))),
        }
    }

    /// Active enrollments hold a seat; canceled ones do not.
    pub fn is_active(&self) -> bool {
        !matches!(self, EnrollmentStatus::Canceled)
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub id: i64,
    pub session_id: i64,
    pub student_id: i64,
    pub status: EnrollmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbEnrollment {
    pub id: i64,
    pub session_id: i64,
    pub student_id: i64,
    pub status: String,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbEnrollment> for Enrollment {
    fn from(db: DbEnrollment) -> Self {
        Self {
            id: db.id,
            session_id: db.session_id,
            student_id: db.student_id,
            status: EnrollmentStatus::from_str(&db.status)
                .unwrap_or(EnrollmentStatus::Canceled),
            created_at: db
                .created_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}
