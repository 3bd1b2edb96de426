use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::db;
use crate::error::{AppError, is_unique_violation};
use crate::models::{Enrollment, EnrollmentStatus};

/// Enroll a student into a session, reusing a previously canceled row when
/// one exists. The existence check, the seat count and the write all run in
/// one transaction so two concurrent enrollments cannot both take the last
/// seat. A unique-constraint race that slips through anyway is retried
/// exactly once before surfacing as a duplicate-enrollment failure.
#[instrument(skip(pool))]
pub async fn enroll_student(
    pool: &Pool<Sqlite>,
    session_id: i64,
    student_id: i64,
) -> Result<Enrollment, AppError> {
    match try_enroll(pool, session_id, student_id).await {
        Err(AppError::Database(err)) if is_unique_violation(&err) => {
            warn!(session_id, student_id, "Enrollment insert lost a race, retrying once");
            try_enroll(pool, session_id, student_id)
                .await
                .map_err(|e| match e {
                    AppError::Database(err) if is_unique_violation(&err) => {
                        duplicate_enrollment()
                    }
                    other => other,
                })
        }
        other => other,
    }
}

fn duplicate_enrollment() -> AppError {
    AppError::validation("student", "You are already enrolled in this session")
}

fn session_full() -> AppError {
    AppError::validation("session", "No seats available for this session")
}

async fn try_enroll(
    pool: &Pool<Sqlite>,
    session_id: i64,
    student_id: i64,
) -> Result<Enrollment, AppError> {
    let mut tx = pool.begin().await?;

    let capacity = db::session_capacity(&mut *tx, session_id).await?;

    let existing = db::find_enrollment(&mut *tx, session_id, student_id).await?;
    if let Some(enrollment) = &existing {
        if enrollment.status.is_active() {
            return Err(duplicate_enrollment());
        }
    }

    let active = db::count_active_enrollments(&mut *tx, session_id).await?;
    if active >= capacity {
        return Err(session_full());
    }

    let enrollment_id = match existing {
        Some(enrollment) => {
            db::set_enrollment_status(&mut *tx, enrollment.id, EnrollmentStatus::Confirmed)
                .await?;
            enrollment.id
        }
        None => {
            db::insert_enrollment(&mut *tx, session_id, student_id, EnrollmentStatus::Confirmed)
                .await?
        }
    };

    tx.commit().await?;

    info!(session_id, student_id, "Student enrolled");
    db::get_enrollment(pool, enrollment_id).await
}

/// Confirm an enrollment. Confirming a canceled enrollment is a
/// reactivation and must pass the same seat check as a fresh enrollment;
/// confirming a pending one just flips the status (both already hold a
/// seat).
#[instrument(skip(pool, enrollment), fields(enrollment_id = %enrollment.id))]
pub async fn confirm_enrollment(
    pool: &Pool<Sqlite>,
    enrollment: &Enrollment,
) -> Result<Enrollment, AppError> {
    let mut tx = pool.begin().await?;

    if enrollment.status == EnrollmentStatus::Canceled {
        let capacity = db::session_capacity(&mut *tx, enrollment.session_id).await?;
        let active = db::count_active_enrollments(&mut *tx, enrollment.session_id).await?;
        if active >= capacity {
            return Err(session_full());
        }
    }

    db::set_enrollment_status(&mut *tx, enrollment.id, EnrollmentStatus::Confirmed).await?;

    tx.commit().await?;

    info!("Enrollment confirmed");
    db::get_enrollment(pool, enrollment.id).await
}

/// Cancel an enrollment, freeing its seat. Canceling an already-canceled
/// enrollment is a no-op, not an error.
#[instrument(skip(pool, enrollment), fields(enrollment_id = %enrollment.id))]
pub async fn cancel_enrollment(
    pool: &Pool<Sqlite>,
    enrollment: &Enrollment,
) -> Result<Enrollment, AppError> {
    if enrollment.status == EnrollmentStatus::Canceled {
        return Ok(enrollment.clone());
    }

    {
        let mut conn = pool.acquire().await?;
        db::set_enrollment_status(&mut *conn, enrollment.id, EnrollmentStatus::Canceled).await?;
    }

    info!("Enrollment canceled");
    db::get_enrollment(pool, enrollment.id).await
}
