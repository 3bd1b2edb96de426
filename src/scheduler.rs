use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::db;
use crate::error::AppError;

pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Inclusive date range inside which recurring occurrences are materialized.
/// Callers pass the start date explicitly; nothing in here reads the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl GenerationWindow {
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

pub fn compute_window(
    start_date: NaiveDate,
    days_ahead: i64,
) -> Result<GenerationWindow, AppError> {
    if days_ahead < 0 {
        return Err(AppError::InvalidWindow(days_ahead));
    }
    Ok(GenerationWindow {
        start: start_date,
        end: start_date + Duration::days(days_ahead),
    })
}

fn conflict_on_constraint(err: sqlx::Error) -> AppError {
    use sqlx::error::ErrorKind;
    match &err {
        sqlx::Error::Database(db_err)
            if matches!(
                db_err.kind(),
                ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::CheckViolation
                    | ErrorKind::NotNullViolation
            ) =>
        {
            AppError::Conflict(format!("Occurrence generation rejected: {}", db_err))
        }
        _ => AppError::from(err),
    }
}

/// Rebuild a schedule's generated sessions inside the window.
///
/// Everything dated from `start_date` on and tagged to the schedule is
/// deleted and recreated from the current slot set in one transaction, so a
/// reader never observes a partially generated window. Sessions dated before
/// `start_date` are never touched. Returns how many sessions were created.
#[instrument(skip(pool))]
pub async fn regenerate_occurrences(
    pool: &Pool<Sqlite>,
    schedule_id: i64,
    start_date: NaiveDate,
    days_ahead: i64,
) -> Result<u64, AppError> {
    let window = compute_window(start_date, days_ahead)?;

    let schedule = db::get_schedule(pool, schedule_id).await?;
    let slots = db::get_weekly_slots(pool, schedule_id).await?;
    if slots.is_empty() {
        info!(schedule_id, "Schedule has no slots, nothing to generate");
        return Ok(0);
    }

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM training_sessions WHERE source_schedule_id = ? AND date >= ?")
        .bind(schedule_id)
        .bind(window.start)
        .execute(&mut *tx)
        .await?;

    let mut created: u64 = 0;
    for date in window.dates() {
        let weekday = i64::from(date.weekday().num_days_from_monday());
        for slot in slots.iter().filter(|s| s.weekday == weekday) {
            sqlx::query(
                "INSERT INTO training_sessions
                     (center_id, instructor_id, activity, date, start_time, end_time,
                      capacity, skill_level, notes, is_generated, source_schedule_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, TRUE, ?)",
            )
            .bind(schedule.center_id)
            .bind(schedule.instructor_id)
            .bind(&schedule.activity)
            .bind(date)
            .bind(slot.start_time)
            .bind(slot.end_time)
            .bind(schedule.capacity)
            .bind(&schedule.skill_level)
            .bind(&schedule.notes)
            .bind(schedule_id)
            .execute(&mut *tx)
            .await
            .map_err(conflict_on_constraint)?;
            created += 1;
        }
    }

    tx.commit().await?;

    info!(schedule_id, created, "Regenerated schedule occurrences");
    Ok(created)
}

/// Delete every generated session dated beyond the window end, whatever
/// schedule produced it. Manual sessions are left alone.
#[instrument(skip(pool))]
pub async fn purge_beyond_window(
    pool: &Pool<Sqlite>,
    start_date: NaiveDate,
    days_ahead: i64,
) -> Result<u64, AppError> {
    let window = compute_window(start_date, days_ahead)?;

    let result = sqlx::query("DELETE FROM training_sessions WHERE is_generated AND date > ?")
        .bind(window.end)
        .execute(pool)
        .await?;

    let purged = result.rows_affected();
    if purged > 0 {
        info!(purged, "Purged generated sessions beyond the window");
    }
    Ok(purged)
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct MaintenanceReport {
    pub purged: u64,
    pub created: u64,
    pub schedules: u64,
}

/// Rolling-window maintenance: purge stale far-future occurrences, then
/// regenerate every schedule so the booking horizon stays `days_ahead` days
/// deep. Meant to run daily, and exposed to superusers as an API operation.
#[instrument(skip(pool))]
pub async fn run_maintenance(
    pool: &Pool<Sqlite>,
    today: NaiveDate,
    days_ahead: i64,
) -> Result<MaintenanceReport, AppError> {
    let mut report = MaintenanceReport {
        purged: purge_beyond_window(pool, today, days_ahead).await?,
        ..Default::default()
    };

    for schedule_id in db::list_all_schedule_ids(pool).await? {
        let created = regenerate_occurrences(pool, schedule_id, today, days_ahead).await?;
        report.created += created;
        report.schedules += 1;
    }

    info!(
        purged = report.purged,
        created = report.created,
        schedules = report.schedules,
        "Maintenance pass complete"
    );
    Ok(report)
}
