#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod database;
mod db;
mod enrollment;
mod env;
mod error;
mod models;
mod scheduler;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use api::{
    api_add_instructor, api_cancel_enrollment, api_center_sessions, api_confirm_enrollment,
    api_create_center, api_create_enrollment, api_create_schedule, api_create_session,
    api_delete_center, api_delete_enrollment, api_delete_schedule, api_delete_session,
    api_get_center, api_get_session, api_list_centers, api_list_enrollments, api_list_links,
    api_list_schedules, api_list_sessions, api_login, api_logout, api_me, api_me_unauthorized,
    api_metrics, api_my_centers, api_remove_instructor, api_run_maintenance,
    api_session_enrollments, api_signup, api_update_center, api_update_link, api_update_profile,
    api_update_schedule, api_update_session, health,
};
use auth::{forbidden_api, unauthorized_api};
use db::clean_expired_sessions;
use rocket::{Build, Rocket, tokio};
use scheduler::DEFAULT_WINDOW_DAYS;
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing, shutdown_telemetry};
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());

    let pool = SqlitePool::connect(&database_url)
        .await
        .expect("Failed to connect to SQLite database");

    info!("Applying database schema...");
    match database::apply_schema(&pool).await {
        Ok(_) => info!("Schema applied successfully"),
        Err(e) => {
            error!("Failed to apply schema: {}", e);
            panic!("Database schema apply failed: {}", e);
        }
    }

    let session_pool = pool.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&session_pool).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    // Keeps the booking horizon a fixed rolling window: purge generated
    // sessions beyond it, regenerate every schedule into it.
    let maintenance_pool = pool.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;

        loop {
            let today = chrono::Local::now().date_naive();
            match scheduler::run_maintenance(&maintenance_pool, today, DEFAULT_WINDOW_DAYS).await {
                Ok(report) => {
                    if report.purged > 0 || report.created > 0 {
                        info!(
                            "Maintenance: purged {}, created {} across {} schedules",
                            report.purged, report.created, report.schedules
                        );
                    }
                }
                Err(e) => {
                    error!("Maintenance pass failed: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(24 * 3600)).await;
        }
    });

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting beach training scheduler");

    rocket::build()
        .manage(pool)
        .mount(
            "/api",
            routes![
                api_signup,
                api_login,
                api_logout,
                api_me,
                api_me_unauthorized,
                api_update_profile,
                api_metrics,
                api_list_centers,
                api_my_centers,
                api_get_center,
                api_create_center,
                api_update_center,
                api_delete_center,
                api_center_sessions,
                api_add_instructor,
                api_remove_instructor,
                api_list_links,
                api_update_link,
                api_list_schedules,
                api_create_schedule,
                api_update_schedule,
                api_delete_schedule,
                api_list_sessions,
                api_get_session,
                api_create_session,
                api_update_session,
                api_delete_session,
                api_session_enrollments,
                api_list_enrollments,
                api_create_enrollment,
                api_confirm_enrollment,
                api_cancel_enrollment,
                api_delete_enrollment,
                api_run_maintenance,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(rocket::fairing::AdHoc::on_shutdown("Telemetry shutdown", |_| {
            Box::pin(async {
                shutdown_telemetry();
            })
        }))
}
