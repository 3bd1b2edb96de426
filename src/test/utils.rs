#[cfg(test)]
pub mod test_db {
    use crate::auth::{AuthUser, Role};
    use crate::database::apply_schema;
    use crate::db::{
        SlotSpec, add_instructor, create_account, create_center, create_schedule,
        create_training_session, get_auth_user, update_link_flags,
    };
    use crate::error::AppError;
    use crate::models::TrainingSession;
    use chrono::{NaiveDate, NaiveTime};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    static STANDARD_PASSWORD: &str = "password123";

    pub fn parse_time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M:%S").expect("Invalid test time literal")
    }

    pub fn parse_date(s: &str) -> NaiveDate {
        s.parse().expect("Invalid test date literal")
    }

    struct TestUser {
        username: String,
        display_name: Option<String>,
        role: Option<Role>,
        superuser: bool,
    }

    struct TestCenter {
        name: String,
        manager_username: String,
        tax_id: String,
    }

    struct TestLink {
        center: String,
        instructor: String,
        can_create: bool,
        can_cancel: bool,
    }

    struct TestSchedule {
        center: String,
        instructor: String,
        activity: String,
        capacity: i64,
        slots: Vec<(i64, String, String)>,
    }

    struct TestSession {
        center: String,
        instructor: String,
        activity: String,
        date: String,
        start: String,
        end: String,
        capacity: i64,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        centers: Vec<TestCenter>,
        links: Vec<TestLink>,
        schedules: Vec<TestSchedule>,
        sessions: Vec<TestSession>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        fn user(mut self, username: &str, role: Option<Role>, superuser: bool) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                display_name: None,
                role,
                superuser,
            });
            self
        }

        pub fn student(self, username: &str) -> Self {
            self.user(username, Some(Role::Student), false)
        }

        pub fn instructor(self, username: &str) -> Self {
            self.user(username, Some(Role::Instructor), false)
        }

        pub fn manager(self, username: &str) -> Self {
            self.user(username, Some(Role::Manager), false)
        }

        /// An authenticated identity with no profile at all.
        pub fn bare_user(self, username: &str) -> Self {
            self.user(username, None, false)
        }

        pub fn superuser(self, username: &str) -> Self {
            self.user(username, None, true)
        }

        pub fn center(mut self, name: &str, manager_username: &str, tax_id: &str) -> Self {
            self.centers.push(TestCenter {
                name: name.to_string(),
                manager_username: manager_username.to_string(),
                tax_id: tax_id.to_string(),
            });
            self
        }

        pub fn link(
            mut self,
            center: &str,
            instructor: &str,
            can_create: bool,
            can_cancel: bool,
        ) -> Self {
            self.links.push(TestLink {
                center: center.to_string(),
                instructor: instructor.to_string(),
                can_create,
                can_cancel,
            });
            self
        }

        /// Slots are (weekday, "HH:MM:SS", "HH:MM:SS") with Monday = 0.
        pub fn schedule(
            mut self,
            center: &str,
            instructor: &str,
            activity: &str,
            capacity: i64,
            slots: &[(i64, &str, &str)],
        ) -> Self {
            self.schedules.push(TestSchedule {
                center: center.to_string(),
                instructor: instructor.to_string(),
                activity: activity.to_string(),
                capacity,
                slots: slots
                    .iter()
                    .map(|(w, s, e)| (*w, s.to_string(), e.to_string()))
                    .collect(),
            });
            self
        }

        /// A manually created session, keyed by activity in the id map.
        #[allow(clippy::too_many_arguments)]
        pub fn session(
            mut self,
            center: &str,
            instructor: &str,
            activity: &str,
            date: &str,
            start: &str,
            end: &str,
            capacity: i64,
        ) -> Self {
            self.sessions.push(TestSession {
                center: center.to_string(),
                instructor: instructor.to_string(),
                activity: activity.to_string(),
                date: date.to_string(),
                start: start.to_string(),
                end: end.to_string(),
                capacity,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder().is_test(true).try_init();
            });

            // One connection only: every statement in a test must see the
            // same in-memory database.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            apply_schema(&pool).await?;

            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut center_id_map: HashMap<String, i64> = HashMap::new();
            let mut schedule_id_map: HashMap<String, i64> = HashMap::new();
            let mut session_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id = match user.role {
                    Some(role) => {
                        create_account(
                            &pool,
                            &user.username,
                            STANDARD_PASSWORD,
                            role,
                            user.display_name.as_deref(),
                        )
                        .await?
                    }
                    None => {
                        let hashed =
                            bcrypt::hash(STANDARD_PASSWORD, bcrypt::DEFAULT_COST)?;
                        let res =
                            sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
                                .bind(&user.username)
                                .bind(&hashed)
                                .execute(&pool)
                                .await?;
                        res.last_insert_rowid()
                    }
                };

                if user.superuser {
                    sqlx::query("UPDATE users SET is_superuser = TRUE WHERE id = ?")
                        .bind(user_id)
                        .execute(&pool)
                        .await?;
                }

                user_id_map.insert(user.username.clone(), user_id);
            }

            for center in &self.centers {
                let manager_id = user_id_map[&center.manager_username];
                let center_id = create_center(
                    &pool,
                    manager_id,
                    &center.name,
                    "Av. Beira Mar 100",
                    "contact@example.com",
                    "beach volleyball, footvolley",
                    &center.tax_id,
                    None,
                    None,
                )
                .await?;
                center_id_map.insert(center.name.clone(), center_id);
            }

            for link in &self.links {
                let center_id = center_id_map[&link.center];
                let instructor_id = user_id_map[&link.instructor];
                let link_id = add_instructor(&pool, center_id, instructor_id).await?;
                if link.can_create || link.can_cancel {
                    update_link_flags(&pool, link_id, link.can_create, link.can_cancel).await?;
                }
            }

            for schedule in &self.schedules {
                let center_id = center_id_map[&schedule.center];
                let instructor_id = user_id_map[&schedule.instructor];
                let slots: Vec<SlotSpec> = schedule
                    .slots
                    .iter()
                    .map(|(weekday, start, end)| SlotSpec {
                        weekday: *weekday,
                        start_time: parse_time(start),
                        end_time: parse_time(end),
                    })
                    .collect();

                let schedule_id = create_schedule(
                    &pool,
                    center_id,
                    instructor_id,
                    &schedule.activity,
                    schedule.capacity,
                    "open",
                    "",
                    &slots,
                )
                .await?;
                schedule_id_map.insert(schedule.activity.clone(), schedule_id);
            }

            for session in &self.sessions {
                let center_id = center_id_map[&session.center];
                let instructor_id = user_id_map[&session.instructor];
                let session_id = create_training_session(
                    &pool,
                    center_id,
                    instructor_id,
                    &session.activity,
                    parse_date(&session.date),
                    parse_time(&session.start),
                    parse_time(&session.end),
                    session.capacity,
                    "open",
                    "",
                )
                .await?;
                session_id_map.insert(session.activity.clone(), session_id);
            }

            Ok(TestDb {
                pool,
                user_id_map,
                center_id_map,
                schedule_id_map,
                session_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_id_map: HashMap<String, i64>,
        pub center_id_map: HashMap<String, i64>,
        pub schedule_id_map: HashMap<String, i64>,
        pub session_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        pub fn center_id(&self, name: &str) -> Option<i64> {
            self.center_id_map.get(name).copied()
        }

        pub fn schedule_id(&self, activity: &str) -> Option<i64> {
            self.schedule_id_map.get(activity).copied()
        }

        pub fn session_id(&self, activity: &str) -> Option<i64> {
            self.session_id_map.get(activity).copied()
        }

        pub async fn actor(&self, username: &str) -> Result<AuthUser, AppError> {
            let id = self
                .user_id(username)
                .ok_or_else(|| AppError::NotFound(format!("Test user {} missing", username)))?;
            get_auth_user(&self.pool, id).await
        }

        pub async fn generated_sessions(
            &self,
            schedule_id: i64,
        ) -> Result<Vec<TrainingSession>, AppError> {
            let rows = sqlx::query_as::<_, TrainingSession>(
                "SELECT id, center_id, instructor_id, activity, date, start_time, end_time,
                        capacity, skill_level, notes, is_generated, source_schedule_id
                 FROM training_sessions
                 WHERE source_schedule_id = ?
                 ORDER BY date, start_time",
            )
            .bind(schedule_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        /// Insert a generated occurrence directly, bypassing the window.
        /// Used to seed historical or stale far-future rows.
        pub async fn insert_generated_session(
            &self,
            schedule_id: i64,
            date: &str,
            start: &str,
            end: &str,
        ) -> Result<i64, AppError> {
            let res = sqlx::query(
                "INSERT INTO training_sessions
                     (center_id, instructor_id, activity, date, start_time, end_time,
                      capacity, skill_level, notes, is_generated, source_schedule_id)
                 SELECT center_id, instructor_id, activity, ?, ?, ?, capacity, skill_level,
                        notes, TRUE, id
                 FROM recurring_schedules WHERE id = ?",
            )
            .bind(parse_date(date))
            .bind(parse_time(start))
            .bind(parse_time(end))
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;
            Ok(res.last_insert_rowid())
        }
    }
}
