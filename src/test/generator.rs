#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::scheduler::{
        DEFAULT_WINDOW_DAYS, compute_window, purge_beyond_window, regenerate_occurrences,
        run_maintenance,
    };
    use crate::test::utils::test_db::{TestDb, TestDbBuilder, parse_date, parse_time};
    use rocket::tokio;

    fn window_fixture() -> TestDbBuilder {
        TestDbBuilder::new()
            .manager("gerente")
            .instructor("prof")
            .center("Praia CT", "gerente", "12345678000195")
            .link("Praia CT", "prof", true, true)
    }

    async fn monday_schedule() -> TestDb {
        window_fixture()
            .schedule(
                "Praia CT",
                "prof",
                "beach volleyball",
                10,
                &[(0, "06:00:00", "07:00:00")],
            )
            .build()
            .await
            .expect("Failed to build test database")
    }

    #[test]
    fn test_compute_window_is_inclusive() {
        let window = compute_window(parse_date("2024-01-01"), 6).expect("Valid window");
        assert_eq!(window.start, parse_date("2024-01-01"));
        assert_eq!(window.end, parse_date("2024-01-07"));
        assert!(window.contains(parse_date("2024-01-01")));
        assert!(window.contains(parse_date("2024-01-07")));
        assert!(!window.contains(parse_date("2024-01-08")));
        assert_eq!(window.dates().count(), 7);
    }

    #[test]
    fn test_compute_window_zero_days_is_single_day() {
        let window = compute_window(parse_date("2024-01-01"), 0).expect("Valid window");
        assert_eq!(window.start, window.end);
        assert_eq!(window.dates().count(), 1);
    }

    #[test]
    fn test_compute_window_rejects_negative_days() {
        let result = compute_window(parse_date("2024-01-01"), -1);
        match result {
            Err(AppError::InvalidWindow(days)) => assert_eq!(days, -1),
            other => panic!("Expected InvalidWindow, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_regenerate_single_monday_slot() {
        let test_db = monday_schedule().await;
        let schedule_id = test_db.schedule_id("beach volleyball").unwrap();

        // 2024-01-01 is a Monday; a 7-day inclusive window holds exactly one.
        let created =
            regenerate_occurrences(&test_db.pool, schedule_id, parse_date("2024-01-01"), 6)
                .await
                .expect("Regeneration failed");

        assert_eq!(created, 1);

        let sessions = test_db.generated_sessions(schedule_id).await.unwrap();
        assert_eq!(sessions.len(), 1);

        let session = &sessions[0];
        assert_eq!(session.date, parse_date("2024-01-01"));
        assert_eq!(session.start_time, parse_time("06:00:00"));
        assert_eq!(session.end_time, parse_time("07:00:00"));
        assert_eq!(session.capacity, 10);
        assert!(session.is_generated);
        assert_eq!(session.source_schedule_id, Some(schedule_id));
    }

    #[tokio::test]
    async fn test_regenerate_preserves_past_sessions() {
        let test_db = monday_schedule().await;
        let schedule_id = test_db.schedule_id("beach volleyball").unwrap();

        // A historical Monday occurrence from an earlier generation run.
        let past_id = test_db
            .insert_generated_session(schedule_id, "2023-12-25", "06:00:00", "07:00:00")
            .await
            .unwrap();

        let created =
            regenerate_occurrences(&test_db.pool, schedule_id, parse_date("2024-01-01"), 6)
                .await
                .expect("Regeneration failed");
        assert_eq!(created, 1);

        let sessions = test_db.generated_sessions(schedule_id).await.unwrap();
        assert_eq!(sessions.len(), 2, "Past session must survive regeneration");
        assert_eq!(sessions[0].id, past_id);
        assert_eq!(sessions[0].date, parse_date("2023-12-25"));
        assert_eq!(sessions[1].date, parse_date("2024-01-01"));
    }

    #[tokio::test]
    async fn test_regenerate_is_idempotent() {
        let test_db = window_fixture()
            .schedule(
                "Praia CT",
                "prof",
                "footvolley",
                8,
                &[(0, "06:00:00", "07:00:00"), (2, "18:00:00", "19:30:00")],
            )
            .build()
            .await
            .expect("Failed to build test database");
        let schedule_id = test_db.schedule_id("footvolley").unwrap();

        let first =
            regenerate_occurrences(&test_db.pool, schedule_id, parse_date("2024-01-01"), 13)
                .await
                .unwrap();
        let after_first: Vec<_> = test_db
            .generated_sessions(schedule_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.date, s.start_time, s.end_time))
            .collect();

        let second =
            regenerate_occurrences(&test_db.pool, schedule_id, parse_date("2024-01-01"), 13)
                .await
                .unwrap();
        let after_second: Vec<_> = test_db
            .generated_sessions(schedule_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| (s.date, s.start_time, s.end_time))
            .collect();

        assert_eq!(first, second);
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn test_regenerate_stays_inside_window() {
        let test_db = window_fixture()
            .schedule(
                "Praia CT",
                "prof",
                "footvolley",
                8,
                &[(0, "06:00:00", "07:00:00"), (2, "18:00:00", "19:30:00")],
            )
            .build()
            .await
            .expect("Failed to build test database");
        let schedule_id = test_db.schedule_id("footvolley").unwrap();

        let start = parse_date("2024-01-01");
        let end = parse_date("2024-01-14");
        let created = regenerate_occurrences(&test_db.pool, schedule_id, start, 13)
            .await
            .unwrap();

        // Mondays 1st/8th, Wednesdays 3rd/10th in the 14-day window.
        assert_eq!(created, 4);

        for session in test_db.generated_sessions(schedule_id).await.unwrap() {
            assert!(session.date >= start, "Occurrence before window start");
            assert!(session.date <= end, "Occurrence after window end");
        }
    }

    #[tokio::test]
    async fn test_regenerate_rejects_negative_window() {
        let test_db = monday_schedule().await;
        let schedule_id = test_db.schedule_id("beach volleyball").unwrap();

        let result =
            regenerate_occurrences(&test_db.pool, schedule_id, parse_date("2024-01-01"), -1).await;

        match result {
            Err(AppError::InvalidWindow(_)) => {}
            other => panic!("Expected InvalidWindow, got {:?}", other.map(|_| ())),
        }

        let sessions = test_db.generated_sessions(schedule_id).await.unwrap();
        assert!(sessions.is_empty(), "Nothing may be created on a bad window");
    }

    #[tokio::test]
    async fn test_regenerate_without_slots_is_noop() {
        let test_db = monday_schedule().await;
        let schedule_id = test_db.schedule_id("beach volleyball").unwrap();

        sqlx::query("DELETE FROM weekly_slots WHERE schedule_id = ?")
            .bind(schedule_id)
            .execute(&test_db.pool)
            .await
            .unwrap();

        let created =
            regenerate_occurrences(&test_db.pool, schedule_id, parse_date("2024-01-01"), 30)
                .await
                .unwrap();

        assert_eq!(created, 0);
        assert!(test_db.generated_sessions(schedule_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_drops_occurrences_of_removed_slot() {
        let test_db = window_fixture()
            .schedule(
                "Praia CT",
                "prof",
                "footvolley",
                8,
                &[(0, "06:00:00", "07:00:00"), (2, "18:00:00", "19:30:00")],
            )
            .build()
            .await
            .expect("Failed to build test database");
        let schedule_id = test_db.schedule_id("footvolley").unwrap();

        regenerate_occurrences(&test_db.pool, schedule_id, parse_date("2024-01-01"), 13)
            .await
            .unwrap();

        // The Wednesday slot goes away; its future occurrences must follow.
        sqlx::query("DELETE FROM weekly_slots WHERE schedule_id = ? AND weekday = 2")
            .bind(schedule_id)
            .execute(&test_db.pool)
            .await
            .unwrap();

        let created =
            regenerate_occurrences(&test_db.pool, schedule_id, parse_date("2024-01-01"), 13)
                .await
                .unwrap();
        assert_eq!(created, 2);

        for session in test_db.generated_sessions(schedule_id).await.unwrap() {
            assert_eq!(session.start_time, parse_time("06:00:00"));
        }
    }

    #[tokio::test]
    async fn test_purge_beyond_window_spares_manual_sessions() {
        let test_db = window_fixture()
            .schedule(
                "Praia CT",
                "prof",
                "beach volleyball",
                10,
                &[(0, "06:00:00", "07:00:00")],
            )
            .session(
                "Praia CT",
                "prof",
                "private lesson",
                "2024-02-26",
                "08:00:00",
                "09:00:00",
                4,
            )
            .build()
            .await
            .expect("Failed to build test database");
        let schedule_id = test_db.schedule_id("beach volleyball").unwrap();

        regenerate_occurrences(
            &test_db.pool,
            schedule_id,
            parse_date("2024-01-01"),
            DEFAULT_WINDOW_DAYS,
        )
        .await
        .unwrap();

        let purged = purge_beyond_window(&test_db.pool, parse_date("2024-01-01"), 7)
            .await
            .unwrap();
        assert!(purged > 0);

        let end = parse_date("2024-01-08");
        for session in test_db.generated_sessions(schedule_id).await.unwrap() {
            assert!(session.date <= end, "Generated session left beyond window");
        }

        // The manual session is far beyond the window and untouched.
        let manual_id = test_db.session_id("private lesson").unwrap();
        let manual = crate::db::get_training_session(&test_db.pool, manual_id)
            .await
            .expect("Manual session must survive the purge");
        assert!(!manual.is_generated);
    }

    #[tokio::test]
    async fn test_run_maintenance_rewindows_all_schedules() {
        let test_db = window_fixture()
            .schedule(
                "Praia CT",
                "prof",
                "beach volleyball",
                10,
                &[(0, "06:00:00", "07:00:00")],
            )
            .schedule(
                "Praia CT",
                "prof",
                "footvolley",
                8,
                &[(5, "09:00:00", "10:00:00")],
            )
            .build()
            .await
            .expect("Failed to build test database");

        let volleyball = test_db.schedule_id("beach volleyball").unwrap();

        // Stale far-future occurrence left behind by an older, wider window.
        test_db
            .insert_generated_session(volleyball, "2024-06-03", "06:00:00", "07:00:00")
            .await
            .unwrap();

        let report = run_maintenance(&test_db.pool, parse_date("2024-01-01"), 7)
            .await
            .expect("Maintenance failed");

        assert_eq!(report.schedules, 2);
        assert_eq!(report.purged, 1);
        // 8-day window from Monday: two Mondays, one Saturday.
        assert_eq!(report.created, 3);

        let end = parse_date("2024-01-08");
        for schedule_id in [volleyball, test_db.schedule_id("footvolley").unwrap()] {
            for session in test_db.generated_sessions(schedule_id).await.unwrap() {
                assert!(session.date <= end);
            }
        }
    }
}
