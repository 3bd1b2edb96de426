pub const CURRENT_SCHEMA: &str = r#"
PRAGMA foreign_keys = 1;

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL DEFAULT '',
    is_superuser BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL UNIQUE,
    role TEXT NOT NULL,
    display_name TEXT,
    phone TEXT NOT NULL DEFAULT '',
    skill_level TEXT NOT NULL DEFAULT '',
    certifications TEXT NOT NULL DEFAULT '',
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS centers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    contact TEXT NOT NULL,
    activities TEXT NOT NULL DEFAULT '',
    tax_id TEXT NOT NULL UNIQUE,
    manager_id INTEGER,
    latitude REAL,
    longitude REAL,
    FOREIGN KEY (manager_id) REFERENCES users (id)
);

CREATE TABLE IF NOT EXISTS instructor_links (
    id INTEGER PRIMARY KEY,
    center_id INTEGER NOT NULL,
    instructor_id INTEGER NOT NULL,
    can_create_session BOOLEAN NOT NULL DEFAULT FALSE,
    can_cancel_session BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (center_id, instructor_id),
    FOREIGN KEY (center_id) REFERENCES centers (id) ON DELETE CASCADE,
    FOREIGN KEY (instructor_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS recurring_schedules (
    id INTEGER PRIMARY KEY,
    center_id INTEGER NOT NULL,
    instructor_id INTEGER NOT NULL,
    activity TEXT NOT NULL,
    capacity INTEGER NOT NULL CHECK (capacity > 0),
    skill_level TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (center_id) REFERENCES centers (id) ON DELETE CASCADE,
    FOREIGN KEY (instructor_id) REFERENCES users (id)
);

CREATE TABLE IF NOT EXISTS weekly_slots (
    id INTEGER PRIMARY KEY,
    schedule_id INTEGER NOT NULL,
    weekday INTEGER NOT NULL CHECK (weekday BETWEEN 0 AND 6),
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    CHECK (end_time > start_time),
    UNIQUE (schedule_id, weekday, start_time, end_time),
    FOREIGN KEY (schedule_id) REFERENCES recurring_schedules (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS training_sessions (
    id INTEGER PRIMARY KEY,
    center_id INTEGER NOT NULL,
    instructor_id INTEGER NOT NULL,
    activity TEXT NOT NULL,
    date TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    capacity INTEGER NOT NULL CHECK (capacity > 0),
    skill_level TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    is_generated BOOLEAN NOT NULL DEFAULT FALSE,
    source_schedule_id INTEGER,
    CHECK (end_time > start_time),
    FOREIGN KEY (center_id) REFERENCES centers (id) ON DELETE CASCADE,
    FOREIGN KEY (instructor_id) REFERENCES users (id),
    FOREIGN KEY (source_schedule_id) REFERENCES recurring_schedules (id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS enrollments (
    id INTEGER PRIMARY KEY,
    session_id INTEGER NOT NULL,
    student_id INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'CONFIRMED',
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (session_id, student_id),
    FOREIGN KEY (session_id) REFERENCES training_sessions (id) ON DELETE CASCADE,
    FOREIGN KEY (student_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_sessions (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    token TEXT NOT NULL UNIQUE,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    expires_at TIMESTAMP NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_training_sessions_schedule_date
    ON training_sessions (source_schedule_id, date);
CREATE INDEX IF NOT EXISTS idx_training_sessions_center_date
    ON training_sessions (center_id, date);
CREATE INDEX IF NOT EXISTS idx_enrollments_session
    ON enrollments (session_id);
"#;
