use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("school.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade_level TEXT NOT NULL,
            section TEXT NOT NULL DEFAULT 'A',
            capacity INTEGER NOT NULL DEFAULT 30,
            homeroom_teacher_id TEXT,
            subjects TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_grade ON classes(grade_level)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // Roster membership is a set: the primary key enforces uniqueness.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rosters(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rosters_student ON rosters(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    // One row per (class, student, subject); components are normalized
    // upstream to a comparable scale.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_entries(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            homework REAL NOT NULL DEFAULT 0,
            quiz REAL NOT NULL DEFAULT 0,
            midterm REAL NOT NULL DEFAULT 0,
            final_exam REAL NOT NULL DEFAULT 0,
            updated_at TEXT,
            PRIMARY KEY(class_id, student_id, subject),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_entries_class ON grade_entries(class_id)",
        [],
    )?;

    // Audit trail of commit outcomes. The engine itself stays stateless;
    // this is daemon bookkeeping for the operator.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS rollover_runs(
            id TEXT PRIMARY KEY,
            committed_at TEXT NOT NULL,
            threshold REAL NOT NULL,
            succeeded TEXT NOT NULL,
            failed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
