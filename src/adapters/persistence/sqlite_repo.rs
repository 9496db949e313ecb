//! SQLite-backed repository via libsql. Implements the roster, lesson, billing and account ports.
//!
//! All tables share one database file: data/crm.db. Every connection enables foreign keys so
//! deleting a course cascades to its lessons, enrollments and everything below them.
//! The partial unique index on active enrollments backs the service-level duplicate check.

use crate::domain::schedule::{format_schedule, parse_weekday_codes};
use crate::domain::{
    Course, DomainError, Enrollment, EnrollmentDraft, NewCourse, NewStudent, Student, Weekday,
};
use crate::ports::RosterPort;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, Row, Rows, Value, params};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phone TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#,
    r#"
CREATE TABLE IF NOT EXISTS account_roles (
    account_id INTEGER NOT NULL REFERENCES accounts (id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('admin', 'teacher', 'parent')),
    PRIMARY KEY (account_id, role)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    middle_name TEXT NOT NULL DEFAULT '',
    birth_date TEXT,
    guardian_name TEXT NOT NULL DEFAULT '',
    guardian_phone TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#,
    r#"
CREATE TABLE IF NOT EXISTS student_guardians (
    student_id INTEGER NOT NULL REFERENCES students (id) ON DELETE CASCADE,
    guardian_id INTEGER NOT NULL REFERENCES accounts (id) ON DELETE CASCADE,
    UNIQUE (student_id, guardian_id)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS courses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    schedule TEXT NOT NULL DEFAULT '',
    capacity INTEGER,
    teacher_id INTEGER REFERENCES accounts (id) ON DELETE SET NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#,
    r#"
CREATE TABLE IF NOT EXISTS enrollments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL REFERENCES students (id) ON DELETE CASCADE,
    course_id INTEGER NOT NULL REFERENCES courses (id) ON DELETE CASCADE,
    start_date TEXT NOT NULL,
    end_date TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS unique_active_enrollment ON enrollments (student_id, course_id) WHERE is_active = 1",
    r#"
CREATE TABLE IF NOT EXISTS lessons (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    course_id INTEGER NOT NULL REFERENCES courses (id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    topic TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (course_id, date)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS attendances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lesson_id INTEGER NOT NULL REFERENCES lessons (id) ON DELETE CASCADE,
    student_id INTEGER NOT NULL REFERENCES students (id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'present' CHECK (status IN ('present', 'absent', 'excused')),
    comment TEXT NOT NULL DEFAULT '',
    UNIQUE (lesson_id, student_id)
)"#,
    "CREATE INDEX IF NOT EXISTS idx_attendances_student ON attendances (student_id)",
    r#"
CREATE TABLE IF NOT EXISTS exercises (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    lesson_id INTEGER NOT NULL REFERENCES lessons (id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#,
    r#"
CREATE TABLE IF NOT EXISTS exercise_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exercise_id INTEGER NOT NULL REFERENCES exercises (id) ON DELETE CASCADE,
    student_id INTEGER NOT NULL REFERENCES students (id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'solved', 'partial')),
    comment TEXT NOT NULL DEFAULT '',
    UNIQUE (exercise_id, student_id)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id INTEGER NOT NULL REFERENCES students (id) ON DELETE CASCADE,
    course_id INTEGER NOT NULL REFERENCES courses (id) ON DELETE CASCADE,
    lessons_included INTEGER NOT NULL DEFAULT 4 CHECK (lessons_included >= 0),
    price_minor INTEGER NOT NULL,
    purchase_date TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1
)"#,
    "CREATE INDEX IF NOT EXISTS idx_subscriptions_student ON subscriptions (student_id)",
    r#"
CREATE TABLE IF NOT EXISTS phone_codes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phone TEXT NOT NULL,
    purpose TEXT NOT NULL,
    code TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    consumed INTEGER NOT NULL DEFAULT 0
)"#,
    "CREATE INDEX IF NOT EXISTS idx_phone_codes_lookup ON phone_codes (phone, purpose)",
];

const STUDENT_COLUMNS: &str =
    "id, first_name, last_name, middle_name, birth_date, guardian_name, guardian_phone, notes";
const COURSE_COLUMNS: &str = "id, title, description, schedule, capacity, teacher_id";
const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, start_date, end_date, is_active";

/// SQLite repository. One database file (crm.db) in the given base directory.
pub struct SqliteRepo {
    db: Database,
    db_path: PathBuf,
}

impl SqliteRepo {
    /// Connect to (or create) the SQLite database and ensure the schema exists.
    /// Call this once at startup; the returned repo is safe to share via Arc.
    ///
    /// Sets WAL mode and synchronous=NORMAL for concurrent reads alongside one writer.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(repo_err)?;
        let db_path = base.join("crm.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(repo_err)?;
        let conn = db.connect().map_err(repo_err)?;

        // PRAGMA returns a row (new value); query and drain (execute fails when rows are returned).
        pragma(&conn, "PRAGMA journal_mode=WAL").await?;
        pragma(&conn, "PRAGMA synchronous=NORMAL").await?;

        for statement in SCHEMA {
            conn.execute(statement, ()).await.map_err(repo_err)?;
        }

        info!(path = %db_path.display(), "SQLite connected with WAL mode");

        Ok(Self { db, db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Fresh connection with foreign keys enforced and a busy timeout for concurrent writers.
    pub(super) async fn conn(&self) -> Result<Connection, DomainError> {
        let conn = self.db.connect().map_err(repo_err)?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(repo_err)?;
        pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        Ok(conn)
    }
}

async fn pragma(conn: &Connection, sql: &str) -> Result<(), DomainError> {
    let mut rows = conn
        .query(sql, ())
        .await
        .map_err(|e| DomainError::Repo(format!("{sql} failed: {e}")))?;
    while rows.next().await.map_err(repo_err)?.is_some() {}
    Ok(())
}

pub(super) fn repo_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::Repo(e.to_string())
}

/// Constraint failures become `Integrity` so services can translate them into user errors.
pub(super) fn write_err(e: libsql::Error) -> DomainError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") || msg.contains("FOREIGN KEY constraint failed") {
        DomainError::Integrity(msg)
    } else {
        DomainError::Repo(msg)
    }
}

pub(super) fn parse_date(s: &str) -> Result<NaiveDate, DomainError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DomainError::Repo(format!("bad date {s:?}: {e}")))
}

pub(super) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::Repo(format!("bad timestamp {s:?}: {e}")))
}

pub(super) fn opt_text(row: &Row, idx: i32) -> Result<Option<String>, DomainError> {
    match row.get_value(idx).map_err(repo_err)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(DomainError::Repo(format!(
            "column {idx}: expected text, got {other:?}"
        ))),
    }
}

pub(super) fn opt_int(row: &Row, idx: i32) -> Result<Option<i64>, DomainError> {
    match row.get_value(idx).map_err(repo_err)? {
        Value::Null => Ok(None),
        Value::Integer(n) => Ok(Some(n)),
        other => Err(DomainError::Repo(format!(
            "column {idx}: expected integer, got {other:?}"
        ))),
    }
}

pub(super) fn opt_date(row: &Row, idx: i32) -> Result<Option<NaiveDate>, DomainError> {
    opt_text(row, idx)?.as_deref().map(parse_date).transpose()
}

pub(super) fn get_i64(row: &Row, idx: i32) -> Result<i64, DomainError> {
    row.get::<i64>(idx).map_err(repo_err)
}

pub(super) fn get_text(row: &Row, idx: i32) -> Result<String, DomainError> {
    row.get::<String>(idx).map_err(repo_err)
}

pub(super) fn get_u32(row: &Row, idx: i32) -> Result<u32, DomainError> {
    let n = get_i64(row, idx)?;
    u32::try_from(n).map_err(|_| DomainError::Repo(format!("column {idx}: {n} out of range")))
}

/// Aggregate counts and sums. Negative values are an error; large ones clamp to `u32::MAX`.
pub(super) fn get_count(row: &Row, idx: i32) -> Result<u32, DomainError> {
    let n = get_i64(row, idx)?;
    if n < 0 {
        return Err(DomainError::Repo(format!("column {idx}: negative count {n}")));
    }
    Ok(u32::try_from(n).unwrap_or(u32::MAX))
}

pub(super) fn get_bool(row: &Row, idx: i32) -> Result<bool, DomainError> {
    Ok(get_i64(row, idx)? != 0)
}

pub(super) async fn collect_rows<T>(
    mut rows: Rows,
    map: impl Fn(&Row) -> Result<T, DomainError>,
) -> Result<Vec<T>, DomainError> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.map_err(repo_err)? {
        out.push(map(&row)?);
    }
    Ok(out)
}

pub(super) async fn first_row<T>(
    mut rows: Rows,
    map: impl Fn(&Row) -> Result<T, DomainError>,
) -> Result<Option<T>, DomainError> {
    match rows.next().await.map_err(repo_err)? {
        Some(row) => Ok(Some(map(&row)?)),
        None => Ok(None),
    }
}

fn student_from_row(row: &Row) -> Result<Student, DomainError> {
    Ok(Student {
        id: get_i64(row, 0)?,
        first_name: get_text(row, 1)?,
        last_name: get_text(row, 2)?,
        middle_name: get_text(row, 3)?,
        birth_date: opt_date(row, 4)?,
        guardian_name: get_text(row, 5)?,
        guardian_phone: get_text(row, 6)?,
        notes: get_text(row, 7)?,
    })
}

fn course_from_row(row: &Row) -> Result<Course, DomainError> {
    let schedule: String = get_text(row, 3)?;
    let capacity = opt_int(row, 4)?
        .map(|n| u32::try_from(n).map_err(|_| DomainError::Repo(format!("capacity {n}"))))
        .transpose()?;
    Ok(Course {
        id: get_i64(row, 0)?,
        title: get_text(row, 1)?,
        description: get_text(row, 2)?,
        schedule: parse_weekday_codes(schedule.split(',')),
        capacity,
        teacher_id: opt_int(row, 5)?,
    })
}

fn enrollment_from_row(row: &Row) -> Result<Enrollment, DomainError> {
    Ok(Enrollment {
        id: get_i64(row, 0)?,
        student_id: get_i64(row, 1)?,
        course_id: get_i64(row, 2)?,
        start_date: parse_date(&get_text(row, 3)?)?,
        end_date: opt_date(row, 4)?,
        is_active: get_bool(row, 5)?,
    })
}

#[async_trait::async_trait]
impl RosterPort for SqliteRepo {
    async fn create_student(&self, student: &NewStudent) -> Result<Student, DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO students (first_name, last_name, middle_name, birth_date, guardian_name, guardian_phone, notes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                student.first_name.as_str(),
                student.last_name.as_str(),
                student.middle_name.as_str(),
                student.birth_date.map(|d| d.to_string()),
                student.guardian_name.as_str(),
                student.guardian_phone.as_str(),
                student.notes.as_str()
            ],
        )
        .await
        .map_err(write_err)?;
        let id = conn.last_insert_rowid();
        debug!(student_id = id, "student inserted");
        self.get_student(id)
            .await?
            .ok_or_else(|| DomainError::not_found("student", id))
    }

    async fn get_student(&self, id: i64) -> Result<Option<Student>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, student_from_row).await
    }

    async fn list_students(&self) -> Result<Vec<Student>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT {STUDENT_COLUMNS} FROM students ORDER BY last_name, first_name, id"),
                (),
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, student_from_row).await
    }

    async fn link_guardian(&self, student_id: i64, guardian_id: i64) -> Result<bool, DomainError> {
        let conn = self.conn().await?;
        let inserted = conn
            .execute(
                r#"
                INSERT INTO student_guardians (student_id, guardian_id) VALUES (?1, ?2)
                ON CONFLICT (student_id, guardian_id) DO NOTHING
                "#,
                params![student_id, guardian_id],
            )
            .await
            .map_err(write_err)?;
        Ok(inserted > 0)
    }

    async fn guardian_ids(&self, student_id: i64) -> Result<Vec<i64>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT guardian_id FROM student_guardians WHERE student_id = ?1 ORDER BY guardian_id",
                params![student_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, |row| get_i64(row, 0)).await
    }

    async fn students_of_guardian(&self, guardian_id: i64) -> Result<Vec<Student>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    r#"
                    SELECT {STUDENT_COLUMNS} FROM students
                    WHERE id IN (SELECT student_id FROM student_guardians WHERE guardian_id = ?1)
                    ORDER BY last_name, first_name, id
                    "#
                ),
                params![guardian_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, student_from_row).await
    }

    async fn create_course(
        &self,
        course: &NewCourse,
        schedule: &[Weekday],
    ) -> Result<Course, DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO courses (title, description, schedule, capacity, teacher_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                course.title.as_str(),
                course.description.as_str(),
                format_schedule(schedule),
                course.capacity.map(i64::from),
                course.teacher_id
            ],
        )
        .await
        .map_err(write_err)?;
        let id = conn.last_insert_rowid();
        self.get_course(id)
            .await?
            .ok_or_else(|| DomainError::not_found("course", id))
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, course_from_row).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY title, id"),
                (),
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, course_from_row).await
    }

    async fn courses_of_teacher(&self, teacher_id: i64) -> Result<Vec<Course>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {COURSE_COLUMNS} FROM courses WHERE teacher_id = ?1 ORDER BY title, id"
                ),
                params![teacher_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, course_from_row).await
    }

    async fn delete_course(&self, id: i64) -> Result<bool, DomainError> {
        let conn = self.conn().await?;
        let deleted = conn
            .execute("DELETE FROM courses WHERE id = ?1", params![id])
            .await
            .map_err(write_err)?;
        if deleted > 0 {
            info!(course_id = id, "course deleted with its lessons and enrollments");
        }
        Ok(deleted > 0)
    }

    async fn get_enrollment(&self, id: i64) -> Result<Option<Enrollment>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, enrollment_from_row).await
    }

    async fn enrollments_for_pair(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Vec<Enrollment>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    r#"
                    SELECT {ENROLLMENT_COLUMNS} FROM enrollments
                    WHERE student_id = ?1 AND course_id = ?2
                    ORDER BY start_date DESC, id DESC
                    "#
                ),
                params![student_id, course_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, enrollment_from_row).await
    }

    async fn enrollments_for_course(&self, course_id: i64) -> Result<Vec<Enrollment>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT e.id, e.student_id, e.course_id, e.start_date, e.end_date, e.is_active
                FROM enrollments e JOIN students s ON s.id = e.student_id
                WHERE e.course_id = ?1
                ORDER BY s.last_name, s.first_name, e.start_date DESC
                "#,
                params![course_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, enrollment_from_row).await
    }

    async fn enrollments_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Enrollment>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE student_id = ?1 ORDER BY start_date DESC, id DESC"
                ),
                params![student_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, enrollment_from_row).await
    }

    async fn insert_enrollment(&self, draft: &EnrollmentDraft) -> Result<Enrollment, DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO enrollments (student_id, course_id, start_date, end_date, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                draft.student_id,
                draft.course_id,
                draft.start_date.to_string(),
                draft.end_date.map(|d| d.to_string()),
                i64::from(draft.is_active)
            ],
        )
        .await
        .map_err(write_err)?;
        let id = conn.last_insert_rowid();
        self.get_enrollment(id)
            .await?
            .ok_or_else(|| DomainError::not_found("enrollment", id))
    }

    async fn update_enrollment(
        &self,
        id: i64,
        draft: &EnrollmentDraft,
    ) -> Result<Enrollment, DomainError> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                r#"
                UPDATE enrollments
                SET student_id = ?2, course_id = ?3, start_date = ?4, end_date = ?5, is_active = ?6
                WHERE id = ?1
                "#,
                params![
                    id,
                    draft.student_id,
                    draft.course_id,
                    draft.start_date.to_string(),
                    draft.end_date.map(|d| d.to_string()),
                    i64::from(draft.is_active)
                ],
            )
            .await
            .map_err(write_err)?;
        if updated == 0 {
            return Err(DomainError::not_found("enrollment", id));
        }
        self.get_enrollment(id)
            .await?
            .ok_or_else(|| DomainError::not_found("enrollment", id))
    }
}
