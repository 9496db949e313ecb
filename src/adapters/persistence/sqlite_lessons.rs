//! LessonPort for SqliteRepo: lessons, attendance, exercises and exercise results.

use super::sqlite_repo::{
    SqliteRepo, collect_rows, first_row, get_i64, get_text, get_u32, parse_date, repo_err,
    write_err,
};
use crate::domain::{
    Attendance, AttendanceRecord, AttendanceStatus, DomainError, Exercise, ExerciseResult,
    ExerciseStatus, Lesson, NewExercise, NewLesson,
};
use crate::ports::LessonPort;
use chrono::NaiveDate;
use libsql::{Row, params};
use std::collections::HashSet;
use tracing::{debug, info};

const LESSON_COLUMNS: &str = "id, course_id, date, topic";
const ATTENDANCE_COLUMNS: &str = "id, lesson_id, student_id, status, comment";
const EXERCISE_COLUMNS: &str = "id, lesson_id, title, description, position";

fn lesson_from_row(row: &Row) -> Result<Lesson, DomainError> {
    Ok(Lesson {
        id: get_i64(row, 0)?,
        course_id: get_i64(row, 1)?,
        date: parse_date(&get_text(row, 2)?)?,
        topic: get_text(row, 3)?,
    })
}

fn attendance_status(raw: &str) -> Result<AttendanceStatus, DomainError> {
    AttendanceStatus::parse(raw)
        .ok_or_else(|| DomainError::Repo(format!("unknown attendance status {raw:?}")))
}

fn exercise_status(raw: &str) -> Result<ExerciseStatus, DomainError> {
    ExerciseStatus::parse(raw)
        .ok_or_else(|| DomainError::Repo(format!("unknown exercise status {raw:?}")))
}

fn attendance_from_row(row: &Row) -> Result<Attendance, DomainError> {
    Ok(Attendance {
        id: get_i64(row, 0)?,
        lesson_id: get_i64(row, 1)?,
        student_id: get_i64(row, 2)?,
        status: attendance_status(&get_text(row, 3)?)?,
        comment: get_text(row, 4)?,
    })
}

fn exercise_from_row(row: &Row) -> Result<Exercise, DomainError> {
    Ok(Exercise {
        id: get_i64(row, 0)?,
        lesson_id: get_i64(row, 1)?,
        title: get_text(row, 2)?,
        description: get_text(row, 3)?,
        order: get_u32(row, 4)?,
    })
}

/// Columns: r.id, r.exercise_id, e.lesson_id, r.student_id, r.status, r.comment
fn result_from_row(row: &Row) -> Result<ExerciseResult, DomainError> {
    Ok(ExerciseResult {
        id: get_i64(row, 0)?,
        exercise_id: get_i64(row, 1)?,
        lesson_id: get_i64(row, 2)?,
        student_id: get_i64(row, 3)?,
        status: exercise_status(&get_text(row, 4)?)?,
        comment: get_text(row, 5)?,
    })
}

#[async_trait::async_trait]
impl LessonPort for SqliteRepo {
    async fn create_lesson(&self, lesson: &NewLesson) -> Result<Lesson, DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO lessons (course_id, date, topic) VALUES (?1, ?2, ?3)",
            params![
                lesson.course_id,
                lesson.date.to_string(),
                lesson.topic.as_str()
            ],
        )
        .await
        .map_err(write_err)?;
        let id = conn.last_insert_rowid();
        self.get_lesson(id)
            .await?
            .ok_or_else(|| DomainError::not_found("lesson", id))
    }

    async fn insert_missing_lessons(
        &self,
        course_id: i64,
        dates: &[NaiveDate],
    ) -> Result<usize, DomainError> {
        if dates.is_empty() {
            return Ok(0);
        }
        let conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(repo_err)?;
        let mut created = 0usize;
        for date in dates {
            let inserted = tx
                .execute(
                    r#"
                    INSERT INTO lessons (course_id, date, topic) VALUES (?1, ?2, '')
                    ON CONFLICT (course_id, date) DO NOTHING
                    "#,
                    params![course_id, date.to_string()],
                )
                .await
                .map_err(write_err)?;
            created += inserted as usize;
        }
        tx.commit().await.map_err(repo_err)?;
        debug!(course_id, requested = dates.len(), created, "lessons inserted");
        Ok(created)
    }

    async fn get_lesson(&self, id: i64) -> Result<Option<Lesson>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, lesson_from_row).await
    }

    async fn lessons_for_course(&self, course_id: i64) -> Result<Vec<Lesson>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {LESSON_COLUMNS} FROM lessons WHERE course_id = ?1 ORDER BY date DESC"
                ),
                params![course_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, lesson_from_row).await
    }

    async fn ensure_attendance(
        &self,
        lesson_id: i64,
        student_ids: &[i64],
    ) -> Result<Vec<Attendance>, DomainError> {
        let conn = self.conn().await?;
        if !student_ids.is_empty() {
            let tx = conn.transaction().await.map_err(repo_err)?;
            for student_id in student_ids {
                tx.execute(
                    r#"
                    INSERT INTO attendances (lesson_id, student_id) VALUES (?1, ?2)
                    ON CONFLICT (lesson_id, student_id) DO NOTHING
                    "#,
                    params![lesson_id, *student_id],
                )
                .await
                .map_err(write_err)?;
            }
            tx.commit().await.map_err(repo_err)?;
        }
        let wanted: HashSet<i64> = student_ids.iter().copied().collect();
        let rows = conn
            .query(
                &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances WHERE lesson_id = ?1"),
                params![lesson_id],
            )
            .await
            .map_err(repo_err)?;
        let mut attendances = collect_rows(rows, attendance_from_row).await?;
        attendances.retain(|a| wanted.contains(&a.student_id));
        Ok(attendances)
    }

    async fn attendance_records_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<AttendanceRecord>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT a.id, a.lesson_id, a.student_id, a.status, a.comment, l.date, c.id, c.title
                FROM attendances a
                JOIN lessons l ON l.id = a.lesson_id
                JOIN courses c ON c.id = l.course_id
                WHERE a.student_id = ?1
                ORDER BY l.date DESC, c.title
                "#,
                params![student_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, |row| {
            Ok(AttendanceRecord {
                attendance: attendance_from_row(row)?,
                lesson_date: parse_date(&get_text(row, 5)?)?,
                course_id: get_i64(row, 6)?,
                course_title: get_text(row, 7)?,
            })
        })
        .await
    }

    async fn add_exercise(
        &self,
        lesson_id: i64,
        exercise: &NewExercise,
    ) -> Result<Exercise, DomainError> {
        let conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(repo_err)?;
        let position = if exercise.order == 0 {
            let rows = tx
                .query(
                    "SELECT COALESCE(MAX(position), 0) + 1 FROM exercises WHERE lesson_id = ?1",
                    params![lesson_id],
                )
                .await
                .map_err(repo_err)?;
            first_row(rows, |row| get_i64(row, 0)).await?.unwrap_or(1)
        } else {
            i64::from(exercise.order)
        };
        tx.execute(
            "INSERT INTO exercises (lesson_id, title, description, position) VALUES (?1, ?2, ?3, ?4)",
            params![
                lesson_id,
                exercise.title.as_str(),
                exercise.description.as_str(),
                position
            ],
        )
        .await
        .map_err(write_err)?;
        let id = tx.last_insert_rowid();
        tx.commit().await.map_err(repo_err)?;
        info!(lesson_id, exercise_id = id, position, "exercise added");
        let rows = conn
            .query(
                &format!("SELECT {EXERCISE_COLUMNS} FROM exercises WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, exercise_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("exercise", id))
    }

    async fn exercises_for_lesson(&self, lesson_id: i64) -> Result<Vec<Exercise>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {EXERCISE_COLUMNS} FROM exercises WHERE lesson_id = ?1 ORDER BY position, id"
                ),
                params![lesson_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, exercise_from_row).await
    }

    async fn ensure_results(
        &self,
        lesson_id: i64,
        student_ids: &[i64],
    ) -> Result<Vec<ExerciseResult>, DomainError> {
        let exercises = self.exercises_for_lesson(lesson_id).await?;
        let conn = self.conn().await?;
        if !student_ids.is_empty() && !exercises.is_empty() {
            let tx = conn.transaction().await.map_err(repo_err)?;
            for exercise in &exercises {
                for student_id in student_ids {
                    tx.execute(
                        r#"
                        INSERT INTO exercise_results (exercise_id, student_id) VALUES (?1, ?2)
                        ON CONFLICT (exercise_id, student_id) DO NOTHING
                        "#,
                        params![exercise.id, *student_id],
                    )
                    .await
                    .map_err(write_err)?;
                }
            }
            tx.commit().await.map_err(repo_err)?;
        }
        let wanted: HashSet<i64> = student_ids.iter().copied().collect();
        let rows = conn
            .query(
                r#"
                SELECT r.id, r.exercise_id, e.lesson_id, r.student_id, r.status, r.comment
                FROM exercise_results r JOIN exercises e ON e.id = r.exercise_id
                WHERE e.lesson_id = ?1
                ORDER BY e.position, e.id, r.student_id
                "#,
                params![lesson_id],
            )
            .await
            .map_err(repo_err)?;
        let mut results = collect_rows(rows, result_from_row).await?;
        results.retain(|r| wanted.contains(&r.student_id));
        Ok(results)
    }

    async fn results_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<ExerciseResult>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT r.id, r.exercise_id, e.lesson_id, r.student_id, r.status, r.comment
                FROM exercise_results r JOIN exercises e ON e.id = r.exercise_id
                WHERE r.student_id = ?1
                ORDER BY e.position, e.id
                "#,
                params![student_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, result_from_row).await
    }

    async fn save_lesson_sheet(
        &self,
        attendances: &[Attendance],
        results: &[ExerciseResult],
    ) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(repo_err)?;
        for a in attendances {
            let updated = tx
                .execute(
                    "UPDATE attendances SET status = ?2, comment = ?3 WHERE id = ?1",
                    params![a.id, a.status.as_str(), a.comment.as_str()],
                )
                .await
                .map_err(write_err)?;
            if updated == 0 {
                // Dropping the transaction rolls back the rows already written.
                return Err(DomainError::not_found("attendance", a.id));
            }
        }
        for r in results {
            let updated = tx
                .execute(
                    "UPDATE exercise_results SET status = ?2, comment = ?3 WHERE id = ?1",
                    params![r.id, r.status.as_str(), r.comment.as_str()],
                )
                .await
                .map_err(write_err)?;
            if updated == 0 {
                return Err(DomainError::not_found("exercise result", r.id));
            }
        }
        tx.commit().await.map_err(repo_err)?;
        info!(
            attendances = attendances.len(),
            results = results.len(),
            "lesson sheet saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewCourse, NewStudent};
    use crate::ports::RosterPort;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    async fn setup() -> (tempfile::TempDir, SqliteRepo, i64, i64) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepo::connect(dir.path()).await.unwrap();
        let student = repo
            .create_student(&NewStudent {
                first_name: "Анна".into(),
                last_name: "Петрова".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let course = repo
            .create_course(
                &NewCourse {
                    title: "Алгебра".into(),
                    ..Default::default()
                },
                &[],
            )
            .await
            .unwrap();
        (dir, repo, student.id, course.id)
    }

    #[tokio::test]
    async fn duplicate_lesson_date_is_integrity_error() {
        let (_dir, repo, _, course_id) = setup().await;
        let new = NewLesson {
            course_id,
            date: d(3, 1),
            topic: "Дроби".into(),
        };
        repo.create_lesson(&new).await.unwrap();
        let err = repo.create_lesson(&new).await.unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)), "{err:?}");
    }

    #[tokio::test]
    async fn insert_missing_lessons_skips_existing_dates() {
        let (_dir, repo, _, course_id) = setup().await;
        repo.create_lesson(&NewLesson {
            course_id,
            date: d(3, 4),
            topic: "Уже есть".into(),
        })
        .await
        .unwrap();
        let created = repo
            .insert_missing_lessons(course_id, &[d(3, 4), d(3, 11)])
            .await
            .unwrap();
        assert_eq!(created, 1);
        let lessons = repo.lessons_for_course(course_id).await.unwrap();
        assert_eq!(lessons.len(), 2);
        assert_eq!(lessons[0].date, d(3, 11));
        assert_eq!(lessons[1].topic, "Уже есть");
    }

    #[tokio::test]
    async fn exercise_order_appends_when_zero() {
        let (_dir, repo, _, course_id) = setup().await;
        let lesson = repo
            .create_lesson(&NewLesson {
                course_id,
                date: d(3, 1),
                topic: String::new(),
            })
            .await
            .unwrap();
        let first = repo
            .add_exercise(
                lesson.id,
                &NewExercise {
                    title: "Упражнение 1".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let fixed = repo
            .add_exercise(
                lesson.id,
                &NewExercise {
                    title: "Упражнение 5".into(),
                    order: 5,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let next = repo
            .add_exercise(
                lesson.id,
                &NewExercise {
                    title: "Упражнение 6".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!((first.order, fixed.order, next.order), (1, 5, 6));
    }

    #[tokio::test]
    async fn ensure_rows_are_idempotent_and_sheet_saves() {
        let (_dir, repo, student_id, course_id) = setup().await;
        let lesson = repo
            .create_lesson(&NewLesson {
                course_id,
                date: d(3, 1),
                topic: String::new(),
            })
            .await
            .unwrap();
        repo.add_exercise(
            lesson.id,
            &NewExercise {
                title: "Задача".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let first = repo.ensure_attendance(lesson.id, &[student_id]).await.unwrap();
        let again = repo.ensure_attendance(lesson.id, &[student_id]).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first[0].status, AttendanceStatus::Present);

        let mut results = repo.ensure_results(lesson.id, &[student_id]).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ExerciseStatus::Pending);

        let mut attendance = first[0].clone();
        attendance.status = AttendanceStatus::Excused;
        attendance.comment = "Болел".into();
        results[0].status = ExerciseStatus::Solved;
        repo.save_lesson_sheet(&[attendance], &results).await.unwrap();

        let records = repo.attendance_records_for_student(student_id).await.unwrap();
        assert_eq!(records[0].attendance.status, AttendanceStatus::Excused);
        assert_eq!(records[0].attendance.comment, "Болел");
        assert_eq!(records[0].course_title, "Алгебра");
        let stored = repo.results_for_student(student_id).await.unwrap();
        assert_eq!(stored[0].status, ExerciseStatus::Solved);
        assert_eq!(stored[0].lesson_id, lesson.id);
    }

    #[tokio::test]
    async fn failed_sheet_save_writes_nothing() {
        let (_dir, repo, student_id, course_id) = setup().await;
        let lesson = repo
            .create_lesson(&NewLesson {
                course_id,
                date: d(3, 1),
                topic: String::new(),
            })
            .await
            .unwrap();
        let mut rows = repo.ensure_attendance(lesson.id, &[student_id]).await.unwrap();
        rows[0].status = AttendanceStatus::Absent;
        let mut ghost = rows[0].clone();
        ghost.id = 9_999;

        let err = repo
            .save_lesson_sheet(&[rows[0].clone(), ghost], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
        let stored = repo.ensure_attendance(lesson.id, &[student_id]).await.unwrap();
        assert_eq!(stored[0].status, AttendanceStatus::Present);
    }
}
