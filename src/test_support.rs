//! Shared fixture for service tests: a temp SQLite database, a fixed clock and one account per role.

use crate::adapters::clock::FixedClock;
use crate::adapters::persistence::SqliteRepo;
use crate::domain::{
    Account, Course, Enrollment, EnrollmentDraft, NewCourse, NewStudent, Role, Student,
};
use crate::ports::{AccountPort, RosterPort};
use crate::usecases::BillingService;
use chrono::{NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub(crate) struct Fixture {
    // Keeps the database directory alive for the test's duration.
    pub dir: TempDir,
    pub repo: Arc<SqliteRepo>,
    pub clock: Arc<FixedClock>,
    pub billing: Arc<BillingService>,
    pub admin: Account,
    pub teacher: Account,
    pub parent: Account,
}

impl Fixture {
    /// "Today" is 2024-03-15.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(SqliteRepo::connect(dir.path()).await.unwrap());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap(),
        ));
        let billing = Arc::new(BillingService::new(
            repo.clone(),
            repo.clone(),
            clock.clone(),
        ));
        let admin = repo
            .create_account("+70000000001", "Администратор", &[Role::Admin])
            .await
            .unwrap();
        let teacher = repo
            .create_account("+70000000002", "Учитель", &[Role::Teacher])
            .await
            .unwrap();
        let parent = repo
            .create_account("+70000000003", "Родитель", &[Role::Parent])
            .await
            .unwrap();
        Self {
            dir,
            repo,
            clock,
            billing,
            admin,
            teacher,
            parent,
        }
    }

    pub async fn student(&self, first: &str, last: &str) -> Student {
        self.repo
            .create_student(&NewStudent {
                first_name: first.into(),
                last_name: last.into(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    pub async fn course(&self, title: &str, teacher_id: Option<i64>) -> Course {
        self.repo
            .create_course(
                &NewCourse {
                    title: title.into(),
                    teacher_id,
                    ..Default::default()
                },
                &[],
            )
            .await
            .unwrap()
    }

    pub async fn enroll(&self, student_id: i64, course_id: i64, start: NaiveDate) -> Enrollment {
        self.repo
            .insert_enrollment(&EnrollmentDraft {
                student_id,
                course_id,
                start_date: start,
                end_date: None,
                is_active: true,
            })
            .await
            .unwrap()
    }
}
