//! Role-specific landing views.

use crate::domain::{Account, Course, DomainError, Lesson, LessonBalance, Student, Subscription};
use crate::ports::{LessonPort, RosterPort};
use crate::usecases::roster_service::StudentDetail;
use crate::usecases::{BillingService, RosterService};
use std::sync::Arc;

const RECENT_SUBSCRIPTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct StudentBalance {
    pub student: Student,
    pub balance: LessonBalance,
}

#[derive(Debug, Clone)]
pub struct CourseLessons {
    pub course: Course,
    /// Newest first.
    pub lessons: Vec<Lesson>,
}

/// What the signed-in account sees first. Admin wins over teacher, teacher over parent.
#[derive(Debug, Clone)]
pub enum Dashboard {
    Admin {
        courses: Vec<Course>,
        students: Vec<StudentBalance>,
        recent_subscriptions: Vec<Subscription>,
    },
    Teacher {
        courses: Vec<CourseLessons>,
    },
    Parent {
        children: Vec<StudentDetail>,
    },
    Guest,
}

pub struct DashboardService {
    roster: Arc<dyn RosterPort>,
    lessons: Arc<dyn LessonPort>,
    billing: Arc<BillingService>,
    roster_service: Arc<RosterService>,
}

impl DashboardService {
    pub fn new(
        roster: Arc<dyn RosterPort>,
        lessons: Arc<dyn LessonPort>,
        billing: Arc<BillingService>,
        roster_service: Arc<RosterService>,
    ) -> Self {
        Self {
            roster,
            lessons,
            billing,
            roster_service,
        }
    }

    pub async fn dashboard(&self, actor: &Account) -> Result<Dashboard, DomainError> {
        if actor.is_admin() {
            let courses = self.roster.list_courses().await?;
            let students = self.roster.list_students().await?;
            let ids: Vec<i64> = students.iter().map(|s| s.id).collect();
            let balances = self.billing.balances(&ids).await?;
            let students = students
                .into_iter()
                .map(|student| StudentBalance {
                    balance: balances.get(&student.id).copied().unwrap_or_default(),
                    student,
                })
                .collect();
            let recent_subscriptions = self
                .billing
                .recent_subscriptions(actor, RECENT_SUBSCRIPTIONS)
                .await?;
            return Ok(Dashboard::Admin {
                courses,
                students,
                recent_subscriptions,
            });
        }
        if actor.is_teacher() {
            let mut courses = Vec::new();
            for course in self.roster.courses_of_teacher(actor.id).await? {
                let lessons = self.lessons.lessons_for_course(course.id).await?;
                courses.push(CourseLessons { course, lessons });
            }
            return Ok(Dashboard::Teacher { courses });
        }
        if actor.is_parent() {
            let mut children = Vec::new();
            for child in self.roster.students_of_guardian(actor.id).await? {
                children.push(self.roster_service.student_detail(actor, child.id).await?);
            }
            return Ok(Dashboard::Parent { children });
        }
        Ok(Dashboard::Guest)
    }
}
