//! Lesson credits: which attendances are billable and how they net against purchases.

use crate::domain::{AttendanceRecord, AttendanceStatus, Subscription};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Upper bound on credits in one subscription.
pub const MAX_LESSONS_PER_SUBSCRIPTION: u32 = 1000;

/// Present and absent lessons are charged; excused ones are not.
pub fn status_is_billable(status: AttendanceStatus) -> bool {
    matches!(status, AttendanceStatus::Present | AttendanceStatus::Absent)
}

/// A lesson counts once it has happened: dated today or earlier.
pub fn is_billable(status: AttendanceStatus, lesson_date: NaiveDate, today: NaiveDate) -> bool {
    status_is_billable(status) && lesson_date <= today
}

pub fn count_billable(records: &[AttendanceRecord], today: NaiveDate) -> u32 {
    records
        .iter()
        .filter(|r| is_billable(r.attendance.status, r.lesson_date, today))
        .count() as u32
}

/// Sum of credits across all subscriptions. The active flag is not consulted.
/// Saturates at `u32::MAX`.
pub fn total_purchased(subscriptions: &[Subscription]) -> u32 {
    subscriptions
        .iter()
        .fold(0u32, |acc, s| acc.saturating_add(s.lessons_included))
}

/// Raw aggregates for one student, as produced by a storage query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceInputs {
    pub purchased: u32,
    pub billable: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonBalance {
    pub purchased: u32,
    pub used: u32,
    pub remaining: u32,
    pub debt: u32,
    pub billable: u32,
}

impl LessonBalance {
    pub fn from_counts(purchased: u32, billable: u32) -> Self {
        Self {
            purchased,
            used: billable.min(purchased),
            remaining: purchased.saturating_sub(billable),
            debt: billable.saturating_sub(purchased),
            billable,
        }
    }

    pub fn from_records(
        subscriptions: &[Subscription],
        attendances: &[AttendanceRecord],
        today: NaiveDate,
    ) -> Self {
        Self::from_counts(
            total_purchased(subscriptions),
            count_billable(attendances, today),
        )
    }

    pub fn in_debt(&self) -> bool {
        self.debt > 0
    }
}

impl From<BalanceInputs> for LessonBalance {
    fn from(inputs: BalanceInputs) -> Self {
        Self::from_counts(inputs.purchased, inputs.billable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attendance;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn record(status: AttendanceStatus, date: NaiveDate) -> AttendanceRecord {
        AttendanceRecord {
            attendance: Attendance {
                id: 0,
                lesson_id: 0,
                student_id: 1,
                status,
                comment: String::new(),
            },
            lesson_date: date,
            course_id: 1,
            course_title: "Алгебра".into(),
        }
    }

    fn subscription(lessons: u32, active: bool) -> Subscription {
        Subscription {
            id: 0,
            student_id: 1,
            course_id: 1,
            lessons_included: lessons,
            price_minor: 0,
            purchase_date: d(1, 1),
            is_active: active,
        }
    }

    #[test]
    fn excused_is_never_billable() {
        assert!(status_is_billable(AttendanceStatus::Present));
        assert!(status_is_billable(AttendanceStatus::Absent));
        assert!(!status_is_billable(AttendanceStatus::Excused));
    }

    #[test]
    fn debt_when_billable_exceeds_purchased() {
        use AttendanceStatus::*;
        let records: Vec<_> = [Present, Absent, Present, Absent, Excused]
            .into_iter()
            .enumerate()
            .map(|(i, s)| record(s, d(2, i as u32 + 1)))
            .collect();
        let balance = LessonBalance::from_records(&[subscription(3, true)], &records, d(6, 1));
        assert_eq!(
            balance,
            LessonBalance {
                purchased: 3,
                billable: 4,
                used: 3,
                remaining: 0,
                debt: 1
            }
        );
        assert!(balance.in_debt());
    }

    #[test]
    fn future_lessons_do_not_count() {
        let today = d(3, 10);
        let records = vec![
            record(AttendanceStatus::Present, d(3, 10)),
            record(AttendanceStatus::Present, d(3, 11)),
            record(AttendanceStatus::Absent, d(4, 1)),
        ];
        assert_eq!(count_billable(&records, today), 1);
    }

    #[test]
    fn inactive_subscriptions_still_count() {
        let subs = [subscription(4, true), subscription(8, false)];
        assert_eq!(total_purchased(&subs), 12);
        let balance = LessonBalance::from_records(&subs, &[], d(1, 1));
        assert_eq!(balance.remaining, 12);
        assert_eq!(balance.used, 0);
    }

    #[test]
    fn purchased_total_saturates() {
        let subs = [subscription(3_000_000_000, true), subscription(3_000_000_000, true)];
        assert_eq!(total_purchased(&subs), u32::MAX);
        let attended = [record(AttendanceStatus::Present, d(1, 1))];
        let balance = LessonBalance::from_records(&subs, &attended, d(1, 1));
        assert_eq!(balance.remaining, u32::MAX - 1);
    }

    #[test]
    fn empty_student_is_all_zero() {
        assert_eq!(LessonBalance::from_counts(0, 0), LessonBalance::default());
    }
}
