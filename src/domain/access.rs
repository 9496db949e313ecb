//! Role-based access rules. Callers gather the relationship facts; these functions decide.

use crate::domain::{Account, Course, DomainError};

/// Administrators manage everything; teachers manage only their own courses.
pub fn can_manage_course(account: &Account, course: &Course) -> bool {
    account.is_admin() || (account.is_teacher() && course.teacher_id == Some(account.id))
}

/// `child_enrolled`: one of the account's guardian students is enrolled in the course.
pub fn can_view_course(account: &Account, course: &Course, child_enrolled: bool) -> bool {
    can_manage_course(account, course) || (account.is_parent() && child_enrolled)
}

/// `is_guardian`: the account is linked to the student.
/// `teaches_student`: the student is enrolled in a course the account teaches.
pub fn can_view_student(account: &Account, is_guardian: bool, teaches_student: bool) -> bool {
    account.is_admin()
        || (account.is_parent() && is_guardian)
        || (account.is_teacher() && teaches_student)
}

pub fn require(allowed: bool) -> Result<(), DomainError> {
    if allowed {
        Ok(())
    } else {
        Err(DomainError::forbidden())
    }
}

pub fn require_admin(account: &Account) -> Result<(), DomainError> {
    require(account.is_admin())
}
