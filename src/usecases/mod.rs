//! Application use cases. Orchestrate domain logic via ports.
//!
//! Every service checks the caller's roles before it reads protected data or writes.

pub mod auth_service;
pub mod billing_service;
pub mod dashboard_service;
pub mod enrollment_service;
pub mod lesson_service;
pub mod roster_service;
pub mod schedule_service;

pub use auth_service::AuthService;
pub use billing_service::BillingService;
pub use dashboard_service::{Dashboard, DashboardService};
pub use enrollment_service::EnrollmentService;
pub use lesson_service::{LessonService, LessonSheet, LessonSheetUpdate};
pub use roster_service::RosterService;
pub use schedule_service::ScheduleService;
