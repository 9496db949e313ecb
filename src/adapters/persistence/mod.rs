//! Persistence adapters: SQLite database and the verification-code log file.

pub mod phone_code_log;
pub mod sqlite_accounts;
pub mod sqlite_billing;
pub mod sqlite_lessons;
pub mod sqlite_repo;

pub use phone_code_log::FilePhoneCodeLog;
pub use sqlite_repo::SqliteRepo;
