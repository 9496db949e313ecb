//! BillingPort for SqliteRepo. Subscriptions and the aggregate queries behind balances.

use super::sqlite_repo::{
    SqliteRepo, collect_rows, first_row, get_bool, get_count, get_i64, get_text, get_u32,
    parse_date, repo_err, write_err,
};
use crate::domain::{BalanceInputs, DomainError, NewSubscription, Subscription};
use crate::ports::BillingPort;
use chrono::NaiveDate;
use libsql::{Row, params};
use std::collections::HashMap;
use tracing::{debug, info};

const SUBSCRIPTION_COLUMNS: &str =
    "id, student_id, course_id, lessons_included, price_minor, purchase_date, is_active";

/// Purchased credits (all subscriptions) and billable attendances (dated on or before ?1).
/// Used as a per-student subquery pair; `s.id` is the student.
const BALANCE_AGGREGATES: &str = r#"
    COALESCE((SELECT SUM(sub.lessons_included) FROM subscriptions sub WHERE sub.student_id = s.id), 0),
    (SELECT COUNT(*) FROM attendances a JOIN lessons l ON l.id = a.lesson_id
        WHERE a.student_id = s.id AND a.status IN ('present', 'absent') AND l.date <= ?1)
"#;

fn subscription_from_row(row: &Row) -> Result<Subscription, DomainError> {
    Ok(Subscription {
        id: get_i64(row, 0)?,
        student_id: get_i64(row, 1)?,
        course_id: get_i64(row, 2)?,
        lessons_included: get_u32(row, 3)?,
        price_minor: get_i64(row, 4)?,
        purchase_date: parse_date(&get_text(row, 5)?)?,
        is_active: get_bool(row, 6)?,
    })
}

/// Columns: aggregates starting at `offset`.
fn inputs_from_row(row: &Row, offset: i32) -> Result<BalanceInputs, DomainError> {
    Ok(BalanceInputs {
        purchased: get_count(row, offset)?,
        billable: get_count(row, offset + 1)?,
    })
}

#[async_trait::async_trait]
impl BillingPort for SqliteRepo {
    async fn create_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<Subscription, DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            r#"
            INSERT INTO subscriptions (student_id, course_id, lessons_included, price_minor, purchase_date, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                subscription.student_id,
                subscription.course_id,
                i64::from(subscription.lessons_included),
                subscription.price_minor,
                subscription.purchase_date.to_string(),
                i64::from(subscription.is_active)
            ],
        )
        .await
        .map_err(write_err)?;
        let id = conn.last_insert_rowid();
        info!(
            subscription_id = id,
            student_id = subscription.student_id,
            lessons = subscription.lessons_included,
            "subscription stored"
        );
        let rows = conn
            .query(
                &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, subscription_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("subscription", id))
    }

    async fn subscriptions_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Subscription>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE student_id = ?1 ORDER BY purchase_date DESC, id DESC"
                ),
                params![student_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, subscription_from_row).await
    }

    async fn recent_subscriptions(&self, limit: u32) -> Result<Vec<Subscription>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions ORDER BY purchase_date DESC, id DESC LIMIT ?1"
                ),
                params![i64::from(limit)],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, subscription_from_row).await
    }

    async fn balance_inputs(
        &self,
        student_id: i64,
        today: NaiveDate,
    ) -> Result<BalanceInputs, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT {BALANCE_AGGREGATES} FROM students s WHERE s.id = ?2"),
                params![today.to_string(), student_id],
            )
            .await
            .map_err(repo_err)?;
        Ok(first_row(rows, |row| inputs_from_row(row, 0))
            .await?
            .unwrap_or_default())
    }

    async fn all_balance_inputs(
        &self,
        today: NaiveDate,
    ) -> Result<HashMap<i64, BalanceInputs>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!("SELECT s.id, {BALANCE_AGGREGATES} FROM students s"),
                params![today.to_string()],
            )
            .await
            .map_err(repo_err)?;
        let pairs = collect_rows(rows, |row| Ok((get_i64(row, 0)?, inputs_from_row(row, 1)?))).await?;
        debug!(students = pairs.len(), "balance aggregates loaded");
        Ok(pairs.into_iter().collect())
    }
}
