//! AccountPort for SqliteRepo. Accounts, roles and one-time phone codes.

use super::sqlite_repo::{
    SqliteRepo, collect_rows, first_row, get_bool, get_i64, get_text, parse_timestamp, repo_err,
    write_err,
};
use crate::domain::{Account, CodePurpose, DomainError, PhoneCode, Role};
use crate::ports::AccountPort;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Row, params};
use tracing::info;

const PHONE_CODE_COLUMNS: &str = "id, phone, purpose, code, created_at, expires_at, consumed";

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn phone_code_from_row(row: &Row) -> Result<PhoneCode, DomainError> {
    let purpose = get_text(row, 2)?;
    Ok(PhoneCode {
        id: get_i64(row, 0)?,
        phone: get_text(row, 1)?,
        purpose: CodePurpose::parse(&purpose)
            .ok_or_else(|| DomainError::Repo(format!("unknown code purpose {purpose:?}")))?,
        code: get_text(row, 3)?,
        created_at: parse_timestamp(&get_text(row, 4)?)?,
        expires_at: parse_timestamp(&get_text(row, 5)?)?,
        consumed: get_bool(row, 6)?,
    })
}

async fn roles_of(conn: &Connection, account_id: i64) -> Result<Vec<Role>, DomainError> {
    let rows = conn
        .query(
            "SELECT role FROM account_roles WHERE account_id = ?1",
            params![account_id],
        )
        .await
        .map_err(repo_err)?;
    let names = collect_rows(rows, |row| get_text(row, 0)).await?;
    let mut roles: Vec<Role> = names.iter().filter_map(|n| Role::parse(n)).collect();
    roles.sort_by_key(|r| Role::ALL.iter().position(|x| x == r));
    Ok(roles)
}

/// Loads the account row selected by `sql` (columns id, phone, display_name) with its roles.
async fn load_account(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Option<Account>, DomainError> {
    let rows = conn.query(sql, params).await.map_err(repo_err)?;
    let Some((id, phone, display_name)) = first_row(rows, |row| {
        Ok((get_i64(row, 0)?, get_text(row, 1)?, get_text(row, 2)?))
    })
    .await?
    else {
        return Ok(None);
    };
    Ok(Some(Account {
        id,
        phone,
        display_name,
        roles: roles_of(conn, id).await?,
    }))
}

#[async_trait::async_trait]
impl AccountPort for SqliteRepo {
    async fn create_account(
        &self,
        phone: &str,
        display_name: &str,
        roles: &[Role],
    ) -> Result<Account, DomainError> {
        let conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(repo_err)?;
        tx.execute(
            "INSERT INTO accounts (phone, display_name) VALUES (?1, ?2)",
            params![phone, display_name],
        )
        .await
        .map_err(write_err)?;
        let id = tx.last_insert_rowid();
        for role in roles {
            tx.execute(
                "INSERT OR IGNORE INTO account_roles (account_id, role) VALUES (?1, ?2)",
                params![id, role.as_str()],
            )
            .await
            .map_err(write_err)?;
        }
        tx.commit().await.map_err(repo_err)?;
        info!(account_id = id, roles = ?roles, "account created");
        self.get_account(id)
            .await?
            .ok_or_else(|| DomainError::not_found("account", id))
    }

    async fn get_account(&self, id: i64) -> Result<Option<Account>, DomainError> {
        let conn = self.conn().await?;
        load_account(
            &conn,
            "SELECT id, phone, display_name FROM accounts WHERE id = ?1",
            params![id],
        )
        .await
    }

    async fn find_account_by_phone(&self, phone: &str) -> Result<Option<Account>, DomainError> {
        let conn = self.conn().await?;
        load_account(
            &conn,
            "SELECT id, phone, display_name FROM accounts WHERE phone = ?1",
            params![phone],
        )
        .await
    }

    async fn grant_role(&self, account_id: i64, role: Role) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        let added = conn
            .execute(
                "INSERT OR IGNORE INTO account_roles (account_id, role) VALUES (?1, ?2)",
                params![account_id, role.as_str()],
            )
            .await
            .map_err(write_err)?;
        if added > 0 {
            info!(account_id, role = role.as_str(), "role granted");
        }
        Ok(())
    }

    async fn accounts_with_role(&self, role: Role) -> Result<Vec<Account>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                r#"
                SELECT a.id FROM accounts a JOIN account_roles r ON r.account_id = a.id
                WHERE r.role = ?1
                ORDER BY a.display_name, a.id
                "#,
                params![role.as_str()],
            )
            .await
            .map_err(repo_err)?;
        let ids = collect_rows(rows, |row| get_i64(row, 0)).await?;
        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(account) = self.get_account(id).await? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }

    async fn store_phone_code(
        &self,
        phone: &str,
        purpose: CodePurpose,
        code: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<PhoneCode, DomainError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO phone_codes (phone, purpose, code, created_at, expires_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                phone,
                purpose.as_str(),
                code,
                timestamp(created_at),
                timestamp(expires_at)
            ],
        )
        .await
        .map_err(write_err)?;
        let id = conn.last_insert_rowid();
        let rows = conn
            .query(
                &format!("SELECT {PHONE_CODE_COLUMNS} FROM phone_codes WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, phone_code_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("phone code", id))
    }

    async fn latest_phone_code(
        &self,
        phone: &str,
        purpose: CodePurpose,
    ) -> Result<Option<PhoneCode>, DomainError> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                &format!(
                    r#"
                    SELECT {PHONE_CODE_COLUMNS} FROM phone_codes
                    WHERE phone = ?1 AND purpose = ?2 AND consumed = 0
                    ORDER BY id DESC LIMIT 1
                    "#
                ),
                params![phone, purpose.as_str()],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, phone_code_from_row).await
    }

    async fn consume_phone_code(&self, id: i64) -> Result<(), DomainError> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE phone_codes SET consumed = 1 WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(write_err)?;
        if updated == 0 {
            return Err(DomainError::not_found("phone code", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn account_roles_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepo::connect(dir.path()).await.unwrap();
        let account = repo
            .create_account("+79990000000", "Мария", &[Role::Parent])
            .await
            .unwrap();
        assert_eq!(account.roles, vec![Role::Parent]);

        repo.grant_role(account.id, Role::Teacher).await.unwrap();
        repo.grant_role(account.id, Role::Teacher).await.unwrap();
        let found = repo
            .find_account_by_phone("+79990000000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.roles, vec![Role::Teacher, Role::Parent]);

        let teachers = repo.accounts_with_role(Role::Teacher).await.unwrap();
        assert_eq!(teachers.len(), 1);
        assert!(repo.accounts_with_role(Role::Admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_phone_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepo::connect(dir.path()).await.unwrap();
        repo.create_account("+79990000000", "", &[]).await.unwrap();
        let err = repo
            .create_account("+79990000000", "", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Integrity(_)));
    }

    #[tokio::test]
    async fn latest_code_skips_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepo::connect(dir.path()).await.unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let later = now + Duration::minutes(10);
        let first = repo
            .store_phone_code("+79990000000", CodePurpose::Login, "111111", now, later)
            .await
            .unwrap();
        let second = repo
            .store_phone_code("+79990000000", CodePurpose::Login, "222222", now, later)
            .await
            .unwrap();
        assert_eq!(first.expires_at, later);

        let latest = repo
            .latest_phone_code("+79990000000", CodePurpose::Login)
            .await
            .unwrap();
        assert_eq!(latest.as_ref().map(|c| c.code.as_str()), Some("222222"));

        repo.consume_phone_code(second.id).await.unwrap();
        let latest = repo
            .latest_phone_code("+79990000000", CodePurpose::Login)
            .await
            .unwrap();
        assert_eq!(latest.map(|c| c.id), Some(first.id));
        assert!(
            repo.latest_phone_code("+79990000000", CodePurpose::Registration)
                .await
                .unwrap()
                .is_none()
        );
    }
}
