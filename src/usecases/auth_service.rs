//! Phone-number registration and login with one-time codes.
//!
//! Codes are stored with an expiry and delivered through the code log.
//! Only the most recent unconsumed code for a phone and purpose is accepted, and only once.

use crate::domain::access::require_admin;
use crate::domain::phone::normalize_phone;
use crate::domain::{Account, CodePurpose, DomainError, PhoneCode, Role, ValidationError};
use crate::ports::{AccountPort, Clock, PhoneCodeLogPort};
use chrono::Duration;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

const CODE_DIGITS: usize = 6;

/// Kept out of async code so the thread-local RNG never crosses an await.
fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:0width$}", width = CODE_DIGITS)
}

pub struct AuthService {
    accounts: Arc<dyn AccountPort>,
    code_log: Arc<dyn PhoneCodeLogPort>,
    clock: Arc<dyn Clock>,
    code_ttl: Duration,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountPort>,
        code_log: Arc<dyn PhoneCodeLogPort>,
        clock: Arc<dyn Clock>,
        code_ttl_secs: u64,
    ) -> Self {
        let ttl_secs = i64::try_from(code_ttl_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        Self {
            accounts,
            code_log,
            clock,
            code_ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Issues a code. Registration needs an unused phone; login needs a registered one.
    pub async fn request_code(
        &self,
        raw_phone: &str,
        purpose: CodePurpose,
    ) -> Result<PhoneCode, DomainError> {
        let phone = normalize_phone(raw_phone)?;
        let existing = self.accounts.find_account_by_phone(&phone).await?;
        match (purpose, existing.is_some()) {
            (CodePurpose::Registration, true) => {
                return Err(ValidationError::PhoneAlreadyRegistered.into());
            }
            (CodePurpose::Login, false) => return Err(ValidationError::UnknownAccount.into()),
            _ => {}
        }

        let code = generate_code();
        let now = self.clock.now();
        let stored = self
            .accounts
            .store_phone_code(&phone, purpose, &code, now, now + self.code_ttl)
            .await?;
        self.code_log.append(&stored).await?;
        info!(purpose = purpose.as_str(), "verification code issued");
        Ok(stored)
    }

    async fn verify(
        &self,
        phone: &str,
        purpose: CodePurpose,
        code: &str,
    ) -> Result<(), DomainError> {
        let Some(stored) = self.accounts.latest_phone_code(phone, purpose).await? else {
            return Err(ValidationError::InvalidCode.into());
        };
        if stored.code != code.trim() {
            warn!(purpose = purpose.as_str(), "wrong verification code");
            return Err(ValidationError::InvalidCode.into());
        }
        if self.clock.now() > stored.expires_at {
            return Err(ValidationError::CodeExpired.into());
        }
        self.accounts.consume_phone_code(stored.id).await
    }

    /// Creates a parent account once the registration code checks out.
    pub async fn register(
        &self,
        raw_phone: &str,
        code: &str,
        display_name: &str,
    ) -> Result<Account, DomainError> {
        let phone = normalize_phone(raw_phone)?;
        self.verify(&phone, CodePurpose::Registration, code).await?;
        let account = self
            .accounts
            .create_account(&phone, display_name.trim(), &[Role::Parent])
            .await
            .map_err(|e| match e {
                DomainError::Integrity(_) => ValidationError::PhoneAlreadyRegistered.into(),
                other => other,
            })?;
        info!(account_id = account.id, "account registered");
        Ok(account)
    }

    pub async fn login(&self, raw_phone: &str, code: &str) -> Result<Account, DomainError> {
        let phone = normalize_phone(raw_phone)?;
        self.verify(&phone, CodePurpose::Login, code).await?;
        let account = self
            .accounts
            .find_account_by_phone(&phone)
            .await?
            .ok_or(ValidationError::UnknownAccount)?;
        info!(account_id = account.id, "signed in");
        Ok(account)
    }

    /// Startup bootstrap: makes sure the configured phone has an administrator account.
    pub async fn ensure_admin(&self, raw_phone: &str) -> Result<Account, DomainError> {
        let phone = normalize_phone(raw_phone)?;
        match self.accounts.find_account_by_phone(&phone).await? {
            Some(account) if account.is_admin() => Ok(account),
            Some(account) => {
                self.accounts.grant_role(account.id, Role::Admin).await?;
                info!(account_id = account.id, "admin role granted to configured phone");
                self.accounts
                    .get_account(account.id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("account", account.id))
            }
            None => {
                let account = self
                    .accounts
                    .create_account(&phone, "Администратор", &[Role::Admin])
                    .await?;
                info!(account_id = account.id, "admin account created");
                Ok(account)
            }
        }
    }

    pub async fn grant_role(
        &self,
        actor: &Account,
        account_id: i64,
        role: Role,
    ) -> Result<Account, DomainError> {
        require_admin(actor)?;
        if self.accounts.get_account(account_id).await?.is_none() {
            return Err(DomainError::not_found("account", account_id));
        }
        self.accounts.grant_role(account_id, role).await?;
        self.accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| DomainError::not_found("account", account_id))
    }

    pub async fn account_by_phone(
        &self,
        actor: &Account,
        raw_phone: &str,
    ) -> Result<Account, DomainError> {
        require_admin(actor)?;
        let phone = normalize_phone(raw_phone)?;
        Ok(self
            .accounts
            .find_account_by_phone(&phone)
            .await?
            .ok_or(ValidationError::UnknownAccount)?)
    }

    /// Fresh copy of the account (roles may have changed since sign-in).
    pub async fn reload(&self, account: &Account) -> Result<Account, DomainError> {
        self.accounts
            .get_account(account.id)
            .await?
            .ok_or_else(|| DomainError::not_found("account", account.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::FilePhoneCodeLog;
    use crate::test_support::Fixture;

    fn service(fx: &Fixture) -> AuthService {
        let log = Arc::new(FilePhoneCodeLog::new(fx.dir.path().join("codes.log")));
        AuthService::new(fx.repo.clone(), log, fx.clock.clone(), 600)
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let fx = Fixture::new().await;
        let auth = service(&fx);

        let issued = auth
            .request_code("+7 999 123-45-67", CodePurpose::Registration)
            .await
            .unwrap();
        assert_eq!(issued.phone, "+79991234567");
        let log = std::fs::read_to_string(fx.dir.path().join("codes.log")).unwrap();
        assert!(log.contains(&issued.code));

        let account = auth
            .register("8 999 123 45 67", &issued.code, "Мария")
            .await
            .unwrap();
        assert_eq!(account.roles, vec![Role::Parent]);

        // the code is single-use
        let err = auth
            .register("+79991234567", &issued.code, "Мария")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::InvalidCode)
        ));

        let err = auth
            .request_code("+79991234567", CodePurpose::Registration)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::PhoneAlreadyRegistered)
        ));

        let login_code = auth
            .request_code("+79991234567", CodePurpose::Login)
            .await
            .unwrap();
        let signed_in = auth.login("+79991234567", &login_code.code).await.unwrap();
        assert_eq!(signed_in.id, account.id);
    }

    #[tokio::test]
    async fn wrong_and_expired_codes_are_rejected() {
        let fx = Fixture::new().await;
        let auth = service(&fx);
        let err = auth
            .request_code("+79991234567", CodePurpose::Login)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::UnknownAccount)
        ));

        let issued = auth
            .request_code("+79991234567", CodePurpose::Registration)
            .await
            .unwrap();
        let wrong = if issued.code == "000000" { "000001" } else { "000000" };
        let err = auth.register("+79991234567", wrong, "").await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::InvalidCode)
        ));

        fx.clock.advance(Duration::seconds(601));
        let err = auth
            .register("+79991234567", &issued.code, "")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::CodeExpired)
        ));
    }

    #[tokio::test]
    async fn ensure_admin_creates_or_promotes() {
        let fx = Fixture::new().await;
        let auth = service(&fx);
        let promoted = auth.ensure_admin("+70000000003").await.unwrap();
        assert_eq!(promoted.id, fx.parent.id);
        assert!(promoted.is_admin() && promoted.is_parent());

        let created = auth.ensure_admin("+70000000050").await.unwrap();
        assert_eq!(created.roles, vec![Role::Admin]);
        let again = auth.ensure_admin("+70000000050").await.unwrap();
        assert_eq!(again.id, created.id);
    }

    #[tokio::test]
    async fn only_admin_grants_roles() {
        let fx = Fixture::new().await;
        let auth = service(&fx);
        let err = auth
            .grant_role(&fx.teacher, fx.parent.id, Role::Teacher)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        let updated = auth
            .grant_role(&fx.admin, fx.parent.id, Role::Teacher)
            .await
            .unwrap();
        assert!(updated.is_teacher());
    }
}
