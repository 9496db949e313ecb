//! Lesson balances and subscriptions.
//!
//! Balances are memoized per student. An entry is valid only for the "today" it was computed on;
//! writes to a student's attendance or subscriptions must call [`BillingService::invalidate`].
//! Every invalidation bumps a generation; a balance computed under an older generation is
//! returned to its caller but never stored.

use crate::domain::access::require_admin;
use crate::domain::billing::MAX_LESSONS_PER_SUBSCRIPTION;
use crate::domain::{
    Account, AttendanceRecord, DomainError, LessonBalance, NewSubscription, Subscription,
    ValidationError,
};
use crate::ports::{BillingPort, Clock, RosterPort};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
struct CachedBalance {
    as_of: NaiveDate,
    balance: LessonBalance,
}

#[derive(Debug, Default)]
struct BalanceCache {
    entries: HashMap<i64, CachedBalance>,
    generation: u64,
}

pub struct BillingService {
    billing: Arc<dyn BillingPort>,
    roster: Arc<dyn RosterPort>,
    clock: Arc<dyn Clock>,
    cache: RwLock<BalanceCache>,
}

impl BillingService {
    pub fn new(
        billing: Arc<dyn BillingPort>,
        roster: Arc<dyn RosterPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            billing,
            roster,
            clock,
            cache: RwLock::new(BalanceCache::default()),
        }
    }

    /// Cache hit for today, or the generation a fresh computation must be stored under.
    async fn cached(&self, student_id: i64, today: NaiveDate) -> Result<LessonBalance, u64> {
        let cache = self.cache.read().await;
        cache
            .entries
            .get(&student_id)
            .filter(|entry| entry.as_of == today)
            .map(|entry| entry.balance)
            .ok_or(cache.generation)
    }

    async fn remember(
        &self,
        student_id: i64,
        today: NaiveDate,
        balance: LessonBalance,
        generation: u64,
    ) {
        let mut cache = self.cache.write().await;
        if cache.generation != generation {
            debug!(student_id, "balance invalidated while computing; not cached");
            return;
        }
        cache.entries.insert(
            student_id,
            CachedBalance {
                as_of: today,
                balance,
            },
        );
    }

    /// On-demand path: one aggregate query unless cached.
    pub async fn balance(&self, student_id: i64) -> Result<LessonBalance, DomainError> {
        let today = self.clock.today();
        let generation = match self.cached(student_id, today).await {
            Ok(hit) => return Ok(hit),
            Err(generation) => generation,
        };
        let balance = LessonBalance::from(self.billing.balance_inputs(student_id, today).await?);
        self.remember(student_id, today, balance, generation).await;
        Ok(balance)
    }

    /// Prefetched path: computes from rows the caller already loaded. No query.
    pub async fn balance_from_records(
        &self,
        student_id: i64,
        subscriptions: &[Subscription],
        records: &[AttendanceRecord],
    ) -> LessonBalance {
        let today = self.clock.today();
        let generation = match self.cached(student_id, today).await {
            Ok(hit) => return hit,
            Err(generation) => generation,
        };
        let balance = LessonBalance::from_records(subscriptions, records, today);
        self.remember(student_id, today, balance, generation).await;
        balance
    }

    /// Batch path: cached entries are reused, everything else comes from one aggregate query.
    /// Unknown student ids get a zero balance.
    pub async fn balances(
        &self,
        student_ids: &[i64],
    ) -> Result<HashMap<i64, LessonBalance>, DomainError> {
        let today = self.clock.today();
        let mut out = HashMap::with_capacity(student_ids.len());
        let mut missing = Vec::new();
        let generation = {
            let cache = self.cache.read().await;
            for id in student_ids {
                match cache.entries.get(id).filter(|entry| entry.as_of == today) {
                    Some(entry) => {
                        out.insert(*id, entry.balance);
                    }
                    None => missing.push(*id),
                }
            }
            cache.generation
        };
        if missing.is_empty() {
            return Ok(out);
        }

        let inputs = self.billing.all_balance_inputs(today).await?;
        let mut cache = self.cache.write().await;
        let store = cache.generation == generation;
        for id in missing {
            let balance = inputs
                .get(&id)
                .copied()
                .map(LessonBalance::from)
                .unwrap_or_default();
            if store {
                cache.entries.insert(id, CachedBalance { as_of: today, balance });
            }
            out.insert(id, balance);
        }
        debug!(students = out.len(), "balances computed in batch");
        Ok(out)
    }

    pub async fn invalidate(&self, student_ids: &[i64]) {
        if student_ids.is_empty() {
            return;
        }
        let mut cache = self.cache.write().await;
        cache.generation += 1;
        for id in student_ids {
            cache.entries.remove(id);
        }
    }

    pub async fn invalidate_all(&self) {
        let mut cache = self.cache.write().await;
        cache.generation += 1;
        cache.entries.clear();
    }

    /// Administrator only. The student must have an enrollment (any state) in the course.
    pub async fn create_subscription(
        &self,
        actor: &Account,
        subscription: &NewSubscription,
    ) -> Result<Subscription, DomainError> {
        require_admin(actor)?;
        if subscription.lessons_included == 0 {
            return Err(ValidationError::NonPositiveLessonCount.into());
        }
        if subscription.lessons_included > MAX_LESSONS_PER_SUBSCRIPTION {
            return Err(ValidationError::TooManyLessons(MAX_LESSONS_PER_SUBSCRIPTION).into());
        }
        if subscription.price_minor < 0 {
            return Err(ValidationError::NegativePrice.into());
        }
        let enrollments = self
            .roster
            .enrollments_for_pair(subscription.student_id, subscription.course_id)
            .await?;
        if enrollments.is_empty() {
            return Err(ValidationError::StudentNotEnrolled.into());
        }

        let created = self.billing.create_subscription(subscription).await?;
        self.invalidate(&[created.student_id]).await;
        info!(
            actor = actor.id,
            subscription_id = created.id,
            student_id = created.student_id,
            "subscription created"
        );
        Ok(created)
    }

    pub async fn subscriptions_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Subscription>, DomainError> {
        self.billing.subscriptions_for_student(student_id).await
    }

    pub async fn recent_subscriptions(
        &self,
        actor: &Account,
        limit: u32,
    ) -> Result<Vec<Subscription>, DomainError> {
        require_admin(actor)?;
        self.billing.recent_subscriptions(limit).await
    }
}
