//! Daily download quota.
//!
//! The worker only talks to [`QuotaGate`]; account storage lives behind it. [`MemoryQuota`]
//! keeps accounts in memory, which is enough for a single bot process.

use crate::queue::{Tier, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[async_trait]
pub trait QuotaGate: Send + Sync {
    /// Whether the user may start another download today.
    async fn can_consume(&self, user: UserId) -> bool;

    /// Count one download against the user's daily limit.
    async fn record_consumption(&self, user: UserId);

    /// Checks and records one download in a single step. Implementations shared between
    /// workers should override this so two jobs cannot both take the last slot.
    async fn try_consume(&self, user: UserId) -> bool {
        if !self.can_consume(user).await {
            return false;
        }
        self.record_consumption(user).await;
        true
    }

    async fn current_tier(&self, user: UserId) -> Tier;
}

/// Per-tier daily limits, `None` meaning unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuotaLimits {
    pub standard: Option<u32>,
    pub gold: Option<u32>,
    pub diamond: Option<u32>,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            standard: Tier::Standard.daily_limit(),
            gold: Tier::Gold.daily_limit(),
            diamond: Tier::Diamond.daily_limit(),
        }
    }
}

impl QuotaLimits {
    pub fn for_tier(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::Standard => self.standard,
            Tier::Gold => self.gold,
            Tier::Diamond => self.diamond,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub tier: Tier,
    pub downloads_today: u32,
    pub limit: Option<u32>,
}

impl Usage {
    pub fn remaining(&self) -> Option<u32> {
        self.limit
            .map(|limit| limit.saturating_sub(self.downloads_today))
    }
}

#[derive(Debug, Clone)]
struct Account {
    tier: Tier,
    downloads_today: u32,
    last_reset: DateTime<Utc>,
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct MemoryQuota {
    accounts: RwLock<HashMap<UserId, Account>>,
    limits: QuotaLimits,
    clock: Clock,
}

impl MemoryQuota {
    pub fn new(limits: QuotaLimits) -> Self {
        Self::with_clock(limits, Arc::new(Utc::now))
    }

    pub fn with_clock(limits: QuotaLimits, clock: Clock) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            limits,
            clock,
        }
    }

    /// Sets a user's subscription tier, creating the account if needed.
    pub async fn grant(&self, user: UserId, tier: Tier) {
        let now = (self.clock)();
        let mut accounts = self.accounts.write().await;
        let account = accounts.entry(user).or_insert_with(|| Account::fresh(now));
        account.tier = tier;
        info!(%user, %tier, "Tier granted");
    }

    pub async fn usage(&self, user: UserId) -> Usage {
        let now = (self.clock)();
        let mut accounts = self.accounts.write().await;
        let account = accounts.entry(user).or_insert_with(|| Account::fresh(now));
        account.reset_if_needed(now);

        Usage {
            tier: account.tier,
            downloads_today: account.downloads_today,
            limit: self.limits.for_tier(account.tier),
        }
    }
}

impl Account {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            tier: Tier::Standard,
            downloads_today: 0,
            last_reset: now,
        }
    }

    fn reset_if_needed(&mut self, now: DateTime<Utc>) {
        if now - self.last_reset >= Duration::days(1) {
            debug!(downloads = self.downloads_today, "Resetting daily counter");
            self.downloads_today = 0;
            self.last_reset = now;
        }
    }
}

#[async_trait]
impl QuotaGate for MemoryQuota {
    async fn can_consume(&self, user: UserId) -> bool {
        let usage = self.usage(user).await;
        match usage.limit {
            None => true,
            Some(limit) => usage.downloads_today < limit,
        }
    }

    async fn record_consumption(&self, user: UserId) {
        let now = (self.clock)();
        let mut accounts = self.accounts.write().await;
        let account = accounts.entry(user).or_insert_with(|| Account::fresh(now));
        account.reset_if_needed(now);
        account.downloads_today += 1;
        debug!(%user, downloads_today = account.downloads_today, "Download recorded");
    }

    async fn try_consume(&self, user: UserId) -> bool {
        let now = (self.clock)();
        let mut accounts = self.accounts.write().await;
        let account = accounts.entry(user).or_insert_with(|| Account::fresh(now));
        account.reset_if_needed(now);

        if let Some(limit) = self.limits.for_tier(account.tier) {
            if account.downloads_today >= limit {
                return false;
            }
        }
        account.downloads_today += 1;
        debug!(%user, downloads_today = account.downloads_today, "Download recorded");
        true
    }

    async fn current_tier(&self, user: UserId) -> Tier {
        self.accounts
            .read()
            .await
            .get(&user)
            .map(|account| account.tier)
            .unwrap_or_default()
    }
}
