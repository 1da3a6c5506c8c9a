//! 等级对账服务
//!
//! 存储的等级只是 `resolve_level(当前余额)` 的缓存。对账直接与目标等级比较，
//! 一次跨越多个等级的积分变动也只产生一次变更；重复或乱序执行都会收敛到同一结果。

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use loyalty_shared::observability::metrics;

use crate::catalog::LevelCatalog;
use crate::error::{LoyaltyError, Result};
use crate::repository::AccountRepositoryTrait;

/// 对账结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelTransition {
    pub user_id: String,
    pub changed: bool,
    pub old_level: i16,
    pub new_level: i16,
}

impl LevelTransition {
    pub fn is_upgrade(&self) -> bool {
        self.new_level > self.old_level
    }
}

/// 等级对账服务
pub struct LevelTransitionService<A>
where
    A: AccountRepositoryTrait,
{
    accounts: Arc<A>,
    catalog: Arc<LevelCatalog>,
}

impl<A> LevelTransitionService<A>
where
    A: AccountRepositoryTrait,
{
    pub fn new(accounts: Arc<A>, catalog: Arc<LevelCatalog>) -> Self {
        Self { accounts, catalog }
    }

    pub fn catalog(&self) -> &LevelCatalog {
        &self.catalog
    }

    /// 按当前余额重新计算等级，与存储值不同时写回
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn reconcile(&self, user_id: &str) -> Result<LevelTransition> {
        let account = self
            .accounts
            .get_account(user_id)
            .await?
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))?;

        let resolved = self.catalog.resolve_level(account.loyalty_points);
        let old_level = account.loyalty_level;
        let new_level = resolved.level;

        if new_level == old_level {
            debug!(level = old_level, "等级无变化");
            return Ok(LevelTransition {
                user_id: user_id.to_string(),
                changed: false,
                old_level,
                new_level,
            });
        }

        if !self.accounts.update_level(user_id, new_level).await? {
            return Err(LoyaltyError::AccountNotFound(user_id.to_string()));
        }

        metrics::record_level_transition(old_level, new_level);
        info!(
            user_id = %user_id,
            old_level,
            new_level,
            level_name = %resolved.name,
            points = account.loyalty_points,
            "会员等级已变更"
        );

        Ok(LevelTransition {
            user_id: user_id.to_string(),
            changed: true,
            old_level,
            new_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LoyaltyAccount;
    use crate::repository::MockAccountRepositoryTrait;

    fn service(
        points: i64,
        stored_level: i16,
        mut accounts: MockAccountRepositoryTrait,
    ) -> LevelTransitionService<MockAccountRepositoryTrait> {
        accounts.expect_get_account().returning(move |user_id| {
            Ok(Some(LoyaltyAccount {
                user_id: user_id.to_string(),
                loyalty_points: points,
                loyalty_level: stored_level,
            }))
        });
        LevelTransitionService::new(Arc::new(accounts), Arc::new(LevelCatalog::wine_club()))
    }

    #[tokio::test]
    async fn test_multi_level_jump_written_once() {
        let mut accounts = MockAccountRepositoryTrait::new();
        accounts
            .expect_update_level()
            .withf(|_, level| *level == 4)
            .times(1)
            .returning(|_, _| Ok(true));

        let transition = service(3_200, 1, accounts).reconcile("user-1").await.unwrap();
        assert!(transition.changed);
        assert!(transition.is_upgrade());
        assert_eq!((transition.old_level, transition.new_level), (1, 4));
    }

    #[tokio::test]
    async fn test_unchanged_level_skips_write() {
        let mut accounts = MockAccountRepositoryTrait::new();
        accounts.expect_update_level().never();

        let transition = service(700, 2, accounts).reconcile("user-1").await.unwrap();
        assert!(!transition.changed);
        assert_eq!(transition.new_level, 2);
    }

    #[tokio::test]
    async fn test_downgrade_after_clawback() {
        let mut accounts = MockAccountRepositoryTrait::new();
        accounts
            .expect_update_level()
            .withf(|_, level| *level == 1)
            .returning(|_, _| Ok(true));

        let transition = service(-20, 3, accounts).reconcile("user-1").await.unwrap();
        assert!(transition.changed);
        assert!(!transition.is_upgrade());
    }

    #[tokio::test]
    async fn test_missing_account() {
        let mut accounts = MockAccountRepositoryTrait::new();
        accounts.expect_get_account().returning(|_| Ok(None));
        let service =
            LevelTransitionService::new(Arc::new(accounts), Arc::new(LevelCatalog::wine_club()));

        let err = service.reconcile("ghost").await.unwrap_err();
        assert!(matches!(err, LoyaltyError::AccountNotFound(_)));
    }
}
