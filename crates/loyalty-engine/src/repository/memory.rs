//! 内存仓储
//!
//! 所有仓储 trait 的内存实现，状态由一把 `parking_lot::Mutex` 保护，
//! 因此账本追加和优惠券核销与数据库实现一样是原子的。适用于测试和嵌入式场景。

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::traits::{
    AccountRepositoryTrait, CouponRepositoryTrait, GiftRepositoryTrait,
    LevelCatalogRepositoryTrait, PointLedgerRepositoryTrait, RedeemOutcome, RedemptionRequest,
    SettingsRepositoryTrait,
};
use super::balance_overflow;
use crate::error::{CouponRejection, LoyaltyError, Result};
use crate::models::{
    Coupon, CouponRedemption, GiftClaim, LevelDefinition, LevelGift, LoyaltyAccount,
    PointEntry, PointTransaction,
};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, LoyaltyAccount>,
    transactions: Vec<PointTransaction>,
    levels: Vec<LevelDefinition>,
    gifts: Vec<LevelGift>,
    claims: Vec<GiftClaim>,
    settings: HashMap<String, String>,
    /// 以规范化优惠券码为 key
    coupons: HashMap<String, Coupon>,
    redemptions: Vec<CouponRedemption>,
}

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryLoyaltyStore {
    state: Mutex<State>,
}

impl InMemoryLoyaltyStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== 数据准备 ====================

    pub fn insert_account(&self, account: LoyaltyAccount) {
        self.state
            .lock()
            .accounts
            .insert(account.user_id.clone(), account);
    }

    pub fn set_levels(&self, levels: Vec<LevelDefinition>) {
        self.state.lock().levels = levels;
    }

    pub fn add_level_gift(&self, level: i16, name: impl Into<String>) -> LevelGift {
        let mut state = self.state.lock();
        let gift = LevelGift {
            id: state.gifts.len() as i64 + 1,
            level,
            name: name.into(),
            description: None,
        };
        state.gifts.push(gift.clone());
        gift
    }

    pub fn set_setting(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state.lock().settings.insert(key.into(), value.into());
    }

    /// 直接写入优惠券（覆盖同码优惠券），用于测试准备数据
    pub fn insert_coupon(&self, coupon: Coupon) {
        self.state.lock().coupons.insert(coupon.code.clone(), coupon);
    }

    // ==================== 数据检查 ====================

    pub fn account(&self, user_id: &str) -> Option<LoyaltyAccount> {
        self.state.lock().accounts.get(user_id).cloned()
    }

    pub fn coupon(&self, code: &str) -> Option<Coupon> {
        self.state.lock().coupons.get(code).cloned()
    }

    /// 用户全部流水，按写入顺序（时间正序）
    pub fn transactions_for(&self, user_id: &str) -> Vec<PointTransaction> {
        self.state
            .lock()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn redemptions_for(&self, coupon_id: Uuid) -> Vec<CouponRedemption> {
        self.state
            .lock()
            .redemptions
            .iter()
            .filter(|r| r.coupon_id == coupon_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AccountRepositoryTrait for InMemoryLoyaltyStore {
    async fn get_account(&self, user_id: &str) -> Result<Option<LoyaltyAccount>> {
        Ok(self.account(user_id))
    }

    async fn update_level(&self, user_id: &str, level: i16) -> Result<bool> {
        let mut state = self.state.lock();
        match state.accounts.get_mut(user_id) {
            Some(account) => {
                account.loyalty_level = level;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PointLedgerRepositoryTrait for InMemoryLoyaltyStore {
    async fn append_entry(&self, entry: &PointEntry) -> Result<PointTransaction> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let account = state
            .accounts
            .get_mut(&entry.user_id)
            .ok_or_else(|| LoyaltyError::AccountNotFound(entry.user_id.clone()))?;

        let balance = account.loyalty_points;
        let transaction = entry
            .apply_to(balance)
            .ok_or_else(|| balance_overflow(balance, entry.points))?;
        account.loyalty_points = transaction.balance_after;
        state.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PointTransaction>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let state = self.state.lock();
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LevelCatalogRepositoryTrait for InMemoryLoyaltyStore {
    async fn list_levels(&self) -> Result<Vec<LevelDefinition>> {
        Ok(self.state.lock().levels.clone())
    }
}

#[async_trait]
impl GiftRepositoryTrait for InMemoryLoyaltyStore {
    async fn list_level_gifts(&self) -> Result<Vec<LevelGift>> {
        Ok(self.state.lock().gifts.clone())
    }

    async fn list_claims(&self, user_id: &str) -> Result<Vec<GiftClaim>> {
        Ok(self
            .state
            .lock()
            .claims
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_claim(&self, claim: &GiftClaim) -> Result<bool> {
        let mut state = self.state.lock();
        let exists = state
            .claims
            .iter()
            .any(|c| c.user_id == claim.user_id && c.level == claim.level);
        if exists {
            return Ok(false);
        }
        state.claims.push(claim.clone());
        Ok(true)
    }
}

#[async_trait]
impl SettingsRepositoryTrait for InMemoryLoyaltyStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().settings.get(key).cloned())
    }
}

#[async_trait]
impl CouponRepositoryTrait for InMemoryLoyaltyStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.coupon(code))
    }

    async fn count_user_redemptions(&self, coupon_id: Uuid, user_id: &str) -> Result<i64> {
        let state = self.state.lock();
        Ok(count_redemptions(&state.redemptions, coupon_id, user_id))
    }

    async fn create(&self, coupon: &Coupon) -> Result<bool> {
        let mut state = self.state.lock();
        if state.coupons.contains_key(&coupon.code) {
            return Ok(false);
        }
        state.coupons.insert(coupon.code.clone(), coupon.clone());
        Ok(true)
    }

    async fn set_active(&self, code: &str, active: bool) -> Result<bool> {
        let mut state = self.state.lock();
        match state.coupons.get_mut(code) {
            Some(coupon) => {
                coupon.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn redeem(&self, request: &RedemptionRequest) -> Result<RedeemOutcome> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(coupon) = state.coupons.values_mut().find(|c| c.id == request.coupon_id) else {
            return Ok(RedeemOutcome::Rejected(CouponRejection::NotFound));
        };
        if !coupon.is_active {
            return Ok(RedeemOutcome::Rejected(CouponRejection::Inactive));
        }
        if coupon.is_exhausted() {
            return Ok(RedeemOutcome::Rejected(CouponRejection::UsageExceeded));
        }
        if let (Some(limit), Some(user_id)) = (coupon.max_uses_per_user, &request.user_id) {
            if count_redemptions(&state.redemptions, coupon.id, user_id) >= i64::from(limit) {
                return Ok(RedeemOutcome::Rejected(CouponRejection::PerUserLimit));
            }
        }

        coupon.current_uses += 1;
        let redemption = CouponRedemption {
            id: Uuid::now_v7(),
            coupon_id: coupon.id,
            user_id: request.user_id.clone(),
            order_reference: request.order_reference.clone(),
            discount_amount: request.discount_amount,
            redeemed_at: request.redeemed_at,
        };
        state.redemptions.push(redemption.clone());
        Ok(RedeemOutcome::Redeemed(redemption))
    }
}

fn count_redemptions(redemptions: &[CouponRedemption], coupon_id: Uuid, user_id: &str) -> i64 {
    redemptions
        .iter()
        .filter(|r| r.coupon_id == coupon_id && r.user_id.as_deref() == Some(user_id))
        .count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CouponType, Money, PointReason};
    use chrono::Utc;

    fn entry(user_id: &str, points: i64) -> PointEntry {
        PointEntry::new(user_id, points, PointReason::Purchase, None)
    }

    fn limited_coupon(max_uses: Option<i32>, per_user: Option<i32>) -> Coupon {
        let now = Utc::now();
        Coupon {
            id: Uuid::now_v7(),
            code: "ONCE".to_string(),
            coupon_type: CouponType::FixedAmount,
            value: 500,
            min_order_amount: None,
            max_discount: None,
            valid_from: now,
            valid_until: None,
            max_uses,
            current_uses: 0,
            max_uses_per_user: per_user,
            is_active: true,
            created_at: now,
        }
    }

    fn request(coupon: &Coupon, user_id: &str) -> RedemptionRequest {
        RedemptionRequest {
            coupon_id: coupon.id,
            user_id: Some(user_id.to_string()),
            order_reference: None,
            discount_amount: Money::from_cents(500),
            redeemed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_entry_reads_current_balance() {
        let store = InMemoryLoyaltyStore::new();
        store.insert_account(LoyaltyAccount::new("u-1"));

        let first = store.append_entry(&entry("u-1", 100)).await.unwrap();
        let second = store.append_entry(&entry("u-1", -30)).await.unwrap();

        assert_eq!((first.balance_before, first.balance_after), (0, 100));
        assert_eq!((second.balance_before, second.balance_after), (100, 70));
        assert_eq!(store.account("u-1").unwrap().loyalty_points, 70);
        assert_eq!(store.transactions_for("u-1").len(), 2);
    }

    #[tokio::test]
    async fn test_append_entry_unknown_account() {
        let store = InMemoryLoyaltyStore::new();
        let err = store.append_entry(&entry("ghost", 10)).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_append_entry_overflow_writes_nothing() {
        let store = InMemoryLoyaltyStore::new();
        store.insert_account(LoyaltyAccount {
            user_id: "u-1".to_string(),
            loyalty_points: i64::MAX,
            loyalty_level: 1,
        });

        let err = store.append_entry(&entry("u-1", 1)).await.unwrap_err();
        assert!(matches!(err, LoyaltyError::Validation(_)));
        assert_eq!(store.account("u-1").unwrap().loyalty_points, i64::MAX);
        assert!(store.transactions_for("u-1").is_empty());
    }

    #[tokio::test]
    async fn test_list_by_user_newest_first() {
        let store = InMemoryLoyaltyStore::new();
        store.insert_account(LoyaltyAccount::new("u-1"));
        store.append_entry(&entry("u-1", 10)).await.unwrap();
        store.append_entry(&entry("u-1", 20)).await.unwrap();

        let history = store.list_by_user("u-1", 1).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].balance_after, 30);
    }

    #[tokio::test]
    async fn test_claim_unique_per_level() {
        let store = InMemoryLoyaltyStore::new();
        let claim = GiftClaim {
            user_id: "u-1".to_string(),
            level: 2,
            claimed_at: Utc::now(),
        };
        assert!(store.create_claim(&claim).await.unwrap());
        assert!(!store.create_claim(&claim).await.unwrap());
        assert_eq!(store.list_claims("u-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redeem_rechecks_caps() {
        let store = InMemoryLoyaltyStore::new();
        let coupon = limited_coupon(Some(1), None);
        store.insert_coupon(coupon.clone());

        let first = store.redeem(&request(&coupon, "u-1")).await.unwrap();
        assert!(matches!(first, RedeemOutcome::Redeemed(_)));

        let second = store.redeem(&request(&coupon, "u-2")).await.unwrap();
        assert_eq!(
            second,
            RedeemOutcome::Rejected(CouponRejection::UsageExceeded)
        );
        assert_eq!(store.coupon("ONCE").unwrap().current_uses, 1);
    }

    #[tokio::test]
    async fn test_redeem_per_user_limit() {
        let store = InMemoryLoyaltyStore::new();
        let coupon = limited_coupon(None, Some(1));
        store.insert_coupon(coupon.clone());

        store.redeem(&request(&coupon, "u-1")).await.unwrap();
        let again = store.redeem(&request(&coupon, "u-1")).await.unwrap();
        assert_eq!(again, RedeemOutcome::Rejected(CouponRejection::PerUserLimit));

        let other = store.redeem(&request(&coupon, "u-2")).await.unwrap();
        assert!(matches!(other, RedeemOutcome::Redeemed(_)));
        assert_eq!(store.count_user_redemptions(coupon.id, "u-1").await.unwrap(), 1);
    }
}
