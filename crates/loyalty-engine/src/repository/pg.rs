//! PostgreSQL 仓储
//!
//! 基于 SQLx 的仓储实现。表结构见 `migrations/`。
//! 账本追加和优惠券核销都在单个数据库事务内通过 `FOR UPDATE` 行锁完成读改写。
//! 数据库因死锁或序列化失败中止事务时返回 `ConcurrencyConflict`，由服务层重试。

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use loyalty_shared::config::DatabaseConfig;
use loyalty_shared::observability::metrics;

use super::balance_overflow;
use super::traits::{
    AccountRepositoryTrait, CouponRepositoryTrait, GiftRepositoryTrait,
    LevelCatalogRepositoryTrait, PointLedgerRepositoryTrait, RedeemOutcome, RedemptionRequest,
    SettingsRepositoryTrait,
};
use crate::error::{CouponRejection, LoyaltyError, Result};
use crate::models::{
    Coupon, CouponRedemption, GiftClaim, LevelDefinition, LevelGift, LoyaltyAccount,
    PointEntry, PointTransaction,
};

const COUPON_COLUMNS: &str = r#"
    id, code, coupon_type, value, min_order_amount, max_discount, valid_from, valid_until,
    max_uses, current_uses, max_uses_per_user, is_active, created_at
"#;

/// PostgreSQL 存储
#[derive(Clone)]
pub struct PgLoyaltyStore {
    pool: PgPool,
}

impl PgLoyaltyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 按配置创建连接池并执行内置迁移
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!(
            max_connections = config.max_connections,
            "会员积分存储已就绪"
        );
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 执行内置迁移
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LoyaltyError::Internal(format!("迁移失败: {}", e)))
    }

    /// 开立会员账户（已存在时原样返回）
    ///
    /// 账户归宿主系统所有，这里只在宿主首次引用用户时补齐积分字段
    pub async fn open_account(&self, user_id: &str) -> Result<LoyaltyAccount> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.get_account(user_id)
            .await?
            .ok_or_else(|| LoyaltyError::AccountNotFound(user_id.to_string()))
    }

    /// 锁定账户行后读取余额、写入流水并更新余额，全部在同一事务内完成
    async fn append_locked(&self, entry: &PointEntry) -> Result<PointTransaction> {
        let mut tx = self.pool.begin().await?;

        // 同一用户的写入在这里排队
        let current: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT loyalty_points
            FROM loyalty_accounts
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(&entry.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            return Err(LoyaltyError::AccountNotFound(entry.user_id.clone()));
        };

        let Some(transaction) = entry.apply_to(current) else {
            tx.rollback().await?;
            return Err(balance_overflow(current, entry.points));
        };

        sqlx::query(
            r#"
            INSERT INTO point_transactions
                (id, user_id, points, reason, balance_before, balance_after, reference_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.user_id)
        .bind(transaction.points)
        .bind(transaction.reason)
        .bind(transaction.balance_before)
        .bind(transaction.balance_after)
        .bind(&transaction.reference_id)
        .bind(transaction.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE loyalty_accounts
            SET loyalty_points = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(&transaction.user_id)
        .bind(transaction.balance_after)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transaction)
    }
}

/// 死锁（40P01）与序列化失败（40001）会回滚整个事务，可以安全重试
fn is_transient_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40P01" | "40001")),
        _ => false,
    }
}

#[async_trait]
impl AccountRepositoryTrait for PgLoyaltyStore {
    async fn get_account(&self, user_id: &str) -> Result<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            SELECT user_id, loyalty_points, loyalty_level
            FROM loyalty_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn update_level(&self, user_id: &str, level: i16) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE loyalty_accounts
            SET loyalty_level = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(level)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl PointLedgerRepositoryTrait for PgLoyaltyStore {
    #[instrument(skip(self, entry), fields(user_id = %entry.user_id))]
    async fn append_entry(&self, entry: &PointEntry) -> Result<PointTransaction> {
        self.append_locked(entry).await.map_err(|err| match err {
            LoyaltyError::Database(db) if is_transient_conflict(&db) => {
                metrics::record_ledger_conflict();
                debug!(error = %db, "账本事务被数据库中止");
                LoyaltyError::ConcurrencyConflict
            }
            other => other,
        })
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PointTransaction>> {
        let transactions = sqlx::query_as::<_, PointTransaction>(
            r#"
            SELECT id, user_id, points, reason, balance_before, balance_after,
                   reference_id, created_at
            FROM point_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}

#[async_trait]
impl LevelCatalogRepositoryTrait for PgLoyaltyStore {
    async fn list_levels(&self) -> Result<Vec<LevelDefinition>> {
        let levels = sqlx::query_as::<_, LevelDefinition>(
            r#"
            SELECT level, name, min_points, max_points, benefits
            FROM loyalty_levels
            ORDER BY level
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(levels)
    }
}

#[async_trait]
impl GiftRepositoryTrait for PgLoyaltyStore {
    async fn list_level_gifts(&self) -> Result<Vec<LevelGift>> {
        let gifts = sqlx::query_as::<_, LevelGift>(
            r#"
            SELECT id, level, name, description
            FROM level_gifts
            ORDER BY level, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(gifts)
    }

    async fn list_claims(&self, user_id: &str) -> Result<Vec<GiftClaim>> {
        let claims = sqlx::query_as::<_, GiftClaim>(
            r#"
            SELECT user_id, level, claimed_at
            FROM gift_claims
            WHERE user_id = $1
            ORDER BY level
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(claims)
    }

    async fn create_claim(&self, claim: &GiftClaim) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO gift_claims (user_id, level, claimed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, level) DO NOTHING
            "#,
        )
        .bind(&claim.user_id)
        .bind(claim.level)
        .bind(claim.claimed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl SettingsRepositoryTrait for PgLoyaltyStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }
}

#[async_trait]
impl CouponRepositoryTrait for PgLoyaltyStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let sql = format!("SELECT {} FROM coupons WHERE code = $1", COUPON_COLUMNS);
        let coupon = sqlx::query_as::<_, Coupon>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(coupon)
    }

    async fn count_user_redemptions(&self, coupon_id: Uuid, user_id: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS cnt
            FROM coupon_redemptions
            WHERE coupon_id = $1 AND user_id = $2
            "#,
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("cnt"))
    }

    async fn create(&self, coupon: &Coupon) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO coupons
                (id, code, coupon_type, value, min_order_amount, max_discount, valid_from,
                 valid_until, max_uses, current_uses, max_uses_per_user, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(coupon.id)
        .bind(&coupon.code)
        .bind(coupon.coupon_type)
        .bind(coupon.value)
        .bind(coupon.min_order_amount)
        .bind(coupon.max_discount)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.max_uses)
        .bind(coupon.current_uses)
        .bind(coupon.max_uses_per_user)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_active(&self, code: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE coupons SET is_active = $2 WHERE code = $1")
            .bind(code)
            .bind(active)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, request), fields(coupon_id = %request.coupon_id))]
    async fn redeem(&self, request: &RedemptionRequest) -> Result<RedeemOutcome> {
        let mut tx = self.pool.begin().await?;

        // 行锁保证检查与递增是一个原子单元
        let sql = format!(
            "SELECT {} FROM coupons WHERE id = $1 FOR UPDATE",
            COUPON_COLUMNS
        );
        let coupon = sqlx::query_as::<_, Coupon>(&sql)
            .bind(request.coupon_id)
            .fetch_optional(&mut *tx)
            .await?;

        let rejection = match &coupon {
            None => Some(CouponRejection::NotFound),
            Some(c) if !c.is_active => Some(CouponRejection::Inactive),
            Some(c) if c.is_exhausted() => Some(CouponRejection::UsageExceeded),
            Some(_) => None,
        };
        if let Some(rejection) = rejection {
            tx.rollback().await?;
            return Ok(RedeemOutcome::Rejected(rejection));
        }

        if let (Some(limit), Some(user_id)) = (
            coupon.as_ref().and_then(|c| c.max_uses_per_user),
            request.user_id.as_deref(),
        ) {
            let used: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*)
                FROM coupon_redemptions
                WHERE coupon_id = $1 AND user_id = $2
                "#,
            )
            .bind(request.coupon_id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            if used >= i64::from(limit) {
                tx.rollback().await?;
                return Ok(RedeemOutcome::Rejected(CouponRejection::PerUserLimit));
            }
        }

        sqlx::query("UPDATE coupons SET current_uses = current_uses + 1 WHERE id = $1")
            .bind(request.coupon_id)
            .execute(&mut *tx)
            .await?;

        let redemption = CouponRedemption {
            id: Uuid::now_v7(),
            coupon_id: request.coupon_id,
            user_id: request.user_id.clone(),
            order_reference: request.order_reference.clone(),
            discount_amount: request.discount_amount,
            redeemed_at: request.redeemed_at,
        };

        sqlx::query(
            r#"
            INSERT INTO coupon_redemptions
                (id, coupon_id, user_id, order_reference, discount_amount, redeemed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(redemption.id)
        .bind(redemption.coupon_id)
        .bind(&redemption.user_id)
        .bind(&redemption.order_reference)
        .bind(redemption.discount_amount)
        .bind(redemption.redeemed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RedeemOutcome::Redeemed(redemption))
    }
}
