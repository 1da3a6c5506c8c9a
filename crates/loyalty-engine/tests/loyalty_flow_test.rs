//! 积分、等级与礼品的完整流程测试
//!
//! 基于内存存储，无需外部依赖

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loyalty_engine::models::{LoyaltyAccount, PointEntry, PointReason, PointTransaction};
use loyalty_engine::repository::{
    AccountRepositoryTrait, InMemoryLoyaltyStore, PointLedgerRepositoryTrait,
    GIFT_VALIDITY_DAYS_KEY,
};
use loyalty_engine::service::audit_chain;
use loyalty_engine::{
    GiftEntitlementTracker, LevelCatalog, LevelTransitionService, LoyaltyError, Money, PointLedger,
};
use loyalty_shared::config::LoyaltyConfig;

type Store = InMemoryLoyaltyStore;

/// 每次访问前让出执行权的存储，用于放大并发写入的交错
struct YieldingStore {
    inner: InMemoryLoyaltyStore,
}

impl YieldingStore {
    async fn pause() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[async_trait]
impl AccountRepositoryTrait for YieldingStore {
    async fn get_account(&self, user_id: &str) -> loyalty_engine::Result<Option<LoyaltyAccount>> {
        let account = self.inner.get_account(user_id).await;
        Self::pause().await;
        account
    }

    async fn update_level(&self, user_id: &str, level: i16) -> loyalty_engine::Result<bool> {
        Self::pause().await;
        self.inner.update_level(user_id, level).await
    }
}

#[async_trait]
impl PointLedgerRepositoryTrait for YieldingStore {
    async fn append_entry(&self, entry: &PointEntry) -> loyalty_engine::Result<PointTransaction> {
        Self::pause().await;
        self.inner.append_entry(entry).await
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> loyalty_engine::Result<Vec<PointTransaction>> {
        self.inner.list_by_user(user_id, limit).await
    }
}

struct Harness {
    store: Arc<Store>,
    ledger: PointLedger<Store, Store>,
    levels: LevelTransitionService<Store>,
    gifts: GiftEntitlementTracker<Store, Store, Store>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryLoyaltyStore::new());
    let catalog = Arc::new(LevelCatalog::wine_club());
    let config = LoyaltyConfig::default();

    Harness {
        ledger: PointLedger::new(store.clone(), store.clone(), &config),
        levels: LevelTransitionService::new(store.clone(), catalog.clone()),
        gifts: GiftEntitlementTracker::new(
            store.clone(),
            store.clone(),
            store.clone(),
            catalog,
            &config,
        ),
        store,
    }
}

#[tokio::test]
async fn test_level_progression_with_multi_level_jump() {
    let h = harness();
    h.store.insert_account(LoyaltyAccount::new("alice"));

    let first = h.levels.reconcile("alice").await.unwrap();
    assert!(!first.changed);
    assert_eq!(first.new_level, 1);
    assert_eq!(h.levels.catalog().resolve_level(0).name, "Novize");

    h.ledger
        .record_transaction("alice", 550, PointReason::Bonus, Some("welcome"))
        .await
        .unwrap();
    let second = h.levels.reconcile("alice").await.unwrap();
    assert!(second.changed);
    assert_eq!((second.old_level, second.new_level), (1, 2));

    h.ledger
        .record_transaction("alice", 950, PointReason::Purchase, Some("order-1"))
        .await
        .unwrap();
    let third = h.levels.reconcile("alice").await.unwrap();
    assert_eq!((third.old_level, third.new_level), (2, 3));
    assert_eq!(
        h.levels.catalog().get(third.new_level).unwrap().name,
        "Kenner"
    );

    // 无新流水时重复对账不产生变化
    let again = h.levels.reconcile("alice").await.unwrap();
    assert!(!again.changed);
    assert_eq!(h.store.account("alice").unwrap().loyalty_level, 3);
}

#[tokio::test]
async fn test_single_grant_crosses_several_levels() {
    let h = harness();
    h.store.insert_account(LoyaltyAccount::new("bob"));

    h.ledger
        .record_transaction("bob", 10_000, PointReason::AdminAdjustment, None)
        .await
        .unwrap();
    let transition = h.levels.reconcile("bob").await.unwrap();

    assert_eq!((transition.old_level, transition.new_level), (1, 6));
}

#[tokio::test]
async fn test_ledger_balance_equals_sum_of_deltas() {
    let h = harness();
    h.store.insert_account(LoyaltyAccount::new("carol"));

    let deltas = [120, -30, 999, 1, -1_500, 42, 7];
    for delta in deltas {
        h.ledger
            .record_transaction("carol", delta, PointReason::AdminAdjustment, None)
            .await
            .unwrap();
    }

    let expected: i64 = deltas.iter().sum();
    assert_eq!(h.ledger.balance("carol").await.unwrap(), expected);

    let chain = h.store.transactions_for("carol");
    assert_eq!(chain.len(), deltas.len());
    assert_eq!(audit_chain(&chain).unwrap(), expected);

    // 负余额由调用方决定是否允许，账本本身不拒绝
    assert!(expected < 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_earning_with_default_config_records_every_event() {
    let store = Arc::new(YieldingStore {
        inner: InMemoryLoyaltyStore::new(),
    });
    store.inner.insert_account(LoyaltyAccount::new("erin"));
    let ledger = Arc::new(PointLedger::new(
        store.clone(),
        store.clone(),
        &LoyaltyConfig::default(),
    ));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            // 先读余额再写入，读写之间存在挂起点
            ledger.balance("erin").await?;
            ledger
                .record_transaction("erin", 10, PointReason::Purchase, None)
                .await
        }));
    }
    let failed = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| !matches!(r, Ok(Ok(_))))
        .count();

    assert_eq!(failed, 0);
    assert_eq!(ledger.balance("erin").await.unwrap(), 200);
    let chain = store.inner.transactions_for("erin");
    assert_eq!(chain.len(), 20);
    assert_eq!(audit_chain(&chain).unwrap(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_earning_loses_no_update() {
    let h = Arc::new(harness());
    h.store.insert_account(LoyaltyAccount::new("dave"));

    let mut handles = Vec::new();
    for i in 0..20 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            let reference = format!("order-{}", i);
            h.ledger
                .record_transaction("dave", 10, PointReason::Purchase, Some(&reference))
                .await
        }));
    }
    for handle in futures::future::join_all(handles).await {
        handle.unwrap().unwrap();
    }

    assert_eq!(h.ledger.balance("dave").await.unwrap(), 200);
    let chain = h.store.transactions_for("dave");
    assert_eq!(chain.len(), 20);
    assert_eq!(audit_chain(&chain).unwrap(), 200);
}

#[tokio::test]
async fn test_history_newest_first() {
    let h = harness();
    h.store.insert_account(LoyaltyAccount::new("erin"));

    for delta in [10, 20, 30] {
        h.ledger
            .record_transaction("erin", delta, PointReason::Bonus, None)
            .await
            .unwrap();
    }

    let history = h.ledger.history("erin", 2).await.unwrap();
    let points: Vec<i64> = history.iter().map(|t| t.points).collect();
    assert_eq!(points, vec![30, 20]);
}

#[tokio::test]
async fn test_earn_for_purchase_then_reconcile() {
    let h = harness();
    h.store.insert_account(LoyaltyAccount::new("frank"));

    let tx = h
        .ledger
        .earn_for_purchase("frank", Money::from_cents(52_050), "order-77")
        .await
        .unwrap()
        .expect("订单应产生积分");
    assert_eq!(tx.points, 520);
    assert_eq!(tx.reference_id.as_deref(), Some("order-77"));

    let transition = h.levels.reconcile("frank").await.unwrap();
    assert_eq!(transition.new_level, 2);
}

#[tokio::test]
async fn test_unknown_account() {
    let h = harness();

    let err = h
        .ledger
        .record_transaction("ghost", 10, PointReason::Bonus, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LoyaltyError::AccountNotFound(_)));
    assert!(h.store.transactions_for("ghost").is_empty());
}

#[tokio::test]
async fn test_unclaimed_gifts_exclude_claimed_levels() {
    let h = harness();
    h.store.insert_account(LoyaltyAccount {
        user_id: "gina".to_string(),
        loyalty_points: 1_600,
        loyalty_level: 3,
    });
    h.store.add_level_gift(1, "Willkommenspaket");
    h.store.add_level_gift(2, "Degustationsglas");
    h.store.add_level_gift(3, "Kellerführung");
    h.store.add_level_gift(4, "Magnumflasche");

    h.gifts.claim_gift("gina", 1).await.unwrap();

    let unclaimed = h.gifts.compute_unclaimed("gina").await.unwrap();
    let levels: Vec<i16> = unclaimed.iter().map(|u| u.level).collect();
    assert_eq!(levels, vec![2, 3]);
    assert!(unclaimed.iter().all(|u| u.validity_days == 14));

    // 领取后不再出现在待领取列表中
    h.gifts.claim_gift("gina", 3).await.unwrap();
    let unclaimed = h.gifts.compute_unclaimed("gina").await.unwrap();
    let levels: Vec<i16> = unclaimed.iter().map(|u| u.level).collect();
    assert_eq!(levels, vec![2]);

    let err = h.gifts.claim_gift("gina", 3).await.unwrap_err();
    assert_eq!(err.error_code(), "GIFT_ALREADY_CLAIMED");
}

#[tokio::test]
async fn test_gift_validity_setting_and_empty_configuration() {
    let h = harness();
    h.store.insert_account(LoyaltyAccount {
        user_id: "hans".to_string(),
        loyalty_points: 600,
        loyalty_level: 2,
    });

    // 未配置礼品时返回空列表
    assert!(h.gifts.compute_unclaimed("hans").await.unwrap().is_empty());

    h.store.add_level_gift(2, "Degustationsglas");
    h.store.set_setting(GIFT_VALIDITY_DAYS_KEY, "21");

    let unclaimed = h.gifts.compute_unclaimed("hans").await.unwrap();
    assert_eq!(unclaimed.len(), 1);
    assert_eq!(unclaimed[0].level_name, "Kellerfreund");
    assert_eq!(unclaimed[0].validity_days, 21);
}

#[tokio::test]
async fn test_catalog_loaded_from_store() {
    let store = InMemoryLoyaltyStore::new();
    store.set_levels(LevelCatalog::wine_club().levels().to_vec());

    let catalog = LevelCatalog::load(&store).await.unwrap();
    assert_eq!(catalog, LevelCatalog::wine_club());

    let empty = InMemoryLoyaltyStore::new();
    let err = LevelCatalog::load(&empty).await.unwrap_err();
    assert!(matches!(err, LoyaltyError::Configuration(_)));
}
