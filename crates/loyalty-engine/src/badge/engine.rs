//! 徽章规则注册表
//!
//! 以 slug 为 key 存储规则实例，相同 slug 重复注册时后者覆盖前者。
//! 未注册的 slug 判定为 false，不返回错误。
//!
//! ```ignore
//! use loyalty_engine::badge::{BadgeEligibilityEngine, BadgeSignal};
//!
//! let engine = BadgeEligibilityEngine::with_defaults();
//! let signal = BadgeSignal::new().with_order_hour(23);
//! assert!(engine.evaluate("night-owl", &signal));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::rules::{
    slugs, BadgeRule, CountMetric, EventFlagRule, HourWindowRule, MinCountRule,
};
use super::signal::BadgeSignal;

/// 徽章资格判定引擎
#[derive(Default)]
pub struct BadgeEligibilityEngine {
    rules: HashMap<String, Arc<dyn BadgeRule>>,
}

impl BadgeEligibilityEngine {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一条规则
    pub fn register(&mut self, rule: Arc<dyn BadgeRule>) -> &mut Self {
        let slug = rule.slug().to_string();
        debug!(slug = %slug, "注册徽章规则");
        self.rules.insert(slug, rule);
        self
    }

    /// 判定单个徽章
    pub fn evaluate(&self, slug: &str, signal: &BadgeSignal) -> bool {
        match self.rules.get(slug) {
            Some(rule) => rule.evaluate(signal),
            None => {
                debug!(slug = %slug, "未注册的徽章 slug");
                false
            }
        }
    }

    /// 所有满足条件的徽章 slug（按字母序）
    pub fn eligible_badges(&self, signal: &BadgeSignal) -> Vec<String> {
        let mut eligible: Vec<String> = self
            .rules
            .iter()
            .filter(|(_, rule)| rule.evaluate(signal))
            .map(|(slug, _)| slug.clone())
            .collect();
        eligible.sort();
        eligible
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.rules.contains_key(slug)
    }

    /// 已注册的 slug（按字母序）
    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.rules.keys().cloned().collect();
        slugs.sort();
        slugs
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 内置规则
    ///
    /// - night-owl: 22:00 至次日 05:00 之间下单
    /// - region-explorer: 至少 5 个不同产区
    /// - vintage-collector: 至少 10 个不同年份
    /// - event-guest: 参加过线下活动
    /// - loyal-member: 注册满 12 个月
    pub fn with_defaults() -> Self {
        let mut engine = Self::new();

        engine
            .register(Arc::new(HourWindowRule::new(slugs::NIGHT_OWL, 22, 5)))
            .register(Arc::new(MinCountRule::new(
                slugs::REGION_EXPLORER,
                CountMetric::DistinctRegions,
                5,
            )))
            .register(Arc::new(MinCountRule::new(
                slugs::VINTAGE_COLLECTOR,
                CountMetric::DistinctVintages,
                10,
            )))
            .register(Arc::new(EventFlagRule::new(slugs::EVENT_GUEST)))
            .register(Arc::new(MinCountRule::new(
                slugs::LOYAL_MEMBER,
                CountMetric::TenureMonths,
                12,
            )));

        info!(rule_count = engine.len(), "默认徽章规则初始化完成");
        engine
    }
}
