//! 徽章规则
//!
//! 每条规则是一个无状态谓词，由 slug 唯一标识。

use std::fmt;

use super::signal::BadgeSignal;

/// 内置徽章 slug
pub mod slugs {
    pub const NIGHT_OWL: &str = "night-owl";
    pub const REGION_EXPLORER: &str = "region-explorer";
    pub const VINTAGE_COLLECTOR: &str = "vintage-collector";
    pub const EVENT_GUEST: &str = "event-guest";
    pub const LOYAL_MEMBER: &str = "loyal-member";
}

/// 徽章规则 Trait
pub trait BadgeRule: Send + Sync {
    fn slug(&self) -> &str;

    fn evaluate(&self, signal: &BadgeSignal) -> bool;
}

/// 下单时段规则
///
/// 左闭右开的小时区间，`start > end` 时跨越午夜（如 22 点到次日 5 点）。
#[derive(Debug, Clone)]
pub struct HourWindowRule {
    slug: String,
    start_hour: u32,
    end_hour: u32,
}

impl HourWindowRule {
    pub fn new(slug: impl Into<String>, start_hour: u32, end_hour: u32) -> Self {
        Self {
            slug: slug.into(),
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
        }
    }

    fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl BadgeRule for HourWindowRule {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn evaluate(&self, signal: &BadgeSignal) -> bool {
        signal
            .order_hour
            .is_some_and(|hour| hour < 24 && self.contains(hour))
    }
}

/// 计数类信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMetric {
    DistinctRegions,
    DistinctVintages,
    TenureMonths,
}

impl CountMetric {
    fn read(self, signal: &BadgeSignal) -> Option<u32> {
        match self {
            Self::DistinctRegions => signal.distinct_regions,
            Self::DistinctVintages => signal.distinct_vintages,
            Self::TenureMonths => signal.tenure_months,
        }
    }
}

/// 计数阈值规则：信号值 >= 阈值
#[derive(Debug, Clone)]
pub struct MinCountRule {
    slug: String,
    metric: CountMetric,
    threshold: u32,
}

impl MinCountRule {
    pub fn new(slug: impl Into<String>, metric: CountMetric, threshold: u32) -> Self {
        Self {
            slug: slug.into(),
            metric,
            threshold,
        }
    }
}

impl BadgeRule for MinCountRule {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn evaluate(&self, signal: &BadgeSignal) -> bool {
        self.metric
            .read(signal)
            .is_some_and(|value| value >= self.threshold)
    }
}

/// 活动出席规则
#[derive(Debug, Clone)]
pub struct EventFlagRule {
    slug: String,
}

impl EventFlagRule {
    pub fn new(slug: impl Into<String>) -> Self {
        Self { slug: slug.into() }
    }
}

impl BadgeRule for EventFlagRule {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn evaluate(&self, signal: &BadgeSignal) -> bool {
        signal.attended_event
    }
}

/// 自定义谓词规则
pub struct PredicateRule {
    slug: String,
    predicate: Box<dyn Fn(&BadgeSignal) -> bool + Send + Sync>,
}

impl PredicateRule {
    pub fn new<F>(slug: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&BadgeSignal) -> bool + Send + Sync + 'static,
    {
        Self {
            slug: slug.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl fmt::Debug for PredicateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRule")
            .field("slug", &self.slug)
            .finish_non_exhaustive()
    }
}

impl BadgeRule for PredicateRule {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn evaluate(&self, signal: &BadgeSignal) -> bool {
        (self.predicate)(signal)
    }
}
