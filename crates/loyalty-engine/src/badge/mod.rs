//! 行为徽章资格判定
//!
//! 徽章 slug -> 纯谓词的注册表。本模块只回答"是否满足"，
//! 徽章的发放与持久化由调用方完成。

mod engine;
mod rules;
mod signal;

pub use engine::BadgeEligibilityEngine;
pub use rules::{
    slugs, BadgeRule, CountMetric, EventFlagRule, HourWindowRule, MinCountRule, PredicateRule,
};
pub use signal::BadgeSignal;
