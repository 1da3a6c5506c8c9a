//! 服务层
//!
//! 账本写入、等级对账与等级礼品三块有状态的业务流程，
//! 所有存储访问都通过构造时注入的仓储完成。

mod gift_entitlement;
mod level_transition;
mod point_ledger;

pub use gift_entitlement::GiftEntitlementTracker;
pub use level_transition::{LevelTransition, LevelTransitionService};
pub use point_ledger::{audit_chain, PointLedger, DEFAULT_HISTORY_LIMIT};
