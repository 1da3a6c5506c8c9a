//! 金额值对象
//!
//! 所有金额以最小货币单位（分）存储为整数，折扣计算不经过浮点数。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 金额（单位：分）
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// 按整数货币单位构造，如 `Money::from_major(15)` 表示 15.00
    pub const fn from_major(units: i64) -> Self {
        Self(units * 100)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// 整数货币单位部分（向下取整）
    pub const fn major_units(self) -> i64 {
        self.0.div_euclid(100)
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    pub fn saturating_sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
