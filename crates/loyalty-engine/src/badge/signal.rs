//! 徽章判定的上下文信号

use chrono::{DateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

/// 一次判定所需的行为信号
///
/// 各字段可缺省，缺省的信号视为不满足依赖它的规则。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BadgeSignal {
    /// 下单时刻（0-23，门店当地时间）
    pub order_hour: Option<u32>,
    /// 购买过的不同产区数
    pub distinct_regions: Option<u32>,
    /// 购买过的不同年份数
    pub distinct_vintages: Option<u32>,
    /// 是否参加过线下活动
    pub attended_event: bool,
    /// 注册至今的月数
    pub tenure_months: Option<u32>,
}

impl BadgeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order_hour(mut self, hour: u32) -> Self {
        self.order_hour = Some(hour);
        self
    }

    /// 取下单时间在其所在时区的小时数
    pub fn with_order_time<Tz: TimeZone>(self, at: &DateTime<Tz>) -> Self {
        self.with_order_hour(at.hour())
    }

    pub fn with_distinct_regions(mut self, count: u32) -> Self {
        self.distinct_regions = Some(count);
        self
    }

    pub fn with_distinct_vintages(mut self, count: u32) -> Self {
        self.distinct_vintages = Some(count);
        self
    }

    pub fn with_attended_event(mut self, attended: bool) -> Self {
        self.attended_event = attended;
        self
    }

    pub fn with_tenure_months(mut self, months: u32) -> Self {
        self.tenure_months = Some(months);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_order_time_uses_local_hour() {
        let utc = Utc.with_ymd_and_hms(2026, 3, 1, 21, 30, 0).unwrap();
        let berlin = utc.with_timezone(&FixedOffset::east_opt(3600).unwrap());

        assert_eq!(BadgeSignal::new().with_order_time(&utc).order_hour, Some(21));
        assert_eq!(BadgeSignal::new().with_order_time(&berlin).order_hour, Some(22));
    }

    #[test]
    fn test_deserialize_partial_signal() {
        let signal: BadgeSignal =
            serde_json::from_str(r#"{"distinctRegions": 6, "attendedEvent": true}"#).unwrap();
        assert_eq!(signal.distinct_regions, Some(6));
        assert!(signal.attended_event);
        assert_eq!(signal.order_hour, None);
    }
}
