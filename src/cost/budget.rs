//! Per-key budget state and period rollover.

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Budget accounting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Daily,
    Weekly,
    Monthly,
}

/// How a budget limit is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetLimitType {
    /// Exceeding is allowed; the overrun itself is the signal
    Soft,
    /// Callers are expected to check `over_budget()` before admitting
    /// further usage
    Hard,
}

/// Mutable budget state for one API key.
#[derive(Debug, Clone)]
pub struct Budget {
    pub limit: Decimal,
    pub period: BudgetPeriod,
    pub limit_type: BudgetLimitType,
    /// Spend accumulated in the current period
    pub used: Decimal,
    pub period_start: DateTime<Utc>,
    /// Alert thresholds (percent) already fired this period
    pub alerted_thresholds: Vec<u8>,
}

impl Budget {
    pub fn new(
        limit: Decimal,
        period: BudgetPeriod,
        limit_type: BudgetLimitType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            limit,
            period,
            limit_type,
            used: Decimal::ZERO,
            period_start: now,
            alerted_thresholds: Vec::new(),
        }
    }

    /// Reset `used` (and the fired-alert set) if the wall clock has crossed
    /// one or more period boundaries since `period_start`.
    pub fn roll_period(&mut self, now: DateTime<Utc>) {
        let mut rolled = false;
        loop {
            let end = period_end(self.period_start, self.period);
            if now < end {
                break;
            }
            self.period_start = end;
            rolled = true;
        }
        if rolled {
            self.used = Decimal::ZERO;
            self.alerted_thresholds.clear();
            tracing::info!(
                period = ?self.period,
                limit = %self.limit,
                "Budget period rolled over"
            );
        }
    }

    /// Whether spend exceeds the limit (reported for soft budgets too;
    /// enforcement of hard limits is the caller's responsibility).
    pub fn is_over(&self) -> bool {
        self.used > self.limit
    }
}

/// End of the period that starts at `start`.
pub fn period_end(start: DateTime<Utc>, period: BudgetPeriod) -> DateTime<Utc> {
    match period {
        BudgetPeriod::Daily => start + Duration::days(1),
        BudgetPeriod::Weekly => start + Duration::weeks(1),
        BudgetPeriod::Monthly => start
            .checked_add_months(Months::new(1))
            .unwrap_or(start + Duration::days(31)),
    }
}

/// A threshold-crossing alert, retained in a bounded history.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetAlert {
    pub id: Uuid,
    pub api_key: String,
    /// Threshold crossed, as a percentage of the limit
    pub threshold_percent: u8,
    pub used: Decimal,
    pub limit: Decimal,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn usd(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_no_rollover_within_period() {
        let start = Utc::now();
        let mut budget = Budget::new(usd("100"), BudgetPeriod::Daily, BudgetLimitType::Soft, start);
        budget.used = usd("40");

        budget.roll_period(start + Duration::hours(23));
        assert_eq!(budget.used, usd("40"));
        assert_eq!(budget.period_start, start);
    }

    #[test]
    fn test_daily_rollover_resets_used() {
        let start = Utc::now();
        let mut budget = Budget::new(usd("100"), BudgetPeriod::Daily, BudgetLimitType::Hard, start);
        budget.used = usd("90");
        budget.alerted_thresholds.push(80);

        budget.roll_period(start + Duration::hours(25));
        assert_eq!(budget.used, Decimal::ZERO);
        assert!(budget.alerted_thresholds.is_empty());
        assert_eq!(budget.period_start, start + Duration::days(1));
    }

    #[test]
    fn test_rollover_skips_multiple_elapsed_periods() {
        let start = Utc::now();
        let mut budget = Budget::new(usd("100"), BudgetPeriod::Daily, BudgetLimitType::Soft, start);

        budget.roll_period(start + Duration::days(5) + Duration::hours(1));
        assert_eq!(budget.period_start, start + Duration::days(5));
    }

    #[test]
    fn test_weekly_and_monthly_period_ends() {
        let start = Utc::now();
        assert_eq!(
            period_end(start, BudgetPeriod::Weekly),
            start + Duration::weeks(1)
        );
        let monthly = period_end(start, BudgetPeriod::Monthly);
        assert!(monthly > start + Duration::days(27));
        assert!(monthly <= start + Duration::days(31));
    }

    #[test]
    fn test_is_over_boundary() {
        let start = Utc::now();
        let mut budget = Budget::new(usd("100"), BudgetPeriod::Monthly, BudgetLimitType::Hard, start);

        budget.used = usd("100");
        assert!(!budget.is_over(), "at the limit is not over it");
        budget.used = usd("100.000001");
        assert!(budget.is_over());
    }
}
