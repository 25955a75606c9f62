//! Late-return fine policy

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::FineConfig;

const MS_PER_HOUR: i64 = 60 * 60 * 1000;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// The single rate a fine is charged at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FineRate {
    PerHour(Decimal),
    PerDay(Decimal),
    None,
}

/// Maps lateness to a fine. Pure; never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    rate: FineRate,
}

impl FinePolicy {
    /// Hourly rate takes precedence; non-positive rates count as unset
    pub fn new(config: &FineConfig) -> Self {
        let rate = if config.per_hour > Decimal::ZERO {
            FineRate::PerHour(config.per_hour)
        } else if config.per_day > Decimal::ZERO {
            FineRate::PerDay(config.per_day)
        } else {
            FineRate::None
        };
        Self { rate }
    }

    pub fn free() -> Self {
        Self { rate: FineRate::None }
    }

    pub fn rate(&self) -> FineRate {
        self.rate
    }

    /// Fine owed for returning at `returned_at` a borrow due at `due`.
    ///
    /// Partial hours/days count as whole ones. Results are rounded to two
    /// decimals. Arithmetic overflow yields zero so a return is never blocked.
    pub fn assess(&self, due: DateTime<Utc>, returned_at: DateTime<Utc>) -> Decimal {
        if returned_at <= due {
            return Decimal::ZERO;
        }

        let (rate, unit_ms) = match self.rate {
            FineRate::PerHour(rate) => (rate, MS_PER_HOUR),
            FineRate::PerDay(rate) => (rate, MS_PER_DAY),
            FineRate::None => return Decimal::ZERO,
        };

        let late_ms = match (returned_at - due).num_milliseconds() {
            ms if ms > 0 => ms,
            _ => return Decimal::ZERO,
        };
        // ceil division on positive values
        let units = (late_ms - 1) / unit_ms + 1;

        Decimal::from(units)
            .checked_mul(rate)
            .map(|fine| fine.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn hourly(rate: Decimal) -> FinePolicy {
        FinePolicy::new(&FineConfig { per_hour: rate, per_day: Decimal::ZERO })
    }

    fn daily(rate: Decimal) -> FinePolicy {
        FinePolicy::new(&FineConfig { per_hour: Decimal::ZERO, per_day: rate })
    }

    #[test]
    fn on_time_returns_are_free() {
        let policy = hourly(dec!(10));
        assert_eq!(policy.assess(due(), due()), Decimal::ZERO);
        assert_eq!(policy.assess(due(), due() - Duration::days(2)), Decimal::ZERO);
    }

    #[test]
    fn hourly_rate_rounds_partial_hours_up() {
        let policy = hourly(dec!(10));
        assert_eq!(policy.assess(due(), due() + Duration::hours(1)), dec!(10));
        assert_eq!(policy.assess(due(), due() + Duration::seconds(1)), dec!(10));
        assert_eq!(policy.assess(due(), due() + Duration::minutes(61)), dec!(20));
    }

    #[test]
    fn daily_rate_rounds_partial_days_up() {
        let policy = daily(dec!(50));
        assert_eq!(policy.assess(due(), due() + Duration::hours(24)), dec!(50));
        assert_eq!(policy.assess(due(), due() + Duration::hours(25)), dec!(100));
        assert_eq!(policy.assess(due(), due() + Duration::hours(26)), dec!(100));
    }

    #[test]
    fn hourly_rate_wins_over_daily() {
        let policy = FinePolicy::new(&FineConfig { per_hour: dec!(10), per_day: dec!(50) });
        assert_eq!(policy.rate(), FineRate::PerHour(dec!(10)));
        assert_eq!(policy.assess(due(), due() + Duration::hours(26)), dec!(260));
    }

    #[test]
    fn no_rate_means_no_fine() {
        let policy = FinePolicy::new(&FineConfig::default());
        assert_eq!(policy.assess(due(), due() + Duration::days(365)), Decimal::ZERO);
        assert_eq!(FinePolicy::free().assess(due(), due() + Duration::days(3)), Decimal::ZERO);
    }

    #[test]
    fn negative_rates_are_ignored() {
        let policy = FinePolicy::new(&FineConfig { per_hour: dec!(-5), per_day: dec!(20) });
        assert_eq!(policy.rate(), FineRate::PerDay(dec!(20)));
    }

    #[test]
    fn fractional_rates_round_to_minor_units() {
        let policy = hourly(dec!(0.333));
        assert_eq!(policy.assess(due(), due() + Duration::hours(3)), dec!(1.00));
        let policy = hourly(dec!(0.125));
        assert_eq!(policy.assess(due(), due() + Duration::hours(1)), dec!(0.13));
    }

    #[test]
    fn overflow_degrades_to_zero() {
        let policy = daily(Decimal::MAX);
        assert_eq!(policy.assess(due(), due() + Duration::days(3)), Decimal::ZERO);
    }
}
