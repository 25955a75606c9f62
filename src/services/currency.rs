//! Display formatting for monetary amounts

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::{CurrencyConfig, Grouping};

#[derive(Debug, Clone)]
pub struct CurrencyFormatter {
    symbol: String,
    grouping: Grouping,
}

impl CurrencyFormatter {
    pub fn new(config: &CurrencyConfig) -> Self {
        Self {
            symbol: config.symbol.clone(),
            grouping: config.grouping,
        }
    }

    /// `₹1,23,456.50` style rendering with two minor digits
    pub fn format(&self, amount: Decimal) -> String {
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
        let text = format!("{:.2}", rounded.abs());
        let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

        format!("{}{}{}.{}", sign, self.symbol, self.group(whole), fraction)
    }

    fn group(&self, digits: &str) -> String {
        if digits.len() <= 3 {
            return digits.to_string();
        }

        let (head, tail) = digits.split_at(digits.len() - 3);
        let step = match self.grouping {
            Grouping::Indian => 2,
            Grouping::Western => 3,
        };

        let mut groups = Vec::new();
        let mut end = head.len();
        while end > step {
            groups.push(&head[end - step..end]);
            end -= step;
        }
        groups.push(&head[..end]);
        groups.reverse();

        format!("{},{}", groups.join(","), tail)
    }
}
