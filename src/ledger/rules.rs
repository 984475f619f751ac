//! Integer rounding rules for percentage penalties and inactivity decay.

use crate::config::decay;

/// Points to deduct for a `percent` penalty on `balance`.
///
/// Rounds up, then takes at least 1 point. A zero (or negative) balance is
/// never pushed further down.
pub fn percentage_deduction(balance: i64, percent: u32) -> i64 {
    if balance <= 0 {
        return 0;
    }
    let percent = i128::from(percent.min(100));
    let raw = (i128::from(balance) * percent + 99) / 100;
    (raw as i64).max(1)
}

/// Decay charged on an inactive balance: `clamp(ceil(balance * 5%), 50, 100)`.
pub fn calculate_decay_amount(balance: i64) -> i64 {
    let raw = (i128::from(balance.max(0)) * i128::from(decay::RATE_PCT) + 99) / 100;
    (raw as i64).clamp(decay::MIN, decay::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_up() {
        assert_eq!(percentage_deduction(1000, 10), 100);
        assert_eq!(percentage_deduction(15, 10), 2);
        assert_eq!(percentage_deduction(101, 25), 26);
    }

    #[test]
    fn tiny_balance_loses_at_least_one_point() {
        assert_eq!(percentage_deduction(3, 5), 1);
        assert_eq!(percentage_deduction(1, 50), 1);
    }

    #[test]
    fn zero_balance_is_never_pushed_negative() {
        assert_eq!(percentage_deduction(0, 50), 0);
        assert_eq!(percentage_deduction(-20, 25), 0);
    }

    #[test]
    fn full_percentage_takes_everything() {
        assert_eq!(percentage_deduction(37, 100), 37);
        assert_eq!(percentage_deduction(37, 250), 37);
    }

    #[test]
    fn decay_bounds() {
        assert_eq!(calculate_decay_amount(100), 50);
        assert_eq!(calculate_decay_amount(999), 50);
        assert_eq!(calculate_decay_amount(2000), 100);
        assert_eq!(calculate_decay_amount(10000), 100);
    }

    #[test]
    fn decay_between_bounds_rounds_up() {
        // 1001 * 5% = 50.05
        assert_eq!(calculate_decay_amount(1001), 51);
        assert_eq!(calculate_decay_amount(1500), 75);
    }
}
