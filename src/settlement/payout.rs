/// Split `pot` across winners in proportion to their stakes.
///
/// Each winner gets the floor of their exact share; the points left over are
/// handed out one at a time by largest fractional remainder, ties going to the
/// earlier winner. Every share is within one point of the exact share and the
/// shares always sum to `pot`.
pub fn split_pot(pot: i64, stakes: &[i64]) -> Vec<i64> {
    let total: i128 = stakes.iter().map(|s| i128::from(*s)).sum();
    if stakes.is_empty() || total <= 0 || pot <= 0 {
        return vec![0; stakes.len()];
    }

    let pot = i128::from(pot);
    let mut shares: Vec<i128> = stakes.iter().map(|s| pot * i128::from(*s) / total).collect();
    let remainders: Vec<i128> = stakes.iter().map(|s| pot * i128::from(*s) % total).collect();

    let leftover = (pot - shares.iter().sum::<i128>()) as usize;
    let mut order: Vec<usize> = (0..stakes.len()).collect();
    order.sort_by(|&a, &b| remainders[b].cmp(&remainders[a]).then(a.cmp(&b)));
    for &i in order.iter().take(leftover) {
        shares[i] += 1;
    }

    shares.into_iter().map(|s| s as i64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_equal_winners_split_three_stakes() {
        assert_eq!(split_pot(300, &[100, 100]), vec![150, 150]);
    }

    #[test]
    fn sole_winner_takes_everything() {
        assert_eq!(split_pot(200, &[100]), vec![200]);
    }

    #[test]
    fn remainder_goes_to_earliest_on_ties() {
        assert_eq!(split_pot(400, &[100, 100, 100]), vec![134, 133, 133]);
        assert_eq!(split_pot(500, &[100, 100, 100]), vec![167, 167, 166]);
    }

    #[test]
    fn unequal_stakes_are_proportional() {
        assert_eq!(split_pot(1000, &[100, 300]), vec![250, 750]);
        // exact shares 142.86 / 428.57 / 428.57
        assert_eq!(split_pot(1000, &[100, 300, 300]), vec![143, 429, 428]);
    }

    #[test]
    fn shares_always_sum_to_pot() {
        for pot in [1_i64, 7, 99, 100, 101, 997, 12_345] {
            for winners in 1..=7_usize {
                let stakes: Vec<i64> = (1..=winners as i64).map(|i| i * 13).collect();
                let shares = split_pot(pot, &stakes);
                assert_eq!(shares.iter().sum::<i64>(), pot, "pot={pot} winners={winners}");
            }
        }
    }

    #[test]
    fn degenerate_inputs_pay_nothing() {
        assert!(split_pot(100, &[]).is_empty());
        assert_eq!(split_pot(0, &[10, 10]), vec![0, 0]);
    }
}
