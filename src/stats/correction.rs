//! Holm-Bonferroni step-down correction for multiple comparisons
//!
//! Significance decisions downstream must use the adjusted p-values, never
//! the raw ones. A single-pair family is exempt: there is nothing to correct
//! across.

/// Holm-Bonferroni adjusted p-values, in the input order.
///
/// Sorts ascending, multiplies the rank-k smallest p by `m - k`, clamps to 1,
/// and enforces monotonicity so `p_adjusted >= p_raw` for every entry.
#[must_use]
pub fn holm_bonferroni(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    if m <= 1 {
        return p_values.to_vec();
    }
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&i, &j| {
        p_values[i]
            .partial_cmp(&p_values[j])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut adjusted = vec![0.0; m];
    let mut running_max = 0.0f64;
    for (rank, &index) in order.iter().enumerate() {
        let scaled = (p_values[index] * (m - rank) as f64).min(1.0);
        running_max = running_max.max(scaled);
        adjusted[index] = running_max;
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pair_family_exempt() {
        let adjusted = holm_bonferroni(&[0.03]);
        assert_eq!(adjusted, vec![0.03]);
    }

    #[test]
    fn test_adjusted_never_below_raw() {
        let raw = [0.01, 0.04, 0.03, 0.2];
        let adjusted = holm_bonferroni(&raw);
        for (r, a) in raw.iter().zip(adjusted.iter()) {
            assert!(a >= r, "adjusted {a} < raw {r}");
        }
    }

    #[test]
    fn test_known_holm_values() {
        // Classic example: smallest p scaled by m, next by m-1, monotone.
        let adjusted = holm_bonferroni(&[0.01, 0.02, 0.04]);
        assert!((adjusted[0] - 0.03).abs() < 1e-12);
        assert!((adjusted[1] - 0.04).abs() < 1e-12);
        assert!((adjusted[2] - 0.04).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_at_one() {
        let adjusted = holm_bonferroni(&[0.6, 0.7, 0.8]);
        assert!(adjusted.iter().all(|&p| p <= 1.0));
    }

    #[test]
    fn test_monotone_in_sorted_order() {
        let raw = [0.001, 0.5, 0.049, 0.02];
        let adjusted = holm_bonferroni(&raw);
        let mut pairs: Vec<(f64, f64)> = raw.iter().copied().zip(adjusted.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        for window in pairs.windows(2) {
            assert!(window[0].1 <= window[1].1);
        }
    }
}
