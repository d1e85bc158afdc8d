//! Scoring strategies (§4.7): Exact, Fuzzy, and the default Combined
//! (Exact first, falling back to Fuzzy unless Exact already found a perfect
//! match).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Exact,
    Fuzzy,
    Combined,
}

pub struct Weights {
    pub client_name: f64,
    pub reference_number: f64,
}

fn exact_score(name_score: f64, reference_score: f64) -> f64 {
    let name_exact = name_score >= 1.0;
    let reference_exact = reference_score >= 1.0;
    if name_exact && reference_exact {
        1.0
    } else if name_exact || reference_exact {
        0.5
    } else {
        0.0
    }
}

fn fuzzy_score(name_score: f64, reference_score: f64, weights: &Weights, name_only_threshold: f64, name_only_penalty: f64) -> f64 {
    if name_score == 0.0 {
        return 0.0;
    }
    if name_score >= name_only_threshold && reference_score == 0.0 {
        return name_score * name_only_penalty;
    }
    if reference_score == 0.0 {
        return 0.0;
    }
    name_score * weights.client_name + reference_score * weights.reference_number
}

/// Scores one candidate inquiry against the extracted signals, per the
/// chosen strategy.
pub fn score(
    strategy: Strategy,
    name_score_value: f64,
    reference_score_value: f64,
    weights: &Weights,
    name_only_threshold: f64,
    name_only_penalty: f64,
) -> f64 {
    match strategy {
        Strategy::Exact => exact_score(name_score_value, reference_score_value),
        Strategy::Fuzzy => fuzzy_score(name_score_value, reference_score_value, weights, name_only_threshold, name_only_penalty),
        Strategy::Combined => {
            let exact = exact_score(name_score_value, reference_score_value);
            if exact >= 1.0 {
                exact
            } else {
                fuzzy_score(name_score_value, reference_score_value, weights, name_only_threshold, name_only_penalty)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> Weights {
        Weights { client_name: 0.40, reference_number: 0.60 }
    }

    #[test]
    fn exact_match_on_both_signals_scores_one() {
        assert_eq!(score(Strategy::Exact, 1.0, 1.0, &weights(), 0.85, 0.7), 1.0);
    }

    #[test]
    fn exact_match_on_one_signal_scores_half() {
        assert_eq!(score(Strategy::Exact, 1.0, 0.0, &weights(), 0.85, 0.7), 0.5);
    }

    #[test]
    fn combined_falls_back_to_fuzzy_when_not_perfect() {
        let combined = score(Strategy::Combined, 0.9, 0.0, &weights(), 0.85, 0.7);
        assert!((combined - 0.9 * 0.7).abs() < 1e-9);
    }

    #[test]
    fn fuzzy_zero_reference_below_name_only_threshold_scores_zero() {
        assert_eq!(fuzzy_score(0.5, 0.0, &weights(), 0.85, 0.7), 0.0);
    }

    #[test]
    fn fuzzy_weighted_sum_when_both_signals_present() {
        let s = fuzzy_score(0.8, 0.6, &weights(), 0.85, 0.7);
        assert!((s - (0.8 * 0.40 + 0.6 * 0.60)).abs() < 1e-9);
    }
}
