use cxp_validacion::core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn amounts(values: &[i64]) -> Vec<Decimal> {
    values.iter().map(|&v| Decimal::from(v)).collect()
}

#[test]
fn tie_break_is_lexicographic() {
    let values = amounts(&[600, 400, 400, 600]);
    assert_eq!(find_subset(&values, dec!(1000), 2, dec!(0)), vec![0, 1]);
    assert_eq!(find_subset(&values, dec!(1000), 2, dec!(500)), vec![0, 1]);
}

#[test]
fn exact_stage_within_budget() {
    let values = amounts(&[900, 250, 300, 450, 700]);
    let found = find_subset_with_budget(&values, dec!(1000), 2, dec!(0), DEFAULT_SEARCH_BUDGET);
    assert_eq!(found.indices, vec![2, 4]);
    assert_eq!(found.stage, Some(MatchStage::Exact));
    assert!(found.is_match());
}

#[test]
fn window_after_budget_runs_out() {
    let values = amounts(&[1, 2, 3, 100]);
    let found = find_subset_with_budget(&values, dec!(3), 2, dec!(0), 0);
    assert_eq!(found.indices, vec![0, 1]);
    assert_eq!(found.stage, Some(MatchStage::Window));
}

#[test]
fn pool_after_window_misses() {
    let values = amounts(&[10, 500, 480, 20, 990]);
    let found = find_subset_with_budget(&values, dec!(1000), 2, dec!(20), 0);
    assert_eq!(found.indices, vec![1, 2]);
    assert_eq!(found.stage, Some(MatchStage::Pool));
}

#[test]
fn exhaustive_as_last_resort() {
    let values = amounts(&[10, 500, 480, 20, 990]);
    let found = find_subset_with_budget(&values, dec!(1000), 2, dec!(0), 0);
    assert_eq!(found.indices, vec![0, 4]);
    assert_eq!(found.stage, Some(MatchStage::Exhaustive));
}

#[test]
fn no_match_is_empty() {
    let values = amounts(&[100, 200, 300]);
    let found = find_subset_with_budget(&values, dec!(10000), 2, dec!(500), 10);
    assert!(!found.is_match());
    assert_eq!(found.stage, None);
    assert!(find_subset(&values, dec!(600), 4, dec!(0)).is_empty());
}

#[test]
fn chosen_sum_is_within_tolerance() {
    let values = amounts(&[120, 340, 560, 780, 910, 130, 470]);
    let target = dec!(1500);
    let tolerance = dec!(25);
    for k in 1..=4 {
        let indices = find_subset(&values, target, k, tolerance);
        if indices.is_empty() {
            continue;
        }
        assert_eq!(indices.len(), k);
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        let sum: Decimal = indices.iter().map(|&i| values[i]).sum();
        assert!(within_tolerance(sum, target, tolerance), "k={k} sum={sum}");
    }
}
