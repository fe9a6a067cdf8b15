//! Subset-sum matching of purchase-order positions against an invoice amount.
//!
//! Given `n` position amounts, pick exactly `k` whose sum lies within a
//! tolerance of the target. Among all qualifying index sets the
//! lexicographically earliest wins. `k` is the invoice's detail-line count,
//! so the search stays small in practice.

use rust_decimal::Decimal;

use super::values::checked_sum;

/// Node budget for the exact search before heuristics are tried.
pub const DEFAULT_SEARCH_BUDGET: u64 = 2_000_000;

/// Which stage produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStage {
    /// Lexicographic branch-and-bound search within budget.
    Exact,
    /// The `k` smallest or `k` largest values.
    Window,
    /// Combinations of the `2k` values closest to `target / k`.
    Pool,
    /// Unbounded lexicographic enumeration.
    Exhaustive,
}

/// Result of a subset search; empty `indices` means no match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetMatch {
    /// Chosen indices, ascending.
    pub indices: Vec<usize>,
    pub stage: Option<MatchStage>,
}

impl SubsetMatch {
    fn none() -> Self {
        Self {
            indices: Vec::new(),
            stage: None,
        }
    }

    fn found(indices: Vec<usize>, stage: MatchStage) -> Self {
        Self {
            indices,
            stage: Some(stage),
        }
    }

    pub fn is_match(&self) -> bool {
        !self.indices.is_empty()
    }
}

/// Find `k` values summing to `target ± tolerance`.
///
/// Returns the ascending index set, or an empty vector when none exists.
///
/// ```
/// use cxp_validacion::core::find_subset;
/// use rust_decimal_macros::dec;
///
/// let values = [dec!(600), dec!(400), dec!(400), dec!(600)];
/// assert_eq!(find_subset(&values, dec!(1000), 2, dec!(0)), vec![0, 1]);
/// ```
pub fn find_subset(values: &[Decimal], target: Decimal, k: usize, tolerance: Decimal) -> Vec<usize> {
    find_subset_with_budget(values, target, k, tolerance, DEFAULT_SEARCH_BUDGET).indices
}

/// [`find_subset`] with an explicit node budget for the exact stage.
pub fn find_subset_with_budget(
    values: &[Decimal],
    target: Decimal,
    k: usize,
    tolerance: Decimal,
    budget: u64,
) -> SubsetMatch {
    let n = values.len();
    if k == 0 || k > n {
        return SubsetMatch::none();
    }
    let tolerance = tolerance.abs();
    // Every partial sum, bound and distance below stays under this magnitude.
    let magnitude = checked_sum(values.iter().map(|v| v.abs()))
        .and_then(|m| m.checked_add(target.abs()))
        .and_then(|m| m.checked_add(tolerance));
    if magnitude.is_none() {
        return SubsetMatch::none();
    }
    let low = target - tolerance;
    let high = target + tolerance;

    let bounds = SuffixBounds::new(values, k);
    if bounds.min(0, k) > high || bounds.max(0, k) < low {
        return SubsetMatch::none();
    }

    let mut search = Search {
        values,
        bounds: &bounds,
        low,
        high,
        budget: Some(budget),
        visited: 0,
        chosen: Vec::with_capacity(k),
    };
    match search.run(0, k, Decimal::ZERO) {
        Outcome::Found => return SubsetMatch::found(search.chosen, MatchStage::Exact),
        Outcome::NotFound => return SubsetMatch::none(),
        Outcome::Exhausted => {}
    }

    if let Some(indices) = window_match(values, k, low, high) {
        return SubsetMatch::found(indices, MatchStage::Window);
    }
    if let Some(indices) = pool_match(values, target, k, low, high) {
        return SubsetMatch::found(indices, MatchStage::Pool);
    }

    let mut search = Search {
        values,
        bounds: &bounds,
        low,
        high,
        budget: None,
        visited: 0,
        chosen: Vec::with_capacity(k),
    };
    match search.run(0, k, Decimal::ZERO) {
        Outcome::Found => SubsetMatch::found(search.chosen, MatchStage::Exhaustive),
        _ => SubsetMatch::none(),
    }
}

/// Sum of the `r` smallest / largest values of every suffix `values[j..]`.
struct SuffixBounds {
    min: Vec<Vec<Decimal>>,
    max: Vec<Vec<Decimal>>,
}

impl SuffixBounds {
    fn new(values: &[Decimal], k: usize) -> Self {
        let n = values.len();
        let mut min = Vec::with_capacity(n + 1);
        let mut max = Vec::with_capacity(n + 1);
        for j in 0..=n {
            let mut suffix = values[j..].to_vec();
            suffix.sort();
            let take = k.min(suffix.len());
            let mut lo = vec![Decimal::ZERO; take + 1];
            let mut hi = vec![Decimal::ZERO; take + 1];
            for r in 1..=take {
                lo[r] = lo[r - 1] + suffix[r - 1];
                hi[r] = hi[r - 1] + suffix[suffix.len() - r];
            }
            min.push(lo);
            max.push(hi);
        }
        Self { min, max }
    }

    fn min(&self, start: usize, r: usize) -> Decimal {
        self.min[start][r]
    }

    fn max(&self, start: usize, r: usize) -> Decimal {
        self.max[start][r]
    }
}

enum Outcome {
    Found,
    NotFound,
    Exhausted,
}

struct Search<'a> {
    values: &'a [Decimal],
    bounds: &'a SuffixBounds,
    low: Decimal,
    high: Decimal,
    budget: Option<u64>,
    visited: u64,
    chosen: Vec<usize>,
}

impl Search<'_> {
    /// Depth-first in lexicographic index order; the first hit is the
    /// lexicographically earliest qualifying set.
    fn run(&mut self, start: usize, remaining: usize, partial: Decimal) -> Outcome {
        if remaining == 0 {
            return if partial >= self.low && partial <= self.high {
                Outcome::Found
            } else {
                Outcome::NotFound
            };
        }
        let n = self.values.len();
        let mut exhausted = false;
        for i in start..=(n - remaining) {
            self.visited += 1;
            if self.budget.is_some_and(|b| self.visited > b) {
                return Outcome::Exhausted;
            }
            let sum = partial + self.values[i];
            let rest = remaining - 1;
            if sum + self.bounds.min(i + 1, rest) > self.high
                || sum + self.bounds.max(i + 1, rest) < self.low
            {
                continue;
            }
            self.chosen.push(i);
            match self.run(i + 1, rest, sum) {
                Outcome::Found => return Outcome::Found,
                Outcome::Exhausted => {
                    exhausted = true;
                    self.chosen.pop();
                    break;
                }
                Outcome::NotFound => {
                    self.chosen.pop();
                }
            }
        }
        if exhausted {
            Outcome::Exhausted
        } else {
            Outcome::NotFound
        }
    }
}

fn sorted_order(values: &[Decimal]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].cmp(&values[b]).then(a.cmp(&b)));
    order
}

fn window_match(values: &[Decimal], k: usize, low: Decimal, high: Decimal) -> Option<Vec<usize>> {
    let order = sorted_order(values);
    let smallest = &order[..k];
    let largest = &order[order.len() - k..];
    [smallest, largest].into_iter().find_map(|window| {
        let sum: Decimal = window.iter().map(|&i| values[i]).sum();
        (sum >= low && sum <= high).then(|| {
            let mut indices = window.to_vec();
            indices.sort_unstable();
            indices
        })
    })
}

fn pool_match(
    values: &[Decimal],
    target: Decimal,
    k: usize,
    low: Decimal,
    high: Decimal,
) -> Option<Vec<usize>> {
    let per_position = target / Decimal::from(k as u64);
    let mut pool: Vec<usize> = (0..values.len()).collect();
    pool.sort_by(|&a, &b| {
        (values[a] - per_position)
            .abs()
            .cmp(&(values[b] - per_position).abs())
            .then(a.cmp(&b))
    });
    pool.truncate(2 * k);
    pool.sort_unstable();

    let mut combo: Vec<usize> = (0..k).collect();
    let m = pool.len();
    loop {
        let sum: Decimal = combo.iter().map(|&c| values[pool[c]]).sum();
        if sum >= low && sum <= high {
            return Some(combo.iter().map(|&c| pool[c]).collect());
        }
        // Advance to the next combination in lexicographic order.
        let mut i = k;
        loop {
            if i == 0 {
                return None;
            }
            i -= 1;
            if combo[i] < m - k + i {
                break;
            }
            if i == 0 {
                return None;
            }
        }
        combo[i] += 1;
        for j in i + 1..k {
            combo[j] = combo[j - 1] + 1;
        }
    }
}
