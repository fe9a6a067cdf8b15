use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use cxp_validacion::core::*;

/// Deterministic spread of position amounts, none of them round.
fn positions(n: usize) -> Vec<Decimal> {
    (0..n)
        .map(|i| {
            let cents = 10_000 + (i as i64 * 7_919) % 900_000;
            Decimal::new(cents, 2)
        })
        .collect()
}

fn planted_target(values: &[Decimal], picks: &[usize]) -> Decimal {
    picks.iter().map(|&i| values[i]).sum()
}

fn history_row(n: usize) -> HistoryRow {
    let join = |f: &dyn Fn(usize) -> String| (0..n).map(f).collect::<Vec<_>>().join("|");
    HistoryRow {
        supplier_tax_id: "800111".into(),
        purchase_order: "4500012345".into(),
        positions: join(&|i| ((i + 1) * 10).to_string()),
        por_calcular: join(&|i| format!("{}", 1_000 + i * 37)),
        tax_indicator: "H4".into(),
        account: "2695950020".into(),
        order_class: "ZPAF".into(),
        ..Default::default()
    }
}

// ── Exact stage ─────────────────────────────────────────────────────

fn bench_exact_small(c: &mut Criterion) {
    let values = positions(12);
    let target = planted_target(&values, &[2, 7, 11]);
    c.bench_function("find_subset_12_k3", |b| {
        b.iter(|| find_subset(black_box(&values), black_box(target), 3, dec!(0)));
    });
}

fn bench_exact_large(c: &mut Criterion) {
    let values = positions(40);
    let target = planted_target(&values, &[5, 19, 33, 38]);
    c.bench_function("find_subset_40_k4", |b| {
        b.iter(|| find_subset(black_box(&values), black_box(target), 4, dec!(500)));
    });
}

// ── Heuristic stages ────────────────────────────────────────────────

fn bench_budget_exhausted(c: &mut Criterion) {
    let values = positions(60);
    let target = planted_target(&values, &[1, 30, 59]);
    c.bench_function("find_subset_60_k3_no_budget", |b| {
        b.iter(|| {
            find_subset_with_budget(black_box(&values), black_box(target), 3, dec!(0), 0)
        });
    });
}

fn bench_no_match(c: &mut Criterion) {
    let values = positions(25);
    c.bench_function("find_subset_25_k3_miss", |b| {
        b.iter(|| find_subset(black_box(&values), dec!(0.01), 3, dec!(0)));
    });
}

// ── Position decoding ───────────────────────────────────────────────

fn bench_expand_positions(c: &mut Criterion) {
    let row = history_row(200);
    c.bench_function("expand_positions_200", |b| {
        b.iter(|| expand_positions(black_box(&row)));
    });
}

criterion_group!(
    benches,
    bench_exact_small,
    bench_exact_large,
    bench_budget_exhausted,
    bench_no_match,
    bench_expand_positions,
);
criterion_main!(benches);
