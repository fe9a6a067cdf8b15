#![no_main]

use cxp_validacion::core::{HistoryRow, expand_positions, mark_row_positions};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let mut fields = s.split('\n');
    let mut next = || fields.next().unwrap_or_default().to_string();
    let mut row = HistoryRow {
        positions: next(),
        por_calcular: next(),
        trm: next(),
        tax_indicator: next(),
        quantity: next(),
        mark: next(),
        ..Default::default()
    };
    if let Ok(positions) = expand_positions(&row) {
        let numbers: Vec<String> = positions.iter().map(|p| p.position_index.clone()).collect();
        mark_row_positions(&mut row, &numbers);
    }
});
