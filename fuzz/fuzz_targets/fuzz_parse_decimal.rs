#![no_main]

use cxp_validacion::core::values::format_decimal;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Anything that parses must parse back to the same value once formatted.
        if let Some(value) = cxp_validacion::core::parse_decimal(s) {
            let again = cxp_validacion::core::parse_decimal(&format_decimal(value));
            assert_eq!(again.map(|v| v.normalize()), Some(value.normalize()));
        }
    }
});
