use cxp_validacion::core::values::{
    MAX_OBSERVATION_LEN, compact_key, format_decimal, only_digits, prepend_observation,
};
use cxp_validacion::core::*;
use rust_decimal_macros::dec;

// --- Amounts ---

#[test]
fn amounts_in_every_upstream_format() {
    let cases = [
        ("1234.56", dec!(1234.56)),
        ("1.234,56", dec!(1234.56)),
        ("1,234.56", dec!(1234.56)),
        ("1.234.567", dec!(1234567)),
        ("500,00", dec!(500.00)),
        ("$ 2.500.000", dec!(2500000)),
        ("-75", dec!(-75)),
    ];
    for (raw, expected) in cases {
        assert_eq!(parse_decimal(raw), Some(expected), "{raw}");
    }
    assert_eq!(parse_decimal("  "), None);
    assert_eq!(parse_decimal("N/A"), None);
}

#[test]
fn ledger_amounts_drop_trailing_zeros() {
    assert_eq!(format_decimal(dec!(500.00)), "500");
    assert_eq!(format_decimal(dec!(4125.50)), "4125.5");
}

#[test]
fn tolerance_is_symmetric_and_inclusive() {
    assert!(within_tolerance(dec!(1000), dec!(1500), dec!(500)));
    assert!(within_tolerance(dec!(1500), dec!(1000), dec!(500)));
    assert!(!within_tolerance(dec!(1000), dec!(1500.01), dec!(500)));
}

// --- Observations ---

#[test]
fn newest_observation_goes_first() {
    let first = prepend_observation(None, "X");
    let second = prepend_observation(Some(&first), "Y");
    assert_eq!(second, "Y, X");
    assert_eq!(prepend_observation(Some("X"), "  "), "X");
}

#[test]
fn long_observations_are_cut_with_sentinel() {
    let existing = "a".repeat(MAX_OBSERVATION_LEN);
    let combined = prepend_observation(Some(&existing), "Nueva");
    assert_eq!(combined.chars().count(), MAX_OBSERVATION_LEN);
    assert!(combined.starts_with("Nueva, "));
    assert!(combined.ends_with("..."));
    assert_eq!(truncate_observation("corta"), "corta");
}

// --- Cash ---

#[test]
fn both_cash_codes_get_the_suffix() {
    assert_eq!(with_cash_suffix(STATE_PROCESSED, Some("1")), "PROCESADO CONTADO");
    assert_eq!(with_cash_suffix(STATE_NOVELTY, Some(" 01 ")), "CON NOVEDAD CONTADO");
    assert_eq!(with_cash_suffix(STATE_WAITING, Some("2")), "EN ESPERA");
    assert_eq!(with_cash_suffix(STATE_WAITING, None), "EN ESPERA");
    assert!(!is_cash(Some("10")));
}

// --- Supplier names ---

#[test]
fn supplier_names_ignore_order_case_and_legal_form() {
    assert!(supplier_names_match("ACME SAS", "sas acme"));
    assert!(supplier_names_match("Acme S.A.S.", "ACME S A S"));
    assert!(supplier_names_match("Distribuidora Andina Ltda.", "ANDINA DISTRIBUIDORA LIMITADA"));
    assert!(supplier_names_match("Construcciones Núñez S.A.", "CONSTRUCCIONES NUNEZ SA"));
    assert!(!supplier_names_match("ACME SAS", "ACME LTDA"));
    assert!(!supplier_names_match("ACME SAS", "ACME SAS COLOMBIA"));
    assert!(!supplier_names_match("", ""));
}

#[test]
fn text_keys() {
    assert_eq!(normalize_text("  año   fiscal "), "ANO FISCAL");
    assert_eq!(compact_key("Código Ind. Iva aplicable"), "codigoindivaaplicable");
    assert_eq!(only_digits("860.031.606-6"), "8600316066");
}

// --- Configuration ---

#[test]
fn config_from_mapping_literal() {
    let text = "{'ServidorBaseDatos': 'sql01', 'NombreBaseDatos': 'CxP', \
                'UsuarioBaseDatos': 'rpa', 'ClaveBaseDatos': 'secreto', \
                'Tolerancia': '300', 'ToleranciaTRM': 5, 'MaxRetries': 2, \
                'RutaInsumoRetorno': None}";
    let config = RunConfig::parse(text).unwrap();
    assert_eq!(config.server, "sql01");
    assert_eq!(config.database, "CxP");
    assert_eq!(config.user.as_deref(), Some("rpa"));
    assert_eq!(config.tolerance, dec!(300));
    assert_eq!(config.trm_tolerance, dec!(5));
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.nc_retake_days, 120);
    assert!(config.novelty_export.is_none());
}

#[test]
fn config_from_json_and_json_string() {
    let json = r#"{"ServidorBaseDatos": "sql01", "NombreBaseDatos": "CxP", "plazo_maximo_retoma_dias": "90"}"#;
    let config = RunConfig::parse(json).unwrap();
    assert_eq!(config.nc_retake_days, 90);
    assert_eq!(config.tolerance, dec!(500));
    assert_eq!(config.trm_tolerance, dec!(10));

    let wrapped = serde_json::to_string(json).unwrap();
    assert_eq!(RunConfig::parse(&wrapped).unwrap().nc_retake_days, 90);
}

#[test]
fn config_errors_are_fatal() {
    let err = RunConfig::parse("{'NombreBaseDatos': 'CxP'}").unwrap_err();
    assert!(matches!(err, CxpError::Configuration(_)));
    assert!(err.is_fatal());
    assert!(err.to_string().contains(KEY_SERVER));

    let err = RunConfig::parse("{'ServidorBaseDatos': 's', 'NombreBaseDatos': 'd', 'Tolerancia': 'mucho'}")
        .unwrap_err();
    assert!(err.to_string().contains(KEY_TOLERANCE));

    assert!(RunConfig::parse("[1, 2]").is_err());
    assert!(RunConfig::parse("no es configuracion").is_err());
}
