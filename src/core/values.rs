//! String normalization, decimal parsing and tolerant comparisons shared by
//! every stage of the pipeline.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Maximum length of observation text persisted in the ledger and header.
pub const MAX_OBSERVATION_LEN: usize = 3900;

/// Tail appended to truncated observation text.
pub const TRUNCATION_SENTINEL: &str = "...";

/// Separator between successive observations (newest first).
pub const OBSERVATION_SEPARATOR: &str = ", ";

/// Suffix appended to every final result of a cash-paid document.
pub const CASH_SUFFIX: &str = " CONTADO";

/// Legal-form canonicalization table for supplier names.
///
/// Variants are compared after removing punctuation and spaces.
const LEGAL_FORMS: &[(&str, &[&str])] = &[
    (
        "SAS",
        &["SAS", "S.A.S.", "S.A.S", "SAAS", "S A S", "S,A.S.", "S,AS"],
    ),
    ("LTDA", &["LIMITADA", "LTDA", "LTDA.", "LTDA,"]),
    (
        "SENC",
        &["S.ENC.", "SENC", "SENCA", "COMANDITA", "SENCS", "S.EN.C."],
    ),
    ("SA", &["SA", "S.A.", "S.A"]),
];

/// Replace accented Latin letters with their base letter.
pub fn strip_diacritics(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'É' | 'È' | 'Ë' | 'Ê' => 'E',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

/// Upper-case, strip diacritics, trim and collapse inner whitespace.
pub fn normalize_text(s: &str) -> String {
    strip_diacritics(s)
        .to_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-cased, diacritic-free text with punctuation and spaces removed.
/// Used to match spreadsheet headers and sheet names.
pub fn compact_key(s: &str) -> String {
    strip_diacritics(s)
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Keep only ASCII digits.
pub fn only_digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// `None`, empty and whitespace-only strings are blank.
pub fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Trimmed, non-blank view of an optional string.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse an amount written in any of the formats SAP and the XML ingestor
/// produce: `1234.56`, `1.234,56`, `1,234.56`, `500,00`, `$ 1.234`.
///
/// When both separators appear, the last one is the decimal separator.
/// A lone comma is a decimal separator; repeated separators are grouping.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ' ' | '\u{a0}' | '\''))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    if body.contains(['e', 'E']) {
        let value = Decimal::from_scientific(body).ok()?;
        return Some(if negative { -value } else { value });
    }

    let canonical = match (body.rfind('.'), body.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => body.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => body.replace(',', ""),
        (None, Some(_)) if body.matches(',').count() == 1 => body.replace(',', "."),
        (None, Some(_)) => body.replace(',', ""),
        (Some(_), None) if body.matches('.').count() > 1 => body.replace('.', ""),
        _ => body.to_string(),
    };

    let value = Decimal::from_str(&canonical).ok()?;
    Some(if negative { -value } else { value })
}

/// Render a decimal for the ledger without trailing zeros.
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}

/// `|a - b| <= tolerance`. A difference too large to represent is out of
/// tolerance.
pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    a.checked_sub(b)
        .is_some_and(|diff| diff.abs() <= tolerance.abs())
}

/// Sum of `values`, `None` on overflow.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
}

/// Sum of `values`, clamped at the representable range.
pub fn saturating_sum(values: impl IntoIterator<Item = Decimal>) -> Decimal {
    values
        .into_iter()
        .fold(Decimal::ZERO, |acc, v| acc.saturating_add(v))
}

/// Cap observation text at [`MAX_OBSERVATION_LEN`] characters, ending with
/// [`TRUNCATION_SENTINEL`] when cut.
pub fn truncate_observation(text: &str) -> String {
    if text.chars().count() <= MAX_OBSERVATION_LEN {
        return text.to_string();
    }
    let keep = MAX_OBSERVATION_LEN - TRUNCATION_SENTINEL.len();
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_SENTINEL);
    out
}

/// Put `newer` in front of `existing`, separated by `", "`, truncated.
pub fn prepend_observation(existing: Option<&str>, newer: &str) -> String {
    let newer = newer.trim();
    let combined = match non_blank(existing) {
        Some(old) if newer.is_empty() => old.to_string(),
        Some(old) => format!("{newer}{OBSERVATION_SEPARATOR}{old}"),
        None => newer.to_string(),
    };
    truncate_observation(&combined)
}

/// Payment means `"1"` and `"01"` both mean cash.
pub fn is_cash(payment_means: Option<&str>) -> bool {
    matches!(non_blank(payment_means), Some("1" | "01"))
}

/// `" CONTADO"` for cash documents, empty otherwise.
pub fn cash_suffix(payment_means: Option<&str>) -> &'static str {
    if is_cash(payment_means) { CASH_SUFFIX } else { "" }
}

fn canonical_legal_form(compact: &str) -> Option<&'static str> {
    LEGAL_FORMS.iter().find_map(|(canonical, variants)| {
        variants
            .iter()
            .any(|v| strip_punctuation(v) == compact)
            .then_some(*canonical)
    })
}

fn strip_punctuation(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Tokens of a supplier name after normalization, sorted.
///
/// Legal forms spelled as separate letters (`S A S`) are merged before
/// canonicalization.
pub fn supplier_name_tokens(name: &str) -> Vec<String> {
    let upper = strip_diacritics(name).to_uppercase();
    let raw: Vec<String> = upper
        .split_whitespace()
        .map(strip_punctuation)
        .filter(|t| !t.is_empty())
        .collect();

    let mut tokens = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let mut merged = false;
        for width in [3usize, 2] {
            let end = i + width;
            if end > raw.len() || raw[i..end].iter().any(|t| t.chars().count() != 1) {
                continue;
            }
            let joined = raw[i..end].concat();
            if let Some(canonical) = canonical_legal_form(&joined) {
                tokens.push(canonical.to_string());
                i = end;
                merged = true;
                break;
            }
        }
        if !merged {
            let token = &raw[i];
            tokens.push(
                canonical_legal_form(token)
                    .map(str::to_string)
                    .unwrap_or_else(|| token.clone()),
            );
            i += 1;
        }
    }

    tokens.sort();
    tokens
}

/// Order-independent supplier-name comparison: both names must normalize to
/// the same multiset of words. Blank names never match.
pub fn supplier_names_match(a: &str, b: &str) -> bool {
    let left = supplier_name_tokens(a);
    !left.is_empty() && left == supplier_name_tokens(b)
}
