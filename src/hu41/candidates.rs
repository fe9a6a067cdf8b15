use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::core::{
    CandidateField, CandidateRecord, CxpError, DEFAULT_SEARCH_BUDGET, DocumentType, FieldValue,
    HistoryRow, InvoiceDetail, InvoiceHeader, OrderClass, PoPosition, Provenance, RunConfig,
    STATE_NOVELTY, STATE_WAITING, checked_sum, collapse_positions, expand_positions,
    find_subset_with_budget, join_field, saturating_sum,
};
use crate::core::values::format_decimal;
use crate::rules::RuleEngine;
use crate::store::{Store, with_transaction};

pub(crate) const OBS_WITHOUT_ORDER: &str = "Registro sin orden de compra";
pub(crate) const OBS_WITHOUT_DETAIL: &str = "No se encuentra detalle de la factura";
pub(crate) const OBS_WITHOUT_HISTORY: &str =
    "No se encuentra la orden de compra en el historico de ordenes";
pub(crate) const OBS_WITHOUT_MATCH: &str =
    "No se encuentra combinacion de posiciones que coincida con el valor de la factura";

/// An invoice ready for its rule battery.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub header: InvoiceHeader,
    /// Detail lines, by line number.
    pub details: Vec<InvoiceDetail>,
    /// Chosen purchase-order positions, in purchase-order order.
    pub positions: Vec<PoPosition>,
    /// Indices of the chosen positions among the order's open positions.
    pub selected: Vec<usize>,
}

impl Candidate {
    /// `Σ line_extension_amount`, clamped at the representable range.
    pub fn subtotal(&self) -> Decimal {
        saturating_sum(self.details.iter().map(|d| d.line_extension_amount))
    }

    /// `Σ por_calcular` of the chosen positions, clamped like [`Self::subtotal`].
    pub fn positions_total(&self) -> Decimal {
        saturating_sum(self.positions.iter().map(|p| p.por_calcular))
    }

    /// Order class of the first chosen position, which routes the candidate.
    pub fn order_class(&self) -> Option<OrderClass> {
        self.positions.first().and_then(PoPosition::order_class)
    }

    /// SAP position numbers, as marked once the candidate is processed.
    pub fn position_numbers(&self) -> Vec<String> {
        self.positions.iter().map(|p| p.position_index.clone()).collect()
    }

    pub fn purchase_order(&self) -> &str {
        self.header.purchase_order().unwrap_or_default()
    }
}

/// What a builder pass produced.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub candidates: Vec<Candidate>,
    /// Headers closed as novelty for lacking a purchase order.
    pub without_order: usize,
    /// Headers left waiting for detail, history or a position match.
    pub waiting: usize,
    /// Headers whose update failed.
    pub errors: usize,
}

type DocKey = (String, String);

fn doc_key(nit: &str, number: &str) -> DocKey {
    (nit.trim().to_string(), number.trim().to_ascii_uppercase())
}

fn index_details(details: Vec<InvoiceDetail>) -> HashMap<DocKey, Vec<InvoiceDetail>> {
    let mut index: HashMap<DocKey, Vec<InvoiceDetail>> = HashMap::new();
    for detail in details {
        index
            .entry(doc_key(&detail.supplier_tax_id, &detail.invoice_number))
            .or_default()
            .push(detail);
    }
    for lines in index.values_mut() {
        lines.sort_by_key(|d| d.line_number);
    }
    index
}

/// Open positions per `(nit, PO)`. Rows that cannot be decoded are skipped.
fn index_history(rows: &[HistoryRow]) -> HashMap<DocKey, Vec<PoPosition>> {
    let mut index: HashMap<DocKey, Vec<PoPosition>> = HashMap::new();
    for row in rows {
        match expand_positions(row) {
            Ok(positions) => index
                .entry(doc_key(&row.supplier_tax_id, &row.purchase_order))
                .or_default()
                .extend(positions.into_iter().filter(|p| !p.is_processed())),
            Err(err) => warn!(
                nit = %row.supplier_tax_id,
                orden = %row.purchase_order,
                error = %err,
                "skipping undecodable history row"
            ),
        }
    }
    index.retain(|_, positions| !positions.is_empty());
    index
}

enum Step {
    Candidate(Candidate),
    WithoutOrder,
    Waiting(&'static str),
}

/// Join pending invoices with their detail and open positions.
///
/// Headers that cannot become candidates are closed here: no purchase order
/// ends in `CON NOVEDAD`, missing detail, history or position match in
/// `EN ESPERA`. Candidates are persisted as the run's working set.
pub fn build_candidates<S: Store + ?Sized>(
    store: &mut S,
    config: &RunConfig,
    now: NaiveDateTime,
) -> Result<BuildReport, CxpError> {
    let headers = store.pending_headers(DocumentType::Invoice)?;
    let details = index_details(store.pending_details()?);
    let history = index_history(&store.open_history()?);
    info!(
        headers = headers.len(),
        documents_with_detail = details.len(),
        open_orders = history.len(),
        "building candidates"
    );

    let mut report = BuildReport::default();
    let mut reserved: HashSet<(DocKey, String)> = HashSet::new();

    for header in headers {
        let outcome = match plan(&header, &details, &history, &reserved, config) {
            Err(err) => Err(err),
            Ok(Step::Candidate(candidate)) => {
                let order = doc_key(&header.supplier_tax_id, candidate.purchase_order());
                for number in candidate.position_numbers() {
                    reserved.insert((order.clone(), number));
                }
                report.candidates.push(candidate);
                continue;
            }
            Ok(Step::WithoutOrder) => with_transaction(store, |s| {
                let mut engine = RuleEngine::new(s, &header);
                engine.flag(STATE_NOVELTY, OBS_WITHOUT_ORDER)?;
                engine.settle(STATE_NOVELTY, now)
            })
            .map(|_| report.without_order += 1),
            Ok(Step::Waiting(observation)) => with_transaction(store, |s| {
                let mut engine = RuleEngine::new(s, &header);
                engine.note_once(observation)?;
                engine.finish(STATE_WAITING.to_string(), now)
            })
            .map(|_| report.waiting += 1),
        };
        if let Err(err) = outcome {
            if err.is_fatal() {
                return Err(err);
            }
            warn!(id = header.id, factura = %header.invoice_number, error = %err, "header skipped");
            report.errors += 1;
        }
    }

    let records: Vec<CandidateRecord> = report.candidates.iter().map(candidate_record).collect();
    with_transaction(store, |s| s.replace_candidates(&records))?;
    info!(
        candidates = report.candidates.len(),
        without_order = report.without_order,
        waiting = report.waiting,
        "candidates built"
    );
    Ok(report)
}

fn plan(
    header: &InvoiceHeader,
    details: &HashMap<DocKey, Vec<InvoiceDetail>>,
    history: &HashMap<DocKey, Vec<PoPosition>>,
    reserved: &HashSet<(DocKey, String)>,
    config: &RunConfig,
) -> Result<Step, CxpError> {
    let Some(order) = header.purchase_order() else {
        return Ok(Step::WithoutOrder);
    };
    let Some(lines) = details.get(&doc_key(&header.supplier_tax_id, &header.invoice_number)) else {
        return Ok(Step::Waiting(OBS_WITHOUT_DETAIL));
    };
    let order_key = doc_key(&header.supplier_tax_id, order);
    // Positions another invoice of this run already claimed are out.
    let open: Vec<&PoPosition> = history
        .get(&order_key)
        .map(|positions| {
            positions
                .iter()
                .filter(|p| !reserved.contains(&(order_key.clone(), p.position_index.clone())))
                .collect()
        })
        .unwrap_or_default();
    if open.is_empty() {
        return Ok(Step::Waiting(OBS_WITHOUT_HISTORY));
    }

    let target = checked_sum(lines.iter().map(|d| d.line_extension_amount));
    let open_total = checked_sum(open.iter().map(|p| p.por_calcular.abs()));
    let Some(target) = target.filter(|_| open_total.is_some()) else {
        return Err(CxpError::Data(format!(
            "factura {} / orden {order}: montos fuera del rango representable",
            header.invoice_number
        )));
    };

    let selected: Vec<usize> = if open.len() <= lines.len() {
        (0..open.len()).collect()
    } else {
        let values: Vec<Decimal> = open.iter().map(|p| p.por_calcular).collect();
        let found = find_subset_with_budget(
            &values,
            target,
            lines.len(),
            config.tolerance,
            DEFAULT_SEARCH_BUDGET,
        );
        debug!(
            factura = %header.invoice_number,
            %target,
            positions = values.len(),
            stage = ?found.stage,
            "position match"
        );
        if !found.is_match() {
            return Ok(Step::Waiting(OBS_WITHOUT_MATCH));
        }
        found.indices
    };

    Ok(Step::Candidate(Candidate {
        header: header.clone(),
        details: lines.clone(),
        positions: selected.iter().map(|&i| open[i].clone()).collect(),
        selected,
    }))
}

fn header_field(name: &str, value: FieldValue) -> CandidateField {
    CandidateField::new(name, Provenance::Header, value)
}

fn detail_field(name: &str, value: FieldValue) -> CandidateField {
    CandidateField::new(name, Provenance::Detail, value)
}

fn history_field(name: &str, value: &str) -> CandidateField {
    CandidateField::new(name, Provenance::History, FieldValue::Text(value.to_string()))
}

/// Working-set row of a candidate: the header fields, aggregated detail and
/// pipe-joined history arrays the batteries read.
pub fn candidate_record(candidate: &Candidate) -> CandidateRecord {
    let h = &candidate.header;
    let hist = collapse_positions(&candidate.positions);
    let amounts = |f: fn(&InvoiceDetail) -> Option<Decimal>| {
        join_field(candidate.details.iter().map(|d| f(d).map(format_decimal)))
    };
    let fields = vec![
        header_field("ID", FieldValue::Integer(h.id)),
        header_field("NIT", FieldValue::Text(h.supplier_tax_id.clone())),
        header_field("Factura", FieldValue::Text(h.invoice_number.clone())),
        header_field("OrdenCompra", FieldValue::text(h.purchase_order())),
        header_field("FormaPago", FieldValue::text(h.payment_means.as_deref())),
        header_field("Moneda", FieldValue::Text(h.currency_code())),
        header_field("TRM", FieldValue::amount(h.trm)),
        header_field("ValorAPagar", FieldValue::amount(h.amount_to_pay)),
        header_field("ValorAPagarCOP", FieldValue::amount(h.amount_to_pay_cop)),
        header_field("NombreEmisor", FieldValue::text(h.supplier_name.as_deref())),
        detail_field(
            "Lineas",
            FieldValue::Integer(i64::try_from(candidate.details.len()).unwrap_or(i64::MAX)),
        ),
        detail_field("SubtotalLineas", FieldValue::Amount(candidate.subtotal())),
        detail_field("Cantidad", FieldValue::Text(amounts(|d| d.quantity))),
        detail_field("PrecioUnitario", FieldValue::Text(amounts(|d| d.unit_price))),
        detail_field(
            "ValorLinea",
            FieldValue::Text(amounts(|d| Some(d.line_extension_amount))),
        ),
        history_field("Posicion", &hist.positions),
        history_field("PorCalcular", &hist.por_calcular),
        history_field("TRM", &hist.trm),
        history_field("NombreProveedor", &hist.supplier_name),
        history_field("IndicadorImpuestos", &hist.tax_indicator),
        history_field("Cuenta", &hist.account),
        history_field("ClaseOrden", &hist.order_class),
        history_field("ActivoFijo", &hist.fixed_asset),
        history_field("CapitalizadoEl", &hist.capitalized_on),
        history_field("CriterioClasif2", &hist.criterion_2),
        history_field("CentroCoste", &hist.cost_center),
        history_field("ElementoPEP", &hist.pep_element),
        history_field("Orden", &hist.order),
        history_field("ClaseOrdenInterna", &hist.order_class_code),
        history_field("Emplazamiento", &hist.site),
        history_field("Cantidad", &hist.quantity),
        history_field("PrecioUnitario", &hist.unit_price),
        history_field("FecDoc", &hist.doc_date),
        history_field("FecReg", &hist.reg_date),
        history_field("Moneda", &hist.currency),
        history_field(
            "IndicesSeleccionados",
            &join_field(candidate.selected.iter().map(|i| Some(i.to_string()))),
        ),
    ];
    let (nit, factura) = h.key();
    CandidateRecord {
        id_registro: h.id,
        nit,
        factura,
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunConfigBuilder;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap()
    }

    fn header(id: i64, factura: &str, po: Option<&str>) -> InvoiceHeader {
        InvoiceHeader {
            id,
            supplier_tax_id: "800111".into(),
            invoice_number: factura.into(),
            document_type: Some(DocumentType::Invoice),
            purchase_order_ref: po.map(String::from),
            payment_means: Some("2".into()),
            ..Default::default()
        }
    }

    fn detail(factura: &str, line: u32, amount: Decimal) -> InvoiceDetail {
        InvoiceDetail {
            supplier_tax_id: "800111".into(),
            invoice_number: factura.into(),
            line_number: line,
            line_extension_amount: amount,
            ..Default::default()
        }
    }

    fn history(po: &str, amounts: &str, positions: &str) -> HistoryRow {
        HistoryRow {
            supplier_tax_id: "800111".into(),
            purchase_order: po.into(),
            positions: positions.into(),
            por_calcular: amounts.into(),
            order_class: "ZPAF".into(),
            ..Default::default()
        }
    }

    #[test]
    fn subset_is_picked_when_order_has_more_positions() {
        let mut store = MemoryStore::new();
        store.insert_header(header(1, "F1", Some("O1")));
        store.insert_detail(detail("F1", 1, dec!(400)));
        store.insert_detail(detail("F1", 2, dec!(600)));
        store.insert_history(history("O1", "600|400|400|600", "10|20|30|40"));
        let config = RunConfigBuilder::new("s", "d").tolerance(dec!(0)).build();

        let report = build_candidates(&mut store, &config, now()).unwrap();
        assert_eq!(report.candidates.len(), 1);
        let c = &report.candidates[0];
        assert_eq!(c.selected, vec![0, 1]);
        assert_eq!(c.position_numbers(), vec!["10", "20"]);
        assert_eq!(c.order_class(), Some(OrderClass::Zpaf));

        let records = store.candidates().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("PorCalcular_hoc").and_then(FieldValue::render).as_deref(),
            Some("600|400")
        );
    }

    #[test]
    fn missing_order_is_novelty_and_missing_history_waits() {
        let mut store = MemoryStore::new();
        store.insert_header(header(1, "F1", None));
        store.insert_header(header(2, "F2", Some("O2")));
        store.insert_detail(detail("F2", 1, dec!(100)));
        let config = RunConfigBuilder::new("s", "d").build();

        let report = build_candidates(&mut store, &config, now()).unwrap();
        assert!(report.candidates.is_empty());
        assert_eq!(report.without_order, 1);
        assert_eq!(report.waiting, 1);

        let h1 = store.header(1).unwrap().unwrap();
        assert_eq!(h1.final_result_pre_events.as_deref(), Some("CON NOVEDAD"));
        assert_eq!(h1.phase4_observation.as_deref(), Some(OBS_WITHOUT_ORDER));
        let h2 = store.header(2).unwrap().unwrap();
        assert_eq!(h2.final_result_pre_events.as_deref(), Some("EN ESPERA"));
        assert_eq!(store.novelties().unwrap().len(), 1);
    }

    #[test]
    fn waiting_observation_is_not_repeated() {
        let mut store = MemoryStore::new();
        store.insert_header(header(1, "F1", Some("O1")));
        let config = RunConfigBuilder::new("s", "d").build();
        build_candidates(&mut store, &config, now()).unwrap();
        build_candidates(&mut store, &config, now()).unwrap();
        let h = store.header(1).unwrap().unwrap();
        assert_eq!(h.phase4_observation.as_deref(), Some(OBS_WITHOUT_DETAIL));
        assert_eq!(h.retake_date, Some(now()));
    }

    #[test]
    fn two_invoices_do_not_share_positions() {
        let mut store = MemoryStore::new();
        store.insert_header(header(1, "F1", Some("O1")));
        store.insert_header(header(2, "F2", Some("O1")));
        store.insert_detail(detail("F1", 1, dec!(500)));
        store.insert_detail(detail("F2", 1, dec!(500)));
        store.insert_history(history("O1", "500|500|900", "10|20|30"));
        let config = RunConfigBuilder::new("s", "d").tolerance(dec!(0)).build();

        let report = build_candidates(&mut store, &config, now()).unwrap();
        let numbers: Vec<Vec<String>> = report.candidates.iter().map(Candidate::position_numbers).collect();
        assert_eq!(numbers, vec![vec!["10".to_string()], vec!["20".to_string()]]);
    }

    #[test]
    fn oversized_amounts_skip_the_header() {
        let mut store = MemoryStore::new();
        store.insert_header(header(1, "F1", Some("O1")));
        store.insert_detail(detail("F1", 1, dec!(500)));
        store.insert_detail(detail("F1", 2, dec!(500)));
        store.insert_history(history(
            "O1",
            "50000000000000000000000000000|50000000000000000000000000000|1",
            "10|20|30",
        ));
        let config = RunConfigBuilder::new("s", "d").build();

        let report = build_candidates(&mut store, &config, now()).unwrap();
        assert!(report.candidates.is_empty());
        assert_eq!(report.errors, 1);
        assert!(store.header(1).unwrap().unwrap().is_pending());
    }

    #[test]
    fn processed_positions_are_never_chosen() {
        let mut store = MemoryStore::new();
        store.insert_header(header(1, "F1", Some("O1")));
        store.insert_detail(detail("F1", 1, dec!(500)));
        let mut row = history("O1", "500|500", "10|20");
        row.mark = "PROCESADO|".into();
        store.insert_history(row);
        let config = RunConfigBuilder::new("s", "d").build();

        let report = build_candidates(&mut store, &config, now()).unwrap();
        assert_eq!(report.candidates[0].position_numbers(), vec!["20"]);
    }
}
