use chrono::{NaiveDate, NaiveDateTime};
use cxp_validacion::core::*;
use cxp_validacion::ledger::{ITEM_OBSERVATIONS, LedgerEntry, LedgerWriter, backfill_novelty_dates};
use cxp_validacion::rules::{Check, Rule, RuleEngine};
use cxp_validacion::store::{MemoryStore, Store};

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 3)
        .and_then(|d| d.and_hms_opt(7, 30, 0))
        .unwrap()
}

fn header(id: i64, factura: &str, payment: &str) -> InvoiceHeader {
    InvoiceHeader {
        id,
        supplier_tax_id: "800111".into(),
        invoice_number: factura.into(),
        document_type: Some(DocumentType::Invoice),
        purchase_order_ref: Some("O1".into()),
        payment_means: Some(payment.into()),
        ..Default::default()
    }
}

fn seeded(h: &InvoiceHeader) -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert_header(h.clone());
    store
}

// --- Ledger protocol ---

#[test]
fn upsert_is_keyed_by_item_and_ordinal() {
    let h = header(1, "F1", "2");
    let mut store = seeded(&h);
    let ledger = LedgerWriter::for_header(&h);

    ledger
        .upsert(&mut store, &LedgerEntry::new("Cuenta").ordinal(1).order("2695950020"))
        .unwrap();
    ledger
        .upsert(&mut store, &LedgerEntry::new("Cuenta").ordinal(2).order("5199150001"))
        .unwrap();
    ledger
        .upsert(&mut store, &LedgerEntry::new("Cuenta").ordinal(1).approved(Approval::Yes))
        .unwrap();

    let rows = store.ledger_rows("800111", "F1").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key.ordinal, 1);
    assert_eq!(rows[0].valor_orden_compra.as_deref(), Some("2695950020"));
    assert_eq!(rows[0].aprobado, Some(Approval::Yes));
    assert_eq!(rows[1].aprobado, None);
}

#[test]
fn new_rows_inherit_the_document_state() {
    let h = header(1, "F1", "2");
    let mut store = seeded(&h);
    let ledger = LedgerWriter::for_header(&h);
    ledger.upsert(&mut store, &LedgerEntry::new("TRM").xml("1")).unwrap();
    ledger.set_state(&mut store, "CON NOVEDAD").unwrap();
    ledger.upsert(&mut store, &LedgerEntry::new("Cuenta")).unwrap();

    let rows = store.ledger_rows("800111", "F1").unwrap();
    assert!(rows.iter().all(|r| r.estado_validacion.as_deref() == Some("CON NOVEDAD")));
}

#[test]
fn ledger_values_are_capped() {
    let h = header(1, "F1", "2");
    let mut store = seeded(&h);
    let ledger = LedgerWriter::for_header(&h);
    ledger
        .upsert(&mut store, &LedgerEntry::new("Nombre emisor").xml("x".repeat(10_000)))
        .unwrap();
    let rows = store.ledger_rows("800111", "F1").unwrap();
    assert!(rows[0].valor_xml.as_ref().unwrap().chars().count() <= 3900);
}

// --- Rule engine outcome ---

fn passes(_: &bool) -> Check {
    Check::pass(Vec::new())
}

fn fails(_: &bool) -> Check {
    Check::fail(Vec::new())
}

#[test]
fn observations_prepend_in_failure_order() {
    let h = header(1, "F1", "01");
    let mut store = seeded(&h);
    let rules = [
        Rule {
            id: "x",
            items: &[],
            observation: "X",
            fail_state: STATE_NOVELTY,
            check: fails,
        },
        Rule {
            id: "ok",
            items: &[],
            observation: "nunca",
            fail_state: STATE_NOVELTY,
            check: passes,
        },
        Rule {
            id: "y",
            items: &[],
            observation: "Y",
            fail_state: STATE_NOVELTY,
            check: fails,
        },
    ];
    let mut engine = RuleEngine::new(&mut store, &h).with_order_dates(
        Some("2024-05-02".into()),
        Some("2024-05-03".into()),
    );
    engine.run(&rules, &true).unwrap();
    let settlement = engine.settle(STATE_PROCESSED, now()).unwrap();
    assert_eq!(settlement.failed_rules, vec!["x", "y"]);
    assert_eq!(settlement.final_result, "CON NOVEDAD CONTADO");

    let stored = store.header(1).unwrap().unwrap();
    assert_eq!(stored.phase4_observation.as_deref(), Some("Y, X"));
    assert_eq!(stored.phase4_state.as_deref(), Some("CON NOVEDAD"));

    let rows = store.ledger_rows("800111", "F1").unwrap();
    let observations = rows.iter().find(|r| r.key.item == ITEM_OBSERVATIONS).unwrap();
    assert_eq!(observations.valor_xml.as_deref(), Some("Y, X"));

    let novelties = store.novelties().unwrap();
    assert_eq!(novelties.len(), 1);
    assert_eq!(novelties[0].state, "CON NOVEDAD CONTADO");
    assert_eq!(novelties[0].observation, "Y, X");
    assert_eq!(novelties[0].purchase_order.as_deref(), Some("O1"));
    assert_eq!(novelties[0].doc_date.as_deref(), Some("2024-05-02"));
}

#[test]
fn second_pass_sets_retake_date_only() {
    let h = header(1, "F1", "2");
    let mut store = seeded(&h);
    RuleEngine::new(&mut store, &h)
        .finish(STATE_WAITING.to_string(), now())
        .unwrap();
    let first = store.header(1).unwrap().unwrap();
    assert_eq!(first.first_process_date, Some(now()));
    assert_eq!(first.retake_date, None);

    let later = now() + chrono::Duration::days(1);
    RuleEngine::new(&mut store, &first)
        .finish(STATE_PROCESSED.to_string(), later)
        .unwrap();
    let second = store.header(1).unwrap().unwrap();
    assert_eq!(second.first_process_date, Some(now()));
    assert_eq!(second.retake_date, Some(later));
    assert_eq!(second.final_result_pre_events.as_deref(), Some("PROCESADO"));
}

// --- HistoricoNovedades ---

#[test]
fn novelty_dates_are_backfilled_from_history() {
    let h = header(1, "F1", "2");
    let mut store = seeded(&h);
    let mut engine = RuleEngine::new(&mut store, &h);
    engine.flag(STATE_NOVELTY, "Registro sin orden de compra").unwrap();
    engine.settle(STATE_PROCESSED, now()).unwrap();
    assert!(store.novelties().unwrap()[0].doc_date.is_none());

    store.insert_history(HistoryRow {
        supplier_tax_id: "800111".into(),
        purchase_order: "O1".into(),
        positions: "10|20".into(),
        por_calcular: "500|500".into(),
        doc_date: "2024-04-30|2024-05-01".into(),
        reg_date: "2024-05-02".into(),
        ..Default::default()
    });
    assert_eq!(backfill_novelty_dates(&mut store).unwrap(), 1);
    let novelties = store.novelties().unwrap();
    let novelty = &novelties[0];
    assert_eq!(novelty.doc_date.as_deref(), Some("2024-04-30"));
    assert_eq!(novelty.reg_date.as_deref(), Some("2024-05-02"));

    assert_eq!(backfill_novelty_dates(&mut store).unwrap(), 0);
}
