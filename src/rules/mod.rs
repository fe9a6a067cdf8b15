//! Data-driven rule tables and the engine that runs them.
//!
//! A battery is an ordered slice of [`Rule`]s over some context type. The
//! [`RuleEngine`] runs every rule (no short-circuit), writes the ledger rows
//! each [`Check`] reports, prepends the observation of every failed rule to
//! the header and the ledger, and at the end settles the document state.
//!
//! The final state is the fail state of the *last* failing rule; a battery
//! with no failure ends in the state chosen by the caller.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::core::values::OBSERVATION_SEPARATOR;
use crate::core::{
    Approval, CxpError, HeaderUpdate, InvoiceHeader, is_novelty, with_cash_suffix,
};
use crate::ledger::{LedgerEntry, LedgerWriter, record_novelty};
use crate::store::Store;

/// Outcome of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// The rule does not apply to this document; nothing is written.
    NotApplicable,
}

/// What a rule found: its verdict, the ledger values it observed and an
/// optional detail appended to the rule's observation on failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub verdict: Verdict,
    pub entries: Vec<LedgerEntry>,
    pub detail: Option<String>,
}

impl Check {
    pub fn pass(entries: Vec<LedgerEntry>) -> Self {
        Self {
            verdict: Verdict::Pass,
            entries,
            detail: None,
        }
    }

    pub fn fail(entries: Vec<LedgerEntry>) -> Self {
        Self {
            verdict: Verdict::Fail,
            entries,
            detail: None,
        }
    }

    /// Pass when `ok`, fail otherwise.
    pub fn from_bool(ok: bool, entries: Vec<LedgerEntry>) -> Self {
        if ok { Self::pass(entries) } else { Self::fail(entries) }
    }

    /// Pass iff every entry carries `Aprobado = SI`.
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        let ok = entries.iter().all(|e| e.aprobado != Some(Approval::No));
        Self::from_bool(ok, entries)
    }

    pub fn not_applicable() -> Self {
        Self {
            verdict: Verdict::NotApplicable,
            entries: Vec::new(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One row of a battery table.
pub struct Rule<C: ?Sized> {
    /// Stable identifier, used in logs.
    pub id: &'static str,
    /// Ledger items the rule writes.
    pub items: &'static [&'static str],
    /// Observation text on failure.
    pub observation: &'static str,
    /// State the document takes if this is the last failing rule.
    pub fail_state: &'static str,
    pub check: fn(&C) -> Check,
}

impl<C: ?Sized> std::fmt::Debug for Rule<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("items", &self.items)
            .field("fail_state", &self.fail_state)
            .finish()
    }
}

/// How a document ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// State without the cash suffix.
    pub state: String,
    /// `ResultadoFinalAntesEventos` as written.
    pub final_result: String,
    /// Ids of the rules that failed, in run order.
    pub failed_rules: Vec<&'static str>,
}

impl Settlement {
    pub fn is_novelty(&self) -> bool {
        is_novelty(&self.state)
    }
}

/// Runs rule tables for one document.
pub struct RuleEngine<'a, S: Store + ?Sized> {
    store: &'a mut S,
    header: &'a InvoiceHeader,
    ledger: LedgerWriter,
    fail_state: Option<String>,
    failed_rules: Vec<&'static str>,
    order_dates: Option<(String, String)>,
}

impl<'a, S: Store + ?Sized> RuleEngine<'a, S> {
    pub fn new(store: &'a mut S, header: &'a InvoiceHeader) -> Self {
        Self {
            store,
            header,
            ledger: LedgerWriter::for_header(header),
            fail_state: None,
            failed_rules: Vec::new(),
            order_dates: None,
        }
    }

    /// FecDoc/FecReg of the purchase order, recorded with any novelty.
    pub fn with_order_dates(mut self, doc_date: Option<String>, reg_date: Option<String>) -> Self {
        self.order_dates = Some((doc_date.unwrap_or_default(), reg_date.unwrap_or_default()));
        self
    }

    pub fn store(&mut self) -> &mut S {
        self.store
    }

    pub fn ledger(&self) -> &LedgerWriter {
        &self.ledger
    }

    pub fn has_novelty(&self) -> bool {
        self.fail_state.is_some()
    }

    /// Fail state of the last failing rule so far.
    pub fn failing_state(&self) -> Option<&str> {
        self.fail_state.as_deref()
    }

    /// Run every rule of `rules` against `ctx`, in order.
    pub fn run<C: ?Sized>(&mut self, rules: &[Rule<C>], ctx: &C) -> Result<(), CxpError> {
        for rule in rules {
            self.evaluate(rule, ctx)?;
        }
        Ok(())
    }

    pub fn evaluate<C: ?Sized>(&mut self, rule: &Rule<C>, ctx: &C) -> Result<Verdict, CxpError> {
        let check = (rule.check)(ctx);
        if check.verdict == Verdict::NotApplicable {
            debug!(rule = rule.id, "rule not applicable");
            return Ok(Verdict::NotApplicable);
        }
        let default = Approval::from_bool(check.verdict == Verdict::Pass);
        for entry in &check.entries {
            let mut entry = entry.clone();
            entry.aprobado.get_or_insert(default);
            self.record(&entry)?;
        }
        if check.verdict == Verdict::Fail {
            let observation = match &check.detail {
                Some(detail) => format!("{} {detail}", rule.observation),
                None => rule.observation.to_string(),
            };
            self.failed_rules.push(rule.id);
            self.flag_once(rule.fail_state, &observation)?;
            debug!(rule = rule.id, %observation, "rule failed");
        }
        Ok(check.verdict)
    }

    /// Write one ledger value outside of a rule table.
    pub fn record(&mut self, entry: &LedgerEntry) -> Result<(), CxpError> {
        self.ledger.upsert(self.store, entry)?;
        Ok(())
    }

    /// Register a failure that does not come from a rule table.
    pub fn flag(&mut self, fail_state: &str, observation: &str) -> Result<(), CxpError> {
        self.fail_state = Some(fail_state.to_string());
        self.note(observation)
    }

    /// [`RuleEngine::flag`], unless the document's observation already
    /// holds `observation` (a retried document failing the same way).
    pub fn flag_once(&mut self, fail_state: &str, observation: &str) -> Result<(), CxpError> {
        self.fail_state = Some(fail_state.to_string());
        self.note_once(observation)
    }

    /// [`RuleEngine::note`], skipped when the observation is already among
    /// the stored ones.
    pub fn note_once(&mut self, observation: &str) -> Result<(), CxpError> {
        let observation = observation.trim();
        let current = self.store.header(self.header.id)?;
        let repeated = current
            .and_then(|h| h.phase4_observation)
            .is_some_and(|o| holds_segment(&o, observation));
        if repeated {
            return Ok(());
        }
        self.note(observation)
    }

    /// Prepend `observation` to the header and the ledger without changing
    /// the outcome.
    pub fn note(&mut self, observation: &str) -> Result<(), CxpError> {
        self.store.update_header(
            self.header.id,
            &HeaderUpdate {
                observation: Some(observation.to_string()),
                ..Default::default()
            },
        )?;
        self.ledger.append_observation(self.store, observation)
    }

    /// Close the document: the failing state if any rule failed, otherwise
    /// `clean_state`. Writes the header, replicates the state onto the
    /// ledger and records novelties.
    pub fn settle(self, clean_state: &str, now: NaiveDateTime) -> Result<Settlement, CxpError> {
        let state = self.fail_state.clone().unwrap_or_else(|| clean_state.to_string());
        self.finish(state, now)
    }

    /// Close the document in `state`, whatever the rules said.
    pub fn finish(self, state: String, now: NaiveDateTime) -> Result<Settlement, CxpError> {
        let final_result = with_cash_suffix(&state, self.header.payment_means.as_deref());
        let first_pass = self.header.first_process_date.is_none();
        self.store.update_header(
            self.header.id,
            &HeaderUpdate {
                phase4_state: Some(state.clone()),
                final_result: Some(final_result.clone()),
                first_process_date: first_pass.then_some(now),
                retake_date: (!first_pass).then_some(now),
                ..Default::default()
            },
        )?;
        self.ledger.set_state(self.store, &final_result)?;
        if is_novelty(&state) {
            record_novelty(self.store, self.header, &final_result, now, self.order_dates)?;
        }
        info!(
            nit = %self.header.supplier_tax_id,
            factura = %self.header.invoice_number,
            result = %final_result,
            failed = self.failed_rules.len(),
            "document settled"
        );
        Ok(Settlement {
            state,
            final_result,
            failed_rules: self.failed_rules,
        })
    }
}

/// `observation` is a whole segment of the joined `text`, compared
/// segment-wise so an observation holding the separator still matches.
fn holds_segment(text: &str, observation: &str) -> bool {
    let sep = OBSERVATION_SEPARATOR;
    text == observation
        || text.strip_prefix(observation).is_some_and(|rest| rest.starts_with(sep))
        || text.strip_suffix(observation).is_some_and(|rest| rest.ends_with(sep))
        || text.contains(&format!("{sep}{observation}{sep}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::STATE_NOVELTY;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    struct Ctx {
        a: bool,
        b: bool,
    }

    fn check_a(ctx: &Ctx) -> Check {
        Check::from_bool(ctx.a, vec![LedgerEntry::new("A").xml("1").order("1")])
    }

    fn check_b(ctx: &Ctx) -> Check {
        Check::from_bool(ctx.b, vec![LedgerEntry::new("B").xml("2").order("3")])
    }

    const BATTERY: &[Rule<Ctx>] = &[
        Rule {
            id: "a",
            items: &["A"],
            observation: "X",
            fail_state: STATE_NOVELTY,
            check: check_a,
        },
        Rule {
            id: "b",
            items: &["B"],
            observation: "Y",
            fail_state: "CON NOVEDAD - COMERCIALIZADOS",
            check: check_b,
        },
    ];

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .unwrap()
    }

    fn seeded(payment: &str) -> (MemoryStore, InvoiceHeader) {
        let header = InvoiceHeader {
            id: 3,
            supplier_tax_id: "800111".into(),
            invoice_number: "F3".into(),
            payment_means: Some(payment.into()),
            ..Default::default()
        };
        let mut store = MemoryStore::new();
        store.insert_header(header.clone());
        (store, header)
    }

    #[test]
    fn every_rule_runs_and_last_failure_wins() {
        let (mut store, header) = seeded("01");
        let mut engine = RuleEngine::new(&mut store, &header);
        engine.run(BATTERY, &Ctx { a: false, b: false }).unwrap();
        let settlement = engine.settle("PROCESADO", now()).unwrap();
        assert_eq!(settlement.failed_rules, vec!["a", "b"]);
        assert_eq!(settlement.final_result, "CON NOVEDAD - COMERCIALIZADOS CONTADO");

        let h = store.header(3).unwrap().unwrap();
        assert_eq!(h.phase4_observation.as_deref(), Some("Y, X"));
        assert_eq!(h.first_process_date, Some(now()));
        let rows = store.ledger_rows("800111", "F3").unwrap();
        assert!(rows
            .iter()
            .all(|r| r.estado_validacion.as_deref() == Some("CON NOVEDAD - COMERCIALIZADOS CONTADO")));
        assert_eq!(store.novelties().unwrap().len(), 1);
    }

    #[test]
    fn repeated_observation_is_written_once() {
        let (mut store, header) = seeded("2");
        let mut engine = RuleEngine::new(&mut store, &header);
        engine.flag_once(STATE_NOVELTY, "Z").unwrap();
        engine.flag_once(STATE_NOVELTY, "Z").unwrap();
        engine.note_once("W").unwrap();
        engine.flag_once(STATE_NOVELTY, "Z").unwrap();
        assert_eq!(engine.failing_state(), Some(STATE_NOVELTY));
        engine.settle("PROCESADO", now()).unwrap();
        let h = store.header(3).unwrap().unwrap();
        assert_eq!(h.phase4_observation.as_deref(), Some("W, Z"));
    }

    #[test]
    fn shorter_observation_is_not_mistaken_for_a_longer_one() {
        let (mut store, header) = seeded("2");
        let mut engine = RuleEngine::new(&mut store, &header);
        engine.note_once("Cuenta no valida").unwrap();
        engine.note_once("Cuenta").unwrap();
        engine.note_once("no valida").unwrap();
        engine.note_once("Cuenta").unwrap();
        engine.settle("PROCESADO", now()).unwrap();
        let h = store.header(3).unwrap().unwrap();
        assert_eq!(
            h.phase4_observation.as_deref(),
            Some("no valida, Cuenta, Cuenta no valida")
        );
    }

    #[test]
    fn segments_match_whole_observations() {
        assert!(holds_segment("Cuenta", "Cuenta"));
        assert!(holds_segment("A, Cuenta, B", "Cuenta"));
        assert!(holds_segment("Monto (factura 1, orden 2), B", "Monto (factura 1, orden 2)"));
        assert!(!holds_segment("Cuenta no valida", "Cuenta"));
        assert!(!holds_segment("B, no Cuenta", "Cuenta"));
    }

    #[test]
    fn clean_run_writes_approvals() {
        let (mut store, header) = seeded("2");
        let mut engine = RuleEngine::new(&mut store, &header);
        engine.run(BATTERY, &Ctx { a: true, b: true }).unwrap();
        assert!(!engine.has_novelty());
        let settlement = engine.settle("PROCESADO", now()).unwrap();
        assert_eq!(settlement.final_result, "PROCESADO");
        let rows = store.ledger_rows("800111", "F3").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.aprobado == Some(Approval::Yes)));
        assert!(store.novelties().unwrap().is_empty());
    }
}
