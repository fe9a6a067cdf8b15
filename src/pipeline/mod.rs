//! Run entry point.
//!
//! One run opens one database session and goes through every stage in
//! order: novelty date backfill, candidate building, battery dispatch,
//! credit notes and debit notes. Each document is closed in its own
//! transaction, so an aborted run keeps what it already closed.
//!
//! ```
//! use chrono::NaiveDate;
//! use cxp_validacion::core::RunConfigBuilder;
//! use cxp_validacion::pipeline::run_with_store;
//! use cxp_validacion::store::MemoryStore;
//!
//! let config = RunConfigBuilder::new("localhost", "cxp").build();
//! let now = NaiveDate::from_ymd_opt(2024, 6, 1)
//!     .and_then(|d| d.and_hms_opt(8, 0, 0))
//!     .unwrap();
//! let stats = run_with_store(&config, &mut MemoryStore::new(), now).unwrap();
//! assert_eq!(stats.candidatos, 0);
//! ```

mod outcome;

pub use outcome::{
    RunFailure, RunOutcome, RunStats, VAR_ERROR_DETAIL, VAR_RESULT, VAR_STATS, VAR_SUMMARY,
    VAR_SYSTEM_ERROR,
};

use chrono::{Local, NaiveDateTime};
use tracing::{error, info, info_span, warn};

use crate::core::{CxpError, RunConfig, STATE_PROCESSED, STATE_WAITING};
use crate::hu41::{Dispatcher, build_candidates};
use crate::hu42::{reconcile_credit_notes, validate_debit_notes};
use crate::ledger::backfill_novelty_dates;
use crate::store::{ConnectionSettings, Connector, RetryPolicy, Store, open_session};

/// Parse `config_text` and run against a session of `connector`, now.
pub fn execute<C: Connector>(config_text: &str, connector: &mut C) -> RunOutcome {
    execute_at(config_text, connector, Local::now().naive_local())
}

/// [`execute`] at a fixed instant.
pub fn execute_at<C: Connector>(
    config_text: &str,
    connector: &mut C,
    now: NaiveDateTime,
) -> RunOutcome {
    match RunConfig::parse(config_text) {
        Ok(config) => execute_config(&config, connector, now),
        Err(err) => {
            error!(error = %err, "invalid configuration");
            RunOutcome::failure(&err, RunStats::default())
        }
    }
}

/// Open a session for `config` and run every stage.
pub fn execute_config<C: Connector>(
    config: &RunConfig,
    connector: &mut C,
    now: NaiveDateTime,
) -> RunOutcome {
    let settings = ConnectionSettings::from_config(config);
    let mut session = match open_session(connector, &settings, &RetryPolicy::from_config(config)) {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "no database session");
            return RunOutcome::failure(&err, RunStats::default());
        }
    };
    let mut stats = RunStats::default();
    match run_stages(config, &mut session, now, &mut stats) {
        Ok(()) => RunOutcome::success(stats),
        Err(err) => {
            error!(error = %err, "run aborted");
            RunOutcome::failure(&err, stats)
        }
    }
}

/// Run every stage against an open store.
pub fn run_with_store<S: Store + ?Sized>(
    config: &RunConfig,
    store: &mut S,
    now: NaiveDateTime,
) -> Result<RunStats, CxpError> {
    let mut stats = RunStats::default();
    run_stages(config, store, now, &mut stats)?;
    Ok(stats)
}

fn run_stages<S: Store + ?Sized>(
    config: &RunConfig,
    store: &mut S,
    now: NaiveDateTime,
    stats: &mut RunStats,
) -> Result<(), CxpError> {
    let span = info_span!("cxp_run", server = %config.server, database = %config.database);
    let _guard = span.enter();

    let filled = backfill_novelty_dates(store)?;
    info!(filled, "novelty history checked");

    let built = build_candidates(store, config, now)?;
    stats.candidatos = built.candidates.len();
    stats.sin_orden = built.without_order;
    stats.en_espera = built.waiting;
    stats.errores = built.errors;

    let mut dispatcher = Dispatcher::new(config);
    for candidate in &built.candidates {
        match dispatcher.validate(store, candidate, now) {
            Ok(settlement) if settlement.state == STATE_PROCESSED => stats.procesados += 1,
            Ok(settlement) if settlement.is_novelty() => stats.con_novedad += 1,
            Ok(settlement) if settlement.state.starts_with(STATE_WAITING) => stats.en_espera += 1,
            Ok(_) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(
                    id = candidate.header.id,
                    factura = %candidate.header.invoice_number,
                    error = %err,
                    "candidate failed"
                );
                stats.errores += 1;
            }
        }
    }

    let credit = reconcile_credit_notes(store, config, now)?;
    stats.nc_encontradas = credit.found;
    stats.nc_no_exitosas = credit.not_successful;
    stats.nc_con_novedad = credit.novelty;
    stats.errores += credit.errors;

    let debit = validate_debit_notes(store, now)?;
    stats.nd_procesadas = debit.processed + debit.novelty;
    stats.errores += debit.errors;

    info!(
        candidatos = stats.candidatos,
        procesados = stats.procesados,
        con_novedad = stats.con_novedad,
        errores = stats.errores,
        "run finished"
    );
    Ok(())
}
