use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::{debug, info, info_span};

use super::zpcn::ZpcnContext;
use super::zven::{self, ZvenContext};
use super::{Candidate, RuleContext, zpaf, zpcn, zpre};
use crate::core::{
    CxpError, KEY_ASOCIACION, KEY_IMPUESTOS_ESPECIALES, KEY_MAESTRO, OrderClass, RunConfig,
    STATE_PROCESSED,
};
use crate::masters::{AsociacionCuentaIndicador, ImpuestosEspeciales, MaestroComercializados};
use crate::rules::{Rule, RuleEngine, Settlement};
use crate::store::{Store, with_transaction};

/// Rule battery a candidate goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Battery {
    FixedAssets,
    Commercialized,
    GeneralOrders,
    ServiceReceptions,
}

impl Battery {
    pub fn for_class(class: OrderClass) -> Self {
        match class {
            OrderClass::Zpaf => Self::FixedAssets,
            OrderClass::Zven => Self::Commercialized,
            OrderClass::Zpcn | OrderClass::Zppa => Self::GeneralOrders,
            OrderClass::Zpre => Self::ServiceReceptions,
        }
    }

    /// Battery of the candidate's first chosen position.
    pub fn for_candidate(candidate: &Candidate) -> Result<Self, CxpError> {
        let first = candidate.positions.first().ok_or_else(|| {
            CxpError::Data(format!(
                "factura {} sin posiciones elegidas",
                candidate.header.invoice_number
            ))
        })?;
        first.order_class().map(Self::for_class).ok_or_else(|| {
            CxpError::Data(format!(
                "factura {}: clase de orden desconocida '{}'",
                candidate.header.invoice_number,
                first.order_class.as_deref().unwrap_or_default()
            ))
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedAssets => "ZPAF",
            Self::Commercialized => "ZVEN",
            Self::GeneralOrders => "ZPCN",
            Self::ServiceReceptions => "ZPRE",
        }
    }
}

/// Excel masters, each read at most once per run.
#[derive(Debug, Default)]
pub struct MasterCache {
    maestro: Option<MaestroComercializados>,
    asociacion: Option<AsociacionCuentaIndicador>,
    impuestos: Option<ImpuestosEspeciales>,
}

fn required_path<'c>(path: &'c Option<PathBuf>, key: &str) -> Result<&'c Path, CxpError> {
    path.as_deref()
        .ok_or_else(|| CxpError::Configuration(format!("missing required key '{key}'")))
}

impl MasterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use already-loaded commercialized-goods masters.
    pub fn with_commercialized(
        mut self,
        maestro: MaestroComercializados,
        asociacion: AsociacionCuentaIndicador,
    ) -> Self {
        self.maestro = Some(maestro);
        self.asociacion = Some(asociacion);
        self
    }

    /// Use an already-loaded `IVA CECO` table.
    pub fn with_special_taxes(mut self, impuestos: ImpuestosEspeciales) -> Self {
        self.impuestos = Some(impuestos);
        self
    }

    pub fn load_commercialized(&mut self, config: &RunConfig) -> Result<(), CxpError> {
        if self.maestro.is_none() {
            let path = required_path(&config.maestro_comercializados, KEY_MAESTRO)?;
            let maestro = MaestroComercializados::load(path)?;
            info!(path = %path.display(), rows = maestro.len(), "maestro de comercializados loaded");
            self.maestro = Some(maestro);
        }
        if self.asociacion.is_none() {
            let path = required_path(&config.asociacion_cuenta_indicador, KEY_ASOCIACION)?;
            let asociacion = AsociacionCuentaIndicador::load(path)?;
            info!(path = %path.display(), rows = asociacion.rows().len(), "asociacion cuenta indicador loaded");
            self.asociacion = Some(asociacion);
        }
        Ok(())
    }

    pub fn load_special_taxes(&mut self, config: &RunConfig) -> Result<(), CxpError> {
        if self.impuestos.is_none() {
            let path = required_path(&config.impuestos_especiales, KEY_IMPUESTOS_ESPECIALES)?;
            self.impuestos = Some(ImpuestosEspeciales::load(path)?);
            info!(path = %path.display(), "impuestos especiales loaded");
        }
        Ok(())
    }

    pub fn commercialized(&self) -> Option<(&MaestroComercializados, &AsociacionCuentaIndicador)> {
        self.maestro.as_ref().zip(self.asociacion.as_ref())
    }

    pub fn special_taxes(&self) -> Option<&ImpuestosEspeciales> {
        self.impuestos.as_ref()
    }
}

fn not_loaded(what: &str) -> CxpError {
    CxpError::Master(format!("{what} not loaded"))
}

fn run_rules<S: Store + ?Sized, C>(
    mut engine: RuleEngine<'_, S>,
    rules: &[Rule<C>],
    ctx: &C,
    now: NaiveDateTime,
) -> Result<Settlement, CxpError> {
    engine.run(rules, ctx)?;
    engine.settle(STATE_PROCESSED, now)
}

/// Routes candidates to their battery and closes them.
pub struct Dispatcher<'c> {
    config: &'c RunConfig,
    masters: MasterCache,
}

impl<'c> Dispatcher<'c> {
    pub fn new(config: &'c RunConfig) -> Self {
        Self::with_masters(config, MasterCache::new())
    }

    pub fn with_masters(config: &'c RunConfig, masters: MasterCache) -> Self {
        Self { config, masters }
    }

    /// Validate one candidate in its own transaction.
    ///
    /// A clean `PROCESADO` marks the chosen positions as consumed. Masters
    /// are loaded before the transaction opens; their errors are fatal.
    pub fn validate<S: Store + ?Sized>(
        &mut self,
        store: &mut S,
        candidate: &Candidate,
        now: NaiveDateTime,
    ) -> Result<Settlement, CxpError> {
        let battery = Battery::for_candidate(candidate)?;
        let span = info_span!(
            "candidate",
            id = candidate.header.id,
            factura = %candidate.header.invoice_number,
            battery = battery.name()
        );
        let _guard = span.enter();

        match battery {
            Battery::Commercialized => self.masters.load_commercialized(self.config)?,
            Battery::GeneralOrders => self.masters.load_special_taxes(self.config)?,
            Battery::FixedAssets | Battery::ServiceReceptions => {}
        }
        let config = self.config;
        let masters = &self.masters;

        with_transaction(store, |s| {
            let first = candidate.positions.first();
            let engine = RuleEngine::new(s, &candidate.header).with_order_dates(
                first.and_then(|p| p.doc_date.clone()),
                first.and_then(|p| p.reg_date.clone()),
            );
            let ctx = RuleContext::new(candidate, config);
            let settlement = match battery {
                Battery::FixedAssets => run_rules(engine, &zpaf::rules(), &ctx, now)?,
                Battery::ServiceReceptions => run_rules(engine, &zpre::rules(), &ctx, now)?,
                Battery::GeneralOrders => {
                    let impuestos = masters
                        .special_taxes()
                        .ok_or_else(|| not_loaded("impuestos especiales"))?;
                    let ctx = ZpcnContext::new(ctx, impuestos);
                    run_rules(engine, &zpcn::rules(), &ctx, now)?
                }
                Battery::Commercialized => {
                    let (maestro, asociacion) = masters
                        .commercialized()
                        .ok_or_else(|| not_loaded("maestro de comercializados"))?;
                    let ctx = ZvenContext::new(ctx, maestro, asociacion);
                    if !ctx.in_maestro() {
                        return zven::hold_for_maestro(engine, candidate, config, now);
                    }
                    run_rules(engine, &zven::rules(), &ctx, now)?
                }
            };
            if settlement.state == STATE_PROCESSED {
                if let Some(first) = first {
                    let marked = s.mark_positions(
                        &first.supplier_tax_id,
                        &first.purchase_order,
                        &candidate.position_numbers(),
                    )?;
                    debug!(marked, "positions consumed");
                }
            }
            Ok(settlement)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InvoiceHeader, PoPosition, RunConfigBuilder};

    fn candidate(class: &str) -> Candidate {
        Candidate {
            header: InvoiceHeader {
                invoice_number: "F1".into(),
                ..Default::default()
            },
            details: Vec::new(),
            positions: vec![PoPosition {
                order_class: Some(class.into()),
                ..Default::default()
            }],
            selected: vec![0],
        }
    }

    #[test]
    fn routing() {
        assert_eq!(Battery::for_candidate(&candidate("41")).unwrap(), Battery::FixedAssets);
        assert_eq!(Battery::for_candidate(&candidate("ZPPA")).unwrap(), Battery::GeneralOrders);
        assert_eq!(Battery::for_candidate(&candidate("ZVEN")).unwrap(), Battery::Commercialized);
        assert_eq!(Battery::for_candidate(&candidate("45")).unwrap(), Battery::ServiceReceptions);
        let err = Battery::for_candidate(&candidate("ZXXX")).unwrap_err();
        assert!(matches!(err, CxpError::Data(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn missing_master_path_is_fatal() {
        let config = RunConfigBuilder::new("s", "d").build();
        let mut cache = MasterCache::new();
        let err = cache.load_commercialized(&config).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains(KEY_MAESTRO));
    }

    #[test]
    fn missing_master_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfigBuilder::new("s", "d")
            .impuestos_especiales(dir.path().join("no-existe.xlsx"))
            .build();
        let mut cache = MasterCache::new();
        let err = cache.load_special_taxes(&config).unwrap_err();
        assert!(matches!(err, CxpError::Master(_)));
    }
}
