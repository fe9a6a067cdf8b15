//! Relational [`Store`] over SQLite.
//!
//! Every statement is parameterized. Decimals are stored as text so no
//! precision is lost; dates use the `chrono` bindings of `rusqlite`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use rust_decimal::Decimal;
use tracing::debug;

use super::{AuthMethod, ConnectionSettings, Connector, Store, apply_header_update, merge_novelty};
use crate::core::values::truncate_observation;
use crate::core::{
    Approval, CandidateField, CandidateRecord, CxpError, DocumentType, FieldValue, HeaderUpdate,
    HistoryRow, InvoiceDetail, InvoiceHeader, LedgerKey, LedgerRow, NoveltyRecord, Provenance,
    is_fully_processed, mark_row_positions,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documentos_cxp (
    id INTEGER PRIMARY KEY,
    nit TEXT NOT NULL,
    factura TEXT NOT NULL,
    tipo_documento TEXT,
    orden_compra TEXT,
    forma_pago TEXT,
    moneda TEXT,
    trm TEXT,
    valor_a_pagar TEXT,
    valor_a_pagar_cop TEXT,
    nombre_emisor TEXT,
    fecha_emision TEXT,
    prefijo_y_numero TEXT,
    tipo_factura TEXT,
    factura_referenciada TEXT,
    receptor_nombre TEXT,
    receptor_nit TEXT,
    receptor_tipo_persona TEXT,
    receptor_dv TEXT,
    receptor_responsabilidades TEXT,
    ruta_documento TEXT,
    estado_fase_4 TEXT,
    observaciones_fase_4 TEXT,
    resultado_final_antes_eventos TEXT,
    fecha_primer_proceso TEXT,
    fecha_retoma TEXT,
    nota_credito_referenciada TEXT
);
CREATE TABLE IF NOT EXISTS detalle_documentos (
    nit TEXT NOT NULL,
    factura TEXT NOT NULL,
    linea INTEGER NOT NULL,
    cantidad TEXT,
    precio_unitario TEXT,
    valor_linea TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS historico_orden_compra (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nit TEXT NOT NULL,
    orden_compra TEXT NOT NULL,
    posicion TEXT,
    por_calcular TEXT,
    trm TEXT,
    nombre_proveedor TEXT,
    acreedor TEXT,
    fec_doc TEXT,
    fec_reg TEXT,
    indicador_impuestos TEXT,
    cuenta TEXT,
    clase_orden TEXT,
    moneda TEXT,
    activo_fijo TEXT,
    capitalizado_el TEXT,
    criterio_clasif_2 TEXT,
    poblacion TEXT,
    doc_fi TEXT,
    centro_coste TEXT,
    elemento_pep TEXT,
    orden TEXT,
    clase_orden_interna TEXT,
    emplazamiento TEXT,
    cantidad TEXT,
    precio_unitario TEXT,
    marca TEXT
);
CREATE TABLE IF NOT EXISTS candidatos_validacion (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    id_registro INTEGER NOT NULL,
    nit TEXT NOT NULL,
    factura TEXT NOT NULL,
    columna TEXT NOT NULL,
    proveniencia TEXT NOT NULL,
    tipo TEXT NOT NULL,
    valor TEXT
);
CREATE TABLE IF NOT EXISTS comparativa (
    id_registro INTEGER NOT NULL,
    nit TEXT NOT NULL,
    factura TEXT NOT NULL,
    item TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    valor_xml TEXT,
    valor_orden_compra TEXT,
    aprobado TEXT,
    estado_validacion TEXT,
    PRIMARY KEY (id_registro, nit, factura, item, ordinal)
);
CREATE TABLE IF NOT EXISTS historico_novedades (
    nit TEXT NOT NULL,
    factura TEXT NOT NULL,
    id_registro INTEGER NOT NULL,
    orden_compra TEXT,
    estado TEXT NOT NULL,
    observacion TEXT NOT NULL,
    fecha_proceso TEXT NOT NULL,
    fec_doc TEXT,
    fec_reg TEXT,
    PRIMARY KEY (nit, factura)
);
";

const HEADER_COLUMNS: &str = "id, nit, factura, tipo_documento, orden_compra, forma_pago, moneda, \
    trm, valor_a_pagar, valor_a_pagar_cop, nombre_emisor, fecha_emision, prefijo_y_numero, \
    tipo_factura, factura_referenciada, receptor_nombre, receptor_nit, receptor_tipo_persona, \
    receptor_dv, receptor_responsabilidades, ruta_documento, estado_fase_4, observaciones_fase_4, \
    resultado_final_antes_eventos, fecha_primer_proceso, fecha_retoma, nota_credito_referenciada";

const HISTORY_COLUMNS: [&str; 26] = [
    "nit",
    "orden_compra",
    "posicion",
    "por_calcular",
    "trm",
    "nombre_proveedor",
    "acreedor",
    "fec_doc",
    "fec_reg",
    "indicador_impuestos",
    "cuenta",
    "clase_orden",
    "moneda",
    "activo_fijo",
    "capitalizado_el",
    "criterio_clasif_2",
    "poblacion",
    "doc_fi",
    "centro_coste",
    "elemento_pep",
    "orden",
    "clase_orden_interna",
    "emplazamiento",
    "cantidad",
    "precio_unitario",
    "marca",
];

const PENDING: &str = "(resultado_final_antes_eventos IS NULL \
    OR TRIM(resultado_final_antes_eventos) = '' \
    OR TRIM(resultado_final_antes_eventos) LIKE 'EN ESPERA%' \
    OR (UPPER(TRIM(tipo_documento)) = 'NC' \
        AND TRIM(resultado_final_antes_eventos) LIKE 'CON NOVEDAD%'))";

/// SQLite-backed [`Store`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CxpError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CxpError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, CxpError> {
        let store = Self { conn };
        store.create_schema()?;
        Ok(store)
    }

    pub fn create_schema(&self) -> Result<(), CxpError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Seed a staging header.
    pub fn insert_header(&mut self, h: &InvoiceHeader) -> Result<(), CxpError> {
        self.conn.execute(
            &format!(
                "INSERT INTO documentos_cxp ({HEADER_COLUMNS}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, \
                 ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)"
            ),
            params![
                h.id,
                h.supplier_tax_id,
                h.invoice_number,
                h.document_type.map(|t| t.code()),
                h.purchase_order_ref,
                h.payment_means,
                h.currency,
                decimal_text(h.trm),
                decimal_text(h.amount_to_pay),
                decimal_text(h.amount_to_pay_cop),
                h.supplier_name,
                h.issue_date,
                h.prefix_and_number,
                h.invoice_typecode,
                h.referenced_invoice,
                h.receptor_name,
                h.receptor_tax_id,
                h.receptor_person_type,
                h.receptor_check_digit,
                h.receptor_tax_level_code,
                h.bundle_path,
                h.phase4_state,
                h.phase4_observation,
                h.final_result_pre_events,
                h.first_process_date,
                h.retake_date,
                h.nc_referenced,
            ],
        )?;
        Ok(())
    }

    pub fn insert_detail(&mut self, d: &InvoiceDetail) -> Result<(), CxpError> {
        self.conn.execute(
            "INSERT INTO detalle_documentos \
             (nit, factura, linea, cantidad, precio_unitario, valor_linea) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                d.supplier_tax_id,
                d.invoice_number,
                d.line_number,
                decimal_text(d.quantity),
                decimal_text(d.unit_price),
                d.line_extension_amount.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_history(&mut self, row: &HistoryRow) -> Result<(), CxpError> {
        let placeholders: Vec<String> = (1..=HISTORY_COLUMNS.len()).map(|i| format!("?{i}")).collect();
        self.conn.execute(
            &format!(
                "INSERT INTO historico_orden_compra ({}) VALUES ({})",
                HISTORY_COLUMNS.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(history_values(row)),
        )?;
        Ok(())
    }

    fn query_headers(
        &self,
        filter: &str,
        args: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<InvoiceHeader>, CxpError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HEADER_COLUMNS} FROM documentos_cxp WHERE {filter} ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(args, header_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn history_rows(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<(i64, HistoryRow)>, CxpError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, {} FROM historico_orden_compra WHERE {filter} ORDER BY id",
            HISTORY_COLUMNS.join(", ")
        ))?;
        let rows = stmt
            .query_map(args, |row| Ok((row.get(0)?, history_from_row(row, 1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

fn read_decimal(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.and_then(|s| Decimal::from_str(s.trim()).ok()))
}

fn header_from_row(row: &Row<'_>) -> rusqlite::Result<InvoiceHeader> {
    let document_type: Option<String> = row.get(3)?;
    Ok(InvoiceHeader {
        id: row.get(0)?,
        supplier_tax_id: row.get(1)?,
        invoice_number: row.get(2)?,
        document_type: document_type.as_deref().and_then(DocumentType::from_code),
        purchase_order_ref: row.get(4)?,
        payment_means: row.get(5)?,
        currency: row.get(6)?,
        trm: read_decimal(row, 7)?,
        amount_to_pay: read_decimal(row, 8)?,
        amount_to_pay_cop: read_decimal(row, 9)?,
        supplier_name: row.get(10)?,
        issue_date: row.get(11)?,
        prefix_and_number: row.get(12)?,
        invoice_typecode: row.get(13)?,
        referenced_invoice: row.get(14)?,
        receptor_name: row.get(15)?,
        receptor_tax_id: row.get(16)?,
        receptor_person_type: row.get(17)?,
        receptor_check_digit: row.get(18)?,
        receptor_tax_level_code: row.get(19)?,
        bundle_path: row.get(20)?,
        phase4_state: row.get(21)?,
        phase4_observation: row.get(22)?,
        final_result_pre_events: row.get(23)?,
        first_process_date: row.get(24)?,
        retake_date: row.get(25)?,
        nc_referenced: row.get(26)?,
    })
}

fn history_values(row: &HistoryRow) -> [&str; 26] {
    [
        &row.supplier_tax_id,
        &row.purchase_order,
        &row.positions,
        &row.por_calcular,
        &row.trm,
        &row.supplier_name,
        &row.creditor_id,
        &row.doc_date,
        &row.reg_date,
        &row.tax_indicator,
        &row.account,
        &row.order_class,
        &row.currency,
        &row.fixed_asset,
        &row.capitalized_on,
        &row.criterion_2,
        &row.city,
        &row.fi_doc,
        &row.cost_center,
        &row.pep_element,
        &row.order,
        &row.order_class_code,
        &row.site,
        &row.quantity,
        &row.unit_price,
        &row.mark,
    ]
}

fn history_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<HistoryRow> {
    let text = |i: usize| -> rusqlite::Result<String> {
        Ok(row.get::<_, Option<String>>(offset + i)?.unwrap_or_default())
    };
    Ok(HistoryRow {
        supplier_tax_id: text(0)?,
        purchase_order: text(1)?,
        positions: text(2)?,
        por_calcular: text(3)?,
        trm: text(4)?,
        supplier_name: text(5)?,
        creditor_id: text(6)?,
        doc_date: text(7)?,
        reg_date: text(8)?,
        tax_indicator: text(9)?,
        account: text(10)?,
        order_class: text(11)?,
        currency: text(12)?,
        fixed_asset: text(13)?,
        capitalized_on: text(14)?,
        criterion_2: text(15)?,
        city: text(16)?,
        fi_doc: text(17)?,
        cost_center: text(18)?,
        pep_element: text(19)?,
        order: text(20)?,
        order_class_code: text(21)?,
        site: text(22)?,
        quantity: text(23)?,
        unit_price: text(24)?,
        mark: text(25)?,
    })
}

fn ledger_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerRow> {
    let aprobado: Option<String> = row.get(7)?;
    Ok(LedgerRow {
        key: LedgerKey {
            id_registro: row.get(0)?,
            nit: row.get(1)?,
            factura: row.get(2)?,
            item: row.get(3)?,
            ordinal: row.get(4)?,
        },
        valor_xml: row.get(5)?,
        valor_orden_compra: row.get(6)?,
        aprobado: aprobado.as_deref().and_then(Approval::from_code),
        estado_validacion: row.get(8)?,
    })
}

fn novelty_from_row(row: &Row<'_>) -> rusqlite::Result<NoveltyRecord> {
    Ok(NoveltyRecord {
        nit: row.get(0)?,
        factura: row.get(1)?,
        id_registro: row.get(2)?,
        purchase_order: row.get(3)?,
        state: row.get(4)?,
        observation: row.get(5)?,
        processed_at: row.get(6)?,
        doc_date: row.get(7)?,
        reg_date: row.get(8)?,
    })
}

fn field_kind(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Null => "null",
        FieldValue::Text(_) => "text",
        FieldValue::Amount(_) => "amount",
        FieldValue::Integer(_) => "integer",
    }
}

fn field_from_parts(kind: &str, raw: Option<String>) -> FieldValue {
    match (kind, raw) {
        (_, None) | ("null", _) => FieldValue::Null,
        ("amount", Some(v)) => Decimal::from_str(&v).map_or(FieldValue::Text(v), FieldValue::Amount),
        ("integer", Some(v)) => v.parse().map_or(FieldValue::Text(v), FieldValue::Integer),
        (_, Some(v)) => FieldValue::Text(v),
    }
}

const LEDGER_SELECT: &str = "SELECT id_registro, nit, factura, item, ordinal, valor_xml, \
    valor_orden_compra, aprobado, estado_validacion FROM comparativa";

const NOVELTY_SELECT: &str = "SELECT nit, factura, id_registro, orden_compra, estado, \
    observacion, fecha_proceso, fec_doc, fec_reg FROM historico_novedades";

impl Store for SqliteStore {
    fn begin(&mut self) -> Result<(), CxpError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), CxpError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), CxpError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn pending_headers(&self, kind: DocumentType) -> Result<Vec<InvoiceHeader>, CxpError> {
        self.query_headers(
            &format!("UPPER(TRIM(tipo_documento)) = ?1 AND {PENDING}"),
            &[&kind.code()],
        )
    }

    fn header(&self, id: i64) -> Result<Option<InvoiceHeader>, CxpError> {
        Ok(self.query_headers("id = ?1", &[&id])?.into_iter().next())
    }

    fn pending_details(&self) -> Result<Vec<InvoiceDetail>, CxpError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT d.nit, d.factura, d.linea, d.cantidad, d.precio_unitario, d.valor_linea \
             FROM detalle_documentos d \
             WHERE EXISTS (SELECT 1 FROM documentos_cxp h \
                 WHERE TRIM(h.nit) = TRIM(d.nit) AND TRIM(h.factura) = TRIM(d.factura) \
                 AND UPPER(TRIM(h.tipo_documento)) = 'FV' AND {PENDING}) \
             ORDER BY d.nit, d.factura, d.linea"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(InvoiceDetail {
                    supplier_tax_id: row.get(0)?,
                    invoice_number: row.get(1)?,
                    line_number: row.get(2)?,
                    quantity: read_decimal(row, 3)?,
                    unit_price: read_decimal(row, 4)?,
                    line_extension_amount: read_decimal(row, 5)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn open_history(&self) -> Result<Vec<HistoryRow>, CxpError> {
        Ok(self
            .history_rows("1 = 1", &[])?
            .into_iter()
            .map(|(_, row)| row)
            .filter(|row| !is_fully_processed(row))
            .collect())
    }

    fn replace_candidates(&mut self, records: &[CandidateRecord]) -> Result<(), CxpError> {
        self.conn.execute("DELETE FROM candidatos_validacion", [])?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO candidatos_validacion \
             (id_registro, nit, factura, columna, proveniencia, tipo, valor) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for record in records {
            for field in &record.fields {
                stmt.execute(params![
                    record.id_registro,
                    record.nit,
                    record.factura,
                    field.name,
                    field.provenance.suffix(),
                    field_kind(&field.value),
                    field.value.render(),
                ])?;
            }
        }
        debug!(candidates = records.len(), "candidate working set replaced");
        Ok(())
    }

    fn candidates(&self) -> Result<Vec<CandidateRecord>, CxpError> {
        let mut stmt = self.conn.prepare(
            "SELECT id_registro, nit, factura, columna, proveniencia, tipo, valor \
             FROM candidatos_validacion ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records: Vec<CandidateRecord> = Vec::new();
        for (id_registro, nit, factura, name, suffix, kind, raw) in rows {
            let provenance = Provenance::from_suffix(&suffix).ok_or_else(|| {
                CxpError::Database(format!("unknown provenance '{suffix}' on column {name}"))
            })?;
            let field = CandidateField::new(name, provenance, field_from_parts(&kind, raw));
            let same_record = records.last().is_some_and(|last| {
                last.id_registro == id_registro && last.nit == nit && last.factura == factura
            });
            match records.last_mut() {
                Some(last) if same_record => last.fields.push(field),
                _ => records.push(CandidateRecord {
                    id_registro,
                    nit,
                    factura,
                    fields: vec![field],
                }),
            }
        }
        Ok(records)
    }

    fn update_header(&mut self, id: i64, update: &HeaderUpdate) -> Result<(), CxpError> {
        let mut header = self
            .header(id)?
            .ok_or_else(|| CxpError::Data(format!("header {id} not found")))?;
        apply_header_update(&mut header, update);
        self.conn.execute(
            "UPDATE documentos_cxp SET estado_fase_4 = ?2, observaciones_fase_4 = ?3, \
             resultado_final_antes_eventos = ?4, fecha_primer_proceso = ?5, fecha_retoma = ?6 \
             WHERE id = ?1",
            params![
                id,
                header.phase4_state,
                header.phase4_observation,
                header.final_result_pre_events,
                header.first_process_date,
                header.retake_date,
            ],
        )?;
        Ok(())
    }

    fn mark_positions(
        &mut self,
        nit: &str,
        purchase_order: &str,
        positions: &[String],
    ) -> Result<usize, CxpError> {
        let rows = self.history_rows(
            "TRIM(nit) = TRIM(?1) AND UPPER(TRIM(orden_compra)) = UPPER(TRIM(?2))",
            &[&nit, &purchase_order],
        )?;
        let mut marked = 0;
        for (id, mut row) in rows {
            let n = mark_row_positions(&mut row, positions);
            if n > 0 {
                self.conn.execute(
                    "UPDATE historico_orden_compra SET marca = ?2 WHERE id = ?1",
                    params![id, row.mark],
                )?;
                marked += n;
            }
        }
        Ok(marked)
    }

    fn ledger_row(&self, key: &LedgerKey) -> Result<Option<LedgerRow>, CxpError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "{LEDGER_SELECT} WHERE id_registro = ?1 AND nit = ?2 AND factura = ?3 \
                     AND item = ?4 AND ordinal = ?5"
                ),
                params![key.id_registro, key.nit, key.factura, key.item, key.ordinal],
                ledger_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn put_ledger_row(&mut self, row: &LedgerRow) -> Result<(), CxpError> {
        self.conn.execute(
            "INSERT INTO comparativa \
             (id_registro, nit, factura, item, ordinal, valor_xml, valor_orden_compra, aprobado, \
              estado_validacion) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(id_registro, nit, factura, item, ordinal) DO UPDATE SET \
               valor_xml = excluded.valor_xml, \
               valor_orden_compra = excluded.valor_orden_compra, \
               aprobado = excluded.aprobado, \
               estado_validacion = excluded.estado_validacion",
            params![
                row.key.id_registro,
                row.key.nit,
                row.key.factura,
                row.key.item,
                row.key.ordinal,
                row.valor_xml.as_deref().map(truncate_observation),
                row.valor_orden_compra.as_deref().map(truncate_observation),
                row.aprobado.map(|a| a.as_str()),
                row.estado_validacion,
            ],
        )?;
        Ok(())
    }

    fn ledger_rows(&self, nit: &str, factura: &str) -> Result<Vec<LedgerRow>, CxpError> {
        let mut stmt = self.conn.prepare(&format!(
            "{LEDGER_SELECT} WHERE nit = ?1 AND factura = ?2 ORDER BY id_registro, item, ordinal"
        ))?;
        let rows = stmt
            .query_map(params![nit, factura], ledger_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn set_ledger_state(&mut self, nit: &str, factura: &str, state: &str) -> Result<usize, CxpError> {
        Ok(self.conn.execute(
            "UPDATE comparativa SET estado_validacion = ?3 WHERE nit = ?1 AND factura = ?2",
            params![nit, factura, state],
        )?)
    }

    fn upsert_novelty(&mut self, record: &NoveltyRecord) -> Result<(), CxpError> {
        let existing = self
            .conn
            .query_row(
                &format!("{NOVELTY_SELECT} WHERE nit = ?1 AND factura = ?2"),
                params![record.nit, record.factura],
                novelty_from_row,
            )
            .optional()?;
        let merged = merge_novelty(existing.as_ref(), record);
        self.conn.execute(
            "INSERT INTO historico_novedades \
             (nit, factura, id_registro, orden_compra, estado, observacion, fecha_proceso, fec_doc, fec_reg) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(nit, factura) DO UPDATE SET \
               id_registro = excluded.id_registro, \
               orden_compra = excluded.orden_compra, \
               estado = excluded.estado, \
               observacion = excluded.observacion, \
               fecha_proceso = excluded.fecha_proceso, \
               fec_doc = excluded.fec_doc, \
               fec_reg = excluded.fec_reg",
            params![
                merged.nit,
                merged.factura,
                merged.id_registro,
                merged.purchase_order,
                merged.state,
                merged.observation,
                merged.processed_at,
                merged.doc_date,
                merged.reg_date,
            ],
        )?;
        Ok(())
    }

    fn novelties(&self) -> Result<Vec<NoveltyRecord>, CxpError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOVELTY_SELECT} ORDER BY nit, factura"))?;
        let rows = stmt
            .query_map([], novelty_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn invoices_by_reference(
        &self,
        nit: &str,
        reference: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InvoiceHeader>, CxpError> {
        self.query_headers(
            "UPPER(TRIM(tipo_documento)) = 'FV' \
             AND TRIM(nit) = TRIM(?1) \
             AND UPPER(TRIM(prefijo_y_numero)) = UPPER(TRIM(?2)) \
             AND fecha_emision BETWEEN ?3 AND ?4 \
             AND (nota_credito_referenciada IS NULL OR TRIM(nota_credito_referenciada) = '')",
            &[&nit, &reference, &from, &to],
        )
    }

    fn link_credit_note(&mut self, invoice_id: i64, credit_note: &str) -> Result<(), CxpError> {
        let updated = self.conn.execute(
            "UPDATE documentos_cxp SET nota_credito_referenciada = ?2 WHERE id = ?1",
            params![invoice_id, credit_note],
        )?;
        if updated == 0 {
            return Err(CxpError::Data(format!("header {invoice_id} not found")));
        }
        Ok(())
    }
}

/// Opens [`SqliteStore`] sessions. The configured server is the directory
/// holding `<database>.sqlite`; `:memory:` opens a private in-memory
/// database.
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector {
    opened: Vec<PathBuf>,
}

impl SqliteConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files opened so far.
    pub fn opened(&self) -> &[PathBuf] {
        &self.opened
    }

    pub fn database_path(settings: &ConnectionSettings) -> PathBuf {
        Path::new(&settings.server).join(format!("{}.sqlite", settings.database))
    }
}

impl Connector for SqliteConnector {
    type Session = SqliteStore;

    fn connect(
        &mut self,
        settings: &ConnectionSettings,
        auth: AuthMethod,
    ) -> Result<SqliteStore, CxpError> {
        let store = if settings.server == ":memory:" {
            SqliteStore::open_in_memory()
        } else {
            let path = Self::database_path(settings);
            if !path.parent().is_some_and(Path::is_dir) {
                return Err(CxpError::Connection(format!(
                    "server directory {} does not exist",
                    settings.server
                )));
            }
            self.opened.push(path.clone());
            SqliteStore::open(&path)
        }
        .map_err(|e| CxpError::Connection(e.to_string()))?;
        if let Some(timeout) = settings.command_timeout {
            store.conn.busy_timeout(timeout)?;
        }
        debug!(auth = auth.name(), "sqlite session ready");
        Ok(store)
    }
}
