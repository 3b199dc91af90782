//! Shared test fixtures: an in-memory `CfdiStore` and XML builders.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use cuentia_core::{
    CancellationTarget, CreditNoteRecord, DocumentPlan, HeaderRecord, LineItemRecord,
    PaymentRecord, QueueEntry, RecordStatus,
};
use cuentia_db::{CfdiStore, DbError, DbResult, PersistOutcome};

pub const OWNER: &str = "AAA010101AAA";
pub const OTHER: &str = "BBB020202BBB";
/// Worker id the processor tests claim entries under.
pub const WORKER: &str = "etl-test";

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Debug, Clone)]
pub struct QueueRow {
    pub entry: QueueEntry,
    pub processed: bool,
    pub error: Option<String>,
    pub claimed_by: Option<String>,
    /// Claim is past its lease and may be taken by any worker.
    pub lease_expired: bool,
}

#[derive(Debug, Default)]
pub struct State {
    pub queue: BTreeMap<i64, QueueRow>,
    pub headers: BTreeMap<String, HeaderRecord>,
    pub lines: Vec<LineItemRecord>,
    pub credit_notes: BTreeMap<String, CreditNoteRecord>,
    pub payments: Vec<PaymentRecord>,
    /// Every successful claim, in order: (entry id, worker id).
    pub claims: Vec<(i64, String)>,
    next_id: i64,
}

/// `CfdiStore` over a mutex. Each trait call applies all of its writes
/// under one lock acquisition, or none of them.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing_uuids: Mutex<HashSet<String>>,
    failing_claims: Mutex<usize>,
    failing_marks: Mutex<bool>,
    /// After this many commits, the named worker takes over every open claim.
    takeover: Mutex<Option<(usize, String)>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn enqueue(&self, rfc: &str, file_path: &Path) -> QueueEntry {
        let mut state = self.state();
        state.next_id += 1;
        let entry = QueueEntry {
            id: state.next_id,
            rfc: rfc.to_string(),
            uuid: None,
            fecha_emision: None,
            origen: "webservice".to_string(),
            file_path: file_path.to_string_lossy().into_owned(),
        };
        state.queue.insert(
            entry.id,
            QueueRow {
                entry: entry.clone(),
                processed: false,
                error: None,
                claimed_by: None,
                lease_expired: false,
            },
        );
        entry
    }

    /// Enqueues an entry already claimed by [`WORKER`].
    pub fn enqueue_claimed(&self, rfc: &str, file_path: &Path) -> QueueEntry {
        let entry = self.enqueue(rfc, file_path);
        let mut state = self.state();
        if let Some(row) = state.queue.get_mut(&entry.id) {
            row.claimed_by = Some(WORKER.to_string());
        }
        state.claims.push((entry.id, WORKER.to_string()));
        entry
    }

    /// Every open claim passes its lease.
    pub fn expire_leases(&self) {
        for row in self.state().queue.values_mut() {
            if row.claimed_by.is_some() {
                row.lease_expired = true;
            }
        }
    }

    /// Once `commits` more documents are persisted, `worker_id` reclaims
    /// every still-open claim, as if their lease had run out.
    pub fn take_over_after(&self, commits: usize, worker_id: &str) {
        *self.takeover.lock().unwrap() = Some((commits, worker_id.to_string()));
    }

    /// `persist_document` for this UUID fails with a constraint violation.
    pub fn fail_persist_for(&self, uuid: &str) {
        self.failing_uuids.lock().unwrap().insert(uuid.to_string());
    }

    /// The next `count` claims fail with a transient error.
    pub fn fail_next_claims(&self, count: usize) {
        *self.failing_claims.lock().unwrap() = count;
    }

    /// Every `mark_processed` call fails with a connection error.
    pub fn fail_marks(&self) {
        *self.failing_marks.lock().unwrap() = true;
    }

    pub fn row(&self, id: i64) -> QueueRow {
        self.state().queue[&id].clone()
    }

    pub fn pending(&self) -> usize {
        self.state().queue.values().filter(|row| !row.processed).count()
    }

    pub fn lines_for(&self, uuid: &str) -> Vec<LineItemRecord> {
        self.state()
            .lines
            .iter()
            .filter(|line| line.cfdi_uuid == uuid)
            .cloned()
            .collect()
    }

    /// Same filter as the Postgres `mark_processed`: unprocessed and ours.
    fn check_claim(state: &State, worker_id: &str, id: i64) -> DbResult<()> {
        match state.queue.get(&id) {
            Some(row) if !row.processed && row.claimed_by.as_deref() == Some(worker_id) => {
                Ok(())
            }
            _ => Err(DbError::claim_lost(id, worker_id)),
        }
    }

    fn close_entry(
        state: &mut State,
        worker_id: &str,
        id: i64,
        error: Option<&str>,
    ) -> DbResult<()> {
        Self::check_claim(state, worker_id, id)?;
        if let Some(row) = state.queue.get_mut(&id) {
            row.processed = true;
            row.error = error.map(str::to_string);
            row.claimed_by = None;
            row.lease_expired = false;
        }
        Ok(())
    }

    fn run_takeover(&self, state: &mut State) {
        let mut takeover = self.takeover.lock().unwrap();
        let Some((remaining, worker_id)) = takeover.as_mut() else {
            return;
        };
        *remaining = remaining.saturating_sub(1);
        if *remaining > 0 {
            return;
        }

        let worker_id = worker_id.clone();
        *takeover = None;
        let mut taken = Vec::new();
        for row in state.queue.values_mut() {
            if !row.processed && row.claimed_by.is_some() {
                row.claimed_by = Some(worker_id.clone());
                row.lease_expired = false;
                taken.push(row.entry.id);
            }
        }
        for id in taken {
            state.claims.push((id, worker_id.clone()));
        }
    }
}

#[async_trait]
impl CfdiStore for MemoryStore {
    async fn claim_batch(
        &self,
        worker_id: &str,
        limit: i64,
        _lease: Duration,
    ) -> DbResult<Vec<QueueEntry>> {
        {
            let mut failing = self.failing_claims.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(DbError::PoolExhausted);
            }
        }

        let claimed = {
            let mut guard = self.state();
            let state = &mut *guard;
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            let mut claimed = Vec::new();

            for row in state.queue.values_mut() {
                if claimed.len() == limit {
                    break;
                }
                if row.processed || (row.claimed_by.is_some() && !row.lease_expired) {
                    continue;
                }
                row.claimed_by = Some(worker_id.to_string());
                row.lease_expired = false;
                claimed.push(row.entry.clone());
            }

            for entry in &claimed {
                state.claims.push((entry.id, worker_id.to_string()));
            }
            claimed
        };

        // Let other workers interleave between claims
        tokio::task::yield_now().await;
        Ok(claimed)
    }

    async fn persist_document(
        &self,
        worker_id: &str,
        entry_id: i64,
        plan: &DocumentPlan,
    ) -> DbResult<PersistOutcome> {
        if self.failing_uuids.lock().unwrap().contains(plan.uuid()) {
            return Err(DbError::CheckViolation {
                message: format!("injected failure for {}", plan.uuid()),
            });
        }

        let mut guard = self.state();
        let state = &mut *guard;
        Self::close_entry(state, worker_id, entry_id, None)?;

        let header_inserted = !state.headers.contains_key(plan.uuid());
        if header_inserted {
            state.headers.insert(plan.uuid().to_string(), plan.header.clone());
        }

        state.lines.extend(plan.lines.iter().cloned());

        let credit_note_inserted = match &plan.credit_note {
            Some(note) if !state.credit_notes.contains_key(&note.uuid) => {
                state.credit_notes.insert(note.uuid.clone(), note.clone());
                true
            }
            _ => false,
        };

        state.payments.extend(plan.payments.iter().cloned());
        self.run_takeover(state);

        Ok(PersistOutcome {
            header_inserted,
            lines: plan.lines.len(),
            credit_note_inserted,
            payments: plan.payments.len(),
        })
    }

    async fn apply_cancellation(
        &self,
        worker_id: &str,
        entry_id: i64,
        target: &CancellationTarget,
    ) -> DbResult<u64> {
        let mut guard = self.state();
        let state = &mut *guard;
        Self::close_entry(state, worker_id, entry_id, None)?;

        let updated = match target {
            CancellationTarget::Payment { uuid, owner_rfc } => {
                let mut count = 0;
                for payment in state
                    .payments
                    .iter_mut()
                    .filter(|p| &p.complement_uuid == uuid && &p.owner_rfc == owner_rfc)
                {
                    payment.status = RecordStatus::Cancelado;
                    count += 1;
                }
                count
            }
            CancellationTarget::CreditNote { uuid, owner_rfc } => {
                match state.credit_notes.get_mut(uuid) {
                    Some(note) if &note.owner_rfc == owner_rfc => {
                        note.status = RecordStatus::Cancelado;
                        1
                    }
                    _ => 0,
                }
            }
            CancellationTarget::Header { uuid, owner_rfc } => match state.headers.get_mut(uuid) {
                Some(header) if &header.owner_rfc == owner_rfc => {
                    header.status = RecordStatus::Cancelado;
                    header.category = "cancelado".to_string();
                    1
                }
                _ => 0,
            },
        };

        Ok(updated)
    }

    async fn mark_processed(
        &self,
        worker_id: &str,
        entry_id: i64,
        error: Option<&str>,
    ) -> DbResult<()> {
        if *self.failing_marks.lock().unwrap() {
            return Err(DbError::ConnectionFailed("injected".into()));
        }
        Self::close_entry(&mut self.state(), worker_id, entry_id, error)
    }

    async fn release_claims(&self, worker_id: &str, ids: &[i64]) -> DbResult<u64> {
        let mut state = self.state();
        let mut released = 0;
        for id in ids {
            if let Some(row) = state.queue.get_mut(id) {
                if !row.processed && row.claimed_by.as_deref() == Some(worker_id) {
                    row.claimed_by = None;
                    row.lease_expired = false;
                    released += 1;
                }
            }
        }
        Ok(released)
    }
}

// =============================================================================
// Fixture files
// =============================================================================

/// A temp directory the queued XML files live in.
pub struct Files {
    dir: TempDir,
}

impl Files {
    pub fn new() -> Self {
        Files {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Writes `xml` to `relative` (directories created) and returns the path.
    pub fn write(&self, relative: &str, xml: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, xml).unwrap();
        path
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }
}

// =============================================================================
// XML builders
// =============================================================================

/// One `Concepto` with a single transferred tax.
pub fn concept(amount: &str, tax_code: &str, factor: &str, rate: &str, tax: &str) -> String {
    format!(
        r#"<cfdi:Concepto ClaveProdServ="84111506" Cantidad="1" ClaveUnidad="E48" Unidad="Servicio"
              Descripcion="Servicio contable" ValorUnitario="{amount}" Importe="{amount}">
             <cfdi:Impuestos><cfdi:Traslados>
               <cfdi:Traslado Base="{amount}" Impuesto="{tax_code}" TipoFactor="{factor}" TasaOCuota="{rate}" Importe="{tax}"/>
             </cfdi:Traslados></cfdi:Impuestos>
           </cfdi:Concepto>"#
    )
}

/// A CFDI 4.0 with the given type, parties, concepts and extra body nodes.
pub fn cfdi(
    type_code: &str,
    uuid: &str,
    issuer: &str,
    recipient: &str,
    totals: (&str, &str),
    concepts: &[String],
    extra: &str,
) -> String {
    let (subtotal, total) = totals;
    let concepts = if concepts.is_empty() {
        String::new()
    } else {
        format!("<cfdi:Conceptos>{}</cfdi:Conceptos>", concepts.join(""))
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital"
    xmlns:pago20="http://www.sat.gob.mx/Pagos20"
    Version="4.0" Serie="A" Folio="100" Fecha="2024-03-01T10:15:00" FormaPago="03" MetodoPago="PUE"
    LugarExpedicion="64000" Moneda="MXN" TipoCambio="1" SubTotal="{subtotal}" Total="{total}"
    TipoDeComprobante="{type_code}">
  <cfdi:Emisor Rfc="{issuer}" Nombre="Emisor SA" RegimenFiscal="601"/>
  <cfdi:Receptor Rfc="{recipient}" Nombre="Receptor SA" UsoCFDI="G03" RegimenFiscalReceptor="601"/>
  {concepts}
  {extra}
  <cfdi:Complemento>
    <tfd:TimbreFiscalDigital Version="1.1" UUID="{uuid}" FechaTimbrado="2024-03-01T10:16:00"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#
    )
}

/// Income invoice from the owner with one 16% VAT line.
pub fn income(uuid: &str) -> String {
    cfdi(
        "I",
        uuid,
        OWNER,
        OTHER,
        ("1000.00", "1160.00"),
        &[concept("1000.00", "002", "Tasa", "0.160000", "160.00")],
        "",
    )
}

/// Payment complement whose `Pago` nodes are given verbatim.
pub fn payment_complement(uuid: &str, pagos: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<cfdi:Comprobante xmlns:cfdi="http://www.sat.gob.mx/cfd/4" xmlns:pago20="http://www.sat.gob.mx/Pagos20"
    xmlns:tfd="http://www.sat.gob.mx/TimbreFiscalDigital"
    Version="4.0" Fecha="2024-04-10T12:00:00" SubTotal="0" Total="0" Moneda="XXX" TipoDeComprobante="P">
  <cfdi:Emisor Rfc="{OTHER}" Nombre="Proveedor SA" RegimenFiscal="601"/>
  <cfdi:Receptor Rfc="{OWNER}" Nombre="Owner SA" UsoCFDI="CP01" RegimenFiscalReceptor="601"/>
  <cfdi:Complemento>
    <pago20:Pagos Version="2.0">{pagos}</pago20:Pagos>
    <tfd:TimbreFiscalDigital Version="1.1" UUID="{uuid}"/>
  </cfdi:Complemento>
</cfdi:Comprobante>"#
    )
}

pub fn related_document(invoice_uuid: &str, paid: &str) -> String {
    format!(
        r#"<pago20:DoctoRelacionado IdDocumento="{invoice_uuid}" Serie="F" Folio="1" MonedaDR="MXN"
              EquivalenciaDR="1" NumParcialidad="1" ImpSaldoAnt="{paid}" ImpPagado="{paid}"
              ImpSaldoInsoluto="0.00" ObjetoImpDR="01"/>"#
    )
}
