//! # Document Normalizer
//!
//! Turns one CFDI XML file (versions 3.3 and 4.0) into a canonical [`Document`].
//!
//! ## Normalization Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Document::parse(xml)                              │
//! │                                                                         │
//! │  raw XML ──► xml::parse ──► namespace-free tree (children always Vec)  │
//! │                  │                                                      │
//! │                  ├── malformed?          → MalformedXml                 │
//! │                  ├── root != Comprobante → MissingRootNode              │
//! │                  ▼                                                      │
//! │  Comprobante attributes ──► header fields (lenient numbers, dates)     │
//! │  Emisor / Receptor      ──► Party                                       │
//! │  Conceptos/Concepto*    ──► LineItem (+ Traslado*/Retencion*)          │
//! │  CfdiRelacionados*      ──► RelatedCfdi (document order)                │
//! │  Complemento*           ──► FiscalStamp, Pagos (v1.0 / v2.0)            │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │  UUID = stamp UUID  ||  first UUID="..." in raw text  ||  None         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `Document` is built fresh for each queue entry and dropped once its
//! transaction finishes. It is never shared between workers.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::{CoreError, CoreResult};
use crate::money::{parse_amount, parse_count, parse_optional_amount};
use crate::types::VoucherType;
use crate::xml::{self, XmlNode};

/// Root element name shared by CFDI 3.3 and 4.0.
pub const ROOT_ELEMENT: &str = "Comprobante";

// =============================================================================
// Document Model
// =============================================================================

/// Issuer (`Emisor`) or recipient (`Receptor`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Party {
    pub rfc: String,
    pub name: String,
    /// `RegimenFiscal` (issuer) / `RegimenFiscalReceptor` (recipient).
    pub tax_regime: String,
    /// `UsoCFDI`, recipient only.
    pub cfdi_use: String,
}

/// One `Traslado` / `Retencion` sub-record, at line or paid-document level.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxLine {
    /// SAT tax code: `001` ISR, `002` IVA, `003` IEPS.
    pub tax_code: String,
    /// `TipoFactor`: `Tasa`, `Cuota` or `Exento`.
    pub factor_type: String,
    pub rate: Decimal,
    pub base: Decimal,
    pub amount: Decimal,
}

/// One `Concepto`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LineItem {
    pub product_key: String,
    pub identification: String,
    pub quantity: Decimal,
    pub unit_key: String,
    pub unit: String,
    pub description: String,
    pub unit_value: Decimal,
    pub amount: Decimal,
    /// Absent `Descuento` stays `None` (persisted as NULL).
    pub discount: Option<Decimal>,
    pub transferred: Vec<TaxLine>,
    pub withheld: Vec<TaxLine>,
}

/// Document-level `Impuestos` totals as declared by the issuer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeclaredTaxes {
    pub transferred: Option<Decimal>,
    pub withheld: Option<Decimal>,
}

/// One `CfdiRelacionado`, with the `TipoRelacion` of its group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedCfdi {
    pub relation_type: String,
    pub uuid: String,
}

/// `TimbreFiscalDigital` complement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiscalStamp {
    pub uuid: String,
    pub stamped_at: Option<NaiveDateTime>,
}

/// One `DoctoRelacionado` inside a `Pago`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaidDocument {
    pub uuid: Option<String>,
    pub series: String,
    pub folio: String,
    pub currency: String,
    pub equivalence: Decimal,
    pub installment: Option<i32>,
    pub previous_balance: Decimal,
    pub amount_paid: Decimal,
    pub outstanding_balance: Decimal,
    pub tax_object: String,
    /// `MetodoDePagoDR`, only present in payments complement 1.0.
    pub payment_method: Option<String>,
    pub transferred: Vec<TaxLine>,
    pub withheld: Vec<TaxLine>,
}

/// One `Pago` event of a payments complement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentEvent {
    pub paid_at: Option<NaiveDateTime>,
    pub payment_form: String,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub amount: Decimal,
    pub operation_number: String,
    pub payer_rfc: String,
    pub payer_bank: String,
    pub payer_account: String,
    pub payee_rfc: String,
    pub payee_account: String,
    pub documents: Vec<PaidDocument>,
}

/// The canonical, shape-agnostic form of one CFDI.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub version: String,
    /// `TipoDeComprobante`, upper-cased, exactly as found.
    pub type_code: String,
    pub series: String,
    pub folio: String,
    pub issued_at: Option<NaiveDateTime>,
    pub payment_form: String,
    pub payment_method: String,
    pub expedition_place: String,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub issuer: Party,
    pub recipient: Party,
    pub declared_taxes: DeclaredTaxes,
    pub line_items: Vec<LineItem>,
    pub related: Vec<RelatedCfdi>,
    pub stamp: Option<FiscalStamp>,
    /// `None` when the document carries no `Pagos` complement at all.
    pub payments: Option<Vec<PaymentEvent>>,
    /// Resolved UUID: stamp first, raw-text fallback second.
    pub uuid: Option<String>,
}

// =============================================================================
// Parsing
// =============================================================================

impl Document {
    /// Parses and normalizes a raw CFDI.
    ///
    /// ## Errors
    /// * `MalformedXml` - not well-formed XML
    /// * `MissingRootNode` - no `Comprobante` root
    ///
    /// A missing UUID is NOT an error here (see [`Document::require_uuid`]):
    /// the caller decides when the UUID is needed.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let root = xml::parse(raw)?.ok_or(CoreError::MissingRootNode)?;
        if root.name != ROOT_ELEMENT {
            return Err(CoreError::MissingRootNode);
        }

        let issuer = root
            .child("Emisor")
            .map(|node| Party {
                rfc: node.attr_or_empty("Rfc").to_string(),
                name: node.attr_or_empty("Nombre").to_string(),
                tax_regime: node.attr_or_empty("RegimenFiscal").to_string(),
                cfdi_use: String::new(),
            })
            .unwrap_or_default();

        let recipient = root
            .child("Receptor")
            .map(|node| Party {
                rfc: node.attr_or_empty("Rfc").to_string(),
                name: node.attr_or_empty("Nombre").to_string(),
                tax_regime: node.attr_or_empty("RegimenFiscalReceptor").to_string(),
                cfdi_use: node.attr_or_empty("UsoCFDI").to_string(),
            })
            .unwrap_or_default();

        let declared_taxes = root
            .child("Impuestos")
            .map(|node| DeclaredTaxes {
                transferred: parse_optional_amount(node.attr("TotalImpuestosTrasladados")),
                withheld: parse_optional_amount(node.attr("TotalImpuestosRetenidos")),
            })
            .unwrap_or_default();

        let line_items = root
            .nested("Conceptos", "Concepto")
            .map(parse_line_item)
            .collect();

        let related = root
            .children_named("CfdiRelacionados")
            .flat_map(|group| {
                let relation_type = group.attr_or_empty("TipoRelacion").to_string();
                group
                    .children_named("CfdiRelacionado")
                    .filter_map(move |node| {
                        node.attr("UUID").map(|uuid| RelatedCfdi {
                            relation_type: relation_type.clone(),
                            uuid: uuid.to_string(),
                        })
                    })
            })
            .collect();

        let complements: Vec<&XmlNode> = root.children_named("Complemento").collect();

        let stamp = complements
            .iter()
            .find_map(|node| node.find_descendant("TimbreFiscalDigital"))
            .and_then(|node| {
                node.attr("UUID")
                    .filter(|uuid| !uuid.trim().is_empty())
                    .map(|uuid| FiscalStamp {
                        uuid: uuid.trim().to_string(),
                        stamped_at: parse_timestamp(node.attr("FechaTimbrado")),
                    })
            });

        let payments = complements
            .iter()
            .find_map(|node| node.find_descendant("Pagos"))
            .map(|pagos| pagos.children_named("Pago").map(parse_payment).collect());

        let uuid = stamp
            .as_ref()
            .map(|stamp| stamp.uuid.clone())
            .or_else(|| find_uuid_in_text(raw));

        Ok(Document {
            version: root.attr_or_empty("Version").to_string(),
            type_code: root.attr_or_empty("TipoDeComprobante").trim().to_uppercase(),
            series: root.attr_or_empty("Serie").to_string(),
            folio: root.attr_or_empty("Folio").to_string(),
            issued_at: parse_timestamp(root.attr("Fecha")),
            payment_form: root.attr_or_empty("FormaPago").to_string(),
            payment_method: root.attr_or_empty("MetodoPago").to_string(),
            expedition_place: root.attr_or_empty("LugarExpedicion").to_string(),
            currency: root.attr_or_empty("Moneda").to_string(),
            exchange_rate: parse_amount(root.attr("TipoCambio")),
            subtotal: parse_amount(root.attr("SubTotal")),
            discount: parse_amount(root.attr("Descuento")),
            total: parse_amount(root.attr("Total")),
            issuer,
            recipient,
            declared_taxes,
            line_items,
            related,
            stamp,
            payments,
            uuid,
        })
    }

    /// Returns the resolved UUID or `MissingUuid`.
    pub fn require_uuid(&self) -> CoreResult<&str> {
        self.uuid.as_deref().ok_or(CoreError::MissingUuid)
    }

    /// Parses `type_code` against the SAT catalog.
    pub fn voucher_type(&self) -> CoreResult<VoucherType> {
        VoucherType::from_code(&self.type_code)
    }

    /// Date part of `Fecha`, used by line rows.
    pub fn issued_on(&self) -> Option<NaiveDate> {
        self.issued_at.map(|at| at.date())
    }

    /// First related CFDI, the invoice a credit note corrects.
    pub fn first_related(&self) -> Option<&RelatedCfdi> {
        self.related.first()
    }
}

fn parse_tax_lines(node: &XmlNode, container: &str, item: &str, suffix: &str) -> Vec<TaxLine> {
    let key = |name: &str| format!("{name}{suffix}");

    node.nested(container, item)
        .map(|tax| TaxLine {
            tax_code: tax.attr_or_empty(&key("Impuesto")).trim().to_string(),
            factor_type: tax.attr_or_empty(&key("TipoFactor")).trim().to_string(),
            rate: parse_amount(tax.attr(&key("TasaOCuota"))),
            base: parse_amount(tax.attr(&key("Base"))),
            amount: parse_amount(tax.attr(&key("Importe"))),
        })
        .collect()
}

fn parse_line_item(node: &XmlNode) -> LineItem {
    let (transferred, withheld) = match node.child("Impuestos") {
        Some(taxes) => (
            parse_tax_lines(taxes, "Traslados", "Traslado", ""),
            parse_tax_lines(taxes, "Retenciones", "Retencion", ""),
        ),
        None => (Vec::new(), Vec::new()),
    };

    LineItem {
        product_key: node.attr_or_empty("ClaveProdServ").to_string(),
        identification: node.attr_or_empty("NoIdentificacion").to_string(),
        quantity: parse_amount(node.attr("Cantidad")),
        unit_key: node.attr_or_empty("ClaveUnidad").to_string(),
        unit: node.attr_or_empty("Unidad").to_string(),
        description: node.attr_or_empty("Descripcion").to_string(),
        unit_value: parse_amount(node.attr("ValorUnitario")),
        amount: parse_amount(node.attr("Importe")),
        discount: parse_optional_amount(node.attr("Descuento")),
        transferred,
        withheld,
    }
}

fn parse_payment(node: &XmlNode) -> PaymentEvent {
    PaymentEvent {
        paid_at: parse_timestamp(node.attr("FechaPago")),
        payment_form: node.attr_or_empty("FormaDePagoP").to_string(),
        currency: node.attr_or_empty("MonedaP").to_string(),
        exchange_rate: parse_amount(node.attr("TipoCambioP")),
        amount: parse_amount(node.attr("Monto")),
        operation_number: node.attr_or_empty("NumOperacion").to_string(),
        payer_rfc: node.attr_or_empty("RfcEmisorCtaOrd").to_string(),
        payer_bank: node.attr_or_empty("NomBancoOrdExt").to_string(),
        payer_account: node.attr_or_empty("CtaOrdenante").to_string(),
        payee_rfc: node.attr_or_empty("RfcEmisorCtaBen").to_string(),
        payee_account: node.attr_or_empty("CtaBeneficiario").to_string(),
        documents: node
            .children_named("DoctoRelacionado")
            .map(parse_paid_document)
            .collect(),
    }
}

fn parse_paid_document(node: &XmlNode) -> PaidDocument {
    let (transferred, withheld) = match node.child("ImpuestosDR") {
        Some(taxes) => (
            parse_tax_lines(taxes, "TrasladosDR", "TrasladoDR", "DR"),
            parse_tax_lines(taxes, "RetencionesDR", "RetencionDR", "DR"),
        ),
        None => (Vec::new(), Vec::new()),
    };

    PaidDocument {
        uuid: node
            .attr("IdDocumento")
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string),
        series: node.attr_or_empty("Serie").to_string(),
        folio: node.attr_or_empty("Folio").to_string(),
        currency: node.attr_or_empty("MonedaDR").to_string(),
        equivalence: parse_amount(node.attr("EquivalenciaDR")),
        installment: parse_count(node.attr("NumParcialidad")),
        previous_balance: parse_amount(node.attr("ImpSaldoAnt")),
        amount_paid: parse_amount(node.attr("ImpPagado")),
        outstanding_balance: parse_amount(node.attr("ImpSaldoInsoluto")),
        tax_object: node.attr_or_empty("ObjetoImpDR").to_string(),
        payment_method: node.attr("MetodoDePagoDR").map(str::to_string),
        transferred,
        withheld,
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Parses a CFDI timestamp (`2024-03-01T10:15:00`), tolerating fractions
/// and bare dates. Anything else is `None`.
pub fn parse_timestamp(raw: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
        })
}

fn uuid_pattern() -> &'static Regex {
    static UUID_REGEX: OnceLock<Regex> = OnceLock::new();
    UUID_REGEX.get_or_init(|| Regex::new(r#"UUID="([^"]+)""#).expect("valid UUID regex"))
}

/// Fallback UUID lookup straight on the raw text.
fn find_uuid_in_text(raw: &str) -> Option<String> {
    uuid_pattern()
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().trim().to_string())
        .filter(|uuid| !uuid.is_empty())
}

// =============================================================================
// Unit Tests
// =============================================================================
