//! # CFDI Table Writer
//!
//! Inserts header, line, credit-note and payment rows, and applies
//! cancellations. Every method runs on a borrowed connection, normally the
//! document transaction opened by [`CfdiStore`](crate::store::CfdiStore).
//!
//! ## Conflict Rules
//! ```text
//! cfdis               ON CONFLICT (uuid) DO NOTHING       → replay is a no-op
//! conceptos_cfdis     plain INSERT                        → replay duplicates
//! notas_credito_cfdi  ON CONFLICT (uuid_nota) DO NOTHING  → replay is a no-op
//! pagos_cfdi          plain INSERT                        → one row per pair
//! ```

use sqlx::PgConnection;

use crate::error::DbResult;
use cuentia_core::{
    CancellationTarget, CreditNoteRecord, HeaderRecord, LineItemRecord, PaymentRecord,
};

/// Writes CFDI rows through one connection.
pub struct CfdiWriter<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> CfdiWriter<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        CfdiWriter { conn }
    }

    /// Inserts the header. Returns `false` when the UUID already existed.
    pub async fn insert_header(&mut self, header: &HeaderRecord) -> DbResult<bool> {
        let taxes = &header.taxes;

        let result = sqlx::query(
            r#"
            INSERT INTO cfdis (
                uuid, version, rfc_emisor, razonsocialemisor, rfc_receptor,
                razonsocialreceptor, fecha, tipocomprobante, serie, folio,
                status, metodopago, tipopago, regimenfiscal, lugarexpedicion,
                subtotal, descuento, total,
                totalretenidoiva, totalretenidoieps, totalretenidoisr, totalretenidos,
                totaltrasladosiva, totaltrasladoieps, totaltraslado,
                totaltrasladoivadieciseis, totaltrasladoivaexento,
                totaltrasladoivacero, totaltrasladoivaocho,
                baseiva0, baseiva8, baseiva16, baseivaexento,
                usocfdi, moneda, movimiento, fechaprocesada, regimenfiscalreceptor,
                rfc_cliente, fuente, rfc_relacionado, categoria, tipocambio
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18,
                $19, $20, $21, $22, $23, $24, $25,
                $26, $27, $28, $29, $30, $31, $32, $33,
                $34, $35, $36, $37, $38, $39, $40, $41, $42, $43
            )
            ON CONFLICT (uuid) DO NOTHING
            "#,
        )
        .bind(&header.uuid)
        .bind(&header.version)
        .bind(&header.issuer_rfc)
        .bind(&header.issuer_name)
        .bind(&header.recipient_rfc)
        .bind(&header.recipient_name)
        .bind(header.issued_at)
        .bind(&header.voucher_type)
        .bind(&header.series)
        .bind(&header.folio)
        .bind(header.status.as_str())
        .bind(&header.payment_method)
        .bind(&header.payment_form)
        .bind(&header.issuer_regime)
        .bind(&header.expedition_place)
        .bind(header.subtotal)
        .bind(header.discount)
        .bind(header.total)
        .bind(taxes.withheld_vat)
        .bind(taxes.withheld_ieps)
        .bind(taxes.withheld_isr)
        .bind(taxes.total_withheld)
        .bind(taxes.transferred_vat)
        .bind(taxes.transferred_ieps)
        .bind(taxes.total_transferred)
        .bind(taxes.vat_16)
        .bind(taxes.vat_exempt)
        .bind(taxes.vat_0)
        .bind(taxes.vat_8)
        .bind(taxes.base_0)
        .bind(taxes.base_8)
        .bind(taxes.base_16)
        .bind(taxes.base_exempt)
        .bind(&header.cfdi_use)
        .bind(&header.currency)
        .bind(header.movement.as_str())
        .bind(header.processed_at)
        .bind(&header.recipient_regime)
        .bind(&header.counterparty_rfc)
        .bind(&header.source)
        .bind(&header.owner_rfc)
        .bind(&header.category)
        .bind(header.exchange_rate)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Inserts one line item. Never deduplicated.
    pub async fn insert_line(&mut self, line: &LineItemRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conceptos_cfdis (
                numero_linea, claveproductoservicio, cantidad, claveunidad, unidad,
                descripcion, valorunitario, importe, descuento,
                uuid_relacionado, rfc_relacionado, fecha, movimiento
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(line.line_number)
        .bind(&line.product_key)
        .bind(line.quantity)
        .bind(&line.unit_key)
        .bind(&line.unit)
        .bind(&line.description)
        .bind(line.unit_value)
        .bind(line.amount)
        .bind(line.discount)
        .bind(&line.cfdi_uuid)
        .bind(&line.owner_rfc)
        .bind(line.issued_on)
        .bind(&line.movement_tag)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Inserts the credit note. Returns `false` when it already existed.
    pub async fn insert_credit_note(&mut self, note: &CreditNoteRecord) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO notas_credito_cfdi (
                uuid_nota, uuid_factura_relacionada, tipo_relacion, fecha_emision,
                rfc_emisor, nombre_emisor, regimen_emisor,
                rfc_receptor, nombre_receptor, regimen_receptor,
                subtotal, iva_8, iva_16, total_trasladados,
                retencion_isr, retencion_iva, total_retenidos,
                descuento, total, forma_pago, moneda, tipo_cambio,
                tipo_comprobante, metodo_pago, rfc_relacionado, estatus
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26
            )
            ON CONFLICT (uuid_nota) DO NOTHING
            "#,
        )
        .bind(&note.uuid)
        .bind(&note.related_invoice_uuid)
        .bind(&note.relation_type)
        .bind(note.issued_at)
        .bind(&note.issuer_rfc)
        .bind(&note.issuer_name)
        .bind(&note.issuer_regime)
        .bind(&note.recipient_rfc)
        .bind(&note.recipient_name)
        .bind(&note.recipient_regime)
        .bind(note.subtotal)
        .bind(note.vat_8)
        .bind(note.vat_16)
        .bind(note.total_transferred)
        .bind(note.withheld_isr)
        .bind(note.withheld_vat)
        .bind(note.total_withheld)
        .bind(note.discount)
        .bind(note.total)
        .bind(&note.payment_form)
        .bind(&note.currency)
        .bind(note.exchange_rate)
        .bind(&note.voucher_type)
        .bind(&note.payment_method)
        .bind(&note.owner_rfc)
        .bind(note.status.as_str())
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Inserts one (payment × related invoice) row.
    pub async fn insert_payment(&mut self, payment: &PaymentRecord) -> DbResult<()> {
        let invoice = payment.invoice.as_ref();
        let taxes = invoice.and_then(|i| i.taxes.as_ref());
        let rate_16 = taxes.and_then(|t| t.rate_16.as_ref());
        let rate_8 = taxes.and_then(|t| t.rate_8.as_ref());

        sqlx::query(
            r#"
            INSERT INTO pagos_cfdi (
                fecha_emision, uuid_complemento,
                rfc_emisor, nombre_emisor, regimen_emisor,
                rfc_receptor, nombre_receptor, regimen_receptor,
                fecha_pago, forma_pago, moneda_pago, tipo_cambio_pago, monto,
                no_operacion, rfc_cta_ordenante, banco_ordenante, cta_ordenante,
                rfc_cta_beneficiario, cta_beneficiario,
                uuid_factura, serie, folio, moneda_dr, equivalencia_dr,
                num_parcialidad, imp_saldo_ant, imp_pagado, imp_saldo_insoluto,
                objeto_imp_dr, metodo_pago_dr, tipo_comprobante,
                total_imp_trasladados, total_imp_retenidos,
                base_16, importe_trasladado_16, tipo_factor_16, tasa_cuota_16,
                base_8, importe_trasladado_8, tipo_factor_8, tasa_cuota_8,
                base_exento, impuesto_exento, tipo_exento,
                impuesto_retenido, importe_retenido,
                rfc_relacionado, estatus
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                $31, $32, $33, $34, $35, $36, $37, $38, $39, $40,
                $41, $42, $43, $44, $45, $46, $47, $48
            )
            "#,
        )
        .bind(payment.issued_at)
        .bind(&payment.complement_uuid)
        .bind(&payment.issuer_rfc)
        .bind(&payment.issuer_name)
        .bind(&payment.issuer_regime)
        .bind(&payment.recipient_rfc)
        .bind(&payment.recipient_name)
        .bind(&payment.recipient_regime)
        .bind(payment.paid_at)
        .bind(&payment.payment_form)
        .bind(&payment.currency)
        .bind(payment.exchange_rate)
        .bind(payment.amount)
        .bind(&payment.operation_number)
        .bind(&payment.payer_rfc)
        .bind(&payment.payer_bank)
        .bind(&payment.payer_account)
        .bind(&payment.payee_rfc)
        .bind(&payment.payee_account)
        .bind(invoice.and_then(|i| i.invoice_uuid.as_deref()))
        .bind(invoice.map(|i| i.series.as_str()))
        .bind(invoice.map(|i| i.folio.as_str()))
        .bind(invoice.map(|i| i.currency.as_str()))
        .bind(invoice.map(|i| i.equivalence))
        .bind(invoice.and_then(|i| i.installment))
        .bind(invoice.map(|i| i.previous_balance))
        .bind(invoice.map(|i| i.amount_paid))
        .bind(invoice.map(|i| i.outstanding_balance))
        .bind(invoice.map(|i| i.tax_object.as_str()))
        .bind(invoice.and_then(|i| i.payment_method.as_deref()))
        .bind(PaymentRecord::VOUCHER_TYPE)
        .bind(taxes.map(|t| t.total_transferred))
        .bind(taxes.map(|t| t.total_withheld))
        .bind(rate_16.map(|r| r.base))
        .bind(rate_16.map(|r| r.amount))
        .bind(rate_16.map(|r| r.factor_type.as_str()))
        .bind(rate_16.map(|r| r.rate))
        .bind(rate_8.map(|r| r.base))
        .bind(rate_8.map(|r| r.amount))
        .bind(rate_8.map(|r| r.factor_type.as_str()))
        .bind(rate_8.map(|r| r.rate))
        .bind(taxes.and_then(|t| t.exempt_base))
        .bind(taxes.and_then(|t| t.exempt_tax.as_deref()))
        .bind(taxes.and_then(|t| t.exempt_factor.as_deref()))
        .bind(taxes.and_then(|t| t.withheld_tax.as_deref()))
        .bind(taxes.and_then(|t| t.withheld_amount))
        .bind(&payment.owner_rfc)
        .bind(payment.status.as_str())
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Flips the target rows to `Cancelado`. Zero matching rows is not an error.
    pub async fn cancel(&mut self, target: &CancellationTarget) -> DbResult<u64> {
        let (sql, uuid, owner_rfc) = match target {
            CancellationTarget::Payment { uuid, owner_rfc } => (
                r#"
                UPDATE pagos_cfdi
                SET estatus = 'Cancelado'
                WHERE uuid_complemento = $1 AND rfc_relacionado = $2
                "#,
                uuid,
                owner_rfc,
            ),
            CancellationTarget::CreditNote { uuid, owner_rfc } => (
                r#"
                UPDATE notas_credito_cfdi
                SET estatus = 'Cancelado'
                WHERE uuid_nota = $1 AND rfc_relacionado = $2
                "#,
                uuid,
                owner_rfc,
            ),
            CancellationTarget::Header { uuid, owner_rfc } => (
                r#"
                UPDATE cfdis
                SET status = 'Cancelado', categoria = 'cancelado'
                WHERE uuid = $1 AND rfc_relacionado = $2
                "#,
                uuid,
                owner_rfc,
            ),
        };

        let result = sqlx::query(sql)
            .bind(uuid)
            .bind(owner_rfc)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected())
    }
}
