//! Invoice DTOs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use domain_billing::Invoice;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub host_id: Uuid,
    pub issue_date: NaiveDate,
    pub amount: Decimal,
    pub commission: Decimal,
    pub vat: Decimal,
    pub host_amount: Decimal,
    pub currency: String,
    pub download_count: u32,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id.into_uuid(),
            invoice_number: invoice.invoice_number.to_string(),
            payment_id: invoice.payment_id.into_uuid(),
            booking_id: invoice.booking_id.into_uuid(),
            user_id: invoice.user_id.into_uuid(),
            host_id: invoice.host_id.into_uuid(),
            issue_date: invoice.issue_date,
            amount: invoice.amount.amount(),
            commission: invoice.commission.amount(),
            vat: invoice.vat.amount(),
            host_amount: invoice.host_amount.amount(),
            currency: invoice.amount.currency().code().to_string(),
            download_count: invoice.download_count,
        }
    }
}
