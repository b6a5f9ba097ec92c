use crate::domain::model::Invoice;
use crate::utils::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct InvoiceRow<'a> {
    id: &'a str,
    company_id: &'a str,
    number: &'a str,
    status: &'a str,
    amount: String,
    currency: &'a str,
    issued_on: String,
    due_on: String,
    paid_at: String,
    payment_reference: &'a str,
}

impl<'a> From<&'a Invoice> for InvoiceRow<'a> {
    fn from(invoice: &'a Invoice) -> Self {
        Self {
            id: &invoice.id,
            company_id: &invoice.company_id,
            number: &invoice.number,
            status: invoice.status.as_str(),
            amount: format_cents(invoice.amount_cents),
            currency: &invoice.currency,
            issued_on: invoice.issued_on.to_string(),
            due_on: invoice.due_on.to_string(),
            paid_at: invoice.paid_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            payment_reference: invoice.payment_reference.as_deref().unwrap_or_default(),
        }
    }
}

/// `12345` → `"123.45"`, `-5` → `"-0.05"`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Writes a header row plus one row per invoice; returns the row count.
pub fn write_invoices_csv<W: Write>(invoices: &[Invoice], writer: W) -> Result<usize> {
    let mut out = csv::Writer::from_writer(writer);
    for invoice in invoices {
        out.serialize(InvoiceRow::from(invoice))?;
    }
    out.flush()?;
    Ok(invoices.len())
}
