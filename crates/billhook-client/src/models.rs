//! Wire models for the CRM's estimate and invoice resources.
//!
//! Optional fields use `skip_serializing_if` so fields absent from the
//! source estimate are omitted from the created invoice entirely, never
//! sent as `null`.

use serde::{Deserialize, Serialize};

/// Relation types that identify the owning customer of a document.
pub const CUSTOMER_RELATION_TYPES: [&str; 2] = ["corp", "client"];

/// A party related to a document (customer, contact, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
}

impl Relation {
    /// Whether this relation identifies the owning customer.
    #[must_use]
    pub fn is_customer(&self) -> bool {
        CUSTOMER_RELATION_TYPES.contains(&self.relation_type.as_str())
    }
}

/// One line of an estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

/// An estimate as read from the CRM.
///
/// Always fetched fresh per job; the webhook's snapshot of it is never
/// trusted for status decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimate {
    pub id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub rows: Vec<EstimateRow>,
    #[serde(default)]
    pub related: Vec<Relation>,
    /// Back-link written after invoice creation; used to skip
    /// re-creating an invoice on redelivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_invoice_id: Option<String>,
}

impl Estimate {
    /// The owning customer relation, if any.
    #[must_use]
    pub fn customer(&self) -> Option<&Relation> {
        self.related.iter().find(|r| r.is_customer())
    }
}

/// One line of an invoice to create. Same shape as [`EstimateRow`];
/// kept distinct so the outbound contract can drift from the inbound
/// one without touching reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl From<&EstimateRow> for InvoiceRow {
    fn from(row: &EstimateRow) -> Self {
        Self {
            description: row.description.clone(),
            quantity: row.quantity,
            unit_amount: row.unit_amount.clone(),
            tax_id: row.tax_id.clone(),
            product_id: row.product_id.clone(),
        }
    }
}

/// Reference to the document an invoice was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentParent {
    #[serde(rename = "type")]
    pub parent_type: String,
    pub id: String,
}

/// Invoice creation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub related: Vec<Relation>,
    pub rows: Vec<InvoiceRow>,
    /// Origin document reference, also the dedupe anchor.
    pub parent: DocumentParent,
}

/// Response from the invoice creation endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedInvoice {
    pub id: String,
}

/// Back-link patch body written onto the source estimate.
#[derive(Debug, Clone, Serialize)]
pub struct LinkInvoice<'a> {
    pub linked_invoice_id: &'a str,
}
