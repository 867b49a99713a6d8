//! Event classification and the estimate→invoice transform.
//!
//! One queued webhook event yields zero or one invoice creations:
//! classify against the configured trigger pair, re-read the estimate
//! (the webhook snapshot is eventually stale), check the acceptance
//! set, map the rows and customer relation into an invoice draft,
//! create it, and best-effort back-link the invoice onto the estimate.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use billhook_client::models::{DocumentParent, Estimate, InvoiceDraft, InvoiceRow};
use billhook_client::CrmClient;
use billhook_core::event::InboundEvent;

use crate::error::ProcessError;
use crate::queue::Job;

/// Processes one queued job. Must tolerate redelivery of the same job.
#[async_trait]
pub trait JobProcessor: Send + Sync + 'static {
    async fn process(&self, job: &Job) -> Result<Outcome, ProcessError>;
}

/// Terminal result of a successfully consumed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Consumed with no side effects. Explicitly not an error.
    Skipped(SkipReason),
    /// An invoice was created from the event's estimate.
    Created { invoice_id: String },
}

/// Why a job was consumed without creating an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Event type / related type do not match the trigger pair.
    IrrelevantEvent,
    /// The estimate's authoritative status is not in the acceptance set.
    NotAccepted { status: String },
    /// The estimate already carries a back-linked invoice (redelivery).
    AlreadyInvoiced { invoice_id: String },
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Skipped(SkipReason::IrrelevantEvent) => write!(f, "skipped: irrelevant event"),
            Outcome::Skipped(SkipReason::NotAccepted { status }) => {
                write!(f, "skipped: status {status:?} not accepted")
            }
            Outcome::Skipped(SkipReason::AlreadyInvoiced { invoice_id }) => {
                write!(f, "skipped: already invoiced as {invoice_id}")
            }
            Outcome::Created { invoice_id } => write!(f, "created invoice {invoice_id}"),
        }
    }
}

/// Which events fire the transform and which statuses count as accepted.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub related_type: String,
    pub event_type: String,
    pub accepted_statuses: Vec<String>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            related_type: "estimate".to_string(),
            event_type: "docslog".to_string(),
            accepted_statuses: vec!["accepted".into(), "won".into(), "signed".into()],
        }
    }
}

/// The worker's job handler: webhook event in, at most one invoice out.
pub struct EventProcessor {
    client: Arc<CrmClient>,
    trigger: TriggerConfig,
}

impl EventProcessor {
    /// Create a processor over a fully constructed CRM client.
    #[must_use]
    pub fn new(client: Arc<CrmClient>, trigger: TriggerConfig) -> Self {
        Self { client, trigger }
    }

    fn is_relevant(&self, event: &InboundEvent) -> bool {
        event.related_type == self.trigger.related_type
            && event.event_type == self.trigger.event_type
    }

    fn is_accepted(&self, status: &str) -> bool {
        self.trigger.accepted_statuses.iter().any(|s| s == status)
    }

    /// Run the full state machine for one event.
    pub async fn handle_event(&self, event: &InboundEvent) -> Result<Outcome, ProcessError> {
        if !self.is_relevant(event) {
            debug!(
                event_type = %event.event_type,
                related_type = %event.related_type,
                "Event does not match trigger pair; consuming as no-op"
            );
            return Ok(Outcome::Skipped(SkipReason::IrrelevantEvent));
        }

        let estimate_id = event.related_id().ok_or_else(|| {
            ProcessError::InvalidPayload("relevant event carries no related object id".into())
        })?;

        // The webhook's view of the estimate may be stale; only the
        // freshly read status is trusted.
        let estimate = self.client.get_estimate(&estimate_id).await?;

        if let Some(invoice_id) = &estimate.linked_invoice_id {
            debug!(
                estimate_id = %estimate.id,
                invoice_id = %invoice_id,
                "Estimate already back-linked to an invoice; redelivery consumed"
            );
            return Ok(Outcome::Skipped(SkipReason::AlreadyInvoiced {
                invoice_id: invoice_id.clone(),
            }));
        }

        if !self.is_accepted(&estimate.status) {
            debug!(
                estimate_id = %estimate.id,
                status = %estimate.status,
                "Estimate status outside acceptance set; consuming as no-op"
            );
            return Ok(Outcome::Skipped(SkipReason::NotAccepted {
                status: estimate.status.clone(),
            }));
        }

        let draft = build_invoice_draft(&estimate)?;
        let created = self.client.create_invoice(&draft).await?;

        info!(
            estimate_id = %estimate.id,
            invoice_id = %created.id,
            status = %estimate.status,
            "Created invoice from accepted estimate"
        );

        // Best effort: the invoice stands even if the estimate cannot
        // be annotated. Losing the back-link only weakens the dedupe
        // guard for future redeliveries.
        if let Err(e) = self.client.link_invoice(&estimate.id, &created.id).await {
            warn!(
                estimate_id = %estimate.id,
                invoice_id = %created.id,
                error = %e,
                "Failed to back-link invoice onto estimate"
            );
        }

        Ok(Outcome::Created {
            invoice_id: created.id,
        })
    }
}

#[async_trait]
impl JobProcessor for EventProcessor {
    async fn process(&self, job: &Job) -> Result<Outcome, ProcessError> {
        let event: InboundEvent = serde_json::from_value(job.payload.clone())
            .map_err(|e| ProcessError::InvalidPayload(e.to_string()))?;
        self.handle_event(&event).await
    }
}

/// Map an accepted estimate into an invoice creation payload.
///
/// Rows are copied field-for-field with absent fields staying absent.
/// The owning customer is resolved from the estimate's relation list;
/// an accepted estimate without one is a hard error, not a skip.
pub fn build_invoice_draft(estimate: &Estimate) -> Result<InvoiceDraft, ProcessError> {
    let customer = estimate.customer().ok_or_else(|| {
        ProcessError::MissingReference(format!(
            "estimate {} has no customer relation",
            estimate.id
        ))
    })?;

    Ok(InvoiceDraft {
        subject: estimate.subject.clone(),
        currency: estimate.currency.clone(),
        related: vec![customer.clone()],
        rows: estimate.rows.iter().map(InvoiceRow::from).collect(),
        parent: DocumentParent {
            parent_type: "estimate".to_string(),
            id: estimate.id.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use billhook_client::models::{EstimateRow, Relation};

    fn estimate(related: Vec<Relation>) -> Estimate {
        Estimate {
            id: "est_1".into(),
            status: "won".into(),
            subject: Some("Website rebuild".into()),
            currency: Some("EUR".into()),
            rows: vec![
                EstimateRow {
                    description: Some("design".into()),
                    quantity: Some(3.0),
                    unit_amount: Some("450.00".into()),
                    tax_id: Some("tax_20".into()),
                    product_id: None,
                },
                EstimateRow {
                    description: Some("hosting".into()),
                    quantity: Some(12.0),
                    unit_amount: None,
                    tax_id: None,
                    product_id: Some("prod_7".into()),
                },
            ],
            related,
            linked_invoice_id: None,
        }
    }

    #[test]
    fn test_draft_maps_rows_and_customer() {
        let source = estimate(vec![
            Relation {
                id: "contact_2".into(),
                relation_type: "contact".into(),
            },
            Relation {
                id: "corp_5".into(),
                relation_type: "corp".into(),
            },
        ]);

        let draft = build_invoice_draft(&source).unwrap();

        assert_eq!(draft.related.len(), 1);
        assert_eq!(draft.related[0].id, "corp_5");
        assert_eq!(draft.rows.len(), 2);
        assert_eq!(draft.rows[0].description.as_deref(), Some("design"));
        assert_eq!(draft.rows[1].product_id.as_deref(), Some("prod_7"));
        assert!(draft.rows[1].unit_amount.is_none());
        assert_eq!(draft.parent.parent_type, "estimate");
        assert_eq!(draft.parent.id, "est_1");
    }

    #[test]
    fn test_draft_without_customer_is_hard_error() {
        let source = estimate(vec![Relation {
            id: "contact_2".into(),
            relation_type: "contact".into(),
        }]);

        let err = build_invoice_draft(&source).unwrap_err();
        assert!(matches!(err, ProcessError::MissingReference(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_outcome_display() {
        let outcome = Outcome::Skipped(SkipReason::NotAccepted {
            status: "draft".into(),
        });
        assert_eq!(outcome.to_string(), "skipped: status \"draft\" not accepted");
    }
}
