use std::sync::Arc;

use chrono::Utc;

use crate::domain::{PaymentKind, PaymentNotice};
use crate::services::ServiceResult;
use crate::services::notifications::{DispatchReport, NotificationDispatcher};
use crate::stripe::{Event, EventKind, SignatureError, SignatureVerifier};

const DEFAULT_CURRENCY: &str = "eur";

/// Verifies Stripe events and notifies on successful payments.
pub struct WebhookService {
    verifier: Arc<dyn SignatureVerifier>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl WebhookService {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            verifier,
            dispatcher,
        }
    }

    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<Event, SignatureError> {
        self.verifier.verify(payload, signature_header)
    }

    /// React to a verified event. Returns the delivery report when emails
    /// were dispatched.
    pub async fn handle(&self, event: &Event) -> ServiceResult<Option<DispatchReport>> {
        log::info!("Stripe webhook event: {}", event.event_type);

        let notice = match event.classify()? {
            EventKind::PaymentSucceeded(intent) => {
                log::info!(
                    "Payment succeeded: {} {} (customer {:?}, metadata {:?})",
                    intent.amount,
                    intent.currency,
                    intent.customer,
                    intent.metadata
                );
                PaymentNotice {
                    kind: PaymentKind::PaymentIntent,
                    customer_email: self.customer_or_operator(intent.customer_email()),
                    transaction_id: intent.id,
                    amount_minor: intent.amount,
                    currency: intent.currency,
                    received_at: Utc::now(),
                }
            }
            EventKind::PaymentFailed(intent) => {
                log::warn!(
                    "Payment failed: {} {} ({:?})",
                    intent.amount,
                    intent.currency,
                    intent.last_payment_error
                );
                return Ok(None);
            }
            EventKind::CheckoutCompleted(session) => {
                log::info!(
                    "Checkout session completed: {} ({:?}, {:?})",
                    session.id,
                    session.customer_email(),
                    session.amount_total
                );
                PaymentNotice {
                    kind: PaymentKind::CheckoutSession,
                    customer_email: self.customer_or_operator(session.customer_email()),
                    transaction_id: session.id,
                    amount_minor: session.amount_total.unwrap_or_default(),
                    currency: session
                        .currency
                        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                    received_at: Utc::now(),
                }
            }
            EventKind::Unhandled => {
                log::info!("Unhandled event type: {}", event.event_type);
                return Ok(None);
            }
        };

        let notifications = self.dispatcher.compose_payment(&notice)?;
        let report = self.dispatcher.dispatch(notifications).await?;
        Ok(Some(report))
    }

    fn customer_or_operator(&self, email: Option<&str>) -> String {
        email
            .unwrap_or_else(|| self.dispatcher.operator_email())
            .to_string()
    }
}
