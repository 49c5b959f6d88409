use super::{
    CapabilityOutcome, CustomData, PaymentApiResponse, ProviderGateway, capability_context,
    ensure_ledger_currency, ensure_not_negative,
};
use crate::application::history::PaymentHistory;
use crate::domain::event::{PaymentEvent, PaymentEventData, PaymentEventKind, PaymentStatus};
use crate::domain::instrument::OrderContext;
use crate::domain::ledger::Ledger;
use crate::domain::money::Money;
use crate::domain::ports::{CapabilityFailure, CapabilityRequest, ProviderRegistryRef};
use crate::error::{PaymentError, Result};
use tracing::{debug, info};

/// Event data key marking credits settled outside of any provider.
pub const MANUAL_CREDIT_KEY: &str = "manual";

#[derive(Debug, Clone, PartialEq)]
pub struct CreditRequest {
    pub ledger: Ledger,
    pub amount: Money,
    pub order_context: OrderContext,
    pub custom_data: CustomData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReverseChargeRequest {
    pub ledger: Ledger,
    /// Charge events to reverse in full.
    pub selected_events: Vec<PaymentEvent>,
    pub order_context: OrderContext,
    pub custom_data: CustomData,
}

/// Returns charged money to the customer, by refund or by reversal.
#[derive(Clone)]
pub struct CreditProcessor {
    gateway: ProviderGateway,
}

impl CreditProcessor {
    pub fn new(registry: ProviderRegistryRef) -> Self {
        Self::with_gateway(ProviderGateway::new(registry))
    }

    pub(crate) fn with_gateway(gateway: ProviderGateway) -> Self {
        Self { gateway }
    }

    /// Refunds `amount`, spread over the charges with something left to
    /// refund, oldest first.
    ///
    /// A declined credit is recorded and the remaining charges are still
    /// credited; the response then reports failure.
    pub async fn credit(&self, request: &CreditRequest) -> Result<PaymentApiResponse> {
        let plan = plan_refund(&request.ledger, request.amount)?;
        self.gateway
            .ensure_registered(plan.iter().map(|(charge, _)| &charge.instrument))?;

        info!(
            order = %request.order_context.order_number,
            amount = %request.amount,
            charges = plan.len(),
            "Crediting"
        );
        let mut events = Vec::with_capacity(plan.len());
        for (charge, amount) in &plan {
            let event = self
                .credit_event(charge, *amount, &request.order_context, &request.custom_data)
                .await?;
            events.push(event);
        }
        Ok(PaymentApiResponse::from_approved(events))
    }

    /// Records a refund settled outside of the providers.
    ///
    /// Follows the same allocation as [`credit`](Self::credit) but calls no
    /// provider; every resulting credit is approved and flagged as manual.
    pub async fn manual_credit(&self, request: &CreditRequest) -> Result<PaymentApiResponse> {
        let plan = plan_refund(&request.ledger, request.amount)?;
        info!(
            order = %request.order_context.order_number,
            amount = %request.amount,
            "Recording manual credit"
        );
        let data = PaymentEventData::from([(MANUAL_CREDIT_KEY.to_string(), "true".to_string())]);
        let events = plan
            .into_iter()
            .map(|(charge, amount)| {
                PaymentEvent::new(
                    PaymentEventKind::Credit,
                    charge.instrument.clone(),
                    &request.order_context.order_number,
                    amount,
                )
                .with_parent(&charge)
                .with_data(data.clone())
            })
            .collect();
        Ok(PaymentApiResponse::success(events))
    }

    /// Reverses each selected charge in full.
    ///
    /// Only charges of the ledger that were neither reversed nor refunded,
    /// even partially, can be reversed. The call succeeds when every
    /// reversal took effect. A charge that was itself skipped, because its
    /// provider cannot charge, took no money from the provider; when that
    /// provider can neither reverse nor credit, the reversal is recorded as
    /// skipped and counts as done.
    pub async fn reverse_charge(&self, request: &ReverseChargeRequest) -> Result<PaymentApiResponse> {
        for event in &request.selected_events {
            if event.kind != PaymentEventKind::Charge || !event.is_effective() {
                return Err(PaymentError::InvalidRequest(format!(
                    "Event {} is not a settled charge and cannot be reversed",
                    event.guid
                )));
            }
            ensure_ledger_currency(&request.ledger, &event.amount)?;
            let untouched = PaymentHistory::new(&request.ledger, event.amount.currency)
                .refundable_payment_events()
                .iter()
                .any(|(charge, refundable)| charge.guid == event.guid && *refundable == event.amount);
            if !untouched {
                return Err(PaymentError::InvalidRequest(format!(
                    "Charge {} is not in the ledger or was already refunded or reversed",
                    event.guid
                )));
            }
        }
        self.gateway.ensure_registered(
            request
                .selected_events
                .iter()
                .map(|event| &event.instrument),
        )?;

        info!(
            order = %request.order_context.order_number,
            charges = request.selected_events.len(),
            "Reversing charges"
        );
        let mut events = Vec::with_capacity(request.selected_events.len());
        for charge in &request.selected_events {
            let event = self
                .reverse_event(charge, &request.order_context, &request.custom_data)
                .await?;
            events.push(event);
        }
        Ok(PaymentApiResponse::from_effective(events))
    }

    pub(crate) async fn credit_event(
        &self,
        charge: &PaymentEvent,
        amount: Money,
        order_context: &OrderContext,
        custom_data: &CustomData,
    ) -> Result<PaymentEvent> {
        let provider = self.gateway.provider_for(&charge.instrument)?;
        let request = CapabilityRequest::Credit {
            amount,
            charge_data: charge.event_data.clone(),
            context: capability_context(&charge.instrument, order_context, custom_data),
        };
        let outcome = self.gateway.invoke(provider.as_ref(), request).await;
        Ok(outcome.into_event(
            PaymentEvent::new(
                PaymentEventKind::Credit,
                charge.instrument.clone(),
                &order_context.order_number,
                amount,
            )
            .with_parent(charge),
        ))
    }

    /// Reverses `charge`, falling back to a credit of the full charge when
    /// the provider cannot reverse or declines the reversal.
    ///
    /// The fallback credit is still recorded as a `ReverseCharge`.
    pub(crate) async fn reverse_event(
        &self,
        charge: &PaymentEvent,
        order_context: &OrderContext,
        custom_data: &CustomData,
    ) -> Result<PaymentEvent> {
        let provider = self.gateway.provider_for(&charge.instrument)?;
        let context = capability_context(&charge.instrument, order_context, custom_data);
        let reversal = PaymentEvent::new(
            PaymentEventKind::ReverseCharge,
            charge.instrument.clone(),
            &order_context.order_number,
            charge.amount,
        )
        .with_parent(charge);

        let mut declined = None;
        let request = CapabilityRequest::ReverseCharge {
            charge_data: charge.event_data.clone(),
            context: context.clone(),
        };
        match self.gateway.invoke(provider.as_ref(), request).await {
            outcome @ CapabilityOutcome::Completed(_) => return Ok(outcome.into_event(reversal)),
            CapabilityOutcome::Failed(failure) => declined = Some(failure),
            CapabilityOutcome::Unsupported => {}
        }

        let request = CapabilityRequest::Credit {
            amount: charge.amount,
            charge_data: charge.event_data.clone(),
            context,
        };
        match self.gateway.invoke(provider.as_ref(), request).await {
            outcome @ (CapabilityOutcome::Completed(_) | CapabilityOutcome::Failed(_)) => {
                debug!(charge = %charge.guid, "Reversing charge through a credit");
                return Ok(outcome.into_event(reversal));
            }
            CapabilityOutcome::Unsupported => {}
        }

        Ok(match declined {
            Some(failure) => reversal.failed(failure),
            None if charge.status == PaymentStatus::Skipped => reversal.skipped(),
            None => reversal.failed(CapabilityFailure::permanent(
                format!(
                    "{} supports neither reverse charge nor credit",
                    provider.configuration_name()
                ),
                "The charge could not be reversed.",
            )),
        })
    }
}

/// Validates a refund of `amount` and spreads it over the refundable
/// charges, oldest first.
///
/// The refundable ceiling is checked first; a ledger without any charge
/// event is rejected after that, even for a zero amount.
fn plan_refund(ledger: &Ledger, amount: Money) -> Result<Vec<(PaymentEvent, Money)>> {
    ensure_not_negative(&amount, "Credit amount")?;
    ensure_ledger_currency(ledger, &amount)?;

    let history = PaymentHistory::new(ledger, amount.currency);
    let refundable_total = (history.charged_amount() - history.refunded_amount()).non_negative();
    if amount > refundable_total {
        return Err(PaymentError::InsufficientFunds {
            requested: amount,
            available: refundable_total,
        });
    }
    if !history.has_charges() {
        return Err(PaymentError::NothingToRefund);
    }

    let mut remaining = amount;
    let mut plan = Vec::new();
    for (charge, refundable) in history.refundable_payment_events() {
        if remaining.is_zero() {
            break;
        }
        let share = refundable.min(remaining);
        remaining -= share;
        plan.push((charge, share));
    }
    Ok(plan)
}
