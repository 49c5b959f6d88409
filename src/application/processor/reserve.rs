use super::{
    CustomData, PaymentApiResponse, ProviderGateway, capability_context, ensure_ledger_currency,
    ensure_not_negative,
};
use crate::application::history::PaymentHistory;
use crate::domain::event::{PaymentEvent, PaymentEventKind};
use crate::domain::instrument::{OrderContext, OrderPaymentInstrument};
use crate::domain::ledger::Ledger;
use crate::domain::money::Money;
use crate::domain::ports::{CapabilityRequest, ProviderRegistryRef};
use crate::error::{PaymentError, Result};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ReserveRequest {
    pub ledger: Ledger,
    pub instruments: Vec<OrderPaymentInstrument>,
    pub amount: Money,
    pub order_context: OrderContext,
    pub custom_data: CustomData,
}

/// Places holds on the order's payment instruments.
#[derive(Clone)]
pub struct ReservationProcessor {
    gateway: ProviderGateway,
}

impl ReservationProcessor {
    pub fn new(registry: ProviderRegistryRef) -> Self {
        Self::with_gateway(ProviderGateway::new(registry))
    }

    pub(crate) fn with_gateway(gateway: ProviderGateway) -> Self {
        Self { gateway }
    }

    /// Reserves `amount` across the requested instruments.
    ///
    /// Limited instruments absorb what they can first, in the order given;
    /// the first unlimited instrument takes the rest. One `Reserve` event is
    /// produced per instrument used.
    pub async fn reserve(&self, request: &ReserveRequest) -> Result<PaymentApiResponse> {
        let amount = request.amount;
        ensure_not_negative(&amount, "Reservation amount")?;
        ensure_ledger_currency(&request.ledger, &amount)?;
        if amount.is_zero() {
            return Ok(PaymentApiResponse::success(Vec::new()));
        }

        let plan = allocate(&request.ledger, &request.instruments, amount)?;
        self.gateway
            .ensure_registered(plan.iter().map(|(instrument, _)| instrument))?;

        info!(
            order = %request.order_context.order_number,
            %amount,
            instruments = plan.len(),
            "Reserving"
        );
        let mut events = Vec::with_capacity(plan.len());
        for (instrument, share) in &plan {
            let event = self
                .reserve_on(instrument, *share, &request.order_context, &request.custom_data)
                .await?;
            events.push(event);
        }
        Ok(PaymentApiResponse::from_effective(events))
    }

    /// Takes a fresh reservation on a single instrument, standing in for a
    /// modification the provider cannot perform.
    pub async fn reserve_to_simulate_modify(
        &self,
        amount: Money,
        instrument: &OrderPaymentInstrument,
        order_context: &OrderContext,
        custom_data: &CustomData,
        retry_count: u32,
    ) -> Result<PaymentApiResponse> {
        debug!(
            order = %order_context.order_number,
            instrument = %instrument.guid,
            %amount,
            retry_count,
            "Re-reserving to simulate a modification"
        );
        let event = self
            .reserve_on(instrument, amount, order_context, custom_data)
            .await?;
        Ok(PaymentApiResponse::from_effective(vec![event]))
    }

    pub(crate) async fn reserve_on(
        &self,
        instrument: &OrderPaymentInstrument,
        amount: Money,
        order_context: &OrderContext,
        custom_data: &CustomData,
    ) -> Result<PaymentEvent> {
        let provider = self.gateway.provider_for(instrument)?;
        let request = CapabilityRequest::Reserve {
            amount,
            context: capability_context(instrument, order_context, custom_data),
        };
        let outcome = self.gateway.invoke(provider.as_ref(), request).await;
        Ok(outcome.into_event(PaymentEvent::new(
            PaymentEventKind::Reserve,
            instrument.clone(),
            &order_context.order_number,
            amount,
        )))
    }
}

/// Splits `amount` over the instruments, honouring their remaining limits.
fn allocate(
    ledger: &Ledger,
    instruments: &[OrderPaymentInstrument],
    amount: Money,
) -> Result<Vec<(OrderPaymentInstrument, Money)>> {
    if instruments.is_empty() {
        return Err(PaymentError::InvalidRequest(
            "No payment instrument selected for the reservation".to_string(),
        ));
    }

    let reservable =
        PaymentHistory::new(ledger, amount.currency).reservable_instruments(instruments);
    let mut remaining = amount;
    let mut plan = Vec::new();

    for (instrument, capacity) in reservable.iter().filter(|(i, _)| !i.is_unlimited()) {
        if remaining.is_zero() {
            break;
        }
        let share = remaining.min(*capacity);
        plan.push((instrument.clone(), share));
        remaining -= share;
    }

    if remaining.is_positive()
        && let Some((instrument, _)) = reservable.iter().find(|(i, _)| i.is_unlimited())
    {
        plan.push((instrument.clone(), remaining));
        remaining = Money::zero(amount.currency);
    }

    if remaining.is_positive() {
        return Err(PaymentError::InsufficientFunds {
            requested: amount,
            available: amount - remaining,
        });
    }
    Ok(plan)
}
