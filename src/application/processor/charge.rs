use super::cancel::CancelReservationProcessor;
use super::credit::CreditProcessor;
use super::reserve::ReservationProcessor;
use super::{
    CustomData, PaymentApiResponse, ProviderGateway, capability_context, ensure_ledger_currency,
    ensure_not_negative, reservation_count,
};
use crate::application::history::PaymentHistory;
use crate::domain::event::{PaymentEvent, PaymentEventKind};
use crate::domain::instrument::OrderContext;
use crate::domain::ledger::Ledger;
use crate::domain::money::Money;
use crate::domain::ports::{Capability, CapabilityRequest, ProviderRegistryRef};
use crate::error::{PaymentError, Result};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRequest {
    pub ledger: Ledger,
    pub amount: Money,
    /// On the final payment of an order leftovers of partially charged
    /// reservations are not held again.
    pub is_final_payment: bool,
    pub order_context: OrderContext,
    pub custom_data: CustomData,
}

/// Captures reserved funds.
///
/// A charge consumes its reservation entirely. When only part of a
/// reservation is needed, the leftover is held again with a fresh
/// reservation unless this is the final payment.
///
/// Charging is all or nothing: when one charge is declined, the charges
/// already made by the same call are reversed and every touched hold is
/// restored before the failure is reported.
#[derive(Clone)]
pub struct ChargeProcessor {
    gateway: ProviderGateway,
    reservations: ReservationProcessor,
    cancellations: CancelReservationProcessor,
    credits: CreditProcessor,
}

/// A reservation the call charged, with the amount it held beforehand.
struct Charged {
    reservation: PaymentEvent,
    held: Money,
    charge: PaymentEvent,
}

impl ChargeProcessor {
    pub fn new(registry: ProviderRegistryRef) -> Self {
        Self::with_gateway(ProviderGateway::new(registry))
    }

    pub(crate) fn with_gateway(gateway: ProviderGateway) -> Self {
        Self {
            reservations: ReservationProcessor::with_gateway(gateway.clone()),
            cancellations: CancelReservationProcessor::with_gateway(gateway.clone()),
            credits: CreditProcessor::with_gateway(gateway.clone()),
            gateway,
        }
    }

    pub async fn charge_payment(&self, request: &ChargeRequest) -> Result<PaymentApiResponse> {
        let requested = request.amount;
        ensure_not_negative(&requested, "Charge amount")?;
        ensure_ledger_currency(&request.ledger, &requested)?;
        if requested.is_zero() {
            return Ok(PaymentApiResponse::success(Vec::new()));
        }

        let chargeable =
            PaymentHistory::new(&request.ledger, requested.currency).chargeable_payment_events();
        let available = chargeable
            .iter()
            .fold(Money::zero(requested.currency), |total, (_, amount)| total + *amount);
        if available < requested {
            return Err(PaymentError::InsufficientFunds {
                requested,
                available,
            });
        }
        self.gateway
            .ensure_registered(chargeable.iter().map(|(event, _)| &event.instrument))?;

        info!(
            order = %request.order_context.order_number,
            amount = %requested,
            final_payment = request.is_final_payment,
            "Charging"
        );
        let retry_count = reservation_count(&request.ledger);
        let mut remaining = requested;
        let mut events = Vec::new();
        let mut charged: Vec<Charged> = Vec::new();

        for (reservation, held) in chargeable {
            if remaining.is_zero() {
                break;
            }
            let amount = held.min(remaining);
            let charge = self
                .charge_event(&reservation, amount, &request.order_context, &request.custom_data)
                .await?;
            events.push(charge.clone());

            if !charge.is_effective() {
                warn!(
                    order = %request.order_context.order_number,
                    reservation = %reservation.guid,
                    "Charge declined, rolling back"
                );
                let rollback = self
                    .roll_back(request, charged, &reservation, held, retry_count)
                    .await?;
                events.extend(rollback);
                return Ok(PaymentApiResponse::failure(events));
            }

            remaining -= amount;
            let leftover = held - amount;
            if leftover.is_positive() && !request.is_final_payment {
                let rehold = self
                    .reservations
                    .reserve_to_simulate_modify(
                        leftover,
                        &reservation.instrument,
                        &request.order_context,
                        &request.custom_data,
                        retry_count,
                    )
                    .await?;
                if !rehold.success {
                    warn!(
                        order = %request.order_context.order_number,
                        %leftover,
                        "Could not hold the leftover of a partial charge"
                    );
                }
                events.extend(rehold.events);
            }
            charged.push(Charged {
                reservation,
                held,
                charge,
            });
        }

        Ok(PaymentApiResponse::success(events))
    }

    /// Undoes the charges of a call that hit a declined charge.
    ///
    /// Earlier charges are reversed and, once reversed, their holds taken
    /// again; a charge that cannot be reversed stands and keeps its hold
    /// consumed. The hold of the declined reservation is refreshed when its
    /// provider can both reserve and cancel: a new reservation replaces it,
    /// and the old one is cancelled once the new one is in place. Otherwise
    /// the declined hold is left untouched.
    async fn roll_back(
        &self,
        request: &ChargeRequest,
        charged: Vec<Charged>,
        declined: &PaymentEvent,
        declined_held: Money,
        retry_count: u32,
    ) -> Result<Vec<PaymentEvent>> {
        let order_context = &request.order_context;
        let custom_data = &request.custom_data;
        let mut events = Vec::new();

        for Charged {
            reservation,
            held,
            charge,
        } in &charged
        {
            let reversal = self
                .credits
                .reverse_event(charge, order_context, custom_data)
                .await?;
            let reversed = reversal.is_effective();
            events.push(reversal);
            if !reversed {
                warn!(charge = %charge.guid, "Could not reverse charge during rollback, charge stands");
                continue;
            }

            let rehold = self
                .reservations
                .reserve_to_simulate_modify(
                    *held,
                    &reservation.instrument,
                    order_context,
                    custom_data,
                    retry_count,
                )
                .await?;
            events.extend(rehold.events);
        }

        let provider = self.gateway.provider_for(&declined.instrument)?;
        if !(provider.supports(Capability::Reserve) && provider.supports(Capability::Cancel)) {
            debug!(reservation = %declined.guid, "Provider cannot refresh holds, declined hold left as is");
            return Ok(events);
        }
        let refresh = self
            .reservations
            .reserve_to_simulate_modify(
                declined_held,
                &declined.instrument,
                order_context,
                custom_data,
                retry_count,
            )
            .await?;
        events.extend(refresh.events);
        if refresh.success {
            let cancel = self
                .cancellations
                .cancel_event(declined, declined_held, order_context, custom_data)
                .await?;
            events.push(cancel);
        }
        Ok(events)
    }

    async fn charge_event(
        &self,
        reservation: &PaymentEvent,
        amount: Money,
        order_context: &OrderContext,
        custom_data: &CustomData,
    ) -> Result<PaymentEvent> {
        let provider = self.gateway.provider_for(&reservation.instrument)?;
        let request = CapabilityRequest::Charge {
            amount,
            reservation_data: reservation.event_data.clone(),
            context: capability_context(&reservation.instrument, order_context, custom_data),
        };
        let outcome = self.gateway.invoke(provider.as_ref(), request).await;
        Ok(outcome.into_event(
            PaymentEvent::new(
                PaymentEventKind::Charge,
                reservation.instrument.clone(),
                &order_context.order_number,
                amount,
            )
            .with_parent(reservation),
        ))
    }
}
