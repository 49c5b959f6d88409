use super::cancel::CancelReservationProcessor;
use super::reserve::{ReservationProcessor, ReserveRequest};
use super::{
    CustomData, PaymentApiResponse, ProviderGateway, capability_context, ensure_ledger_currency,
    ensure_not_negative, reservation_count,
};
use crate::application::history::PaymentHistory;
use crate::domain::event::{PaymentEvent, PaymentEventKind};
use crate::domain::instrument::{OrderContext, OrderPaymentInstrument};
use crate::domain::ledger::Ledger;
use crate::domain::money::Money;
use crate::domain::ports::{Capability, CapabilityRequest, PaymentProvider, ProviderRegistryRef};
use crate::error::Result;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyReservationRequest {
    pub ledger: Ledger,
    /// Instruments the order pays with; the first unlimited one takes increases.
    pub instruments: Vec<OrderPaymentInstrument>,
    /// The new total to keep reserved.
    pub amount: Money,
    pub order_context: OrderContext,
    pub custom_data: CustomData,
}

/// Moves the total reserved amount of an order to a new target.
///
/// Providers that cannot modify a hold get the change simulated: a fresh
/// reservation for the new amount, followed by a cancel of the old one once
/// the new hold is in place.
#[derive(Clone)]
pub struct ModifyReservationProcessor {
    gateway: ProviderGateway,
    reservations: ReservationProcessor,
    cancellations: CancelReservationProcessor,
}

/// An open reservation and the amount it should hold after the decrease.
struct Release {
    reservation: PaymentEvent,
    available: Money,
    target: Money,
}

impl ModifyReservationProcessor {
    pub fn new(registry: ProviderRegistryRef) -> Self {
        Self::with_gateway(ProviderGateway::new(registry))
    }

    pub(crate) fn with_gateway(gateway: ProviderGateway) -> Self {
        Self {
            reservations: ReservationProcessor::with_gateway(gateway.clone()),
            cancellations: CancelReservationProcessor::with_gateway(gateway.clone()),
            gateway,
        }
    }

    pub async fn modify_reservation(
        &self,
        request: &ModifyReservationRequest,
    ) -> Result<PaymentApiResponse> {
        let target = request.amount;
        ensure_not_negative(&target, "Reservation amount")?;
        ensure_ledger_currency(&request.ledger, &target)?;

        let history = PaymentHistory::new(&request.ledger, target.currency);
        let current = history.available_reserved_amount();
        if target == current {
            return Ok(PaymentApiResponse::success(Vec::new()));
        }

        let chargeable = history.chargeable_payment_events();
        self.gateway.ensure_registered(
            request
                .instruments
                .iter()
                .chain(chargeable.iter().map(|(event, _)| &event.instrument)),
        )?;

        info!(
            order = %request.order_context.order_number,
            %current,
            %target,
            "Modifying reservation"
        );
        if chargeable.is_empty() {
            return self.reserve(request, target).await;
        }
        if target > current {
            self.increase(request, &chargeable, target - current).await
        } else {
            self.decrease(request, chargeable, current - target).await
        }
    }

    async fn reserve(
        &self,
        request: &ModifyReservationRequest,
        amount: Money,
    ) -> Result<PaymentApiResponse> {
        self.reservations
            .reserve(&ReserveRequest {
                ledger: request.ledger.clone(),
                instruments: request.instruments.clone(),
                amount,
                order_context: request.order_context.clone(),
                custom_data: request.custom_data.clone(),
            })
            .await
    }

    async fn increase(
        &self,
        request: &ModifyReservationRequest,
        chargeable: &[(PaymentEvent, Money)],
        delta: Money,
    ) -> Result<PaymentApiResponse> {
        let primary = request
            .instruments
            .iter()
            .find(|instrument| instrument.is_unlimited())
            .or_else(|| request.instruments.first())
            .or_else(|| chargeable.last().map(|(event, _)| &event.instrument));
        let Some(primary) = primary else {
            return Ok(PaymentApiResponse::success(Vec::new()));
        };
        let provider = self.gateway.provider_for(primary)?;
        if is_passive(provider.as_ref()) {
            debug!(instrument = %primary.guid, "Provider cannot hold funds, nothing to increase");
            return Ok(PaymentApiResponse::success(Vec::new()));
        }

        let open = chargeable
            .iter()
            .find(|(event, _)| event.instrument.guid == primary.guid);
        if let Some((reservation, available)) = open
            && provider.supports(Capability::Modify)
        {
            let modified = self
                .modify_event(request, reservation, *available + delta)
                .await?;
            return Ok(match modified {
                Some(event) => PaymentApiResponse::success(vec![event]),
                None => PaymentApiResponse::failure(Vec::new()),
            });
        }

        self.reservations
            .reserve(&ReserveRequest {
                ledger: request.ledger.clone(),
                instruments: vec![primary.clone()],
                amount: delta,
                order_context: request.order_context.clone(),
                custom_data: request.custom_data.clone(),
            })
            .await
    }

    async fn decrease(
        &self,
        request: &ModifyReservationRequest,
        chargeable: Vec<(PaymentEvent, Money)>,
        release: Money,
    ) -> Result<PaymentApiResponse> {
        let retry_count = reservation_count(&request.ledger);
        let mut events = Vec::new();
        let mut success = true;

        for step in plan_release(chargeable, release) {
            let Release {
                reservation,
                available,
                target,
            } = step;
            let provider = self.gateway.provider_for(&reservation.instrument)?;
            if is_passive(provider.as_ref()) {
                debug!(reservation = %reservation.guid, "Provider cannot hold funds, nothing to release");
                continue;
            }
            let can_modify = provider.supports(Capability::Modify);
            let can_cancel = provider.supports(Capability::Cancel);

            if (target.is_zero() && can_cancel) || (!can_modify && !can_cancel) {
                // Without cancel support this records a skipped cancel: the
                // hold could not be released.
                let cancel = self
                    .cancellations
                    .cancel_event(&reservation, available, &request.order_context, &request.custom_data)
                    .await?;
                success &= cancel.is_approved();
                events.push(cancel);
            } else if can_modify {
                match self.modify_event(request, &reservation, target).await? {
                    Some(event) => events.push(event),
                    None => success = false,
                }
            } else {
                let instrument = request
                    .instruments
                    .iter()
                    .find(|instrument| instrument.guid == reservation.instrument.guid)
                    .unwrap_or(&reservation.instrument);
                let replacement = self
                    .reservations
                    .reserve_to_simulate_modify(
                        target,
                        instrument,
                        &request.order_context,
                        &request.custom_data,
                        retry_count,
                    )
                    .await?;
                events.extend(replacement.events);
                if !replacement.success {
                    success = false;
                    continue;
                }
                let cancel = self
                    .cancellations
                    .cancel_event(&reservation, available, &request.order_context, &request.custom_data)
                    .await?;
                success &= cancel.is_approved();
                events.push(cancel);
            }
        }

        Ok(PaymentApiResponse { success, events })
    }

    /// Asks the provider to change `reservation` to `amount`.
    ///
    /// Returns `None` when the provider declined; the old hold stays valid
    /// and nothing is recorded.
    async fn modify_event(
        &self,
        request: &ModifyReservationRequest,
        reservation: &PaymentEvent,
        amount: Money,
    ) -> Result<Option<PaymentEvent>> {
        let provider = self.gateway.provider_for(&reservation.instrument)?;
        let capability_request = CapabilityRequest::Modify {
            amount,
            reservation_data: reservation.event_data.clone(),
            context: capability_context(
                &reservation.instrument,
                &request.order_context,
                &request.custom_data,
            ),
        };
        let event = self
            .gateway
            .invoke(provider.as_ref(), capability_request)
            .await
            .into_event(
                PaymentEvent::new(
                    PaymentEventKind::ModifyReserve,
                    reservation.instrument.clone(),
                    &request.order_context.order_number,
                    amount,
                )
                .with_parent(reservation),
            );
        Ok(event.is_approved().then_some(event))
    }
}

/// A provider that can neither modify, reserve nor cancel has no holds to manage.
fn is_passive(provider: &dyn PaymentProvider) -> bool {
    ![Capability::Modify, Capability::Reserve, Capability::Cancel]
        .into_iter()
        .any(|capability| provider.supports(capability))
}

/// First-fit: takes `release` out of the oldest reservations first.
fn plan_release(chargeable: Vec<(PaymentEvent, Money)>, release: Money) -> Vec<Release> {
    let mut remaining = release;
    let mut plan = Vec::new();
    for (reservation, available) in chargeable {
        if remaining.is_zero() {
            break;
        }
        let taken = available.min(remaining);
        remaining -= taken;
        plan.push(Release {
            reservation,
            available,
            target: available - taken,
        });
    }
    plan
}
