use super::{
    CustomData, PaymentApiResponse, ProviderGateway, capability_context, ensure_ledger_currency,
};
use crate::application::history::PaymentHistory;
use crate::domain::event::{PaymentEvent, PaymentEventKind};
use crate::domain::instrument::OrderContext;
use crate::domain::ledger::Ledger;
use crate::domain::money::Money;
use crate::domain::ports::{CapabilityRequest, ProviderRegistryRef};
use crate::error::{PaymentError, Result};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct CancelReservationRequest {
    pub ledger: Ledger,
    /// Reservation events (`Reserve` or `ModifyReserve`) to release.
    pub selected_events: Vec<PaymentEvent>,
    pub order_context: OrderContext,
    pub custom_data: CustomData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelAllReservationsRequest {
    pub ledger: Ledger,
    pub order_context: OrderContext,
    pub custom_data: CustomData,
}

/// Releases outstanding holds.
///
/// A cancel the provider cannot perform is recorded as `Skipped` and counts
/// as a failure: the hold is still in place.
#[derive(Clone)]
pub struct CancelReservationProcessor {
    gateway: ProviderGateway,
}

impl CancelReservationProcessor {
    pub fn new(registry: ProviderRegistryRef) -> Self {
        Self::with_gateway(ProviderGateway::new(registry))
    }

    pub(crate) fn with_gateway(gateway: ProviderGateway) -> Self {
        Self { gateway }
    }

    pub async fn cancel_reservation(
        &self,
        request: &CancelReservationRequest,
    ) -> Result<PaymentApiResponse> {
        let Some(currency) = request
            .ledger
            .currency()
            .or_else(|| request.selected_events.first().map(|e| e.amount.currency))
        else {
            return Ok(PaymentApiResponse::success(Vec::new()));
        };
        let history = PaymentHistory::new(&request.ledger, currency);

        let mut targets = Vec::with_capacity(request.selected_events.len());
        for event in &request.selected_events {
            if !event.kind.is_reservation() {
                return Err(PaymentError::InvalidRequest(format!(
                    "Event {} is a {} and cannot be cancelled",
                    event.guid, event.kind
                )));
            }
            ensure_ledger_currency(&request.ledger, &event.amount)?;
            let amount = match history.remaining_reserved(event.guid) {
                Some(remaining) if remaining.is_zero() => {
                    return Err(PaymentError::InvalidRequest(format!(
                        "Reservation {} is already closed",
                        event.guid
                    )));
                }
                Some(remaining) => remaining,
                None => event.amount,
            };
            targets.push((event, amount));
        }
        self.gateway
            .ensure_registered(targets.iter().map(|(event, _)| &event.instrument))?;

        info!(
            order = %request.order_context.order_number,
            reservations = targets.len(),
            "Cancelling reservations"
        );
        let mut events = Vec::with_capacity(targets.len());
        for (reservation, amount) in targets {
            let event = self
                .cancel_event(reservation, amount, &request.order_context, &request.custom_data)
                .await?;
            events.push(event);
        }
        Ok(PaymentApiResponse::from_approved(events))
    }

    /// Releases every open reservation of the ledger.
    pub async fn cancel_all_reservations(
        &self,
        request: &CancelAllReservationsRequest,
    ) -> Result<PaymentApiResponse> {
        let Some(currency) = request.ledger.currency() else {
            return Ok(PaymentApiResponse::success(Vec::new()));
        };
        let chargeable = PaymentHistory::new(&request.ledger, currency).chargeable_payment_events();
        self.gateway
            .ensure_registered(chargeable.iter().map(|(event, _)| &event.instrument))?;

        info!(
            order = %request.order_context.order_number,
            reservations = chargeable.len(),
            "Cancelling all reservations"
        );
        let mut events = Vec::with_capacity(chargeable.len());
        for (reservation, amount) in &chargeable {
            let event = self
                .cancel_event(reservation, *amount, &request.order_context, &request.custom_data)
                .await?;
            events.push(event);
        }
        Ok(PaymentApiResponse::from_approved(events))
    }

    /// Cancels `amount` of `reservation`, returning the resulting event.
    pub(crate) async fn cancel_event(
        &self,
        reservation: &PaymentEvent,
        amount: Money,
        order_context: &OrderContext,
        custom_data: &CustomData,
    ) -> Result<PaymentEvent> {
        let provider = self.gateway.provider_for(&reservation.instrument)?;
        let request = CapabilityRequest::Cancel {
            amount,
            reservation_data: reservation.event_data.clone(),
            context: capability_context(&reservation.instrument, order_context, custom_data),
        };
        let outcome = self.gateway.invoke(provider.as_ref(), request).await;
        Ok(outcome.into_event(
            PaymentEvent::new(
                PaymentEventKind::CancelReserve,
                reservation.instrument.clone(),
                &order_context.order_number,
                amount,
            )
            .with_parent(reservation),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fixtures::*;
    use crate::domain::event::PaymentStatus;
    use crate::domain::ports::Capability;
    use crate::infrastructure::simulated::SimulatedPaymentProvider;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn processor(provider: SimulatedPaymentProvider) -> (CancelReservationProcessor, Arc<SimulatedPaymentProvider>) {
        let provider = Arc::new(provider);
        (
            CancelReservationProcessor::new(registry_with(vec![provider.clone()])),
            provider,
        )
    }

    fn cancel_all(ledger: Ledger) -> CancelAllReservationsRequest {
        CancelAllReservationsRequest {
            ledger,
            order_context: order(),
            custom_data: CustomData::new(),
        }
    }

    #[tokio::test]
    async fn test_cancel_selected_reservation_uses_remaining_amount() {
        let (processor, provider) = processor(SimulatedPaymentProvider::new("gateway"));
        let r1 = reserve(dec!(100)).with_data([("auth".to_string(), "A1".to_string())].into());
        let m1 = child(&r1, PaymentEventKind::ModifyReserve, dec!(60));
        let ledger = Ledger::new(vec![r1.clone(), m1.clone()]);

        let response = processor
            .cancel_reservation(&CancelReservationRequest {
                ledger,
                selected_events: vec![m1.clone()],
                order_context: order(),
                custom_data: CustomData::new(),
            })
            .await
            .unwrap();

        assert!(response.success);
        let cancel = &response.events[0];
        assert_eq!(cancel.kind, PaymentEventKind::CancelReserve);
        assert_eq!(cancel.amount, usd(dec!(60)));
        assert_eq!(cancel.parent_guid, Some(m1.guid));
        assert_eq!(provider.call_count(Capability::Cancel).await, 1);
    }

    #[tokio::test]
    async fn test_cancel_rejects_non_reservation_events() {
        let (processor, _) = processor(SimulatedPaymentProvider::new("gateway"));
        let r1 = reserve(dec!(100));
        let ch1 = child(&r1, PaymentEventKind::Charge, dec!(100));

        let result = processor
            .cancel_reservation(&CancelReservationRequest {
                ledger: Ledger::new(vec![r1, ch1.clone()]),
                selected_events: vec![ch1],
                order_context: order(),
                custom_data: CustomData::new(),
            })
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_cancel_all_releases_every_open_reservation() {
        let (processor, _) = processor(SimulatedPaymentProvider::new("gateway"));
        let r1 = reserve(dec!(40));
        let r2 = reserve(dec!(60));
        let r3 = reserve(dec!(10));
        let c3 = child(&r3, PaymentEventKind::CancelReserve, dec!(10));
        let ledger = Ledger::new(vec![r1, r2, r3, c3]);

        let response = processor.cancel_all_reservations(&cancel_all(ledger.clone())).await.unwrap();

        assert!(response.success);
        assert_eq!(response.events.len(), 2);
        let after = ledger.appended(&response.events);
        assert!(PaymentHistory::of(&after, ledger.currency().unwrap())
            .available_reserved_amount()
            .is_zero());
    }

    #[tokio::test]
    async fn test_cancel_all_with_nothing_open_is_a_no_op() {
        let (processor, provider) = processor(SimulatedPaymentProvider::new("gateway"));

        let response = processor.cancel_all_reservations(&cancel_all(Ledger::default())).await.unwrap();
        assert!(response.success);
        assert!(response.events.is_empty());
        assert!(provider.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_cancel_is_skipped_and_fails() {
        let (processor, _) =
            processor(SimulatedPaymentProvider::new("gateway").without(Capability::Cancel));
        let ledger = Ledger::new(vec![reserve(dec!(40))]);

        let response = processor.cancel_all_reservations(&cancel_all(ledger)).await.unwrap();

        assert!(!response.success);
        assert_eq!(response.events[0].status, PaymentStatus::Skipped);
    }

    #[tokio::test]
    async fn test_declined_cancel_keeps_hold() {
        let (processor, _) = processor(
            SimulatedPaymentProvider::new("gateway").failing(Capability::Cancel, failure()),
        );
        let ledger = Ledger::new(vec![reserve(dec!(40))]);

        let response = processor.cancel_all_reservations(&cancel_all(ledger.clone())).await.unwrap();

        assert!(!response.success);
        let after = ledger.appended(&response.events);
        assert_eq!(
            PaymentHistory::of(&after, ledger.currency().unwrap()).available_reserved_amount(),
            usd(dec!(40))
        );
    }
}
