//! Workflow processors: each one turns a ledger snapshot plus a request into
//! provider calls and the new events describing their outcome.
//!
//! Processors never mutate the ledger they are given. Provider calls are
//! issued one at a time, in the order the events are returned.

pub mod cancel;
pub mod charge;
pub mod credit;
pub mod modify;
pub mod reserve;

use crate::domain::event::{PaymentEvent, PaymentEventKind};
use crate::domain::instrument::{OrderContext, OrderPaymentInstrument};
use crate::domain::ledger::Ledger;
use crate::domain::money::Money;
use crate::domain::ports::{
    CapabilityContext, CapabilityFailure, CapabilityRequest, CapabilityResponse, PaymentProvider,
    PaymentProviderRef, ProviderRegistryRef,
};
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Caller-supplied data forwarded untouched to every provider call.
pub type CustomData = BTreeMap<String, String>;

/// What a workflow operation hands back: the events to append to the ledger
/// and whether the requested intent was fully achieved.
///
/// Business failures (declines, unsupported capabilities) are reported here
/// with `success == false`; only invalid requests surface as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentApiResponse {
    pub success: bool,
    pub events: Vec<PaymentEvent>,
}

impl PaymentApiResponse {
    pub fn success(events: Vec<PaymentEvent>) -> Self {
        Self {
            success: true,
            events,
        }
    }

    pub fn failure(events: Vec<PaymentEvent>) -> Self {
        Self {
            success: false,
            events,
        }
    }

    /// Succeeds when every event moved money, counting skipped reserves
    /// and charges.
    pub(crate) fn from_effective(events: Vec<PaymentEvent>) -> Self {
        let success = events.iter().all(PaymentEvent::is_effective);
        Self { success, events }
    }

    /// Succeeds only when every event was approved by its provider.
    pub(crate) fn from_approved(events: Vec<PaymentEvent>) -> Self {
        let success = events.iter().all(PaymentEvent::is_approved);
        Self { success, events }
    }
}

/// Result of asking a provider to perform one capability.
#[derive(Debug)]
pub(crate) enum CapabilityOutcome {
    Completed(CapabilityResponse),
    Failed(CapabilityFailure),
    /// The provider does not implement the capability; nothing was called.
    Unsupported,
}

impl CapabilityOutcome {
    /// Stamps `event` with the outcome: provider data and time on success,
    /// `Failed` or `Skipped` otherwise.
    pub(crate) fn into_event(self, event: PaymentEvent) -> PaymentEvent {
        match self {
            Self::Completed(response) => {
                let event = event.with_data(response.data);
                match response.processed_at {
                    Some(at) => event.with_occurred_at(at),
                    None => event,
                }
            }
            Self::Failed(failure) => event.failed(failure),
            Self::Unsupported => event.skipped(),
        }
    }
}

/// Provider lookup and invocation shared by all processors.
#[derive(Clone)]
pub(crate) struct ProviderGateway {
    registry: ProviderRegistryRef,
}

impl ProviderGateway {
    pub(crate) fn new(registry: ProviderRegistryRef) -> Self {
        Self { registry }
    }

    pub(crate) fn provider_for(
        &self,
        instrument: &OrderPaymentInstrument,
    ) -> Result<PaymentProviderRef> {
        let configuration = instrument.provider_configuration_guid();
        self.registry
            .provider(configuration)
            .ok_or_else(|| PaymentError::ProviderNotFound(configuration.to_string()))
    }

    /// Fails before any provider is called if one of `instruments` has no
    /// registered provider.
    pub(crate) fn ensure_registered<'a>(
        &self,
        instruments: impl IntoIterator<Item = &'a OrderPaymentInstrument>,
    ) -> Result<()> {
        instruments
            .into_iter()
            .try_for_each(|instrument| self.provider_for(instrument).map(|_| ()))
    }

    pub(crate) async fn invoke(
        &self,
        provider: &dyn PaymentProvider,
        request: CapabilityRequest,
    ) -> CapabilityOutcome {
        let capability = request.capability();
        let provider_name = provider.configuration_name();
        if !provider.supports(capability) {
            debug!(provider = provider_name, %capability, "Capability not supported, skipping");
            return CapabilityOutcome::Unsupported;
        }

        match provider.execute(request).await {
            Ok(response) => {
                debug!(provider = provider_name, %capability, "Capability completed");
                CapabilityOutcome::Completed(response)
            }
            Err(failure) => {
                warn!(
                    provider = provider_name,
                    %capability,
                    temporary = failure.temporary,
                    "Capability failed: {}",
                    failure.internal_message
                );
                CapabilityOutcome::Failed(failure)
            }
        }
    }
}

pub(crate) fn capability_context(
    instrument: &OrderPaymentInstrument,
    order_context: &OrderContext,
    custom_data: &CustomData,
) -> CapabilityContext {
    CapabilityContext {
        instrument_data: instrument.payment_instrument.data.clone(),
        custom_data: custom_data.clone(),
        order_context: order_context.clone(),
    }
}

/// Every event of `ledger` must be in the currency of `amount`.
pub(crate) fn ensure_ledger_currency(ledger: &Ledger, amount: &Money) -> Result<()> {
    ledger
        .iter()
        .try_for_each(|event| event.amount.ensure_same_currency(amount))
}

pub(crate) fn ensure_not_negative(amount: &Money, what: &str) -> Result<()> {
    if amount.is_negative() {
        Err(PaymentError::InvalidRequest(format!(
            "{what} must not be negative, got {amount}"
        )))
    } else {
        Ok(())
    }
}

/// Number of reservation attempts already recorded, reported to providers
/// as a retry counter when a reservation is taken again.
pub(crate) fn reservation_count(ledger: &Ledger) -> u32 {
    let count = ledger
        .iter()
        .filter(|event| event.kind == PaymentEventKind::Reserve)
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}
