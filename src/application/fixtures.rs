//! Builders shared by the application layer unit tests.

use crate::domain::event::{PaymentEvent, PaymentEventKind};
use crate::domain::instrument::{OrderContext, OrderPaymentInstrument, PaymentInstrument};
use crate::domain::money::{Currency, Money};
use crate::domain::ports::{CapabilityFailure, PaymentProvider, ProviderRegistryRef};
use crate::infrastructure::in_memory::InMemoryProviderRegistry;
use crate::infrastructure::simulated::SimulatedPaymentProvider;
use rust_decimal::Decimal;
use std::sync::Arc;

pub const ORDER: &str = "order-1";

pub fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

/// An unlimited instrument served by the provider configuration `provider`.
pub fn instrument(provider: &str) -> OrderPaymentInstrument {
    OrderPaymentInstrument::unlimited(
        format!("opi-{provider}"),
        PaymentInstrument::new(format!("pi-{provider}"), provider),
    )
}

pub fn limited_instrument(provider: &str, limit: Decimal) -> OrderPaymentInstrument {
    OrderPaymentInstrument::limited(
        format!("opi-{provider}"),
        PaymentInstrument::new(format!("pi-{provider}"), provider),
        usd(limit),
    )
}

pub fn order() -> OrderContext {
    OrderContext::new(ORDER)
}

pub fn failure() -> CapabilityFailure {
    CapabilityFailure::permanent("gateway declined", "Your payment was declined.")
}

pub fn reserve_on(instrument: &OrderPaymentInstrument, amount: Decimal) -> PaymentEvent {
    PaymentEvent::new(
        PaymentEventKind::Reserve,
        instrument.clone(),
        ORDER,
        usd(amount),
    )
}

/// An approved reservation on the default `gateway` instrument.
pub fn reserve(amount: Decimal) -> PaymentEvent {
    reserve_on(&instrument("gateway"), amount)
}

/// An approved event following `parent` on the same instrument.
pub fn child(parent: &PaymentEvent, kind: PaymentEventKind, amount: Decimal) -> PaymentEvent {
    PaymentEvent::new(kind, parent.instrument.clone(), ORDER, usd(amount)).with_parent(parent)
}

pub fn registry_with(providers: Vec<Arc<SimulatedPaymentProvider>>) -> ProviderRegistryRef {
    let registry = providers
        .into_iter()
        .fold(InMemoryProviderRegistry::new(), |registry, provider| {
            let name = provider.configuration_name().to_string();
            registry.with_provider(name, provider)
        });
    Arc::new(registry)
}
