#![allow(dead_code)]

use payledger::application::engine::PaymentEngine;
use payledger::application::processor::CustomData;
use payledger::domain::event::{PaymentEvent, PaymentEventKind, PaymentStatus};
use payledger::domain::instrument::{OrderContext, OrderPaymentInstrument, PaymentInstrument};
use payledger::domain::money::{Currency, Money};
use payledger::domain::ports::CapabilityFailure;
use payledger::infrastructure::in_memory::InMemoryProviderRegistry;
use payledger::infrastructure::simulated::SimulatedPaymentProvider;
use rust_decimal::Decimal;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;

pub const ORDER: &str = "order-1001";

pub fn usd(amount: Decimal) -> Money {
    Money::new(amount, Currency::USD)
}

pub fn instrument(provider: &str) -> OrderPaymentInstrument {
    OrderPaymentInstrument::unlimited(
        format!("opi-{provider}"),
        PaymentInstrument::new(format!("pi-{provider}"), provider),
    )
}

pub fn order() -> OrderContext {
    OrderContext::new(ORDER)
}

pub fn custom_data() -> CustomData {
    CustomData::new()
}

pub fn declined() -> CapabilityFailure {
    CapabilityFailure::permanent("issuer declined", "Your card was declined.")
}

pub fn engine_with(providers: &[Arc<SimulatedPaymentProvider>]) -> PaymentEngine {
    let registry = providers
        .iter()
        .fold(InMemoryProviderRegistry::new(), |registry, provider| {
            registry.with_provider(provider_name(provider), provider.clone())
        });
    PaymentEngine::new(Arc::new(registry))
}

fn provider_name(provider: &SimulatedPaymentProvider) -> String {
    use payledger::domain::ports::PaymentProvider;
    provider.configuration_name().to_string()
}

pub fn approved_reserve(instrument: &OrderPaymentInstrument, amount: Decimal) -> PaymentEvent {
    PaymentEvent::new(PaymentEventKind::Reserve, instrument.clone(), ORDER, usd(amount))
}

pub fn summary(events: &[PaymentEvent]) -> Vec<(PaymentEventKind, PaymentStatus, Money)> {
    events
        .iter()
        .map(|event| (event.kind, event.status, event.amount))
        .collect()
}

/// Writes a ledger export with the given rows under the standard header.
pub fn write_ledger_csv(path: &Path, rows: &[[&str; 10]]) -> Result<(), Error> {
    let mut wtr = csv::WriterBuilder::new().from_path(path)?;
    wtr.write_record([
        "guid",
        "parent_guid",
        "order",
        "instrument",
        "provider",
        "kind",
        "status",
        "amount",
        "currency",
        "occurred_at",
    ])?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
