use super::event::PaymentEvent;
use super::money::Currency;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The append-only payment history of a single order.
///
/// A `Ledger` handed to a processor is a snapshot: processors never append to
/// it, they return new events and the owner of the ledger appends them.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    events: Vec<PaymentEvent>,
}

impl Ledger {
    /// Wraps events that are already in sequence order.
    pub fn new(events: Vec<PaymentEvent>) -> Self {
        Self { events }
    }

    /// Orders events by `occurred_at`, keeping the given order on ties.
    pub fn from_unordered(mut events: Vec<PaymentEvent>) -> Self {
        events.sort_by_key(|event| event.occurred_at);
        Self { events }
    }

    pub fn events(&self) -> &[PaymentEvent] {
        &self.events
    }

    pub fn iter(&self) -> impl Iterator<Item = &PaymentEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, guid: Uuid) -> Option<&PaymentEvent> {
        self.events.iter().find(|event| event.guid == guid)
    }

    /// Currency of the order, taken from the first event.
    pub fn currency(&self) -> Option<Currency> {
        self.events.first().map(|event| event.amount.currency)
    }

    pub fn append(&mut self, events: impl IntoIterator<Item = PaymentEvent>) {
        self.events.extend(events);
    }

    /// Returns a new snapshot with `events` appended, leaving `self` untouched.
    pub fn appended(&self, events: &[PaymentEvent]) -> Ledger {
        let mut next = self.clone();
        next.append(events.iter().cloned());
        next
    }
}

impl FromIterator<PaymentEvent> for Ledger {
    fn from_iter<I: IntoIterator<Item = PaymentEvent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a PaymentEvent;
    type IntoIter = std::slice::Iter<'a, PaymentEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
