use crate::domain::event::{PaymentEvent, PaymentEventKind};
use crate::domain::instrument::OrderPaymentInstrument;
use crate::domain::ledger::Ledger;
use crate::domain::money::{Currency, Money};
use std::collections::HashMap;
use uuid::Uuid;

/// Read-only balance projections over a ledger snapshot.
///
/// Every query replays the ledger from scratch; nothing is cached between
/// calls, so two queries over the same snapshot always agree.
///
/// Events are grouped into reservation chains: an effective `Reserve` opens a
/// chain, a `ModifyReserve` resets the chain balance to its own amount and
/// becomes the chain head, an approved `CancelReserve` closes it, and an
/// effective `Charge` consumes it entirely. Leftovers of a partial charge
/// are held again by a fresh `Reserve`, which opens a chain of its own.
#[derive(Debug, Clone, Copy)]
pub struct PaymentHistory<'a> {
    ledger: &'a Ledger,
    currency: Currency,
}

#[derive(Debug)]
struct ReservationChain<'a> {
    head: &'a PaymentEvent,
    available: Money,
    open: bool,
}

#[derive(Debug)]
struct ChargeState<'a> {
    charge: &'a PaymentEvent,
    credited: Money,
    reversed: bool,
}

#[derive(Debug)]
struct Replay<'a> {
    chains: Vec<ReservationChain<'a>>,
    charges: Vec<ChargeState<'a>>,
    chain_of: HashMap<Uuid, usize>,
    charged: Money,
    reverse_charged: Money,
    refunded: Money,
}

impl<'a> Replay<'a> {
    fn run(events: impl IntoIterator<Item = &'a PaymentEvent>, currency: Currency) -> Self {
        let mut replay = Self {
            chains: Vec::new(),
            charges: Vec::new(),
            chain_of: HashMap::new(),
            charged: Money::zero(currency),
            reverse_charged: Money::zero(currency),
            refunded: Money::zero(currency),
        };
        let mut charge_of: HashMap<Uuid, usize> = HashMap::new();

        for event in events {
            let effective = event.is_effective();
            let parent_chain = event
                .parent_guid
                .and_then(|parent| replay.chain_of.get(&parent).copied());

            match event.kind {
                PaymentEventKind::Reserve => {
                    if effective {
                        replay.chain_of.insert(event.guid, replay.chains.len());
                        replay.chains.push(ReservationChain {
                            head: event,
                            available: event.amount,
                            open: true,
                        });
                    }
                }
                PaymentEventKind::ModifyReserve => {
                    if let Some(index) = parent_chain {
                        replay.chain_of.insert(event.guid, index);
                        let chain = &mut replay.chains[index];
                        if effective && chain.open {
                            chain.head = event;
                            chain.available = event.amount;
                        }
                    }
                }
                PaymentEventKind::CancelReserve => {
                    if let Some(index) = parent_chain {
                        replay.chain_of.insert(event.guid, index);
                        if effective {
                            let chain = &mut replay.chains[index];
                            chain.available = Money::zero(currency);
                            chain.open = false;
                        }
                    }
                }
                PaymentEventKind::Charge => {
                    if let Some(index) = parent_chain {
                        replay.chain_of.insert(event.guid, index);
                        if effective {
                            let chain = &mut replay.chains[index];
                            chain.available = Money::zero(currency);
                            chain.open = false;
                        }
                    }
                    if effective {
                        replay.charged += event.amount;
                        charge_of.insert(event.guid, replay.charges.len());
                        replay.charges.push(ChargeState {
                            charge: event,
                            credited: Money::zero(currency),
                            reversed: false,
                        });
                    }
                }
                PaymentEventKind::Credit => {
                    if effective {
                        replay.refunded += event.amount;
                        if let Some(&index) = event.parent_guid.and_then(|p| charge_of.get(&p)) {
                            replay.charges[index].credited += event.amount;
                        }
                    }
                }
                PaymentEventKind::ReverseCharge => {
                    if effective {
                        replay.reverse_charged += event.amount;
                        if let Some(&index) = event.parent_guid.and_then(|p| charge_of.get(&p)) {
                            replay.charges[index].reversed = true;
                        }
                    }
                }
            }
        }

        replay
    }

    fn available(&self, currency: Currency) -> Money {
        self.chains
            .iter()
            .filter(|chain| chain.open)
            .fold(Money::zero(currency), |total, chain| total + chain.available)
    }
}

impl<'a> PaymentHistory<'a> {
    /// `currency` is the currency reported for an empty ledger.
    pub fn new(ledger: &'a Ledger, currency: Currency) -> Self {
        Self { ledger, currency }
    }

    /// Uses the ledger's own currency, falling back to `fallback` when empty.
    pub fn of(ledger: &'a Ledger, fallback: Currency) -> Self {
        Self::new(ledger, ledger.currency().unwrap_or(fallback))
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    fn replay(&self) -> Replay<'a> {
        Replay::run(self.ledger.iter(), self.currency)
    }

    /// Net amount still held across all open reservation chains.
    pub fn available_reserved_amount(&self) -> Money {
        self.replay().available(self.currency)
    }

    /// Charged total net of reverse charges.
    pub fn charged_amount(&self) -> Money {
        let replay = self.replay();
        replay.charged - replay.reverse_charged
    }

    pub fn refunded_amount(&self) -> Money {
        self.replay().refunded
    }

    /// Open reservations (keyed by their chain head) with the amount still
    /// chargeable, oldest reservation first.
    pub fn chargeable_payment_events(&self) -> Vec<(PaymentEvent, Money)> {
        self.replay()
            .chains
            .into_iter()
            .filter(|chain| chain.open && chain.available.is_positive())
            .map(|chain| (chain.head.clone(), chain.available))
            .collect()
    }

    /// Charges with an amount still creditable, oldest charge first.
    pub fn refundable_payment_events(&self) -> Vec<(PaymentEvent, Money)> {
        self.replay()
            .charges
            .into_iter()
            .filter(|state| !state.reversed)
            .map(|state| (state.charge.clone(), state.charge.amount - state.credited))
            .filter(|(_, remaining)| remaining.is_positive())
            .collect()
    }

    /// Amount still held by the reservation chain `guid` belongs to.
    ///
    /// Returns `None` when the event is not part of any reservation chain.
    pub fn remaining_reserved(&self, guid: Uuid) -> Option<Money> {
        let replay = self.replay();
        replay.chain_of.get(&guid).map(|&index| {
            let chain = &replay.chains[index];
            if chain.open {
                chain.available
            } else {
                Money::zero(self.currency)
            }
        })
    }

    /// Whether the ledger records any charge, whatever its outcome.
    pub fn has_charges(&self) -> bool {
        self.ledger
            .iter()
            .any(|event| event.kind == PaymentEventKind::Charge)
    }

    /// Amount each instrument can still take on.
    ///
    /// Limited instruments report their limit minus what the order already
    /// uses on them (reserved + charged - refunded) and are left out once
    /// exhausted. Unlimited instruments are reported with zero, meaning no
    /// ceiling applies.
    pub fn reservable_instruments(
        &self,
        instruments: &[OrderPaymentInstrument],
    ) -> Vec<(OrderPaymentInstrument, Money)> {
        let zero = Money::zero(self.currency);
        instruments
            .iter()
            .filter_map(|instrument| match instrument.limit {
                None => Some((instrument.clone(), zero)),
                Some(limit) => {
                    let reservable = (limit - self.used_amount(instrument)).non_negative();
                    reservable
                        .is_positive()
                        .then(|| (instrument.clone(), reservable))
                }
            })
            .collect()
    }

    fn used_amount(&self, instrument: &OrderPaymentInstrument) -> Money {
        let replay = Replay::run(
            self.ledger
                .iter()
                .filter(|event| event.instrument.guid == instrument.guid),
            self.currency,
        );
        replay.available(self.currency) + replay.charged - replay.reverse_charged - replay.refunded
    }
}
