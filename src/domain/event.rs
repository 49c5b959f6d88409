use super::instrument::OrderPaymentInstrument;
use super::money::Money;
use super::ports::CapabilityFailure;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Opaque provider-returned key/value data.
pub type PaymentEventData = BTreeMap<String, String>;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    Reserve,
    ModifyReserve,
    CancelReserve,
    Charge,
    ReverseCharge,
    Credit,
}

impl PaymentEventKind {
    pub fn is_reservation(&self) -> bool {
        matches!(self, Self::Reserve | Self::ModifyReserve)
    }
}

impl fmt::Display for PaymentEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reserve => "reserve",
            Self::ModifyReserve => "modify_reserve",
            Self::CancelReserve => "cancel_reserve",
            Self::Charge => "charge",
            Self::ReverseCharge => "reverse_charge",
            Self::Credit => "credit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Approved,
    Failed,
    Skipped,
}

/// One immutable entry of an order's payment history.
///
/// The amount is never negative: the direction of the money movement is
/// carried by [`PaymentEventKind`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentEvent {
    pub guid: Uuid,
    /// The event this one follows, compensates or supersedes.
    pub parent_guid: Option<Uuid>,
    /// Order number the ledger belongs to.
    pub reference_id: String,
    pub instrument: OrderPaymentInstrument,
    pub kind: PaymentEventKind,
    pub status: PaymentStatus,
    pub amount: Money,
    pub event_data: PaymentEventData,
    pub occurred_at: DateTime<Utc>,
    /// Present only when `status` is `Failed`.
    pub failure: Option<CapabilityFailure>,
}

impl PaymentEvent {
    /// Mints a new approved event with a fresh guid, timestamped now.
    pub fn new(
        kind: PaymentEventKind,
        instrument: OrderPaymentInstrument,
        reference_id: impl Into<String>,
        amount: Money,
    ) -> Self {
        Self {
            guid: Uuid::new_v4(),
            parent_guid: None,
            reference_id: reference_id.into(),
            instrument,
            kind,
            status: PaymentStatus::Approved,
            amount,
            event_data: PaymentEventData::new(),
            occurred_at: Utc::now(),
            failure: None,
        }
    }

    pub fn with_parent(mut self, parent: &PaymentEvent) -> Self {
        self.parent_guid = Some(parent.guid);
        self
    }

    pub fn with_data(mut self, data: PaymentEventData) -> Self {
        self.event_data = data;
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.status = PaymentStatus::Skipped;
        self
    }

    pub fn failed(mut self, failure: CapabilityFailure) -> Self {
        self.status = PaymentStatus::Failed;
        self.failure = Some(failure);
        self
    }

    pub fn is_approved(&self) -> bool {
        self.status == PaymentStatus::Approved
    }

    /// Whether the event moved money as far as the ledger is concerned.
    ///
    /// A skipped reserve or charge stands for an operation the provider performs
    /// implicitly, so it counts; a skipped cancel or credit released nothing.
    /// A skipped reverse charge only ever undoes an implicit charge.
    pub fn is_effective(&self) -> bool {
        match self.status {
            PaymentStatus::Approved => true,
            PaymentStatus::Skipped => matches!(
                self.kind,
                PaymentEventKind::Reserve | PaymentEventKind::Charge | PaymentEventKind::ReverseCharge
            ),
            PaymentStatus::Failed => false,
        }
    }

    pub fn is_temporary_failure(&self) -> bool {
        self.failure.as_ref().is_some_and(|f| f.temporary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::PaymentInstrument;
    use crate::domain::money::Currency;
    use rust_decimal_macros::dec;

    fn instrument() -> OrderPaymentInstrument {
        OrderPaymentInstrument::unlimited("opi-1", PaymentInstrument::new("pi-1", "gateway"))
    }

    #[test]
    fn test_new_event_is_approved_without_parent() {
        let event = PaymentEvent::new(
            PaymentEventKind::Reserve,
            instrument(),
            "order-1",
            Money::new(dec!(10), Currency::USD),
        );
        assert_eq!(event.status, PaymentStatus::Approved);
        assert!(event.parent_guid.is_none());
        assert!(event.failure.is_none());
    }

    #[test]
    fn test_failed_event_carries_failure_details() {
        let reserve = PaymentEvent::new(
            PaymentEventKind::Reserve,
            instrument(),
            "order-1",
            Money::new(dec!(10), Currency::USD),
        );
        let charge = PaymentEvent::new(
            PaymentEventKind::Charge,
            instrument(),
            "order-1",
            Money::new(dec!(10), Currency::USD),
        )
        .with_parent(&reserve)
        .failed(CapabilityFailure::temporary("timeout", "Try again later"));

        assert_eq!(charge.parent_guid, Some(reserve.guid));
        assert_eq!(charge.status, PaymentStatus::Failed);
        assert!(charge.is_temporary_failure());
        assert!(!charge.is_effective());
    }

    #[test]
    fn test_skipped_effectiveness_depends_on_kind() {
        let money = Money::new(dec!(5), Currency::USD);
        let reserve =
            PaymentEvent::new(PaymentEventKind::Reserve, instrument(), "o", money).skipped();
        let cancel =
            PaymentEvent::new(PaymentEventKind::CancelReserve, instrument(), "o", money).skipped();
        assert!(reserve.is_effective());
        assert!(!cancel.is_effective());
    }

    #[test]
    fn test_event_kind_serialization() {
        let json = serde_json::to_string(&PaymentEventKind::ModifyReserve).unwrap();
        assert_eq!(json, "\"modify_reserve\"");
        let status: PaymentStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(status, PaymentStatus::Skipped);
    }
}
