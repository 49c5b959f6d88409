use crate::domain::event::{PaymentEvent, PaymentEventKind, PaymentStatus};
use crate::domain::instrument::{OrderPaymentInstrument, PaymentInstrument};
use crate::domain::money::{Currency, Money};
use crate::domain::ports::CapabilityFailure;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use uuid::Uuid;

/// One row of an exported ledger file.
#[derive(Debug, Deserialize)]
struct PaymentEventRecord {
    guid: Uuid,
    parent_guid: Option<Uuid>,
    order: String,
    instrument: String,
    provider: String,
    kind: PaymentEventKind,
    status: PaymentStatus,
    amount: Decimal,
    currency: Currency,
    occurred_at: DateTime<Utc>,
    /// Limit of the order payment instrument, if any.
    #[serde(default)]
    limit: Option<Decimal>,
    /// Provider message of a failed event.
    #[serde(default)]
    failure: Option<String>,
}

impl TryFrom<PaymentEventRecord> for PaymentEvent {
    type Error = PaymentError;

    fn try_from(record: PaymentEventRecord) -> Result<Self> {
        if record.amount.is_sign_negative() {
            return Err(PaymentError::ValidationError(format!(
                "Event {} has a negative amount",
                record.guid
            )));
        }
        let payment_instrument =
            PaymentInstrument::new(format!("{}-instrument", record.instrument), record.provider);
        let instrument = match record.limit {
            Some(limit) => OrderPaymentInstrument::limited(
                record.instrument,
                payment_instrument,
                Money::new(limit, record.currency),
            ),
            None => OrderPaymentInstrument::unlimited(record.instrument, payment_instrument),
        };

        let mut event = PaymentEvent::new(
            record.kind,
            instrument,
            record.order,
            Money::new(record.amount, record.currency),
        )
        .with_occurred_at(record.occurred_at);
        event.guid = record.guid;
        event.parent_guid = record.parent_guid;

        Ok(match record.status {
            PaymentStatus::Approved => event,
            PaymentStatus::Skipped => event.skipped(),
            PaymentStatus::Failed => {
                let message = record.failure.unwrap_or_default();
                event.failed(CapabilityFailure::permanent(message.clone(), message))
            }
        })
    }
}

/// Reads payment events from a CSV ledger export.
///
/// Columns: `guid, parent_guid, order, instrument, provider, kind, status,
/// amount, currency, occurred_at` and optionally `limit` and `failure`.
pub struct LedgerReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> LedgerReader<R> {
    /// Creates a new `LedgerReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and validates events, one
    /// result per row.
    pub fn events(self) -> impl Iterator<Item = Result<PaymentEvent>> {
        self.reader
            .into_deserialize::<PaymentEventRecord>()
            .map(|result| result.map_err(PaymentError::from).and_then(PaymentEvent::try_from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "guid,parent_guid,order,instrument,provider,kind,status,amount,currency,occurred_at";

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{HEADER}\n\
             6f1c1a64-2c6f-4d2a-9a51-3d0f1c3f7a01,,o-1,opi-1,gateway,reserve,approved,100.00,USD,2024-05-01T10:00:00Z\n\
             6f1c1a64-2c6f-4d2a-9a51-3d0f1c3f7a02,6f1c1a64-2c6f-4d2a-9a51-3d0f1c3f7a01,o-1,opi-1,gateway,charge,failed,40,USD,2024-05-01T10:05:00Z"
        );
        let events: Vec<Result<PaymentEvent>> = LedgerReader::new(data.as_bytes()).events().collect();

        assert_eq!(events.len(), 2);
        let reserve = events[0].as_ref().unwrap();
        assert_eq!(reserve.kind, PaymentEventKind::Reserve);
        assert_eq!(reserve.amount, Money::new(dec!(100.00), Currency::USD));
        assert_eq!(reserve.instrument.provider_configuration_guid(), "gateway");
        assert!(reserve.parent_guid.is_none());

        let charge = events[1].as_ref().unwrap();
        assert_eq!(charge.status, PaymentStatus::Failed);
        assert_eq!(charge.parent_guid, Some(reserve.guid));
    }

    #[test]
    fn test_reader_reads_optional_limit() {
        let data = format!(
            "{HEADER},limit\n\
             6f1c1a64-2c6f-4d2a-9a51-3d0f1c3f7a01,,o-1,gift,cards,reserve,approved,20,USD,2024-05-01T10:00:00Z,50"
        );
        let events: Vec<Result<PaymentEvent>> = LedgerReader::new(data.as_bytes()).events().collect();

        let event = events[0].as_ref().unwrap();
        assert_eq!(event.instrument.limit, Some(Money::new(dec!(50), Currency::USD)));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = format!(
            "{HEADER}\n\
             not-a-guid,,o-1,opi-1,gateway,reserve,approved,1,USD,2024-05-01T10:00:00Z\n\
             6f1c1a64-2c6f-4d2a-9a51-3d0f1c3f7a01,,o-1,opi-1,gateway,refund,approved,1,USD,2024-05-01T10:00:00Z\n\
             6f1c1a64-2c6f-4d2a-9a51-3d0f1c3f7a01,,o-1,opi-1,gateway,reserve,approved,-5,USD,2024-05-01T10:00:00Z"
        );
        let events: Vec<Result<PaymentEvent>> = LedgerReader::new(data.as_bytes()).events().collect();

        assert!(events[0].is_err());
        assert!(events[1].is_err());
        assert!(matches!(events[2], Err(PaymentError::ValidationError(_))));
    }
}
