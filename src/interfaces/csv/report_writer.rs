use crate::application::history::PaymentHistory;
use crate::domain::event::{PaymentEvent, PaymentEventKind};
use crate::domain::money::{Currency, Money};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct BalanceRow {
    currency: Currency,
    available_reserved: Decimal,
    charged: Decimal,
    refunded: Decimal,
}

#[derive(Debug, Serialize)]
struct EventBalanceRow<'a> {
    guid: Uuid,
    instrument: &'a str,
    provider: &'a str,
    kind: PaymentEventKind,
    amount: Decimal,
    currency: Currency,
}

/// Writes balance reports of a ledger as CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// One row with the order's running totals.
    pub fn write_balances(&mut self, history: &PaymentHistory<'_>) -> Result<()> {
        self.writer.serialize(BalanceRow {
            currency: history.currency(),
            available_reserved: history.available_reserved_amount().amount.normalize(),
            charged: history.charged_amount().amount.normalize(),
            refunded: history.refunded_amount().amount.normalize(),
        })?;
        self.writer.flush()?;
        Ok(())
    }

    /// One row per event with the amount still usable through it, as
    /// returned by the chargeable and refundable projections.
    pub fn write_event_balances(&mut self, entries: &[(PaymentEvent, Money)]) -> Result<()> {
        if entries.is_empty() {
            self.writer.write_record([
                "guid",
                "instrument",
                "provider",
                "kind",
                "amount",
                "currency",
            ])?;
        }
        for (event, amount) in entries {
            self.writer.serialize(EventBalanceRow {
                guid: event.guid,
                instrument: &event.instrument.guid,
                provider: event.instrument.provider_configuration_guid(),
                kind: event.kind,
                amount: amount.amount.normalize(),
                currency: amount.currency,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{OrderPaymentInstrument, PaymentInstrument};
    use crate::domain::ledger::Ledger;
    use rust_decimal_macros::dec;

    fn reserve(amount: Decimal) -> PaymentEvent {
        PaymentEvent::new(
            PaymentEventKind::Reserve,
            OrderPaymentInstrument::unlimited("opi-1", PaymentInstrument::new("pi-1", "gateway")),
            "o-1",
            Money::new(amount, Currency::USD),
        )
    }

    fn written(write: impl FnOnce(&mut ReportWriter<&mut Vec<u8>>) -> Result<()>) -> String {
        let mut buffer = Vec::new();
        let mut writer = ReportWriter::new(&mut buffer);
        write(&mut writer).unwrap();
        drop(writer);
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_write_balances() {
        let ledger = Ledger::new(vec![reserve(dec!(100.50)), reserve(dec!(20))]);
        let history = PaymentHistory::of(&ledger, Currency::USD);

        let output = written(|writer| writer.write_balances(&history));
        assert_eq!(
            output,
            "currency,available_reserved,charged,refunded\nUSD,120.5,0,0\n"
        );
    }

    #[test]
    fn test_write_event_balances() {
        let r1 = reserve(dec!(40));
        let entries = vec![(r1.clone(), Money::new(dec!(40.00), Currency::USD))];

        let output = written(|writer| writer.write_event_balances(&entries));
        assert_eq!(
            output,
            format!("guid,instrument,provider,kind,amount,currency\n{},opi-1,gateway,reserve,40,USD\n", r1.guid)
        );
    }

    #[test]
    fn test_write_empty_event_balances_keeps_header() {
        let output = written(|writer| writer.write_event_balances(&[]));
        assert_eq!(output, "guid,instrument,provider,kind,amount,currency\n");
    }
}
