use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use payledger::application::history::PaymentHistory;
use payledger::domain::ledger::Ledger;
use payledger::domain::money::Currency;
use payledger::interfaces::csv::ledger_reader::LedgerReader;
use payledger::interfaces::csv::report_writer::ReportWriter;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Report {
    /// Running totals of the order.
    Balances,
    /// Open reservations and the amount still chargeable on each.
    Chargeable,
    /// Charges and the amount still refundable on each.
    Refundable,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input ledger CSV file
    input: PathBuf,

    /// Report to print
    #[arg(long, value_enum, default_value_t = Report::Balances)]
    report: Report,

    /// Currency reported for an empty ledger
    #[arg(long, default_value = "USD")]
    currency: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let fallback_currency: Currency = cli.currency.parse().into_diagnostic()?;

    // Read the ledger, skipping rows that do not parse
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = LedgerReader::new(file);
    let mut events = Vec::new();
    for event_result in reader.events() {
        match event_result {
            Ok(event) => events.push(event),
            Err(e) => {
                eprintln!("Error reading payment event: {}", e);
            }
        }
    }

    // An order is single-currency: rows in another currency than the first are rejected
    let currency = events
        .first()
        .map(|event| event.amount.currency)
        .unwrap_or(fallback_currency);
    events.retain(|event| {
        let matches = event.amount.currency == currency;
        if !matches {
            eprintln!(
                "Error reading payment event: {} is in {}, the ledger is in {}",
                event.guid, event.amount.currency, currency
            );
        }
        matches
    });

    let ledger = Ledger::from_unordered(events);
    info!(events = ledger.len(), %currency, "Ledger loaded");

    let history = PaymentHistory::new(&ledger, currency);
    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    debug!(report = ?cli.report, "Writing report");
    let written = match cli.report {
        Report::Balances => writer.write_balances(&history),
        Report::Chargeable => writer.write_event_balances(&history.chargeable_payment_events()),
        Report::Refundable => writer.write_event_balances(&history.refundable_payment_events()),
    };
    written.into_diagnostic()?;

    Ok(())
}
