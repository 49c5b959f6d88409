use crate::application::history::PaymentHistory;
use crate::application::processor::cancel::{
    CancelAllReservationsRequest, CancelReservationProcessor, CancelReservationRequest,
};
use crate::application::processor::charge::{ChargeProcessor, ChargeRequest};
use crate::application::processor::credit::{CreditProcessor, CreditRequest, ReverseChargeRequest};
use crate::application::processor::modify::{ModifyReservationProcessor, ModifyReservationRequest};
use crate::application::processor::reserve::{ReservationProcessor, ReserveRequest};
use crate::application::processor::{CustomData, PaymentApiResponse, ProviderGateway};
use crate::domain::instrument::{OrderContext, OrderPaymentInstrument};
use crate::domain::ledger::Ledger;
use crate::domain::money::{Currency, Money};
use crate::domain::ports::ProviderRegistryRef;
use crate::error::Result;

/// The main entry point for payment workflows.
///
/// `PaymentEngine` bundles one processor per workflow over a shared provider
/// registry. It holds no order state: every call works on the ledger
/// snapshot it is given and returns the events to append to it.
#[derive(Clone)]
pub struct PaymentEngine {
    reservations: ReservationProcessor,
    modifications: ModifyReservationProcessor,
    cancellations: CancelReservationProcessor,
    charges: ChargeProcessor,
    credits: CreditProcessor,
}

impl PaymentEngine {
    /// Creates a new `PaymentEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `registry` - Resolves the provider of every order payment instrument.
    pub fn new(registry: ProviderRegistryRef) -> Self {
        let gateway = ProviderGateway::new(registry);
        Self {
            reservations: ReservationProcessor::with_gateway(gateway.clone()),
            modifications: ModifyReservationProcessor::with_gateway(gateway.clone()),
            cancellations: CancelReservationProcessor::with_gateway(gateway.clone()),
            charges: ChargeProcessor::with_gateway(gateway.clone()),
            credits: CreditProcessor::with_gateway(gateway),
        }
    }

    /// Balance projections over `ledger`; `currency` applies when it is empty.
    pub fn history<'a>(&self, ledger: &'a Ledger, currency: Currency) -> PaymentHistory<'a> {
        PaymentHistory::of(ledger, currency)
    }

    pub async fn reserve(&self, request: &ReserveRequest) -> Result<PaymentApiResponse> {
        self.reservations.reserve(request).await
    }

    pub async fn reserve_to_simulate_modify(
        &self,
        amount: Money,
        instrument: &OrderPaymentInstrument,
        order_context: &OrderContext,
        custom_data: &CustomData,
        retry_count: u32,
    ) -> Result<PaymentApiResponse> {
        self.reservations
            .reserve_to_simulate_modify(amount, instrument, order_context, custom_data, retry_count)
            .await
    }

    pub async fn modify_reservation(
        &self,
        request: &ModifyReservationRequest,
    ) -> Result<PaymentApiResponse> {
        self.modifications.modify_reservation(request).await
    }

    pub async fn cancel_reservation(
        &self,
        request: &CancelReservationRequest,
    ) -> Result<PaymentApiResponse> {
        self.cancellations.cancel_reservation(request).await
    }

    pub async fn cancel_all_reservations(
        &self,
        request: &CancelAllReservationsRequest,
    ) -> Result<PaymentApiResponse> {
        self.cancellations.cancel_all_reservations(request).await
    }

    pub async fn charge_payment(&self, request: &ChargeRequest) -> Result<PaymentApiResponse> {
        self.charges.charge_payment(request).await
    }

    pub async fn credit(&self, request: &CreditRequest) -> Result<PaymentApiResponse> {
        self.credits.credit(request).await
    }

    pub async fn manual_credit(&self, request: &CreditRequest) -> Result<PaymentApiResponse> {
        self.credits.manual_credit(request).await
    }

    pub async fn reverse_charge(
        &self,
        request: &ReverseChargeRequest,
    ) -> Result<PaymentApiResponse> {
        self.credits.reverse_charge(request).await
    }
}
