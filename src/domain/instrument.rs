use super::money::Money;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A customer's stored payment instrument as known to one provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentInstrument {
    pub guid: String,
    /// Identifies the payment provider configuration able to operate on this instrument.
    pub provider_configuration_guid: String,
    /// Provider-specific instrument data (tokens, masked numbers, ...).
    pub data: BTreeMap<String, String>,
}

impl PaymentInstrument {
    pub fn new(guid: impl Into<String>, provider_configuration_guid: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            provider_configuration_guid: provider_configuration_guid.into(),
            data: BTreeMap::new(),
        }
    }
}

/// A payment instrument selected for an order, optionally capped by a limit.
///
/// An instrument without a limit can absorb any amount; a limited instrument
/// can never be reserved beyond its limit over the lifetime of the order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderPaymentInstrument {
    pub guid: String,
    pub payment_instrument: PaymentInstrument,
    pub limit: Option<Money>,
}

impl OrderPaymentInstrument {
    pub fn unlimited(guid: impl Into<String>, payment_instrument: PaymentInstrument) -> Self {
        Self {
            guid: guid.into(),
            payment_instrument,
            limit: None,
        }
    }

    pub fn limited(
        guid: impl Into<String>,
        payment_instrument: PaymentInstrument,
        limit: Money,
    ) -> Self {
        Self {
            guid: guid.into(),
            payment_instrument,
            limit: Some(limit),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit.is_none()
    }

    pub fn provider_configuration_guid(&self) -> &str {
        &self.payment_instrument.provider_configuration_guid
    }
}

/// Order data handed to providers with every capability call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderContext {
    pub order_number: String,
    pub customer_email: Option<String>,
}

impl OrderContext {
    pub fn new(order_number: impl Into<String>) -> Self {
        Self {
            order_number: order_number.into(),
            customer_email: None,
        }
    }
}
