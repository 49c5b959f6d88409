use super::event::PaymentEventData;
use super::instrument::OrderContext;
use super::money::Money;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A discrete operation a payment provider may or may not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Reserve,
    Modify,
    Cancel,
    Charge,
    Credit,
    ReverseCharge,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Data shared by every capability request.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityContext {
    pub instrument_data: BTreeMap<String, String>,
    pub custom_data: BTreeMap<String, String>,
    pub order_context: OrderContext,
}

/// A capability-specific request sent to a provider.
///
/// Follow-up operations carry the event data of the event they act upon:
/// the reservation's data for modify, cancel and charge, the charge's data
/// for credit and reverse charge.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityRequest {
    Reserve {
        amount: Money,
        context: CapabilityContext,
    },
    Modify {
        amount: Money,
        reservation_data: PaymentEventData,
        context: CapabilityContext,
    },
    Cancel {
        amount: Money,
        reservation_data: PaymentEventData,
        context: CapabilityContext,
    },
    Charge {
        amount: Money,
        reservation_data: PaymentEventData,
        context: CapabilityContext,
    },
    Credit {
        amount: Money,
        charge_data: PaymentEventData,
        context: CapabilityContext,
    },
    ReverseCharge {
        charge_data: PaymentEventData,
        context: CapabilityContext,
    },
}

impl CapabilityRequest {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Reserve { .. } => Capability::Reserve,
            Self::Modify { .. } => Capability::Modify,
            Self::Cancel { .. } => Capability::Cancel,
            Self::Charge { .. } => Capability::Charge,
            Self::Credit { .. } => Capability::Credit,
            Self::ReverseCharge { .. } => Capability::ReverseCharge,
        }
    }

    pub fn context(&self) -> &CapabilityContext {
        match self {
            Self::Reserve { context, .. }
            | Self::Modify { context, .. }
            | Self::Cancel { context, .. }
            | Self::Charge { context, .. }
            | Self::Credit { context, .. }
            | Self::ReverseCharge { context, .. } => context,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityResponse {
    pub data: PaymentEventData,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A provider declined or errored while executing a capability.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{internal_message}")]
pub struct CapabilityFailure {
    pub internal_message: String,
    pub external_message: String,
    /// Set when retrying the whole intent later may succeed (timeouts, outages).
    pub temporary: bool,
}

impl CapabilityFailure {
    pub fn permanent(internal: impl Into<String>, external: impl Into<String>) -> Self {
        Self {
            internal_message: internal.into(),
            external_message: external.into(),
            temporary: false,
        }
    }

    pub fn temporary(internal: impl Into<String>, external: impl Into<String>) -> Self {
        Self {
            internal_message: internal.into(),
            external_message: external.into(),
            temporary: true,
        }
    }
}

/// An external payment gateway plugin for one provider configuration.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn configuration_name(&self) -> &str;

    fn supports(&self, capability: Capability) -> bool;

    /// Executes a capability the provider reported as supported.
    async fn execute(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityFailure>;
}

pub type PaymentProviderRef = Arc<dyn PaymentProvider>;

/// Resolves provider configurations to provider handles.
pub trait ProviderRegistry: Send + Sync {
    fn provider(&self, configuration_guid: &str) -> Option<PaymentProviderRef>;
}

pub type ProviderRegistryRef = Arc<dyn ProviderRegistry>;
