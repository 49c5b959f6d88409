use crate::domain::ports::{
    Capability, CapabilityFailure, CapabilityRequest, CapabilityResponse, PaymentProvider,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

const ALL_CAPABILITIES: [Capability; 6] = [
    Capability::Reserve,
    Capability::Modify,
    Capability::Cancel,
    Capability::Charge,
    Capability::Credit,
    Capability::ReverseCharge,
];

#[derive(Debug, Clone)]
enum FailurePlan {
    Always(CapabilityFailure),
    /// Fails the n-th call (zero based) of the capability only.
    OnCall(usize, CapabilityFailure),
}

/// A scriptable payment provider that approves everything it supports.
///
/// Failures are scripted per capability and every call is recorded.
#[derive(Debug)]
pub struct SimulatedPaymentProvider {
    name: String,
    capabilities: HashSet<Capability>,
    failures: HashMap<Capability, Vec<FailurePlan>>,
    calls: Mutex<Vec<CapabilityRequest>>,
    sequence: AtomicU64,
}

impl SimulatedPaymentProvider {
    /// A provider supporting every capability.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capabilities(name, ALL_CAPABILITIES)
    }

    pub fn with_capabilities(
        name: impl Into<String>,
        capabilities: impl IntoIterator<Item = Capability>,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().collect(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.capabilities.remove(&capability);
        self
    }

    /// Every call of `capability` fails with `failure`.
    pub fn failing(mut self, capability: Capability, failure: CapabilityFailure) -> Self {
        self.failures
            .entry(capability)
            .or_default()
            .push(FailurePlan::Always(failure));
        self
    }

    /// Only the `call`-th invocation (zero based) of `capability` fails.
    pub fn failing_on_call(
        mut self,
        capability: Capability,
        call: usize,
        failure: CapabilityFailure,
    ) -> Self {
        self.failures
            .entry(capability)
            .or_default()
            .push(FailurePlan::OnCall(call, failure));
        self
    }

    /// All requests received so far, in call order.
    pub async fn calls(&self) -> Vec<CapabilityRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self, capability: Capability) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|request| request.capability() == capability)
            .count()
    }

    fn planned_failure(&self, capability: Capability, call: usize) -> Option<CapabilityFailure> {
        self.failures.get(&capability)?.iter().find_map(|plan| match plan {
            FailurePlan::Always(failure) => Some(failure.clone()),
            FailurePlan::OnCall(n, failure) if *n == call => Some(failure.clone()),
            FailurePlan::OnCall(..) => None,
        })
    }
}

#[async_trait]
impl PaymentProvider for SimulatedPaymentProvider {
    fn configuration_name(&self) -> &str {
        &self.name
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    async fn execute(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResponse, CapabilityFailure> {
        let capability = request.capability();
        let call = {
            let mut calls = self.calls.lock().await;
            let previous = calls
                .iter()
                .filter(|earlier| earlier.capability() == capability)
                .count();
            calls.push(request);
            previous
        };

        if !self.supports(capability) {
            return Err(CapabilityFailure::permanent(
                format!("{} does not implement {capability}", self.name),
                "The payment could not be processed.",
            ));
        }
        if let Some(failure) = self.planned_failure(capability, call) {
            return Err(failure);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut response = CapabilityResponse::default();
        response.data.insert("provider".to_string(), self.name.clone());
        response
            .data
            .insert("capability".to_string(), capability.to_string());
        response
            .data
            .insert("transaction_id".to_string(), format!("{}-{sequence}", self.name));
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::OrderContext;
    use crate::domain::money::{Currency, Money};
    use crate::domain::ports::CapabilityContext;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn reserve_request() -> CapabilityRequest {
        CapabilityRequest::Reserve {
            amount: Money::new(dec!(10), Currency::USD),
            context: CapabilityContext {
                instrument_data: BTreeMap::new(),
                custom_data: BTreeMap::new(),
                order_context: OrderContext::new("order-1"),
            },
        }
    }

    #[tokio::test]
    async fn test_approves_and_records_calls() {
        let provider = SimulatedPaymentProvider::new("gateway");
        let response = provider.execute(reserve_request()).await.unwrap();

        assert_eq!(response.data["transaction_id"], "gateway-1");
        assert_eq!(response.data["capability"], "Reserve");
        assert_eq!(provider.call_count(Capability::Reserve).await, 1);
    }

    #[tokio::test]
    async fn test_fails_only_scripted_call() {
        let provider = SimulatedPaymentProvider::new("gateway").failing_on_call(
            Capability::Reserve,
            1,
            CapabilityFailure::permanent("declined", "Card declined"),
        );

        assert!(provider.execute(reserve_request()).await.is_ok());
        let failure = provider.execute(reserve_request()).await.unwrap_err();
        assert_eq!(failure.external_message, "Card declined");
        assert!(provider.execute(reserve_request()).await.is_ok());
    }

    #[tokio::test]
    async fn test_capability_set() {
        let provider = SimulatedPaymentProvider::new("gateway").without(Capability::Modify);
        assert!(!provider.supports(Capability::Modify));
        assert!(provider.supports(Capability::Cancel));

        let minimal = SimulatedPaymentProvider::with_capabilities("basic", [Capability::Charge]);
        assert!(minimal.supports(Capability::Charge));
        assert!(!minimal.supports(Capability::Reserve));
    }
}
