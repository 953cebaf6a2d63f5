use super::idempotency;
use super::planner::{self, AllocationStrategy, ManualAllocation};
use super::repository::ChargeRepository;
use crate::config::EngineConfig;
use crate::domain::charge::Charge;
use crate::domain::ids::{ChargeId, LeaseId, PaymentId};
use crate::domain::money::Amount;
use crate::domain::payment::{NewAllocation, PaymentAllocation};
use crate::domain::ports::{LedgerStoreRef, LedgerTransaction};
use crate::domain::waterfall::WaterfallOrder;
use crate::error::{AllocationError, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// One call to [`AllocationExecutor::allocate_payment`].
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub payment_amount: Decimal,
    pub lease_id: LeaseId,
    pub payment_id: PaymentId,
    pub strategy: AllocationStrategy,
    /// Upstream correlation id used to recognize retries.
    pub external_id: Option<String>,
}

impl PaymentRequest {
    pub fn waterfall(payment_amount: Decimal, lease_id: LeaseId, payment_id: PaymentId) -> Self {
        Self {
            payment_amount,
            lease_id,
            payment_id,
            strategy: AllocationStrategy::default(),
            external_id: None,
        }
    }

    pub fn manual(
        payment_amount: Decimal,
        lease_id: LeaseId,
        payment_id: PaymentId,
        allocations: Vec<ManualAllocation>,
    ) -> Self {
        Self {
            strategy: AllocationStrategy::Manual(allocations),
            ..Self::waterfall(payment_amount, lease_id, payment_id)
        }
    }

    pub fn with_order(mut self, order: WaterfallOrder) -> Self {
        self.strategy = AllocationStrategy::waterfall(order);
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }
}

/// What a payment was applied to.
///
/// `replayed` is set when the result was read back from an earlier
/// allocation instead of being written by this call.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub allocations: Vec<PaymentAllocation>,
    pub charges: Vec<Charge>,
    pub replayed: bool,
}

/// Applies payments to lease charges, one transaction per payment.
///
/// The store handle is injected at construction and shared by every call;
/// the executor owns no other long-lived state.
#[derive(Clone)]
pub struct AllocationExecutor {
    store: LedgerStoreRef,
    repository: ChargeRepository,
    config: EngineConfig,
}

impl AllocationExecutor {
    pub fn new(store: LedgerStoreRef, config: EngineConfig) -> Self {
        let repository = ChargeRepository::new(store.clone(), config.default_order.clone());
        Self {
            store,
            repository,
            config,
        }
    }

    /// Outstanding charges of a lease in waterfall order. Read-only.
    pub async fn outstanding_charges(
        &self,
        lease_id: LeaseId,
        order: Option<&WaterfallOrder>,
    ) -> Result<Vec<Charge>> {
        self.repository.outstanding_charges(lease_id, order).await
    }

    /// Allocates a payment across the lease's outstanding charges.
    ///
    /// Runs as a single transaction bounded by the configured timeout. On
    /// any error, including the timeout, nothing is written. Repeating a
    /// request that already succeeded returns the stored result.
    #[instrument(
        skip(self, request),
        fields(payment = %request.payment_id, lease = %request.lease_id)
    )]
    pub async fn allocate_payment(&self, request: PaymentRequest) -> Result<AllocationOutcome> {
        let amount = Amount::new(request.payment_amount)?;
        let timeout = self.config.transaction_timeout;

        match tokio::time::timeout(timeout, self.run(amount, &request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(?timeout, "allocation timed out, transaction rolled back");
                Err(AllocationError::Timeout(timeout))
            }
        }
    }

    async fn run(&self, amount: Amount, request: &PaymentRequest) -> Result<AllocationOutcome> {
        let mut tx = self.store.begin().await?;
        match self.apply(tx.as_mut(), amount, request).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                debug!(error = %err, "allocation rejected");
                Err(err)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn LedgerTransaction,
        amount: Amount,
        request: &PaymentRequest,
    ) -> Result<AllocationOutcome> {
        let payment = tx
            .lock_payment(request.payment_id)
            .await?
            .ok_or(AllocationError::PaymentNotFound(request.payment_id))?;
        if let Some(bound_lease) = payment.lease_id
            && bound_lease != request.lease_id
        {
            return Err(AllocationError::PaymentLeaseMismatch {
                payment: payment.id,
                requested: request.lease_id,
                actual: bound_lease,
            });
        }

        let lease = tx
            .lease(request.lease_id)
            .await?
            .ok_or(AllocationError::LeaseNotFound(request.lease_id))?;
        if lease.organization_id != payment.organization_id {
            return Err(AllocationError::OrganizationMismatch {
                payment_org: payment.organization_id,
                lease_org: lease.organization_id,
            });
        }
        let organization_id = lease.organization_id;

        if let Some(prior) = idempotency::prior_outcome(
            tx,
            organization_id,
            payment.id,
            request.external_id.as_deref(),
        )
        .await?
        {
            info!(rows = prior.allocations.len(), "returning existing allocation");
            return Ok(prior);
        }

        let charges = self
            .repository
            .lock_eligible(tx, organization_id, request.lease_id, &request.strategy)
            .await?;
        if charges.is_empty() {
            return Err(AllocationError::NoOutstandingCharges);
        }

        let plan = planner::plan(amount, &charges, &request.strategy)?;
        let mut locked: HashMap<ChargeId, Charge> =
            charges.into_iter().map(|c| (c.id, c)).collect();
        let mut allocations = Vec::with_capacity(plan.len());
        let mut updated = Vec::with_capacity(plan.len());

        for (position, item) in plan.into_iter().enumerate() {
            let mut charge = locked.remove(&item.charge_id).ok_or_else(|| {
                AllocationError::internal(format!("planned charge {} was not locked", item.charge_id))
            })?;
            charge.apply(item.amount);
            tx.update_charge(charge.clone()).await?;

            let allocation_order = u32::try_from(position)
                .map_err(|_| AllocationError::internal("allocation set too large"))?;
            let row = tx
                .insert_allocation(NewAllocation {
                    organization_id,
                    payment_id: payment.id,
                    charge_id: charge.id,
                    allocated_amount: item.amount,
                    allocation_order,
                    external_id: if position == 0 {
                        request.external_id.clone()
                    } else {
                        None
                    },
                })
                .await?;
            allocations.push(row);
            updated.push(charge);
        }

        info!(
            organization = %organization_id,
            allocations = allocations.len(),
            amount = %amount,
            "payment allocated"
        );
        Ok(AllocationOutcome {
            allocations,
            charges: updated,
            replayed: false,
        })
    }
}
