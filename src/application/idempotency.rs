use super::executor::AllocationOutcome;
use crate::domain::ids::{ChargeId, OrganizationId, PaymentId};
use crate::domain::payment::PaymentAllocation;
use crate::domain::ports::LedgerTransaction;
use crate::error::Result;
use tracing::debug;

/// Looks for an allocation set that already answers this request.
///
/// Checks the payment id first. If the payment has no allocations and an
/// external id is given, the external id is locked and any payment already
/// carrying it is replayed instead. Returns `None` when the request is new.
pub async fn prior_outcome(
    tx: &mut dyn LedgerTransaction,
    organization_id: OrganizationId,
    payment_id: PaymentId,
    external_id: Option<&str>,
) -> Result<Option<AllocationOutcome>> {
    let existing = tx
        .allocations_for_payment(organization_id, payment_id)
        .await?;
    if !existing.is_empty() {
        debug!(payment = %payment_id, rows = existing.len(), "payment already allocated");
        return replay(tx, organization_id, existing).await.map(Some);
    }

    let Some(external_id) = external_id else {
        return Ok(None);
    };

    tx.lock_external_id(organization_id, external_id).await?;
    let Some(owner) = tx
        .payment_for_external_id(organization_id, external_id)
        .await?
    else {
        return Ok(None);
    };

    debug!(
        payment = %payment_id,
        owner = %owner,
        external_id,
        "external id already allocated under another payment"
    );
    let existing = tx.allocations_for_payment(organization_id, owner).await?;
    replay(tx, organization_id, existing).await.map(Some)
}

async fn replay(
    tx: &mut dyn LedgerTransaction,
    organization_id: OrganizationId,
    allocations: Vec<PaymentAllocation>,
) -> Result<AllocationOutcome> {
    let mut charge_ids: Vec<ChargeId> = Vec::with_capacity(allocations.len());
    for allocation in &allocations {
        if !charge_ids.contains(&allocation.charge_id) {
            charge_ids.push(allocation.charge_id);
        }
    }
    let charges = tx.charges(organization_id, &charge_ids).await?;
    Ok(AllocationOutcome {
        allocations,
        charges,
        replayed: true,
    })
}
