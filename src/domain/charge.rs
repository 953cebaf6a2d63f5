use super::ids::{ChargeId, LeaseId, OrganizationId};
use super::money::Money;
use crate::error::AllocationError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category tag of a charge, used to rank it in the waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    Rent,
    LateFee,
    Utility,
    Deposit,
    Maintenance,
    Other,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Rent => "rent",
            ChargeType::LateFee => "late_fee",
            ChargeType::Utility => "utility",
            ChargeType::Deposit => "deposit",
            ChargeType::Maintenance => "maintenance",
            ChargeType::Other => "other",
        }
    }
}

impl fmt::Display for ChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeType {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "rent" => Ok(ChargeType::Rent),
            "late_fee" => Ok(ChargeType::LateFee),
            "utility" => Ok(ChargeType::Utility),
            "deposit" => Ok(ChargeType::Deposit),
            "maintenance" => Ok(ChargeType::Maintenance),
            "other" => Ok(ChargeType::Other),
            other => Err(AllocationError::InvalidRequest(format!(
                "unknown charge type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Open,
    Partial,
    Paid,
}

impl ChargeStatus {
    /// Derives the status from the charge total and its open balance.
    pub fn derive(amount: Money, amount_open: Money) -> Self {
        if !amount_open.is_positive() {
            ChargeStatus::Paid
        } else if amount_open < amount {
            ChargeStatus::Partial
        } else {
            ChargeStatus::Open
        }
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChargeStatus::Open => "open",
            ChargeStatus::Partial => "partial",
            ChargeStatus::Paid => "paid",
        })
    }
}

/// One billable obligation on a lease.
///
/// `amount_open` only ever decreases, and `status` is always the value
/// [`ChargeStatus::derive`] gives for the current balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: ChargeId,
    pub organization_id: OrganizationId,
    pub lease_id: LeaseId,
    pub charge_type: ChargeType,
    pub amount: Money,
    pub amount_open: Money,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub status: ChargeStatus,
}

impl Charge {
    /// Creates a fully open charge.
    pub fn new(
        id: ChargeId,
        organization_id: OrganizationId,
        lease_id: LeaseId,
        charge_type: ChargeType,
        amount: Money,
        due_date: NaiveDate,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AllocationError> {
        if amount.is_negative() {
            return Err(AllocationError::InvalidCharge(format!(
                "charge {id} has negative amount {amount}"
            )));
        }
        Ok(Self {
            id,
            organization_id,
            lease_id,
            charge_type,
            amount,
            amount_open: amount,
            due_date,
            created_at,
            status: ChargeStatus::derive(amount, amount),
        })
    }

    /// Replaces the open balance, keeping `0 <= amount_open <= amount`.
    pub fn with_open_balance(mut self, amount_open: Money) -> Result<Self, AllocationError> {
        if amount_open.is_negative() || amount_open > self.amount {
            return Err(AllocationError::InvalidCharge(format!(
                "charge {} open balance {} outside 0..={}",
                self.id, amount_open, self.amount
            )));
        }
        self.amount_open = amount_open;
        self.status = ChargeStatus::derive(self.amount, amount_open);
        Ok(self)
    }

    pub fn is_outstanding(&self) -> bool {
        self.status != ChargeStatus::Paid && self.amount_open.is_positive()
    }

    /// Applies an allocated amount to the open balance.
    pub fn apply(&mut self, allocated: Money) {
        self.amount_open = self.amount_open.saturating_sub(allocated);
        self.status = ChargeStatus::derive(self.amount, self.amount_open);
    }
}
