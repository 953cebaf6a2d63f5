use crate::domain::ids::{ChargeId, LeaseId, OrganizationId, PaymentId};
use crate::domain::money::Money;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of [`AllocationError`] for callers that map errors
/// onto responses (HTTP status codes, exit codes, retry decisions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Consistency,
    InsufficientCharges,
    ManualAllocation,
    Conflict,
    Timeout,
    Input,
    Storage,
}

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("payment amount must be a finite number greater than zero")]
    InvalidAmount,
    #[error("payment not found: {0}")]
    PaymentNotFound(PaymentId),
    #[error("lease not found: {0}")]
    LeaseNotFound(LeaseId),
    #[error("payment lease mismatch: payment {payment} belongs to lease {actual}, not {requested}")]
    PaymentLeaseMismatch {
        payment: PaymentId,
        requested: LeaseId,
        actual: LeaseId,
    },
    #[error("payment org does not match lease org: payment org {payment_org}, lease org {lease_org}")]
    OrganizationMismatch {
        payment_org: OrganizationId,
        lease_org: OrganizationId,
    },
    #[error("no outstanding charges to allocate against")]
    NoOutstandingCharges,
    #[error("not enough open charges to cover payment: {remaining} left unallocated")]
    InsufficientOpenCharges { remaining: Money },
    #[error("manual allocations must equal payment amount: expected {expected}, got {actual}")]
    ManualSumMismatch { expected: Money, actual: Money },
    #[error("manual allocation references missing/ineligible charge {0}")]
    ManualChargeNotEligible(ChargeId),
    #[error("manual allocation exceeds charge balance: charge {charge} has {open} open, {requested} requested")]
    ManualExceedsBalance {
        charge: ChargeId,
        requested: Money,
        open: Money,
    },
    #[error("manual allocation amount must not be negative (charge {0})")]
    NegativeManualAmount(ChargeId),
    #[error("manual allocation lists charge {0} more than once")]
    DuplicateManualCharge(ChargeId),
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("allocation timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid charge: {0}")]
    InvalidCharge(String),
    #[error("invalid allocation request: {0}")]
    InvalidRequest(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AllocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount => ErrorKind::Validation,
            Self::PaymentNotFound(_) | Self::LeaseNotFound(_) => ErrorKind::NotFound,
            Self::PaymentLeaseMismatch { .. } | Self::OrganizationMismatch { .. } => {
                ErrorKind::Consistency
            }
            Self::NoOutstandingCharges | Self::InsufficientOpenCharges { .. } => {
                ErrorKind::InsufficientCharges
            }
            Self::ManualSumMismatch { .. }
            | Self::ManualChargeNotEligible(_)
            | Self::ManualExceedsBalance { .. }
            | Self::NegativeManualAmount(_)
            | Self::DuplicateManualCharge(_) => ErrorKind::ManualAllocation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidCharge(_)
            | Self::InvalidRequest(_)
            | Self::Csv(_)
            | Self::Io(_)
            | Self::Config(_) => ErrorKind::Input,
            #[cfg(feature = "storage-rocksdb")]
            Self::Storage(_) => ErrorKind::Storage,
            Self::Internal(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(Box::new(std::io::Error::other(message.into())))
    }
}

pub type Result<T> = std::result::Result<T, AllocationError>;
