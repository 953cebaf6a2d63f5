use super::charge::{Charge, ChargeType};
use crate::error::AllocationError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Priority sequence of charge types: earlier types are paid first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaterfallOrder(Vec<ChargeType>);

impl Default for WaterfallOrder {
    fn default() -> Self {
        Self(vec![
            ChargeType::Rent,
            ChargeType::LateFee,
            ChargeType::Utility,
            ChargeType::Other,
        ])
    }
}

impl WaterfallOrder {
    pub fn new(types: Vec<ChargeType>) -> Self {
        Self(types)
    }

    pub fn types(&self) -> &[ChargeType] {
        &self.0
    }

    /// Position of `charge_type` in the order; unlisted types rank last.
    pub fn rank(&self, charge_type: ChargeType) -> usize {
        self.0
            .iter()
            .position(|t| *t == charge_type)
            .unwrap_or(self.0.len())
    }

    /// Type rank, then due date, then creation time, then id.
    pub fn compare(&self, a: &Charge, b: &Charge) -> Ordering {
        self.rank(a.charge_type)
            .cmp(&self.rank(b.charge_type))
            .then_with(|| a.due_date.cmp(&b.due_date))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Keeps outstanding charges and sorts them into payment order.
    pub fn arrange(&self, charges: Vec<Charge>) -> Vec<Charge> {
        let mut outstanding: Vec<Charge> = charges.into_iter().filter(Charge::is_outstanding).collect();
        outstanding.sort_by(|a, b| self.compare(a, b));
        outstanding
    }
}

impl fmt::Display for WaterfallOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(ChargeType::as_str).collect();
        f.write_str(&names.join(","))
    }
}

/// Parses `rent,late_fee` or `rent|late_fee`.
impl FromStr for WaterfallOrder {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let types = s
            .split([',', '|'])
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(ChargeType::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if types.is_empty() {
            return Err(AllocationError::InvalidRequest(
                "waterfall order must list at least one charge type".to_string(),
            ));
        }
        Ok(Self(types))
    }
}
