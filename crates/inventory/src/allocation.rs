//! Allocation of on-hand stock to order lines.
//!
//! Quantities on lines are in units of the line's uom; everything on the
//! sku-loc is in eaches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sku_loc::SkuLocId;

/// A document line that draws stock from a sku-loc (sales-order lines today).
pub trait SkuLocLine {
    type Key: Clone + Eq + core::fmt::Debug;

    fn key(&self) -> Self::Key;

    fn sku_loc_id(&self) -> SkuLocId;

    /// Lines are served oldest first.
    fn created_at(&self) -> DateTime<Utc>;

    fn uom_size(&self) -> i64;

    fn qty_allocated(&self) -> i64;

    /// Units still waiting for stock.
    fn qty_unallocated(&self) -> i64;

    fn ea_qty_allocated(&self) -> i64 {
        self.qty_allocated() * self.uom_size()
    }

    fn is_allocated(&self) -> bool {
        self.qty_allocated() > 0
    }
}

/// Whole units of `uom_size` eaches that fit in `available_ea`, capped at
/// `wanted`.
pub fn max_allocatable(wanted: i64, uom_size: i64, available_ea: i64) -> i64 {
    if wanted <= 0 || uom_size <= 0 || available_ea <= 0 {
        return 0;
    }
    wanted.min(available_ea / uom_size)
}

/// Each quantity a line contributes to a sku-loc cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQty {
    pub sku_loc_id: SkuLocId,
    pub ea_qty: i64,
}

impl LineQty {
    /// Allocated eaches of a line; unallocated lines contribute nothing.
    pub fn allocated<L: SkuLocLine>(line: &L) -> Self {
        Self {
            sku_loc_id: line.sku_loc_id(),
            ea_qty: if line.is_allocated() { line.ea_qty_allocated() } else { 0 },
        }
    }

    pub fn sum_for(sku_loc_id: SkuLocId, lines: &[LineQty]) -> i64 {
        lines
            .iter()
            .filter(|l| l.sku_loc_id == sku_loc_id)
            .map(|l| l.ea_qty)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAllocation<K> {
    pub line: K,
    /// Additional units allocated to the line.
    pub qty: i64,
}

/// Outcome of walking a sku-loc's waiting lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan<K> {
    /// Allocated eaches once the plan is applied.
    pub qty_allocated: i64,
    /// Eaches left available afterwards.
    pub qty_available: i64,
    pub allocations: Vec<LineAllocation<K>>,
}

impl<K> AllocationPlan<K> {
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_whole_units_only() {
        assert_eq!(max_allocatable(10, 12, 30), 2);
        assert_eq!(max_allocatable(1, 12, 30), 1);
        assert_eq!(max_allocatable(5, 1, 0), 0);
        assert_eq!(max_allocatable(5, 1, -3), 0);
    }
}
