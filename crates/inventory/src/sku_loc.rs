//! `SkuLoc`: a sku stocked in one location, with its quantity counters.
//!
//! `qty` is the on-hand count. `qty_allocated` and `qty_picking` are caches of
//! what sales-order and pick-ticket lines hold against it; they are refreshed
//! from those lines rather than incremented, so a drifted cache is fixed by a
//! rebuild. `qty` and `mac` are locked fields.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockor_core::{Aggregate, AggregateRoot, DomainError, Entity, LockedFields, TenantId};
use stockor_events::Event;
use stockor_export::{Exportable, ModelSchema};

use crate::allocation::{AllocationPlan, LineAllocation, LineQty, SkuLocLine, max_allocatable};
use crate::location::LocationId;
use crate::sku::SkuId;

stockor_core::model_id!(SkuLocId);

pub const LOCKED_FIELDS: LockedFields = LockedFields::new(&["qty", "mac"]);

/// Decimal places kept on the moving average cost.
const MAC_SCALE: u32 = 4;

/// Denormalized sku identity carried by a sku-loc.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkuRef {
    pub id: Option<SkuId>,
    pub code: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: Option<LocationId>,
    pub code: String,
    pub name: String,
}

/// Aggregate root: SkuLoc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuLoc {
    id: SkuLocId,
    tenant_id: Option<TenantId>,
    sku: SkuRef,
    location: LocationRef,
    mac: Decimal,
    qty: i64,
    qty_allocated: i64,
    qty_picking: i64,
    qty_reserved: i64,
    bin: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl SkuLoc {
    pub fn empty(id: SkuLocId) -> Self {
        Self {
            id,
            tenant_id: None,
            sku: SkuRef::default(),
            location: LocationRef::default(),
            mac: Decimal::ZERO,
            qty: 0,
            qty_allocated: 0,
            qty_picking: 0,
            qty_reserved: 0,
            bin: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SkuLocId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn sku(&self) -> &SkuRef {
        &self.sku
    }

    pub fn location(&self) -> &LocationRef {
        &self.location
    }

    pub fn sku_code(&self) -> &str {
        &self.sku.code
    }

    pub fn sku_description(&self) -> &str {
        &self.sku.description
    }

    pub fn location_code(&self) -> &str {
        &self.location.code
    }

    pub fn location_name(&self) -> &str {
        &self.location.name
    }

    /// Moving average cost per each.
    pub fn mac(&self) -> Decimal {
        self.mac
    }

    pub fn qty(&self) -> i64 {
        self.qty
    }

    pub fn qty_allocated(&self) -> i64 {
        self.qty_allocated
    }

    pub fn qty_picking(&self) -> i64 {
        self.qty_picking
    }

    pub fn qty_reserved(&self) -> i64 {
        self.qty_reserved
    }

    pub fn bin(&self) -> Option<&str> {
        self.bin.as_deref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// On-hand quantity not allocated, picking or reserved. May be negative
    /// when a location is oversold.
    pub fn qty_available(&self) -> i64 {
        self.qty - self.qty_allocated - self.qty_picking - self.qty_reserved
    }

    /// Value of the on-hand stock at moving average cost.
    pub fn onhand_mac_value(&self) -> Decimal {
        Decimal::from(self.qty).saturating_mul(self.mac)
    }

    /// Plan allocating the current availability to `lines` that are still
    /// waiting, oldest first.
    ///
    /// The allocated cache is first recomputed from `lines` (as
    /// [`UpdateSoQty`] would) so a stale counter can't over-allocate. Lines
    /// belonging to other sku-locs are ignored. The walk stops once nothing
    /// is available.
    pub fn allocate_available_qty<L: SkuLocLine>(&self, lines: &[L]) -> AllocationPlan<L::Key> {
        let mine: Vec<&L> = lines.iter().filter(|l| l.sku_loc_id() == self.id).collect();

        let mut qty_allocated: i64 = mine
            .iter()
            .filter(|l| l.is_allocated())
            .map(|l| l.ea_qty_allocated())
            .sum();
        let mut available = self.qty - qty_allocated - self.qty_picking - self.qty_reserved;

        let mut waiting: Vec<&L> = mine.into_iter().filter(|l| l.qty_unallocated() > 0).collect();
        waiting.sort_by_key(|l| l.created_at());

        let mut allocations = Vec::new();
        for line in waiting {
            if available <= 0 {
                break;
            }
            let qty = max_allocatable(line.qty_unallocated(), line.uom_size(), available);
            if qty == 0 {
                continue;
            }
            let ea = qty * line.uom_size();
            qty_allocated += ea;
            available -= ea;
            allocations.push(LineAllocation { line: line.key(), qty });
        }

        AllocationPlan {
            qty_allocated,
            qty_available: available,
            allocations,
        }
    }

    /// JSON shape of the record including its exported methods.
    pub fn view(&self) -> SkuLocView {
        SkuLocView {
            id: self.id,
            sku_id: self.sku.id,
            location_id: self.location.id,
            mac: self.mac,
            qty: self.qty,
            qty_allocated: self.qty_allocated,
            qty_picking: self.qty_picking,
            qty_reserved: self.qty_reserved,
            bin: self.bin.clone(),
            qty_available: self.qty_available(),
            sku_code: self.sku.code.clone(),
            sku_description: self.sku.description.clone(),
            location_code: self.location.code.clone(),
            location_name: self.location.name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkuLocView {
    pub id: SkuLocId,
    pub sku_id: Option<SkuId>,
    pub location_id: Option<LocationId>,
    pub mac: Decimal,
    pub qty: i64,
    pub qty_allocated: i64,
    pub qty_picking: i64,
    pub qty_reserved: i64,
    pub bin: Option<String>,
    pub qty_available: i64,
    pub sku_code: String,
    pub sku_description: String,
    pub location_code: String,
    pub location_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AggregateRoot for SkuLoc {
    type Id = SkuLocId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Entity for SkuLoc {
    type Id = SkuLocId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn model_name() -> &'static str {
        "sku_loc"
    }
}

impl Exportable for SkuLoc {
    fn export_schema() -> ModelSchema {
        ModelSchema::new("sku_loc")
            .with_tracked_columns([
                "sku_id",
                "location_id",
                "mac",
                "qty",
                "qty_allocated",
                "qty_picking",
                "qty_reserved",
                "bin",
            ])
            .belongs_to("sku", "sku")
            .belongs_to("location", "location")
            .has_many_private("so_lines", "so_line")
            .export_methods([
                "qty_available",
                "location_code",
                "location_name",
                "sku_code",
                "sku_description",
            ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSkuLoc {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub sku: SkuRef,
    pub location: LocationRef,
    pub bin: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Adjust on-hand qty by `delta`. Only allowed when `unlocked` names `qty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustQty {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub delta: i64,
    #[serde(default)]
    pub unlocked: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Receive stock at a unit cost, folding it into the moving average.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveQty {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub qty: i64,
    pub unit_cost: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Re-cache `qty_allocated` from the allocated sales-order lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSoQty {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub lines: Vec<LineQty>,
    pub occurred_at: DateTime<Utc>,
}

/// Re-cache `qty_picking` from the pick-ticket lines still picking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQtyPicking {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub lines: Vec<LineQty>,
    pub occurred_at: DateTime<Utc>,
}

/// Recalculate both caches when they have drifted from the lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebuild {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub so_lines: Vec<LineQty>,
    pub pt_lines: Vec<LineQty>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQtyReserved {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub qty_reserved: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkuLocCommand {
    Create(CreateSkuLoc),
    AdjustQty(AdjustQty),
    Receive(ReceiveQty),
    UpdateSoQty(UpdateSoQty),
    UpdateQtyPicking(UpdateQtyPicking),
    Rebuild(Rebuild),
    UpdateQtyReserved(UpdateQtyReserved),
}

impl SkuLocCommand {
    pub fn sku_loc_id(&self) -> SkuLocId {
        match self {
            SkuLocCommand::Create(c) => c.sku_loc_id,
            SkuLocCommand::AdjustQty(c) => c.sku_loc_id,
            SkuLocCommand::Receive(c) => c.sku_loc_id,
            SkuLocCommand::UpdateSoQty(c) => c.sku_loc_id,
            SkuLocCommand::UpdateQtyPicking(c) => c.sku_loc_id,
            SkuLocCommand::Rebuild(c) => c.sku_loc_id,
            SkuLocCommand::UpdateQtyReserved(c) => c.sku_loc_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuLocCreated {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub sku: SkuRef,
    pub location: LocationRef,
    pub bin: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// A counter moved from `old` to `new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterChanged {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub old: i64,
    pub new: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacChanged {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub old: Decimal,
    pub new: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackInStock {
    pub tenant_id: TenantId,
    pub sku_loc_id: SkuLocId,
    pub sku_code: String,
    pub qty: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkuLocEvent {
    Created(SkuLocCreated),
    /// On-hand qty changed; listeners refresh order allocation from this.
    QtyChanged(CounterChanged),
    MacChanged(MacChanged),
    /// On-hand qty went from zero to positive.
    BackInStock(BackInStock),
    QtyAllocatedChanged(CounterChanged),
    QtyPickingChanged(CounterChanged),
    QtyReservedChanged(CounterChanged),
}

impl Event for SkuLocEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SkuLocEvent::Created(_) => "inventory.sku_loc.created",
            SkuLocEvent::QtyChanged(_) => "inventory.sku_loc.qty_changed",
            SkuLocEvent::MacChanged(_) => "inventory.sku_loc.mac_changed",
            SkuLocEvent::BackInStock(_) => "inventory.sku_loc.back_in_stock",
            SkuLocEvent::QtyAllocatedChanged(_) => "inventory.sku_loc.qty_allocated_changed",
            SkuLocEvent::QtyPickingChanged(_) => "inventory.sku_loc.qty_picking_changed",
            SkuLocEvent::QtyReservedChanged(_) => "inventory.sku_loc.qty_reserved_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SkuLocEvent::Created(e) => e.occurred_at,
            SkuLocEvent::MacChanged(e) => e.occurred_at,
            SkuLocEvent::BackInStock(e) => e.occurred_at,
            SkuLocEvent::QtyChanged(e)
            | SkuLocEvent::QtyAllocatedChanged(e)
            | SkuLocEvent::QtyPickingChanged(e)
            | SkuLocEvent::QtyReservedChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SkuLoc {
    type Command = SkuLocCommand;
    type Event = SkuLocEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SkuLocEvent::Created(e) => {
                self.id = e.sku_loc_id;
                self.tenant_id = Some(e.tenant_id);
                self.sku = e.sku.clone();
                self.location = e.location.clone();
                self.bin = e.bin.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            SkuLocEvent::QtyChanged(e) => self.qty = e.new,
            SkuLocEvent::MacChanged(e) => self.mac = e.new,
            SkuLocEvent::BackInStock(_) => {}
            SkuLocEvent::QtyAllocatedChanged(e) => self.qty_allocated = e.new,
            SkuLocEvent::QtyPickingChanged(e) => self.qty_picking = e.new,
            SkuLocEvent::QtyReservedChanged(e) => self.qty_reserved = e.new,
        }
        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SkuLocCommand::Create(cmd) => self.handle_create(cmd),
            SkuLocCommand::AdjustQty(cmd) => self.handle_adjust(cmd),
            SkuLocCommand::Receive(cmd) => self.handle_receive(cmd),
            SkuLocCommand::UpdateSoQty(cmd) => {
                self.ensure_target(cmd.tenant_id, cmd.sku_loc_id)?;
                let new = LineQty::sum_for(self.id, &cmd.lines);
                Ok(self
                    .counter_change(self.qty_allocated, new, cmd.occurred_at)
                    .map(SkuLocEvent::QtyAllocatedChanged)
                    .into_iter()
                    .collect())
            }
            SkuLocCommand::UpdateQtyPicking(cmd) => {
                self.ensure_target(cmd.tenant_id, cmd.sku_loc_id)?;
                let new = LineQty::sum_for(self.id, &cmd.lines);
                Ok(self
                    .counter_change(self.qty_picking, new, cmd.occurred_at)
                    .map(SkuLocEvent::QtyPickingChanged)
                    .into_iter()
                    .collect())
            }
            SkuLocCommand::Rebuild(cmd) => {
                self.ensure_target(cmd.tenant_id, cmd.sku_loc_id)?;
                let allocated = LineQty::sum_for(self.id, &cmd.so_lines);
                let picking = LineQty::sum_for(self.id, &cmd.pt_lines);
                let mut events = Vec::new();
                if let Some(c) = self.counter_change(self.qty_allocated, allocated, cmd.occurred_at) {
                    events.push(SkuLocEvent::QtyAllocatedChanged(c));
                }
                if let Some(c) = self.counter_change(self.qty_picking, picking, cmd.occurred_at) {
                    events.push(SkuLocEvent::QtyPickingChanged(c));
                }
                Ok(events)
            }
            SkuLocCommand::UpdateQtyReserved(cmd) => {
                self.ensure_target(cmd.tenant_id, cmd.sku_loc_id)?;
                if cmd.qty_reserved < 0 {
                    return Err(DomainError::validation("qty_reserved cannot be negative"));
                }
                Ok(self
                    .counter_change(self.qty_reserved, cmd.qty_reserved, cmd.occurred_at)
                    .map(SkuLocEvent::QtyReservedChanged)
                    .into_iter()
                    .collect())
            }
        }
    }
}

impl SkuLoc {
    fn ensure_target(&self, tenant_id: TenantId, sku_loc_id: SkuLocId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != sku_loc_id {
            return Err(DomainError::invariant("sku_loc_id mismatch"));
        }
        Ok(())
    }

    fn counter_change(&self, old: i64, new: i64, occurred_at: DateTime<Utc>) -> Option<CounterChanged> {
        (old != new).then(|| CounterChanged {
            tenant_id: self.tenant_id.unwrap_or_default(),
            sku_loc_id: self.id,
            old,
            new,
            occurred_at,
        })
    }

    /// Qty change plus the back-in-stock notice when it crosses up from zero.
    fn qty_change_events(&self, new: i64, occurred_at: DateTime<Utc>) -> Vec<SkuLocEvent> {
        let Some(change) = self.counter_change(self.qty, new, occurred_at) else {
            return Vec::new();
        };
        let mut events = vec![SkuLocEvent::QtyChanged(change)];
        if self.qty == 0 && new > 0 {
            events.push(SkuLocEvent::BackInStock(BackInStock {
                tenant_id: self.tenant_id.unwrap_or_default(),
                sku_loc_id: self.id,
                sku_code: self.sku.code.clone(),
                qty: new,
                occurred_at,
            }));
        }
        events
    }

    fn handle_create(&self, cmd: &CreateSkuLoc) -> Result<Vec<SkuLocEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("SKU may not be in the same location twice"));
        }
        if cmd.sku.id.is_none() || cmd.sku.code.trim().is_empty() {
            return Err(DomainError::validation("sku must be set"));
        }
        if cmd.location.id.is_none() || cmd.location.code.trim().is_empty() {
            return Err(DomainError::validation("location must be set"));
        }

        Ok(vec![SkuLocEvent::Created(SkuLocCreated {
            tenant_id: cmd.tenant_id,
            sku_loc_id: cmd.sku_loc_id,
            sku: cmd.sku.clone(),
            location: cmd.location.clone(),
            bin: cmd.bin.clone().filter(|b| !b.trim().is_empty()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustQty) -> Result<Vec<SkuLocEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.sku_loc_id)?;
        let unlocked: Vec<&str> = cmd.unlocked.iter().map(String::as_str).collect();
        LOCKED_FIELDS.ensure_unlocked("qty", &unlocked)?;

        let new = self
            .qty
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("qty adjustment overflows"))?;
        Ok(self.qty_change_events(new, cmd.occurred_at))
    }

    fn handle_receive(&self, cmd: &ReceiveQty) -> Result<Vec<SkuLocEvent>, DomainError> {
        self.ensure_target(cmd.tenant_id, cmd.sku_loc_id)?;
        if cmd.qty <= 0 {
            return Err(DomainError::validation("received qty must be positive"));
        }
        if cmd.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit_cost cannot be negative"));
        }

        let new_qty = self
            .qty
            .checked_add(cmd.qty)
            .ok_or_else(|| DomainError::validation("qty adjustment overflows"))?;
        let new_mac = moving_average(self.qty, self.mac, cmd.qty, cmd.unit_cost)
            .ok_or_else(|| DomainError::validation("moving average cost overflows"))?;

        let mut events = Vec::new();
        if new_mac != self.mac {
            events.push(SkuLocEvent::MacChanged(MacChanged {
                tenant_id: self.tenant_id.unwrap_or_default(),
                sku_loc_id: self.id,
                old: self.mac,
                new: new_mac,
                occurred_at: cmd.occurred_at,
            }));
        }
        events.extend(self.qty_change_events(new_qty, cmd.occurred_at));
        Ok(events)
    }
}

/// `(qty*mac + received*cost) / (qty + received)`. Stock on hand at or below
/// zero carries no cost, so the receipt's cost becomes the average.
/// `None` when the result does not fit a `Decimal`.
fn moving_average(qty: i64, mac: Decimal, received: i64, unit_cost: Decimal) -> Option<Decimal> {
    if qty <= 0 {
        return Some(unit_cost.round_dp(MAC_SCALE));
    }
    let on_hand = Decimal::from(qty);
    let incoming = Decimal::from(received);
    let value = on_hand.checked_mul(mac)?.checked_add(incoming.checked_mul(unit_cost)?)?;
    Some(value.checked_div(on_hand.checked_add(incoming)?)?.round_dp(MAC_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockor_events::execute;

    fn created(tenant_id: TenantId) -> SkuLoc {
        let id = SkuLocId::generate();
        let mut sl = SkuLoc::empty(id);
        let cmd = SkuLocCommand::Create(CreateSkuLoc {
            tenant_id,
            sku_loc_id: id,
            sku: SkuRef {
                id: Some(SkuId::generate()),
                code: "STRING".into(),
                description: "Ball of string".into(),
            },
            location: LocationRef {
                id: Some(LocationId::generate()),
                code: "DEFAULT".into(),
                name: "Default".into(),
            },
            bin: Some("A1".into()),
            occurred_at: Utc::now(),
        });
        execute(&mut sl, &cmd).unwrap();
        sl
    }

    fn adjust(sl: &SkuLoc, delta: i64, unlocked: &[&str]) -> SkuLocCommand {
        SkuLocCommand::AdjustQty(AdjustQty {
            tenant_id: sl.tenant_id().unwrap(),
            sku_loc_id: sl.id_typed(),
            delta,
            unlocked: unlocked.iter().map(|s| s.to_string()).collect(),
            occurred_at: Utc::now(),
        })
    }

    fn receive(sl: &SkuLoc, qty: i64, unit_cost: Decimal) -> SkuLocCommand {
        SkuLocCommand::Receive(ReceiveQty {
            tenant_id: sl.tenant_id().unwrap(),
            sku_loc_id: sl.id_typed(),
            qty,
            unit_cost,
            occurred_at: Utc::now(),
        })
    }

    #[derive(Debug, Clone)]
    struct Line {
        key: u32,
        sku_loc_id: SkuLocId,
        created_at: DateTime<Utc>,
        uom_size: i64,
        qty: i64,
        qty_allocated: i64,
    }

    impl SkuLocLine for Line {
        type Key = u32;

        fn key(&self) -> u32 {
            self.key
        }

        fn sku_loc_id(&self) -> SkuLocId {
            self.sku_loc_id
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn uom_size(&self) -> i64 {
            self.uom_size
        }

        fn qty_allocated(&self) -> i64 {
            self.qty_allocated
        }

        fn qty_unallocated(&self) -> i64 {
            self.qty - self.qty_allocated
        }
    }

    fn line(key: u32, sl: &SkuLoc, minutes_ago: i64, qty: i64, qty_allocated: i64) -> Line {
        Line {
            key,
            sku_loc_id: sl.id_typed(),
            created_at: Utc::now() - chrono::Duration::minutes(minutes_ago),
            uom_size: 1,
            qty,
            qty_allocated,
        }
    }

    #[test]
    fn qty_available_subtracts_every_commitment() {
        let mut sl = created(TenantId::new());
        let cmd = adjust(&sl, 20, &["qty"]);
        execute(&mut sl, &cmd).unwrap();
        let t = sl.tenant_id().unwrap();
        let id = sl.id_typed();
        execute(
            &mut sl,
            &SkuLocCommand::Rebuild(Rebuild {
                tenant_id: t,
                sku_loc_id: id,
                so_lines: vec![LineQty { sku_loc_id: id, ea_qty: 5 }],
                pt_lines: vec![LineQty { sku_loc_id: id, ea_qty: 3 }],
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        execute(
            &mut sl,
            &SkuLocCommand::UpdateQtyReserved(UpdateQtyReserved {
                tenant_id: t,
                sku_loc_id: id,
                qty_reserved: 2,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(sl.qty_allocated(), 5);
        assert_eq!(sl.qty_picking(), 3);
        assert_eq!(sl.qty_available(), 10);
    }

    #[test]
    fn adjusting_locked_qty_fails() {
        let sl = created(TenantId::new());
        let err = sl.handle(&adjust(&sl, 5, &[])).unwrap_err();
        assert_eq!(err, DomainError::invariant("qty is locked"));
    }

    #[test]
    fn adjust_emits_qty_change_and_back_in_stock() {
        let mut sl = created(TenantId::new());
        let cmd = adjust(&sl, 4, &["qty"]);
        let events = execute(&mut sl, &cmd).unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SkuLocEvent::QtyChanged(c) if c.old == 0 && c.new == 4));
        assert!(matches!(&events[1], SkuLocEvent::BackInStock(b) if b.qty == 4));

        let cmd = adjust(&sl, 1, &["qty"]);
        let events = execute(&mut sl, &cmd).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(sl.qty(), 5);
    }

    #[test]
    fn zero_adjustment_changes_nothing() {
        let sl = created(TenantId::new());
        assert!(sl.handle(&adjust(&sl, 0, &["qty"])).unwrap().is_empty());
    }

    #[test]
    fn receiving_updates_the_moving_average() {
        let mut sl = created(TenantId::new());
        let cmd = receive(&sl, 10, Decimal::new(200, 2));
        execute(&mut sl, &cmd).unwrap();
        assert_eq!(sl.mac(), Decimal::new(200, 2));

        let cmd = receive(&sl, 10, Decimal::new(400, 2));
        execute(&mut sl, &cmd).unwrap();
        assert_eq!(sl.qty(), 20);
        assert_eq!(sl.mac(), Decimal::new(300, 2));
        assert_eq!(sl.onhand_mac_value(), Decimal::new(6000, 2));
    }

    #[test]
    fn receiving_past_decimal_range_is_rejected() {
        let mut sl = created(TenantId::new());
        let quadrillion = 1_000_000_000_000_000;
        let cmd = receive(&sl, quadrillion, Decimal::ONE);
        execute(&mut sl, &cmd).unwrap();

        let cmd = receive(&sl, quadrillion, Decimal::new(100_000_000_000_000, 0));
        let err = sl.handle(&cmd).unwrap_err();
        assert_eq!(err.message(), "moving average cost overflows");
        assert_eq!(sl.qty(), quadrillion);
        assert_eq!(sl.mac(), Decimal::ONE);
    }

    #[test]
    fn update_so_qty_sums_only_this_sku_loc() {
        let mut sl = created(TenantId::new());
        let id = sl.id_typed();
        let cmd = SkuLocCommand::UpdateSoQty(UpdateSoQty {
            tenant_id: sl.tenant_id().unwrap(),
            sku_loc_id: id,
            lines: vec![
                LineQty { sku_loc_id: id, ea_qty: 6 },
                LineQty { sku_loc_id: SkuLocId::generate(), ea_qty: 100 },
                LineQty { sku_loc_id: id, ea_qty: 1 },
            ],
            occurred_at: Utc::now(),
        });
        execute(&mut sl, &cmd).unwrap();
        assert_eq!(sl.qty_allocated(), 7);
        assert!(sl.handle(&cmd).unwrap().is_empty());
    }

    #[test]
    fn allocation_serves_oldest_lines_first() {
        let mut sl = created(TenantId::new());
        let cmd = adjust(&sl, 10, &["qty"]);
        execute(&mut sl, &cmd).unwrap();

        let lines = vec![
            line(1, &sl, 5, 8, 0),
            line(2, &sl, 30, 6, 0),
            line(3, &sl, 10, 3, 0),
        ];
        let plan = sl.allocate_available_qty(&lines);

        assert_eq!(
            plan.allocations,
            vec![
                LineAllocation { line: 2, qty: 6 },
                LineAllocation { line: 3, qty: 3 },
                LineAllocation { line: 1, qty: 1 },
            ]
        );
        assert_eq!(plan.qty_allocated, 10);
        assert_eq!(plan.qty_available, 0);
    }

    #[test]
    fn allocation_counts_already_allocated_lines() {
        let mut sl = created(TenantId::new());
        let cmd = adjust(&sl, 10, &["qty"]);
        execute(&mut sl, &cmd).unwrap();

        // cache says nothing is allocated, the lines say 7 is
        let lines = vec![line(1, &sl, 60, 7, 7), line(2, &sl, 5, 5, 0)];
        let plan = sl.allocate_available_qty(&lines);

        assert_eq!(plan.allocations, vec![LineAllocation { line: 2, qty: 3 }]);
        assert_eq!(plan.qty_allocated, 10);
    }

    #[test]
    fn nothing_to_allocate_when_out_of_stock() {
        let sl = created(TenantId::new());
        let lines = vec![line(1, &sl, 1, 4, 0)];
        assert!(sl.allocate_available_qty(&lines).is_empty());
    }

    #[test]
    fn view_carries_exported_methods() {
        let sl = created(TenantId::new());
        let json = serde_json::to_value(sl.view()).unwrap();
        assert_eq!(json["sku_code"], "STRING");
        assert_eq!(json["location_name"], "Default");
        assert_eq!(json["qty_available"], 0);
    }

    proptest! {
        #[test]
        fn allocation_never_exceeds_availability(
            on_hand in 0i64..500,
            wants in prop::collection::vec((1i64..50, 1i64..4), 0..12),
        ) {
            let mut sl = created(TenantId::new());
            if on_hand > 0 {
                let cmd = adjust(&sl, on_hand, &["qty"]);
                execute(&mut sl, &cmd).unwrap();
            }
            let lines: Vec<Line> = wants
                .iter()
                .enumerate()
                .map(|(i, (qty, uom))| Line {
                    uom_size: *uom,
                    ..line(i as u32, &sl, i as i64, *qty, 0)
                })
                .collect();

            let plan = sl.allocate_available_qty(&lines);
            let granted: i64 = plan
                .allocations
                .iter()
                .map(|a| a.qty * lines[a.line as usize].uom_size)
                .sum();

            prop_assert!(granted <= on_hand);
            prop_assert_eq!(plan.qty_allocated, granted);
            prop_assert!(plan.qty_available >= 0);
            for a in &plan.allocations {
                prop_assert!(a.qty <= lines[a.line as usize].qty);
            }
        }

        #[test]
        fn moving_average_stays_between_old_and_new_cost(
            qty in 1i64..1_000,
            mac_cents in 0i64..100_000,
            received in 1i64..1_000,
            cost_cents in 0i64..100_000,
        ) {
            let mac = Decimal::new(mac_cents, 2);
            let cost = Decimal::new(cost_cents, 2);
            let avg = moving_average(qty, mac, received, cost).unwrap();
            prop_assert!(avg >= mac.min(cost));
            prop_assert!(avg <= mac.max(cost));
        }

        #[test]
        fn qty_available_is_qty_minus_commitments(
            qty in -100i64..1_000,
            allocated in 0i64..300,
            picking in 0i64..300,
            reserved in 0i64..300,
        ) {
            let mut sl = created(TenantId::new());
            sl.qty = qty;
            sl.qty_allocated = allocated;
            sl.qty_picking = picking;
            sl.qty_reserved = reserved;
            prop_assert_eq!(sl.qty_available(), qty - allocated - picking - reserved);
            prop_assert_eq!(sl.onhand_mac_value(), Decimal::ZERO);
        }
    }
}
