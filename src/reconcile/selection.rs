//! Interactive casco selection state for one order.
//!
//! Operating invariant: for a given product, the sum of quantities across
//! all its container options never exceeds the product's required
//! quantity at any point during editing. Increments that would violate
//! this are rejected as no-ops, so an over-selection can never reach
//! submission.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{ContainerOption, OrderLineItem};

/// One `{casco_id, quantidade}` entry of the settlement payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerReturn {
    #[serde(rename = "casco_id")]
    pub container_id: i64,
    #[serde(rename = "quantidade")]
    pub quantity: u32,
}

/// Settlement payload: product id (as string key) to returned-container
/// entries with quantity > 0 only. This is the authoritative payload
/// shape; older flat-array shapes are not produced or accepted.
pub type ReturnPayload = BTreeMap<String, Vec<ContainerReturn>>;

/// Selection state for one eligible line item.
#[derive(Debug, Clone)]
pub struct SelectionLine {
    pub product_id: i64,
    pub product_name: String,
    pub required: u32,
    pub options: Vec<ContainerOption>,
    quantities: BTreeMap<i64, u32>,
}

impl SelectionLine {
    fn new(item: &OrderLineItem, product_id: i64, options: Vec<ContainerOption>) -> Self {
        let quantities = options.iter().map(|o| (o.id, 0)).collect();
        Self {
            product_id,
            product_name: item.name.clone(),
            required: item.quantity,
            options,
            quantities,
        }
    }

    pub fn selected(&self, container_id: i64) -> u32 {
        self.quantities.get(&container_id).copied().unwrap_or(0)
    }

    pub fn selected_total(&self) -> u32 {
        self.quantities.values().sum()
    }

    /// A line with no options and a non-zero requirement can never reach
    /// completeness; callers must surface it instead of submitting.
    pub fn is_blocked(&self) -> bool {
        self.options.is_empty() && self.required > 0
    }

    fn is_complete(&self) -> bool {
        self.selected_total() == self.required
    }
}

/// In-progress reconciliation state for one order. Created zeroed when
/// manual selection begins, mutated by increment/decrement actions,
/// consumed once to build the settlement payload.
#[derive(Debug, Clone, Default)]
pub struct ReturnSelection {
    lines: Vec<SelectionLine>,
}

impl ReturnSelection {
    /// Build a zero-quantity selection from eligible items and their
    /// resolved container options. Items without a product id cannot be
    /// reconciled and are skipped.
    pub fn new(items: &[(OrderLineItem, Vec<ContainerOption>)]) -> Self {
        let lines = items
            .iter()
            .filter_map(|(item, options)| {
                item.product_id
                    .map(|id| SelectionLine::new(item, id, options.clone()))
            })
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[SelectionLine] {
        &self.lines
    }

    pub fn line(&self, product_id: i64) -> Option<&SelectionLine> {
        self.lines.iter().find(|l| l.product_id == product_id)
    }

    /// Apply a +1/-1 step to one (product, container) pair.
    ///
    /// The candidate quantity is clamped at a floor of 0; if the sum over
    /// the product's other containers plus the candidate would exceed the
    /// required quantity, the state is left unchanged and `false` is
    /// returned.
    pub fn increment(&mut self, product_id: i64, container_id: i64, delta: i32) -> bool {
        let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product_id) else {
            return false;
        };
        if !line.quantities.contains_key(&container_id) {
            return false;
        }

        let current = line.selected(container_id);
        let other_total: u32 = line
            .quantities
            .iter()
            .filter(|(id, _)| **id != container_id)
            .map(|(_, q)| q)
            .sum();

        let candidate = current.saturating_add_signed(delta);

        if other_total + candidate > line.required {
            return false;
        }

        line.quantities.insert(container_id, candidate);
        true
    }

    /// True iff every line's selected total equals its required quantity
    /// exactly. Submission is blocked until this holds.
    pub fn is_complete(&self) -> bool {
        self.lines.iter().all(|l| l.is_complete())
    }

    /// Lines that can never reach completeness because no container
    /// option was found for them.
    pub fn blocked_lines(&self) -> Vec<&SelectionLine> {
        self.lines.iter().filter(|l| l.is_blocked()).collect()
    }

    /// Build the settlement payload. Only quantities > 0 are emitted;
    /// products with no positive entry are omitted entirely.
    pub fn to_payload(&self) -> ReturnPayload {
        let mut payload = ReturnPayload::new();
        for line in &self.lines {
            let entries: Vec<ContainerReturn> = line
                .quantities
                .iter()
                .filter(|(_, q)| **q > 0)
                .map(|(id, q)| ContainerReturn {
                    container_id: *id,
                    quantity: *q,
                })
                .collect();
            if !entries.is_empty() {
                payload.insert(line.product_id.to_string(), entries);
            }
        }
        payload
    }
}
