//! Returnable-container reconciliation.
//!
//! At delivery confirmation time the engine decides, per eligible line
//! item, whether the returned casco can be chosen automatically (exactly
//! one possible variant) or must be selected by the driver, tracks the
//! driver's incremental selection against each item's required quantity,
//! and produces the settlement payload for the confirmation endpoint.

pub mod engine;
pub mod selection;

pub use engine::{ConfirmationOutcome, DeliveryApi, EngineError, ReconciliationEngine};
pub use selection::{ContainerReturn, ReturnPayload, ReturnSelection, SelectionLine};
