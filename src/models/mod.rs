//! Data models for gasrun entities.
//!
//! Each external response shape is deserialized into a private raw struct
//! and converted to a canonical domain type at this boundary; the backend
//! is inconsistent about which of several alias fields is populated
//! (`id` vs `produto_id`, `nome_produto` vs `produto_nome`) and nothing
//! outside this module should have to care.
//!
//! - `Order`, `OrderDetail`, `OrderLineItem`: delivery orders and items
//! - `ContainerGroup`, `ContainerOption`: returnable-container catalog
//! - `Position`, `LocationSample`: driver location telemetry

pub mod container;
pub mod location;
pub mod order;

pub use container::{ContainerGroup, ContainerOption, GroupDetail, GroupProduct};
pub use location::{LocationSample, Position};
pub use order::{Customer, Order, OrderDetail, OrderLineItem, OrderListPage, ReturnCategory};
