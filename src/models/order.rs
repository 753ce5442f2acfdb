//! Domain models for delivery orders.
//!
//! The order endpoints are inconsistent about field naming: an item's id
//! may arrive in `id` or `produto_id`, its name in `nome_produto` or
//! `produto_nome`, its price in `preco_unitario` or `valor_unitario`.
//! Raw structs capture every variant and the `From` conversions pick the
//! populated one once, here, so downstream code never branches on it.

use serde::{Deserialize, Serialize};

/// Categories whose packaging is physically returned by the customer.
/// Items outside this set are never reconciled even when the backend
/// flags them `retorna_botija`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReturnCategory {
    GasCylinder,
    Water,
    Other(String),
}

impl From<String> for ReturnCategory {
    fn from(s: String) -> Self {
        match s.as_str() {
            "botija_gas" => ReturnCategory::GasCylinder,
            "agua" => ReturnCategory::Water,
            _ => ReturnCategory::Other(s),
        }
    }
}

impl From<ReturnCategory> for String {
    fn from(c: ReturnCategory) -> Self {
        match c {
            ReturnCategory::GasCylinder => "botija_gas".to_string(),
            ReturnCategory::Water => "agua".to_string(),
            ReturnCategory::Other(s) => s,
        }
    }
}

impl ReturnCategory {
    /// Whether items in this category participate in casco reconciliation.
    pub fn is_returnable_category(&self) -> bool {
        matches!(self, ReturnCategory::GasCylinder | ReturnCategory::Water)
    }
}

/// One product line within an order, in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawOrderItem")]
pub struct OrderLineItem {
    /// Missing on some legacy rows; such items cannot be reconciled.
    pub product_id: Option<i64>,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub returnable: bool,
    pub category: ReturnCategory,
}

impl OrderLineItem {
    /// Eligible for casco reconciliation: flagged returnable AND in a
    /// known returnable category.
    pub fn is_reconcilable(&self) -> bool {
        self.returnable && self.category.is_returnable_category()
    }
}

#[derive(Debug, Deserialize)]
struct RawOrderItem {
    id: Option<i64>,
    produto_id: Option<i64>,
    nome_produto: Option<String>,
    produto_nome: Option<String>,
    #[serde(default)]
    quantidade: u32,
    preco_unitario: Option<f64>,
    valor_unitario: Option<f64>,
    #[serde(default)]
    retorna_botija: bool,
    categoria: Option<String>,
}

impl From<RawOrderItem> for OrderLineItem {
    fn from(raw: RawOrderItem) -> Self {
        OrderLineItem {
            product_id: raw.produto_id.or(raw.id),
            name: raw
                .nome_produto
                .or(raw.produto_nome)
                .unwrap_or_default(),
            quantity: raw.quantidade,
            unit_price: raw.preco_unitario.or(raw.valor_unitario).unwrap_or(0.0),
            returnable: raw.retorna_botija,
            category: raw.categoria.map(ReturnCategory::from).unwrap_or_else(|| {
                ReturnCategory::Other(String::new())
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "telefone", default)]
    pub phone: String,
}

impl Default for Customer {
    fn default() -> Self {
        Customer {
            id: 0,
            name: "Cliente não informado".to_string(),
            phone: String::new(),
        }
    }
}

/// An order as returned by the list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawOrder")]
pub struct Order {
    pub id: i64,
    pub customer: Customer,
    pub status: String,
    pub total: f64,
    pub delivery_address: String,
    pub created_at: String,
    pub payment_method: Option<String>,
    pub paid: bool,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    id: i64,
    cliente: Option<Customer>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    valor_total: f64,
    #[serde(default)]
    endereco_entrega: String,
    #[serde(default)]
    criado_em: String,
    forma_pagamento: Option<String>,
    #[serde(default)]
    pagamento_realizado: bool,
}

impl From<RawOrder> for Order {
    fn from(raw: RawOrder) -> Self {
        Order {
            id: raw.id,
            customer: raw.cliente.unwrap_or_default(),
            status: raw.status,
            total: raw.valor_total,
            delivery_address: raw.endereco_entrega,
            created_at: raw.criado_em,
            payment_method: raw.forma_pagamento,
            paid: raw.pagamento_realizado,
        }
    }
}

/// An order with its line items, from the detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawOrderDetail")]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderLineItem>,
}

#[derive(Debug, Deserialize)]
struct RawOrderDetail {
    #[serde(flatten)]
    order: RawOrder,
    #[serde(default)]
    itens: Vec<OrderLineItem>,
}

impl From<RawOrderDetail> for OrderDetail {
    fn from(raw: RawOrderDetail) -> Self {
        OrderDetail {
            order: raw.order.into(),
            items: raw.itens,
        }
    }
}

impl OrderDetail {
    /// Items eligible for casco reconciliation.
    pub fn returnable_items(&self) -> Vec<&OrderLineItem> {
        self.items.iter().filter(|i| i.is_reconcilable()).collect()
    }

    /// Delivery can only be confirmed while the order is out for delivery.
    pub fn can_confirm_delivery(&self) -> bool {
        self.order.status == "em_entrega"
    }
}

/// One page of the driver's order list.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderListPage {
    #[serde(rename = "pedidos")]
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: Option<u32>,
    pub total_pages: Option<u32>,
}
