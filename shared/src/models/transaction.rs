//! Transaction Log Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of stock movement recorded by a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Sale,
    Purchase,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Sale => "SALE",
            TransactionType::Purchase => "PURCHASE",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One product affected by a transaction, with the values it was set to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionUpdate {
    pub product_id: String,
    /// Product name at the time of the transaction
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub quantity: u32,
}

/// Append-only audit record of a price/quantity change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// Username of the staff member who initiated the change
    pub initiated_by: String,
    /// Creation time (epoch millis)
    pub created_at: i64,
    pub updates: Vec<TransactionUpdate>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

impl Transaction {
    /// Whether this transaction touches the given product
    pub fn references(&self, product_id: &str) -> bool {
        self.updates.iter().any(|u| u.product_id == product_id)
    }
}
