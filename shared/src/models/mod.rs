//! Data models shared by the synchronizer, the mutation operations and the UI

pub mod product;
pub mod staff;
pub mod sync;
pub mod transaction;

pub use product::{ImageUpload, Product, ProductCreate, StockAdjustment};
pub use staff::StaffUser;
pub use sync::{ChangeBatch, ChangeKind, DocumentChange, SyncEvent, WriteStatus};
pub use transaction::{Transaction, TransactionType, TransactionUpdate};
