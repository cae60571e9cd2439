//! `SeaORM` Entity prelude

pub use super::deliveries::Entity as Deliveries;
pub use super::orders::Entity as Orders;
pub use super::transactions::Entity as Transactions;
