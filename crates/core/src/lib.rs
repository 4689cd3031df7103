pub mod category;
pub mod money;
pub mod transaction;

pub use category::{Category, CategoryError, CategoryRegistry};
pub use money::{Money, MoneyError, SignConvention};
pub use transaction::{short_id, Owner, Source, Transaction};
