pub mod order;
pub mod snapshot;

pub use order::{OrderRequest, OrderResult, OrderSide, OrderValidationError, PriceMode};
pub use snapshot::{AccountSnapshot, PendingOrder, Position};
