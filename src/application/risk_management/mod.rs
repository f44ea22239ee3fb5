pub mod previous_day_handler;

pub use previous_day_handler::{CarryOverPolicy, PreviousDayBalanceHandler, RetentionRule};
