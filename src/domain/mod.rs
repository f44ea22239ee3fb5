//! Core trading domain: account/token identity, order and snapshot types,
//! the strategy decision contract, and the error taxonomy the rest of the
//! crate classifies broker/transport failures into.

pub mod account;
pub mod candidate;
pub mod cycle_report;
pub mod errors;
pub mod ports;
pub mod strategy;
pub mod token;
pub mod trading;
