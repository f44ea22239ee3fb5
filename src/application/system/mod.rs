//! Schedule gating (market hours, sentinel-file / Ctrl-C stop signal) and
//! cooperative-shutdown bookkeeping.

pub mod schedule_controller;
pub mod shutdown_service;

pub use schedule_controller::{ScheduleController, ScheduleControllerConfig, StopState};
pub use shutdown_service::ShutdownService;
