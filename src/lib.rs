pub mod config;
pub mod constants;
pub mod dispatch;
pub mod logging;
pub mod review;
pub mod store;
pub mod workers;
