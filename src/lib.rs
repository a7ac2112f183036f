pub mod analysis;
pub mod api;
pub mod collector;
pub mod database;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod retention;
pub mod scheduler;
pub mod sink;
pub mod utils;

pub use error::{CollectorError, CollectorResult, SchedulerError};
