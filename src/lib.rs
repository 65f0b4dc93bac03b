pub mod config;
pub mod criteria;
pub mod eligibility;
pub mod error;
pub mod output;
pub mod patients;
pub mod report;
pub mod server;
pub mod session;
pub mod workflow;

pub use error::{ScreeningError, ScreeningResult};
