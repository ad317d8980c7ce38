pub mod confirmation;
pub mod fare;
pub mod mock;
pub mod models;
pub mod poller;
pub mod sell;
pub mod status;

pub use confirmation::{ConfirmationStep, SessionRegistry};
pub use fare::FareComparison;
pub use models::OrderDisplay;
pub use poller::InstantIssuePoller;
pub use sell::SellPipeline;
