pub mod distribution;
pub mod ndc;
pub mod repository;

pub use distribution::{DistributionError, OrderDistribution};
pub use ndc::{Envelope, OrderView, RemoteError};
