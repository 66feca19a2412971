pub mod next;
pub mod tracking;

pub use next::{Body, NextHandler};
pub use tracking::TrackingPort;
