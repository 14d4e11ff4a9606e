//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ViewerService`: Feeds client events into the aggregator and renders updates

mod viewer;

pub use viewer::ViewerService;
