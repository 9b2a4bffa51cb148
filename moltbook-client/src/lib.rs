pub mod api;
pub mod metrics;
pub mod normalize;
pub mod pacing;


pub use api::MoltbookClient;
pub use normalize::normalize;
pub use pacing::{PacerConfig, RequestPacer};
