pub mod sinks;
pub mod state;
pub mod store;


pub use sinks::PostSink;
pub use state::HarvestState;
pub use store::StateStore;
