pub mod disputable;
pub mod engine;
pub mod quorum;

pub use disputable::{Disputable, SettledItem};
pub use engine::{DeskSettings, DisputeDesk};
pub use quorum::Tally;
