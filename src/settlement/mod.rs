pub mod answers;
pub mod engine;
pub mod payout;

pub use engine::WagerBook;
