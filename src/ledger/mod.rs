pub mod book;
pub mod rules;

pub use book::{Ledger, Overdraft};
pub use rules::{calculate_decay_amount, percentage_deduction};
