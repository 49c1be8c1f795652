//! SQL repositories.

pub mod automated_emails;
pub mod tokens;
pub mod transactions;
pub mod users;
