pub mod auth;
pub mod payments;
pub mod root;
