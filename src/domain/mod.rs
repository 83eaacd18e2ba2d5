pub mod user;
pub mod payment;
pub mod therapy_session;

pub use user::*;
pub use payment::*;
pub use therapy_session::*;
