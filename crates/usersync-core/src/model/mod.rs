//! User entity model: wire format, state flags and normalization.

mod record;
mod state;
mod user;

pub use record::{now_millis, UserRecord};
pub use state::UserState;
pub use user::{Envelope, NumericText, User};
