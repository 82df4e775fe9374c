pub mod session;
pub mod user;

pub use session::{day_key, Phase, Session, SessionMode};
pub use user::User;
