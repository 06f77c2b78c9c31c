pub mod message;
pub mod profile;

pub use message::{Message, NewMessage};
pub use profile::Profile;
