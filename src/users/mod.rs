pub mod directory;
pub mod models;

pub use directory::UserDirectory;
pub use models::{Bot, Presence, Role, User, UserUpdate};
