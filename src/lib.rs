pub mod bouncer;
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod logging;
pub mod stats;
pub mod storage;
pub mod transport;
pub mod twitch;
pub mod users;

pub use crate::bouncer::{Bouncer, Collaborators, ConnectionState};
pub use crate::config::{BouncerOptions, Configuration};
pub use crate::diagnostics::Host;
pub use crate::stats::Stats;
pub use crate::users::{Bot, Role, User};
