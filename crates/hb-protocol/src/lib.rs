pub mod commands;
pub mod resources;
pub mod sms;
pub mod topics;

pub use commands::*;
pub use resources::*;
pub use sms::*;
