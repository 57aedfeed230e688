pub mod binding;
pub mod commands;
pub mod dispatch;
pub mod extractors;
pub mod handlers;
pub mod routes;

pub use binding::{bind, Bound, RawInput, RawValue};
pub use dispatch::{Command, CommandRegistry, Metadata};
pub use handlers::AppState;
pub use routes::*;
