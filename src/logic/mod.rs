pub mod context;
pub mod log_resolver;
pub mod negotiation;
pub mod pagination;
pub mod read_only;

pub use context::RequestContext;
pub use log_resolver::{HistorySource, LogResolver, Resolution};
pub use negotiation::{negotiate, Negotiated};
pub use pagination::{PageToken, DEFAULT_LIMIT};
