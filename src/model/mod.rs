pub mod dsref;
pub mod format;
pub mod manifest;
pub mod owner;
pub mod params;
pub mod version;

pub use dsref::*;
pub use format::*;
pub use manifest::{Bindable, BoundValue, FieldKind, FieldSpec};
pub use owner::*;
pub use params::*;
pub use version::*;
