//! In-memory model of a canonical profile: interners, the output builder
//! and typed read views.

pub mod builder;
pub mod interner;
pub mod view;

pub use builder::{LabelValue, ProfileBuilder};
pub use interner::Interner;
pub use view::ProfileView;
