mod compact_map;

pub mod capi;
pub mod error;
pub mod flat;
pub mod merge;
pub mod pprof;
pub mod profile;
pub mod schema;
pub mod validate;

pub use crate::error::{ProfileError, Result};
pub use crate::merge::manager::{MergeManager, MergeSession};
pub use crate::merge::parallel::{ParallelMergerOptions, ParallelProfileMerger};
pub use crate::merge::{merge_profiles, ProfileMerger};
pub use crate::pprof::{convert_from_pprof, convert_to_pprof};
pub use crate::schema::{parse_pprof, parse_profile, serialize_pprof, serialize_profile};
