//! Protobuf schemas for the two supported profile formats.
//!
//! Both modules are checked-in prost output; regenerate them when the
//! companion `.proto` files change. Inputs are uncompressed byte strings,
//! callers handle decompression.

use crate::error::{ProfileError, Result};
use prost::Message;

/// The legacy pprof schema. Ids are opaque u64s assigned by the producer.
pub mod pprof {
    include!("perftools.pprof.rs");
}

mod canonical {
    include!("profile.rs");
}

pub use canonical::{
    label, Binary, Function, InlineChain, Label, LabelFilter, MergeOptions, Profile, Sample,
    SampleKey, SourceLine, Stack, StackFrame, StackKind, StackSegment, Thread, ValueType,
};

/// Decodes a canonical profile from protobuf bytes.
pub fn parse_profile(bytes: &[u8]) -> Result<Profile> {
    Profile::decode(bytes).map_err(ProfileError::parse)
}

/// Decodes a legacy pprof profile from protobuf bytes.
pub fn parse_pprof(bytes: &[u8]) -> Result<pprof::Profile> {
    pprof::Profile::decode(bytes).map_err(ProfileError::parse)
}

/// Encodes a canonical profile to protobuf bytes.
pub fn serialize_profile(profile: &Profile) -> Vec<u8> {
    profile.encode_to_vec()
}

/// Encodes a legacy pprof profile to protobuf bytes.
pub fn serialize_pprof(profile: &pprof::Profile) -> Vec<u8> {
    profile.encode_to_vec()
}

/// Decodes merge options from protobuf bytes.
pub fn parse_merge_options(bytes: &[u8]) -> Result<MergeOptions> {
    MergeOptions::decode(bytes).map_err(ProfileError::parse)
}
