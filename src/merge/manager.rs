//! Session-oriented wrappers around the parallel merger, matching the
//! lifecycle the FFI layer exposes.

use crate::error::{ProfileError, Result};
use crate::merge::parallel::{ParallelMergerOptions, ParallelProfileMerger};
use crate::schema::{MergeOptions, Profile};

/// One merge session: profiles go in, one merged profile comes out.
pub struct MergeSession {
    merger: Option<ParallelProfileMerger>,
}

impl MergeSession {
    fn new(options: ParallelMergerOptions) -> Self {
        Self {
            merger: Some(ParallelProfileMerger::new(options)),
        }
    }

    pub fn add_profile(&mut self, profile: Profile) -> Result<()> {
        match self.merger.as_mut() {
            Some(merger) => merger.add(profile),
            None => Err(ProfileError::Misuse),
        }
    }

    /// Finalizes the session. The session is spent afterwards: further
    /// calls report `Misuse`.
    pub fn finish(&mut self) -> Result<Profile> {
        match self.merger.take() {
            Some(merger) => merger.finish(),
            None => Err(ProfileError::Misuse),
        }
    }
}

/// Hands out merge sessions with a fixed concurrency level.
pub struct MergeManager {
    thread_count: u32,
}

impl MergeManager {
    pub fn new(thread_count: u32) -> Self {
        Self {
            thread_count: thread_count.max(1),
        }
    }

    pub fn start_session(&self, options: MergeOptions) -> MergeSession {
        MergeSession::new(ParallelMergerOptions {
            merge_options: options,
            concurrency_level: self.thread_count,
            buffer_size: self.thread_count * 2,
        })
    }
}
