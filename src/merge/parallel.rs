//! Bounded-buffer fan-in over several mergers.
//!
//! Inputs are pushed into a bounded queue and drained by worker threads,
//! each owning its own [`ProfileMerger`]. `finish` closes the queue, joins
//! the workers and tree-reduces their partial outputs: adjacent pairs
//! combine in ascending worker-index order, each combine finishing the
//! higher-indexed merger and adding its output into the lower-indexed one.
//! Worker 0's merger is always the final writer, so given identical inputs
//! in identical submission order the output is byte-stable.

use crate::error::{ProfileError, Result};
use crate::merge::ProfileMerger;
use crate::schema::{MergeOptions, Profile};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::JoinHandle;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct ParallelMergerOptions {
    pub merge_options: MergeOptions,
    /// Number of worker mergers.
    pub concurrency_level: u32,
    /// Pending-queue capacity; producers block on push when it is full.
    /// `2 * concurrency_level` is a good default.
    pub buffer_size: u32,
}

struct Worker {
    index: u32,
    merger: ProfileMerger,
}

pub struct ParallelProfileMerger {
    sender: Option<Sender<Profile>>,
    workers: Vec<JoinHandle<Worker>>,
}

impl ParallelProfileMerger {
    /// Starts the worker threads and the reduction pipeline.
    pub fn new(options: ParallelMergerOptions) -> Self {
        let concurrency = options.concurrency_level.max(1);
        let (sender, receiver) = bounded(options.buffer_size.max(1) as usize);

        let workers = (0..concurrency)
            .map(|index| {
                let receiver: Receiver<Profile> = receiver.clone();
                let merge_options = options.merge_options.clone();
                std::thread::spawn(move || {
                    let mut worker = Worker {
                        index,
                        merger: ProfileMerger::new(merge_options),
                    };
                    while let Ok(profile) = receiver.recv() {
                        // A failed add poisons the merger, which keeps
                        // draining so producers never block on a dead
                        // queue; finish reports the first error.
                        let _ = worker.merger.add(&profile);
                    }
                    worker
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Queues one profile for merging, blocking while the buffer is full.
    pub fn add(&mut self, profile: Profile) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(ProfileError::Misuse)?;
        sender.send(profile).map_err(|_| {
            ProfileError::Internal("all merge workers exited early".to_string())
        })
    }

    /// Closes the queue, waits for the workers to drain it and reduces
    /// their partial profiles into the final output.
    pub fn finish(mut self) -> Result<Profile> {
        self.sender.take();

        let mut round: Vec<Worker> = Vec::with_capacity(self.workers.len());
        for handle in self.workers.drain(..) {
            let worker = handle
                .join()
                .map_err(|_| ProfileError::Internal("merge worker panicked".to_string()))?;
            round.push(worker);
        }

        while round.len() > 1 {
            debug!("Reducing {} partial profiles", round.len());
            let mut next = Vec::with_capacity((round.len() + 1) / 2);
            let mut pairs = Vec::new();
            let mut iter = round.into_iter();
            while let Some(lhs) = iter.next() {
                match iter.next() {
                    Some(rhs) => pairs.push((lhs, rhs)),
                    None => next.push(lhs),
                }
            }

            let mut combined = std::thread::scope(|scope| {
                let handles: Vec<_> = pairs
                    .into_iter()
                    .map(|(lhs, rhs)| scope.spawn(move || combine(lhs, rhs)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle.join().map_err(|_| {
                            ProfileError::Internal("merge combiner panicked".to_string())
                        })
                    })
                    .collect::<Result<Vec<Worker>>>()
            })?;

            // The odd worker out, if any, carries the highest index.
            combined.append(&mut next);
            round = combined;
        }

        let root = round
            .pop()
            .ok_or_else(|| ProfileError::Internal("no merge workers".to_string()))?;
        debug_assert_eq!(root.index, 0);
        root.merger.finish()
    }
}

impl Drop for ParallelProfileMerger {
    fn drop(&mut self) {
        // Close the queue so detached workers drain and exit; their
        // partial outputs are discarded.
        self.sender.take();
    }
}

/// Finishes the higher-indexed merger and folds its output into the
/// lower-indexed one, which stays open. Order is preserved so worker 0's
/// merger ends up writing the final profile.
fn combine(lhs: Worker, rhs: Worker) -> Worker {
    if lhs.index > rhs.index {
        return combine(rhs, lhs);
    }
    let mut lhs = lhs;
    match rhs.merger.finish() {
        // A failed add poisons lhs on its own.
        Ok(profile) => {
            let _ = lhs.merger.add(&profile);
        }
        Err(err) => lhs.merger.poison(err),
    }
    lhs
}
