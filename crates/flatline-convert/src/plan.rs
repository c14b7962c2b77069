use std::fmt;
use std::num::NonZeroUsize;
use std::thread;

use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKER_CEILING: usize = 64;

/// How each conversion job is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Shared blocking pool of the async runtime.
    Lightweight,
    /// One dedicated OS thread per job, with a larger stack.
    Heavyweight,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lightweight => f.write_str("lightweight"),
            Self::Heavyweight => f.write_str("heavyweight"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerPlan {
    pub workers: usize,
    pub isolation: Isolation,
}

impl WorkerPlan {
    /// Pick parallelism from the batch shape.
    ///
    /// Few large documents get half the cores on dedicated threads; many
    /// small ones oversubscribe the cores since they are I/O bound.
    pub fn for_batch(avg_mb: f64, count: usize, cores: usize, ceiling: usize) -> Self {
        let cores = cores.max(1);
        let (workers, isolation) = if avg_mb >= 10.0 || (avg_mb >= 2.0 && count >= 50) {
            ((cores / 2).max(2), Isolation::Heavyweight)
        } else if avg_mb < 1.0 {
            ((cores * 4).min(32), Isolation::Lightweight)
        } else {
            ((cores * 2).min(16), Isolation::Lightweight)
        };

        Self {
            workers: workers.min(ceiling).max(1),
            isolation,
        }
    }

    /// Replace the worker count, still bounded by `ceiling`.
    pub fn with_override(self, workers: Option<usize>, ceiling: usize) -> Self {
        match workers {
            Some(n) => Self {
                workers: n.min(ceiling).max(1),
                ..self
            },
            None => self,
        }
    }
}

pub fn available_cores() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
