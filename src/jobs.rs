//! Background jobs started with `&`.

use crate::external::terminated_status;
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
    pub id: usize,
    pub pid: i32,
}

/// Job leaders that have been started and not yet reaped.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    /// Record a new job leader. Its id is one more than the highest active id.
    pub fn add(&mut self, pid: i32) -> Job {
        let id = self.jobs.iter().map(|job| job.id).max().unwrap_or(0) + 1;
        let job = Job { id, pid };
        self.jobs.push(job);
        job
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Collect finished job leaders without blocking and forget them.
    pub fn reap(&mut self) -> Vec<Job> {
        let mut finished = Vec::new();
        self.jobs.retain(|job| {
            match waitpid(Pid::from_raw(job.pid), Some(WaitPidFlag::WNOHANG)) {
                Ok(status) => match terminated_status(status) {
                    Some(code) => {
                        debug!(
                            job = job.id,
                            pid = job.pid,
                            status = code,
                            "background job finished"
                        );
                        finished.push(*job);
                        false
                    }
                    None => true,
                },
                // Already reaped elsewhere, nothing left to wait for.
                Err(_) => {
                    finished.push(*job);
                    false
                }
            }
        });
        finished
    }
}
