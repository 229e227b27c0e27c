//! Background eviction of instances that stayed idle too long

use crate::errors::{PoolError, PoolResult};
use crate::pool::Shared;
use crate::resource::Resource;
use crate::store::Slot;

use crossbeam::channel::{self, Sender};
use crossbeam::select;
use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Split drained slots into `(expired, kept)`, keeping the order of each.
///
/// A slot expires once it has been idle strictly longer than `max_idle`.
pub(crate) fn split_expired<T>(
    slots: Vec<Slot<T>>,
    max_idle: Duration,
    now: Instant,
) -> (Vec<Slot<T>>, Vec<Slot<T>>) {
    slots
        .into_iter()
        .partition(|slot| slot.idle_for(now) > max_idle)
}

/// Handle to the reaper thread. Stopping is idempotent.
pub(crate) struct Reaper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Start a thread that runs an eviction cycle every `period`.
    ///
    /// The thread holds only a weak reference and exits on its own once the
    /// pool state is gone.
    pub fn start<R: Resource>(pool: Weak<Shared<R>>, name: &str, period: Duration) -> PoolResult<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(period);
        let pool_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("{}-reaper", name))
            .spawn(move || {
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(shared) = pool.upgrade() else { break };
                            shared.evict_idle();
                        }
                    }
                }
                debug!(pool = %pool_name, "idle reaper stopped");
            })
            .map_err(|e| PoolError::ReaperStart(e.to_string()))?;

        info!(pool = %name, period_ms = period.as_millis() as u64, "idle reaper started");
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for the current cycle to finish
    pub fn stop(&mut self) {
        // disconnecting the channel wakes the select
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}
