//! Delayed `ready` flip, cancelled when its owner goes away.

use crate::error::Result;
use crate::store::Store;
use crossbeam_channel::{after, bounded, select, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Sets `ready` to `true` on a store after a delay unless cancelled first.
///
/// Dropping the timer cancels it. Cancelling never waits on the timer
/// thread; the thread re-checks the cancel flag once it holds the store's
/// write lock, so a cancel made while another write holds that lock wins.
pub struct ReadyTimer {
    /// Dropping the sender wakes the timer thread early.
    cancel: Option<Sender<()>>,
    cancelled: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
}

impl ReadyTimer {
    /// Start a timer with an explicit delay.
    pub fn start(store: Arc<Store>, delay: Duration) -> Result<Self> {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicBool::new(false));
        let (cancel_flag, fired_flag) = (Arc::clone(&cancelled), Arc::clone(&fired));

        thread::Builder::new()
            .name("ready-timer".to_string())
            .spawn(move || {
                select! {
                    recv(cancel_rx) -> _ => {
                        tracing::debug!("ready timer cancelled");
                    }
                    recv(after(delay)) -> _ => {
                        let written = store.set_ready_if(true, || {
                            if cancel_flag.load(Ordering::SeqCst) {
                                return false;
                            }
                            fired_flag.store(true, Ordering::SeqCst);
                            true
                        });
                        if !written {
                            tracing::debug!("ready timer cancelled while firing");
                        }
                    }
                }
            })?;

        tracing::debug!(delay_ms = delay.as_millis() as u64, "ready timer started");
        Ok(Self {
            cancel: Some(cancel_tx),
            cancelled,
            fired,
        })
    }

    /// Start a timer with the store's configured `ready_delay_ms`.
    pub fn start_default(store: Arc<Store>) -> Result<Self> {
        let delay = store.config().ready_delay();
        Self::start(store, delay)
    }

    /// True once the timer has set `ready`.
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// True until the timer fires or is cancelled.
    pub fn is_pending(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && !self.fired()
    }

    /// Cancel the pending flip. Safe to call more than once; has no effect
    /// after the timer fired.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        drop(self.cancel.take());
    }
}

impl Drop for ReadyTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
