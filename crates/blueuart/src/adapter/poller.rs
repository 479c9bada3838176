//! Background polling thread
//!
//! Holds only a weak reference, so dropping the last [`Adapter`] ends the
//! thread on its next pass.

use super::{Adapter, Shared};
use log::{debug, warn};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) struct Poller {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub(crate) fn spawn(shared: Weak<Shared>, interval: Duration) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("blueuart-poll".to_string())
            .spawn(move || {
                debug!("poller started");
                while flag.load(Ordering::Acquire) {
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    let adapter = Adapter::from_shared(shared);
                    let busy = match adapter.poll() {
                        Ok(busy) => busy,
                        Err(err) => {
                            warn!("poll failed: {}", err);
                            false
                        }
                    };
                    drop(adapter);

                    if !busy {
                        thread::sleep(interval);
                    }
                }
                debug!("poller stopped");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.handle.take() {
            // The last adapter handle can be released by the poller itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("poller thread panicked");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
