// Poll loop - The coarse recurring timer that drives the beat scheduler

use crossbeam_channel::{Sender, bounded, select, tick};
use log::{debug, error};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A background thread calling `on_tick` immediately and then every `interval`
///
/// Stopping (or dropping) the loop joins the thread, so once `stop` returns no
/// further tick can run. Owners replace the loop rather than running two.
pub struct PollLoop {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl PollLoop {
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("beat-scheduler".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                on_tick();
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => on_tick(),
                    }
                }
            })?;

        debug!("Poll loop started ({interval:?})");

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Stop ticking and wait for the thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Poll loop thread panicked");
            }
            debug!("Poll loop stopped");
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
