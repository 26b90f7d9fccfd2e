//! Consumer worker and control handshake
//!
//! One long-lived thread is spawned at construction. It parks in an outer
//! wait until the host requests START, then ticks at `frame_interval` by
//! absolute deadline, pulling at most one frame per tick. STOP returns it to
//! the outer wait; EXIT terminates it.
//!
//! Each control request is acknowledged synchronously: the host posts the
//! request, the worker observes it, acts, and raises an ack the host waits
//! on with a bounded timeout. START is idempotent and simply re-acks while
//! the cadence keeps running.
//!
//! Deadlines are absolute (`t0 + k * interval`), not sleep-then-work: a
//! slow sink on one tick shortens the next wait, so the long-run emission
//! rate stays exactly one frame per interval.

use crate::buffer::Shared;
use crate::sink::OutputSink;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Control requests the host can post to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Start,
    Stop,
    Exit,
}

#[derive(Debug, Default)]
struct Flags {
    start: bool,
    stop: bool,
    exit: bool,
    ack: bool,
}

/// Request/ack rendezvous between host and worker.
///
/// A flag word under a mutex with two condvars: the host writes request
/// flags and waits on `ack_cv`; the worker consumes them and raises the ack.
/// At most one of start/stop is pending (the later request overwrites the
/// earlier); exit is terminal and never cleared.
#[derive(Debug)]
pub(crate) struct Control {
    flags: Mutex<Flags>,
    request_cv: Condvar,
    ack_cv: Condvar,
}

impl Control {
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(Flags::default()),
            request_cv: Condvar::new(),
            ack_cv: Condvar::new(),
        }
    }

    /// Host side: post `cmd` and wait for the worker's ack.
    ///
    /// Returns whether the ack arrived within `ack_timeout`. A missed ack is
    /// not fatal; the worker will still act on the request when it runs.
    pub fn request(&self, cmd: Command, ack_timeout: Duration) -> bool {
        {
            let mut flags = self.flags.lock();
            flags.ack = false;
            match cmd {
                Command::Start => {
                    flags.start = true;
                    flags.stop = false;
                }
                Command::Stop => {
                    flags.stop = true;
                    flags.start = false;
                }
                Command::Exit => flags.exit = true,
            }
            self.request_cv.notify_one();
        }

        let mut flags = self.flags.lock();
        !self
            .ack_cv
            .wait_while_for(&mut flags, |f| !f.ack, ack_timeout)
            .timed_out()
    }

    /// Worker side: park until a start or exit request arrives.
    fn wait_start_or_exit(&self) -> Command {
        let mut flags = self.flags.lock();
        self.request_cv
            .wait_while(&mut flags, |f| !f.start && !f.exit);
        if flags.exit {
            Command::Exit
        } else {
            flags.start = false;
            Command::Start
        }
    }

    /// Worker side: wait for any request until `deadline`. `None` means the
    /// deadline passed with nothing pending, i.e. time for the next tick.
    fn next_command_until(&self, deadline: Instant) -> Option<Command> {
        let mut flags = self.flags.lock();
        self.request_cv.wait_while_until(
            &mut flags,
            |f| !f.start && !f.stop && !f.exit,
            deadline,
        );
        if flags.exit {
            Some(Command::Exit)
        } else if flags.stop {
            flags.stop = false;
            Some(Command::Stop)
        } else if flags.start {
            flags.start = false;
            Some(Command::Start)
        } else {
            None
        }
    }

    /// Worker side: confirm the most recent request.
    fn acknowledge(&self) {
        let mut flags = self.flags.lock();
        flags.ack = true;
        self.ack_cv.notify_all();
    }
}

/// Worker thread body.
pub(crate) fn run_consumer(shared: Arc<Shared>, mut sink: Box<dyn OutputSink>, mut scratch: Box<[u8]>) {
    debug!("Jitter buffer consumer thread started");
    'outer: loop {
        match shared.control.wait_start_or_exit() {
            Command::Exit => {
                info!("Jitter buffer consumer exit");
                shared.control.acknowledge();
                break 'outer;
            }
            Command::Stop => continue 'outer,
            Command::Start => {
                shared.control.acknowledge();
                debug!(
                    "Jitter buffer consumer running, interval={:?}",
                    shared.frame_interval
                );
                let mut deadline = Instant::now() + shared.frame_interval;
                'session: loop {
                    // Observe control while waiting out the tick.
                    while let Some(cmd) = shared.control.next_command_until(deadline) {
                        match cmd {
                            Command::Exit => {
                                info!("Jitter buffer consumer exit");
                                shared.control.acknowledge();
                                break 'outer;
                            }
                            Command::Stop => {
                                info!("Jitter buffer consumer stopped");
                                shared.control.acknowledge();
                                break 'session;
                            }
                            // Repeated start: re-ack, keep the cadence.
                            Command::Start => shared.control.acknowledge(),
                        }
                    }
                    deadline += shared.frame_interval;
                    shared.process_once(&mut scratch, sink.as_mut());
                }
            }
        }
    }
    debug!("Jitter buffer consumer thread terminated");
}
