// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-threaded run loop.
//!
//! Drives all daemon I/O from one thread: fd readiness through a `mio::Poll`
//! and timer expirations through a deadline heap (the poll timeout is the time
//! to the next deadline). Components register interest through a shared
//! [`Handle`] and are called back with no loop state borrowed, so a callback
//! is free to register or cancel further sources.

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use std::cell::{Cell, RefCell};
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Callback invoked when a source is ready or a timer expires.
pub type Callback = Rc<dyn Fn()>;

/// Identifier for a timer registered with [`Handle::add_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// Maximum fd events processed per poll wakeup.
const MAX_EVENTS: usize = 64;

struct TimerEntry {
    period: Option<Duration>,
    callback: Callback,
}

#[derive(Default)]
struct TimerQueue {
    /// Min-heap of (deadline, id); stale entries are skipped lazily
    heap: BinaryHeap<std::cmp::Reverse<(Instant, u64)>>,
    entries: HashMap<u64, TimerEntry>,
    next_id: u64,
}

/// Shared registration handle for the run loop.
///
/// Cheap to clone via `Rc`; components keep one to add fd watches and timers.
pub struct Handle {
    registry: Registry,
    sources: RefCell<HashMap<Token, Callback>>,
    timers: RefCell<TimerQueue>,
    next_token: Cell<usize>,
    quit: Cell<bool>,
}

impl Handle {
    /// Watch `fd` for readability; `callback` runs once per readiness event.
    ///
    /// The fd must stay open until [`Handle::remove_fd`] is called for the
    /// returned token.
    pub fn add_fd(&self, fd: RawFd, callback: Callback) -> io::Result<Token> {
        let token = Token(self.next_token.get());
        self.next_token.set(token.0 + 1);

        self.registry
            .register(&mut SourceFd(&fd), token, Interest::READABLE)?;
        self.sources.borrow_mut().insert(token, callback);
        Ok(token)
    }

    /// Stop watching a previously added fd.
    pub fn remove_fd(&self, fd: RawFd, token: Token) -> io::Result<()> {
        self.sources.borrow_mut().remove(&token);
        self.registry.deregister(&mut SourceFd(&fd))
    }

    /// Arm a timer that first fires after `period`.
    ///
    /// Periodic timers re-arm themselves until cancelled; one-shot timers are
    /// removed after firing.
    pub fn add_timer(&self, period: Duration, periodic: bool, callback: Callback) -> TimerId {
        let mut timers = self.timers.borrow_mut();
        let id = timers.next_id;
        timers.next_id += 1;

        timers.entries.insert(
            id,
            TimerEntry {
                period: periodic.then_some(period),
                callback,
            },
        );
        timers
            .heap
            .push(std::cmp::Reverse((Instant::now() + period, id)));
        TimerId(id)
    }

    /// Cancel a timer. Cancelling an already-fired one-shot timer is a no-op.
    pub fn cancel_timer(&self, id: TimerId) {
        self.timers.borrow_mut().entries.remove(&id.0);
    }

    /// Ask the loop to exit after the current dispatch pass.
    pub fn shutdown(&self) {
        self.quit.set(true);
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.quit.get()
    }

    /// Time until the earliest armed timer, if any.
    fn next_timeout(&self) -> Option<Duration> {
        let mut timers = self.timers.borrow_mut();
        loop {
            let &std::cmp::Reverse((deadline, id)) = timers.heap.peek()?;
            if !timers.entries.contains_key(&id) {
                timers.heap.pop();
                continue;
            }
            return Some(deadline.saturating_duration_since(Instant::now()));
        }
    }

    /// Collect callbacks for all timers due at `now`, rescheduling periodic
    /// ones. Callers invoke the callbacks with no borrow held.
    fn take_due_timers(&self, now: Instant) -> Vec<Callback> {
        let mut due = Vec::new();
        let mut timers = self.timers.borrow_mut();

        while let Some(&std::cmp::Reverse((deadline, id))) = timers.heap.peek() {
            if deadline > now {
                break;
            }
            timers.heap.pop();

            let Some(entry) = timers.entries.get(&id) else {
                continue; // cancelled
            };
            due.push(Rc::clone(&entry.callback));

            match entry.period {
                Some(period) => {
                    timers.heap.push(std::cmp::Reverse((now + period, id)));
                }
                None => {
                    timers.entries.remove(&id);
                }
            }
        }

        due
    }
}

/// The run loop itself; owns the `mio::Poll` instance.
pub struct RunLoop {
    poll: Poll,
    handle: Rc<Handle>,
}

impl RunLoop {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;

        Ok(Self {
            poll,
            handle: Rc::new(Handle {
                registry,
                sources: RefCell::new(HashMap::new()),
                timers: RefCell::new(TimerQueue::default()),
                next_token: Cell::new(0),
                quit: Cell::new(false),
            }),
        })
    }

    /// The registration handle shared with components.
    pub fn handle(&self) -> Rc<Handle> {
        Rc::clone(&self.handle)
    }

    /// Run until [`Handle::shutdown`] is called.
    pub fn run(&mut self) -> io::Result<()> {
        while !self.handle.is_shutdown() {
            self.run_once(self.handle.next_timeout())?;
        }
        Ok(())
    }

    /// One poll-and-dispatch pass, waiting at most `timeout` for events.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let mut events = Events::with_capacity(MAX_EVENTS);

        match self.poll.poll(&mut events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        for event in events.iter() {
            // clone out of the map so the callback can add/remove sources
            let callback = self.handle.sources.borrow().get(&event.token()).cloned();
            if let Some(callback) = callback {
                callback();
            }
        }

        for callback in self.handle.take_due_timers(Instant::now()) {
            callback();
        }

        Ok(())
    }
}

/// Route `SIGINT`/`SIGTERM` into the run loop as a shutdown request.
///
/// The signals are blocked for the process and delivered through a signalfd
/// watched by the loop, so termination interrupts the poll rather than any
/// in-flight syscall.
pub fn watch_quit_signals(handle: &Rc<Handle>) -> io::Result<()> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask.thread_block().map_err(io::Error::from)?;

    let sfd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK | SfdFlags::SFD_CLOEXEC)
        .map_err(io::Error::from)?;
    let fd = sfd.as_raw_fd();

    let sfd = RefCell::new(sfd);
    let loop_handle = Rc::downgrade(handle);
    handle.add_fd(
        fd,
        Rc::new(move || {
            // drain the pending signal so the fd goes quiet again
            while let Ok(Some(info)) = sfd.borrow_mut().read_signal() {
                log::warn!("received signal {}, terminating", info.ssi_signo);
            }
            if let Some(handle) = loop_handle.upgrade() {
                handle.shutdown();
            }
        }),
    )?;

    Ok(())
}
