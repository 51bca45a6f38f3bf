//! Wiring of process termination triggers to an [`ExitCascade`].
//!
//! [`FaultGuard::install`] is the one place where process-global state is
//! touched. It registers:
//!
//! | Trigger | Source | Behaviour |
//! |---------|--------|-----------|
//! | normal exit | `atexit` | cascade runs inline |
//! | `SIGINT`, `SIGTSTP` | terminal | watcher runs cascade, process exits 1 |
//! | `SIGABRT` | `abort()`, allocator corruption checks | as above, faulting thread parked |
//! | `SIGSEGV` | invalid memory access | fault address logged, then as above |
//! | panic | any thread | cascade runs in the panicking thread |
//!
//! Signal handlers only store atomics and `write(2)` one byte into a
//! self-pipe. A normal thread (the fault watcher) reads it, logs, runs the
//! cascade and terminates the process. Handlers for fatal signals never
//! return: they park (`nanosleep`, async-signal-safe) until the watcher
//! reports completion or `shutdown_timeout_ms` elapses, then `_exit(1)`. An
//! expired timeout is reported on stderr with a raw `write(2)`.
//!
//! Dropping the guard restores default signal dispositions, detaches the
//! cascade from `atexit`/panic triggers and stops the watcher. The write end
//! of the self-pipe is closed only once no signal handler is inside
//! `notify_watcher`.

use crate::error::{SchedError, SchedResult};
use crate::exit::{ExitCascade, ExitPhase};
use evo_common::config::FaultConfig;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Process exit code after a signal-triggered cascade.
pub const FAULT_EXIT_CODE: i32 = 1;

const INTERACTIVE_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGTSTP];
const FATAL_SIGNALS: [Signal; 2] = [Signal::SIGABRT, Signal::SIGSEGV];

/// Cascade reachable from `atexit` and the panic hook.
static ACTIVE: Mutex<Option<Arc<ExitCascade>>> = parking_lot::const_mutex(None);

// Signal-context state. Only atomics; no locks, no allocation.
static NOTIFY_FD: AtomicI32 = AtomicI32::new(-1);
/// Signal handlers currently between loading `NOTIFY_FD` and their `write(2)`.
static NOTIFY_WRITERS: AtomicUsize = AtomicUsize::new(0);
static FAULT_ADDR: AtomicUsize = AtomicUsize::new(0);
static CASCADE_FINISHED: AtomicBool = AtomicBool::new(false);
static SHUTDOWN_TIMEOUT_MS: AtomicU64 = AtomicU64::new(0);

static PROCESS_HOOKS: Once = Once::new();

/// Write the signal number into the self-pipe.
fn notify_watcher(signum: libc::c_int) -> bool {
    // SeqCst pairs with the store-then-check in `detach_notify_fd`.
    NOTIFY_WRITERS.fetch_add(1, Ordering::SeqCst);
    let fd = NOTIFY_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = signum as u8;
        // SAFETY: write(2) is async-signal-safe; `byte` lives across the call.
        unsafe { libc::write(fd, (&byte as *const u8).cast(), 1) };
    }
    NOTIFY_WRITERS.fetch_sub(1, Ordering::SeqCst);
    fd >= 0
}

/// Raw stderr write, usable from signal context.
fn write_stderr(msg: &[u8]) {
    // SAFETY: write(2) is async-signal-safe; `msg` lives across the call.
    unsafe { libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len()) };
}

/// Park the faulting thread until the cascade finished or the timeout hit.
///
/// Returns `false` on timeout.
fn park_until_finished() -> bool {
    let tick = libc::timespec {
        tv_sec: 0,
        tv_nsec: 1_000_000,
    };
    let timeout_ms = SHUTDOWN_TIMEOUT_MS.load(Ordering::Relaxed);
    for _ in 0..timeout_ms {
        if CASCADE_FINISHED.load(Ordering::Acquire) {
            return true;
        }
        // SAFETY: nanosleep is async-signal-safe.
        unsafe { libc::nanosleep(&tick, std::ptr::null_mut()) };
    }
    CASCADE_FINISHED.load(Ordering::Acquire)
}

extern "C" fn on_interactive_signal(signum: libc::c_int) {
    notify_watcher(signum);
}

extern "C" fn on_fatal_signal(
    signum: libc::c_int,
    info: *mut libc::siginfo_t,
    _ctx: *mut libc::c_void,
) {
    if signum == libc::SIGSEGV && !info.is_null() {
        // SAFETY: the kernel hands us a valid siginfo_t for SA_SIGINFO handlers.
        let addr = unsafe { (*info).si_addr() } as usize;
        FAULT_ADDR.store(addr, Ordering::Release);
    }
    if notify_watcher(signum) && !park_until_finished() {
        write_stderr(b"evo-scheduler: exit cascade did not finish within shutdown_timeout_ms\n");
    }
    // SAFETY: _exit is async-signal-safe and never returns.
    unsafe { libc::_exit(FAULT_EXIT_CODE) }
}

extern "C" fn run_cascade_at_exit() {
    let cascade = ACTIVE.lock().clone();
    if let Some(cascade) = cascade {
        cascade.run();
    }
}

/// Register the `atexit` hook and chain the panic hook. Once per process.
fn install_process_hooks() {
    PROCESS_HOOKS.call_once(|| {
        // SAFETY: registering a plain extern "C" fn with no captured state.
        if unsafe { libc::atexit(run_cascade_at_exit) } != 0 {
            warn!("atexit registration failed; normal exit will not run the cascade");
        }

        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            previous(info);
            let cascade = ACTIVE.lock().clone();
            if let Some(cascade) = cascade {
                error!("panic: {info}");
                cascade.run();
            }
        }));
    });
}

fn set_handlers() -> SchedResult<()> {
    let interactive = SigAction::new(
        SigHandler::Handler(on_interactive_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    let fatal = SigAction::new(
        SigHandler::SigAction(on_fatal_signal),
        SaFlags::SA_SIGINFO | SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    for sig in INTERACTIVE_SIGNALS {
        // SAFETY: the handler only touches atomics and write(2).
        unsafe { sigaction(sig, &interactive) }?;
    }
    for sig in FATAL_SIGNALS {
        // SAFETY: the handler only touches atomics, write(2), nanosleep and _exit.
        unsafe { sigaction(sig, &fatal) }?;
    }
    Ok(())
}

fn restore_default_handlers() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for sig in INTERACTIVE_SIGNALS.into_iter().chain(FATAL_SIGNALS) {
        // SAFETY: restoring SIG_DFL.
        if let Err(e) = unsafe { sigaction(sig, &default) } {
            warn!("failed to restore default handler for {sig}: {e}");
        }
    }
}

/// Unpublish the pipe fd and wait out handlers that already loaded it.
fn detach_notify_fd() {
    NOTIFY_FD.store(-1, Ordering::SeqCst);
    while NOTIFY_WRITERS.load(Ordering::SeqCst) != 0 {
        std::hint::spin_loop();
    }
}

/// Let a concurrent cascade (another trigger got there first) finish.
fn wait_for_cascade(cascade: &ExitCascade, timeout: Duration) {
    let start = Instant::now();
    while cascade.phase() != ExitPhase::Done && start.elapsed() < timeout {
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn watch(mut pipe: File, cascade: Arc<ExitCascade>, timeout: Duration, terminate: fn(i32)) {
    let mut buf = [0u8; 1];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => {
                debug!("fault watcher detached");
                return;
            }
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("fault watcher pipe failed: {e}");
                return;
            }
        }
    }

    match Signal::try_from(buf[0] as libc::c_int) {
        Ok(Signal::SIGSEGV) => error!(
            "Caught segfault at address {:#x}",
            FAULT_ADDR.load(Ordering::Acquire)
        ),
        Ok(Signal::SIGABRT) => error!("Caught SIGABRT"),
        Ok(sig) => warn!("Caught signal {sig}"),
        Err(_) => warn!("Caught signal {}", buf[0]),
    }

    if !cascade.run() {
        wait_for_cascade(&cascade, timeout);
    }
    CASCADE_FINISHED.store(true, Ordering::Release);
    terminate(FAULT_EXIT_CODE);
}

fn exit_process(code: i32) {
    std::process::exit(code);
}

/// Active binding of an [`ExitCascade`] to process termination triggers.
///
/// At most one guard exists per process.
pub struct FaultGuard {
    cascade: Arc<ExitCascade>,
    notify_tx: Option<OwnedFd>,
    watcher: Option<JoinHandle<()>>,
}

impl FaultGuard {
    /// Install all triggers; signal-triggered shutdowns end in
    /// `std::process::exit(1)`.
    ///
    /// # Errors
    /// `SchedError::Config` if `config` fails validation,
    /// `SchedError::FaultGuardInstalled` if another guard is active.
    pub fn install(cascade: Arc<ExitCascade>, config: &FaultConfig) -> SchedResult<Self> {
        Self::install_with(cascade, config, exit_process)
    }

    /// Like [`FaultGuard::install`], with a custom final action for
    /// signal-triggered shutdowns, called with the exit code after the
    /// cascade completed.
    pub fn install_with(
        cascade: Arc<ExitCascade>,
        config: &FaultConfig,
        terminate: fn(i32),
    ) -> SchedResult<Self> {
        config.validate()?;
        let mut active = ACTIVE.lock();
        if active.is_some() {
            return Err(SchedError::FaultGuardInstalled);
        }

        let (rx, tx) = nix::unistd::pipe()?;
        let timeout = Duration::from_millis(config.shutdown_timeout_ms);
        let watcher_cascade = cascade.clone();
        let watcher = std::thread::Builder::new()
            .name("evo-fault-watch".to_string())
            .spawn(move || watch(File::from(rx), watcher_cascade, timeout, terminate))?;

        CASCADE_FINISHED.store(false, Ordering::Release);
        FAULT_ADDR.store(0, Ordering::Release);
        SHUTDOWN_TIMEOUT_MS.store(config.shutdown_timeout_ms, Ordering::Relaxed);
        NOTIFY_FD.store(tx.as_raw_fd(), Ordering::Release);

        install_process_hooks();
        if let Err(e) = set_handlers() {
            restore_default_handlers();
            detach_notify_fd();
            return Err(e);
        }

        *active = Some(cascade.clone());
        debug!("fault guard installed ({:?})", cascade);

        Ok(Self {
            cascade,
            notify_tx: Some(tx),
            watcher: Some(watcher),
        })
    }

    /// The cascade this guard triggers.
    pub fn cascade(&self) -> &Arc<ExitCascade> {
        &self.cascade
    }
}

impl Drop for FaultGuard {
    fn drop(&mut self) {
        restore_default_handlers();
        detach_notify_fd();
        *ACTIVE.lock() = None;

        // Closing the write end hands the watcher EOF.
        drop(self.notify_tx.take());
        if let Some(watcher) = self.watcher.take() {
            if watcher.join().is_err() {
                warn!("fault watcher panicked");
            }
        }
    }
}
