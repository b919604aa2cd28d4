//! Daemon harness.
//!
//! One cooperative event loop owns the hidraw descriptor, the decoder, the
//! gesture engine and the device pool. Three sources drive it: the input
//! descriptor (level-triggered, read byte-stream into the decoder), a
//! one-second heartbeat timer (which mutates no touch state; it only checks
//! whether the PID file was deleted as a stop request) and the SIGTERM /
//! SIGINT sources. Every exit path runs the same shutdown tail: timer off,
//! virtual devices closed, PID file removed, exit reason reported.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::Duration;

use calloop::generic::Generic;
use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, Interest, LoopSignal, Mode, PostAction};
use rustix::fs::{Mode as FsMode, OFlags};

use crate::config::Options;
use crate::decoder::{FrameDecoder, MAX_POINTS};
use crate::device::{DeviceError, DevicePool};
use crate::engine::GestureEngine;
use crate::pidfile::PidFile;

/// Heartbeat interval of the watchdog timer.
const HEARTBEAT: Duration = Duration::from_secs(1);

/// Bytes pulled off the descriptor per readiness wakeup.
const READ_CHUNK: usize = 64;

/// An error produced while bringing the daemon up or running its loop.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("cannot open input device {device}: {source}")]
    OpenDevice {
        device: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("event loop: {0}")]
    Loop(#[from] calloop::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

struct State {
    decoder: FrameDecoder,
    engine: GestureEngine,
    pool: DevicePool,
    pidfile: PidFile,
    exit_reason: Option<String>,
    loop_signal: LoopSignal,
}

impl State {
    /// Record the first exit reason and stop the loop at the next iteration
    /// boundary.
    fn quit(&mut self, reason: &str) {
        if self.exit_reason.is_none() {
            self.exit_reason = Some(reason.to_owned());
        }
        self.loop_signal.stop();
    }
}

/// Run the daemon until something asks it to stop. Returns the recorded
/// exit reason; `None` means the loop ended without one.
pub fn run(device_path: &Path, options: Options, pidfile: PidFile) -> Result<Option<String>, DaemonError> {
    let input = open_input(device_path)?;
    let pool = DevicePool::create(MAX_POINTS)?;
    let engine = GestureEngine::new(options, MAX_POINTS);
    let decoder = FrameDecoder::new();

    let mut event_loop: EventLoop<State> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    let timer_token = handle
        .insert_source(Timer::from_duration(HEARTBEAT), |_, _, state: &mut State| {
            // Deleting the PID file is a stop request; a plain tick mutates
            // nothing.
            if !state.pidfile.exists() {
                state.quit("STOP requested - pidfile deleted");
            }
            TimeoutAction::ToDuration(HEARTBEAT)
        })
        .map_err(|err| err.error)?;

    handle
        .insert_source(
            Signals::new(&[Signal::SIGTERM, Signal::SIGINT])?,
            |event, _, state: &mut State| match event.signal() {
                Signal::SIGINT => state.quit("KeyboardInterrupt"),
                _ => state.quit("STOP requested - SIGTERM"),
            },
        )
        .map_err(|err| err.error)?;

    handle
        .insert_source(
            Generic::new(input, Interest::READ, Mode::Level),
            |_, input, state: &mut State| {
                let mut reader: &File = input;
                loop {
                    let mut buf = [0u8; READ_CHUNK];
                    match reader.read(&mut buf) {
                        Ok(0) => {
                            state.quit("input device closed");
                            return Ok(PostAction::Remove);
                        }
                        Ok(n) => {
                            for &byte in &buf[..n] {
                                let Some(frame) = state.decoder.feed(byte) else {
                                    continue;
                                };
                                if let Err(err) = state.engine.handle(frame, &mut state.pool) {
                                    state.quit(&format!("FATAL: {err}"));
                                    return Ok(PostAction::Remove);
                                }
                            }
                            if n < READ_CHUNK {
                                break;
                            }
                        }
                        Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                        Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                        Err(err) => {
                            state.quit(&format!("FATAL: reading input device: {err}"));
                            return Ok(PostAction::Remove);
                        }
                    }
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|err| err.error)?;

    let mut state = State {
        decoder,
        engine,
        pool,
        pidfile,
        exit_reason: None,
        loop_signal: event_loop.get_signal(),
    };

    log::info!("reading touch frames from {}", device_path.display());
    let loop_result = event_loop.run(None, &mut state, |_| {});

    // Shutdown tail, in order: timer, devices, PID file, reason.
    handle.remove(timer_token);
    let State { pool, pidfile, mut exit_reason, .. } = state;
    pool.close();
    drop(pidfile);
    if let Err(err) = loop_result {
        exit_reason.get_or_insert(format!("FATAL: event loop: {err}"));
    }
    Ok(exit_reason)
}

fn open_input(path: &Path) -> Result<File, DaemonError> {
    let flags = OFlags::RDONLY | OFlags::NONBLOCK | OFlags::CLOEXEC;
    match rustix::fs::open(path, flags, FsMode::empty()) {
        Ok(fd) => Ok(File::from(fd)),
        Err(errno) => Err(DaemonError::OpenDevice {
            device: path.display().to_string(),
            source: errno.into(),
        }),
    }
}
