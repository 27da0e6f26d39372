//! Session drivers: connect or accept, feed files through a session, and
//! reconnect on connection-level failures until a stop condition holds.
//!
//! ```text
//! Connecting -> Transferring -> Reconnecting -> Transferring -> ... -> Done
//! ```
//!
//! Stop conditions are checked only between files, so an interrupt never
//! splits a chunk.

use crate::archive::{self, StagedArchive};
use crate::config::{ReceiverConfig, SenderConfig, SourceSpec};
use crate::error::{Error, Result};
use crate::framer::FileHeader;
use crate::fs_enum::PathSource;
use crate::interrupt::Interrupt;
use crate::limit::{Limit, TransferTotals};
use crate::logger::{Logger, NoopLogger};
use crate::net::{self, Acceptor};
use crate::progress::Output;
use crate::protocol::timeouts;
use crate::session::{ReceiveOptions, Role, TransferSession, Transferred};
use crossterm::style::{Color, Stylize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    LimitReached,
    SourceExhausted,
    PeerFinished,
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::LimitReached => "limit reached",
            StopReason::SourceExhausted => "no more files",
            StopReason::PeerFinished => "peer finished",
            StopReason::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub totals: TransferTotals,
    pub transferred: Vec<Transferred>,
    pub skipped: Vec<String>,
    pub reconnects: u32,
    pub stop: StopReason,
    pub elapsed: Duration,
}

enum Incoming {
    Stored(Transferred),
    Resent(FileHeader),
    OverLimit(FileHeader),
}

enum DriverState {
    Connecting,
    Transferring(TransferSession),
    Reconnecting,
    Done(StopReason),
}

/// Cargo-style status line on stderr
fn status(output: Output, label: &str, msg: impl fmt::Display) {
    if !output.is_quiet() {
        eprintln!("{:>12} {}", label.with(Color::Green).bold(), msg);
    }
}

fn warn(output: Output, label: &str, msg: impl fmt::Display) {
    if !output.is_quiet() {
        eprintln!("{:>12} {}", label.with(Color::Yellow).bold(), msg);
    }
}

fn limit_reached(limit: Option<Limit>, totals: &TransferTotals) -> bool {
    limit.map_or(false, |l| l.is_reached(totals))
}

/// Sending side: connects to the receiver and pushes files.
pub struct SenderDriver {
    config: SenderConfig,
    source: PathSource,
    interrupt: Interrupt,
    logger: Arc<dyn Logger>,
    // Keeps a packed directory on disk until the run ends
    _archive: Option<StagedArchive>,
}

impl SenderDriver {
    pub fn new(config: SenderConfig, interrupt: Interrupt) -> Result<Self> {
        let (source, staged) = match &config.source {
            SourceSpec::Files(paths) => (PathSource::files(paths.iter().cloned()), None),
            SourceSpec::Dir(dir) => (PathSource::dir(dir.clone(), config.recursive), None),
            SourceSpec::Archive(dir) => {
                status(config.output, "Packing", dir.display());
                let staged = archive::pack_directory(dir)?;
                (PathSource::single(staged.outgoing()), Some(staged))
            }
        };
        Ok(Self {
            config,
            source,
            interrupt,
            logger: Arc::new(NoopLogger),
            _archive: staged,
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn run(mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let output = self.config.output;
        let limit = self.config.limit;
        let mut totals = TransferTotals::default();
        let mut transferred = Vec::new();
        let mut skipped = Vec::new();
        let mut reconnects = 0u32;

        let mut state = DriverState::Connecting;
        let stop = loop {
            state = match state {
                DriverState::Done(reason) => break reason,
                DriverState::Connecting | DriverState::Reconnecting => {
                    if self.interrupt.is_set() {
                        DriverState::Done(StopReason::Interrupted)
                    } else {
                        self.open_session()?
                    }
                }
                DriverState::Transferring(mut session) => {
                    if self.interrupt.is_set() {
                        DriverState::Done(StopReason::Interrupted)
                    } else if limit_reached(limit, &totals) {
                        DriverState::Done(StopReason::LimitReached)
                    } else if let Some(next) = self.source.current().cloned() {
                        let size = fs::metadata(&next.path).map(|m| m.len()).unwrap_or(0);
                        if !limit.map_or(true, |l| l.admits(&totals, size)) {
                            status(
                                output,
                                "Limit",
                                format!(
                                    "{} ({} bytes) would exceed the limit",
                                    next.path.display(),
                                    size
                                ),
                            );
                            DriverState::Done(StopReason::LimitReached)
                        } else {
                            match session.send_file(&next) {
                                Ok(done) => {
                                    totals.record(done.bytes);
                                    self.logger.file_done(
                                        &done.name,
                                        done.bytes,
                                        done.elapsed.as_secs_f64(),
                                    );
                                    self.source.advance();
                                    transferred.push(done);
                                    DriverState::Transferring(session)
                                }
                                Err(e) if e.is_skippable() => {
                                    warn(output, "Skipping", &e);
                                    self.logger
                                        .file_failed(&next.path.to_string_lossy(), &e.to_string());
                                    skipped.push(next.path.to_string_lossy().into_owned());
                                    self.source.advance();
                                    DriverState::Transferring(session)
                                }
                                Err(e) if e.is_recoverable() => {
                                    warn(output, "Lost", format!("{}; reconnecting", e));
                                    self.logger.reconnect(&e.to_string());
                                    reconnects += 1;
                                    drop(session);
                                    DriverState::Reconnecting
                                }
                                Err(e) => return Err(e),
                            }
                        }
                    } else {
                        let grew = match self.source.refresh() {
                            Ok(grew) => grew,
                            Err(e) if e.is_skippable() => {
                                warn(output, "Scan", &e);
                                false
                            }
                            Err(e) => return Err(e),
                        };
                        if grew {
                            DriverState::Transferring(session)
                        } else if self.config.stay_alive && self.source.can_grow() {
                            thread::sleep(Duration::from_millis(timeouts::SCAN_POLL_MS));
                            DriverState::Transferring(session)
                        } else {
                            DriverState::Done(StopReason::SourceExhausted)
                        }
                    }
                }
            };
        };

        let summary = RunSummary {
            totals,
            transferred,
            skipped,
            reconnects,
            stop,
            elapsed: started.elapsed(),
        };
        self.logger.done(
            totals.files,
            totals.bytes,
            summary.elapsed.as_secs_f64(),
            &stop.to_string(),
        );
        Ok(summary)
    }

    fn open_session(&self) -> Result<DriverState> {
        status(self.config.output, "Connecting", self.config.addr);
        let stream = match net::connect(&self.config.addr, &self.interrupt) {
            Ok(s) => s,
            Err(Error::Interrupted) => return Ok(DriverState::Done(StopReason::Interrupted)),
            Err(e) => return Err(e),
        };
        let session = TransferSession::new(stream, Role::Sender, self.config.output)?;
        status(self.config.output, "Connected", session.peer());
        self.logger.connected(&session.role().to_string(), &session.peer());
        Ok(DriverState::Transferring(session))
    }
}

/// Receiving side: listens, accepts senders, and stores their files.
pub struct ReceiverDriver {
    config: ReceiverConfig,
    acceptor: Acceptor,
    interrupt: Interrupt,
    logger: Arc<dyn Logger>,
}

impl ReceiverDriver {
    pub fn bind(config: ReceiverConfig, interrupt: Interrupt) -> Result<Self> {
        let acceptor = Acceptor::bind(&config.bind)?;
        Ok(Self {
            config,
            acceptor,
            interrupt,
            logger: Arc::new(NoopLogger),
        })
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.acceptor.local_addr()
    }

    pub fn run(self) -> Result<RunSummary> {
        let started = Instant::now();
        let output = self.config.output;
        let limit = self.config.limit;
        let opts = ReceiveOptions {
            save_dir: self.config.save_dir.clone(),
            recursive: self.config.recursive,
        };
        let mut totals = TransferTotals::default();
        let mut transferred = Vec::new();
        let mut reconnects = 0u32;
        // Files stored by this run, by wire name and size
        let mut committed: HashMap<String, u64> = HashMap::new();

        let mut state = DriverState::Connecting;
        let stop = loop {
            state = match state {
                DriverState::Done(reason) => break reason,
                DriverState::Connecting | DriverState::Reconnecting => {
                    if limit_reached(limit, &totals) {
                        DriverState::Done(StopReason::LimitReached)
                    } else {
                        self.accept_session()?
                    }
                }
                DriverState::Transferring(mut session) => {
                    if limit_reached(limit, &totals) {
                        DriverState::Done(StopReason::LimitReached)
                    } else {
                        match session.wait_for_header(&self.interrupt) {
                            Ok(true) => match self.receive_one(
                                &mut session,
                                &opts,
                                &totals,
                                &committed,
                            ) {
                                Ok(Incoming::Stored(done)) => {
                                    totals.record(done.bytes);
                                    self.logger.file_done(
                                        &done.name,
                                        done.bytes,
                                        done.elapsed.as_secs_f64(),
                                    );
                                    committed.insert(done.name.clone(), done.bytes);
                                    self.maybe_extract(&done)?;
                                    transferred.push(done);
                                    DriverState::Transferring(session)
                                }
                                Ok(Incoming::Resent(header)) => {
                                    status(
                                        output,
                                        "Resent",
                                        format!("{} was already stored", header.name),
                                    );
                                    DriverState::Transferring(session)
                                }
                                Ok(Incoming::OverLimit(header)) => {
                                    status(
                                        output,
                                        "Limit",
                                        format!(
                                            "{} ({} bytes) would exceed the limit",
                                            header.name, header.size
                                        ),
                                    );
                                    DriverState::Done(StopReason::LimitReached)
                                }
                                Err(e) if e.is_recoverable() => {
                                    warn(output, "Failed", format!("{}; waiting for sender", e));
                                    self.logger.reconnect(&e.to_string());
                                    reconnects += 1;
                                    DriverState::Reconnecting
                                }
                                Err(e) => return Err(e),
                            },
                            Ok(false) => {
                                status(
                                    output,
                                    "Closed",
                                    format!(
                                        "{} sent {} file(s), {} bytes",
                                        session.peer(),
                                        session.files(),
                                        session.bytes()
                                    ),
                                );
                                if self.config.stay_alive || limit.is_some() {
                                    DriverState::Reconnecting
                                } else {
                                    DriverState::Done(StopReason::PeerFinished)
                                }
                            }
                            Err(Error::Interrupted) => DriverState::Done(StopReason::Interrupted),
                            Err(e) if e.is_recoverable() => {
                                warn(output, "Lost", format!("{}; waiting for sender", e));
                                self.logger.reconnect(&e.to_string());
                                reconnects += 1;
                                DriverState::Reconnecting
                            }
                            Err(e) => return Err(e),
                        }
                    }
                }
            };
        };

        let summary = RunSummary {
            totals,
            transferred,
            skipped: Vec::new(),
            reconnects,
            stop,
            elapsed: started.elapsed(),
        };
        self.logger.done(
            totals.files,
            totals.bytes,
            summary.elapsed.as_secs_f64(),
            &stop.to_string(),
        );
        Ok(summary)
    }

    /// Read one header and decide what to do with its body.
    ///
    /// A header matching a file this run already stored is a resend after a
    /// lost acknowledgement: the body is drained and acknowledged again. A
    /// file that does not fit under the limit is refused before any byte of
    /// it is stored.
    fn receive_one(
        &self,
        session: &mut TransferSession,
        opts: &ReceiveOptions,
        totals: &TransferTotals,
        committed: &HashMap<String, u64>,
    ) -> Result<Incoming> {
        let header = session.recv_header()?;
        if committed.get(&header.name) == Some(&header.size) {
            session.discard_body(&header)?;
            return Ok(Incoming::Resent(header));
        }
        if !self.config.limit.map_or(true, |l| l.admits(totals, header.size)) {
            return Ok(Incoming::OverLimit(header));
        }
        session.recv_body(header, opts).map(Incoming::Stored)
    }

    fn accept_session(&self) -> Result<DriverState> {
        status(self.config.output, "Waiting", self.acceptor.local_addr());
        let stream = match self.acceptor.accept(&self.interrupt) {
            Ok((s, _)) => s,
            Err(Error::Interrupted) => return Ok(DriverState::Done(StopReason::Interrupted)),
            Err(e) if e.is_recoverable() => return Ok(DriverState::Reconnecting),
            Err(e) => return Err(e),
        };
        let session = TransferSession::new(stream, Role::Receiver, self.config.output)?;
        status(self.config.output, "Connected", session.peer());
        self.logger.connected(&session.role().to_string(), &session.peer());
        Ok(DriverState::Transferring(session))
    }

    fn maybe_extract(&self, done: &Transferred) -> Result<()> {
        if !self.config.extract || !archive::is_archive_name(&done.name) {
            return Ok(());
        }
        let Some(blob) = done.path.as_ref() else {
            return Ok(());
        };
        let (files, bytes) = archive::unpack_into(blob, &self.config.save_dir)?;
        fs::remove_file(blob).map_err(|source| Error::Destination {
            path: blob.clone(),
            source,
        })?;
        status(
            self.config.output,
            "Extracted",
            format!("{} ({} file(s), {} bytes)", done.name, files, bytes),
        );
        Ok(())
    }
}
