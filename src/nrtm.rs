//! Realtime synchronization over NRTM v3.
//!
//! One mirror session is a line-oriented exchange on a long-lived TCP
//! connection: we send `-g <name>:3:<serial>-LAST`, the mirror answers with
//! a `%START` banner and a stream of `ADD`/`DEL` serial markers each
//! followed by one RPSL packet, and closes the exchange with `%END`.
//!
//! The protocol logic lives in [`Session`], a plain synchronous state
//! machine consuming one line at a time, so it can be exercised in tests
//! without a socket. The async driver owns the connection, the per-registry
//! lock discipline (one write-lock acquisition per applied packet), the
//! 60 second reconnect delay and the 10 minute idle re-poll.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::error::{IRRError, IRRResult};
use crate::index::RegistryIndex;
use crate::rpsl::{self, RpslObject};
use crate::snapshot;

// a single protocol line should never come close to this
const MAX_LINE: usize = 64 * 1024;

// bound on one accumulated RPSL packet, against a hostile mirror
const MAX_PACKET: usize = 512 * 1024;

const RECONNECT_DELAY: Duration = Duration::from_secs(60);
const IDLE_POLL: Duration = Duration::from_secs(600);

/// Accumulates raw socket reads and hands back complete lines. Lines are
/// `\n`-terminated, an optional preceding `\r` is stripped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// The next complete line, or `None` when more data is needed. An
    /// unterminated line beyond [`MAX_LINE`] aborts the session.
    pub fn pop_line(&mut self) -> IRRResult<Option<String>> {
        match self.buf.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop(); // the \n
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => {
                if self.buf.len() > MAX_LINE {
                    return Err(IRRError::Protocol(format!(
                        "line exceeds {} bytes without terminator",
                        MAX_LINE
                    )));
                }
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    AwaitStart,
    AwaitOp,
    ReadPacket,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Del,
}

/// What the driver should do after feeding one line into the machine.
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Nothing to apply, keep reading.
    Continue,
    /// One packet completed and passed the serial gate: apply it.
    Apply { obj: RpslObject, remove: bool },
    /// `%END` received: commit and close.
    Finished,
}

/// The per-session protocol state machine.
#[derive(Debug)]
pub struct Session {
    state: State,
    start_serial: u32,
    latest_serial: u32,
    op: Op,
    packet: Vec<String>,
    packet_bytes: usize,
    applied: u32,
}

impl Session {
    pub fn new(start_serial: u32) -> Self {
        Session {
            state: State::AwaitStart,
            start_serial,
            latest_serial: start_serial,
            op: Op::Add,
            packet: Vec::new(),
            packet_bytes: 0,
            applied: 0,
        }
    }

    /// The request opening the session.
    pub fn greeting(&self, int_name: &str) -> String {
        format!("-g {}:3:{}-LAST\n", int_name, self.start_serial)
    }

    /// The serial to commit on `%END`.
    pub fn latest_serial(&self) -> u32 {
        self.latest_serial
    }

    /// How many deltas passed the serial gate.
    pub fn applied(&self) -> u32 {
        self.applied
    }

    /// Whether the session moved the serial forward; the commit writes a
    /// snapshot only in that case.
    pub fn advanced(&self) -> bool {
        self.latest_serial > self.start_serial
    }

    /// Feed one line. Mutation of the index is left to the caller through
    /// [`Step::Apply`], so one lock acquisition covers one whole packet.
    pub fn on_line(&mut self, line: &str) -> IRRResult<Step> {
        match self.state {
            State::AwaitStart => {
                match parse_start_range(line) {
                    Some((lo, hi)) if line.starts_with("%START") => {
                        debug!("mirror offers serials {}-{}", lo, hi);
                        self.state = State::AwaitOp;
                    }
                    _ => warn!("unexpected line awaiting %START: {:?}", line),
                }
                Ok(Step::Continue)
            }

            State::AwaitOp => {
                if line.starts_with("%END") {
                    return Ok(Step::Finished);
                }
                if let Some(serial) = strip_op(line, "ADD") {
                    self.op = Op::Add;
                    self.latest_serial = serial;
                    self.begin_packet();
                    return Ok(Step::Continue);
                }
                if let Some(serial) = strip_op(line, "DEL") {
                    self.op = Op::Del;
                    self.latest_serial = serial;
                    self.begin_packet();
                    return Ok(Step::Continue);
                }
                if line.starts_with('%') {
                    // covers a second %START mid-stream, which mirrors do emit
                    warn!("protocol notice in op stream: {:?}", line);
                }
                Ok(Step::Continue)
            }

            State::ReadPacket => {
                if line.trim().is_empty() {
                    if self.packet.is_empty() {
                        return Ok(Step::Continue);
                    }
                    let step = self.finish_packet();
                    self.state = State::AwaitOp;
                    return Ok(step);
                }
                self.packet_bytes += line.len();
                if self.packet_bytes > MAX_PACKET {
                    return Err(IRRError::Protocol(format!(
                        "rpsl packet exceeds {} bytes",
                        MAX_PACKET
                    )));
                }
                self.packet.push(line.to_string());
                Ok(Step::Continue)
            }
        }
    }

    fn begin_packet(&mut self) {
        self.packet.clear();
        self.packet_bytes = 0;
        self.state = State::ReadPacket;
    }

    fn finish_packet(&mut self) -> Step {
        // deltas at or below the serial we started from were already seen
        if self.latest_serial <= self.start_serial {
            debug!(
                "skipping replayed delta at serial {}",
                self.latest_serial
            );
            self.packet.clear();
            return Step::Continue;
        }
        let obj = rpsl::parse_packet(&self.packet);
        self.packet.clear();
        match obj {
            Some(obj) => {
                self.applied += 1;
                Step::Apply {
                    obj,
                    remove: self.op == Op::Del,
                }
            }
            None => Step::Continue,
        }
    }
}

// "%START Version: 3 RIPE 100-102" -> (100, 102)
fn parse_start_range(line: &str) -> Option<(u32, u32)> {
    let range = line.split_whitespace().last()?;
    let (lo, hi) = range.split_once('-')?;
    Some((lo.parse().ok()?, hi.parse().ok()?))
}

// "ADD 101" -> 101
fn strip_op(line: &str, op: &str) -> Option<u32> {
    let rest = line.strip_prefix(op)?;
    rest.trim().parse().ok()
}

/// How one session ended, deciding the reconnect pacing.
#[derive(Debug, PartialEq)]
enum SessionEnd {
    /// `%END` seen and committed: back off for the reconnect delay.
    Committed,
    /// No line for the idle-poll interval: re-request immediately.
    Idle,
}

/// Drives NRTM sessions for one registry, forever.
pub struct Synchronizer {
    pub db_name: String,
    pub host: String,
    pub port: u16,
    pub int_name: String,
    pub index: Arc<RwLock<RegistryIndex>>,
    pub snapshot_file: PathBuf,
}

impl Synchronizer {
    pub async fn run(self) {
        loop {
            match self.run_session().await {
                Ok(SessionEnd::Idle) => {
                    debug!("{}: mirror idle, re-requesting", self.db_name);
                    continue;
                }
                Ok(SessionEnd::Committed) => {}
                Err(e) => {
                    warn!("{}: session failed: {:?}", self.db_name, e);
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn run_session(&self) -> IRRResult<SessionEnd> {
        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = TcpStream::connect(&addr).await?;

        let start_serial = self.index.read().await.serial;
        let mut session = Session::new(start_serial);
        stream
            .write_all(session.greeting(&self.int_name).as_bytes())
            .await?;
        debug!("{}: requested {}-LAST from {}", self.db_name, start_serial, addr);

        let mut lines = LineBuffer::default();
        let mut buf = [0u8; 4096];
        loop {
            let n = match timeout(IDLE_POLL, stream.read(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => return Ok(SessionEnd::Idle),
            };
            if n == 0 {
                return Err(IRRError::Protocol(String::from(
                    "mirror closed the connection",
                )));
            }
            lines.push(&buf[..n]);

            while let Some(line) = lines.pop_line()? {
                match session.on_line(&line)? {
                    Step::Continue => {}
                    Step::Apply { obj, remove } => {
                        let mut index = self.index.write().await;
                        index.apply(obj, remove);
                    }
                    Step::Finished => {
                        self.commit(&session).await?;
                        return Ok(SessionEnd::Committed);
                    }
                }
            }
        }
    }

    async fn commit(&self, session: &Session) -> IRRResult<()> {
        {
            let mut index = self.index.write().await;
            index.serial = session.latest_serial();
        }
        if session.advanced() {
            let index = self.index.read().await;
            snapshot::write(&self.snapshot_file, &index)?;
            info!(
                "{}: committed serial {}, {} deltas, snapshot written",
                self.db_name,
                session.latest_serial(),
                session.applied()
            );
        } else {
            debug!(
                "{}: committed serial {}, no deltas",
                self.db_name,
                session.latest_serial()
            );
        }
        Ok(())
    }
}
