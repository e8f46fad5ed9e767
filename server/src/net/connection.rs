/*
 * This file is a part of kvd
*/

//! The per-connection state machine (`spec.md` §4.6): REQ (reading and
//! dispatching requests), RES (draining a response), END (queued for
//! teardown). One `Connection` per accepted socket; the event loop in
//! [`crate::net`] owns the arena of them and drives `connection_io` on
//! readiness.
//!
//! Grounded on the shape of the teacher's `dbnet::connection` module
//! (a small enum of read/write states driving buffered I/O against a
//! socket) with the async task model stripped out — see
//! `SPEC_FULL.md`'s REDESIGN FLAGS section for why.

use std::io::{self, ErrorKind, Read, Write};

use bytes::BytesMut;
use mio::net::TcpStream;

use crate::cmd;
use crate::net::protocol::{self, ProtoError};
use crate::store::Database;

/// Per-connection socket buffers (`spec.md` §5: "rbuf/wbuf are
/// fixed-capacity per connection (8 KiB each)").
const BUF_CAPACITY: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Req,
    Res,
    End,
}

pub struct Connection {
    pub socket: TcpStream,
    pub state: State,
    rbuf: BytesMut,
    wbuf: BytesMut,
    wbuf_sent: usize,
    pub last_activity_us: u64,
    pub idle_prev: Option<u32>,
    pub idle_next: Option<u32>,
}

impl Connection {
    pub fn new(socket: TcpStream, now_us: u64) -> Self {
        Self {
            socket,
            state: State::Req,
            rbuf: BytesMut::with_capacity(BUF_CAPACITY),
            wbuf: BytesMut::with_capacity(BUF_CAPACITY),
            wbuf_sent: 0,
            last_activity_us: now_us,
            idle_prev: None,
            idle_next: None,
        }
    }

    /// Whether the event loop should poll this socket for readable
    /// (REQ) or writable (RES) readiness.
    pub fn wants_read(&self) -> bool {
        self.state == State::Req
    }

    pub fn wants_write(&self) -> bool {
        self.state == State::Res
    }
}

enum Fill {
    Read,
    WouldBlock,
    Eof,
    Error,
}

fn fill_buffer(conn: &mut Connection) -> Fill {
    let mut read_any = false;
    loop {
        if conn.rbuf.len() >= conn.rbuf.capacity() {
            // a conforming peer never gets here: the largest frame (4 +
            // K_MAX_MSG) fits well within BUF_CAPACITY, so a full buffer
            // with no parseable frame means a malformed stream.
            return Fill::Error;
        }
        let mut scratch = [0u8; 4096];
        match conn.socket.read(&mut scratch) {
            Ok(0) => return if read_any { Fill::Read } else { Fill::Eof },
            Ok(n) => {
                conn.rbuf.extend_from_slice(&scratch[..n]);
                read_any = true;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                return if read_any { Fill::Read } else { Fill::WouldBlock };
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return Fill::Error,
        }
    }
}

enum Process {
    NoCompleteFrame,
    Produced,
    Fatal,
}

fn process_one_request(conn: &mut Connection, db: &mut Database) -> Process {
    let payload = match protocol::try_take_frame(&mut conn.rbuf) {
        Ok(Some(p)) => p,
        Ok(None) => return Process::NoCompleteFrame,
        Err(ProtoError::OversizeFrame) | Err(ProtoError::Malformed) => return Process::Fatal,
    };
    let args = match protocol::parse_request(&payload) {
        Ok(args) => args,
        Err(_) => return Process::Fatal,
    };
    let response = cmd::dispatch(db, &args);
    let frame = protocol::serialize_response(&response);
    conn.wbuf.extend_from_slice(&frame);
    conn.wbuf_sent = 0;
    Process::Produced
}

enum Flush {
    Drained,
    WouldBlock,
    Error,
}

fn flush_buffer(conn: &mut Connection) -> Flush {
    loop {
        if conn.wbuf_sent >= conn.wbuf.len() {
            conn.wbuf.clear();
            conn.wbuf_sent = 0;
            return Flush::Drained;
        }
        match conn.socket.write(&conn.wbuf[conn.wbuf_sent..]) {
            Ok(0) => return Flush::Error,
            Ok(n) => conn.wbuf_sent += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Flush::WouldBlock,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => return Flush::Error,
        }
    }
}

fn handle_req(conn: &mut Connection, db: &mut Database) {
    loop {
        match fill_buffer(conn) {
            Fill::WouldBlock => return,
            Fill::Eof | Fill::Error => {
                conn.state = State::End;
                return;
            }
            Fill::Read => {}
        }
        loop {
            match process_one_request(conn, db) {
                Process::NoCompleteFrame => break,
                Process::Fatal => {
                    conn.state = State::End;
                    return;
                }
                Process::Produced => {
                    conn.state = State::Res;
                    match flush_buffer(conn) {
                        Flush::Drained => {
                            conn.state = State::Req;
                            // keep draining any further pipelined requests
                            // already sitting in rbuf before going back to
                            // the outer read loop
                            continue;
                        }
                        Flush::WouldBlock => return,
                        Flush::Error => {
                            conn.state = State::End;
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn handle_res(conn: &mut Connection) {
    match flush_buffer(conn) {
        Flush::Drained => conn.state = State::Req,
        Flush::WouldBlock => {}
        Flush::Error => conn.state = State::End,
    }
}

/// Drive the state machine in response to a readiness event. Does not
/// touch the idle list — the event loop does that on every call since
/// it alone knows the current timestamp.
pub fn connection_io(conn: &mut Connection, db: &mut Database) {
    match conn.state {
        State::Req => handle_req(conn, db),
        State::Res => handle_res(conn),
        State::End => {}
    }
}

/// Accept-time constructor plumbing: puts a freshly accepted socket
/// into non-blocking mode. Kept here (rather than inline at the accept
/// site) because it is a precondition of every other function in this
/// module.
pub fn make_nonblocking(stream: &TcpStream) -> io::Result<()> {
    // mio's `TcpStream` is already non-blocking by construction; this
    // exists to make that invariant visible at the call site and to
    // give fatal startup-error plumbing (`spec.md` §7 tier 3) a single
    // place to hook if that ever changes.
    let _ = stream;
    Ok(())
}
