//! The three adapter traits a caller implements to host a session:
//! [`Transport`], [`Filesystem`], and [`Clock`]. A fourth, [`DebugSink`],
//! is optional diagnostic output.

use std::io;
use std::time::Duration;

/// Blocking, caller-owned byte transport. One send/recv pair per session;
/// the core never multiplexes more than one transport per session and
/// never spawns a thread to drive it.
///
/// Implementors back this with whatever the caller has on hand — a TCP
/// socket, a UART file descriptor, a PTY, an in-memory pipe for tests.
pub trait Transport: Send {
    /// Send all of `data`, blocking until the whole buffer has been
    /// accepted by the underlying channel or an error occurs.
    fn send(&mut self, data: &[u8]) -> io::Result<()>;

    /// Block for at most `timeout` waiting for at least one byte, then
    /// return as many bytes as are immediately available into `buf`
    /// (short reads are expected and normal). Returns `Ok(0)` on timeout
    /// with no data available.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Best-effort liveness check; sessions that can't determine this
    /// cheaply should leave the default `true` and rely on send/recv
    /// errors instead.
    fn is_connected(&self) -> bool {
        true
    }

    /// Flush any internal buffering. A no-op for transports with none.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Seek origin, mirroring POSIX `SEEK_SET`/`SEEK_CUR`/`SEEK_END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Whence {
    /// Seek relative to the start of the file.
    Start,
    /// Seek relative to the current position.
    Current,
    /// Seek relative to the end of the file.
    End,
}

/// Caller-owned filesystem adapter with 64-bit offsets throughout, so a
/// session can address files larger than `u32::MAX` bytes even on
/// platforms where the native API is 32-bit.
pub trait Filesystem: Send {
    /// An open-file handle; owned by the caller's implementation.
    type File: Send;

    /// Open `path` for reading (`write = false`) or writing/creating
    /// (`write = true`).
    fn open(&mut self, path: &str, write: bool) -> io::Result<Self::File>;

    /// Read into `buf`, returning the number of bytes read (`0` at EOF).
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf`, returning the number of bytes written.
    fn write(&mut self, file: &mut Self::File, buf: &[u8]) -> io::Result<usize>;

    /// Seek to `offset` relative to `whence`, returning the new absolute
    /// position.
    fn seek(&mut self, file: &mut Self::File, offset: i64, whence: Whence) -> io::Result<u64>;

    /// Current absolute position.
    fn tell(&mut self, file: &Self::File) -> io::Result<u64>;

    /// Close the file, flushing any buffered writes.
    fn close(&mut self, file: Self::File) -> io::Result<()>;
}

/// Caller-owned monotonic clock, used for RTO computation and deadlines.
/// Never wall-clock time — the core relies on monotonicity, not
/// absolute calendar correctness.
pub trait Clock: Send {
    /// Milliseconds since an arbitrary fixed epoch, wrapping at
    /// `u32::MAX`. Callers on platforms with a narrower tick counter
    /// should widen it rather than truncate a wider one, since the core
    /// treats wraparound as well-defined unsigned-32-bit subtraction.
    fn ticks_ms(&self) -> u32;

    /// Cooperative delay, used only when the core would otherwise busy
    /// loop waiting on a timer with nothing else to do. The default is a
    /// no-op, which is always correct (just less power-efficient).
    fn delay_ms(&self, _ms: u32) {}
}

/// Diagnostic severity for [`DebugSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DebugLevel {
    /// Per-frame tracing, noisy.
    Trace,
    /// State transitions, retries, mode changes.
    Debug,
    /// Recoverable anomalies (retransmits, CRC mismatches under retry).
    Warn,
    /// Failures that end the current file or session.
    Error,
}

/// Optional diagnostic sink. Sessions created without one are silent;
/// [`TracingDebugSink`](crate::tracing_sink::TracingDebugSink) bridges to
/// the ambient `tracing` subscriber for embedders who want it.
pub trait DebugSink: Send + Sync {
    /// Receive one diagnostic line. Implementations must not block
    /// significantly or this stalls the calling session's I/O.
    fn log(&self, level: DebugLevel, message: &str);
}
