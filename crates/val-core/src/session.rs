//! The session object: config snapshot, buffers, counters, and the
//! low-level frame I/O every phase (handshake/resume/sender/receiver)
//! builds on.

use std::time::Duration;

use val_checksums::{Crc32Engine, SoftwareCrc32Engine};
use val_protocol::constants::{HEADER_LEN, TRAILER_LEN};
use val_protocol::error::{Code, Detail, LastError};
use val_protocol::frame::Frame;
use val_protocol::header::{FrameHeader, FrameType};
use val_transport::{Clock, DebugLevel, DebugSink, Filesystem, Transport};

use crate::config::Config;
use crate::cwnd::Cwnd;
use crate::deadline::{elapsed_ms, remaining_ms};
use crate::error::{Result, SessionError};
use crate::metrics::{Metrics, WireAudit};
use crate::rto::AdaptiveRto;

/// Negotiated parameters fixed at the end of a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Negotiated {
    pub packet_size: u32,
    pub effective_window_cap: u32,
    /// The peer's advertised ACK-coalescing stride, for observability
    /// only; each side's receiver batches ACKs per its own
    /// `Config::flow_control.ack_stride_packets`, not the peer's.
    pub ack_stride: u8,
    pub peer_window_cap: u32,
    /// `(local.requested ∪ peer.requested) ∩ peer.supported ∩ local.supported`.
    pub effective_features: u32,
}

/// A VAL session: one handshake, one or more files, then terminal.
///
/// Generic over the three caller-owned adapters so the whole engine is
/// monomorphized per embedder rather than paying trait-object dispatch
/// on the data path.
pub struct Session<T: Transport, F: Filesystem, C: Clock> {
    pub(crate) config: Config,
    pub(crate) transport: T,
    pub(crate) filesystem: F,
    pub(crate) clock: C,
    pub(crate) crc_engine: Box<dyn Crc32Engine>,
    pub(crate) debug_sink: Option<Box<dyn DebugSink>>,

    pub(crate) negotiated: Negotiated,
    pub(crate) rto: AdaptiveRto,
    pub(crate) cwnd: Cwnd,
    pub(crate) peer_cwnd_rung: u32,

    pub(crate) last_error: LastError,
    pub(crate) terminal: bool,

    pub(crate) metrics: Metrics,
    pub(crate) wire_audit: WireAudit,

    pub(crate) recv_buf: Vec<u8>,
}

impl<T: Transport, F: Filesystem, C: Clock> Session<T, F, C> {
    /// Construct a session from a validated [`Config`] and the three
    /// caller-owned adapters.
    #[must_use]
    pub fn new(config: Config, transport: T, filesystem: F, clock: C) -> Self {
        let rto = AdaptiveRto::new(config.timeouts.min_timeout_ms, config.timeouts.max_timeout_ms);
        let cwnd = Cwnd::new(
            u32::from(config.flow_control.initial_cwnd_packets),
            u32::from(config.flow_control.window_cap_packets),
            config.flow_control.degrade_error_threshold,
            config.flow_control.recovery_success_threshold,
        );
        let packet_size = config.buffers.packet_size;
        Session {
            config,
            transport,
            filesystem,
            clock,
            crc_engine: Box::new(SoftwareCrc32Engine),
            debug_sink: None,
            negotiated: Negotiated {
                packet_size,
                effective_window_cap: 0,
                ack_stride: 0,
                peer_window_cap: 0,
                effective_features: 0,
            },
            rto,
            cwnd,
            peer_cwnd_rung: 1,
            last_error: LastError::NONE,
            terminal: false,
            metrics: Metrics::default(),
            wire_audit: WireAudit::default(),
            recv_buf: Vec::new(),
        }
    }

    /// Install a diagnostic sink.
    #[must_use]
    pub fn with_debug_sink(mut self, sink: Box<dyn DebugSink>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    /// Install a non-default CRC engine (e.g. a hardware-accelerated
    /// one). Sessions use [`val_checksums::SoftwareCrc32Engine`] by
    /// default.
    #[must_use]
    pub fn with_crc_engine(mut self, engine: Box<dyn Crc32Engine>) -> Self {
        self.crc_engine = engine;
        self
    }

    pub(crate) fn log(&self, level: DebugLevel, message: &str) {
        if let Some(sink) = &self.debug_sink {
            sink.log(level, message);
        }
    }

    /// The negotiated packet size (MTU bound) for this session. `0`
    /// before the handshake completes.
    #[must_use]
    pub fn effective_packet_size(&self) -> u32 {
        self.negotiated.packet_size
    }

    /// The feature set both peers agreed to use this session: requested
    /// by either side, supported by both. `0` before the handshake
    /// completes.
    #[must_use]
    pub fn effective_features(&self) -> u32 {
        self.negotiated.effective_features
    }

    /// Current sender-side congestion window, in packets.
    #[must_use]
    pub fn cwnd_packets(&self) -> u32 {
        self.cwnd.packets()
    }

    /// Legacy power-of-two TX-mode rung derived from the local cwnd, for
    /// external observability only.
    #[must_use]
    pub fn current_tx_mode(&self) -> u32 {
        self.cwnd.legacy_tx_mode_rung()
    }

    /// Legacy power-of-two TX-mode rung last observed from the peer's
    /// ACK feedback.
    #[must_use]
    pub fn peer_tx_mode(&self) -> u32 {
        self.peer_cwnd_rung
    }

    /// Always reports streaming as allowed: the bounded-window model has
    /// no stop-and-wait fallback, so this legacy query is a constant
    /// `true` once negotiated.
    #[must_use]
    pub fn streaming_allowed(&self) -> bool {
        self.negotiated.packet_size > 0
    }

    /// Whether this session is actively streaming (cwnd > 1), a legacy
    /// view over [`Session::current_tx_mode`].
    #[must_use]
    pub fn is_streaming_engaged(&self) -> bool {
        self.cwnd.packets() > 1
    }

    /// Whether the peer's last-observed window rung indicates streaming.
    #[must_use]
    pub fn is_peer_streaming_engaged(&self) -> bool {
        self.peer_cwnd_rung > 1
    }

    /// The most recent failure recorded on this session.
    #[must_use]
    pub fn last_error(&self) -> LastError {
        self.last_error
    }

    /// Whether the session has been cancelled (locally or by the peer)
    /// and is now terminal.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.terminal
    }

    /// A snapshot of the session's metrics counters.
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    /// Zero every metrics counter.
    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    /// A snapshot of the session's wire audit counters.
    #[must_use]
    pub fn wire_audit(&self) -> WireAudit {
        self.wire_audit
    }

    /// Zero every wire audit counter.
    pub fn reset_wire_audit(&mut self) {
        self.wire_audit.reset();
    }

    /// Best-effort emergency cancel: writes one CANCEL frame, records
    /// `Aborted`, and makes the session terminal. Any subsequent public
    /// operation short-circuits to [`SessionError::Aborted`].
    pub fn emergency_cancel(&mut self) -> Result<()> {
        let header = FrameHeader::new(FrameType::Cancel, 0);
        let frame = Frame::new(header, Vec::new());
        let _ = self.write_frame(&frame);
        self.last_error = LastError::new(Code::Aborted, Detail::NONE, "emergency_cancel");
        self.terminal = true;
        Ok(())
    }

    pub(crate) fn fail(&mut self, op: &'static str, err: SessionError) -> SessionError {
        self.last_error = err.to_last_error(op);
        err
    }

    pub(crate) fn check_not_terminal(&self, op: &'static str) -> Result<()> {
        if self.terminal {
            return Err(SessionError::Aborted);
        }
        let _ = op;
        Ok(())
    }

    /// Encode and send one frame, updating metrics and wire audit.
    pub(crate) fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut buf = vec![0u8; frame.wire_len()];
        frame.encode(&mut buf);
        self.transport
            .send(&buf)
            .map_err(|e| SessionError::io("transport_send", e))?;
        self.metrics.on_send(frame.header.frame_type, buf.len());
        self.wire_audit.on_send(frame.header.frame_type);
        Ok(())
    }

    /// Block for at most `timeout` waiting for a complete, CRC-valid
    /// frame. Returns `Ok(None)` on timeout with nothing usable read.
    pub(crate) fn read_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let timeout_ms = timeout.as_millis().min(u128::from(u32::MAX)) as u32;
        let start = self.clock.ticks_ms();

        let mut header_buf = [0u8; HEADER_LEN];
        if !self.fill_exact(&mut header_buf, start, timeout_ms)? {
            return Ok(None);
        }
        let header = FrameHeader::decode(&header_buf).map_err(SessionError::Protocol)?;

        let tail_len = header.content_len as usize + TRAILER_LEN;
        let mut tail_buf = vec![0u8; tail_len];
        if !self.fill_exact(&mut tail_buf, start, timeout_ms)? {
            return Ok(None);
        }

        let mut whole = Vec::with_capacity(HEADER_LEN + tail_len);
        whole.extend_from_slice(&header_buf);
        whole.extend_from_slice(&tail_buf);

        match Frame::decode(&whole) {
            Ok(frame) => {
                self.metrics.on_recv(frame.header.frame_type, whole.len());
                self.wire_audit.on_recv(frame.header.frame_type);
                Ok(Some(frame))
            }
            Err(e) if e.code == Code::Crc => {
                self.metrics.crc_errors += 1;
                self.log(DebugLevel::Warn, "dropped frame: trailer CRC mismatch");
                Ok(None)
            }
            Err(e) => Err(SessionError::Protocol(e)),
        }
    }

    /// Block, retrying on timeout, until a frame whose type satisfies
    /// `accept` arrives, or `retries` is exhausted against the RTO's hard
    /// deadline. Frames that don't satisfy `accept` are silently skipped
    /// (this is how a stray retransmission or a frame from a prior phase
    /// gets ignored rather than misinterpreted).
    pub(crate) fn await_frame(
        &mut self,
        retries: u32,
        accept: impl Fn(FrameType) -> bool,
        op: &'static str,
        timeout_detail: u32,
    ) -> Result<Frame> {
        self.await_frame_with_soft_timeout(retries, accept, op, timeout_detail, |_| Ok(()))
    }

    /// As [`Session::await_frame`], but `on_soft_timeout` runs on every
    /// retriable (non-hard-deadline) timeout before the wait continues —
    /// the receiver's data loop uses this to re-emit its last ACK as a
    /// liveness signal per spec.md §4.5.
    pub(crate) fn await_frame_with_soft_timeout(
        &mut self,
        retries: u32,
        accept: impl Fn(FrameType) -> bool,
        op: &'static str,
        timeout_detail: u32,
        mut on_soft_timeout: impl FnMut(&mut Self) -> Result<()>,
    ) -> Result<Frame> {
        let deadline_ms = self.rto.hard_deadline_ms(retries);
        let start = self.clock.ticks_ms();
        loop {
            let now = self.clock.ticks_ms();
            if elapsed_ms(start, now) >= deadline_ms {
                let err = SessionError::Protocol(val_protocol::error::ProtocolError::new(
                    Code::Timeout,
                    timeout_detail,
                ));
                return Err(self.fail(op, err));
            }
            let timeout = Duration::from_millis(u64::from(self.rto.current_ms()));
            match self.read_frame(timeout).map_err(|e| self.fail(op, e))? {
                Some(f) if f.header.frame_type == FrameType::Error => {
                    let detail = val_protocol::payload::ErrorPayload::decode(&f.payload)
                        .map(|p| p.detail)
                        .unwrap_or(Detail::NONE.0);
                    self.terminal = true;
                    let err =
                        SessionError::Protocol(val_protocol::error::ProtocolError::new(
                            Code::Aborted,
                            detail,
                        ));
                    return Err(self.fail(op, err));
                }
                Some(f) if f.header.frame_type == FrameType::Cancel => {
                    self.terminal = true;
                    let err =
                        SessionError::Protocol(val_protocol::error::ProtocolError::new(
                            Code::Aborted,
                            Detail::NONE.0,
                        ));
                    return Err(self.fail(op, err));
                }
                Some(f) if accept(f.header.frame_type) => return Ok(f),
                Some(_) => continue,
                None => {
                    self.metrics.timeouts += 1;
                    self.rto.on_retry();
                    on_soft_timeout(self)?;
                    continue;
                }
            }
        }
    }

    /// Read exactly `buf.len()` bytes, respecting the deadline
    /// `start + timeout_ms`. Returns `false` if the deadline passed
    /// before `buf` was filled.
    fn fill_exact(&mut self, buf: &mut [u8], start: u32, timeout_ms: u32) -> Result<bool> {
        let mut filled = 0usize;
        while filled < buf.len() {
            let now = self.clock.ticks_ms();
            let remaining = remaining_ms(start, now, timeout_ms);
            if remaining == 0 {
                return Ok(false);
            }
            let n = self
                .transport
                .recv(&mut buf[filled..], Duration::from_millis(u64::from(remaining)))
                .map_err(|e| SessionError::io("transport_recv", e))?;
            if n == 0 {
                let now2 = self.clock.ticks_ms();
                if elapsed_ms(start, now2) >= timeout_ms {
                    return Ok(false);
                }
                continue;
            }
            filled += n;
        }
        Ok(true)
    }
}
