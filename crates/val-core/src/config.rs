//! Session configuration: buffers, timeouts, retries, resume policy, flow
//! control, and optional callbacks.

use std::sync::Arc;

use val_protocol::constants::{MAX_PACKET_SIZE, MIN_PACKET_SIZE};
use val_protocol::error::{Code, Detail};
use val_protocol::payload::Meta;

/// No optional features are currently defined; core functionality
/// (windowing, streaming, resume) is implicit and not gated by a
/// feature bit. Reserved for forward compatibility with the wire
/// contract's `features`/`required`/`requested` fields.
pub const FEAT_NONE: u32 = 0;

/// Packet buffer sizing. `packet_size` is the negotiated MTU bound, in
/// `[MIN_PACKET_SIZE, MAX_PACKET_SIZE]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffers {
    /// This endpoint's preferred packet size; the session negotiates
    /// down to `min(local, peer)` during the handshake.
    pub packet_size: u32,
}

impl Default for Buffers {
    fn default() -> Self {
        Buffers {
            packet_size: 4096,
        }
    }
}

/// Timeout bounds for the adaptive RTO estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Floor for the computed RTO, in milliseconds.
    pub min_timeout_ms: u32,
    /// Ceiling for the computed RTO, in milliseconds.
    pub max_timeout_ms: u32,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            min_timeout_ms: 100,
            max_timeout_ms: 10_000,
        }
    }
}

/// Retry budgets per protocol phase, plus the base backoff step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retries {
    /// Retry budget for the HELLO round-trip.
    pub handshake: u32,
    /// Retry budget for the META/RESUME_RESP round-trip.
    pub meta: u32,
    /// Retry budget for a single DATA window wait.
    pub data: u32,
    /// Retry budget for the final DONE/DONE_ACK round-trip.
    pub ack: u32,
    /// Base backoff step in milliseconds (informational; the RTO
    /// estimator itself doubles on each retry).
    pub backoff_ms_base: u32,
}

impl Default for Retries {
    fn default() -> Self {
        Retries {
            handshake: 4,
            meta: 4,
            data: 8,
            ack: 4,
            backoff_ms_base: 100,
        }
    }
}

/// Receiver-driven resume mode, selecting a row of the resume decision
/// matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeMode {
    /// Always restart from offset zero.
    Never,
    /// Skip any file that already exists locally, regardless of content.
    SkipExisting,
    /// Verify a tail range; mismatch skips the file.
    CrcTail,
    /// Verify a tail range; mismatch restarts from zero.
    CrcTailOrZero,
    /// Verify the full local prefix; mismatch skips the file.
    CrcFull,
    /// Verify the full local prefix; mismatch restarts from zero.
    CrcFullOrZero,
}

/// Resume policy: mode plus the byte ranges used by CRC verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePolicy {
    /// Selected resume mode.
    pub mode: ResumeMode,
    /// For `CrcTail`/`CrcTailOrZero`: number of trailing bytes verified.
    /// Unused by other modes.
    pub tail_cap_bytes: u64,
    /// For `CrcFull`/`CrcFullOrZero`: local files larger than this
    /// transparently fall back to a tail verify over this many bytes,
    /// retaining the FULL mode's mismatch policy.
    pub full_verify_cap_bytes: u64,
}

impl Default for ResumePolicy {
    fn default() -> Self {
        ResumePolicy {
            mode: ResumeMode::CrcTailOrZero,
            tail_cap_bytes: 64 * 1024,
            full_verify_cap_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Bounded-window flow control policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControl {
    /// Hard cap on in-flight packets regardless of cwnd growth.
    pub window_cap_packets: u16,
    /// Starting cwnd, in packets.
    pub initial_cwnd_packets: u16,
    /// Consecutive NAK/timeout errors before an additional cwnd
    /// reduction step, beyond the halving already applied per event.
    pub degrade_error_threshold: u32,
    /// Consecutive successful ACKs (beyond slow start) required before
    /// cwnd is allowed to grow again after a reduction.
    pub recovery_success_threshold: u32,
    /// Whether the sender keeps a single-MTU retransmit cache to answer
    /// a NAK without re-seeking the source file.
    pub retransmit_cache_enabled: bool,
    /// How many consecutive in-order DATA packets the receiver
    /// coalesces before emitting a cumulative DATA_ACK (the final chunk
    /// of a file always gets an immediate ACK regardless of this
    /// counter). `0` is treated as `1` (ack every packet).
    pub ack_stride_packets: u8,
}

impl Default for FlowControl {
    fn default() -> Self {
        FlowControl {
            window_cap_packets: 64,
            initial_cwnd_packets: 4,
            degrade_error_threshold: 3,
            recovery_success_threshold: 2,
            retransmit_cache_enabled: true,
            ack_stride_packets: 1,
        }
    }
}

/// Outcome of the optional metadata validator callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorAction {
    /// Proceed with the normal resume decision.
    Accept,
    /// Skip this file; continue the batch.
    Skip,
    /// Abort the whole session.
    Abort,
}

/// Per-file completion status passed to [`Config::on_file_complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// The file transferred (or was verified identical) successfully.
    Ok,
    /// The file was skipped per resume policy.
    Skipped,
    /// The file failed; see [`crate::session::Session::last_error`].
    Error,
}

/// Cumulative and per-file progress, passed to [`Config::on_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Bytes transferred for the current file so far.
    pub file_bytes: u64,
    /// Total size of the current file.
    pub file_total: u64,
    /// Bytes transferred across the whole batch so far.
    pub batch_bytes: u64,
}

type MetadataValidator = dyn Fn(&Meta, &str) -> ValidatorAction + Send + Sync;
type OnFileStart = dyn Fn(&str, &str, u64, u64) + Send + Sync;
type OnFileComplete = dyn Fn(&str, &str, FileStatus) + Send + Sync;
type OnProgress = dyn Fn(&str, Progress) + Send + Sync;

/// Immutable, validated session configuration. Build with
/// [`ConfigBuilder`]; once constructed, a `Config` is read-only for the
/// lifetime of the session it backs.
#[derive(Clone)]
pub struct Config {
    /// Buffer/MTU sizing.
    pub buffers: Buffers,
    /// Adaptive-timeout bounds.
    pub timeouts: Timeouts,
    /// Retry budgets.
    pub retries: Retries,
    /// Resume policy.
    pub resume: ResumePolicy,
    /// Flow control policy.
    pub flow_control: FlowControl,
    /// Feature bits this endpoint supports (currently always
    /// [`FEAT_NONE`]; reserved for future protocol extensions).
    pub supported_features: u32,
    /// Feature bits this endpoint requires the peer to support.
    pub required_features: u32,
    /// Feature bits this endpoint requests but does not require.
    pub requested_features: u32,
    /// Optional metadata validator, invoked only when
    /// `resume.mode == ResumeMode::Never` (see `DESIGN.md`).
    pub metadata_validator: Option<Arc<MetadataValidator>>,
    /// Optional per-file start callback.
    pub on_file_start: Option<Arc<OnFileStart>>,
    /// Optional per-file completion callback.
    pub on_file_complete: Option<Arc<OnFileComplete>>,
    /// Optional progress callback.
    pub on_progress: Option<Arc<OnProgress>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("buffers", &self.buffers)
            .field("timeouts", &self.timeouts)
            .field("retries", &self.retries)
            .field("resume", &self.resume)
            .field("flow_control", &self.flow_control)
            .field("supported_features", &self.supported_features)
            .field("required_features", &self.required_features)
            .field("requested_features", &self.requested_features)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Config`], validating all cross-field invariants at
/// [`ConfigBuilder::build`] time rather than leaving the session to
/// discover them mid-transfer.
#[derive(Debug, Default, Clone)]
pub struct ConfigBuilder {
    buffers: Buffers,
    timeouts: Timeouts,
    retries: Retries,
    resume: ResumePolicy,
    flow_control: FlowControl,
    supported_features: u32,
    required_features: u32,
    requested_features: u32,
    metadata_validator: Option<Arc<MetadataValidator>>,
    on_file_start: Option<Arc<OnFileStart>>,
    on_file_complete: Option<Arc<OnFileComplete>>,
    on_progress: Option<Arc<OnProgress>>,
}

impl ConfigBuilder {
    /// A builder pre-filled with the default policy for every section.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override buffer/MTU sizing.
    #[must_use]
    pub fn buffers(mut self, buffers: Buffers) -> Self {
        self.buffers = buffers;
        self
    }

    /// Override adaptive-timeout bounds.
    #[must_use]
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Override retry budgets.
    #[must_use]
    pub fn retries(mut self, retries: Retries) -> Self {
        self.retries = retries;
        self
    }

    /// Override resume policy.
    #[must_use]
    pub fn resume(mut self, resume: ResumePolicy) -> Self {
        self.resume = resume;
        self
    }

    /// Override flow control policy.
    #[must_use]
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    /// Set the required feature mask.
    #[must_use]
    pub fn required_features(mut self, mask: u32) -> Self {
        self.required_features = mask;
        self
    }

    /// Install a metadata validator callback.
    #[must_use]
    pub fn metadata_validator<Func>(mut self, f: Func) -> Self
    where
        Func: Fn(&Meta, &str) -> ValidatorAction + Send + Sync + 'static,
    {
        self.metadata_validator = Some(Arc::new(f));
        self
    }

    /// Install an `on_file_start` callback.
    #[must_use]
    pub fn on_file_start<Func>(mut self, f: Func) -> Self
    where
        Func: Fn(&str, &str, u64, u64) + Send + Sync + 'static,
    {
        self.on_file_start = Some(Arc::new(f));
        self
    }

    /// Install an `on_file_complete` callback.
    #[must_use]
    pub fn on_file_complete<Func>(mut self, f: Func) -> Self
    where
        Func: Fn(&str, &str, FileStatus) + Send + Sync + 'static,
    {
        self.on_file_complete = Some(Arc::new(f));
        self
    }

    /// Install an `on_progress` callback.
    #[must_use]
    pub fn on_progress<Func>(mut self, f: Func) -> Self
    where
        Func: Fn(&str, Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// Validate all cross-field invariants and produce an immutable
    /// [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`Code::InvalidArg`] with a [`Detail`] identifying which
    /// invariant failed:
    /// - `packet_size` outside `[MIN_PACKET_SIZE, MAX_PACKET_SIZE]` →
    ///   [`Detail::PACKET_SIZE`].
    /// - `min_timeout_ms > max_timeout_ms` or either is zero →
    ///   [`Detail::INVALID_STATE`].
    /// - `initial_cwnd_packets > window_cap_packets` or either is zero →
    ///   [`Detail::INVALID_STATE`].
    pub fn build(self) -> Result<Config, (Code, Detail)> {
        if self.buffers.packet_size < MIN_PACKET_SIZE || self.buffers.packet_size > MAX_PACKET_SIZE
        {
            return Err((Code::InvalidArg, Detail(Detail::PACKET_SIZE)));
        }
        if self.timeouts.min_timeout_ms == 0
            || self.timeouts.max_timeout_ms == 0
            || self.timeouts.min_timeout_ms > self.timeouts.max_timeout_ms
        {
            return Err((Code::InvalidArg, Detail(Detail::INVALID_STATE)));
        }
        if self.flow_control.initial_cwnd_packets == 0
            || self.flow_control.window_cap_packets == 0
            || self.flow_control.initial_cwnd_packets > self.flow_control.window_cap_packets
        {
            return Err((Code::InvalidArg, Detail(Detail::INVALID_STATE)));
        }

        Ok(Config {
            buffers: self.buffers,
            timeouts: self.timeouts,
            retries: self.retries,
            resume: self.resume,
            flow_control: self.flow_control,
            supported_features: self.supported_features,
            required_features: self.required_features,
            requested_features: self.requested_features,
            metadata_validator: self.metadata_validator,
            on_file_start: self.on_file_start,
            on_file_complete: self.on_file_complete,
            on_progress: self.on_progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        ConfigBuilder::new().build().unwrap();
    }

    #[test]
    fn rejects_packet_size_below_minimum() {
        let err = ConfigBuilder::new()
            .buffers(Buffers { packet_size: 64 })
            .build()
            .unwrap_err();
        assert_eq!(err.0, Code::InvalidArg);
        assert_eq!(err.1 .0, Detail::PACKET_SIZE);
    }

    #[test]
    fn rejects_inverted_timeouts() {
        let err = ConfigBuilder::new()
            .timeouts(Timeouts {
                min_timeout_ms: 500,
                max_timeout_ms: 100,
            })
            .build()
            .unwrap_err();
        assert_eq!(err.1 .0, Detail::INVALID_STATE);
    }

    #[test]
    fn rejects_cwnd_above_window_cap() {
        let err = ConfigBuilder::new()
            .flow_control(FlowControl {
                window_cap_packets: 4,
                initial_cwnd_packets: 8,
                ..FlowControl::default()
            })
            .build()
            .unwrap_err();
        assert_eq!(err.1 .0, Detail::INVALID_STATE);
    }
}
