//! Optional metrics and wire-audit counters.
//!
//! Both structs are plain snapshots: the session updates the live
//! counters as it runs and `get_metrics`/`get_wire_audit` hand back a
//! copy, mirroring the reference implementation's compile-time-optional
//! `val_metrics_t`/`val_wire_audit_t` (carried here unconditionally,
//! since a Rust build has no equivalent of an `#ifdef` feature toggle
//! for a handful of counters).

use val_protocol::header::FrameType;

/// Per-type send/receive tallies, indexed by wire type byte modulo 32
/// (covers HELLO..MODE_SYNC_ACK plus CANCEL at `0x18`).
const TYPE_TALLY_LEN: usize = 32;

/// Session-wide counters. Reset with [`Metrics::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Metrics {
    /// Total frames sent.
    pub packets_sent: u64,
    /// Total frames received.
    pub packets_recv: u64,
    /// Total bytes sent (frames, including header/trailer).
    pub bytes_sent: u64,
    /// Total bytes received.
    pub bytes_recv: u64,
    /// Per-type send tallies, indexed by `type_byte as usize % 32`.
    pub send_by_type: [u64; TYPE_TALLY_LEN],
    /// Per-type receive tallies, indexed by `type_byte as usize % 32`.
    pub recv_by_type: [u64; TYPE_TALLY_LEN],
    /// Soft + hard timeouts observed.
    pub timeouts: u32,
    /// Go-Back-N retransmissions triggered.
    pub retransmits: u32,
    /// Frames dropped for a header or trailer CRC mismatch.
    pub crc_errors: u32,
    /// Completed handshakes.
    pub handshakes: u32,
    /// Files successfully sent.
    pub files_sent: u32,
    /// Files successfully received.
    pub files_recv: u32,
    /// RTT samples folded into the adaptive RTO estimator.
    pub rtt_samples: u32,
}

impl Metrics {
    /// Record one frame sent of `frame_type`, `wire_len` bytes.
    pub fn on_send(&mut self, frame_type: FrameType, wire_len: usize) {
        self.packets_sent += 1;
        self.bytes_sent += wire_len as u64;
        self.send_by_type[(frame_type as usize) % TYPE_TALLY_LEN] += 1;
    }

    /// Record one frame received of `frame_type`, `wire_len` bytes.
    pub fn on_recv(&mut self, frame_type: FrameType, wire_len: usize) {
        self.packets_recv += 1;
        self.bytes_recv += wire_len as u64;
        self.recv_by_type[(frame_type as usize) % TYPE_TALLY_LEN] += 1;
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = Metrics::default();
    }
}

/// Per-packet-type send/recv audit plus sender-side inflight tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireAudit {
    /// HELLO frames sent.
    pub sent_hello: u64,
    /// SEND_META frames sent.
    pub sent_send_meta: u64,
    /// RESUME_REQ frames sent.
    pub sent_resume_req: u64,
    /// RESUME_RESP frames sent.
    pub sent_resume_resp: u64,
    /// VERIFY frames sent.
    pub sent_verify: u64,
    /// DATA frames sent.
    pub sent_data: u64,
    /// DATA_ACK frames sent.
    pub sent_data_ack: u64,
    /// DONE frames sent.
    pub sent_done: u64,
    /// ERROR frames sent.
    pub sent_error: u64,
    /// EOT frames sent.
    pub sent_eot: u64,
    /// EOT_ACK frames sent.
    pub sent_eot_ack: u64,
    /// DONE_ACK frames sent.
    pub sent_done_ack: u64,
    /// HELLO frames received.
    pub recv_hello: u64,
    /// SEND_META frames received.
    pub recv_send_meta: u64,
    /// RESUME_REQ frames received.
    pub recv_resume_req: u64,
    /// RESUME_RESP frames received.
    pub recv_resume_resp: u64,
    /// VERIFY frames received.
    pub recv_verify: u64,
    /// DATA frames received.
    pub recv_data: u64,
    /// DATA_ACK frames received.
    pub recv_data_ack: u64,
    /// DONE frames received.
    pub recv_done: u64,
    /// ERROR frames received.
    pub recv_error: u64,
    /// EOT frames received.
    pub recv_eot: u64,
    /// EOT_ACK frames received.
    pub recv_eot_ack: u64,
    /// DONE_ACK frames received.
    pub recv_done_ack: u64,
    /// Maximum simultaneous in-flight packets observed during a file.
    pub max_inflight_observed: u32,
    /// In-flight packet count at the last update.
    pub current_inflight: u32,
}

impl WireAudit {
    /// Record one sent frame of `frame_type`.
    pub fn on_send(&mut self, frame_type: FrameType) {
        let counter = match frame_type {
            FrameType::Hello => &mut self.sent_hello,
            FrameType::SendMeta => &mut self.sent_send_meta,
            FrameType::ResumeReq => &mut self.sent_resume_req,
            FrameType::ResumeResp => &mut self.sent_resume_resp,
            FrameType::Verify => &mut self.sent_verify,
            FrameType::Data => &mut self.sent_data,
            FrameType::DataAck | FrameType::DataNak => &mut self.sent_data_ack,
            FrameType::Done => &mut self.sent_done,
            FrameType::Error => &mut self.sent_error,
            FrameType::Eot => &mut self.sent_eot,
            FrameType::EotAck => &mut self.sent_eot_ack,
            FrameType::DoneAck => &mut self.sent_done_ack,
            FrameType::ModeSync | FrameType::ModeSyncAck | FrameType::Cancel => return,
        };
        *counter += 1;
    }

    /// Record one received frame of `frame_type`.
    pub fn on_recv(&mut self, frame_type: FrameType) {
        let counter = match frame_type {
            FrameType::Hello => &mut self.recv_hello,
            FrameType::SendMeta => &mut self.recv_send_meta,
            FrameType::ResumeReq => &mut self.recv_resume_req,
            FrameType::ResumeResp => &mut self.recv_resume_resp,
            FrameType::Verify => &mut self.recv_verify,
            FrameType::Data => &mut self.recv_data,
            FrameType::DataAck | FrameType::DataNak => &mut self.recv_data_ack,
            FrameType::Done => &mut self.recv_done,
            FrameType::Error => &mut self.recv_error,
            FrameType::Eot => &mut self.recv_eot,
            FrameType::EotAck => &mut self.recv_eot_ack,
            FrameType::DoneAck => &mut self.recv_done_ack,
            FrameType::ModeSync | FrameType::ModeSyncAck | FrameType::Cancel => return,
        };
        *counter += 1;
    }

    /// Update inflight tracking, growing the high-water mark as needed.
    pub fn set_inflight(&mut self, inflight: u32) {
        self.current_inflight = inflight;
        self.max_inflight_observed = self.max_inflight_observed.max(inflight);
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = WireAudit::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_tallies_by_type() {
        let mut metrics = Metrics::default();
        metrics.on_send(FrameType::Data, 100);
        metrics.on_send(FrameType::Data, 100);
        metrics.on_recv(FrameType::DataAck, 8);
        assert_eq!(metrics.packets_sent, 2);
        assert_eq!(metrics.bytes_sent, 200);
        assert_eq!(metrics.send_by_type[FrameType::Data as usize], 2);
        assert_eq!(metrics.recv_by_type[FrameType::DataAck as usize], 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut metrics = Metrics::default();
        metrics.on_send(FrameType::Hello, 44);
        metrics.reset();
        assert_eq!(metrics, Metrics::default());
    }

    #[test]
    fn wire_audit_tracks_high_water_inflight() {
        let mut audit = WireAudit::default();
        audit.set_inflight(4);
        audit.set_inflight(2);
        audit.set_inflight(6);
        assert_eq!(audit.current_inflight, 6);
        assert_eq!(audit.max_inflight_observed, 6);
    }

    #[test]
    fn wire_audit_counts_data_and_control_frames() {
        let mut audit = WireAudit::default();
        audit.on_send(FrameType::Data);
        audit.on_recv(FrameType::DataAck);
        audit.on_send(FrameType::Eot);
        assert_eq!(audit.sent_data, 1);
        assert_eq!(audit.recv_data_ack, 1);
        assert_eq!(audit.sent_eot, 1);
    }
}
