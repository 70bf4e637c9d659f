//! HELLO exchange: version check, MTU negotiation, feature intersection,
//! and flow-control capability exchange.

use val_protocol::constants::{MAX_PACKET_SIZE, MIN_PACKET_SIZE, VERSION_MAJOR, VERSION_MINOR};
use val_protocol::error::{Code, Detail};
use val_protocol::frame::Frame;
use val_protocol::header::{FrameHeader, FrameType};
use val_protocol::payload::Hello;
use val_transport::{Clock, DebugLevel, Filesystem, Transport};

use crate::error::{Result, SessionError};
use crate::session::Session;

impl<T: Transport, F: Filesystem, C: Clock> Session<T, F, C> {
    /// Run the one HELLO round-trip this session performs. Idempotent
    /// only in the sense that calling it twice re-negotiates; callers
    /// (`send_files`/`receive_files`) call it exactly once.
    pub(crate) fn run_handshake(&mut self) -> Result<()> {
        self.check_not_terminal("handshake")?;

        let local = Hello {
            version_major: VERSION_MAJOR,
            version_minor: VERSION_MINOR,
            packet_size: self.config.buffers.packet_size,
            features: self.config.supported_features,
            required: self.config.required_features,
            requested: self.config.requested_features,
            tx_max_window_packets: self.config.flow_control.window_cap_packets,
            rx_max_window_packets: self.config.flow_control.window_cap_packets,
            ack_stride_packets: self.config.flow_control.ack_stride_packets,
        };

        let mut payload = [0u8; val_protocol::constants::HELLO_LEN];
        local.encode(&mut payload);
        let frame = Frame::new(FrameHeader::new(FrameType::Hello, 0), payload.to_vec());
        self.write_frame(&frame)
            .map_err(|e| self.fail("handshake", e))?;

        let retries = self.config.retries.handshake;
        let frame = self.await_frame(
            retries,
            |t| t == FrameType::Hello,
            "handshake",
            Detail::TIMEOUT_HELLO,
        )?;
        let peer = Hello::decode(&frame.payload)
            .map_err(|e| self.fail("handshake", SessionError::Protocol(e)))?;

        if peer.version_major != VERSION_MAJOR {
            let err = SessionError::Protocol(val_protocol::error::ProtocolError::new(
                Code::IncompatibleVersion,
                Detail::VERSION,
            ));
            return Err(self.fail("handshake", err));
        }

        let negotiated_mtu = local.packet_size.min(peer.packet_size);
        if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&negotiated_mtu) {
            let err = SessionError::Protocol(val_protocol::error::ProtocolError::new(
                Code::PacketSizeMismatch,
                Detail::PACKET_SIZE,
            ));
            return Err(self.fail("handshake", err));
        }

        let missing = self.config.required_features & !peer.features;
        if missing != 0 {
            let err = SessionError::Protocol(val_protocol::error::ProtocolError::new(
                Code::FeatureNegotiation,
                Detail::missing_features(missing).0,
            ));
            return Err(self.fail("handshake", err));
        }

        let effective_window_cap = u32::from(self.config.flow_control.window_cap_packets)
            .min(u32::from(peer.rx_max_window_packets))
            .min(u32::from(peer.tx_max_window_packets))
            .max(1);

        let effective_features = (self.config.requested_features | peer.requested)
            & peer.features
            & self.config.supported_features;

        self.negotiated.packet_size = negotiated_mtu;
        self.negotiated.effective_window_cap = effective_window_cap;
        self.negotiated.ack_stride = peer.ack_stride_packets;
        self.negotiated.peer_window_cap = u32::from(peer.rx_max_window_packets);
        self.negotiated.effective_features = effective_features;

        self.metrics.handshakes += 1;
        self.log(DebugLevel::Debug, "handshake complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use val_transport::{duplex_pair, FaultInjection, MemFs, TestClock};

    fn session_pair() -> (
        Session<val_transport::DuplexTransport, MemFs, TestClock>,
        Session<val_transport::DuplexTransport, MemFs, TestClock>,
    ) {
        let (ta, tb) = duplex_pair(FaultInjection::none(), 1);
        let config = ConfigBuilder::new().build().unwrap();
        let a = Session::new(config.clone(), ta, MemFs::new(), TestClock::new());
        let b = Session::new(config, tb, MemFs::new(), TestClock::new());
        (a, b)
    }

    #[test]
    fn handshake_negotiates_minimum_packet_size() {
        let (mut a, mut b) = session_pair();
        std::thread::scope(|scope| {
            let ha = scope.spawn(|| a.run_handshake());
            let hb = scope.spawn(|| b.run_handshake());
            ha.join().unwrap().unwrap();
            hb.join().unwrap().unwrap();
        });
        assert_eq!(a.effective_packet_size(), a.config.buffers.packet_size);
        assert_eq!(b.effective_packet_size(), b.config.buffers.packet_size);
    }

    #[test]
    fn handshake_computes_effective_features_from_the_formula() {
        let (mut a, mut b) = session_pair();
        std::thread::scope(|scope| {
            let ha = scope.spawn(|| a.run_handshake());
            let hb = scope.spawn(|| b.run_handshake());
            ha.join().unwrap().unwrap();
            hb.join().unwrap().unwrap();
        });
        // No feature bits are defined yet, so both sides negotiate down
        // to zero, but the formula still runs on every handshake.
        assert_eq!(a.effective_features(), 0);
        assert_eq!(b.effective_features(), 0);
    }

    #[test]
    fn handshake_rejects_incompatible_major_version() {
        let (mut ta, tb) = duplex_pair(FaultInjection::none(), 2);
        let config = ConfigBuilder::new().build().unwrap();

        let bad_hello = Hello {
            version_major: VERSION_MAJOR.wrapping_add(1),
            version_minor: 0,
            packet_size: 4096,
            features: 0,
            required: 0,
            requested: 0,
            tx_max_window_packets: 8,
            rx_max_window_packets: 8,
            ack_stride_packets: 0,
        };
        let mut raw = [0u8; val_protocol::constants::HELLO_LEN];
        bad_hello.encode(&mut raw);
        let frame = Frame::new(FrameHeader::new(FrameType::Hello, 0), raw.to_vec());
        let mut out = vec![0u8; frame.wire_len()];
        frame.encode(&mut out);
        ta.send(&out).unwrap();

        let mut b = Session::new(config, tb, MemFs::new(), TestClock::new());
        let err = b.run_handshake().unwrap_err();
        match err {
            SessionError::Protocol(e) => assert_eq!(e.code, Code::IncompatibleVersion),
            _ => panic!("expected protocol error"),
        }
    }
}
