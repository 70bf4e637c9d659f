//! An in-memory, fault-injecting duplex [`Transport`] pair for tests.
//!
//! Grounded on the reference implementation's `test_duplex_t` and
//! `fault_injection_t` (paired byte FIFOs plus per-frame bit-flip/drop/
//! duplicate probabilities), reworked as two [`Transport`] implementors
//! sharing a pair of condvar-guarded queues so each side can live on its
//! own thread exactly as a real transport would.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::traits::Transport;

/// Per-frame fault injection knobs, each a probability in parts per
/// million (matching the reference implementation's fixed-point scale so
/// the same seeds produce the same behavior).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultInjection {
    /// Probability, per byte of a send, that one bit is flipped.
    pub bitflip_per_million: u32,
    /// Probability, per send call, that the entire write is dropped.
    pub drop_frame_per_million: u32,
    /// Probability, per send call, that the write is duplicated.
    pub dup_frame_per_million: u32,
    /// Bytes of clean, unmodified passthrough at the start of the
    /// stream, so a handshake can complete before faults kick in. `0`
    /// disables the grace window.
    pub handshake_grace_bytes: u64,
}

impl FaultInjection {
    /// No faults at all — a perfectly reliable in-memory pipe.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }
}

struct Pcg {
    state: u64,
}

impl Pcg {
    fn new(seed: u64) -> Self {
        Pcg { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.state >> 32) as u32
    }

    /// `true` with probability `per_million / 1_000_000`.
    fn roll(&mut self, per_million: u32) -> bool {
        if per_million == 0 {
            return false;
        }
        (self.next_u32() % 1_000_000) < per_million
    }
}

struct Fifo {
    buf: Mutex<VecDeque<u8>>,
    ready: Condvar,
}

impl Fifo {
    fn new() -> Self {
        Fifo {
            buf: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    fn push(&self, data: &[u8]) {
        let mut buf = self.buf.lock().expect("duplex fifo mutex poisoned");
        buf.extend(data.iter().copied());
        self.ready.notify_all();
    }

    fn pop_some(&self, out: &mut [u8], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut buf = self.buf.lock().expect("duplex fifo mutex poisoned");
        loop {
            if !buf.is_empty() {
                let n = out.len().min(buf.len());
                for slot in out.iter_mut().take(n) {
                    *slot = buf.pop_front().expect("checked non-empty above");
                }
                return n;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return 0;
            }
            let (guard, result) = self
                .ready
                .wait_timeout(buf, remaining)
                .expect("duplex fifo condvar poisoned");
            buf = guard;
            if result.timed_out() && buf.is_empty() {
                return 0;
            }
        }
    }
}

/// One end of an in-memory duplex transport. Construct a connected pair
/// with [`duplex_pair`].
pub struct DuplexTransport {
    outbound: Arc<Fifo>,
    inbound: Arc<Fifo>,
    faults: FaultInjection,
    rng: Pcg,
    bytes_sent: u64,
}

/// Build a connected pair of [`DuplexTransport`] endpoints, `a` and `b`,
/// each applying `faults` to its own outbound direction.
#[must_use]
pub fn duplex_pair(faults: FaultInjection, seed: u64) -> (DuplexTransport, DuplexTransport) {
    let a2b = Arc::new(Fifo::new());
    let b2a = Arc::new(Fifo::new());
    let a = DuplexTransport {
        outbound: Arc::clone(&a2b),
        inbound: Arc::clone(&b2a),
        faults,
        rng: Pcg::new(seed),
        bytes_sent: 0,
    };
    let b = DuplexTransport {
        outbound: b2a,
        inbound: a2b,
        faults,
        rng: Pcg::new(seed ^ 0xD1B5_4A32_D192_ED03),
        bytes_sent: 0,
    };
    (a, b)
}

impl DuplexTransport {
    fn in_grace_window(&self, len: usize) -> bool {
        self.faults.handshake_grace_bytes > 0
            && self.bytes_sent + len as u64 <= self.faults.handshake_grace_bytes
    }

    fn apply_bitflips(&mut self, data: &[u8]) -> Vec<u8> {
        if self.faults.bitflip_per_million == 0 {
            return data.to_vec();
        }
        data.iter()
            .map(|&byte| {
                if self.rng.roll(self.faults.bitflip_per_million) {
                    let bit = self.rng.next_u32() % 8;
                    byte ^ (1 << bit)
                } else {
                    byte
                }
            })
            .collect()
    }
}

impl Transport for DuplexTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let skip_faults = self.in_grace_window(data.len());
        self.bytes_sent += data.len() as u64;

        if !skip_faults && self.rng.roll(self.faults.drop_frame_per_million) {
            return Ok(());
        }

        let payload = if skip_faults {
            data.to_vec()
        } else {
            self.apply_bitflips(data)
        };
        self.outbound.push(&payload);

        if !skip_faults && self.rng.roll(self.faults.dup_frame_per_million) {
            self.outbound.push(&payload);
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        Ok(self.inbound.pop_some(buf, timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_pipe_round_trips() {
        let (mut a, mut b) = duplex_pair(FaultInjection::none(), 1);
        a.send(b"hello").unwrap();
        let mut buf = [0u8; 16];
        let n = b.recv(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn recv_times_out_on_empty_pipe() {
        let (_a, mut b) = duplex_pair(FaultInjection::none(), 2);
        let mut buf = [0u8; 16];
        let n = b.recv(&mut buf, Duration::from_millis(20)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn duplex_is_bidirectional() {
        let (mut a, mut b) = duplex_pair(FaultInjection::none(), 3);
        a.send(b"ping").unwrap();
        b.send(b"pong").unwrap();
        let mut buf = [0u8; 16];
        let n = b.recv(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(&buf[..n], b"ping");
        let n = a.recv(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn total_drop_never_delivers() {
        let faults = FaultInjection {
            drop_frame_per_million: 1_000_000,
            ..FaultInjection::none()
        };
        let (mut a, mut b) = duplex_pair(faults, 4);
        a.send(b"gone").unwrap();
        let mut buf = [0u8; 16];
        let n = b.recv(&mut buf, Duration::from_millis(20)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn total_duplicate_delivers_twice() {
        let faults = FaultInjection {
            dup_frame_per_million: 1_000_000,
            ..FaultInjection::none()
        };
        let (mut a, mut b) = duplex_pair(faults, 5);
        a.send(b"x").unwrap();
        let mut buf = [0u8; 16];
        let n1 = b.recv(&mut buf, Duration::from_millis(50)).unwrap();
        let n2 = b.recv(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(n1, 1);
        assert_eq!(n2, 1);
    }

    #[test]
    fn handshake_grace_window_passes_through_unmodified() {
        let faults = FaultInjection {
            bitflip_per_million: 1_000_000,
            drop_frame_per_million: 1_000_000,
            handshake_grace_bytes: 8,
            ..FaultInjection::none()
        };
        let (mut a, mut b) = duplex_pair(faults, 6);
        a.send(b"cleanbyt").unwrap();
        let mut buf = [0u8; 16];
        let n = b.recv(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(&buf[..n], b"cleanbyt");
    }

    #[test]
    fn total_bitflip_corrupts_every_byte() {
        let faults = FaultInjection {
            bitflip_per_million: 1_000_000,
            ..FaultInjection::none()
        };
        let (mut a, mut b) = duplex_pair(faults, 7);
        a.send(&[0u8; 32]).unwrap();
        let mut buf = [0u8; 32];
        let n = b.recv(&mut buf, Duration::from_millis(50)).unwrap();
        assert_eq!(n, 32);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
