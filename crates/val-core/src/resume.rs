//! Receiver-driven resume decision matrix and CRC verify sub-protocol.

use val_checksums::{Crc32Accumulator, Crc32Engine};
use val_transport::{Clock, Filesystem, Transport};

use crate::config::ResumeMode;
use crate::error::Result;
use crate::session::Session;

/// The local file state the resume matrix is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocalState {
    Missing,
    ShorterThanIncoming,
    SameSizeAsIncoming,
    LargerThanIncoming,
}

impl LocalState {
    pub(crate) fn classify(local_exists: bool, local_size: u64, incoming_size: u64) -> Self {
        if !local_exists {
            LocalState::Missing
        } else if local_size < incoming_size {
            LocalState::ShorterThanIncoming
        } else if local_size == incoming_size {
            LocalState::SameSizeAsIncoming
        } else {
            LocalState::LargerThanIncoming
        }
    }
}

/// Outcome of consulting the resume matrix, before any CRC verify has
/// run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumeDecision {
    /// Resume from this local byte offset (always `0` for a fresh file).
    Resume(u64),
    /// Restart from offset zero, discarding any local content.
    Restart,
    /// Skip the file entirely.
    Skip,
    /// Stream a CRC over `[offset, offset + length)` before deciding;
    /// `on_match`/`on_mismatch` name the terminal decision for each
    /// outcome.
    Verify {
        offset: u64,
        length: u64,
        on_match: Box<ResumeDecision>,
        on_mismatch: Box<ResumeDecision>,
    },
}

/// Consult the resume decision matrix given an explicit [`LocalState`]
/// (spec §4.3), without performing any I/O. `receiver.rs` determines the
/// state from the filesystem before calling this.
pub(crate) fn decide_with_existence(
    mode: ResumeMode,
    state: LocalState,
    local_size: u64,
    tail_cap_bytes: u64,
    full_verify_cap_bytes: u64,
) -> ResumeDecision {
    use LocalState::{LargerThanIncoming, Missing, SameSizeAsIncoming, ShorterThanIncoming};
    use ResumeDecision::{Restart, Resume, Skip};

    if state == Missing {
        return Resume(0);
    }

    match mode {
        ResumeMode::Never => Restart,
        ResumeMode::SkipExisting => Skip,
        ResumeMode::CrcTail | ResumeMode::CrcTailOrZero => {
            let restart_on_mismatch = mode == ResumeMode::CrcTailOrZero;
            match state {
                ShorterThanIncoming => verify_tail(
                    local_size,
                    tail_cap_bytes,
                    Resume(local_size),
                    if restart_on_mismatch { Restart } else { Skip },
                ),
                SameSizeAsIncoming => verify_tail(
                    local_size,
                    tail_cap_bytes,
                    Skip,
                    if restart_on_mismatch { Restart } else { Skip },
                ),
                LargerThanIncoming => {
                    if restart_on_mismatch {
                        Restart
                    } else {
                        Skip
                    }
                }
                Missing => unreachable!("handled above"),
            }
        }
        ResumeMode::CrcFull | ResumeMode::CrcFullOrZero => {
            let restart_on_mismatch = mode == ResumeMode::CrcFullOrZero;
            let verify_len = local_size.min(full_verify_cap_bytes);
            match state {
                ShorterThanIncoming => verify_full(
                    local_size,
                    verify_len,
                    Resume(local_size),
                    if restart_on_mismatch { Restart } else { Skip },
                ),
                SameSizeAsIncoming => verify_full(
                    local_size,
                    verify_len,
                    Skip,
                    if restart_on_mismatch { Restart } else { Skip },
                ),
                LargerThanIncoming => {
                    if restart_on_mismatch {
                        Restart
                    } else {
                        Skip
                    }
                }
                Missing => unreachable!("handled above"),
            }
        }
    }
}

fn verify_tail(
    local_size: u64,
    tail_cap_bytes: u64,
    on_match: ResumeDecision,
    on_mismatch: ResumeDecision,
) -> ResumeDecision {
    let length = local_size.min(tail_cap_bytes.max(1));
    let offset = local_size - length;
    ResumeDecision::Verify {
        offset,
        length,
        on_match: Box::new(on_match),
        on_mismatch: Box::new(on_mismatch),
    }
}

fn verify_full(
    local_size: u64,
    verify_len: u64,
    on_match: ResumeDecision,
    on_mismatch: ResumeDecision,
) -> ResumeDecision {
    // A local file within the cap gets a true full-prefix verify from
    // offset 0. One past the cap transparently falls back to a tail
    // verify of the last `verify_len` bytes instead.
    let offset = local_size - verify_len;
    ResumeDecision::Verify {
        offset,
        length: verify_len,
        on_match: Box::new(on_match),
        on_mismatch: Box::new(on_mismatch),
    }
}

impl<T: Transport, F: Filesystem, C: Clock> Session<T, F, C> {
    /// Stream a CRC32 over `[offset, offset + length)` of `path`,
    /// reading through the filesystem adapter in `recv_buf`-sized
    /// chunks.
    pub(crate) fn crc_over_range(&mut self, path: &str, offset: u64, length: u64) -> Result<u32> {
        let mut file = self
            .filesystem
            .open(path, false)
            .map_err(|e| crate::error::SessionError::io("fs_open", e))?;
        self.filesystem
            .seek(&mut file, offset as i64, val_transport::Whence::Start)
            .map_err(|e| crate::error::SessionError::io("fs_seek", e))?;

        let mut accumulator = self.crc_engine.start();
        let mut remaining = length;
        let chunk_size = self.negotiated.packet_size.max(512) as usize;
        let mut buf = vec![0u8; chunk_size];
        while remaining > 0 {
            let want = (remaining as usize).min(buf.len());
            let n = self
                .filesystem
                .read(&mut file, &mut buf[..want])
                .map_err(|e| crate::error::SessionError::io("fs_read", e))?;
            if n == 0 {
                break;
            }
            accumulator.update(&buf[..n]);
            remaining -= n as u64;
        }
        let _ = self.filesystem.close(file);
        Ok(accumulator.finalize())
    }
}
