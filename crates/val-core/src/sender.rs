//! Sender-side file loop: META, resume negotiation, windowed DATA, DONE,
//! and the batch-level EOT handshake.

use val_protocol::constants::{META_LEN, VERIFY_RESPONSE_LEN};
use val_protocol::error::{Code, Detail, ProtocolError};
use val_protocol::frame::Frame;
use val_protocol::header::{
    FrameHeader, FrameType, DATA_FINAL_CHUNK, DATA_OFFSET_PRESENT,
};
use val_protocol::payload::{Meta, ResumeAction, ResumeResp, VerifyResponse};
use val_protocol::sanitize::{clean_filename, clean_path};
use val_transport::{Clock, DebugLevel, Filesystem, Transport, Whence};

use crate::config::{FileStatus, Progress};
use crate::error::{Result, SessionError};
use crate::session::Session;

/// Bytes of DATA payload spent on the leading absolute-offset prefix.
const DATA_OFFSET_PREFIX_LEN: usize = 8;

impl<T: Transport, F: Filesystem, C: Clock> Session<T, F, C> {
    /// Run the handshake once, then send every path in `paths` in order
    /// and finish with EOT. Paths are read through the filesystem
    /// adapter; the wire `filename` sent in META is always the sanitized
    /// basename, never the full local path.
    pub fn send_files(&mut self, paths: &[String]) -> Result<()> {
        self.check_not_terminal("send_files")?;
        self.run_handshake()?;

        let mut batch_bytes = 0u64;
        for path in paths {
            self.send_one_file(path, &mut batch_bytes)?;
        }

        self.send_eot()?;
        Ok(())
    }

    fn send_one_file(&mut self, path: &str, batch_bytes: &mut u64) -> Result<()> {
        self.check_not_terminal("send_file")?;
        let filename = clean_filename(path);

        let mut probe = self
            .filesystem
            .open(path, false)
            .map_err(|e| self.fail("send_file", SessionError::io("fs_open", e)))?;
        let file_size = self
            .filesystem
            .seek(&mut probe, 0, Whence::End)
            .map_err(|e| self.fail("send_file", SessionError::io("fs_seek", e)))?;
        let _ = self.filesystem.close(probe);

        let file_crc32 = self.crc_over_range(path, 0, file_size)?;

        if let Some(cb) = self.config.on_file_start.clone() {
            cb(&filename, path, 0, file_size);
        }

        let meta = Meta {
            filename: filename.clone(),
            sender_path: clean_path(path),
            file_size,
            file_crc32,
        };
        let mut meta_buf = [0u8; META_LEN];
        meta.encode(&mut meta_buf);
        let meta_frame = Frame::new(FrameHeader::new(FrameType::SendMeta, 0), meta_buf.to_vec());
        self.write_frame(&meta_frame)
            .map_err(|e| self.fail("send_meta", e))?;
        self.log(DebugLevel::Debug, &format!("sent META for {filename}"));

        let start_offset = match self.negotiate_resume(path)? {
            None => {
                if let Some(cb) = self.config.on_file_complete.clone() {
                    cb(&filename, path, FileStatus::Skipped);
                }
                return Ok(());
            }
            Some(offset) => offset,
        };

        let mut file = self
            .filesystem
            .open(path, false)
            .map_err(|e| self.fail("send_file", SessionError::io("fs_open", e)))?;

        let result = self.send_data_loop(
            &mut file,
            &filename,
            file_size,
            start_offset,
            batch_bytes,
        );
        let _ = self.filesystem.close(file);
        result?;

        self.metrics.files_sent += 1;
        if let Some(cb) = self.config.on_file_complete.clone() {
            cb(&filename, path, FileStatus::Ok);
        }
        Ok(())
    }

    /// Wait for the receiver's resume decision(s), answering any
    /// VERIFY_REQUIRED round before the terminal decision. Returns the
    /// byte offset to resume from, or `None` if the file should be
    /// skipped entirely.
    fn negotiate_resume(&mut self, path: &str) -> Result<Option<u64>> {
        loop {
            let retries = self.config.retries.meta;
            let frame = self.await_frame(
                retries,
                |t| t == FrameType::ResumeResp,
                "resume_negotiate",
                Detail::TIMEOUT_META,
            )?;
            let resp = ResumeResp::decode(&frame.payload)
                .map_err(|e| self.fail("resume_negotiate", SessionError::Protocol(e)))?;

            match resp.action {
                ResumeAction::Skip => return Ok(None),
                ResumeAction::RestartZero => return Ok(Some(0)),
                ResumeAction::ResumeFromOffset => return Ok(Some(resp.resume_offset)),
                ResumeAction::Abort => {
                    let err = SessionError::Protocol(ProtocolError::new(
                        Code::Aborted,
                        Detail::NONE.0,
                    ));
                    return Err(self.fail("resume_negotiate", err));
                }
                ResumeAction::VerifyRequired => {
                    let sender_crc =
                        self.crc_over_range(path, resp.resume_offset, resp.verify_length)?;
                    let verify_resp = VerifyResponse {
                        status: 0,
                        sender_crc,
                    };
                    let mut buf = [0u8; VERIFY_RESPONSE_LEN];
                    verify_resp.encode(&mut buf);
                    let frame = Frame::new(FrameHeader::new(FrameType::Verify, 0), buf.to_vec());
                    self.write_frame(&frame)
                        .map_err(|e| self.fail("resume_verify", e))?;
                    continue;
                }
            }
        }
    }

    fn send_data_loop(
        &mut self,
        file: &mut F::File,
        filename: &str,
        file_size: u64,
        start_offset: u64,
        batch_bytes: &mut u64,
    ) -> Result<()> {
        self.filesystem
            .seek(file, start_offset as i64, Whence::Start)
            .map_err(|e| self.fail("send_data", SessionError::io("fs_seek", e)))?;

        let chunk_cap = (self.negotiated.packet_size as usize)
            .saturating_sub(val_protocol::constants::HEADER_LEN)
            .saturating_sub(val_protocol::constants::TRAILER_LEN)
            .saturating_sub(DATA_OFFSET_PREFIX_LEN)
            .max(1);

        let mut next_to_send = start_offset;
        let mut last_acked = start_offset;
        let mut inflight: u32 = 0;
        let mut cache: Option<(u64, Vec<u8>)> = None;
        let mut consecutive_window_timeouts = 0u32;
        let max_window_timeouts = self.config.retries.data.saturating_mul(4).max(4);

        while last_acked < file_size {
            self.check_not_terminal("send_data")?;

            while inflight < self.cwnd.packets() && next_to_send < file_size {
                let want = chunk_cap.min((file_size - next_to_send) as usize);
                let mut chunk = vec![0u8; want];
                let n = self
                    .filesystem
                    .read(file, &mut chunk)
                    .map_err(|e| self.fail("send_data", SessionError::io("fs_read", e)))?;
                chunk.truncate(n);

                let is_final = next_to_send + n as u64 >= file_size;
                let mut payload = Vec::with_capacity(DATA_OFFSET_PREFIX_LEN + chunk.len());
                payload.extend_from_slice(&next_to_send.to_le_bytes());
                payload.extend_from_slice(&chunk);

                let mut flags = DATA_OFFSET_PRESENT;
                if is_final {
                    flags |= DATA_FINAL_CHUNK;
                }
                let mut header = FrameHeader::new(FrameType::Data, 0);
                header.flags = flags;
                header.type_data = next_to_send as u32;
                let frame = Frame::new(header, payload);
                self.write_frame(&frame)
                    .map_err(|e| self.fail("send_data", e))?;

                if self.config.flow_control.retransmit_cache_enabled {
                    cache = Some((next_to_send, chunk.clone()));
                }

                next_to_send += n as u64;
                inflight += 1;
                self.wire_audit.set_inflight(inflight);
            }

            let retries = self.config.retries.data;
            let frame = self.await_frame(
                retries,
                |t| t == FrameType::DataAck || t == FrameType::DataNak,
                "send_data",
                Detail::TIMEOUT_ACK,
            );

            let frame = match frame {
                Ok(f) => {
                    consecutive_window_timeouts = 0;
                    f
                }
                Err(err) => {
                    if self.terminal {
                        // An ERROR/CANCEL frame from the peer, not a
                        // retriable ACK-wait timeout.
                        return Err(err);
                    }
                    consecutive_window_timeouts += 1;
                    if consecutive_window_timeouts >= max_window_timeouts {
                        return Err(err);
                    }
                    self.cwnd.on_timeout();
                    next_to_send = last_acked;
                    self.filesystem
                        .seek(file, next_to_send as i64, Whence::Start)
                        .map_err(|e| self.fail("send_data", SessionError::io("fs_seek", e)))?;
                    inflight = 0;
                    continue;
                }
            };

            let next_expected = u64::from_le_bytes(
                frame.payload[0..8]
                    .try_into()
                    .unwrap_or([0u8; 8]),
            );

            match frame.header.frame_type {
                FrameType::DataAck => {
                    if next_expected > last_acked {
                        let advanced = next_expected - last_acked;
                        last_acked = next_expected;
                        *batch_bytes += advanced;
                        let outstanding = next_to_send - last_acked;
                        inflight = outstanding.div_ceil(chunk_cap as u64) as u32;
                        self.cwnd.on_ack_progress();
                        if let Some(cb) = self.config.on_progress.clone() {
                            cb(
                                filename,
                                Progress {
                                    file_bytes: last_acked - start_offset,
                                    file_total: file_size - start_offset,
                                    batch_bytes: *batch_bytes,
                                },
                            );
                        }
                    }
                }
                FrameType::DataNak => {
                    self.metrics.retransmits += 1;
                    self.cwnd.on_nak();

                    // If the NAK asks for exactly the chunk we just sent,
                    // resend it from the cache rather than re-seeking: the
                    // file cursor is already positioned for new data past
                    // it, and rewinding would disturb that.
                    let resent_from_cache = if let Some((cached_offset, cached_bytes)) = &cache {
                        if *cached_offset == next_expected {
                            let is_final =
                                cached_offset + cached_bytes.len() as u64 >= file_size;
                            let mut payload =
                                Vec::with_capacity(DATA_OFFSET_PREFIX_LEN + cached_bytes.len());
                            payload.extend_from_slice(&cached_offset.to_le_bytes());
                            payload.extend_from_slice(cached_bytes);
                            let mut flags = DATA_OFFSET_PRESENT;
                            if is_final {
                                flags |= DATA_FINAL_CHUNK;
                            }
                            let mut header = FrameHeader::new(FrameType::Data, 0);
                            header.flags = flags;
                            header.type_data = *cached_offset as u32;
                            let frame = Frame::new(header, payload);
                            self.write_frame(&frame)
                                .map_err(|e| self.fail("send_data", e))?;
                            inflight = 1;
                            true
                        } else {
                            false
                        }
                    } else {
                        false
                    };

                    if !resent_from_cache {
                        next_to_send = next_expected;
                        self.filesystem
                            .seek(file, next_to_send as i64, Whence::Start)
                            .map_err(|e| self.fail("send_data", SessionError::io("fs_seek", e)))?;
                        inflight = 0;
                    }
                }
                _ => unreachable!("await_frame only accepts ACK/NAK"),
            }
        }

        self.wire_audit.set_inflight(0);

        let done_frame = Frame::new(FrameHeader::new(FrameType::Done, 0), Vec::new());
        self.write_frame(&done_frame)
            .map_err(|e| self.fail("send_done", e))?;
        self.await_frame(
            self.config.retries.ack,
            |t| t == FrameType::DoneAck,
            "send_done",
            Detail::TIMEOUT_ACK,
        )?;
        Ok(())
    }

    fn send_eot(&mut self) -> Result<()> {
        let eot_frame = Frame::new(FrameHeader::new(FrameType::Eot, 0), Vec::new());
        self.write_frame(&eot_frame)
            .map_err(|e| self.fail("send_eot", e))?;
        self.await_frame(
            self.config.retries.ack,
            |t| t == FrameType::EotAck,
            "send_eot",
            Detail::TIMEOUT_ACK,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use val_transport::{duplex_pair, FaultInjection, MemFs, TestClock};

    #[test]
    fn send_one_small_file_completes_against_a_cooperative_peer() {
        let (ta, tb) = duplex_pair(FaultInjection::none(), 7);
        let config = ConfigBuilder::new().build().unwrap();

        let fs_a = MemFs::new();
        fs_a.seed("src.bin", vec![0xABu8; 10_000]);
        let mut a = Session::new(config.clone(), ta, fs_a, TestClock::new());

        let mut b = Session::new(config, tb, MemFs::new(), TestClock::new());

        std::thread::scope(|scope| {
            let sender = scope.spawn(|| a.send_files(&["src.bin".to_string()]));
            let receiver = scope.spawn(|| b.receive_files(""));
            sender.join().unwrap().unwrap();
            receiver.join().unwrap().unwrap();
        });

        assert_eq!(a.metrics().files_sent, 1);
        assert_eq!(b.metrics().files_recv, 1);
        assert_eq!(
            b.filesystem.read_to_vec("src.bin").unwrap(),
            vec![0xABu8; 10_000]
        );
    }
}
