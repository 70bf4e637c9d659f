//! Receiver-side file loop: META acceptance, resume negotiation, in-order
//! DATA acceptance, DONE, and the batch-level EOT handshake.

use val_protocol::constants::{RESUME_RESP_LEN};
use val_protocol::error::{Code, Detail, ProtocolError};
use val_protocol::frame::Frame;
use val_protocol::header::{FrameHeader, FrameType};
use val_protocol::payload::{Meta, ResumeAction, ResumeResp, VerifyResponse};
use val_transport::{Clock, DebugLevel, Filesystem, Transport, Whence};

use crate::config::{FileStatus, Progress, ValidatorAction};
use crate::config::ResumeMode;
use crate::error::{Result, SessionError};
use crate::resume::{decide_with_existence, LocalState, ResumeDecision};
use crate::session::Session;

fn join_path(dir: &str, filename: &str) -> String {
    if dir.is_empty() {
        filename.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{filename}")
    } else {
        format!("{dir}/{filename}")
    }
}

impl<T: Transport, F: Filesystem, C: Clock> Session<T, F, C> {
    /// Run the handshake once, then accept files into `output_dir` until
    /// the sender's EOT arrives, acknowledging it before returning.
    pub fn receive_files(&mut self, output_dir: &str) -> Result<()> {
        self.check_not_terminal("receive_files")?;
        self.run_handshake()?;

        loop {
            self.check_not_terminal("receive_files")?;
            let frame = self.await_frame(
                self.config.retries.meta,
                |t| t == FrameType::SendMeta || t == FrameType::Eot,
                "receive_files",
                Detail::TIMEOUT_META,
            )?;

            match frame.header.frame_type {
                FrameType::Eot => {
                    let ack = Frame::new(FrameHeader::new(FrameType::EotAck, 0), Vec::new());
                    self.write_frame(&ack).map_err(|e| self.fail("receive_files", e))?;
                    return Ok(());
                }
                FrameType::SendMeta => {
                    let meta = Meta::decode(&frame.payload)
                        .map_err(|e| self.fail("receive_files", SessionError::Protocol(e)))?;
                    self.receive_one_file(&meta, output_dir)?;
                }
                _ => unreachable!("await_frame only accepts SEND_META/EOT"),
            }
        }
    }

    fn receive_one_file(&mut self, meta: &Meta, output_dir: &str) -> Result<()> {
        let target_path = join_path(output_dir, &meta.filename);

        if let Some(cb) = self.config.on_file_start.clone() {
            cb(&meta.filename, &target_path, 0, meta.file_size);
        }

        if self.config.resume.mode == ResumeMode::Never {
            if let Some(validator) = self.config.metadata_validator.clone() {
                match validator(meta, &target_path) {
                    ValidatorAction::Abort => {
                        self.send_resume_resp(ResumeAction::Abort, 0, 0, 0)?;
                        let err =
                            SessionError::Protocol(ProtocolError::new(Code::Aborted, Detail::NONE.0));
                        return Err(self.fail("receive_file", err));
                    }
                    ValidatorAction::Skip => {
                        self.send_resume_resp(ResumeAction::Skip, 0, 0, 0)?;
                        if let Some(cb) = self.config.on_file_complete.clone() {
                            cb(&meta.filename, &target_path, FileStatus::Skipped);
                        }
                        return Ok(());
                    }
                    ValidatorAction::Accept => {}
                }
            }
        }

        let (exists, local_size) = self.probe_local_file(&target_path)?;
        let state = LocalState::classify(exists, local_size, meta.file_size);
        let decision = decide_with_existence(
            self.config.resume.mode,
            state,
            local_size,
            self.config.resume.tail_cap_bytes,
            self.config.resume.full_verify_cap_bytes,
        );

        let final_decision = match decision {
            ResumeDecision::Verify {
                offset,
                length,
                on_match,
                on_mismatch,
            } => {
                let own_crc = self.crc_over_range(&target_path, offset, length)?;
                self.send_resume_resp(ResumeAction::VerifyRequired, offset, own_crc, length)?;

                let frame = self.await_frame(
                    self.config.retries.meta,
                    |t| t == FrameType::Verify,
                    "resume_verify",
                    Detail::TIMEOUT_META,
                )?;
                let verify_resp = VerifyResponse::decode(&frame.payload)
                    .map_err(|e| self.fail("resume_verify", SessionError::Protocol(e)))?;

                if verify_resp.status == 0 && verify_resp.sender_crc == own_crc {
                    *on_match
                } else {
                    *on_mismatch
                }
            }
            other => other,
        };

        match final_decision {
            ResumeDecision::Skip => {
                self.send_resume_resp(ResumeAction::Skip, 0, 0, 0)?;
                if let Some(cb) = self.config.on_file_complete.clone() {
                    cb(&meta.filename, &target_path, FileStatus::Skipped);
                }
                Ok(())
            }
            ResumeDecision::Restart => {
                self.send_resume_resp(ResumeAction::RestartZero, 0, 0, 0)?;
                self.run_receive_data_loop(&target_path, meta, 0)
            }
            ResumeDecision::Resume(offset) => {
                self.send_resume_resp(ResumeAction::ResumeFromOffset, offset, 0, 0)?;
                self.run_receive_data_loop(&target_path, meta, offset)
            }
            ResumeDecision::Verify { .. } => {
                unreachable!("resume matrix never nests a second verify")
            }
        }
    }

    fn probe_local_file(&mut self, path: &str) -> Result<(bool, u64)> {
        match self.filesystem.open(path, false) {
            Ok(mut file) => {
                let size = self
                    .filesystem
                    .seek(&mut file, 0, Whence::End)
                    .map_err(|e| self.fail("probe_local_file", SessionError::io("fs_seek", e)))?;
                let _ = self.filesystem.close(file);
                Ok((true, size))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok((false, 0)),
            Err(e) => Err(self.fail("probe_local_file", SessionError::io("fs_open", e))),
        }
    }

    fn send_resume_resp(
        &mut self,
        action: ResumeAction,
        resume_offset: u64,
        verify_crc: u32,
        verify_length: u64,
    ) -> Result<()> {
        let resp = ResumeResp {
            action,
            resume_offset,
            verify_crc,
            verify_length,
        };
        let mut buf = [0u8; RESUME_RESP_LEN];
        resp.encode(&mut buf);
        let frame = Frame::new(FrameHeader::new(FrameType::ResumeResp, 0), buf.to_vec());
        self.write_frame(&frame)
            .map_err(|e| self.fail("send_resume_resp", e))
    }

    fn run_receive_data_loop(&mut self, path: &str, meta: &Meta, start_offset: u64) -> Result<()> {
        let mut file = self
            .filesystem
            .open(path, true)
            .map_err(|e| self.fail("receive_data", SessionError::io("fs_open", e)))?;
        self.filesystem
            .seek(&mut file, start_offset as i64, Whence::Start)
            .map_err(|e| self.fail("receive_data", SessionError::io("fs_seek", e)))?;

        let mut next_expected = start_offset;
        let result = self.receive_data_frames(&mut file, meta, start_offset, &mut next_expected);
        let _ = self.filesystem.close(file);
        result?;

        self.metrics.files_recv += 1;
        if let Some(cb) = self.config.on_file_complete.clone() {
            cb(&meta.filename, path, FileStatus::Ok);
        }
        Ok(())
    }

    fn receive_data_frames(
        &mut self,
        file: &mut F::File,
        meta: &Meta,
        start_offset: u64,
        next_expected: &mut u64,
    ) -> Result<()> {
        let ack_stride = u64::from(self.config.flow_control.ack_stride_packets).max(1);
        let mut packets_since_ack: u64 = 0;
        let mut last_acked_offset = *next_expected;

        // A whole-file verify against `meta.file_crc32` only makes sense
        // when we're writing the file from scratch: CRC32 doesn't compose
        // across an unverified prefix plus a freshly-written suffix.
        let mut whole_file_crc = (start_offset == 0).then(|| self.crc_engine.start());

        while *next_expected < meta.file_size {
            self.check_not_terminal("receive_data")?;

            let frame = self.await_frame_with_soft_timeout(
                self.config.retries.data,
                |t| t == FrameType::Data || t == FrameType::Done,
                "receive_data",
                Detail::TIMEOUT_DATA,
                |s| s.send_ack(last_acked_offset),
            )?;

            if frame.header.frame_type == FrameType::Done {
                if let Some(acc) = &whole_file_crc {
                    if acc.finalize() != meta.file_crc32 {
                        self.metrics.crc_errors += 1;
                        let err = SessionError::Protocol(ProtocolError::new(
                            Code::Crc,
                            Detail::CRC_FILE,
                        ));
                        return Err(self.fail("receive_done", err));
                    }
                }
                // The sender believes the file is complete; trust the byte
                // count we've actually written, not its own bookkeeping.
                break;
            }

            if frame.payload.len() < 8 {
                self.metrics.crc_errors += 1;
                continue;
            }
            let offset = u64::from_le_bytes(frame.payload[0..8].try_into().unwrap());
            let chunk = &frame.payload[8..];

            if offset == *next_expected {
                self.filesystem
                    .write(file, chunk)
                    .map_err(|e| self.fail("receive_data", SessionError::io("fs_write", e)))?;
                if let Some(acc) = &mut whole_file_crc {
                    acc.update(chunk);
                }
                *next_expected += chunk.len() as u64;
                packets_since_ack += 1;
                if let Some(cb) = self.config.on_progress.clone() {
                    cb(
                        &meta.filename,
                        Progress {
                            file_bytes: *next_expected - start_offset,
                            file_total: meta.file_size - start_offset,
                            batch_bytes: *next_expected,
                        },
                    );
                }
                let is_final_chunk = *next_expected >= meta.file_size;
                if packets_since_ack >= ack_stride || is_final_chunk {
                    self.send_ack(*next_expected)?;
                    last_acked_offset = *next_expected;
                    packets_since_ack = 0;
                }
            } else if offset < *next_expected {
                // Duplicate of already-written data; re-ack cumulatively.
                self.send_ack(*next_expected)?;
                last_acked_offset = *next_expected;
            } else {
                // Out of order: NAK asking for what we actually need.
                self.send_nak(*next_expected)?;
            }
        }

        let done_frame = Frame::new(FrameHeader::new(FrameType::DoneAck, 0), Vec::new());
        self.write_frame(&done_frame)
            .map_err(|e| self.fail("receive_done", e))
    }

    fn send_ack(&mut self, next_expected: u64) -> Result<()> {
        let mut header = FrameHeader::new(FrameType::DataAck, 0);
        header.type_data = next_expected as u32;
        let frame = Frame::new(header, next_expected.to_le_bytes().to_vec());
        self.write_frame(&frame).map_err(|e| self.fail("send_ack", e))
    }

    fn send_nak(&mut self, next_expected: u64) -> Result<()> {
        let mut header = FrameHeader::new(FrameType::DataNak, 0);
        header.type_data = next_expected as u32;
        let frame = Frame::new(header, next_expected.to_le_bytes().to_vec());
        self.write_frame(&frame).map_err(|e| self.fail("send_nak", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_handles_empty_and_trailing_slash() {
        assert_eq!(join_path("", "a.bin"), "a.bin");
        assert_eq!(join_path("out", "a.bin"), "out/a.bin");
        assert_eq!(join_path("out/", "a.bin"), "out/a.bin");
    }
}
