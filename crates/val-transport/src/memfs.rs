//! An in-memory [`Filesystem`] test double, backed by named byte buffers
//! instead of real files.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use crate::traits::{Filesystem, Whence};

/// A handle into a [`MemFs`]'s backing store.
pub struct MemFile {
    name: String,
    pos: u64,
}

/// In-memory filesystem shared by clonable handles, so a sender and
/// receiver in a test can see the same backing store without touching
/// disk.
#[derive(Clone, Default)]
pub struct MemFs {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemFs {
    /// An empty in-memory filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file's contents before a session runs, as a stand-in for a
    /// pre-existing partial download.
    pub fn seed(&self, path: &str, contents: Vec<u8>) {
        self.files
            .lock()
            .expect("memfs mutex poisoned")
            .insert(path.to_string(), contents);
    }

    /// Read back a file's full contents, for asserting on the result of a
    /// transfer.
    #[must_use]
    pub fn read_to_vec(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().expect("memfs mutex poisoned").get(path).cloned()
    }
}

impl Filesystem for MemFs {
    type File = MemFile;

    fn open(&mut self, path: &str, write: bool) -> io::Result<Self::File> {
        let mut files = self.files.lock().expect("memfs mutex poisoned");
        if write {
            files.entry(path.to_string()).or_default();
        } else if !files.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, path.to_string()));
        }
        Ok(MemFile {
            name: path.to_string(),
            pos: 0,
        })
    }

    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> io::Result<usize> {
        let files = self.files.lock().expect("memfs mutex poisoned");
        let contents = files
            .get(&file.name)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, file.name.clone()))?;
        let start = file.pos as usize;
        if start >= contents.len() {
            return Ok(0);
        }
        let n = buf.len().min(contents.len() - start);
        buf[..n].copy_from_slice(&contents[start..start + n]);
        file.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, file: &mut Self::File, buf: &[u8]) -> io::Result<usize> {
        let mut files = self.files.lock().expect("memfs mutex poisoned");
        let contents = files.entry(file.name.clone()).or_default();
        let start = file.pos as usize;
        if contents.len() < start {
            contents.resize(start, 0);
        }
        if start + buf.len() > contents.len() {
            contents.resize(start + buf.len(), 0);
        }
        contents[start..start + buf.len()].copy_from_slice(buf);
        file.pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn seek(&mut self, file: &mut Self::File, offset: i64, whence: Whence) -> io::Result<u64> {
        let files = self.files.lock().expect("memfs mutex poisoned");
        let len = files.get(&file.name).map_or(0, Vec::len) as u64;
        let base = match whence {
            Whence::Start => 0i64,
            Whence::Current => file.pos as i64,
            Whence::End => len as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        file.pos = target as u64;
        Ok(file.pos)
    }

    fn tell(&mut self, file: &Self::File) -> io::Result<u64> {
        Ok(file.pos)
    }

    fn close(&mut self, _file: Self::File) -> io::Result<()> {
        Ok(())
    }
}
