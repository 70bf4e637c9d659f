//! CRC32 (IEEE 802.3) streaming accumulator and pluggable engine trait.

use flate2::Crc as Flate2Crc;

/// Streaming CRC32 (IEEE 802.3) accumulator.
///
/// Wraps [`flate2::Crc`], which implements the reflected polynomial
/// `0xEDB88320` with an initial state and final XOR of `0xFFFFFFFF` — the
/// same parameters rsync, zip, and gzip all use.
#[derive(Debug, Default, Clone)]
pub struct Crc32 {
    inner: Flate2Crc,
}

impl Crc32 {
    /// Create a fresh accumulator in its initial state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Flate2Crc::new(),
        }
    }

    /// Fold `data` into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Number of bytes folded into the accumulator so far.
    #[must_use]
    pub fn amount(&self) -> u32 {
        self.inner.amount()
    }

    /// Return the CRC32 over everything folded in so far without resetting
    /// the accumulator.
    #[must_use]
    pub fn finalize(&self) -> u32 {
        self.inner.sum()
    }
}

/// One-shot CRC32 (IEEE 802.3) over a single buffer.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}

/// A streaming CRC32 accumulator abstracted behind a trait object, so a
/// [`Crc32Engine`] can hand out either the software implementation or a
/// caller's hardware-accelerated one.
pub trait Crc32Accumulator: Send {
    /// Fold `data` into the running checksum.
    fn update(&mut self, data: &[u8]);

    /// Return the CRC32 over everything folded in so far.
    fn finalize(&self) -> u32;
}

impl Crc32Accumulator for Crc32 {
    fn update(&mut self, data: &[u8]) {
        Crc32::update(self, data);
    }

    fn finalize(&self) -> u32 {
        Crc32::finalize(self)
    }
}

/// Pluggable CRC32 engine. Session creation inspects whether a caller
/// supplied one; if not, [`SoftwareCrc32Engine`] is used. This mirrors the
/// original protocol's `crc` hook table, where a null function pointer
/// falls back to the built-in software implementation.
pub trait Crc32Engine: Send + Sync {
    /// Start a new streaming accumulator.
    fn start(&self) -> Box<dyn Crc32Accumulator>;

    /// One-shot convenience built on [`Crc32Engine::start`].
    fn one_shot(&self, data: &[u8]) -> u32 {
        let mut acc = self.start();
        acc.update(data);
        acc.finalize()
    }
}

/// Default software CRC32 engine, used whenever a session is not given a
/// hardware-accelerated [`Crc32Engine`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareCrc32Engine;

impl Crc32Engine for SoftwareCrc32Engine {
    fn start(&self) -> Box<dyn Crc32Accumulator> {
        Box::new(Crc32::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_matches_streaming() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut streaming = Crc32::new();
        streaming.update(&data[..10]);
        streaming.update(&data[10..]);
        assert_eq!(streaming.finalize(), crc32(data));
    }

    #[test]
    fn empty_input_is_well_known() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn amount_tracks_bytes_folded() {
        let mut crc = Crc32::new();
        crc.update(b"abc");
        crc.update(b"de");
        assert_eq!(crc.amount(), 5);
    }

    #[test]
    fn engine_one_shot_matches_free_function() {
        let engine = SoftwareCrc32Engine;
        assert_eq!(engine.one_shot(b"1234567890"), crc32(b"1234567890"));
    }

    #[test]
    fn finalize_does_not_reset() {
        let mut crc = Crc32::new();
        crc.update(b"abc");
        let first = crc.finalize();
        let second = crc.finalize();
        assert_eq!(first, second);
    }

    proptest::proptest! {
        #[test]
        fn streaming_matches_one_shot_for_arbitrary_chunking(
            data in proptest::collection::vec(proptest::num::u8::ANY, 0..4096),
            split in 0usize..4096,
        ) {
            let split = split.min(data.len());
            let mut streaming = Crc32::new();
            streaming.update(&data[..split]);
            streaming.update(&data[split..]);
            proptest::prop_assert_eq!(streaming.finalize(), crc32(&data));
        }
    }
}
