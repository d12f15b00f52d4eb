//! Re-framing of μ-law byte streams into fixed 20 ms slices.

use super::mulaw;

/// Bytes per 20 ms frame at 8 kHz μ-law (one byte per sample).
pub const FRAME_BYTES: usize = 160;

/// A re-framer that accumulates arbitrary-length μ-law chunks and emits
/// exactly [`FRAME_BYTES`]-byte slices, holding back any final partial
/// residue until more data arrives (or [`Framer::drain`] is called at
/// stream end).
#[derive(Debug, Default)]
pub struct Framer {
    residue: Vec<u8>,
}

impl Framer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push more μ-law bytes, returning every complete 160-byte frame that
    /// can now be formed. Never concatenates data across calls out of order;
    /// never emits a short frame except via [`Framer::drain`].
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.residue.extend_from_slice(bytes);
        let mut frames = Vec::with_capacity(self.residue.len() / FRAME_BYTES);
        let mut offset = 0;
        while self.residue.len() - offset >= FRAME_BYTES {
            frames.push(self.residue[offset..offset + FRAME_BYTES].to_vec());
            offset += FRAME_BYTES;
        }
        self.residue.drain(..offset);
        frames
    }

    /// Flush whatever partial frame remains (used when the model/call ends).
    pub fn drain(&mut self) -> Option<Vec<u8>> {
        if self.residue.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.residue))
        }
    }
}

/// Downsample PCM16 @ 16 kHz to PCM16 @ 8 kHz by 2:1 sample decimation, then
/// μ-law-encode. Used only for the binary-PCM16 fallback path; the model's
/// normal μ-law output is forwarded verbatim via [`Framer`].
pub fn pcm16_16k_to_mulaw_8k(samples: &[i16]) -> Vec<u8> {
    let decimated: Vec<i16> = samples.iter().step_by(2).copied().collect();
    mulaw::encode(&decimated)
}
