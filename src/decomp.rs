/// Gordon Key stream decompression.
///
/// The compressed stream is a tightly packed sequence of tokens with no
/// byte alignment between them:
///
/// ```text
/// literal: 1 tag bit (0), then 8 bits of the byte value
/// copy:    1 tag bit (1), then history_log_2 bits of source offset,
///          then read_size_bits(history_log_2, offset) bits of length
/// ```
///
/// All fields are packed LSB first. A copy replays `length` bytes starting
/// `offset` past the history write position; since the history starts out
/// zeroed, a copy from the never-written region is the format's idiom for
/// emitting runs of zero bytes.
///
/// Decompression is incremental: each call consumes what it can from the
/// caller's input window and writes what fits in the output window, and the
/// state machine suspends mid-token on either side running dry. Trailing
/// sub-byte bits of a stream must be zero; a non-zero residue at end of
/// input is reported as `TruncatedInput`.
use log::{debug, trace};

use crate::bits::BitAccumulator;
use crate::ring::RingBuffer;
use crate::{read_size_bits, GkError, GkResult, Parameters, Status, MAX_HISTORY_LOG_2};

/// Decoder states. Each names the next action to perform; a call suspended
/// by buffer exhaustion resumes in the state it stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecompState {
    Progress,
    GetType,
    GetOffset,
    GetSize,
    CopyData,
    GetByte,
    PutByte,
}

/// Options for a `Decompressor`.
#[derive(Debug, Clone, Default)]
pub struct DecompressOptions {
    /// Treat a decoded copy length of 0 as 1, the way the original FDComp
    /// module did, instead of rejecting it as `BadInput`. Off by default.
    pub lenient_copy_size: bool,
}

/// Incremental decompressor for Gordon Key streams.
///
/// Create one per stream with the same `history_log_2` the stream was
/// compressed with, then call [`decompress`](Self::decompress) repeatedly,
/// refilling the input window and emptying the output window between calls.
pub struct Decompressor {
    state: DecompState,
    /// Total bytes consumed across all calls.
    in_total: usize,
    /// Total bytes output across all calls.
    out_total: usize,
    /// Copy source offset from the write position, while a copy is decoding.
    read_offset: usize,
    /// Bytes still to copy.
    read_size: usize,
    bits: BitAccumulator,
    /// Byte value parked between GetByte and PutByte.
    literal: u8,
    history_log_2: u32,
    lenient_copy_size: bool,
    history: RingBuffer,
}

impl Decompressor {
    /// Create a decompressor with a `1 << history_log_2` byte history.
    ///
    /// # Panics
    ///
    /// Panics if `history_log_2 > MAX_HISTORY_LOG_2`.
    pub fn new(history_log_2: u32) -> Self {
        Self::with_options(history_log_2, DecompressOptions::default())
    }

    pub fn with_options(history_log_2: u32, options: DecompressOptions) -> Self {
        assert!(
            history_log_2 <= MAX_HISTORY_LOG_2,
            "history_log_2 {} out of range",
            history_log_2
        );
        debug!("decompressor: created with history_log_2 {}", history_log_2);
        Decompressor {
            state: DecompState::Progress,
            in_total: 0,
            out_total: 0,
            read_offset: 0,
            read_size: 0,
            bits: BitAccumulator::new(),
            literal: 0,
            history_log_2,
            lenient_copy_size: options.lenient_copy_size,
            history: RingBuffer::new(history_log_2),
        }
    }

    /// Return to the initial state, ready for a new stream, without
    /// reallocating the history.
    pub fn reset(&mut self) {
        debug!("decompressor: reset");
        self.state = DecompState::Progress;
        self.in_total = 0;
        self.out_total = 0;
        self.read_offset = 0;
        self.read_size = 0;
        self.bits.reset();
        self.literal = 0;
        self.history.reset();
    }

    /// Total number of input bytes consumed so far.
    pub fn in_total(&self) -> usize {
        self.in_total
    }

    /// Total number of output bytes produced so far (in sizing mode, the
    /// bytes that would have been produced).
    pub fn out_total(&self) -> usize {
        self.out_total
    }

    fn window_size(&self) -> usize {
        1 << self.history_log_2
    }

    /// Decompress from `params.input` into `params.output`, updating both
    /// windows in place.
    ///
    /// Returns `Finished` when the input ends cleanly on a token boundary
    /// (any leftover sub-byte bits being zero padding); supplying further
    /// input afterwards resumes decoding, which makes arbitrary input
    /// partitioning transparent. `TruncatedInput` means the input ended
    /// mid-token: fatal if no more input is coming, otherwise re-enter with
    /// the rest. On `BufferOverflow`, re-enter with a fresh output window.
    /// After `BadInput` or `Aborted` the stream cannot be continued;
    /// [`reset`](Self::reset) before reuse.
    pub fn decompress(&mut self, params: &mut Parameters<'_, '_>) -> GkResult<Status> {
        loop {
            match self.state {
                DecompState::Progress => {
                    if let Some(progress) = params.progress.as_mut() {
                        if !progress(self.in_total, self.out_total) {
                            trace!("decompressor: aborted by callback");
                            return Err(GkError::Aborted);
                        }
                    }
                    self.state = DecompState::GetType;
                }

                DecompState::GetType => {
                    // The type of each token is its first bit.
                    match self.bits.read(&mut params.input, &mut self.in_total, 1) {
                        Some(0) => self.state = DecompState::GetByte,
                        Some(_) => self.state = DecompState::GetOffset,
                        None => return self.end_of_input(),
                    }
                }

                DecompState::GetOffset => {
                    let nbits = self.history_log_2;
                    match self.bits.read(&mut params.input, &mut self.in_total, nbits) {
                        Some(bits) => {
                            // The stored offset is from 1 << history_log_2
                            // bytes behind the write position, which in a
                            // circular buffer is the write position itself.
                            self.read_offset = bits as usize;
                            self.state = DecompState::GetSize;
                        }
                        // Mid-token is never a valid end of stream.
                        None => return Err(GkError::TruncatedInput),
                    }
                }

                DecompState::GetSize => {
                    let nbits = read_size_bits(self.history_log_2, self.read_offset);
                    match self.bits.read(&mut params.input, &mut self.in_total, nbits) {
                        Some(bits) => {
                            let mut size = bits as usize;
                            if size == 0 && self.lenient_copy_size {
                                size = 1;
                            }
                            if size == 0 || self.read_offset + size > self.window_size() {
                                trace!(
                                    "decompressor: bad copy {}+{} in window {}",
                                    self.read_offset,
                                    size,
                                    self.window_size()
                                );
                                return Err(GkError::BadInput);
                            }
                            self.read_size = size;
                            self.state = DecompState::CopyData;
                        }
                        None => return Err(GkError::TruncatedInput),
                    }
                }

                DecompState::CopyData => {
                    // Replay the source range through the output window and
                    // back into the history in one pass.
                    let Decompressor {
                        history,
                        out_total,
                        read_offset,
                        read_size,
                        ..
                    } = &mut *self;
                    let copied = history.copy_with(
                        |chunk| {
                            let n = params.output.put_slice(chunk);
                            *out_total += n;
                            n
                        },
                        *read_offset,
                        *read_size,
                    );
                    if copied == self.read_size {
                        self.state = DecompState::Progress;
                    } else {
                        // The write position advanced past the copied
                        // prefix and the offset is relative to it, so only
                        // the size needs adjusting before resuming.
                        self.read_size -= copied;
                        return Err(GkError::BufferOverflow);
                    }
                }

                DecompState::GetByte => {
                    match self.bits.read(&mut params.input, &mut self.in_total, 8) {
                        Some(bits) => {
                            self.literal = bits as u8;
                            self.state = DecompState::PutByte;
                        }
                        // May be a valid end of stream: excess bits after
                        // the final token must be 0, and a zero tag bit
                        // routes here.
                        None => return self.end_of_input(),
                    }
                }

                DecompState::PutByte => {
                    let literal = self.literal;
                    if params.output.put_slice(&[literal]) == 1 {
                        self.out_total += 1;
                        self.history.write(&[literal]);
                        self.state = DecompState::Progress;
                    } else {
                        return Err(GkError::BufferOverflow);
                    }
                }
            }
        }
    }

    /// Input ran out where a token could legitimately end.
    fn end_of_input(&self) -> GkResult<Status> {
        if self.bits.is_zero() {
            trace!(
                "decompressor: end of stream ({} in, {} out)",
                self.in_total,
                self.out_total
            );
            Ok(Status::Finished)
        } else {
            Err(GkError::TruncatedInput)
        }
    }

    #[cfg(test)]
    pub(crate) fn history(&self) -> &RingBuffer {
        &self.history
    }
}

/// Decompress a whole stream held in memory.
///
/// Fails with `TruncatedInput` if the stream stops mid-token and with
/// `BadInput` on a malformed token.
pub fn decompress_bytes(input: &[u8], history_log_2: u32) -> GkResult<Vec<u8>> {
    let mut decomp = Decompressor::new(history_log_2);
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    let mut remaining = input;
    loop {
        let before = decomp.out_total();
        let mut params = Parameters::new(remaining, &mut chunk);
        let result = decomp.decompress(&mut params);
        remaining = params.input;
        let written = decomp.out_total() - before;
        out.extend_from_slice(&chunk[..written]);
        match result {
            Ok(_) => return Ok(out),
            Err(GkError::BufferOverflow) => {}
            Err(e) => return Err(e),
        }
    }
}
