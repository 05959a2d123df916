pub mod bits;
pub mod comp;
pub mod decomp;
pub mod ring;

#[cfg(test)]
mod validation;

pub use comp::{compress_bytes, CompressOptions, Compressor};
pub use decomp::{decompress_bytes, DecompressOptions, Decompressor};

/// Largest supported history size, as a base-2 logarithm.
///
/// The bit accumulator must be able to hold `max(8, history_log_2) + 1` more
/// bits on top of the 7 it may already be carrying, so 9 keeps every field
/// comfortably inside a `u32`. 9 is also the size used by all known streams
/// in this format.
pub const MAX_HISTORY_LOG_2: u32 = 9;

/// Error types for gkey operations.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GkError {
    /// Input contains an invalid compressed token (decoder only).
    BadInput,
    /// The bit stream ended in the middle of a token with a non-zero
    /// residue (decoder only). Recoverable by supplying more input;
    /// final if none is coming.
    TruncatedInput,
    /// The output window filled up. Codec state is preserved at bit
    /// granularity; re-invoke with more room to continue.
    BufferOverflow,
    /// The progress callback requested an abort.
    Aborted,
}

impl std::fmt::Display for GkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadInput => write!(f, "invalid compressed data"),
            Self::TruncatedInput => write!(f, "compressed data is truncated"),
            Self::BufferOverflow => write!(f, "output buffer too small"),
            Self::Aborted => write!(f, "aborted by callback"),
        }
    }
}

impl std::error::Error for GkError {}

pub type GkResult<T> = Result<T, GkError>;

/// Outcome of a codec call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// All supplied input was consumed. Call again with more input or, for
    /// the compressor, with an empty input window to flush the stream.
    MoreInput,
    /// The stream is complete. The compressor ignores any further input;
    /// the decompressor treats trailing sub-byte zero bits as padding.
    Finished,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MoreInput => write!(f, "more input required"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Destination for codec output.
///
/// `Sizing` is the "no output buffer" mode: nothing is written, but the
/// counter advances by every byte that would have been, so a caller can size
/// an allocation with one dry run.
pub enum Output<'o> {
    /// Write into the window; the slice shrinks past written bytes.
    Buffer(&'o mut [u8]),
    /// Count the bytes that would have been written.
    Sizing(usize),
}

impl<'o> Output<'o> {
    /// Accept as much of `src` as fits. Returns the number of bytes taken.
    pub(crate) fn put_slice(&mut self, src: &[u8]) -> usize {
        match self {
            Output::Buffer(buf) => {
                let n = src.len().min(buf.len());
                let window = std::mem::take(buf);
                let (head, tail) = window.split_at_mut(n);
                head.copy_from_slice(&src[..n]);
                *buf = tail;
                n
            }
            Output::Sizing(count) => {
                *count += src.len();
                src.len()
            }
        }
    }

    /// Accept one byte. Returns false if the window is full.
    pub(crate) fn put_byte(&mut self, byte: u8) -> bool {
        match self {
            Output::Buffer(buf) => {
                if buf.is_empty() {
                    return false;
                }
                let window = std::mem::take(buf);
                window[0] = byte;
                *buf = &mut window[1..];
                true
            }
            Output::Sizing(count) => {
                *count += 1;
                true
            }
        }
    }
}

/// Caller-owned buffer windows for one compress or decompress call.
///
/// The codec mutates the block in place: `input` is advanced past consumed
/// bytes and `output` past written ones, so the outputs of one call are the
/// inputs of the next. When a call returns `BufferOverflow`, re-enter with a
/// fresh output window but the same (remaining) input; shrinking `input`
/// between resumed calls is a contract violation.
pub struct Parameters<'i, 'o> {
    /// Unconsumed input.
    pub input: &'i [u8],
    /// Output window, or byte counting when no buffer is supplied.
    pub output: Output<'o>,
    /// Called with `(in_total, out_total)` before each token; returning
    /// false aborts the operation.
    pub progress: Option<&'o mut dyn FnMut(usize, usize) -> bool>,
}

impl<'i, 'o> Parameters<'i, 'o> {
    pub fn new(input: &'i [u8], output: &'o mut [u8]) -> Self {
        Parameters {
            input,
            output: Output::Buffer(output),
            progress: None,
        }
    }

    /// Sizing mode: count output bytes instead of storing them.
    pub fn sizing(input: &'i [u8]) -> Self {
        Parameters {
            input,
            output: Output::Sizing(0),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'o mut dyn FnMut(usize, usize) -> bool) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Number of bits used to encode the size of a copy whose source starts
/// `read_offset` bytes past the write position.
///
/// When the source lies in the upper half of the history window the size is
/// encoded in one fewer bit. `>` would give better coverage than `>=` but
/// would not match the original format, which allows bytes 255..511 or
/// 257..511 to be copied but not 256..511 (with `history_log_2` == 9).
pub fn read_size_bits(history_log_2: u32, read_offset: usize) -> u32 {
    if history_log_2 > 0 && read_offset >= 1 << (history_log_2 - 1) {
        history_log_2 - 1
    } else {
        history_log_2
    }
}
