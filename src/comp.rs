/// Gordon Key stream compression.
///
/// Produces the token stream described in [`crate::decomp`]: for each
/// position the compressor looks for the longest prefix of the pending
/// input that already occurs in the history window, then emits whichever of
/// a copy token or a run of literal tokens costs fewer bits. The matched
/// bytes are appended to the compressor's own history so it stays in
/// lockstep with the decoder's.
///
/// Like decompression, compression is incremental: a call consumes as much
/// input as it can prove decisions about. A match search that runs out of
/// input before it knows the best match is maximal suspends ("stalls") with
/// its scratch state saved, and resumes when the caller supplies more
/// bytes. The stream is terminated by calling with an empty input window,
/// which commits any suspended match, pads the bit accumulator to a byte
/// boundary, and reports `Finished`.
use log::{debug, trace};

use crate::bits::BitAccumulator;
use crate::ring::RingBuffer;
use crate::{read_size_bits, GkError, GkResult, Parameters, Status, MAX_HISTORY_LOG_2};

/// Bit cost of one literal token.
const LITERAL_BITS: usize = 9;

/// Encoder states. Each names the next action to perform; a call suspended
/// by buffer exhaustion resumes in the state it stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompState {
    NextSequence,
    Progress,
    FindSequence,
    PutOffset,
    PutSize,
    PutByte,
    PutBytes,
    Flush,
}

/// Options for a `Compressor`.
#[derive(Debug, Clone, Default)]
pub struct CompressOptions {
    /// Allow the most recently written history byte as a copy source. The
    /// original compressor never does this, and that is the default here;
    /// enabling it can shorten some streams while remaining decodable by
    /// any decoder. When enabled, candidate matches are capped to the
    /// largest length the size field at their offset can express.
    pub copy_latest_byte: bool,
}

/// Incremental compressor for Gordon Key streams.
///
/// Create one per stream, feed it input with
/// [`compress`](Self::compress), then call once more with an empty input
/// window to flush. `history_log_2` must match the decompressor's.
pub struct Compressor {
    state: CompState,
    /// Total bytes consumed across all calls.
    in_total: usize,
    /// Total bytes output across all calls.
    out_total: usize,
    /// Largest usable sequence length at the search position.
    max_read_size: usize,
    /// Offset of the longest sequence found so far.
    best_read_offset: usize,
    /// Length of the longest sequence found so far.
    best_read_size: usize,
    /// Offset of the sequence being examined (after a commit, the one to
    /// emit).
    read_offset: usize,
    /// Length matched at `read_offset` so far (after a commit, the length
    /// to emit).
    read_size: usize,
    bits: BitAccumulator,
    history_log_2: u32,
    copy_latest_byte: bool,
    history: RingBuffer,
}

impl Compressor {
    /// Create a compressor with a `1 << history_log_2` byte history.
    ///
    /// # Panics
    ///
    /// Panics if `history_log_2 > MAX_HISTORY_LOG_2`.
    pub fn new(history_log_2: u32) -> Self {
        Self::with_options(history_log_2, CompressOptions::default())
    }

    pub fn with_options(history_log_2: u32, options: CompressOptions) -> Self {
        assert!(
            history_log_2 <= MAX_HISTORY_LOG_2,
            "history_log_2 {} out of range",
            history_log_2
        );
        debug!("compressor: created with history_log_2 {}", history_log_2);
        Compressor {
            state: CompState::NextSequence,
            in_total: 0,
            out_total: 0,
            max_read_size: 0,
            best_read_offset: 0,
            best_read_size: 0,
            read_offset: 0,
            read_size: 0,
            bits: BitAccumulator::new(),
            history_log_2,
            copy_latest_byte: options.copy_latest_byte,
            history: RingBuffer::new(history_log_2),
        }
    }

    /// Return to the initial state, ready for a new stream, without
    /// reallocating the history.
    pub fn reset(&mut self) {
        debug!("compressor: reset");
        self.state = CompState::NextSequence;
        self.in_total = 0;
        self.out_total = 0;
        self.max_read_size = 0;
        self.best_read_offset = 0;
        self.best_read_size = 0;
        self.read_offset = 0;
        self.read_size = 0;
        self.bits.reset();
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

    /// Compress from `params.input` into `params.output`, updating both
    /// windows in place.
    ///
    /// Returns `MoreInput` when every supplied byte has been consumed;
    /// call again with more input, or with an empty input window to
    /// terminate the stream. The empty-input call commits any suspended
    /// match, flushes the bit accumulator, and returns `Finished` - after
    /// which the compressor stays finished and ignores further input. On
    /// `BufferOverflow`, re-enter with a fresh output window and the same
    /// remaining input. After `Aborted` the stream cannot be continued;
    /// [`reset`](Self::reset) before reuse.
    pub fn compress(&mut self, params: &mut Parameters<'_, '_>) -> GkResult<Status> {
        // No input is the request to finish the stream: it force-completes
        // the current sequence, then drains the accumulator.
        let flush = params.input.is_empty();

        loop {
            match self.state {
                CompState::NextSequence => {
                    self.best_read_size = 0;
                    self.best_read_offset = 0;
                    self.read_size = 0;
                    self.read_offset = 0;
                    self.state = CompState::Progress;
                }

                CompState::Progress => {
                    if let Some(progress) = params.progress.as_mut() {
                        if !progress(self.in_total, self.out_total) {
                            trace!("compressor: aborted by callback");
                            return Err(GkError::Aborted);
                        }
                    }
                    self.state = CompState::FindSequence;
                }

                CompState::FindSequence => {
                    if flush || self.find_sequence(params) {
                        // The longest matching sequence is known (it may be
                        // empty).
                        if self.read_size == 0 {
                            if !params.input.is_empty() {
                                self.state = CompState::PutByte;
                            } else if flush {
                                self.state = CompState::Flush;
                            } else {
                                // Input drained mid-call with nothing left
                                // to emit; only a degenerate window gets
                                // here, since any wider search would have
                                // stalled instead.
                                debug_assert_eq!(self.history_log_2, 0);
                                return Ok(Status::MoreInput);
                            }
                        } else {
                            // Emit the sequence as literals when that is
                            // strictly cheaper than a copy token.
                            let nbits = read_size_bits(self.history_log_2, self.read_offset);
                            let copy_bits = (1 + self.history_log_2 + nbits) as usize;
                            self.state = if self.read_size * LITERAL_BITS < copy_bits {
                                CompState::PutBytes
                            } else {
                                CompState::PutOffset
                            };
                        }
                    } else {
                        // Stalled: the next batch of input is needed to
                        // extend the current match.
                        return Ok(Status::MoreInput);
                    }
                }

                CompState::PutOffset => {
                    let value = ((self.read_offset as u32) << 1) | 1;
                    let nbits = self.history_log_2 + 1;
                    if !self
                        .bits
                        .write(&mut params.output, &mut self.out_total, nbits, value)
                    {
                        return Err(GkError::BufferOverflow);
                    }
                    self.state = CompState::PutSize;
                }

                CompState::PutSize => {
                    let nbits = read_size_bits(self.history_log_2, self.read_offset);
                    if !self.bits.write(
                        &mut params.output,
                        &mut self.out_total,
                        nbits,
                        self.read_size as u32,
                    ) {
                        return Err(GkError::BufferOverflow);
                    }
                    // Mirror the emitted sequence into the history so the
                    // decoder's window and ours stay identical.
                    let copied = self.history.copy(self.read_offset, self.read_size);
                    debug_assert_eq!(copied, self.read_size);
                    self.state = CompState::NextSequence;
                }

                CompState::PutByte => {
                    let byte = params.input[0];
                    if !self.bits.write(
                        &mut params.output,
                        &mut self.out_total,
                        LITERAL_BITS as u32,
                        u32::from(byte) << 1,
                    ) {
                        return Err(GkError::BufferOverflow);
                    }
                    self.history.write(&[byte]);
                    params.input = &params.input[1..];
                    self.in_total += 1;
                    self.state = CompState::NextSequence;
                }

                CompState::PutBytes => {
                    // The sequence is cheaper spelled out: emit each byte
                    // of it as a tagged literal while replaying it into
                    // the history.
                    let Compressor {
                        history,
                        bits,
                        out_total,
                        read_offset,
                        read_size,
                        ..
                    } = &mut *self;
                    let copied = history.copy_with(
                        |chunk| {
                            let mut accepted = 0;
                            for &byte in chunk {
                                let value = u32::from(byte) << 1;
                                if !bits.write(
                                    &mut params.output,
                                    out_total,
                                    LITERAL_BITS as u32,
                                    value,
                                ) {
                                    break;
                                }
                                accepted += 1;
                            }
                            accepted
                        },
                        *read_offset,
                        *read_size,
                    );
                    if copied == self.read_size {
                        self.state = CompState::NextSequence;
                    } else {
                        self.read_size -= copied;
                        return Err(GkError::BufferOverflow);
                    }
                }

                CompState::Flush => {
                    // Terminal state: emitting token bits after the padding
                    // would corrupt the stream, so the only thing left to
                    // do here, ever, is drain.
                    if !self.bits.flush(&mut params.output, &mut self.out_total) {
                        return Err(GkError::BufferOverflow);
                    }
                    trace!(
                        "compressor: finished ({} in, {} out)",
                        self.in_total,
                        self.out_total
                    );
                    return Ok(Status::Finished);
                }
            }
        }
    }

    /// Search the history for the longest sequence matching the pending
    /// input, consuming input bytes as they are matched.
    ///
    /// Returns true when the search is complete, with `read_offset` /
    /// `read_size` holding the sequence to emit. Returns false when it ran
    /// out of input first; the scratch fields hold the partial state and
    /// the next call resumes exactly where this one stopped (a re-entry
    /// with `read_size != 0` goes straight back to extending the current
    /// candidate).
    fn find_sequence(&mut self, params: &mut Parameters<'_, '_>) -> bool {
        let mut read_offset = self.read_offset;
        let mut read_size = self.read_size;
        let mut max_read_size = self.max_read_size;
        let mut best_read_size = self.best_read_size;
        let mut consumed = 0;

        'search: loop {
            if read_size == 0 {
                // Fresh candidate position: how long could a sequence
                // starting here be?
                max_read_size = self.window_size() - read_offset;
                if !self.copy_latest_byte && max_read_size > 0 {
                    // The original compressor never copies the most
                    // recently written byte.
                    max_read_size -= 1;
                }

                // No point looking past the point where the best sequence
                // cannot be beaten.
                if best_read_size >= max_read_size {
                    break;
                }

                let target = if best_read_size == 0 {
                    // Search for the next unmatched input byte.
                    match params.input.get(consumed) {
                        Some(&byte) => byte,
                        None => break,
                    }
                } else {
                    // A longer sequence must start like the current best.
                    self.history.read_char(self.best_read_offset)
                };

                let prev_offset = read_offset;
                read_offset = match self.history.find_char(
                    read_offset,
                    max_read_size - best_read_size,
                    target,
                ) {
                    Some(found) => found,
                    None => {
                        max_read_size = 0;
                        break;
                    }
                };

                if best_read_size == 0 {
                    consumed += 1;
                }
                read_size = 1;

                max_read_size -= read_offset - prev_offset;
                debug_assert!(max_read_size > best_read_size);

                if self.copy_latest_byte {
                    // The emitted length has to fit the size field at this
                    // offset.
                    let nbits = read_size_bits(self.history_log_2, read_offset);
                    let field_limit = (1usize << nbits) - 1;
                    if max_read_size > field_limit {
                        max_read_size = field_limit;
                        if max_read_size <= best_read_size {
                            break;
                        }
                    }
                }

                if read_size < best_read_size {
                    // Candidate must reproduce the rest of the current best
                    // before it can hope to exceed it.
                    if self
                        .history
                        .compare(
                            read_offset + read_size,
                            self.best_read_offset + read_size,
                            best_read_size - read_size,
                        )
                        .is_ne()
                    {
                        read_offset += 1;
                        read_size = 0;
                        continue 'search;
                    }
                    read_size = best_read_size;
                }
            }

            // Extend the candidate while it keeps matching input.
            while read_size < max_read_size {
                let Some(&next) = params.input.get(consumed) else {
                    trace!("compressor: match search stalled at {}", read_size);
                    break 'search;
                };
                if next != self.history.read_char(read_offset + read_size) {
                    break;
                }
                consumed += 1;
                read_size += 1;
            }

            if read_size > best_read_size {
                self.best_read_offset = read_offset;
                best_read_size = read_size;
            }
            read_offset += 1;
            read_size = 0;
        }

        self.in_total += consumed;
        params.input = &params.input[consumed..];

        // Complete when no remaining start position could hold a longer
        // sequence; otherwise the search is suspended mid-candidate.
        let complete = best_read_size >= max_read_size;
        if complete {
            self.read_size = best_read_size;
            self.read_offset = self.best_read_offset;
        } else {
            self.read_size = read_size;
            self.read_offset = read_offset;
        }
        self.max_read_size = max_read_size;
        self.best_read_size = best_read_size;
        complete
    }

    #[cfg(test)]
    pub(crate) fn history(&self) -> &RingBuffer {
        &self.history
    }
}

/// Compress a whole buffer held in memory, flush included.
pub fn compress_bytes(input: &[u8], history_log_2: u32) -> Vec<u8> {
    let mut comp = Compressor::new(history_log_2);
    let mut out = Vec::new();
    let mut chunk = [0u8; 512];
    let mut remaining = input;
    loop {
        let before = comp.out_total();
        let mut params = Parameters::new(remaining, &mut chunk);
        let result = comp.compress(&mut params);
        remaining = params.input;
        let written = comp.out_total() - before;
        out.extend_from_slice(&chunk[..written]);
        match result {
            Ok(Status::Finished) => return out,
            Ok(Status::MoreInput) => {}
            Err(GkError::BufferOverflow) => {}
            // Without a progress callback the compressor has no other
            // failure mode.
            Err(e) => unreachable!("unexpected compressor error: {}", e),
        }
    }
}
