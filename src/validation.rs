/// Validation tests for the codec as a whole.
///
/// These tests verify:
/// 1. **Round-trip correctness** across history sizes and data shapes
/// 2. **Resumability** - any partition of input or output produces
///    bit-identical streams
/// 3. **Sizing-mode equivalence** - the dry run counts exactly the bytes a
///    real run writes
/// 4. **History lockstep** - compressor and decompressor windows stay
///    byte-identical
/// 5. **Edge cases** - empty input, degenerate windows, window-filling runs
#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::{Rng, RngCore, SeedableRng};

    use crate::{
        compress_bytes, decompress_bytes, Compressor, Decompressor, GkError, Parameters, Status,
    };

    // ---------------------------------------------------------------
    // Test vectors
    // ---------------------------------------------------------------

    /// Highly compressible: single byte repeated.
    fn data_all_same(n: usize) -> Vec<u8> {
        vec![0x42u8; n]
    }

    /// Zero runs interleaved with markers; exercises the virgin-region
    /// copies.
    fn data_sparse(n: usize) -> Vec<u8> {
        let mut v = vec![0u8; n];
        let mut i = 0;
        while i < n {
            v[i] = 0xA5;
            i += 97;
        }
        v
    }

    /// Repetitive text with structure.
    fn data_repeating_text() -> Vec<u8> {
        let pattern = b"the quick brown fox jumps over the lazy dog. ";
        let mut v = Vec::new();
        for _ in 0..40 {
            v.extend_from_slice(pattern);
        }
        v
    }

    /// Binary data with some structure (sawtooth).
    fn data_sawtooth(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 256) as u8).collect()
    }

    /// Incompressible: seeded random bytes.
    fn data_random(n: usize, seed: u64) -> Vec<u8> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut v = vec![0u8; n];
        rng.fill_bytes(&mut v);
        v
    }

    /// Random draws from a tiny alphabet: match-heavy but irregular.
    fn data_small_alphabet(n: usize, seed: u64) -> Vec<u8> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..n).map(|_| b"abc"[rng.gen_range(0..3)]).collect()
    }

    fn corpus() -> Vec<Vec<u8>> {
        vec![
            Vec::new(),
            vec![0x41],
            data_all_same(600),
            data_sparse(700),
            data_repeating_text(),
            data_sawtooth(1024),
            data_random(512, 1),
            data_small_alphabet(800, 2),
        ]
    }

    // ---------------------------------------------------------------
    // Drivers
    // ---------------------------------------------------------------

    /// Feed `input` to `comp` (then flush), harvesting through output
    /// windows of `out_window` bytes.
    fn drive_compressor(comp: &mut Compressor, input: &[u8], out_window: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; out_window];
        let mut remaining = input;
        let mut flushing = false;
        loop {
            let before = comp.out_total();
            let window: &[u8] = if flushing { &[] } else { remaining };
            let mut params = Parameters::new(window, &mut buf);
            let result = comp.compress(&mut params);
            if !flushing {
                remaining = params.input;
            }
            out.extend_from_slice(&buf[..comp.out_total() - before]);
            match result {
                Ok(Status::Finished) => return out,
                Ok(Status::MoreInput) => flushing = remaining.is_empty(),
                Err(GkError::BufferOverflow) => {}
                Err(e) => panic!("compressor failed: {}", e),
            }
        }
    }

    /// Decompress `stream` through output windows of `out_window` bytes.
    fn drive_decompressor(
        decomp: &mut Decompressor,
        stream: &[u8],
        out_window: usize,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; out_window];
        let mut remaining = stream;
        loop {
            let before = decomp.out_total();
            let mut params = Parameters::new(remaining, &mut buf);
            let result = decomp.decompress(&mut params);
            remaining = params.input;
            out.extend_from_slice(&buf[..decomp.out_total() - before]);
            match result {
                Ok(Status::Finished) => return out,
                Ok(Status::MoreInput) => unreachable!("decoder never asks for input"),
                Err(GkError::BufferOverflow) => {}
                Err(e) => panic!("decompressor failed: {}", e),
            }
        }
    }

    /// Compress `input` delivered in pieces split at `splits`, with
    /// `out_window`-byte output windows.
    fn compress_split(input: &[u8], k: u32, splits: &[usize], out_window: usize) -> Vec<u8> {
        let mut comp = Compressor::new(k);
        let mut out = Vec::new();
        let mut buf = vec![0u8; out_window];
        let mut bounds = vec![0];
        bounds.extend_from_slice(splits);
        bounds.push(input.len());
        for pair in bounds.windows(2) {
            let piece = &input[pair[0]..pair[1]];
            if piece.is_empty() {
                // An empty window would mean "flush"; skip it.
                continue;
            }
            let mut remaining = piece;
            loop {
                let before = comp.out_total();
                let mut params = Parameters::new(remaining, &mut buf);
                let result = comp.compress(&mut params);
                remaining = params.input;
                out.extend_from_slice(&buf[..comp.out_total() - before]);
                match result {
                    Ok(Status::MoreInput) => {
                        if remaining.is_empty() {
                            break;
                        }
                    }
                    Err(GkError::BufferOverflow) => {}
                    other => panic!("unexpected result: {:?}", other),
                }
            }
        }
        loop {
            let before = comp.out_total();
            let mut params = Parameters::new(&[], &mut buf);
            let result = comp.compress(&mut params);
            out.extend_from_slice(&buf[..comp.out_total() - before]);
            match result {
                Ok(Status::Finished) => return out,
                Err(GkError::BufferOverflow) => {}
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    /// Decompress `stream` delivered in pieces split at `splits`.
    fn decompress_split(stream: &[u8], k: u32, splits: &[usize], out_window: usize) -> Vec<u8> {
        let mut decomp = Decompressor::new(k);
        let mut out = Vec::new();
        let mut buf = vec![0u8; out_window];
        let mut bounds = vec![0];
        bounds.extend_from_slice(splits);
        bounds.push(stream.len());
        let mut finished = false;
        for pair in bounds.windows(2) {
            let piece = &stream[pair[0]..pair[1]];
            let mut remaining = piece;
            loop {
                let before = decomp.out_total();
                let mut params = Parameters::new(remaining, &mut buf);
                let result = decomp.decompress(&mut params);
                remaining = params.input;
                out.extend_from_slice(&buf[..decomp.out_total() - before]);
                match result {
                    // A clean token boundary; resumes if more arrives.
                    Ok(Status::Finished) => {
                        assert!(remaining.is_empty());
                        finished = true;
                        break;
                    }
                    // Paused mid-token awaiting the next piece.
                    Err(GkError::TruncatedInput) => {
                        assert!(remaining.is_empty());
                        finished = false;
                        break;
                    }
                    Err(GkError::BufferOverflow) => {}
                    other => panic!("unexpected result: {:?}", other),
                }
            }
        }
        assert!(finished, "stream must end cleanly");
        out
    }

    // ---------------------------------------------------------------
    // 1. Round trips
    // ---------------------------------------------------------------

    #[test]
    fn test_round_trip_corpus() {
        for k in [0, 1, 5, 9] {
            for (i, input) in corpus().iter().enumerate() {
                let stream = compress_bytes(input, k);
                let back = decompress_bytes(&stream, k).unwrap();
                assert_eq!(&back, input, "round trip failed: k={}, vector {}", k, i);
            }
        }
    }

    #[test]
    fn test_round_trip_empty() {
        let stream = compress_bytes(&[], 9);
        assert!(stream.is_empty());
        assert_eq!(decompress_bytes(&stream, 9), Ok(Vec::new()));
    }

    #[test]
    fn test_round_trip_window_filling_run() {
        // Exactly one window of a single byte, then past it.
        for n in [512, 513, 2000] {
            let input = data_all_same(n);
            let stream = compress_bytes(&input, 9);
            assert_eq!(decompress_bytes(&stream, 9), Ok(input));
        }
    }

    #[test]
    fn test_compresses_repetitive_data() {
        let input = data_repeating_text();
        let stream = compress_bytes(&input, 9);
        assert!(
            stream.len() < input.len() / 2,
            "repetitive text should compress well: {} vs {}",
            stream.len(),
            input.len()
        );
    }

    #[test]
    fn test_incompressible_data_expands_bounded() {
        // Pure literals cost 9 bits per byte, an eighth of overhead.
        let input = data_random(4096, 7);
        let stream = compress_bytes(&input, 9);
        assert!(stream.len() <= input.len() + input.len() / 8 + 2);
        assert_eq!(decompress_bytes(&stream, 9), Ok(input));
    }

    // ---------------------------------------------------------------
    // 2. Resumability
    // ---------------------------------------------------------------

    #[test]
    fn test_compress_partitions_are_transparent() {
        let mut rng = SmallRng::seed_from_u64(0x676b6579);
        let input = data_repeating_text();
        let reference = compress_bytes(&input, 9);
        for _ in 0..16 {
            let mut splits: Vec<usize> = (0..rng.gen_range(1..8usize))
                .map(|_| rng.gen_range(0..input.len()))
                .collect();
            splits.sort_unstable();
            let out = compress_split(&input, 9, &splits, 512);
            assert_eq!(out, reference, "splits {:?} changed the stream", splits);
        }
    }

    #[test]
    fn test_decompress_partitions_are_transparent() {
        let mut rng = SmallRng::seed_from_u64(0x646b6579);
        let input = data_small_alphabet(900, 3);
        let stream = compress_bytes(&input, 9);
        for _ in 0..16 {
            let mut splits: Vec<usize> = (0..rng.gen_range(1..8usize))
                .map(|_| rng.gen_range(0..stream.len()))
                .collect();
            splits.sort_unstable();
            let out = decompress_split(&stream, 9, &splits, 512);
            assert_eq!(out, input, "splits {:?} changed the output", splits);
        }
    }

    #[test]
    fn test_clean_boundary_split_resumes() {
        // 16 distinct bytes encode as 16 literals = 18 whole bytes, so a
        // split after 9 bytes lands exactly between tokens. The decoder
        // reports Finished there, then carries on with the second half.
        let input: Vec<u8> = (0..16u8).collect();
        let stream = compress_bytes(&input, 9);
        assert_eq!(stream.len(), 18);
        let out = decompress_split(&stream, 9, &[9], 64);
        assert_eq!(out, input);
    }

    #[test]
    fn test_single_byte_output_windows() {
        let input = data_small_alphabet(400, 4);
        let reference = compress_bytes(&input, 9);

        let mut comp = Compressor::new(9);
        assert_eq!(drive_compressor(&mut comp, &input, 1), reference);

        let mut decomp = Decompressor::new(9);
        assert_eq!(drive_decompressor(&mut decomp, &reference, 1), input);
    }

    #[test]
    fn test_random_output_windows() {
        let mut rng = SmallRng::seed_from_u64(0x77696e);
        let input = data_sawtooth(2048);
        let reference = compress_bytes(&input, 9);
        for _ in 0..8 {
            let window = rng.gen_range(1..40);
            let mut comp = Compressor::new(9);
            assert_eq!(drive_compressor(&mut comp, &input, window), reference);
            let mut decomp = Decompressor::new(9);
            assert_eq!(drive_decompressor(&mut decomp, &reference, window), input);
        }
    }

    #[test]
    fn test_random_everything_round_trips() {
        let mut rng = SmallRng::seed_from_u64(0xFEDB);
        for trial in 0..24 {
            let n = rng.gen_range(0..1500);
            let input = match trial % 3 {
                0 => data_random(n, rng.gen()),
                1 => data_small_alphabet(n, rng.gen()),
                _ => data_sparse(n),
            };
            let mut splits: Vec<usize> = if n == 0 {
                Vec::new()
            } else {
                (0..rng.gen_range(0..5usize))
                    .map(|_| rng.gen_range(0..n))
                    .collect()
            };
            splits.sort_unstable();
            let window = rng.gen_range(1..64);
            let stream = compress_split(&input, 9, &splits, window);
            assert_eq!(stream, compress_bytes(&input, 9), "trial {}", trial);
            assert_eq!(decompress_bytes(&stream, 9), Ok(input), "trial {}", trial);
        }
    }

    // ---------------------------------------------------------------
    // 3. Sizing-mode equivalence
    // ---------------------------------------------------------------

    #[test]
    fn test_compressor_sizing_matches_written_bytes() {
        for input in corpus() {
            let real = compress_bytes(&input, 9);
            let mut comp = Compressor::new(9);
            let mut params = Parameters::sizing(&input);
            let first = comp.compress(&mut params);
            assert!(matches!(first, Ok(_)), "sizing mode cannot overflow");
            let mut params = Parameters::sizing(&[]);
            assert_eq!(comp.compress(&mut params), Ok(Status::Finished));
            assert_eq!(comp.out_total(), real.len());
        }
    }

    #[test]
    fn test_decompressor_sizing_matches_written_bytes() {
        for input in corpus() {
            let stream = compress_bytes(&input, 9);
            let mut decomp = Decompressor::new(9);
            let mut params = Parameters::sizing(&stream);
            assert_eq!(decomp.decompress(&mut params), Ok(Status::Finished));
            assert_eq!(decomp.out_total(), input.len());
        }
    }

    // ---------------------------------------------------------------
    // 4. History lockstep
    // ---------------------------------------------------------------

    #[test]
    fn test_history_windows_stay_identical() {
        for input in corpus() {
            let mut comp = Compressor::new(9);
            let stream = drive_compressor(&mut comp, &input, 256);
            let mut decomp = Decompressor::new(9);
            let out = drive_decompressor(&mut decomp, &stream, 256);
            assert_eq!(out, input);
            assert_eq!(
                comp.history().storage(),
                decomp.history().storage(),
                "window contents diverged"
            );
            assert_eq!(comp.history().write_pos(), decomp.history().write_pos());
        }
    }

    // ---------------------------------------------------------------
    // 5. Edge cases
    // ---------------------------------------------------------------

    #[test]
    fn test_degenerate_window_all_history_sizes() {
        let input = data_small_alphabet(300, 9);
        for k in 0..=crate::MAX_HISTORY_LOG_2 {
            let stream = compress_bytes(&input, k);
            assert_eq!(
                decompress_bytes(&stream, k),
                Ok(input.clone()),
                "k = {}",
                k
            );
        }
    }

    #[test]
    fn test_mismatched_history_sizes_fail_or_garble() {
        // Not a guarantee of detection, only that decoding never panics.
        let input = data_repeating_text();
        let stream = compress_bytes(&input, 9);
        match decompress_bytes(&stream, 8) {
            Ok(out) => assert_ne!(out, input),
            Err(GkError::BadInput) | Err(GkError::TruncatedInput) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn test_totals_track_both_directions() {
        let input = data_sawtooth(777);
        let mut comp = Compressor::new(9);
        let stream = drive_compressor(&mut comp, &input, 128);
        assert_eq!(comp.in_total(), input.len());
        assert_eq!(comp.out_total(), stream.len());

        let mut decomp = Decompressor::new(9);
        let out = drive_decompressor(&mut decomp, &stream, 128);
        assert_eq!(decomp.in_total(), stream.len());
        assert_eq!(decomp.out_total(), out.len());
        assert_eq!(out, input);
    }
}
