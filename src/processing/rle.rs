//! PackBits run-length compression, applied to one scanline at a time.
//!
//! Output is a sequence of chunks: a header `n` in `0..=127` followed by
//! `n + 1` literal bytes, or a header `0x100 - (n - 1)` followed by one byte
//! repeated `n` times (`n` in `2..=128`).

/// Longest literal or repeat run a single chunk can describe
pub const MAX_RUN: usize = 128;

/// Compress `input` into a fresh buffer
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / MAX_RUN + 1);
    compress_into(input, &mut out);
    out
}

/// Compress `input`, appending the chunks to `out`
pub fn compress_into(input: &[u8], out: &mut Vec<u8>) {
    let mut literal_start = 0;
    let mut i = 0;

    while i < input.len() {
        let byte = input[i];
        let mut run = 1;
        while run < MAX_RUN && i + run < input.len() && input[i + run] == byte {
            run += 1;
        }

        if run >= 2 {
            flush_literal(&input[literal_start..i], out);
            flush_repeat(byte, run, out);
            i += run;
            literal_start = i;
        } else {
            i += 1;
            if i - literal_start == MAX_RUN {
                flush_literal(&input[literal_start..i], out);
                literal_start = i;
            }
        }
    }

    flush_literal(&input[literal_start..], out);
}

fn flush_literal(bytes: &[u8], out: &mut Vec<u8>) {
    if bytes.is_empty() {
        return;
    }
    debug_assert!(bytes.len() <= MAX_RUN);
    out.push((bytes.len() - 1) as u8);
    out.extend_from_slice(bytes);
}

fn flush_repeat(byte: u8, count: usize, out: &mut Vec<u8>) {
    debug_assert!((2..=MAX_RUN).contains(&count));
    out.push((0x100 - (count - 1)) as u8);
    out.push(byte);
}
