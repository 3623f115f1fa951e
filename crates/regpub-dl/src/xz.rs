//! Streaming xz decompression with fixed-size buffers.
//!
//! [`StreamingDecoder`] wraps any [`DecodeEngine`] behind a `feed`/`pull`/`finish` interface.
//! It owns one input buffer and one output buffer of [`BUF_SIZE`] bytes each. Memory use does not
//! grow with the size of the archive. [`decompress`] drives a decoder from a reader into a
//! writer, handing each decoded chunk to `write_all` before asking for more output.

use std::io::{Read, Write};

use tracing::trace;
use xz2::stream::{Action, Status, Stream, CONCATENATED};

use crate::error::{ExtractError, ExtractResult};

/// Size of the input and output buffers.
pub const BUF_SIZE: usize = 0x10000;

/// Decoder memory ceiling. Streams needing more fail with [`ExtractError::MemoryLimit`].
pub const MEM_LIMIT: u64 = 0x800_0000;

/// Outcome of a single engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub consumed: usize,
    pub produced: usize,
    pub stream_end: bool,
}

/// An opaque decompression state machine.
pub trait DecodeEngine {
    /// Decodes from `input` into `output`. `finish` is set once no more input will follow.
    fn decode(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> ExtractResult<Step>;
}

/// liblzma-backed engine accepting concatenated `.xz` streams.
pub struct LzmaEngine {
    stream: Stream,
    mem_limit: u64,
}

impl LzmaEngine {
    pub fn new() -> ExtractResult<Self> {
        Self::with_mem_limit(MEM_LIMIT)
    }

    pub fn with_mem_limit(mem_limit: u64) -> ExtractResult<Self> {
        let stream = Stream::new_stream_decoder(mem_limit, CONCATENATED).map_err(|err| {
            ExtractError::Decode {
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            stream,
            mem_limit,
        })
    }
}

impl DecodeEngine for LzmaEngine {
    fn decode(&mut self, input: &[u8], output: &mut [u8], finish: bool) -> ExtractResult<Step> {
        let (in_before, out_before) = (self.stream.total_in(), self.stream.total_out());
        let action = if finish { Action::Finish } else { Action::Run };

        let status = self
            .stream
            .process(input, output, action)
            .map_err(|err| {
                match err {
                    xz2::stream::Error::MemLimit => {
                        ExtractError::MemoryLimit {
                            limit: self.mem_limit,
                        }
                    }
                    other => {
                        ExtractError::Decode {
                            message: other.to_string(),
                        }
                    }
                }
            })?;

        Ok(Step {
            consumed: (self.stream.total_in() - in_before) as usize,
            produced: (self.stream.total_out() - out_before) as usize,
            stream_end: matches!(status, Status::StreamEnd),
        })
    }
}

pub struct StreamingDecoder<E> {
    engine: E,
    input: Box<[u8]>,
    input_pos: usize,
    input_len: usize,
    output: Box<[u8]>,
    done: bool,
}

impl<E: DecodeEngine> StreamingDecoder<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            input: vec![0u8; BUF_SIZE].into_boxed_slice(),
            input_pos: 0,
            input_len: 0,
            output: vec![0u8; BUF_SIZE].into_boxed_slice(),
            done: false,
        }
    }

    /// Whether the engine reported the end of the compressed stream.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether all fed bytes were consumed.
    pub fn needs_input(&self) -> bool {
        self.input_pos == self.input_len
    }

    /// Copies as much of `bytes` as fits into the input buffer and returns the count taken.
    ///
    /// Only accepts input once the previous chunk is fully consumed.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        if !self.needs_input() {
            return 0;
        }
        let n = bytes.len().min(self.input.len());
        self.input[..n].copy_from_slice(&bytes[..n]);
        self.input_pos = 0;
        self.input_len = n;
        n
    }

    /// Decodes pending input into the output buffer.
    ///
    /// Returns `None` once the pending input is exhausted (feed more) or the stream ended.
    pub fn pull(&mut self) -> ExtractResult<Option<&[u8]>> {
        loop {
            if self.done || self.needs_input() {
                return Ok(None);
            }

            let step = self.engine.decode(
                &self.input[self.input_pos..self.input_len],
                &mut self.output,
                false,
            )?;
            self.input_pos += step.consumed;

            if step.stream_end {
                self.done = true;
            } else if step.consumed == 0 && step.produced == 0 {
                return Err(ExtractError::Stalled);
            }

            if step.produced > 0 {
                return Ok(Some(&self.output[..step.produced]));
            }
        }
    }

    /// Drains output left after the last input. Call until it returns `None`.
    ///
    /// Returns `None` only once the stream end was reached. A decoder that keeps consuming
    /// input without producing output or reaching the end fails with [`ExtractError::Truncated`]
    /// once the input runs out.
    pub fn finish(&mut self) -> ExtractResult<Option<&[u8]>> {
        loop {
            if self.done {
                return Ok(None);
            }

            let step = self.engine.decode(
                &self.input[self.input_pos..self.input_len],
                &mut self.output,
                true,
            )?;
            self.input_pos += step.consumed;

            if step.stream_end {
                self.done = true;
            } else if step.consumed == 0 && step.produced == 0 {
                return Err(ExtractError::Truncated);
            }

            if step.produced > 0 {
                return Ok(Some(&self.output[..step.produced]));
            }
        }
    }
}

/// Decompresses `reader` into `writer`, returning the number of decoded bytes.
///
/// Each decoded chunk is written with `write_all` before more output is requested, so a slow
/// writer throttles decoding. Apart from the decoder's own state, at most three
/// [`BUF_SIZE`] buffers are live at any time.
pub fn decompress<E, R, W>(engine: E, mut reader: R, mut writer: W) -> ExtractResult<u64>
where
    E: DecodeEngine,
    R: Read,
    W: Write,
{
    let mut decoder = StreamingDecoder::new(engine);
    let mut chunk = vec![0u8; BUF_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        if decoder.is_done() {
            return Err(ExtractError::TrailingData);
        }

        let mut offset = 0;
        while offset < n {
            offset += decoder.feed(&chunk[offset..n]);
            while let Some(out) = decoder.pull()? {
                writer.write_all(out)?;
                total += out.len() as u64;
            }
            if decoder.is_done() && (offset < n || !decoder.needs_input()) {
                return Err(ExtractError::TrailingData);
            }
        }
    }

    while let Some(out) = decoder.finish()? {
        writer.write_all(out)?;
        total += out.len() as u64;
    }
    if !decoder.is_done() {
        return Err(ExtractError::Truncated);
    }
    writer.flush()?;

    trace!(bytes = total, "xz stream decoded");
    Ok(total)
}

/// Decompresses an xz stream with the liblzma engine.
pub fn decompress_xz<R: Read, W: Write>(reader: R, writer: W) -> ExtractResult<u64> {
    decompress(LzmaEngine::new()?, reader, writer)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use xz2::write::XzEncoder;

    use super::*;

    /// Records the size of every write so tests can check chunk bounds.
    #[derive(Default)]
    struct RecordingWriter {
        data: Vec<u8>,
        largest_write: usize,
        writes: usize,
    }

    impl Write for RecordingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.largest_write = self.largest_write.max(buf.len());
            self.writes += 1;
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Passes bytes through, at most `max_out` per call, and ends on finish.
    struct CopyEngine {
        max_out: usize,
    }

    impl DecodeEngine for CopyEngine {
        fn decode(
            &mut self,
            input: &[u8],
            output: &mut [u8],
            finish: bool,
        ) -> ExtractResult<Step> {
            let n = input.len().min(output.len()).min(self.max_out);
            output[..n].copy_from_slice(&input[..n]);
            Ok(Step {
                consumed: n,
                produced: n,
                stream_end: finish && n == input.len(),
            })
        }
    }

    /// Consumes one byte per call without ever producing output or ending the stream.
    struct SwallowEngine;

    impl DecodeEngine for SwallowEngine {
        fn decode(
            &mut self,
            input: &[u8],
            _output: &mut [u8],
            _finish: bool,
        ) -> ExtractResult<Step> {
            Ok(Step {
                consumed: input.len().min(1),
                produced: 0,
                stream_end: false,
            })
        }
    }

    fn sample_data(len: usize) -> Vec<u8> {
        let mut state = 0x2545_f491_u32;
        (0..len)
            .map(|i| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                if i % 3 == 0 {
                    b'a'
                } else {
                    (state & 0xff) as u8
                }
            })
            .collect()
    }

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_decompress_large_stream_in_bounded_chunks() {
        let data = sample_data(3 * 1024 * 1024 + 17);
        let compressed = compress(&data);

        let mut writer = RecordingWriter::default();
        let total = decompress_xz(Cursor::new(compressed), &mut writer).unwrap();

        assert_eq!(total, data.len() as u64);
        assert_eq!(writer.data, data);
        assert!(writer.largest_write <= BUF_SIZE);
        assert!(writer.writes >= data.len() / BUF_SIZE);
    }

    #[test]
    fn test_decompress_concatenated_streams() {
        let mut compressed = compress(b"first-");
        compressed.extend(compress(b"second"));

        let mut out = Vec::new();
        decompress_xz(Cursor::new(compressed), &mut out).unwrap();
        assert_eq!(out, b"first-second");
    }

    #[test]
    fn test_truncated_stream_fails() {
        let compressed = compress(&sample_data(200_000));
        let truncated = &compressed[..compressed.len() / 2];

        let err = decompress_xz(Cursor::new(truncated), std::io::sink()).unwrap_err();
        assert!(
            matches!(err, ExtractError::Truncated | ExtractError::Decode { .. }),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_garbage_input_fails() {
        let err = decompress_xz(Cursor::new(b"definitely not xz".to_vec()), std::io::sink())
            .unwrap_err();
        assert!(matches!(err, ExtractError::Decode { .. }));
    }

    #[test]
    fn test_memory_limit_is_a_clean_error() {
        let compressed = compress(&sample_data(64 * 1024));
        let engine = LzmaEngine::with_mem_limit(1024).unwrap();

        let err = decompress(engine, Cursor::new(compressed), std::io::sink()).unwrap_err();
        assert!(matches!(err, ExtractError::MemoryLimit { limit: 1024 }));
    }

    #[test]
    fn test_output_chunks_never_exceed_buffer() {
        let data = sample_data(BUF_SIZE * 5 + 3);
        let mut writer = RecordingWriter::default();

        decompress(
            CopyEngine {
                max_out: usize::MAX,
            },
            Cursor::new(data.clone()),
            &mut writer,
        )
        .unwrap();

        assert_eq!(writer.data, data);
        assert!(writer.largest_write <= BUF_SIZE);
    }

    #[test]
    fn test_slow_engine_is_drained_by_repeated_pulls() {
        let data = sample_data(10_000);
        let mut writer = RecordingWriter::default();

        decompress(
            CopyEngine { max_out: 100 },
            Cursor::new(data.clone()),
            &mut writer,
        )
        .unwrap();

        assert_eq!(writer.data, data);
        assert_eq!(writer.largest_write, 100);
    }

    #[test]
    fn test_feed_refuses_input_until_consumed() {
        let mut decoder = StreamingDecoder::new(CopyEngine { max_out: 4 });
        assert_eq!(decoder.feed(b"abcdefgh"), 8);
        assert_eq!(decoder.feed(b"more"), 0);

        assert_eq!(decoder.pull().unwrap(), Some(&b"abcd"[..]));
        assert_eq!(decoder.pull().unwrap(), Some(&b"efgh"[..]));
        assert_eq!(decoder.pull().unwrap(), None);
        assert!(decoder.needs_input());
        assert_eq!(decoder.finish().unwrap(), None);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_finish_without_stream_end_is_truncated() {
        let mut decoder = StreamingDecoder::new(SwallowEngine);
        decoder.feed(b"abc");

        assert!(matches!(decoder.finish(), Err(ExtractError::Truncated)));
        assert!(!decoder.is_done());
    }

    #[test]
    fn test_decompress_rejects_stream_without_end() {
        let mut out = Vec::new();
        let err = decompress(SwallowEngine, Cursor::new(b"abc".to_vec()), &mut out).unwrap_err();

        assert!(matches!(err, ExtractError::Truncated));
        assert!(out.is_empty());
    }
}
