//! Streaming transformer
//!
//! Adapts a byte sink to receive audio that has been passed through an
//! [`Engine`]. Input bytes are decoded in bounded chunks, pushed to the
//! engine, and whatever the engine has ready is encoded and written to the
//! sink before the next chunk.
//!
//! Lifecycle: a transformer is Active from construction until [`close`],
//! after which writes and flushes fail with `InvalidState`.
//!
//! [`close`]: Transformer::close

use std::io::{self, Write};

use log::{debug, warn};

use super::config::{with_config, StreamConfig, StreamOption};
use crate::engine::{self, Engine, PsolaEngine, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use crate::error::{PartialWrite, Result, VarispeedError};
use crate::pcm::{check_sample_alignment, encode_samples, FrameView, PcmSample, SampleFormat};

// ============================================================================
// Constants
// ============================================================================

/// Maximum frames pushed to the engine per inner write iteration
pub const CHUNK_FRAMES: usize = 2048;

// ============================================================================
// Stream State
// ============================================================================

/// Lifecycle state of a [`Transformer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Engine is live; writes and flushes are accepted
    Active,
    /// Engine has been released; terminal
    Closed,
}

/// Running byte and frame totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Input bytes pushed to the engine
    pub bytes_in: u64,
    /// Output bytes written to the sink
    pub bytes_out: u64,
    /// Input frames pushed to the engine
    pub frames_in: u64,
    /// Output frames written to the sink
    pub frames_out: u64,
}

// ============================================================================
// Scratch Buffers
// ============================================================================

/// Reusable buffers for one chunk of the active encoding
struct ScratchBuffer<S> {
    decoded: Vec<S>,
    drained: Vec<S>,
    encoded: Vec<u8>,
}

impl<S: PcmSample> ScratchBuffer<S> {
    fn new(capacity: usize) -> Self {
        Self {
            decoded: Vec::with_capacity(capacity),
            drained: vec![S::default(); capacity],
            encoded: Vec::with_capacity(capacity * S::FORMAT.sample_size()),
        }
    }
}

enum Scratch {
    Int16(ScratchBuffer<i16>),
    Float32(ScratchBuffer<f32>),
}

impl Scratch {
    fn new(format: SampleFormat, capacity: usize) -> Self {
        match format {
            SampleFormat::Int16 => Scratch::Int16(ScratchBuffer::new(capacity)),
            SampleFormat::Float32 => Scratch::Float32(ScratchBuffer::new(capacity)),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Borrowed view of the parts a single write or flush works on
struct Pipeline<'p, S, E: ?Sized, W: ?Sized> {
    engine: &'p mut E,
    sink: &'p mut W,
    scratch: &'p mut ScratchBuffer<S>,
    stats: &'p mut StreamStats,
    channels: usize,
}

impl<'p, S, E, W> Pipeline<'p, S, E, W>
where
    S: PcmSample,
    E: Engine + ?Sized,
    W: Write + ?Sized,
{
    /// Push `view` chunk by chunk, draining ready output after each chunk
    ///
    /// `consumed` grows by each chunk's byte length as soon as the engine
    /// accepts it, so it stays exact when the sink fails afterwards.
    fn push(&mut self, view: FrameView<'_>, consumed: &mut usize) -> Result<()> {
        for chunk in view.chunks(CHUNK_FRAMES) {
            chunk.decode_into(&mut self.scratch.decoded)?;
            S::write_to(&mut *self.engine, &self.scratch.decoded)
                .map_err(VarispeedError::into_engine_write)?;

            *consumed += chunk.byte_len();
            self.stats.bytes_in += chunk.byte_len() as u64;
            self.stats.frames_in += chunk.frame_count() as u64;

            self.drain_ready()?;
        }
        Ok(())
    }

    /// Read into the scratch buffer until the engine has nothing ready
    fn drain_ready(&mut self) -> Result<()> {
        loop {
            let frames = S::read_from(&mut *self.engine, &mut self.scratch.drained);
            if frames == 0 {
                return Ok(());
            }
            let samples = self.sample_span(frames, self.scratch.drained.len())?;
            Self::emit(
                &mut *self.sink,
                &mut self.scratch.encoded,
                &mut *self.stats,
                &self.scratch.drained[..samples],
                frames,
            )?;
        }
    }

    /// Read everything the engine reports as available, sized to availability
    fn drain_available(&mut self) -> Result<()> {
        loop {
            let available = self.engine.frames_available();
            if available == 0 {
                return Ok(());
            }

            let mut samples = vec![S::default(); available * self.channels];
            let frames = S::read_from(&mut *self.engine, &mut samples);
            if frames == 0 {
                return Err(VarispeedError::EngineFlush {
                    reason: format!(
                        "engine reported {} frames available but returned none",
                        available
                    ),
                });
            }
            let len = self.sample_span(frames, samples.len())?;
            Self::emit(
                &mut *self.sink,
                &mut self.scratch.encoded,
                &mut *self.stats,
                &samples[..len],
                frames,
            )?;
        }
    }

    fn sample_span(&self, frames: usize, capacity: usize) -> Result<usize> {
        frames
            .checked_mul(self.channels)
            .filter(|&samples| samples <= capacity)
            .ok_or_else(|| VarispeedError::Internal {
                reason: format!(
                    "engine returned {} frames for a buffer of {} samples",
                    frames, capacity
                ),
            })
    }

    fn emit(
        sink: &mut W,
        encoded: &mut Vec<u8>,
        stats: &mut StreamStats,
        samples: &[S],
        frames: usize,
    ) -> Result<()> {
        encoded.clear();
        encode_samples(samples, encoded);
        sink.write_all(encoded)
            .map_err(|source| VarispeedError::SinkWrite { source })?;
        stats.bytes_out += encoded.len() as u64;
        stats.frames_out += frames as u64;
        Ok(())
    }

    /// Write `buf`, completing any carried partial frame first
    fn write(
        &mut self,
        carry: &mut Vec<u8>,
        format: SampleFormat,
        buf: &[u8],
    ) -> std::result::Result<usize, PartialWrite> {
        let frame_size = format.frame_size(self.channels);
        let mut consumed = 0;
        let mut input = buf;

        if !carry.is_empty() {
            let needed = frame_size - carry.len();
            if input.len() < needed {
                carry.extend_from_slice(input);
                return Ok(input.len());
            }

            let previous = carry.len();
            carry.extend_from_slice(&input[..needed]);
            let mut pushed = 0;
            let result = FrameView::new(carry.as_slice(), format, self.channels)
                .and_then(|view| self.push(view, &mut pushed));
            if let Err(err) = result {
                if pushed == 0 {
                    // Engine never saw the frame; leave the carry as it was
                    carry.truncate(previous);
                    return Err(PartialWrite::new(0, err));
                }
                carry.clear();
                return Err(PartialWrite::new(needed, err));
            }
            carry.clear();
            consumed = needed;
            input = &input[needed..];
        }

        let (view, rest) = FrameView::split_whole_frames(input, format, self.channels)
            .map_err(|err| PartialWrite::new(consumed, err))?;
        if let Err(err) = self.push(view, &mut consumed) {
            return Err(PartialWrite::new(consumed, err));
        }

        carry.extend_from_slice(rest);
        Ok(consumed + rest.len())
    }
}

// ============================================================================
// Transformer
// ============================================================================

/// Streams raw PCM through an [`Engine`] into a borrowed sink
///
/// The sink is borrowed for the transformer's lifetime and is never closed
/// by it. The engine is owned and released exactly once, by [`close`] or
/// on drop.
///
/// # Example
/// ```
/// use varispeed::pcm::SampleFormat;
/// use varispeed::stream::{with_speed, Transformer};
///
/// let mut out = Vec::new();
/// let mut transformer =
///     Transformer::new(&mut out, 44100, SampleFormat::Int16, [with_speed(2.0)]).unwrap();
///
/// let silence = vec![0u8; 1000 * 2];
/// assert_eq!(transformer.write_bytes(&silence).unwrap(), silence.len());
/// transformer.flush().unwrap();
/// transformer.close();
/// drop(transformer);
///
/// assert!(!out.is_empty() && out.len() < silence.len());
/// ```
///
/// [`close`]: Transformer::close
pub struct Transformer<'a, W: Write + ?Sized, E: Engine = PsolaEngine> {
    sink: &'a mut W,
    sample_rate: u32,
    format: SampleFormat,
    config: StreamConfig,
    engine: Option<E>,
    scratch: Option<Scratch>,
    carry: Vec<u8>,
    stats: StreamStats,
}

impl<'a, W: Write + ?Sized> Transformer<'a, W> {
    /// Create a transformer backed by a [`PsolaEngine`]
    ///
    /// # Arguments
    /// * `sink` - Destination for transformed bytes
    /// * `sample_rate` - Sample rate in Hz, within the engine limits
    /// * `format` - Encoding of both input and output bytes
    /// * `options` - Configuration mutators, applied in order
    ///
    /// # Errors
    /// * `Invalid` - sample rate out of range, or an option failed
    /// * `EngineCreate` - the engine could not be created
    pub fn new<I>(sink: &'a mut W, sample_rate: u32, format: SampleFormat, options: I) -> Result<Self>
    where
        I: IntoIterator<Item = StreamOption>,
    {
        Self::with_engine(sink, sample_rate, format, options, PsolaEngine::new)
    }

    /// Create a transformer from a finished configuration
    pub fn from_config(
        sink: &'a mut W,
        sample_rate: u32,
        format: SampleFormat,
        config: StreamConfig,
    ) -> Result<Self> {
        Self::new(sink, sample_rate, format, [with_config(config)])
    }
}

impl<'a, W: Write + ?Sized, E: Engine> Transformer<'a, W, E> {
    /// Create a transformer with a caller-supplied engine constructor
    ///
    /// `create` receives the sample rate and the resolved channel count.
    /// Options are applied before the engine exists; their values are
    /// pushed to it afterwards in volume, speed, pitch, rate, quality order.
    pub fn with_engine<I, F>(
        sink: &'a mut W,
        sample_rate: u32,
        format: SampleFormat,
        options: I,
        create: F,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = StreamOption>,
        F: FnOnce(u32, u32) -> Result<E>,
    {
        if !engine::sample_rate_in_range(sample_rate) {
            return Err(VarispeedError::invalid(format!(
                "sample rate {} is out of range [{}, {}]",
                sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }

        let config = StreamConfig::from_options(options)?;
        let channels = config.channels();

        let mut engine =
            create(sample_rate, channels).map_err(|e| e.into_engine_create(sample_rate, channels))?;
        config.apply_to(&mut engine);

        debug!(
            "transformer created: {} Hz, {} channels, {} encoding",
            sample_rate, channels, format
        );

        Ok(Self {
            sink,
            sample_rate,
            format,
            config,
            engine: Some(engine),
            scratch: Some(Scratch::new(format, CHUNK_FRAMES * channels as usize)),
            carry: Vec::new(),
            stats: StreamStats::default(),
        })
    }

    /// Push raw bytes through the engine, forwarding ready output to the sink
    ///
    /// Returns the number of input bytes consumed. In multi-channel streams
    /// a trailing partial frame is held back, counted as consumed, and
    /// completed by the next write.
    ///
    /// # Errors
    /// The returned [`PartialWrite`] carries the bytes consumed before the
    /// failure:
    /// * `Invalid` - length is not a multiple of the sample size (0 consumed)
    /// * `EngineWrite` - the engine rejected a chunk
    /// * `SinkWrite` - the sink failed; the chunk that produced the output
    ///   is already counted as consumed
    /// * `InvalidState` - the transformer is closed
    pub fn write_bytes(&mut self, buf: &[u8]) -> std::result::Result<usize, PartialWrite> {
        let format = self.format;
        let channels = self.channels();
        let Self {
            sink,
            engine,
            scratch,
            carry,
            stats,
            ..
        } = self;

        let engine = engine
            .as_mut()
            .ok_or_else(|| PartialWrite::new(0, VarispeedError::InvalidState { operation: "write" }))?;
        check_sample_alignment(buf.len(), format).map_err(|err| PartialWrite::new(0, err))?;
        if buf.is_empty() {
            return Ok(0);
        }

        match (format, scratch.as_mut()) {
            (SampleFormat::Int16, Some(Scratch::Int16(scratch))) => Pipeline {
                engine,
                sink: &mut **sink,
                scratch,
                stats,
                channels,
            }
            .write(carry, format, buf),
            (SampleFormat::Float32, Some(Scratch::Float32(scratch))) => Pipeline {
                engine,
                sink: &mut **sink,
                scratch,
                stats,
                channels,
            }
            .write(carry, format, buf),
            _ => Err(PartialWrite::new(0, Self::scratch_mismatch(format))),
        }
    }

    /// Force buffered and lookahead frames out of the engine into the sink
    ///
    /// No input is pushed. An incomplete carried frame is discarded.
    ///
    /// # Errors
    /// * `EngineFlush` - the engine failed to flush
    /// * `SinkWrite` - the sink failed
    /// * `InvalidState` - the transformer is closed
    pub fn flush(&mut self) -> Result<()> {
        let format = self.format;
        let channels = self.channels();
        let Self {
            sink,
            engine,
            scratch,
            carry,
            stats,
            ..
        } = self;

        let engine = engine
            .as_mut()
            .ok_or_else(|| VarispeedError::InvalidState { operation: "flush" })?;

        if !carry.is_empty() {
            warn!("discarding {} bytes of an incomplete frame", carry.len());
            carry.clear();
        }

        engine.flush().map_err(VarispeedError::into_engine_flush)?;

        let frames_before = stats.frames_out;
        match (format, scratch.as_mut()) {
            (SampleFormat::Int16, Some(Scratch::Int16(scratch))) => Pipeline {
                engine,
                sink: &mut **sink,
                scratch,
                stats: &mut *stats,
                channels,
            }
            .drain_available()?,
            (SampleFormat::Float32, Some(Scratch::Float32(scratch))) => Pipeline {
                engine,
                sink: &mut **sink,
                scratch,
                stats: &mut *stats,
                channels,
            }
            .drain_available()?,
            _ => return Err(Self::scratch_mismatch(format)),
        }

        debug!("flush drained {} frames", stats.frames_out - frames_before);
        Ok(())
    }

    /// Release the engine and scratch buffer
    ///
    /// Idempotent; later calls do nothing.
    pub fn close(&mut self) {
        if let Some(engine) = self.engine.take() {
            drop(engine);
            debug!(
                "transformer closed: {} frames in, {} frames out",
                self.stats.frames_in, self.stats.frames_out
            );
        }
        self.scratch = None;
        self.carry = Vec::new();
    }

    fn scratch_mismatch(format: SampleFormat) -> VarispeedError {
        VarispeedError::Internal {
            reason: format!("scratch buffer does not match the {} encoding", format),
        }
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Encoding of both input and output bytes
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Interleaved channel count
    pub fn channels(&self) -> usize {
        self.config.channels() as usize
    }

    /// Configuration resolved from the construction options
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Totals since construction
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Bytes of an incomplete frame waiting for the next write
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }

    /// The engine, while the transformer is active
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Active until [`close`](Transformer::close) or drop
    pub fn state(&self) -> StreamState {
        if self.engine.is_some() {
            StreamState::Active
        } else {
            StreamState::Closed
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == StreamState::Closed
    }
}

impl<W: Write + ?Sized, E: Engine> Drop for Transformer<'_, W, E> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Byte-stream adapter for use with [`std::io::copy`] and friends
///
/// A write that fails after consuming some input reports that progress as
/// `Ok`; the failure surfaces on the next call. Use
/// [`Transformer::write_bytes`] to see both at once.
impl<W: Write + ?Sized, E: Engine> Write for Transformer<'_, W, E> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.write_bytes(buf) {
            Ok(consumed) => Ok(consumed),
            Err(partial) if partial.consumed > 0 => {
                debug!("write stopped after {} bytes: {}", partial.consumed, partial.source);
                Ok(partial.consumed)
            }
            Err(partial) => Err(partial.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Transformer::flush(self)?;
        self.sink.flush()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::config::{
        with_channels, with_pitch, with_quality, with_rate, with_speed, with_volume,
    };
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    // ------------------------------------------------------------------------
    // Scripted engine
    // ------------------------------------------------------------------------

    /// Shared record of what a [`MockEngine`] saw
    #[derive(Debug, Default)]
    struct Script {
        calls: Vec<String>,
        writes: Vec<usize>,
        fail_write_at: Option<usize>,
        fail_flush: bool,
        stall_reads: bool,
        drops: usize,
    }

    /// Identity engine that holds back `lookahead` frames until flushed
    struct MockEngine {
        channels: usize,
        lookahead: usize,
        pending: Vec<f32>,
        ready: Vec<f32>,
        script: Rc<RefCell<Script>>,
    }

    impl MockEngine {
        fn new(channels: u32, lookahead: usize, script: Rc<RefCell<Script>>) -> Self {
            Self {
                channels: channels as usize,
                lookahead,
                pending: Vec::new(),
                ready: Vec::new(),
                script,
            }
        }

        fn record(&self, call: &str) {
            self.script.borrow_mut().calls.push(call.to_string());
        }

        fn accept(&mut self, samples: Vec<f32>) -> Result<()> {
            let frames = samples.len() / self.channels;
            let mut script = self.script.borrow_mut();
            if script.fail_write_at == Some(script.writes.len()) {
                return Err(VarispeedError::invalid("scripted write failure"));
            }
            script.writes.push(frames);
            drop(script);

            self.pending.extend(samples);
            let keep = self.lookahead * self.channels;
            if self.pending.len() > keep {
                let release = self.pending.len() - keep;
                self.ready.extend(self.pending.drain(..release));
            }
            Ok(())
        }

        fn take(&mut self, max_samples: usize) -> Vec<f32> {
            if self.script.borrow().stall_reads {
                return Vec::new();
            }
            let frames = (self.ready.len() / self.channels).min(max_samples / self.channels);
            self.ready.drain(..frames * self.channels).collect()
        }
    }

    impl Drop for MockEngine {
        fn drop(&mut self) {
            self.script.borrow_mut().drops += 1;
        }
    }

    impl Engine for MockEngine {
        fn sample_rate(&self) -> u32 {
            44100
        }
        fn set_sample_rate(&mut self, _sample_rate: u32) {
            self.record("sample_rate");
        }
        fn num_channels(&self) -> u32 {
            self.channels as u32
        }
        fn set_num_channels(&mut self, _channels: u32) {
            self.record("channels");
        }
        fn volume(&self) -> f32 {
            1.0
        }
        fn set_volume(&mut self, _volume: f32) {
            self.record("volume");
        }
        fn speed(&self) -> f32 {
            1.0
        }
        fn set_speed(&mut self, _speed: f32) {
            self.record("speed");
        }
        fn pitch(&self) -> f32 {
            1.0
        }
        fn set_pitch(&mut self, _pitch: f32) {
            self.record("pitch");
        }
        fn rate(&self) -> f32 {
            1.0
        }
        fn set_rate(&mut self, _rate: f32) {
            self.record("rate");
        }
        fn quality(&self) -> bool {
            false
        }
        fn set_quality(&mut self, _quality: bool) {
            self.record("quality");
        }
        fn write_f32(&mut self, samples: &[f32]) -> Result<()> {
            self.accept(samples.to_vec())
        }
        fn write_i16(&mut self, samples: &[i16]) -> Result<()> {
            self.accept(samples.iter().map(|&s| s as f32).collect())
        }
        fn read_f32(&mut self, out: &mut [f32]) -> usize {
            let taken = self.take(out.len());
            out[..taken.len()].copy_from_slice(&taken);
            taken.len() / self.channels
        }
        fn read_i16(&mut self, out: &mut [i16]) -> usize {
            let taken = self.take(out.len());
            for (slot, sample) in out.iter_mut().zip(&taken) {
                *slot = *sample as i16;
            }
            taken.len() / self.channels
        }
        fn flush(&mut self) -> Result<()> {
            if self.script.borrow().fail_flush {
                return Err(VarispeedError::invalid("scripted flush failure"));
            }
            self.ready.append(&mut self.pending);
            Ok(())
        }
        fn frames_available(&self) -> usize {
            self.ready.len() / self.channels
        }
    }

    // ------------------------------------------------------------------------
    // Sinks
    // ------------------------------------------------------------------------

    /// Sink that counts writes and fails once `fail_after` writes succeeded
    #[derive(Default)]
    struct CountingSink {
        data: Vec<u8>,
        writes: usize,
        fail_after: Option<usize>,
    }

    impl Write for CountingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_after == Some(self.writes) {
                return Err(io::Error::new(io::ErrorKind::Other, "sink failed"));
            }
            self.writes += 1;
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn i16_bytes(samples: &[i16]) -> Vec<u8> {
        let mut out = Vec::new();
        encode_samples(samples, &mut out);
        out
    }

    fn mock_transformer<'a>(
        sink: &'a mut CountingSink,
        format: SampleFormat,
        options: Vec<StreamOption>,
        lookahead: usize,
    ) -> (Transformer<'a, CountingSink, MockEngine>, Rc<RefCell<Script>>) {
        let script = Rc::new(RefCell::new(Script::default()));
        let handle = Rc::clone(&script);
        let transformer = Transformer::with_engine(sink, 44100, format, options, move |_, channels| {
            Ok(MockEngine::new(channels, lookahead, handle))
        })
        .unwrap();
        (transformer, script)
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    #[test]
    fn test_rejects_sample_rate_out_of_range() {
        let mut sink = CountingSink::default();
        let mut created = false;
        let result = Transformer::with_engine(
            &mut sink,
            MIN_SAMPLE_RATE - 1,
            SampleFormat::Int16,
            Vec::new(),
            |rate, channels| {
                created = true;
                PsolaEngine::new(rate, channels)
            },
        );
        assert!(matches!(result, Err(VarispeedError::Invalid { .. })));
        assert!(!created);

        let mut sink = CountingSink::default();
        let result = Transformer::new(&mut sink, MAX_SAMPLE_RATE + 1, SampleFormat::Int16, []);
        assert!(matches!(result, Err(VarispeedError::Invalid { .. })));
    }

    #[test]
    fn test_option_failure_prevents_engine_creation() {
        let mut sink = CountingSink::default();
        let mut created = false;
        let result = Transformer::with_engine(
            &mut sink,
            44100,
            SampleFormat::Int16,
            [StreamOption::new(|_| Err(VarispeedError::invalid("test option error")))],
            |rate, channels| {
                created = true;
                PsolaEngine::new(rate, channels)
            },
        );
        let err = result.err().unwrap();
        assert_eq!(err.to_string(), "Invalid value: test option error");
        assert!(!created);
    }

    #[test]
    fn test_engine_create_failure_is_reported() {
        let mut sink = CountingSink::default();
        let result = Transformer::<_, PsolaEngine>::with_engine(
            &mut sink,
            44100,
            SampleFormat::Float32,
            [with_channels(2)],
            |_, _| Err(VarispeedError::invalid("no engine today")),
        );
        match result {
            Err(VarispeedError::EngineCreate {
                sample_rate,
                channels,
                ..
            }) => {
                assert_eq!(sample_rate, 44100);
                assert_eq!(channels, 2);
            }
            other => panic!("expected EngineCreate, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_options_reach_engine_in_order() {
        let mut sink = CountingSink::default();
        let options = vec![
            with_quality(),
            with_rate(1.1),
            with_pitch(0.9),
            with_speed(1.5),
            with_volume(0.8),
        ];
        let (_transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, options, 0);
        assert_eq!(
            script.borrow().calls,
            vec!["volume", "speed", "pitch", "rate", "quality"]
        );
    }

    #[test]
    fn test_unset_options_are_not_pushed() {
        let mut sink = CountingSink::default();
        let (_transformer, script) =
            mock_transformer(&mut sink, SampleFormat::Int16, vec![with_pitch(2.0)], 0);
        assert_eq!(script.borrow().calls, vec!["pitch"]);
    }

    #[test]
    fn test_scratch_sized_to_chunk() {
        let mut sink = CountingSink::default();
        let (transformer, _) =
            mock_transformer(&mut sink, SampleFormat::Float32, vec![with_channels(3)], 0);
        match transformer.scratch.as_ref() {
            Some(Scratch::Float32(scratch)) => {
                assert_eq!(scratch.drained.len(), CHUNK_FRAMES * 3);
            }
            _ => panic!("expected float scratch buffer"),
        }
        assert_eq!(transformer.channels(), 3);
        assert_eq!(transformer.format(), SampleFormat::Float32);
        assert_eq!(transformer.sample_rate(), 44100);
        assert_eq!(transformer.state(), StreamState::Active);
    }

    // ------------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_write_touches_nothing() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        assert_eq!(transformer.write_bytes(&[]).unwrap(), 0);
        assert!(script.borrow().writes.is_empty());
        drop(transformer);
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn test_misaligned_write_is_invalid() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) =
            mock_transformer(&mut sink, SampleFormat::Float32, vec![], 0);
        let err = transformer.write_bytes(&[1, 2, 3, 4, 5]).unwrap_err();
        assert_eq!(err.consumed, 0);
        assert!(matches!(err.source, VarispeedError::Invalid { .. }));
        assert!(script.borrow().writes.is_empty());
        drop(transformer);
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn test_write_chunks_and_drains() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        let input: Vec<i16> = (0..5000).map(|i| (i % 1000) as i16).collect();
        let bytes = i16_bytes(&input);

        assert_eq!(transformer.write_bytes(&bytes).unwrap(), bytes.len());
        assert_eq!(script.borrow().writes, vec![CHUNK_FRAMES, CHUNK_FRAMES, 904]);
        assert_eq!(transformer.stats().frames_in, 5000);
        assert_eq!(transformer.stats().frames_out, 5000);
        drop(transformer);
        assert_eq!(sink.data, bytes);
    }

    #[test]
    fn test_lookahead_is_released_by_flush() {
        let mut sink = CountingSink::default();
        let (mut transformer, _) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 100);
        let bytes = i16_bytes(&[7; 250]);

        transformer.write_bytes(&bytes).unwrap();
        assert_eq!(transformer.stats().frames_out, 150);
        transformer.flush().unwrap();
        assert_eq!(transformer.stats().frames_out, 250);
        drop(transformer);
        assert_eq!(sink.data, bytes);
    }

    #[test]
    fn test_engine_write_failure_reports_progress() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        script.borrow_mut().fail_write_at = Some(1);
        let bytes = i16_bytes(&vec![1; CHUNK_FRAMES * 2 + 10]);

        let err = transformer.write_bytes(&bytes).unwrap_err();
        assert_eq!(err.consumed, CHUNK_FRAMES * 2);
        assert!(matches!(err.source, VarispeedError::EngineWrite { .. }));
        assert!(err.error().is_engine_failure());
    }

    #[test]
    fn test_sink_failure_counts_pushed_chunk() {
        let mut sink = CountingSink {
            fail_after: Some(0),
            ..CountingSink::default()
        };
        let (mut transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        let bytes = i16_bytes(&vec![1; CHUNK_FRAMES * 3]);

        let err = transformer.write_bytes(&bytes).unwrap_err();
        assert_eq!(err.consumed, CHUNK_FRAMES * 2);
        assert!(err.error().is_sink_failure());
        assert_eq!(script.borrow().writes, vec![CHUNK_FRAMES]);
    }

    #[test]
    fn test_partial_frame_is_carried() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) =
            mock_transformer(&mut sink, SampleFormat::Int16, vec![with_channels(2)], 0);

        // One and a half stereo frames
        assert_eq!(transformer.write_bytes(&i16_bytes(&[1, 2, 3])).unwrap(), 6);
        assert_eq!(transformer.pending_bytes(), 2);
        assert_eq!(script.borrow().writes, vec![1]);

        assert_eq!(transformer.write_bytes(&i16_bytes(&[4, 5, 6])).unwrap(), 6);
        assert_eq!(transformer.pending_bytes(), 0);
        assert_eq!(script.borrow().writes, vec![1, 1, 1]);
        drop(transformer);
        assert_eq!(sink.data, i16_bytes(&[1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn test_carry_restored_when_engine_rejects_frame() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) =
            mock_transformer(&mut sink, SampleFormat::Int16, vec![with_channels(2)], 0);
        transformer.write_bytes(&i16_bytes(&[1])).unwrap();
        script.borrow_mut().fail_write_at = Some(0);

        let err = transformer.write_bytes(&i16_bytes(&[2, 3, 4])).unwrap_err();
        assert_eq!(err.consumed, 0);
        assert_eq!(transformer.pending_bytes(), 2);
    }

    #[test]
    fn test_float_encoding_passes_through() {
        let mut sink = CountingSink::default();
        let (mut transformer, _) = mock_transformer(&mut sink, SampleFormat::Float32, vec![], 0);
        let mut bytes = Vec::new();
        encode_samples(&[0.5f32, -0.25, 1.0], &mut bytes);

        assert_eq!(transformer.write_bytes(&bytes).unwrap(), 12);
        drop(transformer);
        assert_eq!(sink.data, bytes);
    }

    #[test]
    fn test_mismatched_scratch_is_internal() {
        let mut sink = CountingSink::default();
        let (mut transformer, _) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        transformer.scratch = Some(Scratch::new(SampleFormat::Float32, 16));

        let err = transformer.write_bytes(&[0, 0]).unwrap_err();
        assert!(matches!(err.source, VarispeedError::Internal { .. }));
        assert!(matches!(
            transformer.flush(),
            Err(VarispeedError::Internal { .. })
        ));
    }

    // ------------------------------------------------------------------------
    // Flush and Close
    // ------------------------------------------------------------------------

    #[test]
    fn test_flush_without_writes_is_silent() {
        let mut sink = CountingSink::default();
        let (mut transformer, _) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 64);
        transformer.flush().unwrap();
        drop(transformer);
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn test_flush_failure_is_engine_flush() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 8);
        script.borrow_mut().fail_flush = true;
        assert!(matches!(
            transformer.flush(),
            Err(VarispeedError::EngineFlush { .. })
        ));
    }

    #[test]
    fn test_flush_with_unreadable_frames_fails() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 8);
        transformer.write_bytes(&i16_bytes(&[1, 2, 3])).unwrap();
        script.borrow_mut().stall_reads = true;

        let err = transformer.flush().unwrap_err();
        assert!(matches!(err, VarispeedError::EngineFlush { .. }));
        assert!(err.to_string().contains("3 frames available"));
        drop(transformer);
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn test_flush_sink_failure() {
        let mut sink = CountingSink {
            fail_after: Some(0),
            ..CountingSink::default()
        };
        let (mut transformer, _) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 8);
        transformer.write_bytes(&i16_bytes(&[1, 2, 3])).unwrap();
        let err = transformer.flush().unwrap_err();
        assert!(err.is_sink_failure());
    }

    #[test]
    fn test_flush_discards_incomplete_frame() {
        let mut sink = CountingSink::default();
        let (mut transformer, _) =
            mock_transformer(&mut sink, SampleFormat::Int16, vec![with_channels(2)], 0);
        transformer.write_bytes(&i16_bytes(&[1])).unwrap();
        transformer.flush().unwrap();
        assert_eq!(transformer.pending_bytes(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);

        transformer.close();
        transformer.close();
        assert!(transformer.is_closed());
        assert!(transformer.engine().is_none());
        assert_eq!(script.borrow().drops, 1);

        let err = transformer.write_bytes(&[0, 0]).unwrap_err();
        assert!(matches!(
            err.source,
            VarispeedError::InvalidState { operation: "write" }
        ));
        assert!(matches!(
            transformer.flush(),
            Err(VarispeedError::InvalidState { operation: "flush" })
        ));

        drop(transformer);
        assert_eq!(script.borrow().drops, 1);
    }

    #[test]
    fn test_drop_releases_engine() {
        let mut sink = CountingSink::default();
        let (transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        drop(transformer);
        assert_eq!(script.borrow().drops, 1);
    }

    #[test]
    fn test_io_copy_streams_through() {
        let mut sink = CountingSink::default();
        let (mut transformer, _) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 32);
        let bytes = i16_bytes(&(0..3000).map(|i| i as i16).collect::<Vec<_>>());

        let copied = io::copy(&mut bytes.as_slice(), &mut transformer).unwrap();
        Write::flush(&mut transformer).unwrap();
        assert_eq!(copied as usize, bytes.len());
        drop(transformer);
        assert_eq!(sink.data, bytes);
    }

    #[test]
    fn test_io_write_reports_progress_before_error() {
        let mut sink = CountingSink::default();
        let (mut transformer, script) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        script.borrow_mut().fail_write_at = Some(1);
        let bytes = i16_bytes(&vec![1; CHUNK_FRAMES * 2]);

        assert_eq!(Write::write(&mut transformer, &bytes).unwrap(), CHUNK_FRAMES * 2);
        let err = Write::write(&mut transformer, &bytes[CHUNK_FRAMES * 2..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn test_io_write_without_progress_is_error() {
        let mut sink = CountingSink::default();
        let (mut transformer, _) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        let err = Write::write(&mut transformer, &[0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_io_write_after_close_fails() {
        let mut sink = CountingSink::default();
        let (mut transformer, _) = mock_transformer(&mut sink, SampleFormat::Int16, vec![], 0);
        transformer.close();
        assert!(Write::write(&mut transformer, &[0, 0]).is_err());
    }
}
