//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{WavReader, WavSpec, WavWriter};
use log::{info, warn};

use super::wav::{sample_format_of, sine_tone, WavSink};
use super::ParamArgs;
use crate::pcm::{encode_samples, PcmSample, SampleFormat};
use crate::stream::{with_channels, StreamStats, Transformer};

/// Samples decoded from a WAV file per transformer write
const BLOCK_SAMPLES: usize = 8192;

/// Bytes read from stdin per transformer write
const PIPE_BUFFER_BYTES: usize = 64 * 1024;

/// Transform a WAV file into a new WAV file with the same spec.
pub fn process(input: &Path, output: &Path, params: &ParamArgs) -> Result<()> {
    info!("Processing {} -> {}", input.display(), output.display());

    let mut reader = WavReader::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let spec = reader.spec();
    let format = sample_format_of(&spec)?;

    let mut options = params.options()?;
    options.push(with_channels(spec.channels as u32));

    let mut writer = WavWriter::create(output, spec)
        .with_context(|| format!("failed to create {}", output.display()))?;

    let stats = {
        let mut sink = WavSink::new(&mut writer, format);
        let mut transformer = Transformer::new(&mut sink, spec.sample_rate, format, options)?;

        match format {
            SampleFormat::Int16 => stream_samples(reader.samples::<i16>(), &mut transformer)?,
            SampleFormat::Float32 => stream_samples(reader.samples::<f32>(), &mut transformer)?,
        }

        transformer.flush()?;
        let stats = transformer.stats();
        transformer.close();
        stats
    };

    writer
        .finalize()
        .with_context(|| format!("failed to finalize {}", output.display()))?;

    report(&spec, &stats);
    println!("Wrote {}", output.display());

    Ok(())
}

/// Stream raw PCM from stdin to stdout.
pub fn pipe(sample_rate: u32, format: SampleFormat, channels: u32, params: &ParamArgs) -> Result<()> {
    info!(
        "Piping {} Hz {} audio with {} channels",
        sample_rate, format, channels
    );

    let mut options = params.options()?;
    options.push(with_channels(channels));

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();

    let mut transformer = Transformer::new(&mut output, sample_rate, format, options)?;
    let trailing = copy_aligned(&mut input, &mut transformer, format.sample_size())?;
    if trailing > 0 {
        warn!("ignoring {} trailing bytes that do not form a sample", trailing);
    }

    Write::flush(&mut transformer).context("failed to flush output")?;
    let stats = transformer.stats();
    transformer.close();

    info!(
        "Piped {} frames in, {} frames out",
        stats.frames_in, stats.frames_out
    );

    Ok(())
}

/// Write a 16-bit mono sine test tone.
pub fn tone(
    output: &Path,
    frequency: f32,
    duration_ms: u32,
    sample_rate: u32,
    amplitude: f32,
) -> Result<()> {
    if !(0.0..=1.0).contains(&amplitude) {
        bail!("amplitude {} is outside 0.0 to 1.0", amplitude);
    }
    if frequency <= 0.0 || frequency.is_nan() {
        bail!("frequency must be positive");
    }
    if sample_rate == 0 {
        bail!("sample rate must be positive");
    }

    info!(
        "Generating {} Hz tone, {} ms at {} Hz",
        frequency, duration_ms, sample_rate
    );

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output, spec)
        .with_context(|| format!("failed to create {}", output.display()))?;
    for sample in sine_tone(frequency, duration_ms, sample_rate, amplitude) {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    println!("Wrote {}", output.display());

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Feed decoded WAV samples to the transformer in fixed-size blocks
fn stream_samples<S, I, W>(samples: I, transformer: &mut Transformer<'_, W>) -> Result<()>
where
    S: PcmSample + hound::Sample,
    I: Iterator<Item = hound::Result<S>>,
    W: Write + ?Sized,
{
    let mut block = Vec::with_capacity(BLOCK_SAMPLES);
    let mut bytes = Vec::with_capacity(BLOCK_SAMPLES * S::FORMAT.sample_size());

    for sample in samples {
        block.push(sample.context("failed to read sample")?);
        if block.len() == BLOCK_SAMPLES {
            write_block(&block, &mut bytes, transformer)?;
            block.clear();
        }
    }
    if !block.is_empty() {
        write_block(&block, &mut bytes, transformer)?;
    }

    Ok(())
}

fn write_block<S, W>(block: &[S], bytes: &mut Vec<u8>, transformer: &mut Transformer<'_, W>) -> Result<()>
where
    S: PcmSample,
    W: Write + ?Sized,
{
    bytes.clear();
    encode_samples(block, bytes);
    transformer.write_bytes(bytes)?;
    Ok(())
}

/// Copy `input` into `output`, only ever writing whole samples
///
/// Returns the number of trailing bytes left over at end of input.
fn copy_aligned<R, W>(input: &mut R, output: &mut W, sample_size: usize) -> Result<usize>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; PIPE_BUFFER_BYTES];
    let mut filled = 0;

    loop {
        let read = match input.read(&mut buffer[filled..]) {
            Ok(0) => return Ok(filled),
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("failed to read input"),
        };
        filled += read;

        let aligned = filled - filled % sample_size;
        output
            .write_all(&buffer[..aligned])
            .context("failed to write output")?;
        buffer.copy_within(aligned..filled, 0);
        filled -= aligned;
    }
}

fn report(spec: &WavSpec, stats: &StreamStats) {
    let seconds = |frames: u64| frames as f64 / spec.sample_rate as f64;
    info!(
        "Processed {:.2}s of audio into {:.2}s ({} -> {} frames)",
        seconds(stats.frames_in),
        seconds(stats.frames_out),
        stats.frames_in,
        stats.frames_out
    );
}

// ============================================================================
// Tests
// ============================================================================
