//! Varispeed - Streaming PCM Speed and Pitch Processing
//!
//! Varispeed adapts a byte sink so that raw PCM written to it is changed in
//! speed, pitch, playback rate and volume on the way through.
//!
//! # Architecture
//!
//! - [`pcm`]: wire encodings and byte to frame conversion
//! - [`engine`]: the [`Engine`](engine::Engine) capability set and the
//!   native pitch-synchronous overlap-add engine
//! - [`stream`]: configuration options and the streaming [`Transformer`]
//! - [`cli`]: command-line front end
//!
//! # Example
//!
//! ```
//! use varispeed::{process_buffer, SampleFormat};
//! use varispeed::stream::with_rate;
//!
//! let input = vec![0u8; 4410 * 2];
//! let output = process_buffer(&input, 44100, SampleFormat::Int16, [with_rate(2.0)]).unwrap();
//! assert!(output.len() < input.len());
//! ```

pub mod cli;
pub mod engine;
pub mod error;
pub mod pcm;
pub mod stream;

pub use error::{PartialWrite, Result, VarispeedError};
pub use pcm::SampleFormat;
pub use stream::{process_buffer, StreamConfig, StreamOption, Transformer};
