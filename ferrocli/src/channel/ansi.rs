//! ANSI escape sequence stripping.
//!
//! Network CLIs colour prompts, redraw lines and move the cursor while a
//! command runs. Prompt matching and echo detection need the bytes a user
//! would see, so the channel can drop these sequences before buffering.
//!
//! Stripping runs through a `vte` state machine. A device may split one
//! sequence over two reads, so [`AnsiStripper`] keeps the parser state
//! between chunks.

use vte::{Parser, Perform};

const ESC: u8 = 0x1B;

/// Collects what a terminal would print, plus the line-control bytes the
/// channel cares about.
#[derive(Default)]
struct Printable {
    out: Vec<u8>,
}

impl Perform for Printable {
    fn print(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        // backspace, tab, newline, carriage return
        if matches!(byte, 0x08 | b'\t' | b'\n' | b'\r') {
            self.out.push(byte);
        }
    }
}

/// Streaming ANSI stripper.
///
/// Feed it every chunk of one byte stream in order. A sequence cut off at
/// the end of a chunk is held in the parser and dropped once its tail
/// arrives.
pub struct AnsiStripper {
    parser: Parser,
}

impl AnsiStripper {
    /// Create a stripper in the ground state.
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Strip one chunk, carrying partial sequences over to the next call.
    pub fn strip(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut printable = Printable {
            out: Vec::with_capacity(chunk.len()),
        };
        self.parser.advance(&mut printable, chunk);
        printable.out
    }

    /// Forget any partial sequence.
    pub fn reset(&mut self) {
        self.parser = Parser::new();
    }
}

impl Default for AnsiStripper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AnsiStripper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnsiStripper").finish_non_exhaustive()
    }
}

/// Remove ANSI escape sequences from a complete buffer.
///
/// A truncated sequence at the end is dropped. The output never contains an
/// ESC byte, so stripping twice is the same as stripping once.
pub fn strip_ansi(input: &[u8]) -> Vec<u8> {
    if !contains_escape(input) {
        return input.to_vec();
    }
    AnsiStripper::new().strip(input)
}

/// True when `input` contains an ESC byte.
pub fn contains_escape(input: &[u8]) -> bool {
    memchr::memchr(ESC, input).is_some()
}
