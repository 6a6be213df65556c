//! SSE frame decoding for the agent stream endpoint.
//!
//! The backend streams UTF-8 text frames separated by a blank line:
//! - `event: <type>` - optional event type line
//! - `data: <json-or-sentinel>` - optional payload line
//! - Blank line (`\n\n`) - frame terminator
//!
//! The decoder reshapes arbitrarily chunked transport input into complete
//! frames; it never inspects payload validity. Classification of frame
//! contents happens in [`crate::events`].

/// Event type assumed when a frame has no `event:` line.
pub const DEFAULT_EVENT_TYPE: &str = "messages";

/// One decoded wire frame: an event type plus an optional raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event type, `"messages"` when the frame carried no `event:` line.
    pub event_type: String,
    /// Raw payload text, `None` when the frame carried no `data:` line.
    pub data: Option<String>,
}

impl Frame {
    /// Parse the text between two frame terminators.
    ///
    /// Values are whitespace-trimmed after the prefix is stripped. A frame
    /// carries one payload: if several `data:` lines occur, the last wins.
    pub fn parse(raw: &str) -> Frame {
        let mut event_type = DEFAULT_EVENT_TYPE.to_string();
        let mut data = None;

        for line in raw.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                event_type = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                data = Some(rest.trim().to_string());
            }
        }

        Frame { event_type, data }
    }
}

/// Reassembles arbitrarily chunked stream input into complete frames.
///
/// The buffer holds raw bytes, not text, so a chunk boundary inside a
/// multi-byte UTF-8 sequence cannot corrupt input. Unconsumed trailing
/// input is carried to the next [`feed`](FrameDecoder::feed) call; no byte
/// is ever lost or duplicated, and the produced frame sequence does not
/// depend on where the transport split its chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of input and drain every frame it completes.
    ///
    /// All complete frames are returned before the decoder waits for more
    /// input; a chunk may therefore yield zero, one, or many frames.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = find_terminator(&self.buffer) {
            let frame_text = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
            self.buffer.drain(..pos + 2);
            frames.push(Frame::parse(&frame_text));
        }
        frames
    }

    /// Flush the remainder after the transport closes.
    ///
    /// A stream that ends without a final terminator still yields its last
    /// frame; whitespace-only leftovers yield nothing.
    pub fn finish(&mut self) -> Option<Frame> {
        if self.buffer.iter().all(|b| b.is_ascii_whitespace()) {
            self.buffer.clear();
            return None;
        }
        let frame_text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        Some(Frame::parse(&frame_text))
    }

    /// True when no partial input is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Byte offset of the next `\n\n` terminator, if one is buffered.
fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}
