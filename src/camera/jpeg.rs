// Split a raw MJPEG byte stream into individual JPEG images
// Frames are delimited by the SOI (FF D8) and EOI (FF D9) markers.

use bytes::{Buf, Bytes, BytesMut};
use tracing::warn;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Drop buffered data if no frame completes within this many bytes
const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

fn find(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

#[derive(Debug, Default)]
pub struct JpegSplitter {
    buf: BytesMut,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);

        if self.buf.len() > MAX_FRAME_BYTES {
            warn!(
                "No JPEG end marker in {} bytes, discarding buffer",
                self.buf.len()
            );
            self.buf.clear();
        }
    }

    /// Pop the next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Option<Bytes> {
        let start = match find(&self.buf, SOI) {
            Some(start) => start,
            None => {
                // Keep a trailing 0xFF in case it starts the next marker
                let keep = usize::from(self.buf.last() == Some(&0xFF));
                let len = self.buf.len();
                self.buf.advance(len - keep);
                return None;
            }
        };
        self.buf.advance(start);

        let end = find(&self.buf[SOI.len()..], EOI)? + SOI.len() + EOI.len();
        Some(self.buf.split_to(end).freeze())
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut frame = SOI.to_vec();
        frame.extend_from_slice(body);
        frame.extend_from_slice(&EOI);
        frame
    }

    #[test]
    fn test_split_back_to_back_frames() {
        let first = jpeg(&[1, 2, 3]);
        let second = jpeg(&[4, 5]);

        let mut splitter = JpegSplitter::new();
        splitter.push(&[first.clone(), second.clone()].concat());

        assert_eq!(splitter.next_frame().unwrap(), first);
        assert_eq!(splitter.next_frame().unwrap(), second);
        assert!(splitter.next_frame().is_none());
        assert_eq!(splitter.buffered(), 0);
    }

    #[test]
    fn test_frame_across_chunks() {
        let frame = jpeg(&[9; 32]);
        let mut splitter = JpegSplitter::new();

        // Split right between the two EOI bytes
        let cut = frame.len() - 1;
        splitter.push(&frame[..cut]);
        assert!(splitter.next_frame().is_none());

        splitter.push(&frame[cut..]);
        assert_eq!(splitter.next_frame().unwrap(), frame);
    }

    #[test]
    fn test_garbage_before_first_frame_is_dropped() {
        let frame = jpeg(&[7]);
        let mut splitter = JpegSplitter::new();

        splitter.push(&[0x00, 0x13, 0x37]);
        assert!(splitter.next_frame().is_none());
        assert_eq!(splitter.buffered(), 0);

        splitter.push(&[0xAA, 0xFF]);
        assert!(splitter.next_frame().is_none());
        assert_eq!(splitter.buffered(), 1);

        // The kept 0xFF pairs with this 0xD8
        splitter.push(&frame[1..]);
        assert_eq!(splitter.next_frame().unwrap(), frame);
    }
}
