//! MJPEG multipart framing.
//!
//! One part per frame:
//!
//! ```text
//! --<boundary>\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <n>\r\n
//! \r\n
//! <n payload bytes>\r\n
//! ```

use core::fmt::Write as _;

use crate::app::ports::FrameSink;

pub const BOUNDARY: &str = "rovercamframe";

/// Response content type announced through [`FrameSink::begin`].
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace;boundary=rovercamframe";

/// Scratch buffer for one part header; the longest header (20-digit
/// length) is well under the capacity.
pub type PartHeader = heapless::String<96>;

/// Render the header of a part carrying `len` payload bytes.
pub fn part_header(len: usize, out: &mut PartHeader) -> core::fmt::Result {
    out.clear();
    write!(
        out,
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY, len
    )
}

/// Write one complete part.  `false` as soon as any write fails.
pub fn write_part(sink: &mut dyn FrameSink, payload: &[u8], header: &mut PartHeader) -> bool {
    if part_header(payload.len(), header).is_err() {
        return false;
    }
    sink.write(header.as_bytes()) && sink.write(payload) && sink.write(b"\r\n")
}
