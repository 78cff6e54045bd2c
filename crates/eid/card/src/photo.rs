//! Holder photograph

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::error::{Error, Result};

/// JPEG photograph stored on the card
#[derive(Clone, PartialEq, Eq)]
pub struct Photo {
    jpeg: Bytes,
    width: u16,
    height: u16,
}

impl Photo {
    /// Check that `data` is a JPEG stream and wrap it
    ///
    /// The stream must open with SOI, declare its frame size before the scan and
    /// close with EOI. Bytes after the last EOI are padding and are cut off.
    pub fn from_jpeg(data: Bytes) -> Result<Self> {
        if !data.starts_with(&[0xFF, 0xD8]) {
            return Err(Error::InvalidPhoto);
        }
        let end = data
            .windows(2)
            .rposition(|marker| marker == [0xFF, 0xD9])
            .ok_or(Error::InvalidPhoto)?;
        let jpeg = data.slice(..end + 2);
        let (width, height) = frame_size(&jpeg).ok_or(Error::InvalidPhoto)?;

        Ok(Self {
            jpeg,
            width,
            height,
        })
    }

    /// JPEG bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    /// Take the JPEG bytes
    pub fn into_bytes(self) -> Bytes {
        self.jpeg
    }

    /// Image width in pixels
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Image height in pixels
    pub const fn height(&self) -> u16 {
        self.height
    }

    /// JPEG bytes in standard base64
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }
}

impl fmt::Debug for Photo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Photo")
            .field("len", &self.jpeg.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Walk the marker segments up to the first scan and read the frame header
fn frame_size(jpeg: &[u8]) -> Option<(u16, u16)> {
    let mut pos = 2;
    loop {
        // Markers may be preceded by any number of fill bytes
        while *jpeg.get(pos)? == 0xFF && *jpeg.get(pos + 1)? == 0xFF {
            pos += 1;
        }
        if *jpeg.get(pos)? != 0xFF {
            return None;
        }
        let marker = *jpeg.get(pos + 1)?;
        pos += 2;

        // Standalone markers carry no length
        if matches!(marker, 0x01 | 0xD0..=0xD7) {
            continue;
        }
        if matches!(marker, 0xD9 | 0xDA) {
            return None;
        }

        let length = usize::from(u16::from_be_bytes([*jpeg.get(pos)?, *jpeg.get(pos + 1)?]));
        if length < 2 {
            return None;
        }
        let is_frame = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let segment = jpeg.get(pos + 2..pos + length)?;
            let height = u16::from_be_bytes([*segment.get(1)?, *segment.get(2)?]);
            let width = u16::from_be_bytes([*segment.get(3)?, *segment.get(4)?]);
            return Some((width, height));
        }
        pos += length;
    }
}
