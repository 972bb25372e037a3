// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Container classification from the first bytes of a file.

use std::fmt;

use crate::boxes::Brand;
use crate::reader::Peek;
use crate::Result;

/// Bytes examined by [`sniff`].
pub const SNIFF_LEN: usize = 24;

/// Container formats the scanner can tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ImageKind {
    #[default]
    Unknown,
    Jpeg,
    Jpeg2000,
    /// Canon CIFF raw
    Crw,
    /// Canon TIFF-based raw
    Cr2,
    /// Canon ISO-BMFF raw
    Cr3,
    Heif,
    Avif,
    /// ISO-BMFF with a brand outside the still-image families
    Mp4,
    /// Panasonic raw
    Rw2,
    /// Olympus raw
    Orf,
    /// Fujifilm raw
    Raf,
    Tiff,
    Png,
    Psd,
    Bmp,
    Gif,
    WebP,
    /// Standalone XMP sidecar
    Xmp,
}

impl ImageKind {
    /// Classify a file prefix. Prefixes shorter than a signature never match it.
    pub fn from_header(buf: &[u8]) -> Self {
        if buf.starts_with(&[0xff, 0xd8]) {
            return Self::Jpeg;
        }
        if buf.starts_with(b"\0\0\0\x0cjP  \r\n\x87\n") || buf.starts_with(&[0xff, 0x4f, 0xff, 0x51]) {
            return Self::Jpeg2000;
        }
        if buf.starts_with(b"II") && buf.get(6..14) == Some(&b"HEAPCCDR"[..]) {
            return Self::Crw;
        }
        if buf.starts_with(b"II*\0") && buf.get(8..12) == Some(&b"CR\x02\0"[..]) {
            return Self::Cr2;
        }
        if buf.get(4..8) == Some(&b"ftyp"[..]) {
            return Self::from_brand(buf);
        }
        if buf.starts_with(b"IIU\0") {
            return Self::Rw2;
        }
        if buf.starts_with(b"IIRO") || buf.starts_with(b"IIRS") || buf.starts_with(b"MMOR") {
            return Self::Orf;
        }
        if buf.starts_with(b"FUJIFILMCCD-RAW") {
            return Self::Raf;
        }
        if buf.starts_with(b"II*\0") || buf.starts_with(b"MM\0*") {
            return Self::Tiff;
        }
        if buf.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Self::Png;
        }
        if buf.starts_with(b"8BPS") {
            return Self::Psd;
        }
        if buf.starts_with(b"BM") {
            return Self::Bmp;
        }
        if buf.starts_with(b"GIF87a") || buf.starts_with(b"GIF89a") {
            return Self::Gif;
        }
        if buf.starts_with(b"RIFF") && buf.get(8..12) == Some(&b"WEBP"[..]) {
            return Self::WebP;
        }
        if buf.starts_with(b"<x:xmpmeta") || buf.starts_with(b"<?xpacket") {
            return Self::Xmp;
        }
        Self::Unknown
    }

    fn from_brand(buf: &[u8]) -> Self {
        let Some(&[a, b, c, d]) = buf.get(8..12) else {
            return Self::Unknown;
        };
        let brand = Brand::from_bytes(&[a, b, c, d]);
        match brand {
            Brand::Crx => Self::Cr3,
            b if b.is_avif() => Self::Avif,
            b if b.is_heif() => Self::Heif,
            _ => Self::Mp4,
        }
    }

    /// Formats whose file begins with a TIFF header.
    pub fn is_tiff_based(self) -> bool {
        matches!(self, Self::Tiff | Self::Cr2 | Self::Rw2 | Self::Orf)
    }

    /// Formats built from ISO-BMFF boxes.
    pub fn is_bmff(self) -> bool {
        matches!(self, Self::Heif | Self::Avif | Self::Cr3 | Self::Mp4)
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Jpeg => "JPEG",
            Self::Jpeg2000 => "JPEG 2000",
            Self::Crw => "CRW",
            Self::Cr2 => "CR2",
            Self::Cr3 => "CR3",
            Self::Heif => "HEIF",
            Self::Avif => "AVIF",
            Self::Mp4 => "MP4",
            Self::Rw2 => "RW2",
            Self::Orf => "ORF",
            Self::Raf => "RAF",
            Self::Tiff => "TIFF",
            Self::Png => "PNG",
            Self::Psd => "PSD",
            Self::Bmp => "BMP",
            Self::Gif => "GIF",
            Self::WebP => "WebP",
            Self::Xmp => "XMP",
        })
    }
}

/// Classify the stream without consuming any of it.
pub fn sniff<P: Peek + ?Sized>(src: &mut P) -> Result<ImageKind> {
    let buf = src.fill_buf(SNIFF_LEN)?;
    Ok(ImageKind::from_header(buf))
}
