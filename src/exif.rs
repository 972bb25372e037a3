// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The TIFF header descriptor handed to Exif consumers.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};
use log::debug;

use crate::reader::Peek;
use crate::{Error, ImageKind, Result};

/// Byte order announced by a TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Unknown,
    /// `MM\0*`
    BigEndian,
    /// `II*\0`
    LittleEndian,
}

impl ByteOrder {
    /// Recognise one of the two standard TIFF signatures.
    pub fn from_tiff_magic(magic: &[u8]) -> Self {
        match magic {
            [b'I', b'I', 0x2a, 0x00, ..] => Self::LittleEndian,
            [b'M', b'M', 0x00, 0x2a, ..] => Self::BigEndian,
            _ => Self::Unknown,
        }
    }

    /// Also accept the vendor magic numbers of TIFF-based raws
    /// (Panasonic `IIU\0`, Olympus `IIRO`/`IIRS`/`MMOR`).
    pub fn from_raw_magic(magic: &[u8]) -> Self {
        match magic {
            [b'I', b'I', b'U', 0x00, ..] | [b'I', b'I', b'R', b'O', ..] | [b'I', b'I', b'R', b'S', ..] => {
                Self::LittleEndian
            },
            [b'M', b'M', b'O', b'R', ..] => Self::BigEndian,
            _ => Self::from_tiff_magic(magic),
        }
    }

    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Self::LittleEndian => LittleEndian::read_u32(buf),
            _ => BigEndian::read_u32(buf),
        }
    }
}

/// Everything needed to reopen an Exif TIFF structure from the raw file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExifHeader {
    pub byte_order: ByteOrder,
    /// Offset of IFD0, relative to the TIFF header.
    pub first_ifd_offset: u32,
    /// Offset of the TIFF header from the start of the file.
    pub file_offset: u32,
    /// Bytes from the TIFF header to the end of the payload.
    pub length: u32,
    pub image_kind: ImageKind,
}

impl ExifHeader {
    /// Size of the TIFF header this descriptor is built from.
    pub const TIFF_HEADER_LEN: usize = 8;

    /// Decode the 8-byte TIFF header in `buf`.
    pub fn from_tiff_header(buf: &[u8], file_offset: u64, length: u64, image_kind: ImageKind) -> Self {
        let byte_order = if matches!(image_kind, ImageKind::Rw2 | ImageKind::Orf) {
            ByteOrder::from_raw_magic(buf)
        } else {
            ByteOrder::from_tiff_magic(buf)
        };
        let first_ifd_offset = match (byte_order, buf.get(4..8)) {
            (ByteOrder::Unknown, _) | (_, None) => 0,
            (order, Some(b)) => order.read_u32(b),
        };
        Self {
            byte_order,
            first_ifd_offset,
            file_offset: clamp_u32(file_offset),
            length: clamp_u32(length),
            image_kind,
        }
    }

    /// Peek the TIFF header at the reader's position; the payload is the
    /// next `length` bytes. Nothing is consumed.
    pub fn peek<P: Peek + ?Sized>(src: &mut P, length: u64, image_kind: ImageKind) -> Result<Self> {
        let file_offset = src.offset();
        let buf = src.peek(Self::TIFF_HEADER_LEN)?;
        Ok(Self::from_tiff_header(buf, file_offset, length, image_kind))
    }

    /// A usable header has a known byte order and an IFD past the header.
    pub fn is_valid(&self) -> bool {
        self.byte_order != ByteOrder::Unknown && self.first_ifd_offset >= 8
    }

    /// Validate, or report the payload as absent.
    pub fn checked(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(Error::InvalidData("invalid TIFF header"))
        }
    }
}

/// Descriptor of an XMP packet embedded in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XmpHeader {
    pub file_offset: u32,
    pub length: u32,
}

impl XmpHeader {
    pub fn new(file_offset: u64, length: u64) -> Self {
        Self {
            file_offset: clamp_u32(file_offset),
            length: clamp_u32(length),
        }
    }
}

/// Read the TIFF header that opens a TIFF-based file: plain TIFF, CR2, RW2,
/// ORF, and the DNG/NEF/ARW family. The whole stream is the Exif payload, so
/// `length` is what is left of the stream, or 0 when that is unknown.
pub fn scan_tiff<P: Peek + ?Sized>(src: &mut P, image_kind: ImageKind) -> Result<ExifHeader> {
    let length = match src.remain() {
        u64::MAX => 0,
        n => n,
    };
    let header = ExifHeader::peek(src, length, image_kind)?.checked()?;
    debug!("{image_kind} TIFF header: {header:?}");
    Ok(header)
}

fn clamp_u32(v: u64) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

#[test]
fn tiff_headers() {
    let le = ExifHeader::from_tiff_header(b"II*\0\x08\0\0\0", 12, 8, ImageKind::Jpeg);
    assert_eq!(le.byte_order, ByteOrder::LittleEndian);
    assert_eq!(le.first_ifd_offset, 8);
    assert!(le.is_valid());

    let be = ExifHeader::from_tiff_header(b"MM\0*\0\0\0\x08", 0, 0, ImageKind::Tiff);
    assert_eq!(be.byte_order, ByteOrder::BigEndian);
    assert_eq!(be.first_ifd_offset, 8);

    let bad = ExifHeader::from_tiff_header(b"XX\0*\0\0\0\x08", 0, 0, ImageKind::Tiff);
    assert!(!bad.is_valid());
    assert!(bad.checked().is_err());

    let low_ifd = ExifHeader::from_tiff_header(b"II*\0\x04\0\0\0", 0, 0, ImageKind::Tiff);
    assert!(!low_ifd.is_valid());

    let rw2 = ExifHeader::from_tiff_header(b"IIU\0\x18\0\0\0", 0, 0, ImageKind::Rw2);
    assert_eq!(rw2.byte_order, ByteOrder::LittleEndian);
    assert_eq!(rw2.first_ifd_offset, 0x18);
}

#[test]
fn tiff_family_files() {
    use crate::reader::Source;

    let mut data = std::vec::Vec::from(&b"MM\0*\0\0\0\x08"[..]);
    data.extend_from_slice(&[0; 24]);
    let mut src = Source::from_slice(&data);
    let header = scan_tiff(&mut src, ImageKind::Tiff).unwrap();
    assert_eq!(header.file_offset, 0);
    assert_eq!(header.length, 32);
    assert_eq!(header.byte_order, ByteOrder::BigEndian);
    assert_eq!(src.offset(), 0);

    let mut orf = Source::new(&b"IIRO\x08\0\0\0\0\0"[..]);
    let header = scan_tiff(&mut orf, ImageKind::Orf).unwrap();
    assert_eq!(header.length, 0);
    assert_eq!(header.byte_order, ByteOrder::LittleEndian);

    let mut short = Source::from_slice(b"II*\0");
    assert!(matches!(scan_tiff(&mut short, ImageKind::Tiff), Err(Error::ShortBuffer)));
}
