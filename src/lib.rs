#![deny(unsafe_code)]
//! Streaming locator for photo metadata.
//!
//! `zenmeta_parse` sniffs an image container and finds where its Exif and
//! XMP payloads live without decoding pixels or interpreting the Exif IFDs.
//! JPEG (and the JPEG preview inside Fujifilm RAF), HEIF/AVIF, Canon CR3,
//! TIFF-based raws, PNG and WebP are understood, plus standalone XMP.
//!
//! Everything reads through [`reader::Peek`], which only peeks and discards:
//! the input never needs to be seekable. Exif payloads are described by an
//! [`ExifHeader`] (byte order, first IFD offset and file position), and
//! format scanners hand each payload to a caller callback through a reader
//! bounded to it.
//!
//! ```
//! use zenmeta_parse::{scan, ImageKind, Source};
//!
//! let mut jpeg = vec![0xff, 0xd8, 0xff, 0xe1, 0x00, 0x10];
//! jpeg.extend_from_slice(b"Exif\0\0II*\0\x08\0\0\0");
//! jpeg.extend_from_slice(&[0xff, 0xd9]);
//!
//! let metadata = scan(&mut Source::from_slice(&jpeg)).unwrap();
//! assert_eq!(metadata.kind, ImageKind::Jpeg);
//! assert_eq!(metadata.exif_header().unwrap().file_offset, 12);
//! ```

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use arrayvec::ArrayVec;
use fallible_collections::TryReserveError;
use log::{debug, warn};

pub mod bmff;
pub mod boxes;
pub mod cr3;
pub mod exif;
pub mod jpeg;
pub mod png;
pub mod reader;
mod sniff;
pub mod webp;
pub mod xmp;

use crate::boxes::{BoxType, FourCC};

pub use crate::bmff::HeifScan;
pub use crate::cr3::Cr3Scan;
pub use crate::exif::{scan_tiff, ByteOrder, ExifHeader, XmpHeader};
pub use crate::jpeg::{scan_jpeg, JpegScan};
pub use crate::bmff::scan_heif;
pub use crate::cr3::scan_cr3;
pub use crate::reader::{Peek, Source};
pub use crate::sniff::{sniff, ImageKind};
pub use crate::xmp::{parse_xmp, Xmp};
pub use enough::{Stop, StopReason, Unstoppable};

/// A trait to indicate a type can be infallibly converted to `u64`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
trait ToU64 {
    fn to_u64(self) -> u64;
}

/// Statically verify that the platform `usize` can fit within a `u64`.
impl ToU64 for usize {
    fn to_u64(self) -> u64 {
        const _: () = assert!(std::mem::size_of::<usize>() <= std::mem::size_of::<u64>());
        self as u64
    }
}

/// A trait to indicate a type can be infallibly converted to `usize`.
/// This should only be implemented for infallible conversions, so only unsigned types are valid.
pub(crate) trait ToUsize {
    fn to_usize(self) -> usize;
}

/// Statically verify that the given type can fit within a `usize`.
macro_rules! impl_to_usize_from {
    ( $from_type:ty ) => {
        impl ToUsize for $from_type {
            fn to_usize(self) -> usize {
                const _: () = assert!(std::mem::size_of::<$from_type>() <= std::mem::size_of::<usize>());
                self as usize
            }
        }
    };
}

impl_to_usize_from!(u8);
impl_to_usize_from!(u16);
impl_to_usize_from!(u32);

pub type TryVec<T> = fallible_collections::TryVec<T>;
pub type TryString = fallible_collections::TryVec<u8>;

// To ensure we don't use stdlib allocating types by accident
#[allow(dead_code)]
struct Vec;
#[allow(dead_code)]
struct Box;
#[allow(dead_code)]
struct HashMap;
#[allow(dead_code)]
struct String;

/// Describes scanner failures.
///
/// This enum wraps the standard `io::Error` type, unified with
/// our own parser error states and those of crates we use.
#[derive(Debug)]
pub enum Error {
    /// Parse error caused by corrupt or malformed data.
    InvalidData(&'static str),
    /// Parse error caused by limited parser support rather than invalid data.
    Unsupported(&'static str),
    /// Reflect `std::io::ErrorKind::UnexpectedEof` for short data.
    UnexpectedEOF,
    /// Propagate underlying errors from `std::io`.
    Io(std::io::Error),
    /// Out of memory
    OutOfMemory,
    /// Resource limit exceeded during parsing
    ResourceLimitExceeded(&'static str),
    /// Operation was stopped/cancelled
    Stopped(enough::StopReason),
    /// A peek or bounded read wanted more bytes than the region holds.
    ShortBuffer,
    /// A box parser was handed a box of another type.
    WrongBoxType(BoxType),
    /// A 64-bit box size beyond what the reader can address.
    UnexpectedlyLargeBox,
    /// The `ftyp` major brand is not one this crate scans.
    BrandNotSupported(FourCC),
    /// A box extending to the end of the stream was already read.
    NoMoreBoxes,
    /// No SOI marker before the end of the stream.
    NoJpegMarker,
    /// The scan finished without finding an Exif payload.
    NoExif,
    /// An `infe` box version other than 2.
    InfeVersionNotSupported(u8),
    HandlerTypeUnknown(FourCC),
    /// An XMP property this crate does not store.
    PropertyNotSet,
    /// Integer width other than 0, 8, 16, 32 or 64 bits.
    InvalidUintN(u8),
    /// No `<x:xmpmeta` root before the end of the stream.
    NoXmp,
    /// A NUL-terminated string ran to the end of its region.
    UnterminatedString,
}

impl Error {
    /// Errors that end a scan. Anything else is confined to the box, segment
    /// or chunk it came from, which is skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::OutOfMemory | Self::Stopped(_) | Self::UnexpectedlyLargeBox | Self::NoJpegMarker
        )
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::InvalidData(s) | Self::Unsupported(s) | Self::ResourceLimitExceeded(s) => s,
            Self::UnexpectedEOF => "EOF",
            Self::Io(err) => return err.fmt(f),
            Self::OutOfMemory => "OOM",
            Self::Stopped(reason) => return write!(f, "Stopped: {}", reason),
            Self::ShortBuffer => "short buffer",
            Self::WrongBoxType(t) => return write!(f, "wrong box type {t:?}"),
            Self::UnexpectedlyLargeBox => "unexpectedly large box",
            Self::BrandNotSupported(b) => return write!(f, "brand {b} not supported"),
            Self::NoMoreBoxes => "no more boxes",
            Self::NoJpegMarker => "no JPEG marker",
            Self::NoExif => "no Exif",
            Self::InfeVersionNotSupported(v) => return write!(f, "infe version {v} not supported"),
            Self::HandlerTypeUnknown(h) => return write!(f, "unknown handler type {h}"),
            Self::PropertyNotSet => "property not set",
            Self::InvalidUintN(bits) => return write!(f, "invalid integer width {bits}"),
            Self::NoXmp => "no XMP",
            Self::UnterminatedString => "unterminated string",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

impl From<bitreader::BitReaderError> for Error {
    #[cold]
    #[cfg_attr(debug_assertions, track_caller)]
    fn from(err: bitreader::BitReaderError) -> Self {
        log::warn!("bitreader: {err}");
        debug_assert!(!matches!(err, bitreader::BitReaderError::TooManyBitsForType { .. })); // bug
        Self::InvalidData("truncated bits")
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::UnexpectedEOF,
            _ => Self::Io(err),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(_: std::num::TryFromIntError) -> Self {
        Self::Unsupported("integer conversion failed")
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match err {
            Error::InvalidData(_) => std::io::ErrorKind::InvalidData,
            Error::UnexpectedEOF | Error::ShortBuffer => std::io::ErrorKind::UnexpectedEof,
            Error::Io(io_err) => return io_err,
            _ => std::io::ErrorKind::Other,
        };
        Self::new(kind, err)
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl From<enough::StopReason> for Error {
    fn from(reason: enough::StopReason) -> Self {
        Self::Stopped(reason)
    }
}

/// Result shorthand using our Error enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Resource limits and strictness for a scan.
///
/// Limits are checked **before** allocations occur, so a file claiming an
/// absurd number of items fails fast instead of exhausting memory.
///
/// # Examples
///
/// ```rust
/// use zenmeta_parse::ScanConfig;
///
/// // Default limits (suitable for most apps)
/// let config = ScanConfig::default();
///
/// // Tighter limits for untrusted input
/// let config = ScanConfig::default()
///     .with_max_items(256)
///     .with_max_xmp_bytes(256 * 1024)
///     .with_max_jpeg_scan_bytes(1 << 20);
///
/// // No limits
/// let config = ScanConfig::unlimited();
/// ```
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Log and skip structural surprises instead of failing.
    /// Default: false (strict validation)
    pub lenient: bool,

    /// Maximum entry count of an `iinf`, `iloc`, `ipma` or `iref` table.
    /// Default: 4,096
    pub max_items: Option<u32>,

    /// Maximum bytes of one XMP packet.
    /// Default: 4 MiB
    pub max_xmp_bytes: Option<u64>,

    /// Stop walking JPEG markers after this many bytes.
    /// Default: unlimited
    pub max_jpeg_scan_bytes: Option<u64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lenient: false,
            max_items: Some(4_096),
            max_xmp_bytes: Some(xmp::DEFAULT_MAX_XMP_BYTES),
            max_jpeg_scan_bytes: None,
        }
    }
}

impl ScanConfig {
    /// Create a configuration with no resource limits.
    pub fn unlimited() -> Self {
        Self {
            lenient: false,
            max_items: None,
            max_xmp_bytes: None,
            max_jpeg_scan_bytes: None,
        }
    }

    /// Set the maximum item table size
    pub fn with_max_items(mut self, items: u32) -> Self {
        self.max_items = Some(items);
        self
    }

    /// Set the XMP packet budget in bytes
    pub fn with_max_xmp_bytes(mut self, bytes: u64) -> Self {
        self.max_xmp_bytes = Some(bytes);
        self
    }

    /// Set the JPEG marker walk budget in bytes
    pub fn with_max_jpeg_scan_bytes(mut self, bytes: u64) -> Self {
        self.max_jpeg_scan_bytes = Some(bytes);
        self
    }

    /// Enable lenient parsing mode
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub(crate) fn check_items(&self, count: u32, what: &'static str) -> Result<()> {
        match self.max_items {
            Some(max) if count > max => {
                warn!("{what} {count} exceeds limit {max}");
                Err(Error::ResourceLimitExceeded(what))
            },
            _ => Ok(()),
        }
    }
}

/// Most Exif headers one file can yield (CR3 carries four).
pub const MAX_EXIF_HEADERS: usize = 4;

/// Everything [`scan`] found in one file.
#[derive(Debug, Default)]
pub struct Metadata {
    pub kind: ImageKind,
    /// Pixel size of the primary image, 0 when the container does not say.
    pub width: u32,
    pub height: u32,
    /// Exif payloads in file order.
    pub exif: ArrayVec<ExifHeader, MAX_EXIF_HEADERS>,
    pub xmp_header: Option<XmpHeader>,
    /// The decoded XMP packet, if one was found and parsed.
    pub xmp: Option<Xmp>,
    pub heif: Option<HeifScan>,
    pub cr3: Option<Cr3Scan>,
}

impl Metadata {
    /// The first Exif header, or [`Error::NoExif`].
    pub fn exif_header(&self) -> Result<ExifHeader> {
        self.exif.first().copied().ok_or(Error::NoExif)
    }

    fn add_exif(&mut self, header: ExifHeader) {
        if self.exif.try_push(header).is_err() {
            debug!("dropping Exif header at {}", header.file_offset);
        }
    }
}

/// Sniff the container and locate its metadata with default limits.
pub fn scan<P: Peek + ?Sized>(src: &mut P) -> Result<Metadata> {
    scan_with_config(src, &ScanConfig::default(), &Unstoppable)
}

/// Sniff the container and run the matching scanner.
///
/// XMP packets found along the way are decoded; Exif payloads are only
/// located. Containers without a scanner fail with [`Error::Unsupported`].
pub fn scan_with_config<P: Peek + ?Sized>(src: &mut P, config: &ScanConfig, stop: &dyn Stop) -> Result<Metadata> {
    let kind = sniff(src)?;
    debug!("sniffed {kind}");
    let mut md = Metadata { kind, ..Metadata::default() };

    let mut decoded = None;
    let mut on_xmp = |packet: &mut dyn Peek, header: &XmpHeader| -> Result<()> {
        match xmp::parse_xmp_with_limit(packet, config.max_xmp_bytes) {
            Ok(x) => decoded = Some(x),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("XMP at {} not decoded: {e}", header.file_offset),
        }
        Ok(())
    };
    let skip_exif = |_: &mut dyn Peek, _: &ExifHeader| Ok(());

    match kind {
        ImageKind::Jpeg | ImageKind::Raf => {
            let found = if kind == ImageKind::Raf {
                jpeg::scan_raf(src, config, stop, &mut on_xmp, skip_exif)?
            } else {
                jpeg::scan_jpeg_with_config(src, config, stop, &mut on_xmp, skip_exif)?
            };
            md.width = found.width.into();
            md.height = found.height.into();
            md.xmp_header = found.xmp;
            if let Some(header) = found.exif {
                md.add_exif(header);
            }
        },
        ImageKind::Heif | ImageKind::Avif => {
            let found = bmff::scan_heif_with(src, config, stop, skip_exif)?;
            md.kind = found.image_kind();
            if let Some((width, height)) = found.meta.primary_dimensions() {
                md.width = width;
                md.height = height;
            }
            if let Some(header) = found.exif {
                md.add_exif(header);
            }
            md.heif = Some(found);
        },
        ImageKind::Cr3 => {
            let found = cr3::scan_cr3_with(src, config, stop, &mut on_xmp, skip_exif)?;
            for header in found.moov.meta.exif_headers() {
                md.add_exif(header);
            }
            md.xmp_header = found.xmp_header;
            md.cr3 = Some(found);
        },
        ImageKind::Png => {
            let found = png::scan_png(src, stop, &mut on_xmp, skip_exif)?;
            md.width = found.width;
            md.height = found.height;
            md.xmp_header = found.xmp;
            if let Some(header) = found.exif {
                md.add_exif(header);
            }
        },
        ImageKind::WebP => {
            let found = webp::scan_webp(src, stop, &mut on_xmp, skip_exif)?;
            md.width = found.width;
            md.height = found.height;
            md.xmp_header = found.xmp;
            if let Some(header) = found.exif {
                md.add_exif(header);
            }
        },
        ImageKind::Xmp => {
            md.xmp = Some(xmp::parse_xmp_with_limit(src, config.max_xmp_bytes)?);
        },
        k if k.is_tiff_based() => {
            md.add_exif(scan_tiff(src, k)?);
        },
        _ => return Err(Error::Unsupported("no metadata scanner for this container")),
    }
    if md.xmp.is_none() {
        md.xmp = decoded;
    }
    Ok(md)
}
