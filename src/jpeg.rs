// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-pass JPEG marker walk that locates Exif/XMP APP1 payloads.
//!
//! Only marker segments are visited; entropy-coded data is skipped by
//! resynchronising on the next `0xFF`. The walk ends early at the first DHT
//! of the primary image: metadata segments precede it in practice.

use byteorder::{BigEndian, ByteOrder as _};
use enough::{Stop, Unstoppable};
use log::{debug, trace};

use crate::exif::{ExifHeader, XmpHeader};
use crate::reader::{Bounded, Peek, PeekExt as _};
use crate::{Error, ImageKind, Result, ScanConfig, ToU64};

mod marker {
    pub const P: u8 = 0xff;
    pub const TEM: u8 = 0x01;
    pub const SOF0: u8 = 0xc0;
    pub const DHT: u8 = 0xc4;
    pub const JPG: u8 = 0xc8;
    pub const DAC: u8 = 0xcc;
    pub const SOF15: u8 = 0xcf;
    pub const RST0: u8 = 0xd0;
    pub const RST7: u8 = 0xd7;
    pub const SOI: u8 = 0xd8;
    pub const EOI: u8 = 0xd9;
    pub const APP1: u8 = 0xe1;
}

/// APP1 identifier of an Exif payload.
const EXIF_ID: &[u8] = b"Exif\0\0";

/// APP1 identifier of a standard XMP packet.
const XMP_ID: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

/// Window used to find the next marker prefix while resynchronising.
const RESYNC_WINDOW: usize = 4096;

/// What a JPEG marker walk found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JpegScan {
    pub exif: Option<ExifHeader>,
    pub xmp: Option<XmpHeader>,
    /// Width of the first frame of the primary image, 0 if no SOF was seen.
    pub width: u16,
    pub height: u16,
    pub components: u8,
}

impl JpegScan {
    /// The Exif header, or [`Error::NoExif`] when the file carries none.
    pub fn exif_header(&self) -> Result<ExifHeader> {
        self.exif.ok_or(Error::NoExif)
    }
}

struct JpegReader<'a, P: Peek + ?Sized> {
    src: &'a mut P,
    /// SOI nesting depth; the primary image is depth 1.
    depth: u32,
    seen_soi: bool,
    start: u64,
    scan: JpegScan,
}

/// Walk the JPEG markers of `src`, handing Exif and XMP payloads to the callbacks.
///
/// Each callback receives a reader limited to its payload; bytes it does not
/// consume are skipped. Only the first Exif and the first XMP segment are reported.
pub fn scan_jpeg<P, X, E>(src: &mut P, on_xmp: X, on_exif: E) -> Result<JpegScan>
where
    P: Peek + ?Sized,
    X: FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
    E: FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
{
    scan_jpeg_with_config(src, &ScanConfig::default(), &Unstoppable, on_xmp, on_exif)
}

/// [`scan_jpeg`] with resource limits and cancellation.
pub fn scan_jpeg_with_config<P, X, E>(
    src: &mut P,
    config: &ScanConfig,
    stop: &dyn Stop,
    mut on_xmp: X,
    mut on_exif: E,
) -> Result<JpegScan>
where
    P: Peek + ?Sized,
    X: FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
    E: FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
{
    let start = src.offset();
    let mut reader = JpegReader {
        src,
        depth: 0,
        seen_soi: false,
        start,
        scan: JpegScan::default(),
    };
    reader.read_markers(config, stop, &mut on_xmp, &mut on_exif)?;
    Ok(reader.scan)
}

impl<P: Peek + ?Sized> JpegReader<'_, P> {
    fn read_markers(
        &mut self,
        config: &ScanConfig,
        stop: &dyn Stop,
        on_xmp: &mut dyn FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
        on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
    ) -> Result<()> {
        loop {
            if let Some(limit) = config.max_jpeg_scan_bytes {
                if self.src.offset() - self.start >= limit {
                    debug!("JPEG scan stopped after {limit} bytes");
                    return Ok(());
                }
            }

            let (first, code) = match self.src.peek(2) {
                Ok(buf) => (buf[0], buf[1]),
                Err(Error::ShortBuffer) => return self.end_of_stream(),
                Err(e) => return Err(e),
            };

            if first != marker::P {
                self.resync()?;
                continue;
            }
            if code == marker::SOI {
                self.depth += 1;
                self.seen_soi = true;
                self.src.discard(2)?;
                continue;
            }
            if self.depth == 0 {
                self.src.discard(1)?;
                continue;
            }

            stop.check()?;

            match self.read_segment(code, on_xmp, on_exif) {
                Ok(true) => return Ok(()),
                Ok(false) => {},
                // a segment cut off by the end of the stream
                Err(Error::ShortBuffer | Error::UnexpectedEOF) => return self.end_of_stream(),
                Err(e) => return Err(e),
            }
        }
    }

    /// Handle the marker at the cursor; `true` once the walk is complete.
    fn read_segment(
        &mut self,
        code: u8,
        on_xmp: &mut dyn FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
        on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
    ) -> Result<bool> {
        match code {
            // fill byte before a marker
            marker::P => {
                self.src.discard(1)?;
            },
            marker::DHT if self.depth == 1 => {
                trace!("DHT at {}: end of metadata", self.src.offset());
                return Ok(true);
            },
            marker::EOI => {
                self.depth -= 1;
                self.src.discard(2)?;
                return Ok(self.depth <= 1);
            },
            marker::SOF0..=marker::SOF15 if !matches!(code, marker::DHT | marker::JPG | marker::DAC) => {
                self.read_sof()?;
            },
            marker::APP1 => {
                self.read_app1(on_xmp, on_exif)?;
            },
            // stand-alone markers and stuffed zero bytes
            0x00 | marker::TEM | marker::RST0..=marker::RST7 => {
                self.src.discard(2)?;
            },
            _ => {
                let length = self.segment_length()?;
                self.src.skip(length + 2)?;
            },
        }
        Ok(false)
    }

    /// Skip to the next `0xFF`.
    fn resync(&mut self) -> Result<()> {
        let buf = self.src.fill_buf(RESYNC_WINDOW)?;
        let skip = buf.iter().position(|&b| b == marker::P).unwrap_or(buf.len());
        self.src.discard(skip.max(1).to_u64())?;
        Ok(())
    }

    fn end_of_stream(&mut self) -> Result<()> {
        if !self.seen_soi {
            return Err(Error::NoJpegMarker);
        }
        debug!("JPEG stream ended at {} inside depth {}", self.src.offset(), self.depth);
        Ok(())
    }

    /// Segment length field, which counts itself but not the marker.
    fn segment_length(&mut self) -> Result<u64> {
        let buf = self.src.peek(4)?;
        Ok(u64::from(BigEndian::read_u16(&buf[2..4])))
    }

    fn read_sof(&mut self) -> Result<()> {
        let length = self.segment_length()?;
        if self.depth == 1 && self.scan.width == 0 && self.scan.height == 0 && length >= 8 {
            let buf = self.src.peek(10)?;
            self.scan.height = BigEndian::read_u16(&buf[5..7]);
            self.scan.width = BigEndian::read_u16(&buf[7..9]);
            self.scan.components = buf[9];
            debug!(
                "SOF{} {}x{} ({} components)",
                buf[1] - marker::SOF0,
                self.scan.width,
                self.scan.height,
                self.scan.components
            );
        }
        self.src.skip(length + 2)
    }

    fn read_app1(
        &mut self,
        on_xmp: &mut dyn FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
        on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
    ) -> Result<()> {
        let length = self.segment_length()?;
        if length < 2 {
            debug!("APP1 at {} with length {length}", self.src.offset());
            return self.src.skip(length + 2);
        }
        let total = length + 2;
        let window = usize::try_from(total).map_or(4 + XMP_ID.len(), |t| t.min(4 + XMP_ID.len()));
        let buf = self.src.peek(window)?;
        let payload = &buf[4..];

        if payload.starts_with(EXIF_ID) && self.scan.exif.is_none() {
            let prefix = (4 + EXIF_ID.len()).to_u64();
            let marker_offset = self.src.offset();
            self.src.discard(prefix)?;
            let exif_length = length.saturating_sub(2 + EXIF_ID.len().to_u64());
            let mut exif = Bounded::new(&mut *self.src, exif_length);
            match ExifHeader::peek(&mut exif, exif_length, ImageKind::Jpeg) {
                Ok(header) if header.is_valid() => {
                    debug!("Exif APP1 at {marker_offset}: {header:?}");
                    self.scan.exif = Some(header);
                    on_exif(&mut exif, &header)?;
                },
                Ok(header) => debug!("ignoring Exif APP1 at {marker_offset} with bad TIFF header {header:?}"),
                Err(Error::ShortBuffer) => debug!("Exif APP1 at {marker_offset} too short"),
                Err(e) => return Err(e),
            }
            exif.drain()?;
            return Ok(());
        }

        if payload.starts_with(XMP_ID) && self.scan.xmp.is_none() {
            let prefix = (4 + XMP_ID.len()).to_u64();
            self.src.discard(prefix)?;
            let xmp_length = length.saturating_sub(2 + XMP_ID.len().to_u64());
            let header = XmpHeader::new(self.src.offset(), xmp_length);
            debug!("XMP APP1: {header:?}");
            self.scan.xmp = Some(header);
            let mut xmp = Bounded::new(&mut *self.src, xmp_length);
            on_xmp(&mut xmp, &header)?;
            xmp.drain()?;
            return Ok(());
        }

        self.src.skip(total)
    }
}

/// Offset of the embedded-JPEG pointer in a Fujifilm RAF header.
const RAF_JPEG_POINTER: usize = 84;

/// Find the Exif and XMP of a Fujifilm RAF file in its embedded JPEG preview.
///
/// The header points at the preview; the walk then runs inside it, so every
/// offset reported is still relative to the start of the file.
pub fn scan_raf<P, X, E>(
    src: &mut P,
    config: &ScanConfig,
    stop: &dyn Stop,
    on_xmp: X,
    on_exif: E,
) -> Result<JpegScan>
where
    P: Peek + ?Sized,
    X: FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
    E: FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
{
    let start = src.offset();
    let buf = src.peek(RAF_JPEG_POINTER + 8)?;
    if !buf.starts_with(b"FUJIFILMCCD-RAW") {
        return Err(Error::InvalidData("missing RAF signature"));
    }
    let jpeg_offset = u64::from(BigEndian::read_u32(&buf[RAF_JPEG_POINTER..]));
    let jpeg_length = u64::from(BigEndian::read_u32(&buf[RAF_JPEG_POINTER + 4..]));
    debug!("RAF preview JPEG at {jpeg_offset}, {jpeg_length} bytes");
    if jpeg_offset < (RAF_JPEG_POINTER + 8).to_u64() {
        return Err(Error::InvalidData("RAF preview overlaps the header"));
    }
    src.skip(jpeg_offset - (src.offset() - start))?;
    let mut preview = Bounded::new(src, jpeg_length);
    let mut scan = scan_jpeg_with_config(&mut preview, config, stop, on_xmp, on_exif)?;
    if let Some(exif) = &mut scan.exif {
        exif.image_kind = ImageKind::Raf;
    }
    Ok(scan)
}
