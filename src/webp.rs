// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! WebP (RIFF) chunk walk for the canvas size and the `EXIF`/`XMP ` chunks.

use byteorder::{ByteOrder as _, LittleEndian};
use enough::Stop;
use log::{debug, trace};

use crate::boxes::FourCC;
use crate::exif::{ExifHeader, XmpHeader};
use crate::reader::{Bounded, Peek, PeekExt as _};
use crate::{Error, ImageKind, Result, ToU64};

const VP8X: [u8; 4] = *b"VP8X";
const VP8: [u8; 4] = *b"VP8 ";
const VP8L: [u8; 4] = *b"VP8L";
const EXIF: [u8; 4] = *b"EXIF";
const XMP: [u8; 4] = *b"XMP ";

/// Some writers keep the JPEG APP1 identifier in front of the TIFF header.
const EXIF_PREFIX: &[u8] = b"Exif\0\0";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebpScan {
    pub width: u32,
    pub height: u32,
    pub exif: Option<ExifHeader>,
    pub xmp: Option<XmpHeader>,
}

/// Walk the chunks of a WebP file, handing its Exif and XMP payloads to the
/// callbacks through readers limited to each payload.
pub fn scan_webp<P, X, E>(src: &mut P, stop: &dyn Stop, mut on_xmp: X, mut on_exif: E) -> Result<WebpScan>
where
    P: Peek + ?Sized,
    X: FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
    E: FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
{
    let buf = src.peek(12)?;
    if &buf[..4] != b"RIFF" || &buf[8..12] != b"WEBP" {
        return Err(Error::InvalidData("missing RIFF/WEBP header"));
    }
    // the RIFF size counts the form type but not itself
    let riff_len = u64::from(LittleEndian::read_u32(&buf[4..8])).saturating_sub(4);
    src.discard(12)?;
    let mut body = Bounded::new(&mut *src, riff_len);

    let mut scan = WebpScan::default();
    loop {
        stop.check()?;
        let (kind, length) = match body.peek(8) {
            Ok(buf) => ([buf[0], buf[1], buf[2], buf[3]], u64::from(LittleEndian::read_u32(&buf[4..8]))),
            Err(Error::ShortBuffer) => break,
            Err(e) => return Err(e),
        };
        trace!("chunk {} of {length} bytes at {}", FourCC::from(kind), body.offset());
        body.discard(8)?;
        let mut chunk = Bounded::new(&mut body, length);
        let result = match kind {
            VP8X => read_vp8x(&mut chunk, &mut scan),
            VP8 | VP8L if scan.width == 0 => read_bitstream_size(&mut chunk, kind, &mut scan),
            EXIF if scan.exif.is_none() => read_exif(&mut chunk, &mut scan, &mut on_exif),
            XMP if scan.xmp.is_none() => {
                let header = XmpHeader::new(chunk.offset(), chunk.remain());
                debug!("XMP chunk: {header:?}");
                scan.xmp = Some(header);
                on_xmp(&mut chunk, &header)
            },
            _ => Ok(()),
        };
        match result {
            Ok(()) => {},
            Err(Error::ShortBuffer | Error::InvalidData(_)) if chunk.is_ok() => {
                debug!("skipping malformed {} chunk", FourCC::from(kind));
            },
            Err(e) => return Err(e),
        }
        chunk.drain()?;
        // chunks are padded to an even size
        if length % 2 == 1 && body.remain() > 0 {
            body.discard(1)?;
        }
    }
    if body.remain() > 0 {
        debug!("WebP ended {} bytes early", body.remain());
    }
    Ok(scan)
}

/// Canvas size: flags(1) reserved(3) width-1 (u24) height-1 (u24).
fn read_vp8x(chunk: &mut dyn Peek, scan: &mut WebpScan) -> Result<()> {
    let (width, height) = chunk.read_with(10, |b| {
        (LittleEndian::read_u24(&b[4..7]) + 1, LittleEndian::read_u24(&b[7..10]) + 1)
    })?;
    scan.width = width;
    scan.height = height;
    debug!("VP8X canvas {width}x{height}");
    Ok(())
}

/// Frame size of a simple (non-extended) file.
fn read_bitstream_size(chunk: &mut dyn Peek, kind: [u8; 4], scan: &mut WebpScan) -> Result<()> {
    let (width, height) = if kind == VP8L {
        let b = chunk.peek(5)?;
        if b[0] != 0x2f {
            return Err(Error::InvalidData("bad VP8L signature"));
        }
        let bits = LittleEndian::read_u32(&b[1..5]);
        ((bits & 0x3fff) + 1, ((bits >> 14) & 0x3fff) + 1)
    } else {
        let b = chunk.peek(10)?;
        if b[3..6] != [0x9d, 0x01, 0x2a] {
            return Err(Error::InvalidData("bad VP8 start code"));
        }
        (
            u32::from(LittleEndian::read_u16(&b[6..8]) & 0x3fff),
            u32::from(LittleEndian::read_u16(&b[8..10]) & 0x3fff),
        )
    };
    scan.width = width;
    scan.height = height;
    Ok(())
}

fn read_exif(
    chunk: &mut dyn Peek,
    scan: &mut WebpScan,
    on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
) -> Result<()> {
    if chunk.fill_buf(EXIF_PREFIX.len())? == EXIF_PREFIX {
        chunk.skip(EXIF_PREFIX.len().to_u64())?;
    }
    let length = chunk.remain();
    let header = ExifHeader::peek(chunk, length, ImageKind::WebP)?.checked()?;
    debug!("EXIF chunk: {header:?}");
    scan.exif = Some(header);
    on_exif(chunk, &header)
}
