// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! PNG chunk walk: `IHDR` dimensions, `eXIf` and the `iTXt` XMP packet.

use byteorder::{BigEndian, ByteOrder as _};
use enough::Stop;
use log::{debug, trace};

use crate::boxes::FourCC;
use crate::exif::{ExifHeader, XmpHeader};
use crate::reader::{Bounded, Peek, PeekExt as _};
use crate::{Error, ImageKind, Result, ToU64};

const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// `iTXt` keyword of an XMP packet.
const XMP_KEYWORD: &[u8] = b"XML:com.adobe.xmp";

const IHDR: [u8; 4] = *b"IHDR";
const EXIF: [u8; 4] = *b"eXIf";
const ITXT: [u8; 4] = *b"iTXt";
const IEND: [u8; 4] = *b"IEND";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PngScan {
    pub width: u32,
    pub height: u32,
    pub exif: Option<ExifHeader>,
    pub xmp: Option<XmpHeader>,
}

/// Walk the chunks of a PNG stream up to `IEND`.
///
/// The first valid `eXIf` chunk and the first uncompressed XMP `iTXt` chunk
/// are reported to the callbacks, each through a reader limited to the
/// payload. A stream that ends between chunks keeps what was found.
pub fn scan_png<P, X, E>(src: &mut P, stop: &dyn Stop, mut on_xmp: X, mut on_exif: E) -> Result<PngScan>
where
    P: Peek + ?Sized,
    X: FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
    E: FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
{
    if src.peek(SIGNATURE.len())? != SIGNATURE {
        return Err(Error::InvalidData("missing PNG signature"));
    }
    src.discard(SIGNATURE.len().to_u64())?;

    let mut scan = PngScan::default();
    loop {
        stop.check()?;
        let (length, kind) = match src.peek(8) {
            Ok(buf) => (u64::from(BigEndian::read_u32(buf)), [buf[4], buf[5], buf[6], buf[7]]),
            Err(Error::ShortBuffer) => {
                debug!("PNG ended at {} without IEND", src.offset());
                return Ok(scan);
            },
            Err(e) => return Err(e),
        };
        trace!("chunk {} of {length} bytes at {}", FourCC::from(kind), src.offset());
        src.discard(8)?;
        let mut chunk = Bounded::new(&mut *src, length);
        let result = match kind {
            IHDR => read_ihdr(&mut chunk, &mut scan),
            EXIF if scan.exif.is_none() => read_exif(&mut chunk, length, &mut scan, &mut on_exif),
            ITXT if scan.xmp.is_none() => read_itxt(&mut chunk, &mut scan, &mut on_xmp),
            _ => Ok(()),
        };
        match result {
            Ok(()) => {},
            Err(Error::ShortBuffer | Error::UnterminatedString | Error::InvalidData(_)) if chunk.is_ok() => {
                debug!("skipping malformed {} chunk", FourCC::from(kind));
            },
            Err(e) => return Err(e),
        }
        chunk.drain()?;
        // CRC
        match src.skip(4) {
            Ok(()) => {},
            Err(Error::ShortBuffer) => return Ok(scan),
            Err(e) => return Err(e),
        }
        if kind == IEND {
            return Ok(scan);
        }
    }
}

fn read_ihdr(chunk: &mut dyn Peek, scan: &mut PngScan) -> Result<()> {
    scan.width = chunk.read_u32()?;
    scan.height = chunk.read_u32()?;
    debug!("IHDR {}x{}", scan.width, scan.height);
    Ok(())
}

fn read_exif(
    chunk: &mut dyn Peek,
    length: u64,
    scan: &mut PngScan,
    on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
) -> Result<()> {
    let header = ExifHeader::peek(chunk, length, ImageKind::Png)?.checked()?;
    debug!("eXIf: {header:?}");
    scan.exif = Some(header);
    on_exif(chunk, &header)
}

/// An `iTXt` chunk is `keyword\0 flag method language\0 translated\0 text`.
fn read_itxt(
    chunk: &mut dyn Peek,
    scan: &mut PngScan,
    on_xmp: &mut dyn FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
) -> Result<()> {
    let keyword = chunk.read_null_string()?;
    if *keyword != *XMP_KEYWORD {
        return Ok(());
    }
    let compressed = chunk.read_u8()? != 0;
    let _method = chunk.read_u8()?;
    if compressed {
        debug!("compressed XMP iTXt chunk is not supported");
        return Ok(());
    }
    let _language = chunk.read_null_string()?;
    let _translated = chunk.read_null_string()?;
    let header = XmpHeader::new(chunk.offset(), chunk.remain());
    debug!("XMP iTXt: {header:?}");
    scan.xmp = Some(header);
    on_xmp(chunk, &header)
}
