// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canon CR3: the `moov/uuid` metadata boxes.

use arrayvec::ArrayVec;
use enough::{Stop, Unstoppable};
use log::{debug, trace, warn};

use crate::bmff::{read_file_type, BmffBox, BoxIter, FileTypeBox};
use crate::boxes::{BoxType, Brand};
use crate::exif::{ExifHeader, XmpHeader};
use crate::reader::{Flags, Peek, PeekExt as _};
use crate::{Error, ImageKind, Result, ScanConfig, ToUsize, TryVec};

/// Extended type of the `uuid` box holding Canon's metadata boxes.
pub const CANON_UUID: [u8; 16] = [
    0x85, 0xc0, 0xb6, 0x87, 0x82, 0x0f, 0x11, 0xe0, 0x81, 0x11, 0xf4, 0xce, 0x46, 0x2b, 0x6a, 0x48,
];

/// Extended type of the top-level `uuid` box holding the XMP packet.
pub const XMP_UUID: [u8; 16] = [
    0xbe, 0x7a, 0xcf, 0xcb, 0x97, 0xa9, 0x42, 0xe8, 0x9c, 0x71, 0x99, 0x94, 0x91, 0xe3, 0xaf, 0xac,
];

/// Compressor version 'CNCV', e.g. `CanonCR3_001/00.09.00/00.00.00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CncvBox {
    pub version: [u8; 30],
}

/// Track description 'CCDT'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CcdtBox {
    pub image_type: u64,
    pub dual_pixel: u32,
    pub track_index: u32,
}

/// Track pointer 'CCTP': one `CCDT` per image track.
#[derive(Debug)]
pub struct CctpBox {
    pub flags: Flags,
    pub count: u32,
    pub tracks: TryVec<CcdtBox>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexOffset {
    pub index: u32,
    pub offset: u64,
    pub size: u64,
}

/// Track offsets 'CTBO'.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CtboBox {
    pub count: u32,
    /// The first five entries.
    pub items: ArrayVec<IndexOffset, 5>,
}

/// Embedded JPEG thumbnail 'THMB'.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThumbnailBox {
    pub width: u16,
    pub height: u16,
    pub size: u32,
    /// Stream offset of the JPEG data.
    pub offset: u64,
}

/// The contents of the Canon `uuid` box.
#[derive(Debug, Default)]
pub struct Cr3MetaBox {
    pub cncv: Option<CncvBox>,
    pub cctp: Option<CctpBox>,
    pub ctbo: Option<CtboBox>,
    /// TIFF structures of `CMT1` (IFD0), `CMT2` (Exif IFD), `CMT3` (MakerNote) and `CMT4` (GPS IFD).
    ///
    /// `file_offset` points at the TIFF header that opens the box content,
    /// 8 bytes past the start of the `CMT` box itself.
    pub cmt: [Option<ExifHeader>; 4],
    pub thmb: Option<ThumbnailBox>,
}

impl Cr3MetaBox {
    /// Valid TIFF headers, `CMT1` first.
    pub fn exif_headers(&self) -> impl Iterator<Item = ExifHeader> + '_ {
        self.cmt.iter().flatten().copied()
    }
}

#[derive(Debug, Default)]
pub struct MoovBox {
    pub meta: Cr3MetaBox,
}

/// What a CR3 walk found.
#[derive(Debug)]
pub struct Cr3Scan {
    pub file_type: FileTypeBox,
    pub moov: MoovBox,
    pub xmp_header: Option<XmpHeader>,
}

/// Locate the Canon metadata of a CR3 file.
pub fn scan_cr3<P: Peek + ?Sized>(src: &mut P) -> Result<Cr3Scan> {
    scan_cr3_with(src, &ScanConfig::default(), &Unstoppable, |_, _| Ok(()), |_, _| Ok(()))
}

/// [`scan_cr3`] with limits, cancellation and payload callbacks.
///
/// `on_exif` is called once per `CMT` box, `on_xmp` for the XMP `uuid` box.
pub fn scan_cr3_with<P, X, E>(
    src: &mut P,
    config: &ScanConfig,
    stop: &dyn Stop,
    mut on_xmp: X,
    mut on_exif: E,
) -> Result<Cr3Scan>
where
    P: Peek + ?Sized,
    X: FnMut(&mut dyn Peek, &XmpHeader) -> Result<()>,
    E: FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
{
    let mut iter = BoxIter::new(src);
    let file_type = read_file_type(&mut iter)?;
    if !file_type.is_compatible_with(Brand::Crx) {
        let e = match file_type.brand() {
            Err(e) => e,
            Ok(_) => Error::BrandNotSupported(file_type.major_brand),
        };
        if !config.lenient {
            return Err(e);
        }
        warn!("{e}; reading as CR3 anyway");
    }

    let mut moov = None;
    let mut xmp_header = None;
    loop {
        stop.check()?;
        let mut b = match iter.next_box() {
            Ok(Some(b)) => b,
            Ok(None) | Err(Error::NoMoreBoxes) => break,
            Err(e @ (Error::UnexpectedEOF | Error::ShortBuffer)) if moov.is_some() => {
                debug!("CR3 stream truncated: {e}");
                break;
            },
            Err(e) => return Err(e),
        };
        match b.head.name {
            BoxType::MovieBox if moov.is_none() => {
                moov = Some(read_moov(&mut b, config, &mut on_exif)?);
            },
            BoxType::UuidBox if b.head.uuid == Some(XMP_UUID) => {
                let header = XmpHeader::new(b.offset(), b.bytes_left());
                debug!("XMP uuid: {header:?}");
                xmp_header = Some(header);
                on_xmp(&mut b, &header)?;
            },
            // image data follows; there is no metadata past it
            BoxType::MediaDataBox => break,
            _ => trace!("{:?} (skipped)", b.head.name),
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }

    Ok(Cr3Scan {
        file_type,
        moov: moov.ok_or(Error::InvalidData("moov box missing"))?,
        xmp_header,
    })
}

fn read_moov<P: Peek + ?Sized>(
    src: &mut BmffBox<'_, P>,
    config: &ScanConfig,
    on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
) -> Result<MoovBox> {
    src.expect_type(BoxType::MovieBox)?;
    let mut moov = MoovBox::default();
    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        if b.head.name == BoxType::UuidBox && b.head.uuid == Some(CANON_UUID) {
            moov.meta = read_canon_uuid(&mut b, config, on_exif)?;
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }
    Ok(moov)
}

fn read_canon_uuid<P: Peek + ?Sized>(
    src: &mut BmffBox<'_, P>,
    config: &ScanConfig,
    on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
) -> Result<Cr3MetaBox> {
    let mut meta = Cr3MetaBox::default();
    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        match b.head.name {
            BoxType::CanonCompressorVersionBox => meta.cncv = b.parse(read_cncv)?,
            BoxType::CanonTrackPointerBox => meta.cctp = b.parse(|b| read_cctp(b, config))?,
            BoxType::CanonTrackOffsetBox => meta.ctbo = b.parse(read_ctbo)?,
            BoxType::CanonThumbnailBox => meta.thmb = b.parse(read_thmb)?,
            BoxType::CanonMetadata1Box
            | BoxType::CanonMetadata2Box
            | BoxType::CanonMetadata3Box
            | BoxType::CanonMetadata4Box => {
                let slot = match b.head.name {
                    BoxType::CanonMetadata1Box => 0,
                    BoxType::CanonMetadata2Box => 1,
                    BoxType::CanonMetadata3Box => 2,
                    _ => 3,
                };
                if let Some(header) = b.parse(read_cmt)? {
                    debug!("{:?}: {header:?}", b.head.name);
                    meta.cmt[slot] = Some(header);
                    on_exif(&mut b, &header)?;
                }
            },
            _ => trace!("{:?} in Canon uuid (skipped)", b.head.name),
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }
    Ok(meta)
}

fn read_cncv<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<CncvBox> {
    Ok(CncvBox {
        version: src.read_array::<30>()?,
    })
}

fn read_cctp<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>, config: &ScanConfig) -> Result<CctpBox> {
    let flags = src.read_flags()?;
    src.skip(4)?;
    let count = src.read_u32()?;
    config.check_items(count, "CCTP track count")?;
    let mut tracks = TryVec::with_capacity(count.to_usize())?;
    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        if b.head.name == BoxType::CanonTrackDescriptionBox {
            if let Some(ccdt) = b.parse(read_ccdt)? {
                tracks.push(ccdt)?;
            }
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }
    Ok(CctpBox { flags, count, tracks })
}

fn read_ccdt<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<CcdtBox> {
    Ok(CcdtBox {
        image_type: src.read_u64()?,
        dual_pixel: src.read_u32()?,
        track_index: src.read_u32()?,
    })
}

fn read_ctbo<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<CtboBox> {
    let count = src.read_u32()?;
    let mut ctbo = CtboBox { count, items: ArrayVec::new() };
    for _ in 0..count {
        if ctbo.items.is_full() {
            break;
        }
        ctbo.items.push(IndexOffset {
            index: src.read_u32()?,
            offset: src.read_u64()?,
            size: src.read_u64()?,
        });
    }
    Ok(ctbo)
}

fn read_thmb<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<ThumbnailBox> {
    let _flags = src.read_flags()?;
    let width = src.read_u16()?;
    let height = src.read_u16()?;
    let size = src.read_u32()?;
    src.skip(4)?;
    Ok(ThumbnailBox {
        width,
        height,
        size,
        offset: src.offset(),
    })
}

/// A `CMT` box is a bare TIFF structure; offsets in it are relative to the box content.
fn read_cmt<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<ExifHeader> {
    let length = src.bytes_left();
    ExifHeader::peek(src, length, ImageKind::Cr3)?.checked()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::ByteOrder;
    use crate::reader::Source;

    fn bx(name: &[u8; 4], content: &[u8]) -> std::vec::Vec<u8> {
        let mut out = ((content.len() + 8) as u32).to_be_bytes().to_vec();
        out.extend_from_slice(name);
        out.extend_from_slice(content);
        out
    }

    fn uuid_box(uuid: &[u8; 16], content: &[u8]) -> std::vec::Vec<u8> {
        let mut body = uuid.to_vec();
        body.extend_from_slice(content);
        bx(b"uuid", &body)
    }

    fn cr3(canon: &[u8]) -> std::vec::Vec<u8> {
        let mut data = bx(b"ftyp", b"crx \0\0\0\x01crx isom");
        let mut moov = bx(b"mvhd", &[0; 20]);
        moov.extend_from_slice(&uuid_box(&CANON_UUID, canon));
        data.extend_from_slice(&bx(b"moov", &moov));
        data
    }

    #[test]
    fn canon_boxes() {
        let mut canon = bx(b"CNCV", b"CanonCR3_001/00.09.00/00.00.00");
        let mut cctp = vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 1];
        cctp.extend_from_slice(&bx(b"CCDT", &[0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0, 1]));
        canon.extend_from_slice(&bx(b"CCTP", &cctp));
        let mut ctbo = vec![0, 0, 0, 1, 0, 0, 0, 1];
        ctbo.extend_from_slice(&0x1234u64.to_be_bytes());
        ctbo.extend_from_slice(&0x10u64.to_be_bytes());
        canon.extend_from_slice(&bx(b"CTBO", &ctbo));
        let cmt2_start = 24 + 8 + 28 + 8 + 16 + canon.len() + 8;
        canon.extend_from_slice(&bx(b"CMT2", b"MM\0*\0\0\0\x08\0\0"));
        canon.extend_from_slice(&bx(b"THMB", &[0, 0, 0, 0, 0, 160, 0, 120, 0, 0, 0, 4, 0, 0, 0, 0, 0xff, 0xd8, 0xff, 0xd9]));
        let data = cr3(&canon);

        let mut src = Source::from_slice(&data);
        let mut seen = 0;
        let scan = scan_cr3_with(&mut src, &ScanConfig::default(), &Unstoppable, |_, _| Ok(()), |r, h| {
            assert_eq!(r.remain(), u64::from(h.length));
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 1);
        let meta = &scan.moov.meta;
        assert_eq!(&meta.cncv.unwrap().version[..8], b"CanonCR3");
        let cctp = meta.cctp.as_ref().unwrap();
        assert_eq!(cctp.count, 1);
        assert_eq!(cctp.tracks[0].image_type, 0x10);
        assert_eq!(cctp.tracks[0].track_index, 1);
        assert_eq!(meta.ctbo.as_ref().unwrap().items[0].offset, 0x1234);
        assert!(meta.cmt[0].is_none());
        let cmt2 = meta.cmt[1].unwrap();
        assert_eq!(cmt2.byte_order, ByteOrder::BigEndian);
        assert_eq!(cmt2.file_offset as usize, cmt2_start);
        assert_eq!(cmt2.length, 10);
        let thmb = meta.thmb.unwrap();
        assert_eq!((thmb.width, thmb.height, thmb.size), (160, 120, 4));
        assert_eq!(&data[thmb.offset as usize..][..2], &[0xff, 0xd8]);
    }

    #[test]
    fn rejects_other_brands() {
        let mut data = bx(b"ftyp", b"heic\0\0\0\0mif1");
        data.extend_from_slice(&bx(b"moov", &[]));
        let mut src = Source::from_slice(&data);
        assert!(matches!(scan_cr3(&mut src), Err(Error::BrandNotSupported(b)) if b == b"heic"));
    }
}
