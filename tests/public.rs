// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use std::fs::File;
use std::io::{BufReader, Read};

use zenmeta_parse::bmff::{read_box_header, read_ftyp, read_meta, BoxIter};
use zenmeta_parse::boxes::{BoxType, ItemType};
use zenmeta_parse::cr3::{CANON_UUID, XMP_UUID};
use zenmeta_parse::reader::{Bounded, PeekExt as _};
use zenmeta_parse::{
    scan, scan_with_config, sniff, ByteOrder, Error, ImageKind, Peek, ScanConfig, Source, Unstoppable, Xmp,
};

const XMP_ID: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

// ============================================================================
// Fixture builders
// ============================================================================

fn bx(name: &[u8; 4], content: &[u8]) -> Vec<u8> {
    let mut out = ((content.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(name);
    out.extend_from_slice(content);
    out
}

fn full(name: &[u8; 4], version: u8, content: &[u8]) -> Vec<u8> {
    let mut body = vec![version, 0, 0, 0];
    body.extend_from_slice(content);
    bx(name, &body)
}

fn uuid_box(uuid: &[u8; 16], content: &[u8]) -> Vec<u8> {
    let mut body = uuid.to_vec();
    body.extend_from_slice(content);
    bx(b"uuid", &body)
}

fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xff, marker];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn xmp_packet(body: &str) -> Vec<u8> {
    format!(
        "<?xpacket begin=\"\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?><x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\
         <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">{body}</rdf:RDF></x:xmpmeta>\
         <?xpacket end=\"w\"?>"
    )
    .into_bytes()
}

/// Coded image bytes stored in `mdat` ahead of the Exif item.
const IMAGE_DATA: &[u8] = &[0, 0, 0, 6, 0x26, 0x01, 0xaf, 0x3e, 0x12, 0x34];

/// Exif item payload: a 6-byte skew (the APP1 identifier) before the TIFF header.
const EXIF_ITEM: &[u8] = b"\0\0\0\x06Exif\0\0MM\0*\0\0\0\x08\0\0";

fn heic_meta(image_offset: u32, exif_offset: Option<u32>) -> Vec<u8> {
    let mut hdlr = b"\0\0\0\0pict".to_vec();
    hdlr.extend_from_slice(&[0; 13]);
    let mut meta = full(b"hdlr", 0, &hdlr);
    meta.extend_from_slice(&full(b"pitm", 0, &[0, 1]));

    let mut iinf = vec![0, if exif_offset.is_some() { 2 } else { 1 }];
    iinf.extend_from_slice(&full(b"infe", 2, b"\0\x01\0\0hvc1\0"));
    if exif_offset.is_some() {
        iinf.extend_from_slice(&full(b"infe", 2, b"\0\x02\0\0Exif\0"));
    }
    meta.extend_from_slice(&full(b"iinf", 0, &iinf));

    let mut iloc = vec![0x44, 0x00, 0, if exif_offset.is_some() { 2 } else { 1 }];
    iloc.extend_from_slice(&[0, 1, 0, 0, 0, 1]);
    iloc.extend_from_slice(&image_offset.to_be_bytes());
    iloc.extend_from_slice(&(IMAGE_DATA.len() as u32).to_be_bytes());
    if let Some(offset) = exif_offset {
        iloc.extend_from_slice(&[0, 2, 0, 0, 0, 1]);
        iloc.extend_from_slice(&offset.to_be_bytes());
        iloc.extend_from_slice(&(EXIF_ITEM.len() as u32).to_be_bytes());
    }
    meta.extend_from_slice(&full(b"iloc", 0, &iloc));

    let mut iprp = bx(b"ipco", &full(b"ispe", 0, &[0, 0, 0x02, 0x80, 0, 0, 0x01, 0xe0]));
    iprp.extend_from_slice(&full(b"ipma", 0, &[0, 0, 0, 1, 0, 1, 1, 0x81]));
    meta.extend_from_slice(&bx(b"iprp", &iprp));
    full(b"meta", 0, &meta)
}

/// A minimal HEIC: `ftyp`, `meta`, then `mdat` with the image and the Exif item.
fn heic(with_exif: bool) -> Vec<u8> {
    let ftyp = bx(b"ftyp", b"heic\0\0\0\0mif1heic");
    // offsets are fixed-width, so the meta size does not depend on them
    let meta_len = heic_meta(0, with_exif.then_some(0)).len();
    let image_offset = (ftyp.len() + meta_len + 8) as u32;
    let exif_offset = image_offset + IMAGE_DATA.len() as u32;

    let mut data = ftyp;
    data.extend_from_slice(&heic_meta(image_offset, with_exif.then_some(exif_offset)));
    let mut mdat = IMAGE_DATA.to_vec();
    if with_exif {
        mdat.extend_from_slice(EXIF_ITEM);
    }
    data.extend_from_slice(&bx(b"mdat", &mdat));
    data
}

fn cr3(xmp: &[u8]) -> Vec<u8> {
    let mut data = bx(b"ftyp", b"crx \0\0\0\x01crx isom");
    let mut cmt1 = b"II*\0\x08\0\0\0".to_vec();
    cmt1.extend_from_slice(&[0; 8]);
    let mut canon = bx(b"CMT1", &cmt1);
    canon.extend_from_slice(&bx(b"CMT3", b"MM\0*\0\0\0\x08\0\0"));
    data.extend_from_slice(&bx(b"moov", &uuid_box(&CANON_UUID, &canon)));
    data.extend_from_slice(&uuid_box(&XMP_UUID, xmp));
    data.extend_from_slice(&bx(b"mdat", &[0; 16]));
    data
}

fn jpeg_s1() -> Vec<u8> {
    let mut data = vec![0xff, 0xd8, 0xff, 0xe1, 0x00, 0x10];
    data.extend_from_slice(b"Exif\0\0II*\0\x08\0\0\0");
    data.extend_from_slice(&[0xff, 0xc4, 0x00, 0x03, 0x00]);
    data
}

fn jpeg_s2() -> Vec<u8> {
    let mut data = vec![0xff, 0xd8];
    data.extend_from_slice(&[0xff, 0xc0, 0x00, 0x11, 0x08, 0x00, 0x32, 0x00, 0x32, 0x03]);
    data.extend_from_slice(&[1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
    data.extend_from_slice(&[0xff, 0xe1, 0x00, 0x10]);
    data.extend_from_slice(b"Exif\0\0MM\0*\0\0\0\x08");
    data.extend_from_slice(&[0xff, 0xd9]);
    data
}

/// A reader that hands out at most three bytes per call.
struct Trickle<'a>(&'a [u8]);

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(3).min(self.0.len());
        buf[..n].copy_from_slice(&self.0[..n]);
        self.0 = &self.0[n..];
        Ok(n)
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn jpeg_with_exif_only() {
    let data = jpeg_s1();
    let scan = zenmeta_parse::scan_jpeg(&mut Source::from_slice(&data), |_, _| Ok(()), |_, _| Ok(())).unwrap();
    let exif = scan.exif_header().unwrap();
    assert_eq!(exif.byte_order, ByteOrder::LittleEndian);
    assert_eq!(exif.first_ifd_offset, 8);
    assert_eq!(exif.file_offset, 12);
    assert_eq!(exif.length, 8);
    assert_eq!(exif.image_kind, ImageKind::Jpeg);
    assert_eq!((scan.width, scan.height), (0, 0));
}

#[test]
fn jpeg_with_sof_and_exif() {
    let data = jpeg_s2();
    let mut payload = Vec::new();
    let scan = zenmeta_parse::scan_jpeg(
        &mut Source::from_slice(&data),
        |_, _| Ok(()),
        |r, header| {
            assert_eq!(r.remain(), u64::from(header.length));
            payload.extend_from_slice(r.peek(8)?);
            Ok(())
        },
    )
    .unwrap();
    assert_eq!((scan.width, scan.height, scan.components), (50, 50, 3));
    let exif = scan.exif_header().unwrap();
    assert_eq!(exif.byte_order, ByteOrder::BigEndian);
    assert_eq!(exif.first_ifd_offset, 8);
    assert_eq!(exif.file_offset, 31);
    assert_eq!(payload, b"MM\0*\0\0\0\x08");
}

#[test]
fn minimal_heic_item_tables() {
    let data = heic(false);
    let heif = zenmeta_parse::scan_heif(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(heif.file_type.major_brand, b"heic");
    assert_eq!(heif.meta.primary_item_id(), Some(1));
    assert_eq!(heif.meta.item_info.items.len(), 1);
    assert_eq!(heif.meta.item_info.items[0].item_type, ItemType::Hvc1);
    let location = &heif.meta.location.items[0];
    let image_offset = data.len() - IMAGE_DATA.len();
    assert_eq!(location.extent.offset, image_offset as u64);
    assert_eq!(location.extent.length, IMAGE_DATA.len() as u64);
    assert_eq!(heif.meta.primary_dimensions(), Some((640, 480)));
    assert!(heif.exif.is_none());
}

#[test]
fn jpeg_ends_at_first_huffman_table() {
    let mut data = vec![0xff, 0xd8, 0xff, 0xc4, 0x00, 0x1f];
    data.extend_from_slice(&[0; 29]);
    // metadata after the tables is never reached
    data.extend_from_slice(&segment(0xe1, b"Exif\0\0II*\0\x08\0\0\0"));
    let scan = zenmeta_parse::scan_jpeg(&mut Source::from_slice(&data), |_, _| Ok(()), |_, _| Ok(())).unwrap();
    assert!(matches!(scan.exif_header(), Err(Error::NoExif)));
    assert_eq!((scan.width, scan.height), (0, 0));
}

#[test]
fn wide_box_size() {
    let mut data = b"\0\0\0\x01meta\0\0\0\0\0\0\0\x20".to_vec();
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.extend_from_slice(&bx(b"dinf", &[0; 4]));
    data.extend_from_slice(b"trailing");
    assert_eq!(data.len(), 16 + 24);

    let mut src = Source::from_slice(&data);
    let mut iter = BoxIter::new(&mut src);
    let mut b = iter.next_box().unwrap().unwrap();
    assert_eq!(b.head.name, BoxType::MetadataBox);
    assert_eq!(b.head.size, 32);
    assert_eq!(b.bytes_left(), 16);
    read_meta(&mut b, &ScanConfig::default()).unwrap();
    assert_eq!(b.bytes_left(), 0);
    b.close().unwrap();
    assert_eq!(src.offset(), 32);
}

#[test]
fn cr3_canon_metadata_routing() {
    let data = cr3(b"");
    let scan = zenmeta_parse::scan_cr3(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(scan.file_type.major_brand, b"crx ");
    let cmt1 = scan.moov.meta.cmt[0].unwrap();
    assert_eq!(cmt1.byte_order, ByteOrder::LittleEndian);
    assert_eq!(cmt1.first_ifd_offset, 8);
    // ftyp(24) moov(8) uuid(24) CMT1(8)
    assert_eq!(cmt1.file_offset, 64);
    assert_eq!(&data[cmt1.file_offset as usize..][..4], b"II*\0");
    // the CMT1 box itself starts one box header earlier
    assert_eq!(&data[cmt1.file_offset as usize - 4..][..4], b"CMT1");
    assert_eq!(cmt1.length, 16);
    assert_eq!(cmt1.image_kind, ImageKind::Cr3);
    assert!(scan.moov.meta.cmt[1].is_none());
    assert_eq!(scan.moov.meta.cmt[2].unwrap().byte_order, ByteOrder::BigEndian);
    assert_eq!(scan.moov.meta.exif_headers().count(), 2);
}

// ============================================================================
// Reader and box invariants
// ============================================================================

#[test]
fn parsed_boxes_advance_by_their_size() {
    let data = heic(true);
    let mut src = Source::from_slice(&data);
    let mut iter = BoxIter::new(&mut src);

    let mut ftyp = iter.next_box().unwrap().unwrap();
    let (start, size) = (ftyp.head.start, ftyp.head.size);
    read_ftyp(&mut ftyp).unwrap();
    ftyp.close().unwrap();

    let mut meta = iter.next_box().unwrap().unwrap();
    assert_eq!(meta.head.start, start + size);
    let (start, size) = (meta.head.start, meta.head.size);
    let parsed = read_meta(&mut meta, &ScanConfig::default()).unwrap();
    assert_eq!(meta.bytes_left(), 0);
    meta.close().unwrap();
    assert_eq!(parsed.item_info.items.len(), 2);

    let mdat = iter.next_box().unwrap().unwrap();
    assert_eq!(mdat.head.start, start + size);
    mdat.close().unwrap();
    assert!(iter.next_box().unwrap().is_none());
    drop(iter);
    assert_eq!(src.offset(), data.len() as u64);
}

#[test]
fn container_size_is_header_plus_children() {
    let data = heic(true);
    let mut src = Source::from_slice(&data);
    let mut top = 0;
    let mut iter = BoxIter::new(&mut src);
    while let Some(mut b) = iter.next_box().unwrap() {
        top += b.head.size;
        if b.head.name == BoxType::MetadataBox {
            b.skip(4).unwrap();
            let (size, header) = (b.head.size, b.head.offset);
            let mut children = 0;
            let mut inner = b.box_iter();
            while let Some(child) = inner.next_box().unwrap() {
                children += child.head.size;
                child.close().unwrap();
            }
            assert_eq!(header + 4 + children, size);
        }
        b.close().unwrap();
    }
    assert_eq!(top, data.len() as u64);
}

#[test]
fn peek_leaves_the_cursor_alone() {
    let data: Vec<u8> = (0..=255).collect();
    let mut src = Source::with_len(Trickle(&data), data.len() as u64);
    src.discard(10).unwrap();
    for n in [0, 1, 7, 64, 246] {
        assert_eq!(src.peek(n).unwrap(), &data[10..10 + n]);
        assert_eq!((src.offset(), src.remain()), (10, 246));
    }
    assert!(matches!(src.peek(247), Err(Error::ShortBuffer)));
    assert_eq!((src.offset(), src.remain()), (10, 246));

    let mut bounded = Bounded::new(&mut src, 5);
    assert!(matches!(bounded.peek(6), Err(Error::ShortBuffer)));
    assert_eq!(bounded.peek(5).unwrap(), &data[10..15]);
    assert_eq!((bounded.offset(), bounded.remain()), (10, 5));
}

#[test]
fn discard_moves_cursor_and_budget_together() {
    let data: Vec<u8> = (0..200).map(|i| i as u8).collect();
    let mut src = Source::with_len(Trickle(&data), data.len() as u64);
    let mut offset = 0;
    for n in [0, 1, 2, 13, 100, 84] {
        let remain = src.remain();
        assert_eq!(src.discard(n).unwrap(), n);
        offset += n;
        assert_eq!(src.remain(), remain - n);
        assert_eq!(src.offset(), offset);
    }
    assert_eq!(src.remain(), 0);
    assert!(src.is_ok());

    let mut src = Source::from_slice(&data);
    let mut bounded = Bounded::new(&mut src, 50);
    bounded.skip(20).unwrap();
    assert_eq!((bounded.offset(), bounded.remain()), (20, 30));
    assert!(matches!(bounded.skip(31), Err(Error::ShortBuffer)));
    assert_eq!(bounded.drain().unwrap(), 30);
    assert_eq!((src.offset(), src.remain()), (50, 150));
}

#[test]
fn jpeg_exif_lies_inside_the_file() {
    let mut nested = vec![0xff, 0xd8];
    nested.extend_from_slice(&segment(0xe0, b"JFIF\0\x01\x02\0\0\x01\0\x01\0\0"));
    // garbage and fill bytes between markers
    nested.extend_from_slice(&[0x00, 0x17, 0xff, 0xff]);
    nested.extend_from_slice(&segment(0xe1, b"Exif\0\0MM\0*\0\0\0\x08\0\x01\0\0"));
    nested.extend_from_slice(&[0xff, 0xd8, 0xff, 0xd9]);
    nested.extend_from_slice(&[0xff, 0xd9]);

    for data in [jpeg_s1(), jpeg_s2(), nested] {
        let scan = zenmeta_parse::scan_jpeg(&mut Source::from_slice(&data), |_, _| Ok(()), |_, _| Ok(())).unwrap();
        let exif = scan.exif_header().unwrap();
        let start = exif.file_offset as usize;
        assert!(start + exif.length as usize <= data.len());
        assert!(matches!(&data[start..start + 2], b"II" | b"MM"));
    }
}

#[test]
fn sniffing_is_repeatable() {
    let samples: [&[u8]; 10] = [
        &[0xff, 0xd8, 0xff, 0xe0],
        b"\0\0\0\x18ftypheic\0\0\0\0mif1heic",
        b"\0\0\0\x18ftypcrx \0\0\0\x01crx isom",
        b"\0\0\0\x1cftypavif\0\0\0\0avifmif1miaf",
        b"II*\0\x10\0\0\0CR\x02\0",
        b"MM\0*\0\0\0\x08",
        b"\x89PNG\r\n\x1a\n",
        b"RIFF\0\0\0\0WEBPVP8X",
        b"<x:xmpmeta xmlns:x='adobe:ns:meta/'>",
        b"plain text",
    ];
    let expected = [
        ImageKind::Jpeg,
        ImageKind::Heif,
        ImageKind::Cr3,
        ImageKind::Avif,
        ImageKind::Cr2,
        ImageKind::Tiff,
        ImageKind::Png,
        ImageKind::WebP,
        ImageKind::Xmp,
        ImageKind::Unknown,
    ];
    for (prefix, kind) in samples.iter().zip(expected) {
        let mut src = Source::from_slice(prefix);
        let first = sniff(&mut src).unwrap();
        let second = sniff(&mut src).unwrap();
        assert_eq!(first, kind);
        assert_eq!(first, second);
        assert_eq!(src.offset(), 0);
        assert_eq!(sniff(&mut Source::new(Trickle(prefix))).unwrap(), kind);
    }
}

#[test]
fn xmp_fields_round_trip() {
    let cases: [(&str, fn(&Xmp) -> bool); 7] = [
        ("tiff:Orientation=\"6\"", |x| x.tiff.orientation == Some(6)),
        ("exif:PixelXDimension=\"4000\"", |x| x.exif.pixel_x_dimension == Some(4000)),
        ("exif:FocalLength=\"50/1\"", |x| x.exif.focal_length.and_then(|r| r.to_f64()) == Some(50.0)),
        ("xmp:Rating=\"-1\"", |x| x.basic.rating == Some(-1)),
        ("crs:Temperature=\"5200\"", |x| x.crs.temperature == Some(5200)),
        ("crs:AlreadyApplied=\"true\"", |x| x.crs.already_applied == Some(true)),
        ("aux:SerialNumber=\"0123\"", |x| x.aux.serial_number.as_deref() == Some(&b"0123"[..])),
    ];
    for (attribute, check) in cases {
        let packet = xmp_packet(&format!("<rdf:Description rdf:about=\"\" {attribute}/>"));
        let xmp = zenmeta_parse::parse_xmp(&mut Source::from_slice(&packet)).unwrap();
        assert!(check(&xmp), "{attribute}");
    }

    let element = xmp_packet("<rdf:Description><tiff:Make>FUJIFILM</tiff:Make></rdf:Description>");
    let xmp = zenmeta_parse::parse_xmp(&mut Source::from_slice(&element)).unwrap();
    assert_eq!(xmp.tiff.make.as_deref(), Some(&b"FUJIFILM"[..]));

    let empty = format!("{:?}", Xmp::default());
    let unknown = xmp_packet(
        "<rdf:Description photoshop:City=\"Oslo\" tiff:Flavour=\"7\" exif:Secret=\"1\">\
         <lr:hierarchicalSubject>a|b</lr:hierarchicalSubject></rdf:Description>",
    );
    let xmp = zenmeta_parse::parse_xmp(&mut Source::from_slice(&unknown)).unwrap();
    assert_eq!(format!("{xmp:?}"), empty);
}

#[test]
fn heif_exif_item_offset() {
    let data = heic(true);
    let mut lengths = Vec::new();
    let mut src = Source::from_slice(&data);
    let heif = zenmeta_parse::bmff::scan_heif_with(&mut src, &ScanConfig::default(), &Unstoppable, |r, h| {
        lengths.push((r.remain(), h.length));
        Ok(())
    })
    .unwrap();
    let item = heif.meta.exif_item().unwrap();
    assert_eq!(item.item_id, 2);
    let extent = heif.meta.item_location(2).unwrap().extent;

    let exif = heif.exif.unwrap();
    // 4-byte skew field, then the 6 skipped bytes
    assert_eq!(u64::from(exif.file_offset), extent.offset + 4 + 6);
    assert!(u64::from(exif.length) <= extent.length);
    assert_eq!(exif.byte_order, ByteOrder::BigEndian);
    assert_eq!(exif.image_kind, ImageKind::Heif);
    assert_eq!(&data[exif.file_offset as usize..][..4], b"MM\0*");
    assert_eq!(lengths, [(10u64, 10u32)]);
}

// ============================================================================
// scan() per container
// ============================================================================

#[test]
fn scan_jpeg_with_xmp() {
    let packet = xmp_packet("<rdf:Description xmp:CreatorTool=\"darktable\" xmp:Rating=\"3\"/>");
    let mut app1 = XMP_ID.to_vec();
    app1.extend_from_slice(&packet);
    let mut data = jpeg_s2();
    data.truncate(data.len() - 2);
    data.extend_from_slice(&segment(0xe1, &app1));
    data.extend_from_slice(&[0xff, 0xd9]);

    let md = scan(&mut Source::new(BufReader::new(&data[..]))).unwrap();
    assert_eq!(md.kind, ImageKind::Jpeg);
    assert_eq!((md.width, md.height), (50, 50));
    assert_eq!(md.exif_header().unwrap().file_offset, 31);
    let header = md.xmp_header.unwrap();
    assert_eq!(&data[header.file_offset as usize..][..header.length as usize], &packet[..]);
    let xmp = md.xmp.unwrap();
    assert_eq!(xmp.basic.creator_tool.as_deref(), Some(&b"darktable"[..]));
    assert_eq!(xmp.basic.rating, Some(3));
}

#[test]
fn scan_heic() {
    let data = heic(true);
    let md = scan(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(md.kind, ImageKind::Heif);
    assert_eq!((md.width, md.height), (640, 480));
    assert_eq!(md.exif.len(), 1);
    assert_eq!(md.exif_header().unwrap().image_kind, ImageKind::Heif);
    assert!(md.heif.is_some());
}

#[test]
fn scan_cr3_with_xmp_uuid() {
    let packet = xmp_packet("<rdf:Description tiff:Model=\"Canon EOS R6\"/>");
    let data = cr3(&packet);
    let md = scan(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(md.kind, ImageKind::Cr3);
    let offsets: Vec<u32> = md.exif.iter().map(|e| e.file_offset).collect();
    assert_eq!(offsets.len(), 2);
    assert!(offsets[0] < offsets[1]);
    let header = md.xmp_header.unwrap();
    assert_eq!(header.length as usize, packet.len());
    assert_eq!(md.xmp.unwrap().tiff.model.as_deref(), Some(&b"Canon EOS R6"[..]));
}

#[test]
fn scan_tiff_raws() {
    let mut data = b"II*\0\x10\0\0\0CR\x02\0".to_vec();
    data.extend_from_slice(&[0; 20]);
    let md = scan(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(md.kind, ImageKind::Cr2);
    let exif = md.exif_header().unwrap();
    assert_eq!((exif.file_offset, exif.first_ifd_offset), (0, 16));
    assert_eq!(exif.length as usize, data.len());

    // length unknown without a size hint
    let md = scan(&mut Source::new(&b"MM\0*\0\0\0\x08\0\0"[..])).unwrap();
    assert_eq!(md.kind, ImageKind::Tiff);
    assert_eq!(md.exif_header().unwrap().length, 0);
}

#[test]
fn scan_png() {
    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&[0; 4]);
    }
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    chunk(&mut data, b"IHDR", &[0, 0, 0, 64, 0, 0, 0, 48, 8, 6, 0, 0, 0]);
    chunk(&mut data, b"eXIf", b"II*\0\x08\0\0\0\0\0");
    let mut itxt = b"XML:com.adobe.xmp\0\0\0\0\0".to_vec();
    itxt.extend_from_slice(&xmp_packet("<rdf:Description dc:format=\"image/png\"/>"));
    chunk(&mut data, b"iTXt", &itxt);
    chunk(&mut data, b"IEND", &[]);

    let md = scan(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(md.kind, ImageKind::Png);
    assert_eq!((md.width, md.height), (64, 48));
    assert_eq!(md.exif_header().unwrap().file_offset, 8 + 25 + 8);
    assert_eq!(md.xmp.unwrap().dc.format.as_deref(), Some(&b"image/png"[..]));
}

#[test]
fn scan_webp() {
    let mut body = b"WEBP".to_vec();
    for (kind, payload) in [
        (b"VP8X", &[0x2c, 0, 0, 0, 0x7f, 0x07, 0, 0x37, 0x04, 0][..]),
        (b"EXIF", &b"MM\0*\0\0\0\x08\0\0\0"[..]),
        (b"XMP ", &xmp_packet("<rdf:Description exif:ColorSpace=\"1\"/>")[..]),
    ] {
        body.extend_from_slice(kind);
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            body.push(0);
        }
    }
    let mut data = b"RIFF".to_vec();
    data.extend_from_slice(&(body.len() as u32).to_le_bytes());
    data.extend_from_slice(&body);

    let md = scan(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(md.kind, ImageKind::WebP);
    assert_eq!((md.width, md.height), (1920, 1080));
    let exif = md.exif_header().unwrap();
    assert_eq!(&data[exif.file_offset as usize..][..4], b"MM\0*");
    assert_eq!(exif.length, 11);
    assert_eq!(md.xmp.unwrap().exif.color_space, Some(1));
}

#[test]
fn scan_raf_preview() {
    let mut data = b"FUJIFILMCCD-RAW 0201FF383501".to_vec();
    data.resize(84, 0);
    let preview = jpeg_s1();
    data.extend_from_slice(&100u32.to_be_bytes());
    data.extend_from_slice(&(preview.len() as u32).to_be_bytes());
    data.resize(100, 0);
    data.extend_from_slice(&preview);

    let md = scan(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(md.kind, ImageKind::Raf);
    let exif = md.exif_header().unwrap();
    assert_eq!(exif.file_offset, 112);
    assert_eq!(exif.image_kind, ImageKind::Raf);
}

#[test]
fn scan_xmp_sidecar() {
    let packet = xmp_packet(
        "<rdf:Description>\
         <dc:creator><rdf:Seq><rdf:li>Ana</rdf:li><rdf:li>Bo</rdf:li></rdf:Seq></dc:creator>\
         <exif:DateTimeOriginal>2019-11-02T08:15:00</exif:DateTimeOriginal>\
         </rdf:Description>",
    );
    let md = scan(&mut Source::from_slice(&packet)).unwrap();
    assert_eq!(md.kind, ImageKind::Xmp);
    assert!(md.exif.is_empty());
    let xmp = md.xmp.unwrap();
    assert_eq!(xmp.dc.creator.len(), 2);
    assert_eq!(&xmp.dc.creator[1][..], b"Bo");
    let taken = xmp.exif.date_time_original.unwrap();
    assert_eq!((taken.year, taken.hour, taken.minute), (2019, 8, 15));
}

#[test]
fn scan_limits_and_cancellation() {
    struct ImmediatelyCancelled;
    impl zenmeta_parse::Stop for ImmediatelyCancelled {
        fn check(&self) -> std::result::Result<(), zenmeta_parse::StopReason> {
            Err(zenmeta_parse::StopReason::Cancelled)
        }
    }

    let data = jpeg_s2();
    let result = scan_with_config(&mut Source::from_slice(&data), &ScanConfig::default(), &ImmediatelyCancelled);
    match result {
        Err(Error::Stopped(reason)) => assert_eq!(reason, zenmeta_parse::StopReason::Cancelled),
        other => panic!("expected Stopped, got {other:?}"),
    }

    let data = heic(true);
    let config = ScanConfig::default().with_max_items(1);
    let md = scan_with_config(&mut Source::from_slice(&data), &config, &Unstoppable).unwrap();
    // iinf and iloc are over the limit and dropped, so no Exif item is known
    assert!(md.exif.is_empty());

    // the walk budget ends before the Exif segment
    let config = ScanConfig::default().with_max_jpeg_scan_bytes(16);
    let md = scan_with_config(&mut Source::from_slice(&jpeg_s2()), &config, &Unstoppable).unwrap();
    assert!(matches!(md.exif_header(), Err(Error::NoExif)));
    assert_eq!(md.width, 50);
}

#[test]
fn scan_rejects_what_it_cannot_read() {
    assert!(matches!(scan(&mut Source::from_slice(b"GIF89a\x10\0\x10\0")), Err(Error::Unsupported(_))));
    assert!(matches!(scan(&mut Source::from_slice(b"")), Err(Error::Unsupported(_))));

    let data = bx(b"ftyp", b"zzzz\0\0\0\0isom");
    let header = read_box_header(&mut Source::from_slice(&data)).unwrap();
    assert_eq!(header.size, data.len() as u64);
    assert_eq!(sniff(&mut Source::from_slice(&data)).unwrap(), ImageKind::Mp4);
    assert!(scan(&mut Source::from_slice(&data)).is_err());
}

// ============================================================================
// Local sample files
// ============================================================================

/// Scans every file under `$ZENMETA_SAMPLES`, if set. Every file must either
/// scan or be reported as unsupported.
#[test]
fn sample_images() {
    let Some(dir) = std::env::var_os("ZENMETA_SAMPLES") else {
        return;
    };
    let _ = env_logger::builder().is_test(true).filter_level(log::LevelFilter::max()).try_init();
    let mut errors = 0;

    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.expect("sample entry");
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        log::debug!("scanning {:?}", path.display());
        let file = File::open(path).expect("bad file");
        let len = file.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
        match scan(&mut Source::with_len(BufReader::new(file), len)) {
            Ok(md) => {
                for exif in &md.exif {
                    assert!(exif.is_valid(), "{:?}: {exif:?}", path.display());
                    if len != u64::MAX {
                        assert!(u64::from(exif.file_offset) + u64::from(exif.length) <= len);
                    }
                }
            },
            Err(Error::Unsupported(why)) => log::warn!("{:?}: {why}", path.display()),
            Err(err) => {
                log::error!("{:?}: {err}", path.display());
                errors += 1;
            },
        }
    }
    assert_eq!(0, errors);
}
