//! Print where the Exif and XMP of an image file live
use std::borrow::Cow;
use std::env;
use std::fs::File;
use std::io::BufReader;

use zenmeta_parse::{scan, Source, TryString};

fn text(value: &Option<TryString>) -> Option<Cow<'_, str>> {
    value.as_deref().map(String::from_utf8_lossy)
}

fn main() {
    env_logger::init();

    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <image-file>", args[0]);
        std::process::exit(1);
    }

    let file = File::open(&args[1]).expect("Failed to open file");
    let len = file.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
    let md = match scan(&mut Source::with_len(BufReader::new(file), len)) {
        Ok(md) => md,
        Err(e) => {
            eprintln!("{}: {e}", args[1]);
            std::process::exit(1);
        },
    };

    println!("{}: {}", args[1], md.kind);
    if md.width != 0 || md.height != 0 {
        println!("  size: {}x{}", md.width, md.height);
    }
    for exif in &md.exif {
        println!(
            "  Exif: {:?}, IFD0 at +{}, {} bytes at offset {}",
            exif.byte_order, exif.first_ifd_offset, exif.length, exif.file_offset
        );
    }
    if md.exif.is_empty() {
        println!("  no Exif");
    }
    if let Some(xmp) = md.xmp_header {
        println!("  XMP: {} bytes at offset {}", xmp.length, xmp.file_offset);
    }

    if let Some(heif) = &md.heif {
        let meta = &heif.meta;
        println!("  items: {}, primary: {:?}", meta.item_info.items.len(), meta.primary_item_id());
        if meta.primary_rotation() != 0 {
            println!("  rotation: {}", meta.primary_rotation());
        }
    }
    if let Some(cr3) = &md.cr3 {
        if let Some(thmb) = cr3.moov.meta.thmb {
            println!("  thumbnail: {}x{}, {} bytes at offset {}", thmb.width, thmb.height, thmb.size, thmb.offset);
        }
    }

    if let Some(xmp) = &md.xmp {
        if let Some(make) = text(&xmp.tiff.make) {
            println!("  camera: {make} {}", text(&xmp.tiff.model).unwrap_or_default());
        }
        if let Some(lens) = text(&xmp.aux.lens) {
            println!("  lens: {lens}");
        }
        if let Some(date) = xmp.exif.date_time_original.or(xmp.basic.create_date) {
            println!(
                "  taken: {:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                date.year, date.month, date.day, date.hour, date.minute, date.second
            );
        }
        if let Some(iso) = xmp.exif.iso_speed {
            println!("  ISO {iso}");
        }
        if let Some(rating) = xmp.basic.rating {
            println!("  rating: {rating}");
        }
        for keyword in xmp.dc.subject.iter() {
            println!("  keyword: {}", String::from_utf8_lossy(keyword));
        }
    }
}
