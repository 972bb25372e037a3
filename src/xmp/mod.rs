// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XMP packet location and decoding.
//!
//! [`parse_xmp`] finds the `<x:xmpmeta` root in a stream, buffers the packet
//! (within a byte budget) and routes every recognised property into the
//! per-namespace records of [`Xmp`]. Properties outside the vocabulary in
//! [`names`] are skipped, and so are values that fail to parse.

use arrayvec::ArrayVec;
use log::{debug, trace};

use crate::reader::{Peek, PeekExt};
use crate::{Error, Result, ToU64};

pub mod names;
pub mod records;
pub mod tokenizer;
pub mod values;

pub use names::{Name, Namespace, Property};
pub use records::{Aux, Basic, Crs, DublinCore, Exif, Flash, MediaManagement, Tiff};
pub use values::{DateTime, Rational, Uuid};

use tokenizer::{TagKind, Tokenizer};

const ROOT_TAG: &[u8] = b"<x:xmpmeta";

/// Window searched for the root tag per step.
const ROOT_WINDOW: usize = 18;

/// Bytes dropped after a window without the root tag. Smaller than
/// `ROOT_WINDOW - ROOT_TAG.len()`, so a tag straddling windows is seen.
const ROOT_STEP: u64 = 8;

/// Packet budget used by [`parse_xmp`].
pub const DEFAULT_MAX_XMP_BYTES: u64 = 4 * 1024 * 1024;

/// Nesting depth tracked for parent routing; deeper elements are still
/// balanced but their values are dropped.
const MAX_DEPTH: usize = 32;

/// Everything decoded from one XMP packet.
#[derive(Debug, Default)]
pub struct Xmp {
    pub basic: Basic,
    pub exif: Exif,
    pub tiff: Tiff,
    pub aux: Aux,
    pub crs: Crs,
    pub dc: DublinCore,
    pub mm: MediaManagement,
}

impl Xmp {
    /// Store one property value; unknown properties and bad values are dropped.
    fn route(&mut self, property: Property, value: &[u8]) -> Result<()> {
        let name = property.name;
        let stored = match property.namespace {
            Namespace::Xmp => self.basic.set(name, value),
            Namespace::Exif | Namespace::ExifEx => self.exif.set(name, value),
            Namespace::Tiff => self.tiff.set(name, value),
            Namespace::Aux => self.aux.set(name, value),
            Namespace::Crs => self.crs.set(name, value),
            Namespace::Dc => self.dc.set(name, value),
            Namespace::XmpMM => self.mm.set(name, value),
            _ => Err(Error::PropertyNotSet),
        };
        match stored {
            Ok(()) => trace!("{property} set"),
            Err(Error::PropertyNotSet) => {},
            Err(e @ Error::OutOfMemory) => return Err(e),
            Err(e) => debug!("{property}: {e}"),
        }
        Ok(())
    }
}

/// Position the stream at the `<` of the root tag.
fn find_root<P: Peek + ?Sized>(src: &mut P) -> Result<()> {
    loop {
        let window = src.fill_buf(ROOT_WINDOW)?;
        if let Some(at) = window.windows(ROOT_TAG.len()).position(|w| w == ROOT_TAG) {
            src.discard(at.to_u64())?;
            return Ok(());
        }
        if window.len() < ROOT_WINDOW {
            return Err(Error::NoXmp);
        }
        src.discard(ROOT_STEP)?;
    }
}

/// Decode the XMP packet at or after the current position, reading at
/// most [`DEFAULT_MAX_XMP_BYTES`] of it.
pub fn parse_xmp<P: Peek + ?Sized>(src: &mut P) -> Result<Xmp> {
    parse_xmp_with_limit(src, Some(DEFAULT_MAX_XMP_BYTES))
}

/// As [`parse_xmp`], with an explicit packet budget. A packet longer than
/// the budget is decoded up to the cut.
pub fn parse_xmp_with_limit<P: Peek + ?Sized>(src: &mut P, max_bytes: Option<u64>) -> Result<Xmp> {
    find_root(src)?;
    let start = src.offset();
    let packet = src.read_up_to(max_bytes.unwrap_or(u64::MAX))?;
    debug!("XMP packet of {} bytes at offset {start}", packet.len());
    decode(&packet)
}

/// Decode a packet that begins at (or before) its root tag. Malformed or
/// truncated markup ends decoding; what was decoded up to there is kept.
pub fn decode(packet: &[u8]) -> Result<Xmp> {
    let mut xmp = Xmp::default();
    match walk(packet, &mut xmp) {
        Ok(()) => {},
        Err(e @ Error::OutOfMemory) => return Err(e),
        Err(e) => debug!("XMP decoding stopped early: {e}"),
    }
    Ok(xmp)
}

fn walk(packet: &[u8], xmp: &mut Xmp) -> Result<()> {
    let mut tok = Tokenizer::new(packet);
    let mut open: ArrayVec<Property, MAX_DEPTH> = ArrayVec::new();
    let mut overflow = 0usize;

    loop {
        let parent = open.last().copied().unwrap_or_default();
        let Some(mut tag) = tok.read_tag_header(parent)? else {
            break;
        };
        match tag.kind {
            TagKind::Eof => break,
            TagKind::Stop => {
                if overflow > 0 {
                    overflow -= 1;
                } else {
                    open.pop();
                }
                if tag.property == Property::ROOT {
                    break;
                }
            },
            TagKind::Start | TagKind::Solo => {
                while let Some(attr) = tok.read_attribute(&mut tag)? {
                    xmp.route(attr.property, attr.value)?;
                }
                if tag.kind == TagKind::Solo {
                    continue;
                }
                if overflow > 0 || open.try_push(tag.property).is_err() {
                    overflow += 1;
                    continue;
                }
                let value = tok.read_tag_value();
                if !value.is_empty() {
                    let target = open.iter().rev().copied().find(|p| !p.is_transparent()).unwrap_or_default();
                    xmp.route(target, value)?;
                }
            },
        }
    }
    Ok(())
}
