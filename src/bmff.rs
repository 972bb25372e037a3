// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ISO-BMFF box framing and the HEIF/AVIF `meta` parsers.
//!
//! Boxes are read strictly front to back. Each box is a [`Bounded`] view of
//! its parent, so consuming a child also consumes the parent's budget, and
//! [`BmffBox::close`] realigns the parent at the next sibling whatever the
//! child's parser did.

use arrayvec::ArrayVec;
use bitreader::BitReader;
use byteorder::{BigEndian, ByteOrder as _};
use enough::{Stop, Unstoppable};
use log::{debug, trace, warn};

use crate::boxes::{BoxType, Brand, FourCC, HandlerType, ItemType};
use crate::exif::ExifHeader;
use crate::reader::{Bounded, Flags, MAX_PEEK, Peek, PeekExt as _};
use crate::{Error, ImageKind, Result, ScanConfig, ToU64, ToUsize, TryString, TryVec};

/// Largest box size accepted: sizes must fit a signed 64-bit file offset.
const MAX_BOX_SIZE: u64 = i64::MAX as u64;

/// Basic ISO box structure.
///
/// See ISO 14496-12:2015 § 4.2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub name: BoxType,
    /// Size of the box in bytes, header included; [`BoxHeader::TO_END`] for a
    /// box that extends to the end of its parent.
    pub size: u64,
    /// Header bytes consumed (8, 16, plus 16 for an extended `uuid` type).
    pub offset: u64,
    /// Stream offset of the first header byte.
    pub start: u64,
    /// Extended type of a `uuid` box.
    pub uuid: Option<[u8; 16]>,
}

impl BoxHeader {
    /// 4-byte size + 4-byte type
    const MIN_SIZE: u64 = 8;
    /// 4-byte size + 4-byte type + 8-byte size
    const MIN_LARGE_SIZE: u64 = 16;
    /// Size recorded for a box whose header size field is 0.
    pub const TO_END: u64 = u64::MAX;

    pub fn is_to_end(&self) -> bool {
        self.size == Self::TO_END
    }

    /// Stream offset of the first content byte.
    pub fn content_start(&self) -> u64 {
        self.start + self.offset
    }
}

/// Read and parse a box header, leaving the source at the box content.
///
/// See ISO 14496-12:2015 § 4.2
pub fn read_box_header<P: Peek + ?Sized>(src: &mut P) -> Result<BoxHeader> {
    let start = src.offset();
    let (size32, name) = src.read_with(8, |b| {
        (BigEndian::read_u32(&b[..4]), BoxType::from(BigEndian::read_u32(&b[4..8])))
    })?;
    let (size, mut offset) = match size32 {
        // only valid for the last box of its parent, usually mdat
        0 => (BoxHeader::TO_END, BoxHeader::MIN_SIZE),
        1 => {
            let size64 = src.read_u64()?;
            if size64 > MAX_BOX_SIZE {
                return Err(Error::UnexpectedlyLargeBox);
            }
            if size64 < BoxHeader::MIN_LARGE_SIZE {
                return Err(Error::InvalidData("malformed wide size"));
            }
            (size64, BoxHeader::MIN_LARGE_SIZE)
        },
        _ if u64::from(size32) < BoxHeader::MIN_SIZE => return Err(Error::InvalidData("malformed size")),
        _ => (u64::from(size32), BoxHeader::MIN_SIZE),
    };
    let uuid = if name == BoxType::UuidBox && size >= offset + 16 {
        offset += 16;
        Some(src.read_array::<16>()?)
    } else {
        None
    };
    Ok(BoxHeader { name, size, offset, start, uuid })
}

/// A box whose header has been read; reading it yields the content.
pub struct BmffBox<'a, P: Peek + ?Sized> {
    pub head: BoxHeader,
    content: Bounded<'a, P>,
}

impl<P: Peek + ?Sized> BmffBox<'_, P> {
    pub fn bytes_left(&self) -> u64 {
        self.content.remain()
    }

    pub fn box_iter(&mut self) -> BoxIter<'_, Self> {
        BoxIter::new(self)
    }

    /// Fail with [`Error::WrongBoxType`] unless this is a `name` box.
    pub fn expect_type(&self, name: BoxType) -> Result<()> {
        if self.head.name == name {
            Ok(())
        } else {
            Err(Error::WrongBoxType(self.head.name))
        }
    }

    /// Run a content parser, absorbing its failure unless it left the stream unusable.
    ///
    /// A recoverable failure is logged and yields `None`; the caller then closes
    /// the box and moves on to the next sibling.
    pub fn parse<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        match f(self) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_fatal() || !self.is_ok() => Err(e),
            Err(e) => {
                debug!("skipping {:?} at {}: {e}", self.head.name, self.head.start);
                Ok(None)
            },
        }
    }

    /// Skip whatever the parser left unread, leaving the parent at the next sibling.
    pub fn close(mut self) -> Result<()> {
        if self.head.is_to_end() {
            skip_to_end(&mut self.content)?;
            return Ok(());
        }
        let left = self.content.remain();
        if left > 0 {
            trace!("skipping {left} bytes in {:?}", self.head.name);
        }
        self.content.drain()?;
        Ok(())
    }
}

impl<P: Peek + ?Sized> Peek for BmffBox<'_, P> {
    fn peek(&mut self, n: usize) -> Result<&[u8]> {
        self.content.peek(n)
    }

    fn fill_buf(&mut self, max: usize) -> Result<&[u8]> {
        self.content.fill_buf(max)
    }

    fn discard(&mut self, n: u64) -> Result<u64> {
        self.content.discard(n)
    }

    fn remain(&self) -> u64 {
        self.content.remain()
    }

    fn offset(&self) -> u64 {
        self.content.offset()
    }

    fn is_ok(&self) -> bool {
        self.content.is_ok()
    }
}

/// Consume a region of unknown length until the stream ends.
fn skip_to_end<P: Peek + ?Sized>(src: &mut P) -> Result<u64> {
    let mut total = 0;
    loop {
        let n = src.fill_buf(MAX_PEEK)?.len();
        if n == 0 {
            return Ok(total);
        }
        src.discard(n.to_u64())?;
        total += n.to_u64();
    }
}

/// Sequential access to the boxes of a parent region.
pub struct BoxIter<'a, P: Peek + ?Sized> {
    src: &'a mut P,
    terminal: bool,
}

impl<'a, P: Peek + ?Sized> BoxIter<'a, P> {
    pub fn new(src: &'a mut P) -> Self {
        Self { src, terminal: false }
    }

    /// The next box, or `None` once the parent is exhausted.
    ///
    /// After a size-0 box has been handed out there can be no further box,
    /// and this fails with [`Error::NoMoreBoxes`].
    pub fn next_box(&mut self) -> Result<Option<BmffBox<'_, P>>> {
        if self.terminal {
            return Err(Error::NoMoreBoxes);
        }
        match self.src.fill_buf(8)?.len() {
            0 => return Ok(None),
            n if n < 8 => {
                debug!("{n} trailing bytes at {} are too short for a box", self.src.offset());
                return Ok(None);
            },
            _ => {},
        }
        let head = read_box_header(self.src)?;
        let limit = if head.is_to_end() {
            self.terminal = true;
            self.src.remain()
        } else {
            head.size - head.offset
        };
        if limit > self.src.remain() {
            debug!("{:?} at {} runs {} bytes past its parent", head.name, head.start, limit - self.src.remain());
        }
        trace!("{head:?}");
        Ok(Some(BmffBox {
            head,
            content: Bounded::new(self.src, limit),
        }))
    }
}

/// File type box 'ftyp'.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeBox {
    pub major_brand: FourCC,
    pub minor_version: [u8; 4],
    /// The first six compatible brands.
    pub compatible_brands: ArrayVec<FourCC, 6>,
}

impl FileTypeBox {
    /// The major brand, or [`Error::BrandNotSupported`] if it is not one we know.
    pub fn brand(&self) -> Result<Brand> {
        let brand = Brand::from_bytes(&self.major_brand.value);
        if brand.is_unknown() {
            Err(Error::BrandNotSupported(self.major_brand))
        } else {
            Ok(brand)
        }
    }

    /// Recognised compatible brands.
    pub fn compatible(&self) -> impl Iterator<Item = Brand> + '_ {
        self.compatible_brands
            .iter()
            .map(|b| Brand::from_bytes(&b.value))
            .filter(|b| !b.is_unknown())
    }

    /// Whether `brand` is the major or one of the compatible brands.
    pub fn is_compatible_with(&self, brand: Brand) -> bool {
        self.major_brand == brand.as_bytes() || self.compatible().any(|b| b == brand)
    }
}

/// Parse an ftyp box.
/// See ISO 14496-12:2015 § 4.3
pub fn read_ftyp<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<FileTypeBox> {
    src.expect_type(BoxType::FileTypeBox)?;
    let major_brand = src.read_four_cc()?;
    let minor_version = src.read_array::<4>()?;
    let mut compatible_brands = ArrayVec::new();
    while src.bytes_left() >= 4 && !compatible_brands.is_full() {
        compatible_brands.push(src.read_four_cc()?);
    }
    Ok(FileTypeBox {
        major_brand,
        minor_version,
        compatible_brands,
    })
}

/// Handler reference box 'hdlr'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerBox {
    pub flags: Flags,
    pub handler_type: HandlerType,
}

pub fn read_hdlr<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<HandlerBox> {
    src.expect_type(BoxType::HandlerBox)?;
    // version/flags, pre_defined, handler_type
    let buf = src.peek(12)?;
    let flags = Flags(BigEndian::read_u32(&buf[..4]));
    let code = [buf[8], buf[9], buf[10], buf[11]];
    let handler_type = HandlerType::from_bytes(&code);
    if handler_type.is_unknown() {
        return Err(Error::HandlerTypeUnknown(FourCC::from(code)));
    }
    Ok(HandlerBox { flags, handler_type })
}

/// Primary item box 'pitm'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryItemBox {
    pub item_id: u32,
    pub flags: Flags,
}

/// See ISO 14496-12:2015 § 8.11.4
pub fn read_pitm<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<PrimaryItemBox> {
    src.expect_type(BoxType::PrimaryItemBox)?;
    let flags = src.read_flags()?;
    let item_id = match flags.version() {
        0 => u32::from(src.read_u16()?),
        1 => src.read_u32()?,
        _ => return Err(Error::Unsupported("unsupported pitm version")),
    };
    Ok(PrimaryItemBox { item_id, flags })
}

/// Used for 'infe' boxes within 'iinf' boxes.
/// Only version 2 is parsed.
#[derive(Debug)]
pub struct ItemInfoEntry {
    pub item_id: u32,
    pub protection_index: u16,
    pub item_type: ItemType,
    pub flags: Flags,
    pub name: TryString,
    /// MIME type of a `mime` item.
    pub content_type: Option<TryString>,
    /// URI type of a `uri ` item.
    pub uri_type: Option<TryString>,
}

/// Item information box 'iinf'
#[derive(Debug)]
pub struct ItemInfoBox {
    pub flags: Flags,
    pub items: TryVec<ItemInfoEntry>,
    /// Entries left out of `items` because their version is not supported.
    pub skipped: u32,
}

impl Default for ItemInfoBox {
    fn default() -> Self {
        Self {
            flags: Flags::default(),
            items: TryVec::new(),
            skipped: 0,
        }
    }
}

/// See ISO 14496-12:2015 § 8.11.6
pub fn read_iinf<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>, config: &ScanConfig) -> Result<ItemInfoBox> {
    src.expect_type(BoxType::ItemInfoBox)?;
    let flags = src.read_flags()?;
    let entry_count = match flags.version() {
        0 => u32::from(src.read_u16()?),
        _ => src.read_u32()?,
    };
    config.check_items(entry_count, "iinf entry count")?;
    let mut items = TryVec::with_capacity(entry_count.to_usize())?;
    let mut skipped = 0;

    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        if b.head.name == BoxType::ItemInfoEntry {
            match read_infe(&mut b) {
                Ok(entry) => items.push(entry)?,
                Err(Error::InfeVersionNotSupported(version)) => {
                    debug!("skipping infe version {version} at {}", b.head.start);
                    skipped += 1;
                },
                Err(e) if e.is_fatal() || !b.is_ok() => return Err(e),
                Err(e) => {
                    debug!("skipping infe at {}: {e}", b.head.start);
                    skipped += 1;
                },
            }
        } else {
            debug!("unexpected {:?} in iinf", b.head.name);
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }
    Ok(ItemInfoBox { flags, items, skipped })
}

/// See ISO 14496-12:2015 § 8.11.6.2
pub fn read_infe<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<ItemInfoEntry> {
    src.expect_type(BoxType::ItemInfoEntry)?;
    let flags = src.read_flags()?;
    if flags.version() != 2 {
        return Err(Error::InfeVersionNotSupported(flags.version()));
    }
    let item_id = u32::from(src.read_u16()?);
    let protection_index = src.read_u16()?;
    let before = src.offset();
    let item_type = src.read_item_type()?;
    // read_item_type swallows a NUL right after the code, which is an empty name
    let name = if src.offset() - before == 5 || src.bytes_left() == 0 {
        TryString::new()
    } else {
        src.read_null_string()?
    };
    let mut content_type = None;
    let mut uri_type = None;
    if src.bytes_left() > 0 {
        match item_type {
            ItemType::Mime => content_type = Some(src.read_null_string()?),
            ItemType::Uri => uri_type = Some(src.read_null_string()?),
            _ => {},
        }
    }
    debug!("infe item_id {item_id} item_type: {item_type}");
    Ok(ItemInfoEntry {
        item_id,
        protection_index,
        item_type,
        flags,
        name,
        content_type,
        uri_type,
    })
}

/// Potential sizes (in bytes) of variable-sized fields of the 'iloc' box
/// See ISO 14496-12:2015 § 8.11.3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IlocFieldSize {
    Zero,
    Four,
    Eight,
}

impl IlocFieldSize {
    const fn to_bits(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::Four => 32,
            Self::Eight => 64,
        }
    }

    const fn to_bytes(self) -> u8 {
        self.to_bits() / 8
    }
}

impl TryFrom<u8> for IlocFieldSize {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Zero),
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            _ => Err(Error::InvalidData("value must be in the set {0, 4, 8}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConstructionMethod {
    /// Offsets are file offsets.
    #[default]
    File,
    /// Offsets are relative to the `idat` payload of the same `meta`.
    Idat,
    /// Offsets point into another item.
    Item,
}

/// One `(offset, length)` pair of an item location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Extent {
    pub index: u64,
    /// Relative to the item's `base_offset`.
    pub offset: u64,
    /// Zero means "to the end of the source".
    pub length: u64,
}

/// Used for 'iloc' boxes
#[derive(Debug)]
pub struct ItemLocation {
    pub item_id: u32,
    pub construction_method: ConstructionMethod,
    pub data_reference_index: u16,
    pub base_offset: u64,
    /// The first extent; nearly every item has exactly one.
    pub extent: Extent,
    pub more_extents: TryVec<Extent>,
}

impl ItemLocation {
    pub fn extents(&self) -> impl Iterator<Item = &Extent> + '_ {
        std::iter::once(&self.extent).chain(self.more_extents.iter())
    }

    pub fn extent_count(&self) -> usize {
        1 + self.more_extents.len()
    }

    /// Offset of the first extent within its construction source.
    pub fn first_offset(&self) -> Result<u64> {
        self.base_offset
            .checked_add(self.extent.offset)
            .ok_or(Error::InvalidData("offset calculation overflow"))
    }
}

/// Item location box 'iloc'; field sizes are in bytes.
#[derive(Debug)]
pub struct ItemLocationBox {
    pub flags: Flags,
    pub offset_size: u8,
    pub length_size: u8,
    pub base_offset_size: u8,
    pub index_size: u8,
    pub items: TryVec<ItemLocation>,
}

impl Default for ItemLocationBox {
    fn default() -> Self {
        Self {
            flags: Flags::default(),
            offset_size: 0,
            length_size: 0,
            base_offset_size: 0,
            index_size: 0,
            items: TryVec::new(),
        }
    }
}

/// Parse an item location box inside a meta box
/// See ISO 14496-12:2015 § 8.11.3
pub fn read_iloc<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>, config: &ScanConfig) -> Result<ItemLocationBox> {
    src.expect_type(BoxType::ItemLocationBox)?;
    let flags = src.read_flags()?;
    let version = flags.version();
    if version > 2 {
        return Err(Error::Unsupported("unsupported version in 'iloc' box"));
    }

    let (offset_size, length_size) = src.read_with(1, |b| (b[0] >> 4, b[0] & 0x0f))?;
    let (base_offset_size, index_size) = src.read_with(1, |b| (b[0] >> 4, b[0] & 0x0f))?;
    let offset_size = IlocFieldSize::try_from(offset_size)?;
    let length_size = IlocFieldSize::try_from(length_size)?;
    let base_offset_size = IlocFieldSize::try_from(base_offset_size)?;
    let index_size = match version {
        0 => IlocFieldSize::Zero,
        _ => IlocFieldSize::try_from(index_size)?,
    };

    let item_count = match version {
        0 | 1 => u32::from(src.read_u16()?),
        _ => src.read_u32()?,
    };
    config.check_items(item_count, "iloc item count")?;
    let mut items = TryVec::with_capacity(item_count.to_usize())?;

    for _ in 0..item_count {
        let item_id = match version {
            0 | 1 => u32::from(src.read_u16()?),
            _ => src.read_u32()?,
        };
        let construction_method = match version {
            0 => ConstructionMethod::File,
            _ => match src.read_u16()? & 0x0f {
                0 => ConstructionMethod::File,
                1 => ConstructionMethod::Idat,
                2 => ConstructionMethod::Item,
                _ => return Err(Error::InvalidData("construction_method is taken from the set 0, 1 or 2")),
            },
        };
        let data_reference_index = src.read_u16()?;
        let base_offset = src.read_uint_n(base_offset_size.to_bits())?;
        let extent_count = src.read_u16()?;
        if extent_count < 1 {
            return Err(Error::InvalidData("extent_count must have a value 1 or greater"));
        }

        let mut extent = Extent::default();
        let mut more_extents = TryVec::new();
        for i in 0..extent_count {
            let next = Extent {
                index: src.read_uint_n(index_size.to_bits())?,
                offset: src.read_uint_n(offset_size.to_bits())?,
                length: src.read_uint_n(length_size.to_bits())?,
            };
            if i == 0 {
                extent = next;
            } else {
                more_extents.push(next)?;
            }
        }

        items.push(ItemLocation {
            item_id,
            construction_method,
            data_reference_index,
            base_offset,
            extent,
            more_extents,
        })?;
    }

    Ok(ItemLocationBox {
        flags,
        offset_size: offset_size.to_bytes(),
        length_size: length_size.to_bytes(),
        base_offset_size: base_offset_size.to_bytes(),
        index_size: index_size.to_bytes(),
        items,
    })
}

/// Image spatial extents (dimensions)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpatialExtents {
    pub width: u32,
    pub height: u32,
    pub flags: Flags,
}

/// An entry of the `ipco` property container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    ImageSpatialExtents(ImageSpatialExtents),
    /// Anti-clockwise rotation in degrees: 0, 90, 180 or 270.
    ImageRotation(u16),
    Unknown { box_type: BoxType, size: u64 },
}

/// Properties associated with one item by an `ipma` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationEntry {
    pub item_id: u32,
    /// 1-based indices into the property container; 0 means "no property".
    pub indices: ArrayVec<u16, 6>,
    /// Bit `i` is set when `indices[i]` is marked essential.
    pub essential: u8,
}

/// Item properties box 'iprp'
#[derive(Debug)]
pub struct ItemPropertiesBox {
    pub properties: TryVec<Property>,
    pub associations: TryVec<AssociationEntry>,
}

impl Default for ItemPropertiesBox {
    fn default() -> Self {
        Self {
            properties: TryVec::new(),
            associations: TryVec::new(),
        }
    }
}

impl ItemPropertiesBox {
    /// Properties associated with `item_id`, in association order.
    pub fn for_item(&self, item_id: u32) -> impl Iterator<Item = &Property> + '_ {
        self.associations
            .iter()
            .filter(move |a| a.item_id == item_id)
            .flat_map(|a| a.indices.iter())
            .filter_map(move |&i| match i {
                0 => None,
                i => self.properties.get(usize::from(i) - 1),
            })
    }
}

pub fn read_iprp<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>, config: &ScanConfig) -> Result<ItemPropertiesBox> {
    src.expect_type(BoxType::ItemPropertiesBox)?;
    let mut iprp = ItemPropertiesBox::default();

    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        match b.head.name {
            BoxType::ItemPropertyContainerBox => {
                iprp.properties = read_ipco(&mut b)?;
            },
            BoxType::ItemPropertyAssociationBox => {
                iprp.associations.append(&mut read_ipma(&mut b, config)?)?;
            },
            _ => debug!("unexpected {:?} in iprp (skipped)", b.head.name),
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }
    Ok(iprp)
}

fn read_ipco<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<TryVec<Property>> {
    let mut properties = TryVec::new();

    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        // every child takes a slot so that ipma indices stay aligned
        let prop = match b.head.name {
            BoxType::ImageSpatialExtentsBox => b.parse(read_ispe)?.map(Property::ImageSpatialExtents),
            BoxType::ImageRotation => b.parse(read_irot)?.map(Property::ImageRotation),
            _ => None,
        };
        properties.push(prop.unwrap_or(Property::Unknown {
            box_type: b.head.name,
            size: b.head.size,
        }))?;
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }
    Ok(properties)
}

fn read_ipma<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>, config: &ScanConfig) -> Result<TryVec<AssociationEntry>> {
    let flags = src.read_flags()?;
    let entry_count = src.read_u32()?;
    config.check_items(entry_count, "ipma entry count")?;
    let mut associations = TryVec::with_capacity(entry_count.to_usize())?;

    for _ in 0..entry_count {
        let item_id = match flags.version() {
            0 => u32::from(src.read_u16()?),
            _ => src.read_u32()?,
        };
        let association_count = src.read_u8()?;
        let mut entry = AssociationEntry {
            item_id,
            indices: ArrayVec::new(),
            essential: 0,
        };
        let num_association_bytes = if flags.has(1) { 2 } else { 1 };
        for _ in 0..association_count {
            let (essential, property_index) = src.read_with(num_association_bytes, |bytes| -> Result<(bool, u16)> {
                let mut association = BitReader::new(bytes);
                let essential = association.read_bool()?;
                let property_index = association.read_u16(association.remaining().try_into()?)?;
                Ok((essential, property_index))
            })??;
            if entry.indices.try_push(property_index).is_err() {
                trace!("item {item_id}: dropping association with property {property_index}");
                continue;
            }
            if essential {
                entry.essential |= 1 << (entry.indices.len() - 1);
            }
        }
        associations.push(entry)?;
    }
    Ok(associations)
}

/// Parse an Image Spatial Extents property box
/// See ISO/IEC 23008-12:2017 § 6.5.3
pub fn read_ispe<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<ImageSpatialExtents> {
    src.expect_type(BoxType::ImageSpatialExtentsBox)?;
    let flags = src.read_flags()?;
    let width = src.read_u32()?;
    let height = src.read_u32()?;
    Ok(ImageSpatialExtents { width, height, flags })
}

/// Rotation in degrees from an 'irot' box.
pub fn read_irot<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>) -> Result<u16> {
    src.expect_type(BoxType::ImageRotation)?;
    let angle = src.read_u8()? & 0x03;
    Ok(u16::from(angle) * 90)
}

/// See ISO 14496-12:2015 § 8.11.12
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemReference {
    pub reference_type: FourCC,
    pub from_item_id: u32,
    pub to_item_id: u32,
    /// Position among the references of the same type from the same item.
    pub reference_index: u16,
}

pub fn read_iref<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>, config: &ScanConfig) -> Result<TryVec<ItemReference>> {
    src.expect_type(BoxType::ItemReferenceBox)?;
    let mut item_references = TryVec::new();
    let flags = src.read_flags()?;
    let wide = match flags.version() {
        0 => false,
        1 => true,
        _ => return Err(Error::Unsupported("iref version")),
    };

    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        let reference_type = FourCC::from(b.head.name);
        let from_item_id = if wide { b.read_u32()? } else { u32::from(b.read_u16()?) };
        let reference_count = b.read_u16()?;
        config.check_items(u32::from(reference_count), "iref reference count")?;
        for reference_index in 0..reference_count {
            let to_item_id = if wide { b.read_u32()? } else { u32::from(b.read_u16()?) };
            item_references.push(ItemReference {
                reference_type,
                from_item_id,
                to_item_id,
                reference_index,
            })?;
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }
    Ok(item_references)
}

/// Where a region of the file starts and how long it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataRegion {
    pub offset: u64,
    pub length: u64,
}

/// Meta box 'meta' of a HEIF/AVIF file.
#[derive(Debug)]
pub struct MetaBox {
    pub flags: Flags,
    pub handler: Option<HandlerBox>,
    pub primary: Option<PrimaryItemBox>,
    pub item_info: ItemInfoBox,
    pub location: ItemLocationBox,
    pub properties: ItemPropertiesBox,
    pub references: TryVec<ItemReference>,
    /// Payload of the `idat` box, if any.
    pub idat: Option<DataRegion>,
}

impl Default for MetaBox {
    fn default() -> Self {
        Self {
            flags: Flags::default(),
            handler: None,
            primary: None,
            item_info: ItemInfoBox::default(),
            location: ItemLocationBox::default(),
            properties: ItemPropertiesBox::default(),
            references: TryVec::new(),
            idat: None,
        }
    }
}

impl MetaBox {
    pub fn primary_item_id(&self) -> Option<u32> {
        self.primary.map(|p| p.item_id)
    }

    pub fn item(&self, item_id: u32) -> Option<&ItemInfoEntry> {
        self.item_info.items.iter().find(|i| i.item_id == item_id)
    }

    pub fn item_location(&self, item_id: u32) -> Option<&ItemLocation> {
        self.location.items.iter().find(|l| l.item_id == item_id)
    }

    /// The Exif item, preferring one that describes the primary item.
    pub fn exif_item(&self) -> Option<&ItemInfoEntry> {
        let is_exif = |i: &&ItemInfoEntry| i.item_type == ItemType::Exif;
        let first = self.item_info.items.iter().find(is_exif);
        let primary = self.primary_item_id();
        self.item_info.items.iter().filter(is_exif).find(|i| {
            self.references.iter().any(|r| {
                r.reference_type == b"cdsc" && r.from_item_id == i.item_id && Some(r.to_item_id) == primary
            })
        })
        .or(first)
    }

    /// Width and height of the primary item, from its `ispe` property.
    pub fn primary_dimensions(&self) -> Option<(u32, u32)> {
        let id = self.primary_item_id()?;
        self.properties.for_item(id).find_map(|p| match p {
            Property::ImageSpatialExtents(e) => Some((e.width, e.height)),
            _ => None,
        })
    }

    /// Rotation of the primary item in degrees, 0 without an `irot` property.
    pub fn primary_rotation(&self) -> u16 {
        self.primary_item_id()
            .and_then(|id| {
                self.properties.for_item(id).find_map(|p| match p {
                    Property::ImageRotation(angle) => Some(*angle),
                    _ => None,
                })
            })
            .unwrap_or(0)
    }

    /// Absolute location of the Exif item's first extent, if it can be known from `meta` alone.
    fn exif_region(&self) -> Option<(ConstructionMethod, DataRegion)> {
        let item = self.exif_item()?;
        let location = self.item_location(item.item_id)?;
        if location.extent_count() > 1 {
            debug!("Exif item {} has {} extents; using the first", item.item_id, location.extent_count());
        }
        let relative = location.first_offset().ok()?;
        let offset = match location.construction_method {
            ConstructionMethod::File => relative,
            ConstructionMethod::Idat => self.idat?.offset.checked_add(relative)?,
            ConstructionMethod::Item => {
                debug!("Exif item {} is constructed from another item", item.item_id);
                return None;
            },
        };
        Some((location.construction_method, DataRegion {
            offset,
            length: location.extent.length,
        }))
    }
}

/// Parse a 'meta' box and its item tables.
pub fn read_meta<P: Peek + ?Sized>(src: &mut BmffBox<'_, P>, config: &ScanConfig) -> Result<MetaBox> {
    read_meta_with(src, config, |_, _| Ok(()))
}

/// Parse 'meta', handing `on_idat` the `idat` payload together with what was parsed before it.
fn read_meta_with<P, F>(src: &mut BmffBox<'_, P>, config: &ScanConfig, mut on_idat: F) -> Result<MetaBox>
where
    P: Peek + ?Sized,
    F: FnMut(&mut dyn Peek, &MetaBox) -> Result<()>,
{
    src.expect_type(BoxType::MetadataBox)?;
    let mut meta = MetaBox {
        flags: src.read_flags()?,
        ..MetaBox::default()
    };

    let mut iter = src.box_iter();
    while let Some(mut b) = iter.next_box()? {
        match b.head.name {
            BoxType::HandlerBox => meta.handler = b.parse(read_hdlr)?,
            BoxType::PrimaryItemBox => meta.primary = b.parse(read_pitm)?,
            BoxType::ItemInfoBox => {
                if let Some(item_info) = b.parse(|b| read_iinf(b, config))? {
                    meta.item_info = item_info;
                }
            },
            BoxType::ItemLocationBox => {
                if let Some(location) = b.parse(|b| read_iloc(b, config))? {
                    meta.location = location;
                }
            },
            BoxType::ItemPropertiesBox => {
                if let Some(properties) = b.parse(|b| read_iprp(b, config))? {
                    meta.properties = properties;
                }
            },
            BoxType::ItemReferenceBox => {
                if let Some(mut references) = b.parse(|b| read_iref(b, config))? {
                    meta.references.append(&mut references)?;
                }
            },
            BoxType::ItemDataBox => {
                meta.idat = Some(DataRegion {
                    offset: b.head.content_start(),
                    length: b.bytes_left(),
                });
                on_idat(&mut b, &meta)?;
            },
            BoxType::DataInformationBox | BoxType::UuidBox => trace!("{:?} in meta (skipped)", b.head.name),
            _ => debug!("unexpected {:?} in meta (skipped)", b.head.name),
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            break;
        }
    }

    if let Some(handler) = meta.handler {
        if handler.handler_type != HandlerType::Pict {
            debug!("meta handler is {}", handler.handler_type);
        }
    }
    Ok(meta)
}

/// Read the Exif item payload starting at `region`, if the reader has not passed it yet.
///
/// The payload opens with a 4-byte offset from its end to the TIFF header.
fn read_exif_item<P: Peek + ?Sized>(
    src: &mut P,
    region: DataRegion,
    image_kind: ImageKind,
    on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
) -> Result<Option<ExifHeader>> {
    let here = src.offset();
    if region.offset < here || region.offset - here >= src.remain() {
        return Ok(None);
    }
    src.skip(region.offset - here)?;
    let length = match region.length {
        0 => src.remain(),
        l => l.min(src.remain()),
    };
    let mut item = Bounded::new(src, length);
    let skew = u64::from(item.read_u32()?);
    item.skip(skew)?;
    let exif_length = item.remain();
    let header = ExifHeader::peek(&mut item, exif_length, image_kind)?;
    if header.is_valid() {
        debug!("Exif item at {}: {header:?}", header.file_offset);
        on_exif(&mut item, &header)?;
    } else {
        debug!("Exif item at {} has no valid TIFF header", region.offset);
    }
    item.drain()?;
    Ok(header.is_valid().then_some(header))
}

/// What a HEIF/AVIF walk found.
#[derive(Debug)]
pub struct HeifScan {
    pub file_type: FileTypeBox,
    pub meta: MetaBox,
    pub exif: Option<ExifHeader>,
}

impl HeifScan {
    pub fn image_kind(&self) -> ImageKind {
        image_kind_of(&self.file_type)
    }
}

fn image_kind_of(file_type: &FileTypeBox) -> ImageKind {
    match file_type.brand() {
        Ok(b) if b.is_avif() => ImageKind::Avif,
        Ok(b) if b.is_heif() => ImageKind::Heif,
        _ if file_type.compatible().any(Brand::is_avif) => ImageKind::Avif,
        _ => ImageKind::Heif,
    }
}

/// Read a file's leading 'ftyp' box.
pub(crate) fn read_file_type<P: Peek + ?Sized>(iter: &mut BoxIter<'_, P>) -> Result<FileTypeBox> {
    match iter.next_box()? {
        Some(mut b) if b.head.name == BoxType::FileTypeBox => {
            let ftyp = read_ftyp(&mut b)?;
            b.close()?;
            Ok(ftyp)
        },
        // 'ftyp' box must occur first; see ISO 14496-12:2015 § 4.3.1
        _ => Err(Error::InvalidData("'ftyp' box must occur first")),
    }
}

/// Locate the item tables and the Exif payload of a HEIF or AVIF file.
pub fn scan_heif<P: Peek + ?Sized>(src: &mut P) -> Result<HeifScan> {
    scan_heif_with(src, &ScanConfig::default(), &Unstoppable, |_, _| Ok(()))
}

/// [`scan_heif`] with limits, cancellation and an Exif payload callback.
///
/// Boxes are only read forward: an Exif item stored before the `meta` box
/// cannot be reached and is reported as absent.
pub fn scan_heif_with<P, E>(src: &mut P, config: &ScanConfig, stop: &dyn Stop, mut on_exif: E) -> Result<HeifScan>
where
    P: Peek + ?Sized,
    E: FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
{
    let mut iter = BoxIter::new(src);
    let file_type = read_file_type(&mut iter)?;
    if let Err(e) = file_type.brand() {
        let known = file_type.compatible().any(|b| b.is_heif() || b.is_avif());
        if !known && !config.lenient {
            return Err(e);
        }
        warn!("{e}; continuing with compatible brands");
    }
    let image_kind = image_kind_of(&file_type);

    let mut meta = None;
    let mut exif = None;
    let mut pending = None;
    let walked = walk_heif(&mut iter, config, stop, image_kind, &mut on_exif, &mut meta, &mut exif, &mut pending);
    match (walked, meta) {
        (Ok(()), Some(meta)) => {
            if pending.is_some() && exif.is_none() {
                debug!("Exif item at {:?} was not reached", pending);
            }
            Ok(HeifScan { file_type, meta, exif })
        },
        (Ok(()), None) => Err(Error::InvalidData("meta box missing")),
        (Err(e @ (Error::UnexpectedEOF | Error::ShortBuffer)), Some(meta)) => {
            debug!("HEIF stream truncated after meta: {e}");
            Ok(HeifScan { file_type, meta, exif })
        },
        (Err(e), _) => Err(e),
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_heif<P: Peek + ?Sized>(
    iter: &mut BoxIter<'_, P>,
    config: &ScanConfig,
    stop: &dyn Stop,
    image_kind: ImageKind,
    on_exif: &mut dyn FnMut(&mut dyn Peek, &ExifHeader) -> Result<()>,
    meta: &mut Option<MetaBox>,
    exif: &mut Option<ExifHeader>,
    pending: &mut Option<DataRegion>,
) -> Result<()> {
    loop {
        stop.check()?;
        let mut b = match iter.next_box() {
            Ok(Some(b)) => b,
            Ok(None) | Err(Error::NoMoreBoxes) => return Ok(()),
            Err(e) => return Err(e),
        };
        match b.head.name {
            BoxType::MetadataBox if meta.is_none() => {
                let m = read_meta_with(&mut b, config, |idat, partial| {
                    if let Some((ConstructionMethod::Idat, region)) = partial.exif_region() {
                        *exif = read_exif_item(idat, region, image_kind, on_exif)?;
                    }
                    Ok(())
                })?;
                *pending = match m.exif_region() {
                    Some((ConstructionMethod::File, region)) if exif.is_none() => Some(region),
                    _ => None,
                };
                *meta = Some(m);
            },
            _ => {
                if let Some(region) = *pending {
                    if region.offset < b.offset() {
                        debug!("Exif item at {} precedes {:?}", region.offset, b.head.name);
                        *pending = None;
                    } else if let Some(header) = read_exif_item(&mut b, region, image_kind, on_exif)? {
                        *exif = Some(header);
                        *pending = None;
                    }
                } else {
                    trace!("{:?} (skipped)", b.head.name);
                }
            },
        }
        if meta.is_some() && pending.is_none() {
            // nothing left to look for; leave the rest of the stream unread
            return Ok(());
        }
        let last = b.head.is_to_end();
        b.close()?;
        if last {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Source;

    fn bx(name: &[u8; 4], content: &[u8]) -> std::vec::Vec<u8> {
        let mut out = std::vec::Vec::new();
        out.extend_from_slice(&((content.len() + 8) as u32).to_be_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(content);
        out
    }

    fn full(name: &[u8; 4], version: u8, content: &[u8]) -> std::vec::Vec<u8> {
        let mut body = vec![version, 0, 0, 0];
        body.extend_from_slice(content);
        bx(name, &body)
    }

    #[test]
    fn header_sizes() {
        let data = [0, 0, 0, 8, b'f', b'r', b'e', b'e'];
        let mut src = Source::from_slice(&data);
        let h = read_box_header(&mut src).unwrap();
        assert_eq!(h.name, BoxType::FreeSpaceBox);
        assert_eq!((h.size, h.offset, h.start), (8, 8, 0));

        let data = [0, 0, 0, 4, b'f', b'r', b'e', b'e'];
        assert!(matches!(read_box_header(&mut Source::from_slice(&data)), Err(Error::InvalidData(_))));

        let mut data = std::vec::Vec::from(&b"\0\0\0\x01mdat"[..]);
        data.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(read_box_header(&mut Source::from_slice(&data)), Err(Error::UnexpectedlyLargeBox)));

        let data = b"\0\0\0\0mdat";
        let h = read_box_header(&mut Source::from_slice(data)).unwrap();
        assert!(h.is_to_end());
    }

    #[test]
    fn large_size_box() {
        let mut data = std::vec::Vec::from(&b"\0\0\0\x01meta\0\0\0\0\0\0\0\x20"[..]);
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(&bx(b"free", &[0; 4]));
        data.extend_from_slice(&[0xee; 8]);
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        assert_eq!(b.head.size, 32);
        assert_eq!(b.bytes_left(), 16);
        let meta = read_meta(&mut b, &ScanConfig::default()).unwrap();
        assert!(meta.primary.is_none());
        assert_eq!(b.bytes_left(), 0);
        b.close().unwrap();
        assert_eq!(src.offset(), 32);
        assert_eq!(src.remain(), 8);
    }

    #[test]
    fn close_consumes_exactly_size() {
        let mut data = bx(b"zzzz", &[1, 2, 3, 4, 5]);
        data.extend_from_slice(&bx(b"free", &[]));
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        assert_eq!(b.head.name, BoxType::UnknownBox(u32::from_be_bytes(*b"zzzz")));
        b.read_u8().unwrap();
        b.close().unwrap();
        let b = iter.next_box().unwrap().unwrap();
        assert_eq!(b.head.start, 13);
        b.close().unwrap();
        assert!(iter.next_box().unwrap().is_none());
    }

    #[test]
    fn to_end_box_is_terminal() {
        let data = b"\0\0\0\0mdat0123456789";
        let mut src = Source::new(&data[..]);
        let mut iter = BoxIter::new(&mut src);
        let b = iter.next_box().unwrap().unwrap();
        assert!(b.head.is_to_end());
        b.close().unwrap();
        assert!(matches!(iter.next_box(), Err(Error::NoMoreBoxes)));
        assert_eq!(src.offset(), data.len() as u64);
        assert!(src.is_ok());
    }

    #[test]
    fn wrong_box_type() {
        let data = bx(b"free", &[0; 8]);
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        assert!(matches!(read_ftyp(&mut b), Err(Error::WrongBoxType(BoxType::FreeSpaceBox))));
    }

    #[test]
    fn ftyp_brands() {
        let data = bx(b"ftyp", b"heic\0\0\0\0mif1heicmiafMiHEMiPrmsf1hevcxtra");
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        let ftyp = read_ftyp(&mut b).unwrap();
        assert_eq!(ftyp.brand().unwrap(), Brand::Heic);
        assert_eq!(ftyp.compatible_brands.len(), 6);
        assert!(ftyp.is_compatible_with(Brand::Miaf));
        b.close().unwrap();

        let data = bx(b"ftyp", b"zzzz\0\0\0\0");
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let ftyp = read_ftyp(&mut iter.next_box().unwrap().unwrap()).unwrap();
        assert!(matches!(ftyp.brand(), Err(Error::BrandNotSupported(b)) if b == b"zzzz"));
    }

    #[test]
    fn iinf_skips_old_infe_versions() {
        let mut content = vec![0, 2];
        content.extend_from_slice(&full(b"infe", 0, &[0, 1, 0, 0, 0]));
        content.extend_from_slice(&full(b"infe", 2, b"\0\x02\0\0mime\0image/jpeg\0"));
        let data = full(b"iinf", 0, &content);
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        let iinf = read_iinf(&mut b, &ScanConfig::default()).unwrap();
        assert_eq!(iinf.skipped, 1);
        assert_eq!(iinf.items.len(), 1);
        let entry = &iinf.items[0];
        assert_eq!(entry.item_id, 2);
        assert_eq!(entry.item_type, ItemType::Mime);
        assert_eq!(*entry.content_type.as_ref().unwrap(), b"image/jpeg".as_ref());
        b.close().unwrap();
        assert_eq!(src.remain(), 0);
    }

    #[test]
    fn iinf_entry_limit() {
        let data = full(b"iinf", 0, &[0xff, 0xff]);
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        let config = ScanConfig::default().with_max_items(16);
        assert!(matches!(read_iinf(&mut b, &config), Err(Error::ResourceLimitExceeded(_))));
    }

    #[test]
    fn iloc_versions() {
        // version 1, 4-byte offsets and lengths, no base offset, two extents
        let mut content = vec![0x44, 0x00, 0, 1];
        content.extend_from_slice(&[0, 7, 0, 1, 0, 0, 0, 2]);
        content.extend_from_slice(&[0, 0, 0, 100, 0, 0, 0, 10]);
        content.extend_from_slice(&[0, 0, 0, 200, 0, 0, 0, 20]);
        let data = full(b"iloc", 1, &content);
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        let iloc = read_iloc(&mut b, &ScanConfig::default()).unwrap();
        assert_eq!((iloc.offset_size, iloc.length_size, iloc.base_offset_size), (4, 4, 0));
        let item = &iloc.items[0];
        assert_eq!(item.item_id, 7);
        assert_eq!(item.construction_method, ConstructionMethod::Idat);
        assert_eq!(item.extent_count(), 2);
        let extents: std::vec::Vec<_> = item.extents().map(|e| (e.offset, e.length)).collect();
        assert_eq!(extents, [(100, 10), (200, 20)]);
        assert_eq!(b.bytes_left(), 0);

        let data = full(b"iloc", 0, &[0x33, 0x00, 0, 0]);
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        assert!(matches!(read_iloc(&mut b, &ScanConfig::default()), Err(Error::InvalidData(_))));
    }

    #[test]
    fn iprp_properties_and_associations() {
        let mut ipco = full(b"ispe", 0, &[0, 0, 0x0f, 0xa0, 0, 0, 0x0b, 0xb8]);
        ipco.extend_from_slice(&bx(b"irot", &[3]));
        ipco.extend_from_slice(&bx(b"colr", b"nclx\0\x01\0\x0d\0\x06\0"));
        let mut content = bx(b"ipco", &ipco);
        // item 1 -> ispe (essential), irot; item 2 -> colr
        content.extend_from_slice(&full(b"ipma", 0, &[0, 0, 0, 2, 0, 1, 2, 0x81, 0x02, 0, 2, 1, 0x03]));
        let data = bx(b"iprp", &content);
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        let iprp = read_iprp(&mut b, &ScanConfig::default()).unwrap();
        assert_eq!(iprp.properties.len(), 3);
        assert!(matches!(iprp.properties[2], Property::Unknown { size: 19, .. }));
        assert_eq!(iprp.associations[0].indices.as_slice(), &[1, 2]);
        assert_eq!(iprp.associations[0].essential, 0b01);
        let props: std::vec::Vec<_> = iprp.for_item(1).copied().collect();
        assert_eq!(props[1], Property::ImageRotation(270));
        assert!(matches!(props[0], Property::ImageSpatialExtents(ImageSpatialExtents { width: 4000, height: 3000, .. })));
    }

    #[test]
    fn exif_item_prefers_the_one_describing_the_primary() {
        fn entry(item_id: u32, item_type: ItemType) -> ItemInfoEntry {
            ItemInfoEntry {
                item_id,
                protection_index: 0,
                item_type,
                flags: Flags(0x0200_0000),
                name: TryString::new(),
                content_type: None,
                uri_type: None,
            }
        }

        let mut meta = MetaBox {
            primary: Some(PrimaryItemBox { item_id: 1, flags: Flags::default() }),
            ..MetaBox::default()
        };
        assert!(meta.exif_item().is_none());
        for (id, item_type) in [(1, ItemType::Hvc1), (2, ItemType::Exif), (3, ItemType::Exif)] {
            meta.item_info.items.push(entry(id, item_type)).unwrap();
        }
        assert_eq!(meta.exif_item().unwrap().item_id, 2);

        meta.references
            .push(ItemReference {
                reference_type: FourCC::from(*b"cdsc"),
                from_item_id: 3,
                to_item_id: 1,
                reference_index: 0,
            })
            .unwrap();
        assert_eq!(meta.exif_item().unwrap().item_id, 3);
    }

    #[test]
    fn unknown_iprp_child_is_skipped() {
        let ipco = full(b"ispe", 0, &[0, 0, 0x02, 0x80, 0, 0, 0x01, 0xe0]);
        let mut iprp = bx(b"ipco", &ipco);
        iprp.extend_from_slice(&bx(b"zzzz", &[1, 2, 3]));
        iprp.extend_from_slice(&full(b"ipma", 0, &[0, 0, 0, 1, 0, 1, 1, 0x81]));
        let mut content = full(b"pitm", 0, &[0, 1]);
        content.extend_from_slice(&bx(b"iprp", &iprp));
        let data = full(b"meta", 0, &content);

        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        let meta = read_meta(&mut b, &ScanConfig::default()).unwrap();
        assert_eq!(meta.properties.properties.len(), 1);
        assert_eq!(meta.properties.associations.len(), 1);
        assert_eq!(meta.primary_dimensions(), Some((640, 480)));
        b.close().unwrap();
        assert_eq!(src.remain(), 0);
    }

    #[test]
    fn unknown_handler_is_reported() {
        let data = full(b"hdlr", 0, b"\0\0\0\0zzzz\0\0\0\0\0\0\0\0\0\0\0\0\0");
        let mut src = Source::from_slice(&data);
        let mut iter = BoxIter::new(&mut src);
        let mut b = iter.next_box().unwrap().unwrap();
        assert!(matches!(read_hdlr(&mut b), Err(Error::HandlerTypeUnknown(c)) if c == b"zzzz"));
    }
}
