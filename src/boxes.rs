// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Closed tables of the 4-byte codes the scanners understand.

use std::fmt;

macro_rules! box_database {
    ($($(#[$attr:meta])* $boxenum:ident $boxtype:literal),*,) => {
        /// ISO-BMFF box type. Unrecognised types keep their raw value.
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub enum BoxType {
            $($(#[$attr])* $boxenum),*,
            UnknownBox(u32),
        }

        impl From<u32> for BoxType {
            fn from(t: u32) -> Self {
                use self::BoxType::*;
                match t {
                    $($(#[$attr])* $boxtype => $boxenum),*,
                    _ => UnknownBox(t),
                }
            }
        }

        impl From<BoxType> for u32 {
            fn from(b: BoxType) -> u32 {
                use self::BoxType::*;
                match b {
                    $($(#[$attr])* $boxenum => $boxtype),*,
                    UnknownBox(t) => t,
                }
            }
        }

        impl fmt::Debug for BoxType {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let fourcc: FourCC = From::from(*self);
                fourcc.fmt(f)
            }
        }
    };
}

box_database!(
    FileTypeBox                       0x6674_7970, // "ftyp"
    MetadataBox                       0x6d65_7461, // "meta"
    MovieBox                          0x6d6f_6f76, // "moov"
    MovieHeaderBox                    0x6d76_6864, // "mvhd"
    TrackBox                          0x7472_616b, // "trak"
    UuidBox                           0x7575_6964, // "uuid"
    HandlerBox                        0x6864_6c72, // "hdlr"
    PrimaryItemBox                    0x7069_746d, // "pitm"
    ItemInfoBox                       0x6969_6e66, // "iinf"
    ItemInfoEntry                     0x696e_6665, // "infe"
    ItemLocationBox                   0x696c_6f63, // "iloc"
    ItemPropertiesBox                 0x6970_7270, // "iprp"
    ItemPropertyContainerBox          0x6970_636f, // "ipco"
    ItemPropertyAssociationBox        0x6970_6d61, // "ipma"
    ItemReferenceBox                  0x6972_6566, // "iref"
    ImageRotation                     0x6972_6f74, // "irot"
    ImageSpatialExtentsBox            0x6973_7065, // "ispe"
    ItemDataBox                       0x6964_6174, // "idat"
    DataInformationBox                0x6469_6e66, // "dinf"
    FreeSpaceBox                      0x6672_6565, // "free"
    SkipBox                           0x736b_6970, // "skip"
    MediaDataBox                      0x6d64_6174, // "mdat"
    CanonCompressorVersionBox         0x434e_4356, // "CNCV"
    CanonTrackPointerBox              0x4343_5450, // "CCTP"
    CanonTrackDescriptionBox          0x4343_4454, // "CCDT"
    CanonTrackOffsetBox               0x4354_424f, // "CTBO"
    CanonMetadata1Box                 0x434d_5431, // "CMT1"
    CanonMetadata2Box                 0x434d_5432, // "CMT2"
    CanonMetadata3Box                 0x434d_5433, // "CMT3"
    CanonMetadata4Box                 0x434d_5434, // "CMT4"
    CanonThumbnailBox                 0x5448_4d42, // "THMB"
);

/// A raw 4-byte code, printed as ASCII where possible.
#[derive(Default, PartialEq, Eq, Clone, Copy, Hash)]
pub struct FourCC {
    pub value: [u8; 4],
}

impl From<u32> for FourCC {
    fn from(number: u32) -> Self {
        Self { value: number.to_be_bytes() }
    }
}

impl From<BoxType> for FourCC {
    fn from(t: BoxType) -> Self {
        let box_num: u32 = Into::into(t);
        From::from(box_num)
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self { value }
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{self}'")
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.value {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl PartialEq<&[u8; 4]> for FourCC {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        self.value.eq(*other)
    }
}

macro_rules! code_table {
    ($(#[$meta:meta])* $name:ident { $($(#[$attr:meta])* $variant:ident => $code:literal),*, }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            /// Code outside the recognised set.
            #[default]
            Unknown,
            $($(#[$attr])* $variant),*,
        }

        impl $name {
            pub fn from_bytes(code: &[u8; 4]) -> Self {
                match code {
                    $($code => Self::$variant,)*
                    _ => Self::Unknown,
                }
            }

            /// The code as written in the file; `Unknown` maps to `????`.
            pub const fn as_bytes(self) -> &'static [u8; 4] {
                match self {
                    Self::Unknown => b"????",
                    $(Self::$variant => $code,)*
                }
            }

            pub fn is_unknown(self) -> bool {
                self == Self::Unknown
            }
        }

        impl From<[u8; 4]> for $name {
            fn from(code: [u8; 4]) -> Self {
                Self::from_bytes(&code)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&FourCC::from(*self.as_bytes()), f)
            }
        }
    };
}

code_table!(
    /// `ftyp` brands.
    Brand {
        Heic => b"heic",
        Heix => b"heix",
        Hevc => b"hevc",
        Hevx => b"hevx",
        Heim => b"heim",
        Heis => b"heis",
        Hevm => b"hevm",
        Hevs => b"hevs",
        Mif1 => b"mif1",
        Msf1 => b"msf1",
        Miaf => b"miaf",
        Avif => b"avif",
        Avis => b"avis",
        Crx => b"crx ",
        Isom => b"isom",
        Iso2 => b"iso2",
        Mp41 => b"mp41",
        Mp42 => b"mp42",
        Qt => b"qt  ",
    }
);

impl Brand {
    /// Brands that mark a HEIF still image container (HEVC coded or generic MIAF).
    pub fn is_heif(self) -> bool {
        matches!(
            self,
            Self::Heic
                | Self::Heix
                | Self::Hevc
                | Self::Hevx
                | Self::Heim
                | Self::Heis
                | Self::Hevm
                | Self::Hevs
                | Self::Mif1
                | Self::Msf1
                | Self::Miaf
        )
    }

    pub fn is_avif(self) -> bool {
        matches!(self, Self::Avif | Self::Avis)
    }
}

code_table!(
    /// `infe` item types.
    ItemType {
        Av01 => b"av01",
        Hvc1 => b"hvc1",
        Hvt1 => b"hvt1",
        Jpeg => b"jpeg",
        Grid => b"grid",
        Iden => b"iden",
        Iovl => b"iovl",
        Exif => b"Exif",
        Mime => b"mime",
        Uri => b"uri ",
    }
);

code_table!(
    /// `hdlr` handler types.
    HandlerType {
        Pict => b"pict",
        Vide => b"vide",
        Meta => b"meta",
    }
);

#[test]
fn box_type_round_trip() {
    let t = BoxType::from(u32::from_be_bytes(*b"iloc"));
    assert_eq!(t, BoxType::ItemLocationBox);
    assert_eq!(FourCC::from(t), b"iloc");
    let unknown = BoxType::from(u32::from_be_bytes(*b"zzzz"));
    assert_eq!(unknown, BoxType::UnknownBox(0x7a7a_7a7a));
    assert_eq!(format!("{unknown:?}"), "'zzzz'");
}

#[test]
fn code_tables_are_total() {
    assert_eq!(Brand::from_bytes(b"crx "), Brand::Crx);
    assert_eq!(Brand::from_bytes(b"nope"), Brand::Unknown);
    assert_eq!(Brand::Crx.as_bytes(), b"crx ");
    assert_eq!(ItemType::from(*b"Exif"), ItemType::Exif);
    assert_eq!(HandlerType::Pict.to_string(), "pict");
    assert_eq!(Brand::Unknown.to_string(), "????");
    assert!(Brand::Mif1.is_heif());
    assert!(!Brand::Avif.is_heif());
}
