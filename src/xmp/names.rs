// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The closed XMP vocabulary: namespace prefixes and local names.

use std::fmt;

macro_rules! name_table {
    ($(#[$meta:meta])* $name:ident { $($(#[$attr:meta])* $variant:ident => $text:literal,)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            #[default]
            Unknown,
            $($(#[$attr])* $variant,)*
        }

        impl $name {
            /// Look up a name; anything outside the table is `Unknown`.
            pub fn from_bytes(text: &[u8]) -> Self {
                match std::str::from_utf8(text) {
                    $(Ok($text) => Self::$variant,)*
                    _ => Self::Unknown,
                }
            }

            pub const fn as_str(self) -> &'static str {
                match self {
                    Self::Unknown => "?",
                    $(Self::$variant => $text,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

name_table! {
    /// Namespace prefixes, matched literally. Packets that bind the usual
    /// URIs to other prefixes are not recognised.
    Namespace {
        Rdf => "rdf",
        X => "x",
        Xml => "xml",
        /// XMP basic
        Xmp => "xmp",
        Exif => "exif",
        ExifEx => "exifEX",
        Tiff => "tiff",
        Aux => "aux",
        Crs => "crs",
        Dc => "dc",
        XmpMM => "xmpMM",
    }
}

name_table! {
    /// Local names across every namespace in [`Namespace`].
    Name {
        // rdf
        Rdf => "RDF",
        Description => "Description",
        Seq => "Seq",
        Bag => "Bag",
        Alt => "Alt",
        Li => "li",
        About => "about",
        Resource => "resource",
        ParseType => "parseType",
        // x
        XmpMeta => "xmpmeta",
        XmpTk => "xmptk",
        // xml
        Lang => "lang",
        // xmp
        CreateDate => "CreateDate",
        ModifyDate => "ModifyDate",
        MetadataDate => "MetadataDate",
        CreatorTool => "CreatorTool",
        Label => "Label",
        Rating => "Rating",
        // exif, exifEX
        ExifVersion => "ExifVersion",
        DateTimeOriginal => "DateTimeOriginal",
        DateTimeDigitized => "DateTimeDigitized",
        ExposureTime => "ExposureTime",
        FNumber => "FNumber",
        ExposureProgram => "ExposureProgram",
        ExposureMode => "ExposureMode",
        ExposureBiasValue => "ExposureBiasValue",
        IsoSpeedRatings => "ISOSpeedRatings",
        PhotographicSensitivity => "PhotographicSensitivity",
        ApertureValue => "ApertureValue",
        MaxApertureValue => "MaxApertureValue",
        ShutterSpeedValue => "ShutterSpeedValue",
        MeteringMode => "MeteringMode",
        Flash => "Flash",
        Fired => "Fired",
        Return => "Return",
        Mode => "Mode",
        Function => "Function",
        RedEyeMode => "RedEyeMode",
        FocalLength => "FocalLength",
        FocalLengthIn35mmFilm => "FocalLengthIn35mmFilm",
        PixelXDimension => "PixelXDimension",
        PixelYDimension => "PixelYDimension",
        ColorSpace => "ColorSpace",
        WhiteBalance => "WhiteBalance",
        SceneCaptureType => "SceneCaptureType",
        SubjectDistance => "SubjectDistance",
        GpsLatitude => "GPSLatitude",
        GpsLongitude => "GPSLongitude",
        GpsAltitude => "GPSAltitude",
        GpsAltitudeRef => "GPSAltitudeRef",
        LensMake => "LensMake",
        LensModel => "LensModel",
        BodySerialNumber => "BodySerialNumber",
        // tiff
        Make => "Make",
        Model => "Model",
        Orientation => "Orientation",
        ImageWidth => "ImageWidth",
        ImageLength => "ImageLength",
        XResolution => "XResolution",
        YResolution => "YResolution",
        ResolutionUnit => "ResolutionUnit",
        Software => "Software",
        Artist => "Artist",
        Copyright => "Copyright",
        DateTime => "DateTime",
        // aux
        SerialNumber => "SerialNumber",
        LensInfo => "LensInfo",
        Lens => "Lens",
        LensId => "LensID",
        LensSerialNumber => "LensSerialNumber",
        ImageNumber => "ImageNumber",
        FlashCompensation => "FlashCompensation",
        Firmware => "Firmware",
        ApproximateFocusDistance => "ApproximateFocusDistance",
        // crs
        Version => "Version",
        ProcessVersion => "ProcessVersion",
        RawFileName => "RawFileName",
        CameraProfile => "CameraProfile",
        Temperature => "Temperature",
        Tint => "Tint",
        Exposure2012 => "Exposure2012",
        Contrast2012 => "Contrast2012",
        Highlights2012 => "Highlights2012",
        Shadows2012 => "Shadows2012",
        Saturation => "Saturation",
        Vibrance => "Vibrance",
        HasCrop => "HasCrop",
        HasSettings => "HasSettings",
        AlreadyApplied => "AlreadyApplied",
        // dc
        Format => "format",
        Title => "title",
        Creator => "creator",
        Subject => "subject",
        Rights => "rights",
        DcDescription => "description",
        // xmpMM
        DocumentId => "DocumentID",
        InstanceId => "InstanceID",
        OriginalDocumentId => "OriginalDocumentID",
        PreservedFileName => "PreservedFileName",
    }
}

/// A qualified XMP name, `prefix:local`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Property {
    pub namespace: Namespace,
    pub name: Name,
}

impl Property {
    pub const NONE: Self = Self::new(Namespace::Unknown, Name::Unknown);
    pub const ROOT: Self = Self::new(Namespace::X, Name::XmpMeta);

    pub const fn new(namespace: Namespace, name: Name) -> Self {
        Self { namespace, name }
    }

    /// Split `prefix:local` and look both halves up. A name without a
    /// prefix has an `Unknown` namespace.
    pub fn from_qualified(text: &[u8]) -> Self {
        match text.iter().position(|&b| b == b':') {
            Some(colon) => Self::new(Namespace::from_bytes(&text[..colon]), Name::from_bytes(&text[colon + 1..])),
            None => Self::new(Namespace::Unknown, Name::from_bytes(text)),
        }
    }

    /// `rdf:Seq`, `rdf:Bag`, `rdf:Alt`, `rdf:li` and `rdf:Description`
    /// pass their content through to the enclosing property.
    pub fn is_transparent(self) -> bool {
        self.namespace == Namespace::Rdf
            && matches!(self.name, Name::Seq | Name::Bag | Name::Alt | Name::Li | Name::Description)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}
