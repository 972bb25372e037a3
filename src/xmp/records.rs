// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded XMP fields, one record per namespace.
//!
//! Every `set` takes a local name and its raw value. Names a record does
//! not store come back as [`Error::PropertyNotSet`]; the first value seen
//! for a field wins.

use super::names::Name;
use super::values::{
    parse_bool, parse_date, parse_gps, parse_int, parse_rational, parse_real, parse_text, parse_uint, parse_uuid,
    DateTime, Rational, Uuid,
};
use crate::{Error, Result, TryString, TryVec};

fn once<T>(slot: &mut Option<T>, value: impl FnOnce() -> Result<T>) -> Result<()> {
    if slot.is_none() {
        *slot = Some(value()?);
    }
    Ok(())
}

/// `xmp:` basic properties.
#[derive(Debug, Default)]
pub struct Basic {
    pub create_date: Option<DateTime>,
    pub modify_date: Option<DateTime>,
    pub metadata_date: Option<DateTime>,
    pub creator_tool: Option<TryString>,
    pub label: Option<TryString>,
    pub rating: Option<i32>,
}

impl Basic {
    pub(crate) fn set(&mut self, name: Name, v: &[u8]) -> Result<()> {
        match name {
            Name::CreateDate => once(&mut self.create_date, || parse_date(v)),
            Name::ModifyDate => once(&mut self.modify_date, || parse_date(v)),
            Name::MetadataDate => once(&mut self.metadata_date, || parse_date(v)),
            Name::CreatorTool => once(&mut self.creator_tool, || parse_text(v)),
            Name::Label => once(&mut self.label, || parse_text(v)),
            Name::Rating => once(&mut self.rating, || parse_int(v)),
            _ => Err(Error::PropertyNotSet),
        }
    }
}

/// The `exif:Flash` structure.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flash {
    pub fired: Option<bool>,
    pub return_mode: Option<u32>,
    pub mode: Option<u32>,
    pub function: Option<bool>,
    pub red_eye_mode: Option<bool>,
}

/// `exif:` and `exifEX:` properties.
#[derive(Debug, Default)]
pub struct Exif {
    pub exif_version: Option<TryString>,
    pub date_time_original: Option<DateTime>,
    pub date_time_digitized: Option<DateTime>,
    pub exposure_time: Option<Rational>,
    pub f_number: Option<Rational>,
    pub exposure_program: Option<u32>,
    pub exposure_mode: Option<u32>,
    pub exposure_bias: Option<Rational>,
    /// First entry of `exif:ISOSpeedRatings` (or `exifEX:PhotographicSensitivity`).
    /// Later entries of the sequence are ignored.
    pub iso_speed: Option<u32>,
    pub aperture: Option<Rational>,
    pub max_aperture: Option<Rational>,
    pub shutter_speed: Option<Rational>,
    pub metering_mode: Option<u32>,
    pub flash: Flash,
    pub focal_length: Option<Rational>,
    pub focal_length_35mm: Option<u32>,
    pub pixel_x_dimension: Option<u32>,
    pub pixel_y_dimension: Option<u32>,
    pub color_space: Option<u32>,
    pub white_balance: Option<u32>,
    pub scene_capture_type: Option<u32>,
    pub subject_distance: Option<Rational>,
    /// Decimal degrees, north positive.
    pub gps_latitude: Option<f64>,
    /// Decimal degrees, east positive.
    pub gps_longitude: Option<f64>,
    pub gps_altitude: Option<Rational>,
    pub gps_altitude_ref: Option<u32>,
    pub lens_make: Option<TryString>,
    pub lens_model: Option<TryString>,
    pub body_serial_number: Option<TryString>,
}

impl Exif {
    pub(crate) fn set(&mut self, name: Name, v: &[u8]) -> Result<()> {
        match name {
            Name::ExifVersion => once(&mut self.exif_version, || parse_text(v)),
            Name::DateTimeOriginal => once(&mut self.date_time_original, || parse_date(v)),
            Name::DateTimeDigitized => once(&mut self.date_time_digitized, || parse_date(v)),
            Name::ExposureTime => once(&mut self.exposure_time, || parse_rational(v)),
            Name::FNumber => once(&mut self.f_number, || parse_rational(v)),
            Name::ExposureProgram => once(&mut self.exposure_program, || parse_uint(v)),
            Name::ExposureMode => once(&mut self.exposure_mode, || parse_uint(v)),
            Name::ExposureBiasValue => once(&mut self.exposure_bias, || parse_rational(v)),
            Name::IsoSpeedRatings | Name::PhotographicSensitivity => once(&mut self.iso_speed, || parse_uint(v)),
            Name::ApertureValue => once(&mut self.aperture, || parse_rational(v)),
            Name::MaxApertureValue => once(&mut self.max_aperture, || parse_rational(v)),
            Name::ShutterSpeedValue => once(&mut self.shutter_speed, || parse_rational(v)),
            Name::MeteringMode => once(&mut self.metering_mode, || parse_uint(v)),
            Name::Fired => once(&mut self.flash.fired, || parse_bool(v)),
            Name::Return => once(&mut self.flash.return_mode, || parse_uint(v)),
            Name::Mode => once(&mut self.flash.mode, || parse_uint(v)),
            Name::Function => once(&mut self.flash.function, || parse_bool(v)),
            Name::RedEyeMode => once(&mut self.flash.red_eye_mode, || parse_bool(v)),
            Name::FocalLength => once(&mut self.focal_length, || parse_rational(v)),
            Name::FocalLengthIn35mmFilm => once(&mut self.focal_length_35mm, || parse_uint(v)),
            Name::PixelXDimension => once(&mut self.pixel_x_dimension, || parse_uint(v)),
            Name::PixelYDimension => once(&mut self.pixel_y_dimension, || parse_uint(v)),
            Name::ColorSpace => once(&mut self.color_space, || parse_uint(v)),
            Name::WhiteBalance => once(&mut self.white_balance, || parse_uint(v)),
            Name::SceneCaptureType => once(&mut self.scene_capture_type, || parse_uint(v)),
            Name::SubjectDistance => once(&mut self.subject_distance, || parse_rational(v)),
            Name::GpsLatitude => once(&mut self.gps_latitude, || parse_gps(v)),
            Name::GpsLongitude => once(&mut self.gps_longitude, || parse_gps(v)),
            Name::GpsAltitude => once(&mut self.gps_altitude, || parse_rational(v)),
            Name::GpsAltitudeRef => once(&mut self.gps_altitude_ref, || parse_uint(v)),
            Name::LensMake => once(&mut self.lens_make, || parse_text(v)),
            Name::LensModel => once(&mut self.lens_model, || parse_text(v)),
            Name::BodySerialNumber => once(&mut self.body_serial_number, || parse_text(v)),
            _ => Err(Error::PropertyNotSet),
        }
    }
}

/// `tiff:` properties.
#[derive(Debug, Default)]
pub struct Tiff {
    pub make: Option<TryString>,
    pub model: Option<TryString>,
    pub orientation: Option<u32>,
    pub image_width: Option<u32>,
    pub image_length: Option<u32>,
    pub x_resolution: Option<Rational>,
    pub y_resolution: Option<Rational>,
    pub resolution_unit: Option<u32>,
    pub software: Option<TryString>,
    pub artist: Option<TryString>,
    pub copyright: Option<TryString>,
    pub date_time: Option<DateTime>,
}

impl Tiff {
    pub(crate) fn set(&mut self, name: Name, v: &[u8]) -> Result<()> {
        match name {
            Name::Make => once(&mut self.make, || parse_text(v)),
            Name::Model => once(&mut self.model, || parse_text(v)),
            Name::Orientation => once(&mut self.orientation, || parse_uint(v)),
            Name::ImageWidth => once(&mut self.image_width, || parse_uint(v)),
            Name::ImageLength => once(&mut self.image_length, || parse_uint(v)),
            Name::XResolution => once(&mut self.x_resolution, || parse_rational(v)),
            Name::YResolution => once(&mut self.y_resolution, || parse_rational(v)),
            Name::ResolutionUnit => once(&mut self.resolution_unit, || parse_uint(v)),
            Name::Software => once(&mut self.software, || parse_text(v)),
            Name::Artist => once(&mut self.artist, || parse_text(v)),
            Name::Copyright => once(&mut self.copyright, || parse_text(v)),
            Name::DateTime => once(&mut self.date_time, || parse_date(v)),
            _ => Err(Error::PropertyNotSet),
        }
    }
}

/// `aux:` (Adobe auxiliary) properties.
#[derive(Debug, Default)]
pub struct Aux {
    pub serial_number: Option<TryString>,
    pub lens_info: Option<TryString>,
    pub lens: Option<TryString>,
    pub lens_id: Option<u32>,
    pub lens_serial_number: Option<TryString>,
    pub image_number: Option<u32>,
    pub flash_compensation: Option<Rational>,
    pub firmware: Option<TryString>,
    pub approximate_focus_distance: Option<Rational>,
}

impl Aux {
    pub(crate) fn set(&mut self, name: Name, v: &[u8]) -> Result<()> {
        match name {
            Name::SerialNumber => once(&mut self.serial_number, || parse_text(v)),
            Name::LensInfo => once(&mut self.lens_info, || parse_text(v)),
            Name::Lens => once(&mut self.lens, || parse_text(v)),
            Name::LensId => once(&mut self.lens_id, || parse_uint(v)),
            Name::LensSerialNumber => once(&mut self.lens_serial_number, || parse_text(v)),
            Name::ImageNumber => once(&mut self.image_number, || parse_uint(v)),
            Name::FlashCompensation => once(&mut self.flash_compensation, || parse_rational(v)),
            Name::Firmware => once(&mut self.firmware, || parse_text(v)),
            Name::ApproximateFocusDistance => once(&mut self.approximate_focus_distance, || parse_rational(v)),
            _ => Err(Error::PropertyNotSet),
        }
    }
}

/// `crs:` (Camera Raw settings) properties.
#[derive(Debug, Default)]
pub struct Crs {
    pub version: Option<TryString>,
    pub process_version: Option<TryString>,
    pub raw_file_name: Option<TryString>,
    pub camera_profile: Option<TryString>,
    pub white_balance: Option<TryString>,
    pub temperature: Option<u32>,
    pub tint: Option<i32>,
    pub exposure: Option<f64>,
    pub contrast: Option<i32>,
    pub highlights: Option<i32>,
    pub shadows: Option<i32>,
    pub saturation: Option<i32>,
    pub vibrance: Option<i32>,
    pub has_crop: Option<bool>,
    pub has_settings: Option<bool>,
    pub already_applied: Option<bool>,
}

impl Crs {
    pub(crate) fn set(&mut self, name: Name, v: &[u8]) -> Result<()> {
        match name {
            Name::Version => once(&mut self.version, || parse_text(v)),
            Name::ProcessVersion => once(&mut self.process_version, || parse_text(v)),
            Name::RawFileName => once(&mut self.raw_file_name, || parse_text(v)),
            Name::CameraProfile => once(&mut self.camera_profile, || parse_text(v)),
            Name::WhiteBalance => once(&mut self.white_balance, || parse_text(v)),
            Name::Temperature => once(&mut self.temperature, || parse_uint(v)),
            Name::Tint => once(&mut self.tint, || parse_int(v)),
            Name::Exposure2012 => once(&mut self.exposure, || parse_real(v)),
            Name::Contrast2012 => once(&mut self.contrast, || parse_int(v)),
            Name::Highlights2012 => once(&mut self.highlights, || parse_int(v)),
            Name::Shadows2012 => once(&mut self.shadows, || parse_int(v)),
            Name::Saturation => once(&mut self.saturation, || parse_int(v)),
            Name::Vibrance => once(&mut self.vibrance, || parse_int(v)),
            Name::HasCrop => once(&mut self.has_crop, || parse_bool(v)),
            Name::HasSettings => once(&mut self.has_settings, || parse_bool(v)),
            Name::AlreadyApplied => once(&mut self.already_applied, || parse_bool(v)),
            _ => Err(Error::PropertyNotSet),
        }
    }
}

/// `dc:` (Dublin Core) properties. Language alternatives keep their first
/// entry; `creator` and `subject` keep every entry.
#[derive(Debug)]
pub struct DublinCore {
    pub format: Option<TryString>,
    pub title: Option<TryString>,
    pub description: Option<TryString>,
    pub rights: Option<TryString>,
    pub creator: TryVec<TryString>,
    pub subject: TryVec<TryString>,
}

impl Default for DublinCore {
    fn default() -> Self {
        Self {
            format: None,
            title: None,
            description: None,
            rights: None,
            creator: TryVec::new(),
            subject: TryVec::new(),
        }
    }
}

impl DublinCore {
    pub(crate) fn set(&mut self, name: Name, v: &[u8]) -> Result<()> {
        match name {
            Name::Format => once(&mut self.format, || parse_text(v)),
            Name::Title => once(&mut self.title, || parse_text(v)),
            Name::DcDescription => once(&mut self.description, || parse_text(v)),
            Name::Rights => once(&mut self.rights, || parse_text(v)),
            Name::Creator => Ok(self.creator.push(parse_text(v)?)?),
            Name::Subject => Ok(self.subject.push(parse_text(v)?)?),
            _ => Err(Error::PropertyNotSet),
        }
    }
}

/// `xmpMM:` (media management) properties.
#[derive(Debug, Default)]
pub struct MediaManagement {
    pub document_id: Option<Uuid>,
    pub instance_id: Option<Uuid>,
    pub original_document_id: Option<Uuid>,
    pub preserved_file_name: Option<TryString>,
}

impl MediaManagement {
    pub(crate) fn set(&mut self, name: Name, v: &[u8]) -> Result<()> {
        match name {
            Name::DocumentId => once(&mut self.document_id, || parse_uuid(v)),
            Name::InstanceId => once(&mut self.instance_id, || parse_uuid(v)),
            Name::OriginalDocumentId => once(&mut self.original_document_id, || parse_uuid(v)),
            Name::PreservedFileName => once(&mut self.preserved_file_name, || parse_text(v)),
            _ => Err(Error::PropertyNotSet),
        }
    }
}
