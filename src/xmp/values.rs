// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsers for the scalar value forms XMP uses.

use std::fmt;

use crate::{Error, Result, TryString};

/// An Exif-style rational, `n/d`. A plain integer parses as `n/1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rational {
    pub numerator: i32,
    pub denominator: u32,
}

impl Rational {
    pub fn to_f64(self) -> Option<f64> {
        (self.denominator != 0).then(|| f64::from(self.numerator) / f64::from(self.denominator))
    }
}

/// A timestamp in any of the ISO 8601 subsets XMP allows.
///
/// Fields a value does not specify stay zero; `offset_minutes` is `None`
/// for local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
    pub offset_minutes: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Uuid(pub [u8; 16]);

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

fn as_str(value: &[u8]) -> Result<&str> {
    std::str::from_utf8(value)
        .map(str::trim)
        .map_err(|_| Error::InvalidData("XMP value is not UTF-8"))
}

pub fn parse_uint(value: &[u8]) -> Result<u32> {
    as_str(value)?.parse().map_err(|_| Error::InvalidData("invalid XMP integer"))
}

pub fn parse_int(value: &[u8]) -> Result<i32> {
    let s = as_str(value)?;
    s.strip_prefix('+').unwrap_or(s).parse().map_err(|_| Error::InvalidData("invalid XMP integer"))
}

pub fn parse_real(value: &[u8]) -> Result<f64> {
    as_str(value)?.parse().map_err(|_| Error::InvalidData("invalid XMP real"))
}

/// `True`/`False` in any case.
pub fn parse_bool(value: &[u8]) -> Result<bool> {
    let s = as_str(value)?;
    if s.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if s.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(Error::InvalidData("invalid XMP boolean"))
    }
}

pub fn parse_rational(value: &[u8]) -> Result<Rational> {
    let bad = || Error::InvalidData("invalid XMP rational");
    let s = as_str(value)?;
    let (n, d) = s.split_once('/').unwrap_or((s, "1"));
    let n = n.strip_prefix('+').unwrap_or(n);
    Ok(Rational {
        numerator: n.trim().parse().map_err(|_| bad())?,
        denominator: d.trim().parse().map_err(|_| bad())?,
    })
}

/// Take the 32 hex digits after the last `:`, as in `uuid:…` or
/// `xmp.did:…`. Dashes are ignored.
pub fn parse_uuid(value: &[u8]) -> Result<Uuid> {
    let bad = Error::InvalidData("invalid XMP UUID");
    let start = value.iter().rposition(|&b| b == b':').map_or(0, |c| c + 1);
    let mut out = [0u8; 16];
    let mut nibbles = 0usize;
    for &c in value[start..].trim_ascii() {
        if c == b'-' {
            continue;
        }
        let v = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => return Err(bad),
        };
        let Some(slot) = out.get_mut(nibbles / 2) else {
            return Err(bad);
        };
        *slot = (*slot << 4) | v;
        nibbles += 1;
    }
    if nibbles != 32 {
        return Err(bad);
    }
    Ok(Uuid(out))
}

/// Cursor over an ASCII date.
struct Scan<'a>(&'a [u8]);

impl Scan<'_> {
    fn eat(&mut self, c: u8) -> bool {
        match self.0.split_first() {
            Some((&first, rest)) if first == c => {
                self.0 = rest;
                true
            },
            _ => false,
        }
    }

    fn number(&mut self, digits: usize) -> Option<u32> {
        let head = self.0.get(..digits)?;
        let mut n = 0u32;
        for &c in head {
            if !c.is_ascii_digit() {
                return None;
            }
            n = n * 10 + u32::from(c - b'0');
        }
        self.0 = &self.0[digits..];
        Some(n)
    }

    /// Up to nine fraction digits as nanoseconds; extra digits are dropped.
    fn fraction(&mut self) -> Option<u32> {
        let len = self.0.iter().take_while(|c| c.is_ascii_digit()).count();
        if len == 0 {
            return None;
        }
        let mut nanos = 0u32;
        for i in 0..9 {
            let digit = self.0.get(i).filter(|_| i < len).map_or(0, |c| u32::from(c - b'0'));
            nanos = nanos * 10 + digit;
        }
        self.0 = &self.0[len..];
        Some(nanos)
    }
}

/// Parse `YYYY`, `YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DDThh:mm[TZD]` or
/// `YYYY-MM-DDThh:mm:ss[.s+][TZD]`, longest form first.
pub fn parse_date(value: &[u8]) -> Result<DateTime> {
    let bad = || Error::InvalidData("invalid XMP date");
    let mut s = Scan(value.trim_ascii());
    let mut d = DateTime::default();
    let narrow = |n: u32| u8::try_from(n).map_err(|_| bad());

    d.year = s.number(4).and_then(|y| u16::try_from(y).ok()).ok_or_else(bad)?;
    if s.eat(b'-') {
        d.month = narrow(s.number(2).ok_or_else(bad)?)?;
        if s.eat(b'-') {
            d.day = narrow(s.number(2).ok_or_else(bad)?)?;
        }
    }
    if d.day != 0 && (s.eat(b'T') || s.eat(b' ')) {
        d.hour = narrow(s.number(2).ok_or_else(bad)?)?;
        if !s.eat(b':') {
            return Err(bad());
        }
        d.minute = narrow(s.number(2).ok_or_else(bad)?)?;
        if s.eat(b':') {
            d.second = narrow(s.number(2).ok_or_else(bad)?)?;
            if s.eat(b'.') {
                d.nanosecond = s.fraction().ok_or_else(bad)?;
            }
        }
        if s.eat(b'Z') {
            d.offset_minutes = Some(0);
        } else {
            let sign = if s.eat(b'+') {
                Some(1i16)
            } else if s.eat(b'-') {
                Some(-1)
            } else {
                None
            };
            if let Some(sign) = sign {
                let hours = s.number(2).ok_or_else(bad)?;
                s.eat(b':');
                let minutes = s.number(2).ok_or_else(bad)?;
                let total = i16::try_from(hours * 60 + minutes).map_err(|_| bad())?;
                d.offset_minutes = Some(sign * total);
            }
        }
    }
    if !s.0.is_empty()
        || d.month > 12
        || d.day > 31
        || d.hour > 23
        || d.minute > 59
        || d.second > 60
        || (d.month == 0 && d.day != 0)
    {
        return Err(bad());
    }
    Ok(d)
}

/// Parse an XMP GPS coordinate, `DDD,MM.mmk` or `DDD,MM,SSk` with `k` one
/// of `NSEW`, into signed decimal degrees.
pub fn parse_gps(value: &[u8]) -> Result<f64> {
    let bad = || Error::InvalidData("invalid XMP GPS coordinate");
    let s = as_str(value)?;
    let (body, hemisphere) = s.split_at_checked(s.len().saturating_sub(1)).ok_or_else(bad)?;
    let sign = match hemisphere {
        "N" | "E" => 1.0,
        "S" | "W" => -1.0,
        _ => return Err(bad()),
    };
    let mut parts = body.split(',');
    let mut next = |scale: f64| -> Result<f64> {
        match parts.next() {
            Some(p) => p.trim().parse::<f64>().map(|v| v / scale).map_err(|_| bad()),
            None => Ok(0.0),
        }
    };
    let degrees = next(1.0)?;
    let minutes = next(60.0)?;
    let seconds = next(3600.0)?;
    if parts.next().is_some() {
        return Err(bad());
    }
    Ok(sign * (degrees + minutes + seconds))
}

/// Copy a value into an owned string.
pub fn parse_text(value: &[u8]) -> Result<TryString> {
    let mut out = TryString::new();
    out.extend_from_slice(value)?;
    Ok(out)
}
