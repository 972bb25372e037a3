// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A tag-level tokenizer for XMP packets.
//!
//! This is not an XML parser. It understands just enough of the syntax XMP
//! writers emit: start, stop and self-closing tags, quoted attributes,
//! comments, and text between tags. Values are borrowed from the packet
//! unchanged; entities are not expanded.

use log::trace;

use super::names::Property;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Start,
    /// `<a/>`, or `<a x="1"/>` once its attributes were read
    Solo,
    Stop,
    /// `<?`, taken as the end of the document
    Eof,
}

#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub property: Property,
    /// Innermost open element when this tag was read.
    pub parent: Property,
    pub kind: TagKind,
    /// Attributes follow the name and have not been read yet.
    pub has_attributes: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Attribute<'a> {
    pub property: Property,
    pub value: &'a [u8],
}

pub struct Tokenizer<'a> {
    buf: &'a [u8],
    pos: usize,
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

impl<'a> Tokenizer<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'a [u8] {
        self.buf.get(self.pos..).unwrap_or_default()
    }

    fn skip_whitespace(&mut self) {
        let n = self.rest().iter().take_while(|&&b| is_space(b)).count();
        self.pos += n;
    }

    /// Move past the next occurrence of `needle`, or to the end.
    fn skip_past(&mut self, needle: &[u8]) {
        self.pos = match find(self.rest(), needle) {
            Some(i) => self.pos + i + needle.len(),
            None => self.buf.len(),
        };
    }

    fn read_name(&mut self) -> Result<Property> {
        let rest = self.rest();
        let len = rest
            .iter()
            .take_while(|&&b| !is_space(b) && !matches!(b, b'>' | b'/' | b'='))
            .count();
        if len == 0 {
            return Err(Error::InvalidData("empty XMP name"));
        }
        self.pos += len;
        Ok(Property::from_qualified(&rest[..len]))
    }

    /// Find the next tag. `None` once the packet is exhausted.
    pub fn read_tag_header(&mut self, parent: Property) -> Result<Option<Tag>> {
        loop {
            let Some(lt) = self.rest().iter().position(|&b| b == b'<') else {
                self.pos = self.buf.len();
                return Ok(None);
            };
            self.pos += lt + 1;
            let mut tag = Tag {
                property: Property::NONE,
                parent,
                kind: TagKind::Start,
                has_attributes: false,
            };
            match self.rest().first() {
                None => return Ok(None),
                Some(b'?') => {
                    tag.kind = TagKind::Eof;
                    return Ok(Some(tag));
                },
                Some(b'!') => {
                    if self.rest().starts_with(b"!--") {
                        self.skip_past(b"-->");
                    } else if self.rest().starts_with(b"![CDATA[") {
                        self.skip_past(b"]]>");
                    } else {
                        self.skip_past(b">");
                    }
                    continue;
                },
                Some(b'/') => {
                    self.pos += 1;
                    tag.property = self.read_name()?;
                    tag.kind = TagKind::Stop;
                    self.skip_past(b">");
                    return Ok(Some(tag));
                },
                Some(_) => {},
            }
            tag.property = self.read_name()?;
            let rest = self.rest();
            match rest.first() {
                Some(b'>') => self.pos += 1,
                Some(b'/') if rest.get(1) == Some(&b'>') => {
                    self.pos += 2;
                    tag.kind = TagKind::Solo;
                },
                Some(&b) if is_space(b) => tag.has_attributes = true,
                _ => return Err(Error::InvalidData("malformed XMP tag")),
            }
            trace!("<{}> {:?} under {}", tag.property, tag.kind, tag.parent);
            return Ok(Some(tag));
        }
    }

    /// Read the next attribute of `tag`. `None` once the tag is closed, in
    /// which case `tag.kind` tells whether it was self-closing.
    pub fn read_attribute(&mut self, tag: &mut Tag) -> Result<Option<Attribute<'a>>> {
        if !tag.has_attributes {
            return Ok(None);
        }
        self.skip_whitespace();
        let rest = self.rest();
        match rest.first() {
            None => return Err(Error::InvalidData("unterminated XMP tag")),
            Some(b'>') => {
                self.pos += 1;
                tag.has_attributes = false;
                return Ok(None);
            },
            Some(b'/') if rest.get(1) == Some(&b'>') => {
                self.pos += 2;
                tag.has_attributes = false;
                tag.kind = TagKind::Solo;
                return Ok(None);
            },
            Some(_) => {},
        }
        let property = self.read_name()?;
        self.skip_whitespace();
        if self.rest().first() != Some(&b'=') {
            return Err(Error::InvalidData("XMP attribute without value"));
        }
        self.pos += 1;
        self.skip_whitespace();
        let rest = self.rest();
        let quote = match rest.first() {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => return Err(Error::InvalidData("unquoted XMP attribute")),
        };
        let Some(len) = rest[1..].iter().position(|&b| b == quote) else {
            return Err(Error::InvalidData("unterminated XMP attribute"));
        };
        self.pos += len + 2;
        Ok(Some(Attribute {
            property,
            value: &rest[1..=len],
        }))
    }

    /// Read the text before the next tag, without surrounding whitespace.
    pub fn read_tag_value(&mut self) -> &'a [u8] {
        let rest = self.rest();
        let len = rest.iter().position(|&b| b == b'<').unwrap_or(rest.len());
        self.pos += len;
        rest[..len].trim_ascii()
    }
}
