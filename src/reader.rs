// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Buffered peek/discard reading with per-region byte budgets.
//!
//! Every scanner in this crate reads through [`Peek`]. The base
//! implementation, [`Source`], buffers an arbitrary [`Read`] and never
//! seeks. [`Bounded`] narrows any `Peek` to a byte budget, so a box or
//! segment parser cannot run past its end, and every byte it consumes is
//! also charged to all enclosing budgets.
//!
//! Integers are big-endian unless a caller decodes a peeked slice itself.

use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder as _};
use log::trace;

use crate::boxes::{FourCC, ItemType};
use crate::{Error, Result, ToU64, TryString};

/// Largest window a single [`Peek::peek`] may request.
pub const MAX_PEEK: usize = 64 * 1024;

/// Minimum refill size of the [`Source`] buffer.
const READ_CHUNK: usize = 8 * 1024;

/// Window used when searching for a string terminator.
const STRING_CHUNK: usize = 64;

/// A byte stream that can look ahead without consuming.
///
/// Invariants every implementation upholds:
/// * a successful `discard(n)` lowers [`remain`](Peek::remain) and raises
///   [`offset`](Peek::offset) by exactly the returned count;
/// * `peek` never moves the cursor, whether it succeeds or not;
/// * once an operation fails on the underlying stream, [`is_ok`](Peek::is_ok)
///   stays false and every further read fails.
pub trait Peek {
    /// Borrow exactly `n` upcoming bytes.
    ///
    /// Fails with [`Error::ShortBuffer`] if `n` exceeds the remaining budget
    /// or the stream ends first. The view is invalidated by the next call.
    fn peek(&mut self, n: usize) -> Result<&[u8]>;

    /// Borrow up to `max` upcoming bytes; empty only at end of budget/stream.
    fn fill_buf(&mut self, max: usize) -> Result<&[u8]>;

    /// Consume `min(n, remain)` bytes and return how many were consumed.
    fn discard(&mut self, n: u64) -> Result<u64>;

    /// Bytes left in this reader's budget.
    fn remain(&self) -> u64;

    /// Bytes consumed since the start of the underlying stream.
    fn offset(&self) -> u64;

    /// False after any failure of the underlying stream.
    fn is_ok(&self) -> bool;
}

/// Buffered [`Peek`] over any [`Read`].
pub struct Source<R> {
    inner: R,
    buf: std::vec::Vec<u8>,
    pos: usize,
    filled: usize,
    offset: u64,
    remain: u64,
    failed: Option<io::ErrorKind>,
}

impl<R: Read> Source<R> {
    /// Wrap a stream of unknown length.
    pub fn new(inner: R) -> Self {
        Self::with_len(inner, u64::MAX)
    }

    /// Wrap a stream whose total length is known.
    pub fn with_len(inner: R, len: u64) -> Self {
        Self {
            inner,
            buf: std::vec::Vec::new(),
            pos: 0,
            filled: 0,
            offset: 0,
            remain: len,
            failed: None,
        }
    }

    /// Whether the total stream length was given up front.
    pub fn len_known(&self) -> bool {
        self.remain != u64::MAX
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn buffered(&self) -> usize {
        self.filled - self.pos
    }

    fn sticky(&self) -> Result<()> {
        match self.failed {
            None => Ok(()),
            Some(io::ErrorKind::UnexpectedEof) => Err(Error::UnexpectedEOF),
            Some(kind) => Err(Error::Io(kind.into())),
        }
    }

    fn fail(&mut self, err: io::Error) -> Error {
        self.failed = Some(err.kind());
        err.into()
    }

    /// Try to hold at least `want` bytes in the buffer. Stops early at end of stream.
    fn fill_to(&mut self, want: usize) -> Result<()> {
        self.sticky()?;
        if self.buffered() >= want {
            return Ok(());
        }
        if self.pos > 0 {
            self.buf.copy_within(self.pos..self.filled, 0);
            self.filled -= self.pos;
            self.pos = 0;
        }
        let cap = want.max(READ_CHUNK);
        if self.buf.len() < cap {
            self.buf.resize(cap, 0);
        }
        while self.filled < want {
            match self.inner.read(&mut self.buf[self.filled..]) {
                Ok(0) => break,
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(e)),
            }
        }
        Ok(())
    }
}

impl<'a> Source<&'a [u8]> {
    /// Wrap an in-memory buffer; its length becomes the budget.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::with_len(data, data.len().to_u64())
    }
}

impl<R: Read> Peek for Source<R> {
    fn peek(&mut self, n: usize) -> Result<&[u8]> {
        if n.to_u64() > self.remain || n > MAX_PEEK {
            self.sticky()?;
            return Err(Error::ShortBuffer);
        }
        self.fill_to(n)?;
        if self.buffered() < n {
            return Err(Error::ShortBuffer);
        }
        Ok(&self.buf[self.pos..self.pos + n])
    }

    fn fill_buf(&mut self, max: usize) -> Result<&[u8]> {
        let max = max.min(MAX_PEEK);
        let max = usize::try_from(self.remain).map_or(max, |r| r.min(max));
        self.fill_to(max)?;
        let n = self.buffered().min(max);
        Ok(&self.buf[self.pos..self.pos + n])
    }

    fn discard(&mut self, n: u64) -> Result<u64> {
        self.sticky()?;
        let n = n.min(self.remain);
        let from_buf = usize::try_from(n).map_or(self.buffered(), |n| n.min(self.buffered()));
        self.pos += from_buf;
        let mut done = from_buf.to_u64();
        let rest = n - done;
        if rest > 0 {
            let copied = io::copy(&mut (&mut self.inner).take(rest), &mut io::sink());
            match copied {
                Ok(copied) => done += copied,
                Err(e) => {
                    self.offset += done;
                    self.remain -= done;
                    return Err(self.fail(e));
                },
            }
        }
        self.offset += done;
        self.remain -= done;
        if done < n {
            trace!("discard of {n} bytes stopped after {done}");
            self.failed = Some(io::ErrorKind::UnexpectedEof);
            return Err(Error::UnexpectedEOF);
        }
        Ok(done)
    }

    fn remain(&self) -> u64 {
        self.remain
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn is_ok(&self) -> bool {
        self.failed.is_none()
    }
}

/// A [`Peek`] restricted to the next `remain` bytes of its parent.
///
/// Consumption is forwarded to the parent, so the parent's budget shrinks in
/// step with the child's. Dropping a `Bounded` does not drain it; call
/// [`Bounded::drain`] to realign the parent at the end of the region.
pub struct Bounded<'a, P: Peek + ?Sized> {
    inner: &'a mut P,
    remain: u64,
}

impl<'a, P: Peek + ?Sized> Bounded<'a, P> {
    /// Narrow `inner` to at most `limit` bytes (never more than it has left).
    pub fn new(inner: &'a mut P, limit: u64) -> Self {
        let remain = limit.min(inner.remain());
        Self { inner, remain }
    }

    /// Consume whatever is left of the budget.
    pub fn drain(&mut self) -> Result<u64> {
        let left = self.remain;
        if left > 0 {
            trace!("draining {left} bytes at offset {}", self.offset());
        }
        self.discard(left)
    }

    pub fn get_mut(&mut self) -> &mut P {
        self.inner
    }
}

impl<P: Peek + ?Sized> Peek for Bounded<'_, P> {
    fn peek(&mut self, n: usize) -> Result<&[u8]> {
        if n.to_u64() > self.remain {
            return Err(Error::ShortBuffer);
        }
        self.inner.peek(n)
    }

    fn fill_buf(&mut self, max: usize) -> Result<&[u8]> {
        let max = usize::try_from(self.remain).map_or(max, |r| r.min(max));
        self.inner.fill_buf(max)
    }

    fn discard(&mut self, n: u64) -> Result<u64> {
        let n = n.min(self.remain);
        let done = self.inner.discard(n);
        // the parent already moved; keep our budget in sync even on failure
        let moved = match &done {
            Ok(d) => *d,
            Err(_) => n.min(self.remain),
        };
        self.remain -= moved;
        done
    }

    fn remain(&self) -> u64 {
        self.remain
    }

    fn offset(&self) -> u64 {
        self.inner.offset()
    }

    fn is_ok(&self) -> bool {
        self.inner.is_ok()
    }
}

impl<P: Peek + ?Sized> Peek for &mut P {
    fn peek(&mut self, n: usize) -> Result<&[u8]> {
        (**self).peek(n)
    }

    fn fill_buf(&mut self, max: usize) -> Result<&[u8]> {
        (**self).fill_buf(max)
    }

    fn discard(&mut self, n: u64) -> Result<u64> {
        (**self).discard(n)
    }

    fn remain(&self) -> u64 {
        (**self).remain()
    }

    fn offset(&self) -> u64 {
        (**self).offset()
    }

    fn is_ok(&self) -> bool {
        (**self).is_ok()
    }
}

/// Version and flag bits of an ISO-BMFF full box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(pub u32);

impl Flags {
    pub const fn version(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The low 24 flag bits.
    pub const fn flags(self) -> u32 {
        self.0 & 0x00ff_ffff
    }

    pub const fn has(self, bit: u32) -> bool {
        self.flags() & bit != 0
    }
}

/// Typed big-endian readers on top of any [`Peek`].
pub trait PeekExt: Peek {
    /// Peek `n` bytes and discard them once `f` has looked at them.
    fn read_with<T>(&mut self, n: usize, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        let value = f(self.peek(n)?);
        self.discard(n.to_u64())?;
        Ok(value)
    }

    /// Discard exactly `n` bytes or fail with [`Error::ShortBuffer`].
    fn skip(&mut self, n: u64) -> Result<()> {
        if n > self.remain() {
            return Err(Error::ShortBuffer);
        }
        self.discard(n)?;
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.read_with(1, |b| b[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        self.read_with(2, BigEndian::read_u16)
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.read_with(4, BigEndian::read_u32)
    }

    fn read_u64(&mut self) -> Result<u64> {
        self.read_with(8, BigEndian::read_u64)
    }

    /// Read a `bits`-wide unsigned field; zero width reads nothing and yields 0.
    fn read_uint_n(&mut self, bits: u8) -> Result<u64> {
        match bits {
            0 => Ok(0),
            8 => self.read_u8().map(u64::from),
            16 => self.read_u16().map(u64::from),
            32 => self.read_u32().map(u64::from),
            64 => self.read_u64(),
            _ => Err(Error::InvalidUintN(bits)),
        }
    }

    fn read_four_cc(&mut self) -> Result<FourCC> {
        self.read_with(4, |b| FourCC::from([b[0], b[1], b[2], b[3]]))
    }

    /// Read an item type code, swallowing a trailing NUL some HEIF writers emit.
    fn read_item_type(&mut self) -> Result<ItemType> {
        let buf = self.fill_buf(5)?;
        if buf.len() < 4 {
            return Err(Error::ShortBuffer);
        }
        let code = [buf[0], buf[1], buf[2], buf[3]];
        let used = if buf.len() == 5 && buf[4] == 0 { 5 } else { 4 };
        self.discard(used)?;
        Ok(ItemType::from(code))
    }

    /// Read bytes up to and including a NUL; the NUL is not returned.
    fn read_null_string(&mut self) -> Result<TryString> {
        let mut out = TryString::new();
        loop {
            let chunk = self.fill_buf(STRING_CHUNK)?;
            if chunk.is_empty() {
                return Err(Error::UnterminatedString);
            }
            let (take, consumed) = match chunk.iter().position(|&b| b == 0) {
                Some(nul) => (nul, nul + 1),
                None => (chunk.len(), chunk.len()),
            };
            out.extend_from_slice(&chunk[..take])?;
            self.discard(consumed.to_u64())?;
            if take < consumed {
                return Ok(out);
            }
        }
    }

    fn read_flags(&mut self) -> Result<Flags> {
        self.read_u32().map(Flags)
    }

    /// Read `n` bytes into a fixed array.
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.read_with(N, |b| {
            let mut out = [0u8; N];
            out.copy_from_slice(b);
            out
        })
    }

    /// Copy bytes into a fresh vector until `limit` bytes were copied, the
    /// budget is spent, or the stream ends.
    fn read_up_to(&mut self, limit: u64) -> Result<TryString> {
        let want = limit.min(self.remain());
        let mut out = TryString::with_capacity(usize::try_from(want).map_or(MAX_PEEK, |w| w.min(MAX_PEEK)))?;
        let mut left = want;
        while left > 0 {
            let chunk = self.fill_buf(usize::try_from(left).unwrap_or(MAX_PEEK).min(MAX_PEEK))?;
            if chunk.is_empty() {
                break;
            }
            let n = chunk.len();
            out.extend_from_slice(chunk)?;
            self.discard(n.to_u64())?;
            left -= n.to_u64();
        }
        Ok(out)
    }
}

impl<T: Peek + ?Sized> PeekExt for T {}
