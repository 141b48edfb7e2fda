// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of logship.
//
// logship is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// logship is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even
// the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details.
//
// You should have received a copy of the GNU General Public License along with logship.  If not,
// see <http://www.gnu.org/licenses/>.

//! Decoding the incoming record stream.
//!
//! # Introduction
//!
//! The record source streams log events as libubox "blob" frames: a big-endian 32-bit header
//! whose low twenty-four bits give the length of the frame (header included), followed by a list
//! of named, typed attributes ("blobmsg" attributes). Each attribute has the same header layout,
//! with bit 31 (the "extended" flag) set and the attribute type in bits 24-30, after which come a
//! big-endian 16-bit name length, the NUL-terminated name padded to four bytes, and the value.
//! Every attribute is padded to a four byte boundary.
//!
//! A log event frame carries five attributes:
//!
//! | name       | type   |
//! |------------|--------|
//! | `msg`      | string |
//! | `id`       | int32  |
//! | `priority` | int32  |
//! | `source`   | int32  |
//! | `time`     | int64  |
//!
//! [`Decoder`] accumulates bytes and hands back whole frames; a frame that is well-framed but
//! lacks one of these fields decodes to [`Frame::Malformed`] and is simply skipped by the
//! delivery loop. [`FrameBuilder`] goes the other way, and is used to issue the read request to
//! the record source (and to manufacture records in tests).

use crate::{
    error::{Error, Result},
    facility::Priority,
};

use backtrace::Backtrace;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of a blob attribute header, which is also the smallest legal frame
pub const BLOB_HEADER_LEN: usize = 4;

const BLOB_ATTR_ID_MASK: u32 = 0x7f00_0000;
const BLOB_ATTR_ID_SHIFT: u32 = 24;
const BLOB_ATTR_LEN_MASK: u32 = 0x00ff_ffff;
const BLOB_ATTR_EXTENDED: u32 = 0x8000_0000;

const BLOBMSG_TYPE_STRING: u32 = 3;
const BLOBMSG_TYPE_INT64: u32 = 4;
const BLOBMSG_TYPE_INT32: u32 = 5;
const BLOBMSG_TYPE_INT8: u32 = 7;

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Name length (u16) + name + NUL, padded
fn blobmsg_hdrlen(namelen: usize) -> usize {
    align4(2 + namelen + 1)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          event model                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Where the record source got an event from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Source {
    /// The kernel ring buffer
    Kernel,
    /// A process logging through `syslog(3)`
    Syslog,
    /// The record source itself
    Internal,
    /// Anything else the source may send us
    Other(u32),
}

impl Source {
    /// The value used on the wire
    pub fn raw(&self) -> u32 {
        match self {
            Source::Kernel => 0,
            Source::Syslog => 1,
            Source::Internal => 2,
            Source::Other(n) => *n,
        }
    }
    /// The name used for the `%source%` template placeholder
    pub fn name(&self) -> &'static str {
        match self {
            Source::Kernel => "kernel",
            Source::Syslog => "syslog",
            Source::Internal => "internal",
            Source::Other(_) => "-",
        }
    }
}

impl std::convert::From<u32> for Source {
    fn from(x: u32) -> Self {
        match x {
            0 => Source::Kernel,
            1 => Source::Syslog,
            2 => Source::Internal,
            n => Source::Other(n),
        }
    }
}

/// A single log event, as decoded from the record source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    pub message: String,
    pub id: u32,
    pub priority: Priority,
    pub source: Source,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl LogEvent {
    /// Whole seconds since the epoch
    pub fn seconds(&self) -> i64 {
        (self.timestamp_ms / 1000) as i64
    }
    /// The millisecond remainder
    pub fn millis(&self) -> u32 {
        (self.timestamp_ms % 1000) as u32
    }
    /// Decode the attribute list making up a frame's payload.
    ///
    /// Returns `None` if any of the five fields is missing, has the wrong type or is itself
    /// malformed.
    pub fn from_payload(payload: &[u8]) -> Option<LogEvent> {
        let mut message = None;
        let mut id = None;
        let mut priority = None;
        let mut source = None;
        let mut time = None;

        for attr in Attrs::new(payload) {
            // Unnamed attributes can't be matched to a field
            if !attr.extended {
                continue;
            }
            let (name, value) = attr.named()?;
            match (name, attr.id) {
                (b"msg", BLOBMSG_TYPE_STRING) if message.is_none() => {
                    message = Some(string_value(value)?);
                }
                (b"id", BLOBMSG_TYPE_INT32) if id.is_none() => id = Some(u32_value(value)?),
                (b"priority", BLOBMSG_TYPE_INT32) if priority.is_none() => {
                    priority = Some(u32_value(value)?)
                }
                (b"source", BLOBMSG_TYPE_INT32) if source.is_none() => {
                    source = Some(u32_value(value)?)
                }
                (b"time", BLOBMSG_TYPE_INT64) if time.is_none() => {
                    time = Some(u64_value(value)?)
                }
                _ => (),
            }
        }

        Some(LogEvent {
            message: message?,
            id: id?,
            priority: Priority(priority?),
            source: Source::from(source?),
            timestamp_ms: time?,
        })
    }
    /// Serialize this event as a complete frame
    pub fn to_frame(&self) -> Bytes {
        FrameBuilder::new()
            .string("msg", &self.message)
            .u32("id", self.id)
            .u32("priority", self.priority.0)
            .u32("source", self.source.raw())
            .u64("time", self.timestamp_ms)
            .finish()
    }
}

fn string_value(value: &[u8]) -> Option<String> {
    // blobmsg strings must carry their terminator
    if value.last() != Some(&0) {
        return None;
    }
    let end = value.iter().position(|&b| b == 0).unwrap_or(value.len());
    Some(String::from_utf8_lossy(&value[..end]).into_owned())
}

fn u32_value(mut value: &[u8]) -> Option<u32> {
    if value.len() < 4 {
        return None;
    }
    Some(value.get_u32())
}

fn u64_value(mut value: &[u8]) -> Option<u64> {
    if value.len() < 8 {
        return None;
    }
    Some(value.get_u64())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      attribute iteration                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Attr<'a> {
    id: u32,
    extended: bool,
    data: &'a [u8],
}

impl<'a> Attr<'a> {
    /// Split a blobmsg attribute into name & value
    fn named(&self) -> Option<(&'a [u8], &'a [u8])> {
        let data = self.data;
        if data.len() < 2 {
            return None;
        }
        let namelen = (&data[..2]).get_u16() as usize;
        let hdrlen = blobmsg_hdrlen(namelen);
        if namelen == 0 || hdrlen > data.len() || data[2 + namelen] != 0 {
            return None;
        }
        Some((&data[2..2 + namelen], &data[hdrlen..]))
    }
}

/// Walk a list of padded attributes, stopping at the first one that doesn't fit.
struct Attrs<'a> {
    rem: &'a [u8],
}

impl<'a> Attrs<'a> {
    fn new(rem: &'a [u8]) -> Attrs<'a> {
        Attrs { rem }
    }
}

impl<'a> Iterator for Attrs<'a> {
    type Item = Attr<'a>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.rem.len() < BLOB_HEADER_LEN {
            return None;
        }
        let id_len = (&self.rem[..BLOB_HEADER_LEN]).get_u32();
        let raw_len = (id_len & BLOB_ATTR_LEN_MASK) as usize;
        let pad_len = align4(raw_len);
        if raw_len < BLOB_HEADER_LEN || pad_len > self.rem.len() {
            return None;
        }
        let attr = Attr {
            id: (id_len & BLOB_ATTR_ID_MASK) >> BLOB_ATTR_ID_SHIFT,
            extended: id_len & BLOB_ATTR_EXTENDED != 0,
            data: &self.rem[BLOB_HEADER_LEN..raw_len],
        };
        self.rem = &self.rem[pad_len..];
        Some(attr)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          the decoder                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One complete frame taken off the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Event(LogEvent),
    /// Well-framed, but the field set didn't decode
    Malformed,
}

/// Incremental decoder for the record stream.
///
/// Callers append bytes as they arrive (either via [`Decoder::extend`] or by reading straight
/// into [`Decoder::buffer_mut`]) and then drain whole frames with [`Decoder::frames`]. Partial
/// frames stay put until the rest of their bytes show up.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder {
            buf: BytesMut::with_capacity(4096),
        }
    }
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
    /// Number of bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
    /// Take the next complete frame off the buffer, if there is one.
    ///
    /// `Ok(None)` means "wait for more data". An error means the framing itself is corrupt, after
    /// which nothing further can be decoded.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buf.len() < BLOB_HEADER_LEN {
            return Ok(None);
        }
        let raw_len = ((&self.buf[..BLOB_HEADER_LEN]).get_u32() & BLOB_ATTR_LEN_MASK) as usize;
        if raw_len < BLOB_HEADER_LEN {
            return Err(Error::BadFrame {
                raw_len,
                back: Backtrace::new(),
            });
        }
        if self.buf.len() < raw_len {
            self.buf.reserve(raw_len - self.buf.len());
            return Ok(None);
        }
        let frame = self.buf.split_to(raw_len).freeze();
        Ok(Some(
            match LogEvent::from_payload(&frame[BLOB_HEADER_LEN..]) {
                Some(event) => Frame::Event(event),
                None => Frame::Malformed,
            },
        ))
    }
    /// Lazily drain every complete frame currently buffered.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            decoder: self,
            done: false,
        }
    }
}

/// Iterator returned by [`Decoder::frames`]; it ends when the buffer runs dry, or after yielding
/// a framing error.
pub struct Frames<'a> {
    decoder: &'a mut Decoder,
    done: bool,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<Frame>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.decoder.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         frame building                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Assemble a frame holding a table of named attributes.
pub struct FrameBuilder {
    buf: BytesMut,
}

impl std::default::Default for FrameBuilder {
    fn default() -> Self {
        FrameBuilder::new()
    }
}

impl FrameBuilder {
    pub fn new() -> FrameBuilder {
        let mut buf = BytesMut::with_capacity(128);
        // Placeholder; patched in `finish()`
        buf.put_u32(0);
        FrameBuilder { buf }
    }
    fn put_attr(&mut self, ty: u32, name: &str, value: &[u8]) {
        let hdrlen = blobmsg_hdrlen(name.len());
        let raw_len = BLOB_HEADER_LEN + hdrlen + value.len();
        self.buf
            .put_u32(BLOB_ATTR_EXTENDED | (ty << BLOB_ATTR_ID_SHIFT) | raw_len as u32);
        self.buf.put_u16(name.len() as u16);
        self.buf.put_slice(name.as_bytes());
        self.buf.put_bytes(0, hdrlen - 2 - name.len());
        self.buf.put_slice(value);
        self.buf.put_bytes(0, align4(raw_len) - raw_len);
    }
    pub fn string(mut self, name: &str, value: &str) -> Self {
        let mut v = Vec::with_capacity(value.len() + 1);
        v.extend_from_slice(value.as_bytes());
        v.push(0);
        self.put_attr(BLOBMSG_TYPE_STRING, name, &v);
        self
    }
    pub fn u8(mut self, name: &str, value: u8) -> Self {
        self.put_attr(BLOBMSG_TYPE_INT8, name, &[value]);
        self
    }
    pub fn u32(mut self, name: &str, value: u32) -> Self {
        self.put_attr(BLOBMSG_TYPE_INT32, name, &value.to_be_bytes());
        self
    }
    pub fn u64(mut self, name: &str, value: u64) -> Self {
        self.put_attr(BLOBMSG_TYPE_INT64, name, &value.to_be_bytes());
        self
    }
    pub fn finish(mut self) -> Bytes {
        let len = self.buf.len() as u32 & BLOB_ATTR_LEN_MASK;
        self.buf[..BLOB_HEADER_LEN].copy_from_slice(&len.to_be_bytes());
        self.buf.freeze()
    }
}

/// The request sent to the record source after connecting: stream records, optionally starting
/// with just the last `lines` historical ones.
pub fn read_request(lines: Option<u32>) -> Bytes {
    let b = FrameBuilder::new().u8("stream", 1);
    match lines {
        Some(n) => b.u32("lines", n),
        None => b,
    }
    .finish()
}

#[cfg(test)]
mod test {

    use super::*;

    fn link_up() -> LogEvent {
        LogEvent {
            message: "link up".to_string(),
            id: 1,
            priority: Priority(134),
            source: Source::Syslog,
            timestamp_ms: 1_700_000_000_123,
        }
    }

    #[test]
    fn wire_layout() {
        let frame = FrameBuilder::new().u32("id", 1).finish();
        assert_eq!(
            &frame[..],
            &[
                0x00, 0x00, 0x00, 0x14, // root: 20 bytes
                0x85, 0x00, 0x00, 0x10, // extended | int32, 16 bytes
                0x00, 0x02, b'i', b'd', 0x00, 0x00, 0x00, 0x00, // name, NUL, padding
                0x00, 0x00, 0x00, 0x01, // value
            ]
        );
    }

    #[test]
    fn decode_one() {
        let mut d = Decoder::new();
        d.extend(&link_up().to_frame());
        let frames: Vec<Frame> = d.frames().collect::<Result<_>>().unwrap();
        assert_eq!(frames, vec![Frame::Event(link_up())]);
        assert_eq!(d.buffered(), 0);

        let ev = link_up();
        assert_eq!(ev.seconds(), 1_700_000_000);
        assert_eq!(ev.millis(), 123);
    }

    #[test]
    fn partial_frames_wait() {
        let frame = link_up().to_frame();
        let mut d = Decoder::new();
        // Fewer bytes than a header, then fewer than the whole frame: both are suspension points
        for (i, b) in frame.iter().enumerate() {
            d.extend(&[*b]);
            if i + 1 < frame.len() {
                assert!(d.next_frame().unwrap().is_none());
                assert_eq!(d.buffered(), i + 1);
            }
        }
        assert_eq!(d.next_frame().unwrap(), Some(Frame::Event(link_up())));
    }

    #[test]
    fn several_frames_and_a_tail() {
        let first = link_up();
        let mut second = link_up();
        second.id = 2;
        second.message = "link down".to_string();
        let third = second.to_frame();

        let mut d = Decoder::new();
        d.extend(&first.to_frame());
        d.extend(&second.to_frame());
        d.extend(&third[..10]);

        let frames: Vec<Frame> = d.frames().collect::<Result<_>>().unwrap();
        assert_eq!(frames, vec![Frame::Event(first), Frame::Event(second.clone())]);
        assert_eq!(d.buffered(), 10);

        d.extend(&third[10..]);
        assert_eq!(d.next_frame().unwrap(), Some(Frame::Event(second)));
    }

    #[test]
    fn missing_or_mistyped_fields() {
        // no "time"
        let frame = FrameBuilder::new()
            .string("msg", "hello")
            .u32("id", 1)
            .u32("priority", 6)
            .u32("source", 1)
            .finish();
        let mut d = Decoder::new();
        d.extend(&frame);
        assert_eq!(d.next_frame().unwrap(), Some(Frame::Malformed));

        // "time" as an int32
        let frame = FrameBuilder::new()
            .string("msg", "hello")
            .u32("id", 1)
            .u32("priority", 6)
            .u32("source", 1)
            .u32("time", 1000)
            .finish();
        d.extend(&frame);
        assert_eq!(d.next_frame().unwrap(), Some(Frame::Malformed));

        // ...but extra fields are fine, and the stream carries on after a bad frame
        let frame = FrameBuilder::new()
            .string("msg", "hello")
            .u8("extra", 1)
            .u32("id", 1)
            .u32("priority", 6)
            .u32("source", 7)
            .u64("time", 1000)
            .finish();
        d.extend(&frame);
        match d.next_frame().unwrap() {
            Some(Frame::Event(ev)) => {
                assert_eq!(ev.message, "hello");
                assert_eq!(ev.source, Source::Other(7));
                assert_eq!(ev.source.name(), "-");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn corrupt_header() {
        let mut d = Decoder::new();
        d.extend(&[0x00, 0x00, 0x00, 0x02, 0xff, 0xff]);
        assert!(d.next_frame().is_err());
        let mut frames = d.frames();
        assert!(matches!(frames.next(), Some(Err(_))));
        assert!(frames.next().is_none());
    }

    #[test]
    fn request() {
        let req = read_request(Some(10));
        let mut attrs = Attrs::new(&req[BLOB_HEADER_LEN..]);
        let a = attrs.next().unwrap();
        assert_eq!(a.id, BLOBMSG_TYPE_INT8);
        assert_eq!(a.named().unwrap(), (&b"stream"[..], &[1u8][..]));
        let a = attrs.next().unwrap();
        assert_eq!(a.id, BLOBMSG_TYPE_INT32);
        assert_eq!(a.named().unwrap().0, b"lines");
        assert!(attrs.next().is_none());

        assert_eq!(read_request(None).len(), 4 + 4 + 12 + 4);
    }
}
