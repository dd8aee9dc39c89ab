//! Wire protocol between the shard writer and the shard write server.
//!
//! Every message travels as a TLV frame:
//!
//! | type(1B) | body length(8B, big endian) | body |
//!
//! Request body:
//!
//! | shard id(8B) | point count(4B) | point... |
//!
//! Point:
//!
//! | name len(2B) | name | unix nano(8B) | tag count(2B) | (key len(2B) key value len(2B) value)... |
//! | field count(2B) | (key len(2B) key type(1B) value)... |
//!
//! Response body:
//!
//! | code(4B) | message len(4B) | message |
//!
//! where code 0 means success and carries no message.

use std::io::ErrorKind;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use common_base::influxql::DataType;
use common_base::point::{FieldValue, Fields, Point, Tag, Tags};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ClusterError, Result};

/// WRITE_SHARD_REQUEST_MESSAGE is the frame type of a write shard request.
pub const WRITE_SHARD_REQUEST_MESSAGE: u8 = 1;

/// WRITE_SHARD_RESPONSE_MESSAGE is the frame type of a write shard response.
pub const WRITE_SHARD_RESPONSE_MESSAGE: u8 = 2;

/// MAX_MESSAGE_SIZE is the upper bound of a frame body. Larger frames are
/// rejected before their body is read.
pub const MAX_MESSAGE_SIZE: u64 = 1024 * 1024 * 1024;

/// WRITE_SHARD_ERROR_CODE is sent back when the local store fails a write.
pub const WRITE_SHARD_ERROR_CODE: u32 = 1;

const SUCCESS_CODE: u32 = 0;

/// write_tlv writes a type-length-value frame and flushes it.
pub async fn write_tlv<W: AsyncWrite + Send + Unpin>(w: &mut W, typ: u8, buf: &[u8]) -> Result<()> {
    w.write_u8(typ).await?;
    w.write_u64(buf.len() as u64).await?;
    w.write_all(buf).await?;
    w.flush().await?;
    Ok(())
}

/// read_tlv reads a type-length-value frame. It returns `None` when the peer
/// closed the stream before a new frame started.
pub async fn read_tlv<R: AsyncRead + Send + Unpin>(r: &mut R) -> Result<Option<(u8, Bytes)>> {
    let typ = match r.read_u8().await {
        Ok(typ) => typ,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let size = r.read_u64().await?;
    if size >= MAX_MESSAGE_SIZE {
        return Err(ClusterError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = vec![0_u8; size as usize];
    r.read_exact(buf.as_mut_slice()).await?;

    Ok(Some((typ, Bytes::from(buf))))
}

/// WriteShardRequest carries a batch of points for a single shard.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteShardRequest {
    pub shard_id: u64,
    pub points: Vec<Point>,
}

impl WriteShardRequest {
    pub fn new(shard_id: u64, points: Vec<Point>) -> Self {
        Self { shard_id, points }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(12 + 64 * self.points.len());
        buf.put_u64(self.shard_id);
        buf.put_u32(len_u32(self.points.len(), "points")?);

        for p in &self.points {
            put_u16_bytes(&mut buf, p.name().as_bytes(), "measurement")?;
            buf.put_i64(p.unix_nano());

            buf.put_u16(len_u16(p.tags().len(), "tags")?);
            for tag in p.tags().iter() {
                put_u16_bytes(&mut buf, &tag.key, "tag key")?;
                put_u16_bytes(&mut buf, &tag.value, "tag value")?;
            }

            buf.put_u16(len_u16(p.fields().len(), "fields")?);
            for (key, value) in p.fields() {
                put_u16_bytes(&mut buf, key.as_bytes(), "field key")?;
                buf.put_u8(value.data_type().value());
                match value {
                    FieldValue::Float(v) => buf.put_u64(v.to_bits()),
                    FieldValue::Integer(v) => buf.put_i64(*v),
                    FieldValue::Boolean(v) => buf.put_u8(*v as u8),
                    FieldValue::String(v) => {
                        buf.put_u32(len_u32(v.len(), "field value")?);
                        buf.put_slice(v.as_bytes());
                    }
                }
            }
        }

        Ok(buf.freeze())
    }

    pub fn decode(mut buf: Bytes) -> Result<Self> {
        let shard_id = get_u64(&mut buf)?;
        let n = get_u32(&mut buf)? as usize;

        let mut points = Vec::new();
        for _ in 0..n {
            let name = get_string(&mut buf, 2)?;
            let unix_nano = get_u64(&mut buf)? as i64;

            let tag_count = get_u16(&mut buf)? as usize;
            let mut tags = Vec::with_capacity(tag_count);
            for _ in 0..tag_count {
                let key = get_u16_bytes(&mut buf)?;
                let value = get_u16_bytes(&mut buf)?;
                tags.push(Tag::new(key.to_vec(), value.to_vec()));
            }

            let field_count = get_u16(&mut buf)? as usize;
            let mut fields = Fields::new();
            for _ in 0..field_count {
                let key = get_string(&mut buf, 2)?;
                let typ = get_u8(&mut buf)?;
                let value = match DataType::from_value(typ) {
                    Some(DataType::Float) => FieldValue::Float(f64::from_bits(get_u64(&mut buf)?)),
                    Some(DataType::Integer) => FieldValue::Integer(get_u64(&mut buf)? as i64),
                    Some(DataType::Boolean) => FieldValue::Boolean(get_u8(&mut buf)? != 0),
                    Some(DataType::String) => FieldValue::String(get_string(&mut buf, 4)?),
                    None => {
                        return Err(ClusterError::Malformed(format!(
                            "unknown field type: {}",
                            typ
                        )))
                    }
                };
                fields.insert(key, value);
            }

            let p = Point::new(name, Tags::new(tags), fields, unix_nano)
                .map_err(|e| ClusterError::Malformed(e.to_string()))?;
            points.push(p);
        }

        if buf.has_remaining() {
            return Err(ClusterError::Malformed(format!(
                "{} trailing bytes after write shard request",
                buf.remaining()
            )));
        }

        Ok(Self { shard_id, points })
    }
}

/// WriteShardResponse acknowledges a write shard request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteShardResponse {
    Success,
    Error { code: u32, message: String },
}

impl WriteShardResponse {
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        match self {
            Self::Success => buf.put_u32(SUCCESS_CODE),
            Self::Error { code, message } => {
                buf.put_u32(*code);
                buf.put_u32(len_u32(message.len(), "message")?);
                buf.put_slice(message.as_bytes());
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(mut buf: Bytes) -> Result<Self> {
        let code = get_u32(&mut buf)?;
        let resp = if code == SUCCESS_CODE {
            Self::Success
        } else {
            Self::Error {
                code,
                message: get_string(&mut buf, 4)?,
            }
        };

        if buf.has_remaining() {
            return Err(ClusterError::Malformed(format!(
                "{} trailing bytes after write shard response",
                buf.remaining()
            )));
        }

        Ok(resp)
    }

    /// into_result turns an error response into `ClusterError::WriteShard`.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Success => Ok(()),
            Self::Error { code, message } => Err(ClusterError::WriteShard { code, message }),
        }
    }
}

fn len_u16(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| ClusterError::Malformed(format!("{} too long: {}", what, len)))
}

fn len_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| ClusterError::Malformed(format!("{} too long: {}", what, len)))
}

fn put_u16_bytes(buf: &mut BytesMut, v: &[u8], what: &str) -> Result<()> {
    buf.put_u16(len_u16(v.len(), what)?);
    buf.put_slice(v);
    Ok(())
}

fn ensure(buf: &Bytes, n: usize) -> Result<()> {
    if buf.remaining() < n {
        return Err(ClusterError::Malformed(format!(
            "short buffer: need {} bytes, have {}",
            n,
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_u8(buf: &mut Bytes) -> Result<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_u16(buf: &mut Bytes) -> Result<u16> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

fn get_u32(buf: &mut Bytes) -> Result<u32> {
    ensure(buf, 4)?;
    Ok(buf.get_u32())
}

fn get_u64(buf: &mut Bytes) -> Result<u64> {
    ensure(buf, 8)?;
    Ok(buf.get_u64())
}

fn get_u16_bytes(buf: &mut Bytes) -> Result<Bytes> {
    let n = get_u16(buf)? as usize;
    ensure(buf, n)?;
    Ok(buf.split_to(n))
}

/// get_string reads a string prefixed by a `prefix`-byte length (2 or 4).
fn get_string(buf: &mut Bytes, prefix: usize) -> Result<String> {
    let n = match prefix {
        2 => get_u16(buf)? as usize,
        _ => get_u32(buf)? as usize,
    };
    ensure(buf, n)?;
    let b = buf.split_to(n);
    String::from_utf8(b.to_vec()).map_err(|e| ClusterError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes, BytesMut};
    use common_base::point::{FieldValue, Fields, Point, Tags};
    use quickcheck::{quickcheck, TestResult};

    use crate::error::ClusterError;
    use crate::rpc::{
        read_tlv, write_tlv, WriteShardRequest, WriteShardResponse, MAX_MESSAGE_SIZE,
        WRITE_SHARD_REQUEST_MESSAGE, WRITE_SHARD_RESPONSE_MESSAGE,
    };

    fn cpu_point(unix_nano: i64) -> Point {
        let tags: Tags = [("host", "server01"), ("region", "uswest")]
            .into_iter()
            .collect();
        let fields = Fields::from([
            ("value".to_string(), FieldValue::Integer(100)),
            ("load".to_string(), FieldValue::Float(0.64)),
            ("up".to_string(), FieldValue::Boolean(true)),
            ("state".to_string(), FieldValue::from("running")),
        ]);
        Point::new("cpu", tags, fields, unix_nano).unwrap()
    }

    #[test]
    fn test_write_shard_request() {
        let req = WriteShardRequest::new(
            1,
            vec![cpu_point(1_444_238_178_437_870_000), cpu_point(-1)],
        );
        let got = WriteShardRequest::decode(req.encode().unwrap()).unwrap();

        assert_eq!(got, req);
        assert_eq!(got.points[0].fields()["value"], FieldValue::Integer(100));
        assert_eq!(got.points[1].unix_nano(), -1);
    }

    #[test]
    fn test_write_shard_request_empty() {
        let req = WriteShardRequest::new(7, vec![]);
        let got = WriteShardRequest::decode(req.encode().unwrap()).unwrap();
        assert_eq!(got.shard_id, 7);
        assert!(got.points.is_empty());
    }

    #[test]
    fn test_write_shard_request_truncated() {
        let buf = WriteShardRequest::new(1, vec![cpu_point(0)]).encode().unwrap();
        let truncated = buf.slice(..buf.len() - 3);

        let err = WriteShardRequest::decode(truncated).unwrap_err();
        assert!(matches!(err, ClusterError::Malformed(_)), "{:?}", err);
    }

    #[test]
    fn test_write_shard_request_trailing_bytes() {
        let mut buf = BytesMut::from(WriteShardRequest::new(1, vec![]).encode().unwrap().as_ref());
        buf.put_u8(0);

        let err = WriteShardRequest::decode(buf.freeze()).unwrap_err();
        assert!(matches!(err, ClusterError::Malformed(_)), "{:?}", err);
    }

    #[test]
    fn test_write_shard_request_unknown_field_type() {
        let mut buf = BytesMut::new();
        buf.put_u64(1);
        buf.put_u32(1);
        buf.put_u16(3);
        buf.put_slice(b"cpu");
        buf.put_i64(0);
        buf.put_u16(0);
        buf.put_u16(1);
        buf.put_u16(5);
        buf.put_slice(b"value");
        buf.put_u8(9);

        let err = WriteShardRequest::decode(buf.freeze()).unwrap_err();
        assert!(matches!(err, ClusterError::Malformed(_)), "{:?}", err);
    }

    #[test]
    fn test_write_shard_response() {
        let ok = WriteShardResponse::decode(WriteShardResponse::Success.encode().unwrap()).unwrap();
        assert_eq!(ok, WriteShardResponse::Success);
        assert!(ok.into_result().is_ok());

        let resp = WriteShardResponse::error(1, "failed to write");
        let got = WriteShardResponse::decode(resp.encode().unwrap()).unwrap();
        assert_eq!(got, resp);
        assert_eq!(
            got.into_result().unwrap_err().to_string(),
            "error code 1: failed to write"
        );
    }

    #[test]
    fn test_write_shard_response_short() {
        let err = WriteShardResponse::decode(Bytes::from_static(&[0, 0])).unwrap_err();
        assert!(matches!(err, ClusterError::Malformed(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_tlv() {
        let mut buf = Vec::new();
        write_tlv(&mut buf, WRITE_SHARD_REQUEST_MESSAGE, b"abc").await.unwrap();
        write_tlv(&mut buf, WRITE_SHARD_RESPONSE_MESSAGE, b"").await.unwrap();

        let mut r = buf.as_slice();
        let (typ, body) = read_tlv(&mut r).await.unwrap().unwrap();
        assert_eq!(typ, WRITE_SHARD_REQUEST_MESSAGE);
        assert_eq!(body.as_ref(), b"abc");

        let (typ, body) = read_tlv(&mut r).await.unwrap().unwrap();
        assert_eq!(typ, WRITE_SHARD_RESPONSE_MESSAGE);
        assert!(body.is_empty());

        assert!(read_tlv(&mut r).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tlv_too_large() {
        let mut buf = vec![WRITE_SHARD_REQUEST_MESSAGE];
        buf.extend_from_slice(&MAX_MESSAGE_SIZE.to_be_bytes());

        let err = read_tlv(&mut buf.as_slice()).await.unwrap_err();
        assert!(
            matches!(err, ClusterError::MessageTooLarge { size, .. } if size == MAX_MESSAGE_SIZE),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_tlv_truncated_body() {
        let mut buf = vec![WRITE_SHARD_REQUEST_MESSAGE];
        buf.extend_from_slice(&10_u64.to_be_bytes());
        buf.extend_from_slice(b"abc");

        let err = read_tlv(&mut buf.as_slice()).await.unwrap_err();
        assert!(matches!(err, ClusterError::Io(_)), "{:?}", err);
    }

    quickcheck! {
        fn prop_write_shard_request_lossless(
            shard_id: u64,
            name: String,
            tags: Vec<(String, String)>,
            ints: Vec<(String, i64)>,
            floats: Vec<(String, f64)>,
            bools: Vec<(String, bool)>,
            strings: Vec<(String, String)>,
            unix_nano: i64
        ) -> TestResult {
            let mut fields = Fields::new();
            for (k, v) in ints {
                fields.insert(k, FieldValue::Integer(v));
            }
            for (k, v) in floats.into_iter().filter(|(_, v)| !v.is_nan()) {
                fields.insert(k, FieldValue::Float(v));
            }
            for (k, v) in bools {
                fields.insert(k, FieldValue::Boolean(v));
            }
            for (k, v) in strings {
                fields.insert(k, FieldValue::String(v));
            }

            let p = match Point::new(name, tags.into_iter().collect(), fields, unix_nano) {
                Ok(p) => p,
                Err(_) => return TestResult::discard(),
            };

            let req = WriteShardRequest::new(shard_id, vec![p]);
            let got = WriteShardRequest::decode(req.encode().unwrap()).unwrap();
            TestResult::from_bool(got == req)
        }
    }
}
