//! BSON 编解码入口模块
//!
//! 编码分两遍：先用 [`CountSink`] 计算精确长度，再按该长度分配缓冲区并用
//! [`WriteSink`] 真正写出。解码在整段输入上创建 [`Deserializer`]，逐个读取文档。

use crate::de::Deserializer;
use crate::document::Document;
use crate::ser::Serializer;
use crate::sink::{CountSink, Sink, WriteSink};
use crate::spec::MIN_BSON_SIZE;
use crate::{BsonError, BsonResult};
use bytes::{Bytes, BytesMut};
use mikubson_common::CodecConfig;
use tracing::{debug, warn};

/// 编码选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// 校验文档键名
    pub check_keys: bool,
    /// 文档中的函数写为 JavaScript 代码而不是丢弃
    pub serialize_functions: bool,
    /// 编码结果的最大字节数（含）
    pub max_size: usize,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::from(&CodecConfig::default())
    }
}

impl From<&CodecConfig> for EncodeOptions {
    fn from(config: &CodecConfig) -> Self {
        Self {
            check_keys: config.check_keys,
            serialize_functions: config.serialize_functions,
            max_size: config.max_bson_size,
        }
    }
}

impl EncodeOptions {
    pub fn with_check_keys(mut self, check_keys: bool) -> Self {
        self.check_keys = check_keys;
        self
    }

    pub fn with_serialize_functions(mut self, serialize_functions: bool) -> Self {
        self.serialize_functions = serialize_functions;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

/// 解码选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// 绝对值小于 2^53 的 Long 解码为普通数字
    pub promote_longs: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::from(&CodecConfig::default())
    }
}

impl From<&CodecConfig> for DecodeOptions {
    fn from(config: &CodecConfig) -> Self {
        Self {
            promote_longs: config.promote_longs,
        }
    }
}

impl DecodeOptions {
    pub fn with_promote_longs(mut self, promote_longs: bool) -> Self {
        self.promote_longs = promote_longs;
        self
    }
}

/// 编码文档
///
/// # Brief
/// 先计数得到精确长度，超过 `max_size` 直接失败；否则分配恰好大小的缓冲区写出
///
/// # Arguments
/// * `doc` - 要编码的文档
/// * `options` - 编码选项
///
/// # Returns
/// 成功返回编码后的字节，失败返回 `SizeExceeded`、`KeyInvalid` 或 `ConversionHookInvalid` 等错误
pub fn encode(doc: &Document, options: &EncodeOptions) -> BsonResult<Bytes> {
    let size = count(doc, options.check_keys, options.serialize_functions)?;
    if size > options.max_size {
        warn!(
            "Document of {} bytes exceeds maximum BSON size {}",
            size, options.max_size
        );
        return Err(BsonError::SizeExceeded {
            limit: options.max_size,
        });
    }

    let mut buf = BytesMut::zeroed(size);
    let mut sink = WriteSink::new(&mut buf, 0, options.max_size);
    Serializer::new(&mut sink, options.check_keys, options.serialize_functions)
        .serialize_document(doc)?;
    let written = sink.size();
    buf.truncate(written);

    debug!("Encoded document with {} fields into {} bytes", doc.len(), written);
    Ok(buf.freeze())
}

/// 把文档编码进调用方提供的缓冲区
///
/// # Brief
/// 从 `offset` 开始写；上限为 `max_size` 与剩余容量中较小者
///
/// # Arguments
/// * `doc` - 要编码的文档
/// * `dest` - 目标缓冲区
/// * `offset` - 起始写入位置
/// * `options` - 编码选项
///
/// # Returns
/// 成功返回最后一个写入字节之后的位置
pub fn encode_into(
    doc: &Document,
    dest: &mut [u8],
    offset: usize,
    options: &EncodeOptions,
) -> BsonResult<usize> {
    let mut sink = WriteSink::new(dest, offset, options.max_size);
    Serializer::new(&mut sink, options.check_keys, options.serialize_functions)
        .serialize_document(doc)?;
    debug!("Encoded {} bytes at offset {}", sink.size(), offset);
    Ok(sink.position())
}

/// 计算文档编码后的字节数，不做键名校验
pub fn compute_encoded_size(doc: &Document, serialize_functions: bool) -> BsonResult<usize> {
    count(doc, false, serialize_functions)
}

fn count(doc: &Document, check_keys: bool, serialize_functions: bool) -> BsonResult<usize> {
    let mut sink = CountSink::new();
    Serializer::new(&mut sink, check_keys, serialize_functions).serialize_document(doc)?;
    Ok(sink.size())
}

/// 解码单个文档
///
/// # Brief
/// 输入至少 5 字节且以 0x00 结尾；第一个文档之后的多余字节被忽略
///
/// # Arguments
/// * `bytes` - 输入字节
/// * `options` - 解码选项
///
/// # Returns
/// 成功返回文档，输入不合法时返回对应的解码错误
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> BsonResult<Document> {
    let result = decode_one(bytes, options);
    if let Err(e) = &result {
        debug!("Failed to decode {} bytes: {}", bytes.len(), e);
    }
    result
}

fn decode_one(bytes: &[u8], options: &DecodeOptions) -> BsonResult<Document> {
    if bytes.len() < MIN_BSON_SIZE {
        return Err(BsonError::DocumentTooShort {
            length: bytes.len(),
        });
    }
    let mut de = Deserializer::new(bytes, 0, options.promote_longs)?;
    let doc = de.read_document()?;
    debug!("Decoded document with {} fields from {} bytes", doc.len(), de.position());
    Ok(doc)
}

/// 从 `start` 起顺序解码 `count` 个首尾相接的文档
///
/// # Returns
/// 成功返回文档列表以及最后一个文档之后的位置
pub fn decode_many(
    bytes: &[u8],
    start: usize,
    count: usize,
    options: &DecodeOptions,
) -> BsonResult<(Vec<Document>, usize)> {
    if count == 0 {
        return Ok((Vec::new(), start));
    }
    let mut de = Deserializer::new(bytes, start, options.promote_longs)?;
    let mut docs = Vec::with_capacity(count.min(bytes.len() / MIN_BSON_SIZE));
    for _ in 0..count {
        match de.read_document() {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                debug!("Failed to decode document {} at offset {}: {}", docs.len(), de.position(), e);
                return Err(e);
            }
        }
    }
    debug!("Decoded {} documents ending at offset {}", docs.len(), de.position());
    Ok((docs, de.position()))
}
