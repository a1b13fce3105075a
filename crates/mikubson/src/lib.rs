//! # mikubson - BSON 文档编解码器
//!
//! mikubson 把通用的嵌套文档模型编码为 BSON 线格式,并把 BSON 字节流解码回同一模型。
//!
//! - **计数/写入双 Sink**：同一套递归序列化逻辑既可以只计数，也可以真正写字节，
//!   两次遍历得到的长度永远一致
//! - **长度回填**：文档长度和类型标记先占位，写完后按下标回填
//! - **边界检查解码**：每一次读取都受限于当前文档的结束位置
//! - **扩展类型**：Long、Timestamp、ObjectId、Binary、Code、DBRef、MinKey/MaxKey 等
//!
//! ## 快速开始
//!
//! ```rust,ignore
//! use mikubson::{decode, encode, doc, DecodeOptions, EncodeOptions};
//!
//! let doc = doc! { "name": "mikubson", "version": 1 };
//! let bytes = encode(&doc, &EncodeOptions::default()).unwrap();
//! let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
//! ```

pub mod spec;
pub mod value;
pub mod document;
pub mod sink;
pub mod keys;
pub mod ser;
pub mod de;
pub mod codec;
pub mod json;

pub use codec::{
    compute_encoded_size, decode, decode_many, encode, encode_into, DecodeOptions, EncodeOptions,
};
pub use document::Document;
pub use mikubson_common::ObjectId;
pub use value::{
    Binary, BsonValue, Convertible, DbRef, JavaScriptValue, Long, Regex, RegexFlags, Timestamp,
    ToBson,
};

use thiserror::Error;

/// BSON 编解码的错误类型
///
/// 每个变体都是终止性的：出错后整个调用失败，不返回部分结果。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BsonError {
    /// 写入超出体积上限或目标缓冲区容量
    #[error("Document is larger than the maximum BSON size of {limit} bytes")]
    SizeExceeded { limit: usize },

    /// 键名不合法
    #[error("Invalid key {key:?}: {reason}")]
    KeyInvalid { key: String, reason: &'static str },

    /// toBSON 转换槽不可调用
    #[error("Invalid conversion hook: {0}")]
    ConversionHookInvalid(String),

    /// 文档长度小于 5 字节
    #[error("Bad BSON: document length {length} is less than 5 bytes")]
    DocumentTooShort { length: usize },

    /// 读取越过了当前文档的边界
    #[error("Bad BSON: {message} at offset {offset}")]
    BoundsExceeded { offset: usize, message: String },

    /// C 字符串缺少结束符
    #[error("Bad BSON: unterminated string starting at offset {offset}")]
    CStringUnterminated { offset: usize },

    /// 文档体消费的字节数与长度前缀不符
    #[error("Bad BSON: document body ended at offset {actual}, expected {expected}")]
    TrailingOrMissingBytes { expected: usize, actual: usize },

    /// 数组键不是十进制下标
    #[error("Bad BSON: invalid array index {0:?}")]
    IndexInvalid(String),

    /// 未知的类型标记
    #[error("Unhandled BSON type 0x{tag:02x} at offset {offset}")]
    UnknownType { tag: u8, offset: usize },

    /// 文档结束标记 0x00 缺失
    #[error("Missing end of document marker at offset {offset}")]
    MissingTerminator { offset: usize },

    /// 字符串不是有效的 UTF-8 编码
    #[error("Bad BSON: invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// 嵌套层级过深
    #[error("Nesting too deep: max {0}")]
    NestingTooDeep(usize),

    /// JSON 不能转换为 BSON 值
    #[error("Invalid extended JSON: {0}")]
    InvalidJson(String),
}

/// 不携带上下文的错误类别，便于匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SizeExceeded,
    KeyInvalid,
    ConversionHookInvalid,
    DocumentTooShort,
    BoundsExceeded,
    CStringUnterminated,
    TrailingOrMissingBytes,
    IndexInvalid,
    UnknownType,
    MissingTerminator,
    InvalidUtf8,
    NestingTooDeep,
    InvalidJson,
}

impl BsonError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BsonError::SizeExceeded { .. } => ErrorKind::SizeExceeded,
            BsonError::KeyInvalid { .. } => ErrorKind::KeyInvalid,
            BsonError::ConversionHookInvalid(_) => ErrorKind::ConversionHookInvalid,
            BsonError::DocumentTooShort { .. } => ErrorKind::DocumentTooShort,
            BsonError::BoundsExceeded { .. } => ErrorKind::BoundsExceeded,
            BsonError::CStringUnterminated { .. } => ErrorKind::CStringUnterminated,
            BsonError::TrailingOrMissingBytes { .. } => ErrorKind::TrailingOrMissingBytes,
            BsonError::IndexInvalid(_) => ErrorKind::IndexInvalid,
            BsonError::UnknownType { .. } => ErrorKind::UnknownType,
            BsonError::MissingTerminator { .. } => ErrorKind::MissingTerminator,
            BsonError::InvalidUtf8 { .. } => ErrorKind::InvalidUtf8,
            BsonError::NestingTooDeep(_) => ErrorKind::NestingTooDeep,
            BsonError::InvalidJson(_) => ErrorKind::InvalidJson,
        }
    }
}

/// BSON 操作的 Result 类型别名
pub type BsonResult<T> = Result<T, BsonError>;
