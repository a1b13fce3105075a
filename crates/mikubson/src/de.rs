//! BSON 反序列化模块
//!
//! [`Deserializer`] 是只读字节区间上的游标。每个嵌套文档/数组都会把可读范围收窄到
//! 自己的长度前缀所声明的区间，任何读取都不会越过当前区间的结束符。
//!
//! 区间的 `end` 指向该区间的结束符 0x00；文档体解析完毕后游标必须恰好停在 `end`。

use crate::document::Document;
use crate::spec::{
    ElementType, BINARY_SUBTYPE_BINARY_OLD, DBREF_DB_KEY, DBREF_ID_KEY, DBREF_REF_KEY,
    MAX_NESTING_DEPTH, MAX_SAFE_INTEGER_BOUND, MIN_BSON_SIZE,
};
use crate::value::{Binary, BsonValue, DbRef, JavaScriptValue, Long, Regex, RegexFlags, Timestamp};
use crate::{BsonError, BsonResult};
use compact_str::CompactString;
use mikubson_common::ObjectId;
use tracing::trace;

/// BSON 反序列化器
pub struct Deserializer<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    promote_longs: bool,
    depth: usize,
}

impl<'a> Deserializer<'a> {
    /// 创建反序列化器
    ///
    /// # Brief
    /// 可读区间为 `[start, data.len())`，其最后一个字节必须是 0x00
    ///
    /// # Arguments
    /// * `data` - 输入字节
    /// * `start` - 游标起始位置
    /// * `promote_longs` - 是否把安全整数范围内的 Long 提升为普通数字
    ///
    /// # Returns
    /// 成功返回反序列化器，区间为空时返回 `BoundsExceeded`，末字节不是 0x00 时返回 `MissingTerminator`
    pub fn new(data: &'a [u8], start: usize, promote_longs: bool) -> BsonResult<Self> {
        if start >= data.len() {
            return Err(BsonError::BoundsExceeded {
                offset: start,
                message: format!("start offset beyond input of {} bytes", data.len()),
            });
        }
        let end = data.len() - 1;
        if data[end] != 0 {
            return Err(BsonError::MissingTerminator { offset: end });
        }
        Ok(Self {
            data,
            pos: start,
            end,
            promote_longs,
            depth: 0,
        })
    }

    /// 当前游标位置（输入中的绝对下标）
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 读取一个带长度前缀的文档
    ///
    /// 顶层文档不会被还原为 DBRef。
    pub fn read_document(&mut self) -> BsonResult<Document> {
        self.nested(|de| de.read_document_body())
    }

    fn read_embedded_document(&mut self) -> BsonResult<BsonValue> {
        let doc = self.read_document()?;
        Ok(promote_dbref(doc))
    }

    fn read_array(&mut self) -> BsonResult<Vec<BsonValue>> {
        self.nested(|de| de.read_array_body())
    }

    /// 读取长度前缀，把可读区间收窄到子文档，在子区间内执行 `body`
    fn nested<T>(&mut self, body: impl FnOnce(&mut Self) -> BsonResult<T>) -> BsonResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(BsonError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let length_at = self.pos;
        let length = self.read_i32()? as u32 as usize;
        if length < MIN_BSON_SIZE {
            return Err(BsonError::DocumentTooShort { length });
        }
        // 子区间覆盖长度字段之后的 length - 4 字节，最后一字节是子文档的结束符
        let child_end = match length_at.checked_add(length - 1) {
            Some(end) if end <= self.end => end,
            _ => {
                return Err(BsonError::BoundsExceeded {
                    offset: length_at,
                    message: format!("child document of {} bytes exceeds parent's bounds", length),
                })
            }
        };
        if self.data[child_end] != 0 {
            return Err(BsonError::MissingTerminator { offset: child_end });
        }
        trace!("Reading nested document of {} bytes at offset {}", length, length_at);

        let parent_end = self.end;
        self.end = child_end;
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        self.end = parent_end;
        self.pos = child_end + 1;
        result
    }

    fn read_document_body(&mut self) -> BsonResult<Document> {
        let mut doc = Document::new();
        while self.pos < self.end {
            let tag_at = self.pos;
            let tag = self.read_u8()?;
            let key = self.read_cstring()?;
            let value = self.read_value(tag, tag_at)?;
            doc.insert(key, value);
        }
        self.expect_end()?;
        Ok(doc)
    }

    fn read_array_body(&mut self) -> BsonResult<Vec<BsonValue>> {
        let mut items = Vec::new();
        while self.pos < self.end {
            let tag_at = self.pos;
            let tag = self.read_u8()?;
            let key = self.read_cstring()?;
            let index = parse_index(&key)?;
            let value = self.read_value(tag, tag_at)?;
            if index < items.len() {
                items[index] = value;
            } else {
                // 下标空洞的数量不能超过剩余字节数，避免构造任意大的数组
                if index - items.len() > self.end.saturating_sub(self.pos) {
                    return Err(BsonError::IndexInvalid(key.to_string()));
                }
                items.resize(index, BsonValue::Undefined);
                items.push(value);
            }
        }
        self.expect_end()?;
        Ok(items)
    }

    fn expect_end(&self) -> BsonResult<()> {
        if self.pos != self.end {
            return Err(BsonError::TrailingOrMissingBytes {
                expected: self.end,
                actual: self.pos,
            });
        }
        Ok(())
    }

    /// 按类型标记读取值
    fn read_value(&mut self, tag: u8, tag_at: usize) -> BsonResult<BsonValue> {
        let ty = ElementType::from_u8(tag).ok_or(BsonError::UnknownType {
            tag,
            offset: tag_at,
        })?;
        let value = match ty {
            ElementType::Double => BsonValue::Double(self.read_f64()?),
            ElementType::String => BsonValue::String(self.read_string()?),
            ElementType::Document => self.read_embedded_document()?,
            ElementType::Array => BsonValue::Array(self.read_array()?),
            ElementType::Binary => BsonValue::Binary(self.read_binary()?),
            ElementType::Undefined | ElementType::Null => BsonValue::Null,
            ElementType::ObjectId => {
                let bytes = self.take(ObjectId::LEN)?;
                let mut id = [0u8; 12];
                id.copy_from_slice(bytes);
                BsonValue::ObjectId(ObjectId::from_bytes(id))
            }
            ElementType::Boolean => BsonValue::Boolean(self.read_u8()? != 0),
            ElementType::DateTime => BsonValue::DateTime(self.read_i64()?),
            ElementType::Regex => {
                let pattern = self.read_cstring()?;
                let options = self.read_cstring()?;
                BsonValue::Regex(Regex {
                    pattern,
                    flags: RegexFlags::from_options(&options),
                })
            }
            ElementType::JavaScriptCode => {
                BsonValue::JavaScript(JavaScriptValue::new(self.read_string()?))
            }
            ElementType::Symbol => BsonValue::Symbol(self.read_string()?),
            ElementType::JavaScriptCodeWithScope => {
                let start = self.pos;
                let total = self.read_i32()?;
                let code = self.read_string()?;
                let scope = self.read_document()?;
                if total < 0 || self.pos - start != total as usize {
                    return Err(BsonError::TrailingOrMissingBytes {
                        expected: start.saturating_add(total.max(0) as usize),
                        actual: self.pos,
                    });
                }
                BsonValue::JavaScript(JavaScriptValue::with_scope(code, scope))
            }
            ElementType::Int32 => BsonValue::Int32(self.read_i32()?),
            ElementType::Timestamp => {
                let low = self.read_i32()?;
                let high = self.read_i32()?;
                BsonValue::Timestamp(Timestamp::from_parts(low, high))
            }
            ElementType::Int64 => {
                let low = self.read_i32()?;
                let high = self.read_i32()?;
                let long = Long::from_parts(low, high);
                let v = long.to_i64();
                if self.promote_longs && v > -MAX_SAFE_INTEGER_BOUND && v < MAX_SAFE_INTEGER_BOUND {
                    BsonValue::Double(v as f64)
                } else {
                    BsonValue::Long(long)
                }
            }
            ElementType::MaxKey => BsonValue::MaxKey,
            ElementType::MinKey => BsonValue::MinKey,
        };
        Ok(value)
    }

    /// 子类型 0x02 时以内层长度为准，忽略外层长度
    fn read_binary(&mut self) -> BsonResult<Binary> {
        let length_at = self.pos;
        let mut length = self.read_i32()?;
        let subtype = self.read_u8()?;
        if subtype == BINARY_SUBTYPE_BINARY_OLD {
            length = self.read_i32()?;
        }
        if length < 0 {
            return Err(BsonError::BoundsExceeded {
                offset: length_at,
                message: format!("negative binary length {}", length),
            });
        }
        let bytes = self.take(length as usize)?.to_vec();
        Ok(Binary { subtype, bytes })
    }

    fn need(&self, n: usize) -> BsonResult<()> {
        match self.pos.checked_add(n) {
            Some(next) if next <= self.end => Ok(()),
            _ => Err(BsonError::BoundsExceeded {
                offset: self.pos,
                message: format!("read of {} bytes past end of document at {}", n, self.end),
            }),
        }
    }

    fn take(&mut self, n: usize) -> BsonResult<&'a [u8]> {
        self.need(n)?;
        let data: &'a [u8] = self.data;
        let bytes = &data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> BsonResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_i32(&mut self) -> BsonResult<i32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(buf))
    }

    fn read_i64(&mut self) -> BsonResult<i64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    fn read_f64(&mut self) -> BsonResult<f64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(buf))
    }

    /// 读取以 0x00 结尾的字符串，结束符必须出现在区间结束之前
    fn read_cstring(&mut self) -> BsonResult<CompactString> {
        let start = self.pos;
        let len = self.data[start..self.end]
            .iter()
            .position(|&b| b == 0)
            .ok_or(BsonError::CStringUnterminated { offset: start })?;
        let bytes = self.take(len + 1)?;
        to_utf8(&bytes[..len], start)
    }

    /// 读取 int32 长度前缀的字符串（长度含结尾 0x00）
    fn read_string(&mut self) -> BsonResult<CompactString> {
        let length_at = self.pos;
        let length = self.read_i32()?;
        if length < 1 {
            return Err(BsonError::BoundsExceeded {
                offset: length_at,
                message: format!("invalid string length {}", length),
            });
        }
        let start = self.pos;
        let bytes = self.take(length as usize)?;
        let (content, terminator) = bytes.split_at(bytes.len() - 1);
        if terminator[0] != 0 {
            return Err(BsonError::CStringUnterminated { offset: start });
        }
        to_utf8(content, start)
    }
}

fn to_utf8(bytes: &[u8], offset: usize) -> BsonResult<CompactString> {
    std::str::from_utf8(bytes)
        .map(CompactString::from)
        .map_err(|_| BsonError::InvalidUtf8 { offset })
}

/// 数组键必须是非空的无符号十进制数
fn parse_index(key: &str) -> BsonResult<usize> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BsonError::IndexInvalid(key.to_string()));
    }
    key.parse::<u32>()
        .map(|i| i as usize)
        .map_err(|_| BsonError::IndexInvalid(key.to_string()))
}

/// 同时含 `$ref` 与 `$id` 的文档还原为 DBRef
///
/// `$ref` 不是字符串或 `$db` 存在但不是字符串时保持为普通文档；其余键被丢弃。
pub(crate) fn promote_dbref(mut doc: Document) -> BsonValue {
    if !(doc.contains_key(DBREF_REF_KEY) && doc.contains_key(DBREF_ID_KEY)) {
        return BsonValue::Document(doc);
    }
    let namespace = match doc.get(DBREF_REF_KEY) {
        Some(BsonValue::String(s)) => s.clone(),
        _ => return BsonValue::Document(doc),
    };
    let db = match doc.get(DBREF_DB_KEY) {
        None => None,
        Some(BsonValue::String(s)) => Some(s.clone()),
        Some(_) => return BsonValue::Document(doc),
    };
    let id = doc.remove(DBREF_ID_KEY).unwrap_or_default();
    BsonValue::DbRef(DbRef {
        namespace,
        id: Box::new(id),
        db,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(bytes: &[u8]) -> BsonResult<Document> {
        Deserializer::new(bytes, 0, true)?.read_document()
    }

    #[test]
    fn test_empty_document() {
        let doc = read(&[5, 0, 0, 0, 0]).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn test_int32_element() {
        let bytes = [12, 0, 0, 0, 0x10, b'a', 0, 1, 0, 0, 0, 0];
        let doc = read(&bytes).unwrap();
        assert_eq!(doc.get("a"), Some(&BsonValue::Int32(1)));
    }

    #[test]
    fn test_missing_terminator() {
        let err = read(&[5, 0, 0, 0, 1]).unwrap_err();
        assert_eq!(err, BsonError::MissingTerminator { offset: 4 });
    }

    #[test]
    fn test_length_below_minimum() {
        let err = read(&[4, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, BsonError::DocumentTooShort { length: 4 });
    }

    #[test]
    fn test_child_exceeds_parent() {
        let err = read(&[6, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, BsonError::BoundsExceeded { offset: 0, .. }));
    }

    #[test]
    fn test_unterminated_key() {
        // 键 "ab" 一直延伸到文档结束符
        let bytes = [8, 0, 0, 0, 0x0A, b'a', b'b', 0];
        let err = read(&bytes).unwrap_err();
        assert_eq!(err, BsonError::CStringUnterminated { offset: 5 });
    }

    #[test]
    fn test_unknown_type() {
        let bytes = [8, 0, 0, 0, 0x0C, b'a', 0, 0];
        let err = read(&bytes).unwrap_err();
        assert_eq!(err, BsonError::UnknownType { tag: 0x0C, offset: 4 });
    }

    #[test]
    fn test_duplicate_keys_keep_first_position() {
        let bytes = [
            20, 0, 0, 0, //
            0x08, b'a', 0, 1, //
            0x08, b'b', 0, 1, //
            0x08, b'a', 0, 0, //
            0x0A, b'c', 0, //
            0,
        ];
        let doc = read(&bytes).unwrap();
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(doc.get_bool("a"), Some(false));
    }

    #[test]
    fn test_array_index_rules() {
        // [ "1": true, "0": false ] 按下标放置
        let bytes = [
            21, 0, 0, 0, //
            0x04, b'x', 0, //
            13, 0, 0, 0, 0x08, b'1', 0, 1, 0x08, b'0', 0, 0, 0, //
            0,
        ];
        let doc = read(&bytes).unwrap();
        assert_eq!(
            doc.get("x"),
            Some(&BsonValue::Array(vec![
                BsonValue::Boolean(false),
                BsonValue::Boolean(true)
            ]))
        );

        let bad = [
            17, 0, 0, 0, //
            0x04, b'x', 0, //
            9, 0, 0, 0, 0x0A, b'-', b'1', 0, 0, //
            0,
        ];
        assert_eq!(read(&bad).unwrap_err(), BsonError::IndexInvalid("-1".to_string()));
    }

    #[test]
    fn test_trailing_bytes_when_child_swallows_parent_terminator() {
        // 子文档声明的长度一直延伸到父文档的结束符
        let bytes = [
            12, 0, 0, 0, //
            0x03, b'd', 0, //
            5, 0, 0, 0, //
            0,
        ];
        let err = read(&bytes).unwrap_err();
        assert_eq!(err, BsonError::TrailingOrMissingBytes { expected: 11, actual: 12 });
    }

    #[test]
    fn test_dbref_promotion() {
        let mut inner = Document::new();
        inner.insert("$ref", "users");
        inner.insert("$id", 7);
        inner.insert("extra", true);
        assert_eq!(
            promote_dbref(inner),
            BsonValue::DbRef(DbRef::new("users", 7))
        );

        let mut not_string = Document::new();
        not_string.insert("$ref", 1);
        not_string.insert("$id", 7);
        assert!(matches!(promote_dbref(not_string), BsonValue::Document(_)));
    }

    #[test]
    fn test_promote_longs_boundary() {
        let mut bytes = vec![16, 0, 0, 0, 0x12, b'n', 0];
        bytes.extend_from_slice(&((1i64 << 53) - 1).to_le_bytes());
        bytes.push(0);
        let promoted = Deserializer::new(&bytes, 0, true).unwrap().read_document().unwrap();
        assert_eq!(promoted.get("n"), Some(&BsonValue::Double(((1i64 << 53) - 1) as f64)));

        bytes[7..15].copy_from_slice(&(1i64 << 53).to_le_bytes());
        let kept = Deserializer::new(&bytes, 0, true).unwrap().read_document().unwrap();
        assert_eq!(kept.get("n"), Some(&BsonValue::Long(Long::from_i64(1 << 53))));

        let raw = Deserializer::new(&bytes, 0, false).unwrap().read_document().unwrap();
        assert_eq!(raw.get("n"), Some(&BsonValue::Long(Long::from_i64(1 << 53))));
    }
}
