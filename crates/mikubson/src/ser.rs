//! BSON 序列化模块
//!
//! [`Serializer`] 对任意 [`Sink`] 递归输出文档。文档与数组的长度前缀、元素的类型标记
//! 都通过 Sink 的占位/回填完成，因此计数与写入共用同一份逻辑。

use crate::document::Document;
use crate::keys::check_key;
use crate::sink::Sink;
use crate::spec::{ElementType, BINARY_SUBTYPE_BINARY_OLD, BINARY_SUBTYPE_GENERIC, DBREF_DB_KEY,
    DBREF_ID_KEY, DBREF_REF_KEY, MAX_NESTING_DEPTH};
use crate::value::{BsonValue, DbRef, JavaScriptValue};
use crate::{BsonError, BsonResult};
use compact_str::ToCompactString;

/// BSON 序列化器
pub struct Serializer<'a, S: Sink> {
    sink: &'a mut S,
    check_keys: bool,
    serialize_functions: bool,
    depth: usize,
}

impl<'a, S: Sink> Serializer<'a, S> {
    /// 创建序列化器
    ///
    /// # Arguments
    /// * `sink` - 输出目标
    /// * `check_keys` - 是否校验文档键名
    /// * `serialize_functions` - 文档中的函数是写为代码还是丢弃
    pub fn new(sink: &'a mut S, check_keys: bool, serialize_functions: bool) -> Self {
        Self {
            sink,
            check_keys,
            serialize_functions,
            depth: 0,
        }
    }

    /// 序列化一个文档
    ///
    /// # Brief
    /// 预留长度前缀，按插入顺序写出保留下来的字段，最后写结束符并回填长度。
    /// 值为 `Undefined` 的字段总被丢弃；`serialize_functions` 关闭时函数字段也被丢弃。
    ///
    /// # Arguments
    /// * `doc` - 要序列化的文档
    ///
    /// # Returns
    /// 成功返回 Ok(()), 超出体积上限、键名非法或转换钩子非法时返回错误
    pub fn serialize_document(&mut self, doc: &Document) -> BsonResult<()> {
        self.enter()?;
        let size_at = self.sink.begin_size()?;
        for (key, value) in doc.iter() {
            if self.check_keys {
                check_key(key)?;
            }
            let dropped = match value {
                BsonValue::Undefined => true,
                BsonValue::Function(_) => !self.serialize_functions,
                _ => false,
            };
            if dropped {
                continue;
            }
            let type_at = self.sink.begin_type()?;
            self.sink.write_cstring(key)?;
            let ty = self.serialize_value(value)?;
            self.sink.commit_type(type_at, ty);
        }
        self.sink.write_u8(0)?;
        self.sink.commit_size(size_at);
        self.depth -= 1;
        Ok(())
    }

    /// 序列化一个数组
    ///
    /// 键为十进制下标；所有元素都被保留，`Undefined` 写为 Null 以保持下标连续。
    pub fn serialize_array(&mut self, items: &[BsonValue]) -> BsonResult<()> {
        self.enter()?;
        let size_at = self.sink.begin_size()?;
        for (index, item) in items.iter().enumerate() {
            let type_at = self.sink.begin_type()?;
            self.sink.write_cstring(&index.to_compact_string())?;
            let ty = self.serialize_value(item)?;
            self.sink.commit_type(type_at, ty);
        }
        self.sink.write_u8(0)?;
        self.sink.commit_size(size_at);
        self.depth -= 1;
        Ok(())
    }

    /// 序列化单个值的载荷
    ///
    /// 文档/数组上下文的差异（丢弃还是写 Null）由调用方处理。
    ///
    /// # Arguments
    /// * `value` - 要写出的值
    ///
    /// # Returns
    /// 该值对应的类型标记，由调用方回填到预留的类型槽
    pub fn serialize_value(&mut self, value: &BsonValue) -> BsonResult<ElementType> {
        let converted;
        let value = match value {
            BsonValue::Convertible(hook) => {
                converted = hook.resolve()?;
                &converted
            }
            other => other,
        };

        let ty = match value {
            BsonValue::Double(n) => {
                // 截断相等判定: -0.0 写为 Int32 0, NaN/±inf 保持为 double
                if (*n as i32) as f64 == *n {
                    self.sink.write_i32(*n as i32)?;
                    ElementType::Int32
                } else {
                    self.sink.write_f64(*n)?;
                    ElementType::Double
                }
            }
            BsonValue::BoxedDouble(n) => {
                self.sink.write_f64(*n)?;
                ElementType::Double
            }
            BsonValue::Int32(n) => {
                self.sink.write_i32(*n)?;
                ElementType::Int32
            }
            BsonValue::Long(l) => {
                self.sink.write_i32(l.low)?;
                self.sink.write_i32(l.high)?;
                ElementType::Int64
            }
            BsonValue::String(s) => {
                self.sink.write_string(s)?;
                ElementType::String
            }
            BsonValue::Document(doc) => {
                self.serialize_document(doc)?;
                ElementType::Document
            }
            BsonValue::Array(items) => {
                self.serialize_array(items)?;
                ElementType::Array
            }
            BsonValue::Binary(bin) => {
                self.write_binary(bin.subtype, &bin.bytes)?;
                ElementType::Binary
            }
            BsonValue::Bytes(bytes) => {
                self.write_binary(BINARY_SUBTYPE_GENERIC, bytes)?;
                ElementType::Binary
            }
            BsonValue::ObjectId(id) => {
                self.sink.write_bytes(id.as_bytes())?;
                ElementType::ObjectId
            }
            BsonValue::Boolean(b) => {
                self.sink.write_u8(*b as u8)?;
                ElementType::Boolean
            }
            BsonValue::DateTime(ms) => {
                self.sink.write_i64(*ms)?;
                ElementType::DateTime
            }
            // 文档上下文里的 Undefined 只可能来自转换钩子的返回值
            BsonValue::Null | BsonValue::Undefined => ElementType::Null,
            BsonValue::Regex(re) => {
                self.sink.write_cstring(&re.pattern)?;
                self.sink.write_cstring(&re.flags.to_options())?;
                ElementType::Regex
            }
            BsonValue::JavaScript(js) => self.write_code(js)?,
            BsonValue::Function(source) => {
                self.sink.write_string(source)?;
                ElementType::JavaScriptCode
            }
            BsonValue::Symbol(s) => {
                self.sink.write_string(s)?;
                ElementType::Symbol
            }
            BsonValue::Timestamp(ts) => {
                self.sink.write_i32(ts.low)?;
                self.sink.write_i32(ts.high)?;
                ElementType::Timestamp
            }
            BsonValue::MinKey => ElementType::MinKey,
            BsonValue::MaxKey => ElementType::MaxKey,
            BsonValue::DbRef(dbref) => {
                self.write_dbref(dbref)?;
                ElementType::Document
            }
            BsonValue::Convertible(_) => {
                return Err(BsonError::ConversionHookInvalid(
                    "toBSON returned another convertible value".to_string(),
                ))
            }
        };
        Ok(ty)
    }

    fn enter(&mut self) -> BsonResult<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(BsonError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    /// int32 长度 + 子类型 [+ 子类型 0x02 时重复一次长度] + 载荷
    fn write_binary(&mut self, subtype: u8, bytes: &[u8]) -> BsonResult<()> {
        let length = bytes.len() as i32;
        self.sink.write_i32(length)?;
        self.sink.write_u8(subtype)?;
        if subtype == BINARY_SUBTYPE_BINARY_OLD {
            self.sink.write_i32(length)?;
        }
        self.sink.write_bytes(bytes)
    }

    fn write_code(&mut self, js: &JavaScriptValue) -> BsonResult<ElementType> {
        match &js.scope {
            Some(scope) if !scope.is_empty() => {
                let size_at = self.sink.begin_size()?;
                self.sink.write_string(&js.code)?;
                self.serialize_document(scope)?;
                self.sink.commit_size(size_at);
                Ok(ElementType::JavaScriptCodeWithScope)
            }
            _ => {
                self.sink.write_string(&js.code)?;
                Ok(ElementType::JavaScriptCode)
            }
        }
    }

    /// DBRef 写为 `{ $ref, $id [, $db] }`，这些保留键不参与键名校验
    fn write_dbref(&mut self, dbref: &DbRef) -> BsonResult<()> {
        self.enter()?;
        let size_at = self.sink.begin_size()?;

        let type_at = self.sink.begin_type()?;
        self.sink.write_cstring(DBREF_REF_KEY)?;
        self.sink.write_string(&dbref.namespace)?;
        self.sink.commit_type(type_at, ElementType::String);

        let type_at = self.sink.begin_type()?;
        self.sink.write_cstring(DBREF_ID_KEY)?;
        let ty = self.serialize_value(&dbref.id)?;
        self.sink.commit_type(type_at, ty);

        if let Some(db) = &dbref.db {
            let type_at = self.sink.begin_type()?;
            self.sink.write_cstring(DBREF_DB_KEY)?;
            self.sink.write_string(db)?;
            self.sink.commit_type(type_at, ElementType::String);
        }

        self.sink.write_u8(0)?;
        self.sink.commit_size(size_at);
        self.depth -= 1;
        Ok(())
    }
}
