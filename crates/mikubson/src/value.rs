//! BSON 值类型定义模块
//!
//! 定义编解码器所操作的闭合值模型，包括基础类型、复合类型和 BSON 扩展类型。
//! 使用 `CompactString` 优化短字符串的内存占用。

use crate::document::Document;
use crate::{BsonError, BsonResult};
use chrono::{TimeZone, Utc};
use compact_str::CompactString;
use mikubson_common::ObjectId;
use std::fmt;
use std::sync::Arc;

/// BSON 值的枚举类型
///
/// # 支持的类型
///
/// - **数字**: Double (普通数字), BoxedDouble, Int32, Long
/// - **基础类型**: String, Boolean, Null, Undefined, Binary, Bytes
/// - **标识/时间**: ObjectId, DateTime, Timestamp
/// - **复合类型**: Array, Document, DbRef
/// - **代码类型**: JavaScript, Function, Symbol, Regex
/// - **哨兵类型**: MinKey, MaxKey
/// - **转换槽**: Convertible (编码前先调用其 toBSON 钩子)
///
/// # 示例
///
/// ```rust,ignore
/// use mikubson::BsonValue;
///
/// let value = BsonValue::from("hello");
/// assert_eq!(value.type_name(), "string");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum BsonValue {
    /// 普通数字；整数值且能放入 i32 时按 Int32 写出
    Double(f64),
    /// 显式双精度浮点数，总是按 0x01 写出
    BoxedDouble(f64),
    /// 32位有符号整数
    Int32(i32),
    /// 64位整数，以高低两个 32 位半字保存
    Long(Long),
    /// UTF-8 字符串
    String(CompactString),
    /// 嵌入文档（有序键值对）
    Document(Document),
    /// 值数组
    Array(Vec<BsonValue>),
    /// 带子类型的二进制数据
    Binary(Binary),
    /// 原始字节缓冲区，按子类型 0 的 Binary 写出
    Bytes(Vec<u8>),
    /// 12字节的对象标识符
    ObjectId(ObjectId),
    /// 布尔值
    Boolean(bool),
    /// UTC 毫秒时间戳
    DateTime(i64),
    /// 空值
    Null,
    /// 缺省值：文档中被丢弃，数组中写为 Null
    Undefined,
    /// 正则表达式
    Regex(Regex),
    /// JavaScript 代码，可带作用域
    JavaScript(JavaScriptValue),
    /// 函数，携带其源码
    Function(CompactString),
    /// 符号
    Symbol(CompactString),
    /// BSON 内部时间戳
    Timestamp(Timestamp),
    /// 最小键
    MinKey,
    /// 最大键
    MaxKey,
    /// 数据库引用
    DbRef(DbRef),
    /// 带 toBSON 转换钩子的值
    Convertible(Convertible),
}

/// 64 位整数，拆分为低 32 位和高 32 位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Long {
    pub low: i32,
    pub high: i32,
}

impl Long {
    pub fn from_parts(low: i32, high: i32) -> Self {
        Self { low, high }
    }

    pub fn from_i64(value: i64) -> Self {
        Self {
            low: value as i32,
            high: (value >> 32) as i32,
        }
    }

    pub fn to_i64(self) -> i64 {
        ((self.high as i64) << 32) | (self.low as u32 as i64)
    }
}

/// BSON 内部时间戳 (低 32 位为递增量，高 32 位为秒)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    pub low: i32,
    pub high: i32,
}

impl Timestamp {
    pub fn from_parts(low: i32, high: i32) -> Self {
        Self { low, high }
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            low: value as i32,
            high: (value >> 32) as i32,
        }
    }

    pub fn to_u64(self) -> u64 {
        ((self.high as u32 as u64) << 32) | (self.low as u32 as u64)
    }
}

/// 带子类型的二进制数据
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binary {
    pub subtype: u8,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(subtype: u8, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype,
            bytes: bytes.into(),
        }
    }
}

/// 正则表达式选项
///
/// 线格式上 `global` 写为 `s`，这是与旧驱动保持兼容的映射。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegexFlags {
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
}

impl RegexFlags {
    /// 解析选项字符串，未识别的字符被忽略
    pub fn from_options(options: &str) -> Self {
        let mut flags = Self::default();
        for c in options.chars() {
            match c {
                's' => flags.global = true,
                'i' => flags.ignore_case = true,
                'm' => flags.multiline = true,
                _ => {}
            }
        }
        flags
    }

    /// 按 `s`、`i`、`m` 的顺序输出选项字符
    pub fn to_options(self) -> CompactString {
        let mut options = CompactString::default();
        if self.global {
            options.push('s');
        }
        if self.ignore_case {
            options.push('i');
        }
        if self.multiline {
            options.push('m');
        }
        options
    }
}

/// 正则表达式值
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    pub pattern: CompactString,
    pub flags: RegexFlags,
}

impl Regex {
    pub fn new(pattern: impl Into<CompactString>, options: &str) -> Self {
        Self {
            pattern: pattern.into(),
            flags: RegexFlags::from_options(options),
        }
    }
}

/// JavaScript 代码值
///
/// 作用域非空时写为 0x0F (code with scope)，否则退化为 0x0D。
#[derive(Debug, Clone, PartialEq)]
pub struct JavaScriptValue {
    pub code: CompactString,
    pub scope: Option<Document>,
}

impl JavaScriptValue {
    pub fn new(code: impl Into<CompactString>) -> Self {
        Self {
            code: code.into(),
            scope: None,
        }
    }

    pub fn with_scope(code: impl Into<CompactString>, scope: Document) -> Self {
        Self {
            code: code.into(),
            scope: Some(scope),
        }
    }

    /// 是否需要写为带作用域的代码
    pub fn has_scope(&self) -> bool {
        self.scope.as_ref().map_or(false, |s| !s.is_empty())
    }
}

/// 数据库引用
///
/// 编码为 `{ $ref, $id [, $db] }` 嵌入文档；解码时同时含 `$ref` 与 `$id` 的文档还原为此类型。
#[derive(Debug, Clone, PartialEq)]
pub struct DbRef {
    pub namespace: CompactString,
    pub id: Box<BsonValue>,
    pub db: Option<CompactString>,
}

impl DbRef {
    pub fn new(namespace: impl Into<CompactString>, id: impl Into<BsonValue>) -> Self {
        Self {
            namespace: namespace.into(),
            id: Box::new(id.into()),
            db: None,
        }
    }

    pub fn with_db(mut self, db: impl Into<CompactString>) -> Self {
        self.db = Some(db.into());
        self
    }
}

type ToBsonFn = dyn Fn() -> BsonValue + Send + Sync;

/// toBSON 转换槽的内容
#[derive(Clone)]
pub enum ToBson {
    /// 可调用的转换函数
    Callable(Arc<ToBsonFn>),
    /// 槽里放着一个不可调用的值，编码时报 ConversionHookInvalid
    NotCallable(Box<BsonValue>),
}

/// 带 toBSON 钩子的值
///
/// 编码时先调用钩子，再对其结果做结构分派。
#[derive(Clone)]
pub struct Convertible {
    to_bson: ToBson,
}

impl Convertible {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn() -> BsonValue + Send + Sync + 'static,
    {
        Self {
            to_bson: ToBson::Callable(Arc::new(hook)),
        }
    }

    pub fn not_callable(slot: BsonValue) -> Self {
        Self {
            to_bson: ToBson::NotCallable(Box::new(slot)),
        }
    }

    pub fn slot(&self) -> &ToBson {
        &self.to_bson
    }

    /// 调用钩子
    ///
    /// # Returns
    /// 钩子的返回值；槽不可调用时返回 `BsonError::ConversionHookInvalid`
    pub fn resolve(&self) -> BsonResult<BsonValue> {
        match &self.to_bson {
            ToBson::Callable(hook) => Ok(hook()),
            ToBson::NotCallable(slot) => Err(BsonError::ConversionHookInvalid(format!(
                "toBSON is not a function (found {})",
                slot.type_name()
            ))),
        }
    }
}

impl fmt::Debug for Convertible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.to_bson {
            ToBson::Callable(_) => write!(f, "Convertible(<fn>)"),
            ToBson::NotCallable(slot) => write!(f, "Convertible({:?})", slot),
        }
    }
}

impl PartialEq for Convertible {
    fn eq(&self, other: &Self) -> bool {
        match (&self.to_bson, &other.to_bson) {
            (ToBson::Callable(a), ToBson::Callable(b)) => Arc::ptr_eq(a, b),
            (ToBson::NotCallable(a), ToBson::NotCallable(b)) => a == b,
            _ => false,
        }
    }
}

impl BsonValue {
    /// 获取值的类型名称
    pub fn type_name(&self) -> &'static str {
        match self {
            BsonValue::Double(_) => "number",
            BsonValue::BoxedDouble(_) => "double",
            BsonValue::Int32(_) => "int32",
            BsonValue::Long(_) => "long",
            BsonValue::String(_) => "string",
            BsonValue::Document(_) => "document",
            BsonValue::Array(_) => "array",
            BsonValue::Binary(_) => "binary",
            BsonValue::Bytes(_) => "bytes",
            BsonValue::ObjectId(_) => "objectId",
            BsonValue::Boolean(_) => "boolean",
            BsonValue::DateTime(_) => "dateTime",
            BsonValue::Null => "null",
            BsonValue::Undefined => "undefined",
            BsonValue::Regex(_) => "regex",
            BsonValue::JavaScript(_) => "javascript",
            BsonValue::Function(_) => "function",
            BsonValue::Symbol(_) => "symbol",
            BsonValue::Timestamp(_) => "timestamp",
            BsonValue::MinKey => "minKey",
            BsonValue::MaxKey => "maxKey",
            BsonValue::DbRef(_) => "dbRef",
            BsonValue::Convertible(_) => "convertible",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BsonValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BsonValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            BsonValue::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// 如果值是整数类型（Int32 或 Long），返回 i64 值
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BsonValue::Int32(n) => Some(*n as i64),
            BsonValue::Long(l) => Some(l.to_i64()),
            _ => None,
        }
    }

    /// 如果值是数值类型，返回 f64 值（Long 可能损失精度）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BsonValue::Double(n) | BsonValue::BoxedDouble(n) => Some(*n),
            BsonValue::Int32(n) => Some(*n as f64),
            BsonValue::Long(l) => Some(l.to_i64() as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BsonValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<BsonValue>> {
        match self {
            BsonValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            BsonValue::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// 获取指定键的值
    ///
    /// # Brief
    /// 从文档中获取指定键的值，或从数组中获取指定索引的值
    ///
    /// # Arguments
    /// * `key` - 键名（文档）或索引字符串（数组）
    pub fn get(&self, key: &str) -> Option<&BsonValue> {
        match self {
            BsonValue::Document(doc) => doc.get(key),
            BsonValue::Array(arr) => key.parse::<usize>().ok().and_then(|i| arr.get(i)),
            _ => None,
        }
    }

    /// 使用点分隔的路径访问嵌套值，如 "user.tags.0"
    pub fn get_path(&self, path: &str) -> Option<&BsonValue> {
        let mut current = self;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }
}

impl Default for BsonValue {
    fn default() -> Self {
        BsonValue::Null
    }
}

impl fmt::Display for BsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BsonValue::Double(n) => write!(f, "{}", n),
            BsonValue::BoxedDouble(n) => write!(f, "Double({})", n),
            BsonValue::Int32(n) => write!(f, "{}", n),
            BsonValue::Long(l) => write!(f, "Long({})", l.to_i64()),
            BsonValue::String(s) => write!(f, "\"{}\"", s),
            BsonValue::Document(doc) => write!(f, "{}", doc),
            BsonValue::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            BsonValue::Binary(b) => {
                write!(f, "Binary(0x{:02x}, {} bytes)", b.subtype, b.bytes.len())
            }
            BsonValue::Bytes(b) => write!(f, "<bytes:{}>", b.len()),
            BsonValue::ObjectId(id) => write!(f, "ObjectId(\"{}\")", id),
            BsonValue::Boolean(b) => write!(f, "{}", b),
            BsonValue::DateTime(ms) => match Utc.timestamp_millis_opt(*ms).single() {
                Some(dt) => write!(f, "DateTime(\"{}\")", dt.to_rfc3339()),
                None => write!(f, "DateTime({})", ms),
            },
            BsonValue::Null => write!(f, "null"),
            BsonValue::Undefined => write!(f, "undefined"),
            BsonValue::Regex(r) => write!(f, "/{}/{}", r.pattern, r.flags.to_options()),
            BsonValue::JavaScript(js) => match &js.scope {
                Some(scope) => write!(f, "Code({}, scope: {})", js.code, scope),
                None => write!(f, "Code({})", js.code),
            },
            BsonValue::Function(src) => write!(f, "Function({})", src),
            BsonValue::Symbol(s) => write!(f, "Symbol({})", s),
            BsonValue::Timestamp(ts) => write!(f, "Timestamp({}, {})", ts.low, ts.high),
            BsonValue::MinKey => write!(f, "MinKey"),
            BsonValue::MaxKey => write!(f, "MaxKey"),
            BsonValue::DbRef(r) => match &r.db {
                Some(db) => write!(f, "DBRef(\"{}\", {}, \"{}\")", r.namespace, r.id, db),
                None => write!(f, "DBRef(\"{}\", {})", r.namespace, r.id),
            },
            BsonValue::Convertible(_) => write!(f, "<convertible>"),
        }
    }
}

// ============================================================================
// From 特征实现 - 支持从各种 Rust 类型转换为 BsonValue
// ============================================================================

impl From<bool> for BsonValue {
    fn from(v: bool) -> Self {
        BsonValue::Boolean(v)
    }
}

impl From<i32> for BsonValue {
    fn from(v: i32) -> Self {
        BsonValue::Int32(v)
    }
}

impl From<i64> for BsonValue {
    fn from(v: i64) -> Self {
        BsonValue::Long(Long::from_i64(v))
    }
}

impl From<f64> for BsonValue {
    fn from(v: f64) -> Self {
        BsonValue::Double(v)
    }
}

impl From<&str> for BsonValue {
    fn from(v: &str) -> Self {
        BsonValue::String(CompactString::from(v))
    }
}

impl From<String> for BsonValue {
    fn from(v: String) -> Self {
        BsonValue::String(CompactString::from(v))
    }
}

impl From<CompactString> for BsonValue {
    fn from(v: CompactString) -> Self {
        BsonValue::String(v)
    }
}

impl From<ObjectId> for BsonValue {
    fn from(v: ObjectId) -> Self {
        BsonValue::ObjectId(v)
    }
}

impl From<Document> for BsonValue {
    fn from(v: Document) -> Self {
        BsonValue::Document(v)
    }
}

impl From<Long> for BsonValue {
    fn from(v: Long) -> Self {
        BsonValue::Long(v)
    }
}

impl From<Timestamp> for BsonValue {
    fn from(v: Timestamp) -> Self {
        BsonValue::Timestamp(v)
    }
}

impl From<Binary> for BsonValue {
    fn from(v: Binary) -> Self {
        BsonValue::Binary(v)
    }
}

impl From<Regex> for BsonValue {
    fn from(v: Regex) -> Self {
        BsonValue::Regex(v)
    }
}

impl From<JavaScriptValue> for BsonValue {
    fn from(v: JavaScriptValue) -> Self {
        BsonValue::JavaScript(v)
    }
}

impl From<DbRef> for BsonValue {
    fn from(v: DbRef) -> Self {
        BsonValue::DbRef(v)
    }
}

impl From<Convertible> for BsonValue {
    fn from(v: Convertible) -> Self {
        BsonValue::Convertible(v)
    }
}

impl<T: Into<BsonValue>> From<Vec<T>> for BsonValue {
    fn from(v: Vec<T>) -> Self {
        BsonValue::Array(v.into_iter().map(Into::into).collect())
    }
}

/// 构造 BsonValue 的便捷宏
///
/// # 示例
///
/// ```rust,ignore
/// use mikubson::bson;
///
/// let null = bson!(null);
/// let number = bson!(42);
/// let array = bson!([1, "two", 3.5]);
/// let doc = bson!({ "name": "test", "tags": ["a", "b"] });
/// ```
#[macro_export]
macro_rules! bson {
    (null) => {
        $crate::BsonValue::Null
    };
    (undefined) => {
        $crate::BsonValue::Undefined
    };
    ([ $($elem:tt),* $(,)? ]) => {
        $crate::BsonValue::Array(vec![ $($crate::bson!($elem)),* ])
    };
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::BsonValue::Document($crate::doc! { $($key : $value),* })
    };
    ($e:expr) => {
        $crate::BsonValue::from($e)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_parts() {
        for v in [0i64, 1, -1, i64::MAX, i64::MIN, 1 << 40, -(1 << 53)] {
            let long = Long::from_i64(v);
            assert_eq!(long.to_i64(), v);
        }
        assert_eq!(Long::from_i64(-1), Long::from_parts(-1, -1));
        assert_eq!(Long::from_i64(1 << 32), Long::from_parts(0, 1));
    }

    #[test]
    fn test_timestamp_parts() {
        let ts = Timestamp::from_u64(0xffff_ffff_0000_0001);
        assert_eq!(ts, Timestamp::from_parts(1, -1));
        assert_eq!(ts.to_u64(), 0xffff_ffff_0000_0001);
    }

    #[test]
    fn test_regex_flags() {
        let flags = RegexFlags::from_options("mxis");
        assert!(flags.global && flags.ignore_case && flags.multiline);
        assert_eq!(flags.to_options(), "sim");
        assert_eq!(RegexFlags::default().to_options(), "");
    }

    #[test]
    fn test_convertible() {
        let hook = Convertible::new(|| BsonValue::from("converted"));
        assert_eq!(hook.resolve().unwrap(), BsonValue::from("converted"));
        assert_eq!(hook.clone(), hook);

        let bad = Convertible::not_callable(BsonValue::Int32(1));
        assert!(matches!(
            bad.resolve(),
            Err(BsonError::ConversionHookInvalid(_))
        ));
    }

    #[test]
    fn test_macro_and_path() {
        let value = bson!({ "user": { "tags": ["a", "b"] }, "n": 1 });
        assert_eq!(value.get_path("user.tags.1"), Some(&BsonValue::from("b")));
        assert_eq!(value.get("n").and_then(|v| v.as_i32()), Some(1));
        assert_eq!(value.get_path("user.missing"), None);
    }

    #[test]
    fn test_display() {
        let value = bson!([1, "x", null]);
        assert_eq!(value.to_string(), "[1, \"x\", null]");
        assert_eq!(BsonValue::DateTime(0).to_string(), "DateTime(\"1970-01-01T00:00:00+00:00\")");
    }
}
