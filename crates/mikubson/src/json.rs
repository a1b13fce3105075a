//! BSON 与 JSON 互转模块
//!
//! 输出采用宽松 (relaxed) 扩展 JSON：普通数字直接写为 JSON 数字，
//! 其他类型写为 `$` 前缀的包装对象。
//!
//! - ObjectId: `{"$oid": "507f1f77bcf86cd799439011"}`
//! - DateTime: `{"$date": "2020-09-13T12:26:40Z"}`，年份超出 1970..=9999 时为 `{"$date": {"$numberLong": "..."}}`
//! - Binary: `{"$binary": {"base64": "...", "subType": "00"}}`
//! - Regex: `{"$regularExpression": {"pattern": "...", "options": "i"}}`
//! - Timestamp: `{"$timestamp": {"t": 1, "i": 2}}`

use crate::de::promote_dbref;
use crate::document::Document;
use crate::value::{Binary, BsonValue, JavaScriptValue, Long, Regex, Timestamp};
use crate::{BsonError, BsonResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Datelike, SecondsFormat, TimeZone, Utc};
use compact_str::CompactString;
use mikubson_common::ObjectId;
use serde_json::{json, Map, Number, Value as JsonValue};

/// 将 BsonValue 转换为 JSON
///
/// # Brief
/// 按宽松扩展 JSON 规则渲染；转换钩子先被求值
///
/// # Arguments
/// * `value` - 要转换的 BSON 值
///
/// # Returns
/// 成功返回 JSON 值，钩子不可调用时返回 `ConversionHookInvalid`
pub fn to_json(value: &BsonValue) -> BsonResult<JsonValue> {
    let json = match value {
        BsonValue::Null => JsonValue::Null,
        BsonValue::Undefined => json!({ "$undefined": true }),
        BsonValue::Boolean(b) => JsonValue::Bool(*b),
        BsonValue::Int32(n) => json!(*n),
        BsonValue::Long(l) => json!(l.to_i64()),
        BsonValue::Double(f) | BsonValue::BoxedDouble(f) => double_to_json(*f),
        BsonValue::String(s) => JsonValue::String(s.to_string()),
        BsonValue::Symbol(s) => json!({ "$symbol": s.as_str() }),
        BsonValue::Document(doc) => JsonValue::Object(document_to_map(doc)?),
        BsonValue::Array(items) => {
            let items: BsonResult<Vec<_>> = items.iter().map(to_json).collect();
            JsonValue::Array(items?)
        }
        BsonValue::Binary(bin) => binary_to_json(bin.subtype, &bin.bytes),
        BsonValue::Bytes(bytes) => binary_to_json(0, bytes),
        BsonValue::ObjectId(oid) => json!({ "$oid": oid.to_hex() }),
        BsonValue::DateTime(ms) => date_to_json(*ms),
        BsonValue::Regex(re) => json!({
            "$regularExpression": {
                "pattern": re.pattern.as_str(),
                "options": re.flags.to_options().as_str(),
            }
        }),
        BsonValue::JavaScript(js) => match &js.scope {
            Some(scope) => json!({
                "$code": js.code.as_str(),
                "$scope": JsonValue::Object(document_to_map(scope)?),
            }),
            None => json!({ "$code": js.code.as_str() }),
        },
        BsonValue::Function(source) => json!({ "$code": source.as_str() }),
        BsonValue::Timestamp(ts) => json!({
            "$timestamp": { "t": ts.high as u32, "i": ts.low as u32 }
        }),
        BsonValue::MinKey => json!({ "$minKey": 1 }),
        BsonValue::MaxKey => json!({ "$maxKey": 1 }),
        BsonValue::DbRef(dbref) => {
            let mut map = Map::new();
            map.insert("$ref".to_string(), json!(dbref.namespace.as_str()));
            map.insert("$id".to_string(), to_json(&dbref.id)?);
            if let Some(db) = &dbref.db {
                map.insert("$db".to_string(), json!(db.as_str()));
            }
            JsonValue::Object(map)
        }
        BsonValue::Convertible(hook) => to_json(&hook.resolve()?)?,
    };
    Ok(json)
}

fn document_to_map(doc: &Document) -> BsonResult<Map<String, JsonValue>> {
    let mut map = Map::new();
    for (k, v) in doc {
        map.insert(k.to_string(), to_json(v)?);
    }
    Ok(map)
}

fn double_to_json(f: f64) -> JsonValue {
    match Number::from_f64(f) {
        Some(n) => JsonValue::Number(n),
        None => {
            let repr = if f.is_nan() {
                "NaN"
            } else if f > 0.0 {
                "Infinity"
            } else {
                "-Infinity"
            };
            json!({ "$numberDouble": repr })
        }
    }
}

fn binary_to_json(subtype: u8, bytes: &[u8]) -> JsonValue {
    json!({
        "$binary": {
            "base64": STANDARD.encode(bytes),
            "subType": format!("{:02x}", subtype),
        }
    })
}

fn date_to_json(ms: i64) -> JsonValue {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) if (1970..=9999).contains(&dt.year()) => {
            json!({ "$date": dt.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        _ => json!({ "$date": { "$numberLong": ms.to_string() } }),
    }
}

/// 从 JSON 转换为 BsonValue
///
/// # Brief
/// 识别扩展 JSON 包装对象；同时含 `$ref` 与 `$id` 的对象还原为 DBRef
///
/// # Arguments
/// * `value` - JSON 值
///
/// # Returns
/// 成功返回 BSON 值，包装对象内容不合法时返回 `InvalidJson`
pub fn from_json(value: &JsonValue) -> BsonResult<BsonValue> {
    match value {
        JsonValue::Null => Ok(BsonValue::Null),
        JsonValue::Bool(b) => Ok(BsonValue::Boolean(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                match i32::try_from(i) {
                    Ok(small) => Ok(BsonValue::Int32(small)),
                    Err(_) => Ok(BsonValue::Long(Long::from_i64(i))),
                }
            } else if let Some(f) = n.as_f64() {
                Ok(BsonValue::Double(f))
            } else {
                Err(invalid(format!("number {} is out of range", n)))
            }
        }
        JsonValue::String(s) => Ok(BsonValue::String(CompactString::new(s))),
        JsonValue::Array(items) => {
            let items: BsonResult<Vec<_>> = items.iter().map(from_json).collect();
            Ok(BsonValue::Array(items?))
        }
        JsonValue::Object(obj) => {
            if let Some(value) = from_extended(obj)? {
                return Ok(value);
            }
            Ok(promote_dbref(map_to_document(obj)?))
        }
    }
}

/// 从 JSON 对象构建文档，顶层不做 DBRef 还原
pub fn from_json_document(value: &JsonValue) -> BsonResult<Document> {
    match value {
        JsonValue::Object(obj) => map_to_document(obj),
        other => Err(invalid(format!("expected an object, found {}", other))),
    }
}

fn map_to_document(obj: &Map<String, JsonValue>) -> BsonResult<Document> {
    let mut doc = Document::with_capacity(obj.len());
    for (k, v) in obj {
        doc.insert(k.as_str(), from_json(v)?);
    }
    Ok(doc)
}

/// 识别扩展 JSON 包装对象，不是包装对象时返回 None
fn from_extended(obj: &Map<String, JsonValue>) -> BsonResult<Option<BsonValue>> {
    if let Some(code) = obj.get("$code") {
        let code = expect_str(code, "$code")?;
        let js = match obj.get("$scope") {
            Some(JsonValue::Object(scope)) => {
                JavaScriptValue::with_scope(code, map_to_document(scope)?)
            }
            Some(_) => return Err(invalid("$scope must be an object")),
            None => JavaScriptValue::new(code),
        };
        return Ok(Some(BsonValue::JavaScript(js)));
    }

    if obj.len() != 1 {
        return Ok(None);
    }
    let Some((key, value)) = obj.iter().next() else {
        return Ok(None);
    };
    let converted = match key.as_str() {
        "$oid" => {
            let hex = expect_str(value, "$oid")?;
            let oid = ObjectId::from_hex(hex).map_err(|e| invalid(e.to_string()))?;
            BsonValue::ObjectId(oid)
        }
        "$date" => BsonValue::DateTime(parse_date(value)?),
        "$numberInt" => {
            let s = expect_str(value, "$numberInt")?;
            BsonValue::Int32(s.parse().map_err(|_| invalid(format!("bad $numberInt {:?}", s)))?)
        }
        "$numberLong" => BsonValue::Long(Long::from_i64(parse_number_long(value)?)),
        "$numberDouble" => {
            let s = expect_str(value, "$numberDouble")?;
            let f: f64 = s
                .parse()
                .map_err(|_| invalid(format!("bad $numberDouble {:?}", s)))?;
            BsonValue::Double(f)
        }
        "$binary" => {
            let base64 = expect_str(field(value, "base64")?, "base64")?;
            let subtype = expect_str(field(value, "subType")?, "subType")?;
            let bytes = STANDARD
                .decode(base64)
                .map_err(|e| invalid(format!("bad base64: {}", e)))?;
            let subtype = u8::from_str_radix(subtype, 16)
                .map_err(|_| invalid(format!("bad binary subType {:?}", subtype)))?;
            BsonValue::Binary(Binary::new(subtype, bytes))
        }
        "$regularExpression" => {
            let pattern = expect_str(field(value, "pattern")?, "pattern")?;
            let options = expect_str(field(value, "options")?, "options")?;
            BsonValue::Regex(Regex::new(pattern, options))
        }
        "$timestamp" => {
            let t = expect_u32(field(value, "t")?, "t")?;
            let i = expect_u32(field(value, "i")?, "i")?;
            BsonValue::Timestamp(Timestamp::from_parts(i as i32, t as i32))
        }
        "$symbol" => BsonValue::Symbol(CompactString::new(expect_str(value, "$symbol")?)),
        "$minKey" => BsonValue::MinKey,
        "$maxKey" => BsonValue::MaxKey,
        "$undefined" => BsonValue::Undefined,
        _ => return Ok(None),
    };
    Ok(Some(converted))
}

fn parse_date(value: &JsonValue) -> BsonResult<i64> {
    match value {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .map_err(|e| invalid(format!("bad $date {:?}: {}", s, e))),
        JsonValue::Number(n) => n
            .as_i64()
            .ok_or_else(|| invalid(format!("bad $date {}", n))),
        JsonValue::Object(obj) => match obj.get("$numberLong") {
            Some(v) => parse_number_long(v),
            None => Err(invalid("$date object must hold $numberLong")),
        },
        other => Err(invalid(format!("bad $date {}", other))),
    }
}

fn parse_number_long(value: &JsonValue) -> BsonResult<i64> {
    let s = expect_str(value, "$numberLong")?;
    s.parse()
        .map_err(|_| invalid(format!("bad $numberLong {:?}", s)))
}

fn field<'a>(value: &'a JsonValue, name: &str) -> BsonResult<&'a JsonValue> {
    value
        .get(name)
        .ok_or_else(|| invalid(format!("missing field {:?}", name)))
}

fn expect_str<'a>(value: &'a JsonValue, name: &str) -> BsonResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid(format!("{} must be a string", name)))
}

fn expect_u32(value: &JsonValue, name: &str) -> BsonResult<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| invalid(format!("{} must be a 32-bit unsigned integer", name)))
}

fn invalid(message: impl Into<String>) -> BsonError {
    BsonError::InvalidJson(message.into())
}

/// 将文档序列化为 JSON 字符串
pub fn to_json_string(doc: &Document) -> BsonResult<String> {
    let map = document_to_map(doc)?;
    serde_json::to_string_pretty(&JsonValue::Object(map))
        .map_err(|e| invalid(format!("JSON serialization failed: {}", e)))
}

/// 从 JSON 字符串解析文档
pub fn from_json_string(json_str: &str) -> BsonResult<Document> {
    let value: JsonValue = serde_json::from_str(json_str)
        .map_err(|e| invalid(format!("JSON parsing failed: {}", e)))?;
    from_json_document(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::value::DbRef;

    #[test]
    fn test_basic_types() {
        assert_eq!(to_json(&BsonValue::Null).unwrap(), JsonValue::Null);
        assert_eq!(to_json(&BsonValue::Boolean(true)).unwrap(), json!(true));
        assert_eq!(to_json(&BsonValue::Int32(42)).unwrap(), json!(42));
        assert_eq!(
            to_json(&BsonValue::Long(Long::from_i64(1 << 40))).unwrap(),
            json!(1i64 << 40)
        );
        assert_eq!(to_json(&BsonValue::from("hello")).unwrap(), json!("hello"));
        assert_eq!(to_json(&BsonValue::Double(1.5)).unwrap(), json!(1.5));
    }

    #[test]
    fn test_non_finite_doubles() {
        assert_eq!(
            to_json(&BsonValue::Double(f64::NAN)).unwrap(),
            json!({ "$numberDouble": "NaN" })
        );
        assert_eq!(
            to_json(&BsonValue::Double(f64::NEG_INFINITY)).unwrap(),
            json!({ "$numberDouble": "-Infinity" })
        );
        let back = from_json(&json!({ "$numberDouble": "Infinity" })).unwrap();
        assert_eq!(back, BsonValue::Double(f64::INFINITY));
    }

    #[test]
    fn test_extended_wrappers() {
        let oid = ObjectId::from_bytes([0xAB; 12]);
        let doc = doc! {
            "oid": oid,
            "date": (BsonValue::DateTime(1_600_000_000_000)),
            "bin": (Binary::new(4, vec![1, 2, 3])),
            "re": (Regex::new("^a", "mi")),
            "ts": (Timestamp::from_parts(2, 1)),
            "min": (BsonValue::MinKey),
        };
        let json = to_json(&BsonValue::Document(doc.clone())).unwrap();
        assert_eq!(
            json,
            json!({
                "oid": { "$oid": "abababababababababababab" },
                "date": { "$date": "2020-09-13T12:26:40Z" },
                "bin": { "$binary": { "base64": "AQID", "subType": "04" } },
                "re": { "$regularExpression": { "pattern": "^a", "options": "im" } },
                "ts": { "$timestamp": { "t": 1, "i": 2 } },
                "min": { "$minKey": 1 },
            })
        );
        assert_eq!(from_json_document(&json).unwrap(), doc);
    }

    #[test]
    fn test_date_outside_iso_range() {
        let json = to_json(&BsonValue::DateTime(-1)).unwrap();
        assert_eq!(json, json!({ "$date": { "$numberLong": "-1" } }));
        assert_eq!(from_json(&json).unwrap(), BsonValue::DateTime(-1));
    }

    #[test]
    fn test_code_and_dbref() {
        let code = BsonValue::JavaScript(JavaScriptValue::with_scope("f(x)", doc! { "x": 1 }));
        let json = to_json(&code).unwrap();
        assert_eq!(json, json!({ "$code": "f(x)", "$scope": { "x": 1 } }));
        assert_eq!(from_json(&json).unwrap(), code);

        let dbref = BsonValue::DbRef(DbRef::new("users", 5).with_db("app"));
        let json = to_json(&dbref).unwrap();
        assert_eq!(json, json!({ "$ref": "users", "$id": 5, "$db": "app" }));
        assert_eq!(from_json(&json).unwrap(), dbref);
    }

    #[test]
    fn test_number_widths() {
        assert_eq!(from_json(&json!(7)).unwrap(), BsonValue::Int32(7));
        assert_eq!(
            from_json(&json!(5_000_000_000i64)).unwrap(),
            BsonValue::Long(Long::from_i64(5_000_000_000))
        );
        assert_eq!(from_json(&json!(2.5)).unwrap(), BsonValue::Double(2.5));
    }

    #[test]
    fn test_invalid_wrappers() {
        for bad in [
            json!({ "$oid": "xyz" }),
            json!({ "$date": true }),
            json!({ "$binary": { "base64": "!!", "subType": "00" } }),
            json!({ "$timestamp": { "t": -1, "i": 0 } }),
            json!({ "$code": 5 }),
        ] {
            assert!(
                matches!(from_json(&bad), Err(BsonError::InvalidJson(_))),
                "{}",
                bad
            );
        }
        assert!(from_json_document(&json!([1])).is_err());
    }

    #[test]
    fn test_round_trip_string() {
        let original = doc! { "name": "Bob", "age": 25, "tags": ["a", "b"] };
        let json_str = to_json_string(&original).unwrap();
        let restored = from_json_string(&json_str).unwrap();
        assert_eq!(original, restored);
    }
}
