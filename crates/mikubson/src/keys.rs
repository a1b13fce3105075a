//! 键名校验模块
//!
//! 开启 `check_keys` 时，文档键名不得包含 0x00、不得以 `$` 开头、不得包含 `.`。
//! 空键名是允许的。

use crate::{BsonError, BsonResult};

/// 校验单个文档键名
///
/// # Arguments
/// * `key` - 待校验的键名
///
/// # Returns
/// 合法返回 Ok(()), 否则返回 `BsonError::KeyInvalid`
pub fn check_key(key: &str) -> BsonResult<()> {
    if key.is_empty() {
        return Ok(());
    }
    let reason = if key.contains('\0') {
        "must not contain null bytes"
    } else if key.starts_with('$') {
        "must not start with '$'"
    } else if key.contains('.') {
        "must not contain '.'"
    } else {
        return Ok(());
    };
    Err(BsonError::KeyInvalid {
        key: key.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        for key in ["", "a", "a$", "_id", "日本語", "x-y"] {
            assert!(check_key(key).is_ok(), "{key:?}");
        }
    }

    #[test]
    fn test_invalid_keys() {
        for key in ["$set", "a.b", "a\0b", "$", "."] {
            assert!(
                matches!(check_key(key), Err(BsonError::KeyInvalid { .. })),
                "{key:?}"
            );
        }
    }

    #[test]
    fn test_null_byte_reported_first() {
        match check_key("$a.\0") {
            Err(BsonError::KeyInvalid { reason, .. }) => {
                assert_eq!(reason, "must not contain null bytes")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
