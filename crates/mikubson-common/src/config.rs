//! 编解码配置模块
//!
//! 定义 BSON 编解码器的可配置项:
//! - 文档体积上限 (默认 17 MiB, 即 16 MiB 加余量)
//! - 是否校验键名
//! - 是否把函数序列化为代码
//! - 解码时是否把安全范围内的 Long 提升为普通数字
//!
//! 支持从 TOML 文件加载配置。

use crate::error::{CommonError, CommonResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// 默认的 BSON 文档体积上限 (17 MiB)
pub const DEFAULT_MAX_BSON_SIZE: usize = 17 * 1024 * 1024;

/// 最小合法文档长度: 4 字节长度 + 1 字节结束符
pub const MIN_BSON_SIZE: usize = 5;

/// 编解码器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// 单个文档编码后的最大字节数 (默认: 17 MiB)
    #[serde(default = "default_max_bson_size")]
    pub max_bson_size: usize,

    /// 编码时校验键名 (默认: false)
    #[serde(default)]
    pub check_keys: bool,

    /// 编码时保留函数并写为 JavaScript 代码 (默认: false)
    #[serde(default)]
    pub serialize_functions: bool,

    /// 解码时提升安全整数范围内的 Long (默认: true)
    #[serde(default = "default_promote_longs")]
    pub promote_longs: bool,
}

fn default_max_bson_size() -> usize { DEFAULT_MAX_BSON_SIZE }
fn default_promote_longs() -> bool { true }

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_bson_size: default_max_bson_size(),
            check_keys: false,
            serialize_functions: false,
            promote_longs: default_promote_longs(),
        }
    }
}

impl CodecConfig {
    /// # Brief
    /// 从 TOML 文件加载配置
    ///
    /// # Arguments
    /// * `path` - 配置文件路径
    ///
    /// # Returns
    /// 解析并校验后的配置实例
    pub fn from_file(path: &Path) -> CommonResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CommonError::Config(format!("Failed to read config: {}", e)))?;
        debug!("Loaded codec config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// # Brief
    /// 从 TOML 字符串解析配置
    ///
    /// # Arguments
    /// * `content` - TOML 文本
    ///
    /// # Returns
    /// 解析并校验后的配置实例
    pub fn from_toml_str(content: &str) -> CommonResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CommonError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// # Brief
    /// 将配置序列化为 TOML 字符串
    pub fn to_toml(&self) -> CommonResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CommonError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// 校验配置是否有效
    ///
    /// 长度前缀是 int32,因此上限必须落在 `5..=i32::MAX` 之间。
    pub fn validate(&self) -> CommonResult<()> {
        if self.max_bson_size < MIN_BSON_SIZE {
            return Err(CommonError::Config(format!(
                "max_bson_size must be at least {} bytes, got {}",
                MIN_BSON_SIZE, self.max_bson_size
            )));
        }
        if self.max_bson_size > i32::MAX as usize {
            return Err(CommonError::Config(format!(
                "max_bson_size {} does not fit in an int32 length prefix",
                self.max_bson_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.max_bson_size, 17 * 1024 * 1024);
        assert!(!config.check_keys);
        assert!(!config.serialize_functions);
        assert!(config.promote_longs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CodecConfig::from_toml_str("check_keys = true\n").unwrap();
        assert!(config.check_keys);
        assert!(config.promote_longs);
        assert_eq!(config.max_bson_size, DEFAULT_MAX_BSON_SIZE);
    }

    #[test]
    fn test_rejects_out_of_range_size() {
        assert!(CodecConfig::from_toml_str("max_bson_size = 4\n").is_err());
        assert!(CodecConfig::from_toml_str("max_bson_size = 4294967296\n").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codec.toml");
        let config = CodecConfig {
            max_bson_size: 1024,
            check_keys: true,
            serialize_functions: true,
            promote_longs: false,
        };
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(config.to_toml().unwrap().as_bytes()).unwrap();

        let loaded = CodecConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
