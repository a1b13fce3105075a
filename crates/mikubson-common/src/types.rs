//! 公共类型定义模块
//!
//! 定义 mikubson 的核心标识类型:
//! - ObjectId: 12 字节唯一标识符(BSON 0x07 类型的载荷)

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CommonError;

/// ObjectId - 12 字节唯一标识符
///
/// 格式:
/// - 前 4 字节: 时间戳(秒,大端)
/// - 中间 5 字节: 进程级随机数(/dev/urandom 或系统熵)
/// - 后 3 字节: 递增计数器(大端)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
    /// ObjectId 的字节长度
    pub const LEN: usize = 12;

    /// 生成新的 ObjectId
    ///
    /// # Brief
    /// 使用当前时间、进程随机数和递增计数器生成标识符
    ///
    /// # Returns
    /// 新的 ObjectId 实例
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        bytes[0..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(PROCESS_UNIQUE.get_or_init(rand_bytes::<5>));

        let counter = COUNTER.get_or_init(|| {
            let seed: [u8; 4] = rand_bytes();
            AtomicU32::new(u32::from_le_bytes(seed) & 0x00ff_ffff)
        });
        let next = counter.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;
        bytes[9..12].copy_from_slice(&next.to_be_bytes()[1..4]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// 取出前 4 字节中记录的秒级时间戳
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 从 24 位十六进制字符串解析 ObjectId
    ///
    /// # Arguments
    /// * `s` - 十六进制字符串
    ///
    /// # Returns
    /// 成功返回 ObjectId,长度或字符非法时返回 `CommonError::InvalidObjectId`
    pub fn from_hex(s: &str) -> Result<Self, CommonError> {
        let bytes = hex::decode(s)
            .map_err(|e| CommonError::InvalidObjectId(format!("Invalid hex: {}", e)))?;
        let arr: [u8; 12] = bytes.try_into().map_err(|_| {
            CommonError::InvalidObjectId("ObjectId must be 12 bytes".to_string())
        })?;
        Ok(Self(arr))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; 12]> for ObjectId {
    fn from(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }
}

fn rand_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    #[cfg(target_os = "linux")]
    {
        use std::fs::File;
        use std::io::Read;
        if let Ok(mut f) = File::open("/dev/urandom") {
            if f.read_exact(&mut bytes).is_ok() {
                return bytes;
            }
        }
    }
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    let state = RandomState::new();
    for chunk in bytes.chunks_mut(8) {
        let hash = state.build_hasher().finish().to_le_bytes();
        let len = chunk.len().min(8);
        chunk.copy_from_slice(&hash[..len]);
    }
    bytes
}
