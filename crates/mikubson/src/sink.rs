//! 写入目标抽象模块
//!
//! 序列化器只通过 [`Sink`] 输出数据。[`CountSink`] 只累加字节数，[`WriteSink`] 把字节写入
//! 调用方提供的定长缓冲区。同一套递归逻辑先后跑在两种 Sink 上，计数结果与实际写入长度
//! 不可能不一致。
//!
//! 类型标记和长度前缀采用"先占位、后回填"的方式：`begin_*` 返回占位处的下标，
//! `commit_*` 按下标回填。

use crate::spec::ElementType;
use crate::{BsonError, BsonResult};

/// 序列化输出的统一操作集合
///
/// 所有多字节数值均为小端序。
pub trait Sink {
    fn write_u8(&mut self, value: u8) -> BsonResult<()>;

    fn write_i32(&mut self, value: i32) -> BsonResult<()>;

    fn write_i64(&mut self, value: i64) -> BsonResult<()>;

    fn write_f64(&mut self, value: f64) -> BsonResult<()>;

    fn write_bytes(&mut self, bytes: &[u8]) -> BsonResult<()>;

    /// 写入 UTF-8 字节和结尾的 0x00
    fn write_cstring(&mut self, value: &str) -> BsonResult<()> {
        self.write_bytes(value.as_bytes())?;
        self.write_u8(0)
    }

    /// 写入 int32 长度 (含结尾 0x00)、UTF-8 字节和 0x00
    fn write_string(&mut self, value: &str) -> BsonResult<()> {
        self.write_i32((value.len() + 1) as i32)?;
        self.write_cstring(value)
    }

    /// 预留 1 字节的类型标记，返回其下标
    fn begin_type(&mut self) -> BsonResult<usize>;

    /// 在预留处写入类型标记
    fn commit_type(&mut self, at: usize, ty: ElementType);

    /// 预留 4 字节的长度前缀，返回其下标
    fn begin_size(&mut self) -> BsonResult<usize>;

    /// 在预留处写入自预留起(含前缀本身)到当前位置的字节数
    fn commit_size(&mut self, at: usize);

    /// 迄今为止输出的字节数
    fn size(&self) -> usize;
}

/// 只计数、不写字节的 Sink
#[derive(Debug, Default, Clone, Copy)]
pub struct CountSink {
    count: usize,
}

impl CountSink {
    pub fn new() -> Self {
        Self { count: 0 }
    }
}

impl Sink for CountSink {
    fn write_u8(&mut self, _value: u8) -> BsonResult<()> {
        self.count += 1;
        Ok(())
    }

    fn write_i32(&mut self, _value: i32) -> BsonResult<()> {
        self.count += 4;
        Ok(())
    }

    fn write_i64(&mut self, _value: i64) -> BsonResult<()> {
        self.count += 8;
        Ok(())
    }

    fn write_f64(&mut self, _value: f64) -> BsonResult<()> {
        self.count += 8;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> BsonResult<()> {
        self.count += bytes.len();
        Ok(())
    }

    fn begin_type(&mut self) -> BsonResult<usize> {
        let at = self.count;
        self.count += 1;
        Ok(at)
    }

    fn commit_type(&mut self, _at: usize, _ty: ElementType) {}

    fn begin_size(&mut self) -> BsonResult<usize> {
        let at = self.count;
        self.count += 4;
        Ok(at)
    }

    fn commit_size(&mut self, _at: usize) {}

    fn size(&self) -> usize {
        self.count
    }
}

/// 写入定长缓冲区的 Sink
///
/// 从 `start` 开始写；任何一次写入若使已写字节数超过 `min(max_size, 剩余容量)`，
/// 都会在写之前以 `SizeExceeded` 失败。
#[derive(Debug)]
pub struct WriteSink<'a> {
    buf: &'a mut [u8],
    start: usize,
    pos: usize,
    end: usize,
}

impl<'a> WriteSink<'a> {
    /// 创建写入 Sink
    ///
    /// # Arguments
    /// * `buf` - 目标缓冲区
    /// * `start` - 起始写入位置
    /// * `max_size` - 本次编码允许写入的最大字节数
    pub fn new(buf: &'a mut [u8], start: usize, max_size: usize) -> Self {
        let start = start.min(buf.len());
        let end = start.saturating_add(max_size).min(buf.len());
        Self {
            buf,
            start,
            pos: start,
            end,
        }
    }

    /// 当前写入位置（缓冲区内的绝对下标）
    pub fn position(&self) -> usize {
        self.pos
    }

    fn claim(&mut self, n: usize) -> BsonResult<usize> {
        let at = self.pos;
        match at.checked_add(n) {
            Some(next) if next <= self.end => {
                self.pos = next;
                Ok(at)
            }
            _ => Err(BsonError::SizeExceeded {
                limit: self.end - self.start,
            }),
        }
    }

    fn put(&mut self, bytes: &[u8]) -> BsonResult<()> {
        let at = self.claim(bytes.len())?;
        self.buf[at..at + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl Sink for WriteSink<'_> {
    fn write_u8(&mut self, value: u8) -> BsonResult<()> {
        self.put(&[value])
    }

    fn write_i32(&mut self, value: i32) -> BsonResult<()> {
        self.put(&value.to_le_bytes())
    }

    fn write_i64(&mut self, value: i64) -> BsonResult<()> {
        self.put(&value.to_le_bytes())
    }

    fn write_f64(&mut self, value: f64) -> BsonResult<()> {
        self.put(&value.to_le_bytes())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> BsonResult<()> {
        self.put(bytes)
    }

    fn begin_type(&mut self) -> BsonResult<usize> {
        let at = self.claim(1)?;
        self.buf[at] = 0;
        Ok(at)
    }

    fn commit_type(&mut self, at: usize, ty: ElementType) {
        self.buf[at] = ty.as_u8();
    }

    fn begin_size(&mut self) -> BsonResult<usize> {
        let at = self.claim(4)?;
        self.buf[at..at + 4].fill(0);
        Ok(at)
    }

    fn commit_size(&mut self, at: usize) {
        let size = (self.pos - at) as i32;
        self.buf[at..at + 4].copy_from_slice(&size.to_le_bytes());
    }

    fn size(&self) -> usize {
        self.pos - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit<S: Sink>(sink: &mut S) -> BsonResult<()> {
        let size_at = sink.begin_size()?;
        let type_at = sink.begin_type()?;
        sink.write_cstring("k")?;
        sink.write_string("v")?;
        sink.commit_type(type_at, ElementType::String);
        sink.write_f64(1.5)?;
        sink.write_i64(-2)?;
        sink.write_u8(0)?;
        sink.commit_size(size_at);
        Ok(())
    }

    #[test]
    fn test_count_matches_write() {
        let mut count = CountSink::new();
        emit(&mut count).unwrap();

        let mut buf = vec![0xAAu8; 64];
        let mut sink = WriteSink::new(&mut buf, 0, 64);
        emit(&mut sink).unwrap();
        assert_eq!(count.size(), sink.size());
        assert_eq!(count.size(), 4 + 1 + 2 + 4 + 2 + 8 + 8 + 1);
    }

    #[test]
    fn test_patch_back_little_endian() {
        let mut buf = [0u8; 32];
        let mut sink = WriteSink::new(&mut buf, 0, 32);
        emit(&mut sink).unwrap();
        let written = sink.size();
        assert_eq!(&buf[0..4], &(written as i32).to_le_bytes());
        assert_eq!(buf[4], 0x02);
        assert_eq!(&buf[5..7], b"k\0");
        assert_eq!(&buf[7..11], &[2, 0, 0, 0]);
        assert_eq!(&buf[11..13], b"v\0");
    }

    #[test]
    fn test_ceiling_is_inclusive() {
        let mut buf = [0u8; 8];
        let mut sink = WriteSink::new(&mut buf, 0, 4);
        sink.write_i32(7).unwrap();
        assert_eq!(
            sink.write_u8(1),
            Err(BsonError::SizeExceeded { limit: 4 })
        );
    }

    #[test]
    fn test_capacity_bounds_the_ceiling() {
        let mut buf = [0u8; 6];
        let mut sink = WriteSink::new(&mut buf, 4, 1024);
        sink.write_u8(1).unwrap();
        sink.write_u8(2).unwrap();
        assert_eq!(sink.position(), 6);
        assert_eq!(sink.write_u8(3), Err(BsonError::SizeExceeded { limit: 2 }));
        assert_eq!(buf, [0, 0, 0, 0, 1, 2]);
    }
}
