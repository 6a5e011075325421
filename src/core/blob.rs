//! 二进制 blob 读写
//!
//! 导入数据和几何层级缓冲区都是紧密排列的小端字段序列。
//! `BlobReader` 对越界读取返回 [`ContentError::Truncated`]，不会读到缓冲区之外。

use bytemuck::Pod;

use super::error::ContentError;

/// 顺序读取器
#[derive(Debug, Clone)]
pub struct BlobReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BlobReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// 读取一个定长字段
    pub fn read<T: Pod>(&mut self) -> Result<T, ContentError> {
        let bytes = self.read_bytes(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// 读取 `len` 个字节，返回借用的切片
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ContentError> {
        let end = self.check(len)?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ContentError> {
        self.position = self.check(len)?;
        Ok(())
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn check(&self, len: usize) -> Result<usize, ContentError> {
        match self.position.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(end),
            _ => Err(ContentError::Truncated {
                offset: self.position,
                needed: len,
                available: self.remaining(),
            }),
        }
    }
}

/// 顺序写入器
///
/// 写入目标大小在创建时确定，写超出容量属于编程错误。
#[derive(Debug)]
pub struct BlobWriter {
    buffer: Vec<u8>,
    capacity: usize,
}

impl BlobWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn write<T: Pod>(&mut self, value: T) {
        self.write_bytes(bytemuck::bytes_of(&value));
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        assert!(
            self.buffer.len() + bytes.len() <= self.capacity,
            "BlobWriter overflow: {} + {} > {}",
            self.buffer.len(),
            bytes.len(),
            self.capacity
        );
        self.buffer.extend_from_slice(bytes);
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    /// 结束写入，要求恰好写满
    pub fn finish(self) -> Box<[u8]> {
        assert_eq!(self.buffer.len(), self.capacity, "BlobWriter not filled");
        self.buffer.into_boxed_slice()
    }
}
