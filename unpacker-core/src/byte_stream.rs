//! 原始字节流
//!
//! 由上游采集过程产生的只读字节缓冲区。克隆只增加引用计数，不复制数据。

use bytes::Bytes;

use crate::utils::bytes_to_hex;

/// 只读字节流视图
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteStream {
    data: Bytes,
}

impl ByteStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// 引用静态数据，不做复制
    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            data: Bytes::from_static(data),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 可用于拆包（非空）
    pub fn is_usable(&self) -> bool {
        !self.data.is_empty()
    }

    /// 底层共享缓冲区
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// 前`limit`字节的十六进制预览
    pub fn hex_preview(&self, limit: usize) -> String {
        let shown = &self.data[..self.data.len().min(limit)];
        let mut preview = bytes_to_hex(shown);
        if self.data.len() > limit {
            preview.push_str(" ..");
        }
        preview
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for ByteStream {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for ByteStream {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_buffer() {
        let stream = ByteStream::new(vec![1u8, 2, 3]);
        let copy = stream.clone();
        assert_eq!(stream.as_slice().as_ptr(), copy.as_slice().as_ptr());
        assert!(copy.is_usable());
    }

    #[test]
    fn test_empty_stream_not_usable() {
        assert!(!ByteStream::default().is_usable());
    }

    #[test]
    fn test_hex_preview() {
        let stream = ByteStream::from_static(&[0xAB, 0xCD, 0xEF]);
        assert_eq!(stream.hex_preview(8), "AB CD EF");
        assert_eq!(stream.hex_preview(2), "AB CD ..");
    }
}
