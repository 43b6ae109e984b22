//! 工具模块
//!
//! 提供拆包过程中常用的字节工具函数

use crate::error::ConfigurationError;

/// 将字节数组转换为十六进制字符串
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// 将十六进制字符串转换为字节数组（允许空白分隔和`0x`前缀）
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>, ConfigurationError> {
    let clean_str: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
    let clean_str = clean_str
        .strip_prefix("0x")
        .or_else(|| clean_str.strip_prefix("0X"))
        .unwrap_or(&clean_str);
    hex::decode(clean_str).map_err(|e| ConfigurationError::InvalidParameter {
        name: "hex".to_string(),
        reason: e.to_string(),
    })
}

/// 原地反转字节顺序
pub fn swap_bytes(data: &mut [u8]) {
    data.reverse();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_hex() {
        let bytes = [0xAB, 0xCD, 0xEF];
        let hex = bytes_to_hex(&bytes);
        assert_eq!(hex, "AB CD EF");
    }

    #[test]
    fn test_hex_to_bytes() {
        let hex = "AB CD EF";
        let bytes = hex_to_bytes(hex).unwrap();
        assert_eq!(bytes, [0xAB, 0xCD, 0xEF]);
        assert_eq!(hex_to_bytes("0x0102").unwrap(), [0x01, 0x02]);
    }

    #[test]
    fn test_hex_to_bytes_rejects_bad_input() {
        assert!(hex_to_bytes("ABC").is_err());
        assert!(hex_to_bytes("ZZ").is_err());
    }

    #[test]
    fn test_swap_bytes() {
        let mut data = [0x01, 0x02, 0x03, 0x04];
        swap_bytes(&mut data);
        assert_eq!(data, [0x04, 0x03, 0x02, 0x01]);
    }
}
