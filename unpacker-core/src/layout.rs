//! 字段布局描述
//!
//! 字段描述符与有序字段映射，以及它们的JSON文档表示

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// 字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// 宿主字节序
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    /// 是否与宿主字节序一致
    pub fn is_native(self) -> bool {
        self == Self::native()
    }

    pub fn is_little(self) -> bool {
        self == Endianness::Little
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Endianness::Little => "little",
            Endianness::Big => "big",
        }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Little
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endianness {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "little" => Ok(Endianness::Little),
            "big" => Ok(Endianness::Big),
            other => Err(ConfigurationError::InvalidParameter {
                name: "endianness".to_string(),
                reason: format!("expected \"little\" or \"big\", got \"{other}\""),
            }),
        }
    }
}

/// 单个字段的布局
///
/// `offset`非负时相对解析起点；为负时从缓冲区末尾倒数，与解析起点无关。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescriptor {
    pub offset: i64,
    pub size: usize,
    pub endianness: Endianness,
}

impl FieldDescriptor {
    pub fn new(offset: i64, size: usize, endianness: Endianness) -> Self {
        Self {
            offset,
            size,
            endianness,
        }
    }

    /// 计算字段在缓冲区中的绝对偏移
    ///
    /// 负偏移的绝对值超过缓冲区长度时返回None
    pub fn absolute_offset(&self, buffer_len: usize, start_offset: usize) -> Option<usize> {
        if self.offset >= 0 {
            start_offset.checked_add(self.offset as usize)
        } else {
            let back = usize::try_from(self.offset.unsigned_abs()).ok()?;
            buffer_len.checked_sub(back)
        }
    }
}

/// 有序字段映射：字段名 -> 布局，插入顺序即应用顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping {
    fields: IndexMap<String, FieldDescriptor>,
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加字段（同名字段保持原位置并覆盖布局）
    pub fn insert(&mut self, name: impl Into<String>, descriptor: FieldDescriptor) {
        self.fields.insert(name.into(), descriptor);
    }

    /// 链式追加字段
    pub fn with_field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(name, desc)| (name.as_str(), desc))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 非负偏移字段的最大结束位置（相对解析起点）
    pub fn max_extent(&self) -> usize {
        self.fields
            .values()
            .filter(|desc| desc.offset >= 0)
            .map(|desc| desc.offset as usize + desc.size)
            .max()
            .unwrap_or(0)
    }

    /// 从JSON值解析字段映射文档
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self, ConfigurationError> {
        if !value.is_object() {
            return Err(ConfigurationError::InvalidFieldMapping(
                "field mapping must be a JSON object".to_string(),
            ));
        }
        Self::deserialize(value)
            .map_err(|e| ConfigurationError::InvalidFieldMapping(e.to_string()))
    }

    /// 从JSON字符串解析字段映射文档
    pub fn from_json_str(json_str: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json_str)
            .map_err(|e| ConfigurationError::InvalidFieldMapping(e.to_string()))
    }

    /// 导出为JSON值
    pub fn to_json_value(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (name, desc) in &self.fields {
            object.insert(
                name.clone(),
                serde_json::json!({
                    "offset": desc.offset,
                    "size": desc.size,
                    "endianness": desc.endianness.as_str(),
                }),
            );
        }
        serde_json::Value::Object(object)
    }
}
