//! 拆包目标记录
//!
//! 记录持有其类结构和一块按类结构排布、零初始化的内存，值按宿主字节序存放。
//! 写入只能经由[`RecordMemory::set_field_bytes`]。

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::HandlerError;
use crate::scalar::{NativeScalar, ScalarValue};
use crate::schema::{ClassSchema, TypeShape};
use crate::utils::bytes_to_hex;

/// 字段内存写入能力
pub trait RecordMemory {
    /// 将字节写入字段偏移处
    fn set_field_bytes(&mut self, field_offset: usize, bytes: &[u8]) -> Result<(), HandlerError>;

    /// 可写内存大小
    fn memory_size(&self) -> usize;
}

/// 读取记录成员失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemberReadError {
    #[error("member '{0}' not found")]
    NotFound(String),
    #[error("member '{member}' has non-scalar type '{type_name}'")]
    NotScalar { member: String, type_name: String },
}

/// 解码后的字段值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(ScalarValue),
    Array(Vec<FieldValue>),
    /// 无法解释的原始字节
    Raw(Vec<u8>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Scalar(value) => write!(f, "{value}"),
            FieldValue::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            FieldValue::Raw(bytes) => write!(f, "<{}>", bytes_to_hex(bytes)),
        }
    }
}

/// 拆包目标记录
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<ClassSchema>,
    memory: Vec<u8>,
}

impl Record {
    pub fn new(schema: Arc<ClassSchema>) -> Self {
        let memory = vec![0u8; schema.size()];
        Self { schema, memory }
    }

    pub fn class_name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &ClassSchema {
        &self.schema
    }

    /// 整块记录内存
    pub fn as_bytes(&self) -> &[u8] {
        &self.memory
    }

    /// 字段所占内存
    pub fn field_bytes(&self, name: &str) -> Option<&[u8]> {
        let field = self.schema.field(name)?;
        self.memory.get(field.offset..field.offset + field.unit_size)
    }

    /// 读取标量成员
    pub fn read_scalar(&self, name: &str) -> Result<ScalarValue, MemberReadError> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| MemberReadError::NotFound(name.to_string()))?;
        let not_scalar = || MemberReadError::NotScalar {
            member: name.to_string(),
            type_name: field.type_name.clone(),
        };
        let Some(TypeShape::Scalar(kind)) = &field.shape else {
            return Err(not_scalar());
        };
        self.memory
            .get(field.offset..)
            .and_then(|bytes| ScalarValue::from_native_bytes(*kind, bytes))
            .ok_or_else(not_scalar)
    }

    /// 按Rust类型读取标量成员，类型不符时返回None
    pub fn get<T: NativeScalar>(&self, name: &str) -> Option<T> {
        let value = self.read_scalar(name).ok()?;
        if value.kind() != T::KIND {
            return None;
        }
        T::from_value(value)
    }

    /// 解码单个字段
    pub fn field_value(&self, name: &str) -> Option<FieldValue> {
        let field = self.schema.field(name)?;
        let bytes = self
            .memory
            .get(field.offset..field.offset + field.unit_size)?;
        Some(match &field.shape {
            Some(shape) => decode_shape(shape, bytes),
            None => FieldValue::Raw(bytes.to_vec()),
        })
    }

    /// 按声明顺序解码所有字段
    pub fn field_values(&self) -> Vec<(&str, FieldValue)> {
        self.schema
            .fields()
            .iter()
            .filter_map(|field| {
                self.field_value(&field.name)
                    .map(|value| (field.name.as_str(), value))
            })
            .collect()
    }
}

fn decode_shape(shape: &TypeShape, bytes: &[u8]) -> FieldValue {
    match shape {
        TypeShape::Scalar(kind) => match ScalarValue::from_native_bytes(*kind, bytes) {
            Some(value) => FieldValue::Scalar(value),
            None => FieldValue::Raw(bytes.to_vec()),
        },
        TypeShape::Array { element, count } => {
            let width = element.width();
            if width == 0 {
                return FieldValue::Raw(bytes.to_vec());
            }
            FieldValue::Array(
                bytes
                    .chunks_exact(width)
                    .take(*count)
                    .map(|chunk| decode_shape(element, chunk))
                    .collect(),
            )
        }
        TypeShape::Custom { .. } => FieldValue::Raw(bytes.to_vec()),
    }
}

impl RecordMemory for Record {
    fn set_field_bytes(&mut self, field_offset: usize, bytes: &[u8]) -> Result<(), HandlerError> {
        let record_size = self.memory.len();
        let target = field_offset
            .checked_add(bytes.len())
            .and_then(|end| self.memory.get_mut(field_offset..end))
            .ok_or(HandlerError::TargetOutOfBounds {
                field_offset,
                len: bytes.len(),
                record_size,
            })?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    fn memory_size(&self) -> usize {
        self.memory.len()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.class_name())?;
        for (i, (name, value)) in self.field_values().into_iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {name} = {value}")?;
        }
        f.write_str(" }")
    }
}
