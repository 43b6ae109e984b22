//! 字段映射解释器
//!
//! 按映射顺序把缓冲区中的字节区间解码写入目标记录的同名字段

use std::sync::Arc;

use tracing::{debug, error};
use unpacker_core::{FieldDescriptor, FieldError, FieldMapping, Record};

use crate::type_registry::TypeRegistry;

/// 字段映射解释器
#[derive(Debug, Clone)]
pub struct FieldMappingParser {
    registry: Arc<TypeRegistry>,
}

impl Default for FieldMappingParser {
    fn default() -> Self {
        Self::new(TypeRegistry::shared())
    }
}

impl FieldMappingParser {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// 应用字段映射
    ///
    /// 非负偏移相对`start_offset`，负偏移从缓冲区末尾倒数。
    /// 遇到第一个失败字段即返回；之前已写入的字段不回滚。
    ///
    /// # 参数
    /// - `buffer`: 源缓冲区
    /// - `start_offset`: 解析起点
    /// - `mapping`: 字段映射
    /// - `target`: 目标记录
    ///
    /// # 返回
    /// - `Ok(())`: 所有字段写入成功
    /// - `Err(FieldError)`: 失败字段及原因
    pub fn apply(
        &self,
        buffer: &[u8],
        start_offset: usize,
        mapping: &FieldMapping,
        target: &mut Record,
    ) -> Result<(), FieldError> {
        for (name, descriptor) in mapping.iter() {
            if let Err(e) = self.extract_and_assign(buffer, start_offset, name, descriptor, target)
            {
                error!(field = name, class = target.class_name(), "failed to apply field mapping: {e}");
                return Err(e);
            }
        }
        Ok(())
    }

    fn extract_and_assign(
        &self,
        buffer: &[u8],
        start_offset: usize,
        name: &str,
        descriptor: &FieldDescriptor,
        target: &mut Record,
    ) -> Result<(), FieldError> {
        let (field_offset, type_name) = match target.schema().field(name) {
            Some(field) => (field.offset, field.type_name.clone()),
            None => {
                return Err(FieldError::UnknownField {
                    field: name.to_string(),
                    class: target.class_name().to_string(),
                })
            }
        };

        let buffer_len = buffer.len();
        let absolute = descriptor
            .absolute_offset(buffer_len, start_offset)
            .ok_or_else(|| {
                if descriptor.offset < 0 {
                    FieldError::NegativeOffsetOutOfRange {
                        field: name.to_string(),
                        offset: descriptor.offset,
                        buffer_len,
                    }
                } else {
                    FieldError::OutOfBounds {
                        field: name.to_string(),
                        offset: usize::MAX,
                        size: descriptor.size,
                        buffer_len,
                    }
                }
            })?;

        let in_bounds = absolute
            .checked_add(descriptor.size)
            .is_some_and(|end| end <= buffer_len);
        if !in_bounds {
            return Err(FieldError::OutOfBounds {
                field: name.to_string(),
                offset: absolute,
                size: descriptor.size,
                buffer_len,
            });
        }

        let handler = self
            .registry
            .resolve(&type_name)
            .ok_or_else(|| FieldError::UnknownType {
                field: name.to_string(),
                type_name: type_name.clone(),
            })?;

        debug!(
            field = name,
            type_name = %type_name,
            offset = absolute,
            size = descriptor.size,
            endianness = %descriptor.endianness,
            "extract field"
        );

        handler
            .decode_and_store(buffer, absolute, descriptor.endianness, target, field_offset)
            .map_err(|source| FieldError::Handler {
                field: name.to_string(),
                type_name,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unpacker_core::{ClassSchema, Endianness};

    fn header_record(registry: &TypeRegistry) -> Record {
        let schema = ClassSchema::builder("Header")
            .field("a", "uint32_t")
            .field("b", "uint16_t")
            .build(registry)
            .unwrap();
        Record::new(Arc::new(schema))
    }

    #[test]
    fn test_unknown_field_aborts() {
        let registry = Arc::new(TypeRegistry::new());
        let parser = FieldMappingParser::new(Arc::clone(&registry));
        let mut record = header_record(&registry);
        let mapping = FieldMapping::new()
            .with_field("a", FieldDescriptor::new(0, 4, Endianness::Little))
            .with_field("zzz", FieldDescriptor::new(4, 2, Endianness::Little));

        let err = parser
            .apply(&[7, 0, 0, 0, 1, 2], 0, &mapping, &mut record)
            .unwrap_err();
        assert_eq!(err.field(), "zzz");
        assert!(matches!(err, FieldError::UnknownField { .. }));
        // 先前字段的写入保留
        assert_eq!(record.get::<u32>("a"), Some(7));
    }

    #[test]
    fn test_negative_offset_out_of_range() {
        let registry = Arc::new(TypeRegistry::new());
        let parser = FieldMappingParser::new(Arc::clone(&registry));
        let mut record = header_record(&registry);
        let mapping =
            FieldMapping::new().with_field("b", FieldDescriptor::new(-8, 2, Endianness::Little));

        let err = parser.apply(&[0; 4], 0, &mapping, &mut record).unwrap_err();
        assert!(matches!(err, FieldError::NegativeOffsetOutOfRange { offset: -8, .. }));
    }

    #[test]
    fn test_descriptor_size_checked_not_type_width() {
        let registry = Arc::new(TypeRegistry::new());
        let parser = FieldMappingParser::new(Arc::clone(&registry));
        let mut record = header_record(&registry);
        // 描述符大小通过边界检查，但类型宽度超出缓冲区
        let mapping =
            FieldMapping::new().with_field("a", FieldDescriptor::new(0, 2, Endianness::Little));

        let err = parser.apply(&[1, 2, 3], 0, &mapping, &mut record).unwrap_err();
        assert!(matches!(err, FieldError::Handler { .. }));
        assert_eq!(record.get::<u32>("a"), Some(0));
    }
}
