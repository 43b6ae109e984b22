//! 基于类结构的映射构建
//!
//! 只给出目标类型名，按类结构查询结果自动生成字段映射

use std::sync::Arc;

use tracing::{debug, info};
use unpacker_core::{
    ConfigurationError, Endianness, FieldDescriptor, FieldError, FieldMapping, Record,
    SchemaProvider, OBJECT_HEADER_FIELDS,
};

use crate::field_mapping_parser::FieldMappingParser;
use crate::type_registry::TypeRegistry;

/// 变长或聚合类型的类型名特征
pub const CONTAINER_MARKERS: [&str; 4] = ["std::", "vector", "Vec<", "String"];

/// 类型名是否表示容器类型
pub fn is_container_type(type_name: &str) -> bool {
    CONTAINER_MARKERS
        .iter()
        .any(|marker| type_name.contains(marker))
}

/// 基于类结构的解析器
#[derive(Debug, Clone)]
pub struct ReflectionBasedParser {
    class_name: String,
    default_endianness: Endianness,
    mapping: FieldMapping,
    total_span: usize,
    parser: FieldMappingParser,
}

impl ReflectionBasedParser {
    /// 构建字段映射
    ///
    /// 跳过对象头字段、容器类型字段以及没有处理器的字段；
    /// 字段偏移取记录内存偏移，大小取单元大小。
    ///
    /// # 返回
    /// - `Err(ConfigurationError)`: 类不存在或没有可解析字段
    pub fn new(
        class_name: impl Into<String>,
        default_endianness: Endianness,
        schema: &dyn SchemaProvider,
        registry: Arc<TypeRegistry>,
    ) -> Result<Self, ConfigurationError> {
        let class_name = class_name.into();
        if !schema.class_exists(&class_name) {
            return Err(ConfigurationError::UnknownClass(class_name));
        }
        let fields = schema
            .list_fields(&class_name)
            .ok_or_else(|| ConfigurationError::UnknownClass(class_name.clone()))?;

        let mut mapping = FieldMapping::new();
        let mut total_span = 0usize;
        for field in fields {
            if OBJECT_HEADER_FIELDS.contains(&field.name.as_str()) {
                debug!(class = %class_name, field = %field.name, "skip object header field");
                continue;
            }
            if is_container_type(&field.type_name) {
                debug!(
                    class = %class_name,
                    field = %field.name,
                    type_name = %field.type_name,
                    "skip container field"
                );
                continue;
            }
            if registry.resolve(&field.type_name).is_none() {
                debug!(
                    class = %class_name,
                    field = %field.name,
                    type_name = %field.type_name,
                    "skip field without handler"
                );
                continue;
            }

            let offset = i64::try_from(field.offset).map_err(|_| {
                ConfigurationError::InvalidFieldMapping(format!(
                    "offset of field '{}' does not fit a descriptor",
                    field.name
                ))
            })?;
            total_span += field.unit_size;
            mapping.insert(
                field.name,
                FieldDescriptor::new(offset, field.unit_size, default_endianness),
            );
        }

        if mapping.is_empty() {
            return Err(ConfigurationError::NoParsableFields(class_name));
        }

        info!(
            class = %class_name,
            fields = mapping.len(),
            total_span,
            endianness = %default_endianness,
            "built field mapping from class schema"
        );

        Ok(Self {
            class_name,
            default_endianness,
            mapping,
            total_span,
            parser: FieldMappingParser::new(registry),
        })
    }

    /// 从`start_offset`处解析一条记录
    pub fn parse(
        &self,
        buffer: &[u8],
        start_offset: usize,
        target: &mut Record,
    ) -> Result<(), FieldError> {
        self.parser
            .apply(buffer, start_offset, &self.mapping, target)
    }

    /// 一条完整记录消耗的字节数
    pub fn total_span(&self) -> usize {
        self.total_span
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn default_endianness(&self) -> Endianness {
        self.default_endianness
    }
}
