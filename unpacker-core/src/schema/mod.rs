//! 类型结构描述
//!
//! 拆包目标记录的字段布局（字段名、声明类型、内存偏移、单元大小）由
//! [`SchemaProvider`]提供。本模块给出该能力的接口，以及基于构建期结构表的
//! 参考实现[`SchemaRegistry`]。

pub mod registry;

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::record::Record;
use crate::scalar::ScalarKind;

pub use registry::SchemaRegistry;

/// 框架对象头字段名
pub const OBJECT_HEADER_FIELDS: [&str; 2] = ["fUniqueID", "fBits"];

/// 对象头字段的声明类型
const OBJECT_HEADER_TYPE: &str = "unsigned int";

/// 不透明字段的对齐
const OPAQUE_ALIGN: usize = 8;

/// 类型的内存形态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Scalar(ScalarKind),
    Array { element: Box<TypeShape>, count: usize },
    /// 自定义处理器注册的类型，仅知宽度
    Custom { width: usize },
}

impl TypeShape {
    /// 字节宽度
    pub fn width(&self) -> usize {
        match self {
            TypeShape::Scalar(kind) => kind.width(),
            TypeShape::Array { element, count } => element.width() * count,
            TypeShape::Custom { width } => *width,
        }
    }

    /// 自然对齐（最内层标量宽度）
    pub fn align(&self) -> usize {
        match self {
            TypeShape::Scalar(kind) => kind.width(),
            TypeShape::Array { element, .. } => element.align(),
            TypeShape::Custom { .. } => 1,
        }
    }
}

/// 类型名到内存形态的查询
pub trait TypeLayout {
    fn shape_of(&self, type_name: &str) -> Option<TypeShape>;
}

/// 单个字段的结构信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub type_name: String,
    /// 字段在记录内存中的偏移
    pub offset: usize,
    pub unit_size: usize,
    /// 无法识别的类型（容器等）为None
    pub shape: Option<TypeShape>,
}

/// 类结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSchema {
    name: String,
    fields: Vec<FieldSchema>,
    size: usize,
}

impl ClassSchema {
    pub fn builder(name: impl Into<String>) -> ClassSchemaBuilder {
        ClassSchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按声明顺序的字段
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// 记录内存总大小
    pub fn size(&self) -> usize {
        self.size
    }
}

enum FieldEntry {
    Typed {
        name: String,
        type_name: String,
    },
    Opaque {
        name: String,
        type_name: String,
        size: usize,
    },
}

impl FieldEntry {
    fn name(&self) -> &str {
        match self {
            FieldEntry::Typed { name, .. } | FieldEntry::Opaque { name, .. } => name,
        }
    }
}

/// 类结构构建器
///
/// 按声明顺序以自然对齐排布字段
pub struct ClassSchemaBuilder {
    name: String,
    object_header: bool,
    entries: Vec<FieldEntry>,
}

impl ClassSchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            object_header: false,
            entries: Vec::new(),
        }
    }

    /// 在所有字段之前加入框架对象头字段
    pub fn with_object_header(mut self) -> Self {
        self.object_header = true;
        self
    }

    /// 添加类型可识别的字段
    pub fn field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.entries.push(FieldEntry::Typed {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }

    /// 添加已知大小、类型不可拆包的字段（容器、变长类型等）
    pub fn opaque_field(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
        size: usize,
    ) -> Self {
        self.entries.push(FieldEntry::Opaque {
            name: name.into(),
            type_name: type_name.into(),
            size,
        });
        self
    }

    /// 计算偏移并生成类结构
    pub fn build(self, layout: &dyn TypeLayout) -> Result<ClassSchema, ConfigurationError> {
        let mut entries = Vec::with_capacity(self.entries.len() + OBJECT_HEADER_FIELDS.len());
        if self.object_header {
            for name in OBJECT_HEADER_FIELDS {
                entries.push(FieldEntry::Typed {
                    name: name.to_string(),
                    type_name: OBJECT_HEADER_TYPE.to_string(),
                });
            }
        }
        entries.extend(self.entries);

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(entries.len());
        let mut cursor = 0usize;
        let mut max_align = 1usize;

        for entry in entries {
            if !seen.insert(entry.name().to_string()) {
                return Err(ConfigurationError::InvalidSchema(format!(
                    "duplicate field '{}' in class '{}'",
                    entry.name(),
                    self.name
                )));
            }

            let (name, type_name, shape, size, align) = match entry {
                FieldEntry::Typed { name, type_name } => {
                    let shape = layout.shape_of(&type_name).ok_or_else(|| {
                        ConfigurationError::InvalidSchema(format!(
                            "unknown type '{type_name}' for field '{name}' in class '{}'",
                            self.name
                        ))
                    })?;
                    let size = shape.width();
                    let align = shape.align();
                    (name, type_name, Some(shape), size, align)
                }
                FieldEntry::Opaque {
                    name,
                    type_name,
                    size,
                } => {
                    let shape = layout
                        .shape_of(&type_name)
                        .filter(|shape| shape.width() == size);
                    let align = shape.as_ref().map_or(OPAQUE_ALIGN, TypeShape::align);
                    (name, type_name, shape, size, align)
                }
            };

            let offset = align_up(cursor, align);
            cursor = offset + size;
            max_align = max_align.max(align);
            fields.push(FieldSchema {
                name,
                type_name,
                offset,
                unit_size: size,
                shape,
            });
        }

        Ok(ClassSchema {
            name: self.name,
            fields,
            size: align_up(cursor, max_align),
        })
    }
}

fn align_up(value: usize, align: usize) -> usize {
    let align = align.max(1);
    value.div_ceil(align) * align
}

/// 类结构查询能力
///
/// 调用均为同步调用；任何失败对调用方的构造过程都是致命的
pub trait SchemaProvider: Send + Sync {
    /// 类是否存在
    fn class_exists(&self, name: &str) -> bool;

    /// 类结构
    fn class_schema(&self, name: &str) -> Option<Arc<ClassSchema>>;

    /// 按声明顺序列出字段
    fn list_fields(&self, name: &str) -> Option<Vec<FieldSchema>> {
        self.class_schema(name)
            .map(|schema| schema.fields().to_vec())
    }

    /// 创建一个零初始化的记录
    fn instantiate(&self, name: &str) -> Option<Record> {
        self.class_schema(name).map(Record::new)
    }
}
