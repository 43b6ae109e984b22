//! 结构表注册中心
//!
//! [`SchemaProvider`]的参考实现：类结构在构建期注册，或从JSON结构表加载

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;

use super::{ClassSchema, SchemaProvider, TypeLayout};
use crate::error::ConfigurationError;

/// 结构表文档
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaTableDoc {
    classes: IndexMap<String, ClassDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassDoc {
    #[serde(default)]
    object_header: bool,
    fields: Vec<FieldDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldDoc {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    /// 给出时按不透明字段处理
    size: Option<usize>,
}

/// 类结构注册中心
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    classes: HashMap<String, Arc<ClassSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册类结构（同名覆盖）
    pub fn register(&mut self, schema: ClassSchema) {
        self.classes
            .insert(schema.name().to_string(), Arc::new(schema));
    }

    /// 链式注册
    pub fn with_class(mut self, schema: ClassSchema) -> Self {
        self.register(schema);
        self
    }

    /// 已注册类名（无序）
    pub fn class_names(&self) -> Vec<&str> {
        self.classes.keys().map(String::as_str).collect()
    }

    /// 从JSON结构表加载
    pub fn from_json_str(
        json_str: &str,
        layout: &dyn TypeLayout,
    ) -> Result<Self, ConfigurationError> {
        let doc: SchemaTableDoc = serde_json::from_str(json_str)
            .map_err(|e| ConfigurationError::InvalidSchema(e.to_string()))?;

        let mut registry = Self::new();
        for (class_name, class_doc) in doc.classes {
            let mut builder = ClassSchema::builder(class_name);
            if class_doc.object_header {
                builder = builder.with_object_header();
            }
            for field in class_doc.fields {
                builder = match field.size {
                    Some(size) => builder.opaque_field(field.name, field.type_name, size),
                    None => builder.field(field.name, field.type_name),
                };
            }
            registry.register(builder.build(layout)?);
        }
        Ok(registry)
    }

    /// 从JSON结构表文件加载
    pub fn from_json_file(
        path: impl AsRef<Path>,
        layout: &dyn TypeLayout,
    ) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json_str = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json_str, layout)
    }
}

impl SchemaProvider for SchemaRegistry {
    fn class_exists(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    fn class_schema(&self, name: &str) -> Option<Arc<ClassSchema>> {
        self.classes.get(name).cloned()
    }
}
