//! Unpacker Engine
//!
//! 拆包引擎，提供：
//! - 类型处理器注册表（标量与定长数组）
//! - 字段映射解释器
//! - 基于类结构的字段映射构建

pub mod field_mapping_parser;
pub mod reflection_parser;
pub mod type_registry;

pub use field_mapping_parser::FieldMappingParser;
pub use reflection_parser::{is_container_type, ReflectionBasedParser, CONTAINER_MARKERS};
pub use type_registry::{parse_array_type, HandlerFn, TypeHandler, TypeRegistry};
