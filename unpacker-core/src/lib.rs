//! Unpacker Core Library
//!
//! 二进制拆包系统的公共抽象：字段布局、字节流、标量类型、类结构能力、
//! 目标记录以及错误分类。

pub mod byte_stream;
pub mod error;
pub mod layout;
pub mod record;
pub mod scalar;
pub mod schema;
pub mod utils;

// 导出错误类型
pub use error::{ConfigurationError, FieldError, HandlerError, StoreAccessError, UnpackError};

// 导出常用类型，便于其他模块使用
pub use byte_stream::ByteStream;
pub use layout::{Endianness, FieldDescriptor, FieldMapping};
pub use record::{FieldValue, MemberReadError, Record, RecordMemory};
pub use scalar::{NativeScalar, ScalarKind, ScalarValue};
pub use schema::{
    ClassSchema, ClassSchemaBuilder, FieldSchema, SchemaProvider, SchemaRegistry, TypeLayout,
    TypeShape, OBJECT_HEADER_FIELDS,
};
