//! 拆包错误定义
//!
//! 三类错误对应三种处理方式：
//! - [`ConfigurationError`]：构造期致命错误，阶段不可用
//! - [`FieldError`]：字段级可恢复错误，调用方丢弃记录且不推进游标
//! - [`StoreAccessError`]：数据产品访问失败，本次调用提前结束，下次重试

use thiserror::Error;

/// 类型处理器在解码/写入时的失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// 源缓冲区不足以读出该类型
    #[error("read of {width} bytes at offset {offset} exceeds buffer of {buffer_len} bytes")]
    SourceOutOfBounds {
        offset: usize,
        width: usize,
        buffer_len: usize,
    },
    /// 写入位置超出目标记录内存
    #[error("write of {len} bytes at field offset {field_offset} exceeds record of {record_size} bytes")]
    TargetOutOfBounds {
        field_offset: usize,
        len: usize,
        record_size: usize,
    },
}

/// 字段级错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// 目标记录类型中没有该字段
    #[error("field '{field}' not found in class '{class}'")]
    UnknownField { field: String, class: String },
    /// 字段声明类型没有注册处理器
    #[error("no handler for type '{type_name}' (field '{field}')")]
    UnknownType { field: String, type_name: String },
    /// 负偏移的绝对值超过缓冲区长度
    #[error("negative offset {offset} out of range for field '{field}' (buffer {buffer_len} bytes)")]
    NegativeOffsetOutOfRange {
        field: String,
        offset: i64,
        buffer_len: usize,
    },
    /// 字段越界
    #[error("field '{field}' (offset {offset}, size {size}) out of buffer bounds ({buffer_len} bytes)")]
    OutOfBounds {
        field: String,
        offset: usize,
        size: usize,
        buffer_len: usize,
    },
    /// 处理器失败
    #[error("handler failed for field '{field}' of type '{type_name}': {source}")]
    Handler {
        field: String,
        type_name: String,
        #[source]
        source: HandlerError,
    },
}

impl FieldError {
    /// 出错的字段名
    pub fn field(&self) -> &str {
        match self {
            FieldError::UnknownField { field, .. }
            | FieldError::UnknownType { field, .. }
            | FieldError::NegativeOffsetOutOfRange { field, .. }
            | FieldError::OutOfBounds { field, .. }
            | FieldError::Handler { field, .. } => field,
        }
    }
}

/// 配置错误（构造期，致命）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("class '{0}' could not be resolved by the schema provider")]
    UnknownClass(String),
    #[error("class '{0}' has no parsable fields")]
    NoParsableFields(String),
    #[error("invalid field mapping: {0}")]
    InvalidFieldMapping(String),
    #[error("unknown stage type '{0}'")]
    UnknownStageType(String),
    #[error("unsupported member type '{type_name}' for repeat count ('{product}.{member}')")]
    UnsupportedRepeatCountType {
        product: String,
        member: String,
        type_name: String,
    },
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    #[error("invalid pipeline config: {0}")]
    InvalidPipelineConfig(String),
    #[error("failed to read '{path}': {reason}")]
    Io { path: String, reason: String },
}

/// 数据产品访问错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreAccessError {
    #[error("data product '{0}' not found")]
    NotFound(String),
    #[error("data product '{name}' holds {actual}, expected {expected}")]
    KindMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("member '{member}' not found in data product '{product}'")]
    MemberNotFound { product: String, member: String },
}

/// 汇总错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnpackError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Store(#[from] StoreAccessError),
}
