//! 类型处理器注册表
//!
//! 类型名 -> (字节宽度, 解码并写入处理器)。基本标量类型在构造时注册，
//! 定长数组类型（`base[N]`或`array<base,N>`）在查询时按需递归构造。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use regex::Regex;
use tracing::debug;
use unpacker_core::scalar::SCALAR_ALIASES;
use unpacker_core::utils::swap_bytes;
use unpacker_core::{Endianness, HandlerError, RecordMemory, ScalarKind, TypeLayout, TypeShape};

/// 处理器函数：(缓冲区, 绝对偏移, 字节序, 目标记录, 字段内存偏移)
pub type HandlerFn = dyn Fn(&[u8], usize, Endianness, &mut dyn RecordMemory, usize) -> Result<(), HandlerError>
    + Send
    + Sync;

static BRACKET_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\[\s*(\d+)\s*\]$").expect("valid array regex"));

static ANGLE_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:std::)?array\s*<(.+),\s*(\d+)\s*>$").expect("valid array regex")
});

static SHARED: LazyLock<Arc<TypeRegistry>> = LazyLock::new(|| Arc::new(TypeRegistry::new()));

/// 类型处理器
#[derive(Clone)]
pub struct TypeHandler {
    byte_width: usize,
    decode: Arc<HandlerFn>,
}

impl TypeHandler {
    pub fn new<F>(byte_width: usize, decode: F) -> Self
    where
        F: Fn(&[u8], usize, Endianness, &mut dyn RecordMemory, usize) -> Result<(), HandlerError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            byte_width,
            decode: Arc::new(decode),
        }
    }

    pub fn byte_width(&self) -> usize {
        self.byte_width
    }

    /// 从`buffer[offset..]`解码并写入目标记录的`field_offset`处
    pub fn decode_and_store(
        &self,
        buffer: &[u8],
        offset: usize,
        endianness: Endianness,
        target: &mut dyn RecordMemory,
        field_offset: usize,
    ) -> Result<(), HandlerError> {
        (self.decode)(buffer, offset, endianness, target, field_offset)
    }
}

impl fmt::Debug for TypeHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHandler")
            .field("byte_width", &self.byte_width)
            .finish_non_exhaustive()
    }
}

/// 取源区间，越界时报错
fn source_range(buffer: &[u8], offset: usize, width: usize) -> Result<&[u8], HandlerError> {
    offset
        .checked_add(width)
        .and_then(|end| buffer.get(offset..end))
        .ok_or(HandlerError::SourceOutOfBounds {
            offset,
            width,
            buffer_len: buffer.len(),
        })
}

/// 标量处理器：字节序与宿主不一致时翻转
fn scalar_handler(kind: ScalarKind) -> TypeHandler {
    let width = kind.width();
    TypeHandler::new(width, move |buffer, offset, endianness, target, field_offset| {
        let source = source_range(buffer, offset, width)?;
        if endianness.is_native() {
            return target.set_field_bytes(field_offset, source);
        }
        let mut value = [0u8; 8];
        let value = &mut value[..width];
        value.copy_from_slice(source);
        swap_bytes(value);
        target.set_field_bytes(field_offset, value)
    })
}

/// 数组处理器：字节序一致时整体复制，否则逐元素处理
fn array_handler(element: TypeHandler, count: usize, total_width: usize) -> TypeHandler {
    let element_width = element.byte_width();
    TypeHandler::new(
        total_width,
        move |buffer, offset, endianness, target, field_offset| {
            let source = source_range(buffer, offset, total_width)?;
            if endianness.is_native() {
                return target.set_field_bytes(field_offset, source);
            }
            for i in 0..count {
                element.decode_and_store(
                    buffer,
                    offset + i * element_width,
                    endianness,
                    target,
                    field_offset + i * element_width,
                )?;
            }
            Ok(())
        },
    )
}

/// 解析数组类型名，返回(基类型名, 元素个数)
///
/// 元素个数为0或溢出时返回None
pub fn parse_array_type(type_name: &str) -> Option<(&str, usize)> {
    let name = type_name.trim();
    let captures = ANGLE_ARRAY
        .captures(name)
        .or_else(|| BRACKET_ARRAY.captures(name))?;
    let base = captures.get(1)?.as_str().trim();
    let count: usize = captures.get(2)?.as_str().parse().ok()?;
    if base.is_empty() || count == 0 {
        return None;
    }
    Some((base, count))
}

#[derive(Clone)]
struct Registered {
    handler: TypeHandler,
    /// 基本标量类型
    kind: Option<ScalarKind>,
}

/// 类型处理器注册表
///
/// 进程级共享实例通过[`TypeRegistry::shared`]获取：首次访问时初始化，进程内不销毁。
/// 组件以`Arc`注入注册表，测试中可使用独立实例。
pub struct TypeRegistry {
    handlers: RwLock<HashMap<String, Registered>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("registered", &self.handlers.read().len())
            .finish()
    }
}

impl TypeRegistry {
    /// 创建注册了全部基本标量类型的注册表
    pub fn new() -> Self {
        let mut handlers = HashMap::with_capacity(SCALAR_ALIASES.len());
        for (type_name, kind) in SCALAR_ALIASES {
            handlers.insert(
                type_name.to_string(),
                Registered {
                    handler: scalar_handler(*kind),
                    kind: Some(*kind),
                },
            );
        }
        debug!(count = handlers.len(), "registered primitive type handlers");
        Self {
            handlers: RwLock::new(handlers),
        }
    }

    /// 进程级共享注册表
    pub fn shared() -> Arc<TypeRegistry> {
        Arc::clone(&SHARED)
    }

    /// 注册（或替换）类型处理器
    pub fn register(&self, type_name: impl Into<String>, handler: TypeHandler) {
        let type_name = type_name.into();
        debug!(type_name = %type_name, width = handler.byte_width(), "register handler");
        self.handlers.write().insert(
            type_name.trim().to_string(),
            Registered {
                handler,
                kind: None,
            },
        );
    }

    /// 是否直接注册了该类型名
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.handlers.read().contains_key(type_name.trim())
    }

    /// 查找类型处理器；未知或格式错误的类型名返回None
    pub fn resolve(&self, type_name: &str) -> Option<TypeHandler> {
        let name = type_name.trim();
        if let Some(registered) = self.handlers.read().get(name) {
            return Some(registered.handler.clone());
        }

        let Some((base, count)) = parse_array_type(name) else {
            debug!(type_name = name, "no handler found");
            return None;
        };
        let Some(element) = self.resolve(base) else {
            debug!(type_name = name, base, "no handler for array base type");
            return None;
        };
        let total_width = element.byte_width().checked_mul(count)?;
        debug!(type_name = name, base, count, total_width, "constructed array handler");
        Some(array_handler(element, count, total_width))
    }

    /// 类型字节宽度，与[`resolve`](Self::resolve)的宽度计算一致
    pub fn byte_width_of(&self, type_name: &str) -> Option<usize> {
        let name = type_name.trim();
        if let Some(registered) = self.handlers.read().get(name) {
            return Some(registered.handler.byte_width());
        }
        let (base, count) = parse_array_type(name)?;
        self.byte_width_of(base)?.checked_mul(count)
    }
}

impl TypeLayout for TypeRegistry {
    fn shape_of(&self, type_name: &str) -> Option<TypeShape> {
        let name = type_name.trim();
        if let Some(registered) = self.handlers.read().get(name) {
            return Some(match registered.kind {
                Some(kind) => TypeShape::Scalar(kind),
                None => TypeShape::Custom {
                    width: registered.handler.byte_width(),
                },
            });
        }
        let (base, count) = parse_array_type(name)?;
        let element = self.shape_of(base)?;
        element.width().checked_mul(count)?;
        Some(TypeShape::Array {
            element: Box::new(element),
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 简单的字节内存
    struct Memory(Vec<u8>);

    impl RecordMemory for Memory {
        fn set_field_bytes(
            &mut self,
            field_offset: usize,
            bytes: &[u8],
        ) -> Result<(), HandlerError> {
            let len = self.0.len();
            self.0
                .get_mut(field_offset..field_offset + bytes.len())
                .ok_or(HandlerError::TargetOutOfBounds {
                    field_offset,
                    len: bytes.len(),
                    record_size: len,
                })?
                .copy_from_slice(bytes);
            Ok(())
        }

        fn memory_size(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn test_parse_array_type() {
        assert_eq!(parse_array_type("u8[4]"), Some(("u8", 4)));
        assert_eq!(parse_array_type("array<int, 3>"), Some(("int", 3)));
        assert_eq!(parse_array_type(" array< unsigned short ,2> "), Some(("unsigned short", 2)));
        assert_eq!(parse_array_type("u8[2][3]"), Some(("u8[2]", 3)));
        assert_eq!(
            parse_array_type("array<array<u16,2>,3>"),
            Some(("array<u16,2>", 3))
        );
        assert_eq!(parse_array_type("std::array<float,2>"), Some(("float", 2)));
        assert_eq!(parse_array_type("u8[0]"), None);
        assert_eq!(parse_array_type("u8[]"), None);
        assert_eq!(parse_array_type("u8"), None);
        assert_eq!(parse_array_type("u8[99999999999999999999999]"), None);
    }

    #[test]
    fn test_scalar_handler_swaps_foreign_endianness() {
        let registry = TypeRegistry::new();
        let handler = registry.resolve("uint32_t").unwrap();
        assert_eq!(handler.byte_width(), 4);

        let mut memory = Memory(vec![0; 4]);
        handler
            .decode_and_store(&[0x00, 0x00, 0x01, 0x02], 0, Endianness::Big, &mut memory, 0)
            .unwrap();
        assert_eq!(u32::from_ne_bytes(memory.0.try_into().unwrap()), 0x0102);
    }

    #[test]
    fn test_scalar_handler_source_bounds() {
        let registry = TypeRegistry::new();
        let handler = registry.resolve("u16").unwrap();
        let mut memory = Memory(vec![0; 2]);
        let err = handler
            .decode_and_store(&[0x01, 0x02], 1, Endianness::Little, &mut memory, 0)
            .unwrap_err();
        assert!(matches!(err, HandlerError::SourceOutOfBounds { .. }));
        assert_eq!(memory.0, vec![0, 0]);
    }

    #[test]
    fn test_unknown_types_have_no_handler() {
        let registry = TypeRegistry::new();
        assert!(registry.resolve("std::string").is_none());
        assert!(registry.resolve("mystery[4]").is_none());
        assert!(registry.resolve("u8[0]").is_none());
        assert_eq!(registry.byte_width_of("mystery[4]"), None);
        assert_eq!(registry.shape_of("mystery"), None);
    }

    #[test]
    fn test_custom_handler_registration() {
        let registry = TypeRegistry::new();
        assert!(!registry.is_registered("u24"));
        registry.register(
            "u24",
            TypeHandler::new(3, |buffer, offset, _endianness, target, field_offset| {
                let bytes = source_range(buffer, offset, 3)?;
                target.set_field_bytes(field_offset, bytes)
            }),
        );
        assert!(registry.is_registered("u24"));
        assert_eq!(registry.byte_width_of("u24[2]"), Some(6));
        assert_eq!(registry.shape_of("u24"), Some(TypeShape::Custom { width: 3 }));
        assert_eq!(registry.resolve("u24[2]").unwrap().byte_width(), 6);
    }

    #[test]
    fn test_shared_registry_is_singleton() {
        let a = TypeRegistry::shared();
        let b = TypeRegistry::shared();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.resolve("double").is_some());
    }
}
