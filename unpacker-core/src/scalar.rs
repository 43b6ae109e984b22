//! 基本标量类型
//!
//! 定义固定宽度的整数、浮点与布尔类型，以及它们在各种命名体系下的别名

use std::fmt;

/// 基本标量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// 按其底层1字节整数存储
    Bool,
}

/// 类型名别名表：(类型名, 标量类型)
pub const SCALAR_ALIASES: &[(&str, ScalarKind)] = &[
    // Rust
    ("i8", ScalarKind::I8),
    ("u8", ScalarKind::U8),
    ("i16", ScalarKind::I16),
    ("u16", ScalarKind::U16),
    ("i32", ScalarKind::I32),
    ("u32", ScalarKind::U32),
    ("i64", ScalarKind::I64),
    ("u64", ScalarKind::U64),
    ("f32", ScalarKind::F32),
    ("f64", ScalarKind::F64),
    ("bool", ScalarKind::Bool),
    // C
    ("char", ScalarKind::I8),
    ("signed char", ScalarKind::I8),
    ("unsigned char", ScalarKind::U8),
    ("short", ScalarKind::I16),
    ("unsigned short", ScalarKind::U16),
    ("int", ScalarKind::I32),
    ("unsigned int", ScalarKind::U32),
    ("long", ScalarKind::I64),
    ("unsigned long", ScalarKind::U64),
    ("long long", ScalarKind::I64),
    ("unsigned long long", ScalarKind::U64),
    ("float", ScalarKind::F32),
    ("double", ScalarKind::F64),
    // C 定宽
    ("int8_t", ScalarKind::I8),
    ("uint8_t", ScalarKind::U8),
    ("int16_t", ScalarKind::I16),
    ("uint16_t", ScalarKind::U16),
    ("int32_t", ScalarKind::I32),
    ("uint32_t", ScalarKind::U32),
    ("uint", ScalarKind::U32),
    ("int64_t", ScalarKind::I64),
    ("uint64_t", ScalarKind::U64),
    // 宿主对象模型
    ("Char_t", ScalarKind::I8),
    ("UChar_t", ScalarKind::U8),
    ("Short_t", ScalarKind::I16),
    ("UShort_t", ScalarKind::U16),
    ("Int_t", ScalarKind::I32),
    ("UInt_t", ScalarKind::U32),
    ("Long_t", ScalarKind::I64),
    ("ULong_t", ScalarKind::U64),
    ("Long64_t", ScalarKind::I64),
    ("ULong64_t", ScalarKind::U64),
    ("Float_t", ScalarKind::F32),
    ("Double_t", ScalarKind::F64),
    ("Bool_t", ScalarKind::Bool),
];

impl ScalarKind {
    /// 按类型名查找标量类型（忽略首尾空白）
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        let name = type_name.trim();
        SCALAR_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, kind)| *kind)
    }

    /// 字节宽度
    pub fn width(self) -> usize {
        match self {
            ScalarKind::I8 | ScalarKind::U8 | ScalarKind::Bool => 1,
            ScalarKind::I16 | ScalarKind::U16 => 2,
            ScalarKind::I32 | ScalarKind::U32 | ScalarKind::F32 => 4,
            ScalarKind::I64 | ScalarKind::U64 | ScalarKind::F64 => 8,
        }
    }

    /// 规范名称
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::I8 => "i8",
            ScalarKind::U8 => "u8",
            ScalarKind::I16 => "i16",
            ScalarKind::U16 => "u16",
            ScalarKind::I32 => "i32",
            ScalarKind::U32 => "u32",
            ScalarKind::I64 => "i64",
            ScalarKind::U64 => "u64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::Bool => "bool",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 已解码的标量值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
}

macro_rules! native_bytes {
    ($bytes:expr, $ty:ty) => {{
        let mut raw = [0u8; std::mem::size_of::<$ty>()];
        raw.copy_from_slice($bytes.get(..std::mem::size_of::<$ty>())?);
        <$ty>::from_ne_bytes(raw)
    }};
}

impl ScalarValue {
    /// 从宿主字节序的字节切片解码；切片长度不足时返回None
    pub fn from_native_bytes(kind: ScalarKind, bytes: &[u8]) -> Option<Self> {
        let value = match kind {
            ScalarKind::I8 => ScalarValue::I8(native_bytes!(bytes, i8)),
            ScalarKind::U8 => ScalarValue::U8(native_bytes!(bytes, u8)),
            ScalarKind::I16 => ScalarValue::I16(native_bytes!(bytes, i16)),
            ScalarKind::U16 => ScalarValue::U16(native_bytes!(bytes, u16)),
            ScalarKind::I32 => ScalarValue::I32(native_bytes!(bytes, i32)),
            ScalarKind::U32 => ScalarValue::U32(native_bytes!(bytes, u32)),
            ScalarKind::I64 => ScalarValue::I64(native_bytes!(bytes, i64)),
            ScalarKind::U64 => ScalarValue::U64(native_bytes!(bytes, u64)),
            ScalarKind::F32 => ScalarValue::F32(native_bytes!(bytes, f32)),
            ScalarKind::F64 => ScalarValue::F64(native_bytes!(bytes, f64)),
            ScalarKind::Bool => ScalarValue::Bool(native_bytes!(bytes, u8) != 0),
        };
        Some(value)
    }

    /// 标量类型
    pub fn kind(&self) -> ScalarKind {
        match self {
            ScalarValue::I8(_) => ScalarKind::I8,
            ScalarValue::U8(_) => ScalarKind::U8,
            ScalarValue::I16(_) => ScalarKind::I16,
            ScalarValue::U16(_) => ScalarKind::U16,
            ScalarValue::I32(_) => ScalarKind::I32,
            ScalarValue::U32(_) => ScalarKind::U32,
            ScalarValue::I64(_) => ScalarKind::I64,
            ScalarValue::U64(_) => ScalarKind::U64,
            ScalarValue::F32(_) => ScalarKind::F32,
            ScalarValue::F64(_) => ScalarKind::F64,
            ScalarValue::Bool(_) => ScalarKind::Bool,
        }
    }

    /// 按指定字节序编码
    pub fn to_bytes(&self, little_endian: bool) -> Vec<u8> {
        macro_rules! encode {
            ($v:expr) => {
                if little_endian {
                    $v.to_le_bytes().to_vec()
                } else {
                    $v.to_be_bytes().to_vec()
                }
            };
        }
        match *self {
            ScalarValue::I8(v) => encode!(v),
            ScalarValue::U8(v) => encode!(v),
            ScalarValue::I16(v) => encode!(v),
            ScalarValue::U16(v) => encode!(v),
            ScalarValue::I32(v) => encode!(v),
            ScalarValue::U32(v) => encode!(v),
            ScalarValue::I64(v) => encode!(v),
            ScalarValue::U64(v) => encode!(v),
            ScalarValue::F32(v) => encode!(v),
            ScalarValue::F64(v) => encode!(v),
            ScalarValue::Bool(v) => vec![v as u8],
        }
    }

    /// 数值强制转换为整数计数
    ///
    /// 整数饱和到i64，浮点向零截断，布尔取0/1
    pub fn to_count(&self) -> i64 {
        match *self {
            ScalarValue::I8(v) => v as i64,
            ScalarValue::U8(v) => v as i64,
            ScalarValue::I16(v) => v as i64,
            ScalarValue::U16(v) => v as i64,
            ScalarValue::I32(v) => v as i64,
            ScalarValue::U32(v) => v as i64,
            ScalarValue::I64(v) => v,
            ScalarValue::U64(v) => i64::try_from(v).unwrap_or(i64::MAX),
            ScalarValue::F32(v) => v as i64,
            ScalarValue::F64(v) => v as i64,
            ScalarValue::Bool(v) => v as i64,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::I8(v) => write!(f, "{v}"),
            ScalarValue::U8(v) => write!(f, "{v}"),
            ScalarValue::I16(v) => write!(f, "{v}"),
            ScalarValue::U16(v) => write!(f, "{v}"),
            ScalarValue::I32(v) => write!(f, "{v}"),
            ScalarValue::U32(v) => write!(f, "{v}"),
            ScalarValue::I64(v) => write!(f, "{v}"),
            ScalarValue::U64(v) => write!(f, "{v}"),
            ScalarValue::F32(v) => write!(f, "{v}"),
            ScalarValue::F64(v) => write!(f, "{v}"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// 可从记录内存中按宿主字节序读取的Rust标量
pub trait NativeScalar: Sized + Copy {
    const KIND: ScalarKind;

    fn from_value(value: ScalarValue) -> Option<Self>;
}

macro_rules! impl_native_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl NativeScalar for $ty {
                const KIND: ScalarKind = ScalarKind::$variant;

                fn from_value(value: ScalarValue) -> Option<Self> {
                    match value {
                        ScalarValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_native_scalar! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
}
