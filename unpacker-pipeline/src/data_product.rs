//! 数据产品及其存储
//!
//! 数据产品是阶段之间交换状态的命名单元。存储按名称保存产品并记录发布顺序，
//! 访问通过作用域内的读/写检出完成，检出在离开作用域时自动释放。

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use unpacker_core::{ByteStream, Record, StoreAccessError};

/// 数据产品的值
#[derive(Debug, Clone, PartialEq)]
pub enum ProductValue {
    /// 原始字节流
    ByteStream(ByteStream),
    /// 字节流游标等整数状态
    Index(i64),
    /// 拆包得到的记录
    Record(Record),
}

impl ProductValue {
    /// 值类型名称
    pub fn kind_name(&self) -> &'static str {
        match self {
            ProductValue::ByteStream(_) => "byte_stream",
            ProductValue::Index(_) => "index",
            ProductValue::Record(_) => "record",
        }
    }

    pub fn as_byte_stream(&self) -> Option<&ByteStream> {
        match self {
            ProductValue::ByteStream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            ProductValue::Index(index) => Some(*index),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            ProductValue::Record(record) => Some(record),
            _ => None,
        }
    }
}

impl fmt::Display for ProductValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductValue::ByteStream(stream) => {
                write!(f, "{} bytes [{}]", stream.len(), stream.hex_preview(16))
            }
            ProductValue::Index(index) => write!(f, "{index}"),
            ProductValue::Record(record) => write!(f, "{record}"),
        }
    }
}

/// 数据产品
#[derive(Debug, Clone, PartialEq)]
pub struct DataProduct {
    /// 产品名称
    pub name: String,
    /// 产品值
    pub value: ProductValue,
    /// 来源标签
    pub tags: IndexSet<String>,
}

impl DataProduct {
    /// 创建新的数据产品
    pub fn new(name: impl Into<String>, value: ProductValue) -> Self {
        Self {
            name: name.into(),
            value,
            tags: IndexSet::new(),
        }
    }

    /// 添加标签
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// 读检出
pub type ReadCheckout = ArcRwLockReadGuard<RawRwLock, DataProduct>;

/// 写检出
pub type WriteCheckout = ArcRwLockWriteGuard<RawRwLock, DataProduct>;

type Slot = Arc<RwLock<DataProduct>>;

/// 数据产品存储
///
/// 每个产品单独加锁：同一产品的读检出可并发持有，写检出独占，不同产品互不影响。
/// 名称表只在查找、发布和提取时短暂加锁，持有检出期间仍可发布或提取其他产品。
#[derive(Debug, Default)]
pub struct DataProductStore {
    products: RwLock<IndexMap<String, Slot>>,
}

impl DataProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 产品是否存在
    pub fn has(&self, name: &str) -> bool {
        self.products.read().contains_key(name)
    }

    fn slot(&self, name: &str) -> Option<Slot> {
        self.products.read().get(name).cloned()
    }

    /// 只读检出
    pub fn checkout_read(&self, name: &str) -> Option<ReadCheckout> {
        self.slot(name).map(|slot| slot.read_arc())
    }

    /// 可写检出
    pub fn checkout_write(&self, name: &str) -> Option<WriteCheckout> {
        self.slot(name).map(|slot| slot.write_arc())
    }

    /// 发布产品，同名产品被替换（保持原发布位置）
    ///
    /// 替换不等待旧产品上的检出；已持有的检出继续看到旧值
    pub fn publish(&self, product: DataProduct) {
        self.products
            .write()
            .insert(product.name.clone(), Arc::new(RwLock::new(product)));
    }

    /// 按名称、值和标签发布
    pub fn publish_or_replace<I, S>(&self, name: impl Into<String>, value: ProductValue, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.publish(DataProduct::new(name, value).with_tags(tags));
    }

    /// 一次发布多个产品
    pub fn publish_many(&self, products: impl IntoIterator<Item = DataProduct>) {
        let mut guard = self.products.write();
        for product in products {
            guard.insert(product.name.clone(), Arc::new(RwLock::new(product)));
        }
    }

    /// 移除并返回产品
    pub fn extract(&self, name: &str) -> Option<DataProduct> {
        let slot = self.products.write().shift_remove(name)?;
        Some(match Arc::try_unwrap(slot) {
            Ok(lock) => lock.into_inner(),
            // 仍有检出持有时复制当前值
            Err(slot) => slot.read().clone(),
        })
    }

    /// 按发布顺序列出产品名称
    pub fn list_names(&self) -> Vec<String> {
        self.products.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.read().is_empty()
    }

    /// 按发布顺序复制所有产品
    pub fn snapshot(&self) -> Vec<DataProduct> {
        let slots: Vec<Slot> = self.products.read().values().cloned().collect();
        slots.iter().map(|slot| slot.read().clone()).collect()
    }

    /// 取字节流（共享底层缓冲区）
    pub fn byte_stream(&self, name: &str) -> Result<ByteStream, StoreAccessError> {
        let product = self
            .checkout_read(name)
            .ok_or_else(|| StoreAccessError::NotFound(name.to_string()))?;
        product
            .value
            .as_byte_stream()
            .cloned()
            .ok_or_else(|| StoreAccessError::KindMismatch {
                name: name.to_string(),
                expected: "byte_stream",
                actual: product.value.kind_name(),
            })
    }

    /// 取整数状态
    pub fn index(&self, name: &str) -> Result<i64, StoreAccessError> {
        let product = self
            .checkout_read(name)
            .ok_or_else(|| StoreAccessError::NotFound(name.to_string()))?;
        product
            .value
            .as_index()
            .ok_or_else(|| StoreAccessError::KindMismatch {
                name: name.to_string(),
                expected: "index",
                actual: product.value.kind_name(),
            })
    }
}
