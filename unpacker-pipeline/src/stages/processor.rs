//! 字节流处理器
//!
//! 绑定输入字节流产品和持久化游标，供拆包类阶段共用

use tracing::{debug, error, warn};
use unpacker_core::{ByteStream, ConfigurationError, StoreAccessError};

use crate::config::{StageParameters, StageType};
use crate::data_product::{DataProductStore, ProductValue};

/// 输入字节流产品的默认名称
pub const DEFAULT_INPUT_BYTE_STREAM: &str = "bytestream_bank_DATA";

/// 游标产品的默认名称
pub const DEFAULT_LAST_INDEX_KEY: &str = "last_processed_packet_index";

pub const INPUT_BYTE_STREAM_PARAM: &str = "input_byte_stream_product_name";
pub const LAST_INDEX_KEY_PARAM: &str = "last_index_key";

/// 游标产品标签
pub fn cursor_tags(stage_type: StageType) -> [String; 3] {
    [
        "internal".to_string(),
        "byte_stream_index".to_string(),
        format!("built_by_{stage_type}"),
    ]
}

/// 字节流处理器
#[derive(Debug, Clone)]
pub struct ByteStreamProcessor {
    stage_id: String,
    stage_type: StageType,
    input_byte_stream: String,
    last_index_key: String,
}

impl ByteStreamProcessor {
    pub fn new(
        stage_id: impl Into<String>,
        stage_type: StageType,
        input_byte_stream: impl Into<String>,
        last_index_key: impl Into<String>,
    ) -> Self {
        Self {
            stage_id: stage_id.into(),
            stage_type,
            input_byte_stream: input_byte_stream.into(),
            last_index_key: last_index_key.into(),
        }
    }

    /// 从阶段参数读取产品名称
    pub fn from_parameters(
        stage_id: &str,
        stage_type: StageType,
        params: &StageParameters<'_>,
    ) -> Result<Self, ConfigurationError> {
        let input_byte_stream = params.str_or(INPUT_BYTE_STREAM_PARAM, DEFAULT_INPUT_BYTE_STREAM)?;
        let last_index_key = params.str_or(LAST_INDEX_KEY_PARAM, DEFAULT_LAST_INDEX_KEY)?;
        debug!(
            stage = stage_id,
            input_byte_stream = %input_byte_stream,
            last_index_key = %last_index_key,
            "byte stream processor configured"
        );
        Ok(Self::new(stage_id, stage_type, input_byte_stream, last_index_key))
    }

    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    pub fn input_byte_stream(&self) -> &str {
        &self.input_byte_stream
    }

    pub fn last_index_key(&self) -> &str {
        &self.last_index_key
    }

    /// 取输入字节流
    ///
    /// 不存在或为空时返回None（无事可做）；类型不符时记录错误后返回None
    pub fn acquire_input(&self, store: &DataProductStore) -> Option<ByteStream> {
        if !store.has(&self.input_byte_stream) {
            debug!(
                stage = %self.stage_id,
                product = %self.input_byte_stream,
                "input byte stream not found"
            );
            return None;
        }
        match store.byte_stream(&self.input_byte_stream) {
            Ok(stream) if stream.is_usable() => Some(stream),
            Ok(_) => {
                warn!(
                    stage = %self.stage_id,
                    product = %self.input_byte_stream,
                    "input byte stream is empty"
                );
                None
            }
            Err(e) => {
                error!(stage = %self.stage_id, "failed to acquire input byte stream: {e}");
                None
            }
        }
    }

    /// 读取游标；尚未持久化时为0
    pub fn last_read_index(&self, store: &DataProductStore) -> Result<i64, StoreAccessError> {
        if !store.has(&self.last_index_key) {
            return Ok(0);
        }
        store.index(&self.last_index_key)
    }

    /// 写入游标，首次写入时创建产品
    pub fn set_last_read_index(
        &self,
        store: &DataProductStore,
        index: i64,
    ) -> Result<(), StoreAccessError> {
        if let Some(mut product) = store.checkout_write(&self.last_index_key) {
            let actual = product.value.kind_name();
            let ProductValue::Index(current) = &mut product.value else {
                return Err(StoreAccessError::KindMismatch {
                    name: self.last_index_key.clone(),
                    expected: "index",
                    actual,
                });
            };
            *current = index;
            return Ok(());
        }
        store.publish_or_replace(
            self.last_index_key.as_str(),
            ProductValue::Index(index),
            cursor_tags(self.stage_type),
        );
        Ok(())
    }
}
