//! 重复序列阶段
//!
//! 持有一条独立配置的内部流水线，每次调用按另一数据产品中的成员值决定执行次数。
//! 外部字节流和游标在调用开始时转入内部存储；内部每轮新产生的产品被提取、
//! 以轮次序号重命名后一次性发布到外部存储，最后内部游标写回外部游标。

use tracing::{debug, error, warn};
use unpacker_core::{
    ConfigurationError, MemberReadError, StoreAccessError, UnpackError,
};

use super::processor::{cursor_tags, ByteStreamProcessor};
use crate::config::{PipelineConfig, StageConfig, StageType};
use crate::data_product::{DataProductStore, ProductValue};
use crate::pipeline::{Pipeline, PipelineContext, Stage};

pub const REPEAT_COUNT_PRODUCT_PARAM: &str = "repeat_count_product_name";
pub const REPEAT_COUNT_MEMBER_PARAM: &str = "repeat_count_product_member";
pub const PIPELINE_CONFIG_PARAM: &str = "pipeline_config";
pub const PIPELINE_CONFIG_FILE_PARAM: &str = "pipeline_config_file";

/// 转入内部存储的字节流标签
const TRANSFERRED_STREAM_TAGS: [&str; 2] = ["internal", "transferred_byte_stream"];

/// 重复序列阶段
pub struct RepeatingSequenceStage {
    id: String,
    processor: ByteStreamProcessor,
    repeat_count_product: Option<String>,
    repeat_count_member: Option<String>,
    inner: Pipeline,
}

impl RepeatingSequenceStage {
    /// 构建阶段及其内部流水线
    ///
    /// `pipeline_config`（内联文档）与`pipeline_config_file`（文件路径）必须且只能给出一个
    pub fn new(config: &StageConfig, context: &PipelineContext) -> Result<Self, ConfigurationError> {
        let params = config.parameters();
        let processor =
            ByteStreamProcessor::from_parameters(&config.id, StageType::RepeatingSequence, &params)?;
        let repeat_count_product = params
            .optional_str(REPEAT_COUNT_PRODUCT_PARAM)?
            .map(str::to_string);
        let repeat_count_member = params
            .optional_str(REPEAT_COUNT_MEMBER_PARAM)?
            .map(str::to_string);

        let inner_config = match (
            params.get(PIPELINE_CONFIG_PARAM),
            params.optional_str(PIPELINE_CONFIG_FILE_PARAM)?,
        ) {
            (Some(value), None) => PipelineConfig::from_json_value(value)?,
            (None, Some(path)) => PipelineConfig::from_json_file(path)?,
            (Some(_), Some(_)) => {
                return Err(ConfigurationError::InvalidParameter {
                    name: format!("{}.{}", config.id, PIPELINE_CONFIG_PARAM),
                    reason: format!("only one of '{PIPELINE_CONFIG_PARAM}' and '{PIPELINE_CONFIG_FILE_PARAM}' may be given"),
                })
            }
            (None, None) => {
                return Err(ConfigurationError::MissingParameter(format!(
                    "{}.{}",
                    config.id, PIPELINE_CONFIG_PARAM
                )))
            }
        };
        let inner = Pipeline::from_config(&inner_config, context)?;

        debug!(
            stage = %config.id,
            repeat_count_product = ?repeat_count_product,
            repeat_count_member = ?repeat_count_member,
            inner_stages = inner.len(),
            "repeating sequence configured"
        );

        Ok(Self {
            id: config.id.clone(),
            processor,
            repeat_count_product,
            repeat_count_member,
            inner,
        })
    }

    /// 内部流水线
    pub fn inner(&self) -> &Pipeline {
        &self.inner
    }

    /// 解析重复次数；未配置时为0
    fn resolve_repeat_count(&self, store: &DataProductStore) -> Result<i64, UnpackError> {
        let (Some(product_name), Some(member)) =
            (&self.repeat_count_product, &self.repeat_count_member)
        else {
            warn!(stage = %self.id, "no repeat count configured, defaulting to 0");
            return Ok(0);
        };

        let product = store
            .checkout_read(product_name)
            .ok_or_else(|| StoreAccessError::NotFound(product_name.clone()))?;
        let record = product
            .value
            .as_record()
            .ok_or_else(|| StoreAccessError::KindMismatch {
                name: product_name.clone(),
                expected: "record",
                actual: product.value.kind_name(),
            })?;

        let count = match record.read_scalar(member) {
            Ok(value) => value.to_count(),
            Err(MemberReadError::NotFound(_)) => {
                return Err(StoreAccessError::MemberNotFound {
                    product: product_name.clone(),
                    member: member.clone(),
                }
                .into())
            }
            Err(MemberReadError::NotScalar { type_name, .. }) => {
                return Err(ConfigurationError::UnsupportedRepeatCountType {
                    product: product_name.clone(),
                    member: member.clone(),
                    type_name,
                }
                .into())
            }
        };
        debug!(
            stage = %self.id,
            repeat_count = count,
            "resolved repeat count from {product_name}.{member}"
        );
        Ok(count)
    }

    fn run(&self, store: &DataProductStore) -> Result<(), UnpackError> {
        let Some(stream) = self.processor.acquire_input(store) else {
            return Ok(());
        };

        let inner_store = self.inner.store();
        let input_name = self.processor.input_byte_stream();
        let index_key = self.processor.last_index_key();

        inner_store.publish_or_replace(
            input_name,
            ProductValue::ByteStream(stream),
            TRANSFERRED_STREAM_TAGS,
        );
        let last_index = self.processor.last_read_index(store)?;
        inner_store.publish_or_replace(
            index_key,
            ProductValue::Index(last_index),
            cursor_tags(StageType::RepeatingSequence),
        );

        let repeat_count = self.resolve_repeat_count(store)?;
        if repeat_count <= 0 {
            warn!(stage = %self.id, repeat_count, "repeat count <= 0, skipping execution");
            return Ok(());
        }

        let mut collected = Vec::new();
        'iterations: for i in 0..repeat_count {
            let cursor_before = inner_store.index(index_key)?;
            let collected_before = collected.len();
            self.inner.execute();

            for name in inner_store.list_names() {
                if name == index_key || name == input_name {
                    continue;
                }
                let Some(mut product) = inner_store.extract(&name) else {
                    error!(stage = %self.id, product = %name, iteration = i, "failed to extract inner product");
                    break 'iterations;
                };
                product.name = format!("{name}_{i}");
                collected.push(product);
            }

            // 本轮既无产品也未推进游标，后续轮次同样无法推进
            if collected.len() == collected_before
                && inner_store.index(index_key)? == cursor_before
            {
                warn!(
                    stage = %self.id,
                    iteration = i,
                    repeat_count,
                    "inner pipeline made no progress, stopping early"
                );
                break;
            }
        }

        debug!(stage = %self.id, products = collected.len(), "publishing collected products");
        store.publish_many(collected);

        let inner_index = inner_store.index(index_key)?;
        self.processor.set_last_read_index(store, inner_index)?;
        Ok(())
    }
}

impl Stage for RepeatingSequenceStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn stage_type(&self) -> StageType {
        StageType::RepeatingSequence
    }

    fn process(&self, store: &DataProductStore) {
        if let Err(e) = self.run(store) {
            error!(stage = %self.id, "repeating sequence aborted: {e}");
        }
    }
}
