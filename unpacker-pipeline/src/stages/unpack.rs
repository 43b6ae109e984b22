//! 游标驱动的拆包阶段
//!
//! 每次调用：取输入字节流 -> 读游标 -> 新建记录并解析 -> 发布记录并推进游标。
//! 解析失败时丢弃记录，游标保持不变。

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use unpacker_core::{ConfigurationError, FieldError, FieldMapping, Record, SchemaProvider};
use unpacker_engine::{FieldMappingParser, ReflectionBasedParser};

use super::processor::ByteStreamProcessor;
use crate::config::{StageConfig, StageParameters, StageType};
use crate::data_product::{DataProductStore, ProductValue};
use crate::pipeline::{PipelineContext, Stage};

pub const ROOT_CLASS_NAME_PARAM: &str = "root_class_name";
pub const FIELD_MAPPINGS_PARAM: &str = "field_mappings";
pub const DATA_PRODUCT_NAME_PARAM: &str = "data_product_name";
pub const DEFAULT_ENDIANNESS_PARAM: &str = "default_endianness";
pub const TOTAL_SPAN_PARAM: &str = "total_span";

/// 记录解析策略
pub trait RecordUnpacker: Send + Sync {
    /// 从`start_offset`处解析一条记录
    fn unpack(&self, buffer: &[u8], start_offset: usize, target: &mut Record)
        -> Result<(), FieldError>;

    /// 一条记录消耗的字节数
    fn span(&self) -> usize;
}

/// 显式配置的字段映射
#[derive(Debug, Clone)]
pub struct ExplicitMapping {
    mapping: FieldMapping,
    span: usize,
    parser: FieldMappingParser,
}

impl ExplicitMapping {
    /// 未给出`total_span`时取非负偏移字段的最大结束位置
    pub fn new(mapping: FieldMapping, total_span: Option<usize>, parser: FieldMappingParser) -> Self {
        let span = total_span.unwrap_or_else(|| mapping.max_extent());
        Self {
            mapping,
            span,
            parser,
        }
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }
}

impl RecordUnpacker for ExplicitMapping {
    fn unpack(
        &self,
        buffer: &[u8],
        start_offset: usize,
        target: &mut Record,
    ) -> Result<(), FieldError> {
        self.parser
            .apply(buffer, start_offset, &self.mapping, target)
    }

    fn span(&self) -> usize {
        self.span
    }
}

impl RecordUnpacker for ReflectionBasedParser {
    fn unpack(
        &self,
        buffer: &[u8],
        start_offset: usize,
        target: &mut Record,
    ) -> Result<(), FieldError> {
        self.parse(buffer, start_offset, target)
    }

    fn span(&self) -> usize {
        self.total_span()
    }
}

/// 游标驱动的拆包阶段
pub struct UnpackStage {
    id: String,
    stage_type: StageType,
    processor: ByteStreamProcessor,
    class_name: String,
    product_name: String,
    tags: [&'static str; 2],
    schema: Arc<dyn SchemaProvider>,
    /// 为None时阶段不可用
    unpacker: Option<Box<dyn RecordUnpacker>>,
}

impl UnpackStage {
    /// 显式字段映射阶段
    pub fn explicit(
        config: &StageConfig,
        context: &PipelineContext,
    ) -> Result<Self, ConfigurationError> {
        let params = config.parameters();
        let class_name = required_class(&params, context)?;
        let mapping = FieldMapping::from_json_value(params.required_value(FIELD_MAPPINGS_PARAM)?)?;
        let total_span = params.optional_usize(TOTAL_SPAN_PARAM)?;
        if let Some(span) = total_span {
            if i64::try_from(span).is_err() {
                return Err(ConfigurationError::InvalidParameter {
                    name: format!("{}.{}", config.id, TOTAL_SPAN_PARAM),
                    reason: format!("span {span} exceeds the cursor range"),
                });
            }
        }
        let unpacker = ExplicitMapping::new(
            mapping,
            total_span,
            FieldMappingParser::new(Arc::clone(&context.types)),
        );

        info!(
            stage = %config.id,
            class = %class_name,
            fields = unpacker.mapping().len(),
            span = unpacker.span(),
            "initialized with explicit field mappings"
        );

        Self::build(
            config,
            context,
            StageType::ExplicitUnpacker,
            class_name,
            params.str_or(DATA_PRODUCT_NAME_PARAM, "data_product")?,
            ["explicit_field_mapped_data_product", "built_by_explicit_unpacker"],
            Some(Box::new(unpacker)),
        )
    }

    /// 按类结构拆包阶段；映射构建失败时构造失败
    pub fn reflected(
        config: &StageConfig,
        context: &PipelineContext,
    ) -> Result<Self, ConfigurationError> {
        let params = config.parameters();
        let class_name = required_class(&params, context)?;
        let endianness = params.endianness(DEFAULT_ENDIANNESS_PARAM)?;
        let parser = ReflectionBasedParser::new(
            class_name.as_str(),
            endianness,
            context.schema.as_ref(),
            Arc::clone(&context.types),
        )?;

        Self::build(
            config,
            context,
            StageType::ReflectedUnpacker,
            class_name,
            params.str_or(DATA_PRODUCT_NAME_PARAM, "reflected_data_product")?,
            ["reflected_data_product", "built_by_reflected_unpacker"],
            Some(Box::new(parser)),
        )
    }

    /// 简单拆包阶段；映射构建失败时阶段不可用，但不中止流水线构建
    pub fn simple(
        config: &StageConfig,
        context: &PipelineContext,
    ) -> Result<Self, ConfigurationError> {
        let params = config.parameters();
        let class_name = required_class(&params, context)?;
        let endianness = params.endianness(DEFAULT_ENDIANNESS_PARAM)?;
        let unpacker: Option<Box<dyn RecordUnpacker>> = match ReflectionBasedParser::new(
            class_name.as_str(),
            endianness,
            context.schema.as_ref(),
            Arc::clone(&context.types),
        ) {
            Ok(parser) => Some(Box::new(parser)),
            Err(e) => {
                error!(stage = %config.id, "failed to initialize reflection based parser: {e}");
                None
            }
        };

        Self::build(
            config,
            context,
            StageType::SimpleUnpacker,
            class_name,
            params.str_or(DATA_PRODUCT_NAME_PARAM, "simple_data_product")?,
            ["simple_data_product", "built_by_simple_unpacker"],
            unpacker,
        )
    }

    fn build(
        config: &StageConfig,
        context: &PipelineContext,
        stage_type: StageType,
        class_name: String,
        product_name: String,
        tags: [&'static str; 2],
        unpacker: Option<Box<dyn RecordUnpacker>>,
    ) -> Result<Self, ConfigurationError> {
        let processor =
            ByteStreamProcessor::from_parameters(&config.id, stage_type, &config.parameters())?;
        Ok(Self {
            id: config.id.clone(),
            stage_type,
            processor,
            class_name,
            product_name,
            tags,
            schema: Arc::clone(&context.schema),
            unpacker,
        })
    }

    /// 输出产品名称
    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// 阶段是否可用
    pub fn is_ready(&self) -> bool {
        self.unpacker.is_some()
    }

    pub fn processor(&self) -> &ByteStreamProcessor {
        &self.processor
    }
}

impl Stage for UnpackStage {
    fn id(&self) -> &str {
        &self.id
    }

    fn stage_type(&self) -> StageType {
        self.stage_type
    }

    fn process(&self, store: &DataProductStore) {
        let Some(unpacker) = &self.unpacker else {
            error!(stage = %self.id, "parser not initialized, aborting process");
            return;
        };

        let Some(stream) = self.processor.acquire_input(store) else {
            return;
        };

        let last_index = match self.processor.last_read_index(store) {
            Ok(index) => index,
            Err(e) => {
                error!(stage = %self.id, "failed to read last index: {e}");
                return;
            }
        };
        let start_offset = usize::try_from(last_index).unwrap_or(0);
        if start_offset >= stream.len() {
            warn!(
                stage = %self.id,
                start_offset,
                stream_len = stream.len(),
                "byte stream exhausted, nothing to unpack"
            );
            return;
        }

        let Some(mut record) = self.schema.instantiate(&self.class_name) else {
            error!(stage = %self.id, class = %self.class_name, "failed to instantiate record");
            return;
        };

        if let Err(e) = unpacker.unpack(stream.as_slice(), start_offset, &mut record) {
            error!(
                stage = %self.id,
                class = %self.class_name,
                start_offset,
                "failed to parse buffer into record: {e}"
            );
            return;
        }

        let Some(next_index) = i64::try_from(unpacker.span())
            .ok()
            .and_then(|span| last_index.max(0).checked_add(span))
        else {
            error!(
                stage = %self.id,
                last_index,
                span = unpacker.span(),
                "cursor overflow, keeping last index"
            );
            return;
        };

        store.publish_or_replace(
            self.product_name.as_str(),
            ProductValue::Record(record),
            self.tags,
        );

        if let Err(e) = self.processor.set_last_read_index(store, next_index) {
            error!(stage = %self.id, "failed to update last index: {e}");
            return;
        }

        debug!(
            stage = %self.id,
            product = %self.product_name,
            last_index = next_index,
            "produced data product"
        );
    }
}

fn required_class(
    params: &StageParameters<'_>,
    context: &PipelineContext,
) -> Result<String, ConfigurationError> {
    let class_name = params.required_str(ROOT_CLASS_NAME_PARAM)?;
    if !context.schema.class_exists(&class_name) {
        return Err(ConfigurationError::UnknownClass(class_name));
    }
    Ok(class_name)
}
