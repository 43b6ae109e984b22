//! 流水线
//!
//! 按配置顺序构建阶段，每个执行周期依次调用各阶段。
//! 每条流水线持有独立的数据产品存储。

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};
use unpacker_core::{ConfigurationError, SchemaProvider};
use unpacker_engine::TypeRegistry;

use crate::config::{PipelineConfig, StageConfig, StageType};
use crate::data_product::DataProductStore;
use crate::stages::{RepeatingSequenceStage, UnpackStage};

/// 处理阶段
///
/// `process`不返回错误：可恢复的失败记录日志后提前结束本次调用，持久状态保持不变。
pub trait Stage: Send + Sync {
    /// 阶段id
    fn id(&self) -> &str;

    /// 阶段类型
    fn stage_type(&self) -> StageType;

    /// 执行一次
    fn process(&self, store: &DataProductStore);
}

/// 构建阶段所需的共享能力
#[derive(Clone)]
pub struct PipelineContext {
    /// 类结构查询
    pub schema: Arc<dyn SchemaProvider>,
    /// 类型处理器注册表
    pub types: Arc<TypeRegistry>,
}

impl PipelineContext {
    pub fn new(schema: Arc<dyn SchemaProvider>, types: Arc<TypeRegistry>) -> Self {
        Self { schema, types }
    }

    /// 使用进程级共享类型注册表
    pub fn with_shared_types(schema: Arc<dyn SchemaProvider>) -> Self {
        Self::new(schema, TypeRegistry::shared())
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

/// 按配置构建阶段
pub fn build_stage(
    config: &StageConfig,
    context: &PipelineContext,
) -> Result<Box<dyn Stage>, ConfigurationError> {
    let stage: Box<dyn Stage> = match config.kind()? {
        StageType::ExplicitUnpacker => Box::new(UnpackStage::explicit(config, context)?),
        StageType::ReflectedUnpacker => Box::new(UnpackStage::reflected(config, context)?),
        StageType::SimpleUnpacker => Box::new(UnpackStage::simple(config, context)?),
        StageType::RepeatingSequence => Box::new(RepeatingSequenceStage::new(config, context)?),
    };
    debug!(stage = %config.id, stage_type = %config.stage_type, "built stage");
    Ok(stage)
}

/// 流水线
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    store: DataProductStore,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_ids())
            .field("store", &self.store)
            .finish()
    }
}

impl Pipeline {
    /// 创建空流水线
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            store: DataProductStore::new(),
        }
    }

    /// 按配置构建
    ///
    /// # 返回
    /// - `Err(ConfigurationError)`: 配置无效或任一阶段构建失败
    pub fn from_config(
        config: &PipelineConfig,
        context: &PipelineContext,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let mut pipeline = Self::new();
        for stage_config in &config.pipeline {
            pipeline.add_stage(build_stage(stage_config, context)?);
        }
        info!(stages = pipeline.stages.len(), "pipeline built");
        Ok(pipeline)
    }

    /// 追加阶段
    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    /// 执行一个周期：依次调用各阶段
    pub fn execute(&self) {
        for stage in &self.stages {
            debug!(stage = stage.id(), stage_type = %stage.stage_type(), "process");
            stage.process(&self.store);
        }
    }

    /// 数据产品存储
    pub fn store(&self) -> &DataProductStore {
        &self.store
    }

    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
