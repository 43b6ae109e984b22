//! Unpacker Pipeline
//!
//! 拆包流水线：数据产品存储、流水线配置与构建，以及游标驱动的拆包阶段和重复序列阶段

pub mod config;
pub mod data_product;
pub mod pipeline;
pub mod stages;

pub use config::{PipelineConfig, StageConfig, StageParameters, StageType};
pub use data_product::{DataProduct, DataProductStore, ProductValue, ReadCheckout, WriteCheckout};
pub use pipeline::{build_stage, Pipeline, PipelineContext, Stage};
pub use stages::{
    ByteStreamProcessor, ExplicitMapping, RecordUnpacker, RepeatingSequenceStage, UnpackStage,
    DEFAULT_INPUT_BYTE_STREAM, DEFAULT_LAST_INDEX_KEY, INPUT_BYTE_STREAM_PARAM,
};
