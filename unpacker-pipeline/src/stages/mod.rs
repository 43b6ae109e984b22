//! 处理阶段
//!
//! - 游标驱动的拆包阶段：显式映射、按类结构、简单拆包
//! - 重复序列阶段

pub mod processor;
pub mod repeating_sequence;
pub mod unpack;

pub use processor::{
    ByteStreamProcessor, DEFAULT_INPUT_BYTE_STREAM, DEFAULT_LAST_INDEX_KEY, INPUT_BYTE_STREAM_PARAM,
};
pub use repeating_sequence::RepeatingSequenceStage;
pub use unpack::{ExplicitMapping, RecordUnpacker, UnpackStage};
