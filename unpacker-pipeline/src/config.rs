//! 流水线配置
//!
//! 配置文档格式：
//! ```json
//! { "pipeline": [ { "id": "header", "type": "explicit_unpacker", "parameters": { } } ] }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use unpacker_core::{ConfigurationError, Endianness};

/// 阶段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageType {
    /// 显式字段映射拆包
    ExplicitUnpacker,
    /// 按类结构拆包
    ReflectedUnpacker,
    /// 按类结构拆包，构造失败时不中止流水线
    SimpleUnpacker,
    /// 重复执行内部流水线
    RepeatingSequence,
}

impl StageType {
    pub const ALL: [StageType; 4] = [
        StageType::ExplicitUnpacker,
        StageType::ReflectedUnpacker,
        StageType::SimpleUnpacker,
        StageType::RepeatingSequence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageType::ExplicitUnpacker => "explicit_unpacker",
            StageType::ReflectedUnpacker => "reflected_unpacker",
            StageType::SimpleUnpacker => "simple_unpacker",
            StageType::RepeatingSequence => "repeating_sequence",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageType::ALL
            .into_iter()
            .find(|stage_type| stage_type.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownStageType(s.to_string()))
    }
}

/// 单个阶段的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub stage_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl StageConfig {
    pub fn new(id: impl Into<String>, stage_type: StageType, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            stage_type: stage_type.as_str().to_string(),
            parameters,
        }
    }

    /// 解析阶段类型
    pub fn kind(&self) -> Result<StageType, ConfigurationError> {
        self.stage_type.parse()
    }

    pub fn parameters(&self) -> StageParameters<'_> {
        StageParameters::new(&self.id, &self.parameters)
    }
}

/// 流水线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub pipeline: Vec<StageConfig>,
}

impl PipelineConfig {
    pub fn new(stages: Vec<StageConfig>) -> Self {
        Self { pipeline: stages }
    }

    /// 从JSON字符串加载并校验
    pub fn from_json_str(json_str: &str) -> Result<Self, ConfigurationError> {
        let config: PipelineConfig = serde_json::from_str(json_str)
            .map_err(|e| ConfigurationError::InvalidPipelineConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从JSON值加载并校验
    pub fn from_json_value(value: &Value) -> Result<Self, ConfigurationError> {
        let config = PipelineConfig::deserialize(value)
            .map_err(|e| ConfigurationError::InvalidPipelineConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let json_str = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json_str)
    }

    /// 校验：至少一个阶段，id非空且唯一，类型已知
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.pipeline.is_empty() {
            return Err(ConfigurationError::InvalidPipelineConfig(
                "pipeline has no stages".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        for stage in &self.pipeline {
            if stage.id.trim().is_empty() {
                return Err(ConfigurationError::InvalidPipelineConfig(
                    "stage id must not be empty".to_string(),
                ));
            }
            if !ids.insert(stage.id.as_str()) {
                return Err(ConfigurationError::InvalidPipelineConfig(format!(
                    "duplicate stage id '{}'",
                    stage.id
                )));
            }
            stage.kind()?;
        }
        Ok(())
    }
}

/// 阶段参数访问
#[derive(Debug, Clone, Copy)]
pub struct StageParameters<'a> {
    stage_id: &'a str,
    values: &'a Map<String, Value>,
}

impl<'a> StageParameters<'a> {
    pub fn new(stage_id: &'a str, values: &'a Map<String, Value>) -> Self {
        Self { stage_id, values }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.values.get(name)
    }

    fn invalid(&self, name: &str, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::InvalidParameter {
            name: format!("{}.{}", self.stage_id, name),
            reason: reason.into(),
        }
    }

    /// 可选字符串参数；空字符串视为未设置
    pub fn optional_str(&self, name: &str) -> Result<Option<&'a str>, ConfigurationError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(name, "expected a string")),
        }
    }

    /// 带默认值的字符串参数
    pub fn str_or(&self, name: &str, default: &str) -> Result<String, ConfigurationError> {
        Ok(self.optional_str(name)?.unwrap_or(default).to_string())
    }

    /// 必需的字符串参数
    pub fn required_str(&self, name: &str) -> Result<String, ConfigurationError> {
        self.optional_str(name)?
            .map(str::to_string)
            .ok_or_else(|| ConfigurationError::MissingParameter(format!("{}.{}", self.stage_id, name)))
    }

    /// 可选的非负整数参数
    pub fn optional_usize(&self, name: &str) -> Result<Option<usize>, ConfigurationError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .and_then(|v| usize::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| self.invalid(name, "expected a non-negative integer")),
        }
    }

    /// 字节序参数，缺省为小端
    pub fn endianness(&self, name: &str) -> Result<Endianness, ConfigurationError> {
        match self.optional_str(name)? {
            None => Ok(Endianness::default()),
            Some(s) => s.parse().map_err(|_| self.invalid(name, format!("unknown endianness '{s}'"))),
        }
    }

    /// 必需的参数值
    pub fn required_value(&self, name: &str) -> Result<&'a Value, ConfigurationError> {
        self.values
            .get(name)
            .ok_or_else(|| ConfigurationError::MissingParameter(format!("{}.{}", self.stage_id, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pipeline_config() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "pipeline": [
                    {"id": "header", "type": "explicit_unpacker", "parameters": {"root_class_name": "Header"}},
                    {"id": "body", "type": "reflected_unpacker"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.len(), 2);
        assert_eq!(config.pipeline[0].kind(), Ok(StageType::ExplicitUnpacker));
        assert!(config.pipeline[1].parameters.is_empty());
    }

    #[test]
    fn test_validation_failures() {
        let empty = PipelineConfig::from_json_value(&json!({"pipeline": []}));
        assert!(matches!(empty, Err(ConfigurationError::InvalidPipelineConfig(_))));

        let duplicate = PipelineConfig::from_json_value(&json!({"pipeline": [
            {"id": "a", "type": "simple_unpacker"},
            {"id": "a", "type": "simple_unpacker"}
        ]}));
        assert!(matches!(duplicate, Err(ConfigurationError::InvalidPipelineConfig(_))));

        let blank = PipelineConfig::from_json_value(&json!({"pipeline": [
            {"id": " ", "type": "simple_unpacker"}
        ]}));
        assert!(matches!(blank, Err(ConfigurationError::InvalidPipelineConfig(_))));

        let unknown = PipelineConfig::from_json_value(&json!({"pipeline": [
            {"id": "a", "type": "mystery"}
        ]}));
        assert_eq!(unknown, Err(ConfigurationError::UnknownStageType("mystery".to_string())));

        let malformed = PipelineConfig::from_json_str("{\"stages\": []}");
        assert!(matches!(malformed, Err(ConfigurationError::InvalidPipelineConfig(_))));
    }

    #[test]
    fn test_stage_parameters() {
        let values = json!({
            "name": "x",
            "blank": "",
            "span": 12,
            "negative": -1,
            "order": "big",
            "bad_order": "middle"
        });
        let Value::Object(map) = values else {
            unreachable!()
        };
        let params = StageParameters::new("stage", &map);

        assert_eq!(params.required_str("name").unwrap(), "x");
        assert_eq!(params.str_or("blank", "fallback").unwrap(), "fallback");
        assert_eq!(
            params.required_str("absent"),
            Err(ConfigurationError::MissingParameter("stage.absent".to_string()))
        );
        assert!(params.required_str("span").is_err());
        assert_eq!(params.optional_usize("span").unwrap(), Some(12));
        assert!(params.optional_usize("negative").is_err());
        assert_eq!(params.endianness("order").unwrap(), Endianness::Big);
        assert_eq!(params.endianness("absent").unwrap(), Endianness::Little);
        assert!(params.endianness("bad_order").is_err());
    }
}
