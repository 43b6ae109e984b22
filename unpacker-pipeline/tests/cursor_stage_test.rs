//! 游标驱动拆包阶段集成测试

use std::sync::Arc;

use serde_json::json;
use unpacker_core::{ByteStream, ClassSchema, ConfigurationError, SchemaRegistry};
use unpacker_engine::TypeRegistry;
use unpacker_pipeline::{
    build_stage, DataProductStore, Pipeline, PipelineConfig, PipelineContext, ProductValue,
    StageConfig, StageType, DEFAULT_INPUT_BYTE_STREAM, DEFAULT_LAST_INDEX_KEY,
};

/// 创建测试用的类结构和类型注册表
fn create_context() -> PipelineContext {
    let types = Arc::new(TypeRegistry::new());
    let header = ClassSchema::builder("Header")
        .field("a", "uint32_t")
        .field("b", "uint16_t")
        .build(types.as_ref())
        .unwrap();
    let packet = ClassSchema::builder("Packet")
        .field("id", "uint16_t")
        .field("value", "uint16_t")
        .build(types.as_ref())
        .unwrap();
    let containers = ClassSchema::builder("OnlyContainers")
        .with_object_header()
        .opaque_field("items", "std::vector<int>", 24)
        .build(types.as_ref())
        .unwrap();
    let schema = SchemaRegistry::new()
        .with_class(header)
        .with_class(packet)
        .with_class(containers);
    PipelineContext::new(Arc::new(schema), types)
}

fn header_pipeline(context: &PipelineContext, extra: serde_json::Value) -> Pipeline {
    let mut parameters = json!({
        "root_class_name": "Header",
        "data_product_name": "header",
        "field_mappings": {
            "a": {"offset": 0, "size": 4, "endianness": "little"},
            "b": {"offset": 4, "size": 2, "endianness": "big"}
        }
    });
    if let (Some(base), Some(extra)) = (parameters.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    let config = PipelineConfig::new(vec![StageConfig::new(
        "header",
        StageType::ExplicitUnpacker,
        parameters,
    )]);
    Pipeline::from_config(&config, context).unwrap()
}

fn publish_stream(store: &DataProductStore, bytes: Vec<u8>) {
    store.publish_or_replace(
        DEFAULT_INPUT_BYTE_STREAM,
        ProductValue::ByteStream(ByteStream::from(bytes)),
        ["raw"],
    );
}

fn cursor(store: &DataProductStore) -> Option<i64> {
    store.index(DEFAULT_LAST_INDEX_KEY).ok()
}

fn member<T: unpacker_core::NativeScalar>(store: &DataProductStore, product: &str, name: &str) -> Option<T> {
    let checkout = store.checkout_read(product)?;
    checkout.value.as_record()?.get::<T>(name)
}

#[test]
fn test_consecutive_parses_advance_cursor() {
    let context = create_context();
    let pipeline = header_pipeline(&context, json!({}));
    let store = pipeline.store();
    publish_stream(
        store,
        vec![
            1, 0, 0, 0, 0, 2, //
            2, 0, 0, 0, 0, 3, //
            3, 0, 0, 0, 0, 4,
        ],
    );

    for n in 1..=3u32 {
        pipeline.execute();
        assert_eq!(cursor(store), Some(6 * n as i64));
        assert_eq!(member::<u32>(store, "header", "a"), Some(n));
        assert_eq!(member::<u16>(store, "header", "b"), Some(n as u16 + 1));
    }

    // 字节流耗尽后不再解析
    pipeline.execute();
    assert_eq!(cursor(store), Some(18));
    assert_eq!(member::<u32>(store, "header", "a"), Some(3));
}

#[test]
fn test_failed_parse_leaves_cursor() {
    let context = create_context();
    let pipeline = header_pipeline(&context, json!({}));
    let store = pipeline.store();
    publish_stream(store, vec![7, 0, 0, 0, 0, 1, 9, 9]);

    pipeline.execute();
    assert_eq!(cursor(store), Some(6));

    pipeline.execute();
    assert_eq!(cursor(store), Some(6));
    // 上一次的产品保持不变
    assert_eq!(member::<u32>(store, "header", "a"), Some(7));
}

#[test]
fn test_record_tags() {
    let context = create_context();
    let pipeline = header_pipeline(&context, json!({}));
    let store = pipeline.store();
    publish_stream(store, vec![1, 0, 0, 0, 0, 2]);
    pipeline.execute();

    let product = store.checkout_read("header").unwrap();
    assert!(product.has_tag("explicit_field_mapped_data_product"));
    assert!(product.has_tag("built_by_explicit_unpacker"));
    drop(product);

    let index = store.checkout_read(DEFAULT_LAST_INDEX_KEY).unwrap();
    assert!(index.has_tag("internal"));
    assert!(index.has_tag("byte_stream_index"));
    assert!(index.has_tag("built_by_explicit_unpacker"));
}

#[test]
fn test_missing_or_empty_input_is_quiet() {
    let context = create_context();
    let pipeline = header_pipeline(&context, json!({}));
    let store = pipeline.store();

    pipeline.execute();
    assert_eq!(store.list_names(), Vec::<String>::new());

    publish_stream(store, Vec::new());
    pipeline.execute();
    assert_eq!(store.list_names(), vec![DEFAULT_INPUT_BYTE_STREAM.to_string()]);
}

#[test]
fn test_negative_cursor_clamped() {
    let context = create_context();
    let pipeline = header_pipeline(&context, json!({}));
    let store = pipeline.store();
    publish_stream(store, vec![5, 0, 0, 0, 0, 6]);
    store.publish_or_replace(DEFAULT_LAST_INDEX_KEY, ProductValue::Index(-4), ["internal"]);

    pipeline.execute();
    assert_eq!(member::<u32>(store, "header", "a"), Some(5));
    assert_eq!(cursor(store), Some(6));
}

#[test]
fn test_explicit_total_span_and_custom_names() {
    let context = create_context();
    let pipeline = header_pipeline(
        &context,
        json!({
            "total_span": 8,
            "input_byte_stream_product_name": "raw",
            "last_index_key": "raw_cursor"
        }),
    );
    let store = pipeline.store();
    store.publish_or_replace(
        "raw",
        ProductValue::ByteStream(ByteStream::from(vec![1, 0, 0, 0, 0, 2, 0xAA, 0xAA, 4, 0, 0, 0, 0, 5])),
        Vec::<String>::new(),
    );

    pipeline.execute();
    assert_eq!(store.index("raw_cursor"), Ok(8));
    pipeline.execute();
    assert_eq!(store.index("raw_cursor"), Ok(16));
    assert_eq!(member::<u32>(store, "header", "a"), Some(4));
    assert!(!store.has(DEFAULT_LAST_INDEX_KEY));
}

#[test]
fn test_oversized_total_span_rejected() {
    let context = create_context();
    let build = |span: u64| {
        build_stage(
            &StageConfig::new(
                "header",
                StageType::ExplicitUnpacker,
                json!({
                    "root_class_name": "Header",
                    "total_span": span,
                    "field_mappings": {
                        "a": {"offset": 0, "size": 4, "endianness": "little"}
                    }
                }),
            ),
            &context,
        )
        .err()
    };

    assert!(matches!(
        build(u64::MAX),
        Some(ConfigurationError::InvalidParameter { .. })
    ));
    assert!(matches!(
        build(i64::MAX as u64 + 1),
        Some(ConfigurationError::InvalidParameter { .. })
    ));
    assert_eq!(build(i64::MAX as u64), None);
}

#[test]
fn test_cursor_overflow_keeps_last_index() {
    let context = create_context();
    let pipeline = header_pipeline(&context, json!({"total_span": i64::MAX}));
    let store = pipeline.store();
    publish_stream(store, vec![1, 0, 0, 0, 0, 2, 3, 0, 0, 0, 0, 4]);
    store.publish_or_replace(DEFAULT_LAST_INDEX_KEY, ProductValue::Index(4), ["internal"]);

    pipeline.execute();
    // 游标无法推进时不发布记录，游标保持原值
    assert_eq!(cursor(store), Some(4));
    assert!(!store.has("header"));
}

#[test]
fn test_negative_offset_field_does_not_extend_span() {
    let context = create_context();
    let config = PipelineConfig::new(vec![StageConfig::new(
        "trailer",
        StageType::ExplicitUnpacker,
        json!({
            "root_class_name": "Header",
            "field_mappings": {
                "a": {"offset": 0, "size": 4, "endianness": "little"},
                "b": {"offset": -2, "size": 2, "endianness": "little"}
            }
        }),
    )]);
    let pipeline = Pipeline::from_config(&config, &context).unwrap();
    let store = pipeline.store();
    publish_stream(store, vec![1, 0, 0, 0, 2, 0, 0, 0, 0x34, 0x12]);

    pipeline.execute();
    assert_eq!(cursor(store), Some(4));
    assert_eq!(member::<u16>(store, "data_product", "b"), Some(0x1234));

    pipeline.execute();
    assert_eq!(cursor(store), Some(8));
    assert_eq!(member::<u32>(store, "data_product", "a"), Some(2));
}

#[test]
fn test_reflected_stage_uses_total_span() {
    let context = create_context();
    let config = PipelineConfig::from_json_value(&json!({
        "pipeline": [
            {"id": "packets", "type": "reflected_unpacker", "parameters": {
                "root_class_name": "Packet",
                "default_endianness": "big"
            }}
        ]
    }))
    .unwrap();
    let pipeline = Pipeline::from_config(&config, &context).unwrap();
    let store = pipeline.store();
    publish_stream(store, vec![0, 1, 0, 10, 0, 2, 0, 20]);

    pipeline.execute();
    assert_eq!(cursor(store), Some(4));
    assert_eq!(member::<u16>(store, "reflected_data_product", "value"), Some(10));

    pipeline.execute();
    assert_eq!(cursor(store), Some(8));
    assert_eq!(member::<u16>(store, "reflected_data_product", "id"), Some(2));

    let product = store.checkout_read("reflected_data_product").unwrap();
    assert!(product.has_tag("built_by_reflected_unpacker"));
}

#[test]
fn test_simple_stage_inert_when_mapping_fails() {
    let context = create_context();
    let parameters = json!({"root_class_name": "OnlyContainers"});

    let reflected = build_stage(
        &StageConfig::new("r", StageType::ReflectedUnpacker, parameters.clone()),
        &context,
    );
    assert_eq!(
        reflected.err(),
        Some(ConfigurationError::NoParsableFields("OnlyContainers".to_string()))
    );

    let config = PipelineConfig::new(vec![StageConfig::new(
        "s",
        StageType::SimpleUnpacker,
        parameters,
    )]);
    let pipeline = Pipeline::from_config(&config, &context).unwrap();
    let store = pipeline.store();
    publish_stream(store, vec![0; 64]);
    pipeline.execute();
    assert_eq!(cursor(store), None);
    assert!(!store.has("simple_data_product"));
}

#[test]
fn test_simple_stage_produces_records() {
    let context = create_context();
    let config = PipelineConfig::new(vec![StageConfig::new(
        "s",
        StageType::SimpleUnpacker,
        json!({"root_class_name": "Packet", "data_product_name": "pkt"}),
    )]);
    let pipeline = Pipeline::from_config(&config, &context).unwrap();
    let store = pipeline.store();
    publish_stream(store, vec![3, 0, 4, 0]);

    pipeline.execute();
    assert_eq!(member::<u16>(store, "pkt", "id"), Some(3));
    assert_eq!(member::<u16>(store, "pkt", "value"), Some(4));
    assert!(store.checkout_read("pkt").unwrap().has_tag("simple_data_product"));
}

#[test]
fn test_construction_errors() {
    let context = create_context();
    let build = |stage_type, parameters| {
        build_stage(&StageConfig::new("x", stage_type, parameters), &context).err()
    };

    assert_eq!(
        build(StageType::ExplicitUnpacker, json!({"field_mappings": {}})),
        Some(ConfigurationError::MissingParameter("x.root_class_name".to_string()))
    );
    assert_eq!(
        build(StageType::ExplicitUnpacker, json!({"root_class_name": "Header"})),
        Some(ConfigurationError::MissingParameter("x.field_mappings".to_string()))
    );
    assert_eq!(
        build(StageType::SimpleUnpacker, json!({"root_class_name": "Nope"})),
        Some(ConfigurationError::UnknownClass("Nope".to_string()))
    );
    assert!(matches!(
        build(
            StageType::ExplicitUnpacker,
            json!({"root_class_name": "Header", "field_mappings": {"a": {"offset": 0, "size": 4}}})
        ),
        Some(ConfigurationError::InvalidFieldMapping(_))
    ));
    assert!(matches!(
        build(
            StageType::ReflectedUnpacker,
            json!({"root_class_name": "Packet", "default_endianness": "middle"})
        ),
        Some(ConfigurationError::InvalidParameter { .. })
    ));
}
