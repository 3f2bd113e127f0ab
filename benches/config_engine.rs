//! Benchmarks for building dialogs and updating enable states
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use endaq_config::engine::{build_ui, ElementRegistry};
use endaq_config::{ConfigValue, ExpressionEngine, SchemaDocument};
use serde_json::{json, Value};

/// A schema with `tabs` tabs, each with a trigger switch and fields that
/// depend on it
fn generated_schema(tabs: u32) -> String {
    let tabs: Vec<Value> = (0..tabs)
        .map(|t| {
            let switch = 0x10_0000 + t * 0x100;
            let fields: Vec<Value> = (1..=8)
                .map(|f| {
                    json!({
                        "element": "FloatField",
                        "label": format!("Threshold {}", f),
                        "config_id": switch + f,
                        "default": 1.0,
                        "enable_if": format!("Config[{}] == true", switch),
                        "display_format": "x * 2.0",
                        "value_format": "x / 2.0"
                    })
                })
                .collect();
            json!({
                "element": "Tab",
                "label": format!("Channel {}", t),
                "children": [
                    { "element": "BooleanField", "label": "Trigger", "config_id": switch, "default": true },
                    { "element": "Group", "label": "Limits", "children": fields }
                ]
            })
        })
        .collect();
    json!({ "element": "ConfigUI", "children": tabs }).to_string()
}

fn bench_build(c: &mut Criterion) {
    let registry = ElementRegistry::with_defaults();
    let mut group = c.benchmark_group("build_ui");

    for tabs in [4u32, 32, 128] {
        let doc = SchemaDocument::parse(&generated_schema(tabs)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(tabs), &doc, |b, doc| {
            b.iter(|| {
                let engine = ExpressionEngine::new();
                black_box(build_ui(doc, &registry, &engine).unwrap())
            })
        });
    }
    group.finish();
}

fn bench_update_disabled(c: &mut Criterion) {
    let registry = ElementRegistry::with_defaults();
    let engine = ExpressionEngine::new();
    let doc = SchemaDocument::parse(&generated_schema(64)).unwrap();
    let mut built = build_ui(&doc, &registry, &engine).unwrap();
    let switch = built.tree.node(0x10_0000).unwrap();

    c.bench_function("toggle_and_update_disabled", |b| {
        let mut on = false;
        b.iter(|| {
            on = !on;
            built.tree.set_raw(switch, &ConfigValue::Bool(on)).unwrap();
            built.tree.update_disabled_items(&engine);
            black_box(built.tree.snapshot())
        })
    });
}

criterion_group!(benches, bench_build, bench_update_disabled);
criterion_main!(benches);
