//! Validation benchmarks: compile a route's schemas once, validate many requests.
//!
//! Run with: cargo bench -p asyncgate-validator

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};

use asyncgate_validator::{Coercion, SchemaEngine};

fn params_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "streetlightId": { "type": "integer", "minimum": 1 },
            "zone": { "type": "string", "enum": ["north", "south", "east", "west"] }
        },
        "required": ["streetlightId", "zone"]
    })
}

fn body_schema() -> Value {
    json!({
        "type": "object",
        "required": ["lumens", "sentAt"],
        "properties": {
            "lumens": { "type": "integer", "minimum": 0 },
            "sentAt": { "type": "string", "format": "date-time" },
            "reporter": { "type": "string", "format": "email" },
            "readings": {
                "type": "array",
                "items": { "type": "number" },
                "maxItems": 64
            }
        }
    })
}

fn bench_compile(c: &mut Criterion) {
    let engine = SchemaEngine::new();
    let schema = body_schema();

    c.bench_function("compile_body_schema", |b| {
        b.iter(|| engine.compile(black_box(&schema), Coercion::None))
    });
}

fn bench_validate_params(c: &mut Criterion) {
    let engine = SchemaEngine::new();
    let Ok(validator) = engine.compile(&params_schema(), Coercion::Scalars) else {
        return;
    };
    let valid = json!({ "streetlightId": "42", "zone": "north" });
    let invalid = json!({ "streetlightId": "forty-two", "zone": "up" });

    let mut group = c.benchmark_group("validate_params");
    group.bench_function("valid", |b| b.iter(|| validator.validate(black_box(&valid))));
    group.bench_function("invalid", |b| {
        b.iter(|| validator.validate(black_box(&invalid)))
    });
    group.finish();
}

fn bench_validate_body(c: &mut Criterion) {
    let engine = SchemaEngine::new();
    let Ok(validator) = engine.compile(&body_schema(), Coercion::None) else {
        return;
    };

    let mut group = c.benchmark_group("validate_body");
    for readings in [0usize, 8, 64] {
        let body = json!({
            "lumens": 310,
            "sentAt": "2024-01-15T10:30:00Z",
            "reporter": "ops@example.com",
            "readings": (0..readings).map(|i| i as f64 * 0.5).collect::<Vec<_>>()
        });
        group.bench_with_input(BenchmarkId::new("readings", readings), &body, |b, body| {
            b.iter(|| validator.validate(black_box(body)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_compile,
    bench_validate_params,
    bench_validate_body
);
criterion_main!(benches);
