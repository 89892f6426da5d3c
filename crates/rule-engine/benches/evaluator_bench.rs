//! 规则评估性能基准测试
//!
//! 覆盖规则编译、单次比较和示例规则的完整决策。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rule_engine::{
    ComparisonOp, ConditionEvaluator, EvaluationContext, RuleCompiler, Value, decide,
    decide_with_trace, parse,
};
use serde_json::json;
use std::hint::black_box;

const CHANNEL_ACCEPT_RULE: &str = include_str!("../../../rules/ChannelAccept.rule");

fn create_context(funding_amt: u64, with_socials: bool) -> EvaluationContext {
    let socials = if with_socials {
        json!({ "Info": { "Email": "ops@example.com" } })
    } else {
        json!(null)
    };

    EvaluationContext::new(json!({
        "ChannelAccept": {
            "Event": { "FundingAmt": funding_amt, "ChannelFlags": 0 },
            "OneMl": { "Noderank": { "Availability": 150, "Age": 5000 } },
            "Amboss": {
                "Socials": socials,
                "Amboss": { "IsPrime": true }
            }
        }
    }))
}

/// 比较操作基准
fn bench_comparisons(c: &mut Criterion) {
    let mut group = c.benchmark_group("comparisons");

    for op in [ComparisonOp::Eq, ComparisonOp::Ge, ComparisonOp::Lt] {
        group.bench_with_input(BenchmarkId::new("int", op.symbol()), &op, |b, op| {
            b.iter(|| {
                ConditionEvaluator::compare(
                    black_box(*op),
                    black_box(Value::Int(800_000)),
                    black_box(Value::Int(750_000)),
                )
            })
        });
    }

    group.bench_function("mixed_numeric", |b| {
        b.iter(|| {
            ConditionEvaluator::compare(
                black_box(ComparisonOp::Gt),
                black_box(Value::Float(150.5)),
                black_box(Value::Int(100)),
            )
        })
    });

    group.bench_function("absent_vs_int", |b| {
        b.iter(|| {
            ConditionEvaluator::compare(
                black_box(ComparisonOp::Lt),
                black_box(Value::Absent),
                black_box(Value::Int(1000)),
            )
        })
    });

    group.bench_function("bit_and", |b| {
        b.iter(|| ConditionEvaluator::bit_and(black_box(Value::Int(5)), black_box(Value::Int(1))))
    });

    group.finish();
}

/// 规则解析基准
fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_channel_accept_rule", |b| {
        b.iter(|| parse(black_box(CHANNEL_ACCEPT_RULE)))
    });
}

/// 完整决策基准
fn bench_decide(c: &mut Criterion) {
    let rule = RuleCompiler::new()
        .compile("ChannelAccept", CHANNEL_ACCEPT_RULE)
        .expect("sample rule compiles");

    let mut group = c.benchmark_group("decide");

    let cases = [
        ("accept", create_context(800_000, true)),
        ("reject_first_clause", create_context(500_000, true)),
        ("reject_no_socials", create_context(900_000, false)),
    ];

    for (name, ctx) in &cases {
        group.bench_with_input(BenchmarkId::new("sample_rule", name), ctx, |b, ctx| {
            b.iter(|| decide(black_box(&rule), black_box(ctx)))
        });
    }

    let ctx = create_context(800_000, true);
    group.bench_function("sample_rule_traced", |b| {
        b.iter(|| decide_with_trace(black_box(&rule), black_box(&ctx)))
    });

    group.finish();
}

criterion_group!(benches, bench_comparisons, bench_parse, bench_decide);
criterion_main!(benches);
