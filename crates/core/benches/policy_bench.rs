//! 보증 정책 벤치마크
//!
//! 정책 파싱, 충족 평가, 보증 조직 선택 성능을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use consortium_core::EndorsementPolicy;
use std::hint::black_box;

fn org_ids(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("Org{i}MSP")).collect()
}

/// `OutOf(threshold, 'Org1MSP.member', ...)` 형태의 표현식
fn out_of_expr(orgs: &[String], threshold: usize) -> String {
    let principals: Vec<String> = orgs.iter().map(|o| format!("'{o}.member'")).collect();
    format!("OutOf({threshold}, {})", principals.join(", "))
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_parse");
    group.throughput(Throughput::Elements(1));

    group.bench_function("and_two_orgs", |b| {
        b.iter(|| EndorsementPolicy::parse(black_box("AND ('Org1MSP.member','Org2MSP.member')")))
    });

    group.bench_function("nested", |b| {
        let expr = "OR(AND('Org1MSP.member','Org2MSP.peer'), OutOf(2, 'Org3MSP.member', 'Org4MSP.member', 'Org5MSP.admin'))";
        b.iter(|| EndorsementPolicy::parse(black_box(expr)))
    });

    group.finish();
}

fn bench_selection_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_select_endorsers");

    for org_count in &[2usize, 8, 32] {
        let orgs = org_ids(*org_count);
        let policy = match EndorsementPolicy::parse(&out_of_expr(&orgs, org_count / 2 + 1)) {
            Ok(policy) => policy,
            Err(e) => panic!("benchmark policy must parse: {e}"),
        };
        group.throughput(Throughput::Elements(*org_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(org_count),
            &orgs,
            |b, orgs| b.iter(|| policy.select_endorsers(black_box(orgs))),
        );
    }

    group.finish();
}

fn bench_satisfaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_satisfaction");
    group.throughput(Throughput::Elements(1));

    let policy = match EndorsementPolicy::parse("AND ('Org1MSP.member','Org2MSP.member')") {
        Ok(policy) => policy,
        Err(e) => panic!("benchmark policy must parse: {e}"),
    };

    group.bench_function("satisfied", |b| {
        b.iter(|| policy.is_satisfied_by(black_box(&["Org1MSP", "Org2MSP"])))
    });
    group.bench_function("single_org", |b| {
        b.iter(|| policy.is_satisfied_by(black_box(&["Org2MSP"])))
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_selection_scaling, bench_satisfaction);
criterion_main!(benches);
