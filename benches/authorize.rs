use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use kvguard::authz::{classify, Authorizer, Permission, StaticRoleStore};
use kvguard::identity::Principal;
use kvguard::security::{self, KvRoleStore};
use kvguard::storage::SharedStore;

fn bench_permission_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("permission");
    for raw in ["*", "read", "customer:write", "customer:*"] {
        group.bench_with_input(BenchmarkId::new("parse", raw), &raw, |b, raw| {
            b.iter(|| criterion::black_box(Permission::parse(raw).ok()));
        });
    }
    group.bench_function("classify", |b| {
        b.iter(|| criterion::black_box(classify("batch-write-item", Some("Customer")).ok()));
    });
    group.finish();
}

fn bench_gate(c: &mut Criterion) {
    let static_gate = Authorizer::new(
        StaticRoleStore::new()
            .with_role("admin", ["*"])
            .with_role("writer", ["read,write,update,delete"])
            .with_role("clerk", ["customer:*", "orders:read", "invoices:read", "invoices:write"]),
    );
    let store = SharedStore::new();
    let _ = security::ensure_security_tables(&store, "bench");
    let kv_gate = Authorizer::new(KvRoleStore::new(store, Duration::from_millis(500)));

    let cases = [
        ("admin", "get-item", "customer"),
        ("writer", "put-item", "customer"),
        ("writer", "scan", "users"),
        ("clerk", "delete-item", "invoices"),
    ];
    let mut group = c.benchmark_group("authorize");
    group.throughput(Throughput::Elements(1));
    for (role, op, target) in cases {
        let p = Principal::new("bench", role);
        let id = format!("{}/{}/{}", role, op, target);
        group.bench_with_input(BenchmarkId::new("static", &id), &p, |b, p| {
            b.iter(|| criterion::black_box(static_gate.authorize(p, op, Some(target)).ok()));
        });
        group.bench_with_input(BenchmarkId::new("roles_table", &id), &p, |b, p| {
            b.iter(|| criterion::black_box(kv_gate.authorize(p, op, Some(target)).ok()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_permission_parse, bench_gate);
criterion_main!(benches);
