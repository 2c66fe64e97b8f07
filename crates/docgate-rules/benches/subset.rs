use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docgate_rules::{Rule, Set, Verb, VerbSet, FILES_DOCTYPE};

fn parent_set() -> Set {
    (0..32)
        .map(|i| {
            Rule::new(format!("rule{i}"), format!("io.cozy.doctype{i}"), VerbSet::all())
                .with_values((0..16).map(|v| format!("doc-{i}-{v}")))
        })
        .collect()
}

fn bench_subset(c: &mut Criterion) {
    let parent = parent_set();
    let child: Set = (0..32)
        .map(|i| {
            Rule::new(format!("rule{i}"), format!("io.cozy.doctype{i}"), VerbSet::from_verbs([Verb::Get]))
                .with_values([format!("doc-{i}-7")])
        })
        .collect();
    let files: Set = vec![Rule::new("share", FILES_DOCTYPE, VerbSet::from_verbs([Verb::Get]))
        .with_values(["doc-31-15"])]
    .into();

    c.bench_function("set_subset_32_rules", |b| {
        b.iter(|| black_box(&child).is_subset_of(black_box(&parent)))
    });
    c.bench_function("set_subset_file_rule", |b| {
        b.iter(|| black_box(&files).is_subset_of(black_box(&parent)))
    });
    c.bench_function("set_merge_self", |b| b.iter(|| black_box(&parent).merged(black_box(&parent))));
}

criterion_group!(benches, bench_subset);
criterion_main!(benches);
