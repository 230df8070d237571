use criterion::{Criterion, criterion_group, criterion_main};
use lora_gateway::registry::{DEDUP_WINDOW, SeqWindow};

// Every accepted frame pays one membership scan plus one push
fn bench_window(c: &mut Criterion) {
    let mut full = SeqWindow::default();
    for seq in 0..DEDUP_WINDOW as u16 {
        full.push(seq);
    }

    c.bench_function("dedup_contains_hit_newest", |b| {
        b.iter(|| full.contains(std::hint::black_box(DEDUP_WINDOW as u16 - 1)))
    });

    c.bench_function("dedup_contains_miss", |b| {
        b.iter(|| full.contains(std::hint::black_box(9999)))
    });

    c.bench_function("dedup_push_wrapping", |b| {
        let mut w = full.clone();
        let mut seq = 0u16;
        b.iter(|| {
            seq = seq.wrapping_add(1);
            w.push(std::hint::black_box(seq));
        })
    });
}

criterion_group!(benches, bench_window);
criterion_main!(benches);
