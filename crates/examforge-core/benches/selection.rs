use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use examforge_core::profile::{PerformanceProfile, TopicStat};

fn profile_with_topics(topics: usize, attempts: u32) -> PerformanceProfile {
    let mut profile = PerformanceProfile::new("bench-user");
    for i in 0..topics {
        profile.absorb_topic(&TopicStat {
            subject: "Physics".into(),
            chapter: format!("Chapter {}", i % 12),
            topic: format!("Topic {i}"),
            attempts,
            correct: attempts / 4,
            last_attempted: None,
        });
    }
    profile
}

fn bench_weak_topics(c: &mut Criterion) {
    let mut group = c.benchmark_group("weak_topics");

    for &topics in &[10usize, 100, 1000] {
        let profile = profile_with_topics(topics, 8);
        group.bench_function(format!("{topics}_topics"), |b| {
            b.iter(|| profile.weak_topics(black_box("Physics")))
        });
    }

    group.finish();
}

fn bench_velocity(c: &mut Criterion) {
    let mut profile = profile_with_topics(10, 8);
    for i in 0..10 {
        profile.push_score(40.0 + f64::from(i));
    }

    c.bench_function("learning_velocity", |b| {
        b.iter(|| profile.learning_velocity(black_box(55.0)))
    });
}

fn bench_topic_rollup_merge(c: &mut Criterion) {
    let incoming: HashMap<String, TopicStat> = (0..30)
        .map(|i| {
            let stat = TopicStat {
                subject: "Physics".into(),
                chapter: format!("Chapter {}", i % 12),
                topic: format!("Topic {i}"),
                attempts: 1,
                correct: (i % 2) as u32,
                last_attempted: None,
            };
            (format!("Physics:Chapter {}:Topic {i}", i % 12), stat)
        })
        .collect();

    c.bench_function("absorb_30_topics", |b| {
        b.iter(|| {
            let mut profile = profile_with_topics(100, 8);
            for stat in incoming.values() {
                profile.absorb_topic(black_box(stat));
            }
            profile
        })
    });
}

criterion_group!(benches, bench_weak_topics, bench_velocity, bench_topic_rollup_merge);
criterion_main!(benches);
