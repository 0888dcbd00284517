use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seedloop::filters::RegexEvidenceFilter;
use seedloop::{Dataset, Document, Entity, Evaluator, Strictness};

const SENTENCE: &str = "The V600E mutation leads to a substitution of valine by glutamic acid. ";

/// Synthetic corpus where every other prediction is shifted by one character.
fn build_dataset(documents: usize, sentences: usize) -> Dataset {
    (0..documents)
        .map(|d| {
            let text = SENTENCE.repeat(sentences);
            let mut document = Document::new().with_part("abstract", text);
            let part = document.part_mut("abstract").unwrap();
            for s in 0..sentences {
                let base = s * SENTENCE.chars().count();
                part.push_annotation(Entity::new("e_2", base + 4, "V600E"))
                    .unwrap();
                part.push_annotation(Entity::new("e_2", base + 46, "valine by glutamic acid"))
                    .unwrap();
                let shift = s % 2;
                part.push_prediction(Entity::predicted("e_2", base + 4 + shift, "V600E", 0.9))
                    .unwrap();
                part.push_prediction(Entity::predicted("e_2", base + 30, "substitution", 0.4))
                    .unwrap();
            }
            (d.to_string(), document)
        })
        .collect()
}

fn benchmark_evaluator(c: &mut Criterion) {
    let dataset = build_dataset(200, 20);
    for strictness in [Strictness::Exact, Strictness::Overlapping, Strictness::HalfOverlapping] {
        let evaluator = Evaluator::new(strictness);
        c.bench_function(&format!("evaluate_subclasses_{}", strictness), |b| {
            b.iter(|| evaluator.evaluate_subclasses(black_box(&dataset)))
        });
    }
}

fn benchmark_regex_scan(c: &mut Criterion) {
    let dataset = build_dataset(50, 20);
    let filter = RegexEvidenceFilter::with_default_patterns().unwrap();
    c.bench_function("regex_evidence_scan", |b| {
        b.iter(|| {
            dataset
                .iter()
                .map(|(_, d)| filter.scan(black_box(d)).positive_sentences)
                .sum::<usize>()
        })
    });
}

criterion_group!(
    name=evaluation_benches;
    config = Criterion::default().sample_size(50);
    targets =
    benchmark_evaluator,
    benchmark_regex_scan,
);
criterion_main!(evaluation_benches);
