use asset_relinker::services::{FileIndex, IndexOptions};
use camino::Utf8PathBuf;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::fs;
use std::hint::black_box;
use tempfile::TempDir;

/// `dirs` directories of `files_per_dir` files each, two levels deep.
fn build_tree(dirs: usize, files_per_dir: usize) -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();

    for dir in 0..dirs {
        let sub = root.join(format!("set_{:02}/dir_{:03}", dir % 8, dir));
        fs::create_dir_all(&sub).unwrap();
        for file in 0..files_per_dir {
            fs::write(sub.join(format!("asset_{}_{}.png", dir, file)), b"").unwrap();
        }
    }

    (temp_dir, root)
}

fn bench_build(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let (_temp_dir, root) = build_tree(64, 32);

    let mut group = c.benchmark_group("file_index_build");
    for workers in [1, 4, 8] {
        let options = IndexOptions {
            workers,
            ..IndexOptions::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(workers), &options, |b, options| {
            b.iter(|| {
                runtime
                    .block_on(FileIndex::build(black_box(&root), options))
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut index = FileIndex::new();
    for i in 0..10_000 {
        index.insert(&format!("Asset_{}.PNG", i), Utf8PathBuf::from(format!("/library/Asset_{}.PNG", i)));
    }

    c.bench_function("file_index_lookup_exact", |b| {
        b.iter(|| index.lookup(black_box("Asset_5000.PNG")))
    });
    c.bench_function("file_index_lookup_folded", |b| {
        b.iter(|| index.lookup(black_box("asset_5000.png")))
    });
}

criterion_group!(benches, bench_build, bench_lookup);
criterion_main!(benches);
