//! Frame Delivery Benchmarks
//!
//! Compares consuming a streaming render as whole frames against consuming
//! it as append-only deltas, and measures array merging.
//!
//! Run with:
//! ```bash
//! cargo bench -p cascade-core -- stream
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use futures_util::StreamExt;
use tokio::runtime::Runtime;

use cascade_core::{
    deltas, render, Component, FrameDelta, Node, RenderContext, RenderOptions, Renderable,
};

/// A component that streams `count` tokens in append-only mode.
fn tokens(count: usize) -> Node {
    let component = Component::new("Tokens", move |_: &(), _ctx: &RenderContext| {
        Ok(Renderable::stream(move |tx| async move {
            tx.append_only().await?;
            for i in 0..count {
                tx.emit(format!("token{i} ")).await?;
            }
            Ok(())
        }))
    });
    component.element(()).into()
}

fn bench_stream(c: &mut Criterion) {
    let runtime = Runtime::new().expect("failed to build tokio runtime");
    let mut group = c.benchmark_group("stream");

    for count in [16usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::new("full_frames", count), &count, |b, &count| {
            b.to_async(&runtime).iter(|| async move {
                let mut render = render(tokens(count), RenderOptions::new());
                let mut bytes = 0;
                while let Some(frame) = render.next().await {
                    bytes += frame.expect("render failed").text().len();
                }
                bytes
            });
        });

        group.bench_with_input(BenchmarkId::new("deltas", count), &count, |b, &count| {
            b.to_async(&runtime).iter(|| async move {
                let render = render(tokens(count), RenderOptions::new().append_only(true));
                let mut stream = deltas(render);
                let mut bytes = 0;
                while let Some(delta) = stream.next().await {
                    match delta.expect("render failed") {
                        FrameDelta::Append { text } | FrameDelta::Replace { text } => {
                            bytes += text.len()
                        }
                        FrameDelta::Done => {}
                    }
                }
                bytes
            });
        });
    }

    group.finish();
}

fn bench_array(c: &mut Criterion) {
    let runtime = Runtime::new().expect("failed to build tokio runtime");
    let mut group = c.benchmark_group("array");

    for width in [4usize, 64] {
        group.bench_with_input(BenchmarkId::new("merge", width), &width, |b, &width| {
            b.to_async(&runtime).iter(|| async move {
                let tree = Node::array((0..width).map(|_| tokens(8)));
                render(tree, RenderOptions::new())
                    .await
                    .expect("render failed")
                    .text()
                    .len()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_stream, bench_array);
criterion_main!(benches);
