use std::time::Instant;

use strpool::{HeapPool, PoolStr};
use tracing_subscriber::EnvFilter;

// Run with `RUST_LOG=strpool=debug` to watch chunks being added.
fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.init();

	let start = Instant::now();

	let pool = HeapPool::new();
	let mut words: Vec<PoolStr> = Vec::new();

	for i in 0..200_000 {
		let word = match i % 4 {
			0 => format!("apple #{i}"),
			1 => format!("kiwi #{i}"),
			2 => format!("banana #{i}"),
			_ => format!("cherry #{i}"),
		};
		match pool.alloc_str(&word) {
			Ok(s) => words.push(s),
			Err(err) => {
				eprintln!("allocation failed: {err}");
				return;
			}
		}
	}

	words.sort_unstable();

	println!("first: {}, last: {}", words[0], words[words.len() - 1]);
	println!("{pool:?}");
	println!("Elapsed: {}ms", start.elapsed().as_millis());
}
