//! Property tests over the import/export pipeline
//!
//! Run with: cargo test --package autodag-storage --test properties

use autodag_core::manifest::file_metadata_from_store;
use autodag_core::{bytes_source, ChunkingOptions};
use autodag_storage::{export_to_bytes, import, ImportOptions, MemoryBlockstore};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn export_returns_imported_bytes(
        data in proptest::collection::vec(any::<u8>(), 0..5000),
        chunk_size in 1usize..300,
        max_links in 2usize..10,
        buffer in 1usize..700,
    ) {
        let chunking = ChunkingOptions::default()
            .with_chunk_size(chunk_size)
            .with_max_links_per_node(max_links);
        let store = MemoryBlockstore::new();
        let result = import(
            &store,
            bytes_source(data.clone(), buffer),
            &ImportOptions::default().with_chunking(chunking),
        )
        .unwrap();

        let restored = export_to_bytes(&store, result.head, None).unwrap();
        prop_assert_eq!(restored.as_ref(), data.as_slice());

        let manifest = file_metadata_from_store(&store, result.head, None).unwrap();
        prop_assert_eq!(manifest.total_size, data.len() as u64);
        let expected_chunks = if data.len() <= chunk_size {
            1
        } else {
            data.len().div_ceil(chunk_size)
        };
        prop_assert_eq!(manifest.total_chunks, expected_chunks as u64);
    }

    #[test]
    fn buffer_boundaries_do_not_change_the_head(
        data in proptest::collection::vec(any::<u8>(), 0..3000),
        a in 1usize..500,
        b in 1usize..500,
    ) {
        let chunking = ChunkingOptions::default().with_chunk_size(128).with_max_links_per_node(4);
        let options = ImportOptions::default().with_chunking(chunking);
        let first = import(&MemoryBlockstore::new(), bytes_source(data.clone(), a), &options).unwrap();
        let second = import(&MemoryBlockstore::new(), bytes_source(data, b), &options).unwrap();
        prop_assert_eq!(first.head, second.head);
    }
}
