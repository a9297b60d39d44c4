//! End-to-end integration tests for AutoDAG
//!
//! Tests the complete pipeline: bytes → transforms → chunks → DAG → store →
//! manifest → read back → bytes
//!
//! Run with: cargo test --package autodag-storage --test end_to_end

use autodag_core::manifest::{file_metadata, file_metadata_from_store, folder_metadata_from_store};
use autodag_core::{
    address, bytes_source, AutoDagError, Blockstore, ChunkingOptions, CompressionConfig, Dag,
    EncryptionConfig, EncryptionKey, FileBuilders, Link, NodeType, OffchainMetadata,
    TransformOptions,
};
use autodag_storage::{
    export_to_bytes, import, import_folder, ImportOptions, MemoryBlockstore, SledBlockstore,
    StatsSource, StorageConfig,
};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Generate test file data of specified size
fn generate_file(size: usize) -> Vec<u8> {
    // Use a pattern that's easy to verify
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn small_chunking() -> ChunkingOptions {
    ChunkingOptions::default()
        .with_chunk_size(1024)
        .with_max_links_per_node(16)
}

fn run_full_pipeline_test<S: Blockstore>(store: &S, file_size: usize) {
    let original = generate_file(file_size);
    let options = ImportOptions::default()
        .with_chunking(small_chunking())
        .with_name("data.bin");

    let result = import(store, bytes_source(original.clone(), 10_000), &options).unwrap();

    let restored = export_to_bytes(store, result.head, None).unwrap();
    assert_eq!(restored.len(), original.len());
    assert_eq!(restored.as_ref(), original.as_slice());

    let manifest = file_metadata_from_store(store, result.head, Some("application/octet-stream"))
        .unwrap();
    assert_eq!(manifest.total_size, file_size as u64);
    assert_eq!(manifest.total_chunks, file_size.div_ceil(1024).max(1) as u64);
    assert_eq!(manifest.name.as_deref(), Some("data.bin"));
}

#[test]
fn test_full_pipeline_memory_backend() {
    let store = MemoryBlockstore::new();
    run_full_pipeline_test(&store, 1024 * 1024); // 1 MB
}

#[test]
fn test_full_pipeline_sled() {
    let temp_dir = TempDir::new().unwrap();
    let store = SledBlockstore::open(StorageConfig::new(temp_dir.path())).unwrap();
    run_full_pipeline_test(&store, 1024 * 1024);
}

#[test]
fn test_full_pipeline_odd_sizes() {
    for size in [0, 1, 1023, 1024, 1025, 16 * 1024 + 7] {
        let store = MemoryBlockstore::new();
        run_full_pipeline_test(&store, size);
    }
}

#[test]
fn test_store_and_in_memory_dag_agree() {
    let data = generate_file(200_000);
    let store = MemoryBlockstore::new();
    let result = import(
        &store,
        bytes_source(data.clone(), 4096),
        &ImportOptions::default().with_chunking(small_chunking()),
    )
    .unwrap();

    let built = Dag::from_content(data, &FileBuilders, small_chunking(), None).unwrap();
    let loaded = Dag::load(result.head, &store).unwrap();
    assert_eq!(built.head(), loaded.head());
    assert_eq!(built.len(), loaded.len());
    assert_eq!(
        file_metadata(&built, None).unwrap(),
        file_metadata(&loaded, None).unwrap()
    );
}

#[test]
fn test_encrypted_pipeline_with_password() {
    let store = MemoryBlockstore::new();
    let config = EncryptionConfig::from_password(b"correct horse", b"battery staple")
        .unwrap()
        .with_chunk_size(4096);
    let transforms = TransformOptions::default()
        .with_compression(CompressionConfig::default())
        .with_encryption(config);
    let data = generate_file(100_000);

    let result = import(
        &store,
        bytes_source(data.clone(), 7000),
        &ImportOptions::default()
            .with_chunking(small_chunking())
            .with_transforms(transforms),
    )
    .unwrap();

    // the same password and salt derive the same key
    let key = EncryptionKey::derive_from_password(b"correct horse", b"battery staple").unwrap();
    let restored = export_to_bytes(&store, result.head, Some(&key)).unwrap();
    assert_eq!(restored.as_ref(), data.as_slice());

    // the stored chunks are not the plaintext
    let plain = Dag::from_content(data, &FileBuilders, small_chunking(), None).unwrap();
    assert_ne!(plain.head(), result.head);
}

#[test]
fn test_cancellation_midway() {
    let store = MemoryBlockstore::new();
    let token = CancellationToken::new();
    let trigger = token.clone();

    let mut pulled = 0;
    let source = bytes_source(generate_file(100 * 1024), 1024).inspect(move |_| {
        pulled += 1;
        if pulled == 20 {
            trigger.cancel();
        }
    });

    let result = import(
        &store,
        source,
        &ImportOptions::default()
            .with_chunking(small_chunking())
            .with_cancel(token),
    );
    assert!(matches!(result, Err(AutoDagError::Cancelled)));
    // chunks written before the cancel stay, no root was written
    assert!(!store.is_empty());
    assert_eq!(store.iter_filtered(NodeType::File).unwrap().count(), 0);
}

#[test]
fn test_concurrent_imports_share_store() {
    let store = Arc::new(MemoryBlockstore::new());
    let data = Arc::new(generate_file(50_000));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let data = Arc::clone(&data);
            thread::spawn(move || {
                import(
                    store.as_ref(),
                    bytes_source(data.as_ref().clone(), 3000),
                    &ImportOptions::default().with_chunking(small_chunking()),
                )
                .unwrap()
                .head
            })
        })
        .collect();

    let heads: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(heads.windows(2).all(|w| w[0] == w[1]));

    let single = MemoryBlockstore::new();
    import(
        &single,
        bytes_source(data.as_ref().clone(), 3000),
        &ImportOptions::default().with_chunking(small_chunking()),
    )
    .unwrap();
    assert_eq!(store.len(), single.len());
    assert_eq!(store.stats().unwrap().bytes_used, single.stats().unwrap().bytes_used);
}

#[test]
fn test_sled_reopen_and_export() {
    let temp_dir = TempDir::new().unwrap();
    let data = generate_file(30_000);

    let head = {
        let store = SledBlockstore::open(StorageConfig::new(temp_dir.path())).unwrap();
        let head = import(
            &store,
            bytes_source(data.clone(), 5000),
            &ImportOptions::default().with_chunking(small_chunking()),
        )
        .unwrap()
        .head;
        store.flush().unwrap();
        head
    };

    let text = address::to_text(&head);
    let store = SledBlockstore::open(StorageConfig::new(temp_dir.path())).unwrap();
    let head = address::from_text(&text).unwrap();
    let restored = export_to_bytes(&store, head, None).unwrap();
    assert_eq!(restored.as_ref(), data.as_slice());
}

#[test]
fn test_folder_manifest_json() {
    let store = MemoryBlockstore::new();
    let mut links = Vec::new();
    for (name, size) in [("a.bin", 10usize), ("b.bin", 5000), ("c.bin", 0)] {
        let result = import(
            &store,
            bytes_source(generate_file(size), 1000),
            &ImportOptions::default()
                .with_chunking(small_chunking())
                .with_name(name),
        )
        .unwrap();
        links.push(Link::named(result.head, name, size as u64));
    }
    let folder = import_folder(&store, &links, Some("bundle"), small_chunking()).unwrap();

    let manifest = OffchainMetadata::Folder(folder_metadata_from_store(&store, folder).unwrap());
    let json: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();
    assert_eq!(json["type"], "folder");
    assert_eq!(json["name"], "bundle");
    assert_eq!(json["totalFiles"], 3);
    assert_eq!(json["totalSize"], 5010);
    assert_eq!(json["children"][1]["name"], "b.bin");
    assert_eq!(json["children"][1]["cid"], address::to_text(&links[1].cid));
}
