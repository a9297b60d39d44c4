//! Async import tests
//!
//! Run with: cargo test --package autodag-storage --test async_import

use autodag_core::manifest::file_metadata_from_store;
use autodag_core::{
    bytes_source, AsyncBlockstore, AsyncWrapper, AutoDagError, Blockstore, ChunkingOptions,
    CompressionConfig, NodeKind, NodeType, TransformOptions,
};
use autodag_storage::{
    export_to_bytes, import, import_stream, ImportOptions, MemoryBlockstore, SledBlockstore,
};
use bytes::Bytes;
use futures::stream;
use tokio_util::sync::CancellationToken;

fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 256) as u8).collect()
}

fn buffers(data: &[u8], size: usize) -> Vec<autodag_core::Result<Bytes>> {
    data.chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

fn options() -> ImportOptions {
    ImportOptions::default().with_chunking(
        ChunkingOptions::default()
            .with_chunk_size(512)
            .with_max_links_per_node(8),
    )
}

#[tokio::test]
async fn test_async_import_equals_sync() {
    let data = generate_data(70_000);

    let sync_store = MemoryBlockstore::new();
    let sync = import(&sync_store, bytes_source(data.clone(), 4000), &options()).unwrap();

    let async_store = AsyncWrapper(MemoryBlockstore::new());
    let result = import_stream(&async_store, stream::iter(buffers(&data, 777)), &options())
        .await
        .unwrap();

    assert_eq!(result.head, sync.head);
    assert_eq!(result.blocks, sync.blocks);
    assert_eq!(async_store.inner().len(), sync_store.len());
    let restored = export_to_bytes(async_store.inner(), result.head, None).unwrap();
    assert_eq!(restored.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_async_import_with_compression() {
    let data = b"repetitive content ".repeat(2000);
    let options = options().with_transforms(
        TransformOptions::default().with_compression(CompressionConfig {
            level: 5,
            chunk_size: 1000,
            ..Default::default()
        }),
    );

    let store = AsyncWrapper(SledBlockstore::open_temporary().unwrap());
    let result = import_stream(&store, stream::iter(buffers(&data, 1234)), &options)
        .await
        .unwrap();
    assert!(result.bytes < data.len() as u64);
    let manifest = file_metadata_from_store(store.inner(), result.head, None).unwrap();
    assert_eq!(manifest.total_size, data.len() as u64);

    let restored = export_to_bytes(store.inner(), result.head, None).unwrap();
    assert_eq!(restored.as_ref(), data.as_slice());
}

#[tokio::test]
async fn test_async_empty_stream() {
    let store = AsyncWrapper(MemoryBlockstore::new());
    let result = import_stream(&store, stream::iter(Vec::new()), &options())
        .await
        .unwrap();
    assert_eq!(result.blocks, 1);
    assert!(export_to_bytes(store.inner(), result.head, None)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_async_cancelled() {
    let token = CancellationToken::new();
    token.cancel();
    let store = AsyncWrapper(MemoryBlockstore::new());
    let result = import_stream(
        &store,
        stream::iter(buffers(&generate_data(10_000), 100)),
        &options().with_cancel(token),
    )
    .await;
    assert!(matches!(result, Err(AutoDagError::Cancelled)));
    assert!(store.inner().is_empty());
}

#[tokio::test]
async fn test_async_source_error_propagates() {
    let store = AsyncWrapper(MemoryBlockstore::new());
    let items = vec![
        Ok(Bytes::from(vec![1u8; 600])),
        Err(AutoDagError::Storage("source failed".to_string())),
    ];
    let result = import_stream(&store, stream::iter(items), &options()).await;
    assert!(matches!(result, Err(AutoDagError::Storage(_))));
}

#[tokio::test]
async fn test_async_filtered_listing() {
    let data = generate_data(20_000);
    let store = AsyncWrapper(MemoryBlockstore::new());
    let result = import_stream(&store, stream::iter(buffers(&data, 900)), &options())
        .await
        .unwrap();

    let chunks: Vec<_> = store
        .iter_filtered(NodeType::FileChunk)
        .await
        .unwrap()
        .collect::<autodag_core::Result<_>>()
        .unwrap();
    let expected: Vec<_> = store
        .inner()
        .iter_filtered(NodeType::FileChunk)
        .unwrap()
        .collect::<autodag_core::Result<_>>()
        .unwrap();
    assert!(!chunks.is_empty());
    assert_eq!(chunks.len(), expected.len());

    let files: Vec<_> = store
        .iter_kind(NodeKind::File)
        .await
        .unwrap()
        .collect::<autodag_core::Result<_>>()
        .unwrap();
    assert_eq!(files.len(), store.inner().len());
    assert!(files.contains(&result.head));
}
