//! Basic document store adapter operation tests
//!
//! Tests core CRUD operations for stored CRDT updates

use arbor_doc_adapter_redb::DocAdapterRedb;
use arbor_types::doc_store_adapter::{DocStoreAdapter, DocUpdate};
use tempfile::TempDir;

async fn create_test_adapter() -> (DocAdapterRedb, TempDir) {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");
	let adapter =
		DocAdapterRedb::new(temp_dir.path()).await.expect("Failed to create adapter");
	(adapter, temp_dir)
}

#[tokio::test]
async fn test_create_and_store_update() {
	let (adapter, _temp) = create_test_adapter().await;
	let doc_name = "ws1/thought/a";

	let update = DocUpdate::with_client(vec![0x01, 0x02, 0x03], "client1");

	adapter.store_update(doc_name, update).await.expect("Failed to store update");

	let updates = adapter.get_updates(doc_name).await.expect("Failed to get updates");

	assert_eq!(updates.len(), 1);
	assert_eq!(updates[0].data, vec![0x01, 0x02, 0x03]);
	// client_id is not persisted by this adapter; the engine only needs it
	// on the live path.
	assert!(updates[0].client_id.is_none());
}

#[tokio::test]
async fn test_empty_document() {
	let (adapter, _temp) = create_test_adapter().await;

	let updates = adapter.get_updates("ws1/thought/missing").await.expect("Failed to get updates");

	assert_eq!(updates.len(), 0);
}

#[tokio::test]
async fn test_multiple_updates_keep_append_order() {
	let (adapter, _temp) = create_test_adapter().await;
	let doc_name = "ws1/thought/b";

	// Store enough updates that lexicographic and numeric sequence order
	// would diverge without padding.
	for i in 1..=12u8 {
		adapter
			.store_update(doc_name, DocUpdate::new(vec![i]))
			.await
			.expect("Failed to store update");
	}

	let updates = adapter.get_updates(doc_name).await.expect("Failed to get updates");

	assert_eq!(updates.len(), 12);
	for (i, update) in updates.iter().enumerate() {
		assert_eq!(update.data, vec![u8::try_from(i).unwrap() + 1]);
	}
}

#[tokio::test]
async fn test_delete_document() {
	let (adapter, _temp) = create_test_adapter().await;
	let doc_name = "ws1/thought/c";

	adapter.store_update(doc_name, DocUpdate::new(vec![0xFF])).await.expect("Failed to store");

	let updates = adapter.get_updates(doc_name).await.expect("Failed to get updates");
	assert_eq!(updates.len(), 1);

	adapter.delete_doc(doc_name).await.expect("Failed to delete");

	let updates = adapter.get_updates(doc_name).await.expect("Failed to get updates");
	assert_eq!(updates.len(), 0);
}

#[tokio::test]
async fn test_delete_unknown_document_is_tolerated() {
	let (adapter, _temp) = create_test_adapter().await;
	adapter.delete_doc("ws1/thought/never-stored").await.expect("Delete must not fail");
}

#[tokio::test]
async fn test_document_name_prefix_isolation() {
	let (adapter, _temp) = create_test_adapter().await;

	adapter.store_update("ws1/thought/a", DocUpdate::new(vec![0x11])).await.expect("store");
	adapter.store_update("ws1/thought/ab", DocUpdate::new(vec![0x22])).await.expect("store");

	let updates_a = adapter.get_updates("ws1/thought/a").await.expect("get");
	assert_eq!(updates_a.len(), 1);
	assert_eq!(updates_a[0].data, vec![0x11]);

	adapter.delete_doc("ws1/thought/a").await.expect("delete");
	let updates_ab = adapter.get_updates("ws1/thought/ab").await.expect("get");
	assert_eq!(updates_ab.len(), 1, "deleting a must not touch ab");
}

#[tokio::test]
async fn test_list_documents() {
	let (adapter, _temp) = create_test_adapter().await;

	adapter.store_update("ws1/thought/a", DocUpdate::new(vec![1])).await.expect("store");
	adapter.store_update("ws1/doclog", DocUpdate::new(vec![2])).await.expect("store");

	let mut docs = adapter.list_docs().await.expect("Failed to list documents");
	docs.sort();
	assert_eq!(docs, vec!["ws1/doclog".into(), "ws1/thought/a".into()]);
}

#[tokio::test]
async fn test_large_binary_update() {
	let (adapter, _temp) = create_test_adapter().await;
	let doc_name = "ws1/thought/large";

	// 100KB update
	let large_data = vec![0xAB; 102400];

	adapter.store_update(doc_name, DocUpdate::new(large_data.clone())).await.expect("store");

	let updates = adapter.get_updates(doc_name).await.expect("get");

	assert_eq!(updates.len(), 1);
	assert_eq!(updates[0].data, large_data);
}

#[tokio::test]
async fn test_updates_survive_reopen() {
	let temp_dir = TempDir::new().expect("Failed to create temp directory");

	{
		let adapter = DocAdapterRedb::new(temp_dir.path()).await.expect("create");
		adapter.store_update("ws1/thought/a", DocUpdate::new(vec![7])).await.expect("store");
	}

	let adapter = DocAdapterRedb::new(temp_dir.path()).await.expect("reopen");
	let updates = adapter.get_updates("ws1/thought/a").await.expect("get");
	assert_eq!(updates.len(), 1);
	assert_eq!(updates[0].data, vec![7]);

	// The sequence counter survives too: appending continues after the tail.
	adapter.store_update("ws1/thought/a", DocUpdate::new(vec![8])).await.expect("store");
	let updates = adapter.get_updates("ws1/thought/a").await.expect("get");
	assert_eq!(updates.iter().map(|u| u.data.clone()).collect::<Vec<_>>(), vec![vec![7], vec![8]]);
}
