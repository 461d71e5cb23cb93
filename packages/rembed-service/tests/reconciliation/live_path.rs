use serde_json::json;

use rembed_service::{Error, SearchMode, WriteOutcome};

use super::{ROOM, harness, provider_down, seeded, test_config};

#[tokio::test]
async fn search_uses_vectors_when_everything_is_healthy() {
	let h = harness(test_config(4), |_| Ok(vec![0.5; 4]));

	h.store.insert(json!({ "text": "first" }), Some(seeded(4, 1)));
	h.store.insert(json!({ "text": "second" }), Some(seeded(4, 2)));

	let response = h
		.service
		.memory()
		.search(ROOM, "what came first", 10)
		.await
		.expect("Search should answer.");

	assert_eq!(response.mode, SearchMode::Vector);
	assert_eq!(response.items.len(), 2);
	assert!(response.items.iter().all(|item| item.similarity.is_some()));
}

#[tokio::test]
async fn dimension_mismatch_in_search_serves_recent_memories() {
	let h = harness(test_config(4), |_| Ok(vec![0.5; 4]));

	h.store.insert(json!({ "text": "older" }), Some(seeded(3, 1)));
	h.store.insert(json!({ "text": "newer" }), Some(seeded(3, 2)));
	h.store.search_mismatch.store(true, std::sync::atomic::Ordering::SeqCst);

	let memory = h.service.memory();

	for _ in 0..10 {
		let response = memory.search(ROOM, "anything", 1).await.expect("Fallback should answer.");

		assert_eq!(response.mode, SearchMode::Recent);
		assert_eq!(response.items.len(), 1);
		assert_eq!(response.items[0].memory.content.text.as_deref(), Some("newer"));
		assert_eq!(response.items[0].similarity, None);
	}

	assert_eq!(h.service.breakers.vector_search.snapshot().failure_count, 0);
}

#[tokio::test]
async fn provider_outage_serves_recent_memories() {
	let h = harness(test_config(4), |_| Err(provider_down()));

	h.store.insert(json!({ "text": "only" }), Some(seeded(4, 1)));

	let response =
		h.service.memory().search(ROOM, "query", 5).await.expect("Fallback should answer.");

	assert_eq!(response.mode, SearchMode::Recent);
	assert_eq!(response.items.len(), 1);
}

#[tokio::test]
async fn store_embedding_writes_target_width_vectors() {
	let h = harness(test_config(4), |_| Ok(vec![0.5; 4]));
	let id = h.store.insert(json!({ "text": "fresh" }), None);
	let outcome =
		h.service.memory().store_embedding(id, "fresh").await.expect("Write should succeed.");

	assert_eq!(outcome, WriteOutcome::Written);
	assert_eq!(h.store.embedding(id), Some(vec![0.5; 4]));
}

#[tokio::test]
async fn refused_writes_clear_the_embedding() {
	let h = harness(test_config(4), |_| Ok(vec![0.5; 4]));
	let id = h.store.insert(json!({ "text": "stale" }), Some(seeded(3, 1)));

	h.store.update_mismatch.store(true, std::sync::atomic::Ordering::SeqCst);

	let outcome = h.service.memory().store_embedding(id, "stale").await.expect("Fallback clears.");

	assert_eq!(outcome, WriteOutcome::Cleared);
	assert_eq!(h.store.embedding(id), None);
	assert_eq!(h.service.breakers.vector_write.snapshot().failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_recency_fallback_times_out() {
	let h = harness(test_config(4), |_| Err(provider_down()));

	h.store.insert(json!({ "text": "unreachable" }), Some(seeded(4, 1)));
	h.store.stall();

	let result = h.service.memory().search(ROOM, "query", 5).await;

	assert!(matches!(
		result,
		Err(Error::Timeout { ref resource, timeout_ms: 10_000 }) if resource == "vector_search"
	));
}

#[tokio::test(start_paused = true)]
async fn stalled_clear_fallback_times_out() {
	let h = harness(test_config(4), |_| Ok(vec![0.5; 4]));
	let id = h.store.insert(json!({ "text": "stale" }), Some(seeded(3, 1)));

	h.store.update_mismatch.store(true, std::sync::atomic::Ordering::SeqCst);
	h.store.stall();

	let result = h.service.memory().store_embedding(id, "stale").await;

	assert!(matches!(
		result,
		Err(Error::Timeout { ref resource, timeout_ms: 10_000 }) if resource == "vector_write"
	));
	assert_eq!(h.store.embedding(id), Some(seeded(3, 1)));
}

#[tokio::test]
async fn disabled_embeddings_defer_writes() {
	let mut cfg = test_config(4);

	cfg.embeddings.disabled = true;

	let h = harness(cfg, |_| Ok(vec![0.5; 4]));
	let id = h.store.insert(json!({ "text": "kept" }), Some(seeded(3, 1)));
	let outcome = h.service.memory().store_embedding(id, "kept").await.expect("Deferral is Ok.");

	assert_eq!(outcome, WriteOutcome::Deferred);
	assert_eq!(h.store.embedding(id), Some(seeded(3, 1)));
	assert_eq!(h.provider.calls(), 0);
}

#[tokio::test]
async fn repeated_embeddings_hit_the_cache() {
	let h = harness(test_config(4), |_| Ok(vec![0.5; 4]));
	let memory = h.service.memory();

	assert_eq!(memory.embed_text("same words").await, Some(vec![0.5; 4]));
	assert_eq!(memory.embed_text("same words").await, Some(vec![0.5; 4]));
	assert_eq!(h.provider.calls(), 1);
}
