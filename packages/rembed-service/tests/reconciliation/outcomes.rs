use serde_json::json;

use rembed_service::{CancelFlag, CircuitState, RunReport, convert};

use super::{Harness, harness, provider_down, seeded, test_config};

async fn run(h: &Harness) -> RunReport {
	h.service.reconciler().run(&CancelFlag::new()).await.expect("Reconciliation should finish.")
}

#[tokio::test]
async fn wrong_width_from_provider_falls_back_to_conversion() {
	let h = harness(test_config(1536), |text| match text {
		"alpha" => Ok(vec![0.1; 1536]),
		_ => Ok(vec![0.2; 512]),
	});
	let a = h.store.insert(json!({ "text": "alpha" }), Some(seeded(768, 1)));
	let b = h.store.insert(json!({ "text": "bravo" }), Some(seeded(768, 2)));
	let report = run(&h).await;

	assert_eq!(report.succeeded_by_regeneration, 1);
	assert_eq!(report.succeeded_by_conversion, 1);
	assert_eq!(h.store.embedding(a), Some(vec![0.1; 1536]));
	assert_eq!(h.store.embedding(b), convert::convert_dimension(&seeded(768, 2), 1536, false));
	assert!(report.is_balanced());
}

#[tokio::test]
async fn indivisible_widths_fail_and_stay_cleared() {
	let h = harness(test_config(1536), |_| Err(provider_down()));
	let id = h.store.insert(json!({ "text": "legacy vector" }), Some(seeded(1000, 3)));
	let report = run(&h).await;

	assert_eq!(report.failed, 1);
	assert_eq!(report.cleared, 1);
	assert_eq!(h.store.embedding(id), None);
	assert!(report.is_balanced());
}

#[tokio::test]
async fn indivisible_widths_are_padded_when_enabled() {
	let mut cfg = test_config(1536);

	cfg.reconcile.pad_indivisible = true;

	let h = harness(cfg, |_| Err(provider_down()));
	let id = h.store.insert(json!({ "text": "legacy vector" }), Some(seeded(1000, 3)));
	let report = run(&h).await;
	let stored = h.store.embedding(id).expect("Padded vector should be written.");

	assert_eq!(report.succeeded_by_conversion, 1);
	assert_eq!(&stored[..1000], seeded(1000, 3).as_slice());
	assert!(stored[1000..].iter().all(|value| *value == 0.0));
}

#[tokio::test]
async fn records_without_text_are_skipped_but_cleared() {
	let h = harness(test_config(1536), |_| Ok(vec![0.3; 1536]));
	let short = h.store.insert(json!({ "text": "ok" }), Some(seeded(384, 1)));
	let empty = h.store.insert(json!({}), Some(seeded(384, 2)));
	let titled =
		h.store.insert(json!({ "title": "Plan", "description": "ship it" }), Some(seeded(384, 3)));
	let report = run(&h).await;

	assert_eq!(report.discovered, 3);
	assert_eq!(report.skipped_no_text, 2);
	assert_eq!(report.processed, 1);
	assert_eq!(report.succeeded_by_regeneration, 1);
	assert!(report.is_balanced());
	assert_eq!(h.store.embedding(short), None);
	assert_eq!(h.store.embedding(empty), None);
	assert!(h.store.embedding(titled).is_some());
	assert!(h.journal.events().contains(&super::Event::Embed("Plan ship it".to_string())));
}

#[tokio::test]
async fn provider_outage_trips_the_breaker_and_conversion_carries_on() {
	let h = harness(test_config(1536), |_| Err(provider_down()));

	h.store.insert_many(12, 768);

	let report = run(&h).await;

	assert_eq!(report.succeeded_by_conversion, 12);
	assert_eq!(report.failed, 0);
	// Five counted failures open the circuit; the remaining records never reach the provider.
	assert_eq!(h.provider.calls(), 5);
	assert_eq!(h.service.breakers.provider.snapshot().state, CircuitState::Open);
}

#[tokio::test]
async fn disabled_embeddings_never_call_the_provider() {
	let mut cfg = test_config(1536);

	cfg.embeddings.disabled = true;

	let h = harness(cfg, |_| Ok(vec![0.3; 1536]));

	h.store.insert_many(4, 384);

	let report = run(&h).await;

	assert_eq!(report.succeeded_by_conversion, 4);
	assert_eq!(h.provider.calls(), 0);
	assert_eq!(h.service.breakers.provider.snapshot().failure_count, 0);
}

#[tokio::test]
async fn one_failed_write_does_not_stop_the_batch() {
	let h = harness(test_config(1536), |_| Ok(vec![0.3; 1536]));
	let ids = h.store.insert_many(5, 384);

	h.store.break_updates_for(ids[2]);

	let report = run(&h).await;

	assert_eq!(report.succeeded_by_regeneration, 4);
	assert_eq!(report.failed, 1);
	assert_eq!(h.store.embedding(ids[2]), None);
	assert!(report.is_balanced());
}

#[tokio::test]
async fn outdated_dims_limit_what_is_discovered() {
	let mut cfg = test_config(1536);

	cfg.embeddings.outdated_dims = vec![384];

	let h = harness(cfg, |_| Ok(vec![0.3; 1536]));

	h.store.insert_many(3, 384);

	let other = h.store.insert(json!({ "text": "other model" }), Some(seeded(768, 9)));
	let report = run(&h).await;

	assert_eq!(report.discovered, 3);
	assert_eq!(report.by_dimension.len(), 1);
	assert_eq!(h.store.embedding(other), Some(seeded(768, 9)));
}

#[tokio::test]
async fn discovery_samples_when_widths_cannot_be_computed() {
	let mut cfg = test_config(1536);

	cfg.reconcile.discovery_sample_limit = 10;

	let h = harness(cfg, |_| Ok(vec![0.3; 1536]));

	h.store.vector_dims_missing.store(true, std::sync::atomic::Ordering::SeqCst);
	h.store.insert_many(6, 384);
	h.store.insert_many(2, 1536);
	h.store.insert_many(6, 768);

	let report = run(&h).await;

	assert!(report.sampled);
	// The first ten rows are sampled and the two aligned ones drop out.
	assert_eq!(report.discovered, 8);
	assert_eq!(report.by_dimension.get(&384), Some(&6));
	assert_eq!(report.by_dimension.get(&768), Some(&2));
	assert!(report.is_balanced());
}

#[tokio::test]
async fn regenerations_are_cached_for_the_live_path() {
	let h = harness(test_config(1536), |_| Ok(vec![0.3; 1536]));

	h.store.insert(json!({ "text": "shared text" }), Some(seeded(384, 1)));

	run(&h).await;

	let calls = h.provider.calls();
	let vector = h.service.memory().embed_text("shared text").await;

	assert_eq!(vector, Some(vec![0.3; 1536]));
	assert_eq!(h.provider.calls(), calls);
}
