use rulepedia::{
    ChunkRecord, Engine, EngineConfig, StateDb,
    classifier::KeywordClassifier,
    pipeline,
};

fn record(source: &str, order: u64, content: &str) -> ChunkRecord {
    ChunkRecord {
        source_id: source.to_string(),
        order,
        content: content.to_string(),
        section_context: String::new(),
        word_range: (0, 0),
    }
}

fn rulebook_records() -> Vec<ChunkRecord> {
    vec![
        record(
            "core-rules",
            0,
            "To attack, roll your dice pool against difficulty 6. Each \
             die showing the difficulty or higher counts as a success.",
        ),
        record(
            "core-rules",
            1,
            "The city of Ashford never sleeps. Merchants hawk silver \
             charms beneath gaslight while the fog rolls in off the bay.",
        ),
        record(
            "core-rules",
            2,
            "Soak rolls reduce incoming damage. Roll stamina against \
             difficulty 6; each success removes one level of damage.",
        ),
        record(
            "core-rules",
            3,
            "Fire damage ignites the target and cannot be soaked without \
             a supernatural power.",
        ),
        record(
            "bestiary",
            0,
            "Ghouls are loyal servants, bound by the blood they drink.",
        ),
    ]
}

#[test]
fn ingest_search_discover_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let db = StateDb::open(&tmp.path().join("state.redb")).unwrap();
    let mut engine = Engine::open(db, EngineConfig::default()).unwrap();

    let ids = engine.ingest_batch(rulebook_records()).unwrap();
    assert_eq!(ids.len(), 5);

    let stats = engine.stats();
    assert_eq!(stats.total_chunks, 5);
    assert_eq!(stats.unique_documents, 2);
    assert!(stats.vocabulary_size > 0);

    // Hybrid search surfaces the fire chunk first for a fire query.
    let hits = engine.search("fire damage", 3, 0.0).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].source_id, "core-rules");
    assert_eq!(hits[0].order, 3);
    for hit in &hits {
        assert!(hit.hybrid_score >= 0.0 && hit.hybrid_score <= 1.0);
    }

    // Rule discovery keeps document order and skips flavor text.
    let rules = engine.discover_rules(&KeywordClassifier, 0.6);
    assert!(!rules.is_empty());
    let orders: Vec<u64> = rules
        .iter()
        .filter(|r| r.chunk.source_id == "core-rules")
        .map(|r| r.chunk.order)
        .collect();
    let mut sorted = orders.clone();
    sorted.sort();
    assert_eq!(orders, sorted, "rules must stay in document order");
    assert!(
        rules.iter().all(|r| r.chunk.order != 1),
        "flavor text must not classify as a rule"
    );

    let summary = pipeline::summarize(&rules);
    assert_eq!(summary.total_rules, rules.len());
    assert!(summary.average_confidence >= 0.6);
}

#[test]
fn corpus_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("state.redb");

    {
        let db = StateDb::open(&path).unwrap();
        let mut engine = Engine::open(db, EngineConfig::default()).unwrap();
        engine.ingest_batch(rulebook_records()).unwrap();
        engine.force_flush().unwrap();
    }

    let db = StateDb::open(&path).unwrap();
    let mut engine = Engine::open(db, EngineConfig::default()).unwrap();

    let stats = engine.stats();
    assert_eq!(stats.total_chunks, 5);
    assert_eq!(stats.indexed_vectors, 5);
    assert_eq!(stats.pending_writes, 0);

    let hits = engine.search("soak stamina", 5, 0.0).unwrap();
    assert_eq!(hits[0].order, 2);

    // Removal after restart still purges store, index, and search.
    let soak_id = hits[0].chunk_id;
    assert!(engine.remove_chunk(soak_id));
    let hits = engine.search("soak stamina", 5, 0.0).unwrap();
    assert!(hits.iter().all(|h| h.chunk_id != soak_id));

    engine.force_flush().unwrap();
    let db = StateDb::open(&path).unwrap();
    let engine = Engine::open(db, EngineConfig::default()).unwrap();
    assert_eq!(engine.stats().total_chunks, 4);
}

#[test]
fn listing_by_document_preserves_chunk_order() {
    let tmp = tempfile::tempdir().unwrap();
    let db = StateDb::open(&tmp.path().join("state.redb")).unwrap();
    let mut engine = Engine::open(db, EngineConfig::default()).unwrap();
    engine.ingest_batch(rulebook_records()).unwrap();

    let chunks = engine.list_by_document("core-rules");
    let orders: Vec<u64> = chunks.iter().map(|c| c.order).collect();
    assert_eq!(orders, vec![0, 1, 2, 3]);

    assert_eq!(engine.list_by_document("bestiary").len(), 1);
    assert!(engine.list_by_document("missing").is_empty());
}
