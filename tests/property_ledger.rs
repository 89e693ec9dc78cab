//! Property tests for ledger merging and lexical ranking.

use proptest::prelude::*;
use std::collections::HashSet;

use credence::adapters::{Bm25Index, CorpusSegment};
use credence::domain::models::{Bm25Config, Provenance, QueryId};
use credence::domain::ports::SearchRequest;
use credence::{EvidenceRecord, Ledger, Query, Segment};

fn segment(id: u8) -> Segment {
    Segment {
        id: format!("doc_{id}#0"),
        document_id: format!("doc_{id}"),
        title: String::new(),
        url: String::new(),
        text: format!("segment {id}"),
        lexical_score: 1.0,
        lexical_rank: 1,
        dense_score: None,
    }
}

fn record(id: u32, candidates: &[u8], picks: &[u8]) -> EvidenceRecord {
    let candidates: Vec<Segment> = candidates.iter().copied().map(segment).collect();
    let selected: Vec<Segment> = picks
        .iter()
        .filter_map(|p| candidates.get(usize::from(*p) % candidates.len().max(1)).cloned())
        .take(3)
        .collect();
    EvidenceRecord::new(
        Query {
            id: QueryId(id),
            text: format!("query {id}"),
            rationale: String::new(),
            iteration: 1,
            provenance: Provenance::Initial,
        },
        candidates,
        selected,
        None,
    )
}

/// Candidate sets and selection picks for a batch of records.
fn batch_strategy() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    prop::collection::vec(
        (
            prop::collection::hash_set(0u8..12, 0..6).prop_map(|s| s.into_iter().collect::<Vec<_>>()),
            prop::collection::vec(any::<u8>(), 0..4),
        ),
        0..5,
    )
}

proptest! {
    #[test]
    fn ledger_grows_and_never_repeats_a_selection(batches in prop::collection::vec(batch_strategy(), 1..4)) {
        let mut ledger = Ledger::new("article");
        let mut next_id = 1u32;
        let mut previous_len = 0;

        for batch in batches {
            let records: Vec<EvidenceRecord> = batch
                .iter()
                .map(|(candidates, picks)| {
                    let r = record(next_id, candidates, picks);
                    next_id += 1;
                    r
                })
                .collect();
            let expected = records.len();

            let outcome = ledger.append_batch(records).unwrap();
            prop_assert_eq!(outcome.appended, expected);
            prop_assert_eq!(ledger.len(), previous_len + expected);
            previous_len = ledger.len();
        }

        let snapshot = ledger.snapshot();
        let ids: HashSet<QueryId> = snapshot.queries().map(|q| q.id).collect();
        prop_assert_eq!(ids.len(), snapshot.len());

        let mut seen = HashSet::new();
        for segment in snapshot.selected_segments() {
            prop_assert!(seen.insert(segment.id.clone()));
        }
        for record in snapshot.records() {
            prop_assert!(record.selected.len() <= 3);
            let candidates: HashSet<&str> = record.candidates.iter().map(|c| c.id.as_str()).collect();
            prop_assert!(record.selected.iter().all(|s| candidates.contains(s.id.as_str())));
        }
        prop_assert_eq!(snapshot.next_query_id(0), QueryId(next_id));
    }

    #[test]
    fn reused_query_id_leaves_ledger_untouched(id in 1u32..50) {
        let mut ledger = Ledger::new("article");
        ledger.append_batch(vec![record(id, &[1, 2], &[0])]).unwrap();

        let result = ledger.append_batch(vec![record(id + 1, &[3], &[]), record(id, &[4], &[])]);
        prop_assert!(result.is_err());
        prop_assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn lexical_ranking_is_sorted_and_bounded(
        texts in prop::collection::vec("[a-e]{2,3}( [a-e]{2,3}){0,6}", 1..20),
        query in "[a-e]{2,3}( [a-e]{2,3}){0,2}",
        top_k in 1usize..10,
    ) {
        let segments: Vec<CorpusSegment> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| CorpusSegment {
                id: format!("doc_{i}#0"),
                title: String::new(),
                url: String::new(),
                text: text.clone(),
            })
            .collect();
        let index = Bm25Index::build(segments, Bm25Config::default());
        let hits = index.rank(&SearchRequest::from_text(&query, top_k));

        prop_assert!(hits.len() <= top_k);
        for pair in hits.windows(2) {
            prop_assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].segment_id <= pair[1].segment_id)
            );
        }
        let ids: HashSet<&str> = hits.iter().map(|h| h.segment_id.as_str()).collect();
        prop_assert_eq!(ids.len(), hits.len());
    }
}
