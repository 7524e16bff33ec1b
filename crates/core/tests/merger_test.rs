mod common;

use common::{ids, text_message};
use parley_core::merger::OrderedMessages;
use parley_core::models::ChatMessage;
use proptest::prelude::*;

fn is_sorted(messages: &[ChatMessage]) -> bool {
    messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp)
}

#[test]
fn historical_batches_are_prepended() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("c", "u1", 3), text_message("d", "u1", 4)])
        .unwrap();
    list.merge_historical(vec![text_message("a", "u1", 1), text_message("b", "u2", 2)])
        .unwrap();

    assert_eq!(ids(list.as_slice()), vec!["a", "b", "c", "d"]);
    assert_eq!(list.oldest_id(), Some("a"));
    assert_eq!(list.newest_id(), Some("d"));
}

#[test]
fn live_merge_is_idempotent() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("a", "u1", 1)]).unwrap();

    assert!(list.merge_live(text_message("b", "u2", 2)));
    assert!(!list.merge_live(text_message("b", "u2", 2)));
    assert!(!list.merge_live(text_message("a", "u1", 1)));

    assert_eq!(list.len(), 2);
    assert_eq!(ids(list.as_slice()), vec!["a", "b"]);
}

#[test]
fn late_live_message_is_inserted_in_order() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("a", "u1", 1), text_message("c", "u1", 3)])
        .unwrap();

    assert!(list.merge_live(text_message("b", "u2", 2)));
    assert_eq!(ids(list.as_slice()), vec!["a", "b", "c"]);
}

#[test]
fn skewed_live_message_does_not_block_older_pages() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("c", "u1", 30), text_message("d", "u1", 40)])
        .unwrap();
    assert!(list.merge_live(text_message("skewed", "u2", -100)));
    assert_eq!(list.oldest_id(), Some("skewed"));

    list.merge_historical(vec![text_message("a", "u1", 10), text_message("b", "u1", 20)])
        .unwrap();

    assert_eq!(ids(list.as_slice()), vec!["skewed", "a", "b", "c", "d"]);
    assert!(is_sorted(list.as_slice()));
}

#[test]
fn older_batch_interleaves_with_skewed_live_messages() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("d", "u1", 40)]).unwrap();
    assert!(list.merge_live(text_message("x", "u2", 15)));

    list.merge_historical(vec![text_message("a", "u1", 10), text_message("b", "u1", 20)])
        .unwrap();

    assert_eq!(ids(list.as_slice()), vec!["a", "x", "b", "d"]);
    assert!(is_sorted(list.as_slice()));
}

#[test]
fn get_mut_finds_loaded_messages_only() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("a", "u1", 1)]).unwrap();

    list.get_mut("a").unwrap().text = "edited".into();
    assert_eq!(list.get("a").unwrap().text, "edited");
    assert!(list.get_mut("missing").is_none());
}

#[test]
fn clear_forgets_ids() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("a", "u1", 1)]).unwrap();
    list.clear();

    assert!(list.is_empty());
    assert!(list.merge_live(text_message("a", "u1", 1)));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "merge_historical precondition violated")]
fn duplicate_historical_merge_panics_in_debug() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("a", "u1", 1)]).unwrap();
    let _ = list.merge_historical(vec![text_message("a", "u1", 1)]);
}

#[cfg(not(debug_assertions))]
#[test]
fn duplicate_historical_merge_is_rejected_in_release() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("a", "u1", 1)]).unwrap();

    let result = list.merge_historical(vec![text_message("a", "u1", 1)]);
    assert!(matches!(
        result,
        Err(parley_core::ChatError::DuplicateMergeViolation(_))
    ));
    assert_eq!(ids(list.as_slice()), vec!["a"]);
}

#[cfg(not(debug_assertions))]
#[test]
fn newer_historical_batch_is_rejected_in_release() {
    let mut list = OrderedMessages::new();
    list.merge_historical(vec![text_message("b", "u1", 2)]).unwrap();

    let result = list.merge_historical(vec![text_message("c", "u1", 3)]);
    assert!(result.is_err());
    assert_eq!(list.len(), 1);
}

proptest! {
    /// Paging backwards over any history, with live redeliveries mixed in,
    /// yields every message once, in order.
    #[test]
    fn pages_and_live_redelivery_keep_order_and_uniqueness(
        gaps in prop::collection::vec(0i64..5, 1..60),
        page_size in 2usize..10,
        live_count in 0usize..10,
        redeliver in prop::collection::vec(any::<prop::sample::Index>(), 0..20),
    ) {
        let mut seconds = 0;
        let history: Vec<ChatMessage> = gaps
            .iter()
            .enumerate()
            .map(|(i, gap)| {
                seconds += gap;
                text_message(&format!("m{:03}", i), "u1", seconds)
            })
            .collect();

        let live_from = history.len().saturating_sub(live_count);
        let (historical, live) = history.split_at(live_from);

        let mut list = OrderedMessages::new();
        for page in historical.rchunks(page_size) {
            list.merge_historical(page.to_vec()).unwrap();
        }
        for message in live {
            prop_assert!(list.merge_live(message.clone()));
        }
        for index in &redeliver {
            let message = index.get(&history);
            prop_assert!(!list.merge_live(message.clone()));
        }

        prop_assert_eq!(list.len(), history.len());
        prop_assert!(is_sorted(list.as_slice()));
        prop_assert_eq!(ids(list.as_slice()), ids(&history));
    }
}
