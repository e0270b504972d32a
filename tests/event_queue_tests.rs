use adscouter::{DeliveryBatch, Event, EventQueue};
use serde_json::json;

fn queue_with(max_size: usize, names: &[&str]) -> EventQueue {
    let mut queue = EventQueue::new(max_size);
    for name in names {
        queue.enqueue(Event::new(*name));
    }
    queue
}

fn queued_names(queue: &EventQueue) -> Vec<String> {
    queue.snapshot().into_iter().map(|e| e.name).collect()
}

// ============================================================================
// Overflow
// ============================================================================

#[test]
fn test_drop_oldest_on_overflow() {
    let mut queue = queue_with(3, &["a", "b", "c"]);
    assert!(queue.is_full());

    let evicted = queue.enqueue(Event::new("d"));

    assert_eq!(evicted, 1);
    assert_eq!(queued_names(&queue), vec!["b", "c", "d"]);
    assert_eq!(queue.evicted(), 1);
}

#[test]
fn test_never_exceeds_capacity() {
    let mut queue = EventQueue::new(5);
    for i in 0..100 {
        queue.enqueue(Event::new(format!("event-{}", i)));
        assert!(queue.len() <= queue.capacity());
    }

    assert_eq!(queued_names(&queue).first().map(String::as_str), Some("event-95"));
    assert_eq!(queue.evicted(), 95);
}

#[test]
fn test_zero_capacity_holds_one() {
    let mut queue = EventQueue::new(0);
    queue.enqueue(Event::new("a"));
    queue.enqueue(Event::new("b"));

    assert_eq!(queue.capacity(), 1);
    assert_eq!(queued_names(&queue), vec!["b"]);
}

// ============================================================================
// Drain and requeue
// ============================================================================

#[test]
fn test_drain_takes_from_head() {
    let mut queue = queue_with(10, &["a", "b", "c", "d", "e"]);

    let batch = queue.drain(2);

    assert_eq!(batch.names(), vec!["a", "b"]);
    assert_eq!(queued_names(&queue), vec!["c", "d", "e"]);

    let rest = queue.drain(10);
    assert_eq!(rest.len(), 3);
    assert!(queue.is_empty());
    assert!(queue.drain(10).is_empty());
}

#[test]
fn test_requeue_front_preserves_order() {
    let mut queue = queue_with(10, &["a", "b", "c", "d"]);
    let batch = queue.drain(2);
    queue.enqueue(Event::new("e"));

    let evicted = queue.requeue_front(batch);

    assert_eq!(evicted, 0);
    assert_eq!(queued_names(&queue), vec!["a", "b", "c", "d", "e"]);
}

#[test]
fn test_requeue_front_reapplies_bound() {
    let mut queue = queue_with(3, &["a", "b", "c"]);
    let batch = queue.drain(2);
    queue.enqueue(Event::new("d"));
    queue.enqueue(Event::new("e"));

    let evicted = queue.requeue_front(batch);

    assert_eq!(evicted, 2);
    assert_eq!(queued_names(&queue), vec!["c", "d", "e"]);
}

#[test]
fn test_drain_all_and_clear() {
    let mut queue = queue_with(10, &["a", "b"]);
    assert_eq!(queue.drain_all().len(), 2);
    assert!(queue.is_empty());

    queue.enqueue(Event::new("c"));
    queue.clear();
    assert_eq!(queue.len(), 0);
}

// ============================================================================
// Wire format
// ============================================================================

#[test]
fn test_event_serializes_camel_case() {
    let event = Event::new("question_asked")
        .with_property("question", json!("shipping times"))
        .page_url("https://shop.example.com/faq")
        .client_context("test-browser/1.0");

    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(value["name"], "question_asked");
    assert_eq!(value["properties"]["question"], "shipping times");
    assert_eq!(value["pageUrl"], "https://shop.example.com/faq");
    assert_eq!(value["clientContext"], "test-browser/1.0");
    assert_eq!(value["attempt"], 0);
    assert!(value["eventId"].is_string());
    assert!(value.get("page_url").is_none());
}

#[test]
fn test_event_timestamp_is_iso_millis() {
    let event = Event::new("click");

    let parsed = chrono::DateTime::parse_from_rfc3339(&event.timestamp);
    assert!(parsed.is_ok());
    assert!(event.timestamp.ends_with('Z'));
    // 2024-01-01T00:00:00.000Z
    assert_eq!(event.timestamp.len(), 24);
}

#[test]
fn test_event_ids_are_unique() {
    let a = Event::new("click");
    let b = Event::new("click");
    assert_ne!(a.event_id, b.event_id);
}

#[test]
fn test_batch_serializes_as_array() {
    let batch = DeliveryBatch::new(vec![Event::new("a"), Event::new("b")]);

    let value = serde_json::to_value(batch.events()).unwrap();

    let array = value.as_array().unwrap();
    assert_eq!(array.len(), 2);
    assert_eq!(array[0]["name"], "a");
    assert_eq!(array[1]["name"], "b");
}

#[test]
fn test_event_name_validation() {
    assert!(adscouter::core::is_valid_event_name("pageview"));
    assert!(!adscouter::core::is_valid_event_name(""));
    assert!(!adscouter::core::is_valid_event_name("   "));
    assert!(!adscouter::core::is_valid_event_name(
        &"x".repeat(adscouter::core::MAX_EVENT_NAME_LEN + 1)
    ));
}
