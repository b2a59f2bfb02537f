//! Event queue ordering and wake signal tests
//!
//! Covers the FIFO property, the once-per-wake `check` contract and delivery
//! across tasks running on different worker threads.

use mqtt_base::event::{ConnectEvent, ConnectFlags, ConnectReturnCode, Event, EventQueue};
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #[test]
    fn pop_returns_events_in_insertion_order(events in prop::collection::vec(any::<u16>(), 0..64)) {
        // Property: draining returns exactly what was sent, in order, and empties the queue
        let queue: EventQueue<u16> = EventQueue::new();
        let sender = queue.sender();
        for event in &events {
            sender.send(*event);
        }

        let mut drained = Vec::new();
        while let Some(event) = queue.pop() {
            match event {
                Event::App(value) => drained.push(value),
                other => prop_assert!(false, "unexpected event {:?}", other),
            }
        }

        prop_assert_eq!(drained, events);
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn check_is_true_at_most_once_per_burst(count in 1usize..16) {
        // Property: any number of pushes before a check yields a single true
        let queue: EventQueue<usize> = EventQueue::new();
        let sender = queue.sender();
        for i in 0..count {
            sender.send(i);
        }

        prop_assert!(queue.check());
        prop_assert!(!queue.check());
        prop_assert_eq!(queue.len(), count);
    }
}

#[test]
fn test_connect_and_app_events_share_one_sequence() {
    let queue: EventQueue<&'static str> = EventQueue::new();
    let transport_side = queue.sender();
    let app_side = queue.sender();

    app_side.send("before");
    transport_side.push(Event::Connect(ConnectEvent::new(
        ConnectFlags {
            session_present: true,
        },
        ConnectReturnCode::Accepted,
    )));
    app_side.send("after");

    assert_eq!(queue.pop(), Some(Event::App("before")));
    assert!(queue.pop().is_some_and(|event| event.is_successful_connect()));
    assert_eq!(queue.pop(), Some(Event::App("after")));
    assert_eq!(queue.pop(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_loss_with_concurrent_producer() {
    const TOTAL: u32 = 2_000;
    let queue: EventQueue<u32> = EventQueue::new();
    let sender = queue.sender();

    let producer = tokio::spawn(async move {
        for i in 0..TOTAL {
            sender.send(i);
            if i % 100 == 0 {
                tokio::task::yield_now().await;
            }
        }
    });

    let mut received = Vec::with_capacity(TOTAL as usize);
    while received.len() < TOTAL as usize {
        queue.wait(Duration::from_millis(50)).await;
        if queue.check() {
            while let Some(event) = queue.pop() {
                if let Event::App(value) = event {
                    received.push(value);
                }
            }
        }
    }
    producer.await.unwrap();

    assert_eq!(received, (0..TOTAL).collect::<Vec<_>>());
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_reports_timeout_through_check() {
    let queue: EventQueue<()> = EventQueue::new();

    queue.wait(Duration::from_secs(1)).await;
    assert!(!queue.check(), "timeout wake is distinguishable from event wake");

    queue.sender().send(());
    queue.wait(Duration::from_secs(1)).await;
    assert!(queue.check());
}
