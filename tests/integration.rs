//! Integration tests for the state store.

use parking_lot::Mutex;
use showcase_state::{
    Field, FieldValue, FlavorPolicy, ReadyTimer, StateEvent, StateUpdate, Store, StoreConfig,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn catalog_store(count: usize) -> Store {
    Store::new(StoreConfig::with_catalog(count, FlavorPolicy::Wrap)).unwrap()
}

fn record<T: Send + 'static>() -> Arc<Mutex<Vec<T>>> {
    Arc::new(Mutex::new(Vec::new()))
}

// --- Realistic Workflow Tests ---

#[test]
fn test_hero_ready_flow() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let store = Arc::new(
        Store::new(StoreConfig {
            ready_delay_ms: 20,
            ..Default::default()
        })
        .unwrap(),
    );

    // A scene waits for readiness before activating
    let activated = record::<bool>();
    let sink = Arc::clone(&activated);
    let _sub = store.subscribe_ready(move |ready| sink.lock().push(ready));

    let watch = store.watch(Field::Ready);
    let timer = ReadyTimer::start_default(Arc::clone(&store)).unwrap();

    let event = watch.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(
        event,
        StateEvent::Changed {
            change: FieldValue::Ready(true)
        }
    );
    assert!(timer.fired());
    assert_eq!(*activated.lock(), vec![true]);
    assert_eq!(store.read(|s| s.current_flavor), 0);
}

#[test]
fn test_hero_torn_down_before_ready() {
    let store = Arc::new(Store::default());
    let timer = ReadyTimer::start(Arc::clone(&store), Duration::from_secs(30)).unwrap();

    // Unmount
    drop(timer);

    assert!(!store.ready());
}

#[test]
fn test_timer_dropped_by_callback_while_firing() {
    let store = Arc::new(Store::default());
    let timer = ReadyTimer::start(Arc::clone(&store), Duration::from_millis(20)).unwrap();
    let slot = Arc::new(Mutex::new(Some(timer)));

    // The flavor write holds the write lock while this runs; the timer
    // fires meanwhile and queues behind it.
    let owned = Arc::clone(&slot);
    let _sub = store.subscribe_current_flavor(move |_| {
        thread::sleep(Duration::from_millis(200));
        drop(owned.lock().take());
    });

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let writer = Arc::clone(&store);
    thread::spawn(move || {
        writer.set_current_flavor(1).unwrap();
        let _ = done_tx.send(());
    });

    assert!(done_rx.recv_timeout(Duration::from_secs(3)).is_ok());
    assert!(slot.lock().is_none());

    // Cancelled before the timer thread got the lock
    thread::sleep(Duration::from_millis(50));
    assert!(!store.ready());
}

#[test]
fn test_carousel_cycles_through_catalog() {
    let store = catalog_store(4);
    let shown = record::<i64>();
    let sink = Arc::clone(&shown);
    let _sub = store.subscribe_current_flavor(move |f| sink.lock().push(f));

    for _ in 0..5 {
        store.next_flavor().unwrap();
    }
    store.previous_flavor().unwrap();
    store.previous_flavor().unwrap();

    assert_eq!(*shown.lock(), vec![1, 2, 3, 0, 1, 0, 3]);
    assert_eq!(store.current_flavor(), 3);
}

#[test]
fn test_subscribers_called_in_registration_order() {
    let store = Store::default();
    let order = record::<(&'static str, i64)>();

    let subs: Vec<_> = ["first", "second", "third"]
        .into_iter()
        .map(|name| {
            let sink = Arc::clone(&order);
            store.subscribe_current_flavor(move |f| sink.lock().push((name, f)))
        })
        .collect();

    store.set_current_flavor(7).unwrap();
    assert_eq!(
        *order.lock(),
        vec![("first", 7), ("second", 7), ("third", 7)]
    );
    drop(subs);
    assert_eq!(store.subscriber_count(Field::CurrentFlavor), 0);
}

#[test]
fn test_dropping_subscription_unsubscribes() {
    let store = Store::default();
    let calls = record::<bool>();

    {
        let sink = Arc::clone(&calls);
        let _sub = store.subscribe_ready(move |r| sink.lock().push(r));
        store.set_ready(true);
    }

    store.set_ready(false);
    assert_eq!(*calls.lock(), vec![true]);
}

#[test]
fn test_detached_subscription_survives() {
    let store = Store::default();
    let calls = record::<bool>();
    let sink = Arc::clone(&calls);

    let id = store
        .subscribe_ready(move |r| sink.lock().push(r))
        .detach();

    store.set_ready(true);
    assert_eq!(*calls.lock(), vec![true]);

    assert!(store.unsubscribe(Field::Ready, id));
    assert!(!store.unsubscribe(Field::Ready, id));
    store.set_ready(false);
    assert_eq!(*calls.lock(), vec![true]);
}

#[test]
fn test_apply_notifies_each_field_once() {
    let store = Store::default();
    let changes = record::<FieldValue>();

    let subs: Vec<_> = Field::ALL
        .into_iter()
        .map(|field| {
            let sink = Arc::clone(&changes);
            store.subscribe(field, move |change| sink.lock().push(change))
        })
        .collect();

    let state = store
        .apply(StateUpdate::ready(true).with_current_flavor(2))
        .unwrap();
    assert!(state.ready);
    assert_eq!(state.current_flavor, 2);
    assert_eq!(
        *changes.lock(),
        vec![FieldValue::Ready(true), FieldValue::CurrentFlavor(2)]
    );

    // Only the supplied field is notified
    changes.lock().clear();
    store.apply(StateUpdate::current_flavor(3)).unwrap();
    assert_eq!(*changes.lock(), vec![FieldValue::CurrentFlavor(3)]);

    drop(subs);
}

#[test]
fn test_apply_snapshot_is_consistent_for_subscribers() {
    let store = Arc::new(Store::default());
    let seen = record::<(bool, i64)>();

    let reader = Arc::clone(&store);
    let sink = Arc::clone(&seen);
    let _sub = store.subscribe(Field::Ready, move |_| {
        sink.lock().push(reader.read(|s| (s.ready, s.current_flavor)));
    });

    store
        .apply(StateUpdate::ready(true).with_current_flavor(5))
        .unwrap();

    // Both fields were written before any notification ran
    assert_eq!(*seen.lock(), vec![(true, 5)]);
}

#[test]
fn test_callback_can_write_other_field() {
    let store = Arc::new(catalog_store(4));

    // Becoming ready resets the carousel to the first flavor
    let writer = Arc::clone(&store);
    let _sub = store.subscribe_ready(move |ready| {
        if ready {
            writer.set_current_flavor(0).unwrap();
        }
    });

    store.set_current_flavor(2).unwrap();
    store.set_ready(true);
    assert_eq!(store.snapshot().current_flavor, 0);
}

#[test]
fn test_callback_can_unsubscribe_itself() {
    let store = Arc::new(Store::default());
    let calls = record::<i64>();
    let slot: Arc<Mutex<Option<showcase_state::Subscription>>> = Arc::new(Mutex::new(None));

    let sink = Arc::clone(&calls);
    let own = Arc::clone(&slot);
    let sub = store.subscribe_current_flavor(move |f| {
        sink.lock().push(f);
        if let Some(mut sub) = own.lock().take() {
            sub.unsubscribe();
        }
    });
    *slot.lock() = Some(sub);

    store.set_current_flavor(1).unwrap();
    store.set_current_flavor(2).unwrap();
    assert_eq!(*calls.lock(), vec![1]);
    assert_eq!(store.subscriber_count(Field::CurrentFlavor), 0);
}

#[test]
fn test_writes_from_threads_are_serialized() {
    let store = Arc::new(Store::default());
    let seen = record::<i64>();
    let sink = Arc::clone(&seen);
    let _sub = store.subscribe_current_flavor(move |f| sink.lock().push(f));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..100 {
                    store.set_current_flavor(t * 1000 + i).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let seen = seen.lock();
    assert_eq!(seen.len(), 400);
    // Last notification matches the stored value
    assert_eq!(*seen.last().unwrap(), store.current_flavor());
    // Per-thread order is preserved
    for t in 0..4 {
        let mine: Vec<i64> = seen.iter().copied().filter(|f| f / 1000 == t).collect();
        let expected: Vec<i64> = (0..100).map(|i| t * 1000 + i).collect();
        assert_eq!(mine, expected);
    }
}

#[test]
fn test_watcher_on_another_thread() {
    let store = Arc::new(Store::default());
    let watch = store.watch(Field::CurrentFlavor);

    let consumer = thread::spawn(move || {
        let mut values = Vec::new();
        while values.len() < 3 {
            match watch.recv_timeout(Duration::from_secs(5)) {
                Ok(StateEvent::Changed {
                    change: FieldValue::CurrentFlavor(f),
                }) => values.push(f),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        values
    });

    for f in [4, 5, 6] {
        store.set_current_flavor(f).unwrap();
    }

    assert_eq!(consumer.join().unwrap(), vec![4, 5, 6]);
}

#[test]
fn test_watcher_overflow_drops_only_that_watcher() {
    let store = Store::new(StoreConfig {
        watch_buffer_size: 2,
        ..Default::default()
    })
    .unwrap();

    let slow = store.watch(Field::CurrentFlavor);
    let other_field = store.watch(Field::Ready);

    for f in 0..5 {
        store.set_current_flavor(f).unwrap();
    }

    assert_eq!(store.watcher_count(), 1);
    assert_eq!(slow.drain().len(), 2);

    store.set_ready(true);
    assert_eq!(
        other_field.try_recv().unwrap(),
        StateEvent::Changed {
            change: FieldValue::Ready(true)
        }
    );
}

#[test]
fn test_dropped_watch_leaves_registry() {
    let store = Store::default();

    {
        let _ready = store.watch(Field::Ready);
        let _flavor = store.watch(Field::CurrentFlavor);
        assert_eq!(store.watcher_count(), 2);
    }

    // Neither field was ever written
    assert_eq!(store.watcher_count(), 0);
}
