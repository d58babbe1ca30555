use init_singleton::*;

use serial_test::serial;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

struct Counted {
    id: usize,
}

static COUNTED_REGISTRY: Registry = Registry::new();
static COUNTED_BUILT: AtomicUsize = AtomicUsize::new(0);

singleton!(Counted, Lazy, init = || {
    let id = COUNTED_BUILT.fetch_add(1, Ordering::SeqCst);
    // Widen the window for racing first calls.
    std::thread::sleep(std::time::Duration::from_millis(10));
    Counted { id }
}, registry = &COUNTED_REGISTRY);

#[test]
fn exactly_once_under_contention() {
    const THREADS: usize = 16;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                instance::<Counted>() as *const Counted as usize
            })
        })
        .collect();
    let addrs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(addrs.iter().all(|a| *a == addrs[0]));
    assert_eq!(COUNTED_BUILT.load(Ordering::SeqCst), 1);
    assert_eq!(instance::<Counted>().id, 0);
    assert_eq!(Counted::slot().init_count(), 1);
    assert_eq!(COUNTED_REGISTRY.live(), 1);
    assert_eq!(COUNTED_REGISTRY.len(), 1);
}

#[derive(Default)]
struct Hot {
    value: u64,
}

static HOT_REGISTRY: Registry = Registry::new();
singleton!(Hot, Lazy, init = || Hot { value: 99 }, registry = &HOT_REGISTRY);

#[test]
fn fast_path_never_takes_the_guard_again() {
    assert_eq!(Hot::slot().guard_acquisitions(), 0);
    assert_eq!(instance::<Hot>().value, 99);
    assert_eq!(Hot::slot().guard_acquisitions(), 1);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                let mut sum = 0;
                for _ in 0..10_000 {
                    sum += instance::<Hot>().value;
                }
                sum
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 99 * 10_000);
    }
    assert_eq!(Hot::slot().guard_acquisitions(), 1);
}

static PLAIN_REGISTRY: Registry = Registry::new();
static HITS: Slot<AtomicU64> = Slot::in_registry(&PLAIN_REGISTRY, "hits", AtomicU64::default);

#[test]
fn foreign_types_use_a_plain_slot() {
    HITS.get().fetch_add(2, Ordering::Relaxed);
    HITS.get().fetch_add(3, Ordering::Relaxed);
    assert_eq!(HITS.get().load(Ordering::Relaxed), 5);
    assert_eq!(HITS.label(), "hits");
    assert!(core::ptr::eq(HITS.registry(), &PLAIN_REGISTRY));
    assert_eq!(PLAIN_REGISTRY.report(), ["hits"]);
}

struct Inner;
struct Outer;

static NESTED_REGISTRY: Registry = Registry::new();
static NESTED_EVENTS: Mutex<Vec<RegistryEvent>> = Mutex::new(Vec::new());

singleton!(Inner, Lazy, init = || Inner, registry = &NESTED_REGISTRY);
singleton!(Outer, Lazy, init = || {
    let _ = instance::<Inner>();
    Outer
}, registry = &NESTED_REGISTRY);

#[test]
fn nested_construction_is_reported_innermost_first() {
    NESTED_REGISTRY.set_trace_callback(|e| NESTED_EVENTS.lock().unwrap().push(e.clone()));
    let _ = instance::<Outer>();
    NESTED_REGISTRY.clear_trace_callback();

    assert_eq!(
        *NESTED_EVENTS.lock().unwrap(),
        [
            RegistryEvent::Constructed {
                label: "Inner",
                live: 1
            },
            RegistryEvent::Constructed {
                label: "Outer",
                live: 2
            },
        ]
    );
    assert_eq!(NESTED_REGISTRY.live(), NESTED_REGISTRY.len() as isize);
    assert_eq!(NESTED_REGISTRY.report(), ["Outer", "Inner"]);
}

struct Helped {
    prepared_first: bool,
}

static HELPER_RUNS: AtomicUsize = AtomicUsize::new(0);

struct CountingHelper;
impl InitHelper for CountingHelper {
    fn prepare() {
        HELPER_RUNS.fetch_add(1, Ordering::SeqCst);
    }
}

static HELPED_REGISTRY: Registry = Registry::new();
singleton!(Helped, Lazy, init = || Helped {
    prepared_first: HELPER_RUNS.load(Ordering::SeqCst) == 1,
}, helper = CountingHelper, registry = &HELPED_REGISTRY);

#[test]
fn helper_is_ready_during_construction() {
    assert!(instance::<Helped>().prepared_first);
    let _ = instance::<Helped>();
    assert_eq!(HELPER_RUNS.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct GlobalDefault {
    n: u8,
}
singleton!(GlobalDefault);

#[derive(Default)]
struct GlobalLazy;
singleton!(GlobalLazy, Lazy);

#[test]
#[serial]
fn default_declaration_is_eager_and_global() {
    assert!(<<GlobalDefault as Singleton>::Policy as InitPolicy>::EAGER);
    assert!(!<<GlobalLazy as Singleton>::Policy as InitPolicy>::EAGER);
    assert!(core::ptr::eq(
        GlobalDefault::slot().registry(),
        Registry::global()
    ));
    assert_eq!(GlobalDefault::slot().label(), "GlobalDefault");

    let before = live_count();
    assert_eq!(instance::<GlobalDefault>().n, 0);
    assert_eq!(live_count(), before + 1);
}

#[test]
#[serial]
fn live_count_follows_the_global_registry() {
    let before = live_count();
    let _ = instance::<GlobalLazy>();
    let _ = instance::<GlobalLazy>();
    assert_eq!(live_count(), before + 1);
    assert_eq!(Registry::global().live(), live_count());
}
