//! Push-based stream abstraction for the runtime
//!
//! A [`Stream`] is cold: every subscription runs the producer again and
//! gets its own operator state. Signals travel as `next`* then at most one
//! of `error` / `complete`. Multicast is explicit through [`Subject`],
//! [`Stream::publish`] and [`Stream::share`].

use crate::error::CepError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Receiver of stream signals
pub trait Observer<T>: Send {
    fn next(&mut self, value: T);

    fn error(&mut self, err: CepError) {
        let _ = err;
    }

    fn complete(&mut self) {}
}

impl<T, O: Observer<T> + ?Sized> Observer<T> for Box<O> {
    fn next(&mut self, value: T) {
        (**self).next(value)
    }

    fn error(&mut self, err: CepError) {
        (**self).error(err)
    }

    fn complete(&mut self) {
        (**self).complete()
    }
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type ErrorFn = Box<dyn FnMut(CepError) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;

/// Observer assembled from closures
pub struct FnObserver<T> {
    on_next: NextFn<T>,
    on_error: Option<ErrorFn>,
    on_complete: Option<CompleteFn>,
}

impl<T> FnObserver<T> {
    pub fn on_error(mut self, f: impl FnMut(CepError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

/// Build an observer from a `next` closure.
pub fn observer_fn<T>(on_next: impl FnMut(T) + Send + 'static) -> FnObserver<T> {
    FnObserver {
        on_next: Box::new(on_next),
        on_error: None,
        on_complete: None,
    }
}

impl<T> Observer<T> for FnObserver<T> {
    fn next(&mut self, value: T) {
        (self.on_next)(value)
    }

    fn error(&mut self, err: CepError) {
        if let Some(f) = self.on_error.as_mut() {
            f(err)
        }
    }

    fn complete(&mut self) {
        if let Some(f) = self.on_complete.as_mut() {
            f()
        }
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct SubscriptionInner {
    closed: AtomicBool,
    teardowns: Mutex<Vec<Teardown>>,
}

/// Handle releasing the resources of one subscription.
///
/// `unsubscribe` is idempotent: teardowns run exactly once, in the order
/// they were added, and never while an internal lock is held.
#[derive(Clone, Default)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Register a teardown. Runs immediately if already closed.
    pub fn add(&self, teardown: impl FnOnce() + Send + 'static) {
        {
            let mut teardowns = lock(&self.inner.teardowns);
            if !self.is_closed() {
                teardowns.push(Box::new(teardown));
                return;
            }
        }
        teardown();
    }

    /// Tie a child subscription to this one.
    pub fn add_child(&self, child: Subscription) {
        if Arc::ptr_eq(&self.inner, &child.inner) {
            return;
        }
        self.add(move || child.unsubscribe());
    }

    pub fn unsubscribe(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let teardowns = std::mem::take(&mut *lock(&self.inner.teardowns));
        for teardown in teardowns {
            teardown();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The sink a producer pushes into.
///
/// Drops signals once the subscription is closed or a terminal signal has
/// been delivered; a terminal signal releases the subscription.
pub struct Subscriber<T> {
    observer: Box<dyn Observer<T>>,
    subscription: Subscription,
    stopped: bool,
}

impl<T> Subscriber<T> {
    pub fn new(observer: Box<dyn Observer<T>>, subscription: Subscription) -> Self {
        Self {
            observer,
            subscription,
            stopped: false,
        }
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn is_closed(&self) -> bool {
        self.stopped || self.subscription.is_closed()
    }
}

impl<T> Observer<T> for Subscriber<T> {
    fn next(&mut self, value: T) {
        if !self.is_closed() {
            self.observer.next(value);
        }
    }

    fn error(&mut self, err: CepError) {
        if self.is_closed() {
            return;
        }
        self.stopped = true;
        self.observer.error(err);
        self.subscription.unsubscribe();
    }

    fn complete(&mut self) {
        if self.is_closed() {
            return;
        }
        self.stopped = true;
        self.observer.complete();
        self.subscription.unsubscribe();
    }
}

/// A stage transforming one stream into another.
pub trait Operator<In> {
    type Output;

    fn apply(self, source: Stream<In>) -> Stream<Self::Output>;
}

type Producer<T> = dyn Fn(Subscriber<T>) + Send + Sync;

/// A cold, push-based stream
pub struct Stream<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Create a stream from a producer run once per subscription.
    ///
    /// The producer owns the [`Subscriber`] and registers its cleanup on
    /// `subscriber.subscription()`.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Subscriber<T>) + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
        }
    }

    pub fn empty() -> Self {
        Stream::new(|mut subscriber: Subscriber<T>| subscriber.complete())
    }

    pub fn never() -> Self {
        Stream::new(|subscriber: Subscriber<T>| drop(subscriber))
    }

    pub fn fail(err: CepError) -> Self {
        Stream::new(move |mut subscriber: Subscriber<T>| subscriber.error(err.clone()))
    }

    pub fn subscribe<O: Observer<T> + 'static>(&self, observer: O) -> Subscription {
        self.subscribe_boxed(Box::new(observer), None)
    }

    /// Subscribe as part of `parent`: unsubscribing the parent releases
    /// this subscription, even while the producer is still running.
    pub fn subscribe_within<O: Observer<T> + 'static>(
        &self,
        observer: O,
        parent: &Subscription,
    ) -> Subscription {
        self.subscribe_boxed(Box::new(observer), Some(parent))
    }

    fn subscribe_boxed(
        &self,
        observer: Box<dyn Observer<T>>,
        parent: Option<&Subscription>,
    ) -> Subscription {
        let subscription = Subscription::new();
        if let Some(parent) = parent {
            parent.add_child(subscription.clone());
        }
        (self.producer)(Subscriber::new(observer, subscription.clone()));
        subscription
    }

    /// Hand an existing subscriber straight to the producer.
    pub(crate) fn feed(&self, subscriber: Subscriber<T>) {
        (self.producer)(subscriber)
    }

    pub fn pipe<O: Operator<T>>(self, operator: O) -> Stream<O::Output> {
        operator.apply(self)
    }

    pub fn map<U, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Stream::new(move |downstream: Subscriber<U>| {
            let parent = downstream.subscription().clone();
            self.subscribe_within(
                MapObserver {
                    downstream,
                    f: Arc::clone(&f),
                },
                &parent,
            );
        })
    }

    pub fn filter<P>(self, predicate: P) -> Stream<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Stream::new(move |downstream: Subscriber<T>| {
            let parent = downstream.subscription().clone();
            self.subscribe_within(
                FilterObserver {
                    downstream,
                    predicate: Arc::clone(&predicate),
                },
                &parent,
            );
        })
    }

    /// Interleave two streams; completes once both have completed.
    pub fn merge(self, other: Stream<T>) -> Stream<T> {
        Stream::new(move |downstream: Subscriber<T>| {
            let parent = downstream.subscription().clone();
            let shared = Arc::new(Mutex::new(MergeState {
                downstream: Some(downstream),
                queued: VecDeque::new(),
                active: 2,
            }));
            for source in [&self, &other] {
                source.subscribe_within(
                    MergeObserver {
                        shared: Arc::clone(&shared),
                    },
                    &parent,
                );
            }
        })
    }
}

impl<T: Clone + Send + 'static> Stream<T> {
    /// Multicast through a subject connected on demand.
    pub fn publish(self) -> Connectable<T> {
        Connectable {
            source: self,
            subject: Subject::new(),
        }
    }

    /// Reference-counted multicast.
    ///
    /// The source is connected by the first subscriber and released when
    /// the last one leaves; a later subscriber reconnects.
    pub fn share(self) -> Stream<T> {
        let state = Arc::new(Mutex::new(ShareState::<T> {
            subject: None,
            connection: None,
            refs: 0,
            generation: 0,
        }));
        let source = self;
        Stream::new(move |subscriber: Subscriber<T>| {
            let (subject, generation, connect) = {
                let mut guard = lock(&state);
                let stale = guard.subject.as_ref().map_or(true, Subject::is_stopped);
                if stale {
                    guard.subject = Some(Subject::new());
                    guard.connection = None;
                    guard.refs = 0;
                    guard.generation += 1;
                }
                guard.refs += 1;
                let subject = guard.subject.clone().unwrap_or_default();
                (subject, guard.generation, guard.refs == 1)
            };

            let weak = Arc::downgrade(&state);
            subscriber.subscription().add(move || {
                let Some(state) = weak.upgrade() else { return };
                let connection = {
                    let mut guard = lock(&state);
                    if guard.generation != generation {
                        return;
                    }
                    guard.refs = guard.refs.saturating_sub(1);
                    if guard.refs > 0 {
                        return;
                    }
                    guard.subject = None;
                    guard.connection.take()
                };
                if let Some(connection) = connection {
                    connection.unsubscribe();
                }
            });

            subject.stream().feed(subscriber);

            if connect {
                let connection = source.subscribe(SubjectObserver {
                    subject: subject.clone(),
                });
                let mut guard = lock(&state);
                if guard.generation == generation && guard.refs > 0 {
                    guard.connection = Some(connection);
                } else {
                    drop(guard);
                    connection.unsubscribe();
                }
            }
        })
    }
}

struct MapObserver<U, F> {
    downstream: Subscriber<U>,
    f: Arc<F>,
}

impl<T, U, F> Observer<T> for MapObserver<U, F>
where
    F: Fn(T) -> U + Send + Sync,
{
    fn next(&mut self, value: T) {
        let mapped = (self.f)(value);
        self.downstream.next(mapped);
    }

    fn error(&mut self, err: CepError) {
        self.downstream.error(err)
    }

    fn complete(&mut self) {
        self.downstream.complete()
    }
}

struct FilterObserver<T, P> {
    downstream: Subscriber<T>,
    predicate: Arc<P>,
}

impl<T, P> Observer<T> for FilterObserver<T, P>
where
    P: Fn(&T) -> bool + Send + Sync,
{
    fn next(&mut self, value: T) {
        if (self.predicate)(&value) {
            self.downstream.next(value);
        }
    }

    fn error(&mut self, err: CepError) {
        self.downstream.error(err)
    }

    fn complete(&mut self) {
        self.downstream.complete()
    }
}

enum Signal<T> {
    Next(T),
    Error(CepError),
    Complete,
}

/// `downstream` is checked out while a signal is being delivered; signals
/// arriving meanwhile are queued and drained by the delivering caller.
struct MergeState<T> {
    downstream: Option<Subscriber<T>>,
    queued: VecDeque<Signal<T>>,
    active: usize,
}

struct MergeObserver<T> {
    shared: Arc<Mutex<MergeState<T>>>,
}

impl<T: Send> MergeObserver<T> {
    fn deliver(&self, signal: Signal<T>) {
        let mut downstream = {
            let mut state = lock(&self.shared);
            match state.downstream.take() {
                Some(downstream) => downstream,
                None => {
                    state.queued.push_back(signal);
                    return;
                }
            }
        };
        let mut signal = signal;
        loop {
            match signal {
                Signal::Next(value) => downstream.next(value),
                Signal::Error(err) => downstream.error(err),
                Signal::Complete => downstream.complete(),
            }
            let mut state = lock(&self.shared);
            match state.queued.pop_front() {
                Some(queued) => signal = queued,
                None => {
                    state.downstream = Some(downstream);
                    return;
                }
            }
        }
    }
}

impl<T: Send> Observer<T> for MergeObserver<T> {
    fn next(&mut self, value: T) {
        self.deliver(Signal::Next(value))
    }

    fn error(&mut self, err: CepError) {
        self.deliver(Signal::Error(err))
    }

    fn complete(&mut self) {
        let finished = {
            let mut state = lock(&self.shared);
            state.active = state.active.saturating_sub(1);
            state.active == 0
        };
        if finished {
            self.deliver(Signal::Complete);
        }
    }
}

enum Terminal {
    Completed,
    Failed(CepError),
}

type SharedSubscriber<T> = Arc<Mutex<Subscriber<T>>>;

struct SubjectInner<T> {
    observers: Vec<(u64, SharedSubscriber<T>)>,
    next_id: u64,
    terminal: Option<Terminal>,
}

/// Hot multicast point: every current observer receives each value once.
///
/// Observers that arrive after a terminal signal receive only that signal.
pub struct Subject<T> {
    inner: Arc<Mutex<SubjectInner<T>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SubjectInner {
                observers: Vec::new(),
                next_id: 0,
                terminal: None,
            })),
        }
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self) -> Stream<T> {
        let inner = Arc::clone(&self.inner);
        Stream::new(move |mut subscriber: Subscriber<T>| {
            let mut guard = lock(&inner);
            if let Some(terminal) = &guard.terminal {
                let failure = match terminal {
                    Terminal::Completed => None,
                    Terminal::Failed(err) => Some(err.clone()),
                };
                drop(guard);
                match failure {
                    Some(err) => subscriber.error(err),
                    None => subscriber.complete(),
                }
                return;
            }
            let id = guard.next_id;
            guard.next_id += 1;
            let subscription = subscriber.subscription().clone();
            guard
                .observers
                .push((id, Arc::new(Mutex::new(subscriber))));
            drop(guard);

            let weak = Arc::downgrade(&inner);
            subscription.add(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).observers.retain(|(other, _)| *other != id);
                }
            });
        })
    }

    fn snapshot(&self) -> Vec<SharedSubscriber<T>> {
        let guard = lock(&self.inner);
        if guard.terminal.is_some() {
            return Vec::new();
        }
        guard.observers.iter().map(|(_, s)| Arc::clone(s)).collect()
    }

    fn terminate(&self, terminal: Terminal) -> Vec<SharedSubscriber<T>> {
        let mut guard = lock(&self.inner);
        if guard.terminal.is_some() {
            return Vec::new();
        }
        guard.terminal = Some(terminal);
        std::mem::take(&mut guard.observers)
            .into_iter()
            .map(|(_, s)| s)
            .collect()
    }

    pub fn next(&self, value: T) {
        for subscriber in self.snapshot() {
            lock(&subscriber).next(value.clone());
        }
    }

    pub fn error(&self, err: CepError) {
        for subscriber in self.terminate(Terminal::Failed(err.clone())) {
            lock(&subscriber).error(err.clone());
        }
    }

    pub fn complete(&self) {
        for subscriber in self.terminate(Terminal::Completed) {
            lock(&subscriber).complete();
        }
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.inner).terminal.is_some()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.inner).observers.len()
    }
}

struct SubjectObserver<T> {
    subject: Subject<T>,
}

impl<T: Clone + Send + 'static> Observer<T> for SubjectObserver<T> {
    fn next(&mut self, value: T) {
        self.subject.next(value)
    }

    fn error(&mut self, err: CepError) {
        self.subject.error(err)
    }

    fn complete(&mut self) {
        self.subject.complete()
    }
}

/// A published stream: subscribe any number of branches, then connect.
pub struct Connectable<T> {
    source: Stream<T>,
    subject: Subject<T>,
}

impl<T: Clone + Send + 'static> Connectable<T> {
    pub fn stream(&self) -> Stream<T> {
        self.subject.stream()
    }

    pub fn connect(&self) -> Subscription {
        self.source.subscribe(SubjectObserver {
            subject: self.subject.clone(),
        })
    }

    /// Connect as part of `parent`.
    pub fn connect_within(&self, parent: &Subscription) -> Subscription {
        self.source.subscribe_within(
            SubjectObserver {
                subject: self.subject.clone(),
            },
            parent,
        )
    }
}

struct ShareState<T> {
    subject: Option<Subject<T>>,
    connection: Option<Subscription>,
    refs: usize,
    generation: u64,
}

/// Everything a subscription observed
#[derive(Debug)]
pub struct Recorded<T> {
    pub values: Vec<T>,
    pub errors: Vec<CepError>,
    pub completed: bool,
}

/// Records every signal of the subscriptions it observes.
pub struct Collector<T> {
    inner: Arc<Mutex<Recorded<T>>>,
}

impl<T> Clone for Collector<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recorded {
                values: Vec::new(),
                errors: Vec::new(),
                completed: false,
            })),
        }
    }
}

impl<T: Send + 'static> Collector<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self) -> CollectorObserver<T> {
        CollectorObserver {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the values recorded so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut lock(&self.inner).values)
    }

    pub fn errors(&self) -> Vec<CepError> {
        lock(&self.inner).errors.clone()
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.inner).completed
    }
}

impl<T: Clone + Send + 'static> Collector<T> {
    pub fn values(&self) -> Vec<T> {
        lock(&self.inner).values.clone()
    }
}

pub struct CollectorObserver<T> {
    inner: Arc<Mutex<Recorded<T>>>,
}

impl<T: Send> Observer<T> for CollectorObserver<T> {
    fn next(&mut self, value: T) {
        lock(&self.inner).values.push(value)
    }

    fn error(&mut self, err: CepError) {
        lock(&self.inner).errors.push(err)
    }

    fn complete(&mut self) {
        lock(&self.inner).completed = true;
    }
}
