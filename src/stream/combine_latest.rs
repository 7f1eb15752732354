// SPDX-License-Identifier: MIT OR Apache-2.0

//! N-ary combine-latest over fallible streams.
//!
//! [`combine_latest`] merges any number of independently advancing streams into
//! one stream of "latest value per source" tuples. A tuple is produced whenever
//! a source yields a value and every source has yielded at least once.
//!
//! # Session model
//!
//! All mutable state of one subscription lives in a `SessionState` behind a
//! single `parking_lot::Mutex`. Every event (downstream demand, a source value,
//! a source finishing or failing, cancellation) is handled by a synchronous
//! method that only updates the state and returns an action value. The caller
//! drops the guard first and then runs the action, which is where continuations
//! (`oneshot` senders) are resumed and tasks are aborted. Nothing is resumed
//! while the lock is held and every continuation is taken out of the state
//! before it is resumed, so none can be resumed twice.
//!
//! # Termination
//!
//! - The first source to finish ends the combined stream; the other sources
//!   are cancelled. A tuple that was already buffered for the consumer is
//!   still handed out on the next poll before the stream ends.
//! - A failing source ends the combined stream with exactly one
//!   `ConfigError::UpstreamFailure`.
//! - Dropping the combined stream aborts every pull task.
//!
//! Pull tasks run on the ambient tokio runtime.

use crate::domain::{ConfigError, Result};
use futures::stream::{BoxStream, FusedStream, Stream, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

/// What the downstream continuation receives: a tuple, a failure, or `None`
/// for end of stream.
type Delivery<T> = Option<Result<Vec<T>>>;
type DownstreamTx<T> = oneshot::Sender<Delivery<T>>;
type UpstreamTx = oneshot::Sender<()>;

/// A fallible source stream.
pub type SourceStream<T> = BoxStream<'static, Result<T>>;

/// Combines `sources` into a stream of latest-value tuples.
///
/// The returned stream yields `Vec<T>` with one slot per source, in source
/// order. Nothing is pulled from the sources until the combined stream is first
/// polled. With no sources the stream ends immediately.
///
/// # Examples
///
/// ```rust
/// use futures::stream::{self, StreamExt};
/// use stratacfg::stream::combine_latest;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let left = stream::iter(vec![Ok(1)]).chain(stream::pending()).boxed();
/// let right = stream::iter(vec![Ok(2)]).chain(stream::pending()).boxed();
///
/// let mut combined = combine_latest(vec![left, right]);
/// assert_eq!(combined.next().await.unwrap().unwrap(), vec![1, 2]);
/// # }
/// ```
pub fn combine_latest<T>(sources: Vec<SourceStream<T>>) -> CombineLatest<T>
where
    T: Clone + Send + 'static,
{
    CombineLatest::new(sources)
}

/// Stream returned by [`combine_latest`].
pub struct CombineLatest<T> {
    session: Arc<Session<T>>,
    sources: Option<Vec<SourceStream<T>>>,
    pending: Option<oneshot::Receiver<Delivery<T>>>,
    terminated: bool,
}

impl<T> CombineLatest<T>
where
    T: Clone + Send + 'static,
{
    /// Creates the combined stream. See [`combine_latest`].
    pub fn new(sources: Vec<SourceStream<T>>) -> Self {
        Self {
            session: Arc::new(Session::new(sources.len())),
            sources: Some(sources),
            pending: None,
            terminated: false,
        }
    }

    /// Number of combined sources.
    pub fn source_count(&self) -> usize {
        self.session.state.lock().slots.len()
    }

    fn start_sources(&mut self) {
        let sources = self.sources.take().unwrap_or_default();
        let session = Arc::clone(&self.session);

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                let action = session.state.lock().start_failed(ConfigError::WatcherError {
                    message: "combine_latest requires a tokio runtime".to_string(),
                    source: Some(Box::new(e)),
                });
                action.run();
                return;
            }
        };

        tracing::trace!(sources = sources.len(), "starting combine_latest session");
        let task = handle.spawn(drive(sources, Arc::clone(&session)));
        let leftover = session.state.lock().task_started(task);
        if let Some(task) = leftover {
            // The session ended while the driver was being spawned.
            task.abort();
        }
    }
}

impl<T> Stream for CombineLatest<T>
where
    T: Clone + Send + 'static,
{
    type Item = Result<Vec<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.terminated {
            return Poll::Ready(None);
        }

        let receiver = match this.pending.take() {
            Some(receiver) => receiver,
            None => {
                let (tx, rx) = oneshot::channel();
                let action = this.session.state.lock().next(tx);
                match action {
                    DemandAction::StartSources => this.start_sources(),
                    other => other.run(),
                }
                rx
            }
        };
        let receiver = this.pending.insert(receiver);

        match Pin::new(receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Some(Ok(tuple)))) => {
                this.pending = None;
                Poll::Ready(Some(Ok(tuple)))
            }
            Poll::Ready(Ok(Some(Err(e)))) => {
                this.pending = None;
                this.terminated = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Ok(None)) | Poll::Ready(Err(_)) => {
                this.pending = None;
                this.terminated = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T> FusedStream for CombineLatest<T>
where
    T: Clone + Send + 'static,
{
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<T> Drop for CombineLatest<T> {
    fn drop(&mut self) {
        let action = self.session.state.lock().cancel();
        action.run();
    }
}

struct Session<T> {
    state: Mutex<SessionState<T>>,
}

impl<T> Session<T> {
    fn new(sources: usize) -> Self {
        Self {
            state: Mutex::new(SessionState::new(sources)),
        }
    }
}

/// Background task: owns one pull task per source.
///
/// Aborting it drops the `JoinSet`, which aborts every pull task.
async fn drive<T>(sources: Vec<SourceStream<T>>, session: Arc<Session<T>>)
where
    T: Clone + Send + 'static,
{
    let mut pulls = JoinSet::new();
    for (index, source) in sources.into_iter().enumerate() {
        pulls.spawn(pull(index, source, Arc::clone(&session)));
    }
    while pulls.join_next().await.is_some() {}
}

/// Pulls one source until it ends, fails or the session releases it.
async fn pull<T>(index: usize, mut source: SourceStream<T>, session: Arc<Session<T>>)
where
    T: Clone + Send + 'static,
{
    loop {
        match source.next().await {
            Some(Ok(value)) => {
                let (demand_tx, demand_rx) = oneshot::channel();
                let action = session.state.lock().element_produced(index, value, demand_tx);
                action.run();
                if demand_rx.await.is_err() {
                    tracing::trace!(index, "combine_latest source released");
                    return;
                }
            }
            Some(Err(e)) => {
                let action = session.state.lock().upstream_failed(index, e);
                action.run();
                return;
            }
            None => {
                let action = session.state.lock().upstream_finished(index);
                action.run();
                return;
            }
        }
    }
}

struct Slot<T> {
    latest: Option<T>,
    parked: Option<UpstreamTx>,
}

enum Phase<T> {
    /// No demand yet; nothing has been pulled.
    Idle,
    /// Sources are being pulled.
    Running {
        task: Option<JoinHandle<()>>,
        downstream: Option<DownstreamTx<T>>,
        buffered: Option<Vec<T>>,
    },
    /// A failure waits for the next demand.
    Failed(ConfigError),
    /// Sources are gone; the last buffered tuple waits for the next demand.
    Draining(Vec<T>),
    Finished,
    Cancelled,
}

/// Per-subscription state of a combined stream.
pub(crate) struct SessionState<T> {
    phase: Phase<T>,
    slots: Vec<Slot<T>>,
}

/// Action for a downstream demand.
pub(crate) enum DemandAction<T> {
    /// First demand: the caller spawns the pull tasks.
    StartSources,
    /// Fulfil the demand now and re-arm parked sources.
    Deliver {
        downstream: DownstreamTx<T>,
        item: Delivery<T>,
        resume: Vec<UpstreamTx>,
    },
    /// The demand is stored until a source produces.
    Wait,
}

/// Action after a source produced a value.
pub(crate) enum ProducedAction<T> {
    /// Let the source pull again.
    Resume(UpstreamTx),
    /// Fulfil the pending demand and let the source pull again.
    DeliverAndResume {
        downstream: DownstreamTx<T>,
        tuple: Vec<T>,
        upstream: UpstreamTx,
    },
    /// The tuple is buffered; the source waits for the next demand.
    Park,
    /// The session is over; dropping the continuation releases the source.
    Discard(UpstreamTx),
}

/// Action after a terminal event.
pub(crate) enum TeardownAction<T> {
    /// Cancel everything and optionally signal the downstream.
    Teardown {
        task: Option<JoinHandle<()>>,
        upstreams: Vec<UpstreamTx>,
        downstream: Option<(DownstreamTx<T>, Delivery<T>)>,
    },
    Nothing,
}

impl<T> SessionState<T> {
    pub(crate) fn new(sources: usize) -> Self {
        Self {
            phase: Phase::Idle,
            slots: (0..sources)
                .map(|_| Slot {
                    latest: None,
                    parked: None,
                })
                .collect(),
        }
    }

    fn take_parked(&mut self) -> Vec<UpstreamTx> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.parked.take())
            .collect()
    }

    /// The downstream asks for the next tuple.
    pub(crate) fn next(&mut self, downstream: DownstreamTx<T>) -> DemandAction<T> {
        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Idle if self.slots.is_empty() => DemandAction::Deliver {
                downstream,
                item: None,
                resume: Vec::new(),
            },
            Phase::Idle => {
                self.phase = Phase::Running {
                    task: None,
                    downstream: Some(downstream),
                    buffered: None,
                };
                DemandAction::StartSources
            }
            Phase::Running {
                task,
                downstream: _,
                buffered: Some(tuple),
            } => {
                self.phase = Phase::Running {
                    task,
                    downstream: None,
                    buffered: None,
                };
                DemandAction::Deliver {
                    downstream,
                    item: Some(Ok(tuple)),
                    resume: self.take_parked(),
                }
            }
            Phase::Running {
                task,
                downstream: _,
                buffered: None,
            } => {
                self.phase = Phase::Running {
                    task,
                    downstream: Some(downstream),
                    buffered: None,
                };
                DemandAction::Wait
            }
            Phase::Failed(error) => DemandAction::Deliver {
                downstream,
                item: Some(Err(error)),
                resume: Vec::new(),
            },
            Phase::Draining(tuple) => DemandAction::Deliver {
                downstream,
                item: Some(Ok(tuple)),
                resume: Vec::new(),
            },
            phase @ (Phase::Finished | Phase::Cancelled) => {
                self.phase = phase;
                DemandAction::Deliver {
                    downstream,
                    item: None,
                    resume: Vec::new(),
                }
            }
        }
    }

    /// Records the driver task. Returns it back if the session already ended.
    pub(crate) fn task_started(&mut self, handle: JoinHandle<()>) -> Option<JoinHandle<()>> {
        match &mut self.phase {
            Phase::Running { task, .. } => {
                *task = Some(handle);
                None
            }
            _ => Some(handle),
        }
    }

    /// The pull tasks could not be started.
    pub(crate) fn start_failed(&mut self, error: ConfigError) -> TeardownAction<T> {
        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Running {
                task, downstream, ..
            } => TeardownAction::Teardown {
                task,
                upstreams: self.take_parked(),
                downstream: downstream.map(|d| (d, Some(Err(error)))),
            },
            phase => {
                self.phase = phase;
                TeardownAction::Nothing
            }
        }
    }

    /// Source `index` ended. The whole session ends with it.
    pub(crate) fn upstream_finished(&mut self, index: usize) -> TeardownAction<T> {
        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Running {
                task,
                downstream,
                buffered,
            } => {
                tracing::trace!(index, "combine_latest source finished");
                if let Some(tuple) = buffered {
                    // A buffered tuple implies nobody is waiting right now.
                    self.phase = Phase::Draining(tuple);
                }
                TeardownAction::Teardown {
                    task,
                    upstreams: self.take_parked(),
                    downstream: downstream.map(|d| (d, None)),
                }
            }
            phase => {
                self.phase = phase;
                TeardownAction::Nothing
            }
        }
    }

    /// Source `index` failed with `error`.
    pub(crate) fn upstream_failed(&mut self, index: usize, error: ConfigError) -> TeardownAction<T> {
        match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Running {
                task, downstream, ..
            } => {
                tracing::debug!(index, error = %error, "combine_latest source failed");
                let error = ConfigError::UpstreamFailure {
                    index,
                    source: Box::new(error),
                };
                let downstream = match downstream {
                    Some(d) => Some((d, Some(Err(error)))),
                    None => {
                        self.phase = Phase::Failed(error);
                        None
                    }
                };
                TeardownAction::Teardown {
                    task,
                    upstreams: self.take_parked(),
                    downstream,
                }
            }
            phase => {
                tracing::trace!(index, error = %error, "dropping failure of an ended session");
                self.phase = phase;
                TeardownAction::Nothing
            }
        }
    }

    /// The downstream consumer went away.
    pub(crate) fn cancel(&mut self) -> TeardownAction<T> {
        match mem::replace(&mut self.phase, Phase::Cancelled) {
            Phase::Running {
                task, downstream, ..
            } => TeardownAction::Teardown {
                task,
                upstreams: self.take_parked(),
                downstream: downstream.map(|d| (d, None)),
            },
            Phase::Finished => {
                self.phase = Phase::Finished;
                TeardownAction::Nothing
            }
            _ => TeardownAction::Nothing,
        }
    }

    #[cfg(test)]
    fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            Phase::Failed(_) | Phase::Draining(_) | Phase::Finished | Phase::Cancelled
        )
    }
}

impl<T: Clone> SessionState<T> {
    fn latest_tuple(&self) -> Option<Vec<T>> {
        self.slots.iter().map(|slot| slot.latest.clone()).collect()
    }

    /// Source `index` yielded `value`; `upstream` re-arms its next pull.
    pub(crate) fn element_produced(
        &mut self,
        index: usize,
        value: T,
        upstream: UpstreamTx,
    ) -> ProducedAction<T> {
        if !matches!(self.phase, Phase::Running { .. }) {
            return ProducedAction::Discard(upstream);
        }
        self.slots[index].latest = Some(value);

        let Some(tuple) = self.latest_tuple() else {
            return ProducedAction::Resume(upstream);
        };
        let Phase::Running {
            downstream,
            buffered,
            ..
        } = &mut self.phase
        else {
            return ProducedAction::Discard(upstream);
        };
        match downstream.take() {
            Some(downstream) => ProducedAction::DeliverAndResume {
                downstream,
                tuple,
                upstream,
            },
            None => {
                *buffered = Some(tuple);
                self.slots[index].parked = Some(upstream);
                ProducedAction::Park
            }
        }
    }
}

impl<T> DemandAction<T> {
    fn run(self) {
        match self {
            DemandAction::Deliver {
                downstream,
                item,
                resume,
            } => {
                for upstream in resume {
                    let _ = upstream.send(());
                }
                let _ = downstream.send(item);
            }
            DemandAction::StartSources | DemandAction::Wait => {}
        }
    }
}

impl<T> ProducedAction<T> {
    fn run(self) {
        match self {
            ProducedAction::Resume(upstream) => {
                let _ = upstream.send(());
            }
            ProducedAction::DeliverAndResume {
                downstream,
                tuple,
                upstream,
            } => {
                let _ = downstream.send(Some(Ok(tuple)));
                let _ = upstream.send(());
            }
            ProducedAction::Park => {}
            ProducedAction::Discard(upstream) => drop(upstream),
        }
    }
}

impl<T> TeardownAction<T> {
    fn run(self) {
        if let TeardownAction::Teardown {
            task,
            upstreams,
            downstream,
        } = self
        {
            if let Some(task) = task {
                task.abort();
            }
            drop(upstreams);
            if let Some((downstream, item)) = downstream {
                let _ = downstream.send(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn channel_source<T: Send + 'static>() -> (mpsc::UnboundedSender<Result<T>>, SourceStream<T>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed();
        (tx, source)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    /// Sets a flag when dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn flagged_pending(flag: Arc<AtomicBool>) -> SourceStream<u32> {
        let guard = DropFlag(flag);
        stream::poll_fn(move |_| {
            let _ = &guard;
            Poll::Pending
        })
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_after_every_source_produced() {
        let (a_tx, a) = channel_source::<u32>();
        let (b_tx, b) = channel_source::<u32>();
        let mut combined = combine_latest(vec![a, b]);

        a_tx.send(Ok(1)).unwrap();
        let next = tokio::spawn(async move {
            let first = combined.next().await;
            (first, combined)
        });
        settle().await;
        assert!(!next.is_finished());

        b_tx.send(Ok(10)).unwrap();
        let (first, _combined) = next.await.unwrap();
        assert_eq!(first.unwrap().unwrap(), vec![1, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_finished_source_ends_stream() {
        let (a_tx, a) = channel_source::<&'static str>();
        let (b_tx, b) = channel_source::<&'static str>();
        let mut combined = combine_latest(vec![a, b]);

        a_tx.send(Ok("1")).unwrap();
        a_tx.send(Ok("2")).unwrap();
        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(item) = combined.next().await {
                seen.push(item.unwrap());
            }
            seen
        });
        settle().await;

        b_tx.send(Ok("x")).unwrap();
        settle().await;
        drop(a_tx);

        let seen = consumer.await.unwrap();
        assert_eq!(seen, vec![vec!["2", "x"]]);
        settle().await;
        // The other source could still produce, but the session is gone.
        assert!(b_tx.send(Ok("y")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_delivered_once() {
        let (a_tx, a) = channel_source::<u32>();
        let b_flag = Arc::new(AtomicBool::new(false));
        let b = flagged_pending(Arc::clone(&b_flag));
        let mut combined = combine_latest(vec![a, b]);

        a_tx
            .send(Err(ConfigError::provider("a", "source deleted")))
            .unwrap();

        let item = combined.next().await.unwrap();
        assert!(matches!(
            item,
            Err(ConfigError::UpstreamFailure { index: 0, .. })
        ));
        assert!(combined.next().await.is_none());
        assert!(combined.is_terminated());

        settle().await;
        assert!(b_flag.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tuple_releases_sources() {
        let a_flag = Arc::new(AtomicBool::new(false));
        let b_flag = Arc::new(AtomicBool::new(false));
        let mut combined = combine_latest(vec![
            flagged_pending(Arc::clone(&a_flag)),
            flagged_pending(Arc::clone(&b_flag)),
        ]);

        let pending = tokio_test::task::spawn(async { combined.next().await }).poll();
        assert!(pending.is_pending());
        drop(combined);

        settle().await;
        assert!(a_flag.load(Ordering::SeqCst));
        assert!(b_flag.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_sees_latest_tuple() {
        let (a_tx, a) = channel_source::<u32>();
        let (b_tx, b) = channel_source::<u32>();
        let mut combined = combine_latest(vec![a, b]);

        a_tx.send(Ok(1)).unwrap();
        b_tx.send(Ok(1)).unwrap();
        assert_eq!(combined.next().await.unwrap().unwrap(), vec![1, 1]);

        // No demand: b parks after its first new tuple, a keeps overwriting.
        b_tx.send(Ok(2)).unwrap();
        settle().await;
        a_tx.send(Ok(2)).unwrap();
        a_tx.send(Ok(3)).unwrap();
        settle().await;

        assert_eq!(combined.next().await.unwrap().unwrap(), vec![2, 2]);
        assert_eq!(combined.next().await.unwrap().unwrap(), vec![3, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_tuple_survives_source_finishing() {
        let (a_tx, a) = channel_source::<u32>();
        let (b_tx, b) = channel_source::<u32>();
        let mut combined = combine_latest(vec![a, b]);

        a_tx.send(Ok(1)).unwrap();
        b_tx.send(Ok(10)).unwrap();
        assert_eq!(combined.next().await.unwrap().unwrap(), vec![1, 10]);

        // Produced while nobody is asking, then the other source goes away.
        a_tx.send(Ok(2)).unwrap();
        settle().await;
        drop(b_tx);
        settle().await;

        let rest: Vec<_> = combined.map(|item| item.unwrap()).collect().await;
        assert_eq!(rest, vec![vec![2, 10]]);
        settle().await;
        assert!(a_tx.send(Ok(3)).is_err());
    }

    #[tokio::test]
    async fn test_no_sources_ends_immediately() {
        let mut combined = combine_latest::<u32>(Vec::new());
        assert!(combined.next().await.is_none());
        assert_eq!(combined.source_count(), 0);
    }

    #[test]
    fn test_without_runtime_reports_watcher_error() {
        let source = stream::iter(vec![Ok(1u32)]).boxed();
        let mut combined = combine_latest(vec![source]);
        let item = futures::executor::block_on(combined.next());
        assert!(matches!(item, Some(Err(ConfigError::WatcherError { .. }))));
        assert!(futures::executor::block_on(combined.next()).is_none());
    }

    // Model-based check of the state machine, driven without any runtime.

    #[derive(Clone, Debug)]
    enum Op {
        Demand,
        Produce(usize, u32),
        Finish(usize),
        Fail(usize),
        Cancel,
    }

    fn op_strategy(sources: usize) -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => Just(Op::Demand),
            6 => (0..sources, 0u32..100).prop_map(|(i, v)| Op::Produce(i, v)),
            1 => (0..sources).prop_map(Op::Finish),
            1 => (0..sources).prop_map(Op::Fail),
            1 => Just(Op::Cancel),
        ]
    }

    struct Harness {
        state: SessionState<u32>,
        started: bool,
        downstream: Option<oneshot::Receiver<Delivery<u32>>>,
        upstreams: Vec<Option<oneshot::Receiver<()>>>,
        released: Vec<bool>,
        deliveries: Vec<Delivery<u32>>,
    }

    impl Harness {
        fn new(sources: usize) -> Self {
            Self {
                state: SessionState::new(sources),
                started: false,
                downstream: None,
                upstreams: (0..sources).map(|_| None).collect(),
                released: vec![false; sources],
                deliveries: Vec::new(),
            }
        }

        /// Collects resolved continuations.
        fn poll_channels(&mut self) {
            if let Some(rx) = self.downstream.as_mut() {
                match rx.try_recv() {
                    Ok(item) => {
                        self.deliveries.push(item);
                        self.downstream = None;
                    }
                    Err(oneshot::error::TryRecvError::Closed) => {
                        self.deliveries.push(None);
                        self.downstream = None;
                    }
                    Err(oneshot::error::TryRecvError::Empty) => {}
                }
            }
            for (i, slot) in self.upstreams.iter_mut().enumerate() {
                if let Some(rx) = slot.as_mut() {
                    match rx.try_recv() {
                        Ok(()) => *slot = None,
                        Err(oneshot::error::TryRecvError::Closed) => {
                            *slot = None;
                            self.released[i] = true;
                        }
                        Err(oneshot::error::TryRecvError::Empty) => {}
                    }
                }
            }
        }

        fn source_can_pull(&self, i: usize) -> bool {
            self.started && !self.released[i] && self.upstreams[i].is_none()
        }
    }

    fn terminal_count(deliveries: &[Delivery<u32>]) -> usize {
        deliveries
            .iter()
            .filter(|d| matches!(d, None | Some(Err(_))))
            .count()
    }

    proptest! {
        #[test]
        fn test_session_matches_reference_model(
            sources in 1usize..4,
            ops in prop::collection::vec(op_strategy(3), 0..60),
        ) {
            let mut h = Harness::new(sources);
            let mut model_latest: Vec<Option<u32>> = vec![None; sources];
            let mut model_buffered: Option<Vec<u32>> = None;
            let mut ended = false;

            for op in ops {
                match op {
                    Op::Demand => {
                        if h.downstream.is_some() || ended {
                            continue;
                        }
                        let before = h.deliveries.len();
                        let (tx, rx) = oneshot::channel();
                        h.downstream = Some(rx);
                        match h.state.next(tx) {
                            DemandAction::StartSources => h.started = true,
                            other => other.run(),
                        }
                        h.poll_channels();
                        if h.deliveries.len() > before {
                            if let Some(Some(Ok(tuple))) = h.deliveries.last() {
                                let expected = model_buffered.take();
                                prop_assert_eq!(Some(tuple.clone()), expected);
                            }
                        }
                    }
                    Op::Produce(i, v) => {
                        if i >= sources || !h.source_can_pull(i) || h.state.is_terminal() {
                            continue;
                        }
                        let before = h.deliveries.len();
                        model_latest[i] = Some(v);
                        let (tx, rx) = oneshot::channel();
                        h.upstreams[i] = Some(rx);
                        h.state.element_produced(i, v, tx).run();
                        h.poll_channels();

                        let full: Option<Vec<u32>> = model_latest.iter().copied().collect();
                        if h.deliveries.len() > before {
                            match h.deliveries.last() {
                                Some(Some(Ok(tuple))) => {
                                    prop_assert_eq!(Some(tuple.clone()), full);
                                }
                                other => prop_assert!(false, "unexpected delivery {:?}", other),
                            }
                            // The producing source keeps pulling.
                            prop_assert!(h.upstreams[i].is_none());
                        } else if let Some(full) = full {
                            model_buffered = Some(full);
                            prop_assert!(h.upstreams[i].is_some(), "source must park");
                        } else {
                            prop_assert!(h.upstreams[i].is_none(), "source must keep pulling");
                        }
                    }
                    Op::Finish(i) | Op::Fail(i) => {
                        if i >= sources || !h.source_can_pull(i) || h.state.is_terminal() {
                            continue;
                        }
                        let failing = matches!(op, Op::Fail(_));
                        let action = if failing {
                            h.state.upstream_failed(i, ConfigError::provider("p", "boom"))
                        } else {
                            h.state.upstream_finished(i)
                        };
                        action.run();
                        h.released[i] = true;
                        ended = true;
                        if failing {
                            model_buffered = None;
                        }
                        h.poll_channels();
                        // Every parked source has been released.
                        prop_assert!(h.upstreams.iter().all(Option::is_none));
                    }
                    Op::Cancel => {
                        h.state.cancel().run();
                        ended = true;
                        model_buffered = None;
                        h.poll_channels();
                        prop_assert!(h.upstreams.iter().all(Option::is_none));
                        break;
                    }
                }
                prop_assert!(terminal_count(&h.deliveries) <= 1);
            }

            // Drain: after the end, demands yield the tuple still buffered
            // when a source finished, or the one pending failure, then only
            // end-of-stream.
            if ended {
                let expected = model_buffered.take();
                let before = h.deliveries.len();
                for _ in 0..2 {
                    if h.downstream.is_some() {
                        break;
                    }
                    let (tx, rx) = oneshot::channel();
                    h.downstream = Some(rx);
                    h.state.next(tx).run();
                    h.poll_channels();
                }
                if let Some(tuple) = expected {
                    prop_assert!(
                        matches!(h.deliveries.get(before), Some(Some(Ok(t))) if *t == tuple),
                        "buffered tuple lost on finish"
                    );
                }
            }
            let first_terminal = h
                .deliveries
                .iter()
                .position(|d| matches!(d, None | Some(Err(_))));
            if let Some(pos) = first_terminal {
                let after = &h.deliveries[pos + 1..];
                prop_assert!(after.iter().all(|d| d.is_none()));
            }
            let failures = h.deliveries.iter().filter(|d| matches!(d, Some(Err(_)))).count();
            prop_assert!(failures <= 1);
        }
    }
}
