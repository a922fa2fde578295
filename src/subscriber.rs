use parking_lot::Mutex;

use super::errors::{P2pError, Result};

type MessageHandler<M> = Box<dyn FnOnce(Result<M>) + Send>;
type StopHandler = Box<dyn FnOnce(P2pError) + Send>;

/// Fan-out registry for one message type, with terminal stop semantics.
///
/// Born stopped; [`start`](Self::start) arms it. Every handler ever accepted
/// is invoked exactly once: either by a [`relay`](Self::relay) or, once
/// stopped, immediately at subscription with the stored code. The queue is
/// always taken out of the lock before handlers run, so a handler may
/// re-subscribe without deadlocking and never observes the event it was
/// added during.
pub struct TypedSubscriber<M> {
    state: Mutex<State<M>>,
}

struct State<M> {
    stopped: Option<P2pError>,
    handlers: Vec<MessageHandler<M>>,
}

impl<M: Clone> TypedSubscriber<M> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                stopped: Some(P2pError::ChannelStopped),
                handlers: Vec::new(),
            }),
        }
    }

    /// Arm the subscriber so subscriptions enqueue instead of failing fast.
    pub fn start(&self) {
        self.state.lock().stopped = None;
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: FnOnce(Result<M>) + Send + 'static,
    {
        let mut state = self.state.lock();
        match state.stopped.clone() {
            Some(code) => {
                drop(state);
                handler(Err(code));
            }
            None => state.handlers.push(Box::new(handler)),
        }
    }

    /// Deliver `event` to every pending handler exactly once and clear the
    /// queue.
    pub fn relay(&self, event: Result<M>) {
        let handlers = std::mem::take(&mut self.state.lock().handlers);
        for handler in handlers {
            handler(event.clone());
        }
    }

    /// Refuse new subscriptions; late subscribers observe `code`
    /// immediately. The first stop code wins.
    pub fn stop(&self, code: P2pError) {
        let mut state = self.state.lock();
        if state.stopped.is_none() {
            state.stopped = Some(code);
        }
    }

    pub fn stopped(&self) -> bool {
        self.state.lock().stopped.is_some()
    }
}

impl<M: Clone> Default for TypedSubscriber<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-event fan-out used for channel-stop notification.
///
/// After the first [`relay`](Self::relay) the stored code is handed
/// synchronously to every later subscriber.
pub struct StopSubscriber {
    state: Mutex<StopState>,
}

struct StopState {
    stopped: Option<P2pError>,
    handlers: Vec<StopHandler>,
}

impl StopSubscriber {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StopState {
                stopped: Some(P2pError::ChannelStopped),
                handlers: Vec::new(),
            }),
        }
    }

    pub fn start(&self) {
        self.state.lock().stopped = None;
    }

    pub fn subscribe<F>(&self, handler: F)
    where
        F: FnOnce(P2pError) + Send + 'static,
    {
        let mut state = self.state.lock();
        match state.stopped.clone() {
            Some(code) => {
                drop(state);
                handler(code);
            }
            None => state.handlers.push(Box::new(handler)),
        }
    }

    /// Refuse new subscriptions. The first stop code wins.
    pub fn stop(&self, code: P2pError) {
        let mut state = self.state.lock();
        if state.stopped.is_none() {
            state.stopped = Some(code);
        }
    }

    /// Deliver the stop event to every pending handler and store the code
    /// for late subscribers.
    pub fn relay(&self, code: P2pError) {
        let handlers = {
            let mut state = self.state.lock();
            if state.stopped.is_none() {
                state.stopped = Some(code.clone());
            }
            std::mem::take(&mut state.handlers)
        };
        for handler in handlers {
            handler(code.clone());
        }
    }
}

impl Default for StopSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;

    #[test]
    fn test_subscribe_before_start_fails_fast() {
        let subscriber = TypedSubscriber::<u64>::new();
        let (tx, rx) = mpsc::channel();

        subscriber.subscribe(move |event| tx.send(event).unwrap());

        assert_eq!(rx.recv().unwrap(), Err(P2pError::ChannelStopped));
    }

    #[test]
    fn test_relay_invokes_every_pending_handler_once() {
        let subscriber = TypedSubscriber::<u64>::new();
        subscriber.start();

        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            subscriber.subscribe(move |event| {
                assert_eq!(event, Ok(42));
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        subscriber.relay(Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // The queue was cleared; nothing fires twice.
        subscriber.relay(Ok(43));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_handler_added_during_relay_waits_for_next_event() {
        let subscriber = Arc::new(TypedSubscriber::<u64>::new());
        subscriber.start();

        let (tx, rx) = mpsc::channel();
        let resubscriber = Arc::clone(&subscriber);
        subscriber.subscribe(move |_| {
            resubscriber.subscribe(move |event| tx.send(event).unwrap());
        });

        subscriber.relay(Ok(1));
        assert!(rx.try_recv().is_err());

        subscriber.relay(Ok(2));
        assert_eq!(rx.recv().unwrap(), Ok(2));
    }

    #[test]
    fn test_stop_delivers_code_to_late_subscribers() {
        let subscriber = TypedSubscriber::<u64>::new();
        subscriber.start();
        subscriber.stop(P2pError::ChannelStopped);

        let (tx, rx) = mpsc::channel();
        subscriber.subscribe(move |event| tx.send(event).unwrap());
        assert_eq!(rx.recv().unwrap(), Err(P2pError::ChannelStopped));
    }

    #[test]
    fn test_first_stop_code_wins() {
        let subscriber = TypedSubscriber::<u64>::new();
        subscriber.start();
        subscriber.stop(P2pError::ServiceStopped);
        subscriber.stop(P2pError::BadStream);

        let (tx, rx) = mpsc::channel();
        subscriber.subscribe(move |event| tx.send(event).unwrap());
        assert_eq!(rx.recv().unwrap(), Err(P2pError::ServiceStopped));
    }

    #[test]
    fn test_stop_subscriber_single_shot() {
        let subscriber = StopSubscriber::new();
        subscriber.start();

        let calls = Arc::new(AtomicUsize::new(0));
        let pending_calls = Arc::clone(&calls);
        subscriber.subscribe(move |code| {
            assert_eq!(code, P2pError::ServiceStopped);
            pending_calls.fetch_add(1, Ordering::SeqCst);
        });

        subscriber.stop(P2pError::ServiceStopped);
        subscriber.relay(P2pError::ServiceStopped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Relaying again has nothing left to notify.
        subscriber.relay(P2pError::ServiceStopped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A late subscriber observes the stored code immediately.
        let (tx, rx) = mpsc::channel();
        subscriber.subscribe(move |code| tx.send(code).unwrap());
        assert_eq!(rx.recv().unwrap(), P2pError::ServiceStopped);
    }
}
