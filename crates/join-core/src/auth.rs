//! Authentication state as an event stream.
//!
//! The authentication provider itself lives outside this crate; what the
//! dashboard consumes is a [`Stream`] of [`AuthState`] values plus a typed
//! [`Unsubscribe`] handle.

use std::cell::RefCell;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures::channel::mpsc;
use join_shared::SessionUser;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedIn(SessionUser),
    SignedOut,
}

impl AuthState {
    pub fn from_user(user: Option<SessionUser>) -> Self {
        match user {
            Some(user) => Self::SignedIn(user),
            None => Self::SignedOut,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::SignedIn(user) => Some(user),
            Self::SignedOut => None,
        }
    }
}

pub trait Authenticator {
    fn current_user(&self) -> Option<SessionUser>;

    /// The returned stream yields the current state first, then every change.
    fn subscribe(&self) -> AuthStream;
}

/// Runs its teardown exactly once, on [`Unsubscribe::unsubscribe`] or drop.
pub struct Unsubscribe {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Unsubscribe {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    pub fn noop() -> Self {
        Self { teardown: None }
    }

    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.run();
    }
}

pub struct AuthStream {
    receiver: mpsc::UnboundedReceiver<AuthState>,
    handle: Unsubscribe,
}

impl AuthStream {
    pub fn new(receiver: mpsc::UnboundedReceiver<AuthState>, handle: Unsubscribe) -> Self {
        Self { receiver, handle }
    }

    /// A stream that yields the given states and ends.
    pub fn from_states<I>(states: I) -> Self
    where
        I: IntoIterator<Item = AuthState>,
    {
        let (sender, receiver) = mpsc::unbounded();
        for state in states {
            let _ = sender.unbounded_send(state);
        }
        Self::new(receiver, Unsubscribe::noop())
    }

    /// Chains provider teardown (event listeners, SDK handles) after the
    /// existing one.
    pub fn on_unsubscribe(self, teardown: impl FnOnce() + 'static) -> Self {
        let Self { receiver, handle } = self;
        Self {
            receiver,
            handle: Unsubscribe::new(move || {
                handle.unsubscribe();
                teardown();
            }),
        }
    }

    /// Closes the channel, so the publisher sees the subscriber as gone, and
    /// runs the provider's teardown.
    pub fn unsubscribe(self) {
        let Self { mut receiver, handle } = self;
        receiver.close();
        handle.unsubscribe();
    }
}

impl Stream for AuthStream {
    type Item = AuthState;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().receiver).poll_next(cx)
    }
}

/// In-process fan-out of auth changes; the web session adapter and tests
/// publish into it.
#[derive(Default)]
pub struct AuthFeed {
    current: RefCell<Option<SessionUser>>,
    senders: RefCell<Vec<mpsc::UnboundedSender<AuthState>>>,
}

impl AuthFeed {
    pub fn new(current: Option<SessionUser>) -> Self {
        Self {
            current: RefCell::new(current),
            senders: RefCell::new(vec![]),
        }
    }

    pub fn publish(&self, user: Option<SessionUser>) {
        if *self.current.borrow() == user {
            return;
        }
        *self.current.borrow_mut() = user.clone();
        let state = AuthState::from_user(user);

        let mut senders = self.senders.borrow_mut();
        senders.retain(|sender| !sender.is_closed());
        for sender in senders.iter() {
            let _ = sender.unbounded_send(state.clone());
        }
        debug!(subscribers = senders.len(), signed_in = state.user().is_some(), "published auth change");
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.borrow().iter().filter(|sender| !sender.is_closed()).count()
    }
}

impl Authenticator for AuthFeed {
    fn current_user(&self) -> Option<SessionUser> {
        self.current.borrow().clone()
    }

    fn subscribe(&self) -> AuthStream {
        let (sender, receiver) = mpsc::unbounded();
        let _ = sender.unbounded_send(AuthState::from_user(self.current_user()));
        self.senders.borrow_mut().push(sender);
        AuthStream::new(receiver, Unsubscribe::noop())
    }
}
