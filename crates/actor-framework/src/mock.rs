//! # Mock Clients
//!
//! Two ways to stand in for a `ResourceActor` in tests:
//!
//! - [`MockClient`]: queue expectations up front (`expect_get(id).return_ok(..)`)
//!   and answer requests in order. Best for injecting failures that are hard to
//!   provoke with a real actor, such as `FrameworkError::Timeout`.
//! - [`create_mock_client`] plus [`expect_action`] / [`expect_get`]: receive the
//!   raw requests yourself and assert on their payloads before responding.
//!
//! ```rust
//! use actor_framework::mock::MockClient;
//! use actor_framework::{ActorEntity, FrameworkError};
//! use async_trait::async_trait;
//!
//! #[derive(Clone, Debug)] struct Seat { id: u32 }
//! #[derive(Debug)] struct NewSeat;
//! #[derive(Debug)] struct SeatUpdate;
//! #[derive(Debug)] enum SeatAction {}
//! #[derive(Debug, thiserror::Error)] #[error("seat")] struct SeatError;
//!
//! #[async_trait]
//! impl ActorEntity for Seat {
//!     type Id = u32; type Create = NewSeat; type Update = SeatUpdate;
//!     type Action = SeatAction; type ActionResult = (); type Context = (); type Error = SeatError;
//!     fn from_create_params(id: u32, _: NewSeat) -> Result<Self, Self::Error> { Ok(Self { id }) }
//!     async fn on_update(&mut self, _: SeatUpdate, _: &()) -> Result<(), Self::Error> { Ok(()) }
//!     async fn handle_action(&mut self, _: SeatAction, _: &()) -> Result<(), Self::Error> { Ok(()) }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockClient::<Seat>::new();
//!     mock.expect_get(1).return_err(FrameworkError::ActorClosed);
//!
//!     let result = mock.client().get(1).await;
//!     assert!(matches!(result, Err(FrameworkError::ActorClosed)));
//!     mock.verify();
//! }
//! ```

use crate::client::ResourceClient;
use crate::entity::ActorEntity;
use crate::error::FrameworkError;
use crate::message::{ResourceRequest, Response};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

enum Expectation<T: ActorEntity> {
    Get {
        id: T::Id,
        response: Result<Option<T>, FrameworkError>,
    },
    List {
        response: Result<Vec<T>, FrameworkError>,
    },
    Create {
        response: Result<T::Id, FrameworkError>,
    },
    Action {
        id: T::Id,
        response: Result<T::ActionResult, FrameworkError>,
    },
}

type Expectations<T> = Arc<Mutex<VecDeque<Expectation<T>>>>;

fn locked<T: ActorEntity>(exps: &Expectations<T>) -> MutexGuard<'_, VecDeque<Expectation<T>>> {
    exps.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock client answering requests from a queue of expectations.
///
/// Requests must arrive in the order the expectations were queued; a mismatch
/// (wrong kind or wrong id) panics the background task, which the caller sees
/// as `FrameworkError::ActorDropped`.
pub struct MockClient<T: ActorEntity> {
    client: ResourceClient<T>,
    expectations: Expectations<T>,
    _handle: tokio::task::JoinHandle<()>,
}

impl<T: ActorEntity> Default for MockClient<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ActorEntity> MockClient<T> {
    /// Creates a new mock client with no expectations.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<ResourceRequest<T>>(100);
        let expectations: Expectations<T> = Arc::new(Mutex::new(VecDeque::new()));
        let queue = expectations.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let expectation = locked(&queue).pop_front();

                match (request, expectation) {
                    (ResourceRequest::Get { id, respond_to }, Some(Expectation::Get { id: want, response })) => {
                        assert_eq!(id, want, "get for unexpected id");
                        let _ = respond_to.send(response);
                    }
                    (ResourceRequest::List { respond_to }, Some(Expectation::List { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (ResourceRequest::Create { respond_to, .. }, Some(Expectation::Create { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        ResourceRequest::Action { id, respond_to, .. },
                        Some(Expectation::Action { id: want, response }),
                    ) => {
                        assert_eq!(id, want, "action for unexpected id");
                        let _ = respond_to.send(response);
                    }
                    (request, _) => {
                        panic!("Unexpected request: {request:?}");
                    }
                }
            }
        });

        Self {
            client: ResourceClient::new(sender),
            expectations,
            _handle: handle,
        }
    }

    /// Returns the client for use in tests.
    pub fn client(&self) -> ResourceClient<T> {
        self.client.clone()
    }

    pub fn expect_get(&mut self, id: T::Id) -> ExpectationBuilder<T, Option<T>> {
        self.builder(move |response| Expectation::Get { id, response })
    }

    pub fn expect_list(&mut self) -> ExpectationBuilder<T, Vec<T>> {
        self.builder(|response| Expectation::List { response })
    }

    pub fn expect_create(&mut self) -> ExpectationBuilder<T, T::Id> {
        self.builder(|response| Expectation::Create { response })
    }

    pub fn expect_action(&mut self, id: T::Id) -> ExpectationBuilder<T, T::ActionResult> {
        self.builder(move |response| Expectation::Action { id, response })
    }

    /// Panics if any queued expectation was not consumed.
    pub fn verify(&self) {
        let remaining = locked(&self.expectations).len();
        if remaining != 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }

    fn builder<R>(
        &mut self,
        make: impl FnOnce(Result<R, FrameworkError>) -> Expectation<T> + Send + 'static,
    ) -> ExpectationBuilder<T, R> {
        ExpectationBuilder {
            make: Box::new(make),
            expectations: self.expectations.clone(),
        }
    }
}

/// Finishes an expectation with the response the mock should give.
pub struct ExpectationBuilder<T: ActorEntity, R> {
    make: Box<dyn FnOnce(Result<R, FrameworkError>) -> Expectation<T> + Send>,
    expectations: Expectations<T>,
}

impl<T: ActorEntity, R> ExpectationBuilder<T, R> {
    pub fn return_ok(self, value: R) {
        locked(&self.expectations).push_back((self.make)(Ok(value)));
    }

    pub fn return_err(self, error: FrameworkError) {
        locked(&self.expectations).push_back((self.make)(Err(error)));
    }
}

/// Creates a client whose requests land on a receiver the test controls.
pub fn create_mock_client<T: ActorEntity>(
    buffer_size: usize,
) -> (ResourceClient<T>, mpsc::Receiver<ResourceRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (ResourceClient::new(sender), receiver)
}

/// Next request, if it is a Get.
pub async fn expect_get<T: ActorEntity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::Id, Response<Option<T>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Get { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}

/// Next request, if it is an Action.
pub async fn expect_action<T: ActorEntity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::Id, T::Action, Response<T::ActionResult>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Action {
            id,
            action,
            respond_to,
        }) => Some((id, action, respond_to)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    struct Locker {
        id: u32,
        code: String,
    }

    #[derive(Debug)]
    struct NewLocker;

    #[derive(Debug)]
    enum LockerAction {
        Open(String),
    }

    #[derive(Debug, thiserror::Error)]
    #[error("wrong code")]
    struct WrongCode;

    #[async_trait]
    impl ActorEntity for Locker {
        type Id = u32;
        type Create = NewLocker;
        type Update = ();
        type Action = LockerAction;
        type ActionResult = bool;
        type Context = ();
        type Error = WrongCode;

        fn from_create_params(id: u32, _: NewLocker) -> Result<Self, Self::Error> {
            Ok(Self {
                id,
                code: "0000".into(),
            })
        }

        async fn on_update(&mut self, _: (), _: &()) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn handle_action(&mut self, action: LockerAction, _: &()) -> Result<bool, Self::Error> {
            match action {
                LockerAction::Open(code) if code == self.code => Ok(true),
                LockerAction::Open(_) => Err(WrongCode),
            }
        }
    }

    #[tokio::test]
    async fn raw_receiver_sees_action_payload() {
        let (client, mut receiver) = create_mock_client::<Locker>(4);
        let task = tokio::spawn(async move { client.perform_action(3, LockerAction::Open("1234".into())).await });

        let (id, action, respond_to) = expect_action(&mut receiver).await.expect("action request");
        assert_eq!(id, 3);
        assert!(matches!(action, LockerAction::Open(ref code) if code == "1234"));
        respond_to.send(Ok(true)).unwrap();

        assert!(task.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn queued_expectations_answer_in_order() {
        let mut mock = MockClient::<Locker>::new();
        mock.expect_create().return_ok(1);
        mock.expect_list().return_ok(vec![Locker { id: 1, code: "0000".into() }]);
        mock.expect_action(1).return_err(FrameworkError::Timeout(Duration::from_millis(5)));

        let client = mock.client();
        assert_eq!(client.create(NewLocker).await.unwrap(), 1);
        assert_eq!(client.list().await.unwrap().len(), 1);
        let err = client
            .perform_action(1, LockerAction::Open("0000".into()))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());

        mock.verify();
    }

    #[tokio::test]
    async fn mismatched_request_fails_the_caller() {
        let mut mock = MockClient::<Locker>::new();
        mock.expect_get(1).return_ok(None);

        let err = mock.client().list().await.unwrap_err();
        assert!(matches!(err, FrameworkError::ActorDropped));
    }
}
