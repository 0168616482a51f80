use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::errors::Error;
use crate::telemetry::refresh::RefreshTelemetry;
use crate::token::{TokenMeta, TokenStore};

use super::TokenRefresher;

type Waiter = oneshot::Sender<Result<RefreshedToken, Arc<Error>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

/// Credentials handed to every waiter once an exchange succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub token_type: String,
    pub access_token: String,
}

impl RefreshedToken {
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<Waiter>,
    telemetry: Option<RefreshTelemetry>,
}

struct Inner {
    state: Mutex<RefreshState>,
    store: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
}

/// Ensures at most one refresh exchange is in flight and fans its result out to
/// every request that hit a 401 meanwhile.
///
/// The exchange runs on its own task, so cancelling the request that started it
/// does not strand the others. Waiters are settled in arrival order, each exactly once.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::default()),
                store,
                refresher,
            }),
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        if self.inner.lock_state().refreshing {
            RefreshPhase::Refreshing
        } else {
            RefreshPhase::Idle
        }
    }

    pub fn queued(&self) -> usize {
        self.inner.lock_state().waiters.len()
    }

    /// Waits for fresh credentials, starting the exchange if none is running.
    ///
    /// A failed exchange clears the token store and surfaces as
    /// [`Error::Unauthenticated`] to every waiter.
    pub async fn refresh(&self) -> Result<RefreshedToken, Error> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut state = self.inner.lock_state();
            state.waiters.push_back(tx);
            if state.refreshing {
                if let Some(telemetry) = &state.telemetry {
                    telemetry.emit_queued(state.waiters.len());
                }
                None
            } else {
                let telemetry = RefreshTelemetry::new("access_token");
                state.refreshing = true;
                state.telemetry = Some(telemetry.clone());
                Some(telemetry)
            }
        };

        if let Some(telemetry) = start {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_exchange(telemetry).await });
        }

        match rx.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(cause)) => Err(Error::Unauthenticated(cause)),
            Err(_) => Err(Error::Unauthenticated(Arc::new(Error::Network(
                "refresh task ended without settling".into(),
            )))),
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_exchange(&self, telemetry: RefreshTelemetry) {
        telemetry.emit_start(SystemTime::now());
        let started = Instant::now();

        let result = self.exchange().await;
        if result.is_err() {
            // failures are already logged by the store
            let _ = self.store.clear().await;
        }

        let waiters = {
            let mut state = self.lock_state();
            state.refreshing = false;
            state.telemetry = None;
            std::mem::take(&mut state.waiters)
        };
        match &result {
            Ok(_) => telemetry.emit_success(waiters.len(), started.elapsed()),
            Err(err) => telemetry.emit_failure(err, waiters.len()),
        }

        let shared = result.map_err(Arc::new);
        for waiter in waiters {
            // a waiter whose request was cancelled has dropped its receiver
            let _ = waiter.send(shared.clone());
        }
    }

    async fn exchange(&self) -> Result<RefreshedToken, Error> {
        let refresh_token = self
            .store
            .refresh_token()
            .await
            .ok_or(Error::MissingRefreshToken)?;
        let resp = self.refresher.exchange(&refresh_token).await?;
        let meta = TokenMeta::from_response(&resp)?;
        let token = RefreshedToken {
            token_type: meta.token_type.clone(),
            access_token: resp.access_token.clone(),
        };
        let next_refresh = resp.refresh_token.unwrap_or(refresh_token);
        // the in-memory record is updated even if persisting fails
        let _ = self
            .store
            .set_tokens(resp.access_token, next_refresh, meta)
            .await;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::types::TokenResponse;

    struct CountingRefresher {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingRefresher {
        fn new(delay: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail,
            })
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn exchange(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(Error::Business {
                    code: 401,
                    message: format!("refresh token {refresh_token} revoked"),
                });
            }
            Ok(TokenResponse {
                access_token: format!("access-{n}"),
                refresh_token: Some(format!("refresh-{n}")),
                token_type: "Bearer".into(),
                expires: None,
                refresh_expires: None,
            })
        }
    }

    async fn store_with_tokens() -> Arc<TokenStore> {
        let store = Arc::new(TokenStore::in_memory());
        store
            .set_tokens("expired", "refresh-0", TokenMeta::default())
            .await
            .unwrap();
        store
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_exchange() {
        let store = store_with_tokens().await;
        let refresher = CountingRefresher::new(Duration::from_millis(100), false);
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move { coordinator.refresh().await }));
        }
        for handle in handles {
            let token = handle.await.unwrap().expect("refresh should succeed");
            assert_eq!(token.authorization(), "Bearer access-1");
        }

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
        assert_eq!(coordinator.queued(), 0);
        assert_eq!(store.access_token().await.as_deref(), Some("access-1"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_exchange_rejects_every_waiter_and_clears_tokens() {
        let store = store_with_tokens().await;
        let refresher = CountingRefresher::new(Duration::from_millis(50), true);
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        let (a, b, c) = tokio::join!(
            coordinator.refresh(),
            coordinator.refresh(),
            coordinator.refresh()
        );
        for result in [a, b, c] {
            match result {
                Err(Error::Unauthenticated(cause)) => {
                    assert!(matches!(cause.as_ref(), Error::Business { code: 401, .. }))
                }
                other => panic!("expected unauthenticated, got {:?}", other),
            }
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.snapshot().await, None);
        assert_eq!(coordinator.phase(), RefreshPhase::Idle);
    }

    #[tokio::test]
    async fn missing_refresh_token_fails_without_calling_server() {
        let store = Arc::new(TokenStore::in_memory());
        let refresher = CountingRefresher::new(Duration::ZERO, false);
        let coordinator = RefreshCoordinator::new(store, refresher.clone());

        let err = coordinator.refresh().await.expect_err("no refresh token");
        match err {
            Error::Unauthenticated(cause) => {
                assert!(matches!(cause.as_ref(), Error::MissingRefreshToken))
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn next_401_after_settling_starts_a_new_exchange() {
        let store = store_with_tokens().await;
        let refresher = CountingRefresher::new(Duration::from_millis(10), false);
        let coordinator = RefreshCoordinator::new(store, refresher.clone());

        coordinator.refresh().await.unwrap();
        let second = coordinator.refresh().await.unwrap();
        assert_eq!(second.access_token, "access-2");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }
}
