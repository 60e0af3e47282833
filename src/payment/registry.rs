use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use tokio::sync::{RwLock, oneshot};

use crate::{
    gateway::{StkGateway, callback::CallbackResult},
    payment::{
        session::{PaymentAction, PaymentSession, TransitionError},
        view::PaymentView,
    },
};

/// How long a finished payment stays readable before it is evicted
pub const FINISHED_RETENTION: Duration = Duration::from_secs(30);
/// Payments without a final status are torn down after this long
pub const HOSTED_LIFETIME: Duration = Duration::from_secs(10 * 60);
/// Callbacks kept for checkouts that are not hosted yet
const UNCLAIMED_CALLBACKS: usize = 64;

#[derive(Default)]
struct Hosted {
    views: HashMap<String, PaymentView<dyn StkGateway>>,
    unclaimed: VecDeque<(String, CallbackResult)>,
}

/// Payment views hosted by the service, keyed by checkout request id
#[derive(Clone, Default)]
pub struct Payments {
    hosted: Arc<RwLock<Hosted>>,
}

impl std::fmt::Debug for Payments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payments").finish_non_exhaustive()
    }
}

impl Payments {
    /// Start hosting a submitted view.
    ///
    /// `finished` fires once the view reached a final status. The view is evicted
    /// [FINISHED_RETENTION] after that, or after [HOSTED_LIFETIME] if it never finishes.
    pub async fn host(
        &self,
        checkout_request_id: String,
        view: PaymentView<dyn StkGateway>,
        finished: oneshot::Receiver<()>,
    ) {
        self.insert(checkout_request_id.clone(), view).await;
        let payments = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                finished = finished => {
                    // Sender is dropped with the view, so it was removed already
                    if finished.is_err() {
                        return;
                    }
                    tokio::time::sleep(FINISHED_RETENTION).await;
                }
                _ = tokio::time::sleep(HOSTED_LIFETIME) => {
                    tracing::warn!(%checkout_request_id, "Payment expired without a final status");
                }
            }
            if payments.remove(&checkout_request_id).await {
                tracing::debug!(%checkout_request_id, "Evicted hosted payment");
            }
        });
    }

    /// Add a view and apply the callbacks that arrived for it before it was hosted
    pub async fn insert(&self, checkout_request_id: String, view: PaymentView<dyn StkGateway>) {
        let mut hosted = self.hosted.write().await;
        let (early, rest): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut hosted.unclaimed)
            .into_iter()
            .partition(|(id, _)| *id == checkout_request_id);
        hosted.unclaimed = rest;
        for (_, result) in early {
            if let Err(e) = view
                .session()
                .dispatch(PaymentAction::CallbackReceived(result))
            {
                tracing::warn!(%checkout_request_id, "Early callback was not applied: {e}");
            }
        }
        hosted.views.insert(checkout_request_id, view);
    }

    pub async fn snapshot(&self, checkout_request_id: &str) -> Option<PaymentSession> {
        self.hosted
            .read()
            .await
            .views
            .get(checkout_request_id)
            .map(|view| view.session().snapshot())
    }

    /// Tear down and forget a view
    pub async fn remove(&self, checkout_request_id: &str) -> bool {
        self.hosted
            .write()
            .await
            .views
            .remove(checkout_request_id)
            .is_some()
    }

    /// Apply a provider callback to its hosted view.
    ///
    /// Returns `None` when no view is hosted under that id; the callback is then kept until a
    /// view with that id is inserted.
    pub async fn record_callback(
        &self,
        checkout_request_id: &str,
        result: CallbackResult,
    ) -> Option<Result<(), TransitionError>> {
        let mut hosted = self.hosted.write().await;
        if let Some(view) = hosted.views.get(checkout_request_id) {
            return Some(
                view.session()
                    .dispatch(PaymentAction::CallbackReceived(result)),
            );
        }
        if hosted.unclaimed.len() >= UNCLAIMED_CALLBACKS {
            hosted.unclaimed.pop_front();
        }
        hosted
            .unclaimed
            .push_back((checkout_request_id.to_string(), result));
        None
    }

    pub async fn len(&self) -> usize {
        self.hosted.read().await.views.len()
    }
}
