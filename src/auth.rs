use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::request::TransportRequest;
use crate::response::TransportResponse;
use crate::transport::TransportSession;
use crate::Result;

/// An authentication credential owned by the interceptor.
pub trait AuthenticationCredential: Clone + Send + Sync + 'static {
    /// Whether the credential must be refreshed before it can be applied.
    fn requires_refresh(&self) -> bool;
}

/// Pluggable token mechanics behind [`AuthenticationInterceptor`].
///
/// Implementations decide how a credential decorates a request, how it is
/// refreshed against the transport session, and how an authentication failure
/// is recognized. Errors returned here propagate to the caller unchanged.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    type Credential: AuthenticationCredential;

    /// Applies the credential to the request, typically by setting an
    /// authorization header.
    async fn apply(
        &self,
        credential: &Self::Credential,
        request: &mut TransportRequest,
    ) -> Result<()>;

    /// Obtains a replacement credential.
    async fn refresh(
        &self,
        credential: &Self::Credential,
        session: &Arc<dyn TransportSession>,
    ) -> Result<Self::Credential>;

    /// Whether the request failed due to an authentication error.
    fn did_request_fail_due_to_auth(
        &self,
        request: &TransportRequest,
        response: &TransportResponse,
    ) -> bool;

    /// Whether the request was authenticated with this credential. Used to
    /// ignore failures from requests sent under an older credential.
    fn is_request_authenticated_with(
        &self,
        request: &TransportRequest,
        credential: &Self::Credential,
    ) -> bool;
}

/// Object-safe seam the processor holds, so it can drive any interceptor
/// without knowing the authenticator type.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Decorates an outgoing request with credentials, refreshing first when
    /// the stored credential demands it.
    async fn adapt(
        &self,
        request: &mut TransportRequest,
        session: &Arc<dyn TransportSession>,
    ) -> Result<()>;

    /// Whether the response indicates the credential must be refreshed.
    fn requires_refresh(&self, request: &TransportRequest, response: &TransportResponse) -> bool;

    /// Refreshes the stored credential in reaction to a failing response.
    async fn refresh(
        &self,
        request: &TransportRequest,
        response: &TransportResponse,
        session: &Arc<dyn TransportSession>,
    ) -> Result<()>;
}

/// Owns the single mutable credential and delegates token mechanics to a
/// pluggable [`Authenticator`].
///
/// The credential slot sits behind an async mutex held across the refresh
/// await: concurrent refreshes serialize, and no reader ever observes a
/// half-written credential.
pub struct AuthenticationInterceptor<A: Authenticator> {
    authenticator: A,
    credential: Mutex<Option<A::Credential>>,
}

impl<A: Authenticator> AuthenticationInterceptor<A> {
    pub fn new(authenticator: A, credential: Option<A::Credential>) -> Self {
        Self {
            authenticator,
            credential: Mutex::new(credential),
        }
    }

    /// The underlying authenticator.
    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    /// Replaces the stored credential.
    pub async fn set_credential(&self, credential: Option<A::Credential>) {
        *self.credential.lock().await = credential;
    }

    /// Snapshot of the stored credential.
    pub async fn credential(&self) -> Option<A::Credential> {
        self.credential.lock().await.clone()
    }
}

#[async_trait]
impl<A: Authenticator> RequestInterceptor for AuthenticationInterceptor<A> {
    async fn adapt(
        &self,
        request: &mut TransportRequest,
        session: &Arc<dyn TransportSession>,
    ) -> Result<()> {
        let mut slot = self.credential.lock().await;
        let credential = slot.clone().ok_or(Error::MissingCredential)?;

        let credential = if credential.requires_refresh() {
            debug!("credential requires refresh before use");
            let refreshed = self.authenticator.refresh(&credential, session).await?;
            *slot = Some(refreshed.clone());
            refreshed
        } else {
            credential
        };

        self.authenticator.apply(&credential, request).await
    }

    fn requires_refresh(&self, request: &TransportRequest, response: &TransportResponse) -> bool {
        self.authenticator
            .did_request_fail_due_to_auth(request, response)
    }

    async fn refresh(
        &self,
        request: &TransportRequest,
        response: &TransportResponse,
        session: &Arc<dyn TransportSession>,
    ) -> Result<()> {
        if !self.requires_refresh(request, response) {
            return Ok(());
        }

        let mut slot = self.credential.lock().await;
        let credential = slot.clone().ok_or(Error::MissingCredential)?;

        // A failure from a request signed with an older credential means a
        // refresh already happened; nothing to do.
        if !self
            .authenticator
            .is_request_authenticated_with(request, &credential)
        {
            return Ok(());
        }

        let refreshed = self.authenticator.refresh(&credential, session).await?;
        *slot = Some(refreshed);
        Ok(())
    }
}
