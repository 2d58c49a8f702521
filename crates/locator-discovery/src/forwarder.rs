// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwards directory lookups to the discovered directory service.

use crate::coordinator::DiscoveryCoordinator;
use crate::directory::{
    DirectoryInvoker, DirectoryRequest, DirectoryResponse, NullDirectoryService,
};
use crate::error::{ForwardError, ForwardResult};
use crate::handle::{DirectoryTarget, Identity};
use crate::transport::LookupTransport;
use tracing::debug;

/// Attempts per forwarded request: the first, plus one retry after invalidation.
const MAX_ATTEMPTS: u32 = 2;

/// Serves directory requests addressed to a published identity by forwarding
/// them to whatever directory service the coordinator resolves.
pub struct RequestForwarder<T, I> {
    identity: Identity,
    coordinator: DiscoveryCoordinator<T>,
    invoker: I,
    null: NullDirectoryService,
}

impl<T: LookupTransport, I: DirectoryInvoker> RequestForwarder<T, I> {
    pub fn new(identity: Identity, coordinator: DiscoveryCoordinator<T>, invoker: I) -> Self {
        Self {
            identity,
            coordinator,
            invoker,
            null: NullDirectoryService,
        }
    }

    /// Identity requests must be addressed to.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn coordinator(&self) -> &DiscoveryCoordinator<T> {
        &self.coordinator
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Forward `request`, addressed to `target`, to the resolved directory service.
    ///
    /// Unreachable-class failures are answered with [`DirectoryResponse::NotFound`].
    /// Any other failure invalidates the handle that failed and the request is
    /// retried once against a freshly resolved target.
    pub async fn forward(
        &self,
        target: &Identity,
        request: &DirectoryRequest,
    ) -> ForwardResult<DirectoryResponse> {
        if *target != self.identity {
            return Err(ForwardError::ObjectNotExist(target.clone()));
        }

        let mut attempt = 1;
        loop {
            let handle = match self.coordinator.resolve().await {
                DirectoryTarget::Null => return Ok(self.null.dispatch(request)),
                DirectoryTarget::Service(handle) => handle,
            };

            let error = match self.invoker.invoke(&handle, request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_unreachable() => {
                    debug!(
                        "{} on {} unreachable ({}), answering not found",
                        request.operation(),
                        handle.identity(),
                        e
                    );
                    return Ok(DirectoryResponse::NotFound);
                }
                Err(e) => e,
            };

            self.coordinator.invalidate(&handle);
            if attempt >= MAX_ATTEMPTS {
                return Err(error.into());
            }
            debug!(
                "{} on {} failed ({}), retrying with a fresh directory service",
                request.operation(),
                handle.identity(),
                error
            );
            attempt += 1;
        }
    }
}

