// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory-service requests and the invocation boundary.
//!
//! The RPC runtime supplies a [`DirectoryInvoker`] that knows how to send a
//! [`DirectoryRequest`] to a [`DirectoryServiceHandle`]. [`NullDirectoryService`]
//! implements the same trait locally so the forwarder always has a target.

use crate::error::InvokeError;
use crate::handle::{DirectoryServiceHandle, Endpoint, Identity};
use std::future::Future;

/// A directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryRequest {
    FindObjectById(Identity),
    FindAdapterById(String),
    GetRegistry,
}

impl DirectoryRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::FindObjectById(_) => "findObjectById",
            Self::FindAdapterById(_) => "findAdapterById",
            Self::GetRegistry => "getRegistry",
        }
    }
}

/// Where a looked-up object or adapter lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub identity: Identity,
    pub adapter_id: Option<String>,
    pub endpoints: Vec<Endpoint>,
}

/// Outcome of a directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryResponse {
    Found(ObjectRecord),
    NotFound,
}

impl DirectoryResponse {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Sends directory requests to a remote directory service.
pub trait DirectoryInvoker: Send + Sync + 'static {
    /// Invoke `request` on the service behind `target`.
    fn invoke(
        &self,
        target: &DirectoryServiceHandle,
        request: &DirectoryRequest,
    ) -> impl Future<Output = Result<DirectoryResponse, InvokeError>> + Send;
}

/// Sentinel directory service: every lookup is answered "not found" without I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDirectoryService;

impl NullDirectoryService {
    pub fn dispatch(&self, _request: &DirectoryRequest) -> DirectoryResponse {
        DirectoryResponse::NotFound
    }

    pub fn find_object_by_id(&self, _id: &Identity) -> Option<ObjectRecord> {
        None
    }

    pub fn find_adapter_by_id(&self, _adapter_id: &str) -> Option<ObjectRecord> {
        None
    }

    pub fn get_registry(&self) -> Option<ObjectRecord> {
        None
    }
}

impl DirectoryInvoker for NullDirectoryService {
    fn invoke(
        &self,
        _target: &DirectoryServiceHandle,
        request: &DirectoryRequest,
    ) -> impl Future<Output = Result<DirectoryResponse, InvokeError>> + Send {
        let response = self.dispatch(request);
        async move { Ok(response) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ProtocolVersion;

    #[test]
    fn test_null_service_answers_not_found() {
        let null = NullDirectoryService;
        for request in [
            DirectoryRequest::FindObjectById(Identity::new("", "printer")),
            DirectoryRequest::FindAdapterById("PrinterAdapter".into()),
            DirectoryRequest::GetRegistry,
        ] {
            assert_eq!(null.dispatch(&request), DirectoryResponse::NotFound);
        }
        assert!(null.find_object_by_id(&Identity::new("", "x")).is_none());
        assert!(null.find_adapter_by_id("x").is_none());
        assert!(null.get_registry().is_none());
    }

    #[tokio::test]
    async fn test_null_service_as_invoker() {
        let handle =
            DirectoryServiceHandle::new(Identity::locator("A"), ProtocolVersion::CURRENT, vec![]);
        let response = NullDirectoryService
            .invoke(&handle, &DirectoryRequest::GetRegistry)
            .await
            .unwrap();
        assert!(!response.is_found());
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(DirectoryRequest::GetRegistry.operation(), "getRegistry");
        assert_eq!(
            DirectoryRequest::FindAdapterById("a".into()).operation(),
            "findAdapterById"
        );
    }
}
