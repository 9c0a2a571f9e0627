//! JSON-RPC API handlers for the daemon.

use std::sync::Arc;

use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::{ErrorCode, ErrorObject};
use release_radar_core::{
    RadarContext, RunReport, SyncError, SyncService, TokenManager, TokenScope,
};
use tracing::{debug, info};

use super::types::StatusResponse;

/// Error code returned by `sync_now` while another run is in progress.
pub const ALREADY_RUNNING_CODE: i32 = -32001;

/// State shared across RPC handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Guarded sync pipeline, shared with the scheduler
    pub sync: Arc<SyncService>,
    /// Token manager, for slot status only
    pub tokens: Arc<dyn TokenManager>,
}

impl ApiState {
    pub fn new(sync: Arc<SyncService>, tokens: Arc<dyn TokenManager>) -> Self {
        Self { sync, tokens }
    }

    pub fn from_context(context: &RadarContext) -> Self {
        Self::new(context.sync.clone(), context.tokens.clone())
    }
}

/// JSON-RPC API trait definition.
#[rpc(server)]
pub trait RadarApi {
    /// Run the sync pipeline now and wait for it to finish.
    ///
    /// # Returns
    ///
    /// The report of the run. Fails with code -32001 if a run is already in
    /// progress.
    #[method(name = "sync_now")]
    async fn sync_now(&self) -> RpcResult<RunReport>;

    /// Report of the most recent completed run, if any.
    #[method(name = "last_run")]
    async fn last_run(&self) -> RpcResult<Option<RunReport>>;

    /// Run state, credential slots and the last report.
    #[method(name = "status")]
    async fn status(&self) -> RpcResult<StatusResponse>;
}

/// Implementation of the Release Radar API.
pub struct RadarApiImpl {
    state: ApiState,
}

impl RadarApiImpl {
    /// Create a new API implementation with the given state.
    pub fn new(state: ApiState) -> Self {
        Self { state }
    }
}

#[async_trait::async_trait]
impl RadarApiServer for RadarApiImpl {
    async fn sync_now(&self) -> RpcResult<RunReport> {
        info!("RPC: sync_now");

        match self.state.sync.run().await {
            Ok(report) => Ok(report),
            Err(SyncError::AlreadyRunning) => Err(ErrorObject::owned(
                ALREADY_RUNNING_CODE,
                "A sync run is already in progress",
                None::<()>,
            )),
            Err(e) => Err(internal_error(e)),
        }
    }

    async fn last_run(&self) -> RpcResult<Option<RunReport>> {
        debug!("RPC: last_run");
        Ok(self.state.sync.last_report().await)
    }

    async fn status(&self) -> RpcResult<StatusResponse> {
        debug!("RPC: status");

        Ok(StatusResponse {
            running: self.state.sync.is_running(),
            service: self.state.tokens.slot_status(TokenScope::Service).await,
            user: self.state.tokens.slot_status(TokenScope::User).await,
            last_run: self.state.sync.last_report().await,
        })
    }
}

pub(crate) fn internal_error<E: std::fmt::Display>(err: E) -> ErrorObject<'static> {
    ErrorObject::owned(
        ErrorCode::InternalError.code(),
        format!("{}", err),
        None::<()>,
    )
}
