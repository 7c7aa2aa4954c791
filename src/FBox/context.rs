use std::sync::Arc;

use crate::error::{FboxError, Result};
use crate::Core::addr::AddressTranslator;
use crate::Core::alloc::{FboxPool, PeerCredits};
use crate::FBox::builder::FboxConfig;
use crate::FBox::dispatch::{Delivery, DispatchTable, EndpointId, GenericPath};
use crate::FBox::endpoint::Endpoint;

/// All fast-box state of one process: configuration, its collaborators, the
/// endpoint table and the tag table. Send and poll operations hang off this
/// (see `producer.rs` and `consumer.rs`).
pub struct FboxContext {
    pub(crate) config: FboxConfig,
    pub(crate) pool: Arc<dyn FboxPool>,
    pub(crate) translator: Arc<dyn AddressTranslator>,
    pub(crate) generic: Arc<dyn GenericPath>,
    pub(crate) table: DispatchTable,
    pub(crate) endpoints: Vec<Endpoint>,
    /// Endpoints with an inbound fast box, in the order they were mapped.
    pub(crate) fbox_in_endpoints: Vec<EndpointId>,
}

impl FboxContext {
    pub fn new(
        config: FboxConfig,
        pool: Arc<dyn FboxPool>,
        translator: Arc<dyn AddressTranslator>,
        generic: Arc<dyn GenericPath>,
    ) -> Result<Self> {
        config.validate()?;
        if pool.block_size() < config.fbox_size {
            return Err(FboxError::InvalidConfig(format!(
                "pool blocks of {} bytes cannot hold a {} byte fast box",
                pool.block_size(),
                config.fbox_size
            )));
        }

        Ok(Self {
            config,
            pool,
            translator,
            generic,
            table: DispatchTable::new(),
            endpoints: Vec::new(),
            fbox_in_endpoints: Vec::new(),
        })
    }

    pub fn config(&self) -> &FboxConfig {
        &self.config
    }

    /// Credit counter for a peer that accepts up to `fbox_max` fast boxes.
    /// Share the returned `Arc` between all endpoints towards that peer.
    pub fn new_peer_credits(&self) -> Arc<PeerCredits> {
        Arc::new(PeerCredits::new(self.config.fbox_max))
    }

    /// Register a peer. `credits` is the peer's count of fast boxes it still
    /// accepts; every endpoint towards the same peer shares it.
    pub fn add_endpoint(&mut self, credits: Arc<PeerCredits>) -> EndpointId {
        let id = EndpointId(self.endpoints.len());
        self.endpoints
            .push(Endpoint::new(id, credits, self.config.fbox_threshold));
        id
    }

    pub fn register_handler<F>(&mut self, tag: u16, handler: F) -> Result<()>
    where
        F: Fn(&Delivery<'_>) + Send + Sync + 'static,
    {
        self.table.register(tag, handler)
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn endpoint(&self, id: EndpointId) -> Result<&Endpoint> {
        self.endpoints
            .get(id.0)
            .ok_or(FboxError::UnknownEndpoint(id.0))
    }

    pub(crate) fn endpoint_mut(&mut self, id: EndpointId) -> Result<&mut Endpoint> {
        self.endpoints
            .get_mut(id.0)
            .ok_or(FboxError::UnknownEndpoint(id.0))
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Endpoints polled by `poll`.
    pub fn fbox_in_endpoints(&self) -> &[EndpointId] {
        &self.fbox_in_endpoints
    }
}

impl std::fmt::Debug for FboxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_fbox_context(self, f)
    }
}
