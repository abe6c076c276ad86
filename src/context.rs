//! Bundles every collaborator a phase or the orchestrator needs, so call
//! sites take one reference instead of threading six `Arc`s through every
//! signature.

use crate::agent_client::CodeAgentClient;
use crate::approval::ApprovalBroker;
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::eventbus::{ActivityArchive, EventBus};
use crate::observer::SecurityObserver;
use crate::store::DurableStore;
use crate::workspace::{CredentialVault, GitClient, WorkspaceCoordinator};
use std::sync::Arc;

pub struct OrchestrationContext<S, B, C, A, G, V>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    pub store: Arc<S>,
    pub bus: Arc<B>,
    pub clock: Arc<C>,
    pub agent: Arc<A>,
    pub approval: Arc<ApprovalBroker<S, B, C>>,
    pub observer: Arc<SecurityObserver<C>>,
    pub workspace: Arc<WorkspaceCoordinator<G, V>>,
    pub archive: Arc<ActivityArchive<B, S>>,
    pub config: CoreConfig,
}

impl<S, B, C, A, G, V> OrchestrationContext<S, B, C, A, G, V>
where
    S: DurableStore + 'static,
    B: EventBus + 'static,
    C: Clock + 'static,
    A: CodeAgentClient + 'static,
    G: GitClient + 'static,
    V: CredentialVault + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        bus: Arc<B>,
        clock: Arc<C>,
        agent: Arc<A>,
        workspace: Arc<WorkspaceCoordinator<G, V>>,
        config: CoreConfig,
    ) -> Arc<Self> {
        let approval = Arc::new(ApprovalBroker::new(store.clone(), bus.clone(), clock.clone()));
        let observer = Arc::new(SecurityObserver::new(
            clock.clone(),
            config.observer_loop_threshold,
            config.observer_loop_window_ms,
        ));
        let archive = ActivityArchive::new(bus.clone(), store.clone(), config.clone());
        Arc::new(Self { store, bus, clock, agent, approval, observer, workspace, archive, config })
    }
}
