#![allow(dead_code)]

use std::sync::Arc;

use uptime_application::{GroupService, NodeService, ServiceDependencies, TaskService};
use uptime_config::UptimeCheckConfig;
use uptime_domain::entities::RequestContext;
use uptime_infrastructure::InMemoryStore;
use uptime_testing_utils::{
    MockAgentController, MockAuthorizer, MockBusinessDirectory, MockHeartbeatSource,
    MockHostDirectory, MockHostResolver, TEST_BIZ_ID, TEST_TENANT,
};

/// 内存存储加上各外部协作方的 mock
pub struct Harness {
    pub store: InMemoryStore,
    pub agent: MockAgentController,
    pub resolver: MockHostResolver,
    pub directory: MockHostDirectory,
    pub heartbeat: MockHeartbeatSource,
    pub authorizer: MockAuthorizer,
    pub business: MockBusinessDirectory,
    pub config: UptimeCheckConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: InMemoryStore::new(),
            agent: MockAgentController::new(),
            resolver: MockHostResolver::new(vec![]),
            directory: MockHostDirectory::new(),
            heartbeat: MockHeartbeatSource::alive(),
            authorizer: MockAuthorizer::allow_all(),
            business: MockBusinessDirectory::new(vec![TEST_BIZ_ID, 3, 5]),
            config: UptimeCheckConfig::default(),
        }
    }

    pub fn deps(&self) -> ServiceDependencies {
        ServiceDependencies {
            tasks: Arc::new(self.store.task_repository()),
            nodes: Arc::new(self.store.node_repository()),
            groups: Arc::new(self.store.group_repository()),
            agent: Arc::new(self.agent.clone()),
            host_resolver: Arc::new(self.resolver.clone()),
            host_directory: Arc::new(self.directory.clone()),
            heartbeat: Arc::new(self.heartbeat.clone()),
            authorizer: Arc::new(self.authorizer.clone()),
            business: Arc::new(self.business.clone()),
        }
    }

    pub fn task_service(&self) -> TaskService {
        TaskService::new(self.deps(), self.config.clone())
    }

    pub fn node_service(&self) -> NodeService {
        NodeService::new(self.deps(), self.config.clone())
    }

    pub fn group_service(&self) -> GroupService {
        GroupService::new(self.deps())
    }
}

pub fn ctx() -> RequestContext {
    RequestContext::new(TEST_TENANT, TEST_BIZ_ID, "admin")
}
