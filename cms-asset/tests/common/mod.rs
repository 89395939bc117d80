#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cms_asset::{AssetInteractor, CreateAssetParam, Gateways, Repos};
use cms_blob::{BlobGateway, MemoryGateway, UploadFile};
use cms_core::{
    Asset, AssetSettings, File, Operator, ProjectFilter, ProjectId, UserId, WorkspaceFilter, WorkspaceId,
};
use cms_events::{EventBus, RecordingSender, RetryPolicy};
use cms_queue::RecordingDispatcher;
use cms_store::{
    EventRepository, MemoryDatabase, MemoryEventRepository, MemoryPolicies, MemoryProjects, MemoryThreads,
    MemoryWebhookRepository,
};

/// Orchestrator wired to in-memory collaborators, with handles on each one.
pub struct Harness {
    pub interactor: AssetInteractor,
    pub db: MemoryDatabase,
    pub gateway: MemoryGateway,
    pub dispatcher: RecordingDispatcher,
    pub projects: MemoryProjects,
    pub policies: MemoryPolicies,
    pub threads: MemoryThreads,
    pub events: MemoryEventRepository,
    pub webhooks: MemoryWebhookRepository,
    pub sender: RecordingSender,
    pub workspace: WorkspaceId,
    pub project: ProjectId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(MemoryGateway::default())
    }

    pub fn with_gateway(gateway: MemoryGateway) -> Self {
        let blob = Arc::new(gateway.clone());
        Self::with_blob(gateway, blob)
    }

    /// Route blob calls through `blob`, which is expected to wrap `gateway`.
    pub fn with_blob(gateway: MemoryGateway, blob: Arc<dyn BlobGateway>) -> Self {
        let db = MemoryDatabase::new();
        let settings = AssetSettings::default();
        let dispatcher = RecordingDispatcher::new();
        let projects = MemoryProjects::new();
        let policies = MemoryPolicies::new();
        let threads = MemoryThreads::new();
        let events = MemoryEventRepository::new(db.clone());
        let webhooks = MemoryWebhookRepository::new(db.clone());
        let sender = RecordingSender::new();

        let workspace = WorkspaceId::new();
        let project = ProjectId::new();
        projects.insert(project, workspace);

        let bus = EventBus::new(
            Arc::new(events.clone()),
            Arc::new(webhooks.clone()),
            Arc::new(sender.clone()),
        )
        .with_policy(RetryPolicy {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        });

        let gateways = Gateways {
            blob,
            dispatcher: Arc::new(dispatcher.clone()),
            projects: Arc::new(projects.clone()),
            policies: Arc::new(policies.clone()),
            threads: Arc::new(threads.clone()),
        };
        let interactor = AssetInteractor::new(Repos::memory(&db, &settings), gateways, bus).with_settings(settings);

        Self {
            interactor,
            db,
            gateway,
            dispatcher,
            projects,
            policies,
            threads,
            events,
            webhooks,
            sender,
            workspace,
            project,
        }
    }

    /// User with write access on the harness project and its workspace.
    pub fn writer(&self) -> Operator {
        Operator::user(
            UserId::new(),
            WorkspaceFilter::read_write(vec![self.workspace]),
            ProjectFilter::read_write(vec![self.project]),
        )
    }

    /// User that may only read the harness project.
    pub fn reader(&self) -> Operator {
        Operator::user(
            UserId::new(),
            WorkspaceFilter::read_only(vec![self.workspace]),
            ProjectFilter::read_only(vec![self.project]),
        )
    }

    /// User with no access to anything.
    pub fn outsider(&self) -> Operator {
        Operator::user(UserId::new(), WorkspaceFilter::none(), ProjectFilter::none())
    }

    pub async fn create_inline(&self, name: &str, data: Vec<u8>) -> (Asset, File) {
        let param = CreateAssetParam::inline(self.project, UploadFile::from_bytes(name, data));
        self.interactor.create(&self.writer(), param).await.unwrap()
    }

    pub async fn event_types(&self) -> Vec<String> {
        self.events
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type.as_str().to_string())
            .collect()
    }

    /// Wait until the sender has seen `n` delivery attempts.
    pub async fn wait_for_deliveries(&self, n: usize) {
        let sender = self.sender.clone();
        tokio::time::timeout(Duration::from_secs(2), async move {
            while sender.attempts().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for webhook deliveries");
    }
}

pub fn bytes(len: usize) -> Vec<u8> {
    vec![7u8; len]
}
