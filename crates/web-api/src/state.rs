use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use application::{
    ChatService, ChatServiceDependencies, Clock, CounterStore, LocalTopicBroadcaster,
    MembershipAuthorizer, MessageBroadcaster, MessageHistory, MessageHistoryDependencies,
    MessageRepository, ParticipantRepository, ParticipantService, ParticipantServiceDependencies,
    PersistenceDispatcher, PresenceChannel, PresenceReplicator, PresenceStore, RateLimitPolicy,
    RateLimiter, RoomRepository, RoomSequencer, UserRepository,
};
use config::{AppConfig, TransportConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::heartbeat::HeartbeatScheduler;
use crate::pools::WorkerPools;
use crate::JwtService;

/// 存储协作方
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub rooms: Arc<dyn RoomRepository>,
    pub participants: Arc<dyn ParticipantRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

/// 装配 [`AppState`] 所需的外部依赖
pub struct AppStateDependencies {
    pub repositories: Repositories,
    pub counter_store: Arc<dyn CounterStore>,
    pub presence_channel: Arc<dyn PresenceChannel>,
    pub clock: Arc<dyn Clock>,
    pub shutdown: CancellationToken,
}

/// 装配时启动的后台任务
pub struct BackgroundTasks {
    pub persistence: JoinHandle<()>,
    pub heartbeats: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub participant_service: Arc<ParticipantService>,
    pub message_history: Arc<MessageHistory>,
    pub authorizer: Arc<MembershipAuthorizer>,
    pub presence: Arc<PresenceReplicator>,
    pub broadcaster: Arc<LocalTopicBroadcaster>,
    pub rate_limiter: Arc<RateLimiter>,
    pub jwt_service: Arc<JwtService>,
    pub pools: WorkerPools,
    pub heartbeat: HeartbeatScheduler,
    pub transport: TransportConfig,
    pub inbound_queue: usize,
    /// 是否信任 `X-Forwarded-For` 作为匿名限流的客户端地址
    pub trust_forwarded_for: bool,
    /// 进程关闭信号，每个连接持有它的子令牌
    pub shutdown: CancellationToken,
    next_connection_id: Arc<AtomicU64>,
}

impl AppState {
    /// 按配置装配应用层服务，并启动持久化循环与心跳任务
    pub fn build(config: &AppConfig, deps: AppStateDependencies) -> (Self, BackgroundTasks) {
        let AppStateDependencies {
            repositories,
            counter_store,
            presence_channel,
            clock,
            shutdown,
        } = deps;

        let broadcaster = Arc::new(LocalTopicBroadcaster::new(
            config.transport.broadcast_capacity,
        ));
        let authorizer = Arc::new(MembershipAuthorizer::new(
            repositories.participants.clone(),
        ));
        let sequencer = Arc::new(RoomSequencer::new());
        let rate_limiter = Arc::new(RateLimiter::new(
            counter_store,
            clock.clone(),
            config.redis.rate_limit_prefix.clone(),
            RateLimitPolicy::from(&config.rate_limit),
        ));
        let (persistence, persistence_task) = PersistenceDispatcher::spawn(
            repositories.messages.clone(),
            config.workers.persistence_workers,
            config.workers.persistence_queue,
        );

        let chat_service = ChatService::new(ChatServiceDependencies {
            authorizer: authorizer.clone(),
            rate_limiter: rate_limiter.clone(),
            user_repository: repositories.users.clone(),
            broadcaster: broadcaster.clone() as Arc<dyn MessageBroadcaster>,
            persistence,
            sequencer: sequencer.clone(),
            clock: clock.clone(),
        });
        let participant_service = ParticipantService::new(ParticipantServiceDependencies {
            room_repository: repositories.rooms.clone(),
            participant_repository: repositories.participants.clone(),
            user_repository: repositories.users.clone(),
            authorizer: authorizer.clone(),
            sequencer,
            clock,
        });
        let message_history = MessageHistory::new(MessageHistoryDependencies {
            room_repository: repositories.rooms,
            message_repository: repositories.messages,
            user_repository: repositories.users,
            authorizer: authorizer.clone(),
            recent_limit: config.history.recent_limit,
        });

        // 进程启动时在线集合为空
        let presence = Arc::new(PresenceReplicator::new(
            Arc::new(PresenceStore::new()),
            presence_channel,
            broadcaster.clone() as Arc<dyn MessageBroadcaster>,
        ));

        let (heartbeat, heartbeat_tasks) = HeartbeatScheduler::spawn(
            config.transport.heartbeat_workers,
            Duration::from_secs(config.transport.heartbeat_interval_secs),
            shutdown.clone(),
        );

        let state = Self {
            chat_service: Arc::new(chat_service),
            participant_service: Arc::new(participant_service),
            message_history: Arc::new(message_history),
            authorizer,
            presence,
            broadcaster,
            rate_limiter,
            jwt_service: Arc::new(JwtService::new(config.jwt.clone())),
            pools: WorkerPools::new(config.workers.inbound_max, config.workers.outbound_max),
            heartbeat,
            transport: config.transport.clone(),
            inbound_queue: config.workers.inbound_queue,
            trust_forwarded_for: config.server.trust_forwarded_for,
            shutdown,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        };

        (
            state,
            BackgroundTasks {
                persistence: persistence_task,
                heartbeats: heartbeat_tasks,
            },
        )
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }
}
