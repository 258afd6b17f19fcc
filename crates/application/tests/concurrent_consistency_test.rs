//! 并发数据一致性测试
//!
//! 验证并发加入房间时容量与唯一性约束不被破坏

use std::sync::Arc;

use application::memory::InMemoryStore;
use application::{
    ApplicationError, MembershipAuthorizer, ParticipantRepository, ParticipantService,
    ParticipantServiceDependencies, RoomRepository, RoomSequencer, SystemClock, UserRepository,
};
use async_trait::async_trait;
use chrono::Utc;
use domain::{Participant, RepositoryError, Room, RoomId, RoomKind, RoomSettings, User, UserId};
use futures::future::join_all;

/// 每次调用前让出执行权，模拟经网络访问的共享存储
struct RemoteStore(Arc<InMemoryStore>);

#[async_trait]
impl RoomRepository for RemoteStore {
    async fn find_by_id(&self, id: RoomId) -> Result<Option<Room>, RepositoryError> {
        tokio::task::yield_now().await;
        RoomRepository::find_by_id(self.0.as_ref(), id).await
    }
}

#[async_trait]
impl UserRepository for RemoteStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        tokio::task::yield_now().await;
        UserRepository::find_by_id(self.0.as_ref(), id).await
    }

    async fn save(&self, user: User) -> Result<User, RepositoryError> {
        self.0.save(user).await
    }
}

#[async_trait]
impl ParticipantRepository for RemoteStore {
    async fn find(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>, RepositoryError> {
        tokio::task::yield_now().await;
        self.0.find(room_id, user_id).await
    }

    async fn exists(&self, room_id: RoomId, user_id: UserId) -> Result<bool, RepositoryError> {
        tokio::task::yield_now().await;
        self.0.exists(room_id, user_id).await
    }

    async fn count_by_room(&self, room_id: RoomId) -> Result<u64, RepositoryError> {
        tokio::task::yield_now().await;
        self.0.count_by_room(room_id).await
    }

    async fn enroll(
        &self,
        participant: Participant,
        max_participants: i32,
    ) -> Result<(), RepositoryError> {
        tokio::task::yield_now().await;
        self.0.enroll(participant, max_participants).await
    }
}

/// 一个独立的服务实例：自己的房间锁，共享的存储
fn instance_over(store: &Arc<InMemoryStore>) -> Arc<ParticipantService> {
    let remote = Arc::new(RemoteStore(store.clone()));
    Arc::new(ParticipantService::new(ParticipantServiceDependencies {
        room_repository: remote.clone(),
        participant_repository: remote.clone(),
        user_repository: remote.clone(),
        authorizer: Arc::new(MembershipAuthorizer::new(remote)),
        sequencer: Arc::new(RoomSequencer::new()),
        clock: Arc::new(SystemClock),
    }))
}

struct TestServices {
    store: Arc<InMemoryStore>,
    service: Arc<ParticipantService>,
    owner: UserId,
}

impl TestServices {
    async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let owner = UserId::generate();
        store
            .save(User::new(owner, "owner", "github", "owner"))
            .await
            .unwrap();

        let service = Arc::new(ParticipantService::new(ParticipantServiceDependencies {
            room_repository: store.clone(),
            participant_repository: store.clone(),
            user_repository: store.clone(),
            authorizer: Arc::new(MembershipAuthorizer::new(store.clone())),
            sequencer: Arc::new(RoomSequencer::new()),
            clock: Arc::new(SystemClock),
        }));

        Self {
            store,
            service,
            owner,
        }
    }

    async fn public_room(&self, max: Option<i32>) -> RoomId {
        let room = Room::new_group(
            RoomId::generate(),
            "load-test",
            RoomKind::Public,
            self.owner,
            max,
            RoomSettings::default(),
            Utc::now(),
        )
        .unwrap();
        self.store.insert_room(room).await.id
    }

    async fn users(&self, count: usize) -> Vec<UserId> {
        let mut ids = Vec::with_capacity(count);
        for n in 0..count {
            let id = UserId::generate();
            self.store
                .save(User::new(id, format!("user-{n}"), "github", n.to_string()))
                .await
                .unwrap();
            ids.push(id);
        }
        ids
    }
}

/// 并发加入不会让房间人数超过上限
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_respect_capacity() {
    let services = TestServices::new().await;
    let room_id = services.public_room(Some(5)).await;
    let users = services.users(30).await;

    let tasks = users.into_iter().map(|user_id| {
        let service = services.service.clone();
        tokio::spawn(async move { service.add_participant(user_id, room_id, user_id).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = results.iter().filter(|result| result.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Err(ApplicationError::CapacityExceeded { max: 5 })))
        .count();

    // 创建者占用一个名额
    assert_eq!(admitted, 4);
    assert_eq!(rejected, 26);
    assert_eq!(services.store.count_by_room(room_id).await.unwrap(), 5);

    let room = RoomRepository::find_by_id(services.store.as_ref(), room_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(room.participants.len(), 5);
}

/// 同一用户并发加入：恰好一次成功，其余全部冲突
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_join_yields_single_record() {
    let services = TestServices::new().await;
    let room_id = services.public_room(None).await;
    let user_id = services.users(1).await[0];

    let attempts = 16;
    let tasks = (0..attempts).map(|_| {
        let service = services.service.clone();
        tokio::spawn(async move { service.add_participant(user_id, room_id, user_id).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|result| matches!(result, Err(ApplicationError::Conflict(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, attempts - 1);
    assert_eq!(services.store.count_by_room(room_id).await.unwrap(), 2);
}

/// 两个独立的服务实例共享同一存储时，存储层的冲突检测仍然保证唯一性
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_join_across_instances() {
    let services = TestServices::new().await;
    let room_id = services.public_room(None).await;
    let user_id = services.users(1).await[0];

    let other_instance = Arc::new(ParticipantService::new(ParticipantServiceDependencies {
        room_repository: services.store.clone(),
        participant_repository: services.store.clone(),
        user_repository: services.store.clone(),
        authorizer: Arc::new(MembershipAuthorizer::new(services.store.clone())),
        sequencer: Arc::new(RoomSequencer::new()),
        clock: Arc::new(SystemClock),
    }));

    let tasks = (0..8).map(|n| {
        let service = if n % 2 == 0 {
            services.service.clone()
        } else {
            other_instance.clone()
        };
        tokio::spawn(async move { service.add_participant(user_id, room_id, user_id).await })
    });
    let successes = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| matches!(joined, Ok(Ok(_))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(services.store.count_by_room(room_id).await.unwrap(), 2);
}

/// 多个实例各自持有房间锁时，人数上限仍由存储的原子写入保证
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_capacity_holds_across_instances() {
    let services = TestServices::new().await;
    let room_id = services.public_room(Some(3)).await;
    let users = services.users(8).await;
    let instances: Vec<_> = (0..8).map(|_| instance_over(&services.store)).collect();

    let tasks = users
        .into_iter()
        .zip(instances)
        .map(|(user_id, service)| {
            tokio::spawn(async move { service.add_participant(user_id, room_id, user_id).await })
        });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let admitted = results.iter().filter(|result| result.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Err(ApplicationError::CapacityExceeded { max: 3 })))
        .count();

    assert_eq!(admitted, 2);
    assert_eq!(rejected, 6);
    assert_eq!(services.store.count_by_room(room_id).await.unwrap(), 3);

    let room = RoomRepository::find_by_id(services.store.as_ref(), room_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(room.participants.len(), 3);
}
