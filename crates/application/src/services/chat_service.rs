use std::sync::Arc;

use domain::{Message, MessageId, MessageType, UserId};
use validator::Validate;

use crate::{
    authorizer::MembershipAuthorizer,
    broadcaster::{Envelope, MessageBroadcaster, Topic},
    clock::Clock,
    dto::{
        AddUserCommand, ChatMessageResponse, SendFailure, SendMessageCommand, TypingCommand,
        TypingEvent, MAX_CONTENT_CHARS, UNKNOWN_SENDER_NAME,
    },
    error::ApplicationError,
    persistence::PersistenceDispatcher,
    rate_limiter::RateLimiter,
    repository::UserRepository,
    sequencer::RoomSequencer,
};

pub struct ChatServiceDependencies {
    pub authorizer: Arc<MembershipAuthorizer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub user_repository: Arc<dyn UserRepository>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub persistence: PersistenceDispatcher,
    pub sequencer: Arc<RoomSequencer>,
    pub clock: Arc<dyn Clock>,
}

/// 一次发送请求的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// 已广播，持久化已提交到后台
    Delivered(ChatMessageResponse),
    /// 发送者不是房间成员，静默丢弃
    Dropped,
    /// 失败，已通过错误主题告知发送者
    Rejected(ApplicationError),
}

/// 消息管道：校验 → 鉴权 → 广播 → 异步持久化
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn send_message(
        &self,
        sender: Option<UserId>,
        command: SendMessageCommand,
    ) -> SendOutcome {
        let Some(sender) = sender else {
            tracing::warn!(room_id = %command.room_id, "拒绝没有发送者的消息");
            return SendOutcome::Rejected(ApplicationError::invalid_request("sender is required"));
        };

        let temp_id = command.temp_id.clone();
        let room_id = command.room_id;
        match self.deliver(sender, command).await {
            Ok(Some(response)) => SendOutcome::Delivered(response),
            Ok(None) => SendOutcome::Dropped,
            Err(err) => {
                tracing::info!(
                    room_id = %room_id,
                    user_id = %sender,
                    code = err.code(),
                    error = %err,
                    "消息发送失败"
                );
                self.report_failure(sender, temp_id, &err).await;
                SendOutcome::Rejected(err)
            }
        }
    }

    async fn deliver(
        &self,
        sender: UserId,
        command: SendMessageCommand,
    ) -> Result<Option<ChatMessageResponse>, ApplicationError> {
        self.deps
            .rate_limiter
            .check(&sender.to_string(), true)
            .await?;
        validate_content(&command)?;

        let room_id = command.room_id;
        match self
            .deps
            .authorizer
            .require_participant(room_id, sender)
            .await
        {
            Ok(()) => {}
            Err(ApplicationError::Forbidden(_)) => {
                tracing::warn!(room_id = %room_id, user_id = %sender, "非房间成员发送消息，已丢弃");
                return Ok(None);
            }
            Err(err) => return Err(err),
        }

        // 只为鉴权通过的房间加锁
        let guard = self.deps.sequencer.lock(room_id).await;
        let message = Message::new(
            MessageId::generate(),
            room_id,
            sender,
            command.message_type,
            command.content,
            self.deps.clock.now(),
        )
        .with_attachments(command.attachments);

        let sender_name = self.sender_name(sender).await;
        let response = ChatMessageResponse::from_message(&message, sender_name, command.temp_id);
        self.deps
            .broadcaster
            .broadcast(Envelope::new(Topic::Public(room_id), &response)?)
            .await?;
        drop(guard);

        self.deps.persistence.dispatch(message);
        Ok(Some(response))
    }

    /// 广播一条不持久化的 SYSTEM 消息：`<name> joined the chat`
    pub async fn announce_join(
        &self,
        user_id: UserId,
        command: AddUserCommand,
    ) -> Result<ChatMessageResponse, ApplicationError> {
        let name = self.sender_name(user_id).await;
        let message = Message::new(
            MessageId::generate(),
            command.room_id,
            user_id,
            MessageType::System,
            format!("{name} joined the chat"),
            self.deps.clock.now(),
        );
        let response = ChatMessageResponse::from_message(&message, name, None);

        let _guard = self.deps.sequencer.lock(command.room_id).await;
        self.deps
            .broadcaster
            .broadcast(Envelope::new(Topic::Public(command.room_id), &response)?)
            .await?;
        Ok(response)
    }

    /// 把输入状态转发到 `typing.<roomId>`，身份以会话用户为准
    pub async fn relay_typing(
        &self,
        user_id: UserId,
        command: TypingCommand,
    ) -> Result<(), ApplicationError> {
        let event = TypingEvent {
            room_id: command.room_id,
            user_id,
            typing: command.typing,
        };
        self.deps
            .broadcaster
            .broadcast(Envelope::new(Topic::Typing(command.room_id), &event)?)
            .await?;
        Ok(())
    }

    async fn sender_name(&self, user_id: UserId) -> String {
        match self.deps.user_repository.find_by_id(user_id).await {
            Ok(Some(user)) => user.display_name().to_owned(),
            Ok(None) => UNKNOWN_SENDER_NAME.to_owned(),
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "查询用户名失败");
                UNKNOWN_SENDER_NAME.to_owned()
            }
        }
    }

    async fn report_failure(&self, user_id: UserId, temp_id: Option<String>, err: &ApplicationError) {
        let failure = SendFailure {
            temp_id,
            code: err.code().to_owned(),
            message: err.to_string(),
        };
        let result = match Envelope::new(Topic::UserErrors(user_id), &failure) {
            Ok(envelope) => self.deps.broadcaster.broadcast(envelope).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::error!(user_id = %user_id, error = %err, "错误通知发送失败");
        }
    }
}

fn validate_content(command: &SendMessageCommand) -> Result<(), ApplicationError> {
    if command.content.trim().is_empty() {
        return Err(ApplicationError::invalid_request("content cannot be blank"));
    }
    command.validate().map_err(|_| {
        ApplicationError::invalid_request(format!(
            "content must be at most {MAX_CONTENT_CHARS} characters"
        ))
    })
}
