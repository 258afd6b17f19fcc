use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 用户
///
/// 由外部 OAuth2 登录流程创建，`(provider, provider_id)` 唯一映射到 `id`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: String,
    pub provider_id: String,
}

impl User {
    pub fn new(
        id: UserId,
        name: impl Into<String>,
        provider: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            email: None,
            avatar_url: None,
            provider: provider.into(),
            provider_id: provider_id.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.name
    }
}
