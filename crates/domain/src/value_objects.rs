use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

/// 标识解析失败。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct IdParseError(pub String);

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// 生成新的随机标识。
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| IdParseError(s.to_owned()))
            }
        }
    };
}

uuid_id!(
    /// 用户唯一标识，由外部身份服务（OAuth2 provider + providerId）解析得到。
    UserId
);

uuid_id!(
    /// 聊天室唯一标识。
    RoomId
);

uuid_id!(
    /// 消息唯一标识。
    MessageId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_from_display_form() {
        let id = RoomId::generate();
        let parsed: RoomId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = "not-a-uuid".parse::<UserId>().unwrap_err();
        assert_eq!(err, IdParseError("not-a-uuid".to_string()));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = UserId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}
