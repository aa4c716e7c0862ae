//! 通知载荷与受众选择条件。

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{Role, UserId};

/// 未指定图标时使用的默认值。
pub const DEFAULT_ICON: &str = "companylogo";

/// 一条通知的内容，投递时原样发给目标用户的每个端点。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
        }
    }

    /// 返回补齐了默认图标的载荷。
    pub fn with_default_icon(mut self) -> Self {
        if self.icon.as_deref().map_or(true, str::is_empty) {
            self.icon = Some(DEFAULT_ICON.to_string());
        }
        self
    }
}

/// 通知受众的选择条件。
///
/// 角色受众和 id 受众是两条独立的通道，互不求并集也不去重，
/// `online_only` 作为共同的附加过滤条件作用于两者。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionCriteria {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub ids: Vec<UserId>,
    #[serde(default)]
    pub online_only: bool,
}

impl SelectionCriteria {
    /// 两个集合都为空是调用方错误，空的查询结果则不是。
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.roles.is_empty() && self.ids.is_empty() {
            return Err(DomainError::EmptySelection);
        }
        Ok(())
    }
}

/// 按受众拆分的载荷：角色受众和 id 受众各自收到自己的那份。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudiencePayloads {
    #[serde(default)]
    pub role: Option<NotificationPayload>,
    #[serde(default)]
    pub id: Option<NotificationPayload>,
}

impl AudiencePayloads {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.role.is_none() && self.id.is_none() {
            return Err(DomainError::MissingPayload);
        }
        Ok(())
    }
}
