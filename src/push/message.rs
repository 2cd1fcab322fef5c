//! Platform-specific push message construction.
//!
//! Messages serialize in the gateway's HTTP v1 message shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::device::{Device, Platform};
use super::notification_config::NotificationText;
use super::transform::KEY_CONTENT;
use super::types::DataAttributes;

/// Visible title of iOS alerts
pub const IOS_ALERT_TITLE: &str = "New message";

/// Sound played for iOS alerts
pub const IOS_DEFAULT_SOUND: &str = "default";

/// A single push addressed to one device
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushMessage {
    pub token: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: DataAttributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<AndroidConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns: Option<ApnsConfig>,
}

/// Cross-platform notification block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AndroidPriority {
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AndroidConfig {
    pub priority: AndroidPriority,
    /// Time to live, e.g. `"3600s"`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<AndroidNotification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AndroidNotification {
    /// Notifications with the same tag replace each other on the device
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title_loc_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body_loc_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub click_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApnsConfig {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub payload: ApnsPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<ApsAlert>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<i32>,
    pub sound: String,
    #[serde(
        rename = "content-available",
        serialize_with = "flag_as_int",
        skip_serializing_if = "is_false"
    )]
    pub content_available: bool,
    #[serde(
        rename = "mutable-content",
        serialize_with = "flag_as_int",
        skip_serializing_if = "is_false"
    )]
    pub mutable_content: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApsAlert {
    pub title: String,
    pub body: String,
}

fn flag_as_int<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*flag))
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Per-run inputs shared by every message of a batch
#[derive(Debug, Clone)]
pub struct MessageContext<'a> {
    /// Topic of the event, used to group Android notifications
    pub topic: &'a str,
    /// Resolved Android notification text; `None` when the block is disabled
    pub android_text: Option<&'a NotificationText>,
    /// Message time to live in seconds, 0 for the gateway default
    pub time_to_live: u32,
    /// Event time, the base of the APNs expiration
    pub timestamp: DateTime<Utc>,
}

/// Build the message for one device.
///
/// `badge` is the unread count of the device owner.
pub fn build_message(
    device: &Device,
    data: &DataAttributes,
    badge: i32,
    ctx: &MessageContext<'_>,
) -> PushMessage {
    let mut msg = PushMessage {
        token: device.device_id.clone(),
        data: data.clone(),
        ..Default::default()
    };

    match device.platform {
        Platform::Android => {
            msg.android = Some(android_config(ctx));
        }
        Platform::Ios => {
            let body = data.get(KEY_CONTENT).cloned().unwrap_or_default();
            msg.apns = Some(apns_config(badge, &body, ctx));
            msg.notification = Some(Notification {
                title: IOS_ALERT_TITLE.to_string(),
                body,
            });
        }
        Platform::Web | Platform::Unknown => {}
    }

    msg
}

fn android_config(ctx: &MessageContext<'_>) -> AndroidConfig {
    // Without a notification block the app's own message handler runs even
    // in the background; with it the platform shows the notification itself.
    let notification = ctx.android_text.map(|text| AndroidNotification {
        tag: ctx.topic.to_string(),
        title: text.title.clone(),
        title_loc_key: text.title_loc_key.clone(),
        body: text.body.clone(),
        body_loc_key: text.body_loc_key.clone(),
        icon: text.icon.clone(),
        color: text.icon_color.clone(),
        click_action: text.click_action.clone(),
    });

    AndroidConfig {
        priority: AndroidPriority::High,
        ttl: (ctx.time_to_live > 0).then(|| format!("{}s", ctx.time_to_live)),
        notification,
    }
}

fn apns_config(badge: i32, body: &str, ctx: &MessageContext<'_>) -> ApnsConfig {
    let mut headers = BTreeMap::new();
    if ctx.time_to_live > 0 {
        let expires = ctx.timestamp.timestamp() + i64::from(ctx.time_to_live);
        headers.insert("apns-expiration".to_string(), expires.to_string());
    }

    ApnsConfig {
        headers,
        payload: ApnsPayload {
            aps: Aps {
                // Duplicated from the top-level notification so a notification
                // service extension on the device can rewrite it
                alert: Some(ApsAlert {
                    title: IOS_ALERT_TITLE.to_string(),
                    body: body.to_string(),
                }),
                badge: Some(badge),
                sound: IOS_DEFAULT_SOUND.to_string(),
                content_available: true,
                mutable_content: true,
            },
        },
    }
}
