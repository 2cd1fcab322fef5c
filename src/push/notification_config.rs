//! Visible notification text for the Android notification block.
//!
//! Text is configured in three tiers: a default tier and one override tier per
//! event kind. A field resolves to the event-kind value when it is non-empty,
//! otherwise to the default value, otherwise to an empty string.

use serde::Deserialize;

use super::types::EventKind;

/// Body placeholder replaced with the rendered message content
pub const CONTENT_PLACEHOLDER: &str = "$content";

/// One tier of notification text
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotificationText {
    pub title_loc_key: String,
    pub title: String,
    pub body_loc_key: String,
    pub body: String,
    pub icon: String,
    pub icon_color: String,
    pub click_action: String,
}

/// Field selector for tier resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationField {
    TitleLocKey,
    Title,
    BodyLocKey,
    Body,
    Icon,
    IconColor,
    ClickAction,
}

impl NotificationText {
    pub fn field(&self, field: NotificationField) -> &str {
        match field {
            NotificationField::TitleLocKey => &self.title_loc_key,
            NotificationField::Title => &self.title,
            NotificationField::BodyLocKey => &self.body_loc_key,
            NotificationField::Body => &self.body,
            NotificationField::Icon => &self.icon,
            NotificationField::IconColor => &self.icon_color,
            NotificationField::ClickAction => &self.click_action,
        }
    }
}

/// Android notification block configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AndroidNotificationConfig {
    /// Attach a visible notification block to Android pushes
    #[serde(default)]
    pub enabled: bool,
    /// Defaults shared by all event kinds
    #[serde(flatten)]
    pub defaults: NotificationText,
    /// Overrides for new messages
    #[serde(default, alias = "message")]
    pub msg: NotificationText,
    /// Overrides for subscription changes
    #[serde(default, alias = "subscription")]
    pub sub: NotificationText,
}

impl AndroidNotificationConfig {
    fn tier(&self, kind: EventKind) -> &NotificationText {
        match kind {
            EventKind::Message => &self.msg,
            EventKind::Subscription => &self.sub,
        }
    }

    /// Resolve a single field for an event kind, falling back to the default tier.
    pub fn resolve(&self, kind: EventKind, field: NotificationField) -> &str {
        let specific = self.tier(kind).field(field);
        if !specific.is_empty() {
            specific
        } else {
            self.defaults.field(field)
        }
    }

    /// Resolve every field for an event kind.
    ///
    /// A body equal to `$content` is replaced with `content`.
    pub fn resolve_text(&self, kind: EventKind, content: &str) -> NotificationText {
        let resolve = |field| self.resolve(kind, field).to_string();

        let mut body = resolve(NotificationField::Body);
        if body == CONTENT_PLACEHOLDER {
            body = content.to_string();
        }

        NotificationText {
            title_loc_key: resolve(NotificationField::TitleLocKey),
            title: resolve(NotificationField::Title),
            body_loc_key: resolve(NotificationField::BodyLocKey),
            body,
            icon: resolve(NotificationField::Icon),
            icon_color: resolve(NotificationField::IconColor),
            click_action: resolve(NotificationField::ClickAction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AndroidNotificationConfig {
        AndroidNotificationConfig {
            enabled: true,
            defaults: NotificationText {
                title: "New activity".to_string(),
                body: "Open the app".to_string(),
                icon: "ic_logo".to_string(),
                icon_color: "#3949AB".to_string(),
                ..Default::default()
            },
            msg: NotificationText {
                title: "New message".to_string(),
                body: CONTENT_PLACEHOLDER.to_string(),
                ..Default::default()
            },
            sub: NotificationText::default(),
        }
    }

    #[test]
    fn test_specific_tier_wins() {
        let config = config();
        assert_eq!(
            config.resolve(EventKind::Message, NotificationField::Title),
            "New message"
        );
    }

    #[test]
    fn test_falls_back_to_default_tier() {
        let config = config();
        assert_eq!(
            config.resolve(EventKind::Message, NotificationField::Icon),
            "ic_logo"
        );
        assert_eq!(
            config.resolve(EventKind::Subscription, NotificationField::Title),
            "New activity"
        );
    }

    #[test]
    fn test_empty_everywhere_resolves_empty() {
        let config = config();
        assert_eq!(
            config.resolve(EventKind::Subscription, NotificationField::TitleLocKey),
            ""
        );
        let empty = AndroidNotificationConfig::default();
        assert_eq!(empty.resolve(EventKind::Message, NotificationField::Body), "");
    }

    #[test]
    fn test_content_placeholder_substituted() {
        let config = config();
        let text = config.resolve_text(EventKind::Message, "Hello there");
        assert_eq!(text.body, "Hello there");
        assert_eq!(text.title, "New message");
        assert_eq!(text.icon_color, "#3949AB");

        let text = config.resolve_text(EventKind::Subscription, "ignored");
        assert_eq!(text.body, "Open the app");
    }

    #[test]
    fn test_deserialize_tiers() {
        let json = r#"{
            "enabled": true,
            "title": "Default",
            "icon": "ic_default",
            "msg": {"title": "Msg title", "body": "$content"},
            "subscription": {"body": "You were invited"}
        }"#;
        let config: AndroidNotificationConfig = serde_json::from_str(json).unwrap();
        assert!(config.enabled);
        assert_eq!(config.defaults.title, "Default");
        assert_eq!(config.msg.title, "Msg title");
        assert_eq!(config.sub.body, "You were invited");
        assert_eq!(
            config.resolve(EventKind::Subscription, NotificationField::Icon),
            "ic_default"
        );
    }
}
