//! Markup of single messages.

use chrono::{DateTime, Local, Utc};
use sitefeed_common::{Attachment, ChatMessage, MessageId, UpdateMessage};

use crate::{
    color::{contrast_text_color, is_known_color, pastel_for_name},
    dom::Fragment,
    wingdings::to_wingdings,
};

const CDN: &str = "https://cdn.discordapp.com";

pub const UNKNOWN_USER: &str = "Unknown User";

const WINGDINGS_FONT: &str = "font-family: Wingdings, 'Wingdings 2', 'Wingdings 3', sans-serif";

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("message has no id")]
    MissingId,
    #[error("message could not be decoded: {0}")]
    Undecodable(String),
    #[error("attachment url {0:?} is not http(s)")]
    UnsafeUrl(String),
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Best available name of the message's author.
pub fn display_name(message: &UpdateMessage) -> &str {
    let member = message.member.as_ref();
    let author = message.author.as_ref();
    [
        member.and_then(|member| member.nickname.as_deref()),
        member
            .and_then(|member| member.user.as_ref())
            .and_then(|user| user.global_name.as_deref()),
        author.and_then(|author| author.global_name.as_deref()),
        author.and_then(|author| author.username.as_deref()),
    ]
    .into_iter()
    .flatten()
    .find(|name| !name.is_empty())
    .unwrap_or(UNKNOWN_USER)
}

/// Guild avatar, then user avatar, then the default avatar picked from the user's id.
pub fn avatar_url(message: &UpdateMessage) -> Option<String> {
    let author = message.author.as_ref()?;
    let user_id = author.id.as_deref().filter(|id| !id.is_empty());
    let guild_avatar = message.member.as_ref().and_then(|member| member.avatar.as_deref());
    if let (Some(hash), Some(guild), Some(user)) = (guild_avatar, message.guild_id.as_deref(), user_id)
    {
        return Some(format!("{CDN}/guilds/{guild}/users/{user}/avatars/{hash}.png"));
    }
    if let (Some(hash), Some(user)) = (author.avatar.as_deref(), user_id) {
        return Some(format!("{CDN}/avatars/{user}/{hash}.png"));
    }
    let legacy = author
        .discriminator
        .as_deref()
        .and_then(|discriminator| discriminator.parse::<u64>().ok())
        .filter(|&discriminator| discriminator != 0);
    let index = match legacy {
        Some(discriminator) => discriminator % 5,
        None => user_id.and_then(|id| id.parse::<u64>().ok()).map_or(0, |id| (id >> 22) % 6),
    };
    Some(format!("{CDN}/embed/avatars/{index}.png"))
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn checked_url(url: &str) -> Result<&str, RenderError> {
    let lower = url.trim_start().to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        Ok(url)
    } else {
        Err(RenderError::UnsafeUrl(url.to_owned()))
    }
}

fn attachment_markup(attachment: &Attachment) -> Result<String, RenderError> {
    let Some(url) = attachment.url.as_deref().filter(|url| !url.is_empty()) else {
        return Ok(String::new());
    };
    let url = escape_html(checked_url(url)?);
    let filename = escape_html(attachment.filename.as_deref().unwrap_or("Download"));
    Ok(if attachment.is_image() {
        format!(
            r#"<div class="attachment-image"><img src="{url}" alt="{filename}" loading="lazy" onclick="this.classList.toggle('expanded')"></div>"#
        )
    } else {
        format!(
            r#"<a class="attachment-link" href="{url}" target="_blank" rel="noopener noreferrer">📎 {filename}</a>"#
        )
    })
}

/// Renders one updates-feed message.
pub fn update_fragment(message: &UpdateMessage) -> Result<Fragment, RenderError> {
    if message.id.as_str().is_empty() {
        return Err(RenderError::MissingId);
    }
    if let Some(error) = &message.decode_error {
        return Err(RenderError::Undecodable(error.clone()));
    }
    let name = display_name(message);
    let timestamp = message.timestamp.unwrap_or_else(Utc::now);
    let when = format_timestamp(timestamp);
    let content = message.content.as_deref().unwrap_or_default();
    let attachments = message
        .attachments
        .iter()
        .map(attachment_markup)
        .collect::<Result<String, _>>()?;
    let attachments = if attachments.is_empty() {
        attachments
    } else {
        format!(r#"<div class="attachments">{attachments}</div>"#)
    };
    let avatar = avatar_url(message)
        .map(|url| format!(r#"<img class="avatar" src="{}" alt="">"#, escape_html(&url)))
        .unwrap_or_default();
    let markup = format!(
        r#"<div class="discord-message" data-message-id="{id}"><div class="message-header">{avatar}<strong>{name}</strong><span class="timestamp">{when}</span></div><div class="message-content">{content}{attachments}</div></div>"#,
        id = escape_html(message.id.as_str()),
        name = escape_html(name),
        content = escape_html(content).replace('\n', "<br>"),
    );
    Ok(Fragment {
        id: Some(message.id.clone()),
        markup,
        text: format!("[{when}] {name}: {content}"),
        accent: None,
    })
}

/// Stands in for a message that could not be rendered.
pub fn error_placeholder(id: &MessageId) -> Fragment {
    Fragment {
        id: (!id.as_str().is_empty()).then(|| id.clone()),
        markup: r#"<div class="error-message">Error displaying this message.</div>"#.to_owned(),
        text: "Error displaying this message.".to_owned(),
        accent: None,
    }
}

pub fn update_fragment_or_placeholder(message: &UpdateMessage) -> Fragment {
    update_fragment(message).unwrap_or_else(|err| {
        tracing::warn!(id = %message.id, %err, "could not render update");
        error_placeholder(&message.id)
    })
}

/// Label color of a chat message: its stored color if that is a plain color, else the color of
/// its sender's name.
pub fn chat_background(message: &ChatMessage) -> String {
    match message.color.as_deref().filter(|color| is_known_color(color)) {
        Some(color) => color.to_owned(),
        None => pastel_for_name(message.display_name()).to_string(),
    }
}

/// Renders one chat message.
pub fn chat_fragment(message: &ChatMessage) -> Fragment {
    let name = message.display_name();
    let text = message.text.as_deref().unwrap_or_default();
    let text = if message.is_wingdings() {
        to_wingdings(text)
    } else {
        text.to_owned()
    };
    let background = chat_background(message);
    let foreground = contrast_text_color(&background);
    let font = if message.is_wingdings() {
        format!(r#" style="{WINGDINGS_FONT}""#)
    } else {
        String::new()
    };
    let markup = format!(
        r#"<div class="message"><span class="name" style="background-color: {background}; color: {foreground}">{name}</span><span class="message-text"{font}>{text}</span></div>"#,
        name = escape_html(name),
        text = escape_html(&text),
    );
    Fragment {
        id: Some(message.id.clone()),
        markup,
        text: format!("{name}: {text}"),
        accent: Some(background),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use sitefeed_common::{Author, Member, MemberUser};

    use super::*;

    fn author(id: &str) -> Author {
        Author {
            id: Some(id.to_owned()),
            username: Some("site".to_owned()),
            ..Default::default()
        }
    }

    fn update(id: &str) -> UpdateMessage {
        UpdateMessage {
            id: id.into(),
            content: Some("hi".to_owned()),
            timestamp: Some(Utc.timestamp_opt(1_700_000_000, 0).unwrap()),
            author: Some(author("80351110224678912")),
            ..Default::default()
        }
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn display_name_falls_back_in_order() {
        let mut message = update("1");
        assert_eq!(display_name(&message), "site");
        message.author.as_mut().unwrap().global_name = Some("Site".to_owned());
        assert_eq!(display_name(&message), "Site");
        message.member = Some(Member {
            nickname: None,
            avatar: None,
            user: Some(MemberUser {
                global_name: Some("Member".to_owned()),
            }),
        });
        assert_eq!(display_name(&message), "Member");
        message.member.as_mut().unwrap().nickname = Some("Nick".to_owned());
        assert_eq!(display_name(&message), "Nick");
        message.member = None;
        message.author = None;
        assert_eq!(display_name(&message), UNKNOWN_USER);
    }

    #[test]
    fn avatars_prefer_guild_then_user_then_default() {
        let mut message = update("1");
        // 80351110224678912 >> 22 == 19157197529, which is 5 mod 6
        assert_eq!(
            avatar_url(&message).unwrap(),
            "https://cdn.discordapp.com/embed/avatars/5.png"
        );
        message.author.as_mut().unwrap().discriminator = Some("1337".to_owned());
        assert_eq!(
            avatar_url(&message).unwrap(),
            "https://cdn.discordapp.com/embed/avatars/2.png"
        );
        message.author.as_mut().unwrap().avatar = Some("abc".to_owned());
        assert_eq!(
            avatar_url(&message).unwrap(),
            "https://cdn.discordapp.com/avatars/80351110224678912/abc.png"
        );
        message.guild_id = Some("9".to_owned());
        message.member = Some(Member {
            avatar: Some("def".to_owned()),
            ..Default::default()
        });
        assert_eq!(
            avatar_url(&message).unwrap(),
            "https://cdn.discordapp.com/guilds/9/users/80351110224678912/avatars/def.png"
        );
        message.author = None;
        assert_eq!(avatar_url(&message), None);
    }

    #[test]
    fn update_markup_escapes_content_and_keeps_line_breaks() {
        let mut message = update("42");
        message.content = Some("<script>\nbye".to_owned());
        let fragment = update_fragment(&message).unwrap();
        assert_eq!(fragment.id.as_ref().map(MessageId::as_str), Some("42"));
        assert!(fragment.markup.contains(r#"data-message-id="42""#));
        assert!(fragment.markup.contains("&lt;script&gt;<br>bye"));
        assert!(fragment
            .markup
            .contains(&format_timestamp(message.timestamp.unwrap())));
    }

    #[test]
    fn attachments_render_as_images_or_links() {
        let mut message = update("1");
        message.attachments = vec![
            Attachment {
                url: Some("https://cdn.example/a.png".to_owned()),
                content_type: Some("image/png".to_owned()),
                filename: Some("a.png".to_owned()),
            },
            Attachment {
                url: Some("https://cdn.example/b.zip".to_owned()),
                content_type: Some("application/zip".to_owned()),
                filename: None,
            },
            Attachment::default(),
        ];
        let markup = update_fragment(&message).unwrap().markup;
        assert!(markup.contains(r#"<img src="https://cdn.example/a.png" alt="a.png""#));
        assert!(markup.contains("📎 Download</a>"));
    }

    #[test]
    fn unsafe_records_become_placeholders() {
        let mut message = update("7");
        message.attachments = vec![Attachment {
            url: Some("javascript:alert(1)".to_owned()),
            ..Default::default()
        }];
        assert!(matches!(update_fragment(&message), Err(RenderError::UnsafeUrl(_))));
        let fragment = update_fragment_or_placeholder(&message);
        assert_eq!(fragment.id.as_ref().map(MessageId::as_str), Some("7"));
        assert!(fragment.markup.contains("Error displaying this message."));

        assert_eq!(update_fragment(&update("")), Err(RenderError::MissingId));
    }

    #[test]
    fn undecodable_records_become_placeholders() {
        let mut message = update("8");
        message.decode_error = Some("invalid type: string \"oops\"".to_owned());
        assert!(matches!(update_fragment(&message), Err(RenderError::Undecodable(_))));
        let fragment = update_fragment_or_placeholder(&message);
        assert_eq!(fragment.id.as_ref().map(MessageId::as_str), Some("8"));
        assert_eq!(fragment.text, "Error displaying this message.");
    }

    fn chat(name: &str, color: Option<&str>) -> ChatMessage {
        ChatMessage {
            id: 1.into(),
            name: Some(name.to_owned()),
            text: Some("hello <world>".to_owned()),
            color: color.map(str::to_owned),
            wingdings: None,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
        }
    }

    #[test]
    fn chat_labels_use_the_name_color_without_an_override() {
        let fragment = chat_fragment(&chat("bob", None));
        assert_eq!(fragment.accent.as_deref(), Some("hsl(157, 70%, 80%)"));
        assert!(fragment.markup.contains(
            r#"style="background-color: hsl(157, 70%, 80%); color: hsl(157, 70%, 30%)">bob</span>"#
        ));
        assert!(fragment.markup.contains("hello &lt;world&gt;"));
        assert_eq!(fragment.text, "bob: hello <world>");
    }

    #[test]
    fn chat_labels_keep_stored_colors_but_not_injected_ones() {
        let stored = chat_fragment(&chat("bob", Some("#e34234")));
        assert!(stored.markup.contains("background-color: #e34234; color: white"));
        let injected = chat_fragment(&chat("bob", Some("red\" onmouseover=\"x")));
        assert_eq!(injected.accent.as_deref(), Some("hsl(157, 70%, 80%)"));
    }

    #[test]
    fn wingdings_messages_get_the_symbol_font() {
        let mut message = chat("", None);
        message.wingdings = Some(true);
        let fragment = chat_fragment(&message);
        assert!(fragment.markup.contains(WINGDINGS_FONT));
        assert!(fragment.markup.contains(">anon</span>"));
        assert_eq!(fragment.text, "anon: ☤☮☨☨☫ <☻☫☮☨✡>");
    }
}
