use serde::{Deserialize, Serialize};

pub const PLAY_BUTTON_LABEL: &str = "▶️ Play Online (Fast)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub text: String,
    pub button: Option<LinkButton>,
}

impl StatusView {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            button: None,
        }
    }

    pub fn greeting() -> Self {
        Self::plain(
            "👋 <b>Hello!</b>\nSend me a video, I will upload it to Cloudflare R2 for fast streaming.",
        )
    }

    pub fn downloading() -> Self {
        Self::plain("📥 <b>Downloading to server...</b> (please wait)")
    }

    pub fn uploading() -> Self {
        Self::plain("☁️ <b>Uploading to Cloudflare R2...</b>")
    }

    pub fn ready(display_name: &str, link: &str) -> Self {
        Self {
            text: format!(
                "✅ <b>Video ready to watch!</b>\n\n📂 <b>File:</b> <code>{}</code>\n👇 <b>Click to watch &amp; download:</b>",
                escape_html(display_name)
            ),
            button: Some(LinkButton {
                label: PLAY_BUTTON_LABEL.to_string(),
                url: link.to_string(),
            }),
        }
    }

    pub fn fetch_failed() -> Self {
        Self::plain("❌ Download failed. Check logs.")
    }

    pub fn upload_failed() -> Self {
        Self::plain("❌ Upload failed. Check logs.")
    }

    pub fn unexpected(cause: &str) -> Self {
        Self::plain(format!("❌ Error: {}", escape_html(cause)))
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_view_escapes_name_and_carries_link() {
        let view = StatusView::ready("<b>a&b</b>.mp4", "https://watch.example/?src=x");
        assert!(view.text.contains("<code>&lt;b&gt;a&amp;b&lt;/b&gt;.mp4</code>"));
        let button = view.button.expect("button");
        assert_eq!(button.label, PLAY_BUTTON_LABEL);
        assert_eq!(button.url, "https://watch.example/?src=x");
    }

    #[test]
    fn failure_views_are_distinct() {
        assert_ne!(StatusView::fetch_failed(), StatusView::upload_failed());
        assert!(StatusView::fetch_failed().text.contains("Download"));
        assert!(StatusView::upload_failed().text.contains("Upload"));
        assert_eq!(StatusView::unexpected("boom").text, "❌ Error: boom");
    }
}
