//! Every screen the bot renders, plus the callback vocabulary behind its buttons.
//!
//! Screens are HTML (Telegram `ParseMode::Html`); anything user-supplied goes
//! through [`escape`] first.

use teloxide::utils::html::escape;

use icebox_common::{Dimensions, QuotaSnapshot, Tier, UserAccount};

use crate::orchestrator::{GenerationOutcome, Remaining};
use crate::reset;

// ---------------------------------------------------------------------------
// Callback vocabulary
// ---------------------------------------------------------------------------

/// Button payloads understood by the conversation controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    GenerateMode,
    MainMenu,
    Profile,
    Help,
    Size(Dimensions),
    /// Anything else, kept verbatim. While a size is awaited this is treated
    /// as a malformed size selection.
    Other(String),
}

impl CallbackAction {
    pub fn parse(data: &str) -> Self {
        match data {
            "generate_mode" => Self::GenerateMode,
            "main_menu" => Self::MainMenu,
            "profile" => Self::Profile,
            "help" => Self::Help,
            other => match Dimensions::from_payload(other) {
                Ok(dimensions) => Self::Size(dimensions),
                Err(_) => Self::Other(other.to_string()),
            },
        }
    }

    pub fn payload(&self) -> String {
        match self {
            Self::GenerateMode => "generate_mode".to_string(),
            Self::MainMenu => "main_menu".to_string(),
            Self::Profile => "profile".to_string(),
            Self::Help => "help".to_string(),
            Self::Size(dimensions) => dimensions.payload(),
            Self::Other(raw) => raw.clone(),
        }
    }
}

/// Size choices offered by the picker, in display order.
pub const SIZE_PRESETS: [(&str, Dimensions); 4] = [
    ("Square (1:1)", Dimensions::new(1024, 1024)),
    ("Portrait (3:4)", Dimensions::new(1024, 1280)),
    ("Landscape (4:3)", Dimensions::new(1280, 1024)),
    ("Wide (16:9)", Dimensions::new(1280, 720)),
];

// ---------------------------------------------------------------------------
// Screen
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: CallbackAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: CallbackAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// HTML text plus rows of inline buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Screen {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Vec::new(),
        }
    }

    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.keyboard.push(buttons);
        self
    }

    pub fn button(self, label: &str, action: CallbackAction) -> Self {
        self.row(vec![Button::new(label, action)])
    }

    /// Every callback payload on this screen, row by row.
    pub fn payloads(&self) -> Vec<String> {
        self.keyboard
            .iter()
            .flatten()
            .map(|b| b.action.payload())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

pub fn main_menu(display_name: &str, bot_handle: &str) -> Screen {
    Screen::text(format!(
        "Hi {}, welcome to @{}.\n\n\
         ✨ <b>What you can create:</b>\n\
         • Realistic photos\n\
         • Anime &amp; illustration\n\
         • Cinematic portraits\n\
         • Fantasy &amp; concept art\n\
         • Logos &amp; product visuals\n\n\
         Choose an option below to get started 👇",
        escape(display_name),
        escape(bot_handle),
    ))
    .button("Generate Image", CallbackAction::GenerateMode)
    .button("My Profile", CallbackAction::Profile)
    .button("Help & Support", CallbackAction::Help)
}

pub fn prompt_entry() -> Screen {
    Screen::text("<b>Enter your prompt:</b>").button("Back to Menu", CallbackAction::MainMenu)
}

pub fn size_picker() -> Screen {
    let mut screen =
        Screen::text("<b>Select Aspect Ratio</b>\n\nChoose the size for your image:");
    for pair in SIZE_PRESETS.chunks(2) {
        screen = screen.row(
            pair.iter()
                .map(|(label, dims)| Button::new(*label, CallbackAction::Size(*dims)))
                .collect(),
        );
    }
    screen.button("Back", CallbackAction::MainMenu)
}

pub fn help(support_contact: &str) -> Screen {
    Screen::text(format!(
        "<b>Help &amp; Support</b>\n\n\
         If you encounter any issues or have questions, please contact our admin:\n\
         📩 Contact: {}\n",
        escape(support_contact)
    ))
    .button("Back to Menu", CallbackAction::MainMenu)
}

// ---------------------------------------------------------------------------
// Generation progress and outcomes
// ---------------------------------------------------------------------------

pub fn processing(prompt: &str) -> Screen {
    Screen::text(format!("Processing request for <code>{}</code>...", escape(prompt)))
}

pub fn generating(dimensions: Dimensions) -> Screen {
    Screen::text(format!("Generating image ({dimensions})...\nPlease wait..."))
}

pub fn identity_missing() -> Screen {
    Screen::text("Error: User record not found. Type /start to reset.")
}

pub fn denied(reason: &str) -> Screen {
    Screen::text(format!("Request Denied.\nReason: {}", escape(reason)))
        .button("Back via Menu", CallbackAction::MainMenu)
}

pub fn provider_failed() -> Screen {
    Screen::text("Generation failed due to provider error.")
}

pub fn provider_timed_out() -> Screen {
    Screen::text("Generation timed out. Please try again.")
}

pub fn system_error() -> Screen {
    Screen::text("System error. Please try again later.")
}

/// Sent after the photo: what is left and when it renews.
pub fn generation_summary(outcome: &GenerationOutcome) -> Screen {
    let limit_status = match outcome.remaining {
        Some(Remaining::Daily(n)) => format!("<code>{n}</code> generations remaining today\n\n"),
        Some(Remaining::Tokens(n)) => format!("<code>{n}</code> Koin remaining\n\n"),
        None => String::new(),
    };
    let reset_time = match (outcome.tier_used, outcome.next_reset) {
        (Tier::Free, Some(at)) => reset::display(at),
        _ => "Never (Paid)".to_string(),
    };

    Screen::text(format!(
        "✅ <b>Generation Complete!</b>\n\n\
         <b>Daily Limit Status</b>\n\
         {limit_status}\
         ⏰ <b>Limit will reset at:</b>\n\
         <code>{reset_time}</code>"
    ))
    .button("Generate Again", CallbackAction::GenerateMode)
    .button("Back to Home", CallbackAction::MainMenu)
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Fixed-width account summary.
pub fn profile(account: &UserAccount, quota: &QuotaSnapshot, next_reset: &str) -> Screen {
    let tier = match account.tier {
        Tier::Free => "Free",
        Tier::Paid => "Premium",
    };
    let name = account.first_name.as_deref().unwrap_or("User");
    let region = account.language_code.as_deref().unwrap_or("en");

    let mut body = String::new();
    body.push_str(&format!("Name            : {name}\n\n"));
    body.push_str(&format!("ID              : {}\n", account.chat_id));
    body.push_str(&format!("Region          : {region}\n"));
    body.push_str(&format!("Tier            : {tier}\n"));
    body.push_str(&format!("Status          : {}\n\n", capitalize(&account.status)));
    body.push_str("Activity\n");
    body.push_str(&format!("Total Generated : {}\n\n", account.total_images_generated));
    body.push_str("Usage\n");
    match account.tier {
        Tier::Paid => {
            body.push_str(&format!("Balance         : {} Koin\n", account.token_balance));
        }
        Tier::Free => {
            let used = account.daily_images_generated;
            let total = used + quota.daily_remaining;
            body.push_str(&format!("Daily Limit     : {used} / {total}\n"));
            body.push_str(&format!("Reset Limit     : {next_reset}\n"));
        }
    }

    Screen::text(format!("<pre>{}</pre>", escape(&body)))
        .button("🔙 Back to Menu", CallbackAction::MainMenu)
}

pub fn profile_not_found() -> Screen {
    Screen::text("Profile not found. Type /start to register.")
        .button("Back to Menu", CallbackAction::MainMenu)
}

pub fn profile_failed() -> Screen {
    Screen::text("Could not load profile.").button("Back to Menu", CallbackAction::MainMenu)
}

fn capitalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_payloads_round_trip_through_parse() {
        for action in [
            CallbackAction::GenerateMode,
            CallbackAction::MainMenu,
            CallbackAction::Profile,
            CallbackAction::Help,
            CallbackAction::Size(Dimensions::new(1280, 720)),
        ] {
            assert_eq!(CallbackAction::parse(&action.payload()), action);
        }
        assert_eq!(
            CallbackAction::parse("size_big"),
            CallbackAction::Other("size_big".to_string())
        );
    }

    #[test]
    fn menu_has_three_options() {
        let menu = main_menu("@ana", "iceboxai_bot");
        assert_eq!(menu.keyboard.len(), 3);
        assert_eq!(menu.payloads(), vec!["generate_mode", "profile", "help"]);
        assert!(menu.text.starts_with("Hi @ana, welcome"));
    }

    #[test]
    fn size_picker_offers_presets_two_per_row() {
        let picker = size_picker();
        assert_eq!(picker.keyboard.len(), 3);
        assert_eq!(picker.keyboard[0][0].label, "Square (1:1)");
        assert_eq!(
            picker.payloads(),
            vec![
                "size_1024x1024",
                "size_1024x1280",
                "size_1280x1024",
                "size_1280x720",
                "main_menu"
            ]
        );
    }

    #[test]
    fn user_text_is_escaped() {
        let screen = processing("<b>cat</b> & dog");
        assert!(screen.text.contains("&lt;b&gt;cat&lt;/b&gt; &amp; dog"));
        assert!(denied("<script>").text.contains("&lt;script&gt;"));
    }

    #[test]
    fn capitalize_status() {
        assert_eq!(capitalize("active"), "Active");
        assert_eq!(capitalize("BANNED"), "Banned");
        assert_eq!(capitalize(""), "");
    }
}
