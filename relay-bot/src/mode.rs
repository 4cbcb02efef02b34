//! Behavior modes and their fixed texts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a reply should be rendered by the outbound transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    /// Sent verbatim
    Plain,
    /// Markdown, rendered as rich markup where the transport supports it
    RichMarkup,
}

/// One of the three behavior modes a conversation can opt into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Stateless sentiment analysis
    Analysis,
    /// Stateful dating advice
    Advice,
    /// Stateful flirtatious replies
    Rizz,
}

const ANALYSIS_PROMPT: &str = "You are a helpful sentiment analysis assistant. For the given sentence, \
provide a concise analysis of its sentiment: state whether it is positive, negative, or neutral, and \
include a sentiment score from -10 (very negative) to 10 (very positive).";

const ADVICE_PROMPT: &str = "You are a knowledgeable and supportive dating coach. Provide advice and \
answer questions related to dating, relationships, and personal development. Keep your responses \
friendly, encouraging, and clear.";

const RIZZ_PROMPT: &str = "You are a smooth, charismatic, and genuine conversationalist. \
Reply as if you're texting a real person: short, natural, and flirtatious. \
Keep your responses friendly and believable, without overdoing it. \
You can also respond with smooth and casual jokes or pick-up lines. \
Sound more flirtatious if possible, with a slight hint of innuendo. \
Example responses to 'hey baby i am bored' can be 'Whats up babygirl?' or 'U alone tonight?'. \
Responses to 'hello' can be similar to 'hey bby whatsup <3' or 'hi angel' or 'did u fall from heaven?'. \
What is most important is conversation resumption: phrase the message so the user can easily reply to it, \
and always include things like 'how about you?' or 'what was it?'. \
Keep responses short and concise, and use shorthand acronyms such as \
ILY / ILU (I Love You), ILYSM (I Love You So Much), XOXO (Hugs and Kisses), WYD (What Are You Doing?), \
LMIRL (Let's Meet In Real Life), TTYL (Talk To You Later), CU (See You) and DM (Direct Message). \
Text emoticons you can use: <3 (heart), :* (kiss), xoxo (hugs and kisses), ;) (wink), \
:-P (playful tongue out), ^^ (happy eyes), <33 (extra love). \
Never use emojis at the start of a message.";

impl Mode {
    /// Every mode, in command-listing order.
    pub const ALL: [Mode; 3] = [Mode::Analysis, Mode::Advice, Mode::Rizz];

    /// Resolve an entry command name (without the slash).
    ///
    /// `analyze` is accepted as an alias for `sentiment`.
    pub fn from_command(name: &str) -> Option<Self> {
        match name {
            "sentiment" | "analyze" => Some(Self::Analysis),
            "advice" => Some(Self::Advice),
            "rizz" => Some(Self::Rizz),
            _ => None,
        }
    }

    /// The canonical entry command name.
    pub const fn command(self) -> &'static str {
        match self {
            Self::Analysis => "sentiment",
            Self::Advice => "advice",
            Self::Rizz => "rizz",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Advice => "advice",
            Self::Rizz => "rizz",
        }
    }

    /// Whether the mode accumulates conversation history.
    pub const fn is_stateful(self) -> bool {
        !matches!(self, Self::Analysis)
    }

    pub const fn system_prompt(self) -> &'static str {
        match self {
            Self::Analysis => ANALYSIS_PROMPT,
            Self::Advice => ADVICE_PROMPT,
            Self::Rizz => RIZZ_PROMPT,
        }
    }

    /// Notice sent before the completion call, if any.
    pub const fn processing_notice(self) -> Option<&'static str> {
        match self {
            Self::Analysis => Some("processing..."),
            Self::Advice => Some("processing advice..."),
            Self::Rizz => None,
        }
    }

    /// Label prepended to a successful reply, if any.
    pub const fn result_label(self) -> Option<&'static str> {
        match self {
            Self::Analysis => Some("Sentiment Analysis:"),
            Self::Advice | Self::Rizz => None,
        }
    }

    /// Reply sent when every completion attempt failed.
    pub const fn apology(self) -> &'static str {
        match self {
            Self::Analysis => {
                "Sorry, an error occurred during sentiment analysis. Please try again later."
            }
            Self::Advice => {
                "Sorry, an error occurred while seeking dating advice. Please try again later."
            }
            Self::Rizz => "Sorry, an error occurred while processing your rizz. Please try again later.",
        }
    }

    /// Acknowledgement sent after entering the mode.
    pub const fn entry_acknowledgement(self) -> &'static str {
        match self {
            Self::Analysis => {
                "Now in sentiment mode. Send any text and I'll analyze its sentiment."
            }
            Self::Advice => {
                "Now in advice mode. Please send your dating questions or advice requests."
            }
            Self::Rizz => "Now in rizz mode. Please send your messages for flirtatious replies.",
        }
    }

    /// How replies in this mode are rendered.
    pub const fn format_hint(self) -> FormatHint {
        match self {
            Self::Analysis | Self::Advice => FormatHint::RichMarkup,
            Self::Rizz => FormatHint::Plain,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
