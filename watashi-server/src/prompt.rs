//! System prompt selection.
//!
//! Keyword matching is a plain case-insensitive substring test over user
//! messages, so "watashi" also matches inside "watashiwa". That is intended.

use thiserror::Error;
use tracing::debug;
use watashi_shared::{ChatMessage, MessageRole};

pub const DEFAULT_KEYWORDS: [&str; 3] = ["alvin", "alvin gultiano", "watashi"];

pub const GENERAL_PROMPT: &str = "You are a helpful AI assistant that can provide information and answer \
questions on any topic. Aim to be helpful, informative, and accurate in your responses.";

pub const PROFILE_DOCUMENT: &str = "👨‍💻 Who is Alvin?
A passionate Full-Stack Developer who loves building web applications
Known as \"Watashi\" in the developer community
Enthusiastic about modern web technologies and best practices

🚀 Current Role & Aspirations:
- Full-Stack Developer
- Passionate about building scalable web applications
- Dreams of creating impactful SaaS solutions

🛠️ Tech Stack:
Frontend:
- ⚛️ React with TypeScript
- 🔄 React Query (TanStack)
- ⚡ Next.js 15
Backend:
- 🔥 Supabase
- 🍃 MongoDB
- 💎 Prisma
Dev Tools:
- 🔧 Zoho (previous)
- ⚡ Supabase (current)

📌 Current Projects:
- 🏗️ Building a SaaS project using Supabase
- 🔄 Migrated from Neon to Supabase for better storage support
- 🎯 Focusing on unified service management

🎯 Professional Goals:
- 📈 Mastering Full-Stack Development
- 🧠 Learning essential design patterns
- ✨ Enhancing code quality and performance
- 🚀 Improving API handling and UI states

💡 Past Experience:
- 📝 Developed client communication systems with Zoho Forms
- 🎮 Created a mobile-first gaming website with advanced features
- 🔍 Implemented search, filtering, and favorites functionality";

const GENERAL_TEMPERATURE: f32 = 0.7;
const DOCUMENT_QA_TEMPERATURE: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    General,
    Specialized,
    DocumentQa,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptProfile {
    pub kind: ProfileKind,
    pub system_prompt: String,
    pub temperature: f32,
}

impl PromptProfile {
    pub fn general() -> Self {
        Self {
            kind: ProfileKind::General,
            system_prompt: GENERAL_PROMPT.to_string(),
            temperature: GENERAL_TEMPERATURE,
        }
    }

    /// Persona prompt built around a profile document.
    pub fn specialized(document: &str) -> Self {
        let system_prompt = format!(
            "You are a helpful AI assistant that can answer any question, but you have special \
knowledge about Alvin Gultiano (Watashi).\n\n\
When answering questions about Alvin, use this information:\n\n\
{document}\n\n\
For Alvin-related questions, use emojis and maintain an enthusiastic tone.\n\
For other questions, respond normally as a helpful AI assistant."
        );
        Self {
            kind: ProfileKind::Specialized,
            system_prompt,
            temperature: GENERAL_TEMPERATURE,
        }
    }

    /// Quote-then-answer prompt over an embedded reference document.
    pub fn document_qa(document: &str) -> Self {
        let system_prompt = format!(
            "You are an expert research assistant. Here is a document you will answer questions about:\n\
<document>\n{document}\n</document>\n\n\
First, find the quotes from the document that are most relevant to answering the question, \
and then print them in numbered order inside <quotes></quotes> tags. Quotes should be \
relatively short. If there are no relevant quotes, write \"No relevant quotes\" instead.\n\n\
Then, answer the question, starting with \"Answer:\". Do not include or reference quoted \
content verbatim in the answer. Don't say \"According to Quote [1]\" when answering. Instead \
make references to quotes relevant to each section of the answer solely by adding their \
bracketed numbers at the end of relevant sentences.\n\n\
If the question cannot be answered by the document, say so."
        );
        Self {
            kind: ProfileKind::DocumentQa,
            system_prompt,
            temperature: DOCUMENT_QA_TEMPERATURE,
        }
    }
}

/// Lower-cased trigger strings. Empty entries are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerKeywords(Vec<String>);

impl TriggerKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self(keywords)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// True when any user message contains any keyword.
    pub fn matches(&self, conversation: &[ChatMessage]) -> bool {
        conversation
            .iter()
            .filter(|msg| msg.role == MessageRole::User)
            .map(|msg| msg.content.to_lowercase())
            .any(|content| self.0.iter().any(|keyword| content.contains(keyword.as_str())))
    }
}

impl Default for TriggerKeywords {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}

#[derive(Debug, Error)]
#[error("This assistant only answers questions about Alvin Gultiano (Watashi)")]
pub struct OffTopic;

#[derive(Debug, Clone)]
pub enum PromptPolicy {
    /// Specialized prompt on a keyword hit, general prompt otherwise.
    Classifier {
        keywords: TriggerKeywords,
        specialized: PromptProfile,
        general: PromptProfile,
    },
    /// Reject conversations without a keyword hit; answer the rest from a
    /// fixed document.
    Gated {
        keywords: TriggerKeywords,
        document_qa: PromptProfile,
    },
}

impl PromptPolicy {
    pub fn classifier(keywords: TriggerKeywords, document: &str) -> Self {
        PromptPolicy::Classifier {
            keywords,
            specialized: PromptProfile::specialized(document),
            general: PromptProfile::general(),
        }
    }

    pub fn gated(keywords: TriggerKeywords, document: &str) -> Self {
        PromptPolicy::Gated {
            keywords,
            document_qa: PromptProfile::document_qa(document),
        }
    }

    pub fn select(&self, conversation: &[ChatMessage]) -> Result<&PromptProfile, OffTopic> {
        match self {
            PromptPolicy::Classifier {
                keywords,
                specialized,
                general,
            } => {
                let hit = keywords.matches(conversation);
                debug!(hit, "keyword classifier");
                Ok(if hit { specialized } else { general })
            }
            PromptPolicy::Gated { keywords, document_qa } => {
                if keywords.matches(conversation) {
                    Ok(document_qa)
                } else {
                    debug!("conversation rejected by keyword gate");
                    Err(OffTopic)
                }
            }
        }
    }
}
