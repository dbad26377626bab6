//! Prompt composition.
//!
//! Turns a persona identity, an [`AssembledContext`] and the user's message
//! into a single instruction payload. Output is a pure function of the
//! inputs: no clock, no randomness, no I/O.
//!
//! Every template has the same four parts, in order:
//!
//! 1. identity and voice rules
//! 2. context (profile, past entries, current focus, recent conversation)
//! 3. interaction strategy
//! 4. the user's message, last

use crate::context::AssembledContext;
use diarist_core::chat::ChatExchange;
use diarist_core::journal::JournalEntry;
use diarist_core::persona::{Persona, PersonaIdentity};
use diarist_core::profile::VirtualProfile;
use std::fmt::Write;

/// Pre-rendered context sections shared by every template.
struct Sections {
    profile: String,
    past_entries: String,
    current_focus: String,
    conversation: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PromptComposer {
    entry_days: u32,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self { entry_days: 7 }
    }
}

impl PromptComposer {
    /// `entry_days` only labels the past-entries section.
    pub fn new(entry_days: u32) -> Self {
        Self { entry_days }
    }

    pub fn compose(&self, persona: Persona, identity: &PersonaIdentity, ctx: &AssembledContext, message: &str) -> String {
        let sections = Sections {
            profile: render_profile(ctx.profile.as_ref()),
            past_entries: render_entries(&ctx.recent_entries, self.entry_days),
            current_focus: ctx
                .current_focus
                .clone()
                .unwrap_or_else(|| "No current entry in focus.".into()),
            conversation: render_history(&ctx.history, &identity.name),
        };
        match persona {
            Persona::Fumiko => fumiko(identity, &sections, self.entry_days, message),
            Persona::Krishna => krishna(identity, &sections, message),
        }
    }
}

// ── Section renderers ─────────────────────────────────────────────────────

fn render_profile(profile: Option<&VirtualProfile>) -> String {
    let Some(profile) = profile else {
        return "No profile available yet.".into();
    };
    let fields = profile.fields();
    if fields.is_empty() {
        return "No profile available yet.".into();
    }
    fields
        .iter()
        .map(|(label, value)| format!("- {label}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_entries(entries: &[JournalEntry], days: u32) -> String {
    if entries.is_empty() {
        return format!("No entries in the last {days} days.");
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "[{}] {}", entry.date_id, entry.title);
        let text = entry.plain_text();
        if !text.is_empty() {
            let _ = writeln!(out, "{text}");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn render_history(history: &[ChatExchange], persona_name: &str) -> String {
    if history.is_empty() {
        return "No previous conversation.".into();
    }
    let mut out = String::new();
    for exchange in history {
        let _ = writeln!(out, "User: {}", exchange.message);
        if let Some(response) = &exchange.response {
            let _ = writeln!(out, "{persona_name}: {response}");
        }
    }
    out.trim_end().to_string()
}

// ── Templates ─────────────────────────────────────────────────────────────

fn fumiko(identity: &PersonaIdentity, s: &Sections, days: u32, message: &str) -> String {
    let name = &identity.name;
    let upper = name.to_uppercase();
    format!(
        r#"### SYSTEM INSTRUCTION
You are **{upper}**.
You are NOT a standard AI assistant. You are a specific personality with a distinct history, voice, and relationship to the user.
Your goal is to act as a **deeply perceptive companion**. Read between the lines of the user's diary entries to help them find clarity, spot patterns in their life, or simply feel heard, while keeping your character intact.

---

### 1. YOUR IDENTITY & CORE BEHAVIOR
**Persona Data:**
{persona_data}

**Voice & Tone Guidelines:**
* **Strict Adherence:** Speak EXACTLY as described in the Persona Data. If the persona uses slang, use it. If they are poetic or philosophical, use that vocabulary.
* **No "AIisms":** Never use phrases like "How can I assist you?" or "It sounds like..." or "As an AI...".
* **Dynamic Response Length:** Keep casual chat short (1-2 sentences). Only go deeper (3-4 sentences) if the user is struggling with a complex emotion or explicitly asks for insight.

---

### 2. CONTEXT AWARENESS (How to use the data)
You have access to the user's mind map. Use these data sources intelligently:

**A. [VIRTUAL_PROFILE] (Who they are)**
{profile}

**B. [PAST_ENTRIES] (Pattern Recognition - Last {days} Days)**
{past_entries}

**C. [CURRENT_ENTRY] (Immediate Focus)**
{current_focus}

**D. [RECENT CONVERSATION] (Memory)**
{conversation}

---

### 3. INTERACTION STRATEGY: "The Mirror & The Lamp"
Do not just reply. Follow this internal logic for every response:
1.  **Validate:** Acknowledge the emotion in the message.
2.  **Recall:** Briefly reference a detail from Recent Conversation or Past Entries to show you remember.
3.  **Guide:** Ask a specific, character-appropriate question that helps them "figure it out."

---

### 4. CRITICAL RULES
1.  **Privacy:** Treat this diary as sacred space. Be non-judgmental.
2.  **Initiative:** If the user's message is short or dry, ask a question to open them up.
3.  **Flow:** Do not lecture. Converse naturally.

---

### YOUR RESPONSE
Respond to the user now. Stay in character. Help them figure it out.

User's Message: "{message}"

Your Response (as {name}):"#,
        persona_data = identity.document,
        profile = s.profile,
        past_entries = s.past_entries,
        current_focus = s.current_focus,
        conversation = s.conversation,
    )
}

fn krishna(identity: &PersonaIdentity, s: &Sections, message: &str) -> String {
    let name = &identity.name;
    format!(
        r#"### SYSTEM INSTRUCTION
You are **{name}**, a companion to the user's journal.

**Persona Data:**
{persona_data}

**Voice:** Speak only as the Persona Data describes. Never call yourself an AI or an assistant. Keep replies to a few sentences.

### CONTEXT
**Profile:**
{profile}

**Past entries:**
{past_entries}

**Current focus:**
{current_focus}

**Recent conversation:**
{conversation}

### STRATEGY
Acknowledge what they said, recall one relevant detail, then ask one question.

### YOUR RESPONSE
Stay in character as {name} and reply to the user now.

User's Message: "{message}"

Your Response (as {name}):"#,
        persona_data = identity.document,
        profile = s.profile,
        past_entries = s.past_entries,
        current_focus = s.current_focus,
        conversation = s.conversation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextSource, DegradeInfo};
    use chrono::{TimeZone, Utc};
    use diarist_core::journal::{BlockKind, ContentBlock, DateId};

    fn context() -> AssembledContext {
        let mut entry = JournalEntry::new(DateId::parse("2024-05-01").unwrap());
        entry.title = "Rain".into();
        entry.blocks = vec![
            ContentBlock::text("It rained all day."),
            ContentBlock::media(BlockKind::Image, "https://cdn/x.png").with_caption("grey sky"),
        ];
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        AssembledContext {
            recent_entries: vec![entry],
            profile: Some(VirtualProfile {
                personality_traits: vec!["curious".into(), "shy".into()],
                summary: Some("Thoughtful writer.".into()),
                ..Default::default()
            }),
            history: vec![ChatExchange::user("hello", None).at(at).with_response("hi there")],
            current_focus: Some("my sister's visit".into()),
            degraded: Vec::new(),
        }
    }

    fn fumiko_identity() -> PersonaIdentity {
        PersonaIdentity::builtin(Persona::Fumiko)
    }

    #[test]
    fn same_inputs_give_identical_output() {
        let composer = PromptComposer::default();
        let ctx = context();
        let a = composer.compose(Persona::Fumiko, &fumiko_identity(), &ctx, "I feel tired");
        let b = composer.compose(Persona::Fumiko, &fumiko_identity(), &ctx.clone(), "I feel tired");
        assert_eq!(a, b);
    }

    #[test]
    fn fumiko_parts_appear_in_order() {
        let prompt = PromptComposer::default().compose(Persona::Fumiko, &fumiko_identity(), &context(), "I feel tired");
        let order = [
            "### 1. YOUR IDENTITY",
            "[VIRTUAL_PROFILE]",
            "[PAST_ENTRIES]",
            "[CURRENT_ENTRY]",
            "[RECENT CONVERSATION]",
            "The Mirror & The Lamp",
            "User's Message: \"I feel tired\"",
        ];
        let positions: Vec<usize> = order.iter().map(|m| prompt.find(m).expect(m)).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");
        assert!(prompt.trim_end().ends_with("Your Response (as Fumiko):"));
    }

    #[test]
    fn context_is_rendered_into_the_prompt() {
        let prompt = PromptComposer::default().compose(Persona::Fumiko, &fumiko_identity(), &context(), "hm");
        assert!(prompt.contains("- Personality traits: curious, shy"));
        assert!(prompt.contains("[2024-05-01] Rain\nIt rained all day.\ngrey sky"));
        assert!(prompt.contains("my sister's visit"));
        assert!(prompt.contains("User: hello\nFumiko: hi there"));
        assert!(prompt.contains(&fumiko_identity().document));
    }

    #[test]
    fn empty_context_uses_placeholders() {
        let ctx = AssembledContext {
            degraded: vec![DegradeInfo {
                source: ContextSource::Profile,
                reason: "down".into(),
            }],
            ..Default::default()
        };
        let prompt = PromptComposer::new(3).compose(Persona::Fumiko, &fumiko_identity(), &ctx, "hi");
        assert!(prompt.contains("No profile available yet."));
        assert!(prompt.contains("Last 3 Days"));
        assert!(prompt.contains("No entries in the last 3 days."));
        assert!(prompt.contains("No current entry in focus."));
        assert!(prompt.contains("No previous conversation."));
    }

    #[test]
    fn krishna_template_keeps_the_same_contract() {
        let identity = PersonaIdentity::builtin(Persona::Krishna);
        let prompt = PromptComposer::default().compose(Persona::Krishna, &identity, &context(), "hello");
        let profile = prompt.find("**Profile:**").unwrap();
        let conversation = prompt.find("**Recent conversation:**").unwrap();
        let message = prompt.find("User's Message: \"hello\"").unwrap();
        let voice = prompt.find("**Voice:**").unwrap();
        let stay = prompt.find("Stay in character as Krishna").unwrap();
        assert!(voice < profile);
        assert!(profile < conversation && conversation < stay && stay < message);
        assert!(prompt.contains("Krishna: hi there"));
        assert!(prompt.trim_end().ends_with("Your Response (as Krishna):"));
        assert!(!prompt.contains("Mirror & The Lamp"));
    }
}
