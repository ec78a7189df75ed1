//! Prompt construction for the reflective interview, plus the deterministic
//! fallbacks used when generation fails or returns nothing usable.

use crate::interview::model::ReflectionExchange;
use crate::profile::model::{Dream, Profile};

/// Build the prompt for the personalized opening question of round 1.
pub fn opening_question_prompt(profile: &Profile, dream: &Dream) -> String {
    let name = profile.name.as_deref().unwrap_or("the user");
    format!(
        "You are a warm, curious motivational coach running a \"Five Whys\" \
         reflective interview.\n\
         The user is {name}. Their dream: \"{title}\" (category: {category}).\n\n\
         Ask the opening question of the interview: one short, personal \
         question about why this dream matters to them. Address them by name \
         if known. Output only the question, no preamble.",
        title = dream.title,
        category = dream.category,
    )
}

/// Build the prompt for the next question, conditioned on the full ordered
/// exchange history plus the dream context.
pub fn next_question_prompt(dream: &Dream, history: &[ReflectionExchange], round: u32) -> String {
    let transcript = render_transcript(history);
    format!(
        "You are a warm, curious motivational coach running a \"Five Whys\" \
         reflective interview about the dream \"{title}\" (category: \
         {category}).\n\n\
         Conversation so far:\n{transcript}\n\n\
         Ask question {round}: one short \"why\" question that digs one level \
         deeper into the user's last answer. Do not repeat earlier questions. \
         Output only the question, no preamble.",
        title = dream.title,
        category = dream.category,
    )
}

/// Build the prompt that distills the completed transcript into a single
/// root-motivation statement.
pub fn synthesis_prompt(dream: &Dream, history: &[ReflectionExchange]) -> String {
    let transcript = render_transcript(history);
    format!(
        "The user completed a \"Five Whys\" reflective interview about their \
         dream \"{title}\".\n\n\
         Full transcript:\n{transcript}\n\n\
         Distill the root motivation behind this dream into one warm, \
         affirming sentence written to the user (\"you\"). Output only that \
         sentence.",
        title = dream.title,
    )
}

/// Render the exchange history as alternating coach/user lines, in order.
fn render_transcript(history: &[ReflectionExchange]) -> String {
    history
        .iter()
        .map(|e| format!("Coach: {}\nUser: {}", e.question, e.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Templated greeting used when opening-question generation fails or
/// returns empty.
pub fn fallback_opening_question(profile: &Profile, dream: &Dream) -> String {
    match profile.name.as_deref() {
        Some(name) => format!(
            "Hi {name}! Let's explore what's behind \"{}\". Why does this dream matter to you?",
            dream.title
        ),
        None => format!(
            "Let's explore what's behind \"{}\". Why does this dream matter to you?",
            dream.title
        ),
    }
}

/// Generic closing statement used when synthesis fails. Completion is never
/// blocked by a synthesis failure.
pub fn fallback_motivation(dream: &Dream) -> String {
    format!(
        "Your answers show that \"{}\" is about something deeper than the goal \
         itself — hold on to that reason as you take your first small steps.",
        dream.title
    )
}
