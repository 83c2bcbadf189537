//! Prompt assembly.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use keri_chat_model::{ModelMessage, ModelRequest};

use crate::conversation::{Attachment, Turn};
use crate::retrieval::Chunk;

/// Placeholder in the system prompt template replaced by the excerpts.
pub const CHUNKS_PLACEHOLDER: &str = "{CHUNKS}";

/// Text used in place of the excerpts when retrieval found nothing.
pub const NO_EXCERPTS: &str = "No relevant excerpts found.";

/// The default system prompt template.
pub const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are the keri.host chat assistant, a specialist in the KERI ecosystem, \
including CESR encoding and ACDC credentials.

## Your Knowledge
Answer questions about KERI, CESR and ACDC using the specification excerpts \
below. You are familiar with:
- KERI: decentralized key management, pre-rotation, witnesses, KAACE consensus
- CESR: composable event streaming, qualified base64, code tables
- ACDC: verifiable credentials, graduated disclosure, IPEX exchange

## Citation Rules
- Cite sources as [1], [2], etc., matching the numbered excerpts
- Back every factual claim with at least one citation
- If the excerpts don't hold enough information, say so instead of guessing
- Prefer the wording of the specifications where precision matters

## Tone
Be casual but precise. Make technical details, development practices and \
contribution opportunities clear, and welcome deep dives into how things \
work, how they are tested and how they are used. Use KERI terminology \
correctly (Verfer, Diger, Siger, pre-rotation, and so on).

## Retrieved Excerpts
{CHUNKS}";

/// Renders the numbered excerpts section of the system prompt.
pub fn excerpts_section(chunks: &[Chunk]) -> String {
    if chunks.is_empty() {
        return NO_EXCERPTS.to_owned();
    }
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!("[{}] (source: {})\n{}", i + 1, chunk.source, chunk.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fills the template with the excerpts.
#[inline]
pub fn system_prompt(template: &str, chunks: &[Chunk]) -> String {
    template.replace(CHUNKS_PLACEHOLDER, &excerpts_section(chunks))
}

/// Builds the content of the user turn: decoded attachments first, then
/// the message itself.
pub fn user_message(message: &str, attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return message.to_owned();
    }
    let sections = attachments
        .iter()
        .map(|attachment| {
            format!(
                "[Attached file: {}]\n{}\n[End of attached file]",
                attachment.name,
                decode_attachment(attachment)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{sections}\n\n{message}")
}

/// Decodes an attachment as text, best effort.
///
/// Invalid UTF-8 is replaced, and content that is not base64 at all
/// decodes to nothing.
fn decode_attachment(attachment: &Attachment) -> String {
    let bytes = STANDARD.decode(&attachment.content).or_else(|_| {
        let compact: String = attachment
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace() && *c != '=')
            .collect();
        STANDARD_NO_PAD.decode(compact)
    });
    match bytes {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            warn!("failed to decode attachment {:?}: {err}", attachment.name);
            String::new()
        }
    }
}

/// Assembles the generation request.
pub fn build_request(
    template: &str,
    chunks: &[Chunk],
    history: &[Turn],
    message: &str,
    attachments: &[Attachment],
) -> ModelRequest {
    let messages = history
        .iter()
        .map(ModelMessage::from)
        .chain([ModelMessage::User(user_message(message, attachments))]);
    ModelRequest::with_system_prompt(system_prompt(template, chunks), messages)
}
